pub mod jsonl_loader;
pub mod toml_loader;

pub use jsonl_loader::{load_jsonl_records, parse_jsonl, save_jsonl_records};
pub use toml_loader::load_grade_request;
