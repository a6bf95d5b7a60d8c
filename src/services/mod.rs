pub mod grade_writer;
pub mod prompt_builder;
pub mod response_parser;
pub mod sample_source;

pub use grade_writer::GradeWriter;
pub use prompt_builder::build_grading_prompt;
pub use response_parser::parse_verdict;
pub use sample_source::{SampleSource, VecSampleSource};
