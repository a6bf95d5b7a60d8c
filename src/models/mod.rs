pub mod conversation;
pub mod grade;
pub mod loaders;
pub mod request;
pub mod rubric;

pub use conversation::{Conversation, Message};
pub use grade::{GradeResult, GradeValue, Quote, Verdict, PROMPT_VERSION};
pub use loaders::{load_grade_request, load_jsonl_records, save_jsonl_records};
pub use request::{
    DispatchMode, GradeRequest, GradeResponse, GradingEvent, QuotingMode, QuotingPolicy,
    SampleError, TuningParams,
};
pub use rubric::{GradeType, PresetRubric, Rubric, PRESET_RUBRICS};
