pub mod answer;
pub mod attempt;
pub mod classification;
pub mod context;

pub use answer::{extract_answer, format_answer, AnswerCandidate};
pub use attempt::{
    Attempt, ChainReport, ChainSession, ChainStop, Identity, QuestionOutcome, SubmissionVerdict,
};
pub use classification::{Classification, Complexity, FileKind, FileLink, QuestionType, Strategy};
pub use context::{ImageRef, LinkRef, QuestionContext, TableData};
