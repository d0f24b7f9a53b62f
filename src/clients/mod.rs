pub mod provider_client;
pub mod submission_client;

pub use provider_client::OpenAiCompatProvider;
pub use submission_client::{SubmissionClient, Submitter};
