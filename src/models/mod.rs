pub mod loaders;
pub mod scoring;
pub mod submission;

pub use loaders::load_all_toml_files;
pub use scoring::{FailedSubmission, ParseOutcome, QueueStats, ScoringJob, ScoringResult};
pub use submission::{AssignmentContext, Submission, SubmissionBatch};
