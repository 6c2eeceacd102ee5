pub mod parser;
pub mod publisher;
pub mod scorer;

pub use parser::ResponseParser;
pub use publisher::ResultPublisher;
pub use scorer::{LlmScorer, Scorer};
