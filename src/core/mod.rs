pub mod llm;

pub use llm::{LLMClient, ReplyGenerator};
