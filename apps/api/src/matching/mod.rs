pub mod matcher;
pub mod prompts;
