pub mod dedup;
pub mod handlers;
pub mod ingest;
pub mod prompts;
pub mod requirements;
