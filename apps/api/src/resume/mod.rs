pub mod assembly;
pub mod handlers;
