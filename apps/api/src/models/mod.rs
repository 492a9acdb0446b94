pub mod candidate;
pub mod extract;
