pub mod transition;
pub mod types;
pub mod usecase;
