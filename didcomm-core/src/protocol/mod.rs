pub mod introduce;
pub mod outofband;
