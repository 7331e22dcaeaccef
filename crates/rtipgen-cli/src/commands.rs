pub mod check;
pub mod estimate;
pub mod phantom;
pub mod session;
pub mod upload;
