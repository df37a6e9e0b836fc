pub mod property;
pub mod session;
