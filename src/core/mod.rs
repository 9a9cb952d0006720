pub mod clock;
pub mod config;
pub mod error;
pub mod failures;
pub mod pdf;
pub mod remote;
pub mod upload;
