//! # Dialog Shared
//! 
//! Configuration, telemetry, and shared constants for the dialog services.

pub mod constants;
pub mod telemetry;
pub mod config;
pub mod error;

pub use error::AppError;
