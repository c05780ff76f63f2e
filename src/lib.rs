pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use error::{AppError, AppResult, ErrorCategory};
pub use services::scheduling_service::{CommitOptions, SchedulingService};
