pub mod batch;
pub mod config;
pub mod coordinator;
pub mod errors;
pub mod logging;
pub mod models;
pub mod platforms;
pub mod render;
pub mod schedule_store;
pub mod scheduler;
pub mod security;
pub mod single_instance;
pub mod story;
pub mod uploader;

pub use errors::{AppError, AppResult};
