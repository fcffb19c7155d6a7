pub mod client;
pub mod models;

pub use client::{ApiError, ReleaseClient};
pub use models::ApiConfig;
