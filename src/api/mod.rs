// HTTP client layer for the portal backend

pub mod client;
pub mod error;

pub use client::ApiClient;
pub use error::ApiError;
