pub mod app;
pub mod cli;
pub mod config;
pub mod error;
pub mod handlers;
pub mod jobs;
pub mod middleware;
pub mod observability;
pub mod services;

pub use app::{router, AppState};
