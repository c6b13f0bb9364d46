#![forbid(unsafe_code)]

pub mod acp;
pub mod config;
pub mod conversation;
pub mod errors;
pub mod events;
pub mod models;
pub mod session;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
