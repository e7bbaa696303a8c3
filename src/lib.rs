#![forbid(unsafe_code)]

pub mod api;
pub mod channel;
pub mod config;
pub mod credentials;
pub mod errors;
pub mod feed;
pub mod ledger;
pub mod lifecycle;
pub mod location;
pub mod models;
pub mod navigation;
pub mod session;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
