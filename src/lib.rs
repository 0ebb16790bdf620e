#![forbid(unsafe_code)]

//! HTTP relay between a Connect Four web client and line-oriented AlphaZero
//! engine processes, one engine per game.

pub mod config;
pub mod engine;
pub mod errors;
pub mod http;
pub mod session;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
