//! # GigFlow Common Library
//!
//! Shared code for GigFlow crates:
//! - Error type
//! - Configuration loading
//! - Event types and EventBus
//! - Database initialization
//! - SSE and time utilities

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod sse;
pub mod time;

pub use error::{Error, Result};
