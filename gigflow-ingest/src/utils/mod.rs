//! Utility modules for gigflow-ingest

pub mod db_retry;

pub use db_retry::retry_once_on_transient;
