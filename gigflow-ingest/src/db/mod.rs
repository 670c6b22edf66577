//! Database access for gigflow-ingest
//!
//! Schema creation lives in `gigflow_common::db`; this module holds the
//! queries the ingestion service runs against it.

pub mod bookings;
pub mod documents;
pub mod payloads;
pub mod resolutions;
pub mod users;
