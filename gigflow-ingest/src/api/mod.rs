//! HTTP API handlers for gigflow-ingest

pub mod bookings;
pub mod health;
pub mod sse;
pub mod webhook;

pub use bookings::booking_routes;
pub use health::health_routes;
pub use sse::event_stream;
pub use webhook::webhook_routes;
