//! gigflow-ingest library interface
//!
//! Exposes `AppState` and `build_router` so integration tests can drive the
//! service without binding a socket.

pub mod activity;
pub mod api;
pub mod conflicts;
pub mod db;
pub mod error;
pub mod ingest;
pub mod lifecycle;
pub mod locks;
pub mod models;
pub mod services;
pub mod utils;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use gigflow_common::config::TomlConfig;
use gigflow_common::events::EventBus;
use sqlx::SqlitePool;
use tower_http::trace::TraceLayer;

use crate::activity::ActivityLog;
use crate::ingest::{AiFallbackParser, IngestPipeline};
use crate::locks::UserLocks;
use crate::services::BookingService;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// Recent webhook deliveries
    pub activity: ActivityLog,
    /// Webhook ingestion pipeline
    pub pipeline: IngestPipeline,
    /// Booking operations outside the webhook path
    pub bookings: BookingService,
    /// Whether the AI fallback has a configured client
    pub ai_available: bool,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(db: SqlitePool, event_bus: EventBus, config: &TomlConfig) -> Self {
        Self::with_parser(db, event_bus, config, AiFallbackParser::from_config(&config.ai))
    }

    /// Build state around a specific fallback parser
    pub fn with_parser(
        db: SqlitePool,
        event_bus: EventBus,
        config: &TomlConfig,
        ai: AiFallbackParser,
    ) -> Self {
        let locks = UserLocks::new();
        let activity = ActivityLog::new(config.activity_log_capacity);
        let ai_available = ai.is_available();
        let pipeline = IngestPipeline::new(
            db.clone(),
            locks.clone(),
            event_bus.clone(),
            activity.clone(),
            ai,
            config.routing.default_user_id.clone(),
        );
        let bookings = BookingService::new(db.clone(), locks, event_bus.clone());

        Self {
            db,
            event_bus,
            activity,
            pipeline,
            bookings,
            ai_available,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::webhook_routes())
        .merge(api::booking_routes())
        .merge(api::health_routes())
        .route("/events", get(api::event_stream))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
