//! Service layer shared by the HTTP handlers and the ingestion pipeline

pub mod bookings;

pub use bookings::{
    ActionInput, ActionOutcome, BookingDetail, BookingService, BookingWithConflicts, ManualBooking,
};
