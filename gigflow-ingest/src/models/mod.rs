//! Data models for gigflow-ingest

pub mod booking;

pub use booking::{
    format_date, format_time, parse_date_lenient, parse_time_lenient, Booking, BookingStatus,
    BookingUpdate, NewBooking, ParseMethod,
};
