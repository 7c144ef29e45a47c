// cortado-calendar: Async Rust client for the external calendar service

pub mod client;
pub mod error;
pub mod transport;
pub mod types;

pub use client::CalendarClient;
pub use error::Error;
pub use transport::{TlsMode, TransportConfig};
