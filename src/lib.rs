//! Organ sound server
//!
//! Tracks keys held on several manuals and the stops drawn on a console, and
//! turns them into note commands for a tone generator.

pub mod config;
pub mod midi;
pub mod organ;
pub mod paths;
pub mod ports;
pub mod server;
pub mod sink;
pub mod transport;

pub use config::AppConfig;
pub use organ::{Organ, OrganError};
pub use server::{OrganServer, ServerContext};
pub use sink::{SinkError, SoundSink};
