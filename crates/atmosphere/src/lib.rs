//! Atmosphere layers for the map view: configuration and the host facade
//! that wires fog, ambient particles and viewport sync to one scheduler.

pub mod config;
pub mod host;

pub use config::AtmosphereConfig;
pub use host::AtmosphereHost;
