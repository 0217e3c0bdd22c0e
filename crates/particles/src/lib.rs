//! Particle simulation, motion profiles and the environment theme catalog.

pub mod field;
pub mod motion;
pub mod theme;
pub mod turbulence;

pub use field::*;
pub use motion::*;
pub use theme::*;
pub use turbulence::*;
