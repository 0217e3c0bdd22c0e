//! Core types shared by the atmosphere crates.
//!
//! This crate provides the foundational pieces every renderer builds on:
//! - Frame timing and the shared per-frame scheduler
//! - The 2D view transform used to lock overlays to the map
//! - Color types and the common error type

pub mod color;
pub mod error;
pub mod scheduler;
pub mod time;
pub mod transform;

pub use color::*;
pub use error::*;
pub use scheduler::*;
pub use time::*;
pub use transform::*;

// Re-export commonly used types
pub use glam::{Mat3, Vec2};
