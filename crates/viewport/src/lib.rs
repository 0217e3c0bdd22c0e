//! Map viewport contract and overlay synchronisation.
//!
//! The host's map exposes pan/zoom and change notifications through
//! [`MapViewport`]. [`ViewportSync`] listens to those notifications, batches
//! them per frame and turns them into the overlay's [`ViewTransform`](engine_core::ViewTransform).

pub mod events;
pub mod sync;

pub use events::*;
pub use sync::*;
