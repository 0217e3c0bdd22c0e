//! Software rendering for the atmosphere layers.
//!
//! - [`FogRenderer`]: edge vignette fog of war with drifting particles
//! - [`AmbientParticleOverlay`]: theme particles locked to the map viewport
//! - [`RasterSurface`]: the RGBA8 target both draw into
//! - [`SpriteBatch`]: overlay sprites, tessellated for hosts that draw on a GPU

pub mod container;
pub mod fog;
pub mod overlay;
pub mod surface;
pub mod vertex;

pub use container::*;
pub use fog::*;
pub use overlay::*;
pub use surface::*;
pub use vertex::*;
