//! The constraint layout container.
//!
//! Hosts construct a [`ConstraintLayout`] from a [`LayoutConfig`] (or a
//! declarative [`ConstraintSource`]) and drive it with measure and layout
//! passes; the implementation details live in the private `core` module.

mod config;
mod core;

pub use self::core::ConstraintLayout;
pub use config::{ConstraintSource, LayoutConfig};
