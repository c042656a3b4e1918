//! Error taxonomy shared by every layer of the layout engine.

mod types;

pub use types::{LayoutError, Result};
