//! Display width helpers used when measuring text regions.

mod utils;

pub use utils::{display_width, strip_escapes};
