//! Interfaces the layout engine expects from its host view tree.

mod resolver;
pub mod text;

pub use resolver::{NameTable, RegionHandle, RegionResolver};

use crate::geometry::Size;
use crate::sizing::MeasureSpec;

/// A child as seen by one measure or layout pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildView {
    pub handle: RegionHandle,
    pub visible: bool,
}

impl ChildView {
    pub const fn visible(handle: RegionHandle) -> Self {
        Self {
            handle,
            visible: true,
        }
    }

    pub const fn gone(handle: RegionHandle) -> Self {
        Self {
            handle,
            visible: false,
        }
    }
}

/// Host side of a measure pass. Calls are synchronous and made from the
/// thread running the pass.
pub trait MeasureHost {
    fn children(&self) -> Vec<ChildView>;

    /// Natural size of `handle` under the given per-axis requests.
    fn measure_child(
        &mut self,
        handle: RegionHandle,
        width: MeasureSpec,
        height: MeasureSpec,
    ) -> Size;
}
