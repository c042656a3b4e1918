//! Measurement requests and the two-phase measure/solve protocol.
//!
//! Before a model is active the container reports a placeholder size from
//! its aspect ratio. Afterwards each pass binds the container to the host
//! request, solves, measures children, feeds intrinsic sizes back into the
//! model and solves again.

mod placeholder;
mod protocol;
mod spec;

pub use placeholder::placeholder_size;
pub use protocol::{ChildRequest, MeasurePlan, MeasureReport, Placement, SizingPass};
pub use spec::{MeasureMode, MeasureSpec};
