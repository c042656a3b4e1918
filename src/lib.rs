//! Constraint-driven layout engine.
//!
//! Regions are positioned by solving linear constraints such as
//! `green.x >= blue.x + blue.width + 10dp` with an incremental Cassowary
//! solver. A [`ConstraintLayout`] builds its model off the host thread,
//! reports a placeholder size until that model is active, then runs a
//! measure/solve/measure/solve loop so intrinsic content sizes can feed back
//! into the system before children are placed.

pub mod error;
pub mod geometry;
pub mod host;
pub mod layout;
pub mod logging;
pub mod metrics;
pub mod model;
pub mod parser;
pub mod setup;
pub mod sizing;
pub mod solver;
pub mod width;

pub use error::{LayoutError, Result};
pub use geometry::{Padding, Rect, Size};
pub use host::{ChildView, MeasureHost, NameTable, RegionHandle, RegionResolver};
pub use layout::{ConstraintLayout, ConstraintSource, LayoutConfig};
pub use logging::{LogEvent, LogFields, LogLevel, Logger, LoggingError, LoggingResult};
pub use metrics::{LayoutMetrics, MetricSnapshot};
pub use model::{Axis, ConstraintModel, Node, NodeGeometry, CONTAINER_NAME};
pub use parser::{Attribute, LinearRelation, ParsedConstraint, parse, parse_relation};
pub use setup::{CallbackPoster, CallbackQueue, SetupFailure, SetupState, SetupTicket, SharedModel};
pub use sizing::{
    ChildRequest, MeasureMode, MeasurePlan, MeasureReport, MeasureSpec, Placement, placeholder_size,
};
pub use solver::{Solver, SolverError};
pub use width::display_width;
