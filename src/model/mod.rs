//! Constraint model: nodes, their solver variables and the sizing bindings
//! applied during a measure pass.

mod core;
mod node;

pub use self::core::{ConstraintModel, NodeGeometry};
pub use node::{AttributeRegistry, Axis, CONTAINER_NAME, Node};
