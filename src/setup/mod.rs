//! Model construction off the host thread.
//!
//! [`SetupCoordinator`] owns the active [`SharedModel`] and delivers setup
//! completion on a [`CallbackQueue`] that the host drains on its own thread.

mod coordinator;
mod queue;

pub use coordinator::{
    FailureObserver, SetupCoordinator, SetupFailure, SetupObserver, SetupState, SetupTicket,
    SharedModel,
};
pub use queue::{Callback, CallbackPoster, CallbackQueue};
