//! Session state machine
//!
//! [`SessionStateMachine`] owns the session state and is mutated only from
//! one serialized control path. [`SessionDriver`] provides that path as a
//! tokio task that consumes [`SessionCommand`]s from the platform alongside
//! timer and delivery messages produced internally.

mod command;
mod driver;
mod state_machine;

pub use command::SessionCommand;
pub use driver::{DriverError, SessionDriver, SessionHandle};
pub use state_machine::{
    InternalMessage, SessionDeps, SessionStateMachine, TimerKind, TELEPORT_DIAGNOSTIC,
};
