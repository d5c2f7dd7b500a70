//! Human-in-the-loop authorization for tool calls.
//!
//! Core principle: **no tool runs without an explicit human decision.**
//! The planner's proposals are parked in a [`Gate`] under a fresh
//! [`RequestToken`] until someone approves or denies them.

mod error;
mod gate;
mod proposal;

pub use error::{Error, Result};
pub use gate::{Gate, Resolution};
pub use proposal::{Arguments, PendingProposal, RequestToken, ToolProposal};
