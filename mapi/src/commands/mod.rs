//! The command pipeline: serializing queries/control directives and
//! dispatching the response lines that follow.

pub mod control_command;
pub mod query_command;

pub use control_command::ControlCommand;
pub use query_command::{Language, QueryCommand};
