//! Control commands: single-line directives wrapped in the `X` template.

use mapi_common::err::mapi_error::MapiError;
use mapi_common::err::MapiResult;

/// The four control directives the server understands.
#[derive(Debug, Clone)]
pub enum ControlCommand {
    AutoCommit(bool),
    ReplySize(i64),
    Release(String),
    Close(String),
}

impl ControlCommand {
    fn body(&self) -> String {
        match self {
            ControlCommand::AutoCommit(on) => format!("auto_commit {}", if *on { 1 } else { 0 }),
            ControlCommand::ReplySize(n) => format!("reply_size {}", n),
            ControlCommand::Release(id) => format!("release {}", id),
            ControlCommand::Close(id) => format!("close {}", id),
        }
    }

    /// Renders the `X…` control directive line, bypassing the SQL
    /// `s`/`\n;` query template (control directives use their own prefix).
    pub fn to_wire(&self) -> String {
        format!("X{}\n", self.body())
    }

    pub fn parse_name(name: &str, arg: &str) -> MapiResult<ControlCommand> {
        match name.to_ascii_uppercase().as_str() {
            "AUTO_COMMIT" => {
                let on = matches!(arg, "1" | "true");
                Ok(ControlCommand::AutoCommit(on))
            }
            "REPLY_SIZE" => arg
                .parse::<i64>()
                .map(ControlCommand::ReplySize)
                .map_err(|_| MapiError::Protocol(format!("invalid reply_size {}", arg))),
            "RELEASE" => Ok(ControlCommand::Release(arg.to_string())),
            "CLOSE" => Ok(ControlCommand::Close(arg.to_string())),
            other => Err(MapiError::Protocol(format!("unknown control command {}", other))),
        }
    }
}
