pub mod commands;
pub mod consts;
pub mod debug;
pub mod framer;
pub mod handshake;
pub mod hash;
pub mod line;
pub mod reader;
pub mod result;
pub mod sender;
pub mod session;
pub mod stream;
pub mod target;
pub mod tls;
pub mod tuple;
pub mod types;

pub use mapi_common::err::{MapiResult};
pub use mapi_common::err::mapi_error::MapiError;
