use crate::err::mapi_error::MapiError;

pub mod mapi_error;

pub type MapiResult<T> = Result<T, MapiError>;
