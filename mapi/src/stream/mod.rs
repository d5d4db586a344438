//! The file-transfer sub-protocol, opened by a server line
//! `{0x01,0x03}<action>`.

pub mod download;
pub mod upload;

pub use download::DownloadStream;
pub use upload::UploadStream;
