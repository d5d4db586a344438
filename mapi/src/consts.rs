//! Wire-format constants.

/// Maximum payload bytes carried by a single block, excluding its 2-byte header.
pub const BLOCK_SIZE: usize = 8190;

/// Size of the little-endian block header.
pub const BLOCK_HEADER_SIZE: usize = 2;

/// Default handshake redirect TTL budget.
pub const DEFAULT_REDIRECT_TTL: u32 = 10;

/// Default MonetDB MAPI port, used when the target doesn't specify one.
pub const DEFAULT_PORT: u16 = 50000;

/// Default chunk size for file-transfer uploads.
pub const DEFAULT_UPLOAD_CHUNK_SIZE: usize = 1024 * 1024;

/// Only protocol version the handshake accepts.
pub const SUPPORTED_PROTOCOL_VERSION: &str = "9";

pub const PROMPT_SENTINEL: [u8; 2] = [0x01, 0x01];
pub const MORE_SENTINEL: [u8; 2] = [0x01, 0x02];
pub const FILETRANSFER_SENTINEL: [u8; 2] = [0x01, 0x03];
