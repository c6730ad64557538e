/// Protocol version advertised by the agent
pub const PROTOCOL_VERSION: &str = "pylon/1";

/// Application name
pub const APP_NAME: &str = "Pylon";

/// Size of one blob chunk before base64 encoding (64 KiB)
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Prefix of every blob checksum string
pub const CHECKSUM_PREFIX: &str = "sha256:";

/// MIME type used when the extension is unknown or missing
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// Maximum message size in bytes (256 KiB), also the default history page budget
pub const MAX_MESSAGE_SIZE: usize = 262_144;

/// Maximum file transfer size in bytes (50 MiB)
pub const MAX_FILE_SIZE: usize = 50 * 1024 * 1024;

/// Maximum number of chunks one blob may declare
pub const MAX_TOTAL_CHUNKS: u32 = 65_536;

/// Default number of messages returned by one history page
pub const HISTORY_PAGE_MESSAGES: usize = 50;

/// Default uploads directory, relative to the agent's working directory
pub const DEFAULT_UPLOADS_DIR: &str = "./uploads";
