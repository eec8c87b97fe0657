//! Names and tuning values shared by the storage stages.

/// Directory name of the `images` storage scope.
pub const IMAGES_DIR_NAME: &str = "images";

/// Directory, relative to the storage root, that holds in-flight uploads.
pub const STAGING_DIR_NAME: &str = ".staging";

/// Prefix of staging temp files.
pub const STAGING_FILE_PREFIX: &str = "fleischchan-";

/// Suffix of staging temp files.
pub const STAGING_FILE_SUFFIX: &str = ".tmp";

/// Algorithm name recorded in every content key the digest writer produces.
pub const SHA256_ALGORITHM: &str = "SHA-256";

/// Separates the algorithm name from the encoded digest in a content key.
pub const KEY_DELIMITER: char = '$';

/// Read buffer size used while staging uploads.
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024;
