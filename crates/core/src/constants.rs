//! Constants used throughout the fleischchan core crate.
//!
//! Column-sized limits mirror the widths of the board's metadata tables.

/// Default storage root when no explicit directory is configured.
pub const DEFAULT_STORAGE_DIR: &str = "storage";

/// Environment variable naming the storage root.
pub const STORAGE_DIR_ENV: &str = "FLEISCHCHAN_STORAGE_DIR";

/// Environment variable naming the staging directory.
pub const STAGING_DIR_ENV: &str = "FLEISCHCHAN_STAGING_DIR";

/// Maximum length of a letter title, in characters.
pub const MAX_TITLE_LEN: usize = 128;

/// Maximum length of a letter author, in characters.
pub const MAX_AUTHOR_LEN: usize = 128;

/// Maximum length of a letter body, in characters.
pub const MAX_CONTENT_LEN: usize = 8192;

/// Maximum length of an uploaded file's original name, in characters.
pub const MAX_ORIGINAL_NAME_LEN: usize = 128;
