//! Constants shared across the crate.

/// Application name, used for cache/work directory names.
pub const APP_NAME: &str = "fuzzpack";

/// Default pipeline definition file name at the project root.
pub const CONFIG_FILENAME: &str = "fuzzpack.toml";

/// Length of truncated object hashes (pipeline identity, run directories).
pub const OBJ_HASH_PREFIX_LEN: usize = 20;

/// January 1, 1980 00:00:00 UTC (ZIP epoch). Used for SOURCE_DATE_EPOCH and
/// archive timestamps so packaged images are reproducible.
pub const SOURCE_DATE_EPOCH: u64 = 315532800;

/// Name of the image manifest written next to the rootfs.
pub const IMAGE_MANIFEST_FILENAME: &str = "image.json";

/// Directory holding the final image's filesystem.
pub const ROOTFS_DIRNAME: &str = "rootfs";

/// Archive of the rootfs written next to the manifest.
pub const ROOTFS_ARCHIVE_FILENAME: &str = "rootfs.tar.gz";
