//! Seams to the surrounding system.
//!
//! The subsystem does not read configuration, walk data directories, or embed resources itself;
//! the host supplies those through these traits.  All of them may be called with a device name so
//! hosts can scope options per device.

use std::path::PathBuf;

/// Access to the host's configuration.
pub trait ConfigSource {
    /// Look up a string option, most specific scope first.
    fn get_str(&self, devname: Option<&str>, key: &str) -> Option<String>;

    /// Look up an unsigned integer option.
    fn get_uint(&self, devname: Option<&str>, key: &str) -> Option<u32>;
}

/// Access to the host's data-file search.
pub trait DataFileSource {
    /// Return all files with the given extension under a logical data path, in the order they
    /// should be considered.
    fn search(&self, ext: &str, path: &str) -> Vec<PathBuf>;
}

/// Access to data embedded in the host binary.
pub trait ResourceSource {
    /// Fetch an embedded resource by id.  Returns an empty slice when the resource is absent.
    fn get(&self, id: u32) -> &[u8];
}
