//! Core data model: device identifiers, file/block metadata, version vectors
//! and folder configuration. See §3 of the design document for the
//! authoritative field-by-field description.

mod block;
mod file_info;
mod folder_config;
mod version_vector;

pub use block::BlockInfo;
pub use file_info::{FileInfo, FileType, LocalFlags};
pub use folder_config::{FolderConfig, FolderType, PullOrder, PullerPoolConfig};
pub use version_vector::VersionVector;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Full device identifier. Opaque from the core's point of view — the host
/// owns certificate/pairing semantics and just hands us 32 bytes of identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(pub [u8; 32]);

impl DeviceId {
    /// Reduce to the short form used in logs, conflict-file names and the
    /// version vector's counter map.
    pub fn truncate(&self) -> ShortId {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&self.0[..8]);
        ShortId(u64::from_be_bytes(buf))
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..4]))
    }
}

/// Short device identifier: the low 64 bits of a [`DeviceId`], used wherever
/// a compact, stable-ordering key is needed (version vectors, conflict-file
/// suffixes, log fields).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ShortId(pub u64);

impl fmt::Display for ShortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_id_truncate_is_stable() {
        let id = DeviceId([7u8; 32]);
        assert_eq!(id.truncate(), id.truncate());
    }

    #[test]
    fn test_short_id_display_is_lowercase_hex() {
        assert_eq!(ShortId(0xABCD).to_string(), "abcd");
    }
}
