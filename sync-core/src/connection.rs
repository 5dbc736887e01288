//! The `Connection` trait: the core's only view of a peer. Everything about
//! wire framing, TLS and transport selection lives on the host side of this
//! boundary (§1 non-goals) — the core just sends and receives already-decoded
//! messages.

use crate::events::{ClusterConfig, IndexMessage};
use crate::model::DeviceId;
use async_trait::async_trait;

/// A live connection to one remote device, shared by every folder runner
/// that has that device in its cluster config.
#[async_trait]
pub trait Connection: Send + Sync {
    fn device_id(&self) -> DeviceId;

    /// Send an index (full) or index-update (delta) message.
    async fn send_index(&self, msg: IndexMessage) -> crate::error::Result<()>;

    /// Send this device's cluster configuration, advertising shared folders.
    async fn send_cluster_config(&self, config: ClusterConfig) -> crate::error::Result<()>;

    /// Request the bytes of one block of one file.
    async fn request_block(
        &self,
        folder: &str,
        name: &str,
        offset: u64,
        size: u32,
    ) -> crate::error::Result<Vec<u8>>;

    /// Advertise newly-downloaded block ranges before the file completes,
    /// so peers can opportunistically pull from us mid-transfer.
    async fn send_download_progress(
        &self,
        folder: &str,
        updates: Vec<crate::progress::ProgressUpdate>,
    ) -> crate::error::Result<()>;

    /// True once the connection has completed its handshake and can carry
    /// traffic; folder runners skip a device that is not yet ready.
    fn is_ready(&self) -> bool;
}
