//! Inbound tunnel service configuration (§4.8): named destinations a peer
//! may dial into over a tunnel, gated by a per-service allow-list, plus the
//! `tunnels.json` persistence format.

use crate::model::ShortId;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Sentinel for `local_dial_address` meaning "dial whatever destination the
/// peer's `OPEN` frame specifies" rather than a fixed service address.
pub const DIAL_ANY: &str = "any";

/// One inbound tunnel an accepting device exposes to a named set of peers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TunnelService {
    pub name: String,
    pub local_dial_address: String,
    pub allow_list: Vec<ShortId>,
    pub disabled: bool,
    /// Port advertised to allowed peers via an `OFFER` frame on connect.
    pub suggested_port: u16,
}

impl TunnelService {
    pub fn allows(&self, device: ShortId) -> bool {
        !self.disabled && self.allow_list.contains(&device)
    }

    /// The address to dial for an inbound `OPEN` from `device`: the peer's
    /// requested destination when this service dials `any`, otherwise the
    /// service's own fixed address.
    pub fn dial_address<'a>(&'a self, requested: Option<&'a str>) -> Option<&'a str> {
        if self.local_dial_address == DIAL_ANY {
            requested
        } else {
            Some(self.local_dial_address.as_str())
        }
    }
}

/// One configured outbound tunnel: a local listener forwarding to a service
/// on a remote device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TunnelOutConfig {
    pub device: ShortId,
    pub service_name: String,
    pub local_listen_address: String,
}

/// Persisted shape of `tunnels.json`: two top-level arrays, written via
/// temp-file-then-rename for crash safety (§4.8 "Config reconciliation").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TunnelsConfig {
    #[serde(rename = "TunnelsIn")]
    pub tunnels_in: Vec<TunnelService>,
    #[serde(rename = "TunnelsOut")]
    pub tunnels_out: Vec<TunnelOutConfig>,
}

impl TunnelsConfig {
    pub async fn load(path: &Path) -> crate::error::Result<Self> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn save(&self, path: &Path) -> crate::error::Result<()> {
        let bytes = serde_json::to_vec_pretty(self)?;
        let temp_path = path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, &bytes).await?;
        crate::fs_utils::atomic_rename(&temp_path, path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TunnelService {
        TunnelService {
            name: "ssh".to_string(),
            local_dial_address: "127.0.0.1:22".to_string(),
            allow_list: vec![ShortId(1)],
            disabled: false,
            suggested_port: 22,
        }
    }

    #[test]
    fn test_service_denies_device_outside_allow_list() {
        let service = service();
        assert!(service.allows(ShortId(1)));
        assert!(!service.allows(ShortId(2)));
    }

    #[test]
    fn test_disabled_service_denies_everyone() {
        let mut service = service();
        service.disabled = true;
        assert!(!service.allows(ShortId(1)));
    }

    #[test]
    fn test_any_dial_address_uses_requested_destination() {
        let mut service = service();
        service.local_dial_address = DIAL_ANY.to_string();
        assert_eq!(
            service.dial_address(Some("10.0.0.5:80")),
            Some("10.0.0.5:80")
        );
    }

    #[test]
    fn test_fixed_dial_address_ignores_requested_destination() {
        let service = service();
        assert_eq!(service.dial_address(Some("10.0.0.5:80")), Some("127.0.0.1:22"));
    }

    #[tokio::test]
    async fn test_save_then_load_round_trips() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("tunnels.json");
        let config = TunnelsConfig {
            tunnels_in: vec![service()],
            tunnels_out: Vec::new(),
        };
        config.save(&path).await.unwrap();

        let loaded = TunnelsConfig::load(&path).await.unwrap();
        assert_eq!(loaded.tunnels_in.len(), 1);
        assert_eq!(loaded.tunnels_in[0].name, "ssh");
    }

    #[tokio::test]
    async fn test_load_missing_file_returns_default() {
        let temp = tempfile::TempDir::new().unwrap();
        let loaded = TunnelsConfig::load(&temp.path().join("absent.json")).await.unwrap();
        assert!(loaded.tunnels_in.is_empty());
    }
}
