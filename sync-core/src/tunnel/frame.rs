//! Tunnel frame model: the message kinds carried over a device connection's
//! tunnel channel (§4.8).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TunnelFrame {
    /// Request to open a tunnel to a named service, optionally carrying the
    /// destination the peer wants dialed when that service accepts `any`.
    Open {
        tunnel_id: u64,
        service_name: String,
        dest_addr: Option<String>,
    },
    Data {
        tunnel_id: u64,
        bytes: Vec<u8>,
    },
    Close {
        tunnel_id: u64,
    },
    /// Advertised by the accepting side on device connect for every inbound
    /// service that device is allowed to reach, not tied to a tunnel id.
    Offer {
        service_name: String,
        suggested_port: u16,
    },
}

impl TunnelFrame {
    /// The tunnel this frame belongs to, or `None` for `Offer` frames, which
    /// advertise a service rather than address an open tunnel.
    pub fn tunnel_id(&self) -> Option<u64> {
        match self {
            TunnelFrame::Open { tunnel_id, .. }
            | TunnelFrame::Data { tunnel_id, .. }
            | TunnelFrame::Close { tunnel_id, .. } => Some(*tunnel_id),
            TunnelFrame::Offer { .. } => None,
        }
    }
}
