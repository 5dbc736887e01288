//! Tunnel manager (§4.8): multiplexes arbitrary byte streams (e.g. an SSH or
//! HTTP forward) over the same device connection used for file sync,
//! addressed by a per-(device, tunnel-id) endpoint.

pub mod frame;
pub mod id;
pub mod manager;
pub mod service;

pub use frame::TunnelFrame;
pub use id::TunnelIdGenerator;
pub use manager::{TunnelDescriptor, TunnelManager};
pub use service::{TunnelOutConfig, TunnelService, TunnelsConfig, DIAL_ANY};
