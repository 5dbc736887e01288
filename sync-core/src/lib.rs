//! Core synchronization engine for a peer-to-peer file synchronizer.
//!
//! This crate implements the per-folder controller, the three-stage
//! block-pull pipeline (copier, puller, finisher), the database-update
//! batcher, the model hub, the folder summary and download-progress
//! services, and the tunnel manager. Everything that talks to the network,
//! disk-level content hashing, ignore-pattern parsing, persisted index
//! storage, or file versioning is reached through a trait the host
//! implements — see [`connection`], [`index_store`], [`scanner`],
//! [`block_index`], [`versioner`] and [`ignore`].

pub mod block_index;
pub mod connection;
pub mod device_activity;
pub mod error;
pub mod events;
pub mod folder;
pub mod fs_utils;
pub mod ignore;
pub mod index_store;
pub mod model;
pub mod model_hub;
pub mod pipeline;
pub mod progress;
pub mod puller_state;
pub mod scanner;
pub mod summary;
pub mod tunnel;
pub mod versioner;

pub use error::{CoreError, Result};
