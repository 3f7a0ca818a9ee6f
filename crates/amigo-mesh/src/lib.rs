//! # amigo-mesh
//!
//! The runtime plane of the amigo mesh transport: everything between raw
//! radio bytes and stored application messages.
//!
//! ## Modules
//!
//! - [`config`] — the configuration surface and its defaults
//! - [`bloom`] — the plain bloom filter used on the wire by gossip
//! - [`dedup`] — the TTL bloom filter suppressing inbound duplicates
//! - [`radio`] — the radio collaborator contract and inbound events
//! - [`relay`] — durable store-and-forward re-broadcast
//! - [`gossip`] — periodic bloom-exchange reconciliation between peers
//! - [`outbox`] — retry passes over the durable outbound queues
//! - [`retention`] — age-based garbage collection
//! - [`core`] — the serializing dispatcher that owns all shared state
//! - [`events`] — the embedder-facing event bus
//! - [`tasks`] — interval timers driving the periodic passes
//!
//! Concurrency model: one `tokio::sync::Mutex` guards the database
//! connection, the member's group map, the dedup filter, and the gossip
//! caches. Inbound handling holds the lock for one packet's end-to-end
//! processing; periodic passes acquire it per tick.

pub mod bloom;
pub mod config;
pub mod core;
pub mod dedup;
pub mod events;
pub mod gossip;
pub mod outbox;
pub mod radio;
pub mod relay;
pub mod retention;
pub mod tasks;
pub mod time;

pub use crate::core::Core;
pub use config::MeshConfig;
pub use events::{EventBus, MeshEvent};
pub use radio::{ChannelRadio, Radio, RadioEvent};

/// Error types for the runtime plane.
#[derive(Debug, thiserror::Error)]
pub enum MeshError {
    /// Wire encode/decode failure.
    #[error(transparent)]
    Wire(#[from] amigo_wire::WireError),

    /// Group key agreement failure.
    #[error(transparent)]
    Cgka(#[from] amigo_cgka::CgkaError),

    /// Persistent store failure.
    #[error(transparent)]
    Db(#[from] amigo_db::DbError),

    /// Radio collaborator failure.
    #[error("radio error: {0}")]
    Radio(String),

    /// Dedup snapshot encode/decode failure.
    #[error("snapshot error: {0}")]
    Snapshot(String),

    /// The operation names a group this member does not belong to.
    #[error("unknown group: {0}")]
    UnknownGroup(String),
}

pub type Result<T> = std::result::Result<T, MeshError>;
