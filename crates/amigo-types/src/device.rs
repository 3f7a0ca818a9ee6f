//! Connected radio peers.

use serde::{Deserialize, Serialize};

/// A peer the radio layer currently (or recently) sees.
///
/// Updated from radio callbacks; the `device_uuid` is the platform's
/// opaque peripheral identifier, not a protocol identity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectedDevice {
    /// Platform peripheral identifier.
    pub device_uuid: String,
    /// Last observed signal strength, if the platform reports one.
    pub last_seen_rssi: Option<i32>,
    /// Whether the link is currently up.
    pub connected: bool,
    /// Unix ms of the last state change.
    pub updated_at: i64,
}
