//! Configuration surface.
//!
//! Every knob the mesh recognizes, with its default. The daemon fills
//! this from TOML; embedders construct it directly. Accessors apply the
//! documented clamps so a hostile config file cannot disable retention.

use serde::{Deserialize, Serialize};

/// Hard ceiling on message retention: 5 days in minutes.
pub const RETENTION_HARD_MAX_MINUTES: u32 = 5 * 24 * 60;

/// Floor on message retention in minutes.
pub const RETENTION_MIN_MINUTES: u32 = 10;

/// Fragment header overhead subtracted from the fragment packet size.
pub const FRAGMENT_OVERHEAD_BYTES: usize = 13;

/// Complete mesh configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MeshConfig {
    /// Radio framing and outbound retry settings.
    #[serde(default)]
    pub ble: BleConfig,
    /// Relay queue settings.
    #[serde(default)]
    pub relay: RelayConfig,
    /// Inbound dedup filter settings.
    #[serde(default)]
    pub dedup: DedupConfig,
    /// Gossip reconciliation settings.
    #[serde(default)]
    pub gossip: GossipConfig,
    /// Retention settings.
    #[serde(default)]
    pub retention: RetentionConfig,
}

/// Radio framing and outbound retry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BleConfig {
    /// Encoded payloads at or above this length are fragmented.
    #[serde(default = "default_mtu_limit")]
    pub mtu_limit_bytes: usize,
    /// Total fragment packet size cap; chunk size is this minus the
    /// 13-byte fragment header.
    #[serde(default = "default_fragment_size")]
    pub default_fragment_size_bytes: usize,
    /// Relay budget stamped on locally originated packets.
    #[serde(default = "default_allowed_hops")]
    pub default_allowed_hops: u8,
    /// Application outbox retry interval in seconds.
    #[serde(default = "default_message_retry_interval")]
    pub outgoing_message_retry_interval_seconds: u64,
    /// Application outbox retry budget.
    #[serde(default = "default_message_retry_attempts")]
    pub outgoing_message_retry_max_attempts: u32,
    /// Control outbox retry interval; falls back to the application
    /// value when absent.
    #[serde(default)]
    pub amigo_message_retry_interval_seconds: Option<u64>,
    /// Control outbox retry budget; falls back to the application value
    /// when absent.
    #[serde(default)]
    pub amigo_message_retry_max_attempts: Option<u32>,
    /// Delivery-ack broadcast interval in seconds.
    #[serde(default = "default_ack_retry_interval")]
    pub ack_retry_interval_seconds: u64,
    /// Delivery-ack retention in hours.
    #[serde(default = "default_ack_max_age_hours")]
    pub ack_max_age_hours: u64,
    /// Staged-fragment TTL in seconds.
    #[serde(default = "default_fragment_ttl")]
    pub fragment_ttl_seconds: u64,
}

/// Relay queue configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Delay between consecutive relay sends in milliseconds.
    #[serde(default = "default_relay_pacing")]
    pub pacing_ms: u64,
    /// Relay queue cap; oldest rows are evicted beyond it.
    #[serde(default = "default_relay_cap")]
    pub queue_cap: usize,
}

/// Inbound dedup filter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    /// Expected live fingerprint count the filter is sized for.
    #[serde(default = "default_dedup_capacity")]
    pub capacity: usize,
    /// Target false-positive rate.
    #[serde(default = "default_dedup_fpr")]
    pub false_positive_rate: f64,
    /// Per-entry TTL in seconds.
    #[serde(default = "default_dedup_ttl")]
    pub entry_ttl_seconds: u64,
    /// Snapshot save cadence in seconds.
    #[serde(default = "default_dedup_save_interval")]
    pub save_interval_seconds: u64,
    /// Prune cadence in seconds.
    #[serde(default = "default_dedup_prune_interval")]
    pub prune_interval_seconds: u64,
}

/// Gossip reconciliation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GossipConfig {
    /// Message/announcement cache capacity.
    #[serde(default = "default_seen_capacity")]
    pub seen_capacity: usize,
    /// Fragment cache capacity.
    #[serde(default = "default_fragment_capacity")]
    pub fragment_capacity: usize,
    /// Maintenance pass cadence in seconds.
    #[serde(default = "default_gossip_maintenance")]
    pub maintenance_interval_seconds: u64,
    /// Message sync cadence in seconds.
    #[serde(default = "default_message_sync")]
    pub message_sync_interval_seconds: u64,
    /// Fragment sync cadence in seconds.
    #[serde(default = "default_fragment_sync")]
    pub fragment_sync_interval_seconds: u64,
    /// Announcements older than this mark their peer stale, in seconds.
    #[serde(default = "default_stale_peer")]
    pub stale_peer_timeout_seconds: u64,
    /// Cached packets older than this are evicted, in seconds.
    #[serde(default = "default_max_message_age")]
    pub max_message_age_seconds: u64,
    /// Delay before the first message sync to a new peer, in ms.
    #[serde(default = "default_initial_sync_delay")]
    pub initial_sync_delay_ms: u64,
    /// Extra delay before the first fragment sync, in ms.
    #[serde(default = "default_initial_fragment_extra")]
    pub initial_fragment_sync_extra_ms: u64,
}

/// Retention configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Message retention window in minutes. Clamped to
    /// `[RETENTION_MIN_MINUTES, RETENTION_HARD_MAX_MINUTES]`.
    #[serde(default = "default_retention_minutes")]
    pub message_retention_minutes: u32,
    /// GC pass cadence in seconds.
    #[serde(default = "default_gc_interval")]
    pub gc_interval_seconds: u64,
    /// Pending-decryption retention in hours.
    #[serde(default = "default_pending_max_age_hours")]
    pub pending_max_age_hours: u64,
}

// Default value functions

fn default_mtu_limit() -> usize {
    500
}

fn default_fragment_size() -> usize {
    200
}

fn default_allowed_hops() -> u8 {
    3
}

fn default_message_retry_interval() -> u64 {
    30
}

fn default_message_retry_attempts() -> u32 {
    10
}

fn default_ack_retry_interval() -> u64 {
    60
}

fn default_ack_max_age_hours() -> u64 {
    24
}

fn default_fragment_ttl() -> u64 {
    15 * 60
}

fn default_relay_pacing() -> u64 {
    100
}

fn default_relay_cap() -> usize {
    1000
}

fn default_dedup_capacity() -> usize {
    1000
}

fn default_dedup_fpr() -> f64 {
    0.01
}

fn default_dedup_ttl() -> u64 {
    5 * 60
}

fn default_dedup_save_interval() -> u64 {
    30
}

fn default_dedup_prune_interval() -> u64 {
    60 * 60
}

fn default_seen_capacity() -> usize {
    1000
}

fn default_fragment_capacity() -> usize {
    600
}

fn default_gossip_maintenance() -> u64 {
    30
}

fn default_message_sync() -> u64 {
    15
}

fn default_fragment_sync() -> u64 {
    30
}

fn default_stale_peer() -> u64 {
    60
}

fn default_max_message_age() -> u64 {
    15 * 60
}

fn default_initial_sync_delay() -> u64 {
    5000
}

fn default_initial_fragment_extra() -> u64 {
    500
}

fn default_retention_minutes() -> u32 {
    24 * 60
}

fn default_gc_interval() -> u64 {
    60
}

fn default_pending_max_age_hours() -> u64 {
    24
}

impl Default for BleConfig {
    fn default() -> Self {
        Self {
            mtu_limit_bytes: default_mtu_limit(),
            default_fragment_size_bytes: default_fragment_size(),
            default_allowed_hops: default_allowed_hops(),
            outgoing_message_retry_interval_seconds: default_message_retry_interval(),
            outgoing_message_retry_max_attempts: default_message_retry_attempts(),
            amigo_message_retry_interval_seconds: None,
            amigo_message_retry_max_attempts: None,
            ack_retry_interval_seconds: default_ack_retry_interval(),
            ack_max_age_hours: default_ack_max_age_hours(),
            fragment_ttl_seconds: default_fragment_ttl(),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            pacing_ms: default_relay_pacing(),
            queue_cap: default_relay_cap(),
        }
    }
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            capacity: default_dedup_capacity(),
            false_positive_rate: default_dedup_fpr(),
            entry_ttl_seconds: default_dedup_ttl(),
            save_interval_seconds: default_dedup_save_interval(),
            prune_interval_seconds: default_dedup_prune_interval(),
        }
    }
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            seen_capacity: default_seen_capacity(),
            fragment_capacity: default_fragment_capacity(),
            maintenance_interval_seconds: default_gossip_maintenance(),
            message_sync_interval_seconds: default_message_sync(),
            fragment_sync_interval_seconds: default_fragment_sync(),
            stale_peer_timeout_seconds: default_stale_peer(),
            max_message_age_seconds: default_max_message_age(),
            initial_sync_delay_ms: default_initial_sync_delay(),
            initial_fragment_sync_extra_ms: default_initial_fragment_extra(),
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            message_retention_minutes: default_retention_minutes(),
            gc_interval_seconds: default_gc_interval(),
            pending_max_age_hours: default_pending_max_age_hours(),
        }
    }
}

impl MeshConfig {
    /// Chunk size for fragment payloads: the fragment packet size minus
    /// the header overhead, never below one byte.
    pub fn chunk_size(&self) -> usize {
        self.ble
            .default_fragment_size_bytes
            .saturating_sub(FRAGMENT_OVERHEAD_BYTES)
            .max(1)
    }

    /// Application outbox retry interval in milliseconds.
    pub fn message_retry_interval_ms(&self) -> i64 {
        self.ble.outgoing_message_retry_interval_seconds as i64 * 1000
    }

    /// Control outbox retry interval in milliseconds, falling back to
    /// the application value.
    pub fn control_retry_interval_ms(&self) -> i64 {
        self.ble
            .amigo_message_retry_interval_seconds
            .unwrap_or(self.ble.outgoing_message_retry_interval_seconds) as i64
            * 1000
    }

    /// Control outbox retry budget, falling back to the application
    /// value.
    pub fn control_retry_max_attempts(&self) -> u32 {
        self.ble
            .amigo_message_retry_max_attempts
            .unwrap_or(self.ble.outgoing_message_retry_max_attempts)
    }

    /// Delivery-ack retry interval in milliseconds.
    pub fn ack_retry_interval_ms(&self) -> i64 {
        self.ble.ack_retry_interval_seconds as i64 * 1000
    }

    /// Delivery-ack max age in milliseconds.
    pub fn ack_max_age_ms(&self) -> i64 {
        self.ble.ack_max_age_hours as i64 * 60 * 60 * 1000
    }

    /// Message retention window in milliseconds, clamped to the
    /// documented range.
    pub fn retention_window_ms(&self) -> i64 {
        let minutes = self
            .retention
            .message_retention_minutes
            .clamp(RETENTION_MIN_MINUTES, RETENTION_HARD_MAX_MINUTES);
        minutes as i64 * 60 * 1000
    }

    /// Pending-decryption retention in milliseconds.
    pub fn pending_max_age_ms(&self) -> i64 {
        self.retention.pending_max_age_hours as i64 * 60 * 60 * 1000
    }

    /// Dedup entry TTL in milliseconds.
    pub fn dedup_ttl_ms(&self) -> i64 {
        self.dedup.entry_ttl_seconds as i64 * 1000
    }

    /// Staged-fragment TTL in milliseconds.
    pub fn fragment_ttl_ms(&self) -> i64 {
        self.ble.fragment_ttl_seconds as i64 * 1000
    }

    /// Gossip cache age limit in milliseconds.
    pub fn gossip_max_age_ms(&self) -> i64 {
        self.gossip.max_message_age_seconds as i64 * 1000
    }

    /// Stale-peer timeout in milliseconds.
    pub fn stale_peer_timeout_ms(&self) -> i64 {
        self.gossip.stale_peer_timeout_seconds as i64 * 1000
    }
}
