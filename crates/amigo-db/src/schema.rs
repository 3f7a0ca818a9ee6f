//! SQL schema definitions.

/// Complete schema for the amigo v1 database.
pub const SCHEMA_V1: &str = r#"
-- ============================================================
-- Message history
-- ============================================================

CREATE TABLE IF NOT EXISTS messages (
    id TEXT PRIMARY KEY,
    group_id TEXT NOT NULL,
    sender TEXT NOT NULL,
    contents TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_messages_group ON messages(group_id, timestamp);
CREATE INDEX IF NOT EXISTS idx_messages_timestamp ON messages(timestamp);

-- ============================================================
-- Outbound queues
-- ============================================================

CREATE TABLE IF NOT EXISTS outgoing_messages (
    id TEXT PRIMARY KEY,
    sender TEXT NOT NULL,
    contents TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    group_id TEXT NOT NULL,
    retry_count INTEGER NOT NULL DEFAULT 0,
    last_retry_at INTEGER,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS outgoing_amigo_messages (
    id TEXT PRIMARY KEY,
    packet_type INTEGER NOT NULL,
    payload_base64 TEXT NOT NULL,
    recipient_verification_key TEXT NOT NULL,
    retry_count INTEGER NOT NULL DEFAULT 0,
    last_retry_at INTEGER,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_amigo_recipient
    ON outgoing_amigo_messages(recipient_verification_key);

CREATE TABLE IF NOT EXISTS pending_delivery_acks (
    message_id TEXT NOT NULL,
    recipient_verification_key TEXT NOT NULL,
    retry_count INTEGER NOT NULL DEFAULT 0,
    last_retry_at INTEGER,
    created_at INTEGER NOT NULL,
    PRIMARY KEY (message_id, recipient_verification_key)
);

-- ============================================================
-- Inbound staging
-- ============================================================

CREATE TABLE IF NOT EXISTS pending_decryption (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    encrypted_payload BLOB NOT NULL,
    payload_hash BLOB NOT NULL UNIQUE,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS fragments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    fragment_id BLOB NOT NULL,
    position INTEGER NOT NULL,
    version INTEGER NOT NULL,
    type INTEGER NOT NULL,
    timestamp INTEGER NOT NULL,
    payload BLOB NOT NULL,
    allowed_hops INTEGER NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_fragments_fragment_id ON fragments(fragment_id);

-- ============================================================
-- Relay queue
-- ============================================================

CREATE TABLE IF NOT EXISTS relay_packets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    version INTEGER NOT NULL,
    type INTEGER NOT NULL,
    timestamp INTEGER NOT NULL,
    payload BLOB NOT NULL,
    allowed_hops INTEGER NOT NULL,
    device_uuid TEXT NOT NULL,
    relayed INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_relay_unrelayed ON relay_packets(relayed) WHERE relayed = 0;

-- ============================================================
-- Contacts & groups
-- ============================================================

CREATE TABLE IF NOT EXISTS contacts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    verification_key TEXT NOT NULL UNIQUE,
    pseudonym TEXT NOT NULL,
    signature TEXT NOT NULL,
    ecdh_public_key TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS groups (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    admin TEXT,
    expandable INTEGER NOT NULL DEFAULT 1,
    last_active_at INTEGER NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS group_members (
    group_id TEXT NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
    contact_id INTEGER NOT NULL REFERENCES contacts(id) ON DELETE CASCADE,
    PRIMARY KEY (group_id, contact_id)
);

-- ============================================================
-- Radio peers
-- ============================================================

CREATE TABLE IF NOT EXISTS connected_devices (
    device_uuid TEXT PRIMARY KEY,
    last_seen_rssi INTEGER,
    connected INTEGER NOT NULL DEFAULT 0,
    updated_at INTEGER NOT NULL
);
"#;
