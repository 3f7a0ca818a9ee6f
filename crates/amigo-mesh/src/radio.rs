//! The radio collaborator contract.
//!
//! The platform radio binding lives outside this workspace. The core
//! depends on exactly two outbound operations and consumes six inbound
//! callbacks, delivered here as [`RadioEvent`] values. The dispatcher
//! serializes concurrent event arrival.

use async_trait::async_trait;

use crate::Result;

/// Outbound radio operations. Fire-and-forget: delivery is observed only
/// through acks and gossip.
#[async_trait]
pub trait Radio: Send + Sync {
    /// Broadcast a frame to every connected peer except those in the
    /// blackout list.
    async fn broadcast_packet(&self, bytes: &[u8], blackout: &[String]) -> Result<()>;

    /// Unicast a frame to one peer.
    async fn direct_broadcast(&self, bytes: &[u8], device_uuid: &str) -> Result<()>;
}

/// Inbound radio callbacks.
#[derive(Clone, Debug)]
pub enum RadioEvent {
    /// A peer wrote to our characteristic (we are peripheral).
    PeripheralWrite {
        bytes: Vec<u8>,
        device_uuid: String,
    },
    /// A notification arrived from a peer we subscribe to (we are
    /// central).
    CentralNotification {
        bytes: Vec<u8>,
        device_uuid: String,
    },
    /// A peer connected to us.
    PeripheralConnected {
        device_uuid: String,
        rssi: Option<i32>,
    },
    /// A peer disconnected.
    PeripheralDisconnected { device_uuid: String },
    /// An RSSI reading completed.
    RssiRead { device_uuid: String, rssi: i32 },
    /// A peer subscribed to our notification characteristic.
    CentralSubscribed {
        device_uuid: String,
        rssi: Option<i32>,
    },
}

/// One captured transmission from a [`ChannelRadio`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Transmission {
    /// A broadcast with its blackout list.
    Broadcast {
        bytes: Vec<u8>,
        blackout: Vec<String>,
    },
    /// A unicast to one peer.
    Direct { bytes: Vec<u8>, device_uuid: String },
}

impl Transmission {
    /// The frame bytes, whichever shape the transmission took.
    pub fn bytes(&self) -> &[u8] {
        match self {
            Self::Broadcast { bytes, .. } => bytes,
            Self::Direct { bytes, .. } => bytes,
        }
    }
}

/// A capturing radio for tests and simulations: every transmission is
/// recorded and handed back on request, never sent anywhere.
#[derive(Default)]
pub struct ChannelRadio {
    sent: std::sync::Mutex<Vec<Transmission>>,
}

impl ChannelRadio {
    /// Create an empty capturing radio.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take everything transmitted since the last call.
    pub fn take_sent(&self) -> Vec<Transmission> {
        match self.sent.lock() {
            Ok(mut sent) => std::mem::take(&mut *sent),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

#[async_trait]
impl Radio for ChannelRadio {
    async fn broadcast_packet(&self, bytes: &[u8], blackout: &[String]) -> Result<()> {
        let transmission = Transmission::Broadcast {
            bytes: bytes.to_vec(),
            blackout: blackout.to_vec(),
        };
        match self.sent.lock() {
            Ok(mut sent) => sent.push(transmission),
            Err(poisoned) => poisoned.into_inner().push(transmission),
        }
        Ok(())
    }

    async fn direct_broadcast(&self, bytes: &[u8], device_uuid: &str) -> Result<()> {
        let transmission = Transmission::Direct {
            bytes: bytes.to_vec(),
            device_uuid: device_uuid.to_string(),
        };
        match self.sent.lock() {
            Ok(mut sent) => sent.push(transmission),
            Err(poisoned) => poisoned.into_inner().push(transmission),
        }
        Ok(())
    }
}
