//! UDP development transport.
//!
//! The production radio binding (BLE peripheral + central) lives in the
//! platform layer outside this workspace. For LAN development the
//! daemon speaks the same frames over UDP datagrams: the configured
//! peer list plays the part of "connected devices", and a peer's socket
//! address is its device UUID.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;

use amigo_mesh::{Core, MeshError, Radio, RadioEvent};
use async_trait::async_trait;
use tokio::net::UdpSocket;

/// A [`Radio`] over UDP datagrams to a fixed peer list.
pub struct UdpRadio {
    socket: Arc<UdpSocket>,
    peers: Vec<SocketAddr>,
}

impl UdpRadio {
    /// Bind a socket and resolve the peer list.
    pub async fn bind(listen_port: u16, peers: &[String]) -> anyhow::Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", listen_port)).await?;
        let peers = peers
            .iter()
            .map(|peer| {
                peer.parse()
                    .map_err(|e| anyhow::anyhow!("bad peer address {peer}: {e}"))
            })
            .collect::<anyhow::Result<Vec<SocketAddr>>>()?;
        tracing::info!(
            local = %socket.local_addr()?,
            peers = peers.len(),
            "UDP transport bound"
        );
        Ok(Self {
            socket: Arc::new(socket),
            peers,
        })
    }

    /// Pump inbound datagrams into the core until the socket dies.
    /// The first datagram from a peer surfaces as a connection event.
    pub async fn run(self: Arc<Self>, core: Core) {
        let mut seen: HashSet<SocketAddr> = HashSet::new();
        let mut buf = vec![0u8; 65_536];
        loop {
            let (len, from) = match self.socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e) => {
                    tracing::error!(error = %e, "UDP receive failed, transport stopping");
                    return;
                }
            };
            let device_uuid = from.to_string();
            if seen.insert(from) {
                core.handle_radio_event(RadioEvent::PeripheralConnected {
                    device_uuid: device_uuid.clone(),
                    rssi: None,
                })
                .await;
            }
            core.handle_radio_event(RadioEvent::CentralNotification {
                bytes: buf[..len].to_vec(),
                device_uuid,
            })
            .await;
        }
    }
}

#[async_trait]
impl Radio for UdpRadio {
    async fn broadcast_packet(
        &self,
        bytes: &[u8],
        blackout: &[String],
    ) -> amigo_mesh::Result<()> {
        for peer in &self.peers {
            if blackout.iter().any(|excluded| excluded == &peer.to_string()) {
                continue;
            }
            self.socket
                .send_to(bytes, peer)
                .await
                .map_err(|e| MeshError::Radio(e.to_string()))?;
        }
        Ok(())
    }

    async fn direct_broadcast(&self, bytes: &[u8], device_uuid: &str) -> amigo_mesh::Result<()> {
        let addr: SocketAddr = device_uuid
            .parse()
            .map_err(|e| MeshError::Radio(format!("bad device uuid {device_uuid}: {e}")))?;
        self.socket
            .send_to(bytes, addr)
            .await
            .map_err(|e| MeshError::Radio(e.to_string()))?;
        Ok(())
    }
}
