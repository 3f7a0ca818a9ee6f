//! amigo-daemon: the amigo mesh node.
//!
//! Single OS process on a Tokio runtime: loads configuration, restores
//! the member identity and dedup snapshot, wires the core to a
//! transport, starts the periodic tasks, and announces presence.

mod config;
mod secret_store;
mod udp;

use std::sync::Arc;

use amigo_mesh::{Core, MeshEvent};
use tracing::{info, warn};

use crate::config::DaemonConfig;
use crate::secret_store::FileSecretStore;
use crate::udp::UdpRadio;

/// Filename of the persisted dedup snapshot.
const DEDUP_SNAPSHOT_FILE: &str = "dedup.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("amigo=info".parse()?),
        )
        .init();

    info!("amigo daemon starting");

    // 1. Configuration and data directory.
    let config = DaemonConfig::load()?;
    let data_dir = config.data_dir();
    std::fs::create_dir_all(&data_dir)?;

    // 2. Durable store.
    let conn = amigo_db::open(&data_dir.join("amigo.db"))?;

    // 3. Identity.
    let secrets = FileSecretStore::open(&data_dir.join("secrets"))?;
    let device_secret = secrets.device_secret()?;
    let member = secrets.load_or_create_member(&config.identity.pseudonym, &device_secret)?;

    // 4. Transport.
    let radio = Arc::new(
        UdpRadio::bind(config.transport.listen_port, &config.transport.peers).await?,
    );

    // 5. Core.
    let core = Core::new(conn, member, config.mesh.clone(), radio.clone());

    // 6. Restore the dedup snapshot, if one survived the last run.
    let snapshot_path = data_dir.join(DEDUP_SNAPSHOT_FILE);
    if let Ok(json) = std::fs::read_to_string(&snapshot_path) {
        match core.restore_dedup(&json, amigo_mesh::time::now_ms()).await {
            Ok(()) => info!("dedup snapshot restored"),
            Err(e) => warn!(error = %e, "dedup snapshot unusable, starting fresh"),
        }
    }

    // 7. Periodic tasks and the inbound pump.
    let handles = amigo_mesh::tasks::spawn_periodic_tasks(core.clone(), Some(snapshot_path.clone()));
    let pump = tokio::spawn(radio.clone().run(core.clone()));

    // 8. Persist the member whenever its group map changes.
    let persist_task = {
        let core = core.clone();
        let mut events = core.events().subscribe();
        tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                if matches!(
                    event,
                    MeshEvent::GroupJoined { .. } | MeshEvent::EpochAdvanced { .. }
                ) {
                    match core.seal_member(&device_secret).await {
                        Ok(blob) => {
                            let store = match FileSecretStore::open(&data_dir.join("secrets")) {
                                Ok(store) => store,
                                Err(e) => {
                                    warn!(error = %e, "secret store unavailable");
                                    continue;
                                }
                            };
                            if let Err(e) = store.save_member_blob(&blob) {
                                warn!(error = %e, "member persist failed");
                            }
                        }
                        Err(e) => warn!(error = %e, "member seal failed"),
                    }
                }
            }
        })
    };

    // 9. Announce presence and run until ctrl-c.
    core.announce_presence().await?;
    info!("amigo daemon running");

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    // Final snapshots before exit.
    if let Ok(json) = {
        let guard = core.state().lock().await;
        guard.dedup.snapshot()
    } {
        let _ = std::fs::write(&snapshot_path, json);
    }
    if let Ok(blob) = core.seal_member(&device_secret).await {
        let store = FileSecretStore::open(&core_data_dir(&config))?;
        let _ = store.save_member_blob(&blob);
    }

    for handle in handles {
        handle.abort();
    }
    pump.abort();
    persist_task.abort();

    info!("daemon stopped");
    Ok(())
}

fn core_data_dir(config: &DaemonConfig) -> std::path::PathBuf {
    config.data_dir().join("secrets")
}
