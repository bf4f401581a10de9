//! Debounced persistence for the persisted peer set.
//!
//! The store owns a background writer task. Saves are queued, not awaited:
//! the writer keeps only the latest snapshot and flushes it once the
//! debounce window closes, so a burst of catalog mutations costs one disk
//! write. Writes go to a temp file first and are renamed into place, so a
//! crash mid-write never corrupts the blob.
//!
//! The peer set is stored as a single keyed blob named `PersistedPeers`;
//! the serialization format is bincode with a size-bounded decoder.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bincode::Options;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::peer::Peer;

/// Window during which queued saves are coalesced.
pub const PERSIST_DEBOUNCE: Duration = Duration::from_secs(2);

/// Name of the single blob holding the persisted peer set.
const PERSISTED_PEERS_KEY: &str = "PersistedPeers";

/// Maximum size accepted when decoding the blob. Generous for 500 records;
/// anything larger is a corrupt or hostile file.
const MAX_BLOB_SIZE: u64 = 4 * 1024 * 1024;

const COMMAND_CHANNEL_CAPACITY: usize = 64;

fn bincode_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_limit(MAX_BLOB_SIZE)
        .with_fixint_encoding()
}

enum StoreCommand {
    Save(HashSet<Peer>),
    Flush(oneshot::Sender<()>),
}

/// Handle to the background writer. Cheap to clone; dropping every handle
/// flushes any pending snapshot and stops the writer.
#[derive(Clone)]
pub struct PeerStore {
    cmd_tx: mpsc::Sender<StoreCommand>,
}

impl PeerStore {
    /// Spawn the writer for the blob under `dir`.
    pub fn open(dir: impl AsRef<Path>) -> Self {
        let path = blob_path(dir.as_ref());
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        tokio::spawn(run_writer(path, cmd_rx));
        Self { cmd_tx }
    }

    /// Read the blob under `dir`, if present and intact.
    pub async fn load(dir: impl AsRef<Path>) -> Option<HashSet<Peer>> {
        let path = blob_path(dir.as_ref());
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read persisted peers");
                return None;
            }
        };
        match bincode_options().deserialize(&bytes) {
            Ok(peers) => Some(peers),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "persisted peers blob is corrupt");
                None
            }
        }
    }

    /// Queue a snapshot for writing. Snapshots queued within the debounce
    /// window replace each other; only the latest reaches disk.
    pub async fn save(&self, snapshot: HashSet<Peer>) {
        let _ = self.cmd_tx.send(StoreCommand::Save(snapshot)).await;
    }

    /// Write any pending snapshot now and wait for it to land.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.cmd_tx.send(StoreCommand::Flush(tx)).await.is_ok() {
            let _ = rx.await;
        }
    }
}

fn blob_path(dir: &Path) -> PathBuf {
    dir.join(PERSISTED_PEERS_KEY)
}

async fn run_writer(path: PathBuf, mut cmd_rx: mpsc::Receiver<StoreCommand>) {
    let mut pending: Option<HashSet<Peer>> = None;
    let mut deadline: Option<Instant> = None;

    loop {
        // The sleep future must exist even while the branch is disabled.
        let until = deadline.unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));
        let debounce = tokio::time::sleep_until(until);

        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(StoreCommand::Save(snapshot)) => {
                    pending = Some(snapshot);
                    if deadline.is_none() {
                        deadline = Some(Instant::now() + PERSIST_DEBOUNCE);
                    }
                }
                Some(StoreCommand::Flush(done)) => {
                    deadline = None;
                    if let Some(snapshot) = pending.take() {
                        write_snapshot(&path, &snapshot).await;
                    }
                    let _ = done.send(());
                }
                None => {
                    // Every handle dropped: flush what is left and exit.
                    if let Some(snapshot) = pending.take() {
                        write_snapshot(&path, &snapshot).await;
                    }
                    debug!("peer store writer exiting");
                    break;
                }
            },
            _ = debounce, if deadline.is_some() => {
                deadline = None;
                if let Some(snapshot) = pending.take() {
                    write_snapshot(&path, &snapshot).await;
                }
            }
        }
    }
}

/// Serialize and atomically replace the blob. A failed write is logged and
/// dropped; the next queued save supplies a fresh snapshot.
async fn write_snapshot(path: &Path, snapshot: &HashSet<Peer>) {
    match try_write(path, snapshot).await {
        Ok(()) => debug!(count = snapshot.len(), "persisted peer set written"),
        Err(e) => warn!(path = %path.display(), error = %e, "persisted peer write failed"),
    }
}

async fn try_write(path: &Path, snapshot: &HashSet<Peer>) -> Result<()> {
    let bytes = bincode::serialize(snapshot).context("serializing persisted peers")?;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .context("creating storage directory")?;
    }
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, &bytes)
        .await
        .context("writing temp blob")?;
    tokio::fs::rename(&tmp, path)
        .await
        .context("renaming temp blob into place")?;
    Ok(())
}
