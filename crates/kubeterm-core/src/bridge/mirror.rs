use std::io::Write;
use std::thread;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{trace, warn};

/// Chunks of output that may wait for a slow mirror before new ones are dropped
const MIRROR_BACKLOG: usize = 256;

/// Best-effort copy of process output to a local writer.
///
/// A dedicated thread owns the writer, so a stalled writer drops mirrored
/// chunks instead of holding up the caller.
pub(crate) struct Mirror {
    tx: mpsc::Sender<Vec<u8>>,
}

impl Mirror {
    /// Start the writer thread; `None` if it could not be spawned
    pub(crate) fn spawn(mut writer: Box<dyn Write + Send>) -> Option<Self> {
        let (tx, mut rx) = mpsc::channel::<Vec<u8>>(MIRROR_BACKLOG);
        let spawned = thread::Builder::new()
            .name("output-mirror".to_string())
            .spawn(move || {
                while let Some(chunk) = rx.blocking_recv() {
                    if let Err(e) = writer.write_all(&chunk).and_then(|_| writer.flush()) {
                        trace!("Mirror write failed: {}", e);
                    }
                }
            });

        match spawned {
            Ok(_) => Some(Self { tx }),
            Err(e) => {
                warn!("Output mirror disabled: {}", e);
                None
            }
        }
    }

    pub(crate) fn copy(&self, data: &[u8]) {
        match self.tx.try_send(data.to_vec()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => trace!("Mirror backlog full, dropping {} bytes", data.len()),
            Err(TrySendError::Closed(_)) => {}
        }
    }
}
