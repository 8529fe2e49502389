use std::{
    sync::{
        Arc, Mutex, PoisonError,
        mpsc::{self, SyncSender, TrySendError},
    },
    thread::{self, JoinHandle},
};

use sm_model::RunStatus;
use tracing::{debug, error};

use crate::{
    api::StatusReceiver,
    error::{CoreError, CoreResult},
};

const THREAD_NAME: &str = "status";

/// Background thread delivering incremental status updates.
pub(crate) struct StatusDispatcher {
    tx: Mutex<Option<SyncSender<Vec<RunStatus>>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    depth: usize,
}

impl StatusDispatcher {
    pub(crate) fn spawn(receiver: Arc<dyn StatusReceiver>, depth: usize) -> CoreResult<Self> {
        let (tx, rx) = mpsc::sync_channel::<Vec<RunStatus>>(depth);

        let handle = thread::Builder::new()
            .name(THREAD_NAME.into())
            .spawn(move || {
                for batch in rx {
                    if let Err(e) = receiver.instances_update_status(&batch) {
                        error!(error = %e, count = batch.len(), "failed to deliver status update");
                    }
                }
                debug!("status delivery stopped");
            })?;

        Ok(Self {
            tx: Mutex::new(Some(tx)),
            handle: Mutex::new(Some(handle)),
            depth,
        })
    }

    /// Queues a batch without blocking.
    pub(crate) fn send(&self, batch: Vec<RunStatus>) -> CoreResult<()> {
        let tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = tx.as_ref() else {
            return Err(CoreError::WrongState("status delivery stopped".into()));
        };

        tx.try_send(batch).map_err(|e| match e {
            TrySendError::Full(_) => CoreError::CapacityExceeded {
                what: "status queue",
                limit: self.depth,
            },
            TrySendError::Disconnected(_) => CoreError::WrongState("status delivery stopped".into()),
        })
    }

    /// Delivers what is queued and joins the thread.
    pub(crate) fn shutdown(&self) {
        self.tx.lock().unwrap_or_else(PoisonError::into_inner).take();

        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle
            && handle.join().is_err()
        {
            error!("status thread terminated abnormally");
        }
    }
}
