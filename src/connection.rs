//! Shared connection state and the per-connection reader task
//!
//! One reader task runs per live connection. It is the single consumer
//! of the socket and the single writer of the session state: replies
//! are matched to their pending call by id, everything else is folded
//! into the status model as an event.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, warn};

use crate::error::Phd2Error;
use crate::events::Phd2Event;
use crate::io::{LineReader, MessageWriter};
use crate::rpc::RpcResponse;
use crate::status::SessionState;

/// Pending RPC call waiting for its correlated reply
pub(crate) struct PendingRequest {
    pub sender: tokio::sync::oneshot::Sender<std::result::Result<serde_json::Value, Phd2Error>>,
}

/// State shared between the client facade and the reader task
#[derive(Clone)]
pub(crate) struct SharedConnectionState {
    pub state: Arc<RwLock<SessionState>>,
    pub writer: Arc<Mutex<Option<Box<dyn MessageWriter>>>>,
    pub pending_requests: Arc<Mutex<HashMap<u64, PendingRequest>>>,
    pub event_sender: broadcast::Sender<Phd2Event>,
    pub reader_handle: Arc<Mutex<Option<tokio::task::JoinHandle<()>>>>,
}

impl SharedConnectionState {
    pub fn new() -> Self {
        let (event_sender, _) = broadcast::channel(100);
        Self {
            state: Arc::new(RwLock::new(SessionState::default())),
            writer: Arc::new(Mutex::new(None)),
            pending_requests: Arc::new(Mutex::new(HashMap::new())),
            event_sender,
            reader_handle: Arc::new(Mutex::new(None)),
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.state.read().await.connected
    }
}

/// Spawn the reader task for a freshly opened connection
///
/// The task runs until end of stream, a read error, or cancellation
/// through `JoinHandle::abort`. It never reconnects; recovery is the
/// caller's decision.
pub(crate) fn spawn_reader_task(
    mut reader: Box<dyn LineReader>,
    shared: SharedConnectionState,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match reader.read_line().await {
                Ok(None) => {
                    debug!("PHD2 connection closed");
                    break;
                }
                Ok(Some(line)) => {
                    if line.is_empty() {
                        continue;
                    }

                    debug!("Received from PHD2: {}", line);

                    if let Ok(response) = serde_json::from_str::<RpcResponse>(&line) {
                        let mut pending = shared.pending_requests.lock().await;
                        if let Some(request) = pending.remove(&response.id) {
                            let result = if let Some(error) = response.error {
                                Err(Phd2Error::Rpc {
                                    code: error.code,
                                    message: error.message,
                                })
                            } else {
                                Ok(response.result.unwrap_or(serde_json::Value::Null))
                            };
                            let _ = request.sender.send(result);
                        } else {
                            debug!("Dropping reply with no pending call, id {}", response.id);
                        }
                    } else if let Ok(event) = serde_json::from_str::<Phd2Event>(&line) {
                        {
                            let mut state = shared.state.write().await;
                            state.apply_event(&event);
                        }
                        let _ = shared.event_sender.send(event);
                    } else {
                        debug!("Discarding unparsable PHD2 message: {}", line);
                    }
                }
                Err(e) => {
                    warn!("Error reading from PHD2: {}", e);
                    break;
                }
            }
        }

        // The connection is gone: mark it, wake any caller still
        // blocked on a reply, and release the writer.
        {
            let mut state = shared.state.write().await;
            state.connected = false;
        }
        {
            let mut pending = shared.pending_requests.lock().await;
            pending.clear();
        }
        {
            let mut writer = shared.writer.lock().await;
            if let Some(mut w) = writer.take() {
                let _ = w.shutdown().await;
            }
        }
    })
}
