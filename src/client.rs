//! PHD2 client facade
//!
//! Serializes RPC calls over one live connection and exposes the live
//! status snapshot maintained by the reader task.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::config::{Phd2Config, SettleParams};
use crate::connection::{spawn_reader_task, PendingRequest, SharedConnectionState};
use crate::error::{Phd2Error, Result};
use crate::events::Phd2Event;
use crate::io::{ConnectionFactory, TcpConnectionFactory};
use crate::rpc::RpcRequest;
use crate::status::{GuiderStatus, SettleProgress};

/// Bounded wait for the reader task to wind down on disconnect
const READER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// PHD2 equipment profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: i32,
    pub name: String,
}

/// Client for the PHD2 event socket
///
/// Calls are serialized per connection; the status snapshot can be
/// polled from any number of tasks concurrently.
pub struct Phd2Client {
    config: Phd2Config,
    request_id: AtomicU64,
    shared: SharedConnectionState,
    connection_factory: Arc<dyn ConnectionFactory>,
}

impl Phd2Client {
    /// Create a new client with the given configuration
    pub fn new(config: Phd2Config) -> Self {
        Self::with_connection_factory(config, Arc::new(TcpConnectionFactory::new()))
    }

    /// Create a new client with a custom connection factory
    ///
    /// This is useful for testing with mock connections.
    pub fn with_connection_factory(
        config: Phd2Config,
        connection_factory: Arc<dyn ConnectionFactory>,
    ) -> Self {
        Self {
            config,
            request_id: AtomicU64::new(1),
            shared: SharedConnectionState::new(),
            connection_factory,
        }
    }

    /// Connect to the configured PHD2 instance
    ///
    /// Any existing session is torn down first. On success a fresh
    /// reader task owns the socket; on failure the client is left
    /// disconnected and reusable.
    pub async fn connect(&self) -> Result<()> {
        self.disconnect().await?;

        let addr = self.config.addr();
        debug!("Connecting to PHD2 at {}", addr);

        let timeout = Duration::from_secs(self.config.connection_timeout_seconds);
        let pair = self.connection_factory.connect(&addr, timeout).await?;

        {
            let mut writer = self.shared.writer.lock().await;
            *writer = Some(pair.writer);
        }
        {
            let mut state = self.shared.state.write().await;
            state.connected = true;
        }

        let handle = spawn_reader_task(pair.reader, self.shared.clone());
        {
            let mut guard = self.shared.reader_handle.lock().await;
            *guard = Some(handle);
        }

        debug!("PHD2 client connected, reader task started");
        Ok(())
    }

    /// Disconnect from PHD2
    ///
    /// Cancels the reader task and waits a bounded interval for it to
    /// finish; a slow teardown proceeds anyway. Accumulated status is
    /// retained until overwritten by events from a later session.
    pub async fn disconnect(&self) -> Result<()> {
        let handle = {
            let mut guard = self.shared.reader_handle.lock().await;
            guard.take()
        };
        if let Some(handle) = handle {
            debug!("Disconnecting from PHD2");
            handle.abort();
            let _ = tokio::time::timeout(READER_SHUTDOWN_TIMEOUT, handle).await;
        }

        {
            let mut writer = self.shared.writer.lock().await;
            if let Some(mut w) = writer.take() {
                let _ = w.shutdown().await;
            }
        }
        {
            let mut state = self.shared.state.write().await;
            state.connected = false;
        }
        {
            let mut pending = self.shared.pending_requests.lock().await;
            pending.clear();
        }

        Ok(())
    }

    /// Check if connected to PHD2
    pub async fn is_connected(&self) -> bool {
        self.shared.is_connected().await
    }

    /// Subscribe to decoded PHD2 events
    pub fn subscribe(&self) -> broadcast::Receiver<Phd2Event> {
        self.shared.event_sender.subscribe()
    }

    /// Send an RPC request and wait for its correlated reply
    async fn send_request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value> {
        if !self.shared.is_connected().await {
            return Err(Phd2Error::NotConnected);
        }

        let id = self.request_id.fetch_add(1, Ordering::SeqCst);
        let request = RpcRequest::new(method, params, id);
        let request_json = serde_json::to_string(&request)?;

        debug!("Sending RPC request: {}", request_json);

        let (sender, receiver) = tokio::sync::oneshot::channel();
        {
            let mut pending = self.shared.pending_requests.lock().await;
            pending.insert(id, PendingRequest { sender });
        }

        let write_result = {
            let mut writer_guard = self.shared.writer.lock().await;
            match writer_guard.as_mut() {
                Some(writer) => writer.write_message(&request_json).await,
                None => Err(Phd2Error::NotConnected),
            }
        };
        if let Err(e) = write_result {
            self.shared.pending_requests.lock().await.remove(&id);
            return Err(e);
        }

        let timeout = Duration::from_secs(self.config.command_timeout_seconds);
        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => Err(Phd2Error::ReceiveError),
            Err(_) => {
                self.shared.pending_requests.lock().await.remove(&id);
                Err(Phd2Error::Timeout(format!("Request '{}' timed out", method)))
            }
        }
    }

    // ========================================================================
    // Guiding Control
    // ========================================================================

    /// Start guiding and settle to the given tolerance
    ///
    /// The requested pixel threshold is recorded so settle-progress
    /// snapshots can report it. A failed call clears any stale settle
    /// progress before the error is returned.
    pub async fn guide(&self, settle: &SettleParams) -> Result<()> {
        debug!(
            "Starting guiding, settle: pixels={}, time={}, timeout={}",
            settle.pixels, settle.time, settle.timeout
        );

        {
            let mut state = self.shared.state.write().await;
            state.settle_px = settle.pixels;
        }

        let params = serde_json::json!({ "settle": settle_object(settle) });
        match self.send_request("guide", Some(params)).await {
            Ok(_) => Ok(()),
            Err(e) => {
                self.shared.state.write().await.settle = None;
                Err(e)
            }
        }
    }

    /// Dither the guide position by up to `amount` pixels, then settle
    pub async fn dither(&self, amount: f64, settle: &SettleParams) -> Result<()> {
        debug!(
            "Dithering: amount={}, settle: pixels={}, time={}, timeout={}",
            amount, settle.pixels, settle.time, settle.timeout
        );

        {
            let mut state = self.shared.state.write().await;
            state.settle_px = settle.pixels;
        }

        let params = serde_json::json!({
            "amount": amount,
            "raOnly": false,
            "settle": settle_object(settle),
        });
        match self.send_request("dither", Some(params)).await {
            Ok(_) => Ok(()),
            Err(e) => {
                self.shared.state.write().await.settle = None;
                Err(e)
            }
        }
    }

    /// Check whether a settle is in progress
    ///
    /// Answers from local progress when present; otherwise asks PHD2.
    /// When the server reports settling before any Settling event has
    /// arrived, a placeholder with Distance = -1 is installed so
    /// `check_settling` has something to report.
    pub async fn is_settling(&self) -> Result<bool> {
        if self.shared.state.read().await.settle.is_some() {
            return Ok(true);
        }

        let result = self.send_request("get_settling", None).await?;
        let settling = result.as_bool().ok_or_else(|| {
            Phd2Error::InvalidResponse("expected boolean for settling state".to_string())
        })?;

        if settling {
            let mut state = self.shared.state.write().await;
            if state.settle.is_none() {
                state.settle = Some(SettleProgress {
                    done: false,
                    distance: -1.0,
                    settle_px: state.settle_px,
                    time: 0.0,
                    settle_time: 0.0,
                    status: 0,
                    error: None,
                });
            }
        }

        Ok(settling)
    }

    /// Report settle progress
    ///
    /// While settling returns the latest progress snapshot. Once the
    /// settle has finished the terminal result is returned exactly once
    /// and the progress is cleared; asking again is an error.
    pub async fn check_settling(&self) -> Result<SettleProgress> {
        let mut state = self.shared.state.write().await;
        let settle = state.settle.as_ref().ok_or(Phd2Error::NotSettling)?;
        if settle.done {
            let finished = settle.clone();
            state.settle = None;
            Ok(finished)
        } else {
            Ok(settle.clone())
        }
    }

    /// Stop all capture and guiding
    pub async fn stop_capture(&self) -> Result<()> {
        debug!("Stopping capture");
        self.send_request("stop_capture", None).await?;
        Ok(())
    }

    /// Start looping exposures without guiding
    pub async fn start_loop(&self) -> Result<()> {
        debug!("Starting loop");
        self.send_request("loop", None).await?;
        Ok(())
    }

    /// Pause guiding
    pub async fn pause(&self) -> Result<()> {
        debug!("Pausing guiding");
        self.send_request("set_paused", Some(serde_json::json!(true)))
            .await?;
        Ok(())
    }

    /// Resume guiding after a pause
    pub async fn unpause(&self) -> Result<()> {
        debug!("Resuming guiding");
        self.send_request("set_paused", Some(serde_json::json!(false)))
            .await?;
        Ok(())
    }

    // ========================================================================
    // Equipment
    // ========================================================================

    /// Get the available equipment profiles
    pub async fn get_profiles(&self) -> Result<Vec<Profile>> {
        let result = self.send_request("get_profiles", None).await?;
        let profiles: Vec<Profile> = serde_json::from_value(result)?;
        Ok(profiles)
    }

    /// Get the names of the available equipment profiles
    pub async fn get_profile_names(&self) -> Result<Vec<String>> {
        Ok(self
            .get_profiles()
            .await?
            .into_iter()
            .map(|p| p.name)
            .collect())
    }

    /// Select an equipment profile by name and connect its equipment
    ///
    /// Capture is stopped and equipment disconnected before the profile
    /// switch; PHD2 rejects set_profile while equipment is connected.
    pub async fn connect_equipment(&self, profile_name: &str) -> Result<()> {
        let profiles = self.get_profiles().await?;
        let profile = profiles
            .iter()
            .find(|p| p.name == profile_name)
            .ok_or_else(|| Phd2Error::ProfileNotFound(profile_name.to_string()))?;

        debug!("Selecting profile '{}' (id {})", profile.name, profile.id);
        self.send_request("stop_capture", None).await?;
        self.send_request("set_connected", Some(serde_json::json!(false)))
            .await?;
        self.send_request("set_profile", Some(serde_json::json!(profile.id)))
            .await?;
        self.send_request("set_connected", Some(serde_json::json!(true)))
            .await?;
        Ok(())
    }

    /// Get the guide camera pixel scale in arc-seconds per pixel
    pub async fn get_pixel_scale(&self) -> Result<f64> {
        let result = self.send_request("get_pixel_scale", None).await?;
        result.as_f64().ok_or_else(|| {
            Phd2Error::InvalidResponse("expected number for pixel scale".to_string())
        })
    }

    // ========================================================================
    // Status
    // ========================================================================

    /// Take an immutable snapshot of the live guiding status
    pub async fn get_status(&self) -> GuiderStatus {
        self.shared.state.read().await.snapshot()
    }

    /// The PHD2 version string, available once the Version event arrives
    pub async fn get_version(&self) -> Option<String> {
        self.shared.state.read().await.version.clone()
    }
}

fn settle_object(settle: &SettleParams) -> serde_json::Value {
    serde_json::json!({
        "pixels": settle.pixels,
        "time": settle.time,
        "timeout": settle.timeout,
    })
}
