//! The single control loop that switches between connection profiles.
//!
//! Requests only ever replace the target profile, so a burst of requests collapses into the last one. Switching from
//! one profile to the next puts a blocking placeholder interface in place before the old session is torn down, so no
//! traffic escapes the tunnel in between.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tokio::sync::watch::{Receiver, Sender, channel};
use uuid::Uuid;

use crate::config::ServiceConfig;
use crate::engine::{EngineHandle, NegotiationEngine};
use crate::errors::ControllerError;
use crate::platform::TunBuilderFactory;
use crate::profile::VpnProfile;
use crate::settings_writer::SettingsWriter;
use crate::status::{StatusReporter, VpnState};
use crate::tunnel_builder::TunnelBuilderAdapter;

/// Target profile, `None` meaning disconnected.
type Target = Option<Arc<VpnProfile>>;

#[derive(Clone, Debug)]
pub struct ControllerHandle {
    target: Arc<Sender<Target>>,
    status: flume::Receiver<VpnState>,
}

impl ControllerHandle {
    /// Replaces any request the controller hasn't picked up yet.
    pub fn connect(&self, profile: VpnProfile) -> Result<(), ControllerError> {
        tracing::info!(message_id = "R4uqWm1c", profile = profile.name, "connect requested");
        self.target.send(Some(Arc::new(profile))).map_err(|_| ControllerError::Stopped)
    }

    pub fn disconnect(&self) -> Result<(), ControllerError> {
        tracing::info!(message_id = "xG9tBf5o", "disconnect requested");
        self.target.send(None).map_err(|_| ControllerError::Stopped)
    }

    pub fn status(&self) -> flume::Receiver<VpnState> {
        self.status.clone()
    }
}

pub struct ConnectionController {
    engine: Arc<dyn NegotiationEngine>,
    adapter: Arc<TunnelBuilderAdapter>,
    status: StatusReporter,
    config: ServiceConfig,
    target: Receiver<Target>,
    /// Profile the engine is initialized for.
    current: Option<Arc<VpnProfile>>,
}

impl ConnectionController {
    pub fn new(
        engine: Arc<dyn NegotiationEngine>,
        factory: Arc<dyn TunBuilderFactory>,
        config: ServiceConfig,
    ) -> (Self, ControllerHandle) {
        let (target_send, target_recv) = channel(None);
        let (status, status_recv) = StatusReporter::new();
        status.report(VpnState::Disconnected);
        let adapter = Arc::new(TunnelBuilderAdapter::new(factory, config.capabilities, config.owning_app_id.clone()));
        let controller = Self { engine, adapter, status, config, target: target_recv, current: None };
        (controller, ControllerHandle { target: Arc::new(target_send), status: status_recv })
    }

    pub fn spawn(self) -> Result<JoinHandle<()>, ControllerError> {
        thread::Builder::new().name("connection-controller".into()).spawn(move || self.run()).map_err(ControllerError::Spawn)
    }

    /// Returns after a disconnect request or once every handle is gone.
    pub fn run(mut self) {
        tracing::info!(message_id = "Nj2eXa7w", "connection controller started");
        loop {
            let next = match futures::executor::block_on(self.target.changed()) {
                Ok(()) => self.target.borrow_and_update().clone(),
                Err(_) => {
                    tracing::info!(message_id = "hW5mCy3q", "all controller handles dropped, disconnecting");
                    None
                }
            };
            self.stop_current_connection(next.as_ref());
            let Some(profile) = next else {
                self.status.report(VpnState::Disconnected);
                break;
            };
            self.start_connection(profile);
        }
        tracing::info!(message_id = "Bv8sKe0r", "connection controller stopped");
    }

    fn stop_current_connection(&mut self, next: Option<&Arc<VpnProfile>>) {
        if let Some(next) = next {
            if self.adapter.capabilities().blocking_placeholder {
                // Block everything until the next profile's interface is up. An invalid next profile leaves the
                // previous one set, which then provides the placeholder.
                if let Err(error) = self.adapter.set_profile(next.clone()) {
                    tracing::warn!(message_id = "dC7nYx2k", ?error, "invalid profile, blocking with the previous one");
                }
                if let Err(error) = self.adapter.establish_blocking() {
                    tracing::warn!(message_id = "Zq1hLu6p", ?error, "failed to establish blocking placeholder");
                }
            }
        }
        if let Some(current) = self.current.take() {
            if next.is_none() {
                self.status.report(VpnState::Disconnecting);
            }
            tracing::info!(message_id = "oP3wRj8g", profile = current.name, "stopping connection");
            self.engine.deinitialize();
        }
        if next.is_none() {
            self.adapter.close_blocking();
        }
    }

    fn start_connection(&mut self, profile: Arc<VpnProfile>) {
        let attempt_id = Uuid::new_v4();
        let _span = tracing::info_span!("connection attempt", %attempt_id, profile = profile.name).entered();
        tracing::info!(message_id = "Uf4dMb9a", gateway = profile.gateway, vpn_type = profile.vpn_type.identifier(), "connecting");
        self.status.report(VpnState::Connecting);

        if let Err(error) = self.adapter.set_profile(profile.clone()) {
            tracing::error!(message_id = "Ik6aTz3v", ?error, "invalid subnets in profile");
            self.status.report(VpnState::Error);
            return;
        }

        let handle = EngineHandle::new(self.adapter.clone(), self.status.clone());
        let log_file = self.config.log_file();
        if !self.engine.initialize(handle, &log_file, &self.config.data_dir, self.config.byod) {
            tracing::error!(message_id = "Wm0cQe4n", "failed to initialize negotiation engine");
            self.status.report(VpnState::Error);
            return;
        }
        self.current = Some(profile.clone());

        if profile.is_missing_password() {
            tracing::error!(message_id = "Hs9pFo1y", "profile has no password");
            self.status.report(VpnState::Error);
            return;
        }

        let settings = SettingsWriter::for_profile(&profile, &self.config.language);
        self.engine.initiate(&settings.serialize());
        tracing::info!(message_id = "Ly2gVn7d", "initiated");
    }
}
