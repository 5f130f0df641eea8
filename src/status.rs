use std::sync::{Arc, Mutex, MutexGuard};

use strum::{EnumIs, FromRepr, IntoStaticStr};

/// User-facing connection state, as published on the status stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIs, FromRepr, IntoStaticStr)]
#[repr(i32)]
pub enum VpnState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    Disconnecting = 3,
    Error = 4,
}

impl VpnState {
    pub fn code(self) -> i32 {
        self as i32
    }
}

/// Status codes reported by the negotiation engine through `EngineHandle::update_status`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIs, FromRepr, IntoStaticStr)]
#[repr(i32)]
pub enum EngineStatus {
    ChildSaUp = 1,
    ChildSaDown = 2,
    AuthError = 3,
    PeerAuthError = 4,
    LookupError = 5,
    UnreachableError = 6,
    CertificateUnavailable = 7,
    GenericError = 8,
}

impl EngineStatus {
    pub fn vpn_state(self) -> VpnState {
        match self {
            Self::ChildSaUp => VpnState::Connected,
            // the engine reestablishes on its own
            Self::ChildSaDown => VpnState::Connecting,
            Self::AuthError
            | Self::PeerAuthError
            | Self::LookupError
            | Self::UnreachableError
            | Self::CertificateUnavailable
            | Self::GenericError => VpnState::Error,
        }
    }
}

/// Feeds the status stream. Shared by the controller and every engine handle; consecutive duplicates are dropped.
#[derive(Clone, Debug)]
pub struct StatusReporter {
    sender: flume::Sender<VpnState>,
    last: Arc<Mutex<Option<VpnState>>>,
}

impl StatusReporter {
    pub fn new() -> (Self, flume::Receiver<VpnState>) {
        let (sender, receiver) = flume::unbounded();
        (Self { sender, last: Default::default() }, receiver)
    }

    fn lock(&self) -> MutexGuard<'_, Option<VpnState>> {
        self.last.lock().unwrap()
    }

    pub fn report(&self, state: VpnState) {
        let mut last = self.lock();
        if *last == Some(state) {
            return;
        }
        tracing::info!(message_id = "T1ygKd6q", from = ?*last, to = ?state, "vpn state changed");
        *last = Some(state);
        // Sending while holding the lock keeps the stream in transition order.
        if self.sender.send(state).is_err() {
            tracing::debug!(message_id = "aQ3wNn8u", "no status receiver left");
        }
    }

    pub fn engine_status(&self, code: i32) {
        match EngineStatus::from_repr(code) {
            Some(status) => {
                if status.vpn_state().is_error() {
                    tracing::warn!(message_id = "Lr5hGx0c", ?status, "engine reported an error");
                }
                self.report(status.vpn_state())
            }
            None => tracing::warn!(message_id = "F8bzCs2j", code, "ignoring unknown engine status code"),
        }
    }
}
