//! Fakes for the platform and negotiation engine boundaries.

use std::collections::BTreeSet;
use std::net::IpAddr;
use std::os::fd::OwnedFd;
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::engine::{EngineHandle, NegotiationEngine};
use crate::errors::BuilderError;
use crate::ip_range::{AddressFamily, IpRange};
use crate::platform::{PlatformCapabilities, TunBuilder, TunBuilderFactory};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BuilderCall {
    Address(String),
    Route(String),
    Dns(IpAddr),
    SearchDomain(String),
    Mtu(u16),
    AllowFamily(AddressFamily),
    Disallowed(String),
    Allowed(String),
    Blocking(bool),
}

pub struct EstablishedInterface {
    pub session: String,
    pub calls: Vec<BuilderCall>,
    pub blocking: bool,
    /// Device side of the descriptor handed out by `establish`.
    pub peer: UnixStream,
}

#[derive(Default)]
struct FakePlatformState {
    established: Vec<EstablishedInterface>,
    rejected_routes: Vec<IpRange>,
    unknown_apps: BTreeSet<String>,
    decline: bool,
}

#[derive(Clone)]
pub struct FakePlatform {
    state: Arc<Mutex<FakePlatformState>>,
    capabilities: PlatformCapabilities,
}

impl FakePlatform {
    pub fn new(capabilities: PlatformCapabilities) -> Self {
        Self { state: Default::default(), capabilities }
    }

    pub fn builder(&self) -> FakeBuilder {
        FakeBuilder { state: self.state.clone(), session: "test".into(), calls: Vec::new(), blocking: false }
    }

    pub fn reject_route(&self, route: &str) {
        self.state.lock().unwrap().rejected_routes.push(route.parse().unwrap());
    }

    pub fn unknown_app(&self, app: &str) {
        self.state.lock().unwrap().unknown_apps.insert(app.into());
    }

    pub fn set_decline(&self, decline: bool) {
        self.state.lock().unwrap().decline = decline;
    }

    pub fn established_count(&self) -> usize {
        self.state.lock().unwrap().established.len()
    }

    pub fn established_calls(&self, index: usize) -> Vec<BuilderCall> {
        self.state.lock().unwrap().established[index].calls.clone()
    }

    pub fn established_blocking(&self) -> Vec<bool> {
        self.state.lock().unwrap().established.iter().map(|i| i.blocking).collect()
    }

    pub fn established_sessions(&self) -> Vec<String> {
        self.state.lock().unwrap().established.iter().map(|i| i.session.clone()).collect()
    }

    pub fn peer(&self, index: usize) -> UnixStream {
        self.state.lock().unwrap().established[index].peer.try_clone().unwrap()
    }
}

impl TunBuilderFactory for FakePlatform {
    fn create(&self, session: &str) -> Box<dyn TunBuilder> {
        let mut builder = self.builder();
        builder.session = session.into();
        Box::new(builder)
    }

    fn capabilities(&self) -> PlatformCapabilities {
        self.capabilities
    }
}

pub struct FakeBuilder {
    state: Arc<Mutex<FakePlatformState>>,
    session: String,
    calls: Vec<BuilderCall>,
    blocking: bool,
}

impl FakeBuilder {
    pub fn calls(&self) -> &[BuilderCall] {
        &self.calls
    }
}

impl TunBuilder for FakeBuilder {
    fn add_address(&mut self, address: IpAddr, prefix: u8) -> Result<(), BuilderError> {
        self.calls.push(BuilderCall::Address(format!("{address}/{prefix}")));
        Ok(())
    }

    fn add_route(&mut self, address: IpAddr, prefix: u8) -> Result<(), BuilderError> {
        let route = IpRange::new(address, prefix).map_err(|e| BuilderError::InvalidArgument(e.to_string()))?;
        if self.state.lock().unwrap().rejected_routes.contains(&route) {
            return Err(BuilderError::InvalidArgument(route.to_string()));
        }
        self.calls.push(BuilderCall::Route(route.to_string()));
        Ok(())
    }

    fn add_dns_server(&mut self, address: IpAddr) -> Result<(), BuilderError> {
        if address.is_unspecified() {
            return Err(BuilderError::InvalidArgument(address.to_string()));
        }
        self.calls.push(BuilderCall::Dns(address));
        Ok(())
    }

    fn add_search_domain(&mut self, domain: &str) -> Result<(), BuilderError> {
        if domain.is_empty() || domain.contains(char::is_whitespace) {
            return Err(BuilderError::InvalidArgument(domain.into()));
        }
        self.calls.push(BuilderCall::SearchDomain(domain.into()));
        Ok(())
    }

    fn set_mtu(&mut self, mtu: u16) -> Result<(), BuilderError> {
        self.calls.push(BuilderCall::Mtu(mtu));
        Ok(())
    }

    fn allow_family(&mut self, family: AddressFamily) -> Result<(), BuilderError> {
        self.calls.push(BuilderCall::AllowFamily(family));
        Ok(())
    }

    fn add_disallowed_application(&mut self, app: &str) -> Result<(), BuilderError> {
        if self.state.lock().unwrap().unknown_apps.contains(app) {
            return Err(BuilderError::UnknownApplication(app.into()));
        }
        self.calls.push(BuilderCall::Disallowed(app.into()));
        Ok(())
    }

    fn add_allowed_application(&mut self, app: &str) -> Result<(), BuilderError> {
        if self.state.lock().unwrap().unknown_apps.contains(app) {
            return Err(BuilderError::UnknownApplication(app.into()));
        }
        self.calls.push(BuilderCall::Allowed(app.into()));
        Ok(())
    }

    fn set_blocking(&mut self, blocking: bool) {
        self.blocking = blocking;
        self.calls.push(BuilderCall::Blocking(blocking));
    }

    fn establish(&mut self) -> Result<Option<OwnedFd>, BuilderError> {
        let mut state = self.state.lock().unwrap();
        if state.decline {
            return Ok(None);
        }
        let (device, peer) = UnixStream::pair().map_err(|e| BuilderError::Platform(e.to_string()))?;
        state.established.push(EstablishedInterface {
            session: self.session.clone(),
            calls: self.calls.clone(),
            blocking: self.blocking,
            peer,
        });
        Ok(Some(device.into()))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineCall {
    Initialize,
    Deinitialize,
    Initiate(String),
}

/// Records calls; the next `failures` initializations fail.
#[derive(Clone, Default)]
pub struct FakeEngine {
    calls: Arc<Mutex<Vec<EngineCall>>>,
    handle: Arc<Mutex<Option<EngineHandle>>>,
    failures: Arc<Mutex<usize>>,
}

impl FakeEngine {
    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn initiated(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                EngineCall::Initiate(config) => Some(config),
                _ => None,
            })
            .collect()
    }

    pub fn fail_initializations(&self, count: usize) {
        *self.failures.lock().unwrap() = count;
    }

    pub fn handle(&self) -> Option<EngineHandle> {
        self.handle.lock().unwrap().clone()
    }
}

impl NegotiationEngine for FakeEngine {
    fn initialize(&self, handle: EngineHandle, _log_path: &Path, _data_dir: &Path, _byod: bool) -> bool {
        self.calls.lock().unwrap().push(EngineCall::Initialize);
        let mut failures = self.failures.lock().unwrap();
        if *failures > 0 {
            *failures -= 1;
            return false;
        }
        *self.handle.lock().unwrap() = Some(handle);
        true
    }

    fn deinitialize(&self) {
        self.calls.lock().unwrap().push(EngineCall::Deinitialize);
        *self.handle.lock().unwrap() = None;
    }

    fn initiate(&self, config: &str) {
        self.calls.lock().unwrap().push(EngineCall::Initiate(config.into()));
    }
}
