//! Prints the platform calls a profile turns into, without touching any interface.

use std::fs::File;
use std::net::IpAddr;
use std::os::fd::OwnedFd;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;
use ipnetwork::IpNetwork;
use tunguard::errors::BuilderError;
use tunguard::ip_range::AddressFamily;
use tunguard::platform::{PlatformCapabilities, TunBuilder, TunBuilderFactory};
use tunguard::profile::VpnProfile;
use tunguard::tunnel_builder::TunnelBuilderAdapter;

#[derive(Parser, Debug)]
pub struct Cli {
    /// JSON file holding the connection profile.
    #[clap(long)]
    pub profile: PathBuf,
    /// Service config, for the owning app id and capability overrides.
    #[clap(long)]
    pub config: Option<PathBuf>,
    /// Interface address assigned by the gateway, e.g. `10.10.0.2/32`.
    #[clap(long = "address")]
    pub addresses: Vec<IpNetwork>,
    /// Route pushed by the gateway.
    #[clap(long = "route")]
    pub routes: Vec<IpNetwork>,
    #[clap(long = "dns")]
    pub dns_servers: Vec<IpAddr>,
    #[clap(long)]
    pub owning_app_id: Option<String>,
    #[clap(long)]
    pub no_app_scoping: bool,
    #[clap(long)]
    pub no_family_bypass: bool,
    /// Plan the blocking placeholder instead.
    #[clap(long)]
    pub blocking: bool,
}

struct PrintingPlatform {
    capabilities: PlatformCapabilities,
}

impl TunBuilderFactory for PrintingPlatform {
    fn create(&self, _session: &str) -> Box<dyn TunBuilder> {
        Box::new(PrintingBuilder)
    }

    fn capabilities(&self) -> PlatformCapabilities {
        self.capabilities
    }
}

struct PrintingBuilder;

impl TunBuilder for PrintingBuilder {
    fn add_address(&mut self, address: IpAddr, prefix: u8) -> Result<(), BuilderError> {
        println!("add_address {address}/{prefix}");
        Ok(())
    }

    fn add_route(&mut self, address: IpAddr, prefix: u8) -> Result<(), BuilderError> {
        println!("add_route {address}/{prefix}");
        Ok(())
    }

    fn add_dns_server(&mut self, address: IpAddr) -> Result<(), BuilderError> {
        println!("add_dns_server {address}");
        Ok(())
    }

    fn add_search_domain(&mut self, domain: &str) -> Result<(), BuilderError> {
        println!("add_search_domain {domain}");
        Ok(())
    }

    fn set_mtu(&mut self, mtu: u16) -> Result<(), BuilderError> {
        println!("set_mtu {mtu}");
        Ok(())
    }

    fn allow_family(&mut self, family: AddressFamily) -> Result<(), BuilderError> {
        println!("allow_family {}", <&str>::from(family));
        Ok(())
    }

    fn add_disallowed_application(&mut self, app: &str) -> Result<(), BuilderError> {
        println!("add_disallowed_application {app}");
        Ok(())
    }

    fn add_allowed_application(&mut self, app: &str) -> Result<(), BuilderError> {
        println!("add_allowed_application {app}");
        Ok(())
    }

    fn set_blocking(&mut self, blocking: bool) {
        println!("set_blocking {blocking}");
    }

    fn establish(&mut self) -> Result<Option<OwnedFd>, BuilderError> {
        println!("establish");
        let null = File::open("/dev/null").map_err(|error| BuilderError::Platform(error.to_string()))?;
        Ok(Some(null.into()))
    }
}

fn main() -> anyhow::Result<()> {
    tunguard::logging::init(None)?;
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => tunguard::config::load(path)?,
        None => Default::default(),
    };
    let mut capabilities = config.capabilities;
    capabilities.per_app_scoping &= !cli.no_app_scoping;
    capabilities.family_bypass &= !cli.no_family_bypass;
    let owning_app_id = cli.owning_app_id.unwrap_or(config.owning_app_id);

    let profile: VpnProfile = serde_json::from_reader(
        File::open(&cli.profile).with_context(|| format!("failed to open profile {}", cli.profile.display()))?,
    )
    .context("failed to parse profile")?;
    tracing::info!(message_id = "Mh5tAq2s", profile = profile.name, "planning");

    let adapter = TunnelBuilderAdapter::new(Arc::new(PrintingPlatform { capabilities }), capabilities, owning_app_id);
    adapter.set_profile(Arc::new(profile))?;

    if cli.blocking {
        adapter.establish_blocking()?;
        adapter.close_blocking();
        return Ok(());
    }

    for address in cli.addresses {
        if !adapter.add_address(&address.ip().to_string(), address.prefix().into()) {
            anyhow::bail!("rejected address {address}");
        }
    }
    for route in cli.routes {
        if !adapter.add_route(&route.ip().to_string(), route.prefix().into()) {
            anyhow::bail!("rejected route {route}");
        }
    }
    for server in cli.dns_servers {
        if !adapter.add_dns_server(&server.to_string()) {
            anyhow::bail!("rejected dns server {server}");
        }
    }
    adapter.establish()?;
    Ok(())
}
