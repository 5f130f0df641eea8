use std::collections::BTreeMap;
use std::fmt::{self, Display, Write as _};

use crate::profile::{ProfileFlags, VpnProfile};

/// Flat `key="value"` settings as handed to `NegotiationEngine::initiate`, one line per key, sorted by key.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SettingsWriter {
    values: BTreeMap<String, String>,
}

/// Renders as `1`/`0`.
#[derive(Clone, Copy, Debug)]
pub struct Flag(pub bool);

impl Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.0 { "1" } else { "0" })
    }
}

impl SettingsWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_value(&mut self, key: &str, value: impl Display) -> &mut Self {
        self.values.insert(key.to_string(), value.to_string());
        self
    }

    /// `None` leaves the key out entirely.
    pub fn set_optional(&mut self, key: &str, value: Option<impl Display>) -> &mut Self {
        match value {
            Some(value) => self.set_value(key, value),
            None => {
                self.values.remove(key);
                self
            }
        }
    }

    pub fn serialize(&self) -> String {
        self.to_string()
    }

    pub fn for_profile(profile: &VpnProfile, language: &str) -> Self {
        let flags = profile.flags;
        let mut writer = Self::new();
        writer
            .set_value("global.language", language)
            .set_optional("global.mtu", profile.mtu)
            .set_optional("global.nat_keepalive", profile.nat_keepalive)
            .set_value("global.rsa_pss", Flag(flags.contains(ProfileFlags::RSA_PSS)))
            .set_value("global.crl", Flag(!flags.contains(ProfileFlags::DISABLE_CRL)))
            .set_value("global.ocsp", Flag(!flags.contains(ProfileFlags::DISABLE_OCSP)))
            .set_value("connection.type", profile.vpn_type.identifier())
            .set_value("connection.server", profile.gateway.as_str())
            .set_optional("connection.port", profile.port)
            .set_optional("connection.username", profile.username.as_deref())
            .set_optional("connection.password", profile.password.as_deref())
            .set_optional("connection.local_id", profile.local_id.as_deref())
            .set_optional("connection.remote_id", profile.remote_id.as_deref())
            .set_value("connection.certreq", Flag(!flags.contains(ProfileFlags::SUPPRESS_CERT_REQS)))
            .set_value("connection.strict_revocation", Flag(flags.contains(ProfileFlags::STRICT_REVOCATION)))
            .set_optional("connection.ike_proposal", profile.ike_proposal.as_deref())
            .set_optional("connection.esp_proposal", profile.esp_proposal.as_deref());
        writer
    }
}

impl Display for SettingsWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.values {
            f.write_str(key)?;
            f.write_str("=\"")?;
            for c in value.chars() {
                if matches!(c, '"' | '\\') {
                    f.write_char('\\')?;
                }
                f.write_char(c)?;
            }
            f.write_str("\"\n")?;
        }
        Ok(())
    }
}
