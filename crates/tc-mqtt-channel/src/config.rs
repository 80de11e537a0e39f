use serde::Deserialize;

use crate::error::{MqttError, MqttResult};

/// MQTT session configuration, loadable from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    /// Broker URL, e.g. `ssl://org.messaging.internetofthings.ibmcloud.com:8883`.
    pub broker_url: String,
    /// MQTT client ID (unique per device).
    pub client_id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Start without any stored session state.
    #[serde(default = "default_clean_session")]
    pub clean_session: bool,
    /// Path to the trust-anchor bundle (PEM). Only read for TLS brokers.
    #[serde(default)]
    pub ca_cert_path: String,
    /// Keep-alive interval in seconds.
    #[serde(default = "default_keepalive")]
    pub keepalive_secs: u16,
    /// Upper bound on waiting for the broker's CONNACK.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_clean_session() -> bool {
    true
}

fn default_keepalive() -> u16 {
    60
}

fn default_connect_timeout() -> u64 {
    30
}

/// Broker endpoint parsed from [`MqttConfig::broker_url`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

impl MqttConfig {
    /// Parse the broker URL.
    ///
    /// Accepts `ssl://`, `mqtts://` and `tls://` for TLS (default port 8883)
    /// and `tcp://`, `mqtt://` or no scheme for plaintext (default port 1883).
    /// IPv6 hosts are written in brackets, `ssl://[::1]:8883`.
    pub fn broker(&self) -> MqttResult<BrokerAddress> {
        let url = self.broker_url.trim();
        let (scheme, rest) = match url.find("://") {
            Some(pos) => (&url[..pos], &url[pos + 3..]),
            None => ("tcp", url),
        };

        let tls = match scheme.to_ascii_lowercase().as_str() {
            "ssl" | "mqtts" | "tls" => true,
            "tcp" | "mqtt" => false,
            other => {
                return Err(MqttError::Config(format!(
                    "unsupported broker scheme '{other}' in '{url}'"
                )));
            }
        };

        let rest = rest.trim_end_matches('/');
        let default_port = if tls { 8883 } else { 1883 };
        let (host, port) = match rest.strip_prefix('[') {
            // IPv6 literal, `[addr]` or `[addr]:port`.
            Some(bracketed) => {
                let (host, after) = bracketed.split_once(']').ok_or_else(|| {
                    MqttError::Config(format!("unterminated IPv6 literal in broker URL '{url}'"))
                })?;
                let port = match after {
                    "" => default_port,
                    _ => match after.strip_prefix(':') {
                        Some(port) => parse_port(port, url)?,
                        None => {
                            return Err(MqttError::Config(format!(
                                "unexpected '{after}' after IPv6 literal in '{url}'"
                            )));
                        }
                    },
                };
                (host, port)
            }
            None => match rest.rfind(':') {
                Some(pos) => (&rest[..pos], parse_port(&rest[pos + 1..], url)?),
                None => (rest, default_port),
            },
        };

        if host.is_empty() {
            return Err(MqttError::Config(format!(
                "missing host in broker URL '{url}'"
            )));
        }

        Ok(BrokerAddress {
            host: host.to_string(),
            port,
            tls,
        })
    }

    /// Reject settings rumqttc would panic on or that make no sense.
    pub fn validate(&self) -> MqttResult<()> {
        if self.client_id.is_empty() || self.client_id.starts_with(char::is_whitespace) {
            return Err(MqttError::Config(format!(
                "invalid client id '{}'",
                self.client_id
            )));
        }
        if self.keepalive_secs < 5 {
            return Err(MqttError::Config(format!(
                "keep-alive must be at least 5s, got {}s",
                self.keepalive_secs
            )));
        }
        if self.connect_timeout_secs == 0 {
            return Err(MqttError::Config("connect timeout must be non-zero".into()));
        }
        self.broker().map(|_| ())
    }
}

fn parse_port(port: &str, url: &str) -> MqttResult<u16> {
    port.parse()
        .map_err(|_| MqttError::Config(format!("invalid port in broker URL '{url}'")))
}
