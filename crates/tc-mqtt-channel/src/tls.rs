//! TLS 1.2 transport for broker connections.
//!
//! Loads the trust-anchor bundle (PEM) into a rustls root store and
//! hands rumqttc a client config pinned to TLS 1.2. Before building,
//! a best-effort step makes sure a crypto provider is installed.

use std::sync::{Arc, OnceLock};

use rumqttc::{TlsConfiguration, Transport};
use rustls::crypto::{CryptoProvider, ring};
use rustls::{ClientConfig, RootCertStore, SupportedCipherSuite};

use crate::config::MqttConfig;
use crate::error::{MqttError, MqttResult};

static CRYPTO_PROVIDER: OnceLock<Arc<CryptoProvider>> = OnceLock::new();

/// Outcome of the crypto provider pre-step. Never fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderStatus {
    /// The bundled ring provider was installed by this call.
    Installed,
    /// A provider was already in place and is kept.
    AlreadyInstalled,
    /// The installed provider has no TLS 1.2 cipher suite.
    Degraded,
}

/// Install `provider` as the process-wide crypto provider.
///
/// If one is already installed it is kept, and `provider` is handed back
/// in the error.
pub fn install_crypto_provider(provider: CryptoProvider) -> Result<(), Arc<CryptoProvider>> {
    CRYPTO_PROVIDER.set(Arc::new(provider))
}

/// Install the ring provider if nothing is installed yet.
pub fn update_crypto_provider() -> ProviderStatus {
    let installed = install_crypto_provider(ring::default_provider()).is_ok();
    let status = classify_provider(&crypto_provider().cipher_suites, installed);
    match status {
        ProviderStatus::Installed => tracing::debug!("installed ring crypto provider"),
        ProviderStatus::AlreadyInstalled => tracing::debug!("crypto provider already installed"),
        ProviderStatus::Degraded => {
            tracing::warn!("installed crypto provider offers no TLS 1.2 suite, continuing")
        }
    }
    status
}

fn crypto_provider() -> Arc<CryptoProvider> {
    CRYPTO_PROVIDER
        .get_or_init(|| Arc::new(ring::default_provider()))
        .clone()
}

fn classify_provider(suites: &[SupportedCipherSuite], installed: bool) -> ProviderStatus {
    let tls12 = suites
        .iter()
        .any(|suite| matches!(suite, SupportedCipherSuite::Tls12(_)));
    match (tls12, installed) {
        (false, _) => ProviderStatus::Degraded,
        (true, true) => ProviderStatus::Installed,
        (true, false) => ProviderStatus::AlreadyInstalled,
    }
}

/// Load every certificate of a PEM bundle as a trust anchor.
pub fn load_trust_store(pem: &[u8]) -> MqttResult<RootCertStore> {
    let mut reader = pem;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| MqttError::Tls(format!("failed to parse trust anchor bundle: {e}")))?;
    if certs.is_empty() {
        return Err(MqttError::Tls(
            "no certificates in trust anchor bundle".into(),
        ));
    }

    let mut roots = RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(certs);
    if added == 0 {
        return Err(MqttError::Tls(format!(
            "none of {ignored} certificates is a usable trust anchor"
        )));
    }
    if ignored > 0 {
        tracing::warn!(added, ignored, "skipped unparsable trust anchors");
    }
    Ok(roots)
}

/// Build a TLS 1.2 client config trusting only `roots`.
pub fn client_config(roots: RootCertStore) -> MqttResult<ClientConfig> {
    let config = ClientConfig::builder_with_provider(crypto_provider())
        .with_protocol_versions(&[&rustls::version::TLS12])
        .map_err(|e| MqttError::Tls(format!("TLS 1.2 unavailable: {e}")))?
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(config)
}

/// Build a TLS transport from the trust-anchor bundle in the config.
pub fn load_tls_transport(config: &MqttConfig) -> MqttResult<Transport> {
    update_crypto_provider();

    let pem = std::fs::read(&config.ca_cert_path).map_err(|e| {
        MqttError::Tls(format!(
            "failed to read CA bundle '{}': {e}",
            config.ca_cert_path
        ))
    })?;
    let roots = load_trust_store(&pem)?;
    let client = client_config(roots)?;

    Ok(Transport::tls_with_config(TlsConfiguration::Rustls(
        Arc::new(client),
    )))
}

/// Plain TCP transport, for `tcp://` brokers opened through `MqttConnector`.
pub fn plaintext_transport() -> Transport {
    Transport::Tcp
}
