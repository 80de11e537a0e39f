//! Shared test harness for E2E integration tests.
//!
//! `FakeBroker` terminates TLS with a certificate from `BrokerPki` and
//! speaks just enough MQTT 3.1.1 to accept one client, answer its
//! CONNECT and record what it publishes, so the real rumqttc session is
//! exercised over a loopback socket.

#![allow(dead_code)]

use std::io::Write;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use rcgen::{
    BasicConstraints, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa, KeyPair,
    KeyUsagePurpose, SanType,
};
use rustls::ProtocolVersion;
use rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};
use tempfile::NamedTempFile;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_rustls::TlsAcceptor;

use tc_cloud_provider::WatsonSettings;
use tc_protocol::{
    AccelerationEvent, DataSample, EventDataSample, Orientation, SensorDataSample,
};

pub const DEVICE_ID: &str = "d:org1:smartag:0080e1";
pub const AUTH_TOKEN: &str = "s3cr3t-token";

/// CONNACK return codes (MQTT 3.1.1).
pub const CONNACK_ACCEPTED: u8 = 0x00;
pub const CONNACK_NOT_AUTHORIZED: u8 = 0x05;

/// How long a test waits for the broker to see something.
const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

// ── Certificates ──────────────────────────────────────────────

/// A throwaway CA, written to a PEM file, and a server config whose
/// certificate for 127.0.0.1 is signed by it.
pub struct BrokerPki {
    ca_bundle: NamedTempFile,
    server: Arc<rustls::ServerConfig>,
}

impl BrokerPki {
    pub fn generate() -> Self {
        let ca_key = KeyPair::generate().unwrap();
        let mut ca_params = CertificateParams::default();
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        ca_params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
        ca_params
            .distinguished_name
            .push(DnType::CommonName, "TagCloud Test CA");
        let ca = ca_params.self_signed(&ca_key).unwrap();

        let leaf_key = KeyPair::generate().unwrap();
        let mut leaf_params = CertificateParams::default();
        leaf_params.subject_alt_names = vec![SanType::IpAddress(IpAddr::V4(Ipv4Addr::LOCALHOST))];
        leaf_params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
        leaf_params
            .distinguished_name
            .push(DnType::CommonName, "fake-broker");
        let leaf = leaf_params.signed_by(&leaf_key, &ca, &ca_key).unwrap();

        let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(leaf_key.serialize_der()));
        let server = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(vec![leaf.der().clone()], key)
            .unwrap();

        let mut ca_bundle = NamedTempFile::new().unwrap();
        ca_bundle.write_all(ca.pem().as_bytes()).unwrap();

        Self {
            ca_bundle,
            server: Arc::new(server),
        }
    }

    /// Path of the PEM file holding this CA.
    pub fn ca_cert_path(&self) -> String {
        self.ca_bundle.path().to_str().unwrap().to_string()
    }
}

// ── Broker ────────────────────────────────────────────────────

/// Fields of a CONNECT packet the tests care about.
#[derive(Debug, Clone)]
pub struct ConnectPacket {
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub clean_session: bool,
    pub keep_alive: u16,
    /// TLS version negotiated for the connection carrying it.
    pub tls_version: Option<ProtocolVersion>,
}

/// Something the broker received or did.
#[derive(Debug)]
pub enum BrokerEvent {
    /// The client gave up on the TLS handshake.
    HandshakeFailed(String),
    Connect(ConnectPacket),
    Publish {
        topic: String,
        qos: u8,
        payload: Vec<u8>,
    },
    Disconnect,
    /// The broker closed the connection on its own.
    Dropped,
}

/// How the broker answers CONNECT.
#[derive(Debug, Clone, Copy)]
enum Script {
    Answer(u8),
    Silent,
    AcceptThenDrop,
}

pub struct FakeBroker {
    pub port: u16,
    events: mpsc::UnboundedReceiver<BrokerEvent>,
}

impl FakeBroker {
    /// Accept one client and answer its CONNECT with `return_code`.
    pub async fn start(pki: &BrokerPki, return_code: u8) -> Self {
        Self::spawn(pki, Script::Answer(return_code)).await
    }

    /// Accept one client and never answer its CONNECT.
    pub async fn silent(pki: &BrokerPki) -> Self {
        Self::spawn(pki, Script::Silent).await
    }

    /// Accept one client, then close the connection right after CONNACK.
    pub async fn dropping(pki: &BrokerPki) -> Self {
        Self::spawn(pki, Script::AcceptThenDrop).await
    }

    async fn spawn(pki: &BrokerPki, script: Script) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let acceptor = TlsAcceptor::from(pki.server.clone());
        let (tx, events) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let Ok((tcp, _)) = listener.accept().await else {
                return;
            };
            match acceptor.accept(tcp).await {
                Ok(stream) => {
                    let version = stream.get_ref().1.protocol_version();
                    serve(stream, version, script, tx).await;
                }
                Err(e) => {
                    let _ = tx.send(BrokerEvent::HandshakeFailed(e.to_string()));
                }
            }
        });

        Self { port, events }
    }

    pub fn url(&self) -> String {
        format!("ssl://127.0.0.1:{}", self.port)
    }

    /// Next event, failing the test after a few seconds of silence.
    pub async fn next_event(&mut self) -> BrokerEvent {
        tokio::time::timeout(EVENT_TIMEOUT, self.events.recv())
            .await
            .expect("timed out waiting for broker event")
            .expect("broker task ended")
    }

    /// Wait for the client's CONNECT.
    pub async fn expect_connect(&mut self) -> ConnectPacket {
        match self.next_event().await {
            BrokerEvent::Connect(connect) => connect,
            other => panic!("expected CONNECT, got {other:?}"),
        }
    }

    /// Wait for the next PUBLISH, returning (topic, qos, payload).
    pub async fn expect_publish(&mut self) -> (String, u8, Vec<u8>) {
        match self.next_event().await {
            BrokerEvent::Publish {
                topic,
                qos,
                payload,
            } => (topic, qos, payload),
            other => panic!("expected PUBLISH, got {other:?}"),
        }
    }
}

async fn serve<S>(
    mut stream: S,
    tls_version: Option<ProtocolVersion>,
    script: Script,
    tx: mpsc::UnboundedSender<BrokerEvent>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    while let Ok((header, body)) = read_packet(&mut stream).await {
        match header >> 4 {
            // CONNECT
            1 => {
                let mut connect = parse_connect(&body);
                connect.tls_version = tls_version;
                let _ = tx.send(BrokerEvent::Connect(connect));

                let code = match script {
                    Script::Silent => continue,
                    Script::Answer(code) => code,
                    Script::AcceptThenDrop => CONNACK_ACCEPTED,
                };
                if send(&mut stream, &[0x20, 0x02, 0x00, code]).await.is_err() {
                    return;
                }
                if code != CONNACK_ACCEPTED {
                    return;
                }
                if matches!(script, Script::AcceptThenDrop) {
                    drop(stream);
                    let _ = tx.send(BrokerEvent::Dropped);
                    return;
                }
            }
            // PUBLISH
            3 => {
                let qos = (header >> 1) & 0x03;
                let mut pos = 0;
                let topic = String::from_utf8(read_field(&body, &mut pos)).unwrap();
                if qos > 0 {
                    pos += 2; // packet id
                }
                let _ = tx.send(BrokerEvent::Publish {
                    topic,
                    qos,
                    payload: body[pos..].to_vec(),
                });
            }
            // PINGREQ
            12 => {
                if send(&mut stream, &[0xD0, 0x00]).await.is_err() {
                    return;
                }
            }
            // DISCONNECT
            14 => {
                let _ = tx.send(BrokerEvent::Disconnect);
                return;
            }
            _ => {}
        }
    }
}

async fn send<S: AsyncWrite + Unpin>(stream: &mut S, bytes: &[u8]) -> std::io::Result<()> {
    stream.write_all(bytes).await?;
    stream.flush().await
}

/// Read one packet: (first header byte, body after the remaining length).
async fn read_packet<S: AsyncRead + Unpin>(stream: &mut S) -> std::io::Result<(u8, Vec<u8>)> {
    let header = stream.read_u8().await?;

    let mut remaining = 0usize;
    let mut shift = 0;
    loop {
        let byte = stream.read_u8().await?;
        remaining |= usize::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
    }

    let mut body = vec![0; remaining];
    stream.read_exact(&mut body).await?;
    Ok((header, body))
}

/// Length-prefixed field starting at `pos`.
fn read_field(buf: &[u8], pos: &mut usize) -> Vec<u8> {
    let len = usize::from(u16::from_be_bytes([buf[*pos], buf[*pos + 1]]));
    *pos += 2;
    let field = buf[*pos..*pos + len].to_vec();
    *pos += len;
    field
}

fn parse_connect(body: &[u8]) -> ConnectPacket {
    let mut pos = 0;
    let _protocol_name = read_field(body, &mut pos);
    let _level = body[pos];
    let flags = body[pos + 1];
    let keep_alive = u16::from_be_bytes([body[pos + 2], body[pos + 3]]);
    pos += 4;

    let client_id = String::from_utf8(read_field(body, &mut pos)).unwrap();
    if flags & 0x04 != 0 {
        read_field(body, &mut pos); // will topic
        read_field(body, &mut pos); // will message
    }
    let username = (flags & 0x80 != 0)
        .then(|| String::from_utf8(read_field(body, &mut pos)).unwrap());
    let password = (flags & 0x40 != 0)
        .then(|| String::from_utf8(read_field(body, &mut pos)).unwrap());

    ConnectPacket {
        client_id,
        username,
        password,
        clean_session: flags & 0x02 != 0,
        keep_alive,
        tls_version: None,
    }
}

// ── Fixtures ──────────────────────────────────────────────────

/// Port with nothing listening on it.
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// Settings pointing at `url` with events topic `events_topic`. The
/// trust anchor path is left empty, which only mock connectors accept.
pub fn settings_for(url: &str, events_topic: &str) -> WatsonSettings {
    WatsonSettings {
        connection_url: url.to_string(),
        device_id: DEVICE_ID.to_string(),
        auth_token: AUTH_TOKEN.to_string(),
        events_topic: events_topic.to_string(),
        ca_cert_path: String::new(),
        keepalive_secs: 30,
        connect_timeout_secs: 5,
    }
}

/// Settings for `broker`, trusting the CA of `pki`.
pub fn tls_settings(broker: &FakeBroker, pki: &BrokerPki, events_topic: &str) -> WatsonSettings {
    WatsonSettings {
        ca_cert_path: pki.ca_cert_path(),
        ..settings_for(&broker.url(), events_topic)
    }
}

/// `n` samples alternating sensor readings and tilt events, oldest first.
pub fn mixed_samples(n: usize) -> Vec<DataSample> {
    (0..n)
        .map(|i| {
            let date = Utc.timestamp_opt(1_700_000_000 + i as i64 * 60, 0).unwrap();
            if i % 2 == 0 {
                DataSample::Sensor(SensorDataSample {
                    date,
                    temperature: Some(18.0 + i as f32 * 0.5),
                    humidity: Some(45.0),
                    pressure: Some(1012.5),
                    acceleration: None,
                })
            } else {
                DataSample::Event(EventDataSample {
                    date,
                    acceleration: Some(950.0),
                    events: vec![AccelerationEvent::Tilt],
                    current_orientation: Some(Orientation::Left),
                })
            }
        })
        .collect()
}
