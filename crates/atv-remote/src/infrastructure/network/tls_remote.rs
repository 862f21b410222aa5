//! Android TV remote protocol v2 over mutual TLS.
//!
//! Two TLS channels are involved, both authenticated with the persisted
//! client certificate from [`CredentialStore`]:
//!
//! | Port | Channel | Lifetime                                       |
//! |------|---------|------------------------------------------------|
//! | 6467 | pairing | one code exchange, then closed                 |
//! | 6466 | remote  | kept open; re-established after a drop          |
//!
//! Every message on both channels is a varint-length-prefixed protobuf
//! frame (see `atv_core::protocol::framing`).
//!
//! # Pairing exchange
//!
//! ```text
//! client                                TV
//!   PairingRequest ─────────────────────►
//!                  ◄───────────────────── PairingRequestAck
//!   Options (hex, 6 symbols, input) ────►
//!                  ◄───────────────────── Options
//!   Configuration ──────────────────────►
//!                  ◄───────────────────── ConfigurationAck   (code shown on TV)
//!   Secret ─────────────────────────────►
//!                  ◄───────────────────── SecretAck
//! ```
//!
//! # Remote channel
//!
//! The TV opens with `RemoteConfigure` (carrying its vendor and model) and
//! then `RemoteSetActive`; both are answered.  Afterwards the TV pushes
//! power, current-app and volume changes and pings periodically.  A reader
//! task answers pings, publishes pushes as [`RemoteUpdate`]s and, once
//! `keep_reconnecting` is enabled, re-establishes the channel every
//! `reconnect_interval` after a drop.
//!
//! The server certificate is not validated against any CA: Android TV
//! devices present self-signed certificates, and the pairing secret binds
//! both public keys instead.

use std::io;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use atv_core::protocol::framing::{decode_varint, encode_frame, MAX_FRAME_LEN};
use atv_core::protocol::pairing::{derive_secret, OuterMessage, PairingStatus, RsaPublicComponents};
use atv_core::protocol::remote::RemoteMessage;
use atv_core::{KeyMapper, RemoteError, RemoteKey};
use prost::Message;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::{self, pki_types::ServerName, ClientConfig};
use tokio_rustls::TlsConnector;
use tracing::{debug, info, warn};

use crate::application::pair_remote::{
    DeviceInfo, RemoteConnector, RemoteSession, RemoteUpdate, VolumeInfo,
};
use crate::infrastructure::network::credential::{rsa_components, CredentialStore};

/// Service name sent in `PairingRequest`.
pub const PAIRING_SERVICE_NAME: &str = "atvremote";

type RemoteStream = TlsStream<TcpStream>;

/// Connection parameters shared by every session.
#[derive(Debug, Clone)]
pub struct TlsRemoteConfig {
    pub pairing_port: u16,
    pub remote_port: u16,
    pub client_name: String,
    pub reconnect_interval: Duration,
    /// Bound on each connect and each awaited reply.
    pub io_timeout: Duration,
}

impl Default for TlsRemoteConfig {
    fn default() -> Self {
        Self {
            pairing_port: 6467,
            remote_port: 6466,
            client_name: "Android TV Remote".to_string(),
            reconnect_interval: Duration::from_secs(5),
            io_timeout: Duration::from_secs(10),
        }
    }
}

// ── Connector ─────────────────────────────────────────────────────────────────

pub struct TlsRemoteConnector {
    store: Arc<CredentialStore>,
    config: TlsRemoteConfig,
}

impl TlsRemoteConnector {
    pub fn new(store: Arc<CredentialStore>, config: TlsRemoteConfig) -> Self {
        Self { store, config }
    }
}

impl RemoteConnector for TlsRemoteConnector {
    fn open(&self, address: &str) -> Arc<dyn RemoteSession> {
        Arc::new(TlsRemoteSession::new(
            address,
            Arc::clone(&self.store),
            self.config.clone(),
        ))
    }
}

// ── Session ───────────────────────────────────────────────────────────────────

struct PairingChannel {
    stream: RemoteStream,
    client: RsaPublicComponents,
    server: RsaPublicComponents,
}

struct SessionInner {
    address: String,
    store: Arc<CredentialStore>,
    config: TlsRemoteConfig,
    writer: Mutex<Option<WriteHalf<RemoteStream>>>,
    keep_reconnecting: AtomicBool,
    closed: AtomicBool,
    updates: broadcast::Sender<RemoteUpdate>,
}

pub struct TlsRemoteSession {
    inner: Arc<SessionInner>,
    pairing: Mutex<Option<PairingChannel>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl TlsRemoteSession {
    pub fn new(address: &str, store: Arc<CredentialStore>, config: TlsRemoteConfig) -> Self {
        let (updates, _) = broadcast::channel(32);
        Self {
            inner: Arc::new(SessionInner {
                address: address.to_string(),
                store,
                config,
                writer: Mutex::new(None),
                keep_reconnecting: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                updates,
            }),
            pairing: Mutex::new(None),
            reader: Mutex::new(None),
        }
    }
}

#[async_trait]
impl RemoteSession for TlsRemoteSession {
    fn has_credential(&self) -> bool {
        self.inner.store.exists()
    }

    async fn ensure_credential(&self) -> Result<bool, RemoteError> {
        let store = Arc::clone(&self.inner.store);
        // RSA key generation takes long enough to stall a runtime worker.
        tokio::task::spawn_blocking(move || store.ensure())
            .await
            .map_err(|e| RemoteError::Unknown(format!("credential task: {e}")))?
    }

    async fn start_pairing(&self) -> Result<(), RemoteError> {
        let channel = self.inner.open_pairing_channel().await?;
        *self.pairing.lock().await = Some(channel);
        Ok(())
    }

    async fn finish_pairing(&self, code: &str) -> Result<(), RemoteError> {
        let mut slot = self.pairing.lock().await;
        if slot.is_none() {
            *slot = Some(self.inner.open_pairing_channel().await?);
        }
        let Some(channel) = slot.as_mut() else {
            return Err(RemoteError::NotConnected);
        };

        // A checksum mismatch is caught here, before anything is sent.
        let secret = derive_secret(&channel.client, &channel.server, code)?;

        let address = self.inner.address.as_str();
        let timeout = self.inner.config.io_timeout;
        let outcome = async {
            write_frame(&mut channel.stream, &OuterMessage::secret(secret), address).await?;
            loop {
                let reply = next_pairing_message(&mut channel.stream, address, timeout).await?;
                if reply.pairing_secret_ack.is_some() {
                    return Ok(());
                }
            }
        }
        .await;

        match outcome {
            Ok(()) => {
                info!("pairing with {address} complete");
                if let Some(mut channel) = slot.take() {
                    let _ = channel.stream.shutdown().await;
                }
                Ok(())
            }
            Err(e) => {
                // The TV ends the pairing session on a rejected secret.
                // Reopen now so a fresh code is on screen for the next prompt.
                *slot = None;
                if matches!(e, RemoteError::InvalidPairingCode(_)) {
                    *slot = Some(self.inner.open_pairing_channel().await?);
                }
                Err(e)
            }
        }
    }

    async fn connect(&self) -> Result<(), RemoteError> {
        self.inner.closed.store(false, Ordering::SeqCst);
        let reader = self.inner.handshake().await?;
        let task = tokio::spawn(run_reader(Arc::clone(&self.inner), reader));
        if let Some(previous) = self.reader.lock().await.replace(task) {
            previous.abort();
        }
        Ok(())
    }

    fn keep_reconnecting(&self) {
        self.inner.keep_reconnecting.store(true, Ordering::SeqCst);
    }

    async fn send_key(&self, key_name: &str) -> Result<(), RemoteError> {
        let key = RemoteKey::from_name(key_name)
            .ok_or_else(|| RemoteError::UnknownKey(key_name.to_string()))?;
        let message = RemoteMessage::key_press(KeyMapper::to_android_keycode(key));
        self.inner.send(&message).await
    }

    fn updates(&self) -> broadcast::Receiver<RemoteUpdate> {
        self.inner.updates.subscribe()
    }

    async fn disconnect(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.keep_reconnecting.store(false, Ordering::SeqCst);
        if let Some(task) = self.reader.lock().await.take() {
            task.abort();
        }
        if let Some(mut writer) = self.inner.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
        if let Some(mut channel) = self.pairing.lock().await.take() {
            let _ = channel.stream.shutdown().await;
        }
    }
}

impl SessionInner {
    async fn open_tls(&self, port: u16) -> Result<(RemoteStream, RsaPublicComponents), RemoteError> {
        let identity = self.store.load()?;
        let config = ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert))
            .with_client_auth_cert(identity.certs.clone(), identity.key())
            .map_err(|e| RemoteError::CredentialIo {
                path: self.store.cert_path().display().to_string(),
                reason: e.to_string(),
            })?;

        let ip: IpAddr = self
            .address
            .parse()
            .map_err(|_| RemoteError::cannot_connect(&self.address, "not an IP address"))?;
        let timeout = self.config.io_timeout;

        let tcp = tokio::time::timeout(timeout, TcpStream::connect((ip, port)))
            .await
            .map_err(|_| RemoteError::Timeout(format!("TCP connect to {ip}:{port}")))?
            .map_err(|e| classify_io(&self.address, e))?;

        let connector = TlsConnector::from(Arc::new(config));
        let stream = tokio::time::timeout(timeout, connector.connect(ServerName::IpAddress(ip.into()), tcp))
            .await
            .map_err(|_| RemoteError::Timeout(format!("TLS handshake with {ip}:{port}")))?
            .map_err(|e| classify_io(&self.address, e))?;

        debug!("TLS session established with {ip}:{port}");
        Ok((stream, identity.public))
    }

    async fn open_pairing_channel(&self) -> Result<PairingChannel, RemoteError> {
        let (mut stream, client) = self.open_tls(self.config.pairing_port).await?;
        let server_der = stream
            .get_ref()
            .1
            .peer_certificates()
            .and_then(|chain| chain.first())
            .map(|c| c.as_ref().to_vec())
            .ok_or_else(|| RemoteError::Unknown("TV presented no certificate".into()))?;
        let server = rsa_components(&server_der).map_err(RemoteError::Unknown)?;

        let address = self.address.as_str();
        let timeout = self.config.io_timeout;
        write_frame(
            &mut stream,
            &OuterMessage::pairing_request(PAIRING_SERVICE_NAME, &self.config.client_name),
            address,
        )
        .await?;

        loop {
            let incoming = next_pairing_message(&mut stream, address, timeout).await?;
            match pairing_reply(&incoming) {
                PairingStep::Send(reply) => write_frame(&mut stream, &reply, address).await?,
                PairingStep::AwaitCode => break,
                PairingStep::Ignore => debug!("unexpected pairing message from {address}"),
            }
        }

        info!("{address} is showing a pairing code");
        Ok(PairingChannel {
            stream,
            client,
            server,
        })
    }

    /// Opens the remote channel and completes the configure exchange.
    async fn handshake(&self) -> Result<ReadHalf<RemoteStream>, RemoteError> {
        let (stream, _) = self.open_tls(self.config.remote_port).await?;
        let (mut reader, writer) = tokio::io::split(stream);
        *self.writer.lock().await = Some(writer);

        let address = self.address.as_str();
        let timeout = self.config.io_timeout;
        loop {
            let message: RemoteMessage = tokio::time::timeout(timeout, read_frame(&mut reader, address))
                .await
                .map_err(|_| RemoteError::Timeout(format!("remote configure from {address}")))??;
            let configured = message.remote_configure.is_some();
            self.handle(message).await?;
            if configured {
                break;
            }
        }
        info!("remote channel to {address} ready");
        Ok(reader)
    }

    async fn handle(&self, message: RemoteMessage) -> Result<(), RemoteError> {
        let outcome = interpret(&message, &self.config.client_name);
        for update in outcome.updates {
            // No receivers is fine.
            let _ = self.updates.send(update);
        }
        if let Some(reply) = outcome.reply {
            self.send(&reply).await?;
        }
        Ok(())
    }

    async fn send(&self, message: &RemoteMessage) -> Result<(), RemoteError> {
        let mut writer = self.writer.lock().await;
        let stream = writer.as_mut().ok_or(RemoteError::NotConnected)?;
        write_frame(stream, message, &self.address).await
    }
}

/// Pumps the remote channel; reconnects after a drop when enabled.
async fn run_reader(inner: Arc<SessionInner>, mut reader: ReadHalf<RemoteStream>) {
    loop {
        let error = loop {
            let message: RemoteMessage = match read_frame(&mut reader, &inner.address).await {
                Ok(m) => m,
                Err(e) => break e,
            };
            if let Err(e) = inner.handle(message).await {
                break e;
            }
        };

        if inner.closed.load(Ordering::SeqCst) {
            return;
        }
        warn!("remote channel to {} lost: {error}", inner.address);
        inner.writer.lock().await.take();
        let _ = inner.updates.send(RemoteUpdate::Availability(false));
        if !inner.keep_reconnecting.load(Ordering::SeqCst) {
            return;
        }

        reader = loop {
            tokio::time::sleep(inner.config.reconnect_interval).await;
            if inner.closed.load(Ordering::SeqCst) {
                return;
            }
            match inner.handshake().await {
                Ok(r) => break r,
                Err(e) => debug!("reconnect to {} failed: {e}", inner.address),
            }
        };
        info!("remote channel to {} re-established", inner.address);
        let _ = inner.updates.send(RemoteUpdate::Availability(true));
    }
}

// ── Message handling ──────────────────────────────────────────────────────────

enum PairingStep {
    Send(OuterMessage),
    AwaitCode,
    Ignore,
}

fn pairing_reply(incoming: &OuterMessage) -> PairingStep {
    if incoming.pairing_request_ack.is_some() {
        PairingStep::Send(OuterMessage::hex_code_options())
    } else if incoming.pairing_option.is_some() {
        PairingStep::Send(OuterMessage::hex_code_configuration())
    } else if incoming.pairing_configuration_ack.is_some() {
        PairingStep::AwaitCode
    } else {
        PairingStep::Ignore
    }
}

/// What to do with one remote-channel message.
#[derive(Debug, Default, PartialEq)]
struct Interpretation {
    reply: Option<RemoteMessage>,
    updates: Vec<RemoteUpdate>,
}

fn interpret(message: &RemoteMessage, client_name: &str) -> Interpretation {
    let mut out = Interpretation::default();

    if let Some(configure) = &message.remote_configure {
        if let Some(info) = &configure.device_info {
            out.updates.push(RemoteUpdate::DeviceInfo(DeviceInfo {
                manufacturer: info.vendor.clone(),
                model: info.model.clone(),
            }));
        }
        out.reply = Some(RemoteMessage::configure(
            client_name,
            "atv-remote",
            PAIRING_SERVICE_NAME,
            env!("CARGO_PKG_VERSION"),
        ));
    } else if message.remote_set_active.is_some() {
        out.reply = Some(RemoteMessage::set_active());
    } else if let Some(ping) = &message.remote_ping_request {
        out.reply = Some(RemoteMessage::ping_response(ping.val1));
    }

    if let Some(start) = &message.remote_start {
        out.updates.push(RemoteUpdate::PowerState(start.started));
    }
    if let Some(app) = message
        .remote_ime_key_inject
        .as_ref()
        .and_then(|ime| ime.app_info.as_ref())
        .filter(|app| !app.app_package.is_empty())
    {
        out.updates.push(RemoteUpdate::CurrentApp(app.app_package.clone()));
    }
    if let Some(volume) = &message.remote_set_volume_level {
        out.updates.push(RemoteUpdate::Volume(VolumeInfo {
            level: volume.volume_level,
            max: volume.volume_max,
            muted: volume.volume_muted,
        }));
    }
    if message.remote_error.is_some() {
        warn!("TV reported a remote error");
    }
    out
}

// ── Framing over streams ──────────────────────────────────────────────────────

async fn write_frame<W, M>(stream: &mut W, message: &M, address: &str) -> Result<(), RemoteError>
where
    W: AsyncWrite + Unpin,
    M: Message,
{
    let frame = encode_frame(message);
    stream
        .write_all(&frame)
        .await
        .map_err(|e| classify_io(address, e))?;
    stream.flush().await.map_err(|e| classify_io(address, e))
}

async fn read_frame<R, M>(stream: &mut R, address: &str) -> Result<M, RemoteError>
where
    R: AsyncRead + Unpin,
    M: Message + Default,
{
    let mut prefix = Vec::with_capacity(4);
    let len = loop {
        let byte = stream.read_u8().await.map_err(|e| classify_io(address, e))?;
        prefix.push(byte);
        match decode_varint(&prefix) {
            Ok(Some((len, _))) => break len as usize,
            Ok(None) => continue,
            Err(e) => return Err(RemoteError::ConnectionClosed(format!("bad frame prefix: {e}"))),
        }
    };
    if len > MAX_FRAME_LEN {
        return Err(RemoteError::ConnectionClosed(format!("frame of {len} bytes")));
    }

    let mut body = vec![0u8; len];
    stream
        .read_exact(&mut body)
        .await
        .map_err(|e| classify_io(address, e))?;
    M::decode(body.as_slice()).map_err(|e| RemoteError::ConnectionClosed(format!("malformed frame: {e}")))
}

async fn next_pairing_message<S>(
    stream: &mut S,
    address: &str,
    timeout: Duration,
) -> Result<OuterMessage, RemoteError>
where
    S: AsyncRead + Unpin,
{
    let message: OuterMessage = tokio::time::timeout(timeout, read_frame(stream, address))
        .await
        .map_err(|_| RemoteError::Timeout(format!("pairing reply from {address}")))??;
    match message.status_code() {
        PairingStatus::Ok => Ok(message),
        PairingStatus::BadSecret => Err(RemoteError::InvalidPairingCode(
            "the TV rejected the code".into(),
        )),
        other => Err(RemoteError::Unknown(format!("pairing status {other:?}"))),
    }
}

/// Maps socket and TLS failures onto the error taxonomy.
fn classify_io(address: &str, error: io::Error) -> RemoteError {
    if let Some(tls) = error
        .get_ref()
        .and_then(|inner| inner.downcast_ref::<rustls::Error>())
    {
        return match tls {
            rustls::Error::AlertReceived(_)
            | rustls::Error::InvalidCertificate(_)
            | rustls::Error::NoCertificatesPresented => {
                RemoteError::InvalidCredential(tls.to_string())
            }
            other => RemoteError::cannot_connect(address, other),
        };
    }
    match error.kind() {
        io::ErrorKind::UnexpectedEof
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe => RemoteError::ConnectionClosed(error.to_string()),
        io::ErrorKind::TimedOut => RemoteError::Timeout(format!("{address}: {error}")),
        _ => RemoteError::cannot_connect(address, error),
    }
}

// ── Certificate verifier ──────────────────────────────────────────────────────

#[derive(Debug)]
struct AcceptAnyServerCert;

impl rustls::client::danger::ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
        ]
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
