//! Transport sessions
//!
//! A [`TransportSession`] wraps the single active connection, either a legacy
//! byte stream or an attribute channel, behind one send/receive/close
//! contract.
//!
//! Legacy sessions own a read task bound to the session's lifetime. The task
//! forwards every completed read to the receive hook and stops when the
//! session signals shutdown; if the stream ends on its own it reports
//! `RadioEvent::StreamClosed` so the coordinator can tear the session down.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::device::{Device, TransportType};
use crate::error::{LinkError, LinkResult};
use crate::radio::{BoxedLinkStream, Radio, RadioEvent, RadioEventSender};

/// Size of a single legacy read
const READ_BUFFER_SIZE: usize = 1024;

/// Upper bound on shutting the write side down during close
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Called with every inbound payload
pub(crate) type ReceiveHook = Arc<dyn Fn(Vec<u8>) + Send + Sync>;

type SharedWriter = Arc<Mutex<WriteHalf<BoxedLinkStream>>>;

// ----------------------------------------------------------------------------
// Transport Session
// ----------------------------------------------------------------------------

/// The active connection to the current peer
pub struct TransportSession {
    device: Device,
    kind: SessionKind,
    receive: ReceiveHook,
}

enum SessionKind {
    Legacy(LegacySession),
    Attribute(AttributeSession),
}

struct LegacySession {
    writer: SharedWriter,
    /// Flipped to `true` on close; cancels writes in flight
    closing: watch::Sender<bool>,
    shutdown: Option<oneshot::Sender<()>>,
    reader: Option<JoinHandle<()>>,
    remote_closed: bool,
    closed: bool,
}

struct AttributeSession {
    radio: Arc<dyn Radio>,
    characteristic: Uuid,
    characteristic_found: bool,
    subscribed: bool,
    remote_closed: bool,
    closed: bool,
}

impl TransportSession {
    /// Wrap an opened stream and start its read task
    pub(crate) fn legacy(
        device: Device,
        stream: BoxedLinkStream,
        receive: ReceiveHook,
        signals: RadioEventSender,
    ) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (closing, _) = watch::channel(false);

        let handle = tokio::spawn(read_loop(
            device.address.clone(),
            reader,
            shutdown_rx,
            receive.clone(),
            signals,
        ));

        Self {
            device,
            kind: SessionKind::Legacy(LegacySession {
                writer: Arc::new(Mutex::new(writer)),
                closing,
                shutdown: Some(shutdown_tx),
                reader: Some(handle),
                remote_closed: false,
                closed: false,
            }),
            receive,
        }
    }

    /// Wrap a connected attribute channel
    ///
    /// Writes are refused until service discovery has located
    /// `characteristic`; notifications are dropped until it is subscribed.
    pub(crate) fn attribute(
        device: Device,
        radio: Arc<dyn Radio>,
        characteristic: Uuid,
        receive: ReceiveHook,
    ) -> Self {
        Self {
            device,
            kind: SessionKind::Attribute(AttributeSession {
                radio,
                characteristic,
                characteristic_found: false,
                subscribed: false,
                remote_closed: false,
                closed: false,
            }),
            receive,
        }
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn transport(&self) -> TransportType {
        match self.kind {
            SessionKind::Legacy(_) => TransportType::Legacy,
            SessionKind::Attribute(_) => TransportType::AttributeBased,
        }
    }

    /// Whether inbound data is currently being delivered
    pub fn is_receiving(&self) -> bool {
        match &self.kind {
            SessionKind::Legacy(legacy) => !legacy.closed,
            SessionKind::Attribute(attr) => attr.subscribed && !attr.closed,
        }
    }

    /// Send one payload to the peer
    pub async fn send(&self, payload: &[u8]) -> LinkResult<()> {
        self.writer()?.send(payload).await
    }

    /// A cloneable write handle usable without holding the session
    pub(crate) fn writer(&self) -> LinkResult<SessionWriter> {
        let address = self.device.address.clone();
        match &self.kind {
            SessionKind::Legacy(legacy) if !legacy.closed => Ok(SessionWriter::Legacy {
                address,
                writer: legacy.writer.clone(),
                closing: legacy.closing.subscribe(),
            }),
            SessionKind::Attribute(attr) if !attr.closed => {
                if !attr.characteristic_found {
                    return Err(LinkError::SendFailed(format!(
                        "characteristic {} not discovered on {}",
                        attr.characteristic, address
                    )));
                }
                Ok(SessionWriter::Attribute {
                    address,
                    radio: attr.radio.clone(),
                    characteristic: attr.characteristic,
                })
            }
            _ => Err(LinkError::NotConnected),
        }
    }

    /// Deliver an inbound payload from a hardware notification
    pub(crate) fn on_receive(&self, payload: Vec<u8>) {
        if payload.is_empty() {
            return;
        }
        if !self.is_receiving() {
            debug!(
                "Dropping {} bytes from {}: not subscribed",
                payload.len(),
                self.device.address
            );
            return;
        }
        (self.receive)(payload);
    }

    /// The attribute characteristic is present on the peer
    pub(crate) fn mark_characteristic_found(&mut self) {
        if let SessionKind::Attribute(attr) = &mut self.kind {
            attr.characteristic_found = true;
        }
    }

    /// Notifications for the attribute characteristic are enabled
    pub(crate) fn mark_subscribed(&mut self) {
        if let SessionKind::Attribute(attr) = &mut self.kind {
            attr.subscribed = true;
        }
    }

    /// The peer already tore the connection down
    pub(crate) fn mark_remote_closed(&mut self) {
        match &mut self.kind {
            SessionKind::Legacy(legacy) => legacy.remote_closed = true,
            SessionKind::Attribute(attr) => attr.remote_closed = true,
        }
    }

    /// Release the underlying handles
    ///
    /// Idempotent. Failures while releasing are logged and swallowed so that
    /// teardown always completes.
    pub async fn close(&mut self) {
        let address = self.device.address.clone();
        match &mut self.kind {
            SessionKind::Legacy(legacy) => {
                if legacy.closed {
                    return;
                }
                legacy.closed = true;

                // Pending writes give up the writer before it is shut down
                legacy.closing.send_replace(true);
                if let Some(shutdown) = legacy.shutdown.take() {
                    let _ = shutdown.send(());
                }
                if !legacy.remote_closed {
                    let writer = legacy.writer.clone();
                    let shutdown = async move { writer.lock().await.shutdown().await };
                    match tokio::time::timeout(CLOSE_TIMEOUT, shutdown).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => warn!("Failed to close stream to {}: {}", address, e),
                        Err(_) => warn!("Timed out closing stream to {}", address),
                    }
                }
                if let Some(reader) = legacy.reader.take() {
                    if let Err(e) = reader.await {
                        warn!("Read task for {} ended abnormally: {}", address, e);
                    }
                }
            }
            SessionKind::Attribute(attr) => {
                if attr.closed {
                    return;
                }
                attr.closed = true;

                if !attr.remote_closed {
                    if let Err(e) = attr.radio.disconnect_attribute(&address).await {
                        warn!("Failed to disconnect {}: {}", address, e);
                    }
                }
                if let Err(e) = attr.radio.close_attribute(&address).await {
                    warn!("Failed to release attribute handle for {}: {}", address, e);
                }
            }
        }
        debug!("Session to {} closed", address);
    }
}

impl fmt::Debug for TransportSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportSession")
            .field("device", &self.device)
            .field("transport", &self.transport())
            .field("receiving", &self.is_receiving())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Session Writer
// ----------------------------------------------------------------------------

/// Write handle detached from the registry lock
#[derive(Clone)]
pub(crate) enum SessionWriter {
    Legacy {
        address: String,
        writer: SharedWriter,
        closing: watch::Receiver<bool>,
    },
    Attribute {
        address: String,
        radio: Arc<dyn Radio>,
        characteristic: Uuid,
    },
}

impl SessionWriter {
    pub(crate) async fn send(&self, payload: &[u8]) -> LinkResult<()> {
        match self {
            SessionWriter::Legacy {
                address,
                writer,
                closing,
            } => {
                let write = async {
                    let mut writer = writer.lock().await;
                    write_and_flush(&mut *writer, payload).await
                };

                tokio::select! {
                    biased;

                    _ = session_closed(closing.clone()) => {
                        debug!("Write to {} cancelled: session closed", address);
                        Err(LinkError::SendFailed(format!("session to {} closed", address)))
                    }

                    result = write => match result {
                        Ok(()) => {
                            debug!("Sent {} bytes to {}", payload.len(), address);
                            Ok(())
                        }
                        Err(e) => {
                            warn!("Write to {} failed: {}", address, e);
                            Err(LinkError::SendFailed(e.to_string()))
                        }
                    }
                }
            }
            SessionWriter::Attribute {
                address,
                radio,
                characteristic,
            } => {
                // Single write per call; the outcome is logged when the
                // hardware reports it.
                radio
                    .write_characteristic(address, *characteristic, payload)
                    .await
                    .map_err(|e| {
                        warn!("Write to {} failed: {}", address, e);
                        LinkError::SendFailed(e.to_string())
                    })
            }
        }
    }
}

/// Resolves once the owning session starts closing or is dropped
async fn session_closed(mut closing: watch::Receiver<bool>) {
    while !*closing.borrow_and_update() {
        if closing.changed().await.is_err() {
            return;
        }
    }
}

async fn write_and_flush<W>(writer: &mut W, payload: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(payload).await?;
    writer.flush().await
}

// ----------------------------------------------------------------------------
// Legacy Read Task
// ----------------------------------------------------------------------------

async fn read_loop(
    address: String,
    mut reader: ReadHalf<BoxedLinkStream>,
    mut shutdown: oneshot::Receiver<()>,
    receive: ReceiveHook,
    signals: RadioEventSender,
) {
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => {
                debug!("Read task for {} stopped", address);
                return;
            }

            read = reader.read(&mut buf) => match read {
                Ok(0) => {
                    info!("Stream to {} closed by peer", address);
                    break;
                }
                Ok(n) => receive(buf[..n].to_vec()),
                Err(e) => {
                    warn!("Read from {} failed: {}", address, e);
                    break;
                }
            }
        }
    }

    if signals.send(RadioEvent::StreamClosed { address }).is_err() {
        debug!("Stream closed after the link manager stopped");
    }
}
