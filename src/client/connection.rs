use std::sync::atomic::{AtomicU16, Ordering};

use bytes::{Bytes, BytesMut};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    sync::{Mutex, MutexGuard},
};
use tokio_rustls::client::TlsStream;
use tracing::{debug, info};

use crate::{
    common::ConnectionError,
    protocol::{Command, FrameRequest},
    transport::ClientTls,
};

const LOAD_REPLY_MAX: usize = 64;

/// One TLS connection to a frame server, used strictly request-then-reply.
pub struct StreamConnection {
    stream: TlsStream<TcpStream>,
    host: String,
    port: u16,
    max_frame_bytes: u32,
}

impl StreamConnection {
    pub async fn connect(
        tls: &ClientTls,
        host: &str,
        port: u16,
        max_frame_bytes: u32,
    ) -> Result<Self, ConnectionError> {
        let stream = tls.connect(host, port).await?;
        debug!("connected to {}:{}", host, port);
        Ok(Self {
            stream,
            host: host.to_string(),
            port,
            max_frame_bytes,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    async fn send(&mut self, command: &Command) -> Result<(), ConnectionError> {
        self.stream.write_all(command.to_wire().as_bytes()).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Requests one frame. `Ok(None)` is the zero-length marker: end of stream or no such frame.
    pub async fn request_frame(
        &mut self,
        request: &FrameRequest,
    ) -> Result<Option<Bytes>, ConnectionError> {
        self.send(&Command::Frame(request.clone())).await?;

        let len = match self.stream.read_u32().await {
            Ok(len) => len,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(ConnectionError::Closed);
            }
            Err(e) => return Err(e.into()),
        };
        if len == 0 {
            return Ok(None);
        }
        if len > self.max_frame_bytes {
            return Err(ConnectionError::FrameTooLarge {
                size: len,
                limit: self.max_frame_bytes,
            });
        }

        let mut blob = BytesMut::zeroed(len as usize);
        self.stream.read_exact(&mut blob).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                ConnectionError::Closed
            } else {
                e.into()
            }
        })?;
        Ok(Some(blob.freeze()))
    }

    /// Asks for the server's load metric.
    pub async fn load(&mut self) -> Result<f64, ConnectionError> {
        self.send(&Command::Load).await?;

        let mut buf = [0u8; LOAD_REPLY_MAX];
        let n = self.stream.read(&mut buf).await?;
        if n == 0 {
            return Err(ConnectionError::Closed);
        }
        let text = String::from_utf8_lossy(&buf[..n]);
        match text.trim().parse::<f64>() {
            Ok(load) if load.is_finite() => Ok(load),
            _ => Err(ConnectionError::InvalidLoad(text.into_owned())),
        }
    }

    /// Server-side pause: frame requests go unanswered until [`Self::play`].
    pub async fn pause(&mut self) -> Result<(), ConnectionError> {
        self.send(&Command::Pause).await
    }

    pub async fn play(&mut self) -> Result<(), ConnectionError> {
        self.send(&Command::Play).await
    }

    /// Sends TLS close_notify and closes the socket. Errors are ignored.
    pub async fn shutdown(mut self) {
        let _ = self.stream.shutdown().await;
        debug!("closed connection to {}:{}", self.host, self.port);
    }
}

/// The session's active connection, swapped in place on migration.
///
/// Holding the lock for a whole request/reply keeps requests off a handle that
/// is being replaced. An empty slot means the session was stopped.
pub struct ConnectionSlot {
    inner: Mutex<Option<StreamConnection>>,
    port: AtomicU16,
}

impl ConnectionSlot {
    pub fn new(connection: StreamConnection) -> Self {
        Self {
            port: AtomicU16::new(connection.port()),
            inner: Mutex::new(Some(connection)),
        }
    }

    /// Port of the server currently in use, readable without waiting for the lock.
    pub fn current_port(&self) -> Option<u16> {
        match self.port.load(Ordering::Acquire) {
            0 => None,
            port => Some(port),
        }
    }

    pub async fn lock(&self) -> MutexGuard<'_, Option<StreamConnection>> {
        self.inner.lock().await
    }

    /// Publishes `next` as the active connection and closes the previous one.
    ///
    /// Returns false, closing `next`, when the slot was already emptied by stop.
    pub async fn replace(&self, next: StreamConnection) -> bool {
        let mut guard = self.inner.lock().await;
        let Some(previous_port) = guard.as_ref().map(StreamConnection::port) else {
            drop(guard);
            next.shutdown().await;
            return false;
        };

        info!("switching from port {} to {}", previous_port, next.port());
        self.port.store(next.port(), Ordering::Release);
        let previous = guard.replace(next);
        drop(guard);

        if let Some(previous) = previous {
            previous.shutdown().await;
        }
        true
    }

    /// Empties the slot and closes the connection.
    pub async fn close(&self) {
        let previous = self.inner.lock().await.take();
        self.port.store(0, Ordering::Release);
        if let Some(previous) = previous {
            previous.shutdown().await;
        }
    }
}
