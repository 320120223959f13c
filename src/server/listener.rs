use std::{io, net::SocketAddr, sync::Arc, time::Duration};

use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{frame_store::FrameStore, registry::SessionRegistry, session::SessionHandler};

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Accepts TLS connections and runs one [`SessionHandler`] task per connection.
pub struct ServerListener {
    listener: TcpListener,
    acceptor: TlsAcceptor,
    store: Arc<FrameStore>,
    registry: Arc<SessionRegistry>,
    stats_interval: Option<Duration>,
    shutdown: CancellationToken,
}

impl ServerListener {
    pub async fn bind(
        addr: impl tokio::net::ToSocketAddrs,
        acceptor: TlsAcceptor,
        store: Arc<FrameStore>,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self::new(listener, acceptor, store))
    }

    pub fn new(listener: TcpListener, acceptor: TlsAcceptor, store: Arc<FrameStore>) -> Self {
        Self {
            listener,
            acceptor,
            store,
            registry: Arc::new(SessionRegistry::new()),
            stats_interval: None,
            shutdown: CancellationToken::new(),
        }
    }

    /// Logs session stats every `interval`. Zero disables.
    pub fn with_stats_interval(mut self, interval: Duration) -> Self {
        self.stats_interval = (!interval.is_zero()).then_some(interval);
        self
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn registry(&self) -> Arc<SessionRegistry> {
        self.registry.clone()
    }

    /// Cancelling the token stops accepting and closes every open session.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub async fn run(self) {
        if let Ok(addr) = self.listener.local_addr() {
            info!("listening on {}", addr);
        }

        if let Some(interval) = self.stats_interval {
            tokio::spawn(log_stats(
                self.registry.clone(),
                interval,
                self.shutdown.clone(),
            ));
        }

        loop {
            let (stream, peer) = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        error!("accept failed: {}", e);
                        continue;
                    }
                },
            };

            tokio::spawn(serve_connection(
                stream,
                peer,
                self.acceptor.clone(),
                self.store.clone(),
                self.registry.clone(),
                self.shutdown.child_token(),
            ));
        }

        info!("listener stopped");
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    acceptor: TlsAcceptor,
    store: Arc<FrameStore>,
    registry: Arc<SessionRegistry>,
    shutdown: CancellationToken,
) {
    let _ = stream.set_nodelay(true);
    let tls_stream = match tokio::time::timeout(HANDSHAKE_TIMEOUT, acceptor.accept(stream)).await {
        Ok(Ok(tls_stream)) => tls_stream,
        Ok(Err(e)) => {
            warn!("TLS handshake with {} failed: {}", peer, e);
            return;
        }
        Err(_) => {
            warn!("TLS handshake with {} timed out", peer);
            return;
        }
    };

    let (_, connection) = tls_stream.get_ref();
    debug!(
        "{} connected using {:?} / {:?}",
        peer,
        connection.protocol_version(),
        connection.negotiated_cipher_suite().map(|suite| suite.suite())
    );

    let (id, stats) = registry.register(peer);
    debug!("[{}] session opened for {}", id, peer);
    SessionHandler::new(id, stats, store, registry)
        .run(tls_stream, shutdown)
        .await;
}

async fn log_stats(registry: Arc<SessionRegistry>, interval: Duration, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let stats = registry.stats();
        info!(
            "sessions: {} open, {} streaming | served {} frames ({} KiB)",
            stats.open,
            stats.streaming,
            stats.frames_served,
            stats.bytes_served / 1024
        );
    }
}
