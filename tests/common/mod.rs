//! Shared fixtures: self-signed certificates, frame directories and servers on loopback.

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use framelink::{
    FrameStore, ResolutionTier, ServerListener,
    client::LatencyProbe,
    configs::{BalancerConfig, CatalogEntry, PlayerConfig, TlsConfig},
    server::SessionRegistry,
    transport,
};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Default timeout for test operations.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

#[allow(dead_code)]
pub fn init_test_logging() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("framelink=debug")),
        )
        .with_test_writer()
        .try_init();
}

#[allow(dead_code)]
pub async fn with_timeout<T, F>(fut: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(TEST_TIMEOUT, fut)
        .await
        .expect("test operation timed out")
}

pub fn blob(title: &str, tier: ResolutionTier, index: usize) -> Bytes {
    Bytes::from(format!("{title}/{tier}/{index:05}").into_bytes())
}

/// Certificates and frame directories under one temporary root.
pub struct Fixture {
    _root: TempDir,
    pub tls: TlsConfig,
    pub catalog: Vec<CatalogEntry>,
}

impl Fixture {
    /// `title` with `frames` frames at every tier.
    pub fn new(title: &str, frames: usize) -> Self {
        let root = tempfile::tempdir().expect("tempdir");

        let rcgen::CertifiedKey { cert, key_pair } =
            rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).expect("rcgen");
        let cert_path = root.path().join("cert.pem");
        let key_path = root.path().join("key.pem");
        std::fs::write(&cert_path, cert.pem()).expect("write cert");
        std::fs::write(&key_path, key_pair.serialize_pem()).expect("write key");

        let mut tiers = BTreeMap::new();
        for tier in ResolutionTier::ALL {
            let dir = root.path().join("media").join(title).join(tier.as_str());
            std::fs::create_dir_all(&dir).expect("mkdir");
            for index in 0..frames {
                std::fs::write(dir.join(format!("{index:06}.jpg")), blob(title, tier, index))
                    .expect("write frame");
            }
            tiers.insert(tier.as_str().to_string(), dir);
        }

        Self {
            tls: TlsConfig {
                cert_path: cert_path.display().to_string(),
                key_path: key_path.display().to_string(),
                ca_path: None,
                client_ca_path: None,
                mutual: false,
                server_name: "localhost".to_string(),
                min_tls_version: "1.2".to_string(),
            },
            catalog: vec![CatalogEntry {
                title: title.to_string(),
                tiers,
            }],
            _root: root,
        }
    }

    pub fn client_tls(&self) -> transport::ClientTls {
        transport::ClientTls::from_config(&self.tls).expect("client tls")
    }

    /// Loads the catalog and serves it on `listener`.
    pub fn serve(&self, listener: std::net::TcpListener) -> TestServer {
        listener.set_nonblocking(true).expect("nonblocking");
        let port = listener.local_addr().expect("addr").port();
        let listener = tokio::net::TcpListener::from_std(listener).expect("tokio listener");

        let store = Arc::new(FrameStore::load(&self.catalog).expect("load store"));
        let acceptor = transport::build_acceptor(&self.tls).expect("acceptor");
        let server = ServerListener::new(listener, acceptor, store);
        let registry = server.registry();
        let shutdown = server.shutdown_token();
        tokio::spawn(server.run());

        TestServer {
            port,
            registry,
            shutdown,
        }
    }

    pub fn serve_ephemeral(&self) -> TestServer {
        self.serve(std::net::TcpListener::bind("127.0.0.1:0").expect("bind"))
    }
}

pub struct TestServer {
    pub port: u16,
    pub registry: Arc<SessionRegistry>,
    pub shutdown: CancellationToken,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Two listeners on consecutive loopback ports, for a contiguous balancer range.
#[allow(dead_code)]
pub fn adjacent_listeners() -> (std::net::TcpListener, std::net::TcpListener) {
    for _ in 0..50 {
        let first = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = first.local_addr().expect("addr").port();
        if port == u16::MAX {
            continue;
        }
        if let Ok(second) = std::net::TcpListener::bind(("127.0.0.1", port + 1)) {
            return (first, second);
        }
    }
    panic!("no adjacent free ports on loopback");
}

/// Latency probe with a fixed answer.
pub struct FixedProbe(pub Option<f64>);

#[async_trait]
impl LatencyProbe for FixedProbe {
    fn name(&self) -> &'static str {
        "fixed"
    }

    async fn measure(&self) -> Option<f64> {
        self.0
    }
}

pub fn player_config() -> PlayerConfig {
    PlayerConfig {
        fps: 30.0,
        tier_interval_secs: 60,
        idle_poll_ms: 10,
        sink_capacity: 256,
        max_frame_bytes: 1024 * 1024,
    }
}

#[allow(dead_code)]
pub fn balancer_config(port_start: u16, port_end: u16) -> BalancerConfig {
    BalancerConfig {
        enabled: true,
        host: "127.0.0.1".to_string(),
        port_start,
        port_end,
        interval_secs: 1,
        probe_timeout_ms: 500,
        discount_own_session: false,
    }
}

/// Polls `check` until it holds or the test timeout elapses.
#[allow(dead_code)]
pub async fn eventually(mut check: impl FnMut() -> bool) {
    with_timeout(async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
}
