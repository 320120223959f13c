//! TLS setup for the frame server and the player.
//!
//! The server certificate is always verified by the player. Client
//! certificates are optional and enabled by `tls.client_ca_path` on the server
//! and `tls.mutual` on the player.

use std::{path::Path, sync::Arc};

use rustls::{
    ClientConfig, RootCertStore, ServerConfig,
    pki_types::{CertificateDer, PrivateKeyDer, ServerName},
};
use rustls_pemfile::{certs, private_key};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_rustls::{TlsAcceptor, TlsConnector, client::TlsStream};

use crate::{common::ConnectionError, configs::TlsConfig};

#[derive(Error, Debug)]
pub enum TlsError {
    #[error("Invalid minimum TLS version: {0}")]
    InvalidMinTlsVersion(String),

    #[error("Failed to read PEM file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("No certificates found in PEM file: {0}")]
    EmptyCertChain(String),

    #[error("No private key found in PEM file: {0}")]
    EmptyPrivateKey(String),

    #[error("Invalid TLS server name: {0}")]
    InvalidServerName(String),

    #[error("TLS config error: {0}")]
    Config(String),
}

impl TlsError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

fn resolve_tls_versions(
    min_version: &str,
) -> Result<Vec<&'static rustls::SupportedProtocolVersion>, TlsError> {
    match min_version.trim() {
        "1.2" | "1.2+" => Ok(vec![&rustls::version::TLS13, &rustls::version::TLS12]),
        "1.3" | "1.3+" => Ok(vec![&rustls::version::TLS13]),
        other => Err(TlsError::InvalidMinTlsVersion(other.to_string())),
    }
}

fn load_cert_chain(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let mut reader =
        std::io::BufReader::new(std::fs::File::open(path).map_err(|e| TlsError::io(path, e))?);
    let cert_chain = certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TlsError::io(path, e))?;
    if cert_chain.is_empty() {
        return Err(TlsError::EmptyCertChain(path.display().to_string()));
    }
    Ok(cert_chain)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let mut reader =
        std::io::BufReader::new(std::fs::File::open(path).map_err(|e| TlsError::io(path, e))?);
    private_key(&mut reader)
        .map_err(|e| TlsError::io(path, e))?
        .ok_or_else(|| TlsError::EmptyPrivateKey(path.display().to_string()))
}

fn root_store(path: &Path) -> Result<RootCertStore, TlsError> {
    let mut roots = RootCertStore::empty();
    let (added, _ignored) = roots.add_parsable_certificates(load_cert_chain(path)?);
    if added == 0 {
        return Err(TlsError::EmptyCertChain(path.display().to_string()));
    }
    Ok(roots)
}

pub fn build_server_config(tls: &TlsConfig) -> Result<Arc<ServerConfig>, TlsError> {
    let cert_chain = load_cert_chain(Path::new(&tls.cert_path))?;
    let key = load_private_key(Path::new(&tls.key_path))?;
    let versions = resolve_tls_versions(&tls.min_tls_version)?;

    let builder = ServerConfig::builder_with_protocol_versions(&versions);

    let server_config = match tls.client_ca_path.as_deref() {
        Some(ca_path) => {
            let roots = root_store(Path::new(ca_path))?;
            let verifier = rustls::server::WebPkiClientVerifier::builder(roots.into())
                .build()
                .map_err(|e| TlsError::Config(e.to_string()))?;
            builder
                .with_client_cert_verifier(verifier)
                .with_single_cert(cert_chain, key)
                .map_err(|e| TlsError::Config(e.to_string()))?
        }
        None => builder
            .with_no_client_auth()
            .with_single_cert(cert_chain, key)
            .map_err(|e| TlsError::Config(e.to_string()))?,
    };

    Ok(Arc::new(server_config))
}

pub fn build_client_config(tls: &TlsConfig) -> Result<Arc<ClientConfig>, TlsError> {
    let versions = resolve_tls_versions(&tls.min_tls_version)?;
    let ca_path = tls.ca_path.as_deref().unwrap_or(&tls.cert_path);
    let roots = root_store(Path::new(ca_path))?;

    let builder =
        ClientConfig::builder_with_protocol_versions(&versions).with_root_certificates(roots);

    let client_config = if tls.mutual {
        let cert_chain = load_cert_chain(Path::new(&tls.cert_path))?;
        let key = load_private_key(Path::new(&tls.key_path))?;
        builder
            .with_client_auth_cert(cert_chain, key)
            .map_err(|e| TlsError::Config(e.to_string()))?
    } else {
        builder.with_no_client_auth()
    };

    Ok(Arc::new(client_config))
}

pub fn build_acceptor(tls: &TlsConfig) -> Result<TlsAcceptor, TlsError> {
    Ok(TlsAcceptor::from(build_server_config(tls)?))
}

/// Everything the player needs to open verified connections to any server in the pool.
#[derive(Clone)]
pub struct ClientTls {
    connector: TlsConnector,
    server_name: ServerName<'static>,
}

impl ClientTls {
    pub fn from_config(tls: &TlsConfig) -> Result<Self, TlsError> {
        let server_name = ServerName::try_from(tls.server_name.clone())
            .map_err(|_| TlsError::InvalidServerName(tls.server_name.clone()))?;
        Ok(Self {
            connector: TlsConnector::from(build_client_config(tls)?),
            server_name,
        })
    }

    pub async fn connect(
        &self,
        host: &str,
        port: u16,
    ) -> Result<TlsStream<TcpStream>, ConnectionError> {
        let addr = format!("{}:{}", host, port);
        let tcp = TcpStream::connect(&addr)
            .await
            .map_err(|source| ConnectionError::Connect {
                addr: addr.clone(),
                source,
            })?;
        let _ = tcp.set_nodelay(true);
        self.connector
            .connect(self.server_name.clone(), tcp)
            .await
            .map_err(|source| ConnectionError::Handshake { addr, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestCerts;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn rejects_unknown_min_version() {
        let err = resolve_tls_versions("1.1").unwrap_err();
        assert!(matches!(err, TlsError::InvalidMinTlsVersion(v) if v == "1.1"));
        assert_eq!(resolve_tls_versions("1.3+").expect("1.3").len(), 1);
    }

    #[test]
    fn missing_key_file_is_reported() {
        let certs = TestCerts::generate();
        let mut config = certs.tls_config();
        config.key_path = certs.path("absent.pem");
        let err = build_server_config(&config).unwrap_err();
        assert!(matches!(err, TlsError::Io { ref path, .. } if path.ends_with("absent.pem")));
    }

    #[test]
    fn pem_without_certificates_is_rejected() {
        let certs = TestCerts::generate();
        let mut config = certs.tls_config();
        // The key file holds no certificate blocks.
        config.cert_path = config.key_path.clone();
        let err = build_server_config(&config).unwrap_err();
        assert!(matches!(err, TlsError::EmptyCertChain(_)));
    }

    #[tokio::test]
    async fn handshake_succeeds_with_trusted_server() {
        let certs = TestCerts::generate();
        let config = certs.tls_config();
        let acceptor = build_acceptor(&config).expect("acceptor");
        let client = ClientTls::from_config(&config).expect("client tls");

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let server_task = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let mut tls_stream = acceptor.accept(stream).await.expect("accept tls");
            let mut buf = [0u8; 4];
            tls_stream.read_exact(&mut buf).await.expect("read");
            buf
        });

        let mut stream = client.connect("127.0.0.1", port).await.expect("tls connect");
        stream.write_all(b"load").await.expect("write");
        assert_eq!(&server_task.await.expect("join"), b"load");
    }

    #[tokio::test]
    async fn mutual_handshake_succeeds() {
        let certs = TestCerts::generate();
        let mut config = certs.tls_config();
        config.client_ca_path = Some(config.cert_path.clone());
        config.mutual = true;
        let acceptor = build_acceptor(&config).expect("acceptor");
        let client = ClientTls::from_config(&config).expect("client tls");

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let server_task = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let mut tls_stream = acceptor.accept(stream).await.expect("accept tls");
            let mut buf = [0u8; 2];
            tls_stream.read_exact(&mut buf).await.expect("read");
            buf
        });

        let mut stream = client.connect("127.0.0.1", port).await.expect("tls connect");
        stream.write_all(b"ok").await.expect("write");
        assert_eq!(&server_task.await.expect("join"), b"ok");
    }

    #[tokio::test]
    async fn handshake_rejects_untrusted_server() {
        let server_certs = TestCerts::generate();
        let other_certs = TestCerts::generate();
        let acceptor = build_acceptor(&server_certs.tls_config()).expect("acceptor");
        let client = ClientTls::from_config(&other_certs.tls_config()).expect("client tls");

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        tokio::spawn(async move {
            if let Ok((stream, _)) = listener.accept().await {
                let _ = acceptor.accept(stream).await;
            }
        });

        let result = client.connect("127.0.0.1", port).await;
        assert!(matches!(result, Err(ConnectionError::Handshake { .. })));
    }
}
