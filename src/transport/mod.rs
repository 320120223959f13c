pub mod tls;

pub use tls::{ClientTls, TlsError, build_acceptor, build_client_config, build_server_config};
