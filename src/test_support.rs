use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use bytes::Bytes;
use tempfile::TempDir;

use crate::{configs::TlsConfig, protocol::ResolutionTier, server::FrameStore};

/// A self-signed `localhost` certificate written to a temporary directory.
pub struct TestCerts {
    dir: TempDir,
    cert_path: String,
    key_path: String,
}

impl TestCerts {
    pub fn generate() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let rcgen::CertifiedKey { cert, key_pair } =
            rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).expect("rcgen");
        let cert_path = dir.path().join("cert.pem");
        let key_path = dir.path().join("key.pem");
        std::fs::write(&cert_path, cert.pem()).expect("write cert");
        std::fs::write(&key_path, key_pair.serialize_pem()).expect("write key");
        Self {
            cert_path: cert_path.display().to_string(),
            key_path: key_path.display().to_string(),
            dir,
        }
    }

    pub fn path(&self, name: &str) -> String {
        self.dir.path().join(name).display().to_string()
    }

    pub fn tls_config(&self) -> TlsConfig {
        TlsConfig {
            cert_path: self.cert_path.clone(),
            key_path: self.key_path.clone(),
            ca_path: None,
            client_ca_path: None,
            mutual: false,
            server_name: "localhost".to_string(),
            min_tls_version: "1.2".to_string(),
        }
    }
}

/// Deterministic blob for frame `index`, distinct per tier and index.
pub fn frame_blob(tier: ResolutionTier, index: usize) -> Bytes {
    Bytes::from(format!("{}-frame-{:05}", tier, index).into_bytes())
}

/// Writes `count` frame files for `tier` under `root` and returns the directory.
pub fn write_frames(root: &Path, tier: ResolutionTier, count: usize) -> PathBuf {
    let dir = root.join(tier.as_str());
    std::fs::create_dir_all(&dir).expect("create frame dir");
    for index in 0..count {
        std::fs::write(dir.join(format!("{:06}.jpg", index)), frame_blob(tier, index))
            .expect("write frame");
    }
    dir
}

/// An in-memory store with `count` frames of `title` at every tier.
pub fn store_with(title: &str, count: usize) -> Arc<FrameStore> {
    let tiers = ResolutionTier::ALL
        .into_iter()
        .map(|tier| (tier, (0..count).map(|i| frame_blob(tier, i)).collect()))
        .collect();
    Arc::new(FrameStore::from_frames([(title.to_string(), tiers)]))
}
