//! Frame server: the preloaded [`FrameStore`], the TLS [`ServerListener`] and
//! the per-connection [`SessionHandler`].

pub mod frame_store;
pub mod listener;
pub mod registry;
pub mod session;

pub use frame_store::FrameStore;
pub use listener::ServerListener;
pub use registry::{RegistryStats, SessionRegistry, SessionStats};
pub use session::SessionHandler;
