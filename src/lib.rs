//! Latency-adaptive frame streaming over TLS.
//!
//! The server side preloads every title into an immutable [`server::FrameStore`]
//! and answers frame requests over a small text/binary protocol. The client side
//! drives a wall-clock playback loop, re-evaluates the resolution tier from
//! measured latency and migrates between a pool of equivalent servers based on
//! their reported load.

pub mod client;
pub mod common;
pub mod configs;
pub mod protocol;
pub mod server;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use client::{LoadBalancer, PlaybackSession, StreamConnection};
pub use common::{AnyError, AnyResult};
pub use configs::Config;
pub use protocol::{Command, ResolutionTier};
pub use server::{FrameStore, ServerListener};
