//! Player side: the TLS [`StreamConnection`], the wall-clock
//! [`PlaybackSession`], latency probing and the [`LoadBalancer`].

pub mod balancer;
pub mod clock;
pub mod connection;
pub mod latency;
pub mod playback;

pub use balancer::{LoadBalancer, discount_own_session, select_least_loaded};
pub use clock::PlaybackClock;
pub use connection::{ConnectionSlot, StreamConnection};
pub use latency::{LatencyProbe, PingProbe, TcpProbe, probe_from_config, probe_tier};
pub use playback::{Frame, Phase, PlaybackEnd, PlaybackSession};
