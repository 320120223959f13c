//! Round-trip latency measurement used to choose the resolution tier.

use std::{
    process::Stdio,
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use tokio::{net::TcpStream, process::Command, time::timeout};
use tracing::debug;

use crate::{
    configs::{LatencyConfig, ProbeMethod},
    protocol::ResolutionTier,
};

#[async_trait]
pub trait LatencyProbe: Send + Sync {
    fn name(&self) -> &'static str;

    /// Round trip in milliseconds, or `None` if the endpoint could not be measured.
    async fn measure(&self) -> Option<f64>;
}

pub fn probe_from_config(config: &LatencyConfig) -> Arc<dyn LatencyProbe> {
    match config.method {
        ProbeMethod::Ping => Arc::new(PingProbe::new(&config.target, config.timeout())),
        ProbeMethod::Tcp => Arc::new(TcpProbe::new(
            &config.target,
            config.port,
            config.timeout(),
        )),
    }
}

/// Measures once and maps the result to a tier. Failures map to the lowest tier.
pub async fn probe_tier(probe: &dyn LatencyProbe) -> ResolutionTier {
    let latency = probe.measure().await;
    let tier = ResolutionTier::for_latency(latency);
    debug!("{} probe: {:?} ms -> {}", probe.name(), latency, tier);
    tier
}

/// One ICMP echo through the system `ping` binary.
pub struct PingProbe {
    target: String,
    timeout: Duration,
}

impl PingProbe {
    pub fn new(target: &str, timeout: Duration) -> Self {
        Self {
            target: target.to_string(),
            timeout,
        }
    }
}

#[async_trait]
impl LatencyProbe for PingProbe {
    fn name(&self) -> &'static str {
        "ping"
    }

    async fn measure(&self) -> Option<f64> {
        let output = Command::new("ping")
            .args(["-c", "1", self.target.as_str()])
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = match timeout(self.timeout, output).await {
            Ok(Ok(output)) if output.status.success() => output,
            Ok(Ok(output)) => {
                debug!("ping {} exited with {}", self.target, output.status);
                return None;
            }
            Ok(Err(e)) => {
                debug!("failed to run ping: {}", e);
                return None;
            }
            Err(_) => return None,
        };

        parse_ping_time(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Extracts the `time=12.3 ms` (or `time<1 ms`) figure from ping output.
pub fn parse_ping_time(output: &str) -> Option<f64> {
    let start = output.find("time=").or_else(|| output.find("time<"))? + "time=".len();
    let number: String = output[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    number.parse().ok()
}

/// TCP connect time, for networks that filter ICMP.
pub struct TcpProbe {
    target: String,
    port: u16,
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(target: &str, port: u16, timeout: Duration) -> Self {
        Self {
            target: target.to_string(),
            port,
            timeout,
        }
    }
}

#[async_trait]
impl LatencyProbe for TcpProbe {
    fn name(&self) -> &'static str {
        "tcp"
    }

    async fn measure(&self) -> Option<f64> {
        let started = Instant::now();
        match timeout(
            self.timeout,
            TcpStream::connect((self.target.as_str(), self.port)),
        )
        .await
        {
            Ok(Ok(_stream)) => Some(started.elapsed().as_secs_f64() * 1000.0),
            Ok(Err(e)) => {
                debug!("tcp probe to {}:{} failed: {}", self.target, self.port, e);
                None
            }
            Err(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Option<f64>);

    #[async_trait]
    impl LatencyProbe for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn measure(&self) -> Option<f64> {
            self.0
        }
    }

    #[test]
    fn parses_linux_and_macos_ping_output() {
        let linux = "PING 8.8.8.8 (8.8.8.8) 56(84) bytes of data.\n\
                     64 bytes from 8.8.8.8: icmp_seq=1 ttl=117 time=14.2 ms\n";
        assert_eq!(parse_ping_time(linux), Some(14.2));

        let macos = "64 bytes from 8.8.8.8: icmp_seq=0 ttl=117 time=9.871 ms";
        assert_eq!(parse_ping_time(macos), Some(9.871));

        assert_eq!(parse_ping_time("64 bytes from ::1: time<1 ms"), Some(1.0));
        assert_eq!(parse_ping_time("Request timeout for icmp_seq 0"), None);
    }

    #[tokio::test]
    async fn probe_tier_maps_failures_to_lowest_tier() {
        assert_eq!(probe_tier(&Fixed(Some(20.0))).await, ResolutionTier::P1080);
        assert_eq!(probe_tier(&Fixed(Some(120.0))).await, ResolutionTier::P480);
        assert_eq!(probe_tier(&Fixed(None)).await, ResolutionTier::P240);
    }

    #[tokio::test]
    async fn tcp_probe_measures_local_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let probe = TcpProbe::new("127.0.0.1", port, Duration::from_secs(1));
        let latency = probe.measure().await.expect("reachable");
        assert!(latency >= 0.0 && latency < 1000.0);
    }

    #[tokio::test]
    async fn tcp_probe_fails_on_closed_port() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
            listener.local_addr().expect("addr").port()
        };
        let probe = TcpProbe::new("127.0.0.1", port, Duration::from_millis(500));
        assert_eq!(probe.measure().await, None);
    }
}
