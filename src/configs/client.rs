use std::{ops::RangeInclusive, time::Duration};

use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PlayerConfig {
    #[serde(default = "default_fps")]
    pub fps: f64,
    /// Seconds between latency probes while playing.
    #[serde(default = "default_tier_interval")]
    pub tier_interval_secs: u64,
    /// How often a paused loop wakes up to check for resume.
    #[serde(default = "default_idle_poll_ms")]
    pub idle_poll_ms: u64,
    /// Frames buffered towards the renderer before new ones are dropped.
    #[serde(default = "default_sink_capacity")]
    pub sink_capacity: usize,
    /// Largest frame the player accepts from a server.
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: u32,
}

impl PlayerConfig {
    pub fn tier_interval(&self) -> Duration {
        Duration::from_secs(self.tier_interval_secs)
    }

    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms.max(1))
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            fps: default_fps(),
            tier_interval_secs: default_tier_interval(),
            idle_poll_ms: default_idle_poll_ms(),
            sink_capacity: default_sink_capacity(),
            max_frame_bytes: default_max_frame_bytes(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProbeMethod {
    /// System `ping -c 1`, ICMP round trip.
    #[default]
    Ping,
    /// TCP connect time, for hosts where ICMP is unavailable.
    Tcp,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LatencyConfig {
    #[serde(default)]
    pub method: ProbeMethod,
    #[serde(default = "default_latency_target")]
    pub target: String,
    /// Only used by the TCP probe.
    #[serde(default = "default_latency_port")]
    pub port: u16,
    #[serde(default = "default_latency_timeout_ms")]
    pub timeout_ms: u64,
}

impl LatencyConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for LatencyConfig {
    fn default() -> Self {
        Self {
            method: ProbeMethod::default(),
            target: default_latency_target(),
            port: default_latency_port(),
            timeout_ms: default_latency_timeout_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BalancerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Host every candidate port is probed on.
    #[serde(default = "default_balancer_host")]
    pub host: String,
    #[serde(default = "default_port_start")]
    pub port_start: u16,
    /// Inclusive upper bound of the candidate range.
    #[serde(default = "default_port_end")]
    pub port_end: u16,
    #[serde(default = "default_balancer_interval")]
    pub interval_secs: u64,
    /// Also bounds the connect when migrating.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    /// Count the current server as one session lighter when comparing loads.
    #[serde(default)]
    pub discount_own_session: bool,
}

impl BalancerConfig {
    pub fn ports(&self) -> RangeInclusive<u16> {
        self.port_start..=self.port_end
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

impl Default for BalancerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_balancer_host(),
            port_start: default_port_start(),
            port_end: default_port_end(),
            interval_secs: default_balancer_interval(),
            probe_timeout_ms: default_probe_timeout_ms(),
            discount_own_session: false,
        }
    }
}

fn default_fps() -> f64 {
    30.0
}

fn default_tier_interval() -> u64 {
    5
}

fn default_idle_poll_ms() -> u64 {
    100
}

fn default_sink_capacity() -> usize {
    120
}

fn default_max_frame_bytes() -> u32 {
    64 * 1024 * 1024
}

fn default_latency_target() -> String {
    "8.8.8.8".to_string()
}

fn default_latency_port() -> u16 {
    53
}

fn default_latency_timeout_ms() -> u64 {
    2_000
}

fn default_true() -> bool {
    true
}

fn default_balancer_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port_start() -> u16 {
    9999
}

fn default_port_end() -> u16 {
    10010
}

fn default_balancer_interval() -> u64 {
    5
}

fn default_probe_timeout_ms() -> u64 {
    1_000
}
