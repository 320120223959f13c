use std::{collections::BTreeMap, sync::Arc};

use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::connection::{ConnectionSlot, StreamConnection};
use crate::{common::ConnectionError, configs::BalancerConfig, transport::ClientTls};

/// The port with the strictly smallest load. Ties go to the lowest port.
pub fn select_least_loaded(samples: &BTreeMap<u16, f64>) -> Option<u16> {
    let mut best: Option<(u16, f64)> = None;
    for (&port, &load) in samples {
        match best {
            Some((_, best_load)) if load >= best_load => {}
            _ => best = Some((port, load)),
        }
    }
    best.map(|(port, _)| port)
}

/// Removes this client's own session from the sample of the port it is on.
pub fn discount_own_session(samples: &mut BTreeMap<u16, f64>, current: u16) {
    if let Some(load) = samples.get_mut(&current) {
        *load = (*load - 1.0).max(0.0);
    }
}

/// Polls the server pool for load and migrates a session's connection to the least loaded one.
#[derive(Clone)]
pub struct LoadBalancer {
    tls: ClientTls,
    config: BalancerConfig,
    max_frame_bytes: u32,
}

impl LoadBalancer {
    pub fn new(tls: ClientTls, config: BalancerConfig, max_frame_bytes: u32) -> Self {
        Self {
            tls,
            config,
            max_frame_bytes,
        }
    }

    async fn probe(&self, port: u16) -> Result<f64, ConnectionError> {
        let timeout = self.config.probe_timeout();
        let probe = async {
            let mut connection =
                StreamConnection::connect(&self.tls, &self.config.host, port, self.max_frame_bytes)
                    .await?;
            let load = connection.load().await;
            connection.shutdown().await;
            load
        };
        tokio::time::timeout(timeout, probe)
            .await
            .map_err(|_| ConnectionError::Timeout(timeout))?
    }

    /// Probes every candidate port concurrently. Ports that fail or time out are left out.
    pub async fn sample(&self) -> BTreeMap<u16, f64> {
        let ports: Vec<u16> = self.config.ports().collect();
        let results = join_all(ports.iter().map(|&port| self.probe(port))).await;

        ports
            .into_iter()
            .zip(results)
            .filter_map(|(port, result)| match result {
                Ok(load) => Some((port, load)),
                Err(e) => {
                    debug!("port {} excluded this cycle: {}", port, e);
                    None
                }
            })
            .collect()
    }

    /// One polling cycle. Returns the new port if the connection was migrated.
    pub async fn rebalance(&self, slot: &ConnectionSlot) -> Option<u16> {
        let current = slot.current_port()?;
        let mut samples = self.sample().await;
        if samples.is_empty() {
            debug!("no server answered the load probe, staying on {}", current);
            return None;
        }
        if self.config.discount_own_session {
            discount_own_session(&mut samples, current);
        }
        debug!("load samples: {:?}", samples);

        let target = select_least_loaded(&samples)?;
        if target == current {
            return None;
        }

        let timeout = self.config.probe_timeout();
        let connect =
            StreamConnection::connect(&self.tls, &self.config.host, target, self.max_frame_bytes);
        let next = tokio::time::timeout(timeout, connect)
            .await
            .map_err(|_| ConnectionError::Timeout(timeout))
            .and_then(|connected| connected);

        match next {
            Ok(next) => {
                if slot.replace(next).await {
                    info!(
                        "migrated from port {} to {} (load {:?})",
                        current,
                        target,
                        samples.get(&target)
                    );
                    Some(target)
                } else {
                    None
                }
            }
            Err(e) => {
                warn!("migration to port {} failed, staying on {}: {}", target, current, e);
                None
            }
        }
    }

    /// Rebalances `slot` every interval until `stop` is cancelled.
    pub fn spawn(self, slot: Arc<ConnectionSlot>, stop: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.interval());
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = self.rebalance(&slot) => {}
                }
            }
            debug!("load balancer stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples(pairs: &[(u16, f64)]) -> BTreeMap<u16, f64> {
        pairs.iter().copied().collect()
    }

    #[test]
    fn strict_minimum_wins() {
        assert_eq!(
            select_least_loaded(&samples(&[(9999, 3.0), (10000, 3.0), (10005, 1.0)])),
            Some(10005)
        );
    }

    #[test]
    fn lowest_port_wins_ties() {
        assert_eq!(
            select_least_loaded(&samples(&[(9999, 2.0), (10000, 2.0)])),
            Some(9999)
        );
        assert_eq!(
            select_least_loaded(&samples(&[(10003, 0.0), (10001, 0.0), (10002, 4.0)])),
            Some(10001)
        );
    }

    #[test]
    fn no_samples_selects_nothing() {
        assert_eq!(select_least_loaded(&BTreeMap::new()), None);
    }

    #[test]
    fn own_session_discount_keeps_idle_pool_stable() {
        // One client alone in the pool: its server reports 1, the others 0.
        let mut loads = samples(&[(9999, 0.0), (10000, 1.0), (10001, 0.0)]);
        discount_own_session(&mut loads, 10000);
        assert_eq!(loads[&10000], 0.0);
        // Lowest port still wins the tie, so the client moves only when it sits higher.
        assert_eq!(select_least_loaded(&loads), Some(9999));

        let mut loads = samples(&[(9999, 1.0), (10000, 0.0)]);
        discount_own_session(&mut loads, 9999);
        assert_eq!(select_least_loaded(&loads), Some(9999));
    }

    #[test]
    fn discount_saturates_at_zero_and_ignores_missing_port() {
        let mut loads = samples(&[(9999, 0.0)]);
        discount_own_session(&mut loads, 9999);
        discount_own_session(&mut loads, 12345);
        assert_eq!(loads, samples(&[(9999, 0.0)]));
    }
}
