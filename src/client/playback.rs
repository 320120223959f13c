use std::{
    sync::{
        Arc,
        atomic::{AtomicU8, Ordering},
    },
    time::{Duration, Instant},
};

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    clock::PlaybackClock,
    connection::{ConnectionSlot, StreamConnection},
    latency::LatencyProbe,
};
use crate::{
    common::{ConnectionError, PlaybackError},
    configs::PlayerConfig,
    protocol::{FrameRequest, ResolutionTier},
};

/// One received frame, handed to the renderer.
#[derive(Debug, Clone)]
pub struct Frame {
    pub index: u64,
    pub tier: ResolutionTier,
    pub data: Bytes,
}

/// Why the playback loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEnd {
    /// The server answered `index` with the zero-length marker.
    EndOfStream { index: u64 },
    Stopped,
    ConnectionLost(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Playing,
    Paused,
    Stopped,
}

#[derive(Debug)]
struct PlaybackState {
    phase: Phase,
    clock: Option<PlaybackClock>,
    outcome: Option<PlaybackEnd>,
}

/// Client playback of one title: the wall-clock request loop and the
/// periodic tier re-evaluation, over a connection the balancer may swap.
pub struct PlaybackSession {
    title: String,
    config: PlayerConfig,
    tier: AtomicU8,
    state: Mutex<PlaybackState>,
    connection: Arc<ConnectionSlot>,
    probe: Arc<dyn LatencyProbe>,
    sink: flume::Sender<Frame>,
    stop: CancellationToken,
    finished: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl PlaybackSession {
    /// Creates an idle session. Frames arrive on the returned receiver once [`Self::play`] is called.
    pub fn new(
        title: impl Into<String>,
        connection: StreamConnection,
        tier: ResolutionTier,
        probe: Arc<dyn LatencyProbe>,
        config: PlayerConfig,
    ) -> (Arc<Self>, flume::Receiver<Frame>) {
        let (sink, frames) = flume::bounded(config.sink_capacity.max(1));
        let session = Arc::new(Self {
            title: title.into(),
            config,
            tier: AtomicU8::new(tier as u8),
            state: Mutex::new(PlaybackState {
                phase: Phase::Idle,
                clock: None,
                outcome: None,
            }),
            connection: Arc::new(ConnectionSlot::new(connection)),
            probe,
            sink,
            stop: CancellationToken::new(),
            finished: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        });
        (session, frames)
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn tier(&self) -> ResolutionTier {
        ResolutionTier::from_u8(self.tier.load(Ordering::Relaxed))
    }

    /// Takes effect on the next frame request.
    pub fn set_tier(&self, tier: ResolutionTier) -> ResolutionTier {
        ResolutionTier::from_u8(self.tier.swap(tier as u8, Ordering::Relaxed))
    }

    pub fn phase(&self) -> Phase {
        self.state.lock().phase
    }

    pub fn connection(&self) -> Arc<ConnectionSlot> {
        self.connection.clone()
    }

    /// Cancelled once [`Self::stop`] has been called.
    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    /// Starts playback, or resumes it when paused.
    pub fn play(self: &Arc<Self>) -> Result<(), PlaybackError> {
        let mut state = self.state.lock();
        let phase = state.phase;
        match phase {
            Phase::Stopped => Err(PlaybackError::Stopped),
            Phase::Playing => Ok(()),
            Phase::Paused => {
                drop(state);
                self.resume()
            }
            Phase::Idle => {
                state.phase = Phase::Playing;
                state.clock = Some(PlaybackClock::start(Instant::now(), self.config.fps));
                drop(state);

                info!("playing {} at {}", self.title, self.tier());
                let playback = tokio::spawn(self.clone().run_playback());
                let tiering = tokio::spawn(self.clone().run_tier_reevaluation());
                self.tasks.lock().extend([playback, tiering]);
                Ok(())
            }
        }
    }

    pub fn pause(&self) -> Result<(), PlaybackError> {
        let mut state = self.state.lock();
        let phase = state.phase;
        match phase {
            Phase::Stopped => Err(PlaybackError::Stopped),
            Phase::Idle => Err(PlaybackError::NotPlaying),
            Phase::Paused => Err(PlaybackError::AlreadyPaused),
            Phase::Playing => {
                if let Some(clock) = state.clock.as_mut() {
                    clock.pause(Instant::now())?;
                }
                state.phase = Phase::Paused;
                debug!("paused {}", self.title);
                Ok(())
            }
        }
    }

    pub fn resume(&self) -> Result<(), PlaybackError> {
        let mut state = self.state.lock();
        let phase = state.phase;
        match phase {
            Phase::Stopped => Err(PlaybackError::Stopped),
            Phase::Idle | Phase::Playing => Err(PlaybackError::NotPaused),
            Phase::Paused => {
                if let Some(clock) = state.clock.as_mut() {
                    clock.resume(Instant::now())?;
                }
                state.phase = Phase::Playing;
                debug!("resumed {}", self.title);
                Ok(())
            }
        }
    }

    /// Terminal. Unblocks a pending request and closes the connection.
    pub async fn stop(&self) {
        {
            let mut state = self.state.lock();
            if state.phase == Phase::Stopped {
                return;
            }
            state.phase = Phase::Stopped;
        }
        self.stop.cancel();
        self.connection.close().await;

        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            let _ = task.await;
        }
        self.finish(PlaybackEnd::Stopped);
        info!("stopped {}", self.title);
    }

    /// Waits for the playback loop to end and reports why.
    pub async fn wait(&self) -> PlaybackEnd {
        self.finished.cancelled().await;
        self.state
            .lock()
            .outcome
            .clone()
            .unwrap_or(PlaybackEnd::Stopped)
    }

    /// Records the first outcome only.
    fn finish(&self, end: PlaybackEnd) {
        let mut state = self.state.lock();
        if state.outcome.is_none() {
            state.outcome = Some(end);
        }
        drop(state);
        self.finished.cancel();
    }

    /// Next index to request, or how long to idle first.
    fn next_step(&self, last: Option<u64>) -> Result<u64, Duration> {
        let state = self.state.lock();
        let idle = self.config.idle_poll();
        let Some(clock) = state.clock.as_ref() else {
            return Err(idle);
        };
        if state.phase != Phase::Playing {
            return Err(idle);
        }

        let now = Instant::now();
        let target = clock.target_index(now);
        match last {
            Some(last) if target <= last => {
                Err(clock.until_index(last + 1, now).min(idle).max(Duration::from_millis(1)))
            }
            _ => Ok(target),
        }
    }

    async fn request(&self, request: &FrameRequest) -> Result<Option<Bytes>, ConnectionError> {
        let mut guard = self.connection.lock().await;
        match guard.as_mut() {
            Some(connection) => connection.request_frame(request).await,
            None => Err(ConnectionError::Closed),
        }
    }

    async fn run_playback(self: Arc<Self>) {
        let mut last: Option<u64> = None;

        let end = loop {
            let index = match self.next_step(last) {
                Ok(index) => index,
                Err(wait) => {
                    tokio::select! {
                        _ = self.stop.cancelled() => break PlaybackEnd::Stopped,
                        _ = tokio::time::sleep(wait) => {}
                    }
                    continue;
                }
            };

            let tier = self.tier();
            let request = FrameRequest::new(self.title.clone(), tier, index);
            let reply = tokio::select! {
                _ = self.stop.cancelled() => break PlaybackEnd::Stopped,
                reply = self.request(&request) => reply,
            };

            match reply {
                Ok(Some(data)) => {
                    if let Some(previous) = last {
                        if index > previous + 1 {
                            debug!("skipped {} frames", index - previous - 1);
                        }
                    }
                    last = Some(index);
                    if self.sink.try_send(Frame { index, tier, data }).is_err() {
                        debug!("renderer not keeping up, dropped frame {}", index);
                    }
                }
                Ok(None) => {
                    info!("end of stream for {} at frame {}", self.title, index);
                    break PlaybackEnd::EndOfStream { index };
                }
                Err(e) => {
                    if self.stop.is_cancelled() {
                        break PlaybackEnd::Stopped;
                    }
                    warn!("frame request {} failed: {}", request, e);
                    break PlaybackEnd::ConnectionLost(e.to_string());
                }
            }
        };

        if end != PlaybackEnd::Stopped {
            self.state.lock().phase = Phase::Stopped;
            self.stop.cancel();
            self.connection.close().await;
        }
        self.finish(end);
    }

    async fn run_tier_reevaluation(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.tier_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = self.stop.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if self.phase() != Phase::Playing {
                continue;
            }

            let latency = tokio::select! {
                _ = self.stop.cancelled() => break,
                latency = self.probe.measure() => latency,
            };
            let tier = ResolutionTier::for_latency(latency);
            let previous = self.set_tier(tier);
            if previous != tier {
                info!(
                    "latency {} -> switching {} to {}",
                    latency.map_or_else(|| "unavailable".to_string(), |ms| format!("{ms:.1} ms")),
                    previous,
                    tier
                );
            }
        }
    }
}
