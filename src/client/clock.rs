use std::time::{Duration, Instant};

use crate::common::PlaybackError;

/// Wall-clock playback position with pause accounting.
///
/// Every method takes `now` so the arithmetic can be checked with synthetic instants.
#[derive(Debug, Clone)]
pub struct PlaybackClock {
    started: Instant,
    paused_total: Duration,
    paused_at: Option<Instant>,
    fps: f64,
}

impl PlaybackClock {
    pub fn start(now: Instant, fps: f64) -> Self {
        Self {
            started: now,
            paused_total: Duration::ZERO,
            paused_at: None,
            fps,
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused_at.is_some()
    }

    pub fn paused_total(&self) -> Duration {
        self.paused_total
    }

    /// Play time so far, excluding every paused interval. Frozen while paused.
    pub fn elapsed(&self, now: Instant) -> Duration {
        let until = self.paused_at.unwrap_or(now);
        until
            .saturating_duration_since(self.started)
            .saturating_sub(self.paused_total)
    }

    pub fn target_index(&self, now: Instant) -> u64 {
        (self.elapsed(now).as_secs_f64() * self.fps).floor() as u64
    }

    /// How long until `index` becomes the target. Zero if it already is.
    pub fn until_index(&self, index: u64, now: Instant) -> Duration {
        let due = Duration::from_nanos((index as f64 * 1e9 / self.fps).round() as u64);
        due.saturating_sub(self.elapsed(now))
    }

    pub fn pause(&mut self, now: Instant) -> Result<(), PlaybackError> {
        if self.paused_at.is_some() {
            return Err(PlaybackError::AlreadyPaused);
        }
        self.paused_at = Some(now);
        Ok(())
    }

    pub fn resume(&mut self, now: Instant) -> Result<(), PlaybackError> {
        let paused_at = self.paused_at.take().ok_or(PlaybackError::NotPaused)?;
        self.paused_total += now.saturating_duration_since(paused_at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    #[test]
    fn index_follows_wall_clock() {
        let t0 = Instant::now();
        let clock = PlaybackClock::start(t0, 30.0);
        assert_eq!(clock.target_index(t0), 0);
        assert_eq!(clock.target_index(t0 + ms(33)), 0);
        assert_eq!(clock.target_index(t0 + ms(34)), 1);
        assert_eq!(clock.target_index(t0 + Duration::from_secs(2)), 60);
    }

    #[test]
    fn paused_interval_is_excluded_exactly() {
        let t0 = Instant::now();
        let mut clock = PlaybackClock::start(t0, 30.0);

        clock.pause(t0 + ms(1_000)).expect("pause");
        let frozen = clock.target_index(t0 + ms(1_000));
        assert_eq!(frozen, 30);
        // No index advances while paused.
        assert_eq!(clock.target_index(t0 + ms(5_000)), frozen);
        assert_eq!(clock.target_index(t0 + ms(60_000)), frozen);

        clock.resume(t0 + ms(61_000)).expect("resume");
        assert_eq!(clock.paused_total(), ms(60_000));
        assert_eq!(clock.target_index(t0 + ms(61_000)), frozen);
        assert_eq!(clock.elapsed(t0 + ms(62_000)), ms(2_000));
        assert_eq!(clock.target_index(t0 + ms(62_000)), 60);
    }

    #[test]
    fn pause_and_resume_reject_invalid_transitions() {
        let t0 = Instant::now();
        let mut clock = PlaybackClock::start(t0, 30.0);
        assert_eq!(clock.resume(t0), Err(PlaybackError::NotPaused));
        clock.pause(t0).expect("pause");
        assert_eq!(clock.pause(t0), Err(PlaybackError::AlreadyPaused));
        assert!(clock.is_paused());
    }

    #[test]
    fn until_index_counts_down() {
        let t0 = Instant::now();
        let clock = PlaybackClock::start(t0, 10.0);
        assert_eq!(clock.until_index(1, t0), ms(100));
        assert_eq!(clock.until_index(1, t0 + ms(40)), ms(60));
        assert_eq!(clock.until_index(1, t0 + ms(500)), Duration::ZERO);
    }
}
