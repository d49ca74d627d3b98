//! Live-edge correction
//!
//! Runs after every successful append. It keeps no state of its own: each
//! run inspects the buffered ranges and the playback position and reacts.

use tracing::debug;

use super::buffer::{DecoderBuffer, PlaybackSurface};

/// Drift, in seconds, above which playback jumps to the live edge
pub const DEFAULT_DRIFT_THRESHOLD: f64 = 0.5;

/// What one correction run did
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Correction {
    /// Live edge minus playback position, `None` when nothing is buffered
    pub drift: Option<f64>,
    /// Position playback was moved to
    pub seeked_to: Option<f64>,
    /// Playback was paused and a resume was attempted
    pub resumed: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct LiveEdgeCorrector {
    threshold: f64,
}

impl Default for LiveEdgeCorrector {
    fn default() -> Self {
        Self::new(DEFAULT_DRIFT_THRESHOLD)
    }
}

impl LiveEdgeCorrector {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Pin playback to the live edge
    ///
    /// Seeks hard when drift is strictly greater than the threshold, then
    /// resumes paused playback. A refused resume is logged and ignored.
    pub async fn correct(
        &self,
        buffer: &dyn DecoderBuffer,
        surface: &dyn PlaybackSurface,
    ) -> Correction {
        let Some(last) = buffer.buffered().last().copied() else {
            return Correction::default();
        };

        let live = last.end;
        let drift = live - surface.current_time();
        let mut correction = Correction {
            drift: Some(drift),
            ..Default::default()
        };

        if drift > self.threshold {
            debug!("Drift {:.3}s, seeking to live edge {:.3}", drift, live);
            surface.seek(live);
            correction.seeked_to = Some(live);
        }

        if surface.is_paused() {
            correction.resumed = true;
            if let Err(e) = surface.play().await {
                debug!("Resume ignored: {}", e);
            }
        }

        correction
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::headless::{HeadlessBuffer, HeadlessSurface};
    use crate::player::TimeRange;

    fn buffer_ending_at(end: f64) -> HeadlessBuffer {
        let buffer = HeadlessBuffer::new();
        buffer.set_ranges(vec![TimeRange::new(0.0, 1.0), TimeRange::new(2.0, end)]);
        buffer
    }

    #[tokio::test]
    async fn test_seeks_when_drift_exceeds_threshold() {
        let buffer = buffer_ending_at(10.0);
        let surface = HeadlessSurface::new();
        surface.seek(9.4);

        let correction = LiveEdgeCorrector::default()
            .correct(&buffer, &surface)
            .await;

        assert_eq!(correction.seeked_to, Some(10.0));
        assert_eq!(surface.current_time(), 10.0);
        assert!((correction.drift.unwrap() - 0.6).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_threshold_is_exclusive() {
        let buffer = buffer_ending_at(0.5);
        let surface = HeadlessSurface::new();

        let correction = LiveEdgeCorrector::default()
            .correct(&buffer, &surface)
            .await;
        assert_eq!(correction.drift, Some(0.5));
        assert_eq!(correction.seeked_to, None);
        assert_eq!(surface.current_time(), 0.0);

        let buffer = buffer_ending_at(0.5001);
        let correction = LiveEdgeCorrector::default()
            .correct(&buffer, &surface)
            .await;
        assert_eq!(correction.seeked_to, Some(0.5001));
    }

    #[tokio::test]
    async fn test_no_ranges_does_nothing() {
        let buffer = HeadlessBuffer::new();
        let surface = HeadlessSurface::new();
        surface.pause();

        let correction = LiveEdgeCorrector::default()
            .correct(&buffer, &surface)
            .await;
        assert_eq!(correction, Correction::default());
        assert!(surface.is_paused());
    }

    #[tokio::test]
    async fn test_resumes_paused_playback() {
        let buffer = buffer_ending_at(3.0);
        let surface = HeadlessSurface::new();
        surface.seek(2.9);
        surface.pause();

        let correction = LiveEdgeCorrector::default()
            .correct(&buffer, &surface)
            .await;
        assert!(correction.resumed);
        assert_eq!(correction.seeked_to, None);
        assert!(!surface.is_paused());
    }

    #[tokio::test]
    async fn test_refused_resume_is_swallowed() {
        let buffer = buffer_ending_at(3.0);
        let surface = HeadlessSurface::new();
        surface.pause();
        surface.refuse_play(true);

        let correction = LiveEdgeCorrector::default()
            .correct(&buffer, &surface)
            .await;
        assert!(correction.resumed);
        assert_eq!(correction.seeked_to, Some(3.0));
        assert!(surface.is_paused());
    }
}
