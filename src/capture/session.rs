//! Per-camera session: reader + slot + consumer-side counters

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use color_eyre::Result;
use tracing::debug;

use crate::pipeline::zones::Zone;
use crate::CameraConfig;

use super::frame::{CropMargins, Frame};
use super::reader::StreamReader;
use super::slot::FrameSlot;
use super::source::FrameSource;

/// "Never notified yet" sentinel: 2000-01-01 01:01:01 UTC, far enough in the
/// past that any notification interval is already satisfied.
fn notification_epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2000, 1, 1, 1, 1, 1)
        .single()
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// One monitored camera: a background stream reader behind a single-slot
/// channel, plus the detection-streak and timeout accounting the monitoring
/// loop needs.
///
/// All counters are touched only by the consumer thread; the reader only ever
/// touches the slot.
pub struct CameraSession {
    name: String,
    address: String,
    zones: Vec<Zone>,
    show_window: bool,
    crop: Option<CropMargins>,
    read_timeout: Duration,
    slot: Arc<FrameSlot>,
    reader: StreamReader,
    detections_in_a_row: u32,
    last_detection_time: DateTime<Utc>,
    consecutive_read_timeouts: u32,
}

impl CameraSession {
    /// Open a session over the given source. The source handle moves to the
    /// reader thread and is released when the reader stops.
    pub fn open(
        config: &CameraConfig,
        read_timeout: Duration,
        source: Box<dyn FrameSource>,
    ) -> Result<Self> {
        let slot = Arc::new(FrameSlot::new());
        let reader = StreamReader::spawn(&config.name, source, Arc::clone(&slot))?;

        Ok(Self {
            name: config.name.clone(),
            address: config.address.clone(),
            zones: config.zones.clone(),
            show_window: config.show_window,
            crop: config.crop,
            read_timeout,
            slot,
            reader,
            detections_in_a_row: 0,
            last_detection_time: notification_epoch(),
            consecutive_read_timeouts: 0,
        })
    }

    /// Fetch the newest frame, waiting up to the session's fixed read
    /// timeout. `None` means "skip this cycle for this camera": the timeout
    /// counter is incremented and the caller moves on.
    pub fn read(&mut self) -> Option<Frame> {
        match self.slot.take(self.read_timeout) {
            Some(frame) => {
                self.consecutive_read_timeouts = 0;
                Some(frame)
            }
            None => {
                self.consecutive_read_timeouts += 1;
                debug!(
                    camera = %self.name,
                    consecutive = self.consecutive_read_timeouts,
                    "read timed out"
                );
                None
            }
        }
    }

    /// Record one processed frame with a qualifying detection. Returns the
    /// time elapsed since the last notification.
    pub fn record_detection(&mut self) -> chrono::Duration {
        self.detections_in_a_row += 1;
        Utc::now() - self.last_detection_time
    }

    /// Called once per cycle when a frame was obtained but carried no
    /// qualifying detection. A timed-out read does NOT reset the streak.
    pub fn reset_streak(&mut self) {
        self.detections_in_a_row = 0;
    }

    /// True iff the streak has reached `min_streak` AND more than
    /// `min_interval` has passed since the last notification. Read-then-commit:
    /// the caller delivers the notification and then calls `mark_notified`.
    pub fn qualifies_for_notification(&self, min_streak: u32, min_interval: chrono::Duration) -> bool {
        self.detections_in_a_row >= min_streak
            && Utc::now() - self.last_detection_time > min_interval
    }

    /// Restart the notification interval after a delivered notification.
    pub fn mark_notified(&mut self) {
        self.last_detection_time = Utc::now();
    }

    /// The failure report fires only at the exact threshold crossing, so N
    /// consecutive timeouts produce exactly one report, not one per cycle.
    pub fn should_report_failure(&self, threshold: u32) -> bool {
        threshold > 0 && self.consecutive_read_timeouts == threshold
    }

    /// Signal the reader to stop. Cooperative: the caller should allow a
    /// short grace period before process exit so the source handle gets
    /// released.
    pub fn stop(&self) {
        self.reader.stop();
    }

    pub fn is_running(&self) -> bool {
        self.reader.is_running()
    }

    /// Wait for the reader thread to exit (after `stop()`).
    pub fn join(&mut self) {
        self.reader.join();
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    pub fn show_window(&self) -> bool {
        self.show_window
    }

    /// Border trim to apply before detection, if configured for this camera.
    pub fn crop(&self) -> Option<&CropMargins> {
        self.crop.as_ref()
    }

    pub fn streak(&self) -> u32 {
        self.detections_in_a_row
    }

    pub fn consecutive_timeouts(&self) -> u32 {
        self.consecutive_read_timeouts
    }

    #[cfg(test)]
    pub(crate) fn set_last_detection_time(&mut self, when: DateTime<Utc>) {
        self.last_detection_time = when;
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::capture::frame::PixelFormat;

    /// Source that emits nothing and never ends until dropped.
    struct SilentSource;

    impl FrameSource for SilentSource {
        fn next_frame(&mut self) -> Result<Option<Frame>> {
            std::thread::sleep(Duration::from_millis(5));
            Ok(Some(Frame::new(
                Bytes::from_static(&[0u8; 12]),
                0,
                2,
                2,
                PixelFormat::Rgb24,
            )))
        }
    }

    /// Source that ends immediately, leaving the slot permanently empty.
    struct EmptySource;

    impl FrameSource for EmptySource {
        fn next_frame(&mut self) -> Result<Option<Frame>> {
            Ok(None)
        }
    }

    fn camera_config() -> CameraConfig {
        CameraConfig {
            name: "front-door".into(),
            address: "/dev/video0".into(),
            zones: Vec::new(),
            show_window: false,
            crop: None,
        }
    }

    fn session_with_empty_source() -> CameraSession {
        CameraSession::open(
            &camera_config(),
            Duration::from_millis(10),
            Box::new(EmptySource),
        )
        .unwrap()
    }

    #[test]
    fn read_timeout_increments_counter_and_success_resets_it() {
        let mut session = CameraSession::open(
            &camera_config(),
            Duration::from_millis(200),
            Box::new(SilentSource),
        )
        .unwrap();

        assert!(session.read().is_some());
        assert_eq!(session.consecutive_timeouts(), 0);

        session.stop();
        session.join();
        // Drain anything published before the stop landed
        while session.read().is_some() {}
        let timeouts = session.consecutive_timeouts();
        assert!(timeouts >= 1);

        assert!(session.read().is_none());
        assert_eq!(session.consecutive_timeouts(), timeouts + 1);
    }

    #[test]
    fn reset_streak_is_idempotent() {
        let mut session = session_with_empty_source();
        session.detections_in_a_row = 4;

        session.reset_streak();
        assert_eq!(session.streak(), 0);
        session.reset_streak();
        assert_eq!(session.streak(), 0);
    }

    #[test]
    fn notification_requires_streak_and_interval() {
        let mut session = session_with_empty_source();
        let min_interval = chrono::Duration::seconds(60);

        // Interval satisfied (epoch start), streak too short
        session.record_detection();
        session.record_detection();
        assert!(!session.qualifies_for_notification(3, min_interval));

        // Third consecutive detection, last notification 61s ago
        session.record_detection();
        session.set_last_detection_time(Utc::now() - chrono::Duration::seconds(61));
        assert!(session.qualifies_for_notification(3, min_interval));

        // Streak satisfied but notification too recent
        session.mark_notified();
        assert!(!session.qualifies_for_notification(3, min_interval));
    }

    #[test]
    fn first_detection_clears_interval_from_epoch() {
        use chrono::Datelike;

        let epoch = notification_epoch();
        assert_eq!((epoch.year(), epoch.month(), epoch.day()), (2000, 1, 1));

        let mut session = session_with_empty_source();
        session.record_detection();
        assert!(session.qualifies_for_notification(1, chrono::Duration::days(365)));
    }

    #[test]
    fn failure_report_fires_only_at_exact_threshold() {
        let mut session = session_with_empty_source();

        for expected in 1..=6u32 {
            assert!(session.read().is_none());
            assert_eq!(session.consecutive_timeouts(), expected);
            assert_eq!(session.should_report_failure(5), expected == 5);
        }
    }
}
