use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local, Utc};
use color_eyre::{eyre::eyre, Result};
use image::{GrayImage, ImageFormat, RgbImage};
use tracing::info;

use crate::capture::frame::{Frame, PixelFormat};

/// Throttles the main loop to a minimum iteration duration. Call `delay()` at
/// the top of each iteration: if the previous iteration finished early, it
/// sleeps out the remainder; if it overran, it returns immediately.
pub struct LoopDelayer {
    minimum: Duration,
    last: Instant,
}

impl LoopDelayer {
    pub fn new(minimum: Duration) -> Self {
        Self {
            minimum,
            last: Instant::now(),
        }
    }

    pub fn delay(&mut self) {
        let elapsed = self.last.elapsed();
        if elapsed < self.minimum {
            std::thread::sleep(self.minimum - elapsed);
        }
        self.last = Instant::now();
    }
}

/// Logs a heartbeat every `interval` so long runs show up as alive in the log
/// file even when nothing is detected.
pub struct AliveLogger {
    interval: Duration,
    last: Instant,
}

impl AliveLogger {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Instant::now(),
        }
    }

    pub fn tick(&mut self) {
        if self.last.elapsed() > self.interval {
            info!("process is still running");
            self.last = Instant::now();
        }
    }
}

/// End time of the surveillance run from a "HH:MM" duration string.
pub fn overwatch_end(duration: &str) -> Result<DateTime<Utc>> {
    let (hours, minutes) = duration
        .split_once(':')
        .ok_or_else(|| eyre!("overwatch duration must be HH:MM, got {duration:?}"))?;
    let hours: i64 = hours
        .trim()
        .parse()
        .map_err(|_| eyre!("bad hours in overwatch duration {duration:?}"))?;
    let minutes: i64 = minutes
        .trim()
        .parse()
        .map_err(|_| eyre!("bad minutes in overwatch duration {duration:?}"))?;
    if hours < 0 || !(0..60).contains(&minutes) {
        return Err(eyre!("overwatch duration out of range: {duration:?}"));
    }
    let total = hours
        .checked_mul(60)
        .and_then(|h| h.checked_add(minutes))
        .and_then(chrono::Duration::try_minutes)
        .ok_or_else(|| eyre!("overwatch duration too large: {duration:?}"))?;
    Utc::now()
        .checked_add_signed(total)
        .ok_or_else(|| eyre!("overwatch duration too large: {duration:?}"))
}

/// Remaining run time as "HH:MM:SS", clamped at zero.
pub fn format_remaining(now: DateTime<Utc>, end: DateTime<Utc>) -> String {
    let total = (end - now).num_seconds().max(0);
    format!(
        "{:02}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}

/// JPEG-encode a frame for notification delivery or archiving.
pub fn encode_jpeg(frame: &Frame) -> Result<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    let (width, height) = (frame.width(), frame.height());
    match frame.meta.format {
        PixelFormat::Rgb24 => {
            let img = RgbImage::from_raw(width, height, frame.data.to_vec())
                .ok_or_else(|| eyre!("rgb frame shorter than {width}x{height}"))?;
            img.write_to(&mut out, ImageFormat::Jpeg)?;
        }
        PixelFormat::Gray8 => {
            let img = GrayImage::from_raw(width, height, frame.data.to_vec())
                .ok_or_else(|| eyre!("gray frame shorter than {width}x{height}"))?;
            img.write_to(&mut out, ImageFormat::Jpeg)?;
        }
    }
    Ok(out.into_inner())
}

/// Archive a detection frame as `YYYY_MM_DD___HH_MM_SS_<camera>.jpg`.
pub fn save_detection_frame(dir: &Path, frame: &Frame, camera: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let stamp = Local::now().format("%Y_%m_%d___%H_%M_%S");
    let path = dir.join(format!("{stamp}_{camera}.jpg"));
    std::fs::write(&path, encode_jpeg(frame)?)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use chrono::TimeZone;

    use super::*;

    fn rgb_frame() -> Frame {
        Frame::new(
            Bytes::from(vec![128u8; 8 * 8 * 3]),
            1,
            8,
            8,
            PixelFormat::Rgb24,
        )
    }

    #[test]
    fn delayer_enforces_minimum_iteration_time() {
        let minimum = Duration::from_millis(50);
        let mut delayer = LoopDelayer::new(minimum);

        let start = Instant::now();
        delayer.delay();
        delayer.delay();
        assert!(start.elapsed() >= Duration::from_millis(90));
    }

    #[test]
    fn overwatch_end_parses_hours_and_minutes() {
        let before = Utc::now();
        let end = overwatch_end("02:30").unwrap();
        let minutes = (end - before).num_minutes();
        assert!((149..=150).contains(&minutes));

        assert!(overwatch_end("0230").is_err());
        assert!(overwatch_end("xx:30").is_err());
        assert!(overwatch_end("1:75").is_err());
        // Absurd hour counts must error out, not overflow
        assert!(overwatch_end("9223372036854775807:00").is_err());
        assert!(overwatch_end("200000000000000000:00").is_err());
    }

    #[test]
    fn remaining_time_formats_and_clamps() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 1, 13, 5, 9).unwrap();
        assert_eq!(format_remaining(now, end), "01:05:09");
        assert_eq!(format_remaining(end, now), "00:00:00");
    }

    #[test]
    fn encoded_jpeg_is_decodable() {
        let jpeg = encode_jpeg(&rgb_frame()).unwrap();
        let img = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((img.width(), img.height()), (8, 8));
    }

    #[test]
    fn detection_frame_is_written_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = save_detection_frame(dir.path(), &rgb_frame(), "porch").unwrap();

        assert!(path.exists());
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.ends_with("_porch.jpg"), "unexpected name {name}");
    }
}
