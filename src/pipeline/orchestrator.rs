//! The surveillance loop: read, detect, filter, notify

use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use color_eyre::Result;
use tracing::{debug, info, warn};

use crate::capture::session::CameraSession;
use crate::capture::SessionRegistry;
use crate::notify::{Notice, NotifierHandle};
use crate::pipeline::detect::{Detection, Detector};
use crate::pipeline::zones::{in_any_zone, Zone};
use crate::utils::{format_remaining, overwatch_end, save_detection_frame, AliveLogger, LoopDelayer};
use crate::{Config, ModelConfig};

/// Round-robin all camera sessions until the overwatch window elapses.
///
/// The consumer side is deliberately single-threaded: one control thread
/// services every session in turn, blocking at most one read timeout per
/// camera per iteration.
pub fn run(
    config: &Config,
    registry: &mut SessionRegistry,
    detector: &mut dyn Detector,
    notifier: &NotifierHandle,
) -> Result<()> {
    let end = overwatch_end(&config.parameters.overwatch_time)?;
    info!(until = %end, cameras = registry.len(), "starting surveillance");

    let mut delayer = LoopDelayer::new(Duration::from_secs_f64(config.parameters.min_loop_secs));
    let mut alive = AliveLogger::new(Duration::from_secs(config.parameters.alive_log_minutes * 60));
    let mut iteration = 0u64;

    while Utc::now() < end {
        delayer.delay();
        alive.tick();
        iteration += 1;
        debug!(iteration, remaining = %format_remaining(Utc::now(), end), "loop iteration");

        for session in registry.sessions_mut() {
            process_camera(session, config, detector, notifier)?;
        }
    }

    info!("surveillance window elapsed");
    Ok(())
}

/// One read-detect-filter-notify cycle for one camera.
///
/// A timed-out read skips the cycle (and checks the failure-report
/// threshold) without touching the streak; a frame with zero qualifying
/// detections resets it.
pub fn process_camera(
    session: &mut CameraSession,
    config: &Config,
    detector: &mut dyn Detector,
    notifier: &NotifierHandle,
) -> Result<()> {
    let Some(frame) = session.read() else {
        info!(camera = %session.name(), "skipping cycle, read timed out");
        if session.should_report_failure(config.parameters.timeouts_before_failure_report) {
            notifier.send(Notice::CameraFailure {
                camera: session.name().to_string(),
                timeouts: session.consecutive_timeouts(),
                level: 2,
            });
        }
        return Ok(());
    };

    // Trim the configured border before detection so edge artifacts
    // (timestamps, vignetting) never produce detections.
    let frame = match session.crop() {
        Some(margins) => frame.crop(margins),
        None => frame,
    };

    let detections = detector.detect(&frame)?;
    let qualifying = qualifying_detections(
        &detections,
        &config.model,
        session.zones(),
        frame.width(),
        frame.height(),
    );

    if qualifying > 0 {
        let since_last = session.record_detection();
        debug!(
            camera = %session.name(),
            streak = session.streak(),
            since_last_notification_secs = since_last.num_seconds(),
            qualifying,
            "detection streak advanced"
        );

        let min_interval = chrono::Duration::seconds(config.notify.min_interval_secs as i64);
        if session.qualifies_for_notification(config.parameters.min_detections_in_a_row, min_interval)
        {
            info!(camera = %session.name(), streak = session.streak(), "object spotted");
            if config.parameters.save_frames {
                if let Err(e) =
                    save_detection_frame(Path::new(&config.parameters.frames_dir), &frame, session.name())
                {
                    warn!(camera = %session.name(), error = %e, "failed to archive detection frame");
                }
            }
            notifier.send(Notice::DetectionFrame {
                camera: session.name().to_string(),
                frame,
                level: 1,
            });
            session.mark_notified();
        }
    } else {
        session.reset_streak();
    }

    Ok(())
}

/// Count detections that pass the model's class/confidence filter and fall
/// outside every exclusion zone.
fn qualifying_detections(
    detections: &[Detection],
    model: &ModelConfig,
    zones: &[Zone],
    frame_width: u32,
    frame_height: u32,
) -> usize {
    detections
        .iter()
        .filter(|d| model.classes.contains(&d.class_id) && d.confidence > model.confidence)
        .filter(|d| !in_any_zone(d.bbox.anchor_point(), zones, frame_width, frame_height))
        .count()
}
