//! Operator notification: verbose-gated delivery on a background worker

pub mod telegram;

use std::thread::JoinHandle;

use color_eyre::{eyre::eyre, Result};
use crossbeam::channel::{unbounded, Sender};
use tracing::{info, warn};

use crate::capture::frame::Frame;

/// Something the operator should hear about. Each notice carries an
/// importance level; a notice is delivered only when the configured runtime
/// verbosity is at least that level (level 1 = most important).
#[derive(Debug, Clone)]
pub enum Notice {
    Text { text: String, level: u8 },
    DetectionFrame { camera: String, frame: Frame, level: u8 },
    CameraFailure { camera: String, timeouts: u32, level: u8 },
}

impl Notice {
    pub fn level(&self) -> u8 {
        match self {
            Notice::Text { level, .. }
            | Notice::DetectionFrame { level, .. }
            | Notice::CameraFailure { level, .. } => *level,
        }
    }
}

/// Delivery backend (Telegram, logs, a test collector).
pub trait Notifier: Send {
    fn notify(&mut self, notice: &Notice) -> Result<()>;
}

/// Fallback notifier that only writes to the log. Used when no bot token is
/// configured.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&mut self, notice: &Notice) -> Result<()> {
        match notice {
            Notice::Text { text, .. } => info!(%text, "notice"),
            Notice::DetectionFrame { camera, frame, .. } => {
                info!(%camera, sequence = frame.sequence(), "detection frame notice")
            }
            Notice::CameraFailure { camera, timeouts, .. } => {
                info!(%camera, timeouts, "camera failure notice")
            }
        }
        Ok(())
    }
}

/// Handle to the notifier worker thread. The monitoring loop only enqueues;
/// slow delivery (HTTP round-trips) never stalls a detection cycle.
pub struct NotifierHandle {
    tx: Option<Sender<Notice>>,
    worker: Option<JoinHandle<()>>,
}

impl NotifierHandle {
    pub fn spawn(mut notifier: Box<dyn Notifier>, verbose_level: u8) -> Result<Self> {
        let (tx, rx) = unbounded::<Notice>();

        let worker = std::thread::Builder::new()
            .name("notifier".into())
            .spawn(move || {
                for notice in rx {
                    if notice.level() > verbose_level {
                        continue;
                    }
                    if let Err(e) = notifier.notify(&notice) {
                        warn!(error = %e, "notification delivery failed");
                    }
                }
            })
            .map_err(|e| eyre!("failed to spawn notifier thread: {e}"))?;

        Ok(Self {
            tx: Some(tx),
            worker: Some(worker),
        })
    }

    pub fn send(&self, notice: Notice) {
        if let Some(tx) = &self.tx {
            if tx.send(notice).is_err() {
                warn!("notifier worker is gone, dropping notice");
            }
        }
    }

    /// Flush queued notices and stop the worker.
    pub fn shutdown(mut self) {
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("notifier thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Clone, Default)]
    struct Collector {
        seen: Arc<Mutex<Vec<String>>>,
    }

    impl Notifier for Collector {
        fn notify(&mut self, notice: &Notice) -> Result<()> {
            let entry = match notice {
                Notice::Text { text, .. } => format!("text:{text}"),
                Notice::DetectionFrame { camera, .. } => format!("frame:{camera}"),
                Notice::CameraFailure {
                    camera, timeouts, ..
                } => format!("failure:{camera}:{timeouts}"),
            };
            self.seen.lock().unwrap().push(entry);
            Ok(())
        }
    }

    #[test]
    fn worker_delivers_in_order_and_flushes_on_shutdown() {
        let collector = Collector::default();
        let seen = Arc::clone(&collector.seen);

        let handle = NotifierHandle::spawn(Box::new(collector), 3).unwrap();
        handle.send(Notice::Text {
            text: "starting".into(),
            level: 3,
        });
        handle.send(Notice::CameraFailure {
            camera: "yard".into(),
            timeouts: 5,
            level: 2,
        });
        handle.shutdown();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.as_slice(), ["text:starting", "failure:yard:5"]);
    }

    #[test]
    fn notices_above_verbosity_are_dropped() {
        let collector = Collector::default();
        let seen = Arc::clone(&collector.seen);

        let handle = NotifierHandle::spawn(Box::new(collector), 1).unwrap();
        handle.send(Notice::Text {
            text: "chatty".into(),
            level: 3,
        });
        handle.send(Notice::Text {
            text: "urgent".into(),
            level: 1,
        });
        handle.shutdown();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.as_slice(), ["text:urgent"]);
    }
}
