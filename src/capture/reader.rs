//! Background reader thread draining a camera source into a frame slot

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use color_eyre::{eyre::eyre, Result};
use tracing::{debug, warn};

use super::slot::FrameSlot;
use super::source::FrameSource;

/// Drains a `FrameSource` continuously on a dedicated thread, publishing each
/// decoded frame into the slot until the source ends or `stop()` is called.
///
/// Stopping is cooperative: the flag is checked around each decode, so stop
/// latency is bounded by one decode call. A frame decoded while stop was
/// requested is dropped, never published. The source handle is released
/// exactly once, when the thread exits.
pub struct StreamReader {
    stop: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl StreamReader {
    pub fn spawn(camera: &str, mut source: Box<dyn FrameSource>, slot: Arc<FrameSlot>) -> Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let running = Arc::new(AtomicBool::new(true));

        let thread_stop = Arc::clone(&stop);
        let thread_running = Arc::clone(&running);
        let name = camera.to_string();

        let handle = std::thread::Builder::new()
            .name(format!("reader-{camera}"))
            .spawn(move || {
                loop {
                    if thread_stop.load(Ordering::Acquire) {
                        debug!(camera = %name, "stop requested, reader exiting");
                        break;
                    }
                    match source.next_frame() {
                        Ok(Some(frame)) => {
                            if thread_stop.load(Ordering::Acquire) {
                                debug!(camera = %name, "stop requested mid-decode, dropping frame");
                                break;
                            }
                            slot.publish(frame);
                        }
                        Ok(None) => {
                            debug!(camera = %name, "end of stream, reader exiting");
                            break;
                        }
                        Err(e) => {
                            warn!(camera = %name, error = %e, "decode failed, reader exiting");
                            break;
                        }
                    }
                }
                // Release the source handle before signalling termination
                drop(source);
                slot.close();
                thread_running.store(false, Ordering::Release);
            })
            .map_err(|e| eyre!("failed to spawn reader thread: {e}"))?;

        Ok(Self {
            stop,
            running,
            handle: Some(handle),
        })
    }

    /// Request a cooperative stop. Returns immediately; the reader completes
    /// at most one in-flight decode before exiting.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Wait for the reader thread to exit. Used after `stop()` when the
    /// caller wants a hard guarantee that the source handle was released.
    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("reader thread panicked");
            }
        }
    }
}

impl Drop for StreamReader {
    fn drop(&mut self) {
        self.stop();
    }
}
