//! Startup/shutdown of the whole set of camera sessions

use std::time::Duration;

use color_eyre::Result;
use tracing::info;

use crate::CameraConfig;

use super::session::CameraSession;
use super::source::FrameSource;

/// Grace period after signalling all readers to stop, so each can finish its
/// in-flight decode and release its source handle before the process exits.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// The set of active camera sessions, constructed together at startup and
/// torn down together at shutdown. Sessions are independent: a failed reader
/// in one never affects the others.
pub struct SessionRegistry {
    sessions: Vec<CameraSession>,
}

impl SessionRegistry {
    /// Open one session per configured camera. `make_source` produces the
    /// exclusive source handle for each camera; tests inject scripted sources
    /// through it.
    pub fn open<F>(
        cameras: &[CameraConfig],
        read_timeout: Duration,
        mut make_source: F,
    ) -> Result<Self>
    where
        F: FnMut(&CameraConfig) -> Result<Box<dyn FrameSource>>,
    {
        let mut sessions = Vec::with_capacity(cameras.len());
        for camera in cameras {
            info!(camera = %camera.name, address = %camera.address, "opening camera session");
            let source = make_source(camera)?;
            sessions.push(CameraSession::open(camera, read_timeout, source)?);
        }
        Ok(Self { sessions })
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn sessions(&self) -> &[CameraSession] {
        &self.sessions
    }

    pub fn sessions_mut(&mut self) -> &mut [CameraSession] {
        &mut self.sessions
    }

    /// Signal every reader to stop, then wait out the grace period.
    pub fn shutdown(self) {
        info!("stopping {} camera session(s)", self.sessions.len());
        for session in &self.sessions {
            session.stop();
        }
        std::thread::sleep(SHUTDOWN_GRACE);
    }
}
