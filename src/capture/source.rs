use color_eyre::Result;

use super::frame::Frame;

/// A live video source owned exclusively by one stream reader.
///
/// `Ok(None)` signals end of stream; an `Err` signals a decode failure. The
/// reader treats both as terminal - reconnection policy, if any, belongs to
/// the orchestrator.
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}
