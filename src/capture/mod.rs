pub mod decode;
pub mod frame;
pub mod reader;
pub mod registry;
pub mod session;
pub mod slot;
pub mod source;
pub mod v4l2;

pub use frame::{CropMargins, Frame, FrameMetadata, PixelFormat};
pub use reader::StreamReader;
pub use registry::SessionRegistry;
pub use session::CameraSession;
pub use slot::FrameSlot;
pub use source::FrameSource;
pub use v4l2::V4l2Source;
