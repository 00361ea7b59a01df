//! V4L2 camera source with memory-mapped capture

use bytes::Bytes;
use color_eyre::{eyre::eyre, Result};
use tracing::info;
use v4l::buffer::Type;
use v4l::capability::Flags as CapFlags;
use v4l::io::traits::CaptureStream;
use v4l::prelude::MmapStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use super::decode;
use super::frame::{Frame, PixelFormat};
use super::source::FrameSource;

const BUFFER_COUNT: u32 = 4;

/// Exclusive handle to a V4L2 capture device. Frames are decoded to RGB24
/// before publishing so downstream detectors always see plain pixels.
pub struct V4l2Source {
    device: Box<Device>,
    stream: Option<MmapStream<'static>>,
    fourcc: FourCC,
    width: u32,
    height: u32,
    sequence: u64,
}

impl V4l2Source {
    /// Open a device path, preferring MJPEG and falling back to YUYV. The
    /// device's current resolution is kept.
    pub fn open(path: &str) -> Result<Self> {
        let device = Device::with_path(path)?;

        let caps = device.query_caps()?;
        info!(device = %path, card = %caps.card, driver = %caps.driver, "opened capture device");
        if !caps.capabilities.contains(CapFlags::VIDEO_CAPTURE) {
            return Err(eyre!("{path} does not support video capture"));
        }

        let mjpg = FourCC::new(b"MJPG");
        let yuyv = FourCC::new(b"YUYV");
        let supported: Vec<FourCC> = device
            .enum_formats()?
            .into_iter()
            .map(|f| f.fourcc)
            .collect();
        let fourcc = if supported.contains(&mjpg) {
            mjpg
        } else if supported.contains(&yuyv) {
            yuyv
        } else {
            return Err(eyre!("{path} offers neither MJPG nor YUYV"));
        };

        let mut fmt = device.format()?;
        fmt.fourcc = fourcc;
        let fmt = device.set_format(&fmt)?;
        info!(device = %path, format = %fmt.fourcc, width = fmt.width, height = fmt.height, "negotiated capture format");

        Ok(Self {
            device: Box::new(device),
            stream: None,
            fourcc,
            width: fmt.width,
            height: fmt.height,
            sequence: 0,
        })
    }
}

impl FrameSource for V4l2Source {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.stream.is_none() {
            self.stream = Some(MmapStream::with_buffers(
                &self.device,
                Type::VideoCapture,
                BUFFER_COUNT,
            )?);
        }
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| eyre!("capture stream not started"))?;

        let (buf, _meta) = stream.next()?;

        let (rgb, width, height) = if self.fourcc == FourCC::new(b"MJPG") {
            decode::mjpeg_to_rgb(buf)?
        } else {
            (
                decode::yuyv_to_rgb(buf, self.width, self.height)?,
                self.width,
                self.height,
            )
        };

        self.sequence += 1;
        Ok(Some(Frame::new(
            Bytes::from(rgb),
            self.sequence,
            width,
            height,
            PixelFormat::Rgb24,
        )))
    }
}
