use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use serde::Deserialize;

/// Decoded frame with zero-copy semantics
#[derive(Clone)]
pub struct Frame {
    /// Immutable pixel data - can be shared across threads without copying
    pub data: Bytes,

    /// Frame metadata
    pub meta: Arc<FrameMetadata>,

    /// Capture timestamp for latency tracking
    pub timestamp: Instant,
}

/// Frame metadata
#[derive(Debug, Clone)]
pub struct FrameMetadata {
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

/// Pixel formats we support
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb24,
    Gray8,
}

/// Pixel counts trimmed from each frame edge before detection, configured
/// per camera as `[left, right, top, bottom]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(from = "[u32; 4]")]
pub struct CropMargins {
    pub left: u32,
    pub right: u32,
    pub top: u32,
    pub bottom: u32,
}

impl From<[u32; 4]> for CropMargins {
    fn from(v: [u32; 4]) -> Self {
        Self {
            left: v[0],
            right: v[1],
            top: v[2],
            bottom: v[3],
        }
    }
}

impl Frame {
    pub fn new(data: Bytes, sequence: u64, width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            data,
            meta: Arc::new(FrameMetadata {
                sequence,
                width,
                height,
                format,
            }),
            timestamp: Instant::now(),
        }
    }

    pub fn width(&self) -> u32 {
        self.meta.width
    }

    pub fn height(&self) -> u32 {
        self.meta.height
    }

    pub fn sequence(&self) -> u64 {
        self.meta.sequence
    }

    /// Trims the configured border off each edge, returning a new frame with
    /// the reduced dimensions. Margins that would consume a whole axis, or a
    /// data buffer shorter than the full frame, leave the frame untouched.
    pub fn crop(&self, margins: &CropMargins) -> Frame {
        let bpp = match self.meta.format {
            PixelFormat::Rgb24 => 3usize,
            PixelFormat::Gray8 => 1usize,
        };
        let width = self.meta.width as usize;
        let height = self.meta.height as usize;
        let (left, right) = (margins.left as usize, margins.right as usize);
        let (top, bottom) = (margins.top as usize, margins.bottom as usize);

        if left + right >= width || top + bottom >= height || self.data.len() < width * height * bpp
        {
            return self.clone();
        }

        let new_width = width - left - right;
        let new_height = height - top - bottom;
        let row_stride = width * bpp;
        let mut out = Vec::with_capacity(new_width * new_height * bpp);
        for row in top..height - bottom {
            let start = row * row_stride + left * bpp;
            out.extend_from_slice(&self.data[start..start + new_width * bpp]);
        }

        Frame {
            data: Bytes::from(out),
            meta: Arc::new(FrameMetadata {
                sequence: self.meta.sequence,
                width: new_width as u32,
                height: new_height as u32,
                format: self.meta.format,
            }),
            timestamp: self.timestamp,
        }
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("sequence", &self.meta.sequence)
            .field("width", &self.meta.width)
            .field("height", &self.meta.height)
            .field("format", &self.meta.format)
            .field("bytes", &self.data.len())
            .finish()
    }
}
