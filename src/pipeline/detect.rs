//! Detection interface and the built-in frame-differencing detector

use color_eyre::{eyre::eyre, Result};

use crate::capture::frame::{Frame, PixelFormat};

/// Axis-aligned box in absolute pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    /// The point used for zone containment: horizontal midpoint, bottom-most
    /// vertical bound.
    pub fn anchor_point(&self) -> (f32, f32) {
        ((self.x1 + self.x2) / 2.0, self.y1.max(self.y2))
    }
}

/// One detected object on one frame.
#[derive(Debug, Clone)]
pub struct Detection {
    pub class_id: u32,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// Black-box object detector seam. External models (ONNX and friends) plug in
/// here; the monitoring loop only sees class id, confidence and box.
pub trait Detector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;
}

/// Motion detector based on per-cell luminance differencing against the
/// previous frame. The frame is divided into a grid of `cell_size` squares;
/// cells whose mean absolute luma delta exceeds `threshold` are clustered
/// (4-connectivity) and each cluster of at least `min_cells` becomes one
/// detection. Class id is always 0 ("motion").
pub struct FrameDiffDetector {
    cell_size: u32,
    threshold: f32,
    min_cells: usize,
    prev: Option<LumaPlane>,
}

struct LumaPlane {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl FrameDiffDetector {
    pub fn new(cell_size: u32, threshold: f32, min_cells: usize) -> Self {
        Self {
            cell_size: cell_size.max(1),
            threshold,
            min_cells: min_cells.max(1),
            prev: None,
        }
    }

    fn luma_plane(frame: &Frame) -> Result<LumaPlane> {
        let (width, height) = (frame.width(), frame.height());
        let pixels = (width as usize) * (height as usize);
        let data = match frame.meta.format {
            PixelFormat::Gray8 => {
                if frame.data.len() < pixels {
                    return Err(eyre!("gray frame shorter than {width}x{height}"));
                }
                frame.data[..pixels].to_vec()
            }
            PixelFormat::Rgb24 => {
                if frame.data.len() < pixels * 3 {
                    return Err(eyre!("rgb frame shorter than {width}x{height}"));
                }
                frame.data[..pixels * 3]
                    .chunks_exact(3)
                    .map(|px| {
                        (0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32) as u8
                    })
                    .collect()
            }
        };
        Ok(LumaPlane {
            width,
            height,
            data,
        })
    }

    /// Mean absolute delta for one grid cell.
    fn cell_delta(&self, prev: &LumaPlane, curr: &LumaPlane, cx: u32, cy: u32) -> f32 {
        let x0 = cx * self.cell_size;
        let y0 = cy * self.cell_size;
        let x1 = (x0 + self.cell_size).min(curr.width);
        let y1 = (y0 + self.cell_size).min(curr.height);

        let mut sum = 0u32;
        let mut count = 0u32;
        for y in y0..y1 {
            let row = (y * curr.width) as usize;
            for x in x0..x1 {
                let idx = row + x as usize;
                sum += curr.data[idx].abs_diff(prev.data[idx]) as u32;
                count += 1;
            }
        }
        if count == 0 {
            0.0
        } else {
            sum as f32 / count as f32
        }
    }

    fn clusters_to_detections(
        &self,
        active: &[bool],
        deltas: &[f32],
        cols: u32,
        rows: u32,
        frame_width: u32,
        frame_height: u32,
    ) -> Vec<Detection> {
        let mut visited = vec![false; active.len()];
        let mut detections = Vec::new();

        for start in 0..active.len() {
            if !active[start] || visited[start] {
                continue;
            }

            // Flood fill one connected cluster of active cells
            let mut stack = vec![start];
            visited[start] = true;
            let mut cells = Vec::new();
            while let Some(idx) = stack.pop() {
                cells.push(idx);
                let (cx, cy) = ((idx as u32) % cols, (idx as u32) / cols);
                let mut neighbors = Vec::with_capacity(4);
                if cx > 0 {
                    neighbors.push(idx - 1);
                }
                if cx + 1 < cols {
                    neighbors.push(idx + 1);
                }
                if cy > 0 {
                    neighbors.push(idx - cols as usize);
                }
                if cy + 1 < rows {
                    neighbors.push(idx + cols as usize);
                }
                for n in neighbors {
                    if active[n] && !visited[n] {
                        visited[n] = true;
                        stack.push(n);
                    }
                }
            }

            if cells.len() < self.min_cells {
                continue;
            }

            let mut min_cx = u32::MAX;
            let mut min_cy = u32::MAX;
            let mut max_cx = 0u32;
            let mut max_cy = 0u32;
            let mut delta_sum = 0.0f32;
            for &idx in &cells {
                let (cx, cy) = ((idx as u32) % cols, (idx as u32) / cols);
                min_cx = min_cx.min(cx);
                min_cy = min_cy.min(cy);
                max_cx = max_cx.max(cx);
                max_cy = max_cy.max(cy);
                delta_sum += deltas[idx];
            }
            let mean_delta = delta_sum / cells.len() as f32;

            detections.push(Detection {
                class_id: 0,
                confidence: (mean_delta / 255.0).min(1.0),
                bbox: BoundingBox {
                    x1: (min_cx * self.cell_size) as f32,
                    y1: (min_cy * self.cell_size) as f32,
                    x2: (((max_cx + 1) * self.cell_size).min(frame_width)) as f32,
                    y2: (((max_cy + 1) * self.cell_size).min(frame_height)) as f32,
                },
            });
        }

        detections
    }
}

impl Default for FrameDiffDetector {
    fn default() -> Self {
        Self::new(16, 25.0, 2)
    }
}

impl Detector for FrameDiffDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let curr = Self::luma_plane(frame)?;
        let prev = self.prev.take();

        let detections = match prev {
            Some(prev) if prev.width == curr.width && prev.height == curr.height => {
                let cols = curr.width.div_ceil(self.cell_size);
                let rows = curr.height.div_ceil(self.cell_size);
                let mut active = vec![false; (cols * rows) as usize];
                let mut deltas = vec![0.0f32; (cols * rows) as usize];

                for cy in 0..rows {
                    for cx in 0..cols {
                        let delta = self.cell_delta(&prev, &curr, cx, cy);
                        let idx = (cy * cols + cx) as usize;
                        deltas[idx] = delta;
                        active[idx] = delta >= self.threshold;
                    }
                }

                self.clusters_to_detections(
                    &active,
                    &deltas,
                    cols,
                    rows,
                    curr.width,
                    curr.height,
                )
            }
            // First frame, or the source changed resolution: nothing to diff
            _ => Vec::new(),
        };

        self.prev = Some(curr);
        Ok(detections)
    }
}
