use color_eyre::{eyre::eyre, Result};
use jpeg_decoder::{Decoder, PixelFormat as JpegPixelFormat};

/// Decode one MJPEG frame to tightly packed RGB24.
pub fn mjpeg_to_rgb(data: &[u8]) -> Result<(Vec<u8>, u32, u32)> {
    let mut decoder = Decoder::new(data);
    let pixels = decoder.decode()?;
    let info = decoder
        .info()
        .ok_or_else(|| eyre!("jpeg decoder produced no image info"))?;

    let rgb = match info.pixel_format {
        JpegPixelFormat::RGB24 => pixels,
        JpegPixelFormat::L8 => {
            let mut rgb = Vec::with_capacity(pixels.len() * 3);
            for luma in pixels {
                rgb.extend_from_slice(&[luma, luma, luma]);
            }
            rgb
        }
        other => return Err(eyre!("unsupported jpeg pixel format {other:?}")),
    };

    Ok((rgb, info.width as u32, info.height as u32))
}

/// Convert packed YUYV 4:2:2 to RGB24 (BT.601 full range).
pub fn yuyv_to_rgb(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let expected = (width as usize) * (height as usize) * 2;
    if data.len() < expected {
        return Err(eyre!(
            "yuyv buffer too short: {} < {expected} for {width}x{height}",
            data.len()
        ));
    }

    let mut rgb = Vec::with_capacity((width as usize) * (height as usize) * 3);
    for chunk in data[..expected].chunks_exact(4) {
        let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
        for y in [y0, y1] {
            let c = y as f32;
            let d = u as f32 - 128.0;
            let e = v as f32 - 128.0;
            let r = (c + 1.402 * e).clamp(0.0, 255.0) as u8;
            let g = (c - 0.344_136 * d - 0.714_136 * e).clamp(0.0, 255.0) as u8;
            let b = (c + 1.772 * d).clamp(0.0, 255.0) as u8;
            rgb.extend_from_slice(&[r, g, b]);
        }
    }
    Ok(rgb)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yuyv_gray_maps_to_gray() {
        // Y=128, U=V=128 is mid gray in both pixels of the macropixel
        let data = [128u8, 128, 128, 128];
        let rgb = yuyv_to_rgb(&data, 2, 1).unwrap();
        assert_eq!(rgb.len(), 6);
        for c in rgb {
            assert!((125..=131).contains(&c), "expected near-gray, got {c}");
        }
    }

    #[test]
    fn yuyv_rejects_short_buffer() {
        assert!(yuyv_to_rgb(&[0u8; 4], 4, 4).is_err());
    }

    #[test]
    fn mjpeg_rejects_garbage() {
        assert!(mjpeg_to_rgb(&[0u8; 16]).is_err());
    }
}
