use crate::SinkError;
use image::ExtendedColorType;
use nvue_camera::{Frame, PixelFormat};
use std::path::Path;

/// Save one frame as a still image. The file format follows the extension
/// (`.png`, `.jpg`).
///
/// Bayer frames are stored as raw greyscale. Mono16 needs a format with
/// 16-bit support (PNG).
pub fn save_snapshot(frame: &Frame, path: &Path) -> Result<(), SinkError> {
    let expected = frame.pixel_format.frame_len(frame.width, frame.height);
    if frame.payload.len() < expected {
        return Err(SinkError::Write(format!(
            "payload is {} bytes, expected {}",
            frame.payload.len(),
            expected
        )));
    }
    let payload = &frame.payload[..expected];

    match frame.pixel_format {
        PixelFormat::Mono8 | PixelFormat::BayerRg8 => {
            image::save_buffer(path, payload, frame.width, frame.height, ExtendedColorType::L8)?
        }
        PixelFormat::Mono16 => {
            let samples: Vec<u16> = payload
                .chunks_exact(2)
                .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                .collect();
            let buffer: image::ImageBuffer<image::Luma<u16>, Vec<u16>> =
                image::ImageBuffer::from_raw(frame.width, frame.height, samples)
                    .ok_or_else(|| SinkError::Write("mono16 buffer size mismatch".to_string()))?;
            buffer.save(path)?
        }
        PixelFormat::Rgb8 => {
            image::save_buffer(path, payload, frame.width, frame.height, ExtendedColorType::Rgb8)?
        }
        PixelFormat::Bgr8 => {
            let rgb: Vec<u8> = payload
                .chunks_exact(3)
                .flat_map(|px| [px[2], px[1], px[0]])
                .collect();
            image::save_buffer(path, &rgb, frame.width, frame.height, ExtendedColorType::Rgb8)?
        }
    }
    log::info!("snapshot: saved frame {} to {}", frame.sequence, path.display());
    Ok(())
}
