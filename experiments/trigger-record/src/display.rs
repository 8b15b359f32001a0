use minifb::Window;
use nvue_camera::{Frame, PixelFormat};
use nvue_video::DisplaySink;

/// Convert a frame to packed 0RGB u32 pixels for minifb.
pub fn frame_to_argb(frame: &Frame) -> Option<Vec<u32>> {
    let pixels = frame.width as usize * frame.height as usize;
    if frame.payload.len() < frame.pixel_format.frame_len(frame.width, frame.height) {
        return None;
    }
    let data = &frame.payload;
    let argb = match frame.pixel_format {
        PixelFormat::Mono8 | PixelFormat::BayerRg8 => data[..pixels]
            .iter()
            .map(|&v| gray(v))
            .collect(),
        PixelFormat::Mono16 => data[..pixels * 2]
            .chunks_exact(2)
            .map(|px| gray(px[1]))
            .collect(),
        PixelFormat::Rgb8 => data[..pixels * 3]
            .chunks_exact(3)
            .map(|px| pack(px[0], px[1], px[2]))
            .collect(),
        PixelFormat::Bgr8 => data[..pixels * 3]
            .chunks_exact(3)
            .map(|px| pack(px[2], px[1], px[0]))
            .collect(),
    };
    Some(argb)
}

fn gray(v: u8) -> u32 {
    pack(v, v, v)
}

fn pack(r: u8, g: u8, b: u8) -> u32 {
    ((r as u32) << 16) | ((g as u32) << 8) | b as u32
}

/// Presents frames in a minifb window.
pub struct WindowDisplay {
    window: Window,
}

impl WindowDisplay {
    pub fn new(window: Window) -> Self {
        Self { window }
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn window_mut(&mut self) -> &mut Window {
        &mut self.window
    }
}

impl DisplaySink for WindowDisplay {
    fn present(&mut self, frame: &Frame) {
        let Some(argb) = frame_to_argb(frame) else {
            log::warn!("display: short frame {}", frame.sequence);
            return;
        };
        if let Err(e) = self
            .window
            .update_with_buffer(&argb, frame.width as usize, frame.height as usize)
        {
            log::warn!("display: {}", e);
        }
    }
}
