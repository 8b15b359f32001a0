use std::time::SystemTime;

/// Pixel layout of a captured image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Mono8,
    Mono16,
    Rgb8,
    Bgr8,
    BayerRg8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Mono8 | PixelFormat::BayerRg8 => 1,
            PixelFormat::Mono16 => 2,
            PixelFormat::Rgb8 | PixelFormat::Bgr8 => 3,
        }
    }

    /// Expected payload length for an image of the given size.
    pub fn frame_len(&self, width: u32, height: u32) -> usize {
        width as usize * height as usize * self.bytes_per_pixel()
    }
}

/// A device-side image buffer, borrowed from the camera until released.
///
/// Obtained from `CameraDevice::retrieve_next` and handed back with
/// `CameraDevice::release`. The buffer id lets a backend detect double
/// releases.
#[derive(Debug)]
#[must_use = "device buffers must be handed back with CameraDevice::release"]
pub struct DeviceBuffer {
    id: u64,
    width: u32,
    height: u32,
    pixel_format: PixelFormat,
    data: Vec<u8>,
    timestamp: SystemTime,
    status: Option<String>,
}

impl DeviceBuffer {
    pub fn new(id: u64, width: u32, height: u32, pixel_format: PixelFormat, data: Vec<u8>) -> Self {
        Self {
            id,
            width,
            height,
            pixel_format,
            data,
            timestamp: SystemTime::now(),
            status: None,
        }
    }

    /// Mark the buffer as incomplete, with the device's image status.
    pub fn with_incomplete_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: SystemTime) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    pub fn is_complete(&self) -> bool {
        self.status.is_none()
    }

    /// Device status string for incomplete buffers.
    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }
}

/// A captured image owned by the host.
///
/// Built from a complete `DeviceBuffer` by copying its payload, so the device
/// buffer can be released right away.
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    pub payload: Vec<u8>,
    pub sequence: u64,
    pub capture_time: SystemTime,
    pub complete: bool,
}

impl Frame {
    pub fn from_buffer(buffer: &DeviceBuffer, sequence: u64) -> Self {
        Self {
            width: buffer.width,
            height: buffer.height,
            pixel_format: buffer.pixel_format,
            payload: buffer.data.clone(),
            sequence,
            capture_time: buffer.timestamp,
            complete: buffer.is_complete(),
        }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
