//! V4L2 backend.
//!
//! V4L2 devices free-run; they have no trigger nodes. Only `NodeWrite::ModeOff`
//! is accepted, so the trigger configurator can still reset them.

use crate::{
    CameraDevice, CameraError, CameraSystem, ConfigError, DeviceBuffer, DeviceDescriptor,
    NodeWrite, PixelFormat, RetrieveError,
};
use std::collections::HashSet;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use v4l::buffer::Type;
use v4l::io::mmap::Stream as MmapStream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};

const BUFFER_COUNT: u32 = 4;

/// Enumerates `/dev/video*` capture nodes.
#[derive(Debug, Default)]
pub struct V4l2System;

impl CameraSystem for V4l2System {
    fn enumerate(&self) -> Vec<DeviceDescriptor> {
        v4l::context::enum_devices()
            .into_iter()
            .map(|node| DeviceDescriptor {
                index: node.index(),
                model: node.name().unwrap_or_else(|| "unknown".to_string()),
                serial: node.path().display().to_string(),
            })
            .collect()
    }

    fn open(&self, index: usize) -> Result<Box<dyn CameraDevice>, CameraError> {
        let devices = self.enumerate();
        if devices.is_empty() {
            return Err(CameraError::NoDevice);
        }
        let descriptor = devices
            .into_iter()
            .find(|d| d.index == index)
            .ok_or(CameraError::IndexOutOfRange {
                index,
                count: v4l::context::enum_devices().len(),
            })?;
        Ok(Box::new(V4l2Camera::open(descriptor)?))
    }
}

/// A V4L2 capture device streaming Mono8 (GREY) or YUYV.
pub struct V4l2Camera {
    descriptor: DeviceDescriptor,
    device: Device,
    stream: Option<MmapStream<'static>>,
    width: u32,
    height: u32,
    pixel_format: PixelFormat,
    next_id: u64,
    outstanding: HashSet<u64>,
    closed: bool,
}

impl std::fmt::Debug for V4l2Camera {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("V4l2Camera")
            .field("descriptor", &self.descriptor)
            .field("device", &"<v4l::Device>")
            .field("streaming", &self.stream.is_some())
            .finish()
    }
}

impl V4l2Camera {
    fn open(descriptor: DeviceDescriptor) -> Result<Self, CameraError> {
        let device = Device::new(descriptor.index)?;
        let format = Capture::format(&device)?;
        let pixel_format = match &format.fourcc.repr {
            b"GREY" => PixelFormat::Mono8,
            b"Y16 " => PixelFormat::Mono16,
            b"RGB3" => PixelFormat::Rgb8,
            b"BGR3" => PixelFormat::Bgr8,
            b"RGGB" => PixelFormat::BayerRg8,
            _ => {
                let format = Capture::set_format(
                    &device,
                    &v4l::Format::new(format.width, format.height, FourCC::new(b"GREY")),
                )?;
                if format.fourcc != FourCC::new(b"GREY") {
                    return Err(CameraError::Device(format!(
                        "unsupported pixel format: {}",
                        format.fourcc
                    )));
                }
                PixelFormat::Mono8
            }
        };
        Ok(Self {
            descriptor,
            device,
            stream: None,
            width: format.width,
            height: format.height,
            pixel_format,
            next_id: 0,
            outstanding: HashSet::new(),
            closed: false,
        })
    }
}

impl CameraDevice for V4l2Camera {
    fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    fn write_trigger_node(&mut self, write: NodeWrite) -> Result<(), ConfigError> {
        match write {
            NodeWrite::ModeOff => Ok(()),
            _ => Err(ConfigError::NodeWrite {
                node: write.node(),
                message: "V4L2 devices have no trigger nodes".to_string(),
            }),
        }
    }

    fn execute_software_trigger(&mut self) -> Result<(), CameraError> {
        Err(CameraError::Device("V4L2 devices have no software trigger".to_string()))
    }

    fn is_streaming(&self) -> bool {
        self.stream.is_some()
    }

    fn begin_stream(&mut self) -> Result<(), CameraError> {
        assert!(!self.closed, "begin_stream on closed V4L2 device");
        if self.stream.is_some() {
            return Err(CameraError::Stream("already streaming".to_string()));
        }
        let stream = MmapStream::with_buffers(&self.device, Type::VideoCapture, BUFFER_COUNT)
            .map_err(|e| CameraError::Stream(e.to_string()))?;
        self.stream = Some(stream);
        Ok(())
    }

    fn end_stream(&mut self) -> Result<(), CameraError> {
        self.stream.take();
        Ok(())
    }

    fn retrieve_next(&mut self, timeout: Duration) -> Result<DeviceBuffer, RetrieveError> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| RetrieveError::Fault("not streaming".to_string()))?;
        stream.set_timeout(timeout);
        let (data, metadata) = CaptureStream::next(stream)?;
        let expected = self.pixel_format.frame_len(self.width, self.height);
        let data = data[..(metadata.bytesused as usize).min(data.len())].to_vec();
        let complete = data.len() >= expected;
        let timestamp = UNIX_EPOCH
            + Duration::from_secs(metadata.timestamp.sec.max(0) as u64)
            + Duration::from_micros(metadata.timestamp.usec.max(0) as u64);

        let id = self.next_id;
        self.next_id += 1;
        self.outstanding.insert(id);
        let buffer = DeviceBuffer::new(id, self.width, self.height, self.pixel_format, data)
            .with_timestamp(if timestamp > UNIX_EPOCH { timestamp } else { SystemTime::now() });
        if complete {
            Ok(buffer)
        } else {
            Ok(buffer.with_incomplete_status(format!("short buffer ({} of {expected} bytes)", metadata.bytesused)))
        }
    }

    fn release(&mut self, buffer: DeviceBuffer) {
        // payload was copied out of the mmap buffer in retrieve_next
        assert!(
            self.outstanding.remove(&buffer.id()),
            "buffer {} released twice",
            buffer.id()
        );
    }

    fn close(&mut self) {
        assert!(!self.closed, "V4L2 device closed twice");
        self.stream.take();
        self.closed = true;
    }
}
