//! In-process camera backend for tests and demos.
//!
//! A `SimulatedCamera` serves events pushed through its `SimulatedFeed`, and
//! records everything done to it in a `SimulatedProbe` that stays readable
//! after the camera has moved into a worker thread.

use crate::{
    CameraDevice, CameraError, CameraSystem, ConfigError, DeviceBuffer, DeviceDescriptor,
    NodeWrite, PixelFormat, RetrieveError,
};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Clone)]
enum SimEvent {
    Frame {
        width: u32,
        height: u32,
        pixel_format: PixelFormat,
        data: Option<Vec<u8>>,
    },
    Incomplete {
        width: u32,
        height: u32,
    },
    Timeout,
    Fault(String),
}

/// Injects events into a `SimulatedCamera`.
#[derive(Clone)]
pub struct SimulatedFeed {
    sender: Sender<SimEvent>,
}

impl SimulatedFeed {
    fn push(&self, event: SimEvent) {
        // the camera keeps a sender of its own, so the channel never disconnects
        let _ = self.sender.send(event);
    }

    /// A complete Mono8 frame filled with a per-frame byte pattern.
    pub fn frame(&self, width: u32, height: u32) {
        self.push(SimEvent::Frame {
            width,
            height,
            pixel_format: PixelFormat::Mono8,
            data: None,
        });
    }

    /// A complete frame with explicit payload.
    pub fn frame_with(&self, width: u32, height: u32, pixel_format: PixelFormat, data: Vec<u8>) {
        self.push(SimEvent::Frame {
            width,
            height,
            pixel_format,
            data: Some(data),
        });
    }

    pub fn incomplete(&self, width: u32, height: u32) {
        self.push(SimEvent::Incomplete { width, height });
    }

    /// An immediate retrieval timeout.
    pub fn timeout(&self) {
        self.push(SimEvent::Timeout);
    }

    /// A device fault, e.g. a disconnected cable.
    pub fn fault(&self, message: impl Into<String>) {
        self.push(SimEvent::Fault(message.into()));
    }

    /// Number of events not yet consumed by the camera.
    pub fn pending(&self) -> usize {
        self.sender.len()
    }
}

#[derive(Debug, Default)]
struct ProbeState {
    node_writes: Vec<NodeWrite>,
    failing_nodes: HashSet<&'static str>,
    software_triggers: u64,
    stream_begins: u64,
    stream_ends: u64,
    streaming: bool,
    retrieved: u64,
    released: u64,
    outstanding: HashSet<u64>,
    closed: bool,
}

/// Read-only view of what has been done to a `SimulatedCamera`.
#[derive(Clone, Default)]
pub struct SimulatedProbe {
    state: Arc<Mutex<ProbeState>>,
}

impl SimulatedProbe {
    fn lock(&self) -> MutexGuard<'_, ProbeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make every later write to `node` fail.
    pub fn fail_writes_to(&self, node: &'static str) {
        self.lock().failing_nodes.insert(node);
    }

    pub fn node_writes(&self) -> Vec<NodeWrite> {
        self.lock().node_writes.clone()
    }

    pub fn clear_node_writes(&self) {
        self.lock().node_writes.clear();
    }

    pub fn software_triggers(&self) -> u64 {
        self.lock().software_triggers
    }

    pub fn stream_begins(&self) -> u64 {
        self.lock().stream_begins
    }

    pub fn stream_ends(&self) -> u64 {
        self.lock().stream_ends
    }

    pub fn is_streaming(&self) -> bool {
        self.lock().streaming
    }

    pub fn retrieved(&self) -> u64 {
        self.lock().retrieved
    }

    pub fn released(&self) -> u64 {
        self.lock().released
    }

    /// Buffers retrieved but not yet released.
    pub fn outstanding(&self) -> usize {
        self.lock().outstanding.len()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

/// A fake triggered camera.
pub struct SimulatedCamera {
    descriptor: DeviceDescriptor,
    sender: Sender<SimEvent>,
    receiver: Receiver<SimEvent>,
    probe: SimulatedProbe,
    software_response: Option<(u32, u32)>,
    next_id: u64,
}

impl std::fmt::Debug for SimulatedCamera {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedCamera")
            .field("descriptor", &self.descriptor)
            .field("pending", &self.receiver.len())
            .finish()
    }
}

impl SimulatedCamera {
    pub fn new(model: impl Into<String>, serial: impl Into<String>) -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self {
            descriptor: DeviceDescriptor {
                index: 0,
                model: model.into(),
                serial: serial.into(),
            },
            sender,
            receiver,
            probe: SimulatedProbe::default(),
            software_response: None,
            next_id: 0,
        }
    }

    /// Produce one Mono8 frame of the given size for every software trigger.
    pub fn with_software_response(mut self, width: u32, height: u32) -> Self {
        self.software_response = Some((width, height));
        self
    }

    pub fn feed(&self) -> SimulatedFeed {
        SimulatedFeed {
            sender: self.sender.clone(),
        }
    }

    pub fn probe(&self) -> SimulatedProbe {
        self.probe.clone()
    }

    fn check_open(&self, operation: &str) {
        assert!(
            !self.probe.lock().closed,
            "{} called on closed camera {}",
            operation,
            self.descriptor.serial
        );
    }

    fn issue(&mut self, width: u32, height: u32, pixel_format: PixelFormat, data: Vec<u8>) -> DeviceBuffer {
        let id = self.next_id;
        self.next_id += 1;
        let mut state = self.probe.lock();
        state.retrieved += 1;
        state.outstanding.insert(id);
        DeviceBuffer::new(id, width, height, pixel_format, data)
    }
}

impl CameraDevice for SimulatedCamera {
    fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    fn write_trigger_node(&mut self, write: NodeWrite) -> Result<(), ConfigError> {
        self.check_open("write_trigger_node");
        let mut state = self.probe.lock();
        if state.failing_nodes.contains(write.node()) {
            return Err(ConfigError::NodeWrite {
                node: write.node(),
                message: "node is not writable".to_string(),
            });
        }
        state.node_writes.push(write);
        Ok(())
    }

    fn execute_software_trigger(&mut self) -> Result<(), CameraError> {
        self.check_open("execute_software_trigger");
        self.probe.lock().software_triggers += 1;
        if let Some((width, height)) = self.software_response {
            self.feed().frame(width, height);
        }
        Ok(())
    }

    fn is_streaming(&self) -> bool {
        self.probe.lock().streaming
    }

    fn begin_stream(&mut self) -> Result<(), CameraError> {
        self.check_open("begin_stream");
        let mut state = self.probe.lock();
        if state.streaming {
            return Err(CameraError::Stream("already streaming".to_string()));
        }
        state.streaming = true;
        state.stream_begins += 1;
        Ok(())
    }

    fn end_stream(&mut self) -> Result<(), CameraError> {
        let mut state = self.probe.lock();
        if state.streaming {
            state.streaming = false;
            state.stream_ends += 1;
        }
        Ok(())
    }

    fn retrieve_next(&mut self, timeout: Duration) -> Result<DeviceBuffer, RetrieveError> {
        self.check_open("retrieve_next");
        if !self.probe.lock().streaming {
            return Err(RetrieveError::Fault("camera is not streaming".to_string()));
        }
        match self.receiver.recv_timeout(timeout) {
            Ok(SimEvent::Frame {
                width,
                height,
                pixel_format,
                data,
            }) => {
                let data = data.unwrap_or_else(|| {
                    vec![(self.next_id % 251) as u8; pixel_format.frame_len(width, height)]
                });
                Ok(self.issue(width, height, pixel_format, data))
            }
            Ok(SimEvent::Incomplete { width, height }) => {
                let data = vec![0u8; PixelFormat::Mono8.frame_len(width, height) / 2];
                Ok(self
                    .issue(width, height, PixelFormat::Mono8, data)
                    .with_incomplete_status("IMAGE_DATA_INCOMPLETE"))
            }
            Ok(SimEvent::Timeout) | Err(RecvTimeoutError::Timeout) => Err(RetrieveError::Timeout),
            Ok(SimEvent::Fault(message)) => Err(RetrieveError::Fault(message)),
            Err(RecvTimeoutError::Disconnected) => {
                Err(RetrieveError::Fault("event feed disconnected".to_string()))
            }
        }
    }

    fn release(&mut self, buffer: DeviceBuffer) {
        let mut state = self.probe.lock();
        assert!(
            state.outstanding.remove(&buffer.id()),
            "buffer {} released twice or not issued by this camera",
            buffer.id()
        );
        state.released += 1;
    }

    fn close(&mut self) {
        let mut state = self.probe.lock();
        assert!(!state.closed, "camera {} closed twice", self.descriptor.serial);
        if !state.outstanding.is_empty() {
            log::error!(
                "simulated camera closed with {} unreleased buffers",
                state.outstanding.len()
            );
        }
        state.streaming = false;
        state.closed = true;
    }
}

/// A camera system serving a fixed set of simulated cameras.
///
/// Each camera can be opened once.
pub struct SimulatedSystem {
    descriptors: Vec<DeviceDescriptor>,
    cameras: Mutex<Vec<Option<SimulatedCamera>>>,
}

impl SimulatedSystem {
    pub fn new(cameras: Vec<SimulatedCamera>) -> Self {
        let cameras: Vec<SimulatedCamera> = cameras
            .into_iter()
            .enumerate()
            .map(|(index, mut camera)| {
                camera.descriptor.index = index;
                camera
            })
            .collect();
        Self {
            descriptors: cameras.iter().map(|c| c.descriptor.clone()).collect(),
            cameras: Mutex::new(cameras.into_iter().map(Some).collect()),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }
}

impl CameraSystem for SimulatedSystem {
    fn enumerate(&self) -> Vec<DeviceDescriptor> {
        self.descriptors.clone()
    }

    fn open(&self, index: usize) -> Result<Box<dyn CameraDevice>, CameraError> {
        let mut cameras = self.cameras.lock().unwrap_or_else(|e| e.into_inner());
        let count = cameras.len();
        if count == 0 {
            return Err(CameraError::NoDevice);
        }
        let slot = cameras
            .get_mut(index)
            .ok_or(CameraError::IndexOutOfRange { index, count })?;
        let camera = slot
            .take()
            .ok_or_else(|| CameraError::Device(format!("camera {index} is already open")))?;
        Ok(Box::new(camera))
    }
}
