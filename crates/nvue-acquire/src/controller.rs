//! The acquisition controller: owns one camera and its streaming lifecycle.

use crate::acquisition::{self, LoopContext, LoopOutcome};
use crate::{
    ControllerConfig, ControllerError, FrameHandoff, FrameMailbox, LoopCounters, LoopStats,
    RecordingRequest, RecordingSession, RecordingSummary, SessionFault, drain_queue,
    recording_queue,
};
use nvue_base::CancelToken;
use nvue_camera::{
    CameraDevice, CameraError, CameraSystem, ConfigError, DeviceDescriptor, TriggerConfig,
    TriggerMode, trigger,
};
use nvue_video::VideoSinkFactory;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinHandle};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquisitionState {
    Uninitialized,
    Initialized,
    Streaming,
    /// Transient: stop was requested and the loop is being joined.
    Draining,
    Closed,
}

impl AcquisitionState {
    pub fn can_transition_to(self, next: AcquisitionState) -> bool {
        use AcquisitionState::*;
        matches!(
            (self, next),
            (Uninitialized, Initialized)
                | (Uninitialized, Closed)
                | (Initialized, Streaming)
                | (Initialized, Closed)
                | (Streaming, Draining)
                | (Draining, Initialized)
                | (Draining, Closed)
        )
    }
}

/// Result of a completed streaming session.
#[derive(Clone, Debug)]
pub struct StopReport {
    pub stats: LoopStats,
    pub recording: Option<RecordingSummary>,
}

type DrainResult = (RecordingSession, Option<SessionFault>);

struct ActiveSession {
    cancel: CancelToken,
    acquisition: JoinHandle<LoopOutcome>,
    recording: Option<JoinHandle<DrainResult>>,
}

/// Coordinates trigger configuration, the acquisition loop, and recording
/// for one camera.
///
/// Operations that wait on background work are `async` and must run inside
/// a tokio runtime.
pub struct AcquisitionController {
    system: Arc<dyn CameraSystem>,
    sinks: Arc<dyn VideoSinkFactory>,
    config: ControllerConfig,
    state: AcquisitionState,
    history: Vec<AcquisitionState>,
    device: Option<Box<dyn CameraDevice>>,
    descriptor: Option<DeviceDescriptor>,
    active: Option<ActiveSession>,
    mailbox: FrameMailbox,
    counters: Arc<LoopCounters>,
    overwrite_base: u64,
}

impl AcquisitionController {
    pub fn new(
        system: Arc<dyn CameraSystem>,
        sinks: Arc<dyn VideoSinkFactory>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            system,
            sinks,
            config,
            state: AcquisitionState::Uninitialized,
            history: vec![AcquisitionState::Uninitialized],
            device: None,
            descriptor: None,
            active: None,
            mailbox: FrameMailbox::new(),
            counters: Arc::new(LoopCounters::default()),
            overwrite_base: 0,
        }
    }

    /// Reports `Initialized` once a streaming session has ended on its
    /// own. The session's fault is returned by the next `poll`, `stop` or
    /// `close`, which also records the transition in [`Self::history`].
    pub fn state(&self) -> AcquisitionState {
        if self.state == AcquisitionState::Streaming && self.session_exited() {
            return AcquisitionState::Initialized;
        }
        self.state
    }

    /// Every state entered so far, oldest first.
    pub fn history(&self) -> &[AcquisitionState] {
        &self.history
    }

    /// The display mailbox. Clones stay valid across streaming sessions.
    pub fn mailbox(&self) -> &FrameMailbox {
        &self.mailbox
    }

    /// The initialized device, if any.
    pub fn descriptor(&self) -> Option<&DeviceDescriptor> {
        self.descriptor.as_ref()
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn devices(&self) -> Vec<DeviceDescriptor> {
        self.system.enumerate()
    }

    /// Counters of the current, or most recent, streaming session.
    pub fn stats(&self) -> LoopStats {
        LoopStats {
            display_overwrites: self.mailbox.overwritten() - self.overwrite_base,
            ..self.counters.snapshot()
        }
    }

    /// Open the camera at `index`.
    pub fn initialize(&mut self, index: usize) -> Result<DeviceDescriptor, ControllerError> {
        match self.state {
            AcquisitionState::Uninitialized => {}
            AcquisitionState::Closed => return Err(ControllerError::Closed),
            state => {
                return Err(ControllerError::InvalidTransition {
                    state,
                    operation: "initialize",
                });
            }
        }

        let mut device = self.system.open(index).map_err(ControllerError::Init)?;
        let descriptor = device.descriptor().clone();
        log::info!(
            "controller: camera {} initialized (model {}, serial {})",
            descriptor.index,
            descriptor.model,
            descriptor.serial
        );
        end_stale_stream(device.as_mut()).map_err(ControllerError::Init)?;

        self.device = Some(device);
        self.descriptor = Some(descriptor.clone());
        self.enter(AcquisitionState::Initialized);
        Ok(descriptor)
    }

    /// Grab one frame with a software trigger and report its size.
    pub fn probe_frame_size(&mut self) -> Result<(u32, u32), ControllerError> {
        match self.state {
            AcquisitionState::Initialized => {}
            AcquisitionState::Closed => return Err(ControllerError::Closed),
            state => {
                return Err(ControllerError::InvalidTransition {
                    state,
                    operation: "probe frame size",
                });
            }
        }
        let timeout = self.config.retrieve_timeout();
        probe(self.device_mut()?, timeout)
    }

    /// Configure the trigger and start streaming, recording if requested.
    ///
    /// A session that ended on its own since the last call is reaped first;
    /// its fault, if any, is returned and streaming is not started.
    pub async fn start(
        &mut self,
        trigger_config: TriggerConfig,
        recording: Option<RecordingRequest>,
    ) -> Result<(), ControllerError> {
        self.poll().await?;
        match self.state {
            AcquisitionState::Initialized => {}
            AcquisitionState::Closed => return Err(ControllerError::Closed),
            state => {
                return Err(ControllerError::InvalidTransition {
                    state,
                    operation: "start",
                });
            }
        }

        if trigger_config.mode() == TriggerMode::Off {
            trigger::apply(self.device_mut()?, &trigger_config)?;
            return Err(ControllerError::Config(ConfigError::UnsupportedMode(
                TriggerMode::Off.to_string(),
            )));
        }

        let retrieve_timeout = self.config.retrieve_timeout();
        let sinks = Arc::clone(&self.sinks);
        let device = self.device_mut()?;
        end_stale_stream(device).map_err(ControllerError::Device)?;

        let frame_size = match &recording {
            Some(request) => Some(match request.frame_size() {
                Some(size) => size,
                None => probe(device, retrieve_timeout)?,
            }),
            None => None,
        };

        trigger::apply(device, &trigger_config)?;

        let session = match (&recording, frame_size) {
            (Some(request), Some((width, height))) => {
                let path = request.target().resolve(sinks.file_extension());
                Some(RecordingSession::begin(
                    sinks.as_ref(),
                    &path,
                    request.fps(),
                    width,
                    height,
                )?)
            }
            _ => None,
        };

        if let Err(error) = device.begin_stream() {
            if let Some(mut session) = session {
                if let Err(end_error) = session.end() {
                    log::warn!("controller: failed to close recording: {}", end_error);
                }
            }
            return Err(ControllerError::Device(error));
        }

        let cancel = CancelToken::new();
        let (handoff, recording) = match session {
            Some(session) => {
                let (sender, receiver) = recording_queue(
                    self.config.recording_queue_capacity(),
                    self.config.recording_push_timeout(),
                );
                let frame_size = session.frame_size();
                let drain_cancel = cancel.clone();
                let drain = tokio::task::spawn_blocking(move || {
                    drain_queue(session, receiver, drain_cancel)
                });
                (
                    FrameHandoff::with_recording(self.mailbox.clone(), sender, frame_size),
                    Some(drain),
                )
            }
            None => (FrameHandoff::display_only(self.mailbox.clone()), None),
        };

        self.counters = Arc::new(LoopCounters::default());
        self.overwrite_base = self.mailbox.overwritten();
        let ctx = LoopContext {
            retrieve_timeout,
            software_trigger: trigger_config.mode() == TriggerMode::Software
                && self.config.software_trigger_per_frame(),
            cancel: cancel.clone(),
            handoff,
            counters: Arc::clone(&self.counters),
        };
        let device = self
            .device
            .take()
            .ok_or_else(|| ControllerError::Internal("device missing".to_string()))?;
        let acquisition = tokio::task::spawn_blocking(move || acquisition::run(device, ctx));

        self.active = Some(ActiveSession {
            cancel,
            acquisition,
            recording,
        });
        self.enter(AcquisitionState::Streaming);
        Ok(())
    }

    /// Stop streaming and finish any recording.
    ///
    /// Returns `Ok(None)` when not streaming. A session fault is returned as
    /// `ControllerError::Session`; the controller is `Initialized` either way.
    pub async fn stop(&mut self) -> Result<Option<StopReport>, ControllerError> {
        if self.state != AcquisitionState::Streaming {
            return Ok(None);
        }
        self.finish_session().await.map(Some)
    }

    /// Reap a streaming session whose loop has already exited on its own,
    /// typically after a device or recording fault.
    pub async fn poll(&mut self) -> Result<Option<StopReport>, ControllerError> {
        if self.state != AcquisitionState::Streaming || !self.session_exited() {
            return Ok(None);
        }
        log::warn!("controller: acquisition loop ended without stop");
        self.finish_session().await.map(Some)
    }

    fn session_exited(&self) -> bool {
        self.active.as_ref().is_some_and(|active| {
            active.acquisition.is_finished()
                && active.recording.as_ref().is_none_or(JoinHandle::is_finished)
        })
    }

    /// Stop if streaming, then close the camera. Calling again does nothing.
    pub async fn close(&mut self) -> Result<(), ControllerError> {
        if self.state == AcquisitionState::Closed {
            return Ok(());
        }
        let stopped = self.stop().await;
        if let Some(mut device) = self.device.take() {
            device.close();
            log::info!("controller: camera closed");
        }
        if self.state != AcquisitionState::Closed {
            self.enter(AcquisitionState::Closed);
        }
        stopped.map(|_| ())
    }

    async fn finish_session(&mut self) -> Result<StopReport, ControllerError> {
        let active = self
            .active
            .take()
            .ok_or_else(|| ControllerError::Internal("no active session".to_string()))?;
        self.enter(AcquisitionState::Draining);
        active.cancel.cancel();

        let ActiveSession {
            mut acquisition,
            recording,
            ..
        } = active;
        let join_timeout = self.config.join_timeout();
        let outcome = match join_within(&mut acquisition, join_timeout).await {
            Ok(outcome) => outcome,
            Err(message) => {
                log::error!("controller: {}", message);
                tokio::spawn(reap_abandoned(acquisition, recording));
                self.enter(AcquisitionState::Closed);
                return Err(ControllerError::Internal(message));
            }
        };
        self.device = Some(outcome.device);

        let (recording, drain_fault) = match recording {
            Some(mut drain) => match join_within(&mut drain, join_timeout).await {
                // the worker has already ended the session; this returns its summary
                Ok((mut session, drain_fault)) => match session.end() {
                    Ok(summary) => (Some(summary), drain_fault),
                    Err(error) => (None, drain_fault.or(Some(SessionFault::Sink(error)))),
                },
                Err(message) => {
                    log::error!("controller: recording {}", message);
                    tokio::spawn(reap_abandoned_drain(drain));
                    self.enter(AcquisitionState::Initialized);
                    return Err(ControllerError::Internal(message));
                }
            },
            None => (None, None),
        };

        // a failed drain closes the queue under the loop
        let fault = match (outcome.fault, drain_fault) {
            (
                Some(SessionFault::RecordingClosed | SessionFault::RecordingTimeout { .. }),
                Some(drain),
            ) => Some(drain),
            (Some(fault), _) => Some(fault),
            (None, drain) => drain,
        };

        let stats = self.stats();
        log::info!(
            "controller: stopped after {} frames ({} incomplete, {} timeouts)",
            stats.frames,
            stats.incomplete,
            stats.timeouts
        );
        self.enter(AcquisitionState::Initialized);
        match fault {
            Some(fault) => Err(ControllerError::Session(fault)),
            None => Ok(StopReport { stats, recording }),
        }
    }

    fn device_mut(&mut self) -> Result<&mut (dyn CameraDevice + 'static), ControllerError> {
        self.device
            .as_deref_mut()
            .ok_or_else(|| ControllerError::Internal("device missing".to_string()))
    }

    fn enter(&mut self, next: AcquisitionState) {
        assert!(
            self.state.can_transition_to(next),
            "invalid state transition {:?} -> {:?}",
            self.state,
            next
        );
        log::debug!("controller: {:?} -> {:?}", self.state, next);
        self.state = next;
        self.history.push(next);
    }
}

impl Drop for AcquisitionController {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.cancel.cancel();
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                runtime.spawn(reap_abandoned(active.acquisition, active.recording));
            }
        }
        if let Some(mut device) = self.device.take() {
            device.close();
        }
    }
}

/// Join a blocking worker, giving up after `timeout`. The handle stays
/// usable on timeout. A worker panic is propagated to the caller.
async fn join_within<T>(handle: &mut JoinHandle<T>, timeout: Duration) -> Result<T, String> {
    match tokio::time::timeout(timeout, handle).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(error)) => Err(join_failure(error)),
        Err(_) => Err(format!("worker did not exit within {:?}", timeout)),
    }
}

fn join_failure(error: JoinError) -> String {
    if error.is_panic() {
        std::panic::resume_unwind(error.into_panic());
    }
    format!("worker was cancelled: {}", error)
}

/// Wait out workers the controller gave up on, then close the camera they
/// hold and finish their recording.
async fn reap_abandoned(
    acquisition: JoinHandle<LoopOutcome>,
    recording: Option<JoinHandle<DrainResult>>,
) {
    match acquisition.await {
        Ok(outcome) => {
            let mut device = outcome.device;
            device.close();
            log::warn!("controller: late acquisition worker exited, camera closed");
        }
        Err(error) => log::error!("controller: abandoned acquisition worker failed: {}", error),
    }
    if let Some(drain) = recording {
        reap_abandoned_drain(drain).await;
    }
}

async fn reap_abandoned_drain(drain: JoinHandle<DrainResult>) {
    match drain.await {
        Ok((mut session, _)) => {
            if let Err(error) = session.end() {
                log::error!("controller: failed to close abandoned recording: {}", error);
            }
        }
        Err(error) => log::error!("controller: abandoned recording worker failed: {}", error),
    }
}

fn end_stale_stream(device: &mut dyn CameraDevice) -> Result<(), CameraError> {
    if device.is_streaming() {
        log::warn!("controller: device was left streaming, ending stream");
        device.end_stream()?;
    }
    Ok(())
}

fn probe(device: &mut dyn CameraDevice, timeout: Duration) -> Result<(u32, u32), ControllerError> {
    end_stale_stream(device).map_err(ControllerError::Device)?;
    trigger::apply(device, &TriggerConfig::software())?;
    device.begin_stream().map_err(ControllerError::Device)?;
    let size = probe_one(device, timeout);
    if let Err(error) = device.end_stream() {
        log::warn!("controller: failed to end probe stream: {}", error);
    }
    let size = size?;
    log::info!("controller: native frame size {}x{}", size.0, size.1);
    Ok(size)
}

fn probe_one(device: &mut dyn CameraDevice, timeout: Duration) -> Result<(u32, u32), ControllerError> {
    device
        .execute_software_trigger()
        .map_err(ControllerError::Device)?;
    let buffer = device
        .retrieve_next(timeout)
        .map_err(|error| ControllerError::Init(CameraError::Stream(error.to_string())))?;
    let complete = buffer.is_complete();
    let size = (buffer.width(), buffer.height());
    device.release(buffer);
    if !complete {
        return Err(ControllerError::Init(CameraError::Stream(
            "probe frame incomplete".to_string(),
        )));
    }
    Ok(size)
}
