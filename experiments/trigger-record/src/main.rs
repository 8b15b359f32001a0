//! Triggered capture demo: a simulated camera shown in a window, recorded
//! losslessly (FFV1 in Matroska, through FFmpeg) on demand.
//!
//! Usage: trigger-record [software|hardware] [OUTPUT_DIR]
//!
//! Controls: R toggles recording, S saves a snapshot, ESC exits.

mod display;

use display::WindowDisplay;
use minifb::{Key, KeyRepeat, Window, WindowOptions};
use nvue_acquire::{AcquisitionController, ControllerConfig, RecordingRequest};
use nvue_base::CancelToken;
use nvue_camera::{PixelFormat, SimulatedCamera, SimulatedFeed, SimulatedSystem, TriggerConfig, TriggerMode};
use nvue_video::{FfmpegSinkFactory, save_snapshot};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const WIDTH: u32 = 640;
const HEIGHT: u32 = 480;

/// Stand-in for an external trigger line: pushes a moving gradient at
/// roughly 30 Hz until cancelled.
fn spawn_pulse_generator(feed: SimulatedFeed, cancel: CancelToken) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        let mut tick = 0u32;
        while !cancel.is_cancelled() {
            let data = (0..HEIGHT)
                .flat_map(|y| (0..WIDTH).map(move |x| ((x + y + tick * 4) % 256) as u8))
                .collect();
            feed.frame_with(WIDTH, HEIGHT, PixelFormat::Mono8, data);
            tick = tick.wrapping_add(1);
            std::thread::sleep(Duration::from_millis(33));
        }
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    nvue_base::init_stdout_logger();

    let mut args = std::env::args().skip(1);
    let mode: TriggerMode = args.next().as_deref().unwrap_or("hardware").parse()?;
    let output_dir = args.next().map(PathBuf::from).unwrap_or_else(std::env::temp_dir);
    let trigger = TriggerConfig::for_mode(mode);

    let camera = SimulatedCamera::new("SimCam-640", "SIM0001").with_software_response(WIDTH, HEIGHT);
    let feed = camera.feed();
    let system = Arc::new(SimulatedSystem::new(vec![camera]));

    let mut controller = AcquisitionController::new(
        system,
        Arc::new(FfmpegSinkFactory::new()),
        ControllerConfig::default().with_retrieve_timeout(Duration::from_millis(100)),
    );
    for device in controller.devices() {
        log::info!("found camera {}: {} ({})", device.index, device.model, device.serial);
    }
    controller.initialize(0)?;

    let pulses = CancelToken::new();
    let generator = (mode == TriggerMode::Hardware).then(|| spawn_pulse_generator(feed, pulses.clone()));

    controller.start(trigger, None).await?;

    let window = Window::new(
        "trigger-record - R record, S snapshot, ESC exit",
        WIDTH as usize,
        HEIGHT as usize,
        WindowOptions::default(),
    )?;
    let mut display = WindowDisplay::new(window);
    display.window_mut().set_target_fps(30);
    let mailbox = controller.mailbox().clone();
    let mut recording = false;

    while display.window().is_open() && !display.window().is_key_down(Key::Escape) {
        if let Err(e) = controller.poll().await {
            log::error!("session ended: {}", e);
            controller.start(trigger, None).await?;
            recording = false;
        }

        if display.window().is_key_pressed(Key::R, KeyRepeat::No) {
            match controller.stop().await {
                Ok(Some(report)) => {
                    if let Some(summary) = report.recording {
                        log::info!("saved {} ({} frames)", summary.path.display(), summary.frames);
                    }
                }
                Ok(None) => {}
                Err(e) => log::error!("stop failed: {}", e),
            }
            recording = !recording;
            let request = recording.then(|| {
                RecordingRequest::in_directory(&output_dir).with_frame_size(WIDTH, HEIGHT)
            });
            controller.start(trigger, request).await?;
        }

        if display.window().is_key_pressed(Key::S, KeyRepeat::No) {
            if let Some(frame) = mailbox.try_take() {
                let path = output_dir.join(format!("snapshot_{}.png", nvue_base::format_file_stamp()));
                match save_snapshot(&frame, &path) {
                    Ok(()) => log::info!("snapshot saved to {}", path.display()),
                    Err(e) => log::error!("snapshot failed: {}", e),
                }
            }
        }

        if !mailbox.present_latest(&mut display) {
            display.window_mut().update();
        }
    }

    let stats = controller.stats();
    log::info!(
        "exiting: {} frames, {} incomplete, {} display frames skipped",
        stats.frames,
        stats.incomplete,
        stats.display_overwrites
    );
    controller.close().await?;
    pulses.cancel();
    if let Some(generator) = generator {
        let _ = generator.join();
    }
    Ok(())
}
