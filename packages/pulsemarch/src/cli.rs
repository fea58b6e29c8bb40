use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::WindowBuilder;

use crate::frame_pacer::{FramePacer, PacingPolicy};
use crate::gpu::pipeline::load_shader_source;
use crate::gpu::renderer::Renderer;
use crate::perf_profiling::{self, timed, FrameStats};
use crate::playback::{PlaybackClock, SteppedClock, WallClock};
use crate::timeline::DirtyGuard;
use crate::uploader::RecordingBackend;
use crate::visualiser::{FrameOutcome, VisualiserConfig, VisualiserState};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a window and play the show in real time
    Play {
        #[command(flatten)]
        engine: EngineArgs,

        /// Music file played alongside (needs the `audio` feature)
        #[arg(long)]
        music: Option<PathBuf>,

        /// WGSL shader replacing the bundled ray tracer
        #[arg(long)]
        shader: Option<PathBuf>,
    },
    /// Render frames to disk
    Render {
        #[command(flatten)]
        engine: EngineArgs,

        /// Output directory for frames
        #[arg(long)]
        out: PathBuf,

        /// Stop after this many frames
        #[arg(long)]
        max_frames: Option<u64>,

        /// WGSL shader replacing the bundled ray tracer
        #[arg(long)]
        shader: Option<PathBuf>,
    },
    /// Run the timeline without a GPU and print what would be uploaded
    Simulate {
        #[command(flatten)]
        engine: EngineArgs,

        /// Stop after this many frames
        #[arg(long)]
        max_frames: Option<u64>,
    },
}

/// Settings shared by every command. Flags override the config file.
#[derive(Args)]
struct EngineArgs {
    /// JSON config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Tempo in beats per minute
    #[arg(long)]
    bpm: Option<f64>,

    /// Target frames per second
    #[arg(long)]
    fps: Option<u32>,

    /// Viewport width
    #[arg(long)]
    width: Option<u32>,

    /// Viewport height
    #[arg(long)]
    height: Option<u32>,

    /// Playback speed multiplier
    #[arg(long)]
    speed: Option<f64>,

    /// How to wait between frames
    #[arg(long, value_enum)]
    pacing: Option<PacingPolicy>,

    /// How scene changes are detected
    #[arg(long, value_enum)]
    dirty_guard: Option<DirtyGuard>,

    /// Log frame rate and draw time
    #[arg(long)]
    profile: bool,
}

impl EngineArgs {
    fn config(&self) -> Result<VisualiserConfig> {
        let mut config = match &self.config {
            Some(path) => VisualiserConfig::load(path)?,
            None => VisualiserConfig::default(),
        };

        if let Some(bpm) = self.bpm {
            config.bpm = bpm;
        }
        if let Some(fps) = self.fps {
            config.target_fps = fps;
        }
        if let Some(width) = self.width {
            config.viewport_width = width;
        }
        if let Some(height) = self.height {
            config.viewport_height = height;
        }
        if let Some(speed) = self.speed {
            config.playback_speed = speed;
        }
        if let Some(pacing) = self.pacing {
            config.pacing = pacing;
        }
        if let Some(guard) = self.dirty_guard {
            config.dirty_guard = guard;
        }

        config.validate()?;
        if self.profile {
            perf_profiling::set_profiling_enabled(true);
        }
        Ok(config)
    }
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Play { engine, music, shader } => {
            play(engine.config()?, music.as_deref(), shader.as_deref())?;
        }
        Commands::Render { engine, out, max_frames, shader } => {
            pollster::block_on(render_offline(engine.config()?, out, max_frames, shader.as_deref()))?;
        }
        Commands::Simulate { engine, max_frames } => {
            simulate(engine.config()?, max_frames)?;
        }
    }
    Ok(())
}

fn open_clock(music: Option<&Path>, speed: f64) -> Result<Box<dyn PlaybackClock>> {
    match music {
        #[cfg(feature = "audio")]
        Some(path) => Ok(Box::new(crate::playback::AudioTrack::play(path, speed)?)),
        #[cfg(not(feature = "audio"))]
        Some(path) => {
            log::warn!("Built without the `audio` feature, not playing {}", path.display());
            Ok(Box::new(WallClock::new(speed)))
        }
        None => Ok(Box::new(WallClock::new(speed))),
    }
}

fn play(config: VisualiserConfig, music: Option<&Path>, shader: Option<&Path>) -> Result<()> {
    let source = load_shader_source(shader)?;

    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title("pulsemarch")
            .with_inner_size(PhysicalSize::new(config.viewport_width, config.viewport_height))
            .build(&event_loop)
            .context("Failed to create window")?,
    );

    let mut renderer = pollster::block_on(Renderer::for_window(window.clone(), &source))?;
    let mut state = VisualiserState::with_demo(config.clone());

    // The window may not get the size we asked for
    let (width, height) = renderer.size();
    state.resize(width, height);

    let clock = open_clock(music, config.playback_speed)?;
    let wall_clock = WallClock::new(1.0);
    let mut pacer = FramePacer::new(config.target_fps, config.pacing);
    let mut stats = FrameStats::new();
    // (wall ms, playback ms) of the frame waiting to be drawn
    let mut admitted: Option<(f64, f64)> = None;
    let mut failure: Option<anyhow::Error> = None;

    event_loop.set_control_flow(ControlFlow::Poll);
    event_loop.run(|event, elwt| match event {
        Event::AboutToWait => {
            let wall_ms = pacer.wait_for_frame(&wall_clock);
            admitted = Some((wall_ms, clock.elapsed_ms()));
            window.request_redraw();
        }
        Event::WindowEvent { event, .. } => match event {
            WindowEvent::CloseRequested => elwt.exit(),
            WindowEvent::KeyboardInput { event, .. }
                if event.state == ElementState::Pressed && event.logical_key == Key::Named(NamedKey::Escape) =>
            {
                elwt.exit()
            }
            WindowEvent::Resized(size) => {
                renderer.resize(size.width, size.height);
                if size.width > 0 && size.height > 0 {
                    state.resize(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => {
                let Some((wall_ms, now)) = admitted.take() else {
                    return;
                };
                let (result, draw_ms) = timed("frame", || state.update(now, &mut renderer));
                match result {
                    Ok(FrameOutcome::Rendered { .. }) => {
                        stats.record(wall_ms, draw_ms);
                    }
                    Ok(FrameOutcome::Complete) => {
                        log::info!("Timeline complete after {} frames", state.frames());
                        elwt.exit();
                    }
                    Err(e) => {
                        failure = Some(e);
                        elwt.exit();
                    }
                }
            }
            _ => {}
        },
        _ => {}
    })?;

    match failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

async fn render_offline(
    config: VisualiserConfig,
    out_dir: PathBuf,
    max_frames: Option<u64>,
    shader: Option<&Path>,
) -> Result<()> {
    let source = load_shader_source(shader)?;
    let (width, height) = (config.viewport_width, config.viewport_height);

    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("Failed to create {}", out_dir.display()))?;

    let mut renderer = Renderer::offscreen(width, height, &source).await?;
    let mut state = VisualiserState::with_demo(config.clone());
    let clock = SteppedClock::new(config.frame_step_ms());

    println!("Rendering to {:?}...", out_dir);

    let mut frame = 0u64;
    while max_frames.map_or(true, |max| frame < max) {
        if state.update(clock.elapsed_ms(), &mut renderer)? == FrameOutcome::Complete {
            break;
        }

        let pixels = renderer.read_frame()?;
        let frame_path = out_dir.join(format!("frame_{:05}.png", frame));
        image::save_buffer(&frame_path, &pixels, width, height, image::ColorType::Rgba8)
            .with_context(|| format!("Failed to write {}", frame_path.display()))?;

        if frame % 60 == 0 {
            print!(".");
            use std::io::Write;
            std::io::stdout().flush()?;
        }
        frame += 1;
        clock.tick();
    }
    println!("\nDone.");
    log::info!(
        "Rendered {} frames ({} ticks, {:.1}s of playback)",
        frame,
        state.clock().tick,
        clock.elapsed_ms() / 1000.0
    );

    Ok(())
}

fn simulate(config: VisualiserConfig, max_frames: Option<u64>) -> Result<()> {
    let mut state = VisualiserState::with_demo(config.clone());
    let mut backend = RecordingBackend::new();
    let clock = SteppedClock::new(config.frame_step_ms());
    let mut stats = FrameStats::new();

    let mut frame = 0u64;
    while max_frames.map_or(true, |max| frame < max) {
        let now = clock.elapsed_ms();
        if state.update(now, &mut backend)? == FrameOutcome::Complete {
            break;
        }
        // Nominal wall time of this frame
        stats.record(now / config.playback_speed, 0.0);
        frame += 1;
        clock.tick();
    }

    println!("frames:          {}", backend.draws);
    println!("ticks:           {}", state.clock().tick);
    println!("playback:        {:.1}s", clock.elapsed_ms() / 1000.0);
    println!("complete:        {}", state.is_complete());
    println!("camera uploads:  {}", backend.camera_uploads);
    println!("object uploads:  {}", backend.object_uploads);
    println!("light uploads:   {}", backend.light_uploads);

    Ok(())
}
