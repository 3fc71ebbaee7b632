//! Plot engine demo.
//!
//! Opens a window with a single live plot, a 2x2 grid of subplots and a
//! panel drawn with dashed lines.
//!
//! # Usage
//!
//! ```bash
//! # Run the loop on the main thread until the window is closed
//! cargo run --example plot_demo
//!
//! # Run the loop on a background thread and stop after 300 frames
//! cargo run --example plot_demo -- --background --max-frames 300
//! ```
//!
//! On macOS winit only accepts windows on the main thread, so use the
//! default inline mode there.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use egui_plot::{Line, PlotPoints};

use plot_engine::plot::{self, AxisLimits, DEFAULT_DASH_LEN, DEFAULT_GAP_LEN};
use plot_engine::{EngineConfig, LoopState, PlotEngine, WgpuPlatform};

/// Plot engine demo arguments.
#[derive(Parser, Debug)]
#[command(name = "plot_demo", about = "Live plotting demo for the plot engine", version)]
struct Args {
    /// Window title.
    #[arg(long, default_value = "Plot Engine Demo")]
    title: String,

    /// Run the frame loop on a background thread.
    #[arg(long)]
    background: bool,

    /// Stop after N presented frames.
    #[arg(long)]
    max_frames: Option<u64>,

    /// Initial window width in pixels.
    #[arg(long, default_value = "1280")]
    width: u32,

    /// Initial window height in pixels.
    #[arg(long, default_value = "800")]
    height: u32,

    /// Use the light theme.
    #[arg(long)]
    light: bool,
}

fn sine(phase: f64, freq: f64) -> PlotPoints {
    PlotPoints::from_explicit_callback(move |x| (x * freq + phase).sin(), 0.0..10.0, 256)
}

fn register_drawers(engine: &Arc<PlotEngine<WgpuPlatform>>) {
    let started = Instant::now();

    engine.register("live", move |ctx| {
        let t = started.elapsed().as_secs_f64();
        plot::plot_window(
            ctx,
            "Live signal##live",
            Some("Live"),
            Some(AxisLimits::new(0.0, 10.0, -1.5, 1.5)),
            |plot_ui| {
                plot_ui.line(Line::new(sine(t, 1.0)).name("sin"));
                plot_ui.line(Line::new(sine(t * 0.5, 2.0)).name("sin 2x"));
            },
        );
        ctx.request_repaint();
    });

    engine.register("grid", |ctx| {
        plot::subplots(ctx, "Harmonics", None, 2, 2, |index, plot_ui| {
            let freq = (index + 1) as f64;
            plot_ui.line(Line::new(sine(0.0, freq)).name(format!("f = {freq}")));
        });
    });

    engine.register("dashes", |ctx| {
        egui::Window::new("Dashes")
            .default_size([320.0, 160.0])
            .show(ctx, |ui| {
                let (response, painter) =
                    ui.allocate_painter(egui::vec2(300.0, 120.0), egui::Sense::hover());
                let rect = response.rect;
                let stroke = egui::Stroke::new(1.5, ui.visuals().text_color());
                plot::dashed_line(
                    &painter,
                    rect.left_center(),
                    rect.right_center(),
                    stroke,
                    DEFAULT_DASH_LEN,
                    DEFAULT_GAP_LEN,
                );
                plot::dashed_line(&painter, rect.left_top(), rect.right_bottom(), stroke, 12.0, 3.0);
            });
    });
}

/// Request a stop once `max_frames` have been presented.
///
/// The watcher is never joined; it dies with the process if the window is
/// closed first.
fn stop_after(engine: Arc<PlotEngine<WgpuPlatform>>, max_frames: u64) {
    thread::spawn(move || {
        while engine.frames_presented() < max_frames {
            thread::sleep(Duration::from_millis(10));
        }
        if engine.loop_state() == LoopState::Running {
            log::info!("Presented {} frames, stopping", max_frames);
            engine.request_stop();
        }
    });
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    plot_engine::init();

    let args = Args::parse();
    let config = EngineConfig::default()
        .with_title(args.title.clone())
        .with_size(args.width, args.height)
        .with_dark_theme(!args.light);

    let engine = match PlotEngine::new(WgpuPlatform::new(), config) {
        Ok(engine) => Arc::new(engine),
        Err(e) => {
            log::error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };
    register_drawers(&engine);

    if let Some(max_frames) = args.max_frames {
        stop_after(Arc::clone(&engine), max_frames);
    }

    let result = if args.background {
        engine.run_async().and_then(|()| engine.wait())
    } else {
        engine.run(Some(&args.title), true)
    };

    match result {
        Ok(()) => log::info!("Frame loop finished after {} frames", engine.frames_presented()),
        Err(e) => {
            log::error!("Frame loop failed: {}", e);
            std::process::exit(1);
        }
    }
}
