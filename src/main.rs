//! Pi-cam-shutter binary.

use clap::Parser;
use log::{info, warn};
use pi_cam_shutter::cli::Args;
use pi_cam_shutter::config::Options;
use pi_cam_shutter::error::diagnostic;
use pi_cam_shutter::keyboard::{KeySource, NoKeys, TerminalKeyReader};
use pi_cam_shutter::preview::LogPreview;
use pi_cam_shutter::{AppError, CaptureApp, FileSink, V4L2Camera};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn main() {
    let args = Args::parse();
    let options = match Options::resolve(&args) {
        Ok(options) => options,
        Err(err) => {
            eprintln!("{}", diagnostic(&err));
            std::process::exit(1);
        }
    };

    env_logger::Builder::new()
        .filter_level(options.log_level())
        .parse_default_env()
        .init();

    if let Err(err) = run(&options) {
        eprintln!("{}", diagnostic(&err));
        std::process::exit(1);
    }
}

fn run(options: &Options) -> Result<(), AppError> {
    if options.verbose >= 2 {
        info!("Options: {options:#?}");
    }

    let quit = Arc::new(AtomicBool::new(false));
    let handler_quit = Arc::clone(&quit);
    ctrlc::set_handler(move || handler_quit.store(true, Ordering::SeqCst))?;

    let keys: Box<dyn KeySource> = match TerminalKeyReader::enable() {
        Ok(reader) => Box::new(reader),
        Err(err) => {
            warn!("Keypress trigger disabled: {err}");
            Box::new(NoKeys)
        }
    };

    let camera = V4L2Camera::new(options.device.clone(), quit);
    let mut app = CaptureApp::new(camera, FileSink::default(), options.capture_options())
        .with_keys(keys)
        .with_preview(Box::new(LogPreview::default()));

    let summary = app.run(&options.gpio_backend, &options.gpio)?;
    info!(
        "Captured {} image(s) from {} frames ({} restarts)",
        summary.captures, summary.frames, summary.restarts
    );
    Ok(())
}
