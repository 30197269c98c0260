mod actuator;
mod audio;
mod cli;
mod config;
mod gesture;
mod listener;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use actuator::{Actuator, CommandActuator, LogActuator};
use audio::capture::{self, FrameSource, MicrophoneSource};
use audio::replay::ReplaySource;
use cli::Cli;
use config::Config;
use gesture::GestureClassifier;
use listener::Listener;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    if cli.list_devices {
        let devices = capture::list_devices().context("Failed to list input devices")?;
        println!("Input devices:");
        for device in &devices {
            let marker = if device.is_default { "*" } else { " " };
            println!("  {} {}", marker, device.name);
        }
        return Ok(());
    }

    // Explicit --config path, or auto-detect pagewhistle.toml / global config
    let config_path = cli.config.clone().or_else(|| {
        let local = PathBuf::from("pagewhistle.toml");
        if local.exists() {
            return Some(local);
        }
        if let Some(home) = dirs::home_dir() {
            let xdg = home.join(".config").join("pagewhistle").join("config.toml");
            if xdg.exists() {
                return Some(xdg);
            }
        }
        if let Some(config_dir) = dirs::config_dir() {
            let platform = config_dir.join("pagewhistle").join("config.toml");
            if platform.exists() {
                return Some(platform);
            }
        }
        None
    });
    let mut cfg = match config_path {
        Some(ref path) => {
            let cfg = config::load_config(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?;
            log::info!("Loaded config from {}", path.display());
            cfg
        }
        None => Config::default(),
    };

    // CLI flags win over the config file
    if let Some(threshold) = cli.threshold {
        cfg.detector.threshold = threshold;
    }
    if let Some(debounce) = cli.debounce {
        cfg.detector.debounce = debounce;
    }
    if let Some(isolation) = cli.isolation {
        cfg.detector.isolation = isolation;
    }
    if cli.device.is_some() {
        cfg.capture.device = cli.device.clone();
    }
    if !cli.forward_cmd.is_empty() {
        cfg.actuator.forward = cli.forward_cmd.clone();
    }
    if !cli.backward_cmd.is_empty() {
        cfg.actuator.backward = cli.backward_cmd.clone();
    }

    cfg.capture.validate().context("Invalid capture settings")?;
    let classifier_config = cfg.detector.to_classifier().context("Invalid detector settings")?;
    let classifier = GestureClassifier::new(classifier_config);

    let actuator: Box<dyn Actuator> =
        match CommandActuator::new(cfg.actuator.forward, cfg.actuator.backward) {
            Some(commands) => Box::new(commands),
            None => {
                log::info!("No actuator commands configured, gestures will only be logged");
                Box::new(LogActuator)
            }
        };

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();
    ctrlc::set_handler(move || {
        log::info!("Interrupt received, shutting down...");
        flag.store(true, Ordering::Release);
    })
    .context("Failed to install interrupt handler")?;

    log::info!("pagewhistle - whistle-driven page turner");

    if let Some(ref path) = cli.replay {
        log::info!("Replaying {}", path.display());
        let source = ReplaySource::open(path, cfg.capture.sample_rate, cfg.capture.frame_len)
            .with_context(|| format!("Failed to open recording {}", path.display()))?;
        run(source, classifier, actuator, shutdown)
    } else {
        let source = MicrophoneSource::open(
            cfg.capture.device.as_deref(),
            cfg.capture.sample_rate,
            cfg.capture.frame_len,
            shutdown.clone(),
        )
        .context("Failed to open microphone")?;
        run(source, classifier, actuator, shutdown)
    }
}

fn run<S: FrameSource>(
    source: S,
    classifier: GestureClassifier,
    actuator: Box<dyn Actuator>,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    let mut listener = Listener::new(source, classifier, actuator, shutdown);
    let result = listener.listen();

    // Release the audio device before reporting
    let (source, _) = listener.into_parts();
    drop(source);

    result.context("Audio capture failed")?;
    log::info!("Done");
    Ok(())
}
