//! rgb-probe binary: grab a color frame and print its first-pixel RGB values.

use std::io::{self, BufRead, Write};
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use rgb_probe::config::default_log_filter;
use rgb_probe::{
    exit_code, Config, ConsoleReporter, DeviceLocator, FileSink, Pipeline, V4L2Locator,
};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_log_filter())),
        )
        .with_writer(io::stderr)
        .init();

    let config = Config::parse();
    let result = if config.list {
        list_devices()
    } else {
        run(&config)
    };

    if let Err(err) = &result {
        eprintln!("An exception occurred.\n{err:#}");
    }

    if config.wait_on_exit {
        wait_for_enter();
    }

    ExitCode::from(exit_code(&result))
}

fn run(config: &Config) -> anyhow::Result<()> {
    let locator = V4L2Locator::new();
    let descriptor = config.descriptor();
    let options = config.workflow_options();

    let converter = config.converter();
    let sink = FileSink::with_converter(converter);
    let mut viewer = config.display.viewer();
    let mut reporter = ConsoleReporter;

    let summary = Pipeline::new(&converter, &sink, viewer.as_mut(), &mut reporter)
        .run(&locator, &descriptor, &options)
        .with_context(|| format!("capture from {descriptor} failed"))?;

    tracing::info!(
        device = %summary.device.id,
        frames = summary.frames.len(),
        "capture finished"
    );
    Ok(())
}

fn list_devices() -> anyhow::Result<()> {
    let devices = V4L2Locator::new()
        .enumerate()
        .context("failed to enumerate cameras")?;

    if devices.is_empty() {
        println!("No cameras found");
    }
    for device in devices {
        println!(
            "{}: {} (serial: {}, driver: {})",
            device.id,
            device.model_name,
            device.serial_number.as_deref().unwrap_or("-"),
            device.capabilities.driver
        );
    }
    Ok(())
}

fn wait_for_enter() {
    eprintln!("\nPress Enter to exit.");
    let _ = io::stderr().flush();
    let mut line = String::new();
    let _ = io::stdin().lock().read_line(&mut line);
}
