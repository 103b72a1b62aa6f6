//! Console front-end for the hark engine.
//!
//! Modes:
//! - default: live spotting from the microphone until Ctrl-C
//! - `--input <file.wav>`: one-shot classification of a recorded file
//! - `--list`: enumerate audio input devices and exit

use std::path::PathBuf;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Default)]
struct Args {
    list: bool,
    input: Option<PathBuf>,
    device: Option<String>,
}

fn parse_args() -> Result<Args, String> {
    let mut args = Args::default();
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--list" => args.list = true,
            "--input" => {
                let Some(v) = it.next() else {
                    return Err("missing value for --input".into());
                };
                args.input = Some(PathBuf::from(v));
            }
            "--device" => {
                let Some(v) = it.next() else {
                    return Err("missing value for --device".into());
                };
                args.device = Some(v);
            }
            "--help" | "-h" => {
                println!(
                    "Usage: hark [--device <name>]          live spotting until Ctrl-C\n\
                     \x20      hark --input <file.wav>       one-shot file classification\n\
                     \x20      hark --list                   list audio input devices\n\
                     \n\
                     Set HARK_MODEL_PATH to override the command model location."
                );
                std::process::exit(0);
            }
            other => return Err(format!("unknown argument: {other}")),
        }
    }
    Ok(args)
}

fn list_devices() {
    let devices = hark_core::audio::device::list_input_devices();
    if devices.is_empty() {
        println!("no audio input devices found");
        return;
    }
    for d in devices {
        let marker = if d.is_default { " (default)" } else { "" };
        let rate = d
            .default_sample_rate
            .map(|r| format!(" @ {r} Hz"))
            .unwrap_or_default();
        println!("{}{marker}{rate}", d.name);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = match parse_args() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("error: {e}\nrun with --help for usage");
            std::process::exit(2);
        }
    };

    if args.list {
        list_devices();
        return Ok(());
    }

    run(args).await
}

#[cfg(not(feature = "onnx"))]
async fn run(_args: Args) -> Result<()> {
    eprintln!("hark was built without the 'onnx' feature — no classifier backend available");
    std::process::exit(1);
}

#[cfg(feature = "onnx")]
async fn run(args: Args) -> Result<()> {
    use hark_core::{
        classify_wav, ClassifierHandle, EngineConfig, FileOutcome, HarkEngine, OnnxClassifier,
        OnnxClassifierConfig,
    };
    use tokio::sync::broadcast::error::RecvError;
    use tracing::info;

    let config = EngineConfig::default();
    let classifier = ClassifierHandle::new(OnnxClassifier::new(OnnxClassifierConfig::default()));

    if let Some(path) = args.input {
        classifier.0.lock().warm_up()?;
        match classify_wav(&path, &config, &classifier)? {
            FileOutcome::Detected(c) => println!(">>> {}", c.display_label()),
            FileOutcome::TooSilent => println!("too silent"),
        }
        return Ok(());
    }

    let engine = HarkEngine::new(config, classifier);
    engine.warm_up()?;
    engine.start_with_device(args.device)?;
    println!("listening — say a command (Ctrl-C to stop)");

    let mut detections = engine.subscribe_detections();
    let printer = tokio::spawn(async move {
        loop {
            match detections.recv().await {
                Ok(event) => println!(">>> {}", event.display_label()),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    engine.stop()?;
    printer.abort();

    let diag = engine.diagnostics_snapshot();
    info!(
        windows_assembled = diag.windows_assembled,
        windows_skipped = diag.windows_skipped,
        silent_windows = diag.silent_windows,
        detections_emitted = diag.detections_emitted,
        "session summary"
    );
    Ok(())
}
