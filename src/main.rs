use anyhow::{anyhow, Result};
use cardsight_core::ControlMessage;
use cardsight_cv::{Tracker, TrackerConfig};
use clap::Parser;
use crossbeam_channel::Receiver;
use image::DynamicImage;
use log::{info, warn};
use std::io;
use std::path::PathBuf;

mod capture;
mod control;
mod sink;

use capture::DirectorySource;
use sink::{EventSink, JsonLineSink};

#[derive(Parser, Debug)]
#[command(author, version, about = "Detect game events in a stream of screen frames", long_about = None)]
struct Args {
    /// Directory of frame images, processed in file name order
    #[arg(short, long)]
    frames: PathBuf,

    /// Tracker configuration (JSON); defaults apply to missing fields
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Symbol metadata file
    #[arg(long)]
    symbols: Option<PathBuf>,

    /// Directory of symbol index files
    #[arg(long)]
    index_dir: Option<PathBuf>,

    /// Locale for symbol names in events
    #[arg(long)]
    locale: Option<String>,

    /// Pace frame delivery to this rate
    #[arg(long)]
    fps: Option<f64>,

    /// Do not read control messages from stdin
    #[arg(long)]
    no_control: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => TrackerConfig::load(path)?,
        None => TrackerConfig::default(),
    };
    if let Some(symbols) = args.symbols {
        config.symbols_file = symbols;
    }
    if let Some(index_dir) = args.index_dir {
        config.index_dir = index_dir;
    }
    if let Some(locale) = args.locale {
        config.locale = locale;
    }

    let mut tracker = Tracker::from_config(config)?;
    let source = DirectorySource::open(&args.frames)?;
    let (frames, capture) = capture::spawn(source, args.fps);
    let controls = (!args.no_control).then(control::spawn_stdin);
    let mut sink = JsonLineSink::new(io::stdout());

    let result = run(&mut tracker, &frames, controls.as_ref(), &mut sink);

    // Unblock the capture thread before joining it.
    drop(frames);
    if capture.join().is_err() {
        warn!("Capture thread panicked");
    }

    let processed = result?;
    info!("Processed {} frames", processed);
    Ok(())
}

/// Tick once per frame until the source closes; controls are drained between
/// ticks.
fn run(
    tracker: &mut Tracker,
    frames: &Receiver<Result<DynamicImage>>,
    controls: Option<&Receiver<ControlMessage>>,
    sink: &mut impl EventSink,
) -> Result<u64> {
    for frame in frames.iter() {
        let frame = frame.map_err(|e| anyhow!("Frame source failed: {:#}", e))?;

        if let Some(controls) = controls {
            for message in controls.try_iter() {
                tracker.apply_control(message);
            }
        }

        for record in tracker.on_frame(&frame) {
            sink.emit(&record)?;
        }
    }
    Ok(tracker.frame_index())
}
