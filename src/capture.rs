//! Frame sources feeding the tracker from their own thread

use anyhow::{bail, Context, Result};
use cardsight_cv::utils::ImageUtils;
use crossbeam_channel::{bounded, Receiver};
use image::DynamicImage;
use log::{debug, info};
use std::fs;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const FRAME_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// Something that yields frames until it runs dry.
pub trait FrameSource: Send + 'static {
    /// Next frame, `Ok(None)` once the source is exhausted.
    fn next_frame(&mut self) -> Result<Option<DynamicImage>>;
}

/// Image files of a directory, in file name order.
pub struct DirectorySource {
    paths: Vec<PathBuf>,
    next: usize,
}

impl DirectorySource {
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let mut paths: Vec<PathBuf> = fs::read_dir(dir)
            .with_context(|| format!("Failed to read frame directory: {:?}", dir))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| FRAME_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            })
            .collect();
        if paths.is_empty() {
            bail!("No frames found in {:?}", dir);
        }
        paths.sort();
        info!("Found {} frames in {:?}", paths.len(), dir);
        Ok(Self { paths, next: 0 })
    }
}

impl FrameSource for DirectorySource {
    fn next_frame(&mut self) -> Result<Option<DynamicImage>> {
        let Some(path) = self.paths.get(self.next) else {
            return Ok(None);
        };
        self.next += 1;
        debug!("Loading frame {:?}", path);
        ImageUtils::load_frame(path).map(Some)
    }
}

/// Run `source` on a capture thread. At most two frames are buffered; a
/// failed read is forwarded and ends the stream.
pub fn spawn<S: FrameSource>(mut source: S, fps: Option<f64>) -> (Receiver<Result<DynamicImage>>, JoinHandle<()>) {
    let (tx, rx) = bounded(2);
    let interval = fps
        .filter(|fps| *fps > 0.0)
        .map(|fps| Duration::from_secs_f64(1.0 / fps));

    let handle = thread::spawn(move || {
        let mut next_due = Instant::now();
        loop {
            if let Some(interval) = interval {
                let now = Instant::now();
                if next_due > now {
                    thread::sleep(next_due - now);
                }
                next_due += interval;
            }

            let frame = match source.next_frame() {
                Ok(Some(frame)) => Ok(frame),
                Ok(None) => break,
                Err(e) => Err(e),
            };
            let failed = frame.is_err();
            if tx.send(frame).is_err() || failed {
                break;
            }
        }
        debug!("Capture thread finished");
    });

    (rx, handle)
}
