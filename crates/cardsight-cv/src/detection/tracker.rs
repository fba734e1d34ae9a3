//! Frame orchestration: one tick per frame

use super::config::TrackerConfig;
use super::state::{Namer, Phase, SessionMachine, Signals};
use super::tasks::{Classifiers, FrameContext, TaskKind, TaskSet};
use crate::bbox::CropBox;
use crate::hash::IndexSet;
use crate::traits::Detector;
use crate::utils::ImageUtils;
use crate::Result;
use anyhow::Context;
use cardsight_core::{ControlMessage, EventRecord, SymbolData};
use image::{DynamicImage, GrayImage};
use log::{debug, info, warn};
use std::time::Instant;

/// Why the current frame cannot be mapped to detector geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GeometryIssue {
    ZeroArea,
    NoContent,
}

/// Drives the task set and the session machine over a stream of frames.
pub struct Tracker {
    config: TrackerConfig,
    classifiers: Classifiers,
    symbols: SymbolData,
    tasks: TaskSet,
    machine: SessionMachine,
    locale: String,
    client: (u32, u32),
    /// Size the task geometry is currently resolved for.
    resolved: Option<(u32, u32)>,
    warned: Option<GeometryIssue>,
    frame_index: u64,
    diagnostics_interval: u64,
    window_start: Instant,
    window_frames: u64,
}

impl Tracker {
    pub fn new(config: TrackerConfig, classifiers: Classifiers, symbols: SymbolData) -> Self {
        let tasks = TaskSet::new(&config);
        let machine = SessionMachine::new(config.draw);
        Self {
            locale: config.locale.clone(),
            diagnostics_interval: config.diagnostics_interval,
            config,
            classifiers,
            symbols,
            tasks,
            machine,
            client: (0, 0),
            resolved: None,
            warned: None,
            frame_index: 0,
            window_start: Instant::now(),
            window_frames: 0,
        }
    }

    /// Load symbol metadata and indices named by the configuration.
    pub fn from_config(config: TrackerConfig) -> Result<Self> {
        let symbols = SymbolData::load(&config.symbols_file)
            .with_context(|| format!("Failed to load symbols from {:?}", config.symbols_file))?;
        let indices = IndexSet::load_dir(&config.index_dir)?;
        let classifiers = Classifiers::load(&config, &indices, &symbols)?;
        info!(
            "Tracker ready: {} symbols, {} indices, locale {}",
            symbols.len(),
            indices.len(),
            config.locale
        );
        Ok(Self::new(config, classifiers, symbols))
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.machine.phase()
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub fn tasks(&self) -> &TaskSet {
        &self.tasks
    }

    /// Current pixel regions of one task.
    pub fn task_regions(&self, kind: TaskKind) -> Vec<CropBox> {
        self.tasks.get(kind).map(Detector::regions).unwrap_or_default()
    }

    /// Client size changed; geometry is re-resolved before the next tick.
    pub fn on_resize(&mut self, width: u32, height: u32) {
        if (width, height) != self.client {
            info!("Client resized to {}x{}", width, height);
        }
        self.client = (width, height);
        self.resolved = None;
        if width > 0 && height > 0 && !self.config.content.enabled {
            self.apply_geometry(width, height);
        }
    }

    fn apply_geometry(&mut self, width: u32, height: u32) {
        if self.resolved != Some((width, height)) {
            debug!("Resolving task geometry for {}x{}", width, height);
            self.tasks.on_resize(width, height);
            self.resolved = Some((width, height));
        }
    }

    fn warn_once(&mut self, issue: GeometryIssue) {
        if self.warned != Some(issue) {
            match issue {
                GeometryIssue::ZeroArea => warn!("Client area is empty, skipping frames"),
                GeometryIssue::NoContent => warn!("No content region found, skipping frames"),
            }
            self.warned = Some(issue);
        }
    }

    /// Crop to the content region when enabled and resolve geometry for
    /// whatever remains.
    fn prepare(&mut self, gray: GrayImage) -> Option<GrayImage> {
        if self.client.0 == 0 || self.client.1 == 0 {
            self.warn_once(GeometryIssue::ZeroArea);
            return None;
        }

        let gray = if self.config.content.enabled {
            let content = self.config.content;
            let Some(region) = ImageUtils::content_box(&gray, content.threshold, content.min_fraction) else {
                self.warn_once(GeometryIssue::NoContent);
                return None;
            };
            let cropped = ImageUtils::crop_gray(&gray, &region)?;
            self.apply_geometry(cropped.width(), cropped.height());
            cropped
        } else {
            self.apply_geometry(self.client.0, self.client.1);
            gray
        };

        if self.warned.take().is_some() {
            info!("Frame geometry valid again");
        }
        Some(gray)
    }

    /// Process one frame and return the events it produced.
    pub fn on_frame(&mut self, frame: &DynamicImage) -> Vec<EventRecord> {
        self.frame_index += 1;
        if frame.width() != self.client.0 || frame.height() != self.client.1 {
            self.on_resize(frame.width(), frame.height());
        }

        let Some(gray) = self.prepare(ImageUtils::to_gray(frame)) else {
            return Vec::new();
        };

        let ctx = FrameContext {
            gray: &gray,
            frame_index: self.frame_index,
            classifiers: &self.classifiers,
        };
        let outputs = self.tasks.tick(self.machine.active_tasks(), &ctx);
        let signals = Signals::collect(outputs, &self.config.controls);

        let names = Namer {
            symbols: &self.symbols,
            locale: &self.locale,
        };
        let events = self.machine.step(&signals, &mut self.tasks, &names);
        for event in &events {
            debug!("Frame {}: {:?}", self.frame_index, event);
        }

        self.diagnostics();

        events
            .into_iter()
            .map(|event| EventRecord::new(self.frame_index, event))
            .collect()
    }

    /// Apply one control message between ticks.
    pub fn apply_control(&mut self, message: ControlMessage) {
        match message {
            ControlMessage::SetLocale { locale } => {
                info!("Locale set to {}", locale);
                self.locale = locale;
            }
            ControlMessage::Reset => self.machine.reset(&mut self.tasks),
            ControlMessage::DumpState => self.dump_state(),
            ControlMessage::SetDiagnostics { interval } => {
                info!("Diagnostics every {} frames", interval);
                self.diagnostics_interval = interval;
            }
        }
    }

    fn dump_state(&self) {
        info!(
            "State at frame {}: {} client={:?} resolved={:?}",
            self.frame_index,
            self.machine.describe(),
            self.client,
            self.resolved
        );
        for task in self.tasks.iter() {
            info!("  {}: {}", task.kind(), task.describe());
        }
    }

    fn diagnostics(&mut self) {
        self.window_frames += 1;
        if self.diagnostics_interval == 0 || self.frame_index % self.diagnostics_interval != 0 {
            return;
        }

        let elapsed = self.window_start.elapsed().as_secs_f64();
        let fps = if elapsed > 0.0 {
            self.window_frames as f64 / elapsed
        } else {
            0.0
        };
        info!(
            "Frame {}: {} at {:.1} fps",
            self.frame_index,
            self.machine.describe(),
            fps
        );
        for &kind in self.machine.active_tasks() {
            if let Some(task) = self.tasks.get(kind) {
                debug!("  {}: {}", kind, task.describe());
            }
        }
        self.window_start = Instant::now();
        self.window_frames = 0;
    }
}
