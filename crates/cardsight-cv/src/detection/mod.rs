//! Detection pipeline: per-region tasks, temporal filtering, row recording,
//! the session phase machine and the frame tracker driving them.

pub mod config;
pub mod filter;
pub mod flow;
pub mod recorder;
pub mod state;
pub mod tasks;
pub mod tracker;

pub use config::TrackerConfig;
pub use filter::{FilterConfig, StreamFilter};
pub use flow::{FlowLocator, FlowSlot};
pub use recorder::{RecorderConfig, TaskRecorder};
pub use state::{DrawStage, Phase, SessionMachine, Signals};
pub use tasks::{Classifiers, FrameContext, Task, TaskKind, TaskOutput, TaskSet};
pub use tracker::Tracker;
