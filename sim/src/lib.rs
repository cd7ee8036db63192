//! `sim` — Scenario simulator: ego recording, surrounding vehicles, onboard
//! radars, ground truth and dataset persistence.

pub mod ego;
pub mod evaluate;
pub mod radar_sim;
pub mod replay;
pub mod scenarios;
pub mod target;

pub use ego::{EgoNoise, EgoProfile, EgoRecorder, EgoSegment};
pub use evaluate::{evaluate, AnchorFrame, Evaluation};
pub use radar_sim::RadarSimulator;
pub use replay::{load_log, load_trips, save_json, save_log, GroundTruth, ScenarioLog};
pub use scenarios::{Scenario, ScenarioKind};
pub use target::{SimTarget, TargetMotion};
