//! Scenario logs and datasets: JSON persistence for offline reconstruction.

use anyhow::Context;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use trajectory_core::{EgoState, SurroundingState, TripInput};

/// True states of one surrounding vehicle, aligned with [`GroundTruth::times`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TargetTruth {
    pub channel: u32,
    pub states: Vec<SurroundingState>,
}

/// Ground truth of a simulated trip, in the simulation world frame
/// (ego at the origin with heading zero at the first sample).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GroundTruth {
    pub times: Vec<f64>,
    pub ego: Vec<EgoState>,
    pub targets: Vec<TargetTruth>,
}

impl GroundTruth {
    /// Index of the sample at exactly `time`.
    pub fn index_of(&self, time: f64) -> Option<usize> {
        self.times.binary_search_by(|t| t.total_cmp(&time)).ok()
    }

    pub fn target(&self, channel: u32) -> Option<&TargetTruth> {
        self.targets.iter().find(|t| t.channel == channel)
    }
}

/// A full recorded simulation: the dataset trip plus its ground truth.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScenarioLog {
    pub scenario_name: String,
    pub seed: u64,
    pub dt: f64,
    pub trip: TripInput,
    pub truth: GroundTruth,
}

/// Input accepted by the reconstruction command: a list of trips, or a
/// scenario log whose trip is reconstructed.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
enum DatasetFile {
    Trips(Vec<TripInput>),
    Scenario(Box<ScenarioLog>),
}

/// Save any serializable value as pretty JSON.
pub fn save_json<T: Serialize>(value: &T, path: &Path) -> anyhow::Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, value)?;
    Ok(())
}

/// Load a JSON value.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let reader = BufReader::new(file);
    let value = serde_json::from_reader(reader).with_context(|| format!("parsing {}", path.display()))?;
    Ok(value)
}

pub fn save_log(log: &ScenarioLog, path: &Path) -> anyhow::Result<()> {
    save_json(log, path)
}

pub fn load_log(path: &Path) -> anyhow::Result<ScenarioLog> {
    load_json(path)
}

/// Load the trips of a dataset file or a scenario log.
pub fn load_trips(path: &Path) -> anyhow::Result<Vec<TripInput>> {
    Ok(match load_json::<DatasetFile>(path)? {
        DatasetFile::Trips(trips) => trips,
        DatasetFile::Scenario(log) => vec![log.trip],
    })
}
