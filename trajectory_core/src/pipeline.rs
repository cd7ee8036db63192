//! Trip pipeline: the full reconstruction of one recorded trip.
//!
//! # Processing steps per trip
//! 1. Assign surrogate target ids to the radar channels (sequential, caller-owned allocator)
//! 2. Select the authoritative ego run (forward, reverse or best of both)
//! 3. Resolve the annotated event window, if any
//! 4. Project each radar channel into the ego run's frame
//! 5. Drop short tracks and tracks that do not span the event start
//! 6. Filter every remaining track with the CHCV estimator (parallel)
//! 7. Emit per-timestep ego and surrounding records
//!
//! A batch of trips allocates all ids first, in input order, then processes
//! the trips in parallel. Trips that cannot be reconstructed are collected
//! with their reason instead of aborting the batch.

use crate::{
    chcv::SurroundingStateEstimator,
    config::ReconstructionConfig,
    direction::{DirectionalRunSelector, EgoReconstruction, SelectedRun},
    error::Result,
    projection::{CoordinateProjector, EgoTrajectory},
    types::{
        EgoStateRecord, RunDirection, SurroundingObservation, SurroundingStateRecord, TargetId,
        TargetIdAllocator, TripId,
    },
};
use rayon::prelude::*;
use sensor_models::{EgoSample, RadarReturn, SensorDirection};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// Annotated event, delimited by ego sync indices (inclusive).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventWindow {
    pub start_sync: i64,
    pub end_sync: i64,
}

/// Everything recorded for one trip.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TripInput {
    pub trip_id: TripId,
    /// Ego vehicle length (m); the configured default is used when absent
    #[serde(default)]
    pub ego_length: Option<f64>,
    /// Ascending time
    pub ego: Vec<EgoSample>,
    /// Raw returns of the nose radar, all channels interleaved
    #[serde(default)]
    pub forward: Vec<RadarReturn>,
    /// Raw returns of the tail radar, all channels interleaved
    #[serde(default)]
    pub rearward: Vec<RadarReturn>,
    #[serde(default)]
    pub event: Option<EventWindow>,
}

/// The returns of one upstream radar channel and the id it was given.
#[derive(Clone, Debug, PartialEq)]
pub struct TargetAssignment {
    pub target_id: TargetId,
    pub direction: SensorDirection,
    pub channel: u32,
    pub returns: Vec<RadarReturn>,
}

/// Split a trip's returns by channel and give each channel a target id:
/// forward channels first, then rearward, each in ascending channel order.
pub fn assign_targets(trip: &TripInput, allocator: &mut TargetIdAllocator) -> Vec<TargetAssignment> {
    let mut out = Vec::new();
    for (direction, returns) in [
        (SensorDirection::Forward, &trip.forward),
        (SensorDirection::Rearward, &trip.rearward),
    ] {
        let mut channels: BTreeMap<u32, Vec<RadarReturn>> = BTreeMap::new();
        for r in returns {
            channels.entry(r.channel).or_default().push(r.clone());
        }
        for (channel, returns) in channels {
            out.push(TargetAssignment {
                target_id: allocator.allocate(),
                direction,
                channel,
                returns,
            });
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Link between a reconstructed track and its radar channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackSummary {
    pub target_id: TargetId,
    pub forward: bool,
    pub channel: u32,
    pub observations: usize,
}

/// A successfully reconstructed trip.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TripReconstruction {
    pub trip_id: TripId,
    pub direction: RunDirection,
    pub forward_error: Option<f64>,
    pub reverse_error: Option<f64>,
    pub ego: Vec<EgoStateRecord>,
    pub tracks: Vec<TrackSummary>,
    pub surrounding: Vec<SurroundingStateRecord>,
    /// Channels that were assigned an id but not filtered
    pub dropped_tracks: usize,
}

impl TripReconstruction {
    /// Records of one target, in time order.
    pub fn track(&self, target_id: TargetId) -> impl Iterator<Item = &SurroundingStateRecord> {
        self.surrounding.iter().filter(move |r| r.target_id == target_id)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InvalidReason {
    /// Neither end of the trip has a valid speed anchor
    Unanchored,
    /// The input was rejected by a filter
    Fault { message: String },
}

/// A trip with no reconstruction, kept for audit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InvalidTrip {
    pub trip_id: TripId,
    pub reason: InvalidReason,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TripOutcome {
    Reconstructed(TripReconstruction),
    Invalid(InvalidTrip),
}

/// Result of a batch run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconstructionReport {
    pub trips: Vec<TripReconstruction>,
    pub invalid: Vec<InvalidTrip>,
}

impl ReconstructionReport {
    pub fn track_count(&self) -> usize {
        self.trips.iter().map(|t| t.tracks.len()).sum()
    }

    pub fn trip(&self, trip_id: TripId) -> Option<&TripReconstruction> {
        self.trips.iter().find(|t| t.trip_id == trip_id)
    }
}

// ---------------------------------------------------------------------------
// Processor
// ---------------------------------------------------------------------------

/// Runs the whole reconstruction for trips. Holds no per-trip state.
#[derive(Clone, Debug)]
pub struct TripProcessor {
    config: ReconstructionConfig,
    selector: DirectionalRunSelector,
    surrounding: SurroundingStateEstimator,
}

impl TripProcessor {
    pub fn new(config: ReconstructionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            selector: DirectionalRunSelector::new(config.ego.clone(), config.selector.clone()),
            surrounding: SurroundingStateEstimator::new(config.surrounding.clone()),
            config,
        })
    }

    pub fn config(&self) -> &ReconstructionConfig {
        &self.config
    }

    /// Assign ids for `trip` from `allocator`, then reconstruct it.
    pub fn process_trip(&self, trip: &TripInput, allocator: &mut TargetIdAllocator) -> Result<TripOutcome> {
        let assignments = assign_targets(trip, allocator);
        self.process_assigned(trip, assignments)
    }

    /// Reconstruct a trip whose radar channels already carry target ids.
    pub fn process_assigned(&self, trip: &TripInput, assignments: Vec<TargetAssignment>) -> Result<TripOutcome> {
        let run = match self.selector.select(&trip.ego)? {
            EgoReconstruction::Reconstructed(run) => run,
            EgoReconstruction::Unanchored => {
                return Ok(TripOutcome::Invalid(InvalidTrip {
                    trip_id: trip.trip_id,
                    reason: InvalidReason::Unanchored,
                }))
            }
        };

        let event = trip.event.and_then(|e| resolve_event(trip, e));
        let ego = ego_records(trip, &run, event);
        let trajectory = EgoTrajectory::new(trip.ego.iter().map(|s| s.time).collect(), run.states);
        let projector = CoordinateProjector::for_trip(&self.config.projection, trip.ego_length);

        let assigned = assignments.len();
        let filtered: Vec<(TrackSummary, Vec<SurroundingStateRecord>)> = assignments
            .par_iter()
            .map(|a| self.process_track(trip.trip_id, &projector, &trajectory, a, event))
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .flatten()
            .collect();

        let mut tracks = Vec::with_capacity(filtered.len());
        let mut surrounding = Vec::new();
        for (summary, records) in filtered {
            tracks.push(summary);
            surrounding.extend(records);
        }

        debug!(
            trip = %trip.trip_id,
            direction = %run.direction,
            tracks = tracks.len(),
            dropped = assigned - tracks.len(),
            "trip reconstructed"
        );

        Ok(TripOutcome::Reconstructed(TripReconstruction {
            trip_id: trip.trip_id,
            direction: run.direction,
            forward_error: run.forward_error,
            reverse_error: run.reverse_error,
            ego,
            dropped_tracks: assigned - tracks.len(),
            tracks,
            surrounding,
        }))
    }

    fn process_track(
        &self,
        trip_id: TripId,
        projector: &CoordinateProjector,
        trajectory: &EgoTrajectory,
        assignment: &TargetAssignment,
        event: Option<(f64, f64)>,
    ) -> Result<Option<(TrackSummary, Vec<SurroundingStateRecord>)>> {
        let observations = match projector.project_track(
            trajectory,
            &assignment.returns,
            assignment.direction,
            assignment.target_id,
        ) {
            Some(obs) => obs,
            None => {
                debug!(
                    trip = %trip_id,
                    vehicle = %assignment.target_id,
                    channel = assignment.channel,
                    "track too short, skipped"
                );
                return Ok(None);
            }
        };

        if let Some((start, _)) = event {
            if !spans(&observations, start) {
                debug!(
                    trip = %trip_id,
                    vehicle = %assignment.target_id,
                    "track does not span the event start, skipped"
                );
                return Ok(None);
            }
        }

        let states = self.surrounding.estimate(&observations)?;
        let records = observations
            .iter()
            .zip(states)
            .map(|(o, state)| SurroundingStateRecord {
                trip_id,
                target_id: o.target_id,
                time: o.time,
                state,
                x_observed: o.x,
                y_observed: o.y,
                speed_observed: o.speed,
                forward: o.direction.is_forward(),
            })
            .collect();

        Ok(Some((
            TrackSummary {
                target_id: assignment.target_id,
                forward: assignment.direction.is_forward(),
                channel: assignment.channel,
                observations: observations.len(),
            },
            records,
        )))
    }

    /// Reconstruct a batch. Ids are allocated in input order before any
    /// trip is processed, so the result does not depend on scheduling.
    pub fn process_batch(&self, trips: &[TripInput], allocator: &mut TargetIdAllocator) -> ReconstructionReport {
        let assignments: Vec<Vec<TargetAssignment>> =
            trips.iter().map(|t| assign_targets(t, allocator)).collect();

        let outcomes: Vec<TripOutcome> = trips
            .par_iter()
            .zip(assignments)
            .map(|(trip, assigned)| match self.process_assigned(trip, assigned) {
                Ok(outcome) => outcome,
                Err(e) => TripOutcome::Invalid(InvalidTrip {
                    trip_id: trip.trip_id,
                    reason: InvalidReason::Fault {
                        message: e.to_string(),
                    },
                }),
            })
            .collect();

        let mut report = ReconstructionReport::default();
        for outcome in outcomes {
            match outcome {
                TripOutcome::Reconstructed(t) => report.trips.push(t),
                TripOutcome::Invalid(invalid) => {
                    warn!(trip = %invalid.trip_id, reason = ?invalid.reason, "trip not reconstructed");
                    report.invalid.push(invalid);
                }
            }
        }

        info!(
            trips = trips.len(),
            reconstructed = report.trips.len(),
            invalid = report.invalid.len(),
            tracks = report.track_count(),
            "batch finished"
        );
        report
    }
}

/// Times of the event's first and last sync, or `None` (with a warning)
/// when either is not in the trip.
fn resolve_event(trip: &TripInput, event: EventWindow) -> Option<(f64, f64)> {
    let time_of = |sync: i64| trip.ego.iter().find(|s| s.sync == sync).map(|s| s.time);
    match (time_of(event.start_sync), time_of(event.end_sync)) {
        (Some(start), Some(end)) => Some((start, end)),
        _ => {
            warn!(
                trip = %trip.trip_id,
                start_sync = event.start_sync,
                end_sync = event.end_sync,
                "event sync not found in trip, ignoring event"
            );
            None
        }
    }
}

/// First observation at or before `start` and last one after it.
fn spans(observations: &[SurroundingObservation], start: f64) -> bool {
    match (observations.first(), observations.last()) {
        (Some(first), Some(last)) => first.time <= start && start < last.time,
        _ => false,
    }
}

fn ego_records(trip: &TripInput, run: &SelectedRun, event: Option<(f64, f64)>) -> Vec<EgoStateRecord> {
    trip.ego
        .iter()
        .zip(&run.states)
        .map(|(sample, state)| EgoStateRecord {
            trip_id: trip.trip_id,
            sync: sample.sync,
            time: sample.time,
            state: *state,
            speed_measured: sample.speed_mps(),
            brake: sample.brake,
            signal: sample.signal,
            in_event: event.is_some_and(|(start, end)| start <= sample.time && sample.time <= end),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
