//! # Engine Interface
//!
//! The seam between the event logic and a particle-transport engine.
//!
//! ## Callback order for one event
//!
//! ```text
//! begin_of_event
//!   ├─ classify_new_track / on_track_start / on_step / on_scoring_plane_hit  (interleaved)
//!   ├─ on_priority_phase_closed                                            (exactly once)
//!   └─ on_track_start / on_step for resumed tracks                         (unless aborted)
//! end_of_event
//! ```
//!
//! `begin_of_event` and `end_of_event` belong to the run driver; everything
//! in between is fired by the engine through [`EventHooks`].

pub mod replay;

use crate::error::Result;
use crate::types::{Species, Vec3};

pub use replay::{EventScript, EventSource, ReplayEngine, ScriptLibrary};

// ============================================================================
// DESCRIPTORS
// ============================================================================

/// State of a track as the engine reports it
#[derive(Debug, Clone, PartialEq)]
pub struct TrackInfo {
    pub track_id: i32,
    /// Zero for primaries
    pub parent_id: i32,
    pub species: Species,
    /// Process that created the track, `None` for primaries
    pub creator_process: Option<String>,
    /// Kinetic energy (MeV)
    pub kinetic_energy: f64,
    /// Rest mass (MeV)
    pub mass: f64,
    /// Unit momentum direction
    pub direction: Vec3,
    /// Position (mm)
    pub position: Vec3,
    /// Global time (ns)
    pub time: f64,
    /// Statistical weight, including every upstream biasing adjustment
    pub weight: f64,
    /// Volume the track is currently in, `None` once it left the world
    pub volume: Option<String>,
}

impl TrackInfo {
    /// Whether the track came from the beam rather than an interaction
    pub fn is_primary(&self) -> bool {
        self.creator_process.is_none()
    }

    /// Whether the track was created by the named process
    pub fn created_by(&self, process: &str) -> bool {
        self.creator_process.as_deref() == Some(process)
    }

    /// Whether the track is in the named volume
    pub fn is_in(&self, volume: &str) -> bool {
        self.volume.as_deref() == Some(volume)
    }
}

/// One end of a step
#[derive(Debug, Clone, PartialEq)]
pub struct StepPoint {
    pub position: Vec3,
    pub time: f64,
    pub kinetic_energy: f64,
    pub weight: f64,
    pub volume: Option<String>,
}

impl StepPoint {
    /// Step point at the current state of a track
    pub fn of_track(track: &TrackInfo) -> Self {
        Self {
            position: track.position,
            time: track.time,
            kinetic_energy: track.kinetic_energy,
            weight: track.weight,
            volume: track.volume.clone(),
        }
    }
}

/// A completed step
#[derive(Debug, Clone, Copy)]
pub struct StepInfo<'a> {
    /// Track state after the step
    pub track: &'a TrackInfo,
    pub pre: &'a StepPoint,
    pub post: &'a StepPoint,
    /// Secondaries created during this step
    pub secondaries: &'a [TrackInfo],
}

impl StepInfo<'_> {
    /// Whether the step starts in `from` and ends in `to`
    pub fn is_transiting(&self, from: &str, to: &str) -> bool {
        self.pre.volume.as_deref() == Some(from) && self.post.volume.as_deref() == Some(to)
    }

    /// Weight factor contributed by this step alone
    pub fn weight_ratio(&self) -> f64 {
        self.post.weight / self.pre.weight
    }

    /// Whether any secondary of this step was created by the named process
    pub fn produced_by(&self, process: &str) -> bool {
        self.secondaries.iter().any(|s| s.created_by(process))
    }
}

// ============================================================================
// VERDICTS
// ============================================================================

/// Stack a new or resumed track goes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Process now, within the priority phase
    Urgent,
    /// Hold until the priority phase closes
    Waiting,
}

/// Verdict after a step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepControl {
    Continue,
    /// Stop tracking for now and put the track back for later
    Suspend,
    AbortEvent,
}

/// Verdict from the track-start and phase-closed hooks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventControl {
    Continue,
    AbortEvent,
}

impl EventControl {
    pub fn is_abort(self) -> bool {
        self == EventControl::AbortEvent
    }
}

/// How the engine left an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportOutcome {
    /// All stacks drained
    Finished,
    /// A hook asked for an abort; in-flight tracks were discarded
    Aborted,
}

// ============================================================================
// TRAITS
// ============================================================================

/// Callbacks an engine fires while transporting one event
pub trait EventHooks {
    fn classify_new_track(&mut self, track: &TrackInfo) -> Classification;
    fn on_track_start(&mut self, track: &TrackInfo) -> EventControl;
    fn on_step(&mut self, step: &StepInfo<'_>) -> StepControl;
    /// Fired once per event, when the urgent stack first drains
    fn on_priority_phase_closed(&mut self) -> EventControl;
    fn on_scoring_plane_hit(&mut self, plane: &str, step: &StepInfo<'_>);
}

/// A particle-transport engine driving [`EventHooks`]
pub trait TransportEngine {
    /// Prepare for a run; may be called more than once
    fn start_run(&mut self);

    /// Transport one event to completion or abort
    fn transport_event(&mut self, event_id: u64, hooks: &mut dyn EventHooks) -> Result<TransportOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(volume: Option<&str>) -> TrackInfo {
        TrackInfo {
            track_id: 3,
            parent_id: 1,
            species: Species::Gamma,
            creator_process: Some("eBrem".into()),
            kinetic_energy: 500.0,
            mass: 0.0,
            direction: Vec3::unit_z(),
            position: Vec3::zero(),
            time: 0.0,
            weight: 2.0,
            volume: volume.map(String::from),
        }
    }

    #[test]
    fn test_step_transit_and_ratio() {
        let t = track(Some("World"));
        let mut pre = StepPoint::of_track(&t);
        pre.volume = Some("Hunk".into());
        let mut post = StepPoint::of_track(&t);
        post.weight = 3.0;
        let step = StepInfo { track: &t, pre: &pre, post: &post, secondaries: &[] };

        assert!(step.is_transiting("Hunk", "World"));
        assert!(!step.is_transiting("World", "Hunk"));
        assert!((step.weight_ratio() - 1.5).abs() < 1e-12);
        assert!(!step.produced_by("GammaToMuPair"));
    }

    #[test]
    fn test_track_predicates() {
        let t = track(None);
        assert!(!t.is_primary());
        assert!(t.created_by("eBrem"));
        assert!(!t.is_in("World"));
    }
}
