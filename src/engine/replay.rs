//! # Replay Engine
//!
//! A [`TransportEngine`] that feeds recorded event histories through the
//! callback protocol instead of sampling physics.
//!
//! ## Stacking
//!
//! ```text
//! urgent ──pop──▶ track segment ──Suspend──▶ suspended
//!   ▲                  │
//!   │                  └─ secondaries ─classify─▶ urgent | waiting
//!   │
//!   ├── urgent empty:             suspended tracks are classified again
//!   └── urgent+suspended empty:   phase closed (once), waiting reclassified
//! ```
//!
//! Anything still held after the phase closed is promoted, so every event
//! drains. Secondaries inherit their parent's post-step weight.
//!
//! ## Weights
//!
//! Steps inside the biased volume may list the processes competing on them
//! together with their unbiased mean free paths. The biasing operator is
//! consulted for each, and the track weight picks up the likelihood ratio of
//! whatever operation it proposes. A process counts as fired on a step when
//! a secondary of that step names it as creator.

use std::fs;
use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{de, Deserialize, Deserializer, Serialize};
use tracing::debug;

use super::{
    Classification, EventHooks, StepControl, StepInfo, StepPoint, TrackInfo, TransportEngine,
    TransportOutcome,
};
use crate::biasing::{BiasingProcess, CrossSectionBiasOperator};
use crate::constants::WORLD_VOLUME;
use crate::error::{Result, SimError};
use crate::types::{Species, Vec3};

// ============================================================================
// SCRIPTS
// ============================================================================

/// Physics process competing on a scripted step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptProcess {
    pub name: String,
    /// Unbiased mean free path (mm)
    pub mean_free_path: f64,
}

impl BiasingProcess for ScriptProcess {
    fn process_name(&self) -> &str {
        &self.name
    }

    fn current_interaction_length(&self) -> f64 {
        self.mean_free_path
    }
}

/// One recorded step; the fields give the post-step state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptStep {
    pub position: Vec3,
    #[serde(default)]
    pub time: f64,
    pub kinetic_energy: f64,
    /// New direction, unchanged when absent
    #[serde(default)]
    pub direction: Option<Vec3>,
    /// Post-step volume, `None` once the track left the world
    #[serde(default)]
    pub volume: Option<String>,
    #[serde(default)]
    pub processes: Vec<ScriptProcess>,
    #[serde(default)]
    pub secondaries: Vec<ScriptTrack>,
    /// Scoring plane crossed by this step
    #[serde(default)]
    pub scoring_plane: Option<String>,
}

/// One recorded track and its steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptTrack {
    pub track_id: i32,
    pub pdg: Species,
    #[serde(default)]
    pub creator_process: Option<String>,
    pub kinetic_energy: f64,
    /// Rest mass (MeV), taken from the species when absent
    #[serde(default)]
    pub mass: Option<f64>,
    #[serde(default = "ScriptTrack::default_direction")]
    pub direction: Vec3,
    /// Start position, the parent's post-step position when absent
    #[serde(default)]
    pub position: Option<Vec3>,
    #[serde(default)]
    pub time: Option<f64>,
    #[serde(default = "ScriptTrack::default_volume")]
    pub volume: Option<String>,
    #[serde(default)]
    pub steps: Vec<ScriptStep>,
}

impl ScriptTrack {
    fn default_direction() -> Vec3 {
        Vec3::unit_z()
    }
    fn default_volume() -> Option<String> {
        Some(WORLD_VOLUME.into())
    }

    /// Engine state at the start of this track
    fn initial_state(&self, parent_id: i32, origin: Option<&TrackInfo>) -> TrackInfo {
        TrackInfo {
            track_id: self.track_id,
            parent_id,
            species: self.pdg,
            creator_process: self.creator_process.clone(),
            kinetic_energy: self.kinetic_energy,
            mass: self.mass.or_else(|| self.pdg.mass()).unwrap_or(0.0),
            direction: self.direction.normalize(),
            position: self.position.or(origin.map(|o| o.position)).unwrap_or_default(),
            time: self.time.or(origin.map(|o| o.time)).unwrap_or(0.0),
            weight: origin.map_or(1.0, |o| o.weight),
            volume: self.volume.clone(),
        }
    }

    fn validate(&self, primary: bool) -> Result<()> {
        if primary && self.creator_process.is_some() {
            return Err(SimError::Script(format!("primary track {} has a creator process", self.track_id)));
        }
        if !primary && self.creator_process.is_none() {
            return Err(SimError::Script(format!("secondary track {} has no creator process", self.track_id)));
        }
        for step in &self.steps {
            for process in &step.processes {
                if !(process.mean_free_path.is_finite() && process.mean_free_path > 0.0) {
                    return Err(SimError::Script(format!(
                        "track {}: process '{}' has mean free path {}",
                        self.track_id, process.name, process.mean_free_path
                    )));
                }
            }
            for secondary in &step.secondaries {
                secondary.validate(false)?;
            }
        }
        Ok(())
    }
}

/// One recorded event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventScript {
    pub primaries: Vec<ScriptTrack>,
}

impl EventScript {
    pub fn validate(&self) -> Result<()> {
        if self.primaries.is_empty() {
            return Err(SimError::Script("event without primaries".into()));
        }
        self.primaries.iter().try_for_each(|p| p.validate(true))
    }
}

/// Something that hands out the history to replay for each event
pub trait EventSource {
    fn sample<R: Rng>(&self, rng: &mut R) -> &EventScript;
}

impl EventSource for EventScript {
    fn sample<R: Rng>(&self, _rng: &mut R) -> &EventScript {
        self
    }
}

/// Pool of recorded events drawn from uniformly; never empty
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScriptLibrary {
    events: Vec<EventScript>,
}

impl ScriptLibrary {
    pub fn new(events: Vec<EventScript>) -> Result<Self> {
        if events.is_empty() {
            return Err(SimError::Script("script library holds no events".into()));
        }
        events.iter().try_for_each(EventScript::validate)?;
        Ok(Self { events })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| SimError::Script(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| SimError::Script(format!("invalid event script: {}", e)))
    }

    pub fn events(&self) -> &[EventScript] {
        &self.events
    }
}

impl<'de> Deserialize<'de> for ScriptLibrary {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Events {
            events: Vec<EventScript>,
        }
        let Events { events } = Events::deserialize(deserializer)?;
        ScriptLibrary::new(events).map_err(de::Error::custom)
    }
}

impl EventSource for ScriptLibrary {
    fn sample<R: Rng>(&self, rng: &mut R) -> &EventScript {
        &self.events[rng.gen_range(0..self.events.len())]
    }
}

// ============================================================================
// ENGINE
// ============================================================================

/// Replay statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplayStats {
    pub events: u64,
    pub aborted: u64,
    /// Track segments started, resumed tracks included
    pub tracks_started: u64,
    pub steps: u64,
    pub suspensions: u64,
    /// Process/step pairs the operator biased
    pub biased_steps: u64,
}

/// Engine replaying events drawn from an [`EventSource`]
pub struct ReplayEngine<S: EventSource> {
    source: S,
    rng: StdRng,
    biasing: Option<CrossSectionBiasOperator>,
    stats: ReplayStats,
}

impl<S: EventSource> ReplayEngine<S> {
    pub fn new(source: S, seed: u64, biasing: Option<CrossSectionBiasOperator>) -> Self {
        Self {
            source,
            rng: StdRng::seed_from_u64(seed),
            biasing,
            stats: ReplayStats::default(),
        }
    }

    pub fn stats(&self) -> &ReplayStats {
        &self.stats
    }
}

impl<S: EventSource> TransportEngine for ReplayEngine<S> {
    fn start_run(&mut self) {
        if let Some(operator) = self.biasing.as_mut() {
            operator.start_run();
            debug!(
                operator = operator.name(),
                volume = operator.volume(),
                factor = operator.factor(),
                "biasing attached"
            );
        }
    }

    fn transport_event(&mut self, event_id: u64, hooks: &mut dyn EventHooks) -> Result<TransportOutcome> {
        let script = self.source.sample(&mut self.rng);
        let mut transport = EventTransport {
            hooks,
            biasing: self.biasing.as_mut(),
            stats: &mut self.stats,
            urgent: Vec::new(),
            suspended: Vec::new(),
            waiting: Vec::new(),
        };
        let outcome = transport.run(&script.primaries);

        self.stats.events += 1;
        if outcome == TransportOutcome::Aborted {
            self.stats.aborted += 1;
        }
        debug!(event_id, ?outcome, steps = self.stats.steps, "replayed event");
        Ok(outcome)
    }
}

/// A track waiting on one of the stacks
struct Pending<'s> {
    script: &'s ScriptTrack,
    next_step: usize,
    state: TrackInfo,
}

/// Stacks and collaborators for one event
struct EventTransport<'s, 'h, H: EventHooks + ?Sized> {
    hooks: &'h mut H,
    biasing: Option<&'h mut CrossSectionBiasOperator>,
    stats: &'h mut ReplayStats,
    urgent: Vec<Pending<'s>>,
    suspended: Vec<Pending<'s>>,
    waiting: Vec<Pending<'s>>,
}

impl<'s, H: EventHooks + ?Sized> EventTransport<'s, '_, H> {
    fn run(&mut self, primaries: &'s [ScriptTrack]) -> TransportOutcome {
        // reversed so the first primary is popped first
        for primary in primaries.iter().rev() {
            let state = primary.initial_state(0, None);
            self.stack(Pending { script: primary, next_step: 0, state });
        }

        let mut phase_closed = false;
        loop {
            if let Some(track) = self.urgent.pop() {
                if self.track(track) == TransportOutcome::Aborted {
                    return TransportOutcome::Aborted;
                }
                continue;
            }
            if !self.suspended.is_empty() {
                // resumed tracks are classified again, like new ones
                for track in std::mem::take(&mut self.suspended) {
                    self.stack(track);
                }
                continue;
            }
            if !phase_closed {
                phase_closed = true;
                if self.hooks.on_priority_phase_closed().is_abort() {
                    return TransportOutcome::Aborted;
                }
            }
            if self.waiting.is_empty() {
                return TransportOutcome::Finished;
            }

            for track in std::mem::take(&mut self.waiting) {
                self.stack(track);
            }
            if self.urgent.is_empty() {
                self.urgent.append(&mut self.waiting);
            }
        }
    }

    fn stack(&mut self, track: Pending<'s>) {
        match self.hooks.classify_new_track(&track.state) {
            Classification::Urgent => self.urgent.push(track),
            Classification::Waiting => self.waiting.push(track),
        }
    }

    /// Transport one segment of a track, up to its end or a suspension
    fn track(&mut self, mut pending: Pending<'s>) -> TransportOutcome {
        self.stats.tracks_started += 1;
        if self.hooks.on_track_start(&pending.state).is_abort() {
            return TransportOutcome::Aborted;
        }

        let script = pending.script;
        let mut produced = Vec::new();
        let mut suspended = false;

        while let Some(step) = script.steps.get(pending.next_step) {
            pending.next_step += 1;
            self.stats.steps += 1;

            let before = pending.state.clone();
            let pre = StepPoint::of_track(&before);

            let state = &mut pending.state;
            state.position = step.position;
            state.time = step.time;
            state.kinetic_energy = step.kinetic_energy;
            if let Some(direction) = step.direction {
                state.direction = direction.normalize();
            }
            state.volume = step.volume.clone();
            let mut post = StepPoint::of_track(state);

            let mut secondaries: Vec<TrackInfo> = step
                .secondaries
                .iter()
                .map(|s| s.initial_state(pending.state.track_id, Some(&pending.state)))
                .collect();

            // weights are still the pre-step ones here
            let unweighted = StepInfo { track: &pending.state, pre: &pre, post: &post, secondaries: &secondaries };
            let factor = self.bias_weight(&before, &step.processes, &unweighted);
            pending.state.weight *= factor;
            post.weight = pending.state.weight;
            for secondary in &mut secondaries {
                secondary.weight = pending.state.weight;
            }

            let info = StepInfo { track: &pending.state, pre: &pre, post: &post, secondaries: &secondaries };
            if let Some(plane) = &step.scoring_plane {
                self.hooks.on_scoring_plane_hit(plane, &info);
            }
            let control = self.hooks.on_step(&info);

            for (secondary, state) in step.secondaries.iter().zip(secondaries) {
                produced.push(Pending { script: secondary, next_step: 0, state });
            }

            match control {
                StepControl::AbortEvent => return TransportOutcome::Aborted,
                StepControl::Suspend => {
                    suspended = true;
                    break;
                }
                StepControl::Continue => {}
            }
        }

        if suspended && pending.next_step < script.steps.len() {
            self.stats.suspensions += 1;
            self.suspended.push(pending);
        }
        for secondary in produced {
            self.stack(secondary);
        }
        TransportOutcome::Finished
    }

    /// Likelihood ratio the operator's proposals imply for this step
    ///
    /// `before` is the track as it entered the step.
    fn bias_weight(&mut self, before: &TrackInfo, processes: &[ScriptProcess], step: &StepInfo<'_>) -> f64 {
        let Some(operator) = self.biasing.as_deref_mut() else {
            return 1.0;
        };
        if !before.volume.as_deref().is_some_and(|v| operator.is_attached_to(v)) {
            return 1.0;
        }

        let length = (step.post.position - step.pre.position).mag();
        let mut factor = 1.0;
        for process in processes {
            if let Some(operation) = operator.propose_occurrence_biasing(before, process) {
                factor *= operation.weight_for_step(1.0 / process.mean_free_path, length, step.produced_by(&process.name));
                self.stats.biased_steps += 1;
            }
        }
        factor
    }
}
