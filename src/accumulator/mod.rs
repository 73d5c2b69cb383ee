//! # Event Accumulator
//!
//! Event-local state driven by the engine callbacks.
//!
//! ## Responsibilities
//!
//! - **Weight**: running product of per-step weight ratios, which composes
//!   every biasing adjustment the engine applied upstream
//! - **Roles**: incident, parent, mu+ and mu- are bound at most once each;
//!   a second, different track for any role aborts the event
//! - **Priority staging**: tracks below the filter threshold are held back
//!   until the urgent stack drains, at which point the success predicate
//!   decides whether the rest of the event is worth transporting
//! - **Persistence**: one record per successful event
//!
//! Per-event aborts never escape this module; they only decide whether the
//! event counts as completed.

use std::io::Write;

use tracing::{debug, trace};

use crate::constants::{RARE_PROCESS, TARGET_VOLUME, WORLD_VOLUME};
use crate::engine::{Classification, EventControl, EventHooks, StepControl, StepInfo, TrackInfo};
use crate::error::{EventAbort, Result, Role};
use crate::output::{EventRecord, OutputSink};
use crate::particle::{ParticleRecord, ScoringPlaneHit};
use crate::run::RunRecord;
use crate::types::Species;

// ============================================================================
// SELECTION
// ============================================================================

/// What the accumulator is looking for
#[derive(Debug, Clone, PartialEq)]
pub struct EventSelection {
    /// Muon energy (MeV) at least one muon must exceed; `None` disables filtering
    pub filter_threshold: Option<f64>,
    /// Species undergoing the rare process
    pub carrier: Species,
    pub rare_process: String,
    pub target_volume: String,
    /// Medium the target sits in
    pub world_volume: String,
}

impl EventSelection {
    /// Threshold used for staging; zero when filtering is off
    pub fn staging_threshold(&self) -> f64 {
        self.filter_threshold.unwrap_or(0.0)
    }
}

impl Default for EventSelection {
    fn default() -> Self {
        Self {
            filter_threshold: None,
            carrier: Species::Gamma,
            rare_process: RARE_PROCESS.into(),
            target_volume: TARGET_VOLUME.into(),
            world_volume: WORLD_VOLUME.into(),
        }
    }
}

// ============================================================================
// ROLE SLOTS
// ============================================================================

/// The four distinguished particles of an event
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoleSlots {
    pub incident: Option<ParticleRecord>,
    pub parent: Option<ParticleRecord>,
    pub mu_plus: Option<ParticleRecord>,
    pub mu_minus: Option<ParticleRecord>,
}

impl RoleSlots {
    fn slot_mut(&mut self, role: Role) -> &mut Option<ParticleRecord> {
        match role {
            Role::Incident => &mut self.incident,
            Role::Parent => &mut self.parent,
            Role::MuPlus => &mut self.mu_plus,
            Role::MuMinus => &mut self.mu_minus,
        }
    }

    pub fn all_bound(&self) -> bool {
        self.incident.is_some() && self.parent.is_some() && self.mu_plus.is_some() && self.mu_minus.is_some()
    }

    /// Whether `track_id` holds any role
    pub fn holds(&self, track_id: i32) -> bool {
        [&self.incident, &self.parent, &self.mu_plus, &self.mu_minus]
            .iter()
            .any(|slot| slot.as_ref().map(|p| p.track_id) == Some(track_id))
    }

    /// Bind `track` to `role`
    ///
    /// The same track presented again (a resumed track) keeps its first
    /// snapshot. A different track is an ambiguous topology.
    fn bind(&mut self, role: Role, track: &TrackInfo) -> std::result::Result<(), EventAbort> {
        let slot = self.slot_mut(role);
        match slot {
            Some(bound) if bound.track_id == track.track_id => Ok(()),
            Some(bound) => Err(EventAbort::AmbiguousTopology {
                role,
                track_id: track.track_id,
                bound_id: bound.track_id,
            }),
            None => {
                *slot = Some(ParticleRecord::from_track(track));
                Ok(())
            }
        }
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

// ============================================================================
// ACCUMULATOR
// ============================================================================

/// How an event ended
#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    /// Success predicate held; the event was persisted
    Completed,
    /// Success predicate failed at end of event; discarded
    Rejected,
    /// Aborted during transport; discarded
    Aborted(EventAbort),
}

/// Event-local state plus run counters; the only writer of its sink
pub struct EventAccumulator<W: Write> {
    selection: EventSelection,
    sink: OutputSink<W>,
    weight: f64,
    roles: RoleSlots,
    extra: Vec<ParticleRecord>,
    plane_hits: Vec<ScoringPlaneHit>,
    phase_closed: bool,
    abort: Option<EventAbort>,
    events_started: u64,
    events_completed: u64,
}

impl<W: Write> EventAccumulator<W> {
    pub fn new(selection: EventSelection, sink: OutputSink<W>) -> Self {
        Self {
            selection,
            sink,
            weight: 1.0,
            roles: RoleSlots::default(),
            extra: Vec::new(),
            plane_hits: Vec::new(),
            phase_closed: false,
            abort: None,
            events_started: 0,
            events_completed: 0,
        }
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    pub fn begin_of_event(&mut self) {
        self.weight = 1.0;
        self.roles.clear();
        self.extra.clear();
        self.plane_hits.clear();
        self.phase_closed = false;
        self.abort = None;
        self.events_started += 1;
    }

    /// Urgent for muons, energetic tracks, and everything once the phase closed
    pub fn classify_new_track(&self, track: &TrackInfo) -> Classification {
        if track.species.is_muon()
            || track.kinetic_energy >= self.selection.staging_threshold()
            || self.phase_closed
        {
            Classification::Urgent
        } else {
            Classification::Waiting
        }
    }

    pub fn on_track_start(&mut self, track: &TrackInfo) -> EventControl {
        if self.abort.is_some() {
            return EventControl::AbortEvent;
        }

        if track.is_primary() && self.roles.incident.is_none() {
            trace!(track = track.track_id, "incident");
            self.roles.incident = Some(ParticleRecord::from_track(track));
        }

        let role = match track.species {
            Species::MuPlus => Role::MuPlus,
            Species::MuMinus => Role::MuMinus,
            _ => return EventControl::Continue,
        };
        match self.roles.bind(role, track) {
            Ok(()) => EventControl::Continue,
            Err(reason) => {
                self.abort_event(reason);
                EventControl::AbortEvent
            }
        }
    }

    pub fn on_step(&mut self, step: &StepInfo<'_>) -> StepControl {
        if self.abort.is_some() {
            return StepControl::AbortEvent;
        }

        // post/pre already folds in every upstream step of this track
        self.weight *= step.weight_ratio();

        let mut control = StepControl::Continue;
        if !self.phase_closed {
            let threshold = self.selection.staging_threshold();
            if step.pre.kinetic_energy >= threshold && step.post.kinetic_energy < threshold {
                control = StepControl::Suspend;
            }

            if step.track.species == self.selection.carrier && step.produced_by(&self.selection.rare_process) {
                // snapshot the carrier as it was when it converted
                let mut carrier = step.track.clone();
                carrier.kinetic_energy = step.pre.kinetic_energy;
                if let Err(reason) = self.roles.bind(Role::Parent, &carrier) {
                    self.abort_event(reason);
                    return StepControl::AbortEvent;
                }
                trace!(track = carrier.track_id, "parent");
            }
        }

        if step.is_transiting(&self.selection.target_volume, &self.selection.world_volume)
            && !self.roles.holds(step.track.track_id)
        {
            self.extra.push(ParticleRecord::from_track(step.track));
        }

        control
    }

    /// Close the priority phase and reject early when the verdict is already negative
    pub fn on_priority_phase_closed(&mut self) -> EventControl {
        if self.abort.is_some() {
            return EventControl::AbortEvent;
        }
        self.phase_closed = true;
        if self.success() {
            EventControl::Continue
        } else {
            self.abort_event(EventAbort::EarlyRejection);
            EventControl::AbortEvent
        }
    }

    pub fn on_new_scoring_plane_hit(&mut self, plane: &str, step: &StepInfo<'_>) {
        trace!(plane, track = step.track.track_id, "plane hit");
        self.plane_hits.push(ScoringPlaneHit::from_step(step));
    }

    /// Persist the event if it succeeded; storage failures are fatal
    pub fn end_of_event(&mut self) -> Result<EventOutcome> {
        if let Some(reason) = self.abort.take() {
            return Ok(EventOutcome::Aborted(reason));
        }
        if !self.success() {
            return Ok(EventOutcome::Rejected);
        }
        self.sink.write_event(&self.record())?;
        self.events_completed += 1;
        Ok(EventOutcome::Completed)
    }

    /// Write the run record and close the sink
    pub fn finish(self, run: &RunRecord) -> Result<W> {
        self.sink.finish(run)
    }

    // ------------------------------------------------------------------------
    // Verdict
    // ------------------------------------------------------------------------

    /// All four roles bound and one muon above threshold; always true unfiltered
    pub fn success(&self) -> bool {
        let Some(threshold) = self.selection.filter_threshold else {
            return true;
        };
        match (&self.roles.incident, &self.roles.parent, &self.roles.mu_plus, &self.roles.mu_minus) {
            (Some(_), Some(_), Some(mu_plus), Some(mu_minus)) => {
                mu_plus.energy() > threshold || mu_minus.energy() > threshold
            }
            _ => false,
        }
    }

    fn abort_event(&mut self, reason: EventAbort) {
        debug!(event = self.events_started, %reason, "aborting event");
        if self.abort.is_none() {
            self.abort = Some(reason);
        }
    }

    fn record(&self) -> EventRecord {
        EventRecord {
            incident: self.roles.incident.clone(),
            parent: self.roles.parent.clone(),
            mu_plus: self.roles.mu_plus.clone(),
            mu_minus: self.roles.mu_minus.clone(),
            extra: self.extra.clone(),
            scoring_plane_hits: self.plane_hits.clone(),
            weight: self.weight,
        }
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn roles(&self) -> &RoleSlots {
        &self.roles
    }

    pub fn extra(&self) -> &[ParticleRecord] {
        &self.extra
    }

    pub fn plane_hits(&self) -> &[ScoringPlaneHit] {
        &self.plane_hits
    }

    pub fn is_phase_closed(&self) -> bool {
        self.phase_closed
    }

    pub fn pending_abort(&self) -> Option<&EventAbort> {
        self.abort.as_ref()
    }

    pub fn events_started(&self) -> u64 {
        self.events_started
    }

    pub fn events_completed(&self) -> u64 {
        self.events_completed
    }
}

impl<W: Write> EventHooks for EventAccumulator<W> {
    fn classify_new_track(&mut self, track: &TrackInfo) -> Classification {
        EventAccumulator::classify_new_track(self, track)
    }

    fn on_track_start(&mut self, track: &TrackInfo) -> EventControl {
        EventAccumulator::on_track_start(self, track)
    }

    fn on_step(&mut self, step: &StepInfo<'_>) -> StepControl {
        EventAccumulator::on_step(self, step)
    }

    fn on_priority_phase_closed(&mut self) -> EventControl {
        EventAccumulator::on_priority_phase_closed(self)
    }

    fn on_scoring_plane_hit(&mut self, plane: &str, step: &StepInfo<'_>) {
        self.on_new_scoring_plane_hit(plane, step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::M_MUON_MEV;
    use crate::engine::StepPoint;
    use crate::output::OutputContents;
    use crate::config::RunConfig;
    use crate::types::Vec3;

    type MemoryAccumulator = EventAccumulator<Vec<u8>>;

    fn accumulator(filter_threshold: Option<f64>) -> MemoryAccumulator {
        let selection = EventSelection { filter_threshold, ..EventSelection::default() };
        EventAccumulator::new(selection, OutputSink::new(Vec::new(), "memory"))
    }

    fn track(track_id: i32, species: Species, kinetic_energy: f64) -> TrackInfo {
        TrackInfo {
            track_id,
            parent_id: if track_id == 1 { 0 } else { 1 },
            species,
            creator_process: if track_id == 1 { None } else { Some("eBrem".into()) },
            kinetic_energy,
            mass: species.mass().unwrap_or(0.0),
            direction: Vec3::unit_z(),
            position: Vec3::zero(),
            time: 0.0,
            weight: 1.0,
            volume: Some(TARGET_VOLUME.into()),
        }
    }

    /// Muon whose total energy is `energy`
    fn muon(track_id: i32, species: Species, energy: f64) -> TrackInfo {
        let mut t = track(track_id, species, energy - M_MUON_MEV);
        t.creator_process = Some(RARE_PROCESS.into());
        t
    }

    fn point(kinetic_energy: f64, weight: f64, volume: &str) -> StepPoint {
        StepPoint {
            position: Vec3::zero(),
            time: 0.0,
            kinetic_energy,
            weight,
            volume: Some(volume.into()),
        }
    }

    /// Photon step converting into a muon pair
    fn convert(acc: &mut MemoryAccumulator, photon: &TrackInfo) -> StepControl {
        let secondaries = [muon(10, Species::MuPlus, 1200.0), muon(11, Species::MuMinus, 10.0)];
        let pre = point(photon.kinetic_energy, 1.0, TARGET_VOLUME);
        let post = point(0.0, 1.0, TARGET_VOLUME);
        acc.on_step(&StepInfo { track: photon, pre: &pre, post: &post, secondaries: &secondaries })
    }

    fn full_event(acc: &mut MemoryAccumulator, mu_plus_energy: f64, mu_minus_energy: f64) {
        acc.begin_of_event();
        acc.on_track_start(&track(1, Species::Electron, 8000.0));
        let photon = track(2, Species::Gamma, 5000.0);
        acc.on_track_start(&photon);
        convert(acc, &photon);
        acc.on_track_start(&muon(10, Species::MuPlus, mu_plus_energy));
        acc.on_track_start(&muon(11, Species::MuMinus, mu_minus_energy));
    }

    #[test]
    fn test_weight_is_product_of_step_ratios() {
        let mut acc = accumulator(None);
        acc.begin_of_event();
        let t = track(1, Species::Gamma, 100.0);
        let weights = [1.0, 0.5, 0.5, 2.0, 0.1];
        let mut expected = 1.0;
        for pair in weights.windows(2) {
            let pre = point(100.0, pair[0], TARGET_VOLUME);
            let post = point(100.0, pair[1], TARGET_VOLUME);
            acc.on_step(&StepInfo { track: &t, pre: &pre, post: &post, secondaries: &[] });
            expected *= pair[1] / pair[0];
        }
        assert!((acc.weight() - expected).abs() < 1e-15);
        assert!((acc.weight() - 0.1).abs() < 1e-15);

        acc.begin_of_event();
        assert_eq!(acc.weight(), 1.0);
    }

    #[test]
    fn test_unfiltered_success_ignores_roles() {
        let mut acc = accumulator(None);
        acc.begin_of_event();
        assert!(acc.success());
        assert_eq!(acc.on_priority_phase_closed(), EventControl::Continue);
        assert_eq!(acc.end_of_event().unwrap(), EventOutcome::Completed);
        assert_eq!(acc.events_completed(), 1);
    }

    #[test]
    fn test_filtered_success_needs_all_roles_and_energetic_muon() {
        let mut acc = accumulator(Some(1000.0));
        full_event(&mut acc, 1200.0, 10.0);
        assert!(acc.roles().all_bound());
        assert!(acc.success());

        full_event(&mut acc, 10.0, 1000.5);
        assert!(acc.success());

        full_event(&mut acc, 999.0, 10.0);
        assert!(!acc.success());

        acc.begin_of_event();
        acc.on_track_start(&track(1, Species::Electron, 8000.0));
        acc.on_track_start(&muon(10, Species::MuPlus, 5000.0));
        acc.on_track_start(&muon(11, Species::MuMinus, 5000.0));
        assert!(acc.roles().parent.is_none());
        assert!(!acc.success());
    }

    #[test]
    fn test_second_muon_of_same_sign_aborts() {
        let mut acc = accumulator(None);
        acc.begin_of_event();
        assert_eq!(acc.on_track_start(&muon(10, Species::MuMinus, 500.0)), EventControl::Continue);
        assert_eq!(acc.on_track_start(&muon(12, Species::MuMinus, 700.0)), EventControl::AbortEvent);
        assert!(matches!(
            acc.pending_abort(),
            Some(EventAbort::AmbiguousTopology { role: Role::MuMinus, track_id: 12, bound_id: 10 })
        ));

        // everything after an abort is inert
        let t = track(3, Species::Gamma, 1.0);
        let pre = point(1.0, 1.0, TARGET_VOLUME);
        let post = point(1.0, 4.0, TARGET_VOLUME);
        assert_eq!(
            acc.on_step(&StepInfo { track: &t, pre: &pre, post: &post, secondaries: &[] }),
            StepControl::AbortEvent
        );
        assert_eq!(acc.weight(), 1.0);

        let outcome = acc.end_of_event().unwrap();
        assert!(matches!(outcome, EventOutcome::Aborted(_)));
        assert_eq!(acc.events_started(), 1);
        assert_eq!(acc.events_completed(), 0);
    }

    #[test]
    fn test_second_parent_aborts() {
        let mut acc = accumulator(None);
        acc.begin_of_event();
        assert_eq!(convert(&mut acc, &track(2, Species::Gamma, 5000.0)), StepControl::Continue);
        assert_eq!(acc.roles().parent.as_ref().unwrap().energy(), 5000.0);
        assert_eq!(convert(&mut acc, &track(3, Species::Gamma, 4000.0)), StepControl::AbortEvent);
        assert!(matches!(acc.end_of_event().unwrap(), EventOutcome::Aborted(_)));
        assert_eq!(acc.events_completed(), 0);
    }

    #[test]
    fn test_resumed_track_is_not_a_second_binding() {
        let mut acc = accumulator(None);
        acc.begin_of_event();
        let mu = muon(10, Species::MuPlus, 900.0);
        acc.on_track_start(&mu);
        let mut resumed = mu.clone();
        resumed.kinetic_energy = 50.0;
        assert_eq!(acc.on_track_start(&resumed), EventControl::Continue);
        // first snapshot is kept
        assert!((acc.roles().mu_plus.as_ref().unwrap().energy() - 900.0).abs() < 1e-9);
    }

    #[test]
    fn test_incident_is_first_primary() {
        let mut acc = accumulator(None);
        acc.begin_of_event();
        let mut second = track(1, Species::Electron, 4000.0);
        acc.on_track_start(&track(1, Species::Electron, 8000.0));
        second.track_id = 5;
        acc.on_track_start(&second);
        assert_eq!(acc.roles().incident.as_ref().unwrap().track_id, 1);
        assert!(acc.pending_abort().is_none());
    }

    #[test]
    fn test_classification() {
        let mut acc = accumulator(Some(1000.0));
        acc.begin_of_event();
        assert_eq!(acc.classify_new_track(&track(4, Species::Gamma, 1000.0)), Classification::Urgent);
        assert_eq!(acc.classify_new_track(&track(4, Species::Gamma, 999.0)), Classification::Waiting);
        assert_eq!(acc.classify_new_track(&muon(10, Species::MuPlus, 200.0)), Classification::Urgent);
        assert_eq!(acc.classify_new_track(&muon(11, Species::MuMinus, 200.0)), Classification::Urgent);

        full_event(&mut acc, 1200.0, 10.0);
        acc.on_priority_phase_closed();
        assert!(acc.is_phase_closed());
        assert_eq!(acc.classify_new_track(&track(4, Species::Electron, 0.1)), Classification::Urgent);

        let unfiltered = accumulator(None);
        assert_eq!(unfiltered.classify_new_track(&track(4, Species::Electron, 0.0)), Classification::Urgent);
    }

    #[test]
    fn test_threshold_crossing_suspends_during_priority_phase() {
        let mut acc = accumulator(Some(1000.0));
        acc.begin_of_event();
        let t = track(3, Species::Electron, 900.0);
        let high = point(1500.0, 1.0, TARGET_VOLUME);
        let above = point(1100.0, 1.0, TARGET_VOLUME);
        let below = point(900.0, 1.0, TARGET_VOLUME);

        let stays_above = StepInfo { track: &t, pre: &high, post: &above, secondaries: &[] };
        let crosses = StepInfo { track: &t, pre: &above, post: &below, secondaries: &[] };
        assert_eq!(acc.on_step(&stays_above), StepControl::Continue);
        assert_eq!(acc.on_step(&crosses), StepControl::Suspend);

        full_event(&mut acc, 1200.0, 10.0);
        acc.on_priority_phase_closed();
        assert_eq!(acc.on_step(&crosses), StepControl::Continue);
    }

    #[test]
    fn test_no_parent_binding_after_phase_closed() {
        let mut acc = accumulator(None);
        acc.begin_of_event();
        acc.on_priority_phase_closed();
        convert(&mut acc, &track(2, Species::Gamma, 5000.0));
        assert!(acc.roles().parent.is_none());
    }

    #[test]
    fn test_extras_are_unbound_tracks_leaving_target() {
        let mut acc = accumulator(None);
        acc.begin_of_event();
        let mu = muon(10, Species::MuPlus, 900.0);
        acc.on_track_start(&mu);
        let leaving = (point(10.0, 1.0, TARGET_VOLUME), point(10.0, 1.0, WORLD_VOLUME));
        let inside = (point(10.0, 1.0, TARGET_VOLUME), point(10.0, 1.0, TARGET_VOLUME));
        let entering = (point(10.0, 1.0, WORLD_VOLUME), point(10.0, 1.0, TARGET_VOLUME));

        let photon = track(7, Species::Gamma, 10.0);
        for (pre, post) in [&leaving, &inside, &entering] {
            acc.on_step(&StepInfo { track: &photon, pre, post, secondaries: &[] });
        }
        acc.on_step(&StepInfo { track: &mu, pre: &leaving.0, post: &leaving.1, secondaries: &[] });

        assert_eq!(acc.extra().len(), 1);
        assert_eq!(acc.extra()[0].track_id, 7);
    }

    #[test]
    fn test_early_rejection_at_phase_close() {
        let mut acc = accumulator(Some(1000.0));
        full_event(&mut acc, 10.0, 10.0);
        assert_eq!(acc.on_priority_phase_closed(), EventControl::AbortEvent);
        assert_eq!(acc.pending_abort(), Some(&EventAbort::EarlyRejection));
        assert_eq!(acc.end_of_event().unwrap(), EventOutcome::Aborted(EventAbort::EarlyRejection));
        assert_eq!(acc.events_completed(), 0);
    }

    #[test]
    fn test_rejected_without_phase_close() {
        let mut acc = accumulator(Some(1000.0));
        full_event(&mut acc, 10.0, 10.0);
        assert_eq!(acc.end_of_event().unwrap(), EventOutcome::Rejected);
    }

    #[test]
    fn test_persisted_record_and_run_counters() {
        let mut acc = accumulator(Some(1000.0));
        full_event(&mut acc, 1200.0, 10.0);
        let photon = track(2, Species::Gamma, 5000.0);
        let pre = point(0.0, 1.0, WORLD_VOLUME);
        let post = point(0.0, 1.0, WORLD_VOLUME);
        acc.on_new_scoring_plane_hit("ecal", &StepInfo { track: &photon, pre: &pre, post: &post, secondaries: &[] });
        assert_eq!(acc.end_of_event().unwrap(), EventOutcome::Completed);

        full_event(&mut acc, 10.0, 10.0);
        assert_eq!(acc.end_of_event().unwrap(), EventOutcome::Rejected);

        assert_eq!(acc.events_started(), 2);
        assert_eq!(acc.events_completed(), 1);

        let run = RunRecord::new(acc.events_started(), acc.events_completed(), &RunConfig::default());
        let bytes = acc.finish(&run).unwrap();
        let contents = OutputContents::from_reader(bytes.as_slice(), "memory").unwrap();
        assert_eq!(contents.events.len(), 1);
        let event = &contents.events[0];
        assert!((event.mu_plus.as_ref().unwrap().energy - 1200.0).abs() < 1e-9);
        assert!((event.mu_minus.as_ref().unwrap().energy - 10.0).abs() < 1e-9);
        assert_eq!(event.scoring_plane_hits.len(), 1);
        assert_eq!(event.weight, 1.0);
    }
}
