//! # Occurrence Biasing
//!
//! Importance sampling for the rare conversion process.
//!
//! ## Theory
//!
//! Along a step of length l, a process with rate σ (1/mm) fires with density
//! σ·exp(-σl). Sampling with a scaled rate σ' = f·σ instead and carrying the
//! likelihood ratio as a weight keeps every expectation value unbiased:
//!
//! ```text
//! no interaction over l:     w = exp(-σl) / exp(-σ'l)       = exp((σ' - σ) l)
//! interaction at end of l:   w = σ exp(-σl) / σ' exp(-σ'l)  = (σ/σ') exp((σ' - σ) l)
//! ```
//!
//! The operator only decides *whether* and *how much* to bias; the engine
//! samples and applies the weight to the track.

use crate::constants::{BIAS_OPERATION_NAME, BIAS_OPERATOR_NAME, RARE_PROCESS, TARGET_VOLUME};
use crate::engine::TrackInfo;
use crate::types::Species;

/// What the operator sees of a physics process competing on a step
pub trait BiasingProcess {
    fn process_name(&self) -> &str;
    /// Unbiased mean free path at the current track state (mm)
    fn current_interaction_length(&self) -> f64;
}

/// Operation instructing the engine to sample with a substituted cross section
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeCrossSection {
    name: String,
    biased_cross_section: f64,
}

impl ChangeCrossSection {
    pub fn new(name: &str) -> Self {
        Self { name: name.into(), biased_cross_section: 0.0 }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_biased_cross_section(&mut self, xs: f64) {
        self.biased_cross_section = xs;
    }

    /// Rate the engine must sample the next interaction with (1/mm)
    pub fn biased_cross_section(&self) -> f64 {
        self.biased_cross_section
    }

    /// Likelihood ratio for a step of `length` under this operation
    pub fn weight_for_step(&self, unbiased_cross_section: f64, length: f64, interacted: bool) -> f64 {
        let biased = self.biased_cross_section;
        let survival = ((biased - unbiased_cross_section) * length).exp();
        if interacted {
            if biased <= 0.0 {
                // an interaction under a zero biased rate has no likelihood
                return 0.0;
            }
            unbiased_cross_section / biased * survival
        } else {
            survival
        }
    }
}

/// Scales the rate of the rare process for energetic carriers in one volume
#[derive(Debug, Clone)]
pub struct CrossSectionBiasOperator {
    name: String,
    factor: f64,
    /// Kinetic energy (MeV) a carrier needs to be biased
    threshold: f64,
    carrier: Species,
    process: String,
    volume: String,
    operation: Option<ChangeCrossSection>,
}

impl CrossSectionBiasOperator {
    /// Operator for photon conversion to muons inside the target
    pub fn new(factor: f64, threshold: f64) -> Self {
        Self::for_process(factor, threshold, Species::Gamma, RARE_PROCESS, TARGET_VOLUME)
    }

    pub fn for_process(factor: f64, threshold: f64, carrier: Species, process: &str, volume: &str) -> Self {
        Self {
            name: BIAS_OPERATOR_NAME.into(),
            factor,
            threshold,
            carrier,
            process: process.into(),
            volume: volume.into(),
            operation: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn factor(&self) -> f64 {
        self.factor
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Volume the operator is attached to
    pub fn volume(&self) -> &str {
        &self.volume
    }

    /// Whether the operator is consulted for tracks in `volume`
    pub fn is_attached_to(&self, volume: &str) -> bool {
        self.volume == volume
    }

    /// Build the operation on first run start; later calls keep it
    pub fn start_run(&mut self) {
        if self.operation.is_some() {
            return;
        }
        self.operation = Some(ChangeCrossSection::new(BIAS_OPERATION_NAME));
    }

    /// Operation for `process` acting on `track`, or `None` to leave it alone
    pub fn propose_occurrence_biasing(
        &mut self,
        track: &TrackInfo,
        process: &dyn BiasingProcess,
    ) -> Option<&ChangeCrossSection> {
        if track.species != self.carrier {
            return None;
        }
        if track.kinetic_energy < self.threshold {
            return None;
        }
        if !track.is_in(&self.volume) {
            return None;
        }
        if process.process_name() != self.process {
            return None;
        }

        let interaction_length = process.current_interaction_length();
        let unbiased_xs = 1.0 / interaction_length;
        let operation = self.operation.as_mut()?;
        operation.set_biased_cross_section(unbiased_xs * self.factor);
        Some(&*operation)
    }

    /// Final-state selection is never biased
    pub fn propose_final_state_biasing(
        &self,
        _track: &TrackInfo,
        _process: &dyn BiasingProcess,
    ) -> Option<&ChangeCrossSection> {
        None
    }

    /// Non-physics decisions are never biased
    pub fn propose_non_physics_biasing(
        &self,
        _track: &TrackInfo,
        _process: &dyn BiasingProcess,
    ) -> Option<&ChangeCrossSection> {
        None
    }
}
