use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::accumulator::EventSelection;
use crate::biasing::CrossSectionBiasOperator;
use crate::constants::*;
use crate::error::{Result, SimError};

/// Construction parameters of a run; immutable once the run starts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Number of events to request
    #[serde(default)]
    pub events: u64,
    #[serde(default)]
    pub output: PathBuf,
    /// Scripted histories the replay engine draws events from
    #[serde(default)]
    pub script: PathBuf,
    /// Muon energy (MeV) at least one muon must exceed; `None` keeps every event
    #[serde(default)]
    pub filter_threshold: Option<f64>,
    /// Factor applied to the conversion rate in the target; `None` is unbiased
    #[serde(default)]
    pub bias_factor: Option<f64>,
    #[serde(default = "RunConfig::default_target")]
    pub target: String,
    /// Target depth along the beam (mm)
    #[serde(default = "RunConfig::default_depth")]
    pub depth: f64,
    /// Beam energy (GeV)
    #[serde(default = "RunConfig::default_beam_energy")]
    pub beam_energy: f64,
    /// Photon beam when true, electron beam otherwise
    #[serde(default)]
    pub photons: bool,
    #[serde(default = "RunConfig::default_seed")]
    pub seed: u64,
}

impl RunConfig {
    fn default_target() -> String {
        DEFAULT_TARGET.into()
    }
    fn default_depth() -> f64 {
        DEFAULT_DEPTH_MM
    }
    fn default_beam_energy() -> f64 {
        DEFAULT_BEAM_GEV
    }
    fn default_seed() -> u64 {
        DEFAULT_SEED
    }

    /// Load from a TOML file; missing keys take their defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| SimError::config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| SimError::config(format!("invalid config: {}", e)))
    }

    /// Reject parameters no run could be built from
    pub fn validate(&self) -> Result<()> {
        if self.events == 0 {
            return Err(SimError::config("number of events must be positive"));
        }
        if !is_known_material(&self.target) {
            return Err(SimError::config(format!("material '{}' unknown to the material table", self.target)));
        }
        if !(self.depth.is_finite() && self.depth > 0.0) {
            return Err(SimError::config(format!("target depth must be positive, got {} mm", self.depth)));
        }
        if !(self.beam_energy.is_finite() && self.beam_energy > 0.0) {
            return Err(SimError::config(format!("beam energy must be positive, got {} GeV", self.beam_energy)));
        }
        if let Some(threshold) = self.filter_threshold {
            if !(threshold.is_finite() && threshold >= 0.0) {
                return Err(SimError::config(format!("filter threshold must be non-negative, got {} MeV", threshold)));
            }
        }
        if let Some(factor) = self.bias_factor {
            if !(factor.is_finite() && factor > 0.0) {
                return Err(SimError::config(format!("bias factor must be positive, got {}", factor)));
            }
            if self.filter_threshold.is_none() {
                warn!(factor, "biasing without a filter keeps every event, weights will vary");
            }
        }
        Ok(())
    }

    /// Selection used by the event accumulator
    pub fn selection(&self) -> EventSelection {
        EventSelection {
            filter_threshold: self.filter_threshold,
            ..EventSelection::default()
        }
    }

    /// Biasing operator for the target, when biasing was requested
    pub fn bias_operator(&self) -> Option<CrossSectionBiasOperator> {
        self.bias_factor
            .map(|factor| CrossSectionBiasOperator::new(factor, self.filter_threshold.unwrap_or(0.0)))
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            events: 0,
            output: PathBuf::new(),
            script: PathBuf::new(),
            filter_threshold: None,
            bias_factor: None,
            target: Self::default_target(),
            depth: Self::default_depth(),
            beam_energy: Self::default_beam_energy(),
            photons: false,
            seed: Self::default_seed(),
        }
    }
}
