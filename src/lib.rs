//! # DIMUON-SIM
//!
//! Biased dimuon-production event control
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                            DIMUON-SIM                                │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │  ENGINE       track/step descriptors, callback protocol, replay      │
//! │  BIASING      conversion cross-section scaling inside the target     │
//! │  ACCUMULATOR  role binding, weights, priority phase, acceptance      │
//! │  OUTPUT       JSON Lines event records + one run record              │
//! │  RUN          configuration, driver loop, run summary                │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! An electron or photon beam hits a thin target. Photons converting to a
//! muon pair are rare, so the conversion rate is scaled up inside the target
//! and every event carries the compensating weight. Events without an
//! energetic muon are rejected as soon as the high-priority tracks drain.

pub mod constants;
pub mod types;
pub mod error;
pub mod engine;
pub mod particle;
pub mod biasing;
pub mod accumulator;
pub mod output;
pub mod config;
pub mod run;

// Re-exports
pub use constants::*;
pub use types::*;
pub use error::{EventAbort, Result, Role, SimError};
pub use engine::{EventHooks, ReplayEngine, ScriptLibrary, TransportEngine};
pub use biasing::CrossSectionBiasOperator;
pub use accumulator::{EventAccumulator, EventOutcome, EventSelection};
pub use output::{EventRecord, OutputContents, OutputSink};
pub use config::RunConfig;
pub use run::{RunRecord, RunSummary, Simulation};

/// DIMUON-SIM version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library banner
pub fn info() -> String {
    format!(
        "DIMUON-SIM v{}\n\
         Biased dimuon-production event control\n\
         Conversion: {} in {}",
        VERSION, RARE_PROCESS, TARGET_VOLUME
    )
}
