//! # Run Driver
//!
//! Owns the accumulator and the engine for the lifetime of a run, transports
//! the requested events one after the other, and writes the [`RunRecord`] at
//! teardown.

use std::io::Write;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::accumulator::{EventAccumulator, EventOutcome};
use crate::config::RunConfig;
use crate::engine::{TransportEngine, TransportOutcome};
use crate::error::Result;
use crate::output::OutputSink;

// ============================================================================
// RUN RECORD
// ============================================================================

/// Version of the code that produced a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl SchemaVersion {
    /// Version of this build
    pub fn current() -> Self {
        Self {
            major: env!("CARGO_PKG_VERSION_MAJOR").parse().unwrap_or(0),
            minor: env!("CARGO_PKG_VERSION_MINOR").parse().unwrap_or(0),
            patch: env!("CARGO_PKG_VERSION_PATCH").parse().unwrap_or(0),
        }
    }
}

impl std::fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// How a run was produced; written once, after the last event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Events begun, before any filtering
    pub events_requested: u64,
    pub events_completed: u64,
    pub filter: bool,
    /// Threshold (MeV) when filtering, zero otherwise
    pub filter_threshold: f64,
    /// Conversion bias factor, 1 when unbiased
    pub bias_factor: f64,
    pub target: String,
    /// Target depth (mm)
    pub depth: f64,
    /// Beam energy (GeV)
    pub beam_energy: f64,
    /// Photon beam when true, electron beam otherwise
    pub photons: bool,
    pub seed: u64,
    pub version: SchemaVersion,
}

impl RunRecord {
    pub fn new(events_requested: u64, events_completed: u64, config: &RunConfig) -> Self {
        Self {
            events_requested,
            events_completed,
            filter: config.filter_threshold.is_some(),
            filter_threshold: config.filter_threshold.unwrap_or(0.0),
            bias_factor: config.bias_factor.unwrap_or(1.0),
            target: config.target.clone(),
            depth: config.depth,
            beam_energy: config.beam_energy,
            photons: config.photons,
            seed: config.seed,
            version: SchemaVersion::current(),
        }
    }
}

// ============================================================================
// SIMULATION
// ============================================================================

/// Event tallies of a finished run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub events_started: u64,
    pub events_completed: u64,
    pub events_rejected: u64,
    /// Topology and early-rejection aborts
    pub events_aborted: u64,
}

impl RunSummary {
    pub fn record(&mut self, outcome: &EventOutcome) {
        match outcome {
            EventOutcome::Completed => self.events_completed += 1,
            EventOutcome::Rejected => self.events_rejected += 1,
            EventOutcome::Aborted(_) => self.events_aborted += 1,
        }
    }

    /// Fraction of started events that were kept
    pub fn efficiency(&self) -> f64 {
        if self.events_started == 0 {
            return 0.0;
        }
        self.events_completed as f64 / self.events_started as f64
    }
}

/// A configured run over an engine
pub struct Simulation<E: TransportEngine, W: Write> {
    config: RunConfig,
    engine: E,
    accumulator: EventAccumulator<W>,
}

impl<E: TransportEngine, W: Write> Simulation<E, W> {
    /// Validate the configuration and wire the accumulator to `sink`
    pub fn new(config: RunConfig, engine: E, sink: OutputSink<W>) -> Result<Self> {
        config.validate()?;
        let accumulator = EventAccumulator::new(config.selection(), sink);
        Ok(Self { config, engine, accumulator })
    }

    /// Transport every requested event, then write the run record
    ///
    /// Returns the summary together with the sink's writer.
    pub fn run(mut self) -> Result<(RunSummary, W)> {
        self.engine.start_run();
        let mut summary = RunSummary::default();

        for event_id in 0..self.config.events {
            self.accumulator.begin_of_event();
            let transport = self.engine.transport_event(event_id, &mut self.accumulator)?;
            let outcome = self.accumulator.end_of_event()?;
            if transport == TransportOutcome::Aborted {
                debug!(event_id, ?outcome, "event aborted by engine");
            }
            summary.record(&outcome);
        }

        summary.events_started = self.accumulator.events_started();
        debug_assert_eq!(summary.events_completed, self.accumulator.events_completed());

        let record = RunRecord::new(
            self.accumulator.events_started(),
            self.accumulator.events_completed(),
            &self.config,
        );
        let writer = self.accumulator.finish(&record)?;

        info!(
            "Generated {} events out of {} requested.",
            summary.events_completed, summary.events_started
        );
        debug!(
            rejected = summary.events_rejected,
            aborted = summary.events_aborted,
            efficiency = summary.efficiency(),
            "run finished"
        );
        Ok((summary, writer))
    }
}
