//! # Output Sink
//!
//! Append-only JSON Lines writer. Every line is one complete record tagged
//! by `"record"`:
//!
//! ```text
//! {"record":"event","incident":{..},"parent":{..},"mu_plus":{..},"mu_minus":{..},"extra":[..],"scoring_plane_hits":[..],"weight":1.0}
//! ...
//! {"record":"run","events_requested":100,...}
//! ```
//!
//! The run record is always last and appears exactly once.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SimError};
use crate::particle::{ParticleRecord, ScoringPlaneHit};
use crate::run::RunRecord;

/// One accepted event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub incident: Option<ParticleRecord>,
    pub parent: Option<ParticleRecord>,
    pub mu_plus: Option<ParticleRecord>,
    pub mu_minus: Option<ParticleRecord>,
    pub extra: Vec<ParticleRecord>,
    pub scoring_plane_hits: Vec<ScoringPlaneHit>,
    pub weight: f64,
}

#[derive(Serialize)]
#[serde(tag = "record", rename_all = "snake_case")]
enum RecordRef<'a> {
    Event(&'a EventRecord),
    Run(&'a RunRecord),
}

#[derive(Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
enum Record {
    Event(EventRecord),
    Run(RunRecord),
}

/// Writer for event records followed by a single run record
pub struct OutputSink<W: Write> {
    writer: W,
    path: PathBuf,
    events_written: u64,
}

impl OutputSink<BufWriter<File>> {
    /// Create (or truncate) the output file
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| SimError::storage(path, e))?;
        debug!(path = %path.display(), "opened output");
        Ok(Self::new(BufWriter::new(file), path))
    }
}

impl<W: Write> OutputSink<W> {
    /// Wrap any writer; `label` names it in error messages
    pub fn new(writer: W, label: impl Into<PathBuf>) -> Self {
        Self { writer, path: label.into(), events_written: 0 }
    }

    pub fn events_written(&self) -> u64 {
        self.events_written
    }

    pub fn write_event(&mut self, record: &EventRecord) -> Result<()> {
        self.write_line(&RecordRef::Event(record))?;
        self.events_written += 1;
        Ok(())
    }

    /// Write the run record, flush, and hand back the writer
    pub fn finish(mut self, run: &RunRecord) -> Result<W> {
        self.write_line(&RecordRef::Run(run))?;
        self.writer.flush().map_err(|e| SimError::storage(&self.path, e))?;
        debug!(path = %self.path.display(), events = self.events_written, "closed output");
        Ok(self.writer)
    }

    fn write_line(&mut self, record: &RecordRef<'_>) -> Result<()> {
        // serialize fully before touching the writer
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        self.writer.write_all(&line).map_err(|e| SimError::storage(&self.path, e))
    }
}

/// Everything a finished output holds
#[derive(Debug, Clone, PartialEq)]
pub struct OutputContents {
    pub events: Vec<EventRecord>,
    pub run: RunRecord,
}

impl OutputContents {
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| SimError::storage(path, e))?;
        Self::from_reader(BufReader::new(file), path)
    }

    pub fn from_reader<R: BufRead>(reader: R, label: impl AsRef<Path>) -> Result<Self> {
        let label = label.as_ref();
        let mut events = Vec::new();
        let mut run = None;

        for (index, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| SimError::storage(label, e))?;
            if line.trim().is_empty() {
                continue;
            }
            if run.is_some() {
                return Err(SimError::malformed(label, format!("line {}: record after run record", index + 1)));
            }
            match serde_json::from_str::<Record>(&line)? {
                Record::Event(event) => events.push(event),
                Record::Run(record) => run = Some(record),
            }
        }

        let run = run.ok_or_else(|| SimError::malformed(label, "missing run record"))?;
        Ok(Self { events, run })
    }

    /// Sum of event weights
    pub fn total_weight(&self) -> f64 {
        self.events.iter().map(|e| e.weight).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunConfig;

    fn particle(track_id: i32, pdg_id: i32, energy: f64) -> ParticleRecord {
        ParticleRecord {
            track_id,
            parent_id: 1,
            pdg_id,
            energy,
            px: 0.0,
            py: 0.0,
            pz: energy,
            vertex: None,
        }
    }

    fn event(weight: f64) -> EventRecord {
        EventRecord {
            incident: Some(particle(1, 11, 8000.0)),
            parent: Some(particle(2, 22, 5000.0)),
            mu_plus: Some(particle(3, -13, 3000.0)),
            mu_minus: None,
            extra: vec![particle(9, 22, 1.0)],
            scoring_plane_hits: vec![ScoringPlaneHit { track_id: 3, t: 1.0, x: 0.0, y: 0.0, z: 5.0 }],
            weight,
        }
    }

    #[test]
    fn test_write_and_read_back() {
        let run = RunRecord::new(2, 2, &RunConfig::default());
        let mut sink = OutputSink::new(Vec::new(), "memory");
        sink.write_event(&event(1.0)).unwrap();
        sink.write_event(&event(0.25)).unwrap();
        assert_eq!(sink.events_written(), 2);
        let bytes = sink.finish(&run).unwrap();

        let text = String::from_utf8(bytes.clone()).unwrap();
        assert_eq!(text.lines().count(), 3);
        assert!(text.lines().next().unwrap().starts_with("{\"record\":\"event\""));
        assert!(text.contains("\"mu_minus\":null"));

        let contents = OutputContents::from_reader(bytes.as_slice(), "memory").unwrap();
        assert_eq!(contents.events, vec![event(1.0), event(0.25)]);
        assert_eq!(contents.run, run);
        assert!((contents.total_weight() - 1.25).abs() < 1e-12);
    }

    #[test]
    fn test_missing_run_record_is_malformed() {
        let mut sink = OutputSink::new(Vec::new(), "memory");
        sink.write_event(&event(1.0)).unwrap();
        let bytes = sink.writer;

        let err = OutputContents::from_reader(bytes.as_slice(), "memory").unwrap_err();
        assert!(matches!(err, SimError::MalformedOutput { .. }));
    }

    #[test]
    fn test_record_after_run_is_malformed() {
        let run = RunRecord::new(1, 0, &RunConfig::default());
        let mut bytes = OutputSink::new(Vec::new(), "memory").finish(&run).unwrap();
        let copy = bytes.clone();
        bytes.extend_from_slice(&copy);

        let err = OutputContents::from_reader(bytes.as_slice(), "memory").unwrap_err();
        assert!(err.is_storage());
    }

    #[test]
    fn test_unopenable_destination() {
        let err = OutputSink::create("/nonexistent-dir/for/sure/out.jsonl").err().unwrap();
        assert!(err.is_storage());
    }
}
