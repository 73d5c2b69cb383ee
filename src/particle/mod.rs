//! # Particle Snapshots
//!
//! Value copies of engine state that outlive the engine's own descriptors:
//! [`ParticleRecord`] for tracks and [`ScoringPlaneHit`] for plane crossings.

use serde::{Deserialize, Serialize};

use crate::engine::{StepInfo, TrackInfo};
use crate::types::Vec3;

/// Where and when a particle was snapshotted
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    /// Position (mm)
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Global time (ns)
    pub t: f64,
}

/// Snapshot of a transported particle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticleRecord {
    pub track_id: i32,
    pub parent_id: i32,
    pub pdg_id: i32,
    /// Total energy (MeV)
    pub energy: f64,
    /// Momentum (MeV)
    pub px: f64,
    pub py: f64,
    pub pz: f64,
    #[serde(default)]
    pub vertex: Option<Vertex>,
}

impl ParticleRecord {
    /// Copy the identity, four-momentum and position of a track
    ///
    /// |p| = sqrt(T (T + 2m)), E = T + m.
    pub fn from_track(track: &TrackInfo) -> Self {
        let t = track.kinetic_energy;
        let p_mag = (t * (t + 2.0 * track.mass)).max(0.0).sqrt();
        let p = track.direction.normalize() * p_mag;
        Self {
            track_id: track.track_id,
            parent_id: track.parent_id,
            pdg_id: track.species.pdg(),
            energy: t + track.mass,
            px: p.x,
            py: p.y,
            pz: p.z,
            vertex: Some(Vertex {
                x: track.position.x,
                y: track.position.y,
                z: track.position.z,
                t: track.time,
            }),
        }
    }

    /// Total energy (MeV)
    pub fn energy(&self) -> f64 {
        self.energy
    }

    pub fn momentum(&self) -> Vec3 {
        Vec3::new(self.px, self.py, self.pz)
    }

    /// Invariant mass, m² = E² - |p|²
    pub fn mass(&self) -> f64 {
        (self.energy * self.energy - self.momentum().mag_squared()).max(0.0).sqrt()
    }
}

/// A crossing of a scoring plane
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringPlaneHit {
    pub track_id: i32,
    /// Global time after the crossing step (ns)
    pub t: f64,
    /// Midpoint of the crossing step (mm)
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl ScoringPlaneHit {
    pub fn from_step(step: &StepInfo<'_>) -> Self {
        let mid = step.pre.position.midpoint(&step.post.position);
        Self {
            track_id: step.track.track_id,
            t: step.post.time,
            x: mid.x,
            y: mid.y,
            z: mid.z,
        }
    }
}
