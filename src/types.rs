//! # Core Types
//!
//! Fundamental value types shared by the engine interface and the records.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::*;

// ============================================================================
// VECTOR TYPES (3D)
// ============================================================================

/// 3D vector for positions and momentum directions
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    /// Create new vector
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Zero vector
    pub const fn zero() -> Self {
        Self { x: 0.0, y: 0.0, z: 0.0 }
    }

    /// Beam axis
    pub const fn unit_z() -> Self { Self::new(0.0, 0.0, 1.0) }

    /// Magnitude squared
    pub fn mag_squared(&self) -> f64 {
        self.x * self.x + self.y * self.y + self.z * self.z
    }

    /// Magnitude
    pub fn mag(&self) -> f64 {
        self.mag_squared().sqrt()
    }

    /// Normalize to unit vector
    pub fn normalize(&self) -> Self {
        let m = self.mag();
        if m > 1e-15 {
            Self::new(self.x / m, self.y / m, self.z / m)
        } else {
            Self::zero()
        }
    }

    /// Point halfway between `self` and `other`
    pub fn midpoint(&self, other: &Self) -> Self {
        (*self + *other) * 0.5
    }
}

impl std::ops::Add for Vec3 {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Self::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }
}

impl std::ops::Sub for Vec3 {
    type Output = Self;
    fn sub(self, other: Self) -> Self {
        Self::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }
}

impl std::ops::Mul<f64> for Vec3 {
    type Output = Self;
    fn mul(self, s: f64) -> Self {
        Self::new(self.x * s, self.y * s, self.z * s)
    }
}

impl fmt::Display for Vec3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6e}, {:.6e}, {:.6e})", self.x, self.y, self.z)
    }
}

// ============================================================================
// PARTICLE SPECIES
// ============================================================================

/// Particle species seen by the event logic, keyed by PDG encoding
///
/// Anything the selection never singles out is carried as `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub enum Species {
    Gamma,
    Electron,
    Positron,
    MuPlus,
    MuMinus,
    Other(i32),
}

impl Species {
    /// Species for a PDG encoding
    pub fn from_pdg(pdg: i32) -> Self {
        match pdg {
            PDG_GAMMA => Species::Gamma,
            PDG_ELECTRON => Species::Electron,
            PDG_POSITRON => Species::Positron,
            PDG_MU_PLUS => Species::MuPlus,
            PDG_MU_MINUS => Species::MuMinus,
            other => Species::Other(other),
        }
    }

    /// PDG encoding
    pub fn pdg(&self) -> i32 {
        match self {
            Species::Gamma => PDG_GAMMA,
            Species::Electron => PDG_ELECTRON,
            Species::Positron => PDG_POSITRON,
            Species::MuPlus => PDG_MU_PLUS,
            Species::MuMinus => PDG_MU_MINUS,
            Species::Other(pdg) => *pdg,
        }
    }

    /// Rest mass (MeV) for the species this crate knows; `None` otherwise
    pub fn mass(&self) -> Option<f64> {
        match self {
            Species::Gamma => Some(0.0),
            Species::Electron | Species::Positron => Some(M_ELECTRON_MEV),
            Species::MuPlus | Species::MuMinus => Some(M_MUON_MEV),
            Species::Other(_) => None,
        }
    }

    /// Either muon charge state
    pub fn is_muon(&self) -> bool {
        matches!(self, Species::MuPlus | Species::MuMinus)
    }
}

impl From<i32> for Species {
    fn from(pdg: i32) -> Self {
        Species::from_pdg(pdg)
    }
}

impl From<Species> for i32 {
    fn from(species: Species) -> Self {
        species.pdg()
    }
}

impl fmt::Display for Species {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Species::Gamma => write!(f, "gamma"),
            Species::Electron => write!(f, "e-"),
            Species::Positron => write!(f, "e+"),
            Species::MuPlus => write!(f, "mu+"),
            Species::MuMinus => write!(f, "mu-"),
            Species::Other(pdg) => write!(f, "pdg({})", pdg),
        }
    }
}
