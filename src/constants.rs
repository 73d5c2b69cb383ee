//! # Constants
//!
//! Particle identities, process and volume names, and run defaults.
//! Energies are in MeV, lengths in mm, times in ns unless noted.

// ============================================================================
// PDG ENCODINGS
// ============================================================================

/// Photon
pub const PDG_GAMMA: i32 = 22;

/// Electron
pub const PDG_ELECTRON: i32 = 11;

/// Positron
pub const PDG_POSITRON: i32 = -11;

/// Negative muon
pub const PDG_MU_MINUS: i32 = 13;

/// Positive muon
pub const PDG_MU_PLUS: i32 = -13;

// ============================================================================
// PARTICLE MASSES (MeV)
// ============================================================================

/// Electron rest mass
pub const M_ELECTRON_MEV: f64 = 0.510_998_95;

/// Muon rest mass
pub const M_MUON_MEV: f64 = 105.658_375_5;

// ============================================================================
// PROCESSES AND VOLUMES
// ============================================================================

/// Photon conversion into a mu+ mu- pair
pub const RARE_PROCESS: &str = "GammaToMuPair";

/// Target slab the beam impinges on
pub const TARGET_VOLUME: &str = "Hunk";

/// Medium surrounding the target
pub const WORLD_VOLUME: &str = "World";

/// Name given to the biasing operator attached to the target
pub const BIAS_OPERATOR_NAME: &str = "bias-muon-conv";

/// Name given to the cross-section change operation
pub const BIAS_OPERATION_NAME: &str = "xsec-bias-muon-conv";

// ============================================================================
// RUN DEFAULTS
// ============================================================================

/// Default target material (tungsten)
pub const DEFAULT_TARGET: &str = "G4_W";

/// Default target depth (mm), 0.1 radiation lengths of tungsten
pub const DEFAULT_DEPTH_MM: f64 = 0.350_259;

/// Default beam energy (GeV)
pub const DEFAULT_BEAM_GEV: f64 = 8.0;

/// Default RNG seed
pub const DEFAULT_SEED: u64 = 1;

/// Target materials the engine's material table is known to provide
pub const KNOWN_MATERIALS: &[&str] = &[
    "G4_H", "G4_He", "G4_Li", "G4_Be", "G4_C", "G4_N", "G4_O", "G4_Al",
    "G4_Si", "G4_Ti", "G4_Fe", "G4_Ni", "G4_Cu", "G4_Zn", "G4_Ag", "G4_Sn",
    "G4_Ta", "G4_W", "G4_Pt", "G4_Au", "G4_Pb", "G4_U", "G4_AIR", "G4_WATER",
    "G4_Galactic", "G4_PbWO4", "G4_CESIUM_IODIDE", "G4_BGO",
    "G4_PLASTIC_SC_VINYLTOLUENE", "G4_STAINLESS-STEEL", "G4_CONCRETE",
];

/// Whether a material name is present in [`KNOWN_MATERIALS`]
pub fn is_known_material(name: &str) -> bool {
    KNOWN_MATERIALS.contains(&name)
}
