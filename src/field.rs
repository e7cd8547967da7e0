//! The fixed set of derived fields produced by aggregation.

use crate::stats::MaskedMatrix;
use serde::{Deserialize, Serialize};

/// Symbolic key for a derived field.
///
/// String forms are case-sensitive: capitals are ensemble means and speeds,
/// lowercase are fluctuation statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKey {
    /// "U": mean x velocity.
    MeanU,
    /// "V": mean y velocity.
    MeanV,
    /// "W": mean z velocity.
    MeanW,
    /// "P": in-plane speed, sqrt(U^2 + V^2).
    InPlaneSpeed,
    /// "M": full speed, sqrt(U^2 + V^2 + W^2).
    Speed,
    /// "u": mean absolute fluctuation in U.
    FlucU,
    /// "v": mean absolute fluctuation in V.
    FlucV,
    /// "w": mean absolute fluctuation in W.
    FlucW,
    /// "uu": turbulent energy in u.
    EnergyUU,
    /// "vv": turbulent energy in v.
    EnergyVV,
    /// "ww": turbulent energy in w.
    EnergyWW,
    /// "cte": total cartesian turbulent energy, (uu + vv + ww) / 2.
    TotalEnergy,
    /// "uv": Reynolds stress in u/v.
    StressUV,
    /// "uw": Reynolds stress in u/w.
    StressUW,
    /// "vw": Reynolds stress in v/w.
    StressVW,
    /// "uvw": triple correlation.
    TripleCorr,
    /// "num": valid samples contributing to each cell.
    Count,
}

impl FieldKey {
    pub const ALL: [FieldKey; 17] = [
        Self::MeanU,
        Self::MeanV,
        Self::MeanW,
        Self::InPlaneSpeed,
        Self::Speed,
        Self::FlucU,
        Self::FlucV,
        Self::FlucW,
        Self::EnergyUU,
        Self::EnergyVV,
        Self::EnergyWW,
        Self::TotalEnergy,
        Self::StressUV,
        Self::StressUW,
        Self::StressVW,
        Self::TripleCorr,
        Self::Count,
    ];

    fn from_canonical(key: &str) -> Option<Self> {
        let key = match key {
            "U" => Self::MeanU,
            "V" => Self::MeanV,
            "W" => Self::MeanW,
            "P" => Self::InPlaneSpeed,
            "M" => Self::Speed,
            "u" => Self::FlucU,
            "v" => Self::FlucV,
            "w" => Self::FlucW,
            "uu" => Self::EnergyUU,
            "vv" => Self::EnergyVV,
            "ww" => Self::EnergyWW,
            "cte" => Self::TotalEnergy,
            "uv" => Self::StressUV,
            "uw" => Self::StressUW,
            "vw" => Self::StressVW,
            "uvw" => Self::TripleCorr,
            "num" => Self::Count,
            _ => return None,
        };
        Some(key)
    }

    /// Parse a field key, also accepting the character reversal of any
    /// canonical spelling: correlation order is commutative, so "vu" resolves
    /// to the "uv" field and "wvu" to "uvw".
    pub fn parse(key: &str) -> Option<Self> {
        Self::from_canonical(key).or_else(|| {
            let reversed: String = key.chars().rev().collect();
            Self::from_canonical(&reversed)
        })
    }

    /// Canonical string form of the key.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MeanU => "U",
            Self::MeanV => "V",
            Self::MeanW => "W",
            Self::InPlaneSpeed => "P",
            Self::Speed => "M",
            Self::FlucU => "u",
            Self::FlucV => "v",
            Self::FlucW => "w",
            Self::EnergyUU => "uu",
            Self::EnergyVV => "vv",
            Self::EnergyWW => "ww",
            Self::TotalEnergy => "cte",
            Self::StressUV => "uv",
            Self::StressUW => "uw",
            Self::StressVW => "vw",
            Self::TripleCorr => "uvw",
            Self::Count => "num",
        }
    }
}

/// The derived field set: one matrix per [`FieldKey`], all sharing the grid
/// shape and the minimum-point mask. Populated in a single aggregation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSet {
    pub mean_u: MaskedMatrix,
    pub mean_v: MaskedMatrix,
    pub mean_w: MaskedMatrix,
    pub in_plane_speed: MaskedMatrix,
    pub speed: MaskedMatrix,
    pub fluc_u: MaskedMatrix,
    pub fluc_v: MaskedMatrix,
    pub fluc_w: MaskedMatrix,
    pub energy_uu: MaskedMatrix,
    pub energy_vv: MaskedMatrix,
    pub energy_ww: MaskedMatrix,
    pub total_energy: MaskedMatrix,
    pub stress_uv: MaskedMatrix,
    pub stress_uw: MaskedMatrix,
    pub stress_vw: MaskedMatrix,
    pub triple_corr: MaskedMatrix,
    pub count: MaskedMatrix,
}

impl FieldSet {
    pub fn get(&self, key: FieldKey) -> &MaskedMatrix {
        match key {
            FieldKey::MeanU => &self.mean_u,
            FieldKey::MeanV => &self.mean_v,
            FieldKey::MeanW => &self.mean_w,
            FieldKey::InPlaneSpeed => &self.in_plane_speed,
            FieldKey::Speed => &self.speed,
            FieldKey::FlucU => &self.fluc_u,
            FieldKey::FlucV => &self.fluc_v,
            FieldKey::FlucW => &self.fluc_w,
            FieldKey::EnergyUU => &self.energy_uu,
            FieldKey::EnergyVV => &self.energy_vv,
            FieldKey::EnergyWW => &self.energy_ww,
            FieldKey::TotalEnergy => &self.total_energy,
            FieldKey::StressUV => &self.stress_uv,
            FieldKey::StressUW => &self.stress_uw,
            FieldKey::StressVW => &self.stress_vw,
            FieldKey::TripleCorr => &self.triple_corr,
            FieldKey::Count => &self.count,
        }
    }

    pub fn get_mut(&mut self, key: FieldKey) -> &mut MaskedMatrix {
        match key {
            FieldKey::MeanU => &mut self.mean_u,
            FieldKey::MeanV => &mut self.mean_v,
            FieldKey::MeanW => &mut self.mean_w,
            FieldKey::InPlaneSpeed => &mut self.in_plane_speed,
            FieldKey::Speed => &mut self.speed,
            FieldKey::FlucU => &mut self.fluc_u,
            FieldKey::FlucV => &mut self.fluc_v,
            FieldKey::FlucW => &mut self.fluc_w,
            FieldKey::EnergyUU => &mut self.energy_uu,
            FieldKey::EnergyVV => &mut self.energy_vv,
            FieldKey::EnergyWW => &mut self.energy_ww,
            FieldKey::TotalEnergy => &mut self.total_energy,
            FieldKey::StressUV => &mut self.stress_uv,
            FieldKey::StressUW => &mut self.stress_uw,
            FieldKey::StressVW => &mut self.stress_vw,
            FieldKey::TripleCorr => &mut self.triple_corr,
            FieldKey::Count => &mut self.count,
        }
    }
}
