//! Robust combination of per-telescope energy estimates.
#![allow(clippy::cast_precision_loss)]

use serde::{Deserialize, Serialize};

use crate::ENERGY_SENTINEL;

/// How many telescopes contributed to the event energy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnergyQuality {
    ValidMulti,
    ValidSingle,
    #[default]
    Invalid,
}

impl EnergyQuality {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ValidMulti => "valid_multi",
            Self::ValidSingle => "valid_single",
            Self::Invalid => "invalid",
        }
    }
}

/// Quality cuts and trimming for the energy combination.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnergyConfig {
    pub min_size: f64,
    pub max_loss: f64,
    pub min_fui: f64,
    /// Accepted deviation from the median in units of the MAD.
    pub mad_multiplier: f64,
    /// Telescopes needed before MAD trimming is applied.
    pub min_trim_images: usize,
}

impl Default for EnergyConfig {
    fn default() -> Self {
        Self {
            min_size: 0.0,
            max_loss: 1.0,
            min_fui: 0.0,
            mad_multiplier: 3.0,
            min_trim_images: 5,
        }
    }
}

impl EnergyConfig {
    #[must_use]
    pub fn with_cuts(mut self, min_size: f64, max_loss: f64, min_fui: f64) -> Self {
        self.min_size = min_size;
        self.max_loss = max_loss;
        self.min_fui = min_fui;
        self
    }
}

/// One telescope's energy estimate with the image quantities it is cut on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnergyInput {
    pub energy: f64,
    pub size: f64,
    pub loss: f64,
    pub fui: f64,
}

/// Event energy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnergyEstimate {
    pub energy: f64,
    /// RMS of the kept estimates about `energy`.
    pub spread: f64,
    pub n_images: usize,
    pub quality: EnergyQuality,
}

impl EnergyEstimate {
    #[must_use]
    pub fn invalid() -> Self {
        Self {
            energy: ENERGY_SENTINEL,
            spread: ENERGY_SENTINEL,
            n_images: 0,
            quality: EnergyQuality::Invalid,
        }
    }
}

/// Median of unsorted data; `None` when empty.
fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 0 {
        0.5 * (sorted[mid - 1] + sorted[mid])
    } else {
        sorted[mid]
    })
}

/// Median energy of the telescopes passing the cuts, after MAD trimming
/// for larger multiplicities.
#[must_use]
pub fn combine_energy(inputs: &[EnergyInput], config: &EnergyConfig) -> EnergyEstimate {
    let energies: Vec<f64> = inputs
        .iter()
        .filter(|e| e.energy.is_finite() && e.energy > 0.0)
        .filter(|e| {
            e.size >= config.min_size && e.loss <= config.max_loss && e.fui >= config.min_fui
        })
        .map(|e| e.energy)
        .collect();

    let Some(mut centre) = median(&energies) else {
        return EnergyEstimate::invalid();
    };

    let kept = if energies.len() >= config.min_trim_images {
        let deviations: Vec<f64> = energies.iter().map(|e| (e - centre).abs()).collect();
        let mad = median(&deviations).unwrap_or(0.0);
        let limit = config.mad_multiplier * mad;
        let kept: Vec<f64> = energies
            .iter()
            .copied()
            .filter(|e| (e - centre).abs() <= limit)
            .collect();
        log::trace!("energy trim kept {} of {}", kept.len(), energies.len());
        kept
    } else {
        energies
    };

    if let Some(m) = median(&kept) {
        centre = m;
    }
    let variance = kept.iter().map(|e| (e - centre).powi(2)).sum::<f64>() / kept.len() as f64;
    let spread = variance.sqrt();

    EnergyEstimate {
        energy: centre,
        spread,
        n_images: kept.len(),
        quality: match kept.len() {
            0 => EnergyQuality::Invalid,
            1 => EnergyQuality::ValidSingle,
            _ => EnergyQuality::ValidMulti,
        },
    }
}
