//! Binned lookup-table disp backend.
//!
//! One table per telescope type, binned in `log10(size)` and
//! `width / length`. Each bin holds the mean disp and optionally the mean
//! energy and the disp spread; empty bins are `null` in the JSON file and
//! make the lookup fail.
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::missing_errors_doc
)]

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use serde::{Deserialize, Serialize};

use showerpix_core::{TelescopeContext, TelescopeType};

use crate::disp::{DispAux, DispError, DispEstimate, DispEstimator, DispInput};

/// Regular binning of one axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Axis {
    pub min: f64,
    pub max: f64,
    pub bins: usize,
}

impl Axis {
    #[must_use]
    pub fn new(min: f64, max: f64, bins: usize) -> Self {
        Self { min, max, bins }
    }

    fn validate(&self, name: &str) -> Result<(), DispError> {
        if self.bins == 0 || self.min.is_nan() || self.max.is_nan() || self.max <= self.min {
            return Err(DispError::InvalidModel(format!(
                "{name} axis needs max > min and at least one bin"
            )));
        }
        Ok(())
    }

    /// Bin index of `value`; the upper edge belongs to the last bin.
    fn bin(&self, quantity: &'static str, value: f64) -> Result<usize, DispError> {
        if !value.is_finite() || value < self.min || value > self.max {
            return Err(DispError::OutOfRange {
                quantity,
                value,
                min: self.min,
                max: self.max,
            });
        }
        let width = (self.max - self.min) / self.bins as f64;
        Ok((((value - self.min) / width) as usize).min(self.bins - 1))
    }
}

/// Table for one telescope type. Values are indexed `[size_bin][ratio_bin]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispGrid {
    pub telescope_type: TelescopeType,
    pub log_size: Axis,
    pub width_over_length: Axis,
    pub disp: Vec<Vec<Option<f64>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub energy: Option<Vec<Vec<Option<f64>>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uncertainty: Option<Vec<Vec<Option<f64>>>>,
}

impl DispGrid {
    /// Checks the axes and that every value grid matches them.
    pub fn validate(&self) -> Result<(), DispError> {
        self.log_size.validate("log_size")?;
        self.width_over_length.validate("width_over_length")?;
        let check = |name: &str, grid: &[Vec<Option<f64>>]| {
            let shape_ok = grid.len() == self.log_size.bins
                && grid.iter().all(|row| row.len() == self.width_over_length.bins);
            if shape_ok {
                Ok(())
            } else {
                Err(DispError::InvalidModel(format!(
                    "{name} grid for {:?} must be {} x {}",
                    self.telescope_type, self.log_size.bins, self.width_over_length.bins
                )))
            }
        };
        check("disp", &self.disp)?;
        if let Some(energy) = &self.energy {
            check("energy", energy)?;
        }
        if let Some(uncertainty) = &self.uncertainty {
            check("uncertainty", uncertainty)?;
        }
        Ok(())
    }

    /// Looks up one image.
    pub fn lookup(&self, input: &DispInput) -> Result<DispEstimate, DispError> {
        if input.size <= 0.0 {
            return Err(DispError::OutOfRange {
                quantity: "size",
                value: input.size,
                min: 10f64.powf(self.log_size.min),
                max: 10f64.powf(self.log_size.max),
            });
        }
        let i = self.log_size.bin("log10(size)", input.size.log10())?;
        let j = self
            .width_over_length
            .bin("width/length", input.width_over_length())?;

        let disp = self.disp[i][j].ok_or(DispError::EmptyBin(i, j))?;
        let mut estimate = DispEstimate::new(disp);
        estimate.energy = self.energy.as_ref().and_then(|grid| grid[i][j]);
        estimate.uncertainty = self.uncertainty.as_ref().and_then(|grid| grid[i][j]);
        Ok(estimate)
    }
}

#[derive(Debug, Deserialize, Serialize)]
struct TableFile {
    tables: Vec<DispGrid>,
}

/// Lookup-table disp backend holding one [`DispGrid`] per telescope type.
#[derive(Debug, Clone, Default)]
pub struct DispTable {
    grids: HashMap<TelescopeType, DispGrid>,
}

impl DispTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) the grid of one telescope type.
    pub fn insert(&mut self, grid: DispGrid) -> Result<(), DispError> {
        grid.validate()?;
        self.grids.insert(grid.telescope_type, grid);
        Ok(())
    }

    /// Parses a table file (`{"tables": [...]}`).
    pub fn from_json_str(json: &str) -> Result<Self, DispError> {
        Self::from_file_contents(serde_json::from_str(json)?)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, DispError> {
        Self::from_file_contents(serde_json::from_reader(reader)?)
    }

    /// Loads a table file from disk.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, DispError> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    fn from_file_contents(file: TableFile) -> Result<Self, DispError> {
        let mut table = Self::new();
        for grid in file.tables {
            table.insert(grid)?;
        }
        log::debug!("loaded disp table for {} telescope types", table.grids.len());
        Ok(table)
    }

    /// Serializes the table in the format read by [`DispTable::from_json_str`].
    pub fn to_json_string(&self) -> Result<String, DispError> {
        let mut tables: Vec<DispGrid> = self.grids.values().cloned().collect();
        tables.sort_by_key(|grid| grid.telescope_type);
        Ok(serde_json::to_string_pretty(&TableFile { tables })?)
    }

    /// Telescope types with a grid.
    pub fn telescope_types(&self) -> impl Iterator<Item = TelescopeType> + '_ {
        self.grids.keys().copied()
    }

    #[must_use]
    pub fn grid(&self, telescope_type: TelescopeType) -> Option<&DispGrid> {
        self.grids.get(&telescope_type)
    }
}

impl DispEstimator for DispTable {
    fn name(&self) -> &str {
        "table"
    }

    fn estimate(
        &self,
        input: &DispInput,
        telescope: &TelescopeContext,
        _aux: &DispAux,
    ) -> Result<DispEstimate, DispError> {
        self.grids
            .get(&telescope.telescope_type)
            .ok_or(DispError::NoModel(telescope.telescope_type))?
            .lookup(input)
    }
}
