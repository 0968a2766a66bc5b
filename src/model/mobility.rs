//! Read-only population, commuting and contact inputs.
//!
//! These are loaded by external I/O and shared, behind an `Arc`, by every
//! rollout of the decision process.

use crate::error::{Result, VaxError};
use crate::grid::Grid;

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct RegionInfo {
    pub id: String,
    pub name: String,
}

/// Residents per region and age group.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct PopulationTable {
    pub regions: Vec<RegionInfo>,
    pub counts: Grid,
}

impl PopulationTable {
    pub fn new(regions: Vec<RegionInfo>, counts: Grid) -> Result<Self> {
        if regions.len() != counts.regions() {
            return Err(VaxError::Configuration(format!(
                "population table names {} regions but has {} rows",
                regions.len(),
                counts.regions()
            )));
        }
        if counts.min_value() < 0.0 {
            return Err(VaxError::Configuration(
                "population counts cannot be negative".to_string(),
            ));
        }
        Ok(Self { regions, counts })
    }

    /// Anonymous regions named by index, convenient for synthetic scenarios.
    pub fn from_counts(counts: Grid) -> Result<Self> {
        let regions = (0..counts.regions())
            .map(|r| RegionInfo {
                id: r.to_string(),
                name: format!("region_{}", r),
            })
            .collect();
        Self::new(regions, counts)
    }

    pub fn total(&self) -> f64 {
        self.counts.sum()
    }

    pub fn shape(&self) -> (usize, usize) {
        self.counts.shape()
    }
}

/// Commuter visitor counts and origin-destination flows.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct CommuterFlows {
    /// People present in each destination region during working hours, per age group.
    pub visitors: Grid,
    /// `od[i][j]` commuters travelling from region `i` to region `j`.
    pub od: Vec<Vec<f64>>,
}

impl CommuterFlows {
    /// No commuting at all; the commuter term vanishes.
    pub fn none(regions: usize, age_groups: usize) -> Self {
        Self {
            visitors: Grid::zeros(regions, age_groups),
            od: vec![vec![0.0; regions]; regions],
        }
    }

    pub fn validate(&self, regions: usize, age_groups: usize) -> Result<()> {
        if self.visitors.shape() != (regions, age_groups) {
            return Err(VaxError::Configuration(format!(
                "visitor grid has shape {:?}, expected {:?}",
                self.visitors.shape(),
                (regions, age_groups)
            )));
        }
        if self.od.len() != regions || self.od.iter().any(|row| row.len() != regions) {
            return Err(VaxError::Configuration(format!(
                "OD matrix must be {}x{}",
                regions, regions
            )));
        }
        if self.od.iter().flatten().any(|&v| v < 0.0) || self.visitors.min_value() < 0.0 {
            return Err(VaxError::Configuration(
                "commuter counts cannot be negative".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct ContactMatrix {
    pub context: String,
    pub matrix: Vec<Vec<f64>>,
}

/// Age-group contact matrices, one per social context.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ContactMatrices {
    pub contexts: Vec<ContactMatrix>,
}

impl ContactMatrices {
    pub fn new(contexts: Vec<ContactMatrix>) -> Self {
        Self { contexts }
    }

    /// A single context with the given matrix.
    pub fn single(context: &str, matrix: Vec<Vec<f64>>) -> Self {
        Self::new(vec![ContactMatrix {
            context: context.to_string(),
            matrix,
        }])
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    pub fn validate(&self, age_groups: usize) -> Result<()> {
        for c in &self.contexts {
            if c.matrix.len() != age_groups || c.matrix.iter().any(|row| row.len() != age_groups)
            {
                return Err(VaxError::Configuration(format!(
                    "contact matrix '{}' must be {}x{}",
                    c.context, age_groups, age_groups
                )));
            }
        }
        Ok(())
    }

    /// Sum of the context matrices scaled by `weights`.
    pub fn weighted(&self, weights: &[f64]) -> Vec<Vec<f64>> {
        let n = self.contexts.first().map_or(0, |c| c.matrix.len());
        let mut combined = vec![vec![0.0; n]; n];
        for (c, &w) in self.contexts.iter().zip(weights) {
            for (row, src) in combined.iter_mut().zip(&c.matrix) {
                for (cell, &v) in row.iter_mut().zip(src) {
                    *cell += w * v;
                }
            }
        }
        combined
    }
}

/// Everything the epidemic model reads but never changes.
#[derive(Debug, Clone)]
pub struct Mobility {
    pub commuters: CommuterFlows,
    pub contacts: ContactMatrices,
    /// Fraction of each age group that commutes.
    pub age_flow_scaling: Vec<f64>,
}

impl Mobility {
    pub fn new(
        commuters: CommuterFlows,
        contacts: ContactMatrices,
        age_flow_scaling: Vec<f64>,
    ) -> Self {
        Self {
            commuters,
            contacts,
            age_flow_scaling,
        }
    }

    pub fn validate(&self, regions: usize, age_groups: usize, contexts: usize) -> Result<()> {
        self.commuters.validate(regions, age_groups)?;
        self.contacts.validate(age_groups)?;
        if self.contacts.len() != contexts {
            return Err(VaxError::Configuration(format!(
                "{} contact matrices but {} contact weights",
                self.contacts.len(),
                contexts
            )));
        }
        if self.age_flow_scaling.len() != age_groups {
            return Err(VaxError::Configuration(format!(
                "age flow scaling has {} entries, expected {}",
                self.age_flow_scaling.len(),
                age_groups
            )));
        }
        Ok(())
    }
}
