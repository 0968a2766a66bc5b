//! Dense region × age-group arrays.
//!
//! Every compartment, decision and demand array in the crate is a `Grid`. The
//! layout is row-major with one row per region.

use std::ops::{Index, IndexMut};

use crate::error::{Result, VaxError};

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    regions: usize,
    age_groups: usize,
    data: Vec<f64>,
}

impl Grid {
    pub fn zeros(regions: usize, age_groups: usize) -> Self {
        Self::filled(regions, age_groups, 0.0)
    }

    pub fn filled(regions: usize, age_groups: usize, value: f64) -> Self {
        Self {
            regions,
            age_groups,
            data: vec![value; regions * age_groups],
        }
    }

    /// Builds a grid from one row per region.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the rows are ragged.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self> {
        let regions = rows.len();
        let age_groups = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|row| row.len() != age_groups) {
            return Err(VaxError::Configuration(
                "Grid rows must all have the same number of age groups".to_string(),
            ));
        }
        Ok(Self {
            regions,
            age_groups,
            data: rows.into_iter().flatten().collect(),
        })
    }

    pub fn regions(&self) -> usize {
        self.regions
    }

    pub fn age_groups(&self) -> usize {
        self.age_groups
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.regions, self.age_groups)
    }

    pub fn same_shape(&self, other: &Grid) -> bool {
        self.shape() == other.shape()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn row(&self, region: usize) -> &[f64] {
        let start = region * self.age_groups;
        &self.data[start..start + self.age_groups]
    }

    pub fn iter(&self) -> impl Iterator<Item = &f64> {
        self.data.iter()
    }

    /// Iterates `(region, age_group, value)` triples.
    pub fn indexed(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        let cols = self.age_groups.max(1);
        self.data
            .iter()
            .enumerate()
            .map(move |(k, &v)| (k / cols, k % cols, v))
    }

    pub fn sum(&self) -> f64 {
        self.data.iter().sum()
    }

    pub fn region_total(&self, region: usize) -> f64 {
        self.row(region).iter().sum()
    }

    pub fn region_totals(&self) -> Vec<f64> {
        (0..self.regions).map(|r| self.region_total(r)).collect()
    }

    pub fn age_total(&self, age_group: usize) -> f64 {
        (0..self.regions).map(|r| self[(r, age_group)]).sum()
    }

    pub fn age_totals(&self) -> Vec<f64> {
        (0..self.age_groups).map(|a| self.age_total(a)).collect()
    }

    pub fn map<F: Fn(f64) -> f64>(&self, f: F) -> Grid {
        Grid {
            regions: self.regions,
            age_groups: self.age_groups,
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }

    /// Element-wise combination of two grids of equal shape.
    pub fn zip_map<F: Fn(f64, f64) -> f64>(&self, other: &Grid, f: F) -> Grid {
        debug_assert!(self.same_shape(other));
        Grid {
            regions: self.regions,
            age_groups: self.age_groups,
            data: self
                .data
                .iter()
                .zip(other.data.iter())
                .map(|(&a, &b)| f(a, b))
                .collect(),
        }
    }

    pub fn plus(&self, other: &Grid) -> Grid {
        self.zip_map(other, |a, b| a + b)
    }

    pub fn minus(&self, other: &Grid) -> Grid {
        self.zip_map(other, |a, b| a - b)
    }

    pub fn scale(&self, factor: f64) -> Grid {
        self.map(|v| v * factor)
    }

    pub fn add_assign_scaled(&mut self, other: &Grid, factor: f64) {
        debug_assert!(self.same_shape(other));
        for (a, b) in self.data.iter_mut().zip(other.data.iter()) {
            *a += factor * b;
        }
    }

    pub fn minimum(&self, other: &Grid) -> Grid {
        self.zip_map(other, f64::min)
    }

    pub fn clip_min(&self, min: f64) -> Grid {
        self.map(|v| v.max(min))
    }

    pub fn min_value(&self) -> f64 {
        self.data.iter().cloned().fold(f64::INFINITY, f64::min)
    }

    pub fn max_value(&self) -> f64 {
        self.data.iter().cloned().fold(f64::NEG_INFINITY, f64::max)
    }

    /// Whether all values are within `tolerance` of `other`.
    pub fn approx_eq(&self, other: &Grid, tolerance: f64) -> bool {
        self.same_shape(other)
            && self
                .data
                .iter()
                .zip(other.data.iter())
                .all(|(a, b)| (a - b).abs() <= tolerance)
    }
}

impl Index<(usize, usize)> for Grid {
    type Output = f64;

    fn index(&self, (region, age_group): (usize, usize)) -> &f64 {
        &self.data[region * self.age_groups + age_group]
    }
}

impl IndexMut<(usize, usize)> for Grid {
    fn index_mut(&mut self, (region, age_group): (usize, usize)) -> &mut f64 {
        &mut self.data[region * self.age_groups + age_group]
    }
}
