//! Policy-weight tensor indexed by (wave state, wave occurrence, weight slot).
//!
//! Each (wave state, occurrence) row is a distribution over the base
//! allocation policies the weighted policy blends.

use crate::error::{Result, VaxError};

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyWeights {
    wave_states: usize,
    occurrences: usize,
    slots: usize,
    values: Vec<f64>,
}

impl PolicyWeights {
    pub fn zeros(wave_states: usize, occurrences: usize, slots: usize) -> Self {
        Self {
            wave_states,
            occurrences,
            slots,
            values: vec![0.0; wave_states * occurrences * slots],
        }
    }

    /// Every row set to `row`.
    pub fn uniform_rows(wave_states: usize, occurrences: usize, row: &[f64]) -> Self {
        let mut weights = Self::zeros(wave_states, occurrences, row.len());
        for i in 0..wave_states {
            for j in 0..occurrences {
                weights.row_mut(i, j).copy_from_slice(row);
            }
        }
        weights
    }

    /// Builds a tensor from flat values in (wave state, occurrence, slot) order.
    pub fn from_values(
        wave_states: usize,
        occurrences: usize,
        slots: usize,
        values: Vec<f64>,
    ) -> Result<Self> {
        if values.len() != wave_states * occurrences * slots {
            return Err(VaxError::Configuration(format!(
                "expected {} policy weights, got {}",
                wave_states * occurrences * slots,
                values.len()
            )));
        }
        Ok(Self {
            wave_states,
            occurrences,
            slots,
            values,
        })
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        (self.wave_states, self.occurrences, self.slots)
    }

    pub fn wave_states(&self) -> usize {
        self.wave_states
    }

    pub fn occurrences(&self) -> usize {
        self.occurrences
    }

    pub fn slots(&self) -> usize {
        self.slots
    }

    fn offset(&self, i: usize, j: usize, k: usize) -> usize {
        (i * self.occurrences + j) * self.slots + k
    }

    pub fn get(&self, i: usize, j: usize, k: usize) -> f64 {
        self.values[self.offset(i, j, k)]
    }

    pub fn set(&mut self, i: usize, j: usize, k: usize, value: f64) {
        let idx = self.offset(i, j, k);
        self.values[idx] = value;
    }

    pub fn row(&self, i: usize, j: usize) -> &[f64] {
        let start = self.offset(i, j, 0);
        &self.values[start..start + self.slots]
    }

    pub fn row_mut(&mut self, i: usize, j: usize) -> &mut [f64] {
        let start = self.offset(i, j, 0);
        &mut self.values[start..start + self.slots]
    }

    pub fn swap(&mut self, a: (usize, usize, usize), b: (usize, usize, usize)) {
        let ia = self.offset(a.0, a.1, a.2);
        let ib = self.offset(b.0, b.1, b.2);
        self.values.swap(ia, ib);
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Element-wise `a * self + b * other`.
    pub fn blend(&self, a: f64, other: &PolicyWeights, b: f64) -> PolicyWeights {
        debug_assert_eq!(self.shape(), other.shape());
        PolicyWeights {
            wave_states: self.wave_states,
            occurrences: self.occurrences,
            slots: self.slots,
            values: self
                .values
                .iter()
                .zip(&other.values)
                .map(|(x, y)| a * x + b * y)
                .collect(),
        }
    }

    pub fn row_sums(&self) -> Vec<f64> {
        self.values.chunks(self.slots.max(1)).map(|r| r.iter().sum()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indexing_layout() {
        let values: Vec<f64> = (0..24).map(|v| v as f64).collect();
        let w = PolicyWeights::from_values(2, 3, 4, values).unwrap();
        assert_eq!(w.get(1, 2, 3), 23.0);
        assert_eq!(w.row(1, 0), &[12.0, 13.0, 14.0, 15.0]);
        assert_eq!(w.row_sums().len(), 6);
    }

    #[test]
    fn test_wrong_length_rejected() {
        assert!(PolicyWeights::from_values(3, 4, 4, vec![0.0; 47]).is_err());
    }

    #[test]
    fn test_blend_and_swap() {
        let a = PolicyWeights::uniform_rows(1, 1, &[1.0, 0.0]);
        let b = PolicyWeights::uniform_rows(1, 1, &[0.0, 1.0]);
        let mut c = a.blend(0.25, &b, 0.75);
        assert_eq!(c.row(0, 0), &[0.25, 0.75]);
        c.swap((0, 0, 0), (0, 0, 1));
        assert_eq!(c.row(0, 0), &[0.75, 0.25]);
    }
}
