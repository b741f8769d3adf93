//! Characterization variations.
//!
//! A variation is one point of the Cartesian product of a cell's
//! configured parameter axes, carried in library units so lookup-table
//! index writes are exact.

use std::fmt;

use itertools::Itertools;

use crate::cell::CellParams;

/// One point of the cell's parameter space.
#[derive(Debug, Clone, PartialEq)]
pub struct Variation {
    /// Data slew, library time units.
    pub data_slew: f64,
    /// Output load, library capacitance units.
    pub load: f64,
    /// Clock slew, for sequential cells.
    pub clock_slew: Option<f64>,
}

impl fmt::Display for Variation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(clock_slew) = self.clock_slew {
            write!(f, "cslew{clock_slew}_")?;
        }
        write!(f, "slew{}_load{}", self.data_slew, self.load)
    }
}

/// The combinational variation matrix: data slews by loads, in
/// configuration order.
pub fn combinational(params: &CellParams) -> Vec<Variation> {
    params
        .data_slews
        .iter()
        .cartesian_product(&params.loads)
        .map(|(&data_slew, &load)| Variation {
            data_slew,
            load,
            clock_slew: None,
        })
        .collect()
}

/// The sequential variation matrix: clock slews by data slews. Loads are
/// swept inside each task (the clock-to-output table is indexed by clock
/// slew and load, so its points belong to one bisection result).
pub fn sequential(params: &CellParams) -> Vec<Variation> {
    params
        .clock_slews
        .iter()
        .cartesian_product(&params.data_slews)
        .map(|(&clock_slew, &data_slew)| Variation {
            data_slew,
            load: params.loads.first().copied().unwrap_or(0.0),
            clock_slew: Some(clock_slew),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> CellParams {
        CellParams {
            data_slews: vec![0.1, 0.5],
            loads: vec![0.01, 0.1, 1.0],
            clock_slews: vec![0.2],
            setup_range: None,
            hold_range: None,
            area: None,
            models: vec![],
            plots: vec![],
        }
    }

    #[test]
    fn combinational_matrix_is_slews_by_loads() {
        let vars = combinational(&params());
        assert_eq!(vars.len(), 6);
        assert_eq!(vars[0].data_slew, 0.1);
        assert_eq!(vars[0].load, 0.01);
        assert_eq!(vars[5].data_slew, 0.5);
        assert_eq!(vars[5].load, 1.0);
    }

    #[test]
    fn sequential_matrix_is_clock_by_data_slews() {
        let vars = sequential(&params());
        assert_eq!(vars.len(), 2);
        assert!(vars.iter().all(|v| v.clock_slew == Some(0.2)));
    }

    #[test]
    fn labels_are_path_safe() {
        let label = sequential(&params())[0].to_string();
        assert_eq!(label, "cslew0.2_slew0.1_load0.01");
        assert!(!label.contains(['/', ' ']));
    }
}
