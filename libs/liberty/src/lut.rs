//! Lookup tables and table templates.
//!
//! Lookup tables are 1-D or 2-D numeric tables addressed by index *value*,
//! not ordinal: characterization code writes `lut.set(&[0.013, 0.19], v)`
//! with the same exact numbers it configured as index entries. Every table
//! carries a copy of the template that defines its variables and indices.

use arcstr::ArcStr;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A `lu_table_template`: a name plus one or two indexed variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableTemplate {
    name: ArcStr,
    variables: Vec<ArcStr>,
    indices: Vec<Vec<f64>>,
}

impl TableTemplate {
    /// Creates a 1-D template.
    pub fn new(
        name: impl Into<ArcStr>,
        variable: impl Into<ArcStr>,
        index: Vec<f64>,
    ) -> Self {
        Self {
            name: name.into(),
            variables: vec![variable.into()],
            indices: vec![index],
        }
    }

    /// Creates a 2-D template.
    pub fn new_2d(
        name: impl Into<ArcStr>,
        variable_1: impl Into<ArcStr>,
        index_1: Vec<f64>,
        variable_2: impl Into<ArcStr>,
        index_2: Vec<f64>,
    ) -> Self {
        Self {
            name: name.into(),
            variables: vec![variable_1.into(), variable_2.into()],
            indices: vec![index_1, index_2],
        }
    }

    /// The template name.
    pub fn name(&self) -> &ArcStr {
        &self.name
    }

    /// The number of index dimensions (1 or 2).
    pub fn arity(&self) -> usize {
        self.variables.len()
    }

    /// The variable names, in axis order.
    pub fn variables(&self) -> &[ArcStr] {
        &self.variables
    }

    /// The index value lists, in axis order.
    pub fn indices(&self) -> &[Vec<f64>] {
        &self.indices
    }
}

/// A lookup table group such as `cell_rise` or `rise_constraint`.
///
/// Values are stored row-major: one row per `index_1` entry. Unset entries
/// are NaN; merging tables with equal templates overlays the finite values
/// of the incoming table, which is how per-variation tasks are folded into
/// one complete table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupTable {
    name: ArcStr,
    template: TableTemplate,
    values: Vec<f64>,
}

impl LookupTable {
    /// Creates an empty (NaN-filled) table over the template's indices.
    pub fn new(name: impl Into<ArcStr>, template: TableTemplate) -> Self {
        let len = template.indices()[0].len() * template.indices().get(1).map_or(1, Vec::len);
        Self {
            name: name.into(),
            template,
            values: vec![f64::NAN; len],
        }
    }

    /// Creates a table with explicit values, validating the shape.
    pub fn with_values(
        name: impl Into<ArcStr>,
        template: TableTemplate,
        values: Vec<f64>,
    ) -> Result<Self> {
        let name = name.into();
        let rows = template.indices()[0].len();
        let cols = template.indices().get(1).map_or(1, Vec::len);
        if values.len() != rows * cols {
            return Err(Error::LutShape {
                table: name,
                values: values.len(),
                rows,
                cols,
            });
        }
        Ok(Self {
            name,
            template,
            values,
        })
    }

    /// The table name.
    pub fn name(&self) -> &ArcStr {
        &self.name
    }

    /// The table's template.
    pub fn template(&self) -> &TableTemplate {
        &self.template
    }

    /// `index_1` of this table.
    pub fn index_1(&self) -> &[f64] {
        &self.template.indices()[0]
    }

    /// `index_2` of this table, empty for 1-D tables.
    pub fn index_2(&self) -> &[f64] {
        self.template.indices().get(1).map_or(&[], Vec::as_slice)
    }

    /// The raw row-major values.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    fn axis_position(&self, axis: usize, value: f64) -> Result<usize> {
        self.template.indices()[axis]
            .iter()
            .position(|&v| v == value)
            .ok_or(Error::IndexNotFound {
                table: self.name.clone(),
                value,
                axis: axis + 1,
            })
    }

    fn position(&self, index: &[f64]) -> Result<usize> {
        if index.len() != self.template.arity() {
            return Err(Error::IndexArity {
                table: self.name.clone(),
                given: index.len(),
                arity: self.template.arity(),
            });
        }
        let row = self.axis_position(0, index[0])?;
        if self.template.arity() == 1 {
            Ok(row)
        } else {
            let col = self.axis_position(1, index[1])?;
            Ok(row * self.index_2().len() + col)
        }
    }

    /// Looks up the value stored at the given index values.
    pub fn get(&self, index: &[f64]) -> Result<f64> {
        Ok(self.values[self.position(index)?])
    }

    /// Stores a value at the given index values.
    pub fn set(&mut self, index: &[f64], value: f64) -> Result<()> {
        let pos = self.position(index)?;
        self.values[pos] = value;
        Ok(())
    }

    /// True once every entry has been written.
    pub fn is_complete(&self) -> bool {
        self.values.iter().all(|v| v.is_finite())
    }

    /// Merges `other` into `self`.
    ///
    /// With equal templates the finite entries of `other` win point-wise;
    /// otherwise `other` replaces `self` wholesale.
    pub fn overlay(&mut self, other: &LookupTable) {
        if self.template == other.template {
            for (slot, v) in self.values.iter_mut().zip(&other.values) {
                if v.is_finite() {
                    *slot = *v;
                }
            }
        } else {
            *self = other.clone();
        }
    }
}
