//! Library-to-library comparison.
//!
//! Pairs delay, transition, and constraint table values between a
//! benchmark library and a freshly characterized one, matching arcs by
//! (cell, pin, related pin, timing type, table name) and table points by
//! index value. Produces `compare.csv` (one row per paired value) and
//! `compare.svg` (a benchmark-versus-compared scatter), and logs a
//! per-table summary. Arcs present in only one library are logged and
//! skipped.

use std::io::Write;
use std::path::Path;

use indexmap::IndexMap;
use lazy_static::lazy_static;
use liberty::{Group, Value};
use serde::Serialize;
use tera::Tera;
use tracing::{info, warn};

use crate::error::{Error, Result};

/// The table names compared, when present on both sides of an arc.
const TABLES: [&str; 6] = [
    "cell_rise",
    "cell_fall",
    "rise_transition",
    "fall_transition",
    "rise_constraint",
    "fall_constraint",
];

const TEMPLATES_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/templates");

lazy_static! {
    static ref TEMPLATES: Tera = {
        match Tera::new(&format!("{TEMPLATES_PATH}/*")) {
            Ok(t) => t,
            Err(e) => {
                panic!("Encountered errors while parsing Tera templates: {e}");
            }
        }
    };
}

/// One table value paired across the two libraries.
#[derive(Debug, Clone, Serialize)]
pub struct PairedValue {
    /// The cell name.
    pub cell: String,
    /// The constrained/output pin name.
    pub pin: String,
    /// The related pin of the timing arc.
    pub related_pin: String,
    /// The table name (`cell_rise`, `fall_constraint`, ...).
    pub table: String,
    /// The first index value of the point.
    pub index_1: f64,
    /// The second index value, for 2-D tables.
    pub index_2: Option<f64>,
    /// The benchmark library's value.
    pub benchmark: f64,
    /// The compared library's value.
    pub compared: f64,
}

impl PairedValue {
    /// Relative deviation of the compared value against the benchmark.
    pub fn deviation(&self) -> f64 {
        (self.compared - self.benchmark) / self.benchmark.abs().max(f64::MIN_POSITIVE)
    }
}

/// Per-table deviation statistics.
#[derive(Debug, Clone, Serialize)]
pub struct TableSummary {
    /// The table name.
    pub table: String,
    /// Paired point count.
    pub count: usize,
    /// Mean absolute relative deviation.
    pub mean: f64,
    /// Maximum absolute relative deviation.
    pub max: f64,
}

/// The outcome of pairing two libraries.
#[derive(Debug, Clone, Default)]
pub struct Comparison {
    /// Every paired value.
    pub pairs: Vec<PairedValue>,
}

impl Comparison {
    /// Deviation statistics grouped by table name.
    pub fn summaries(&self) -> Vec<TableSummary> {
        let mut buckets: IndexMap<&str, Vec<f64>> = IndexMap::new();
        for pair in &self.pairs {
            buckets
                .entry(pair.table.as_str())
                .or_default()
                .push(pair.deviation().abs());
        }
        buckets
            .into_iter()
            .map(|(table, devs)| TableSummary {
                table: table.to_string(),
                count: devs.len(),
                mean: devs.iter().sum::<f64>() / devs.len() as f64,
                max: devs.iter().copied().fold(0.0, f64::max),
            })
            .collect()
    }
}

/// Compares two `.lib` files and writes the artifacts into `out_dir`.
pub fn compare(benchmark: &Path, compared: &Path, out_dir: &Path) -> Result<()> {
    let bench = load(benchmark)?;
    let comp = load(compared)?;
    let comparison = pair_libraries(&bench, &comp);
    std::fs::create_dir_all(out_dir)?;
    write_csv(&out_dir.join("compare.csv"), &comparison)?;
    write_svg(&out_dir.join("compare.svg"), &comparison)?;
    for summary in comparison.summaries() {
        info!(
            table = summary.table,
            points = summary.count,
            mean_deviation = format!("{:.2}%", 100.0 * summary.mean),
            max_deviation = format!("{:.2}%", 100.0 * summary.max),
            "table compared"
        );
    }
    info!(
        benchmark = %benchmark.display(),
        compared = %compared.display(),
        pairs = comparison.pairs.len(),
        "comparison written"
    );
    Ok(())
}

fn load(path: &Path) -> Result<Group> {
    let text = std::fs::read_to_string(path)?;
    liberty::parse::parse_library(&text).map_err(Error::Liberty)
}

/// Pairs every matching arc of two parsed libraries.
pub fn pair_libraries(benchmark: &Group, compared: &Group) -> Comparison {
    let mut comparison = Comparison::default();
    for cell in benchmark.sub_groups().filter(|g| g.name() == "cell") {
        let Some(cell_name) = cell.identifier() else {
            continue;
        };
        let Some(other_cell) = compared.sub_group("cell", Some(cell_name)) else {
            warn!(cell = %cell_name, "cell missing from compared library");
            continue;
        };
        for pin in cell.sub_groups().filter(|g| g.name() == "pin") {
            let Some(pin_name) = pin.identifier() else {
                continue;
            };
            let Some(other_pin) = other_cell.sub_group("pin", Some(pin_name)) else {
                warn!(cell = %cell_name, pin = %pin_name, "pin missing from compared library");
                continue;
            };
            for timing in pin.sub_groups().filter(|g| g.name() == "timing") {
                pair_timing(&mut comparison, cell_name, pin_name, timing, other_pin);
            }
        }
    }
    comparison
}

fn timing_key(group: &Group) -> (Option<&str>, Option<&str>) {
    (
        group.attribute("related_pin").and_then(Value::as_str),
        group.attribute("timing_type").and_then(Value::as_str),
    )
}

fn pair_timing(
    comparison: &mut Comparison,
    cell: &str,
    pin: &str,
    timing: &Group,
    other_pin: &Group,
) {
    let key = timing_key(timing);
    let related = key.0.unwrap_or("");
    let Some(other_timing) = other_pin
        .sub_groups()
        .find(|g| g.name() == "timing" && timing_key(g) == key)
    else {
        warn!(cell, pin, related, "timing arc missing from compared library");
        return;
    };
    for table in TABLES {
        match (table_data(timing, table), table_data(other_timing, table)) {
            (Some(bench), Some(comp)) => {
                pair_tables(comparison, cell, pin, related, table, &bench, &comp);
            }
            (Some(_), None) => {
                warn!(cell, pin, related, table, "table missing from compared library");
            }
            _ => {}
        }
    }
}

struct TableData {
    index_1: Vec<f64>,
    index_2: Vec<f64>,
    values: Vec<f64>,
}

/// Extracts a parsed lookup table: `index_*` and `values` attributes
/// holding quoted numeric lists.
fn table_data(timing: &Group, name: &str) -> Option<TableData> {
    let group = timing.sub_groups().find(|g| g.name() == name)?;
    let numbers = |attr: &str| {
        group
            .attribute(attr)
            .map(Value::numbers)
            .unwrap_or_default()
    };
    let data = TableData {
        index_1: numbers("index_1"),
        index_2: numbers("index_2"),
        values: numbers("values"),
    };
    if data.index_1.is_empty() || data.values.is_empty() {
        return None;
    }
    Some(data)
}

/// Index values match when equal up to printing round-off.
fn same_index(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1.0)
}

fn pair_tables(
    comparison: &mut Comparison,
    cell: &str,
    pin: &str,
    related: &str,
    table: &str,
    bench: &TableData,
    comp: &TableData,
) {
    let bench_cols = bench.index_2.len().max(1);
    let comp_cols = comp.index_2.len().max(1);
    for (pos, &value) in bench.values.iter().enumerate() {
        let (row, col) = (pos / bench_cols, pos % bench_cols);
        let Some(&index_1) = bench.index_1.get(row) else {
            continue;
        };
        let index_2 = bench.index_2.get(col).copied();
        let Some(other_row) = comp.index_1.iter().position(|&v| same_index(v, index_1))
        else {
            continue;
        };
        let other_col = match index_2 {
            Some(i2) => match comp.index_2.iter().position(|&v| same_index(v, i2)) {
                Some(c) => c,
                None => continue,
            },
            None => 0,
        };
        let Some(&other) = comp.values.get(other_row * comp_cols + other_col) else {
            continue;
        };
        if !value.is_finite() || !other.is_finite() {
            continue;
        }
        comparison.pairs.push(PairedValue {
            cell: cell.to_string(),
            pin: pin.to_string(),
            related_pin: related.to_string(),
            table: table.to_string(),
            index_1,
            index_2,
            benchmark: value,
            compared: other,
        });
    }
}

fn write_csv(path: &Path, comparison: &Comparison) -> Result<()> {
    let mut f = std::fs::File::create(path)?;
    writeln!(
        f,
        "cell,pin,related_pin,table,index_1,index_2,benchmark,compared,deviation"
    )?;
    for pair in &comparison.pairs {
        writeln!(
            f,
            "{},{},{},{},{:e},{},{:e},{:e},{:e}",
            pair.cell,
            pair.pin,
            pair.related_pin,
            pair.table,
            pair.index_1,
            pair.index_2.map(|v| format!("{v:e}")).unwrap_or_default(),
            pair.benchmark,
            pair.compared,
            pair.deviation(),
        )?;
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
struct SvgPoint {
    x: f64,
    y: f64,
}

#[derive(Debug, Clone, Serialize)]
struct SvgContext {
    size: f64,
    margin: f64,
    max_value: f64,
    points: Vec<SvgPoint>,
}

fn write_svg(path: &Path, comparison: &Comparison) -> Result<()> {
    const SIZE: f64 = 640.0;
    const MARGIN: f64 = 60.0;
    let max_value = comparison
        .pairs
        .iter()
        .flat_map(|p| [p.benchmark, p.compared])
        .fold(0.0, f64::max)
        .max(f64::MIN_POSITIVE);
    let span = SIZE - 2.0 * MARGIN;
    let points = comparison
        .pairs
        .iter()
        .map(|p| SvgPoint {
            x: MARGIN + span * p.benchmark / max_value,
            y: SIZE - MARGIN - span * p.compared / max_value,
        })
        .collect();
    let ctx = SvgContext {
        size: SIZE,
        margin: MARGIN,
        max_value,
        points,
    };
    let ctx = tera::Context::from_serialize(&ctx)
        .map_err(|e| Error::Internal(format!("compare template context: {e}")))?;
    let mut f = std::fs::File::create(path)?;
    TEMPLATES
        .render_to("compare.svg", &ctx, &mut f)
        .map_err(|e| Error::Internal(format!("compare template: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const BENCH: &str = r#"
library (bench) {
  cell (INVX1) {
    pin (Y) {
      direction : output;
      timing () {
        related_pin : A;
        cell_rise (delay_template) {
          index_1 ("0.1, 0.5");
          index_2 ("0.01, 0.1");
          values ( \
            "0.10, 0.20", \
            "0.30, 0.40" \
          );
        }
      }
    }
  }
  cell (BUFX1) {
    pin (Y) {
      direction : output;
    }
  }
}
"#;

    const COMPARED: &str = r#"
library (other) {
  cell (INVX1) {
    pin (Y) {
      direction : output;
      timing () {
        related_pin : A;
        cell_rise (delay_template) {
          index_1 ("0.5, 0.1");
          index_2 ("0.01, 0.1");
          values ( \
            "0.33, 0.44", \
            "0.11, 0.22" \
          );
        }
      }
    }
  }
}
"#;

    #[test]
    fn pairs_by_index_value_not_position() {
        let bench = liberty::parse::parse_library(BENCH).unwrap();
        let comp = liberty::parse::parse_library(COMPARED).unwrap();
        let comparison = pair_libraries(&bench, &comp);
        // The compared index_1 axis is reversed; pairing must follow
        // values, not positions.
        assert_eq!(comparison.pairs.len(), 4);
        let first = &comparison.pairs[0];
        assert_eq!(first.index_1, 0.1);
        assert_eq!(first.benchmark, 0.10);
        assert_eq!(first.compared, 0.11);
        let last = &comparison.pairs[3];
        assert_eq!(last.index_1, 0.5);
        assert_eq!(last.index_2, Some(0.1));
        assert_eq!(last.compared, 0.44);
    }

    #[test]
    fn deviation_summary_per_table() {
        let bench = liberty::parse::parse_library(BENCH).unwrap();
        let comp = liberty::parse::parse_library(COMPARED).unwrap();
        let summaries = pair_libraries(&bench, &comp).summaries();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].table, "cell_rise");
        assert_eq!(summaries[0].count, 4);
        assert!(summaries[0].max > 0.0);
    }
}
