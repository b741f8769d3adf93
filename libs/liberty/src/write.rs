//! Strict liberty text rendering.
//!
//! Rendering is deterministic: two-space indentation per nesting level,
//! `} /* end <name> */` closers, library header attributes in a fixed
//! order, attributes before sub-groups, and both in insertion order.

use std::fmt::Write;

use itertools::Itertools;

use crate::lut::{LookupTable, TableTemplate};
use crate::{Group, GroupItem, Value};

/// Rendering options.
#[derive(Debug, Copy, Clone)]
pub struct WriteOptions {
    /// Decimal digits for general float attributes.
    pub precision: usize,
    /// Decimal digits for LUT index and value entries.
    pub lut_precision: usize,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            precision: 1,
            lut_precision: 6,
        }
    }
}

/// Library-level attributes emitted first, in exactly this order.
const HEADER_ATTRIBUTES: [&str; 13] = [
    "technology",
    "delay_model",
    "bus_naming_style",
    "date",
    "comment",
    "time_unit",
    "voltage_unit",
    "current_unit",
    "pulling_resistance_unit",
    "leakage_power_unit",
    "capacitive_load_unit",
    "revision",
    "in_place_swap_mode",
];

fn indent(out: &mut String, level: usize) {
    for _ in 0..level {
        out.push_str("  ");
    }
}

fn needs_quotes(s: &str) -> bool {
    s.is_empty()
        || s.starts_with(|c: char| c.is_ascii_digit())
        || s.chars().any(|c| !(c.is_alphanumeric() || c == '_'))
}

fn format_float(v: f64, precision: usize) -> String {
    format!("{v:.precision$}")
}

fn write_value(out: &mut String, value: &Value, precision: usize) {
    match value {
        Value::Bool(b) => {
            let _ = write!(out, "{b}");
        }
        Value::Int(i) => {
            let _ = write!(out, "{i}");
        }
        Value::Float(f) => out.push_str(&format_float(*f, precision)),
        Value::Str(s) => {
            if needs_quotes(s) {
                let _ = write!(out, "\"{s}\"");
            } else {
                out.push_str(s);
            }
        }
        // Nested lists are flattened; liberty has no deeper structure.
        Value::List(items) => {
            let rendered = items
                .iter()
                .map(|v| {
                    let mut s = String::new();
                    write_value(&mut s, v, precision);
                    s
                })
                .join(", ");
            out.push_str(&rendered);
        }
    }
}

fn write_attribute(out: &mut String, level: usize, name: &str, value: &Value, precision: usize) {
    indent(out, level);
    match value {
        Value::List(_) => {
            let _ = write!(out, "{name} (");
            write_value(out, value, precision);
            out.push_str(");\n");
        }
        _ => {
            let _ = write!(out, "{name} : ");
            write_value(out, value, precision);
            out.push_str(";\n");
        }
    }
}

fn write_index(out: &mut String, level: usize, axis: usize, index: &[f64], lut_precision: usize) {
    indent(out, level);
    let rendered = index
        .iter()
        .map(|v| format_float(*v, lut_precision))
        .join(", ");
    let _ = writeln!(out, "index_{axis} (\"{rendered}\");");
}

fn write_template(out: &mut String, level: usize, template: &TableTemplate, lut_precision: usize) {
    indent(out, level);
    let _ = writeln!(out, "lu_table_template ({}) {{", template.name());
    for (i, variable) in template.variables().iter().enumerate() {
        indent(out, level + 1);
        let _ = writeln!(out, "variable_{} : {};", i + 1, variable);
    }
    for (i, index) in template.indices().iter().enumerate() {
        write_index(out, level + 1, i + 1, index, lut_precision);
    }
    indent(out, level);
    out.push_str("} /* end lu_table_template */\n");
}

fn write_table(out: &mut String, level: usize, table: &LookupTable, lut_precision: usize) {
    indent(out, level);
    let _ = writeln!(out, "{} ({}) {{", table.name(), table.template().name());
    write_index(out, level + 1, 1, table.index_1(), lut_precision);
    if !table.index_2().is_empty() {
        write_index(out, level + 1, 2, table.index_2(), lut_precision);
    }
    indent(out, level + 1);
    out.push_str("values ( \\\n");
    let cols = table.index_2().len().max(1);
    let rows: Vec<_> = table.values().chunks(cols).collect();
    for (i, row) in rows.iter().enumerate() {
        indent(out, level + 2);
        let rendered = row
            .iter()
            .map(|v| format_float(*v, lut_precision))
            .join(", ");
        let sep = if i + 1 < rows.len() { "," } else { "" };
        let _ = writeln!(out, "\"{rendered}\"{sep} \\");
    }
    indent(out, level + 1);
    out.push_str(");\n");
    indent(out, level);
    let _ = writeln!(out, "}} /* end {} */", table.name());
}

impl Group {
    /// Renders this group as liberty text at the given indentation level.
    pub fn to_liberty(&self, level: usize, precision: usize, lut_precision: usize) -> String {
        let mut out = String::new();
        self.render(&mut out, level, precision, lut_precision);
        out
    }

    /// Renders this group with default precisions.
    pub fn to_liberty_default(&self) -> String {
        let opts = WriteOptions::default();
        self.to_liberty(0, opts.precision, opts.lut_precision)
    }

    fn render(&self, out: &mut String, level: usize, precision: usize, lut_precision: usize) {
        indent(out, level);
        match self.identifier() {
            Some(id) => {
                let _ = writeln!(out, "{} ({}) {{", self.name(), id);
            }
            None => {
                let _ = writeln!(out, "{} () {{", self.name());
            }
        }

        if self.name() == "library" {
            for header in HEADER_ATTRIBUTES {
                if let Some(value) = self.attribute(header) {
                    write_attribute(out, level + 1, header, value, precision);
                }
            }
            for (name, value) in self.attributes() {
                if !HEADER_ATTRIBUTES.contains(&name.as_str()) {
                    write_attribute(out, level + 1, name, value, precision);
                }
            }
        } else {
            for (name, value) in self.attributes() {
                write_attribute(out, level + 1, name, value, precision);
            }
        }

        for child in self.items() {
            match child {
                GroupItem::Group(g) => g.render(out, level + 1, precision, lut_precision),
                GroupItem::Template(t) => write_template(out, level + 1, t, lut_precision),
                GroupItem::Table(t) => write_table(out, level + 1, t, lut_precision),
            }
        }

        indent(out, level);
        let _ = writeln!(out, "}} /* end {} */", self.name());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoting_rules() {
        assert!(needs_quotes("1ns"));
        assert!(needs_quotes("a b"));
        assert!(needs_quotes("!A"));
        assert!(!needs_quotes("negative_unate"));
        assert!(!needs_quotes("A"));
    }

    #[test]
    fn attribute_rendering() {
        let mut g = Group::new("pin").unwrap();
        g.add_attribute("direction", "input");
        g.add_attribute("capacitance", 0.0123);
        g.add_attribute("function", "!A");
        let text = g.to_liberty(0, 4, 6);
        assert!(text.contains("direction : input;\n"));
        assert!(text.contains("capacitance : 0.0123;\n"));
        assert!(text.contains("function : \"!A\";\n"));
        assert!(text.ends_with("} /* end pin */\n"));
    }
}
