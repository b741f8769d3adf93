//! Subcircuit scanning.
//!
//! A cell netlist must contain exactly one line of the form
//! `.SUBCKT <cell> <port> <port> ...` (case-insensitive, the leading dot
//! optional). The ports on that line are the authoritative wiring order
//! for every deck the characterization engine builds.

use std::path::Path;

use arcstr::ArcStr;
use serde::{Deserialize, Serialize};
use unicase::UniCase;

use crate::error::NetlistError;

/// A scanned `.subckt` declaration: the cell name and its ports in
/// authoritative order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subckt {
    /// The subcircuit name as written in the netlist.
    pub name: ArcStr,
    /// The ports in declaration order.
    pub ports: Vec<ArcStr>,
}

impl Subckt {
    /// True if this subcircuit declares the given port (case-insensitive).
    pub fn has_port(&self, port: &str) -> bool {
        let port = UniCase::new(port);
        self.ports.iter().any(|p| UniCase::new(p.as_str()) == port)
    }
}

/// Scans `source` for the `.subckt` line declaring `cell`.
pub fn scan_subckt_str(source: &str, cell: &str, path: &Path) -> Result<Subckt, NetlistError> {
    let want = UniCase::new(cell);
    for line in source.lines() {
        let line = line.trim();
        let line = line.strip_prefix('.').unwrap_or(line);
        let mut tokens = line.split_whitespace();
        let Some(keyword) = tokens.next() else {
            continue;
        };
        if !keyword.eq_ignore_ascii_case("SUBCKT") {
            continue;
        }
        let Some(name) = tokens.next() else {
            continue;
        };
        if UniCase::new(name) != want {
            continue;
        }
        let ports: Vec<ArcStr> = tokens
            .take_while(|t| !t.contains('='))
            .map(ArcStr::from)
            .collect();
        if ports.is_empty() {
            return Err(NetlistError::EmptyPorts {
                cell: ArcStr::from(cell),
            });
        }
        return Ok(Subckt {
            name: ArcStr::from(name),
            ports,
        });
    }
    Err(NetlistError::SubcktNotFound {
        cell: ArcStr::from(cell),
        path: path.to_path_buf(),
    })
}

/// Scans the netlist file at `path` for the `.subckt` declaring `cell`.
pub fn scan_subckt(path: impl AsRef<Path>, cell: &str) -> Result<Subckt, NetlistError> {
    let path = path.as_ref();
    let source = std::fs::read_to_string(path).map_err(|source| NetlistError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    scan_subckt_str(&source, cell, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NETLIST: &str = "\
* a comment
.subckt INVX1 A Y VDD VSS
M1 Y A VSS VSS nfet w=1u l=0.15u
M2 Y A VDD VDD pfet w=2u l=0.15u
.ends
";

    #[test]
    fn finds_the_subckt_line_case_insensitively() {
        let subckt = scan_subckt_str(NETLIST, "invx1", Path::new("inv.sp")).unwrap();
        assert_eq!(subckt.name, "INVX1");
        assert_eq!(subckt.ports, ["A", "Y", "VDD", "VSS"]);
        assert!(subckt.has_port("vdd"));
    }

    #[test]
    fn parameters_are_not_ports() {
        let subckt =
            scan_subckt_str(".SUBCKT BUF A Y W=1u\n.ends\n", "BUF", Path::new("buf.sp")).unwrap();
        assert_eq!(subckt.ports, ["A", "Y"]);
    }

    #[test]
    fn missing_subckt_is_an_error() {
        let err = scan_subckt_str(NETLIST, "NAND2", Path::new("inv.sp")).unwrap_err();
        assert!(matches!(err, NetlistError::SubcktNotFound { .. }));
    }

    #[test]
    fn empty_port_list_is_an_error() {
        let err =
            scan_subckt_str("SUBCKT EMPTY\n", "EMPTY", Path::new("e.sp")).unwrap_err();
        assert!(matches!(err, NetlistError::EmptyPorts { .. }));
    }
}
