//! End-to-end scenarios against a stub simulator.
//!
//! The stub shapes its canned records after the deck it receives: AC decks
//! get a synthetic capacitive response, transient decks get fixed delay
//! measurements, and setup/hold trial decks pass or fail based on the
//! actual clock and data waveforms, so the bisection search runs against a
//! cell with a known constraint window.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use approx::assert_relative_eq;
use arcstr::ArcStr;
use indexmap::IndexMap;
use liberty::{Group, GroupItem, Value};
use regex::Regex;
use spice::deck::{Analysis, Source};
use spice::sim::{AnalysisRecord, SignalData};
use spice::{Deck, SimContext, SimError, SimRecord, Simulator};

use crate::cell::{Cell, TimingPath, Transition};
use crate::config::Config;
use crate::run;

#[derive(Debug, Clone)]
struct Stub {
    /// The pin capacitance every AC sweep reveals, in farads.
    capacitance: f64,
    /// Combinational propagation delay and output transition, in seconds.
    prop: f64,
    tran: f64,
    /// Clock-to-output delay and transition, in seconds.
    c2q: f64,
    c2q_tran: f64,
    /// Output stabilizing transit, in seconds.
    stab: f64,
    /// The latch passes a trial iff the observed setup and hold, measured
    /// between waveform midpoints, are at least these, in seconds.
    setup_min: f64,
    hold_min: f64,
}

impl Default for Stub {
    fn default() -> Self {
        Self {
            capacitance: 5e-15,
            prop: 1e-10,
            tran: 5e-11,
            c2q: 1.2e-10,
            c2q_tran: 6e-11,
            stab: 2e-9,
            setup_min: 0.4e-9,
            hold_min: 0.3e-9,
        }
    }
}

impl Stub {
    fn ac_record(&self, deck: &Deck) -> SimRecord {
        let current = deck
            .sources
            .iter()
            .find_map(|s| match s {
                Source::Iac { magnitude, .. } => Some(*magnitude),
                _ => None,
            })
            .expect("AC deck carries a current source");
        let (fstart, fstop) = deck
            .analyses
            .iter()
            .find_map(|a| match a {
                Analysis::AcDecade { fstart, fstop, .. } => Some((*fstart, *fstop)),
                _ => None,
            })
            .expect("AC deck carries a sweep");
        let mut sweep = Vec::new();
        let mut f = fstart;
        while f <= fstop {
            sweep.push(f);
            f *= 10f64.powf(0.1);
        }
        let real: Vec<f64> = sweep
            .iter()
            .map(|f| current / (2.0 * std::f64::consts::PI * f * self.capacitance))
            .collect();
        let imag = vec![0.0; sweep.len()];
        let target = deck.saves.first().cloned().expect("AC deck saves its target");
        let mut signals = IndexMap::new();
        signals.insert(target, SignalData::Complex { real, imag });
        SimRecord {
            measures: IndexMap::new(),
            analyses: vec![AnalysisRecord { sweep, signals }],
        }
    }

    fn sequential_record(&self, deck: &Deck) -> SimRecord {
        let clock_net = deck
            .measurements
            .iter()
            .find(|m| m.name == "t_c2q")
            .map(|m| m.trig.signal.clone())
            .expect("trial deck measures t_c2q");
        let points_of = |want_clock: bool| -> Vec<(f64, f64)> {
            deck.sources
                .iter()
                .find_map(|s| match s {
                    Source::Vpwl { name, points, .. }
                        if (*name == clock_net) == want_clock =>
                    {
                        Some(points.clone())
                    }
                    _ => None,
                })
                .expect("trial deck drives clock and data waveforms")
        };
        let clock = points_of(true);
        let data = points_of(false);
        let capture_mid = (clock[clock.len() - 2].0 + clock[clock.len() - 1].0) / 2.0;
        let data_mid = (data[1].0 + data[2].0) / 2.0;
        let revert_mid = (data[3].0 + data[4].0) / 2.0;
        let setup = capture_mid - data_mid;
        let hold = revert_mid - capture_mid;

        let mut measures = IndexMap::new();
        if setup >= self.setup_min && hold >= self.hold_min {
            for m in &deck.measurements {
                let value = match m.name.as_str() {
                    "t_c2q" => self.c2q,
                    "t_c2q_tran" => self.c2q_tran,
                    _ => self.stab,
                };
                measures.insert(m.name.clone(), value);
            }
        }
        SimRecord {
            measures,
            analyses: Vec::new(),
        }
    }

    fn combinational_record(&self, deck: &Deck) -> SimRecord {
        let mut measures = IndexMap::new();
        for m in &deck.measurements {
            let value = if m.name.ends_with("_prop") {
                self.prop
            } else {
                self.tran
            };
            measures.insert(m.name.clone(), value);
        }
        SimRecord {
            measures,
            analyses: Vec::new(),
        }
    }
}

impl Simulator for Stub {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn simulate(&self, _ctx: &SimContext, deck: &Deck) -> Result<SimRecord, SimError> {
        deck.validate().map_err(SimError::Deck)?;
        if deck
            .analyses
            .iter()
            .any(|a| matches!(a, Analysis::AcDecade { .. }))
        {
            return Ok(self.ac_record(deck));
        }
        if deck.measurements.iter().any(|m| m.name == "t_c2q") {
            return Ok(self.sequential_record(deck));
        }
        Ok(self.combinational_record(deck))
    }
}

const SETTINGS: &str = r#"
[settings]
lib_name = "testlib"

[settings.named_nodes.primary_power]
name = "VDD"
voltage = 1.1

[settings.named_nodes.primary_ground]
name = "VSS"
voltage = 0.0
"#;

fn workspace(test: &str) -> PathBuf {
    let dir = PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/build")).join(test);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn parse_config(dir: &Path, toml: &str) -> Config {
    Config::from_str_at(toml, &dir.join("charz.toml")).unwrap()
}

fn characterize(dir: &Path, toml: &str, jobs: usize, filters: &[Regex]) -> Group {
    let config = parse_config(dir, toml);
    run::characterize(&config, dir, Arc::new(Stub::default()), jobs, filters).unwrap()
}

fn path(input: &str, input_dir: Transition, output: &str, output_dir: Transition) -> TimingPath {
    TimingPath {
        input: ArcStr::from(input),
        input_dir,
        output: ArcStr::from(output),
        output_dir,
    }
}

const INV_NETLIST: &str = "\
.subckt INVX1 A Y VDD VSS
M1 Y A VSS VSS nmos w=1u l=0.15u
M2 Y A VDD VDD pmos w=2u l=0.15u
.ends
";

fn inv_cells(extra: &str) -> String {
    format!(
        r#"{SETTINGS}
[cells.INVX1]
netlist = "invx1.sp"
inputs = ["A"]
outputs = ["Y"]
functions = ["Y = !A"]
area = 1.2
{extra}
"#
    )
}

#[test]
fn inverter_end_to_end() {
    let dir = workspace("inverter_end_to_end");
    std::fs::write(dir.join("invx1.sp"), INV_NETLIST).unwrap();
    let toml = inv_cells("data_slews = [0.1]\nloads = [0.01]");
    let library = characterize(&dir, &toml, 1, &[]);

    assert_eq!(
        library.attribute("time_unit").and_then(Value::as_str),
        Some("1ns")
    );
    assert_eq!(
        library
            .attribute("capacitive_load_unit")
            .map(Value::numbers),
        Some(vec![1.0])
    );

    let cell = library.sub_group("cell", Some("INVX1")).unwrap();
    assert_eq!(cell.attribute("area").and_then(Value::as_float), Some(1.2));

    let a = cell.sub_group("pin", Some("A")).unwrap();
    assert_eq!(a.attribute("direction").and_then(Value::as_str), Some("input"));
    assert_relative_eq!(
        a.attribute("capacitance").and_then(Value::as_float).unwrap(),
        5.0,
        max_relative = 1e-6
    );

    let y = cell.sub_group("pin", Some("Y")).unwrap();
    assert_eq!(y.attribute("function").and_then(Value::as_str), Some("!A"));
    let timings: Vec<&Group> = y.sub_groups().filter(|g| g.name() == "timing").collect();
    assert_eq!(timings.len(), 1);
    let timing = timings[0];
    assert_eq!(
        timing.attribute("related_pin").and_then(Value::as_str),
        Some("A")
    );
    assert_eq!(
        timing.attribute("timing_sense").and_then(Value::as_str),
        Some("negative_unate")
    );
    assert_eq!(timing.tables().count(), 4);
    for name in ["cell_rise", "cell_fall", "rise_transition", "fall_transition"] {
        let table = timing.tables().find(|t| t.name() == name).unwrap();
        let want = if name.ends_with("transition") { 0.05 } else { 0.1 };
        assert_relative_eq!(table.get(&[0.1, 0.01]).unwrap(), want, max_relative = 1e-9);
    }

    // Templates precede the cells at the library level.
    match library.items().next() {
        Some(GroupItem::Template(t)) => {
            assert_eq!(t.name().as_str(), "delay_template_invx1");
        }
        other => panic!("expected a leading template, found {other:?}"),
    }
}

#[test]
fn and_gate_is_positive_unate_with_masking() {
    let dir = workspace("and_gate");
    std::fs::write(
        dir.join("and2x1.sp"),
        ".subckt AND2X1 A B Y VDD VSS\nM1 Y A VSS VSS nmos\n.ends\n",
    )
    .unwrap();
    let toml = format!(
        r#"{SETTINGS}
[cells.AND2X1]
netlist = "and2x1.sp"
inputs = ["A", "B"]
outputs = ["Y"]
functions = ["Y = A & B"]
data_slews = [0.1]
loads = [0.01]
"#
    );

    let config = parse_config(&dir, &toml);
    let cell = Cell::build("AND2X1", &config.cell("AND2X1").unwrap(), &dir).unwrap();
    assert_eq!(cell.paths().len(), 8);
    // The A -> Y arc is sensitized only while B holds high.
    let open = cell.nonmasking_conditions(&path("A", Transition::Rise, "Y", Transition::Rise));
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].stable_inputs.get("B"), Some(&true));
    assert!(cell
        .nonmasking_conditions(&path("A", Transition::Rise, "Y", Transition::Fall))
        .is_empty());

    let library = characterize(&dir, &toml, 2, &[]);
    let y = library
        .sub_group("cell", Some("AND2X1"))
        .unwrap()
        .sub_group("pin", Some("Y"))
        .unwrap();
    let timings: Vec<&Group> = y.sub_groups().filter(|g| g.name() == "timing").collect();
    assert_eq!(timings.len(), 2);
    let mut related: Vec<&str> = timings
        .iter()
        .filter_map(|g| g.attribute("related_pin").and_then(Value::as_str))
        .collect();
    related.sort_unstable();
    assert_eq!(related, ["A", "B"]);
    for timing in timings {
        assert_eq!(
            timing.attribute("timing_sense").and_then(Value::as_str),
            Some("positive_unate")
        );
    }
}

#[test]
fn xor_gate_is_non_unate() {
    let dir = workspace("xor_gate");
    std::fs::write(
        dir.join("xor2x1.sp"),
        ".subckt XOR2X1 A B Y VDD VSS\nM1 Y A VSS VSS nmos\n.ends\n",
    )
    .unwrap();
    let toml = format!(
        r#"{SETTINGS}
[cells.XOR2X1]
netlist = "xor2x1.sp"
inputs = ["A", "B"]
outputs = ["Y"]
functions = ["Y = A ^ B"]
data_slews = [0.1]
loads = [0.01]
"#
    );

    let config = parse_config(&dir, &toml);
    let cell = Cell::build("XOR2X1", &config.cell("XOR2X1").unwrap(), &dir).unwrap();
    // Either direction of A can raise Y, depending on B.
    assert_eq!(
        cell.nonmasking_conditions(&path("A", Transition::Rise, "Y", Transition::Rise))
            .len(),
        1
    );
    assert_eq!(
        cell.nonmasking_conditions(&path("A", Transition::Fall, "Y", Transition::Rise))
            .len(),
        1
    );

    let library = characterize(&dir, &toml, 2, &[]);
    let y = library
        .sub_group("cell", Some("XOR2X1"))
        .unwrap()
        .sub_group("pin", Some("Y"))
        .unwrap();
    for timing in y.sub_groups().filter(|g| g.name() == "timing") {
        assert_eq!(
            timing.attribute("timing_sense").and_then(Value::as_str),
            Some("non_unate")
        );
    }
}

#[test]
fn flip_flop_constraints_converge_on_the_stub_window() {
    let dir = workspace("flip_flop");
    std::fs::write(
        dir.join("dffx1.sp"),
        ".subckt DFFX1 D CLK Q VDD VSS\nM1 Q D VSS VSS nmos\n.ends\n",
    )
    .unwrap();
    let toml = format!(
        r#"{SETTINGS}
[cells.DFFX1]
netlist = "dffx1.sp"
inputs = ["D"]
outputs = ["Q"]
functions = ["Q = D"]
clock = "posedge CLK"
state = ["QI = Q"]
data_slews = [0.1]
loads = [0.01]
clock_slews = [0.1]
setup_time_range = [0.001, 1.0]
hold_time_range = [0.001, 1.0]
"#
    );
    let library = characterize(&dir, &toml, 2, &[]);
    let cell = library.sub_group("cell", Some("DFFX1")).unwrap();

    let ff = cell.sub_group("ff", Some("QI")).unwrap();
    assert_eq!(ff.attribute("clocked_on").and_then(Value::as_str), Some("CLK"));
    assert_eq!(ff.attribute("next_state").and_then(Value::as_str), Some("D"));

    let d = cell.sub_group("pin", Some("D")).unwrap();
    let arc_of = |timing_type: &str| -> &Group {
        d.sub_groups()
            .find(|g| {
                g.name() == "timing"
                    && g.attribute("timing_type").and_then(Value::as_str) == Some(timing_type)
            })
            .unwrap()
    };
    // The stub latches iff setup >= 0.4 ns and hold >= 0.3 ns; the
    // characterized setup carries the 1.4 guard band.
    let setup = arc_of("setup_rising");
    assert_eq!(setup.attribute("related_pin").and_then(Value::as_str), Some("CLK"));
    for table in ["rise_constraint", "fall_constraint"] {
        let value = setup
            .tables()
            .find(|t| t.name() == table)
            .unwrap()
            .get(&[0.1, 0.1])
            .unwrap();
        assert!((value - 0.56).abs() < 0.01, "{table} = {value}");
    }
    let hold = arc_of("hold_rising");
    for table in ["rise_constraint", "fall_constraint"] {
        let value = hold
            .tables()
            .find(|t| t.name() == table)
            .unwrap()
            .get(&[0.1, 0.1])
            .unwrap();
        assert!((value - 0.3).abs() < 0.01, "{table} = {value}");
    }

    let q = cell.sub_group("pin", Some("Q")).unwrap();
    assert_eq!(q.attribute("function").and_then(Value::as_str), Some("QI"));
    let edge = q
        .sub_groups()
        .find(|g| {
            g.name() == "timing"
                && g.attribute("timing_type").and_then(Value::as_str) == Some("rising_edge")
        })
        .unwrap();
    assert_eq!(edge.attribute("related_pin").and_then(Value::as_str), Some("CLK"));
    let c2q = edge
        .tables()
        .find(|t| t.name() == "cell_rise")
        .unwrap()
        .get(&[0.1, 0.01])
        .unwrap();
    assert_relative_eq!(c2q, 0.12, max_relative = 1e-9);
    let c2q_tran = edge
        .tables()
        .find(|t| t.name() == "rise_transition")
        .unwrap()
        .get(&[0.1, 0.01])
        .unwrap();
    assert_relative_eq!(c2q_tran, 0.06, max_relative = 1e-9);
    assert!(edge.tables().any(|t| t.name() == "cell_fall"));
}

#[test]
fn a_second_state_alias_is_rejected() {
    let dir = workspace("two_state_aliases");
    std::fs::write(
        dir.join("dffrx1.sp"),
        ".subckt DFFRX1 D CLK Q QN VDD VSS\nM1 Q D VSS VSS nmos\n.ends\n",
    )
    .unwrap();
    let toml = format!(
        r#"{SETTINGS}
[cells.DFFRX1]
netlist = "dffrx1.sp"
inputs = ["D"]
outputs = ["Q", "QN"]
functions = ["Q = D", "QN = !D"]
clock = "posedge CLK"
state = ["QI = Q", "QIN = QN"]
data_slews = [0.1]
loads = [0.01]
clock_slews = [0.1]
setup_time_range = [0.001, 1.0]
hold_time_range = [0.001, 1.0]
"#
    );
    let config = parse_config(&dir, &toml);
    let (name, cell_config) = config.cells.first().unwrap();
    let err = Cell::build(name, cell_config, &dir).unwrap_err();
    assert!(matches!(err, crate::error::Error::Config(_)), "{err}");
    let message = err.to_string();
    assert!(message.contains("QI") && message.contains("QIN"), "{message}");
}

#[test]
fn bisection_resolves_to_the_trial_timestep() {
    let dir = workspace("bisection_resolution");
    std::fs::write(
        dir.join("dffx2.sp"),
        ".subckt DFFX2 D CLK Q VDD VSS\nM1 Q D VSS VSS nmos\n.ends\n",
    )
    .unwrap();
    // The clock slew is the finer of the two edges, so it sets both the
    // transient timestep and the termination step of the search. Stopping
    // at the coarser data-slew resolution would leave the reported setup
    // more than 1e-3 above the stub's 0.4 ns threshold.
    let toml = format!(
        r#"{SETTINGS}
[cells.DFFX2]
netlist = "dffx2.sp"
inputs = ["D"]
outputs = ["Q"]
functions = ["Q = D"]
clock = "posedge CLK"
state = ["QI = Q"]
data_slews = [0.1]
loads = [0.01]
clock_slews = [0.05]
setup_time_range = [0.001, 1.0]
hold_time_range = [0.001, 1.0]
"#
    );
    let library = characterize(&dir, &toml, 1, &[]);
    let d = library
        .sub_group("cell", Some("DFFX2"))
        .unwrap()
        .sub_group("pin", Some("D"))
        .unwrap();
    for (timing_type, want) in [("setup_rising", 1.4 * 0.4), ("hold_rising", 0.3)] {
        let timing = d
            .sub_groups()
            .find(|g| {
                g.name() == "timing"
                    && g.attribute("timing_type").and_then(Value::as_str) == Some(timing_type)
            })
            .unwrap();
        for table in timing.tables() {
            let value = table.get(&[0.05, 0.1]).unwrap();
            assert!(
                (value - want).abs() < 1e-3,
                "{timing_type} {} = {value}",
                table.name()
            );
        }
    }
}

#[test]
fn bidirectional_pins_keep_their_direction() {
    let dir = workspace("bidirectional_pins");
    std::fs::write(
        dir.join("bus1.sp"),
        ".subckt BUS1 A Z VDD VSS\nM1 Z A VSS VSS nmos\n.ends\n",
    )
    .unwrap();
    let toml = format!(
        r#"{SETTINGS}
[cells.BUS1]
netlist = "bus1.sp"
inputs = ["A"]
inouts = ["Z"]
functions = ["Z = A"]
data_slews = [0.1]
loads = [0.01]
"#
    );
    let library = characterize(&dir, &toml, 1, &[]);
    let cell = library.sub_group("cell", Some("BUS1")).unwrap();
    // The partial groups produced by the capacitance and delay tasks merge
    // over the base pin group; none of them may overwrite its direction.
    let z = cell.sub_group("pin", Some("Z")).unwrap();
    assert_eq!(z.attribute("direction").and_then(Value::as_str), Some("inout"));
    assert!(z.attribute("capacitance").is_some());
    assert!(z.sub_groups().any(|g| g.name() == "timing"));
    let a = cell.sub_group("pin", Some("A")).unwrap();
    assert_eq!(a.attribute("direction").and_then(Value::as_str), Some("input"));
}

#[test]
fn units_flow_into_tables_and_capacitance() {
    let dir = workspace("unit_coherence");
    std::fs::write(dir.join("invx1.sp"), INV_NETLIST).unwrap();
    let toml = r#"
[settings]
lib_name = "testlib"

[settings.units]
time = "ps"

[settings.named_nodes.primary_power]
name = "VDD"
voltage = 1.1

[settings.named_nodes.primary_ground]
name = "VSS"
voltage = 0.0

[cells.INVX1]
netlist = "invx1.sp"
inputs = ["A"]
outputs = ["Y"]
functions = ["Y = !A"]
data_slews = [100.0]
loads = [0.01]
"#;
    let library = characterize(&dir, toml, 1, &[]);
    assert_eq!(
        library.attribute("time_unit").and_then(Value::as_str),
        Some("1ps")
    );
    let cell = library.sub_group("cell", Some("INVX1")).unwrap();
    assert_relative_eq!(
        cell.sub_group("pin", Some("A"))
            .unwrap()
            .attribute("capacitance")
            .and_then(Value::as_float)
            .unwrap(),
        5.0,
        max_relative = 1e-6
    );
    let y = cell.sub_group("pin", Some("Y")).unwrap();
    let timing = y.sub_groups().find(|g| g.name() == "timing").unwrap();
    // 100 ps of stub propagation delay, expressed in picoseconds.
    let rise = timing.tables().find(|t| t.name() == "cell_rise").unwrap();
    assert_relative_eq!(rise.get(&[100.0, 0.01]).unwrap(), 100.0, max_relative = 1e-9);
    let tran = timing
        .tables()
        .find(|t| t.name() == "rise_transition")
        .unwrap();
    assert_relative_eq!(tran.get(&[100.0, 0.01]).unwrap(), 50.0, max_relative = 1e-9);
}

#[test]
fn filters_select_cells_and_their_templates() {
    let dir = workspace("filters");
    std::fs::write(dir.join("invx1.sp"), INV_NETLIST).unwrap();
    std::fs::write(
        dir.join("bufx1.sp"),
        ".subckt BUFX1 A Y VDD VSS\nM1 Y A VSS VSS nmos\n.ends\n",
    )
    .unwrap();
    let toml = format!(
        r#"{SETTINGS}
[cells.INVX1]
netlist = "invx1.sp"
inputs = ["A"]
outputs = ["Y"]
functions = ["Y = !A"]
data_slews = [0.1]
loads = [0.01]

[cells.BUFX1]
netlist = "bufx1.sp"
inputs = ["A"]
outputs = ["Y"]
functions = ["Y = A"]
data_slews = [0.1]
loads = [0.01]
"#
    );
    let filters = [Regex::new("^BUF").unwrap()];
    let library = characterize(&dir, &toml, 1, &filters);
    assert!(library.sub_group("cell", Some("BUFX1")).is_some());
    assert!(library.sub_group("cell", Some("INVX1")).is_none());
    let templates: Vec<&str> = library
        .items()
        .filter_map(|item| match item {
            GroupItem::Template(t) => Some(t.name().as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(templates, ["delay_template_bufx1"]);
}

#[test]
fn worker_count_does_not_change_the_library() {
    let dir = workspace("worker_equivalence");
    std::fs::write(dir.join("invx1.sp"), INV_NETLIST).unwrap();
    let toml = inv_cells("data_slews = [0.1, 0.5]\nloads = [0.01, 0.1]");
    let serial = characterize(&dir, &toml, 1, &[]);
    let parallel = characterize(&dir, &toml, 4, &[]);
    assert_eq!(serial.to_liberty_default(), parallel.to_liberty_default());
}
