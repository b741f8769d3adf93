//! Worst-case combinational delay characterization.
//!
//! For each (input, output, output direction) arc, every non-masking
//! condition is simulated at every variation point; the condition with the
//! largest propagation delay wins, and its propagation and transition
//! values populate the arc's delay and transition tables.

use arcstr::ArcStr;
use liberty::{Group, LookupTable, TableTemplate};
use logic::PinState;
use spice::deck::{Analysis, Event, Measurement};
use tracing::debug;

use crate::cell::{Cell, Direction, PinStateMap, TimingPath, TimingSense, Transition};
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::procedures::{harness, run_deck, CellUnderTest, Task, TaskCtx};
use crate::variation::{self, Variation};

/// The registry name of this procedure.
pub const NAME: &str = "combinational_worst_case";

/// One timing arc: all conditions sensitizing `input -> output` with the
/// given output direction, across both input directions.
#[derive(Debug, Clone)]
struct Arc {
    input: ArcStr,
    output: ArcStr,
    output_dir: Transition,
    sense: TimingSense,
    conditions: Vec<PinStateMap>,
}

fn arcs(cell: &Cell) -> Vec<Arc> {
    let mut out = Vec::new();
    for input in cell.inputs() {
        for output in cell.outputs() {
            if input.name == output.name {
                continue;
            }
            let Some(sense) = cell.timing_sense(&input.name, &output.name) else {
                continue;
            };
            for output_dir in Transition::BOTH {
                let mut conditions = Vec::new();
                for input_dir in Transition::BOTH {
                    conditions.extend(cell.nonmasking_conditions(&TimingPath {
                        input: input.name.clone(),
                        input_dir,
                        output: output.name.clone(),
                        output_dir,
                    }));
                }
                if !conditions.is_empty() {
                    out.push(Arc {
                        input: input.name.clone(),
                        output: output.name.clone(),
                        output_dir,
                        sense,
                        conditions,
                    });
                }
            }
        }
    }
    out
}

/// The cell's 2-D delay template over input slew and output load.
pub(crate) fn delay_template(cut: &CellUnderTest) -> TableTemplate {
    TableTemplate::new_2d(
        arcstr::format!("delay_template_{}", cut.cell.name.to_ascii_lowercase()),
        "input_net_transition",
        cut.cell.params.data_slews.clone(),
        "total_output_net_capacitance",
        cut.cell.params.loads.clone(),
    )
}

/// One task per (arc, variation).
pub fn tasks(cut: &CellUnderTest, _settings: &Settings) -> Result<Vec<Task>> {
    let mut out = Vec::new();
    for arc in arcs(&cut.cell) {
        for variation in variation::combinational(&cut.cell.params) {
            let cut = cut.clone();
            let arc = arc.clone();
            let label = format!(
                "{}_to_{}_{}_{variation}",
                arc.input.to_ascii_lowercase(),
                arc.output.to_ascii_lowercase(),
                arc.output_dir.label(),
            );
            out.push(Task::new(
                cut.cell.name.clone(),
                NAME,
                label.clone(),
                move |ctx| characterize(&cut, ctx, &label, &arc, &variation),
            ));
        }
    }
    Ok(out)
}

fn measurement_names(arc: &Arc) -> (ArcStr, ArcStr) {
    let input = arc.input.to_ascii_lowercase();
    let output = arc.output.to_ascii_lowercase();
    (
        arcstr::format!("t_{input}_to_{output}_prop"),
        arcstr::format!("t_{input}_to_{output}_tran"),
    )
}

fn build_deck(
    cut: &CellUnderTest,
    arc: &Arc,
    condition: &PinStateMap,
    variation: &Variation,
) -> spice::Deck {
    let env = &cut.env;
    let transit = env.slew_seconds(variation.data_slew);
    let t_edge = 2.0 * transit;
    let stop = t_edge + 101.0 * transit;
    let step = transit / 50.0;
    let load_farads = env.units.capacitive_load.to_si(variation.load);

    let mut deck = harness::base_deck(
        cut,
        format!(
            "{} {} -> {} {}",
            cut.cell.name,
            arc.input,
            arc.output,
            arc.output_dir.label()
        ),
    );
    harness::apply_states(&mut deck, cut, condition, t_edge, transit, load_farads);
    deck.analyses.push(Analysis::Tran { step, stop });

    let in_net = harness::net(&arc.input);
    let out_net = harness::net(&arc.output);
    let thresholds = env.thresholds;
    let (prop_name, tran_name) = measurement_names(arc);
    let trig = match condition.input_state {
        PinState::Fall => Event::fall(in_net.clone(), env.threshold(thresholds.falling)),
        _ => Event::rise(in_net.clone(), env.threshold(thresholds.rising)),
    };
    let (targ, tran_trig, tran_targ) = match arc.output_dir {
        Transition::Rise => (
            Event::rise(out_net.clone(), env.threshold(thresholds.rising)).last(),
            Event::rise(out_net.clone(), env.threshold(thresholds.low)).last(),
            Event::rise(out_net.clone(), env.threshold(thresholds.high)).last(),
        ),
        Transition::Fall => (
            Event::fall(out_net.clone(), env.threshold(thresholds.falling)).last(),
            Event::fall(out_net.clone(), env.threshold(thresholds.high)).last(),
            Event::fall(out_net.clone(), env.threshold(thresholds.low)).last(),
        ),
    };
    deck.measurements.push(Measurement {
        name: prop_name,
        trig,
        targ,
    });
    deck.measurements.push(Measurement {
        name: tran_name,
        trig: tran_trig,
        targ: tran_targ,
    });
    if cut.env.debug || !cut.cell.params.plots.is_empty() {
        deck.saves.push(in_net);
        deck.saves.push(out_net);
        for plot in &cut.cell.params.plots {
            let plot_net = harness::net(plot);
            if !deck.saves.contains(&plot_net) {
                deck.saves.push(plot_net);
            }
        }
    }
    deck
}

fn characterize(
    cut: &CellUnderTest,
    ctx: &TaskCtx,
    label: &str,
    arc: &Arc,
    variation: &Variation,
) -> Result<Group> {
    let (prop_name, tran_name) = measurement_names(arc);
    let mut worst: Option<(f64, f64)> = None;
    for (i, condition) in arc.conditions.iter().enumerate() {
        let deck = build_deck(cut, arc, condition, variation);
        let record = run_deck(
            cut,
            ctx,
            NAME,
            label,
            &format!("cond{i}"),
            &deck,
            variation.data_slew,
        )?;
        let prop = record.measure(&prop_name)?;
        let tran = record.measure(&tran_name)?;
        if worst.is_none_or(|(p, _)| prop > p) {
            worst = Some((prop, tran));
        }
    }
    let (prop, tran) = worst.ok_or_else(|| {
        Error::Internal(format!("arc {label} has no conditions"))
    })?;
    let time = &cut.env.units.time;
    let (prop, tran) = (time.from_si(prop), time.from_si(tran));
    debug!(cell = %cut.cell.name, arc = label, prop, tran, "folded worst case");

    let template = delay_template(cut);
    let index = [variation.data_slew, variation.load];
    let (delay_table, tran_table) = match arc.output_dir {
        Transition::Rise => ("cell_rise", "rise_transition"),
        Transition::Fall => ("cell_fall", "fall_transition"),
    };
    let mut delay = LookupTable::new(delay_table, template.clone());
    delay.set(&index, prop)?;
    let mut transition = LookupTable::new(tran_table, template);
    transition.set(&index, tran)?;

    let mut timing = Group::new("timing")?
        .with_tag(arcstr::format!("related_{}", arc.input.to_ascii_lowercase()));
    timing.add_attribute("related_pin", arc.input.clone());
    timing.add_attribute("timing_sense", arc.sense.attribute());
    timing.add_item(delay);
    timing.add_item(transition);

    let mut pin_group = Group::with_identifier("pin", arc.output.clone())?;
    let direction = cut
        .cell
        .ports
        .get(&arc.output)
        .map_or(Direction::Output, |p| p.direction);
    pin_group.add_attribute("direction", direction.attribute());
    if let Some(function) = cut.cell.functions.get(&arc.output) {
        pin_group.add_attribute("function", function.to_string().as_str());
    }
    pin_group.add_item(timing);

    let mut cell_group = Group::with_identifier("cell", cut.cell.name.clone())?;
    cell_group.add_group(pin_group);
    Ok(cell_group)
}
