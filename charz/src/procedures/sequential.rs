//! Coupled setup/hold characterization by binary search.
//!
//! A two-pass scheme around the metastable window. For each data pin and
//! transition direction:
//!
//! 1. a generous trial measures the output's stabilizing time, used as
//!    inter-phase quiet time in every later trial;
//! 2. with hold pinned at its maximum, setup is bisected down to the last
//!    passing value, then hold is bisected against that setup;
//! 3. the mirrored pass pins setup at its maximum and bisects hold first;
//! 4. the characterized point is the guard-banded midpoint of the two
//!    passes, at which the clock-to-output delay is measured per load.
//!
//! A trial zeroes the state with an initialization clock pulse capturing
//! the complement, waits out the quiet time, launches the data edge,
//! raises the capture edge `setup` later, and reverts the data `hold`
//! after the capture edge. The trial passes when the clock-to-output
//! measurement resolves.

use arcstr::ArcStr;
use indexmap::IndexMap;
use liberty::{Group, LookupTable, TableTemplate};
use spice::deck::{Analysis, Component, Event, Measurement, Source};
use spice::SimError;
use tracing::debug;

use crate::cell::{Direction, SequentialModel, Transition};
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::procedures::{harness, run_deck, CellUnderTest, Task, TaskCtx};
use crate::variation::{self, Variation};

/// The registry name of this procedure.
pub const NAME: &str = "metastability_binary_search_worst_case";

/// The guard band applied to the characterized setup midpoint.
const SETUP_GUARD: f64 = 1.4;

const C2Q: &str = "t_c2q";
const C2Q_TRAN: &str = "t_c2q_tran";
const STAB: &str = "t_stab_transit";

/// One task per (data pin, clock slew, data slew). Loads are swept inside
/// the task: the clock-to-output table's points all derive from one
/// bisection result.
pub fn tasks(cut: &CellUnderTest, _settings: &Settings) -> Result<Vec<Task>> {
    let Some(model) = &cut.cell.sequential else {
        return Ok(Vec::new());
    };
    let mut out = Vec::new();
    for data_pin in model.function.data_pins() {
        for variation in variation::sequential(&cut.cell.params) {
            let cut = cut.clone();
            let data_pin = data_pin.clone();
            let label = format!("{}_{variation}", data_pin.to_ascii_lowercase());
            out.push(Task::new(
                cut.cell.name.clone(),
                NAME,
                label.clone(),
                move |ctx| characterize(&cut, ctx, &label, &data_pin, &variation),
            ));
        }
    }
    Ok(out)
}

/// The constraint template over clock slew and data slew.
fn constraint_template(cut: &CellUnderTest) -> TableTemplate {
    TableTemplate::new_2d(
        arcstr::format!(
            "constraint_template_{}",
            cut.cell.name.to_ascii_lowercase()
        ),
        "related_pin_transition",
        cut.cell.params.clock_slews.clone(),
        "constrained_pin_transition",
        cut.cell.params.data_slews.clone(),
    )
}

/// The clock-to-output delay template over clock slew and load.
fn edge_delay_template(cut: &CellUnderTest) -> TableTemplate {
    TableTemplate::new_2d(
        arcstr::format!("edge_delay_template_{}", cut.cell.name.to_ascii_lowercase()),
        "input_net_transition",
        cut.cell.params.clock_slews.clone(),
        "total_output_net_capacitance",
        cut.cell.params.loads.clone(),
    )
}

struct Search<'a> {
    cut: &'a CellUnderTest,
    ctx: &'a TaskCtx,
    label: &'a str,
    model: &'a SequentialModel,
    data_pin: &'a ArcStr,
    dir: Transition,
    variation: &'a Variation,
    clock_slew: f64,
    /// The expected output transition when the capture succeeds.
    out_dir: Transition,
    /// Inter-phase quiet time in seconds.
    quiet: f64,
    /// Bisection resolution in library time units.
    step: f64,
    jobs: usize,
}

impl<'a> Search<'a> {
    fn new(
        cut: &'a CellUnderTest,
        ctx: &'a TaskCtx,
        label: &'a str,
        data_pin: &'a ArcStr,
        dir: Transition,
        variation: &'a Variation,
    ) -> Result<Self> {
        let model = cut
            .cell
            .sequential
            .as_ref()
            .ok_or_else(|| Error::Internal("sequential task on a combinational cell".into()))?;
        let clock_slew = variation
            .clock_slew
            .ok_or_else(|| Error::Internal("sequential variation without a clock slew".into()))?;

        let next = model.function.next_state()?;
        let conditions = model.function.data_conditions();
        let settled = dir == Transition::Rise;
        let assignment = |q: bool| -> IndexMap<ArcStr, bool> {
            next.operands()
                .iter()
                .map(|operand| {
                    let value = if operand == model.function.state() {
                        q
                    } else if operand == data_pin {
                        settled
                    } else if let Some(&level) = conditions.get(operand) {
                        level
                    } else if operand == &model.function.clock().name {
                        model.function.clock().active_level()
                    } else {
                        false
                    };
                    (operand.clone(), value)
                })
                .collect()
        };
        let mut q0 = None;
        for candidate in [false, true] {
            if next.expr().eval(&assignment(candidate))? != candidate {
                q0 = Some(candidate);
                break;
            }
        }
        let Some(q0) = q0 else {
            return Err(Error::Internal(format!(
                "{} edge on `{data_pin}` cannot flip the state",
                dir.label()
            )));
        };
        let out_dir = if q0 {
            Transition::Fall
        } else {
            Transition::Rise
        };

        let env = &cut.env;
        let tr_c = env.slew_seconds(clock_slew);
        let tr_d = env.slew_seconds(variation.data_slew);
        Ok(Self {
            cut,
            ctx,
            label,
            model,
            data_pin,
            dir,
            variation,
            clock_slew,
            out_dir,
            quiet: 10.0 * (tr_c + tr_d),
            // Terminate at the trial's transient timestep; any finer
            // distinction is below the simulation's own resolution.
            step: env.units.time.from_si(tr_c.min(tr_d) / 50.0),
            jobs: 0,
        })
    }

    /// One trial waveform, returning the parsed record.
    fn trial(
        &mut self,
        setup: f64,
        hold: f64,
        load: f64,
        calibrate: bool,
    ) -> Result<spice::SimRecord> {
        let env = &self.cut.env;
        let clock = self.model.function.clock().clone();
        let (vss, vdd) = (env.vss(), env.vdd());
        let tr_c = env.slew_seconds(self.clock_slew);
        let tr_d = env.slew_seconds(self.variation.data_slew);
        let setup_s = env.units.time.to_si(setup);
        let hold_s = env.units.time.to_si(hold);
        let eps = (tr_c.min(tr_d)) / 50.0;

        let t_pulse = 2.0 * tr_c;
        let t_pulse_end = t_pulse + 4.0 * tr_c + self.quiet;
        let t_d = t_pulse_end + tr_c + self.quiet;
        let t_d_mid = t_d + tr_d / 2.0;
        // The capture edge cannot start before the initialization pulse
        // has fully settled.
        let t_c = (t_d_mid + setup_s - tr_c / 2.0).max(t_pulse_end + tr_c + eps);
        let t_c_mid = t_c + tr_c / 2.0;
        let t_r = (t_c_mid + hold_s - tr_d / 2.0).max(t_d + tr_d + eps);
        let stop = t_r + tr_d + self.quiet + 10.0 * (tr_c + tr_d);

        let mut deck = harness::base_deck(
            self.cut,
            format!(
                "{} setup/hold trial {} {}",
                self.cut.cell.name,
                self.data_pin,
                self.dir.label()
            ),
        );

        let (v_inactive, v_active) = if clock.inverted {
            (vdd, vss)
        } else {
            (vss, vdd)
        };
        let clk_net = harness::net(&clock.name);
        deck.sources.push(Source::Vpwl {
            name: clk_net.clone(),
            pos: clk_net.clone(),
            neg: arcstr::literal!("0"),
            points: vec![
                (0.0, v_inactive),
                (t_pulse, v_inactive),
                (t_pulse + tr_c, v_active),
                (t_pulse_end, v_active),
                (t_pulse_end + tr_c, v_inactive),
                (t_c, v_inactive),
                (t_c + tr_c, v_active),
            ],
        });

        let (d0, d1) = match self.dir {
            Transition::Rise => (vss, vdd),
            Transition::Fall => (vdd, vss),
        };
        let data_net = harness::net(self.data_pin);
        deck.sources.push(Source::Vpwl {
            name: data_net.clone(),
            pos: data_net.clone(),
            neg: arcstr::literal!("0"),
            points: vec![
                (0.0, d0),
                (t_d, d0),
                (t_d + tr_d, d1),
                (t_r, d1),
                (t_r + tr_d, d0),
            ],
        });

        let conditions = self.model.function.data_conditions();
        for port in self.cut.cell.inputs() {
            if port.name == clock.name || port.name == *self.data_pin {
                continue;
            }
            let level = conditions
                .get(&port.name)
                .copied()
                .unwrap_or_else(|| self.cut.cell.resting_level(port));
            for pin in port.pins() {
                let pin_net = harness::net(&pin.name);
                deck.sources.push(Source::Vdc {
                    name: pin_net.clone(),
                    pos: pin_net,
                    neg: arcstr::literal!("0"),
                    value: if level ^ pin.inverting { vdd } else { vss },
                });
            }
        }

        let load_farads = env.units.capacitive_load.to_si(load);
        if let Some(port) = self.cut.cell.ports.get(&self.model.output) {
            for pin in port.pins() {
                let pin_net = harness::net(&pin.name);
                deck.components.push(Component::Capacitor {
                    name: arcstr::format!("l_{pin_net}"),
                    pos: pin_net,
                    neg: arcstr::literal!("0"),
                    value: load_farads,
                });
            }
        }

        let thresholds = env.thresholds;
        let out_net = harness::net(&self.model.output);
        let trig = if clock.inverted {
            Event::fall(clk_net, env.threshold(thresholds.falling)).last()
        } else {
            Event::rise(clk_net, env.threshold(thresholds.rising)).last()
        };
        let (targ, tran_trig, tran_targ, stab_trig, stab_targ) = match self.out_dir {
            Transition::Rise => (
                Event::rise(out_net.clone(), env.threshold(thresholds.rising)).last(),
                Event::rise(out_net.clone(), env.threshold(thresholds.low)).last(),
                Event::rise(out_net.clone(), env.threshold(thresholds.high)).last(),
                Event::rise(out_net.clone(), env.threshold(1.0)).last(),
                Event::rise(out_net.clone(), env.threshold(99.0)).last(),
            ),
            Transition::Fall => (
                Event::fall(out_net.clone(), env.threshold(thresholds.falling)).last(),
                Event::fall(out_net.clone(), env.threshold(thresholds.high)).last(),
                Event::fall(out_net.clone(), env.threshold(thresholds.low)).last(),
                Event::fall(out_net.clone(), env.threshold(99.0)).last(),
                Event::fall(out_net.clone(), env.threshold(1.0)).last(),
            ),
        };
        deck.measurements.push(Measurement {
            name: ArcStr::from(C2Q),
            trig,
            targ,
        });
        deck.measurements.push(Measurement {
            name: ArcStr::from(C2Q_TRAN),
            trig: tran_trig,
            targ: tran_targ,
        });
        if calibrate {
            deck.measurements.push(Measurement {
                name: ArcStr::from(STAB),
                trig: stab_trig,
                targ: stab_targ,
            });
        }
        deck.analyses.push(Analysis::Tran {
            step: tr_c.min(tr_d) / 50.0,
            stop,
        });
        if env.debug || !self.cut.cell.params.plots.is_empty() {
            deck.saves.push(harness::net(&clock.name));
            deck.saves.push(data_net);
            deck.saves.push(out_net);
        }

        self.jobs += 1;
        run_deck(
            self.cut,
            self.ctx,
            NAME,
            self.label,
            &format!("{}_job{}", self.dir.label(), self.jobs),
            &deck,
            self.variation.data_slew,
        )
    }

    /// Measures the stabilizing time at the most generous constraint
    /// point and adopts it as the quiet time.
    fn calibrate(&mut self, setup_hi: f64, hold_hi: f64) -> Result<()> {
        let record = self.trial(setup_hi, hold_hi, self.variation.load, true)?;
        let transit = record.measure(STAB).map_err(Error::Sim)?;
        if transit.is_finite() && transit > 0.0 {
            self.quiet = transit;
        }
        debug!(label = self.label, quiet = self.quiet, "calibrated quiet time");
        Ok(())
    }

    /// Whether a trial at the given constraint point latches correctly.
    fn passes(&mut self, setup: f64, hold: f64) -> Result<bool> {
        match self.trial(setup, hold, self.variation.load, false) {
            Ok(record) => Ok(record.try_measure(C2Q).is_some_and(f64::is_finite)),
            Err(Error::Sim(SimError::Failed(_)))
            | Err(Error::Sim(SimError::MeasurementMissing(_))) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Bisects one axis down to the last passing value. `pass` maps the
    /// probed value to a full constraint point.
    fn bisect(
        &mut self,
        mut lo: f64,
        mut hi: f64,
        point: impl Fn(f64) -> (f64, f64),
    ) -> Result<f64> {
        let (setup, hold) = point(hi);
        if !self.passes(setup, hold)? {
            return Err(Error::Internal(format!(
                "bisection cannot bracket a passing trial for `{}` ({})",
                self.data_pin,
                self.dir.label()
            )));
        }
        while hi - lo > self.step {
            let mid = 0.5 * (lo + hi);
            let (setup, hold) = point(mid);
            if self.passes(setup, hold)? {
                hi = mid;
            } else {
                lo = mid;
            }
        }
        Ok(hi)
    }
}

#[allow(clippy::too_many_lines)]
fn characterize(
    cut: &CellUnderTest,
    ctx: &TaskCtx,
    label: &str,
    data_pin: &ArcStr,
    variation: &Variation,
) -> Result<Group> {
    let model = cut
        .cell
        .sequential
        .as_ref()
        .ok_or_else(|| Error::Internal("sequential task on a combinational cell".into()))?;
    let params = &cut.cell.params;
    let (s_lo, s_hi) = params
        .setup_range
        .ok_or_else(|| Error::Internal("sequential cell without a setup range".into()))?;
    let (h_lo, h_hi) = params
        .hold_range
        .ok_or_else(|| Error::Internal("sequential cell without a hold range".into()))?;
    let clock = model.function.clock().clone();
    let clock_slew = variation
        .clock_slew
        .ok_or_else(|| Error::Internal("sequential variation without a clock slew".into()))?;

    let (setup_type, hold_type, edge_type) = if clock.inverted {
        ("setup_falling", "hold_falling", "falling_edge")
    } else {
        ("setup_rising", "hold_rising", "rising_edge")
    };
    let clk_tag = clock.name.to_ascii_lowercase();
    let mut setup_timing =
        Group::new("timing")?.with_tag(arcstr::format!("setup_{clk_tag}"));
    setup_timing.add_attribute("related_pin", clock.name.clone());
    setup_timing.add_attribute("timing_type", setup_type);
    let mut hold_timing = Group::new("timing")?.with_tag(arcstr::format!("hold_{clk_tag}"));
    hold_timing.add_attribute("related_pin", clock.name.clone());
    hold_timing.add_attribute("timing_type", hold_type);
    let mut edge_timing = Group::new("timing")?.with_tag(arcstr::format!("edge_{clk_tag}"));
    edge_timing.add_attribute("related_pin", clock.name.clone());
    edge_timing.add_attribute("timing_type", edge_type);
    let mut measured_delay = false;

    // The clock-to-output point belongs to exactly one bisection; the
    // widest data edge is the conservative owner.
    let worst_data_slew = params
        .data_slews
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);

    for dir in Transition::BOTH {
        let mut search = Search::new(cut, ctx, label, data_pin, dir, variation)?;
        search.calibrate(s_hi, h_hi)?;

        // Minimal-setup pass: pin hold high, shrink setup, then shrink
        // hold against that setup.
        let t_setup_min = search.bisect(s_lo, s_hi, |s| (s, h_hi))?;
        let t_hold_max = search.bisect(h_lo, h_hi, |h| (t_setup_min, h))?;
        // Minimal-hold pass, mirrored.
        let t_hold_min = search.bisect(h_lo, h_hi, |h| (s_hi, h))?;
        let t_setup_max = search.bisect(s_lo, s_hi, |s| (s, t_hold_min))?;

        let t_setup = SETUP_GUARD * (t_setup_min + t_setup_max) / 2.0;
        let t_hold = (t_hold_min + t_hold_max) / 2.0;
        debug!(
            label,
            dir = dir.label(),
            t_setup_min,
            t_setup_max,
            t_hold_min,
            t_hold_max,
            "bisection converged"
        );

        let (setup_table, hold_table) = match dir {
            Transition::Rise => ("rise_constraint", "rise_constraint"),
            Transition::Fall => ("fall_constraint", "fall_constraint"),
        };
        let template = constraint_template(cut);
        let index = [clock_slew, variation.data_slew];
        let mut setup_lut = LookupTable::new(setup_table, template.clone());
        setup_lut.set(&index, t_setup)?;
        setup_timing.add_item(setup_lut);
        let mut hold_lut = LookupTable::new(hold_table, template);
        hold_lut.set(&index, t_hold)?;
        hold_timing.add_item(hold_lut);

        if variation.data_slew == worst_data_slew {
            let (delay_table, tran_table) = match search.out_dir {
                Transition::Rise => ("cell_rise", "rise_transition"),
                Transition::Fall => ("cell_fall", "fall_transition"),
            };
            let template = edge_delay_template(cut);
            let mut delay = LookupTable::new(delay_table, template.clone());
            let mut transition = LookupTable::new(tran_table, template);
            for &load in &params.loads {
                let record = search.trial(t_setup, t_hold, load, false)?;
                let time = &cut.env.units.time;
                let c2q = time.from_si(record.measure(C2Q).map_err(Error::Sim)?);
                let tran = time.from_si(record.measure(C2Q_TRAN).map_err(Error::Sim)?);
                delay.set(&[clock_slew, load], c2q)?;
                transition.set(&[clock_slew, load], tran)?;
            }
            edge_timing.add_item(delay);
            edge_timing.add_item(transition);
            measured_delay = true;
        }
    }

    let port_direction = |name, fallback| {
        cut.cell
            .ports
            .get(name)
            .map_or(fallback, |p| p.direction)
            .attribute()
    };
    let mut data_pin_group = Group::with_identifier("pin", data_pin.clone())?;
    data_pin_group.add_attribute("direction", port_direction(data_pin, Direction::Input));
    data_pin_group.add_item(setup_timing);
    data_pin_group.add_item(hold_timing);

    let mut cell_group = Group::with_identifier("cell", cut.cell.name.clone())?;
    cell_group.add_group(data_pin_group);
    if measured_delay {
        let mut out_pin_group = Group::with_identifier("pin", model.output.clone())?;
        out_pin_group.add_attribute(
            "direction",
            port_direction(&model.output, Direction::Output),
        );
        out_pin_group.add_item(edge_timing);
        cell_group.add_group(out_pin_group);
    }
    Ok(cell_group)
}
