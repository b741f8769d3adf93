//! Sequential next-state expansion.
//!
//! Sequential cells are not modeled as stateful graph nodes. A feedback
//! alias turns the cell's data expression `E` into a next-state expression
//! over the alias `q`:
//!
//! ```text
//! next(q) = !R & ( P | (!G & q  |  G & (!C & q | C & E)) )
//! ```
//!
//! where C/G/P/R are the clock, enable, preset, and clear controls, each
//! substituted with its complement when the control is active-low. The
//! expansion is a plain [`Expr`], so truth tables and test vectors apply
//! unchanged, which is exactly what the setup/hold search needs.

use arcstr::ArcStr;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{Error, Expr, Function, Result};

/// A control port with a captured polarity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Control {
    /// The port name.
    pub name: ArcStr,
    /// True when the control is active-low (`negedge` / active-low level).
    pub inverted: bool,
}

impl Control {
    /// An active-high (posedge) control.
    pub fn active_high(name: impl Into<ArcStr>) -> Self {
        Self {
            name: name.into(),
            inverted: false,
        }
    }

    /// An active-low (negedge) control.
    pub fn active_low(name: impl Into<ArcStr>) -> Self {
        Self {
            name: name.into(),
            inverted: true,
        }
    }

    /// The expression that is true when this control is asserted.
    pub fn asserted(&self) -> Expr {
        let var = Expr::var(self.name.clone());
        if self.inverted {
            var.not()
        } else {
            var
        }
    }

    /// The pin level at which this control is asserted.
    pub fn active_level(&self) -> bool {
        !self.inverted
    }
}

/// A combinational data expression wrapped with sequential controls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateFunction {
    data: Expr,
    state: ArcStr,
    clock: Control,
    enable: Option<Control>,
    preset: Option<Control>,
    clear: Option<Control>,
}

impl StateFunction {
    /// Creates a state function over data expression `data` whose feedback
    /// alias is `state`.
    pub fn new(data: Expr, state: impl Into<ArcStr>, clock: Control) -> Self {
        Self {
            data,
            state: state.into(),
            clock,
            enable: None,
            preset: None,
            clear: None,
        }
    }

    /// Adds an enable control.
    pub fn with_enable(mut self, enable: Control) -> Self {
        self.enable = Some(enable);
        self
    }

    /// Adds an asynchronous preset control.
    pub fn with_preset(mut self, preset: Control) -> Self {
        self.preset = Some(preset);
        self
    }

    /// Adds an asynchronous clear control.
    pub fn with_clear(mut self, clear: Control) -> Self {
        self.clear = Some(clear);
        self
    }

    /// The data expression `E`.
    pub fn data(&self) -> &Expr {
        &self.data
    }

    /// The feedback alias name.
    pub fn state(&self) -> &ArcStr {
        &self.state
    }

    /// The clock control.
    pub fn clock(&self) -> &Control {
        &self.clock
    }

    /// The enable control, if any.
    pub fn enable(&self) -> Option<&Control> {
        self.enable.as_ref()
    }

    /// The preset control, if any.
    pub fn preset(&self) -> Option<&Control> {
        self.preset.as_ref()
    }

    /// The clear control, if any.
    pub fn clear(&self) -> Option<&Control> {
        self.clear.as_ref()
    }

    /// The expanded next-state expression as a plain function.
    pub fn next_state(&self) -> Result<Function> {
        let q = Expr::var(self.state.clone());
        let c = self.clock.asserted();
        // !C & q | C & E
        let mut expr = c
            .clone()
            .not()
            .and(q.clone())
            .or(c.and(self.data.clone()));
        if let Some(enable) = &self.enable {
            let g = enable.asserted();
            expr = g.clone().not().and(q).or(g.and(expr));
        }
        if let Some(preset) = &self.preset {
            expr = preset.asserted().or(expr);
        }
        if let Some(clear) = &self.clear {
            expr = clear.asserted().not().and(expr);
        }
        Function::from_expr(expr)
    }

    /// Evaluates the next state under the given pin assignment. The
    /// assignment must bind the feedback alias to the present state.
    pub fn eval(&self, assignment: &IndexMap<ArcStr, bool>) -> Result<bool> {
        self.next_state()?.expr().eval(assignment)
    }

    /// The data operands of `E`, excluding the feedback alias and controls.
    pub fn data_pins(&self) -> Vec<ArcStr> {
        let mut operands = Vec::new();
        self.data.collect_operands(&mut operands);
        operands.retain(|name| {
            name != &self.state
                && name != &self.clock.name
                && self.enable.as_ref().is_none_or(|c| name != &c.name)
                && self.preset.as_ref().is_none_or(|c| name != &c.name)
                && self.clear.as_ref().is_none_or(|c| name != &c.name)
        });
        operands.sort();
        operands
    }

    /// The stable levels that open the data path for setup/hold trials:
    /// enable asserted, preset and clear deasserted. The clock is driven
    /// by the trial waveform and is not included.
    pub fn data_conditions(&self) -> IndexMap<ArcStr, bool> {
        let mut out = IndexMap::new();
        if let Some(enable) = &self.enable {
            out.insert(enable.name.clone(), enable.active_level());
        }
        if let Some(preset) = &self.preset {
            out.insert(preset.name.clone(), !preset.active_level());
        }
        if let Some(clear) = &self.clear {
            out.insert(clear.name.clone(), !clear.active_level());
        }
        out
    }

    /// Conditions for recovery/removal trials against the given control:
    /// as [`StateFunction::data_conditions`], but with the other
    /// asynchronous control deasserted and this one exercised.
    pub fn recovery_conditions(&self, control: &Control) -> Result<IndexMap<ArcStr, bool>> {
        let known = self
            .preset
            .as_ref()
            .map(|c| &c.name)
            .into_iter()
            .chain(self.clear.as_ref().map(|c| &c.name))
            .any(|name| name == &control.name);
        if !known {
            return Err(Error::UnknownOperand(control.name.clone()));
        }
        let mut out = self.data_conditions();
        out.shift_remove(&control.name);
        Ok(out)
    }
}
