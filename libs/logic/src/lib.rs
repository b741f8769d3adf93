//! Boolean function model for standard-cell characterization.
//!
//! A cell's logical function is a declared input: a closed Boolean
//! expression over named operands using `~`/`!`, `&`, `^`, `~^`, `|`, and
//! parentheses. From the parsed expression this crate derives the views
//! characterization needs: the sorted operand list, the full truth table,
//! and the set of single-bit-delta test vectors that sensitize each
//! input-to-output transition. Sequential behavior is modeled by expanding
//! a combinational data expression with clock/enable/preset/clear controls
//! into a next-state expression ([`state::StateFunction`]), so the same
//! truth-table machinery applies to sequential cells.
#![warn(missing_docs)]

use std::fmt;

use arcstr::ArcStr;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub mod parse;
pub mod state;

#[cfg(test)]
mod tests;

pub use state::{Control, StateFunction};

/// The result type returned by logic library functions.
pub type Result<T> = std::result::Result<T, Error>;

/// Possible function-model errors.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// An unparseable Boolean expression.
    #[error("error parsing boolean expression `{expr}`: {message}")]
    Parse {
        /// The offending source text.
        expr: String,
        /// What went wrong.
        message: String,
    },
    /// An operand not present in an evaluation assignment.
    #[error("unknown operand `{0}`")]
    UnknownOperand(ArcStr),
    /// A function over more operands than truth-table enumeration supports.
    #[error("function has {0} operands; at most 16 are supported")]
    TooManyOperands(usize),
    /// A state alias whose target is not an output of the cell.
    #[error("state alias `{alias}` targets `{target}`, which is not an output")]
    StateAlias {
        /// The internal feedback name.
        alias: ArcStr,
        /// The non-output it points at.
        target: ArcStr,
    },
}

/// A parsed Boolean expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Expr {
    /// A named operand.
    Var(ArcStr),
    /// Logical negation.
    Not(Box<Expr>),
    /// Logical conjunction.
    And(Box<Expr>, Box<Expr>),
    /// Logical disjunction.
    Or(Box<Expr>, Box<Expr>),
    /// Exclusive or.
    Xor(Box<Expr>, Box<Expr>),
    /// Negated exclusive or.
    Xnor(Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Creates an operand reference.
    pub fn var(name: impl Into<ArcStr>) -> Self {
        Self::Var(name.into())
    }

    /// Negates this expression.
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Self::Not(Box::new(self))
    }

    /// Conjoins this expression with `other`.
    pub fn and(self, other: Expr) -> Self {
        Self::And(Box::new(self), Box::new(other))
    }

    /// Disjoins this expression with `other`.
    pub fn or(self, other: Expr) -> Self {
        Self::Or(Box::new(self), Box::new(other))
    }

    /// Exclusive-ors this expression with `other`.
    pub fn xor(self, other: Expr) -> Self {
        Self::Xor(Box::new(self), Box::new(other))
    }

    /// Evaluates the expression under the given assignment.
    pub fn eval(&self, assignment: &IndexMap<ArcStr, bool>) -> Result<bool> {
        Ok(match self {
            Self::Var(name) => *assignment
                .get(name)
                .ok_or_else(|| Error::UnknownOperand(name.clone()))?,
            Self::Not(e) => !e.eval(assignment)?,
            Self::And(a, b) => a.eval(assignment)? && b.eval(assignment)?,
            Self::Or(a, b) => a.eval(assignment)? || b.eval(assignment)?,
            Self::Xor(a, b) => a.eval(assignment)? != b.eval(assignment)?,
            Self::Xnor(a, b) => a.eval(assignment)? == b.eval(assignment)?,
        })
    }

    /// Collects every operand name referenced by this expression.
    pub fn collect_operands(&self, out: &mut Vec<ArcStr>) {
        match self {
            Self::Var(name) => {
                if !out.contains(name) {
                    out.push(name.clone());
                }
            }
            Self::Not(e) => e.collect_operands(out),
            Self::And(a, b) | Self::Or(a, b) | Self::Xor(a, b) | Self::Xnor(a, b) => {
                a.collect_operands(out);
                b.collect_operands(out);
            }
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Self::Var(_) | Self::Not(_) => 3,
            Self::And(..) => 2,
            Self::Xor(..) | Self::Xnor(..) => 1,
            Self::Or(..) => 0,
        }
    }

    fn fmt_child(&self, child: &Expr, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if child.precedence() < self.precedence() {
            write!(f, "({child})")
        } else {
            write!(f, "{child}")
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Var(name) => write!(f, "{name}"),
            Self::Not(e) => match e.as_ref() {
                Expr::Var(name) => write!(f, "!{name}"),
                e => write!(f, "!({e})"),
            },
            Self::And(a, b) => {
                self.fmt_child(a, f)?;
                write!(f, "&")?;
                self.fmt_child(b, f)
            }
            Self::Or(a, b) => {
                self.fmt_child(a, f)?;
                write!(f, "|")?;
                self.fmt_child(b, f)
            }
            Self::Xor(a, b) => {
                self.fmt_child(a, f)?;
                write!(f, "^")?;
                self.fmt_child(b, f)
            }
            Self::Xnor(a, b) => {
                self.fmt_child(a, f)?;
                write!(f, "~^")?;
                self.fmt_child(b, f)
            }
        }
    }
}

/// The state of one pin within a test vector.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PinState {
    /// Stable low.
    L,
    /// Stable high.
    H,
    /// A low-to-high transition.
    Rise,
    /// A high-to-low transition.
    Fall,
}

impl PinState {
    /// True for `Rise` and `Fall`.
    pub fn is_transition(&self) -> bool {
        matches!(self, Self::Rise | Self::Fall)
    }

    /// The stable level before the transition (or the level itself).
    pub fn initial(&self) -> bool {
        matches!(self, Self::H | Self::Fall)
    }

    /// The stable level after the transition (or the level itself).
    pub fn settled(&self) -> bool {
        matches!(self, Self::H | Self::Rise)
    }

    /// The opposite-direction state.
    pub fn mirrored(&self) -> Self {
        match self {
            Self::L => Self::L,
            Self::H => Self::H,
            Self::Rise => Self::Fall,
            Self::Fall => Self::Rise,
        }
    }
}

impl fmt::Display for PinState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::L => write!(f, "0"),
            Self::H => write!(f, "1"),
            Self::Rise => write!(f, "01"),
            Self::Fall => write!(f, "10"),
        }
    }
}

/// One single-bit-delta stimulus: per-pin states aligned to
/// `operands ++ [output]`, with exactly one transition on each side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestVector {
    /// Pin states, one per operand plus one for the output.
    pub entries: Vec<PinState>,
}

impl TestVector {
    /// The input-side entries.
    pub fn inputs(&self) -> &[PinState] {
        &self.entries[..self.entries.len() - 1]
    }

    /// The output-side entry.
    pub fn output(&self) -> PinState {
        *self.entries.last().unwrap()
    }

    /// The index of the transitioning input.
    pub fn target_input(&self) -> usize {
        self.inputs()
            .iter()
            .position(PinState::is_transition)
            .unwrap()
    }
}

impl fmt::Display for TestVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for entry in &self.entries {
            if !first {
                write!(f, " ")?;
            }
            write!(f, "{entry}")?;
            first = false;
        }
        Ok(())
    }
}

/// An immutable parsed Boolean function with its derived views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    expr: Expr,
    operands: Vec<ArcStr>,
}

impl Function {
    /// Parses a function from expression source text.
    pub fn parse(source: &str) -> Result<Self> {
        Self::from_expr(parse::parse_expr(source)?)
    }

    /// Wraps an already-built expression.
    pub fn from_expr(expr: Expr) -> Result<Self> {
        let mut operands = Vec::new();
        expr.collect_operands(&mut operands);
        operands.sort();
        if operands.len() > 16 {
            return Err(Error::TooManyOperands(operands.len()));
        }
        Ok(Self { expr, operands })
    }

    /// The underlying expression.
    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Sorted, deduplicated operand names.
    pub fn operands(&self) -> &[ArcStr] {
        &self.operands
    }

    /// Evaluates the function with values aligned to [`Function::operands`].
    pub fn eval(&self, values: &[bool]) -> bool {
        let assignment: IndexMap<ArcStr, bool> = self
            .operands
            .iter()
            .cloned()
            .zip(values.iter().copied())
            .collect();
        // Every operand is bound by construction.
        self.expr.eval(&assignment).expect("operands are bound")
    }

    fn row_values(&self, row: usize) -> Vec<bool> {
        let n = self.operands.len();
        (0..n).map(|k| (row >> (n - 1 - k)) & 1 == 1).collect()
    }

    /// The full truth table: `2^n` rows of (operand values, result), with
    /// operand 0 as the most significant bit of the row counter.
    pub fn truth_table(&self) -> Vec<(Vec<bool>, bool)> {
        (0..1usize << self.operands.len())
            .map(|row| {
                let values = self.row_values(row);
                let result = self.eval(&values);
                (values, result)
            })
            .collect()
    }

    /// Every single-bit-delta adjacency in the truth table whose outputs
    /// differ, emitted twice: once with the input rising and once falling.
    ///
    /// Order is deterministic: rows ascending, transitioning operand
    /// ascending, rising form before its falling mirror.
    pub fn test_vectors(&self) -> Vec<TestVector> {
        let table = self.truth_table();
        let n = self.operands.len();
        let mut out = Vec::new();
        for row in 0..table.len() {
            for k in 0..n {
                let mask = 1usize << (n - 1 - k);
                if row & mask != 0 {
                    continue;
                }
                let neighbor = row | mask;
                let (low_in, low_out) = &table[row];
                let (_, high_out) = &table[neighbor];
                if low_out == high_out {
                    continue;
                }
                let mut entries: Vec<PinState> = low_in
                    .iter()
                    .map(|&v| if v { PinState::H } else { PinState::L })
                    .collect();
                entries[k] = PinState::Rise;
                entries.push(if *high_out { PinState::Rise } else { PinState::Fall });
                let rising = TestVector { entries };
                let falling = TestVector {
                    entries: rising.entries.iter().map(PinState::mirrored).collect(),
                };
                out.push(rising);
                out.push(falling);
            }
        }
        out
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expr)
    }
}
