//! SI-prefixed unit strings.
//!
//! Configuration files specify units as strings like `"ns"`, `"fF"`, or
//! `"1.5pF"`. These parse into an exact magnitude, an SI prefix, and a base
//! unit, and display back to the same string. The scale factor converts
//! measured SI base-unit values into library units.

use std::fmt;
use std::str::FromStr;

use arcstr::ArcStr;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// An SI prefix, atto through tera.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SiPrefix {
    /// 10^-18
    Atto,
    /// 10^-15
    Femto,
    /// 10^-12
    Pico,
    /// 10^-9
    Nano,
    /// 10^-6
    Micro,
    /// 10^-3
    Milli,
    /// 10^0
    #[default]
    None,
    /// 10^3
    Kilo,
    /// 10^6
    Mega,
    /// 10^9
    Giga,
    /// 10^12
    Tera,
}

impl SiPrefix {
    /// The decimal exponent of this prefix.
    pub fn exponent(&self) -> i32 {
        match self {
            Self::Atto => -18,
            Self::Femto => -15,
            Self::Pico => -12,
            Self::Nano => -9,
            Self::Micro => -6,
            Self::Milli => -3,
            Self::None => 0,
            Self::Kilo => 3,
            Self::Mega => 6,
            Self::Giga => 9,
            Self::Tera => 12,
        }
    }

    /// The prefix symbol. Micro is written `u`.
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Atto => "a",
            Self::Femto => "f",
            Self::Pico => "p",
            Self::Nano => "n",
            Self::Micro => "u",
            Self::Milli => "m",
            Self::None => "",
            Self::Kilo => "k",
            Self::Mega => "M",
            Self::Giga => "G",
            Self::Tera => "T",
        }
    }

    /// Maps a symbol character to its prefix. `m` and `M` are the only
    /// case-sensitive pair.
    pub fn from_symbol(c: char) -> Option<Self> {
        Some(match c {
            'a' => Self::Atto,
            'f' => Self::Femto,
            'p' => Self::Pico,
            'n' => Self::Nano,
            'u' => Self::Micro,
            'm' => Self::Milli,
            'k' | 'K' => Self::Kilo,
            'M' => Self::Mega,
            'G' | 'g' => Self::Giga,
            'T' => Self::Tera,
            _ => return None,
        })
    }
}

/// An SI-prefixed quantity: optional magnitude, prefix, base unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiValue {
    /// The explicit magnitude, `None` for plain unit strings like `"ns"`.
    pub magnitude: Option<Decimal>,
    /// The SI prefix.
    pub prefix: SiPrefix,
    /// The base unit, e.g. `s`, `V`, `F`, `ohm`.
    pub unit: ArcStr,
}

impl SiValue {
    /// A quantity of one with no prefix.
    pub fn bare(unit: impl Into<ArcStr>) -> Self {
        Self {
            magnitude: None,
            prefix: SiPrefix::None,
            unit: unit.into(),
        }
    }

    /// The multiplier this quantity represents relative to the base unit,
    /// e.g. `1.5pF` scales by `1.5e-12`.
    pub fn scale(&self) -> f64 {
        let magnitude = self
            .magnitude
            .as_ref()
            .and_then(Decimal::to_f64)
            .unwrap_or(1.0);
        magnitude * 10f64.powi(self.prefix.exponent())
    }

    /// Converts a value expressed in SI base units into this unit.
    pub fn from_si(&self, value: f64) -> f64 {
        value / self.scale()
    }

    /// Converts a value expressed in this unit into SI base units.
    pub fn to_si(&self, value: f64) -> f64 {
        value * self.scale()
    }

    /// True when the base units match, compared case-insensitively except
    /// for the `m`/`M` ambiguity (which never occurs in base units).
    pub fn same_unit(&self, other: &SiValue) -> bool {
        self.unit.eq_ignore_ascii_case(&other.unit)
    }
}

impl FromStr for SiValue {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let split = s
            .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-' || c == '+'))
            .unwrap_or(s.len());
        let (number, rest) = s.split_at(split);
        let magnitude = if number.is_empty() {
            None
        } else {
            Some(
                Decimal::from_str(number)
                    .map_err(|_| Error::InvalidUnit(ArcStr::from(s)))?,
            )
        };
        if rest.is_empty() || !rest.chars().all(char::is_alphanumeric) {
            return Err(Error::InvalidUnit(ArcStr::from(s)));
        }
        // A leading prefix symbol counts only if a base unit follows it:
        // `ns` is nano-seconds but `F` is plain farads.
        let mut chars = rest.chars();
        let first = chars.next().unwrap();
        let tail = chars.as_str();
        let (prefix, unit) = match SiPrefix::from_symbol(first) {
            Some(prefix) if !tail.is_empty() => (prefix, tail),
            _ => (SiPrefix::None, rest),
        };
        Ok(Self {
            magnitude,
            prefix,
            unit: ArcStr::from(unit),
        })
    }
}

impl fmt::Display for SiValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(magnitude) = &self.magnitude {
            write!(f, "{magnitude}")?;
        }
        write!(f, "{}{}", self.prefix.symbol(), self.unit)
    }
}
