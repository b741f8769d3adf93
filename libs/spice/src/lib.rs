//! SPICE-level interfaces for cell characterization.
//!
//! This crate carries everything between a cell model and a concrete
//! simulator backend: locating a cell's `.subckt` definition and its
//! authoritative port order ([`netlist`]), the simulator-neutral deck
//! model with its validation rules ([`deck`]), the simulator execution
//! contract ([`sim`]), and subprocess execution with timeout and
//! cancellation ([`exec`]).
//!
//! Backends (ngspice, Xyce) depend on this crate and render [`deck::Deck`]
//! into their own dialect; nothing here shells out to a simulator except
//! through [`exec`].
#![warn(missing_docs)]

pub mod deck;
pub mod error;
pub mod exec;
pub mod netlist;
pub mod sim;


pub use deck::Deck;
pub use error::{DeckError, NetlistError, PortWiringError, SimError};
pub use netlist::Subckt;
pub use sim::{SimContext, SimRecord, Simulator};
