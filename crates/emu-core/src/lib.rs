//! Core traits and types for line-level peripheral emulation.
//!
//! Everything happens on discrete line transitions. A device's state is
//! fully determined by the sequence of line writes it has seen; between
//! writes it can be inspected at will.

mod observable;

pub use observable::{Observable, Value};
