//! Utility types and functions for the scene compiler.
//!
//! This module contains fundamental types used throughout the library:
//! - [`Error`] / [`Result`] - Error handling, including [`ValidationError`] and [`ParseError`]
//! - Math type re-exports from glam, [`BBox3f`] and [`Transform`]

mod error;
mod math;

pub use error::*;
pub use math::*;
