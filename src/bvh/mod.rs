//! Bounding volume hierarchies.
//!
//! - [`BvhBuilder`] - generic SAH builder over any item type
//! - [`BvhNode`] / [`NodeKind`] - flat node model shared by both levels
//! - [`PackedBvhNode`] - fixed-size wire record

mod builder;
mod node;

pub use builder::*;
pub use node::*;
