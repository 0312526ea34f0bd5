//! Material expressions and their compiled form.
//!
//! A material is a small expression over BXDFs and blend operators:
//!
//! ```text
//! mix(diffuse(reflectance: "wood.png"), roughConductor(intIOR: "gold"), 0.3)
//! ```
//!
//! - [`parse_expr`] turns text into an [`Expr`]
//! - [`validate`] checks parameter ranges and the per-BXDF whitelist
//! - [`MaterialCompiler`] lowers expressions into a flat array of
//!   [`MaterialNode`] records plus a shared texture blob

mod ast;
mod compiler;
mod node;
mod parser;
mod resource;
mod texture;
mod validate;

pub use ast::*;
pub use compiler::MaterialCompiler;
pub use node::*;
pub use parser::parse_expr;
pub use resource::ResourceContext;
pub use texture::*;
pub use validate::{allowed_params, validate};
