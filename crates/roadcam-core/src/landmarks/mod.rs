//! Parametric world landmarks and their grouping.

mod group;
mod landmark;
mod store;

pub use group::*;
pub use landmark::*;
pub use store::*;
