//! Typed query functions, one module per table.

pub mod history;
pub mod plans;
