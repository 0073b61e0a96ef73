//! Operator-facing adapters: consent gates and run reporting.

pub mod consent;
pub mod console;
pub mod report;
