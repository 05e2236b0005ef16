//! Stockwise
//!
//! Stockwise allocates a spend budget across stock-keeping units to maximise
//! total profit, solving a mixed-integer linear program over per-SKU unit counts.
//!
//! Records flow forward through a fixed pipeline: [`bounds`] derives each
//! record's unit domain, [`model`] formulates the program, [`solvers`] solves it
//! and [`reconcile`] checks and aggregates the result.

pub mod bounds;
pub mod budget;
pub mod config;
pub mod io;
pub mod model;
pub mod observability;
pub mod optimizer;
pub mod prelude;
pub mod reconcile;
pub mod records;
pub mod report;
pub mod solvers;
