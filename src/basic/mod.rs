pub(crate) mod dsbus_dv;
pub(crate) mod sparse;

pub mod admittance;
pub mod bus_types;
pub mod diagnostics;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod formulation;
pub mod hvdc;
pub mod injections;
pub mod methods;
pub mod options;
pub mod post_processing;
pub mod qlimits;
pub mod snapshot;
pub mod solver;
pub mod topology;

pub use engine::{solve, solve_with_guess, solve_with_override};
