//! Reading, checking and evaluating PEtab parameter estimation problems
//!
//! A PEtab problem describes how a dynamical model is fitted to data through
//! a set of tables: conditions, observables, measurements, parameters and
//! optionally mappings and experiments. This crate reads and writes these
//! tables ([data]), resolves which estimated parameter drives which model
//! parameter in every simulation condition ([parameter_mapping]), computes
//! residuals and likelihoods of simulated data ([calculate]), samples from
//! parameter priors ([priors]) and checks whole problems for consistency
//! ([problem::lint]).
//!
//! # Example
//!
//! ```rust
//! use petab::prelude::*;
//!
//! let model = SimpleModel::new("m").with_parameter("k1", 0.1).with_species("A", 1.0);
//! let mut problem = Problem::default().with_model(model);
//! problem.add_observable("obs_a", "A", Some("0.1")).unwrap();
//! problem.add_measurement(Measurement::new("obs_a", "c0", 1.0, 0.5));
//! problem.add_parameter(Parameter::new("k1").with_bounds(0.01, 1.0));
//! problem.condition_table = ConditionTable::new(vec![Condition::new("c0")]);
//!
//! let mappings = problem
//!     .get_optimization_to_simulation_parameter_mapping(&MappingOptions::default())
//!     .unwrap();
//! assert_eq!(mappings[0].map_sim["k1"], ParameterValue::from("k1"));
//! ```
pub mod calculate;
pub mod cli;
pub mod data;
pub mod error;
pub mod logger;
pub mod math;
pub mod model;
pub mod parameter_mapping;
pub mod priors;
pub mod problem;
pub mod settings;
pub mod simulate;

pub use error::PetabError;

pub mod prelude {
    pub use crate::calculate::{calculate_chi2, calculate_llh, calculate_residuals};
    pub use crate::data::*;
    pub use crate::math::{parse, Expr};
    pub use crate::model::{Model, SimpleModel};
    pub use crate::parameter_mapping::{
        get_optimization_to_simulation_parameter_mapping, ConditionMapping, MappingOptions,
    };
    pub use crate::priors::{priors_to_measurements, Distribution, Prior};
    pub use crate::problem::{Problem, ProblemFiles};
    pub use crate::simulate::{sample_noise, Simulator};
    pub use crate::PetabError;
}
