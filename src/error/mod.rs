use thiserror::Error;

use crate::calculate::CalculationError;
use crate::data::TableError;
use crate::math::MathError;
use crate::model::ModelError;
use crate::parameter_mapping::MappingError;
use crate::priors::PriorError;
use crate::problem::ProblemError;
use crate::simulate::SimulationError;

#[derive(Error, Debug)]
pub enum PetabError {
    #[error("Error in table: {0}")]
    TableError(#[from] TableError),
    #[error("Error in formula: {0}")]
    MathError(#[from] MathError),
    #[error("Error in model: {0}")]
    ModelError(#[from] ModelError),
    #[error("Error in parameter mapping: {0}")]
    MappingError(#[from] MappingError),
    #[error("Error in calculation: {0}")]
    CalculationError(#[from] CalculationError),
    #[error("Error in prior: {0}")]
    PriorError(#[from] PriorError),
    #[error("Error in simulation: {0}")]
    SimulationError(#[from] SimulationError),
    #[error("Error in problem: {0}")]
    ProblemError(#[from] ProblemError),
}
