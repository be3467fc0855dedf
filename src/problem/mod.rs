//! A complete PEtab problem
//!
//! [Problem] bundles the tables of a parameter estimation problem with an
//! optional [Model]. Problems are usually loaded from a YAML file listing the
//! table files (see [yaml]) and can be checked with [lint].
pub mod lint;
pub mod yaml;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use rand::Rng;
use thiserror::Error;

use crate::data::{
    ConditionTable, ExperimentTable, MappingTable, Measurement, MeasurementTable, Observable,
    ObservableTable, Parameter, ParameterTable, PriorKind, SimulationCondition, TableError,
    TsvTable,
};
use crate::math::{self, MathError};
use crate::model::{Model, ModelError, SimpleModel};
use crate::parameter_mapping::{
    get_optimization_to_simulation_parameter_mapping, ConditionMapping, MappingError,
    MappingOptions,
};
use crate::priors::{Prior, PriorError};

pub use lint::{lint_problem, LintIssue, LintReport, Severity};
pub use yaml::{FileList, ModelLocation, ProblemConfig, SubProblemConfig};

/// Errors that can occur when loading, writing or querying a problem
#[derive(Error, Debug)]
pub enum ProblemError {
    #[error(transparent)]
    Table(#[from] TableError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error(transparent)]
    Math(#[from] MathError),

    /// The YAML problem file could not be read
    #[error("Failed to read problem file: {0}")]
    Config(#[from] config::ConfigError),

    /// The YAML problem file could not be written
    #[error("Failed to serialize problem file: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to write {path}: {message}")]
    Io { path: String, message: String },

    /// Only PEtab 1 and 2 problem files are understood
    #[error("Unsupported PEtab format version {0}")]
    UnsupportedFormatVersion(String),

    /// Exactly one entry in `problems` is supported
    #[error("Expected exactly one problem in {path}, found {count}")]
    ProblemCount { path: String, count: usize },

    /// A mandatory table has no file
    #[error("No {0} file given")]
    MissingTable(&'static str),

    /// The operation needs a model, but none is loaded
    #[error("The problem has no model")]
    MissingModel,
}

/// Paths of the files making up a problem
///
/// Tables given as several files are concatenated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProblemFiles {
    pub model: Option<PathBuf>,
    pub conditions: Vec<PathBuf>,
    pub measurements: Vec<PathBuf>,
    pub observables: Vec<PathBuf>,
    pub parameters: Vec<PathBuf>,
    pub mapping: Vec<PathBuf>,
    pub experiments: Vec<PathBuf>,
}

/// A PEtab parameter estimation problem
#[derive(Clone, Default)]
pub struct Problem {
    pub model: Option<Arc<dyn Model>>,
    pub condition_table: ConditionTable,
    pub measurement_table: MeasurementTable,
    pub observable_table: ObservableTable,
    pub parameter_table: ParameterTable,
    pub mapping_table: Option<MappingTable>,
    pub experiment_table: Option<ExperimentTable>,
}

impl fmt::Debug for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Problem")
            .field("model", &self.model.as_ref().map(|m| m.model_id().to_string()))
            .field("conditions", &self.condition_table.conditions().len())
            .field("measurements", &self.measurement_table.len())
            .field("observables", &self.observable_table.len())
            .field("parameters", &self.parameter_table.len())
            .finish()
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let model = self
            .model
            .as_ref()
            .map(|m| m.model_id().to_string())
            .unwrap_or_else(|| "none".to_string());
        write!(
            f,
            "PEtab problem with model {}, {} conditions, {} observables, {} measurements, \
             {} estimated parameters",
            model,
            self.condition_table.conditions().len(),
            self.observable_table.len(),
            self.measurement_table.len(),
            self.parameter_table.n_estimated()
        )
    }
}

fn read_optional<T>(paths: &[PathBuf]) -> Result<Option<T>, TableError>
where
    T: TsvTable + Default + Extend<T>,
{
    if paths.is_empty() {
        Ok(None)
    } else {
        T::from_paths(paths).map(Some)
    }
}

/// Load a model file
///
/// JSON model descriptions are loaded as [SimpleModel]; other formats are
/// skipped with a warning.
pub fn load_model(path: &std::path::Path) -> Result<Option<Arc<dyn Model>>, ModelError> {
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    if !is_json {
        tracing::warn!(
            "Skipping model file {}: only JSON model descriptions are supported",
            path.display()
        );
        return Ok(None);
    }
    let model = SimpleModel::from_path(path)?;
    tracing::debug!("Loaded model {} from {}", model.id, path.display());
    Ok(Some(Arc::new(model)))
}

impl Problem {
    /// Load a problem from individual files
    pub fn from_files(files: &ProblemFiles) -> Result<Self, ProblemError> {
        let model = match &files.model {
            Some(path) => load_model(path)?,
            None => None,
        };
        Ok(Problem {
            model,
            condition_table: read_optional(&files.conditions)?.unwrap_or_default(),
            measurement_table: read_optional(&files.measurements)?.unwrap_or_default(),
            observable_table: read_optional(&files.observables)?.unwrap_or_default(),
            parameter_table: read_optional(&files.parameters)?.unwrap_or_default(),
            mapping_table: read_optional(&files.mapping)?,
            experiment_table: read_optional(&files.experiments)?,
        })
    }

    pub fn with_model(mut self, model: impl Model + 'static) -> Self {
        self.model = Some(Arc::new(model));
        self
    }

    pub fn model(&self) -> Option<&dyn Model> {
        self.model.as_deref()
    }

    /// Add an observable given by its formulas
    pub fn add_observable(
        &mut self,
        id: &str,
        formula: &str,
        noise_formula: Option<&str>,
    ) -> Result<(), ProblemError> {
        let mut observable = Observable::new(id, math::parse(formula)?);
        if let Some(noise) = noise_formula {
            observable = observable.with_noise(math::parse(noise)?);
        }
        self.observable_table.push(observable);
        Ok(())
    }

    pub fn add_parameter(&mut self, parameter: Parameter) {
        self.parameter_table.push(parameter);
    }

    pub fn add_measurement(&mut self, measurement: Measurement) {
        self.measurement_table.push(measurement);
    }

    /// All parameter ids of the parameter table
    pub fn x_ids(&self) -> Vec<String> {
        self.parameter_table.ids()
    }

    /// Ids of the estimated parameters
    pub fn x_free_ids(&self) -> Vec<String> {
        self.parameter_table.estimated_ids()
    }

    /// Ids of the fixed parameters
    pub fn x_fixed_ids(&self) -> Vec<String> {
        self.parameter_table.fixed_ids()
    }

    /// Positions of the estimated parameters in [Problem::x_ids]
    pub fn x_free_indices(&self) -> Vec<usize> {
        self.parameter_table
            .parameters()
            .iter()
            .enumerate()
            .filter(|(_, p)| p.estimate)
            .map(|(i, _)| i)
            .collect()
    }

    /// Positions of the fixed parameters in [Problem::x_ids]
    pub fn x_fixed_indices(&self) -> Vec<usize> {
        self.parameter_table
            .parameters()
            .iter()
            .enumerate()
            .filter(|(_, p)| !p.estimate)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn x_nominal(&self, scaled: bool) -> Vec<f64> {
        self.parameter_table.nominal_values(scaled)
    }

    pub fn x_nominal_free(&self, scaled: bool) -> Vec<f64> {
        select(&self.x_nominal(scaled), &self.x_free_indices())
    }

    pub fn x_nominal_fixed(&self, scaled: bool) -> Vec<f64> {
        select(&self.x_nominal(scaled), &self.x_fixed_indices())
    }

    pub fn lb(&self, scaled: bool) -> Vec<f64> {
        self.parameter_table.lower_bounds(scaled)
    }

    pub fn ub(&self, scaled: bool) -> Vec<f64> {
        self.parameter_table.upper_bounds(scaled)
    }

    pub fn n_estimated(&self) -> usize {
        self.parameter_table.n_estimated()
    }

    pub fn n_measurements(&self) -> usize {
        self.measurement_table.len()
    }

    /// Unique simulation conditions of the measurement table
    pub fn simulation_conditions(&self) -> Vec<SimulationCondition> {
        self.measurement_table.simulation_conditions()
    }

    /// Parameter mapping of every simulation condition
    pub fn get_optimization_to_simulation_parameter_mapping(
        &self,
        options: &MappingOptions,
    ) -> Result<Vec<ConditionMapping>, ProblemError> {
        let model = self.model().ok_or(ProblemError::MissingModel)?;
        Ok(get_optimization_to_simulation_parameter_mapping(
            model,
            &self.condition_table,
            &self.measurement_table,
            Some(&self.parameter_table),
            Some(&self.observable_table),
            self.mapping_table.as_ref(),
            options,
        )?)
    }

    /// Initialization priors of the estimated parameters
    pub fn initialization_priors(&self) -> Result<Vec<Prior>, PriorError> {
        self.parameter_table
            .parameters()
            .iter()
            .filter(|p| p.estimate)
            .map(|p| Prior::from_parameter(p, PriorKind::Initialization))
            .collect()
    }

    /// Sample start points for optimization
    ///
    /// Returns `n_starts` vectors of the estimated parameters on parameter
    /// scale, drawn from their initialization priors.
    pub fn sample_parameter_startpoints<R: Rng + ?Sized>(
        &self,
        n_starts: usize,
        rng: &mut R,
    ) -> Result<Vec<Vec<f64>>, PriorError> {
        let priors = self.initialization_priors()?;
        Ok((0..n_starts)
            .map(|_| -> Vec<f64> { priors.iter().map(|prior| prior.sample(rng)).collect() })
            .collect())
    }

    /// Run all table and cross-table checks
    pub fn lint(&self) -> LintReport {
        lint_problem(self)
    }
}

fn select(values: &[f64], indices: &[usize]) -> Vec<f64> {
    indices.iter().map(|&i| values[i]).collect()
}
