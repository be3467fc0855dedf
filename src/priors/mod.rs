//! Prior distributions of model parameters
//!
//! A [Prior] is built from the `initializationPrior*` or `objectivePrior*`
//! columns of a parameter row. Initialization priors are used to sample
//! start points for optimization; objective priors contribute to the
//! objective function and can be turned into artificial measurements with
//! [priors_to_measurements].
mod distributions;

pub use distributions::{Distribution, DistributionKind};

use rand::Rng;
use thiserror::Error;

use crate::data::{
    scale, unscale, Measurement, NoiseDistribution, Observable, ObservableTransformation,
    Parameter, ParameterScale, ParameterValue, PriorKind, PriorType, TableError,
};
use crate::math::{self, MathError};
use crate::problem::Problem;

/// Errors that can occur when building or converting priors
#[derive(Error, Debug, Clone)]
pub enum PriorError {
    /// A prior column holds an invalid value
    #[error(transparent)]
    Table(#[from] TableError),

    /// A generated formula could not be parsed
    #[error(transparent)]
    Math(#[from] MathError),

    /// Distribution parameters are out of range
    #[error("Invalid distribution parameters: {0}")]
    InvalidParameters(String),

    /// No prior is given and the bounds needed for the default are missing
    #[error("Parameter {0} has no prior and no bounds to derive one from")]
    MissingBounds(String),

    /// Prior parameters are given without a prior type
    #[error("Objective prior parameters are set for {0}, but prior type is not specified")]
    MissingPriorType(String),

    /// The prior type cannot be expressed as a measurement
    #[error("Objective prior type {prior_type} of {parameter} is not supported: {reason}")]
    Unsupported {
        parameter: String,
        prior_type: PriorType,
        reason: String,
    },

    /// The observable to be created exists already
    #[error("Observable ID {0}, which is to be created, already exists")]
    DuplicateObservable(String),

    /// There is no measurement to take time and condition from
    #[error("Cannot convert priors to measurements without any measurement")]
    NoMeasurements,
}

/// A prior of a single parameter
///
/// Samples and densities refer to the parameter scale; the underlying
/// [Distribution] may live on linear or parameter scale depending on the
/// prior type.
#[derive(Debug, Clone, PartialEq)]
pub struct Prior {
    prior_type: PriorType,
    parameters: (f64, f64),
    bounds: Option<(f64, f64)>,
    transformation: ParameterScale,
    distribution: Distribution,
}

impl Prior {
    /// Create a prior
    ///
    /// `bounds` are on linear scale, `transformation` is the parameter scale.
    pub fn new(
        prior_type: PriorType,
        parameters: (f64, f64),
        bounds: Option<(f64, f64)>,
        transformation: ParameterScale,
    ) -> Result<Self, PriorError> {
        use ParameterScale::*;
        use PriorType::*;

        let (a, b) = parameters;
        let distribution = match (prior_type, transformation) {
            (Uniform, _) | (ParameterScaleUniform, Lin) => Distribution::uniform(a, b)?,
            (ParameterScaleUniform, Log) => Distribution::uniform(a, b)?.with_log(),
            (ParameterScaleUniform, Log10) => Distribution::uniform(a, b)?.with_log10(),
            (Normal, _) | (ParameterScaleNormal, Lin) => Distribution::normal(a, b)?,
            (ParameterScaleNormal, Log) | (LogNormal, _) => {
                Distribution::normal(a, b)?.with_log()
            }
            (ParameterScaleNormal, Log10) => Distribution::normal(a, b)?.with_log10(),
            (Laplace, _) | (ParameterScaleLaplace, Lin) => Distribution::laplace(a, b)?,
            (ParameterScaleLaplace, Log) | (LogLaplace, _) => {
                Distribution::laplace(a, b)?.with_log()
            }
            (ParameterScaleLaplace, Log10) => Distribution::laplace(a, b)?.with_log10(),
        };

        Ok(Prior {
            prior_type,
            parameters,
            bounds,
            transformation,
            distribution,
        })
    }

    /// Prior of a parameter row
    ///
    /// The prior type defaults to `parameterScaleUniform` and the parameters
    /// of a `parameterScaleUniform` prior default to the scaled bounds. Both
    /// defaults apply independently.
    pub fn from_parameter(parameter: &Parameter, kind: PriorKind) -> Result<Self, PriorError> {
        let bounds = match (parameter.lower_bound, parameter.upper_bound) {
            (Some(lb), Some(ub)) => Some((lb, ub)),
            _ => None,
        };

        let (prior_type, parameters) = match parameter.prior(kind)? {
            Some(prior) => prior,
            None => {
                let (Some(lb), Some(ub)) = (
                    parameter.lower_bound_scaled(),
                    parameter.upper_bound_scaled(),
                ) else {
                    return Err(PriorError::MissingBounds(parameter.id.clone()));
                };
                (PriorType::ParameterScaleUniform, (lb, ub))
            }
        };

        Self::new(prior_type, parameters, bounds, parameter.scale)
    }

    pub fn prior_type(&self) -> PriorType {
        self.prior_type
    }

    pub fn parameters(&self) -> (f64, f64) {
        self.parameters
    }

    pub fn transformation(&self) -> ParameterScale {
        self.transformation
    }

    pub fn distribution(&self) -> &Distribution {
        &self.distribution
    }

    /// Bounds on linear scale
    pub fn bounds(&self) -> Option<(f64, f64)> {
        self.bounds
    }

    /// Lower bound on parameter scale, `-inf` if unbounded
    pub fn lb_scaled(&self) -> f64 {
        self.bounds
            .map(|(lb, _)| scale(lb, self.transformation))
            .unwrap_or(f64::NEG_INFINITY)
    }

    /// Upper bound on parameter scale, `inf` if unbounded
    pub fn ub_scaled(&self) -> f64 {
        self.bounds
            .map(|(_, ub)| scale(ub, self.transformation))
            .unwrap_or(f64::INFINITY)
    }

    /// Draw a value on parameter scale, clipped to the scaled bounds
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let raw = self.distribution.sample(rng);
        let scaled = scale(raw, self.transformation);
        scaled.max(self.lb_scaled()).min(self.ub_scaled())
    }

    pub fn sample_n<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Vec<f64> {
        (0..n).map(|_| self.sample(rng)).collect()
    }

    /// Density at `x` given on parameter scale
    ///
    /// The density refers to the parameter scale, so the Jacobian of the
    /// scale transformation is included.
    pub fn pdf(&self, x: f64) -> f64 {
        let x = unscale(x, self.transformation);
        let coeff = match self.transformation {
            ParameterScale::Lin => 1.0,
            ParameterScale::Log => x,
            ParameterScale::Log10 => x * std::f64::consts::LN_10,
        };
        self.distribution.pdf(x) * coeff
    }

    /// Negative log-density at `x` given on parameter scale
    pub fn neglogprior(&self, x: f64) -> f64 {
        -self.pdf(x).ln()
    }
}

fn scaled_observable_formula(parameter_id: &str, scale: ParameterScale) -> String {
    match scale {
        ParameterScale::Lin => parameter_id.to_string(),
        ParameterScale::Log => format!("ln({})", parameter_id),
        ParameterScale::Log10 => format!("log10({})", parameter_id),
    }
}

/// Replace objective priors by observables and measurements
///
/// Every estimated parameter with an objective prior gets an observable
/// `prior_<id>` whose formula is the parameter (on parameter scale for
/// `parameterScale*` priors) and one measurement of the prior location with
/// the prior scale as noise parameter. Time and conditions are taken from
/// the first measurement. The objective of the returned problem equals the
/// objective of `problem` including priors. Uniform priors are not
/// supported.
pub fn priors_to_measurements(problem: &Problem) -> Result<Problem, PriorError> {
    let mut new_problem = problem.clone();

    for parameter in problem.parameter_table.parameters() {
        if !parameter.estimate {
            continue;
        }
        if parameter.objective_prior_type.is_none() {
            if parameter.objective_prior_parameters.is_some() {
                return Err(PriorError::MissingPriorType(parameter.id.clone()));
            }
            continue;
        }
        let Some((prior_type, (location, noise))) = parameter.prior(PriorKind::Objective)? else {
            continue;
        };

        let unsupported = |reason: &str| PriorError::Unsupported {
            parameter: parameter.id.clone(),
            prior_type,
            reason: reason.to_string(),
        };

        let distribution = match prior_type {
            PriorType::Normal | PriorType::ParameterScaleNormal | PriorType::LogNormal => {
                NoiseDistribution::Normal
            }
            PriorType::Laplace | PriorType::ParameterScaleLaplace | PriorType::LogLaplace => {
                NoiseDistribution::Laplace
            }
            PriorType::Uniform | PriorType::ParameterScaleUniform => {
                return Err(unsupported("uniform priors are not supported"))
            }
        };
        let transformation = match prior_type {
            PriorType::LogNormal | PriorType::LogLaplace => ObservableTransformation::Log,
            _ => ObservableTransformation::Lin,
        };
        let formula_scale = if prior_type.is_on_parameter_scale() {
            parameter.scale
        } else {
            ParameterScale::Lin
        };

        let observable_id = format!("prior_{}", parameter.id);
        if new_problem.observable_table.get(&observable_id).is_some() {
            return Err(PriorError::DuplicateObservable(observable_id));
        }
        let observable = Observable::new(
            observable_id.as_str(),
            math::parse(&scaled_observable_formula(&parameter.id, formula_scale))?,
        )
        .with_noise(math::parse(&format!("noiseParameter1_{}", observable_id))?)
        .with_transformation(transformation)
        .with_noise_distribution(distribution);
        new_problem.observable_table.push(observable);

        let first = problem
            .measurement_table
            .measurements()
            .first()
            .ok_or(PriorError::NoMeasurements)?;
        let mut measurement = Measurement::new(
            observable_id.as_str(),
            first.simulation_condition_id.clone().unwrap_or_default(),
            first.time,
            location,
        )
        .with_noise_parameters(vec![ParameterValue::from(noise)]);
        measurement.simulation_condition_id = first.simulation_condition_id.clone();
        measurement.preequilibration_condition_id = first.preequilibration_condition_id.clone();
        measurement.experiment_id = first.experiment_id.clone();
        new_problem.measurement_table.push(measurement);

        if let Some(p) = new_problem.parameter_table.get_mut(&parameter.id) {
            p.objective_prior_type = None;
            p.objective_prior_parameters = None;
        }
    }

    Ok(new_problem)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_default_prior_is_uniform_on_parameter_scale() {
        let p = Parameter::new("k")
            .with_scale(ParameterScale::Log10)
            .with_bounds(0.01, 100.0);
        let prior = Prior::from_parameter(&p, PriorKind::Initialization).unwrap();
        assert_eq!(prior.prior_type(), PriorType::ParameterScaleUniform);
        assert_eq!(prior.parameters(), (-2.0, 2.0));
        assert_relative_eq!(prior.pdf(0.0), 0.25, epsilon = 1e-12);
        assert_relative_eq!(prior.pdf(1.5), 0.25, epsilon = 1e-12);
    }

    #[test]
    fn test_samples_are_clipped_to_bounds() {
        let p = Parameter::new("k").with_bounds(0.0, 1.0).with_prior(
            PriorKind::Initialization,
            PriorType::Normal,
            (0.5, 10.0),
        );
        let prior = Prior::from_parameter(&p, PriorKind::Initialization).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let samples = prior.sample_n(500, &mut rng);
        assert!(samples.iter().all(|x| (0.0..=1.0).contains(x)));
        assert!(samples.iter().any(|x| *x == 0.0 || *x == 1.0));
    }

    #[test]
    fn test_log_normal_pdf_on_log_scale() {
        let prior = Prior::new(
            PriorType::LogNormal,
            (0.0, 1.0),
            None,
            ParameterScale::Log,
        )
        .unwrap();
        // on log scale the log-normal variable is standard normal
        let standard = Distribution::normal(0.0, 1.0).unwrap();
        for x in [-1.0, 0.0, 0.5, 2.0] {
            assert_relative_eq!(prior.pdf(x), standard.pdf(x), epsilon = 1e-12);
        }
        assert_relative_eq!(prior.neglogprior(0.0), -standard.pdf(0.0).ln(), epsilon = 1e-12);
    }

    #[test]
    fn test_missing_bounds() {
        let p = Parameter::new("k");
        assert!(matches!(
            Prior::from_parameter(&p, PriorKind::Objective),
            Err(PriorError::MissingBounds(_))
        ));
    }

    #[test]
    fn test_explicit_parameter_scale_uniform_without_parameters() {
        let mut p = Parameter::new("k")
            .with_scale(ParameterScale::Log10)
            .with_bounds(1.0, 10.0);
        p.initialization_prior_type = Some("parameterScaleUniform".to_string());
        assert!(p.check().is_ok());

        let prior = Prior::from_parameter(&p, PriorKind::Initialization).unwrap();
        assert_eq!(prior.prior_type(), PriorType::ParameterScaleUniform);
        assert_eq!(prior.parameters(), (0.0, 1.0));
        let mut rng = StdRng::seed_from_u64(3);
        assert!(prior
            .sample_n(100, &mut rng)
            .iter()
            .all(|x| (0.0..=1.0).contains(x)));
    }

    #[test]
    fn test_parameters_without_type_default_to_parameter_scale_uniform() {
        let mut p = Parameter::new("k").with_bounds(0.0, 10.0);
        p.initialization_prior_parameters = Some("2;3".to_string());
        let prior = Prior::from_parameter(&p, PriorKind::Initialization).unwrap();
        assert_eq!(prior.prior_type(), PriorType::ParameterScaleUniform);
        assert_eq!(prior.parameters(), (2.0, 3.0));
    }

    #[test]
    fn test_other_prior_types_need_parameters() {
        let mut p = Parameter::new("k").with_bounds(0.0, 10.0);
        p.initialization_prior_type = Some("normal".to_string());
        assert!(matches!(
            Prior::from_parameter(&p, PriorKind::Initialization),
            Err(PriorError::Table(_))
        ));
    }

    #[test]
    fn test_objective_parameters_without_type_are_rejected() {
        let mut problem = Problem::default();
        problem.add_measurement(Measurement::new("obs", "c0", 0.0, 1.0));
        let mut p = Parameter::new("k").with_bounds(0.0, 10.0);
        p.objective_prior_parameters = Some("1;2".to_string());
        problem.add_parameter(p);
        assert!(matches!(
            priors_to_measurements(&problem),
            Err(PriorError::MissingPriorType(_))
        ));
    }

    #[test]
    fn test_unscaled_bounds() {
        let prior = Prior::new(
            PriorType::Normal,
            (1.0, 1.0),
            Some((1.0, 1000.0)),
            ParameterScale::Log10,
        )
        .unwrap();
        assert_relative_eq!(prior.lb_scaled(), 0.0);
        assert_relative_eq!(prior.ub_scaled(), 3.0);
    }
}
