//! Residuals, chi² values and log-likelihoods of simulated data
//!
//! Every measurement is paired with the simulation row that agrees with it on
//! all columns shared by the two tables. Empty measurement cells match
//! anything. The noise model of the measured observable then gives the
//! residual and the likelihood contribution of the pair.
mod noise;

pub use noise::{evaluate_noise_formula, get_symbolic_noise_formulas};

use std::f64::consts::{LN_10, PI};

use thiserror::Error;

use crate::data::columns::*;
use crate::data::table::format_float;
use crate::data::{
    join_parameter_replacement_list, Measurement, MeasurementTable, NoiseDistribution,
    ObservableTable, ObservableTransformation, ParameterTable, ParameterValue, TableError,
};
use crate::math::MathError;

/// Errors that can occur when comparing measurements and simulations
#[derive(Error, Debug, Clone)]
pub enum CalculationError {
    /// A table is malformed
    #[error(transparent)]
    Table(#[from] TableError),

    /// A noise formula could not be evaluated
    #[error(transparent)]
    Math(#[from] MathError),

    /// The lists of tables passed in differ in length
    #[error("Expected {expected} {what} tables, got {got}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    /// No simulation row matches a measurement
    #[error("Could not find simulation for measurement of {observable_id} at time {time}")]
    NoSimulation { observable_id: String, time: f64 },

    /// Several simulation rows with different content match a measurement
    #[error("Multiple different simulations found for measurement of {observable_id} at time {time}")]
    AmbiguousSimulation { observable_id: String, time: f64 },

    /// The measured observable is not in the observable table
    #[error("Observable {0} not found in observable table")]
    UnknownObservable(String),

    /// The observable has no noise formula
    #[error("Observable {0} has no noise formula")]
    MissingNoiseFormula(String),

    /// An override refers to a parameter without nominal value
    #[error("Parameter {0} not found in parameter table or has no nominal value")]
    UnknownParameter(String),

    /// The noise formula still has free symbols after substitution
    #[error(
        "Cannot replace all parameters in noise formula {formula} for observable \
         {observable_id}. Missing {missing:?}. Note that model states are currently not supported."
    )]
    UnresolvedNoiseFormula {
        observable_id: String,
        formula: String,
        missing: Vec<String>,
    },
}

/// Values of the columns used to pair measurements and simulations
///
/// `None` is an empty cell.
fn match_columns(m: &Measurement) -> [(&'static str, Option<String>); 9] {
    let list = |values: &[ParameterValue]| {
        if values.is_empty() {
            None
        } else {
            Some(join_parameter_replacement_list(values))
        }
    };
    [
        (OBSERVABLE_ID, Some(m.observable_id.clone())),
        (PREEQUILIBRATION_CONDITION_ID, m.preequilibration_condition_id.clone()),
        (SIMULATION_CONDITION_ID, m.simulation_condition_id.clone()),
        (EXPERIMENT_ID, m.experiment_id.clone()),
        (TIME, Some(format_float(m.time))),
        (OBSERVABLE_PARAMETERS, list(&m.observable_parameters)),
        (NOISE_PARAMETERS, list(&m.noise_parameters)),
        (DATASET_ID, m.dataset_id.clone()),
        (REPLICATE_ID, m.replicate_id.clone()),
    ]
}

/// Find the simulated value belonging to `measurement`
///
/// Only columns that exist in the simulation table are compared, even if
/// they are empty there. Several matching rows are fine as long as they are
/// identical.
pub fn find_simulation(
    measurement: &Measurement,
    simulations: &MeasurementTable,
) -> Result<f64, CalculationError> {
    let present: Vec<&'static str> = match_columns(measurement)
        .iter()
        .map(|(col, _)| *col)
        .filter(|col| simulations.has_column(col))
        .collect();

    let wanted = match_columns(measurement);
    let matches: Vec<&Measurement> = simulations
        .measurements()
        .iter()
        .filter(|s| {
            let have = match_columns(s);
            wanted.iter().zip(have.iter()).all(|((col, want), (_, got))| {
                !present.contains(col) || want.is_none() || want == got
            })
        })
        .collect();

    match matches.as_slice() {
        [] => Err(CalculationError::NoSimulation {
            observable_id: measurement.observable_id.clone(),
            time: measurement.time,
        }),
        [first, rest @ ..] if rest.iter().any(|s| s != first) => {
            Err(CalculationError::AmbiguousSimulation {
                observable_id: measurement.observable_id.clone(),
                time: measurement.time,
            })
        }
        [first, ..] => Ok(first.measurement),
    }
}

fn check_lengths(
    measurements: usize,
    simulations: usize,
    observables: usize,
    parameters: usize,
) -> Result<(), CalculationError> {
    for (what, got) in [
        ("simulation", simulations),
        ("observable", observables),
        ("parameter", parameters),
    ] {
        if got != measurements {
            return Err(CalculationError::LengthMismatch {
                what,
                expected: measurements,
                got,
            });
        }
    }
    Ok(())
}

/// Residuals for several sets of tables
///
/// The lists must have equal lengths; the i-th tables belong together. If
/// `scale`, residuals are computed on the observable transformation's
/// scale. If `normalize`, they are divided by the noise standard deviation.
pub fn calculate_residuals(
    measurement_tables: &[MeasurementTable],
    simulation_tables: &[MeasurementTable],
    observable_tables: &[ObservableTable],
    parameter_tables: &[ParameterTable],
    normalize: bool,
    scale: bool,
) -> Result<Vec<MeasurementTable>, CalculationError> {
    check_lengths(
        measurement_tables.len(),
        simulation_tables.len(),
        observable_tables.len(),
        parameter_tables.len(),
    )?;
    measurement_tables
        .iter()
        .zip(simulation_tables)
        .zip(observable_tables)
        .zip(parameter_tables)
        .map(|(((m, s), o), p)| calculate_residuals_for_table(m, s, o, p, normalize, scale))
        .collect()
}

/// Residuals of a single measurement table
///
/// The result has the layout of the measurement table with a `residual`
/// value column.
pub fn calculate_residuals_for_table(
    measurements: &MeasurementTable,
    simulations: &MeasurementTable,
    observables: &ObservableTable,
    parameters: &ParameterTable,
    normalize: bool,
    scale: bool,
) -> Result<MeasurementTable, CalculationError> {
    let residuals = measurements
        .measurements()
        .iter()
        .map(|m| {
            let simulation = find_simulation(m, simulations)?;
            let observable = observables
                .get(&m.observable_id)
                .ok_or_else(|| CalculationError::UnknownObservable(m.observable_id.clone()))?;
            let transformation = if scale {
                observable.transformation
            } else {
                ObservableTransformation::Lin
            };
            let mut residual = transformation.apply(m.measurement) - transformation.apply(simulation);
            if normalize {
                residual /= evaluate_noise_formula(m, observable, parameters, simulation)?;
            }
            Ok(Measurement {
                measurement: residual,
                ..m.clone()
            })
        })
        .collect::<Result<Vec<_>, CalculationError>>()?;
    Ok(MeasurementTable::new_residual(residuals))
}

/// Sum of squared residuals over several sets of tables
pub fn calculate_chi2(
    measurement_tables: &[MeasurementTable],
    simulation_tables: &[MeasurementTable],
    observable_tables: &[ObservableTable],
    parameter_tables: &[ParameterTable],
    normalize: bool,
    scale: bool,
) -> Result<f64, CalculationError> {
    let residuals = calculate_residuals(
        measurement_tables,
        simulation_tables,
        observable_tables,
        parameter_tables,
        normalize,
        scale,
    )?;
    Ok(residuals
        .iter()
        .map(calculate_chi2_for_table_from_residuals)
        .sum())
}

/// Sum of squared residuals of one residual table
pub fn calculate_chi2_for_table_from_residuals(residuals: &MeasurementTable) -> f64 {
    residuals
        .measurements()
        .iter()
        .map(|r| r.measurement.powi(2))
        .sum()
}

/// Total log-likelihood over several sets of tables
pub fn calculate_llh(
    measurement_tables: &[MeasurementTable],
    simulation_tables: &[MeasurementTable],
    observable_tables: &[ObservableTable],
    parameter_tables: &[ParameterTable],
) -> Result<f64, CalculationError> {
    check_lengths(
        measurement_tables.len(),
        simulation_tables.len(),
        observable_tables.len(),
        parameter_tables.len(),
    )?;
    measurement_tables
        .iter()
        .zip(simulation_tables)
        .zip(observable_tables)
        .zip(parameter_tables)
        .map(|(((m, s), o), p)| calculate_llh_for_table(m, s, o, p))
        .sum()
}

/// Log-likelihood of one measurement table
pub fn calculate_llh_for_table(
    measurements: &MeasurementTable,
    simulations: &MeasurementTable,
    observables: &ObservableTable,
    parameters: &ParameterTable,
) -> Result<f64, CalculationError> {
    measurements
        .measurements()
        .iter()
        .map(|m| {
            let simulation = find_simulation(m, simulations)?;
            let observable = observables
                .get(&m.observable_id)
                .ok_or_else(|| CalculationError::UnknownObservable(m.observable_id.clone()))?;
            let sigma = evaluate_noise_formula(m, observable, parameters, simulation)?;
            Ok(calculate_single_llh(
                m.measurement,
                simulation,
                observable.transformation,
                observable.noise_distribution,
                sigma,
            ))
        })
        .sum()
}

/// Log-likelihood of a single measurement
///
/// The noise model with standard deviation (or scale) `noise_value` applies
/// on the `scale` of the observable. For log scales the density is
/// transformed back to the linear measurement.
pub fn calculate_single_llh(
    measurement: f64,
    simulation: f64,
    scale: ObservableTransformation,
    noise_distribution: NoiseDistribution,
    noise_value: f64,
) -> f64 {
    let (m, s, sigma) = (measurement, simulation, noise_value);
    let nllh = match (noise_distribution, scale) {
        (NoiseDistribution::Normal, ObservableTransformation::Lin) => {
            0.5 * (2.0 * PI * sigma.powi(2)).ln() + 0.5 * ((s - m) / sigma).powi(2)
        }
        (NoiseDistribution::Normal, ObservableTransformation::Log) => {
            0.5 * (2.0 * PI * sigma.powi(2) * m.powi(2)).ln()
                + 0.5 * ((s.ln() - m.ln()) / sigma).powi(2)
        }
        (NoiseDistribution::Normal, ObservableTransformation::Log10) => {
            0.5 * (2.0 * PI * sigma.powi(2) * m.powi(2) * LN_10.powi(2)).ln()
                + 0.5 * ((s.log10() - m.log10()) / sigma).powi(2)
        }
        (NoiseDistribution::Laplace, ObservableTransformation::Lin) => {
            (2.0 * sigma).ln() + ((s - m) / sigma).abs()
        }
        (NoiseDistribution::Laplace, ObservableTransformation::Log) => {
            (2.0 * sigma * m).ln() + ((s.ln() - m.ln()) / sigma).abs()
        }
        (NoiseDistribution::Laplace, ObservableTransformation::Log10) => {
            (2.0 * sigma * m * LN_10).ln() + ((s.log10() - m.log10()) / sigma).abs()
        }
    };
    -nllh
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn measurement(obs: &str, time: f64, value: f64) -> Measurement {
        Measurement::new(obs, "c0", time, value)
    }

    #[test]
    fn test_single_llh_normal() {
        let llh = calculate_single_llh(
            0.5,
            2.0,
            ObservableTransformation::Lin,
            NoiseDistribution::Normal,
            1.0,
        );
        assert_relative_eq!(llh, -0.5 * (2.0 * PI).ln() - 0.5 * 1.5f64.powi(2));
    }

    #[test]
    fn test_single_llh_laplace_log10() {
        let (m, s, sigma) = (2.0, 20.0, 0.5);
        let llh = calculate_single_llh(
            m,
            s,
            ObservableTransformation::Log10,
            NoiseDistribution::Laplace,
            sigma,
        );
        let expected = -(2.0 * sigma * m * LN_10).ln() - (1.0 / sigma);
        assert_relative_eq!(llh, expected, epsilon = 1e-12);
    }

    #[test]
    fn test_single_llh_log_normal_matches_density() {
        // log-normal density of m with log-mean ln(s)
        let (m, s, sigma): (f64, f64, f64) = (3.0, 2.0, 0.7);
        let density = (-(m.ln() - s.ln()).powi(2) / (2.0 * sigma.powi(2))).exp()
            / (m * sigma * (2.0 * PI).sqrt());
        let llh = calculate_single_llh(
            m,
            s,
            ObservableTransformation::Log,
            NoiseDistribution::Normal,
            sigma,
        );
        assert_relative_eq!(llh, density.ln(), epsilon = 1e-12);
    }

    #[test]
    fn test_find_simulation() {
        let simulations = MeasurementTable::new_simulation(vec![
            measurement("obs1", 0.0, 1.0),
            measurement("obs1", 1.0, 2.0),
            measurement("obs2", 1.0, 3.0),
        ]);
        assert_eq!(
            find_simulation(&measurement("obs1", 1.0, 0.0), &simulations).unwrap(),
            2.0
        );
        assert!(matches!(
            find_simulation(&measurement("obs3", 1.0, 0.0), &simulations),
            Err(CalculationError::NoSimulation { .. })
        ));
    }

    #[test]
    fn test_empty_measurement_cells_match_anything() {
        let simulations = MeasurementTable::new_simulation(vec![
            measurement("obs1", 0.0, 1.0).with_preequilibration("preeq")
        ]);
        assert_eq!(
            find_simulation(&measurement("obs1", 0.0, 5.0), &simulations).unwrap(),
            1.0
        );
    }

    #[test]
    fn test_empty_simulation_columns_are_compared() {
        use crate::data::TsvTable;

        let tsv = "observableId\tpreequilibrationConditionId\tsimulationConditionId\tsimulation\ttime
obs1\t\tc0\t1.0\t0
";
        let simulations = MeasurementTable::from_reader(tsv.as_bytes()).unwrap();
        assert!(simulations.has_column(PREEQUILIBRATION_CONDITION_ID));

        let with_preeq = measurement("obs1", 0.0, 5.0).with_preequilibration("p");
        assert!(matches!(
            find_simulation(&with_preeq, &simulations),
            Err(CalculationError::NoSimulation { .. })
        ));
        assert_eq!(
            find_simulation(&measurement("obs1", 0.0, 5.0), &simulations).unwrap(),
            1.0
        );
    }

    #[test]
    fn test_ambiguous_simulation() {
        let simulations = MeasurementTable::new_simulation(vec![
            measurement("obs1", 0.0, 1.0),
            measurement("obs1", 0.0, 1.0),
        ]);
        assert_eq!(
            find_simulation(&measurement("obs1", 0.0, 0.0), &simulations).unwrap(),
            1.0
        );

        let mut query = measurement("obs1", 0.0, 0.0);
        query.simulation_condition_id = None;
        let simulations = MeasurementTable::new_simulation(vec![
            measurement("obs1", 0.0, 1.0),
            measurement("obs1", 0.0, 2.0),
        ]);
        assert!(matches!(
            find_simulation(&query, &simulations),
            Err(CalculationError::AmbiguousSimulation { .. })
        ));
    }

    #[test]
    fn test_length_mismatch() {
        let result = calculate_llh(&[MeasurementTable::default()], &[], &[], &[]);
        assert!(matches!(
            result,
            Err(CalculationError::LengthMismatch {
                what: "simulation",
                ..
            })
        ));
    }
}
