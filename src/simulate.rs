//! Simulation of PEtab problems with optional measurement noise
//!
//! Simulation tools implement [Simulator::simulate_without_noise]; noise is
//! then sampled from the noise model of each observable by
//! [sample_noise].
use rand::Rng;
use thiserror::Error;

use crate::calculate::{evaluate_noise_formula, CalculationError};
use crate::data::{Measurement, MeasurementTable, NoiseDistribution};
use crate::priors::{Distribution, PriorError};
use crate::problem::Problem;

/// Errors that can occur when simulating a problem
#[derive(Error, Debug, Clone)]
pub enum SimulationError {
    /// The noise formula could not be evaluated
    #[error(transparent)]
    Calculation(#[from] CalculationError),

    /// The noise formula evaluated to an invalid scale
    #[error("Invalid noise scale {value} for observable {observable_id}")]
    InvalidNoise { observable_id: String, value: f64 },

    /// Error reported by the simulation tool
    #[error("Simulation failed: {0}")]
    Simulator(String),
}

/// A tool that can simulate a PEtab problem
///
/// Only [Simulator::simulate_without_noise] has to be implemented.
pub trait Simulator {
    /// The problem being simulated
    fn problem(&self) -> &Problem;

    /// Simulate every measurement of the problem
    ///
    /// The result is the measurement table of the problem with the measured
    /// values replaced by simulated ones.
    fn simulate_without_noise(&self) -> Result<MeasurementTable, SimulationError>;

    /// Simulate the problem, adding noise if `noise` is set
    ///
    /// The returned table has a `simulation` value column.
    fn simulate<R: Rng + ?Sized>(
        &self,
        noise: bool,
        noise_scaling_factor: f64,
        rng: &mut R,
    ) -> Result<MeasurementTable, SimulationError> {
        let mut simulations = self.simulate_without_noise()?;
        if noise {
            simulations = self.add_noise(&simulations, noise_scaling_factor, false, rng)?;
        }
        Ok(MeasurementTable::new_simulation(
            simulations.measurements().to_vec(),
        ))
    }

    /// Add noise to each simulated value
    fn add_noise<R: Rng + ?Sized>(
        &self,
        simulations: &MeasurementTable,
        noise_scaling_factor: f64,
        zero_bounded: bool,
        rng: &mut R,
    ) -> Result<MeasurementTable, SimulationError> {
        let mut noisy = simulations.clone();
        for row in noisy.measurements_mut() {
            row.measurement = sample_noise(
                self.problem(),
                row,
                row.measurement,
                rng,
                noise_scaling_factor,
                zero_bounded,
            )?;
        }
        Ok(noisy)
    }
}

/// Draw a noisy value from the noise model of the measurement's observable
///
/// The noise distribution is centered at `simulated_value` after applying
/// the observable transformation; its scale is the evaluated noise formula
/// times `noise_scaling_factor`. If `zero_bounded`, a sample whose sign
/// differs from the simulated value is returned as zero.
pub fn sample_noise<R: Rng + ?Sized>(
    problem: &Problem,
    measurement: &Measurement,
    simulated_value: f64,
    rng: &mut R,
    noise_scaling_factor: f64,
    zero_bounded: bool,
) -> Result<f64, SimulationError> {
    let observable = problem
        .observable_table
        .get(&measurement.observable_id)
        .ok_or_else(|| CalculationError::UnknownObservable(measurement.observable_id.clone()))?;
    let noise_value = evaluate_noise_formula(
        measurement,
        observable,
        &problem.parameter_table,
        simulated_value,
    )?;

    let loc = observable.transformation.apply(simulated_value);
    let noise_scale = noise_value * noise_scaling_factor;
    let invalid = |_: PriorError| SimulationError::InvalidNoise {
        observable_id: observable.id.clone(),
        value: noise_scale,
    };

    let sample = if noise_scale == 0.0 {
        loc
    } else {
        let distribution = match observable.noise_distribution {
            NoiseDistribution::Normal => Distribution::normal(loc, noise_scale),
            NoiseDistribution::Laplace => Distribution::laplace(loc, noise_scale),
        }
        .map_err(invalid)?;
        distribution.sample(rng)
    };

    let with_noise = observable.transformation.invert(sample);
    if zero_bounded && loc.signum() != with_noise.signum() {
        return Ok(0.0);
    }
    Ok(with_noise)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Observable, ObservableTable, ObservableTransformation, ParameterValue};
    use crate::math::parse;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    struct Identity {
        problem: Problem,
    }

    impl Simulator for Identity {
        fn problem(&self) -> &Problem {
            &self.problem
        }

        fn simulate_without_noise(&self) -> Result<MeasurementTable, SimulationError> {
            Ok(self.problem.measurement_table.clone())
        }
    }

    fn problem(transformation: ObservableTransformation) -> Problem {
        let observable = Observable::new("obs", parse("A").unwrap())
            .with_noise(parse("noiseParameter1_obs").unwrap())
            .with_transformation(transformation);
        let measurements = (0..50)
            .map(|i| {
                Measurement::new("obs", "c0", i as f64, 2.0)
                    .with_noise_parameters(vec![ParameterValue::from(0.1)])
            })
            .collect();
        Problem {
            observable_table: ObservableTable::new(vec![observable]),
            measurement_table: MeasurementTable::new(measurements),
            ..Default::default()
        }
    }

    #[test]
    fn test_simulate_without_noise() {
        let sim = Identity {
            problem: problem(ObservableTransformation::Lin),
        };
        let mut rng = StdRng::seed_from_u64(0);
        let result = sim.simulate(false, 1.0, &mut rng).unwrap();
        assert!(result.is_simulation());
        assert!(result.measurements().iter().all(|m| m.measurement == 2.0));
    }

    #[test]
    fn test_noise_is_added() {
        let sim = Identity {
            problem: problem(ObservableTransformation::Lin),
        };
        let mut rng = StdRng::seed_from_u64(3);
        let result = sim.simulate(true, 1.0, &mut rng).unwrap();
        let values: Vec<f64> = result.measurements().iter().map(|m| m.measurement).collect();
        assert!(values.iter().any(|v| *v != 2.0));
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        approx::assert_relative_eq!(mean, 2.0, epsilon = 0.1);
    }

    #[test]
    fn test_log_transformed_noise_stays_positive() {
        let sim = Identity {
            problem: problem(ObservableTransformation::Log10),
        };
        let mut rng = StdRng::seed_from_u64(11);
        let result = sim.simulate(true, 5.0, &mut rng).unwrap();
        assert!(result.measurements().iter().all(|m| m.measurement > 0.0));
    }

    #[test]
    fn test_zero_scaling_factor() {
        let p = problem(ObservableTransformation::Lin);
        let mut rng = StdRng::seed_from_u64(5);
        let m = &p.measurement_table.measurements()[0];
        let value = sample_noise(&p, m, 2.0, &mut rng, 0.0, false).unwrap();
        assert_eq!(value, 2.0);
    }

    #[test]
    fn test_zero_bounded() {
        let p = problem(ObservableTransformation::Lin);
        let mut rng = StdRng::seed_from_u64(9);
        let m = &p.measurement_table.measurements()[0];
        for _ in 0..100 {
            let value = sample_noise(&p, m, 0.01, &mut rng, 10.0, true).unwrap();
            assert!(value >= 0.0);
        }
    }
}
