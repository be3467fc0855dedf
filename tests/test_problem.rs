use approx::assert_relative_eq;
use petab::calculate::calculate_llh_for_table;
use petab::data::PriorKind;
use petab::prelude::*;
use petab::problem::Severity;
use petab::simulate::SimulationError;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn conversion_model() -> SimpleModel {
    SimpleModel::new("conversion")
        .with_parameter("k1", 0.1)
        .with_parameter("k2", 0.2)
        .with_species("A", 1.0)
        .with_species("B", 0.0)
}

fn conversion_problem() -> Problem {
    let mut problem = Problem::default().with_model(conversion_model());
    problem.condition_table = ConditionTable::new(vec![
        Condition::new("c0").with_value("k1", 0.1),
        Condition::new("c1").with_value("k1", "k1_c1"),
    ]);
    problem
        .add_observable("obs_a", "A", Some("sigma_a"))
        .unwrap();
    problem
        .add_observable("obs_b", "scaling * B", Some("noiseParameter1_obs_b"))
        .unwrap();
    for (condition, time, a, b) in [
        ("c0", 0.0, 1.0, 0.0),
        ("c0", 10.0, 0.7, 0.2),
        ("c1", 10.0, 0.4, 0.5),
    ] {
        problem.add_measurement(Measurement::new("obs_a", condition, time, a));
        problem.add_measurement(
            Measurement::new("obs_b", condition, time, b)
                .with_noise_parameters(vec![ParameterValue::from(0.1)]),
        );
    }
    problem.add_parameter(
        Parameter::new("k2")
            .with_scale(ParameterScale::Log10)
            .with_bounds(1e-3, 1e3)
            .with_nominal_value(0.2),
    );
    problem.add_parameter(
        Parameter::new("k1_c1")
            .with_scale(ParameterScale::Log)
            .with_bounds(1e-2, 1e2)
            .with_nominal_value(1.0),
    );
    problem.add_parameter(
        Parameter::new("scaling")
            .with_bounds(0.1, 10.0)
            .with_nominal_value(2.0)
            .with_estimate(false),
    );
    problem.add_parameter(
        Parameter::new("sigma_a")
            .with_bounds(0.01, 1.0)
            .with_nominal_value(0.1),
    );
    problem
}

// ═══════════════════════════════════════════════════════════════════
// Reading and writing problems
// ═══════════════════════════════════════════════════════════════════

#[test]
fn yaml_round_trip() {
    let problem = conversion_problem();
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("model.json"),
        conversion_model().to_json().unwrap(),
    )
    .unwrap();

    let yaml = problem.to_files(dir.path(), Some("model.json")).unwrap();
    assert_eq!(yaml, dir.path().join("problem.yaml"));

    let loaded = Problem::from_yaml(&yaml).unwrap();
    assert!(loaded.model().is_some());
    assert_eq!(loaded.condition_table.ids(), vec!["c0", "c1"]);
    assert_eq!(
        loaded.condition_table.value("c1", "k1"),
        Some(&ParameterValue::from("k1_c1"))
    );
    assert_eq!(loaded.observable_table.ids(), vec!["obs_a", "obs_b"]);
    assert_eq!(loaded.n_measurements(), 6);
    assert_eq!(loaded.x_ids(), problem.x_ids());
    assert_eq!(loaded.x_free_ids(), vec!["k2", "k1_c1", "sigma_a"]);
    assert_eq!(loaded.x_fixed_ids(), vec!["scaling"]);
    assert_relative_eq!(loaded.lb(true)[0], -3.0, epsilon = 1e-12);
    assert_relative_eq!(loaded.ub(true)[1], 100f64.ln(), epsilon = 1e-12);
    assert!(loaded.mapping_table.is_none());

    let report = loaded.lint();
    assert!(!report.has_errors(), "{}", report);
}

#[test]
fn yaml_with_non_json_model_is_loaded_without_model() {
    let problem = conversion_problem();
    let dir = tempfile::tempdir().unwrap();
    let yaml = problem.to_files(dir.path(), Some("model.xml")).unwrap();

    let loaded = Problem::from_yaml(&yaml).unwrap();
    assert!(loaded.model().is_none());
    assert_eq!(loaded.n_estimated(), 3);
}

#[test]
fn missing_table_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = dir.path().join("problem.yaml");
    std::fs::write(
        &yaml,
        "format_version: 1\n\
         parameter_file: parameters.tsv\n\
         problems:\n  \
           - condition_files: [conditions.tsv]\n    \
             measurement_files: [measurements.tsv]\n    \
             observable_files: [observables.tsv]\n",
    )
    .unwrap();
    assert!(Problem::from_yaml(&yaml).is_err());
}

// ═══════════════════════════════════════════════════════════════════
// Parameter vectors and mapping
// ═══════════════════════════════════════════════════════════════════

#[test]
fn nominal_parameter_vectors() {
    let problem = conversion_problem();
    assert_eq!(problem.x_free_indices(), vec![0, 1, 3]);
    assert_eq!(problem.x_fixed_indices(), vec![2]);
    assert_eq!(problem.x_nominal_fixed(false), vec![2.0]);

    let nominal = problem.x_nominal_free(true);
    assert_relative_eq!(nominal[0], 0.2f64.log10(), epsilon = 1e-12);
    assert_relative_eq!(nominal[1], 0.0, epsilon = 1e-12);
    assert_relative_eq!(nominal[2], 0.1, epsilon = 1e-12);
}

#[test]
fn problem_mapping() {
    let problem = conversion_problem();
    let mappings = problem
        .get_optimization_to_simulation_parameter_mapping(&MappingOptions::default())
        .unwrap();
    assert_eq!(mappings.len(), 2);

    let c0 = &mappings[0];
    assert_eq!(c0.map_sim["k1"], ParameterValue::from(0.1));
    assert_eq!(c0.map_sim["k2"], ParameterValue::from("k2"));
    assert_eq!(c0.scale_map_sim["k2"], ParameterScale::Log10);
    assert_eq!(c0.map_sim["scaling"], ParameterValue::from(2.0));
    assert_eq!(c0.map_sim["sigma_a"], ParameterValue::from("sigma_a"));
    assert_eq!(c0.map_sim["noiseParameter1_obs_b"], ParameterValue::from(0.1));
    assert!(c0.map_preeq.is_empty());

    let c1 = &mappings[1];
    assert_eq!(c1.map_sim["k1"], ParameterValue::from("k1_c1"));
    assert_eq!(c1.scale_map_sim["k1"], ParameterScale::Log);
}

// ═══════════════════════════════════════════════════════════════════
// Linting
// ═══════════════════════════════════════════════════════════════════

#[test]
fn lint_reports_missing_parameters() {
    let mut problem = conversion_problem();
    problem.parameter_table = ParameterTable::new(
        problem
            .parameter_table
            .parameters()
            .iter()
            .filter(|p| p.id != "scaling")
            .cloned()
            .collect(),
    );
    let report = problem.lint();
    assert!(report.has_errors());
    assert!(report
        .errors()
        .any(|issue| issue.message.contains("scaling")));
}

#[test]
fn lint_reports_state_variables_in_parameter_table() {
    let mut problem = conversion_problem();
    problem.add_parameter(Parameter::new("A").with_bounds(0.0, 1.0));
    let report = problem.lint();
    assert!(report
        .issues()
        .iter()
        .any(|issue| issue.severity == Severity::Error && issue.message.contains("state variable")));
}

// ═══════════════════════════════════════════════════════════════════
// Priors
// ═══════════════════════════════════════════════════════════════════

#[test]
fn startpoints_respect_bounds() {
    let problem = conversion_problem();
    let mut rng = StdRng::seed_from_u64(42);
    let startpoints = problem.sample_parameter_startpoints(50, &mut rng).unwrap();
    assert_eq!(startpoints.len(), 50);

    let (lb, ub) = (problem.lb(true), problem.ub(true));
    let free = problem.x_free_indices();
    for x in &startpoints {
        assert_eq!(x.len(), free.len());
        for (value, &i) in x.iter().zip(&free) {
            assert!(*value >= lb[i] && *value <= ub[i]);
        }
    }
}

#[test]
fn startpoints_with_default_prior_parameters() {
    let mut problem = conversion_problem();
    problem.parameter_table = ParameterTable::new(
        problem
            .parameter_table
            .parameters()
            .iter()
            .cloned()
            .map(|mut p| {
                if p.id == "k2" {
                    p.initialization_prior_type = Some("parameterScaleUniform".to_string());
                }
                if p.id == "sigma_a" {
                    p.initialization_prior_parameters = Some("0.2;0.3".to_string());
                }
                p
            })
            .collect(),
    );
    assert!(!problem.lint().has_errors());

    let priors = problem.initialization_priors().unwrap();
    assert_relative_eq!(priors[0].parameters().0, -3.0, epsilon = 1e-12);
    assert_relative_eq!(priors[0].parameters().1, 3.0, epsilon = 1e-12);
    assert_eq!(priors[2].prior_type(), PriorType::ParameterScaleUniform);
    assert_eq!(priors[2].parameters(), (0.2, 0.3));

    let mut rng = StdRng::seed_from_u64(11);
    let startpoints = problem.sample_parameter_startpoints(20, &mut rng).unwrap();
    let (lb, ub) = (problem.lb(true), problem.ub(true));
    assert!(startpoints
        .iter()
        .all(|x| (0.2..=0.3).contains(&x[2]) && x[0] >= lb[0] && x[0] <= ub[0]));
}

#[test]
fn priors_become_measurements() {
    let mut problem = conversion_problem();
    problem.parameter_table = ParameterTable::new(
        problem
            .parameter_table
            .parameters()
            .iter()
            .cloned()
            .map(|p| match p.id.clone().as_str() {
                "k2" => p.with_prior(PriorKind::Objective, PriorType::ParameterScaleNormal, (-1.0, 0.5)),
                "k1_c1" => p.with_prior(PriorKind::Objective, PriorType::LogNormal, (0.0, 2.0)),
                _ => p,
            })
            .collect(),
    );

    let with_measurements = priors_to_measurements(&problem).unwrap();
    assert_eq!(with_measurements.n_measurements(), problem.n_measurements() + 2);
    assert!(with_measurements
        .parameter_table
        .parameters()
        .iter()
        .all(|p| p.prior(PriorKind::Objective).unwrap().is_none()));

    let prior_k2 = with_measurements.observable_table.get("prior_k2").unwrap();
    assert_eq!(prior_k2.formula.to_string(), "log10(k2)");
    let prior_k1 = with_measurements.observable_table.get("prior_k1_c1").unwrap();
    assert_eq!(prior_k1.transformation, ObservableTransformation::Log);

    // the likelihood of the new measurement is the prior density
    let x = 0.3;
    let row = with_measurements
        .measurement_table
        .measurements()
        .iter()
        .find(|m| m.observable_id == "prior_k2")
        .unwrap()
        .clone();
    let simulation = Measurement {
        measurement: x,
        ..row.clone()
    };
    let llh = calculate_llh_for_table(
        &MeasurementTable::new(vec![row]),
        &MeasurementTable::new_simulation(vec![simulation]),
        &with_measurements.observable_table,
        &with_measurements.parameter_table,
    )
    .unwrap();
    let prior = Prior::new(
        PriorType::Normal,
        (-1.0, 0.5),
        None,
        ParameterScale::Lin,
    )
    .unwrap();
    assert_relative_eq!(llh, -prior.neglogprior(x), epsilon = 1e-10);
}

// ═══════════════════════════════════════════════════════════════════
// Simulation
// ═══════════════════════════════════════════════════════════════════

struct Constant {
    problem: Problem,
    value: f64,
}

impl Simulator for Constant {
    fn problem(&self) -> &Problem {
        &self.problem
    }

    fn simulate_without_noise(&self) -> Result<MeasurementTable, SimulationError> {
        let rows = self
            .problem
            .measurement_table
            .measurements()
            .iter()
            .map(|m| Measurement {
                measurement: self.value,
                ..m.clone()
            })
            .collect();
        Ok(MeasurementTable::new(rows))
    }
}

#[test]
fn simulated_data_fits_problem() {
    let simulator = Constant {
        problem: conversion_problem(),
        value: 0.5,
    };
    let mut rng = StdRng::seed_from_u64(7);

    let exact = simulator.simulate(false, 1.0, &mut rng).unwrap();
    assert!(exact.is_simulation());
    assert!(exact.measurements().iter().all(|m| m.measurement == 0.5));

    let noisy = simulator.simulate(true, 1.0, &mut rng).unwrap();
    assert_eq!(noisy.len(), 6);
    assert!(noisy.measurements().iter().any(|m| m.measurement != 0.5));

    let llh = calculate_llh(
        &[simulator.problem.measurement_table.clone()],
        &[noisy],
        &[simulator.problem.observable_table.clone()],
        &[simulator.problem.parameter_table.clone()],
    )
    .unwrap();
    assert!(llh.is_finite());
}
