use criterion::{black_box, criterion_group, criterion_main, Criterion};
use petab::prelude::*;

/// A problem with `n` conditions, each with its own override of `k1` and
/// its own scaling parameter for the single observable
fn many_conditions(n: usize) -> Problem {
    let model = SimpleModel::new("bench")
        .with_parameter("k1", 0.1)
        .with_parameter("k2", 0.2)
        .with_species("A", 1.0);
    let mut problem = Problem::default().with_model(model);
    problem
        .add_observable("obs_a", "observableParameter1_obs_a * A", Some("sigma"))
        .unwrap();
    problem.add_parameter(Parameter::new("k2").with_bounds(1e-3, 1e3));
    problem.add_parameter(Parameter::new("sigma").with_bounds(1e-3, 1.0));

    let mut conditions = Vec::with_capacity(n);
    for i in 0..n {
        let condition = format!("c{}", i);
        let k1 = format!("k1_{}", i);
        let scaling = format!("scaling_{}", i);
        conditions.push(Condition::new(condition.as_str()).with_value("k1", k1.as_str()));
        problem.add_parameter(Parameter::new(k1.as_str()).with_bounds(1e-3, 1e3));
        problem.add_parameter(Parameter::new(scaling.as_str()).with_bounds(0.1, 10.0));
        for t in 0..10 {
            problem.add_measurement(
                Measurement::new("obs_a", condition.as_str(), t as f64, 1.0)
                    .with_observable_parameters(vec![ParameterValue::from(scaling.as_str())]),
            );
        }
    }
    problem.condition_table = ConditionTable::new(conditions);
    problem
}

fn mapping_benchmark(c: &mut Criterion) {
    let problem = many_conditions(200);

    c.bench_function("mapping 200 conditions", |b| {
        b.iter(|| {
            let mappings = problem
                .get_optimization_to_simulation_parameter_mapping(&MappingOptions::default())
                .unwrap();
            black_box(mappings);
        })
    });

    let options = MappingOptions::default().with_num_threads(4);
    c.bench_function("mapping 200 conditions, 4 threads", |b| {
        b.iter(|| {
            let mappings = problem
                .get_optimization_to_simulation_parameter_mapping(&options)
                .unwrap();
            black_box(mappings);
        })
    });

    c.bench_function("lint 200 conditions", |b| {
        b.iter(|| black_box(problem.lint()))
    });
}

criterion_group!(benches, mapping_benchmark);
criterion_main!(benches);
