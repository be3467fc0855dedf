use std::collections::{BTreeMap, HashMap};

use crate::calculate::CalculationError;
use crate::data::{
    Measurement, Observable, ObservableTable, ParameterTable, ParameterValue, PlaceholderKind,
};
use crate::math::{Expr, MathError};

/// Noise formulas by observable id; observables without one map to `None`
pub fn get_symbolic_noise_formulas(observables: &ObservableTable) -> BTreeMap<String, Option<Expr>> {
    observables
        .observables()
        .iter()
        .map(|o| (o.id.clone(), o.noise_formula.clone()))
        .collect()
}

/// Evaluate the noise formula of `observable` for one measurement
///
/// Placeholders are replaced by the measurement's overrides, the observable
/// id by `simulation`, and parameter ids by their nominal values. Overrides
/// naming a parameter also take that parameter's nominal value. Model
/// states are not supported: any remaining symbol is an error.
pub fn evaluate_noise_formula(
    measurement: &Measurement,
    observable: &Observable,
    parameters: &ParameterTable,
    simulation: f64,
) -> Result<f64, CalculationError> {
    let formula = observable
        .noise_formula
        .as_ref()
        .ok_or_else(|| CalculationError::MissingNoiseFormula(observable.id.clone()))?;

    let mut values: HashMap<String, f64> = parameters
        .parameters()
        .iter()
        .filter_map(|p| p.nominal_value.map(|v| (p.id.clone(), v)))
        .collect();
    values.insert(observable.id.clone(), simulation);

    for (kind, overrides) in [
        (PlaceholderKind::Observable, &measurement.observable_parameters),
        (PlaceholderKind::Noise, &measurement.noise_parameters),
    ] {
        let placeholders = observable.placeholders(kind)?;
        for (placeholder, value) in placeholders.into_iter().zip(overrides) {
            let value = match value {
                ParameterValue::Numeric(v) => *v,
                ParameterValue::Id(id) => parameters
                    .get(id)
                    .and_then(|p| p.nominal_value)
                    .ok_or_else(|| CalculationError::UnknownParameter(id.clone()))?,
            };
            values.insert(placeholder, value);
        }
    }

    formula.eval(&values).map_err(|e| match e {
        MathError::UnresolvedSymbols { missing, .. } => CalculationError::UnresolvedNoiseFormula {
            observable_id: observable.id.clone(),
            formula: formula.to_string(),
            missing,
        },
        other => CalculationError::Math(other),
    })
}
