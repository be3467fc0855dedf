//! Mapping of optimization parameters to model parameters
//!
//! For every simulation condition, the model parameters are assigned either
//! a numeric value or the id of an optimization parameter. Values come from,
//! in increasing order of precedence:
//!
//! 1. the model itself
//! 2. placeholders of observable and noise formulas (reset to `NaN`)
//! 3. overrides in the measurement table
//! 4. the condition table
//! 5. the parameter table
//!
//! The result holds separate maps for the preequilibration and the
//! simulation phase, together with the scale each value is given on.

mod merge;

pub use merge::{handle_missing_overrides, merge_preeq_and_sim_pars, merge_preeq_and_sim_pars_condition};

use std::collections::BTreeMap;

use rayon::prelude::*;
use thiserror::Error;

use crate::data::mapping::resolve_mapping;
use crate::data::measurements::Measurement;
use crate::data::{
    scale, ConditionTable, MappingTable, MeasurementTable, ObservableTable, ParameterScale,
    ParameterTable, ParameterValue, PlaceholderKind, SimulationCondition, TableError,
};
use crate::model::Model;

/// Model parameter id to value or optimization parameter id
pub type ParMappingDict = BTreeMap<String, ParameterValue>;

/// Model parameter id to the scale its value is given on
pub type ScaleMappingDict = BTreeMap<String, ParameterScale>;

/// Errors that can occur while building a parameter mapping
#[derive(Error, Debug, Clone)]
pub enum MappingError {
    /// A table involved in the mapping is invalid
    #[error(transparent)]
    Table(#[from] TableError),

    /// Overrides differ between time points of one observable and condition
    #[error("Timepoint-specific parameter overrides currently unsupported.")]
    TimepointSpecificOverrides,

    /// `NaN` in the condition table for something that has no model value
    #[error("Not sure how to handle NaN in condition table for {parameter}.")]
    UnhandledNan { parameter: String },

    /// Preequilibration and simulation assign different values
    #[error(
        "Cannot handle different values for dynamic parameters: for condition {condition} \
         parameter {parameter} is {preeq} for preeq and {sim} for simulation."
    )]
    ConflictingValues {
        condition: usize,
        parameter: String,
        preeq: String,
        sim: String,
    },

    /// Preequilibration and simulation use different scales
    #[error(
        "Cannot handle different parameter scales for dynamic parameters: for condition \
         {condition} scale for parameter {parameter} is {preeq} for preeq and {sim} for simulation."
    )]
    ConflictingScales {
        condition: usize,
        parameter: String,
        preeq: ParameterScale,
        sim: ParameterScale,
    },

    /// The worker pool could not be created
    #[error("Failed to build thread pool: {0}")]
    ThreadPool(String),
}

/// Options of [get_optimization_to_simulation_parameter_mapping]
#[derive(Debug, Clone, PartialEq)]
pub struct MappingOptions {
    /// Warn about simulation parameters that remain unmapped (default: true)
    pub warn_unmapped: bool,

    /// Give nominal values of fixed parameters on parameter scale (default: false)
    pub scaled_parameters: bool,

    /// Replace fixed parameters by their nominal values (default: true)
    pub fill_fixed_parameters: bool,

    /// Tolerate numeric noise overrides that differ between time points (default: false)
    pub allow_timepoint_specific_numeric_noise_parameters: bool,

    /// Number of worker threads, 1 maps sequentially (default: 1)
    pub num_threads: usize,
}

impl Default for MappingOptions {
    fn default() -> Self {
        Self {
            warn_unmapped: true,
            scaled_parameters: false,
            fill_fixed_parameters: true,
            allow_timepoint_specific_numeric_noise_parameters: false,
            num_threads: 1,
        }
    }
}

impl MappingOptions {
    pub fn with_scaled_parameters(mut self, scaled: bool) -> Self {
        self.scaled_parameters = scaled;
        self
    }

    pub fn with_fill_fixed_parameters(mut self, fill: bool) -> Self {
        self.fill_fixed_parameters = fill;
        self
    }

    pub fn with_warn_unmapped(mut self, warn: bool) -> Self {
        self.warn_unmapped = warn;
        self
    }

    pub fn with_num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads;
        self
    }
}

/// Parameter and scale mappings of one simulation condition
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConditionMapping {
    pub map_preeq: ParMappingDict,
    pub map_sim: ParMappingDict,
    pub scale_map_preeq: ScaleMappingDict,
    pub scale_map_sim: ScaleMappingDict,
}

impl ConditionMapping {
    pub fn new(
        map_preeq: ParMappingDict,
        map_sim: ParMappingDict,
        scale_map_preeq: ScaleMappingDict,
        scale_map_sim: ScaleMappingDict,
    ) -> Self {
        ConditionMapping {
            map_preeq,
            map_sim,
            scale_map_preeq,
            scale_map_sim,
        }
    }
}

/// Tables and options shared by the mapping of all conditions
struct MappingContext<'a> {
    model: &'a dyn Model,
    condition_table: &'a ConditionTable,
    parameter_table: Option<&'a ParameterTable>,
    mapping_table: Option<&'a MappingTable>,
    simulation_parameters: ParMappingDict,
    options: &'a MappingOptions,
}

/// Build parameter and scale mappings for all simulation conditions
///
/// Conditions are the unique (simulation, preequilibration) pairs of the
/// measurement table, in sorted order. The preequilibration maps are empty
/// for conditions without preequilibration.
pub fn get_optimization_to_simulation_parameter_mapping(
    model: &dyn Model,
    condition_table: &ConditionTable,
    measurement_table: &MeasurementTable,
    parameter_table: Option<&ParameterTable>,
    observable_table: Option<&ObservableTable>,
    mapping_table: Option<&MappingTable>,
    options: &MappingOptions,
) -> Result<Vec<ConditionMapping>, MappingError> {
    let conditions = measurement_table.simulation_conditions();
    get_parameter_mapping_for_conditions(
        &conditions,
        model,
        condition_table,
        measurement_table,
        parameter_table,
        observable_table,
        mapping_table,
        options,
    )
}

/// As [get_optimization_to_simulation_parameter_mapping], for an explicit
/// list of simulation conditions
#[allow(clippy::too_many_arguments)]
pub fn get_parameter_mapping_for_conditions(
    conditions: &[SimulationCondition],
    model: &dyn Model,
    condition_table: &ConditionTable,
    measurement_table: &MeasurementTable,
    parameter_table: Option<&ParameterTable>,
    observable_table: Option<&ObservableTable>,
    mapping_table: Option<&MappingTable>,
    options: &MappingOptions,
) -> Result<Vec<ConditionMapping>, MappingError> {
    if measurement_table.has_timepoint_specific_mappings(
        options.allow_timepoint_specific_numeric_noise_parameters,
        false,
    ) {
        return Err(MappingError::TimepointSpecificOverrides);
    }

    let mut simulation_parameters: ParMappingDict = model
        .free_parameter_ids_with_values()
        .into_iter()
        .map(|(id, value)| (id, ParameterValue::Numeric(value)))
        .collect();
    if let Some(observables) = observable_table {
        for id in observables.output_parameters(model, true, true, mapping_table) {
            simulation_parameters.insert(id, ParameterValue::Numeric(f64::NAN));
        }
    }

    let has_overrides = measurement_table
        .measurements()
        .iter()
        .any(|m| !m.observable_parameters.is_empty() || !m.noise_parameters.is_empty());

    let context = MappingContext {
        model,
        condition_table,
        parameter_table,
        mapping_table,
        simulation_parameters,
        options,
    };

    let map_condition = |condition: &SimulationCondition| {
        let rows = if has_overrides {
            Some(measurement_table.rows_for_condition(condition))
        } else {
            None
        };
        context.map_condition(condition, rows.as_deref())
    };

    if options.num_threads > 1 {
        tracing::debug!(
            "Mapping {} conditions on {} threads",
            conditions.len(),
            options.num_threads
        );
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.num_threads)
            .build()
            .map_err(|e| MappingError::ThreadPool(e.to_string()))?;
        pool.install(|| conditions.par_iter().map(map_condition).collect())
    } else {
        conditions.iter().map(map_condition).collect()
    }
}

impl MappingContext<'_> {
    fn map_condition(
        &self,
        condition: &SimulationCondition,
        rows: Option<&[&Measurement]>,
    ) -> Result<ConditionMapping, MappingError> {
        let (map_preeq, scale_map_preeq) = if condition.has_preequilibration() {
            self.mapping_for_condition(&condition.preequilibration_condition_id, true, rows)?
        } else {
            (ParMappingDict::new(), ScaleMappingDict::new())
        };
        let (map_sim, scale_map_sim) =
            self.mapping_for_condition(&condition.simulation_condition_id, false, rows)?;
        Ok(ConditionMapping {
            map_preeq,
            map_sim,
            scale_map_preeq,
            scale_map_sim,
        })
    }

    fn mapping_for_condition(
        &self,
        condition_id: &str,
        is_preeq: bool,
        rows: Option<&[&Measurement]>,
    ) -> Result<(ParMappingDict, ScaleMappingDict), MappingError> {
        let mut par_mapping = self.simulation_parameters.clone();
        let mut scale_mapping: ScaleMappingDict = par_mapping
            .keys()
            .map(|id| (id.clone(), ParameterScale::Lin))
            .collect();
        output_parameters_to_nan(&mut par_mapping);

        // Also for preequilibration, to get equally sized parameter vectors
        if let Some(rows) = rows {
            apply_output_parameter_overrides(&mut par_mapping, rows);
        }

        if !is_preeq {
            handle_missing_overrides(&par_mapping, self.options.warn_unmapped, Some(condition_id));
        }

        apply_condition_parameters(
            &mut par_mapping,
            &mut scale_mapping,
            condition_id,
            self.condition_table,
            self.model,
            self.mapping_table,
        )?;
        if let Some(parameter_table) = self.parameter_table {
            apply_parameter_table(
                &mut par_mapping,
                &mut scale_mapping,
                parameter_table,
                self.options.scaled_parameters,
                self.options.fill_fixed_parameters,
            );
        }
        Ok((par_mapping, scale_mapping))
    }
}

/// Whether `id` looks like an observable or noise placeholder,
/// `(noise|observable)Parameter<N>_...`
pub fn is_output_placeholder(id: &str) -> bool {
    [PlaceholderKind::Observable, PlaceholderKind::Noise]
        .iter()
        .any(|kind| {
            id.strip_prefix(kind.prefix())
                .and_then(|rest| {
                    let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
                    (digits > 0).then(|| &rest[digits..])
                })
                .is_some_and(|rest| rest.starts_with('_'))
        })
}

fn output_parameters_to_nan(mapping: &mut ParMappingDict) {
    for (id, value) in mapping.iter_mut() {
        if is_output_placeholder(id) {
            *value = ParameterValue::Numeric(f64::NAN);
        }
    }
}

/// Assign measurement-specific overrides to their placeholders
///
/// Override counts are assumed to match the placeholder counts.
fn apply_output_parameter_overrides(mapping: &mut ParMappingDict, rows: &[&Measurement]) {
    for m in rows {
        for (kind, overrides) in [
            (PlaceholderKind::Observable, &m.observable_parameters),
            (PlaceholderKind::Noise, &m.noise_parameters),
        ] {
            for (i, value) in overrides.iter().enumerate() {
                mapping.insert(kind.placeholder(i + 1, &m.observable_id), value.clone());
            }
        }
    }
}

/// Apply the condition table
///
/// State variables are set elsewhere and skipped here. An empty cell keeps
/// the model value.
fn apply_condition_parameters(
    par_mapping: &mut ParMappingDict,
    scale_mapping: &mut ScaleMappingDict,
    condition_id: &str,
    condition_table: &ConditionTable,
    model: &dyn Model,
    mapping_table: Option<&MappingTable>,
) -> Result<(), MappingError> {
    if condition_table.columns().is_empty() {
        return Ok(());
    }
    let condition = condition_table
        .get(condition_id)
        .ok_or_else(|| TableError::NotFound {
            kind: "condition".to_string(),
            id: condition_id.to_string(),
        })?;

    for column in condition_table.columns() {
        let overridee_id = resolve_mapping(mapping_table, column);
        if model.is_state_variable(overridee_id) {
            continue;
        }
        let value = match condition.values.get(column) {
            Some(value) if !value.is_nan() => value.clone(),
            _ => model
                .parameter_value(overridee_id)
                .map(ParameterValue::Numeric)
                .ok_or_else(|| MappingError::UnhandledNan {
                    parameter: overridee_id.to_string(),
                })?,
        };
        par_mapping.insert(overridee_id.to_string(), value);
        scale_mapping.insert(overridee_id.to_string(), ParameterScale::Lin);
    }
    Ok(())
}

/// Apply the parameter table to the mapping of one condition
///
/// Parameters of the table that are already part of the mapping are mapped
/// to themselves. Every value referring to a table parameter takes the
/// parameter's scale. With `fill_fixed_parameters`, fixed parameters are
/// replaced by their nominal value, on parameter scale if
/// `scaled_parameters` and on linear scale otherwise.
pub fn apply_parameter_table(
    par_mapping: &mut ParMappingDict,
    scale_mapping: &mut ScaleMappingDict,
    parameter_table: &ParameterTable,
    scaled_parameters: bool,
    fill_fixed_parameters: bool,
) {
    for parameter in parameter_table.parameters() {
        if let Some(value) = par_mapping.get_mut(&parameter.id) {
            *value = ParameterValue::Id(parameter.id.clone());
        }
    }

    for (problem_par, sim_par) in par_mapping.iter_mut() {
        let Some(parameter) = sim_par.as_id().and_then(|id| parameter_table.get(id)) else {
            continue;
        };
        scale_mapping.insert(problem_par.clone(), parameter.scale);

        if !fill_fixed_parameters || parameter.estimate {
            continue;
        }
        let nominal = parameter.nominal_value.unwrap_or(f64::NAN);
        if scaled_parameters {
            *sim_par = ParameterValue::Numeric(scale(nominal, parameter.scale));
        } else {
            scale_mapping.insert(problem_par.clone(), ParameterScale::Lin);
            *sim_par = ParameterValue::Numeric(nominal);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Parameter;

    #[test]
    fn test_is_output_placeholder() {
        assert!(is_output_placeholder("observableParameter1_obs1"));
        assert!(is_output_placeholder("noiseParameter12_x"));
        assert!(!is_output_placeholder("noiseParameter_obs1"));
        assert!(!is_output_placeholder("noiseParameter1obs1"));
        assert!(!is_output_placeholder("k1"));
    }

    #[test]
    fn test_fill_in_nominal_values() {
        let parameters = ParameterTable::new(vec![
            Parameter::new("estimated").with_nominal_value(0.0),
            Parameter::new("not_estimated")
                .with_nominal_value(2.0)
                .with_estimate(false),
        ]);
        let mut par_mapping: ParMappingDict = [
            ("estimated".to_string(), ParameterValue::from("estimated")),
            ("not_estimated".to_string(), ParameterValue::from("not_estimated")),
        ]
        .into_iter()
        .collect();
        let mut scale_mapping: ScaleMappingDict = [
            ("estimated".to_string(), ParameterScale::Lin),
            ("not_estimated".to_string(), ParameterScale::Lin),
        ]
        .into_iter()
        .collect();

        apply_parameter_table(&mut par_mapping, &mut scale_mapping, &parameters, false, true);

        assert_eq!(par_mapping["estimated"], ParameterValue::from("estimated"));
        assert_eq!(par_mapping["not_estimated"], ParameterValue::Numeric(2.0));
        assert_eq!(scale_mapping["not_estimated"], ParameterScale::Lin);
    }

    #[test]
    fn test_scaled_fixed_parameter_keeps_scale() {
        let parameters = ParameterTable::new(vec![Parameter::new("p")
            .with_scale(ParameterScale::Log10)
            .with_nominal_value(1000.0)
            .with_estimate(false)]);
        let mut par_mapping: ParMappingDict =
            [("k".to_string(), ParameterValue::from("p"))].into_iter().collect();
        let mut scale_mapping: ScaleMappingDict =
            [("k".to_string(), ParameterScale::Lin)].into_iter().collect();

        apply_parameter_table(&mut par_mapping, &mut scale_mapping, &parameters, true, true);

        assert_eq!(par_mapping["k"], ParameterValue::Numeric(3.0));
        assert_eq!(scale_mapping["k"], ParameterScale::Log10);
    }
}
