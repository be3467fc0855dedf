use std::collections::{BTreeSet, HashMap, HashSet};

use serde::Deserialize;

use crate::data::columns::*;
use crate::data::observables::{ObservableTable, PlaceholderKind};
use crate::data::table::{
    deserialize_f64, deserialize_option_string, format_float, RawTable, TableError, TsvTable,
};
use crate::data::{
    join_parameter_replacement_list, split_parameter_replacement_list, unique_preserve_order,
    ParameterValue,
};

/// Whether a measurement time denotes steady state
pub fn is_at_steady_state(time: f64) -> bool {
    time.is_infinite()
}

const OPTIONAL_COLUMNS: [&str; 7] = [
    PREEQUILIBRATION_CONDITION_ID,
    SIMULATION_CONDITION_ID,
    EXPERIMENT_ID,
    OBSERVABLE_PARAMETERS,
    NOISE_PARAMETERS,
    DATASET_ID,
    REPLICATE_ID,
];

/// A row of the measurement (or simulation) table
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub observable_id: String,
    pub preequilibration_condition_id: Option<String>,
    pub simulation_condition_id: Option<String>,
    pub experiment_id: Option<String>,
    /// Measured value, or simulated value in a simulation table
    pub measurement: f64,
    pub time: f64,
    pub observable_parameters: Vec<ParameterValue>,
    pub noise_parameters: Vec<ParameterValue>,
    pub dataset_id: Option<String>,
    pub replicate_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MeasurementRow {
    observable_id: String,
    #[serde(default, deserialize_with = "deserialize_option_string")]
    preequilibration_condition_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_option_string")]
    simulation_condition_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_option_string")]
    experiment_id: Option<String>,
    #[serde(alias = "simulation", alias = "residual", deserialize_with = "deserialize_f64")]
    measurement: f64,
    #[serde(deserialize_with = "deserialize_f64")]
    time: f64,
    #[serde(default, deserialize_with = "deserialize_option_string")]
    observable_parameters: Option<String>,
    #[serde(default, deserialize_with = "deserialize_option_string")]
    noise_parameters: Option<String>,
    #[serde(default, deserialize_with = "deserialize_option_string")]
    dataset_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_option_string")]
    replicate_id: Option<String>,
}

impl MeasurementRow {
    fn into_measurement(self) -> Result<Measurement, TableError> {
        Ok(Measurement {
            observable_parameters: split_parameter_replacement_list(
                self.observable_parameters.as_deref().unwrap_or(""),
            )?,
            noise_parameters: split_parameter_replacement_list(
                self.noise_parameters.as_deref().unwrap_or(""),
            )?,
            observable_id: self.observable_id,
            preequilibration_condition_id: self.preequilibration_condition_id,
            simulation_condition_id: self.simulation_condition_id,
            experiment_id: self.experiment_id,
            measurement: self.measurement,
            time: self.time,
            dataset_id: self.dataset_id,
            replicate_id: self.replicate_id,
        })
    }
}

impl Measurement {
    pub fn new(
        observable_id: impl Into<String>,
        simulation_condition_id: impl Into<String>,
        time: f64,
        measurement: f64,
    ) -> Self {
        Measurement {
            observable_id: observable_id.into(),
            preequilibration_condition_id: None,
            simulation_condition_id: Some(simulation_condition_id.into()),
            experiment_id: None,
            measurement,
            time,
            observable_parameters: Vec::new(),
            noise_parameters: Vec::new(),
            dataset_id: None,
            replicate_id: None,
        }
    }

    pub fn with_preequilibration(mut self, condition_id: impl Into<String>) -> Self {
        self.preequilibration_condition_id = Some(condition_id.into());
        self
    }

    pub fn with_observable_parameters(mut self, values: Vec<ParameterValue>) -> Self {
        self.observable_parameters = values;
        self
    }

    pub fn with_noise_parameters(mut self, values: Vec<ParameterValue>) -> Self {
        self.noise_parameters = values;
        self
    }

    /// The simulation condition this measurement belongs to
    pub fn simulation_condition(&self) -> SimulationCondition {
        SimulationCondition {
            simulation_condition_id: self.simulation_condition_id.clone().unwrap_or_default(),
            preequilibration_condition_id: self
                .preequilibration_condition_id
                .clone()
                .unwrap_or_default(),
        }
    }

    pub fn is_at_steady_state(&self) -> bool {
        is_at_steady_state(self.time)
    }

    /// Override lists with numeric single values masked out where allowed
    fn override_key(&self, allow_numeric_observable: bool, allow_numeric_noise: bool) -> (String, String) {
        let mask = |values: &[ParameterValue], allow: bool| match values {
            [ParameterValue::Numeric(_)] if allow => String::new(),
            _ => join_parameter_replacement_list(values),
        };
        (
            mask(self.observable_parameters.as_slice(), allow_numeric_observable),
            mask(self.noise_parameters.as_slice(), allow_numeric_noise),
        )
    }
}

/// A combination of simulation and preequilibration condition
///
/// A missing preequilibration condition is the empty string. Ordering is by
/// simulation condition first.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SimulationCondition {
    pub simulation_condition_id: String,
    pub preequilibration_condition_id: String,
}

impl SimulationCondition {
    pub fn new(
        simulation_condition_id: impl Into<String>,
        preequilibration_condition_id: impl Into<String>,
    ) -> Self {
        SimulationCondition {
            simulation_condition_id: simulation_condition_id.into(),
            preequilibration_condition_id: preequilibration_condition_id.into(),
        }
    }

    pub fn has_preequilibration(&self) -> bool {
        !self.preequilibration_condition_id.is_empty()
    }
}

/// The measurement table, or a simulation table with the same layout
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementTable {
    measurements: Vec<Measurement>,
    value_column: &'static str,
    /// Optional columns of the file the table was read from
    columns: BTreeSet<&'static str>,
}

impl Default for MeasurementTable {
    fn default() -> Self {
        MeasurementTable {
            measurements: Vec::new(),
            value_column: MEASUREMENT,
            columns: BTreeSet::new(),
        }
    }
}

impl MeasurementTable {
    pub fn new(measurements: Vec<Measurement>) -> Self {
        MeasurementTable {
            measurements,
            ..Default::default()
        }
    }

    /// A simulation table: the value column is written as `simulation`
    pub fn new_simulation(measurements: Vec<Measurement>) -> Self {
        MeasurementTable {
            measurements,
            value_column: SIMULATION,
            ..Default::default()
        }
    }

    /// A residual table: the value column is written as `residual`
    pub fn new_residual(measurements: Vec<Measurement>) -> Self {
        MeasurementTable {
            measurements,
            value_column: RESIDUAL,
            ..Default::default()
        }
    }

    pub fn is_simulation(&self) -> bool {
        self.value_column == SIMULATION
    }

    /// Name of the value column: measurement, simulation or residual
    pub fn value_column(&self) -> &'static str {
        self.value_column
    }

    /// Whether the table has `column`
    ///
    /// Optional columns exist if the table was read with them or if any row
    /// has a value in them.
    pub fn has_column(&self, column: &str) -> bool {
        if column == OBSERVABLE_ID
            || column == TIME
            || column == self.value_column
            || self.columns.contains(column)
        {
            return true;
        }
        let ms = &self.measurements;
        match column {
            PREEQUILIBRATION_CONDITION_ID => ms.iter().any(|m| m.preequilibration_condition_id.is_some()),
            SIMULATION_CONDITION_ID => ms.iter().any(|m| m.simulation_condition_id.is_some()),
            EXPERIMENT_ID => ms.iter().any(|m| m.experiment_id.is_some()),
            OBSERVABLE_PARAMETERS => ms.iter().any(|m| !m.observable_parameters.is_empty()),
            NOISE_PARAMETERS => ms.iter().any(|m| !m.noise_parameters.is_empty()),
            DATASET_ID => ms.iter().any(|m| m.dataset_id.is_some()),
            REPLICATE_ID => ms.iter().any(|m| m.replicate_id.is_some()),
            _ => false,
        }
    }

    pub fn measurements(&self) -> &[Measurement] {
        &self.measurements
    }

    pub fn measurements_mut(&mut self) -> &mut [Measurement] {
        &mut self.measurements
    }

    pub fn len(&self) -> usize {
        self.measurements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty()
    }

    pub fn push(&mut self, measurement: Measurement) {
        self.measurements.push(measurement);
    }

    /// Unique simulation conditions, sorted
    pub fn simulation_conditions(&self) -> Vec<SimulationCondition> {
        self.measurements
            .iter()
            .map(Measurement::simulation_condition)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Rows measured under `condition`
    pub fn rows_for_condition(&self, condition: &SimulationCondition) -> Vec<&Measurement> {
        self.measurements
            .iter()
            .filter(|m| {
                m.simulation_condition_id.as_deref().unwrap_or("")
                    == condition.simulation_condition_id
                    && m.preequilibration_condition_id.as_deref().unwrap_or("")
                        == condition.preequilibration_condition_id
            })
            .collect()
    }

    /// Parameter ids used as observable or noise overrides
    pub fn measurement_parameter_ids(&self) -> Vec<String> {
        let observable = self
            .measurements
            .iter()
            .flat_map(|m| m.observable_parameters.iter());
        let noise = self.measurements.iter().flat_map(|m| m.noise_parameters.iter());
        unique_preserve_order(
            observable
                .chain(noise)
                .filter_map(|v| v.as_id().map(String::from)),
        )
    }

    /// Whether any observable is measured more than once at the same time
    /// under the same condition
    pub fn has_replicates(&self) -> bool {
        let mut seen = HashSet::new();
        !self.measurements.iter().all(|m| {
            seen.insert((
                m.observable_id.clone(),
                m.simulation_condition(),
                m.time.to_bits(),
            ))
        })
    }

    /// Every row must provide exactly as many overrides as its observable has
    /// placeholders
    ///
    /// Without noise placeholders, a single numeric noise parameter is still
    /// allowed.
    pub fn assert_overrides_match_parameter_count(
        &self,
        observables: &ObservableTable,
    ) -> Result<(), TableError> {
        let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
        for o in observables.observables() {
            counts.insert(
                &o.id,
                (
                    o.placeholders(PlaceholderKind::Observable)?.len(),
                    o.placeholders(PlaceholderKind::Noise)?.len(),
                ),
            );
        }

        for m in &self.measurements {
            let Some(&(expected_observable, expected_noise)) = counts.get(m.observable_id.as_str())
            else {
                return Err(TableError::NotFound {
                    kind: OBSERVABLE_ID.to_string(),
                    id: m.observable_id.clone(),
                });
            };
            if m.observable_parameters.len() != expected_observable {
                return Err(TableError::InvalidValue {
                    column: OBSERVABLE_PARAMETERS.to_string(),
                    value: join_parameter_replacement_list(&m.observable_parameters),
                    reason: format!(
                        "mismatch of observable parameter overrides for {}: expected {} but got {}",
                        m.observable_id,
                        expected_observable,
                        m.observable_parameters.len()
                    ),
                });
            }
            let noise_ok = if expected_noise == 0 {
                match m.noise_parameters.as_slice() {
                    [] | [ParameterValue::Numeric(_)] => true,
                    _ => false,
                }
            } else {
                m.noise_parameters.len() == expected_noise
            };
            if !noise_ok {
                return Err(TableError::InvalidValue {
                    column: NOISE_PARAMETERS.to_string(),
                    value: join_parameter_replacement_list(&m.noise_parameters),
                    reason: format!(
                        "mismatch of noise parameter overrides for {}: expected {} but got {}",
                        m.observable_id,
                        expected_noise,
                        m.noise_parameters.len()
                    ),
                });
            }
        }
        Ok(())
    }

    /// Whether overrides differ between time points of the same observable
    /// and condition
    ///
    /// Single numeric override lists can be exempted per column.
    pub fn has_timepoint_specific_mappings(
        &self,
        allow_scalar_numeric_noise_parameters: bool,
        allow_scalar_numeric_observable_parameters: bool,
    ) -> bool {
        let mut with_overrides = HashSet::new();
        let mut without_overrides = HashSet::new();
        for m in &self.measurements {
            let condition = m.simulation_condition();
            let overrides = m.override_key(
                allow_scalar_numeric_observable_parameters,
                allow_scalar_numeric_noise_parameters,
            );
            with_overrides.insert((m.observable_id.clone(), condition.clone(), overrides));
            without_overrides.insert((m.observable_id.clone(), condition));
        }
        with_overrides.len() != without_overrides.len()
    }
}

impl Extend<MeasurementTable> for MeasurementTable {
    fn extend<T: IntoIterator<Item = MeasurementTable>>(&mut self, iter: T) {
        for table in iter {
            if table.is_simulation() {
                self.value_column = SIMULATION;
            }
            self.columns.extend(table.columns);
            self.measurements.extend(table.measurements);
        }
    }
}

impl TsvTable for MeasurementTable {
    const TABLE: &'static str = "measurement";

    fn from_raw(raw: &RawTable) -> Result<Self, TableError> {
        let value_column = [MEASUREMENT, SIMULATION, RESIDUAL]
            .into_iter()
            .find(|col| raw.has_column(col))
            .unwrap_or(MEASUREMENT);
        raw.require_columns(&[OBSERVABLE_ID, value_column, TIME], Self::TABLE)?;
        let rows: Vec<MeasurementRow> = raw.deserialize(Self::TABLE)?;
        let measurements = rows
            .into_iter()
            .map(MeasurementRow::into_measurement)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(MeasurementTable {
            measurements,
            value_column,
            columns: OPTIONAL_COLUMNS
                .into_iter()
                .filter(|col| raw.has_column(col))
                .collect(),
        })
    }

    fn to_raw(&self) -> RawTable {
        let ms = &self.measurements;
        let present = |col: &str| self.has_column(col);

        let mut headers = vec![OBSERVABLE_ID];
        for col in [PREEQUILIBRATION_CONDITION_ID, SIMULATION_CONDITION_ID, EXPERIMENT_ID] {
            if present(col) {
                headers.push(col);
            }
        }
        headers.extend([self.value_column, TIME]);
        for col in [OBSERVABLE_PARAMETERS, NOISE_PARAMETERS, DATASET_ID, REPLICATE_ID] {
            if present(col) {
                headers.push(col);
            }
        }

        let mut raw = RawTable::new(headers.iter().map(|h| h.to_string()).collect());
        for m in ms {
            let row = headers
                .iter()
                .map(|col| match *col {
                    OBSERVABLE_ID => m.observable_id.clone(),
                    PREEQUILIBRATION_CONDITION_ID => {
                        m.preequilibration_condition_id.clone().unwrap_or_default()
                    }
                    SIMULATION_CONDITION_ID => m.simulation_condition_id.clone().unwrap_or_default(),
                    EXPERIMENT_ID => m.experiment_id.clone().unwrap_or_default(),
                    TIME => format_float(m.time),
                    OBSERVABLE_PARAMETERS => join_parameter_replacement_list(&m.observable_parameters),
                    NOISE_PARAMETERS => join_parameter_replacement_list(&m.noise_parameters),
                    DATASET_ID => m.dataset_id.clone().unwrap_or_default(),
                    REPLICATE_ID => m.replicate_id.clone().unwrap_or_default(),
                    _ => format_float(m.measurement),
                })
                .collect();
            raw.push_row(row);
        }
        raw
    }
}
