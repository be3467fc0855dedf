use serde::Deserialize;

use crate::data::columns::*;
use crate::data::is_valid_identifier;
use crate::data::table::{
    deserialize_f64, deserialize_option_string, format_float, RawTable, TableError, TsvTable,
};

/// A period of an experiment, starting at `time` with `condition_id` applied
#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentPeriod {
    /// Start time, finite or `-inf` for preequilibration
    pub time: f64,
    pub condition_id: Option<String>,
}

impl ExperimentPeriod {
    pub fn new(time: f64, condition_id: Option<&str>) -> Result<Self, TableError> {
        if time.is_nan() || time == f64::INFINITY {
            return Err(TableError::InvalidValue {
                column: TIME.to_string(),
                value: format_float(time),
                reason: "time value must be finite or -inf".to_string(),
            });
        }
        let condition_id = condition_id.filter(|id| !id.is_empty());
        if let Some(id) = condition_id {
            if !is_valid_identifier(id) {
                return Err(TableError::InvalidIds {
                    kind: CONDITION_ID.to_string(),
                    ids: vec![id.to_string()],
                });
            }
        }
        Ok(ExperimentPeriod {
            time,
            condition_id: condition_id.map(String::from),
        })
    }

    /// Whether this period is a preequilibration
    pub fn is_preequilibration(&self) -> bool {
        self.time == f64::NEG_INFINITY
    }
}

/// A timecourse: the ordered periods of one experiment id
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Experiment {
    pub id: String,
    pub periods: Vec<ExperimentPeriod>,
}

impl Experiment {
    pub fn new(id: impl Into<String>) -> Self {
        Experiment {
            id: id.into(),
            periods: Vec::new(),
        }
    }

    /// A copy with `period` appended
    pub fn with_period(&self, period: ExperimentPeriod) -> Self {
        let mut experiment = self.clone();
        experiment.push(period);
        experiment
    }

    pub fn push(&mut self, period: ExperimentPeriod) {
        self.periods.push(period);
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExperimentRow {
    experiment_id: String,
    #[serde(deserialize_with = "deserialize_f64")]
    time: f64,
    #[serde(default, deserialize_with = "deserialize_option_string")]
    condition_id: Option<String>,
}

/// The experiments table
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExperimentTable {
    experiments: Vec<Experiment>,
}

impl ExperimentTable {
    pub fn new(experiments: Vec<Experiment>) -> Self {
        ExperimentTable { experiments }
    }

    pub fn experiments(&self) -> &[Experiment] {
        &self.experiments
    }

    pub fn len(&self) -> usize {
        self.experiments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.experiments.is_empty()
    }

    pub fn get(&self, experiment_id: &str) -> Option<&Experiment> {
        self.experiments.iter().find(|e| e.id == experiment_id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.experiments.iter().map(|e| e.id.clone()).collect()
    }

    pub fn push(&mut self, experiment: Experiment) {
        self.experiments.push(experiment);
    }

    /// Condition ids referenced by any period
    pub fn condition_ids(&self) -> Vec<String> {
        crate::data::unique_preserve_order(
            self.experiments
                .iter()
                .flat_map(|e| e.periods.iter())
                .filter_map(|p| p.condition_id.clone()),
        )
    }
}

impl Extend<ExperimentTable> for ExperimentTable {
    fn extend<T: IntoIterator<Item = ExperimentTable>>(&mut self, iter: T) {
        for table in iter {
            self.experiments.extend(table.experiments);
        }
    }
}

impl TsvTable for ExperimentTable {
    const TABLE: &'static str = "experiment";

    fn from_raw(raw: &RawTable) -> Result<Self, TableError> {
        raw.require_columns(&[EXPERIMENT_ID, TIME], Self::TABLE)?;
        let rows: Vec<ExperimentRow> = raw.deserialize(Self::TABLE)?;
        let mut experiments: Vec<Experiment> = Vec::new();
        for row in rows {
            if !is_valid_identifier(&row.experiment_id) {
                return Err(TableError::InvalidIds {
                    kind: EXPERIMENT_ID.to_string(),
                    ids: vec![row.experiment_id],
                });
            }
            let period = ExperimentPeriod::new(row.time, row.condition_id.as_deref())?;
            match experiments.iter_mut().find(|e| e.id == row.experiment_id) {
                Some(experiment) => experiment.push(period),
                None => experiments.push(Experiment {
                    id: row.experiment_id,
                    periods: vec![period],
                }),
            }
        }
        Ok(ExperimentTable { experiments })
    }

    fn to_raw(&self) -> RawTable {
        let mut raw = RawTable::new(vec![
            EXPERIMENT_ID.to_string(),
            TIME.to_string(),
            CONDITION_ID.to_string(),
        ]);
        for experiment in &self.experiments {
            for period in &experiment.periods {
                raw.push_row(vec![
                    experiment.id.clone(),
                    format_float(period.time),
                    period.condition_id.clone().unwrap_or_default(),
                ]);
            }
        }
        raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TSV: &str = "experimentId\ttime\tconditionId\ne1\t-inf\tpreeq\ne1\t0\tstim\ne2\t0\t\n";

    #[test]
    fn test_read_experiments() {
        let table = ExperimentTable::from_reader(TSV.as_bytes()).unwrap();
        assert_eq!(table.len(), 2);
        let e1 = table.get("e1").unwrap();
        assert_eq!(e1.periods.len(), 2);
        assert!(e1.periods[0].is_preequilibration());
        assert_eq!(e1.periods[1].condition_id.as_deref(), Some("stim"));
        assert_eq!(table.get("e2").unwrap().periods[0].condition_id, None);
        assert_eq!(table.condition_ids(), vec!["preeq".to_string(), "stim".to_string()]);
    }

    #[test]
    fn test_period_time_must_not_be_inf() {
        assert!(ExperimentPeriod::new(f64::INFINITY, None).is_err());
        assert!(ExperimentPeriod::new(f64::NAN, None).is_err());
        assert!(ExperimentPeriod::new(f64::NEG_INFINITY, Some("c1")).is_ok());
        assert!(ExperimentPeriod::new(0.0, Some("1c")).is_err());
    }

    #[test]
    fn test_add_periods() {
        let experiment = Experiment::new("e1");
        let extended = experiment.with_period(ExperimentPeriod::new(0.0, Some("c1")).unwrap());
        assert!(experiment.periods.is_empty());
        assert_eq!(extended.periods.len(), 1);

        let mut in_place = Experiment::new("e1");
        in_place.push(ExperimentPeriod::new(10.0, None).unwrap());
        assert_eq!(in_place.periods[0].time, 10.0);
    }

    #[test]
    fn test_write_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("experiments.tsv");
        let table = ExperimentTable::from_reader(TSV.as_bytes()).unwrap();
        table.to_path(&path).unwrap();
        assert_eq!(ExperimentTable::from_path(&path).unwrap(), table);
    }
}
