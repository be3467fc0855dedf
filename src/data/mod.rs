//! The PEtab tables and the vocabulary shared between them
//!
//! Every table is a typed collection of rows implementing [TsvTable], so it
//! can be read from and written to tab-separated files. The v1 condition table
//! is wide ([ConditionTable]), the v2 one is long ([ChangeTable]).
pub mod changes;
pub mod columns;
pub mod conditions;
pub mod experiments;
pub mod mapping;
pub mod measurements;
pub mod observables;
pub mod parameters;
pub mod table;

use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;

pub use changes::{Change, ChangeSet, ChangeTable};
pub use conditions::{Condition, ConditionTable};
pub use experiments::{Experiment, ExperimentPeriod, ExperimentTable};
pub use mapping::{Mapping, MappingTable};
pub use measurements::{Measurement, MeasurementTable, SimulationCondition};
pub use observables::{
    NoiseDistribution, Observable, ObservableTable, ObservableTransformation, PlaceholderKind,
};
pub use parameters::{
    scale, unscale, Parameter, ParameterScale, ParameterTable, PriorKind, PriorType,
};
pub use table::{RawTable, TableError, TsvTable};

use columns::PARAMETER_SEPARATOR;

/// A value that is either a number or a reference to a parameter
///
/// Used for override lists in the measurement table, cells of the condition
/// table and values of parameter mappings. Two `NaN` values compare equal so
/// that mappings with unmapped parameters can be compared.
#[derive(Debug, Clone)]
pub enum ParameterValue {
    Numeric(f64),
    Id(String),
}

impl ParameterValue {
    /// Interpret a cell: numbers become [ParameterValue::Numeric], everything
    /// else is kept as an identifier
    pub fn parse(s: &str) -> Self {
        match table::parse_float(s) {
            Some(v) => ParameterValue::Numeric(v),
            None => ParameterValue::Id(s.trim().to_string()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParameterValue::Numeric(v) => Some(*v),
            ParameterValue::Id(_) => None,
        }
    }

    pub fn as_id(&self) -> Option<&str> {
        match self {
            ParameterValue::Numeric(_) => None,
            ParameterValue::Id(id) => Some(id),
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ParameterValue::Numeric(_))
    }

    pub fn is_nan(&self) -> bool {
        matches!(self, ParameterValue::Numeric(v) if v.is_nan())
    }
}

impl PartialEq for ParameterValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ParameterValue::Numeric(a), ParameterValue::Numeric(b)) => {
                a == b || (a.is_nan() && b.is_nan())
            }
            (ParameterValue::Id(a), ParameterValue::Id(b)) => a == b,
            _ => false,
        }
    }
}

impl From<f64> for ParameterValue {
    fn from(v: f64) -> Self {
        ParameterValue::Numeric(v)
    }
}

impl From<&str> for ParameterValue {
    fn from(s: &str) -> Self {
        ParameterValue::Id(s.to_string())
    }
}

impl From<String> for ParameterValue {
    fn from(s: String) -> Self {
        ParameterValue::Id(s)
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::Numeric(v) => write!(f, "{}", table::format_float(*v)),
            ParameterValue::Id(id) => write!(f, "{}", id),
        }
    }
}

/// Convert a cell to a number if it parses as one, keep it as an id otherwise
pub fn to_float_if_float(s: &str) -> ParameterValue {
    ParameterValue::parse(s)
}

/// Check whether `s` is a valid PEtab identifier
///
/// Identifiers start with a letter or underscore, followed by letters,
/// digits or underscores.
pub fn is_valid_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

/// Check that all ids are valid identifiers
pub fn check_ids<I, S>(ids: I, kind: &str) -> Result<(), TableError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let invalid: Vec<String> = ids
        .into_iter()
        .filter(|id| !is_valid_identifier(id.as_ref()))
        .map(|id| id.as_ref().to_string())
        .collect();
    if invalid.is_empty() {
        Ok(())
    } else {
        Err(TableError::InvalidIds {
            kind: kind.to_string(),
            ids: invalid,
        })
    }
}

/// Check that no id occurs twice
pub fn check_unique_ids<I, S>(ids: I, kind: &str) -> Result<(), TableError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut duplicates = Vec::new();
    for id in ids {
        let id = id.as_ref().to_string();
        if !seen.insert(id.clone()) && !duplicates.contains(&id) {
            duplicates.push(id);
        }
    }
    if duplicates.is_empty() {
        Ok(())
    } else {
        Err(TableError::DuplicateIds {
            kind: kind.to_string(),
            ids: duplicates,
        })
    }
}

/// Deduplicate while keeping the first occurrence of every item
pub fn unique_preserve_order<T, I>(items: I) -> Vec<T>
where
    T: Clone + Eq + Hash,
    I: IntoIterator<Item = T>,
{
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

/// Split an `observableParameters` or `noiseParameters` cell
///
/// Entries are separated by `;` and trimmed. Each entry must be a number or
/// a valid parameter id. An empty cell gives an empty list.
pub fn split_parameter_replacement_list(s: &str) -> Result<Vec<ParameterValue>, TableError> {
    if s.trim().is_empty() {
        return Ok(Vec::new());
    }
    s.split(PARAMETER_SEPARATOR)
        .map(|entry| {
            let value = ParameterValue::parse(entry);
            match &value {
                ParameterValue::Id(id) if !is_valid_identifier(id) => {
                    Err(TableError::InvalidValue {
                        column: "parameter replacement list".to_string(),
                        value: s.to_string(),
                        reason: format!(
                            "`{}` is neither a number, nor a valid parameter ID",
                            entry.trim()
                        ),
                    })
                }
                _ => Ok(value),
            }
        })
        .collect()
}

/// Join an override list back into a cell
pub fn join_parameter_replacement_list(values: &[ParameterValue]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(&PARAMETER_SEPARATOR.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_valid_identifier() {
        assert!(is_valid_identifier("k1"));
        assert!(is_valid_identifier("_private"));
        assert!(is_valid_identifier("observableParameter1_obs"));
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("1k"));
        assert!(!is_valid_identifier("k-1"));
        assert!(!is_valid_identifier("k 1"));
    }

    #[test]
    fn test_check_ids_reports_offenders() {
        match check_ids(["a", "1b", "c d"], "parameter") {
            Err(TableError::InvalidIds { ids, .. }) => {
                assert_eq!(ids, vec!["1b".to_string(), "c d".to_string()])
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_split_parameter_replacement_list() {
        assert!(split_parameter_replacement_list("").unwrap().is_empty());
        assert_eq!(
            split_parameter_replacement_list("1.5; k1 ;inf").unwrap(),
            vec![
                ParameterValue::Numeric(1.5),
                ParameterValue::Id("k1".to_string()),
                ParameterValue::Numeric(f64::INFINITY)
            ]
        );
        assert!(split_parameter_replacement_list("k1;2k").is_err());
    }

    #[test]
    fn test_unique_preserve_order() {
        assert_eq!(unique_preserve_order(vec![3, 1, 3, 2, 1]), vec![3, 1, 2]);
    }

    #[test]
    fn test_nan_values_compare_equal() {
        assert_eq!(ParameterValue::from(f64::NAN), ParameterValue::from(f64::NAN));
        assert_ne!(ParameterValue::from(1.0), ParameterValue::from("k1"));
    }
}
