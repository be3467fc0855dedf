use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer};

use crate::data::columns::*;
use crate::data::table::{
    deserialize_option, deserialize_option_f64, deserialize_option_string, format_float,
    format_option_float, RawTable, TableError, TsvTable,
};
use crate::data::{check_ids, check_unique_ids};

/// Scale on which a parameter is estimated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ParameterScale {
    #[default]
    Lin,
    Log,
    Log10,
}

impl ParameterScale {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterScale::Lin => "lin",
            ParameterScale::Log => "log",
            ParameterScale::Log10 => "log10",
        }
    }
}

impl FromStr for ParameterScale {
    type Err = TableError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "lin" => Ok(ParameterScale::Lin),
            "log" => Ok(ParameterScale::Log),
            "log10" => Ok(ParameterScale::Log10),
            other => Err(TableError::InvalidValue {
                column: PARAMETER_SCALE.to_string(),
                value: other.to_string(),
                reason: "expected one of lin, log, log10".to_string(),
            }),
        }
    }
}

impl fmt::Display for ParameterScale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Transform a value from linear to parameter scale
pub fn scale(x: f64, scale: ParameterScale) -> f64 {
    match scale {
        ParameterScale::Lin => x,
        ParameterScale::Log => x.ln(),
        ParameterScale::Log10 => x.log10(),
    }
}

/// Transform a value from parameter scale to linear scale
pub fn unscale(x: f64, scale: ParameterScale) -> f64 {
    match scale {
        ParameterScale::Lin => x,
        ParameterScale::Log => x.exp(),
        ParameterScale::Log10 => 10f64.powf(x),
    }
}

/// Distribution families allowed for initialization and objective priors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PriorType {
    Normal,
    Laplace,
    Uniform,
    LogNormal,
    LogLaplace,
    ParameterScaleNormal,
    ParameterScaleLaplace,
    ParameterScaleUniform,
}

impl PriorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriorType::Normal => "normal",
            PriorType::Laplace => "laplace",
            PriorType::Uniform => "uniform",
            PriorType::LogNormal => "logNormal",
            PriorType::LogLaplace => "logLaplace",
            PriorType::ParameterScaleNormal => "parameterScaleNormal",
            PriorType::ParameterScaleLaplace => "parameterScaleLaplace",
            PriorType::ParameterScaleUniform => "parameterScaleUniform",
        }
    }

    /// Whether the prior parameters refer to the parameter scale
    pub fn is_on_parameter_scale(&self) -> bool {
        matches!(
            self,
            PriorType::ParameterScaleNormal
                | PriorType::ParameterScaleLaplace
                | PriorType::ParameterScaleUniform
        )
    }
}

impl FromStr for PriorType {
    type Err = TableError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim() {
            "normal" => PriorType::Normal,
            "laplace" => PriorType::Laplace,
            "uniform" => PriorType::Uniform,
            "logNormal" => PriorType::LogNormal,
            "logLaplace" => PriorType::LogLaplace,
            "parameterScaleNormal" => PriorType::ParameterScaleNormal,
            "parameterScaleLaplace" => PriorType::ParameterScaleLaplace,
            "parameterScaleUniform" => PriorType::ParameterScaleUniform,
            other => {
                return Err(TableError::InvalidValue {
                    column: "priorType".to_string(),
                    value: other.to_string(),
                    reason: "unknown prior type".to_string(),
                })
            }
        })
    }
}

impl fmt::Display for PriorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which of the two prior column pairs to use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriorKind {
    Initialization,
    Objective,
}

/// A row of the parameter table
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parameter {
    #[serde(rename = "parameterId")]
    pub id: String,
    #[serde(
        rename = "parameterName",
        default,
        deserialize_with = "deserialize_option_string"
    )]
    pub name: Option<String>,
    #[serde(
        rename = "parameterScale",
        default,
        deserialize_with = "deserialize_scale"
    )]
    pub scale: ParameterScale,
    #[serde(default, deserialize_with = "deserialize_option_f64")]
    pub lower_bound: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_option_f64")]
    pub upper_bound: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_option_f64")]
    pub nominal_value: Option<f64>,
    #[serde(default = "default_estimate", deserialize_with = "deserialize_estimate")]
    pub estimate: bool,
    #[serde(default, deserialize_with = "deserialize_option_string")]
    pub initialization_prior_type: Option<String>,
    #[serde(default, deserialize_with = "deserialize_option_string")]
    pub initialization_prior_parameters: Option<String>,
    #[serde(default, deserialize_with = "deserialize_option_string")]
    pub objective_prior_type: Option<String>,
    #[serde(default, deserialize_with = "deserialize_option_string")]
    pub objective_prior_parameters: Option<String>,
}

fn default_estimate() -> bool {
    true
}

fn deserialize_scale<'de, D>(deserializer: D) -> Result<ParameterScale, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(deserialize_option::<ParameterScale, D>(deserializer)?.unwrap_or_default())
}

// `estimate` accepts 0/1 as well as true/false
fn deserialize_estimate<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let s: Option<String> = Option::deserialize(deserializer)?;
    match s.as_deref().map(|s| s.trim().to_ascii_lowercase()).as_deref() {
        None | Some("") => Ok(true),
        Some("1") | Some("1.0") | Some("true") => Ok(true),
        Some("0") | Some("0.0") | Some("false") => Ok(false),
        Some(other) => Err(serde::de::Error::custom(format!(
            "Invalid value for estimate: {}. Must be `true` or `false`.",
            other
        ))),
    }
}

impl Parameter {
    /// An estimated parameter on linear scale without bounds
    pub fn new(id: impl Into<String>) -> Self {
        Parameter {
            id: id.into(),
            name: None,
            scale: ParameterScale::Lin,
            lower_bound: None,
            upper_bound: None,
            nominal_value: None,
            estimate: true,
            initialization_prior_type: None,
            initialization_prior_parameters: None,
            objective_prior_type: None,
            objective_prior_parameters: None,
        }
    }

    pub fn with_scale(mut self, scale: ParameterScale) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_bounds(mut self, lower: f64, upper: f64) -> Self {
        self.lower_bound = Some(lower);
        self.upper_bound = Some(upper);
        self
    }

    pub fn with_nominal_value(mut self, value: f64) -> Self {
        self.nominal_value = Some(value);
        self
    }

    pub fn with_estimate(mut self, estimate: bool) -> Self {
        self.estimate = estimate;
        self
    }

    pub fn with_prior(mut self, kind: PriorKind, prior_type: PriorType, parameters: (f64, f64)) -> Self {
        let params = format!("{};{}", format_float(parameters.0), format_float(parameters.1));
        match kind {
            PriorKind::Initialization => {
                self.initialization_prior_type = Some(prior_type.to_string());
                self.initialization_prior_parameters = Some(params);
            }
            PriorKind::Objective => {
                self.objective_prior_type = Some(prior_type.to_string());
                self.objective_prior_parameters = Some(params);
            }
        }
        self
    }

    /// Prior type and parameters, `None` if neither is set
    ///
    /// A missing type defaults to `parameterScaleUniform`. Missing
    /// parameters of a `parameterScaleUniform` prior default to the scaled
    /// bounds; every other prior type needs exactly two numbers.
    pub fn prior(&self, kind: PriorKind) -> Result<Option<(PriorType, (f64, f64))>, TableError> {
        let (prior_type, parameters, column) = match kind {
            PriorKind::Initialization => (
                &self.initialization_prior_type,
                &self.initialization_prior_parameters,
                INITIALIZATION_PRIOR_PARAMETERS,
            ),
            PriorKind::Objective => (
                &self.objective_prior_type,
                &self.objective_prior_parameters,
                OBJECTIVE_PRIOR_PARAMETERS,
            ),
        };
        let raw = parameters.as_deref().map(str::trim).filter(|p| !p.is_empty());
        let prior_type = match prior_type.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            Some(t) => PriorType::from_str(t)?,
            None if raw.is_none() => return Ok(None),
            None => PriorType::ParameterScaleUniform,
        };

        let Some(raw) = raw else {
            if prior_type != PriorType::ParameterScaleUniform {
                return Err(TableError::InvalidValue {
                    column: column.to_string(),
                    value: String::new(),
                    reason: format!("{} prior of {} needs two parameters", prior_type, self.id),
                });
            }
            return match (self.lower_bound_scaled(), self.upper_bound_scaled()) {
                (Some(lb), Some(ub)) => Ok(Some((prior_type, (lb, ub)))),
                _ => Err(TableError::InvalidValue {
                    column: column.to_string(),
                    value: String::new(),
                    reason: format!(
                        "{} prior of {} without parameters needs bounds",
                        prior_type, self.id
                    ),
                }),
            };
        };

        let values: Vec<f64> = raw
            .split(PARAMETER_SEPARATOR)
            .map(|v| v.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .map_err(|_| TableError::InvalidValue {
                column: column.to_string(),
                value: raw.to_string(),
                reason: "prior parameters must be numbers".to_string(),
            })?;
        match values.as_slice() {
            [a, b] => Ok(Some((prior_type, (*a, *b)))),
            _ => Err(TableError::InvalidValue {
                column: column.to_string(),
                value: raw.to_string(),
                reason: format!("expected two prior parameters, got {}", values.len()),
            }),
        }
    }

    /// Check the row on its own
    ///
    /// Estimated parameters need finite-or-infinite bounds with `lb <= ub`,
    /// fixed parameters need a nominal value, and bounds of log-scaled
    /// parameters must be positive.
    pub fn check(&self) -> Result<(), TableError> {
        let invalid = |column: &str, value: String, reason: &str| TableError::InvalidValue {
            column: column.to_string(),
            value,
            reason: format!("{} ({})", reason, self.id),
        };
        if !self.estimate && self.nominal_value.is_none() {
            return Err(invalid(
                NOMINAL_VALUE,
                String::new(),
                "non-estimated parameter must have a nominal value",
            ));
        }
        if self.estimate {
            let (Some(lb), Some(ub)) = (self.lower_bound, self.upper_bound) else {
                return Err(invalid(
                    LOWER_BOUND,
                    String::new(),
                    "estimated parameter must have lower and upper bounds set",
                ));
            };
            if lb.is_nan() || ub.is_nan() || lb > ub {
                return Err(invalid(
                    LOWER_BOUND,
                    format!("{} > {}", format_float(lb), format_float(ub)),
                    "lower bound must not exceed upper bound",
                ));
            }
        }
        if self.scale != ParameterScale::Lin {
            for (column, bound) in [(LOWER_BOUND, self.lower_bound), (UPPER_BOUND, self.upper_bound)] {
                if let Some(b) = bound.filter(|b| *b <= 0.0) {
                    return Err(invalid(
                        column,
                        format_float(b),
                        "bounds of log-scaled parameters must be positive",
                    ));
                }
            }
        }
        self.prior(PriorKind::Initialization)?;
        self.prior(PriorKind::Objective)?;
        Ok(())
    }

    /// Lower bound on parameter scale
    pub fn lower_bound_scaled(&self) -> Option<f64> {
        self.lower_bound.map(|b| scale(b, self.scale))
    }

    /// Upper bound on parameter scale
    pub fn upper_bound_scaled(&self) -> Option<f64> {
        self.upper_bound.map(|b| scale(b, self.scale))
    }
}

/// The parameter table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterTable {
    parameters: Vec<Parameter>,
}

impl ParameterTable {
    pub fn new(parameters: Vec<Parameter>) -> Self {
        ParameterTable { parameters }
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn push(&mut self, parameter: Parameter) {
        self.parameters.push(parameter);
    }

    pub fn get(&self, id: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Parameter> {
        self.parameters.iter_mut().find(|p| p.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// All parameter ids in table order
    pub fn ids(&self) -> Vec<String> {
        self.parameters.iter().map(|p| p.id.clone()).collect()
    }

    /// Ids of the parameters to be estimated
    pub fn estimated_ids(&self) -> Vec<String> {
        self.parameters
            .iter()
            .filter(|p| p.estimate)
            .map(|p| p.id.clone())
            .collect()
    }

    /// Ids of the fixed parameters
    pub fn fixed_ids(&self) -> Vec<String> {
        self.parameters
            .iter()
            .filter(|p| !p.estimate)
            .map(|p| p.id.clone())
            .collect()
    }

    pub fn n_estimated(&self) -> usize {
        self.parameters.iter().filter(|p| p.estimate).count()
    }

    /// Nominal values in table order, `NaN` where missing
    pub fn nominal_values(&self, scaled: bool) -> Vec<f64> {
        self.parameters
            .iter()
            .map(|p| {
                let v = p.nominal_value.unwrap_or(f64::NAN);
                if scaled {
                    scale(v, p.scale)
                } else {
                    v
                }
            })
            .collect()
    }

    /// Lower bounds in table order, `NaN` where missing
    pub fn lower_bounds(&self, scaled: bool) -> Vec<f64> {
        self.parameters
            .iter()
            .map(|p| {
                let bound = if scaled {
                    p.lower_bound_scaled()
                } else {
                    p.lower_bound
                };
                bound.unwrap_or(f64::NAN)
            })
            .collect()
    }

    /// Upper bounds in table order, `NaN` where missing
    pub fn upper_bounds(&self, scaled: bool) -> Vec<f64> {
        self.parameters
            .iter()
            .map(|p| {
                let bound = if scaled {
                    p.upper_bound_scaled()
                } else {
                    p.upper_bound
                };
                bound.unwrap_or(f64::NAN)
            })
            .collect()
    }

    /// Scales keyed by parameter id
    pub fn scales(&self) -> BTreeMap<String, ParameterScale> {
        self.parameters
            .iter()
            .map(|p| (p.id.clone(), p.scale))
            .collect()
    }

    /// Valid and unique ids, and every row passing [Parameter::check]
    pub fn check(&self) -> Result<(), TableError> {
        check_ids(self.parameters.iter().map(|p| p.id.as_str()), PARAMETER_ID)?;
        check_unique_ids(self.parameters.iter().map(|p| p.id.as_str()), PARAMETER_ID)?;
        self.parameters.iter().try_for_each(Parameter::check)
    }
}

impl Extend<ParameterTable> for ParameterTable {
    fn extend<T: IntoIterator<Item = ParameterTable>>(&mut self, iter: T) {
        for table in iter {
            self.parameters.extend(table.parameters);
        }
    }
}

impl TsvTable for ParameterTable {
    const TABLE: &'static str = "parameter";

    fn from_raw(raw: &RawTable) -> Result<Self, TableError> {
        raw.require_columns(&[PARAMETER_ID], Self::TABLE)?;
        Ok(ParameterTable {
            parameters: raw.deserialize(Self::TABLE)?,
        })
    }

    fn to_raw(&self) -> RawTable {
        let has_names = self.parameters.iter().any(|p| p.name.is_some());
        let has_init = self
            .parameters
            .iter()
            .any(|p| p.initialization_prior_type.is_some());
        let has_objective = self.parameters.iter().any(|p| p.objective_prior_type.is_some());

        let mut headers = vec![PARAMETER_ID];
        if has_names {
            headers.push(PARAMETER_NAME);
        }
        headers.extend([PARAMETER_SCALE, LOWER_BOUND, UPPER_BOUND, NOMINAL_VALUE, ESTIMATE]);
        if has_init {
            headers.extend([INITIALIZATION_PRIOR_TYPE, INITIALIZATION_PRIOR_PARAMETERS]);
        }
        if has_objective {
            headers.extend([OBJECTIVE_PRIOR_TYPE, OBJECTIVE_PRIOR_PARAMETERS]);
        }

        let mut raw = RawTable::new(headers.iter().map(|h| h.to_string()).collect());
        for p in &self.parameters {
            let mut row = vec![p.id.clone()];
            if has_names {
                row.push(p.name.clone().unwrap_or_default());
            }
            row.extend([
                p.scale.to_string(),
                format_option_float(p.lower_bound),
                format_option_float(p.upper_bound),
                format_option_float(p.nominal_value),
                if p.estimate { "1" } else { "0" }.to_string(),
            ]);
            if has_init {
                row.push(p.initialization_prior_type.clone().unwrap_or_default());
                row.push(p.initialization_prior_parameters.clone().unwrap_or_default());
            }
            if has_objective {
                row.push(p.objective_prior_type.clone().unwrap_or_default());
                row.push(p.objective_prior_parameters.clone().unwrap_or_default());
            }
            raw.push_row(row);
        }
        raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TSV: &str = "parameterId\tparameterScale\tlowerBound\tupperBound\tnominalValue\testimate\tobjectivePriorType\tobjectivePriorParameters
k1\tlog10\t1e-3\t1e3\t1\t1\tnormal\t1;2
k2\tlin\t\t\t5\tfalse\t\t
";

    #[test]
    fn test_read_parameter_table() {
        let table = ParameterTable::from_reader(TSV.as_bytes()).unwrap();
        assert_eq!(table.len(), 2);
        let k1 = table.get("k1").unwrap();
        assert_eq!(k1.scale, ParameterScale::Log10);
        assert_eq!(k1.lower_bound, Some(1e-3));
        assert!(k1.estimate);
        assert_eq!(
            k1.prior(PriorKind::Objective).unwrap(),
            Some((PriorType::Normal, (1.0, 2.0)))
        );
        let k2 = table.get("k2").unwrap();
        assert!(!k2.estimate);
        assert_eq!(k2.lower_bound, None);
        assert_eq!(table.estimated_ids(), vec!["k1".to_string()]);
        assert_eq!(table.fixed_ids(), vec!["k2".to_string()]);
        assert!(table.check().is_ok());
    }

    #[test]
    fn test_scaled_bounds() {
        let table = ParameterTable::from_reader(TSV.as_bytes()).unwrap();
        let lb = table.lower_bounds(true);
        assert!((lb[0] + 3.0).abs() < 1e-12);
        assert!(lb[1].is_nan());
        assert_eq!(table.nominal_values(false), vec![1.0, 5.0]);
    }

    #[test]
    fn test_scale_unscale() {
        for s in [ParameterScale::Lin, ParameterScale::Log, ParameterScale::Log10] {
            let x = 3.7;
            assert!((unscale(scale(x, s), s) - x).abs() < 1e-12);
        }
        assert_eq!(scale(100.0, ParameterScale::Log10), 2.0);
    }

    #[test]
    fn test_invalid_estimate_is_rejected() {
        let tsv = "parameterId\testimate\nk1\tmaybe\n";
        assert!(ParameterTable::from_reader(tsv.as_bytes()).is_err());
    }

    #[test]
    fn test_check_catches_row_problems() {
        let fixed_without_nominal = Parameter::new("k").with_estimate(false);
        assert!(fixed_without_nominal.check().is_err());

        let swapped = Parameter::new("k").with_bounds(2.0, 1.0);
        assert!(swapped.check().is_err());

        let log_nonpositive = Parameter::new("k")
            .with_scale(ParameterScale::Log)
            .with_bounds(0.0, 1.0);
        assert!(log_nonpositive.check().is_err());

        let mut bad_prior = Parameter::new("k").with_bounds(0.0, 1.0);
        bad_prior.objective_prior_type = Some("cauchy".to_string());
        assert!(bad_prior.check().is_err());
    }

    #[test]
    fn test_prior_defaults() {
        let tsv = "parameterId\tparameterScale\tlowerBound\tupperBound\tinitializationPriorType\tinitializationPriorParameters
k1\tlog10\t1\t100\tparameterScaleUniform\t
k2\tlin\t0\t1\t\t0.2;0.4
k3\tlin\t0\t1\tnormal\t
k4\tlin\t0\t1\t\t
";
        let table = ParameterTable::from_reader(tsv.as_bytes()).unwrap();
        let prior = |id: &str| table.get(id).unwrap().prior(PriorKind::Initialization);

        // parameters default to the scaled bounds
        assert_eq!(
            prior("k1").unwrap(),
            Some((PriorType::ParameterScaleUniform, (0.0, 2.0)))
        );
        // the type defaults independently of the parameters
        assert_eq!(
            prior("k2").unwrap(),
            Some((PriorType::ParameterScaleUniform, (0.2, 0.4)))
        );
        assert!(prior("k3").is_err());
        assert_eq!(prior("k4").unwrap(), None);

        assert!(table.get("k1").unwrap().check().is_ok());
        assert!(table.get("k3").unwrap().check().is_err());
    }

    #[test]
    fn test_write_round_trip() {
        let table = ParameterTable::from_reader(TSV.as_bytes()).unwrap();
        let mut buf = Vec::new();
        table.to_writer(&mut buf).unwrap();
        let again = ParameterTable::from_reader(buf.as_slice()).unwrap();
        assert_eq!(again, table);
    }
}
