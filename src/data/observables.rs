use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::data::columns::*;
use crate::data::mapping::MappingTable;
use crate::data::table::{deserialize_option_string, RawTable, TableError, TsvTable};
use crate::data::{check_ids, check_unique_ids, unique_preserve_order};
use crate::math::{self, Expr};
use crate::model::Model;

/// Transformation applied to simulations and measurements before the noise model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ObservableTransformation {
    #[default]
    Lin,
    Log,
    Log10,
}

impl ObservableTransformation {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObservableTransformation::Lin => "lin",
            ObservableTransformation::Log => "log",
            ObservableTransformation::Log10 => "log10",
        }
    }

    /// Apply the transformation to a value
    pub fn apply(&self, x: f64) -> f64 {
        match self {
            ObservableTransformation::Lin => x,
            ObservableTransformation::Log => x.ln(),
            ObservableTransformation::Log10 => x.log10(),
        }
    }

    /// Inverse of [ObservableTransformation::apply]
    pub fn invert(&self, x: f64) -> f64 {
        match self {
            ObservableTransformation::Lin => x,
            ObservableTransformation::Log => x.exp(),
            ObservableTransformation::Log10 => 10f64.powf(x),
        }
    }
}

impl FromStr for ObservableTransformation {
    type Err = TableError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" | "lin" => Ok(ObservableTransformation::Lin),
            "log" => Ok(ObservableTransformation::Log),
            "log10" => Ok(ObservableTransformation::Log10),
            other => Err(TableError::InvalidValue {
                column: OBSERVABLE_TRANSFORMATION.to_string(),
                value: other.to_string(),
                reason: "expected one of lin, log, log10".to_string(),
            }),
        }
    }
}

impl fmt::Display for ObservableTransformation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Distribution of the measurement noise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NoiseDistribution {
    #[default]
    Normal,
    Laplace,
}

impl NoiseDistribution {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoiseDistribution::Normal => "normal",
            NoiseDistribution::Laplace => "laplace",
        }
    }

    /// Parse a distribution cell
    ///
    /// Besides `normal` and `laplace` the combined spellings `log-normal`,
    /// `log10-normal`, `log-laplace` and `log10-laplace` are accepted; they
    /// also carry the transformation.
    pub fn parse_with_transformation(
        s: &str,
    ) -> Result<(Self, Option<ObservableTransformation>), TableError> {
        use NoiseDistribution::*;
        use ObservableTransformation::*;
        Ok(match s.trim() {
            "" | "normal" => (Normal, None),
            "laplace" => (Laplace, None),
            "log-normal" => (Normal, Some(Log)),
            "log10-normal" => (Normal, Some(Log10)),
            "log-laplace" => (Laplace, Some(Log)),
            "log10-laplace" => (Laplace, Some(Log10)),
            other => {
                return Err(TableError::InvalidValue {
                    column: NOISE_DISTRIBUTION.to_string(),
                    value: other.to_string(),
                    reason: "expected normal or laplace".to_string(),
                })
            }
        })
    }
}

impl fmt::Display for NoiseDistribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which formula a placeholder belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderKind {
    Observable,
    Noise,
}

impl PlaceholderKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            PlaceholderKind::Observable => "observable",
            PlaceholderKind::Noise => "noise",
        }
    }

    /// The `i`-th (1-based) placeholder name for an observable
    pub fn placeholder(&self, i: usize, observable_id: &str) -> String {
        format!("{}Parameter{}_{}", self.prefix(), i, observable_id)
    }
}

/// A row of the observable table
#[derive(Debug, Clone, PartialEq)]
pub struct Observable {
    pub id: String,
    pub name: Option<String>,
    pub formula: Expr,
    pub transformation: ObservableTransformation,
    pub noise_formula: Option<Expr>,
    pub noise_distribution: NoiseDistribution,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObservableRow {
    observable_id: String,
    #[serde(default, deserialize_with = "deserialize_option_string")]
    observable_name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_option_string")]
    observable_formula: Option<String>,
    #[serde(default, deserialize_with = "deserialize_option_string")]
    observable_transformation: Option<String>,
    #[serde(default, deserialize_with = "deserialize_option_string")]
    noise_formula: Option<String>,
    #[serde(default, deserialize_with = "deserialize_option_string")]
    noise_distribution: Option<String>,
}

fn parse_formula(formula: &str, column: &str) -> Result<Expr, TableError> {
    math::parse(formula).map_err(|source| TableError::InvalidFormula {
        column: column.to_string(),
        source,
    })
}

impl ObservableRow {
    fn into_observable(self) -> Result<Observable, TableError> {
        let formula = match self.observable_formula.as_deref() {
            Some(f) => parse_formula(f, OBSERVABLE_FORMULA)?,
            None => {
                return Err(TableError::InvalidValue {
                    column: OBSERVABLE_FORMULA.to_string(),
                    value: String::new(),
                    reason: format!("missing formula for {}", self.observable_id),
                })
            }
        };
        let noise_formula = self
            .noise_formula
            .as_deref()
            .map(|f| parse_formula(f, NOISE_FORMULA))
            .transpose()?;
        let (noise_distribution, implied) = NoiseDistribution::parse_with_transformation(
            self.noise_distribution.as_deref().unwrap_or(""),
        )?;
        let transformation = match (implied, self.observable_transformation.as_deref()) {
            (Some(t), _) => t,
            (None, Some(t)) => t.parse()?,
            (None, None) => ObservableTransformation::Lin,
        };
        Ok(Observable {
            id: self.observable_id,
            name: self.observable_name,
            formula,
            transformation,
            noise_formula,
            noise_distribution,
        })
    }
}

impl Observable {
    /// Observable with linear transformation and normal noise
    pub fn new(id: impl Into<String>, formula: Expr) -> Self {
        Observable {
            id: id.into(),
            name: None,
            formula,
            transformation: ObservableTransformation::Lin,
            noise_formula: None,
            noise_distribution: NoiseDistribution::Normal,
        }
    }

    pub fn with_noise(mut self, noise_formula: Expr) -> Self {
        self.noise_formula = Some(noise_formula);
        self
    }

    pub fn with_transformation(mut self, transformation: ObservableTransformation) -> Self {
        self.transformation = transformation;
        self
    }

    pub fn with_noise_distribution(mut self, distribution: NoiseDistribution) -> Self {
        self.noise_distribution = distribution;
        self
    }

    /// Placeholders of the observable or noise formula, ordered by index
    pub fn placeholders(&self, kind: PlaceholderKind) -> Result<Vec<String>, TableError> {
        let formula = match kind {
            PlaceholderKind::Observable => Some(&self.formula),
            PlaceholderKind::Noise => self.noise_formula.as_ref(),
        };
        match formula {
            Some(f) => formula_placeholders(f, &self.id, kind),
            None => Ok(Vec::new()),
        }
    }
}

/// Placeholder symbols `{kind}Parameter<N>_<observableId>` of a formula
///
/// The result is ordered by N. Numbering must be consecutive starting at 1.
pub fn formula_placeholders(
    formula: &Expr,
    observable_id: &str,
    kind: PlaceholderKind,
) -> Result<Vec<String>, TableError> {
    let prefix = format!("{}Parameter", kind.prefix());
    let suffix = format!("_{}", observable_id);
    let found: Vec<String> = formula
        .free_symbols()
        .into_iter()
        .filter(|s| {
            s.strip_prefix(&prefix)
                .and_then(|rest| rest.strip_suffix(&suffix))
                .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
        })
        .collect();

    let expected: Vec<String> = (1..=found.len())
        .map(|i| kind.placeholder(i, observable_id))
        .collect();
    if expected.iter().any(|p| !found.contains(p)) {
        return Err(TableError::InvalidValue {
            column: match kind {
                PlaceholderKind::Observable => OBSERVABLE_FORMULA.to_string(),
                PlaceholderKind::Noise => NOISE_FORMULA.to_string(),
            },
            value: formula.to_string(),
            reason: "non-consecutive numbering of placeholders".to_string(),
        });
    }
    Ok(expected)
}

/// [formula_placeholders] for a formula string; empty formulas have none
pub fn get_formula_placeholders(
    formula: &str,
    observable_id: &str,
    kind: PlaceholderKind,
) -> Result<Vec<String>, TableError> {
    if formula.trim().is_empty() {
        return Ok(Vec::new());
    }
    let expr = parse_formula(formula, OBSERVABLE_FORMULA)?;
    formula_placeholders(&expr, observable_id, kind)
}

/// The observable table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObservableTable {
    observables: Vec<Observable>,
}

impl ObservableTable {
    pub fn new(observables: Vec<Observable>) -> Self {
        ObservableTable { observables }
    }

    pub fn observables(&self) -> &[Observable] {
        &self.observables
    }

    pub fn len(&self) -> usize {
        self.observables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observables.is_empty()
    }

    pub fn push(&mut self, observable: Observable) {
        self.observables.push(observable);
    }

    pub fn get(&self, id: &str) -> Option<&Observable> {
        self.observables.iter().find(|o| o.id == id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.observables.iter().map(|o| o.id.clone()).collect()
    }

    /// All placeholders, per observable first the observable then the noise ones
    pub fn placeholders(&self, observables: bool, noise: bool) -> Result<Vec<String>, TableError> {
        let mut all = Vec::new();
        for o in &self.observables {
            if observables {
                all.extend(o.placeholders(PlaceholderKind::Observable)?);
            }
            if noise {
                all.extend(o.placeholders(PlaceholderKind::Noise)?);
            }
        }
        Ok(unique_preserve_order(all))
    }

    /// Noise formulas keyed by observable id, observables without one are skipped
    pub fn noise_formulas(&self) -> BTreeMap<String, Expr> {
        self.observables
            .iter()
            .filter_map(|o| o.noise_formula.clone().map(|f| (o.id.clone(), f)))
            .collect()
    }

    /// Parameters introduced by the observable (and optionally noise) formulas
    ///
    /// These are free symbols that are not model entities, either directly
    /// or through the mapping table. Symbols are sorted by name per formula.
    pub fn output_parameters(
        &self,
        model: &dyn Model,
        observables: bool,
        noise: bool,
        mapping: Option<&MappingTable>,
    ) -> Vec<String> {
        let mut formulas: Vec<&Expr> = Vec::new();
        if observables {
            formulas.extend(self.observables.iter().map(|o| &o.formula));
        }
        if noise {
            formulas.extend(self.observables.iter().filter_map(|o| o.noise_formula.as_ref()));
        }
        let symbols = formulas.into_iter().flat_map(|f| f.free_symbols()).filter(|sym| {
            if model.symbol_allowed_in_observable_formula(sym) {
                return false;
            }
            let mapped_to_model = mapping
                .and_then(|m| m.get(sym))
                .and_then(|m| m.model_id.as_deref())
                .is_some_and(|id| model.symbol_allowed_in_observable_formula(id));
            !mapped_to_model
        });
        unique_preserve_order(symbols)
    }

    /// Valid and unique ids, consistent placeholder numbering
    pub fn check(&self) -> Result<(), TableError> {
        check_ids(self.observables.iter().map(|o| o.id.as_str()), OBSERVABLE_ID)?;
        check_unique_ids(self.observables.iter().map(|o| o.id.as_str()), OBSERVABLE_ID)?;
        self.placeholders(true, true).map(|_| ())
    }
}

impl Extend<ObservableTable> for ObservableTable {
    fn extend<T: IntoIterator<Item = ObservableTable>>(&mut self, iter: T) {
        for table in iter {
            self.observables.extend(table.observables);
        }
    }
}

impl TsvTable for ObservableTable {
    const TABLE: &'static str = "observable";

    fn from_raw(raw: &RawTable) -> Result<Self, TableError> {
        raw.require_columns(&[OBSERVABLE_ID], Self::TABLE)?;
        let rows: Vec<ObservableRow> = raw.deserialize(Self::TABLE)?;
        let observables = rows
            .into_iter()
            .map(ObservableRow::into_observable)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ObservableTable { observables })
    }

    fn to_raw(&self) -> RawTable {
        let has_names = self.observables.iter().any(|o| o.name.is_some());
        let mut headers = vec![OBSERVABLE_ID];
        if has_names {
            headers.push(OBSERVABLE_NAME);
        }
        headers.extend([
            OBSERVABLE_FORMULA,
            OBSERVABLE_TRANSFORMATION,
            NOISE_FORMULA,
            NOISE_DISTRIBUTION,
        ]);
        let mut raw = RawTable::new(headers.iter().map(|h| h.to_string()).collect());
        for o in &self.observables {
            let mut row = vec![o.id.clone()];
            if has_names {
                row.push(o.name.clone().unwrap_or_default());
            }
            row.extend([
                o.formula.to_string(),
                o.transformation.to_string(),
                o.noise_formula.as_ref().map(|f| f.to_string()).unwrap_or_default(),
                o.noise_distribution.to_string(),
            ]);
            raw.push_row(row);
        }
        raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SimpleModel;

    fn placeholders(formula: &str, id: &str, kind: PlaceholderKind) -> Vec<String> {
        get_formula_placeholders(formula, id, kind).unwrap()
    }

    #[test]
    fn test_get_formula_placeholders() {
        assert!(placeholders("1.0", "any", PlaceholderKind::Observable).is_empty());
        assert!(placeholders("", "any", PlaceholderKind::Observable).is_empty());
        assert_eq!(
            placeholders(
                "observableParameter1_twoParams * observableParameter2_twoParams + otherParam",
                "twoParams",
                PlaceholderKind::Observable
            ),
            vec!["observableParameter1_twoParams", "observableParameter2_twoParams"]
        );
        assert_eq!(
            placeholders("3.0 * noiseParameter1_oneParam", "oneParam", PlaceholderKind::Noise),
            vec!["noiseParameter1_oneParam"]
        );
        // repeated and out of order
        assert_eq!(
            placeholders(
                "observableParameter2_twoParams * observableParameter1_twoParams + otherParam / observableParameter2_twoParams",
                "twoParams",
                PlaceholderKind::Observable
            ),
            vec!["observableParameter1_twoParams", "observableParameter2_twoParams"]
        );
    }

    #[test]
    fn test_non_consecutive_placeholders() {
        assert!(get_formula_placeholders(
            "observableParameter2_twoParams + observableParameter2_twoParams",
            "twoParams",
            PlaceholderKind::Observable
        )
        .is_err());
    }

    #[test]
    fn test_missing_observable_id_column() {
        let tsv = "observableName\tobservableFormula\tnoiseFormula\nname\tobservable_1\t1\n";
        assert!(matches!(
            ObservableTable::from_reader(tsv.as_bytes()),
            Err(TableError::MissingColumn { .. })
        ));
    }

    #[test]
    fn test_table_placeholders() {
        let tsv = "observableId\tobservableFormula\nobs_1\tobservableParameter1_obs_1 * 2 * foo\nobs_2\t1 + observableParameter1_obs_2\n";
        let table = ObservableTable::from_reader(tsv.as_bytes()).unwrap();
        assert_eq!(
            table.placeholders(true, true).unwrap(),
            vec!["observableParameter1_obs_1", "observableParameter1_obs_2"]
        );

        let tsv = "observableId\tobservableFormula\tnoiseFormula\nobs_1\tobservableParameter1_obs_1 * 2 * foo\tnoiseParameter1_obs_1\nobs_2\t1 + observableParameter1_obs_2\t2.0\n";
        let table = ObservableTable::from_reader(tsv.as_bytes()).unwrap();
        assert_eq!(
            table.placeholders(true, true).unwrap(),
            vec![
                "observableParameter1_obs_1",
                "noiseParameter1_obs_1",
                "observableParameter1_obs_2"
            ]
        );
    }

    #[test]
    fn test_output_parameters() {
        let model = SimpleModel::new("m")
            .with_parameter("fixedParameter1", 1.0)
            .with_parameter("observable_1", 1.0);
        let table = ObservableTable::new(vec![Observable::new(
            "observable_1",
            math::parse("observable_1 * scaling + offset").unwrap(),
        )
        .with_noise(Expr::Number(1.0))]);
        assert_eq!(
            table.output_parameters(&model, true, false, None),
            vec!["offset", "scaling"]
        );

        let table = ObservableTable::new(vec![Observable::new(
            "observable_1",
            math::parse("observable_1 * N + beta").unwrap(),
        )]);
        assert_eq!(
            table.output_parameters(&model, true, false, None),
            vec!["N", "beta"]
        );
    }

    #[test]
    fn test_output_parameters_respect_mapping() {
        let model = SimpleModel::new("m").with_parameter("k_model", 1.0);
        let mapping = MappingTable::new(vec![crate::data::Mapping::new("kPetab", "k_model")]);
        let table = ObservableTable::new(vec![Observable::new(
            "o",
            math::parse("kPetab * scale_o").unwrap(),
        )]);
        assert_eq!(
            table.output_parameters(&model, true, false, Some(&mapping)),
            vec!["scale_o"]
        );
    }

    #[test]
    fn test_combined_distribution_sets_transformation() {
        let tsv = "observableId\tobservableFormula\tnoiseFormula\tnoiseDistribution\no1\tA\t1\tlog10-laplace\n";
        let table = ObservableTable::from_reader(tsv.as_bytes()).unwrap();
        let o = table.get("o1").unwrap();
        assert_eq!(o.transformation, ObservableTransformation::Log10);
        assert_eq!(o.noise_distribution, NoiseDistribution::Laplace);
    }

    #[test]
    fn test_write_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("observables.tsv");
        let table = ObservableTable::new(vec![Observable::new(
            "observable_1",
            math::parse("observable_1").unwrap(),
        )
        .with_noise(Expr::Number(1.0))]);
        table.to_path(&path).unwrap();
        assert_eq!(ObservableTable::from_path(&path).unwrap(), table);
    }
}
