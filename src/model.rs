//! Model abstraction used by parameter mapping and linting
//!
//! PEtab only needs a handful of queries against the underlying model: which
//! parameters it has and with which values, which identifiers exist, and
//! which of them are state variables. [Model] captures exactly that, so any
//! model representation can be plugged in. [SimpleModel] is an in-memory
//! implementation that can be built in code or loaded from JSON.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when loading a model
#[derive(Debug, Error)]
pub enum ModelError {
    /// Failed to parse JSON
    #[error("Failed to parse JSON model: {0}")]
    ParseError(#[from] serde_json::Error),

    /// Failed to read the model file
    #[error("Failed to read model file {path}: {message}")]
    IoError { path: String, message: String },

    /// The same identifier is declared twice
    #[error("Duplicate model entity '{id}'")]
    DuplicateEntity { id: String },
}

/// Queries PEtab needs to answer about a model
pub trait Model: Send + Sync {
    /// Model identifier
    fn model_id(&self) -> &str;

    /// Parameters that may be set through PEtab tables, with their model values
    fn free_parameter_ids_with_values(&self) -> Vec<(String, f64)>;

    /// Value of a model parameter, if it exists
    fn parameter_value(&self, id: &str) -> Option<f64>;

    /// Whether any model entity has this identifier
    fn has_entity_with_id(&self, id: &str) -> bool;

    /// Whether the identifier is a state variable (e.g. a species)
    fn is_state_variable(&self, id: &str) -> bool;

    /// Whether the identifier may appear in observable and noise formulas
    fn symbol_allowed_in_observable_formula(&self, id: &str) -> bool {
        id == "time" || self.has_entity_with_id(id)
    }

    /// Whether the identifier may be used as a column of the condition table
    fn is_valid_condition_target(&self, id: &str) -> bool {
        self.has_entity_with_id(id)
    }

    /// All parameter ids known to the model
    fn parameter_ids(&self) -> Vec<String> {
        self.free_parameter_ids_with_values()
            .into_iter()
            .map(|(id, _)| id)
            .collect()
    }
}

/// In-memory model made of parameters, species and compartments
///
/// # Example
///
/// ```rust
/// use petab::model::{Model, SimpleModel};
///
/// let model = SimpleModel::new("m")
///     .with_parameter("k1", 0.1)
///     .with_species("A", 1.0);
/// assert!(model.is_state_variable("A"));
/// assert_eq!(model.parameter_value("k1"), Some(0.1));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimpleModel {
    /// Model identifier
    #[serde(default)]
    pub id: String,

    /// Parameters and their values
    #[serde(default)]
    pub parameters: BTreeMap<String, f64>,

    /// Species (state variables) and their initial values
    #[serde(default)]
    pub species: BTreeMap<String, f64>,

    /// Compartments and their sizes
    #[serde(default)]
    pub compartments: BTreeMap<String, f64>,
}

impl SimpleModel {
    pub fn new(id: impl Into<String>) -> Self {
        SimpleModel {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_parameter(mut self, id: impl Into<String>, value: f64) -> Self {
        self.parameters.insert(id.into(), value);
        self
    }

    pub fn with_species(mut self, id: impl Into<String>, initial_value: f64) -> Self {
        self.species.insert(id.into(), initial_value);
        self
    }

    pub fn with_compartment(mut self, id: impl Into<String>, size: f64) -> Self {
        self.compartments.insert(id.into(), size);
        self
    }

    /// Parse a model from its JSON description
    ///
    /// ```json
    /// {"id": "m", "parameters": {"k1": 0.1}, "species": {"A": 1.0}}
    /// ```
    pub fn from_json(json: &str) -> Result<Self, ModelError> {
        let model: SimpleModel = serde_json::from_str(json)?;
        model.check_unique_entities()?;
        Ok(model)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| ModelError::IoError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> Result<String, ModelError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    fn check_unique_entities(&self) -> Result<(), ModelError> {
        let duplicate = self
            .species
            .keys()
            .chain(self.compartments.keys())
            .find(|id| self.parameters.contains_key(*id))
            .or_else(|| {
                self.compartments
                    .keys()
                    .find(|id| self.species.contains_key(*id))
            });
        match duplicate {
            Some(id) => Err(ModelError::DuplicateEntity { id: id.clone() }),
            None => Ok(()),
        }
    }
}

impl Model for SimpleModel {
    fn model_id(&self) -> &str {
        &self.id
    }

    fn free_parameter_ids_with_values(&self) -> Vec<(String, f64)> {
        self.parameters
            .iter()
            .map(|(id, value)| (id.clone(), *value))
            .collect()
    }

    fn parameter_value(&self, id: &str) -> Option<f64> {
        self.parameters.get(id).copied()
    }

    fn has_entity_with_id(&self, id: &str) -> bool {
        self.parameters.contains_key(id)
            || self.species.contains_key(id)
            || self.compartments.contains_key(id)
    }

    fn is_state_variable(&self, id: &str) -> bool {
        self.species.contains_key(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json() {
        let model = SimpleModel::from_json(
            r#"{"id": "m", "parameters": {"k1": 0.5, "k2": 2}, "species": {"A": 1}}"#,
        )
        .unwrap();
        assert_eq!(model.model_id(), "m");
        assert_eq!(
            model.free_parameter_ids_with_values(),
            vec![("k1".to_string(), 0.5), ("k2".to_string(), 2.0)]
        );
        assert!(model.has_entity_with_id("A"));
        assert!(model.is_state_variable("A"));
        assert!(!model.is_state_variable("k1"));
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        assert!(SimpleModel::from_json(r#"{"id": "m", "reactions": []}"#).is_err());
    }

    #[test]
    fn test_duplicate_entities_are_rejected() {
        let result =
            SimpleModel::from_json(r#"{"parameters": {"x": 1}, "species": {"x": 1}}"#);
        assert!(matches!(result, Err(ModelError::DuplicateEntity { .. })));
    }

    #[test]
    fn test_time_is_allowed_in_observable_formulas() {
        let model = SimpleModel::new("m").with_compartment("c", 1.0);
        assert!(model.symbol_allowed_in_observable_formula("time"));
        assert!(model.symbol_allowed_in_observable_formula("c"));
        assert!(!model.symbol_allowed_in_observable_formula("scaling"));
    }

    #[test]
    fn test_json_round_trip() {
        let model = SimpleModel::new("m").with_parameter("k", 1.0);
        let json = model.to_json().unwrap();
        assert_eq!(SimpleModel::from_json(&json).unwrap(), model);
    }
}
