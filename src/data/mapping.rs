use serde::Deserialize;

use crate::data::columns::*;
use crate::data::table::{deserialize_option_string, RawTable, TableError, TsvTable};
use crate::data::{check_ids, check_unique_ids};
use crate::model::Model;

/// A row of the mapping table: a PEtab id standing for a model entity
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Mapping {
    #[serde(rename = "petabEntityId")]
    pub petab_id: String,
    #[serde(
        rename = "modelEntityId",
        default,
        deserialize_with = "deserialize_option_string"
    )]
    pub model_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_option_string")]
    pub name: Option<String>,
}

impl Mapping {
    pub fn new(petab_id: impl Into<String>, model_id: impl Into<String>) -> Self {
        Mapping {
            petab_id: petab_id.into(),
            model_id: Some(model_id.into()),
            name: None,
        }
    }
}

/// The mapping table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappingTable {
    mappings: Vec<Mapping>,
}

impl MappingTable {
    pub fn new(mappings: Vec<Mapping>) -> Self {
        MappingTable { mappings }
    }

    pub fn mappings(&self) -> &[Mapping] {
        &self.mappings
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    pub fn push(&mut self, mapping: Mapping) {
        self.mappings.push(mapping);
    }

    pub fn get(&self, petab_id: &str) -> Option<&Mapping> {
        self.mappings.iter().find(|m| m.petab_id == petab_id)
    }

    /// The model entity `element` stands for, or `element` itself if unmapped
    pub fn resolve<'a>(&'a self, element: &'a str) -> &'a str {
        self.get(element)
            .and_then(|m| m.model_id.as_deref())
            .unwrap_or(element)
    }

    /// Ids must be valid and unique. With a model, every mapped model entity must exist.
    pub fn check(&self, model: Option<&dyn Model>) -> Result<(), TableError> {
        check_ids(self.mappings.iter().map(|m| m.petab_id.as_str()), PETAB_ENTITY_ID)?;
        check_unique_ids(self.mappings.iter().map(|m| m.petab_id.as_str()), PETAB_ENTITY_ID)?;
        if let Some(model) = model {
            for model_id in self.mappings.iter().filter_map(|m| m.model_id.as_deref()) {
                if !model.has_entity_with_id(model_id) {
                    return Err(TableError::NotFound {
                        kind: "model entity".to_string(),
                        id: model_id.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Resolve `element` through an optional mapping table
pub fn resolve_mapping<'a>(mapping: Option<&'a MappingTable>, element: &'a str) -> &'a str {
    match mapping {
        Some(table) => table.resolve(element),
        None => element,
    }
}

impl Extend<MappingTable> for MappingTable {
    fn extend<T: IntoIterator<Item = MappingTable>>(&mut self, iter: T) {
        for table in iter {
            self.mappings.extend(table.mappings);
        }
    }
}

impl TsvTable for MappingTable {
    const TABLE: &'static str = "mapping";

    fn from_raw(raw: &RawTable) -> Result<Self, TableError> {
        raw.require_columns(&MAPPING_DF_REQUIRED_COLS, Self::TABLE)?;
        let mappings: Vec<Mapping> = raw.deserialize(Self::TABLE)?;
        for m in &mappings {
            if m.petab_id.trim() != m.petab_id {
                return Err(TableError::InvalidValue {
                    column: PETAB_ENTITY_ID.to_string(),
                    value: m.petab_id.clone(),
                    reason: "leading or trailing whitespace".to_string(),
                });
            }
        }
        Ok(MappingTable { mappings })
    }

    fn to_raw(&self) -> RawTable {
        let has_names = self.mappings.iter().any(|m| m.name.is_some());
        let mut headers = vec![PETAB_ENTITY_ID.to_string(), MODEL_ENTITY_ID.to_string()];
        if has_names {
            headers.push(NAME.to_string());
        }
        let mut raw = RawTable::new(headers);
        for m in &self.mappings {
            let mut row = vec![m.petab_id.clone(), m.model_id.clone().unwrap_or_default()];
            if has_names {
                row.push(m.name.clone().unwrap_or_default());
            }
            raw.push_row(row);
        }
        raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SimpleModel;

    #[test]
    fn test_resolve() {
        let tsv = "petabEntityId\tmodelEntityId\nkA\tmodel_k_a\n";
        let table = MappingTable::from_reader(tsv.as_bytes()).unwrap();
        assert_eq!(table.resolve("kA"), "model_k_a");
        assert_eq!(table.resolve("other"), "other");
        assert_eq!(resolve_mapping(None, "kA"), "kA");
    }

    #[test]
    fn test_missing_model_entity_column() {
        let tsv = "petabEntityId\nkA\n";
        assert!(matches!(
            MappingTable::from_reader(tsv.as_bytes()),
            Err(TableError::MissingColumn { .. })
        ));
    }

    #[test]
    fn test_check_against_model() {
        let table = MappingTable::new(vec![Mapping::new("kA", "k_a")]);
        let model = SimpleModel::new("m").with_parameter("k_a", 1.0);
        assert!(table.check(Some(&model)).is_ok());
        let other = SimpleModel::new("m").with_parameter("k_b", 1.0);
        assert!(table.check(Some(&other)).is_err());
    }
}
