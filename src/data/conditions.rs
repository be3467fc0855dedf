use std::collections::BTreeMap;

use crate::data::changes::{Change, ChangeSet, ChangeTable};
use crate::data::columns::*;
use crate::data::table::{RawTable, TableError, TsvTable};
use crate::data::{check_ids, check_unique_ids, is_valid_identifier, ParameterValue};
use crate::math::Expr;

/// A row of the wide condition table
///
/// Cells that were left empty are absent from `values`; they mean "keep the
/// model value".
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Condition {
    pub id: String,
    pub name: Option<String>,
    pub values: BTreeMap<String, ParameterValue>,
}

impl Condition {
    pub fn new(id: impl Into<String>) -> Self {
        Condition {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_value(mut self, target: impl Into<String>, value: impl Into<ParameterValue>) -> Self {
        self.values.insert(target.into(), value.into());
        self
    }
}

/// The condition table: conditions as rows, model entities as columns
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConditionTable {
    columns: Vec<String>,
    conditions: Vec<Condition>,
}

impl ConditionTable {
    /// An empty table with the given entity columns and condition rows
    ///
    /// Fails if a column is not a valid identifier.
    pub fn create<I, J, S, T>(parameter_ids: I, condition_ids: J) -> Result<Self, TableError>
    where
        I: IntoIterator<Item = S>,
        J: IntoIterator<Item = T>,
        S: Into<String>,
        T: Into<String>,
    {
        let columns: Vec<String> = parameter_ids.into_iter().map(Into::into).collect();
        if let Some(invalid) = columns.iter().find(|c| !is_valid_identifier(c)) {
            return Err(TableError::InvalidIds {
                kind: "parameter".to_string(),
                ids: vec![invalid.clone()],
            });
        }
        Ok(ConditionTable {
            columns,
            conditions: condition_ids.into_iter().map(Condition::new).collect(),
        })
    }

    pub fn new(conditions: Vec<Condition>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for c in &conditions {
            for key in c.values.keys() {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }
        ConditionTable {
            columns,
            conditions,
        }
    }

    /// Model entity columns, excluding id and name
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn get(&self, condition_id: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.id == condition_id)
    }

    pub fn contains(&self, condition_id: &str) -> bool {
        self.get(condition_id).is_some()
    }

    pub fn ids(&self) -> Vec<String> {
        self.conditions.iter().map(|c| c.id.clone()).collect()
    }

    /// Value set by a condition for an entity, `None` if the cell is empty
    pub fn value(&self, condition_id: &str, target: &str) -> Option<&ParameterValue> {
        self.get(condition_id).and_then(|c| c.values.get(target))
    }

    /// Set a cell, adding the column if it does not exist yet
    pub fn set_value(
        &mut self,
        condition_id: &str,
        target: &str,
        value: ParameterValue,
    ) -> Result<(), TableError> {
        if !self.columns.iter().any(|c| c == target) {
            self.columns.push(target.to_string());
        }
        let condition = self
            .conditions
            .iter_mut()
            .find(|c| c.id == condition_id)
            .ok_or_else(|| TableError::NotFound {
                kind: CONDITION_ID.to_string(),
                id: condition_id.to_string(),
            })?;
        condition.values.insert(target.to_string(), value);
        Ok(())
    }

    /// Parameter ids used as condition-specific values
    pub fn parametric_overrides(&self) -> Vec<String> {
        self.conditions
            .iter()
            .flat_map(|c| c.values.values())
            .filter_map(|v| v.as_id().map(String::from))
            .collect()
    }

    /// Convert to the long change representation
    pub fn to_change_table(&self) -> ChangeTable {
        let sets = self
            .conditions
            .iter()
            .map(|c| {
                let changes = self
                    .columns
                    .iter()
                    .filter_map(|col| {
                        c.values.get(col).map(|v| Change {
                            target_id: col.clone(),
                            target_value: match v {
                                ParameterValue::Numeric(x) => Expr::Number(*x),
                                ParameterValue::Id(id) => Expr::symbol(id.clone()),
                            },
                        })
                    })
                    .collect();
                ChangeSet {
                    id: c.id.clone(),
                    changes,
                }
            })
            .collect();
        ChangeTable::new(sets)
    }

    /// Valid and unique condition ids, valid column names
    pub fn check(&self) -> Result<(), TableError> {
        check_ids(self.conditions.iter().map(|c| c.id.as_str()), CONDITION_ID)?;
        check_unique_ids(self.conditions.iter().map(|c| c.id.as_str()), CONDITION_ID)?;
        check_ids(&self.columns, "condition table column")
    }
}

impl Extend<ConditionTable> for ConditionTable {
    fn extend<T: IntoIterator<Item = ConditionTable>>(&mut self, iter: T) {
        for table in iter {
            for col in table.columns {
                if !self.columns.contains(&col) {
                    self.columns.push(col);
                }
            }
            self.conditions.extend(table.conditions);
        }
    }
}

impl TsvTable for ConditionTable {
    const TABLE: &'static str = "condition";

    fn from_raw(raw: &RawTable) -> Result<Self, TableError> {
        raw.require_columns(&[CONDITION_ID], Self::TABLE)?;
        let columns: Vec<String> = raw
            .headers()
            .iter()
            .filter(|h| *h != CONDITION_ID && *h != CONDITION_NAME)
            .cloned()
            .collect();
        let conditions = (0..raw.len())
            .map(|row| Condition {
                id: raw.cell(row, CONDITION_ID).unwrap_or("").to_string(),
                name: raw.cell(row, CONDITION_NAME).map(String::from),
                values: columns
                    .iter()
                    .filter_map(|col| {
                        raw.cell(row, col)
                            .map(|cell| (col.clone(), ParameterValue::parse(cell)))
                    })
                    .collect(),
            })
            .collect();
        Ok(ConditionTable {
            columns,
            conditions,
        })
    }

    fn to_raw(&self) -> RawTable {
        let has_names = self.conditions.iter().any(|c| c.name.is_some());
        let mut headers = vec![CONDITION_ID.to_string()];
        if has_names {
            headers.push(CONDITION_NAME.to_string());
        }
        headers.extend(self.columns.iter().cloned());
        let mut raw = RawTable::new(headers);
        for c in &self.conditions {
            let mut row = vec![c.id.clone()];
            if has_names {
                row.push(c.name.clone().unwrap_or_default());
            }
            row.extend(
                self.columns
                    .iter()
                    .map(|col| c.values.get(col).map(|v| v.to_string()).unwrap_or_default()),
            );
            raw.push_row(row);
        }
        raw
    }
}
