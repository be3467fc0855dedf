use std::collections::BTreeSet;

use serde::Deserialize;

use crate::data::columns::*;
use crate::data::table::{format_float, RawTable, TableError, TsvTable};
use crate::data::{check_ids, is_valid_identifier};
use crate::math::{self, Expr};

/// A change of a model entity, one row of the long condition table
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    pub target_id: String,
    pub target_value: Expr,
}

impl Change {
    /// Build a change from a target id and a formula
    pub fn new(target_id: impl Into<String>, target_value: &str) -> Result<Self, TableError> {
        let target_id = target_id.into();
        check_ids([&target_id], TARGET_ID)?;
        let target_value = math::parse(target_value).map_err(|source| TableError::InvalidFormula {
            column: TARGET_VALUE.to_string(),
            source,
        })?;
        Ok(Change {
            target_id,
            target_value,
        })
    }
}

/// All changes applied together under one condition id
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChangeSet {
    pub id: String,
    pub changes: Vec<Change>,
}

impl ChangeSet {
    pub fn new(id: impl Into<String>) -> Self {
        ChangeSet {
            id: id.into(),
            changes: Vec::new(),
        }
    }

    /// Builder-style variant of [ChangeSet::push]
    pub fn with_change(mut self, change: Change) -> Self {
        self.changes.push(change);
        self
    }

    pub fn push(&mut self, change: Change) {
        self.changes.push(change);
    }

    pub fn get(&self, target_id: &str) -> Option<&Change> {
        self.changes.iter().find(|c| c.target_id == target_id)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChangeRow {
    condition_id: String,
    target_id: String,
    target_value: String,
}

/// The long condition table: rows sharing a `conditionId` form one [ChangeSet]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChangeTable {
    change_sets: Vec<ChangeSet>,
}

impl ChangeTable {
    pub fn new(change_sets: Vec<ChangeSet>) -> Self {
        ChangeTable { change_sets }
    }

    pub fn change_sets(&self) -> &[ChangeSet] {
        &self.change_sets
    }

    pub fn len(&self) -> usize {
        self.change_sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.change_sets.is_empty()
    }

    pub fn get(&self, condition_id: &str) -> Option<&ChangeSet> {
        self.change_sets.iter().find(|c| c.id == condition_id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.change_sets.iter().map(|c| c.id.clone()).collect()
    }

    /// Append a change set, merging it into an existing one with the same id
    pub fn push(&mut self, change_set: ChangeSet) {
        match self.change_sets.iter_mut().find(|c| c.id == change_set.id) {
            Some(existing) => existing.changes.extend(change_set.changes),
            None => self.change_sets.push(change_set),
        }
    }

    /// Append a single change to the set `condition_id`, creating it if needed
    pub fn push_change(&mut self, condition_id: &str, change: Change) {
        self.push(ChangeSet {
            id: condition_id.to_string(),
            changes: vec![change],
        });
    }

    /// Free symbols of all target values, whether referenced or not
    pub fn free_symbols(&self) -> BTreeSet<String> {
        self.change_sets
            .iter()
            .flat_map(|set| set.changes.iter())
            .flat_map(|change| change.target_value.free_symbols())
            .collect()
    }
}

impl Extend<ChangeTable> for ChangeTable {
    fn extend<T: IntoIterator<Item = ChangeTable>>(&mut self, iter: T) {
        for table in iter {
            for set in table.change_sets {
                self.push(set);
            }
        }
    }
}

impl TsvTable for ChangeTable {
    const TABLE: &'static str = "condition";

    fn from_raw(raw: &RawTable) -> Result<Self, TableError> {
        raw.require_columns(&[CONDITION_ID, TARGET_ID, TARGET_VALUE], Self::TABLE)?;
        let rows: Vec<ChangeRow> = raw.deserialize(Self::TABLE)?;
        let mut table = ChangeTable::default();
        for row in rows {
            if !is_valid_identifier(&row.condition_id) {
                return Err(TableError::InvalidIds {
                    kind: CONDITION_ID.to_string(),
                    ids: vec![row.condition_id],
                });
            }
            let change = Change::new(row.target_id, &row.target_value)?;
            table.push_change(&row.condition_id, change);
        }
        Ok(table)
    }

    fn to_raw(&self) -> RawTable {
        let mut raw = RawTable::new(vec![
            CONDITION_ID.to_string(),
            TARGET_ID.to_string(),
            TARGET_VALUE.to_string(),
        ]);
        for set in &self.change_sets {
            for change in &set.changes {
                let value = match change.target_value.as_number() {
                    Some(v) => format_float(v),
                    None => change.target_value.to_string(),
                };
                raw.push_row(vec![set.id.clone(), change.target_id.clone(), value]);
            }
        }
        raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TSV: &str = "conditionId\ttargetId\ttargetValue\nc1\tk1\t10\nc1\tk2\tk_base * 2\nc2\tk1\t1e-3\n";

    #[test]
    fn test_rows_are_grouped_by_condition() {
        let table = ChangeTable::from_reader(TSV.as_bytes()).unwrap();
        assert_eq!(table.ids(), vec!["c1".to_string(), "c2".to_string()]);
        let c1 = table.get("c1").unwrap();
        assert_eq!(c1.changes.len(), 2);
        assert_eq!(c1.get("k1").unwrap().target_value.as_number(), Some(10.0));
        assert!(table.get("c3").is_none());
    }

    #[test]
    fn test_free_symbols() {
        let table = ChangeTable::from_reader(TSV.as_bytes()).unwrap();
        let symbols: Vec<String> = table.free_symbols().into_iter().collect();
        assert_eq!(symbols, vec!["k_base".to_string()]);
    }

    #[test]
    fn test_push_merges_sets() {
        let mut table = ChangeTable::default();
        table.push(ChangeSet::new("c1").with_change(Change::new("k1", "1").unwrap()));
        table.push_change("c1", Change::new("k2", "2").unwrap());
        assert_eq!(table.len(), 1);
        assert_eq!(table.get("c1").unwrap().changes.len(), 2);
    }

    #[test]
    fn test_invalid_target_id() {
        assert!(Change::new("1k", "1").is_err());
        let tsv = "conditionId\ttargetId\ttargetValue\nc1\tk 1\t1\n";
        assert!(ChangeTable::from_reader(tsv.as_bytes()).is_err());
    }

    #[test]
    fn test_numbers_are_written_as_numbers() {
        let table = ChangeTable::from_reader(TSV.as_bytes()).unwrap();
        let raw = table.to_raw();
        assert_eq!(raw.cell(0, TARGET_VALUE), Some("10"));
        assert_eq!(raw.cell(2, TARGET_VALUE), Some("0.001"));
        let reread = ChangeTable::from_raw(&raw).unwrap();
        assert_eq!(reread, table);
    }
}
