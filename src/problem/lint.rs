//! Consistency checks of a PEtab problem
//!
//! Every table is checked on its own first, then the tables are checked
//! against each other and against the model. All findings are collected into
//! a [LintReport] instead of stopping at the first one.
use std::collections::BTreeSet;
use std::fmt;

use super::Problem;
use crate::data::columns::*;
use crate::data::{check_ids, TableError};
use crate::parameter_mapping::is_output_placeholder;

/// How serious a lint finding is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// A single finding
#[derive(Debug, Clone, PartialEq)]
pub struct LintIssue {
    pub severity: Severity,
    /// Table the finding is about
    pub table: &'static str,
    pub message: String,
}

impl fmt::Display for LintIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} table: {}", self.severity, self.table, self.message)
    }
}

/// All findings of [lint_problem]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LintReport {
    issues: Vec<LintIssue>,
}

impl LintReport {
    pub fn issues(&self) -> &[LintIssue] {
        &self.issues
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::Error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &LintIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &LintIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Warning)
    }

    fn error(&mut self, table: &'static str, message: impl Into<String>) {
        self.issues.push(LintIssue {
            severity: Severity::Error,
            table,
            message: message.into(),
        });
    }

    fn warning(&mut self, table: &'static str, message: impl Into<String>) {
        self.issues.push(LintIssue {
            severity: Severity::Warning,
            table,
            message: message.into(),
        });
    }

    fn check(&mut self, table: &'static str, result: Result<(), TableError>) {
        if let Err(e) = result {
            self.error(table, e.to_string());
        }
    }

    /// Emit every finding through `tracing`
    pub fn log(&self) {
        for issue in &self.issues {
            match issue.severity {
                Severity::Warning => tracing::warn!("{}", issue),
                Severity::Error => tracing::error!("{}", issue),
            }
        }
    }
}

impl fmt::Display for LintReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for issue in &self.issues {
            writeln!(f, "{}", issue)?;
        }
        Ok(())
    }
}

/// Check a problem
pub fn lint_problem(problem: &Problem) -> LintReport {
    let mut report = LintReport::default();
    let model = problem.model();

    if model.is_none() {
        report.warning("model", "Model not available. Skipping model-related checks.");
    }

    // tables on their own
    report.check("condition", problem.condition_table.check());
    report.check("observable", problem.observable_table.check());
    report.check("parameter", problem.parameter_table.check());
    if let Some(mapping) = &problem.mapping_table {
        report.check("mapping", mapping.check(model));
    }
    check_measurements(problem, &mut report);

    // measurements against observables and conditions
    report.check(
        "measurement",
        problem
            .measurement_table
            .assert_overrides_match_parameter_count(&problem.observable_table),
    );
    let mut referenced_conditions = BTreeSet::new();
    for m in problem.measurement_table.measurements() {
        referenced_conditions.extend(m.simulation_condition_id.iter().cloned());
        referenced_conditions.extend(m.preequilibration_condition_id.iter().cloned());
    }
    if let Some(experiments) = &problem.experiment_table {
        referenced_conditions.extend(experiments.condition_ids());
        for id in problem
            .measurement_table
            .measurements()
            .iter()
            .filter_map(|m| m.experiment_id.as_deref())
            .collect::<BTreeSet<_>>()
        {
            if experiments.get(id).is_none() {
                report.error("measurement", format!("Experiment {} not found in experiment table", id));
            }
        }
    }
    for id in &referenced_conditions {
        if !problem.condition_table.contains(id) {
            report.error("measurement", format!("Condition {} not found in condition table", id));
        }
    }

    if problem
        .measurement_table
        .has_timepoint_specific_mappings(true, false)
    {
        report.warning(
            "measurement",
            "Timepoint-specific observable or noise parameter overrides are used",
        );
    }

    check_parameters(problem, &mut report);
    check_condition_columns(problem, &mut report);

    for issue in &report.issues {
        tracing::debug!("{}", issue);
    }
    report
}

fn check_measurements(problem: &Problem, report: &mut LintReport) {
    let measurements = problem.measurement_table.measurements();
    report.check(
        "measurement",
        check_ids(measurements.iter().map(|m| m.observable_id.as_str()), OBSERVABLE_ID),
    );
    for (row, m) in measurements.iter().enumerate() {
        if !m.measurement.is_finite() {
            report.error(
                "measurement",
                format!("Measurement in row {} is not a finite number", row),
            );
        }
        if m.time.is_nan() {
            report.error("measurement", format!("Time in row {} is NaN", row));
        }
        if m.simulation_condition_id.is_none() && m.experiment_id.is_none() {
            report.error(
                "measurement",
                format!(
                    "Row {} has neither {} nor {}",
                    row, SIMULATION_CONDITION_ID, EXPERIMENT_ID
                ),
            );
        }
        if problem.observable_table.get(&m.observable_id).is_none() {
            report.error(
                "measurement",
                format!("Observable {} not found in observable table", m.observable_id),
            );
        }
    }
    if problem.measurement_table.is_empty() {
        report.warning("measurement", "Measurement table is empty");
    }
}

/// Required parameters must be in the parameter table, unused ones are reported
fn check_parameters(problem: &Problem, report: &mut LintReport) {
    let parameters = &problem.parameter_table;

    let mut required: BTreeSet<String> = BTreeSet::new();
    required.extend(problem.measurement_table.measurement_parameter_ids());
    required.extend(problem.condition_table.parametric_overrides());
    if let Some(model) = problem.model() {
        required.extend(problem.observable_table.output_parameters(
            model,
            true,
            true,
            problem.mapping_table.as_ref(),
        ));
    }
    required.retain(|id| !is_output_placeholder(id));

    for id in &required {
        if !parameters.contains(id) {
            report.error("parameter", format!("Missing parameter {}", id));
        }
    }

    let Some(model) = problem.model() else {
        return;
    };
    let model_parameters: BTreeSet<String> = model.parameter_ids().into_iter().collect();
    let condition_columns: BTreeSet<&String> = problem.condition_table.columns().iter().collect();
    for p in parameters.parameters() {
        if is_output_placeholder(&p.id) {
            report.error(
                "parameter",
                format!("Parameter {} is an observable or noise placeholder", p.id),
            );
        } else if condition_columns.contains(&p.id) {
            report.error(
                "parameter",
                format!("Parameter {} is also a column of the condition table", p.id),
            );
        } else if !required.contains(&p.id)
            && !model_parameters.contains(&p.id)
            && problem
                .mapping_table
                .as_ref()
                .and_then(|m| m.get(&p.id))
                .is_none()
        {
            report.warning(
                "parameter",
                format!("Extraneous parameter {} is not used anywhere", p.id),
            );
        }
        if model.is_state_variable(&p.id) {
            report.error(
                "parameter",
                format!("Parameter {} is a state variable of the model", p.id),
            );
        }
    }
}

fn check_condition_columns(problem: &Problem, report: &mut LintReport) {
    let Some(model) = problem.model() else {
        return;
    };
    for column in problem.condition_table.columns() {
        let target = problem
            .mapping_table
            .as_ref()
            .map(|m| m.resolve(column))
            .unwrap_or(column.as_str());
        if !model.is_valid_condition_target(target) && !problem.parameter_table.contains(column)
        {
            report.error(
                "condition",
                format!(
                    "Column {} is neither a model entity nor a parameter",
                    column
                ),
            );
        }
    }
}
