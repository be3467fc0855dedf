use super::{ConditionMapping, MappingError, ParMappingDict};
use crate::data::ParameterValue;

fn is_empty(value: &ParameterValue) -> bool {
    match value {
        ParameterValue::Numeric(v) => v.is_nan(),
        ParameterValue::Id(id) => id.is_empty(),
    }
}

/// Find simulation parameters without a value
///
/// Unmapped parameters are `NaN`. Their ids are returned and, if `warn`,
/// logged as a warning.
pub fn handle_missing_overrides(
    mapping: &ParMappingDict,
    warn: bool,
    condition_id: Option<&str>,
) -> Vec<String> {
    let missed: Vec<String> = mapping
        .iter()
        .filter(|(_, value)| value.is_nan())
        .map(|(id, _)| id.clone())
        .collect();

    if !missed.is_empty() && warn {
        match condition_id {
            Some(condition_id) => tracing::warn!(
                "Could not find values for mapping simulation parameters to estimated \
                 parameters ({:?}) in condition {}. Usually, this is just due to missing \
                 data points.",
                missed,
                condition_id
            ),
            None => tracing::warn!(
                "Could not find values for mapping simulation parameters to estimated \
                 parameters ({:?}). Usually, this is just due to missing data points.",
                missed
            ),
        }
    }
    missed
}

/// Merge the preequilibration mapping of one condition into its simulation
/// mapping
///
/// Values missing for simulation are taken from preequilibration. Values
/// that are set differently in both phases are an error.
pub fn merge_preeq_and_sim_pars_condition(
    mapping: &mut ConditionMapping,
    condition: usize,
) -> Result<(), MappingError> {
    if mapping.map_preeq.is_empty() {
        return Ok(());
    }

    for (par_id, par_preeq) in &mapping.map_preeq {
        let scale_preeq = mapping
            .scale_map_preeq
            .get(par_id)
            .copied()
            .unwrap_or_default();

        let Some(par_sim) = mapping.map_sim.get(par_id).cloned() else {
            // unmapped for simulation
            mapping.map_sim.insert(par_id.clone(), par_preeq.clone());
            mapping.scale_map_sim.insert(par_id.clone(), scale_preeq);
            continue;
        };

        if par_preeq != &par_sim && !(is_empty(&par_sim) && is_empty(par_preeq)) {
            if is_empty(&par_sim) {
                mapping.map_sim.insert(par_id.clone(), par_preeq.clone());
            } else if !is_empty(par_preeq) {
                return Err(MappingError::ConflictingValues {
                    condition,
                    parameter: par_id.clone(),
                    preeq: par_preeq.to_string(),
                    sim: par_sim.to_string(),
                });
            }
        }

        let scale_sim = mapping.scale_map_sim.get(par_id).copied().unwrap_or_default();
        if scale_preeq != scale_sim {
            if is_empty(&par_sim) {
                mapping.scale_map_sim.insert(par_id.clone(), scale_preeq);
            } else if !is_empty(par_preeq) {
                return Err(MappingError::ConflictingScales {
                    condition,
                    parameter: par_id.clone(),
                    preeq: scale_preeq,
                    sim: scale_sim,
                });
            }
        }
    }
    Ok(())
}

/// Merge preequilibration into simulation mappings for all conditions
///
/// Returns one merged mapping per condition, each with empty
/// preequilibration maps.
pub fn merge_preeq_and_sim_pars(
    mappings: Vec<ConditionMapping>,
) -> Result<Vec<ConditionMapping>, MappingError> {
    mappings
        .into_iter()
        .enumerate()
        .map(|(condition, mut mapping)| {
            merge_preeq_and_sim_pars_condition(&mut mapping, condition)?;
            Ok(ConditionMapping {
                map_sim: mapping.map_sim,
                scale_map_sim: mapping.scale_map_sim,
                ..Default::default()
            })
        })
        .collect()
}
