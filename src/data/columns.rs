//! Column names and fixed vocabulary of the PEtab table formats

// Measurement table
pub const OBSERVABLE_ID: &str = "observableId";
pub const PREEQUILIBRATION_CONDITION_ID: &str = "preequilibrationConditionId";
pub const SIMULATION_CONDITION_ID: &str = "simulationConditionId";
pub const EXPERIMENT_ID: &str = "experimentId";
pub const MEASUREMENT: &str = "measurement";
pub const TIME: &str = "time";
pub const OBSERVABLE_PARAMETERS: &str = "observableParameters";
pub const NOISE_PARAMETERS: &str = "noiseParameters";
pub const DATASET_ID: &str = "datasetId";
pub const REPLICATE_ID: &str = "replicateId";

/// Value column of a simulation table
pub const SIMULATION: &str = "simulation";
/// Value column of a residual table
pub const RESIDUAL: &str = "residual";
/// Noise value column
pub const NOISE_VALUE: &str = "noiseValue";

pub const MEASUREMENT_DF_REQUIRED_COLS: [&str; 4] =
    [OBSERVABLE_ID, SIMULATION_CONDITION_ID, MEASUREMENT, TIME];

// Parameter table
pub const PARAMETER_ID: &str = "parameterId";
pub const PARAMETER_NAME: &str = "parameterName";
pub const PARAMETER_SCALE: &str = "parameterScale";
pub const LOWER_BOUND: &str = "lowerBound";
pub const UPPER_BOUND: &str = "upperBound";
pub const NOMINAL_VALUE: &str = "nominalValue";
pub const ESTIMATE: &str = "estimate";
pub const INITIALIZATION_PRIOR_TYPE: &str = "initializationPriorType";
pub const INITIALIZATION_PRIOR_PARAMETERS: &str = "initializationPriorParameters";
pub const OBJECTIVE_PRIOR_TYPE: &str = "objectivePriorType";
pub const OBJECTIVE_PRIOR_PARAMETERS: &str = "objectivePriorParameters";

pub const PARAMETER_DF_REQUIRED_COLS: [&str; 5] =
    [PARAMETER_ID, PARAMETER_SCALE, LOWER_BOUND, UPPER_BOUND, ESTIMATE];

// Condition table
pub const CONDITION_ID: &str = "conditionId";
pub const CONDITION_NAME: &str = "conditionName";
pub const TARGET_ID: &str = "targetId";
pub const TARGET_VALUE: &str = "targetValue";

// Observable table
pub const OBSERVABLE_NAME: &str = "observableName";
pub const OBSERVABLE_FORMULA: &str = "observableFormula";
pub const NOISE_FORMULA: &str = "noiseFormula";
pub const OBSERVABLE_TRANSFORMATION: &str = "observableTransformation";
pub const NOISE_DISTRIBUTION: &str = "noiseDistribution";

pub const OBSERVABLE_DF_REQUIRED_COLS: [&str; 3] =
    [OBSERVABLE_ID, OBSERVABLE_FORMULA, NOISE_FORMULA];

// Mapping table
pub const PETAB_ENTITY_ID: &str = "petabEntityId";
pub const MODEL_ENTITY_ID: &str = "modelEntityId";
pub const NAME: &str = "name";

pub const MAPPING_DF_REQUIRED_COLS: [&str; 2] = [PETAB_ENTITY_ID, MODEL_ENTITY_ID];

/// Separator of override lists in the measurement table
pub const PARAMETER_SEPARATOR: char = ';';

/// Prefix of observables created from objective priors
pub const PRIOR_OBSERVABLE_PREFIX: &str = "prior_";
