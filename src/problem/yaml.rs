//! YAML problem files
//!
//! ```yaml
//! format_version: 1
//! parameter_file: parameters.tsv
//! problems:
//!   - sbml_files: [model.json]
//!     condition_files: [conditions.tsv]
//!     measurement_files: [measurements.tsv]
//!     observable_files: [observables.tsv]
//! ```
//!
//! Relative paths are resolved against the directory of the YAML file.
//! Format version 2 files may give `model_files` as a map of model ids to
//! `{location, language}`; the locations are used as model files.
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use config::{Config, File, FileFormat};
use serde::{Deserialize, Serialize};

use super::{Problem, ProblemError, ProblemFiles};
use crate::data::TsvTable;

/// Name of the problem file written by [Problem::to_files]
pub const PROBLEM_FILE: &str = "problem.yaml";

/// A model file of a format version 2 problem
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ModelLocation {
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// One file name, a list of them, or model files keyed by model id
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum FileList {
    One(String),
    Many(Vec<String>),
    Models(BTreeMap<String, ModelLocation>),
}

impl Default for FileList {
    fn default() -> Self {
        FileList::Many(Vec::new())
    }
}

impl FileList {
    pub fn files(&self) -> Vec<&str> {
        match self {
            FileList::One(f) => vec![f.as_str()],
            FileList::Many(files) => files.iter().map(String::as_str).collect(),
            FileList::Models(models) => models.values().map(|m| m.location.as_str()).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.files().is_empty()
    }
}

/// Table files of one entry of `problems`
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct SubProblemConfig {
    #[serde(default, alias = "sbml_files")]
    pub model_files: FileList,
    #[serde(default)]
    pub condition_files: FileList,
    #[serde(default)]
    pub measurement_files: FileList,
    #[serde(default)]
    pub observable_files: FileList,
    #[serde(default, skip_serializing_if = "FileList::is_empty")]
    pub mapping_files: FileList,
    #[serde(default, skip_serializing_if = "FileList::is_empty")]
    pub experiment_files: FileList,
    #[serde(default, skip_serializing_if = "FileList::is_empty")]
    pub visualization_files: FileList,
}

/// Contents of a YAML problem file
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ProblemConfig {
    pub format_version: String,
    #[serde(default)]
    pub parameter_file: FileList,
    pub problems: Vec<SubProblemConfig>,
}

impl ProblemConfig {
    /// Read a problem file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ProblemError> {
        let parsed = Config::builder()
            .add_source(File::from(path.as_ref()).format(FileFormat::Yaml))
            .build()?;
        let config: ProblemConfig = parsed.try_deserialize()?;
        config.check_format_version()?;
        Ok(config)
    }

    /// Major format version, only 1 and 2 are supported
    pub fn major_version(&self) -> Option<u32> {
        self.format_version
            .trim()
            .split('.')
            .next()
            .and_then(|major| major.parse().ok())
    }

    fn check_format_version(&self) -> Result<(), ProblemError> {
        match self.major_version() {
            Some(1) | Some(2) => Ok(()),
            _ => Err(ProblemError::UnsupportedFormatVersion(
                self.format_version.clone(),
            )),
        }
    }

    /// Resolve the file names against `base_dir`
    ///
    /// Only a single entry in `problems` is supported.
    pub fn to_files(&self, base_dir: &Path, path: &Path) -> Result<ProblemFiles, ProblemError> {
        let [problem] = self.problems.as_slice() else {
            return Err(ProblemError::ProblemCount {
                path: path.display().to_string(),
                count: self.problems.len(),
            });
        };
        let resolve = |list: &FileList| -> Vec<PathBuf> {
            list.files().into_iter().map(|f| base_dir.join(f)).collect()
        };

        let mut models = resolve(&problem.model_files).into_iter();
        let model = models.next();
        if models.next().is_some() {
            tracing::warn!("Only the first model file of {} is used", path.display());
        }

        Ok(ProblemFiles {
            model,
            conditions: resolve(&problem.condition_files),
            measurements: resolve(&problem.measurement_files),
            observables: resolve(&problem.observable_files),
            parameters: resolve(&self.parameter_file),
            mapping: resolve(&problem.mapping_files),
            experiments: resolve(&problem.experiment_files),
        })
    }
}

impl Problem {
    /// Load a problem from its YAML file
    pub fn from_yaml(path: impl AsRef<Path>) -> Result<Self, ProblemError> {
        let path = path.as_ref();
        let config = ProblemConfig::from_path(path)?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new(""));
        let files = config.to_files(base_dir, path)?;
        for (table, files) in [
            ("measurement", &files.measurements),
            ("observable", &files.observables),
            ("parameter", &files.parameters),
        ] {
            if files.is_empty() {
                tracing::warn!("Problem {} has no {} file", path.display(), table);
            }
        }
        tracing::info!("Loading PEtab problem from {}", path.display());
        Problem::from_files(&files)
    }

    /// Write all tables and a YAML problem file into `dir`
    ///
    /// `model_file` is referenced from the YAML file as is. Returns the path
    /// of the YAML file.
    pub fn to_files(
        &self,
        dir: impl AsRef<Path>,
        model_file: Option<&str>,
    ) -> Result<PathBuf, ProblemError> {
        let dir = dir.as_ref();
        let write = |name: &str, table: &dyn Fn(&Path) -> Result<(), crate::data::TableError>| {
            table(&dir.join(name)).map(|_| FileList::Many(vec![name.to_string()]))
        };

        let problem = SubProblemConfig {
            model_files: model_file
                .map(|f| FileList::Many(vec![f.to_string()]))
                .unwrap_or_default(),
            condition_files: write("conditions.tsv", &|p| self.condition_table.to_path(p))?,
            measurement_files: write("measurements.tsv", &|p| self.measurement_table.to_path(p))?,
            observable_files: write("observables.tsv", &|p| self.observable_table.to_path(p))?,
            mapping_files: match &self.mapping_table {
                Some(table) => write("mapping.tsv", &|p| table.to_path(p))?,
                None => FileList::default(),
            },
            experiment_files: match &self.experiment_table {
                Some(table) => write("experiments.tsv", &|p| table.to_path(p))?,
                None => FileList::default(),
            },
            visualization_files: FileList::default(),
        };
        let config = ProblemConfig {
            format_version: "1".to_string(),
            parameter_file: write("parameters.tsv", &|p| self.parameter_table.to_path(p))?,
            problems: vec![problem],
        };

        // JSON is a subset of YAML
        let yaml = serde_json::to_string_pretty(&config)?;
        let path = dir.join(PROBLEM_FILE);
        std::fs::write(&path, yaml).map_err(|e| ProblemError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Ok(path)
    }
}
