//! YAML loader for detection files.

use crate::types::{
    DetectionDefinition, DetectionMetadata, TestCaseDefinition, ValidationError,
    validate_test_cases,
};
use glob::glob;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Patterns searched when a directory is given.
pub const DETECTION_FILE_PATTERNS: [&str; 2] = ["**/*.detection.yaml", "**/*.detection.yml"];

/// Errors that can occur during loading.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yml::Error),
    #[error("glob pattern error: {0}")]
    Glob(#[from] glob::PatternError),
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
    #[error("file not found: {0}")]
    FileNotFound(PathBuf),
    #[error("{path}: exactly one of 'body' or 'body-file' is required")]
    Body { path: PathBuf },
    #[error("{path}: exactly one of 'log-types' or 'resource-types' is required")]
    Metadata { path: PathBuf },
    #[error("resource for test \"{name}\" cannot be serialized: {message}")]
    Resource { name: String, message: String },
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct DetectionFile {
    name: Option<String>,
    body: Option<String>,
    body_file: Option<PathBuf>,
    log_types: Option<Vec<String>>,
    resource_types: Option<Vec<String>>,
    #[serde(default)]
    tests: Vec<TestEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct TestEntry {
    name: String,
    expected_result: bool,
    resource: ResourceValue,
}

/// A resource is either a JSON string or inline YAML converted to JSON.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ResourceValue {
    Raw(String),
    Structured(serde_json::Value),
}

impl ResourceValue {
    fn into_json(self, name: &str) -> Result<String, LoaderError> {
        match self {
            Self::Raw(raw) => Ok(raw),
            Self::Structured(value) => {
                serde_json::to_string(&value).map_err(|e| LoaderError::Resource {
                    name: name.to_string(),
                    message: e.to_string(),
                })
            }
        }
    }
}

/// A detection and its test cases, as read from disk.
#[derive(Debug, Clone)]
pub struct LoadedDetection {
    pub path: PathBuf,
    pub definition: DetectionDefinition,
    pub tests: Vec<TestCaseDefinition>,
}

/// Load a detection file.
///
/// The detection name defaults to the file name without its
/// `.detection.yaml` suffix.
///
/// # Errors
/// Returns an error if:
/// - The file or its `body-file` cannot be read
/// - YAML parsing fails
/// - Body or metadata are missing or given twice
/// - A test has an empty name or a resource that is not valid JSON
pub fn load_detection_file<P: AsRef<Path>>(path: P) -> Result<LoadedDetection, LoaderError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(LoaderError::FileNotFound(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path)?;
    let file: DetectionFile = serde_yml::from_str(&content)?;

    let body = match (file.body, file.body_file) {
        (Some(body), None) => body,
        (None, Some(body_file)) => {
            let base = path.parent().unwrap_or_else(|| Path::new("."));
            let body_path = base.join(body_file);
            if !body_path.exists() {
                return Err(LoaderError::FileNotFound(body_path));
            }
            std::fs::read_to_string(body_path)?
        }
        _ => {
            return Err(LoaderError::Body {
                path: path.to_path_buf(),
            });
        }
    };

    let metadata = match (file.log_types, file.resource_types) {
        (Some(log_types), None) => DetectionMetadata::LogTypes(log_types),
        (None, Some(resource_types)) => DetectionMetadata::ResourceTypes(resource_types),
        _ => {
            return Err(LoaderError::Metadata {
                path: path.to_path_buf(),
            });
        }
    };

    let tests = file
        .tests
        .into_iter()
        .map(|entry| {
            let resource = entry.resource.into_json(&entry.name)?;
            Ok(TestCaseDefinition::new(entry.name, resource, entry.expected_result))
        })
        .collect::<Result<Vec<_>, LoaderError>>()?;

    let definition = DetectionDefinition {
        name: file.name.or_else(|| default_name(path)),
        body,
        metadata,
    };
    definition.validate()?;
    validate_test_cases(&tests)?;

    Ok(LoadedDetection {
        path: path.to_path_buf(),
        definition,
        tests,
    })
}

fn default_name(path: &Path) -> Option<String> {
    let file_name = path.file_name()?.to_string_lossy();
    let stem = file_name
        .strip_suffix(".detection.yaml")
        .or_else(|| file_name.strip_suffix(".detection.yml"))
        .or_else(|| file_name.strip_suffix(".yaml"))
        .or_else(|| file_name.strip_suffix(".yml"))
        .unwrap_or(&file_name);
    Some(stem.to_string())
}

/// Discover detection files under a directory, sorted by path.
///
/// # Errors
/// Returns an error if a glob pattern is invalid.
pub fn discover_detection_files(dir: &Path) -> Result<Vec<PathBuf>, LoaderError> {
    let mut files = Vec::new();
    let mut seen = HashSet::new();

    for pattern in DETECTION_FILE_PATTERNS {
        let full_pattern = dir.join(pattern);
        for path in glob(&full_pattern.to_string_lossy())?.flatten() {
            if seen.insert(path.clone()) {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok(files)
}

/// Expand CLI paths into detection files. Files are kept as given,
/// directories are searched. An empty list means the current directory.
///
/// # Errors
/// Returns `LoaderError::FileNotFound` for a path that does not exist.
pub fn resolve_detection_paths(paths: &[PathBuf]) -> Result<Vec<PathBuf>, LoaderError> {
    let default = [PathBuf::from(".")];
    let paths = if paths.is_empty() { &default[..] } else { paths };

    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            files.extend(discover_detection_files(path)?);
        } else if path.is_file() {
            files.push(path.clone());
        } else {
            return Err(LoaderError::FileNotFound(path.clone()));
        }
    }
    Ok(files)
}

/// Keep tests whose name contains `filter`.
#[must_use]
pub fn filter_tests(tests: &[TestCaseDefinition], filter: Option<&str>) -> Vec<TestCaseDefinition> {
    match filter {
        Some(needle) => tests
            .iter()
            .filter(|t| t.name.contains(needle))
            .cloned()
            .collect(),
        None => tests.to_vec(),
    }
}
