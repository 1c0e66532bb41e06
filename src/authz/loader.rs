use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::authz::errors::AuthzError;
use crate::authz::policy::parse_kdl_document;
use crate::authz::types::*;

/// Produces a complete candidate snapshot from wherever policies live.
pub trait PolicyLoader: Send + Sync {
    fn load(&self) -> Result<HashMap<Audience, PolicySet>, AuthzError>;
}

/// Loads `.kdl` policy files from a single file or a directory.
#[derive(Debug, Clone)]
pub struct FileLoader {
    path: PathBuf,
}

impl FileLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PolicyLoader for FileLoader {
    fn load(&self) -> Result<HashMap<Audience, PolicySet>, AuthzError> {
        load_policies(&self.path)
    }
}

/// Load policies from `path`: a `.kdl` file, or every `.kdl` file in a
/// directory, read in sorted order.
pub fn load_policies(path: &Path) -> Result<HashMap<Audience, PolicySet>, AuthzError> {
    let files = if path.is_dir() {
        let mut entries: Vec<PathBuf> = std::fs::read_dir(path)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|ext| ext == "kdl").unwrap_or(false))
            .collect();
        entries.sort();
        entries
    } else if path.is_file() {
        vec![path.to_path_buf()]
    } else {
        return Err(AuthzError::InvalidPolicy(format!(
            "policies path `{}` does not exist",
            path.display()
        )));
    };

    let mut all_parsed = Vec::new();
    for file in &files {
        let contents =
            std::fs::read_to_string(file).map_err(|source| AuthzError::PolicyLoadError {
                path: file.display().to_string(),
                source,
            })?;
        all_parsed.push(parse_kdl_document(&contents)?);
    }

    let policies = merge_policies(all_parsed)?;

    tracing::info!(
        files = files.len(),
        audiences = policies.len(),
        rules = policies.values().map(|p| p.rules.len()).sum::<usize>(),
        "Loaded authorization policies"
    );

    Ok(policies)
}

/// Merge parsed files into one audience map. Each audience may be defined once.
pub fn merge_policies(
    parsed: Vec<ParsedPolicy>,
) -> Result<HashMap<Audience, PolicySet>, AuthzError> {
    let mut policies = HashMap::new();
    for p in parsed {
        for (audience, set) in p.audiences {
            if policies.contains_key(&audience) {
                return Err(AuthzError::DuplicateAudience(audience));
            }
            policies.insert(audience, set);
        }
    }
    Ok(policies)
}
