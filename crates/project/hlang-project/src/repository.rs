//! 仓库清单
//!
//! `hlang_repository.json`：把工件名映射到其所在目录。

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ProjectError, ProjectResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactLocation {
    pub name: String,
    pub location: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    pub name: String,
    #[serde(default)]
    pub artifacts: Vec<ArtifactLocation>,
}

impl Repository {
    /// 工件名 → 目录（相对路径按仓库清单所在目录解析）
    pub fn artifact_name_to_location(
        &self,
        repository_file_path: &Path,
    ) -> HashMap<String, PathBuf> {
        let base = repository_file_path.parent().unwrap_or_else(|| Path::new("."));
        self.artifacts
            .iter()
            .map(|artifact| {
                let location = if artifact.location.is_absolute() {
                    artifact.location.clone()
                } else {
                    base.join(&artifact.location)
                };
                (artifact.name.clone(), location)
            })
            .collect()
    }
}

pub fn get_repository(repository_file_path: &Path) -> ProjectResult<Repository> {
    let contents =
        fs::read_to_string(repository_file_path).map_err(|source| ProjectError::Io {
            path: repository_file_path.to_path_buf(),
            source,
        })?;

    serde_json::from_str(&contents).map_err(|error| ProjectError::Parse {
        path: repository_file_path.to_path_buf(),
        message: error.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_round_trip_and_locations() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("hlang_repository.json");

        let repository = Repository {
            name: "local".to_string(),
            artifacts: vec![ArtifactLocation {
                name: "app".to_string(),
                location: PathBuf::from("app"),
            }],
        };
        fs::write(&path, serde_json::to_string_pretty(&repository).unwrap()).unwrap();

        let loaded = get_repository(&path).unwrap();
        assert_eq!(loaded, repository);

        let locations = loaded.artifact_name_to_location(&path);
        assert_eq!(locations.get("app"), Some(&directory.path().join("app")));
    }
}
