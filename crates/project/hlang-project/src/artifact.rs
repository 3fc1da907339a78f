//! 工件清单
//!
//! `hlang_artifact.json` 的内存模型与 JSON 读写。`include`
//! 通配符选定组成工件的源文件；`entry_point` 是运行器查找的
//! 改名后符号。

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ProjectError, ProjectResult};

/// 语义化版本 `M.m.p`，JSON 中为字符串
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl fmt::Display for Version {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = ProjectError;

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        let mut parts = string.split('.');
        let mut next = || {
            parts
                .next()
                .and_then(|part| part.parse::<u32>().ok())
                .ok_or_else(|| ProjectError::Version(string.to_string()))
        };
        let version = Version {
            major: next()?,
            minor: next()?,
            patch: next()?,
        };
        if parts.next().is_some() {
            return Err(ProjectError::Version(string.to_string()));
        }
        Ok(version)
    }
}

impl Serialize for Version {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let string = String::deserialize(deserializer)?;
        string.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactType {
    Executable,
    Library,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    #[serde(rename = "name")]
    pub artifact_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CHeader {
    #[serde(rename = "name")]
    pub module_name: String,
    pub header: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutableInfo {
    pub source: PathBuf,
    pub entry_point: String,
    pub include: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LibraryInfo {
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub c_headers: Vec<CHeader>,
    #[serde(default)]
    pub external_libraries: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArtifactInfo {
    Executable(ExecutableInfo),
    Library(LibraryInfo),
}

/// 一个可构建单元
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub file_path: PathBuf,
    pub name: String,
    pub version: Version,
    pub artifact_type: ArtifactType,
    pub dependencies: Vec<Dependency>,
    pub info: Option<ArtifactInfo>,
}

/// 清单在磁盘上的原始形状
#[derive(Debug, Serialize, Deserialize)]
struct RawArtifact {
    name: String,
    version: Version,
    #[serde(rename = "type")]
    artifact_type: ArtifactType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    executable: Option<ExecutableInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    library: Option<LibraryInfo>,
    #[serde(default)]
    dependencies: Vec<Dependency>,
}

/// 读取工件清单
pub fn get_artifact(artifact_file_path: &Path) -> ProjectResult<Artifact> {
    let contents = fs::read_to_string(artifact_file_path).map_err(|source| ProjectError::Io {
        path: artifact_file_path.to_path_buf(),
        source,
    })?;

    let raw: RawArtifact =
        serde_json::from_str(&contents).map_err(|error| ProjectError::Parse {
            path: artifact_file_path.to_path_buf(),
            message: error.to_string(),
        })?;

    let info = match (raw.executable, raw.library) {
        (Some(executable), _) => Some(ArtifactInfo::Executable(executable)),
        (None, Some(library)) => Some(ArtifactInfo::Library(library)),
        (None, None) => None,
    };

    Ok(Artifact {
        file_path: artifact_file_path.to_path_buf(),
        name: raw.name,
        version: raw.version,
        artifact_type: raw.artifact_type,
        dependencies: raw.dependencies,
        info,
    })
}

/// 写出工件清单
pub fn write_artifact_to_file(artifact: &Artifact, path: &Path) -> ProjectResult<()> {
    let mut raw = RawArtifact {
        name: artifact.name.clone(),
        version: artifact.version,
        artifact_type: artifact.artifact_type,
        executable: None,
        library: None,
        dependencies: artifact.dependencies.clone(),
    };
    match &artifact.info {
        Some(ArtifactInfo::Executable(executable)) => raw.executable = Some(executable.clone()),
        Some(ArtifactInfo::Library(library)) => raw.library = Some(library.clone()),
        None => {}
    }

    let contents = serde_json::to_string_pretty(&raw).map_err(|error| ProjectError::Parse {
        path: path.to_path_buf(),
        message: error.to_string(),
    })?;
    fs::write(path, contents).map_err(|source| ProjectError::Io {
        path: path.to_path_buf(),
        source,
    })
}

impl Artifact {
    pub fn include_patterns(&self) -> &[String] {
        match &self.info {
            Some(ArtifactInfo::Executable(executable)) => &executable.include,
            Some(ArtifactInfo::Library(library)) => &library.include,
            None => &[],
        }
    }

    pub fn entry_point(&self) -> Option<&str> {
        match &self.info {
            Some(ArtifactInfo::Executable(executable)) => Some(&executable.entry_point),
            _ => None,
        }
    }

    pub fn root_directory(&self) -> &Path {
        self.file_path.parent().unwrap_or_else(|| Path::new("."))
    }
}

/// 解析 include 通配符为源文件集合（字典序，去重）
pub fn resolve_include_files(artifact: &Artifact) -> ProjectResult<Vec<PathBuf>> {
    let root = artifact.root_directory();
    let mut files = Vec::new();

    for pattern in artifact.include_patterns() {
        let absolute_pattern = root.join(pattern);
        let pattern_string = absolute_pattern.to_string_lossy().into_owned();

        let paths = glob::glob(&pattern_string).map_err(|error| ProjectError::IncludePattern {
            pattern: pattern.clone(),
            message: error.to_string(),
        })?;

        for path in paths {
            match path {
                Ok(path) if path.is_file() => files.push(path),
                Ok(_) => {}
                Err(error) => {
                    tracing::warn!(pattern = %pattern, error = %error, "Skipping unreadable path");
                }
            }
        }
    }

    files.sort();
    files.dedup();
    Ok(files)
}

/// 通配符模式的固定前缀目录
fn pattern_root(root: &Path, pattern: &str) -> PathBuf {
    let mut directory = PathBuf::from(root);
    for component in Path::new(pattern).components() {
        let part = component.as_os_str().to_string_lossy();
        if part.contains('*') || part.contains('?') || part.contains('[') {
            break;
        }
        directory.push(component);
    }
    if directory.is_file() {
        directory.pop();
    }
    directory
}

/// 覆盖所有 include 通配符的最小根目录集合：
/// 去除互为子目录的项，只留根
pub fn find_root_include_directories(artifact: &Artifact) -> Vec<PathBuf> {
    let root = artifact.root_directory();
    let mut directories: Vec<PathBuf> = artifact
        .include_patterns()
        .iter()
        .map(|pattern| pattern_root(root, pattern))
        .collect();

    if directories.is_empty() {
        directories.push(root.to_path_buf());
    }

    directories.sort();
    directories.dedup();

    let mut roots: Vec<PathBuf> = Vec::new();
    for directory in directories {
        let is_subdirectory = roots.iter().any(|existing| directory.starts_with(existing));
        if !is_subdirectory {
            roots.push(directory);
        }
    }
    roots
}

#[cfg(test)]
mod tests {
    use super::*;

    fn executable_artifact(directory: &Path, include: Vec<String>) -> Artifact {
        Artifact {
            file_path: directory.join("hlang_artifact.json"),
            name: "app".to_string(),
            version: "0.1.0".parse().unwrap(),
            artifact_type: ArtifactType::Executable,
            dependencies: vec![],
            info: Some(ArtifactInfo::Executable(ExecutableInfo {
                source: PathBuf::from("main.hl"),
                entry_point: "main".to_string(),
                include,
            })),
        }
    }

    #[test]
    fn test_version_parse_and_display() {
        let version: Version = "1.2.3".parse().unwrap();
        assert_eq!(
            version,
            Version {
                major: 1,
                minor: 2,
                patch: 3
            }
        );
        assert_eq!(version.to_string(), "1.2.3");
        assert!("1.2".parse::<Version>().is_err());
        assert!("a.b.c".parse::<Version>().is_err());
    }

    #[test]
    fn test_artifact_json_round_trip() {
        let directory = tempfile::tempdir().unwrap();
        let artifact = executable_artifact(directory.path(), vec!["./**/*.hl".to_string()]);
        let path = directory.path().join("hlang_artifact.json");

        write_artifact_to_file(&artifact, &path).unwrap();
        let loaded = get_artifact(&path).unwrap();

        assert_eq!(loaded.name, "app");
        assert_eq!(loaded.version, artifact.version);
        assert_eq!(loaded.entry_point(), Some("main"));
        assert_eq!(loaded.include_patterns(), artifact.include_patterns());
    }

    #[test]
    fn test_resolve_include_files() {
        let directory = tempfile::tempdir().unwrap();
        fs::create_dir_all(directory.path().join("sub")).unwrap();
        fs::write(directory.path().join("a.hl"), "{}").unwrap();
        fs::write(directory.path().join("sub/b.hl"), "{}").unwrap();
        fs::write(directory.path().join("ignored.txt"), "").unwrap();

        let artifact = executable_artifact(directory.path(), vec!["**/*.hl".to_string()]);
        let files = resolve_include_files(&artifact).unwrap();

        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|file| file.extension().unwrap() == "hl"));
    }

    #[test]
    fn test_root_include_directories_prune_subdirectories() {
        let directory = tempfile::tempdir().unwrap();
        fs::create_dir_all(directory.path().join("src/nested")).unwrap();

        let artifact = executable_artifact(
            directory.path(),
            vec!["src/**/*.hl".to_string(), "src/nested/*.hl".to_string()],
        );
        let roots = find_root_include_directories(&artifact);

        assert_eq!(roots, vec![directory.path().join("src")]);
    }

    #[test]
    fn test_missing_artifact_reports_path() {
        let error = get_artifact(Path::new("/nonexistent/hlang_artifact.json")).unwrap_err();
        assert!(matches!(error, ProjectError::Io { .. }));
    }
}
