//! # hlang-project - 工件与仓库清单
//!
//! 工件（artifact）是一个可构建单元：可执行文件或库，由一个或
//! 多个模块组成。清单是 JSON（`hlang_artifact.json` /
//! `hlang_repository.json`）。本 crate 负责清单模型、include
//! 通配符到源文件的解析，以及文件监视根目录的最小覆盖集计算。

pub mod artifact;
pub mod error;
pub mod repository;

pub use artifact::{
    find_root_include_directories, get_artifact, resolve_include_files, write_artifact_to_file,
    Artifact, ArtifactInfo, ArtifactType, CHeader, Dependency, ExecutableInfo, LibraryInfo,
    Version,
};
pub use error::{ProjectError, ProjectResult};
pub use repository::{get_repository, ArtifactLocation, Repository};
