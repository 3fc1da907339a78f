//! 链接器驱动
//!
//! 给定目标文件、库搜索集、入口点、链接类型与调试标志，调用
//! 平台链接器（经 `cc` 驱动）。非零退出码携带链接器 stderr 上报。

use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkType {
    Executable,
    SharedLibrary,
    StaticLibrary,
}

/// 一次链接请求
#[derive(Debug, Clone)]
pub struct LinkerInput {
    pub object_files: Vec<PathBuf>,
    pub library_search_paths: Vec<PathBuf>,
    pub libraries: Vec<String>,
    pub entry_point: Option<String>,
    pub link_type: LinkType,
    pub debug: bool,
}

#[derive(Error, Debug)]
pub enum LinkerError {
    #[error("Linker exited with {status}: {stderr}")]
    LinkFailed { status: i32, stderr: String },

    #[error("Could not invoke linker '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

fn linker_command() -> &'static str {
    "cc"
}

/// 调用平台链接器产出 `output_path`
pub fn link(input: &LinkerInput, output_path: &Path) -> Result<(), LinkerError> {
    if input.link_type == LinkType::StaticLibrary {
        return archive(input, output_path);
    }

    let command_name = linker_command();
    let mut command = Command::new(command_name);

    for object_file in &input.object_files {
        command.arg(object_file);
    }
    for search_path in &input.library_search_paths {
        command.arg("-L").arg(search_path);
    }
    for library in &input.libraries {
        command.arg(format!("-l{library}"));
    }
    if input.link_type == LinkType::SharedLibrary {
        command.arg("-shared");
    }
    if let Some(entry_point) = &input.entry_point {
        if entry_point != "main" {
            command.arg(format!("-Wl,--entry={entry_point}"));
        }
    }
    if input.debug {
        command.arg("-g");
    }
    command.arg("-o").arg(output_path);

    tracing::debug!(command = ?command, "Invoking platform linker");

    let output = command.output().map_err(|source| LinkerError::Spawn {
        command: command_name.to_string(),
        source,
    })?;

    if output.status.success() {
        Ok(())
    } else {
        Err(LinkerError::LinkFailed {
            status: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// 把整个静态归档打包成共享库（whole-archive），供 JIT 动态加载
pub fn wrap_archive_into_shared_library(
    archive_path: &Path,
    output_path: &Path,
) -> Result<(), LinkerError> {
    let command_name = linker_command();
    let mut command = Command::new(command_name);
    command
        .arg("-shared")
        .arg("-Wl,--whole-archive")
        .arg(archive_path)
        .arg("-Wl,--no-whole-archive")
        .arg("-o")
        .arg(output_path);

    tracing::debug!(command = ?command, "Wrapping static archive into a shared library");

    let output = command.output().map_err(|source| LinkerError::Spawn {
        command: command_name.to_string(),
        source,
    })?;

    if output.status.success() {
        Ok(())
    } else {
        Err(LinkerError::LinkFailed {
            status: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

fn archive(input: &LinkerInput, output_path: &Path) -> Result<(), LinkerError> {
    let mut command = Command::new("ar");
    command.arg("rcs").arg(output_path);
    for object_file in &input.object_files {
        command.arg(object_file);
    }

    let output = command.output().map_err(|source| LinkerError::Spawn {
        command: "ar".to_string(),
        source,
    })?;

    if output.status.success() {
        Ok(())
    } else {
        Err(LinkerError::LinkFailed {
            status: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_object_file_fails() {
        let input = LinkerInput {
            object_files: vec![PathBuf::from("/nonexistent/never.o")],
            library_search_paths: vec![],
            libraries: vec![],
            entry_point: None,
            link_type: LinkType::Executable,
            debug: false,
        };
        let directory = tempfile::tempdir().unwrap();
        let result = link(&input, &directory.path().join("out"));
        assert!(result.is_err());
    }
}
