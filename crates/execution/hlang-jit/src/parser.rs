//! 解析器接缝
//!
//! 表层语法解析器是外部协作者；运行器只依赖本 trait。内建实现
//! 读取 `.hl` IR JSON 源文件：解析产物拷入构建目录后装载，
//! 与构建工具共享磁盘格式。

use std::fs;
use std::hash::Hasher;
use std::path::{Path, PathBuf};

use twox_hash::XxHash64;

use hlang_core::module::Module;
use hlang_core::serialization;

use crate::error::{JitError, JitResult};

/// 模块解析器
pub trait ModuleParser: Send + Sync {
    /// 解析一个源文件为模块 IR；解析产物写入构建目录
    fn parse_module(&self, source_file_path: &Path, build_directory: &Path) -> JitResult<Module>;

    /// 仅解析导出声明（规划器检查反向依赖时的廉价读取）
    fn parse_export_declarations(
        &self,
        source_file_path: &Path,
        build_directory: &Path,
    ) -> JitResult<Module> {
        self.parse_module(source_file_path, build_directory)
            .map(|module| module.to_export_declarations_only())
    }
}

/// 内建解析器：源文件即 IR JSON
#[derive(Debug, Default, Clone, Copy)]
pub struct IrFileParser;

impl ModuleParser for IrFileParser {
    fn parse_module(&self, source_file_path: &Path, build_directory: &Path) -> JitResult<Module> {
        let contents = fs::read(source_file_path).map_err(|source| JitError::Io {
            path: source_file_path.to_path_buf(),
            source,
        })?;

        let text = String::from_utf8(contents.clone()).map_err(|error| JitError::Parse {
            path: source_file_path.to_path_buf(),
            message: error.to_string(),
        })?;

        let mut module =
            serialization::from_json_string(&text).map_err(|error| JitError::Parse {
                path: source_file_path.to_path_buf(),
                message: error.to_string(),
            })?;

        module.source_file_path = Some(source_file_path.to_path_buf());
        module.content_hash = Some(content_fingerprint(&contents));

        // 解析产物落入构建目录，供规划器与构建工具复用
        let parsed_file_path = parsed_module_path(source_file_path, build_directory);
        serialization::write_module_to_file(&parsed_file_path, &module)?;

        Ok(module)
    }
}

/// 构建目录中解析产物的路径
pub fn parsed_module_path(source_file_path: &Path, build_directory: &Path) -> PathBuf {
    let file_name = source_file_path
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("module"));
    build_directory
        .join(file_name)
        .with_extension(serialization::MODULE_JSON_EXTENSION)
}

fn content_fingerprint(contents: &[u8]) -> u64 {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(contents);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_module_sets_path_and_fingerprint() {
        let directory = tempfile::tempdir().unwrap();
        let build_directory = directory.path().join("build");
        fs::create_dir_all(&build_directory).unwrap();

        let module = Module {
            name: "test".to_string(),
            ..Default::default()
        };
        let source_path = directory.path().join("test.hl");
        serialization::write_module_to_file(&source_path, &module).unwrap();

        let parser = IrFileParser;
        let parsed = parser.parse_module(&source_path, &build_directory).unwrap();

        assert_eq!(parsed.name, "test");
        assert_eq!(parsed.source_file_path.as_deref(), Some(source_path.as_path()));
        assert!(parsed.content_hash.is_some());
        assert!(parsed_module_path(&source_path, &build_directory).exists());
    }

    #[test]
    fn test_malformed_source_is_a_parse_error() {
        let directory = tempfile::tempdir().unwrap();
        let source_path = directory.path().join("bad.hl");
        fs::write(&source_path, "not json").unwrap();

        let parser = IrFileParser;
        let error = parser
            .parse_module(&source_path, directory.path())
            .unwrap_err();
        assert!(matches!(error, JitError::Parse { .. }));
    }
}
