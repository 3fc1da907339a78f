//! IR 序列化
//!
//! 两种格式：JSON（可读，供 LSP 与构建工具使用）与紧凑二进制
//! （bincode，和类型标签编码为变体序号）。两者都与内存 IR 双射，
//! 往返（round-trip）是被测试保证的性质。

use std::fs;
use std::path::Path;

use crate::error::{CoreError, CoreResult};
use crate::module::Module;

/// 模块 JSON 源文件扩展名
pub const MODULE_JSON_EXTENSION: &str = "hl";
/// 模块二进制文件扩展名
pub const MODULE_BINARY_EXTENSION: &str = "hlb";

pub fn to_json_string(module: &Module) -> CoreResult<String> {
    serde_json::to_string_pretty(module)
        .map_err(|error| CoreError::Serialization(error.to_string()))
}

pub fn from_json_string(data: &str) -> CoreResult<Module> {
    serde_json::from_str(data).map_err(|error| CoreError::Serialization(error.to_string()))
}

pub fn to_binary(module: &Module) -> CoreResult<Vec<u8>> {
    bincode::serde::encode_to_vec(module, bincode::config::standard())
        .map_err(|error| CoreError::Serialization(error.to_string()))
}

pub fn from_binary(data: &[u8]) -> CoreResult<Module> {
    let (module, _) = bincode::serde::decode_from_slice(data, bincode::config::standard())
        .map_err(|error| CoreError::Serialization(error.to_string()))?;
    Ok(module)
}

pub fn write_module_to_file(path: &Path, module: &Module) -> CoreResult<()> {
    let is_binary = path
        .extension()
        .is_some_and(|extension| extension == MODULE_BINARY_EXTENSION);

    let contents = if is_binary {
        to_binary(module)?
    } else {
        to_json_string(module)?.into_bytes()
    };

    fs::write(path, contents).map_err(|source| CoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub fn read_module_from_file(path: &Path) -> CoreResult<Module> {
    let contents = fs::read(path).map_err(|source| CoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let is_binary = path
        .extension()
        .is_some_and(|extension| extension == MODULE_BINARY_EXTENSION);

    if is_binary {
        from_binary(&contents)
    } else {
        let text = String::from_utf8(contents)
            .map_err(|error| CoreError::Serialization(error.to_string()))?;
        from_json_string(&text)
    }
}

/// 仅读取导出声明（规划器检查反向依赖时的廉价读取）
pub fn read_module_export_declarations(path: &Path) -> CoreResult<Module> {
    let module = read_module_from_file(path)?;
    Ok(module.to_export_declarations_only())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declarations::{FunctionDeclaration, FunctionDefinition, Linkage};
    use crate::expressions::{
        create_constant_expression, create_return_expression, create_statement, ExpressionIndex,
    };
    use crate::module::{ImportModuleWithAlias, LanguageVersion, Module};
    use crate::types::{create_integer_type_type_reference, FunctionType};

    fn sample_module() -> Module {
        let int32 = create_integer_type_type_reference(32, true);
        let mut module = Module {
            name: "sample".to_string(),
            language_version: LanguageVersion {
                major: 0,
                minor: 1,
                patch: 0,
            },
            ..Default::default()
        };
        module.dependencies.alias_imports.push(ImportModuleWithAlias {
            module_name: "other".to_string(),
            alias: "other".to_string(),
            usages: vec!["S".to_string()],
        });
        module
            .export_declarations
            .function_declarations
            .push(FunctionDeclaration {
                name: "main".to_string(),
                unique_name: None,
                function_type: FunctionType {
                    input_parameter_types: vec![],
                    output_parameter_types: vec![int32.clone()],
                    is_variadic: false,
                },
                input_parameter_names: vec![],
                output_parameter_names: vec!["result".to_string()],
                input_parameter_source_positions: None,
                output_parameter_source_positions: None,
                linkage: Linkage::External,
                source_location: None,
            });
        module
            .definitions
            .function_definitions
            .push(FunctionDefinition {
                name: "main".to_string(),
                statements: vec![create_statement(vec![
                    create_return_expression(Some(ExpressionIndex::new(1))),
                    create_constant_expression(int32, "0"),
                ])],
                source_location: None,
            });
        module
    }

    #[test]
    fn test_json_round_trip() {
        let module = sample_module();
        let json = to_json_string(&module).unwrap();
        let decoded = from_json_string(&json).unwrap();
        assert_eq!(module, decoded);

        // 再序列化得到字节级相同的文本
        let json_again = to_json_string(&decoded).unwrap();
        assert_eq!(json, json_again);
    }

    #[test]
    fn test_binary_round_trip() {
        let module = sample_module();
        let bytes = to_binary(&module).unwrap();
        let decoded = from_binary(&bytes).unwrap();
        assert_eq!(module, decoded);

        let bytes_again = to_binary(&decoded).unwrap();
        assert_eq!(bytes, bytes_again);
    }

    #[test]
    fn test_file_round_trip_by_extension() {
        let directory = tempfile::tempdir().unwrap();
        let module = sample_module();

        let json_path = directory.path().join("sample.hl");
        write_module_to_file(&json_path, &module).unwrap();
        assert_eq!(read_module_from_file(&json_path).unwrap(), module);

        let binary_path = directory.path().join("sample.hlb");
        write_module_to_file(&binary_path, &module).unwrap();
        assert_eq!(read_module_from_file(&binary_path).unwrap(), module);
    }

    #[test]
    fn test_read_missing_file_reports_path() {
        let error = read_module_from_file(Path::new("/nonexistent/never.hl")).unwrap_err();
        match error {
            CoreError::Io { path, .. } => {
                assert!(path.to_string_lossy().contains("never.hl"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_export_declarations_read_strips_definitions() {
        let directory = tempfile::tempdir().unwrap();
        let module = sample_module();
        let path = directory.path().join("sample.hl");
        write_module_to_file(&path, &module).unwrap();

        let exports = read_module_export_declarations(&path).unwrap();
        assert!(exports.definitions.function_definitions.is_empty());
        assert_eq!(exports.export_declarations.function_declarations.len(), 1);
    }
}
