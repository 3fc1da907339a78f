//! AOT 目标文件发射
//!
//! 同一套模块驱动对接 `ObjectModule`，产出交给链接器驱动的 `.o`。

use std::fs;
use std::path::Path;

use cranelift_module::default_libcall_names;
use cranelift_object::{ObjectBuilder, ObjectModule};

use hlang_core::database::DeclarationDatabase;
use hlang_core::module::Module;

use crate::driver::{compile_module, BackendOptions, ModuleCompilation};
use crate::error::{CodegenError, CodegenResult};
use crate::isa::create_native_isa;

/// 把一个模块编译为目标文件
pub fn emit_object_file(
    database: &DeclarationDatabase,
    core_module: &Module,
    options: &BackendOptions,
    output_path: &Path,
) -> CodegenResult<ModuleCompilation> {
    let isa = create_native_isa(options.optimization_level, true)?;

    let builder = ObjectBuilder::new(isa, core_module.name.clone(), default_libcall_names())
        .map_err(|error| CodegenError::BackendError(error.to_string()))?;
    let mut backend = ObjectModule::new(builder);

    let compilation = compile_module(&mut backend, database, core_module, options)?;
    if let Some((name, error)) = compilation.failed_functions.first() {
        return Err(CodegenError::BackendError(format!(
            "function '{name}' failed to compile: {error}"
        )));
    }

    let product = backend.finish();
    let bytes = product
        .emit()
        .map_err(|error| CodegenError::BackendError(error.to_string()))?;

    fs::write(output_path, bytes).map_err(|error| {
        CodegenError::BackendError(format!(
            "could not write object file '{}': {error}",
            output_path.display()
        ))
    })?;

    Ok(compilation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hlang_core::declarations::{FunctionDeclaration, FunctionDefinition, Linkage};
    use hlang_core::expressions::{
        create_constant_expression, create_return_expression, create_statement, ExpressionIndex,
    };
    use hlang_core::types::{create_integer_type_type_reference, FunctionType};

    fn main_module() -> Module {
        let int32 = create_integer_type_type_reference(32, true);
        let mut module = Module {
            name: "sample".to_string(),
            ..Default::default()
        };
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
    fn test_emit_object_file() {
        let directory = tempfile::tempdir().unwrap();
        let output_path = directory.path().join("sample.o");

        let mut database = DeclarationDatabase::new();
        let module = main_module();
        database.add_declarations(&module).unwrap();

        let compilation =
            emit_object_file(&database, &module, &BackendOptions::default(), &output_path)
                .unwrap();

        assert!(compilation.failed_functions.is_empty());
        assert!(compilation.function_ids.contains_key("main"));
        let metadata = fs::metadata(&output_path).unwrap();
        assert!(metadata.len() > 0);
    }
}
