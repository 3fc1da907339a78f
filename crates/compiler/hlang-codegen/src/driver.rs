//! 模块驱动
//!
//! 把一个模块的 IR 整体翻译进一个后端模块：先发射全局变量与
//! 函数声明（按改名与链接性），再逐个发射函数定义。每个函数
//! 独立发射：一个函数失败只记录错误并丢弃该函数，不污染同
//! 模块的其他函数。

use std::collections::HashMap;

use cranelift_codegen::ir::UserFuncName;
use cranelift_module::{DataDescription, DataId, FuncId, Linkage, Module as BackendModule};
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext};

use hlang_core::database::DeclarationDatabase;
use hlang_core::declarations::{FunctionDeclaration, GlobalVariableDeclaration, Linkage as IrLinkage};
use hlang_core::expressions::{ExpressionData, Statement};
use hlang_core::module::Module;
use hlang_core::types::{FundamentalType, TypeReference};

use crate::error::{CodegenError, CodegenResult};
use crate::function_translator::{build_function_abi, FunctionTranslator};
use crate::layout;
use crate::mangle::mangle_name;

/// 优化级别
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OptimizationLevel {
    #[default]
    None,
    Speed,
    SpeedAndSize,
}

/// 后端驱动配置
#[derive(Debug, Clone, Default)]
pub struct BackendOptions {
    pub optimization_level: OptimizationLevel,
    /// 模块带源码范围时发射逐指令位置
    pub emit_debug_locations: bool,
}

/// 一次模块翻译的产物
#[derive(Debug, Default)]
pub struct ModuleCompilation {
    /// 改名后符号 → 后端函数 ID（含仅声明的函数）
    pub function_ids: HashMap<String, FuncId>,
    /// 成功定义的函数的改名后符号；只有这些可以取最终地址
    pub defined_functions: Vec<String>,
    /// 改名后符号 → 后端数据 ID
    pub data_ids: HashMap<String, DataId>,
    /// 被隔离丢弃的函数及其错误
    pub failed_functions: Vec<(String, CodegenError)>,
}

fn backend_linkage(linkage: IrLinkage) -> Linkage {
    match linkage {
        IrLinkage::External => Linkage::Export,
        // 隐藏可见性：不导出，但仍注册进符号表
        IrLinkage::Private => Linkage::Local,
    }
}

/// 把一个模块的 IR 翻译进后端模块
pub fn compile_module<M: BackendModule>(
    backend: &mut M,
    database: &DeclarationDatabase,
    core_module: &Module,
    options: &BackendOptions,
) -> CodegenResult<ModuleCompilation> {
    let mut compilation = ModuleCompilation::default();

    emit_global_variables(backend, database, core_module, &mut compilation)?;

    // 先声明全部函数，定义阶段的相互引用即可解析
    let mut declared: HashMap<String, (FuncId, FunctionDeclaration)> = HashMap::new();
    for declaration in core_module
        .export_declarations
        .function_declarations
        .iter()
        .chain(core_module.internal_declarations.function_declarations.iter())
    {
        let abi = build_function_abi(
            backend,
            database,
            &core_module.name,
            &declaration.function_type,
        )?;
        let mangled = mangle_name(
            &core_module.name,
            &declaration.name,
            declaration.unique_name.as_deref(),
            core_module.name_mangling,
        );
        let func_id =
            backend.declare_function(&mangled, backend_linkage(declaration.linkage), &abi.signature)?;
        compilation.function_ids.insert(mangled.clone(), func_id);
        declared.insert(declaration.name.clone(), (func_id, declaration.clone()));
    }

    let mut builder_context = FunctionBuilderContext::new();

    for definition in &core_module.definitions.function_definitions {
        let Some((func_id, declaration)) = declared.get(&definition.name) else {
            compilation.failed_functions.push((
                definition.name.clone(),
                CodegenError::TypeResolutionFailure(format!(
                    "definition '{}' has no matching declaration",
                    definition.name
                )),
            ));
            continue;
        };

        if declaration.function_type.is_variadic {
            compilation.failed_functions.push((
                definition.name.clone(),
                CodegenError::UnsupportedType(
                    "variadic functions can only be imported, not defined".to_string(),
                ),
            ));
            continue;
        }

        let mut ctx = backend.make_context();
        let result = (|| -> CodegenResult<()> {
            let abi = build_function_abi(
                backend,
                database,
                &core_module.name,
                &declaration.function_type,
            )?;
            ctx.func.signature = abi.signature.clone();
            ctx.func.name = UserFuncName::user(0, func_id.as_u32());

            let builder = FunctionBuilder::new(&mut ctx.func, &mut builder_context);
            let mut translator = FunctionTranslator::new(
                backend,
                database,
                core_module,
                builder,
                options.emit_debug_locations,
            );
            translator.translate(declaration, definition, &abi)?;
            translator.finalize();
            Ok(())
        })();

        match result {
            Ok(()) => {
                if let Err(error) = backend.define_function(*func_id, &mut ctx) {
                    backend.clear_context(&mut ctx);
                    tracing::error!(
                        function = %definition.name,
                        error = %error,
                        "Backend rejected function definition"
                    );
                    compilation
                        .failed_functions
                        .push((definition.name.clone(), error.into()));
                    continue;
                }
                backend.clear_context(&mut ctx);
                let mangled = mangle_name(
                    &core_module.name,
                    &declaration.name,
                    declaration.unique_name.as_deref(),
                    core_module.name_mangling,
                );
                compilation.defined_functions.push(mangled);
            }
            Err(error) => {
                backend.clear_context(&mut ctx);
                tracing::warn!(
                    function = %definition.name,
                    error = %error,
                    "Lowering failed, discarding function"
                );
                compilation
                    .failed_functions
                    .push((definition.name.clone(), error));
            }
        }
    }

    Ok(compilation)
}

fn emit_global_variables<M: BackendModule>(
    backend: &mut M,
    database: &DeclarationDatabase,
    core_module: &Module,
    compilation: &mut ModuleCompilation,
) -> CodegenResult<()> {
    for declaration in core_module
        .export_declarations
        .global_variable_declarations
        .iter()
        .chain(
            core_module
                .internal_declarations
                .global_variable_declarations
                .iter(),
        )
    {
        let mangled = mangle_name(
            &core_module.name,
            &declaration.name,
            declaration.unique_name.as_deref(),
            core_module.name_mangling,
        );

        let bytes = evaluate_global_initializer(database, core_module, declaration)?;

        let data_id = backend.declare_data(
            &mangled,
            backend_linkage(declaration.linkage),
            declaration.is_mutable,
            false,
        )?;
        let mut description = DataDescription::new();
        description.define(bytes.into_boxed_slice());
        backend.define_data(data_id, &description)?;
        compilation.data_ids.insert(mangled, data_id);
    }
    Ok(())
}

/// 全局变量初始值的常量求值。仅接受常量表达式与空指针；
/// 其余形态是 `UnsupportedExpression`。
fn evaluate_global_initializer(
    database: &DeclarationDatabase,
    core_module: &Module,
    declaration: &GlobalVariableDeclaration,
) -> CodegenResult<Vec<u8>> {
    let type_reference = declaration.type_reference.as_ref().ok_or_else(|| {
        CodegenError::TypeResolutionFailure(format!(
            "global variable '{}' has no resolved type",
            declaration.name
        ))
    })?;
    let (size, _) = layout::size_and_align(database, &core_module.name, type_reference)?;

    evaluate_constant_statement(&declaration.initial_value, size)
}

fn evaluate_constant_statement(statement: &Statement, size: u32) -> CodegenResult<Vec<u8>> {
    let Some(root) = statement.root_expression() else {
        // 无初始值：清零
        return Ok(vec![0; size as usize]);
    };

    match &root.data {
        ExpressionData::NullPointerExpression(_) => Ok(vec![0; size as usize]),
        ExpressionData::ConstantExpression(constant) => {
            let mut bytes = match &constant.type_reference {
                TypeReference::IntegerType(_) => {
                    let value: i128 = constant.data.parse().map_err(|_| {
                        CodegenError::ConstantMismatch {
                            data: constant.data.clone(),
                            message: "expected an integer literal".to_string(),
                        }
                    })?;
                    value.to_le_bytes().to_vec()
                }
                TypeReference::FundamentalType(FundamentalType::Bool | FundamentalType::CBool) => {
                    vec![u8::from(constant.data == "true" || constant.data == "1")]
                }
                TypeReference::FundamentalType(FundamentalType::Float32) => {
                    let value: f32 = constant.data.parse().map_err(|_| {
                        CodegenError::ConstantMismatch {
                            data: constant.data.clone(),
                            message: "expected a float literal".to_string(),
                        }
                    })?;
                    value.to_le_bytes().to_vec()
                }
                TypeReference::FundamentalType(FundamentalType::Float64) => {
                    let value: f64 = constant.data.parse().map_err(|_| {
                        CodegenError::ConstantMismatch {
                            data: constant.data.clone(),
                            message: "expected a float literal".to_string(),
                        }
                    })?;
                    value.to_le_bytes().to_vec()
                }
                other => {
                    return Err(CodegenError::UnsupportedExpression(format!(
                        "global initializer of type {other:?}"
                    )))
                }
            };
            bytes.resize(size as usize, 0);
            Ok(bytes)
        }
        other => Err(CodegenError::UnsupportedExpression(format!(
            "global initializer must be a constant, found {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hlang_core::expressions::{create_constant_expression, create_statement};
    use hlang_core::types::create_integer_type_type_reference;

    #[test]
    fn test_evaluate_integer_initializer() {
        let statement = create_statement(vec![create_constant_expression(
            create_integer_type_type_reference(32, true),
            "7",
        )]);
        let bytes = evaluate_constant_statement(&statement, 4).unwrap();
        assert_eq!(bytes, vec![7, 0, 0, 0]);
    }

    #[test]
    fn test_empty_initializer_is_zeroed() {
        let statement = Statement::default();
        assert_eq!(evaluate_constant_statement(&statement, 8).unwrap(), vec![0; 8]);
    }
}
