//! 重编译规划器
//!
//! 给定改动后模块的新解析结果，求必须重建编译产物的模块集合：
//! 对每个反向依赖 R，仅当 R 的别名导入里实际引用（`usages`）的
//! 符号指纹发生变化（含增删）时才纳入。
//!
//! 规划器不递归；运行器在每次成功重插入后对下一层再次调用。

use hlang_core::module::Module;

use crate::error::RecompilationResult;
use crate::hash::{hash_export_interface, SymbolNameToHash};
use crate::reverse_dependencies::ReverseDependencyGraph;

/// 反向依赖的导出声明提供者。
/// 运行器用解析器按文件路径实现（仅声明，廉价读取）。
pub trait ModuleExportProvider {
    fn load_export_declarations(&self, module_name: &str)
        -> RecompilationResult<Option<Module>>;
}

/// 返回因 `core_module` 的接口变化而必须重编译的模块名。
///
/// 边界情形：
/// - 新引入的模块（`previous_hashes` 为空且无反向依赖）返回空集。
/// - 反向依赖解析失败：上报并跳过，绝不静默纳入。
/// - 反向依赖引用了 `core_module` 但脏集合为空：不重编译。
pub fn find_modules_to_recompile(
    core_module: &Module,
    previous_hashes: &SymbolNameToHash,
    reverse_dependencies: &ReverseDependencyGraph,
    provider: &dyn ModuleExportProvider,
) -> Vec<String> {
    let new_hashes = hash_export_interface(core_module);

    let mut modules_to_recompile = Vec::new();

    for reverse_dependency_name in reverse_dependencies.range_of(&core_module.name) {
        let reverse_dependency = match provider.load_export_declarations(reverse_dependency_name) {
            Ok(Some(module)) => module,
            Ok(None) => {
                tracing::warn!(
                    module = reverse_dependency_name,
                    "Could not read reverse dependency, skipping"
                );
                continue;
            }
            Err(error) => {
                tracing::warn!(
                    module = reverse_dependency_name,
                    error = %error,
                    "Could not read reverse dependency, skipping"
                );
                continue;
            }
        };

        let Some(alias_import) = reverse_dependency
            .dependencies
            .alias_imports
            .iter()
            .find(|alias_import| alias_import.module_name == core_module.name)
        else {
            continue;
        };

        let is_dirty = alias_import.usages.iter().any(|usage| {
            // Option 比较同时覆盖指纹变化与成员增删
            previous_hashes.get(usage) != new_hashes.get(usage)
        });

        if is_dirty {
            modules_to_recompile.push(reverse_dependency.name.clone());
        }
    }

    modules_to_recompile
}
