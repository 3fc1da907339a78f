//! 重编译层：热重载的正确性机制
//!
//! 每个函数的稳定公开名（程序其余部分调用的名字）保持不变，
//! 函数体每代换名：`S` 的本代后端符号是 `S_body_g`。公开名下的
//! 桩间接跳到当前代函数体；重新装入模块即换掉桩背后的指针。
//!
//! 流程（`add`）：
//! 1. 取新的单调递增代号 `g`（层内原子计数器）。
//! 2. 把模块里每个函数声明/定义的后端名改写为 `S_body_g`，
//!    记录 `{桩: S, 体: S_body_g}`。
//! 3. 按"桩是否已存在"切分为 `new_aliases` 与 `replace_aliases`。
//! 4. 改名后的模块交给核心模块层惰性编译。
//! 5. 新桩：安装惰性再导出，首次调用经惰性调用转发编译
//!    `S_body_g`，随后把桩改写为直指函数体。
//! 6. 既有桩：立即物化 `S_body_g` 并原子改写桩指针；后续调用
//!    进入新代。
//!
//! 任一步失败即丢弃新代，桩继续指向前一代函数体；桩绝不处于
//! 未解析状态。

use std::sync::atomic::{AtomicU64, Ordering};

use hlang_core::database::DeclarationDatabase;
use hlang_core::module::Module;
use hlang_codegen::function_translator::build_function_abi;
use hlang_codegen::mangle_name;

use crate::core_layer::{CoreModuleCompilationData, CoreModuleLayer};
use crate::error::{JitError, JitResult};
use crate::lazy::LazyCallThroughManager;
use crate::resource_tracker::{ResourceRegistry, ResourceTracker};
use crate::stubs::IndirectStubsManager;

/// 一个待安装的桩别名对
#[derive(Debug, Clone)]
pub struct StubAlias {
    /// 稳定公开符号
    pub stub_name: String,
    /// 本代函数体符号
    pub body_name: String,
    /// 声明在 IR 声明表中的名字（查签名用）
    pub declaration_name: String,
}

/// `{新桩, 既有桩}` 切分
#[derive(Debug, Default)]
pub struct RecompileData {
    pub new_aliases: Vec<StubAlias>,
    pub replace_aliases: Vec<StubAlias>,
}

/// 重编译层
pub struct RecompileModuleLayer {
    /// 代号计数器：层内原子，进程生命周期内严格递增
    generation: AtomicU64,
}

impl RecompileModuleLayer {
    pub fn new() -> Self {
        Self {
            generation: AtomicU64::new(0),
        }
    }

    pub fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst)
    }

    /// 改写函数体符号并产出桩切分。
    /// 改名经 `unique_name` 覆盖完成，声明/定义名保持原样，
    /// 因此调用点仍按公开名（桩）解析。
    pub fn modify_function_names_and_create_recompile_data(
        &self,
        core_module: &mut Module,
        stubs: &IndirectStubsManager,
        generation: u64,
    ) -> RecompileData {
        let mut recompile_data = RecompileData::default();
        let module_name = core_module.name.clone();
        let name_mangling = core_module.name_mangling;

        let mut process = |declaration: &mut hlang_core::declarations::FunctionDeclaration| {
            let stub_name = mangle_name(
                &module_name,
                &declaration.name,
                declaration.unique_name.as_deref(),
                name_mangling,
            );
            let body_name = format!("{stub_name}_body_{generation}");
            declaration.unique_name = Some(body_name.clone());

            let alias = StubAlias {
                stub_name: stub_name.clone(),
                body_name,
                declaration_name: declaration.name.clone(),
            };

            if stubs.find_stub(&stub_name).is_some() {
                recompile_data.replace_aliases.push(alias);
            } else {
                recompile_data.new_aliases.push(alias);
            }
        };

        for declaration in &mut core_module.export_declarations.function_declarations {
            process(declaration);
        }
        for declaration in &mut core_module.internal_declarations.function_declarations {
            process(declaration);
        }

        recompile_data
    }

    /// 把一个模块装入 JIT（首次装入或热替换）
    #[allow(clippy::too_many_arguments)]
    pub fn add(
        &self,
        tracker: ResourceTracker,
        mut compilation_data: CoreModuleCompilationData,
        database: &DeclarationDatabase,
        stubs: &mut IndirectStubsManager,
        lazy: &mut LazyCallThroughManager,
        core_layer: &mut CoreModuleLayer,
        registry: &mut ResourceRegistry,
    ) -> JitResult<u64> {
        let generation = self.next_generation();

        let recompile_data = self.modify_function_names_and_create_recompile_data(
            &mut compilation_data.core_module,
            stubs,
            generation,
        );

        // 函数签名从未改名的数据库声明取得
        let module_name = compilation_data.core_module.name.clone();

        // 交给下一层惰性编译
        let unit_index = core_layer.add(tracker, compilation_data);

        // 新桩：惰性再导出，首次查找/调用才编译函数体
        for alias in &recompile_data.new_aliases {
            let declaration = database
                .find_declaration(&module_name, &alias.declaration_name)
                .and_then(|declaration| match declaration {
                    hlang_core::database::Declaration::Function(function) => Some(function),
                    _ => None,
                })
                .ok_or_else(|| JitError::LookupFailure {
                    symbol: alias.stub_name.clone(),
                })?;

            let abi = build_function_abi(
                stubs.backend(),
                database,
                &module_name,
                &declaration.function_type,
            )?;

            let symbol_id = lazy.register(alias.clone(), unit_index);
            let call_through = stubs.create_lazy_call_through(&abi.signature, symbol_id)?;
            stubs.create_stub(&alias.stub_name, &abi.signature, call_through)?;
        }

        // 既有桩：强制物化新代函数体，原子改写桩指针。
        // 失败时直接返回，桩仍指向前一代。
        if !recompile_data.replace_aliases.is_empty() {
            let addresses = core_layer.materialize(unit_index, database, registry)?;

            for alias in &recompile_data.replace_aliases {
                let address =
                    addresses
                        .get(&alias.body_name)
                        .copied()
                        .ok_or_else(|| JitError::LookupFailure {
                            symbol: alias.body_name.clone(),
                        })?;
                stubs.update_pointer(&alias.stub_name, address)?;
            }
        }

        tracing::info!(
            module = %module_name,
            generation,
            new_stubs = recompile_data.new_aliases.len(),
            updated_stubs = recompile_data.replace_aliases.len(),
            "Module installed"
        );

        Ok(generation)
    }
}

impl Default for RecompileModuleLayer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_ids_strictly_increase() {
        let layer = RecompileModuleLayer::new();
        let first = layer.next_generation();
        let second = layer.next_generation();
        let third = layer.next_generation();
        assert!(first < second && second < third);
    }

    #[test]
    fn test_generations_are_distinct_across_threads() {
        use std::collections::HashSet;
        use std::sync::Arc;

        let layer = Arc::new(RecompileModuleLayer::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let layer = Arc::clone(&layer);
            handles.push(std::thread::spawn(move || {
                (0..100).map(|_| layer.next_generation()).collect::<Vec<_>>()
            }));
        }

        let mut seen = HashSet::new();
        for handle in handles {
            for generation in handle.join().unwrap() {
                // 两个并发重载必须拿到不同代号
                assert!(seen.insert(generation));
            }
        }
    }
}
