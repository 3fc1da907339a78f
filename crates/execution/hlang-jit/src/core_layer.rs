//! 核心模块层
//!
//! 物化单元抽象：把一个模块的导出+内部符号集合以"惰性可用"的
//! 形式呈现给 JIT，只有当某个符号真正被查找或经桩调用时才驱动
//! 后端把整个模块编译为本代函数体。
//!
//! 每次物化产出一个独立的 `JITModule`（一代），登记在该单元的
//! 资源追踪器下，可整组撤销。

use std::collections::HashMap;
use std::sync::Arc;

use cranelift_codegen::isa::TargetIsa;
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{default_libcall_names, Module as BackendModule};

use hlang_core::database::DeclarationDatabase;
use hlang_core::declarations::Linkage as IrLinkage;
use hlang_core::module::Module;
use hlang_codegen::driver::{compile_module, BackendOptions};
use hlang_codegen::mangle_name;

use crate::error::{JitError, JitResult};
use crate::resource_tracker::{MaterializedGeneration, ResourceRegistry, ResourceTracker};

/// 交给核心模块层的编译数据（函数体符号已按代改名）
pub struct CoreModuleCompilationData {
    pub core_module: Module,
    pub options: BackendOptions,
}

/// 符号旗标：全部可调用；`Private` 在后端为隐藏可见性，
/// 但仍登记在旗标表里供重编译层查找
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolFlags {
    pub exported: bool,
    pub callable: bool,
}

enum UnitState {
    Pending,
    Materialized(HashMap<String, usize>),
}

/// 一个物化单元
pub struct CoreModuleMaterializationUnit {
    compilation_data: CoreModuleCompilationData,
    tracker: ResourceTracker,
    symbol_flags: HashMap<String, SymbolFlags>,
    state: UnitState,
}

impl CoreModuleMaterializationUnit {
    /// 单元的符号接口：模块全部函数声明的改名后符号
    fn interface(core_module: &Module) -> HashMap<String, SymbolFlags> {
        let mut symbols = HashMap::new();
        for declaration in core_module
            .export_declarations
            .function_declarations
            .iter()
            .chain(core_module.internal_declarations.function_declarations.iter())
        {
            let mangled = mangle_name(
                &core_module.name,
                &declaration.name,
                declaration.unique_name.as_deref(),
                core_module.name_mangling,
            );
            symbols.insert(
                mangled,
                SymbolFlags {
                    exported: declaration.linkage == IrLinkage::External,
                    callable: true,
                },
            );
        }
        symbols
    }

    /// 放弃对单个符号的认领
    pub fn discard(&mut self, symbol: &str) {
        self.symbol_flags.remove(symbol);
    }

    pub fn symbol_flags(&self) -> &HashMap<String, SymbolFlags> {
        &self.symbol_flags
    }
}

/// 符号解析回调：函数体模块的导入经它解析（桩、宿主符号、
/// 已加载的动态库）
pub type SymbolResolver = Arc<dyn Fn(&str) -> Option<*const u8> + Send + Sync>;

/// 核心模块层
pub struct CoreModuleLayer {
    isa: Arc<dyn TargetIsa>,
    units: Vec<CoreModuleMaterializationUnit>,
    resolver: SymbolResolver,
    host_symbols: Vec<(String, usize)>,
}

impl CoreModuleLayer {
    pub fn new(
        isa: Arc<dyn TargetIsa>,
        resolver: SymbolResolver,
        host_symbols: Vec<(String, usize)>,
    ) -> Self {
        Self {
            isa,
            units: Vec::new(),
            resolver,
            host_symbols,
        }
    }

    /// 在追踪器下注册一个单元，编译推迟到首次物化
    pub fn add(
        &mut self,
        tracker: ResourceTracker,
        compilation_data: CoreModuleCompilationData,
    ) -> usize {
        let symbol_flags =
            CoreModuleMaterializationUnit::interface(&compilation_data.core_module);
        self.units.push(CoreModuleMaterializationUnit {
            compilation_data,
            tracker,
            symbol_flags,
            state: UnitState::Pending,
        });
        self.units.len() - 1
    }

    pub fn unit(&self, unit_index: usize) -> Option<&CoreModuleMaterializationUnit> {
        self.units.get(unit_index)
    }

    pub fn unit_mut(&mut self, unit_index: usize) -> Option<&mut CoreModuleMaterializationUnit> {
        self.units.get_mut(unit_index)
    }

    /// 物化一个单元：驱动后端驱动器编译整个模块，终结出各函数体
    /// 地址，并把这一代登记到追踪器。幂等。
    pub fn materialize(
        &mut self,
        unit_index: usize,
        database: &DeclarationDatabase,
        registry: &mut ResourceRegistry,
    ) -> JitResult<HashMap<String, usize>> {
        let unit = self
            .units
            .get_mut(unit_index)
            .ok_or_else(|| JitError::Backend(format!("unknown materialization unit {unit_index}")))?;

        if let UnitState::Materialized(addresses) = &unit.state {
            return Ok(addresses.clone());
        }

        let mut builder = JITBuilder::with_isa(Arc::clone(&self.isa), default_libcall_names());
        for (name, address) in &self.host_symbols {
            builder.symbol(name.as_str(), *address as *const u8);
        }
        let resolver = Arc::clone(&self.resolver);
        builder.symbol_lookup_fn(Box::new(move |name| resolver(name)));

        let mut backend = JITModule::new(builder);

        let compilation = compile_module(
            &mut backend,
            database,
            &unit.compilation_data.core_module,
            &unit.compilation_data.options,
        )?;

        for (name, error) in &compilation.failed_functions {
            tracing::warn!(
                module = %unit.compilation_data.core_module.name,
                function = %name,
                error = %error,
                "Function discarded during materialization"
            );
        }

        backend
            .finalize_definitions()
            .map_err(|error| JitError::Backend(error.to_string()))?;

        // 只有成功定义的函数有最终地址
        let mut addresses = HashMap::with_capacity(compilation.defined_functions.len());
        for name in &compilation.defined_functions {
            if let Some(func_id) = compilation.function_ids.get(name) {
                let address = backend.get_finalized_function(*func_id) as usize;
                addresses.insert(name.clone(), address);
            }
        }

        registry.retain(
            unit.tracker,
            MaterializedGeneration::new(backend, addresses.clone()),
        );

        tracing::debug!(
            module = %unit.compilation_data.core_module.name,
            symbols = addresses.len(),
            "Module generation materialized"
        );

        unit.state = UnitState::Materialized(addresses.clone());
        Ok(addresses)
    }
}
