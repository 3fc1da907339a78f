//! JIT 运行器
//!
//! 拥有 JIT 会话：装载工件清单，解析全部模块，把导出装入声明
//! 数据库，经重编译层安装进 JIT，并启动文件监视。
//!
//! 监视事件到达时：重新解析改动的模块，运行重编译规划器，对
//! 脏集合逐个经重编译层重新插入；反向依赖图与哈希映射在重插入
//! 成功之后更新。失败的热重载保持旧状态，运行器保持存活。
//!
//! 共享资源策略：声明数据库、反向依赖图与哈希映射在同一把
//! 读写锁下（读者并发，模块注册/替换独占）；桩与各层在引擎
//! 互斥锁下；桩指针改写本身是单次指针宽度的原子写。

use std::collections::{HashMap, HashSet, VecDeque};
use std::ffi::{CStr, CString};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use hlang_codegen::driver::BackendOptions;
use hlang_codegen::{create_native_isa, mangle_name, OptimizationLevel, CONTRACT_FAIL_SYMBOL};
use hlang_core::database::{Declaration, DeclarationDatabase};
use hlang_core::module::Module;
use hlang_project::{
    find_root_include_directories, get_artifact, get_repository, resolve_include_files, Artifact,
};
use hlang_recompilation::{
    find_modules_to_recompile, hash_export_interface, ModuleExportProvider,
    RecompilationResult, ReverseDependencyGraph, SymbolNameToHash,
};

use crate::core_layer::{CoreModuleCompilationData, CoreModuleLayer, SymbolResolver};
use crate::error::{JitError, JitResult};
use crate::lazy::LazyCallThroughManager;
use crate::parser::{IrFileParser, ModuleParser};
use crate::recompile_layer::RecompileModuleLayer;
use crate::resource_tracker::ResourceRegistry;
use crate::stubs::{IndirectStubsManager, StubIndex, MATERIALIZE_SYMBOL};
use crate::watcher::{FileEvent, FileEventKind, FileWatcher};

/// 合同失败钩子：记录消息后中止进程
pub extern "C" fn hlang_contract_fail(message: *const std::os::raw::c_char) {
    let text = if message.is_null() {
        "<no message>".to_string()
    } else {
        unsafe { CStr::from_ptr(message) }
            .to_string_lossy()
            .into_owned()
    };
    tracing::error!(message = %text, "Contract failure in generated code");
    std::process::abort();
}

/// 惰性调用转发的物化钩子。失败在此处终结：桩从不指向
/// 无效地址，首次编译失败是不可恢复的内部错误。
unsafe extern "C" fn materialize_hook(context: *const (), symbol_id: u64) -> *const u8 {
    let engine = &*(context as *const JitEngine);
    match engine.materialize_symbol(symbol_id) {
        Ok(address) => address as *const u8,
        Err(error) => {
            tracing::error!(symbol_id, error = %error, "Materialization failed on first call");
            std::process::abort();
        }
    }
}

struct SendHandle(*mut libc::c_void);
unsafe impl Send for SendHandle {}
unsafe impl Sync for SendHandle {}

/// 已加载的平台动态库集合，兼作后备符号解析器
#[derive(Default)]
pub struct DynamicLibrarySet {
    handles: RwLock<Vec<SendHandle>>,
}

impl DynamicLibrarySet {
    fn load(&self, path: &Path) -> JitResult<()> {
        let c_path = CString::new(path.to_string_lossy().as_bytes()).map_err(|_| {
            JitError::LibraryLoad {
                path: path.to_path_buf(),
                message: "path contains an interior NUL byte".to_string(),
            }
        })?;

        let handle = unsafe { libc::dlopen(c_path.as_ptr(), libc::RTLD_NOW | libc::RTLD_GLOBAL) };
        if handle.is_null() {
            let message = unsafe {
                let error = libc::dlerror();
                if error.is_null() {
                    "unknown dlopen failure".to_string()
                } else {
                    CStr::from_ptr(error).to_string_lossy().into_owned()
                }
            };
            return Err(JitError::LibraryLoad {
                path: path.to_path_buf(),
                message,
            });
        }

        self.handles.write().push(SendHandle(handle));
        Ok(())
    }

    fn resolve(&self, name: &str) -> Option<*const u8> {
        let c_name = CString::new(name).ok()?;

        for handle in self.handles.read().iter() {
            let address = unsafe { libc::dlsym(handle.0, c_name.as_ptr()) };
            if !address.is_null() {
                return Some(address as *const u8);
            }
        }

        // 进程全局符号（libc 等）
        let address = unsafe { libc::dlsym(libc::RTLD_DEFAULT, c_name.as_ptr()) };
        if address.is_null() {
            None
        } else {
            Some(address as *const u8)
        }
    }
}

/// 已装入的模块（未改名的原始 IR）
#[derive(Clone)]
pub struct LoadedModule {
    pub module: Module,
    pub source_file_path: PathBuf,
}

/// 数据库、反向依赖图、哈希映射：同一把锁下保持一致
#[derive(Default)]
pub struct ProgramMaps {
    pub database: DeclarationDatabase,
    pub reverse_dependencies: ReverseDependencyGraph,
    pub module_hashes: HashMap<String, SymbolNameToHash>,
    pub modules: HashMap<String, LoadedModule>,
}

struct JitState {
    stubs: IndirectStubsManager,
    lazy: LazyCallThroughManager,
    core_layer: CoreModuleLayer,
    recompile_layer: RecompileModuleLayer,
    registry: ResourceRegistry,
}

/// JIT 引擎：会话级共享状态
pub struct JitEngine {
    jit: Mutex<JitState>,
    maps: RwLock<ProgramMaps>,
    stub_index: Arc<StubIndex>,
    libraries: Arc<DynamicLibrarySet>,
    options: BackendOptions,
}

impl JitEngine {
    pub fn new(options: BackendOptions) -> JitResult<Arc<Self>> {
        let isa = create_native_isa(options.optimization_level, false)?;

        let mut stubs = IndirectStubsManager::new(
            Arc::clone(&isa),
            materialize_hook,
            &[(CONTRACT_FAIL_SYMBOL, hlang_contract_fail as *const u8)],
        );
        let stub_index = stubs.index();
        let libraries = Arc::new(DynamicLibrarySet::default());

        let resolver_index = Arc::clone(&stub_index);
        let resolver_libraries = Arc::clone(&libraries);
        let resolver: SymbolResolver = Arc::new(move |name: &str| {
            if let Some(entry) = resolver_index.find(name) {
                return Some(entry.stub_address as *const u8);
            }
            resolver_libraries.resolve(name)
        });

        let core_layer = CoreModuleLayer::new(
            isa,
            resolver,
            vec![
                (CONTRACT_FAIL_SYMBOL.to_string(), hlang_contract_fail as usize),
                (MATERIALIZE_SYMBOL.to_string(), materialize_hook as usize),
            ],
        );

        // 先建引擎再回填上下文指针：惰性转发要嵌入引擎地址
        let engine = Arc::new(Self {
            jit: Mutex::new(JitState {
                stubs,
                lazy: LazyCallThroughManager::new(),
                core_layer,
                recompile_layer: RecompileModuleLayer::new(),
                registry: ResourceRegistry::new(),
            }),
            maps: RwLock::new(ProgramMaps::default()),
            stub_index,
            libraries,
            options,
        });

        let context = Arc::as_ptr(&engine) as *const ();
        engine.jit.lock().stubs.set_engine_context(context);

        Ok(engine)
    }

    /// 惰性转发的物化路径：编译函数体、改写桩槽、返回地址
    fn materialize_symbol(&self, symbol_id: u64) -> JitResult<usize> {
        let mut jit = self.jit.lock();
        let entry = jit
            .lazy
            .entry(symbol_id)
            .cloned()
            .ok_or_else(|| JitError::LookupFailure {
                symbol: format!("<lazy #{symbol_id}>"),
            })?;

        let maps = self.maps.read();
        let state = &mut *jit;
        let addresses =
            state
                .core_layer
                .materialize(entry.unit_index, &maps.database, &mut state.registry)?;

        let address = addresses
            .get(&entry.alias.body_name)
            .copied()
            .ok_or_else(|| JitError::LookupFailure {
                symbol: entry.alias.body_name.clone(),
            })?;

        state.stubs.update_pointer(&entry.alias.stub_name, address)?;
        Ok(address)
    }

    /// 首次装入一个模块：注册映射，再经重编译层装进 JIT。
    /// 失败回滚映射。
    pub fn install_module(&self, module: Module, source_file_path: PathBuf) -> JitResult<()> {
        {
            let mut maps = self.maps.write();
            maps.database.add_declarations(&module)?;
            maps.reverse_dependencies.add_module(&module);
            maps.module_hashes
                .insert(module.name.clone(), hash_export_interface(&module));
            maps.modules.insert(
                module.name.clone(),
                LoadedModule {
                    module: module.clone(),
                    source_file_path,
                },
            );
        }

        let result = self.add_to_jit(&module);

        if result.is_err() {
            let mut maps = self.maps.write();
            maps.database.remove_module_declarations(&module.name);
            maps.reverse_dependencies.remove_module(&module);
            maps.module_hashes.remove(&module.name);
            maps.modules.remove(&module.name);
        }
        result
    }

    fn add_to_jit(&self, module: &Module) -> JitResult<()> {
        let mut jit = self.jit.lock();
        let maps = self.maps.read();

        // 成环的别名链在安装时拒绝，模块不进入 JIT
        validate_alias_declarations(&maps.database, module)?;

        let state = &mut *jit;
        let tracker = state.registry.create_tracker();
        state.recompile_layer.add(
            tracker,
            CoreModuleCompilationData {
                core_module: module.clone(),
                options: self.options.clone(),
            },
            &maps.database,
            &mut state.stubs,
            &mut state.lazy,
            &mut state.core_layer,
            &mut state.registry,
        )?;
        Ok(())
    }

    /// 热替换一个模块。数据库条目的替换是写锁内的原子交换；
    /// JIT 重插入失败时恢复旧版本，先前状态保持不变。
    pub fn reinstall_module(&self, module: Module, source_file_path: PathBuf) -> JitResult<()> {
        let previous = {
            let maps = self.maps.read();
            maps.modules.get(&module.name).cloned()
        };

        {
            let mut maps = self.maps.write();
            maps.database.remove_module_declarations(&module.name);
            maps.database.add_declarations(&module)?;
            maps.reverse_dependencies
                .replace_module(previous.as_ref().map(|loaded| &loaded.module), &module);
            maps.module_hashes
                .insert(module.name.clone(), hash_export_interface(&module));
            maps.modules.insert(
                module.name.clone(),
                LoadedModule {
                    module: module.clone(),
                    source_file_path,
                },
            );
        }

        let result = self.add_to_jit(&module);

        if let Err(error) = &result {
            tracing::warn!(
                module = %module.name,
                error = %error,
                "Hot reload failed, restoring previous version"
            );
            if let Some(previous) = previous {
                let mut maps = self.maps.write();
                maps.database.remove_module_declarations(&module.name);
                if let Err(restore_error) = maps.database.add_declarations(&previous.module) {
                    tracing::error!(
                        module = %module.name,
                        error = %restore_error,
                        "Could not restore previous declarations"
                    );
                }
                maps.reverse_dependencies
                    .replace_module(Some(&module), &previous.module);
                maps.module_hashes.insert(
                    previous.module.name.clone(),
                    hash_export_interface(&previous.module),
                );
                maps.modules.insert(previous.module.name.clone(), previous);
            }
        }
        result
    }

    /// 解析（可能是桩的）符号并返回稳定地址
    pub fn lookup_function_address(
        &self,
        module_name: &str,
        declaration_name: &str,
    ) -> Option<*const u8> {
        let mangled = {
            let maps = self.maps.read();
            let declaration = maps.database.find_declaration(module_name, declaration_name)?;
            let Declaration::Function(function) = declaration else {
                return None;
            };
            mangle_name(
                module_name,
                &function.name,
                function.unique_name.as_deref(),
                maps.database.name_mangling_of(module_name),
            )
        };

        self.lookup_symbol_address(&mangled)
    }

    pub fn lookup_symbol_address(&self, symbol: &str) -> Option<*const u8> {
        self.stub_index
            .find(symbol)
            .map(|entry| entry.stub_address as *const u8)
    }

    pub fn load_platform_dynamic_library(&self, path: &Path) -> JitResult<()> {
        self.libraries.load(path)
    }

    /// 只读访问程序映射（测试与 LSP 门面使用）
    pub fn with_maps<T>(&self, reader: impl FnOnce(&ProgramMaps) -> T) -> T {
        reader(&self.maps.read())
    }
}

/// 安装前校验模块的别名声明都能解析到底层类型
fn validate_alias_declarations(
    database: &DeclarationDatabase,
    module: &Module,
) -> JitResult<()> {
    for declaration in module
        .export_declarations
        .alias_type_declarations
        .iter()
        .chain(module.internal_declarations.alias_type_declarations.iter())
    {
        if let Some(aliased_type) = &declaration.aliased_type {
            database.get_underlying_type(&module.name, aliased_type)?;
        }
    }
    Ok(())
}

/// 规划器的导出声明提供者：从装入时记录的源路径重新解析
struct ParsedExportProvider {
    source_paths: HashMap<String, PathBuf>,
    parser: Arc<dyn ModuleParser>,
    build_directory: PathBuf,
}

impl ModuleExportProvider for ParsedExportProvider {
    fn load_export_declarations(
        &self,
        module_name: &str,
    ) -> RecompilationResult<Option<Module>> {
        let Some(path) = self.source_paths.get(module_name) else {
            return Ok(None);
        };
        match self
            .parser
            .parse_export_declarations(path, &self.build_directory)
        {
            Ok(module) => Ok(Some(module)),
            Err(error) => Err(hlang_recompilation::RecompilationError::ModuleUnavailable {
                module_name: module_name.to_string(),
                message: error.to_string(),
            }),
        }
    }
}

/// 装入模块的状态机：
///
/// ```text
/// Absent ── load ──► Registered（仅声明）
/// Registered ── 首次使用/急切 ──► Emitting（物化进行中）
/// Emitting ── 成功 ──► Live-gN
/// Live-gN ── reload ──► Emitting-gN+1 ──► Live-gN+1（桩已改接）
/// Live-gN ── revoke ──► Absent
/// ```
pub struct JitRunner {
    engine: Arc<JitEngine>,
    artifact: Artifact,
    build_directory: PathBuf,
    _watcher: Option<FileWatcher>,
}

impl JitRunner {
    pub fn engine(&self) -> &Arc<JitEngine> {
        &self.engine
    }

    pub fn artifact(&self) -> &Artifact {
        &self.artifact
    }

    /// 改名并解析符号，按请求的调用约定返回函数指针。
    ///
    /// # Safety
    ///
    /// `F` 必须是与目标函数 ABI 一致的 `extern "C"` 函数指针类型。
    pub unsafe fn get_function<F: Copy>(
        &self,
        module_name: &str,
        declaration_name: &str,
    ) -> Option<F> {
        assert_eq!(
            std::mem::size_of::<F>(),
            std::mem::size_of::<usize>(),
            "F must be a function pointer type"
        );
        let address = self
            .engine
            .lookup_function_address(module_name, declaration_name)?;
        Some(std::mem::transmute_copy(&address))
    }

    /// `int()` 入口点的便捷封装：返回在程序结束时解析的句柄
    pub fn call_as_main_without_arguments(
        &self,
        entry_symbol: &str,
    ) -> JitResult<tokio::task::JoinHandle<i32>> {
        let address = self
            .engine
            .lookup_symbol_address(entry_symbol)
            .ok_or_else(|| JitError::LookupFailure {
                symbol: entry_symbol.to_string(),
            })?;

        let address = address as usize;
        Ok(tokio::task::spawn_blocking(move || {
            let entry: extern "C" fn() -> i32 = unsafe { std::mem::transmute(address) };
            entry()
        }))
    }

    /// 把静态库装入主库：经链接器驱动包成共享对象后动态加载
    pub fn link_static_library(&self, static_library_path: &Path) -> JitResult<()> {
        let file_stem = static_library_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "archive".to_string());
        let shared_object_path = self
            .build_directory
            .join(format!("lib{file_stem}_jit.so"));

        hlang_codegen::wrap_archive_into_shared_library(
            static_library_path,
            &shared_object_path,
        )?;
        self.engine.load_platform_dynamic_library(&shared_object_path)
    }

    pub fn load_platform_dynamic_library(&self, path: &Path) -> JitResult<()> {
        self.engine.load_platform_dynamic_library(path)
    }
}

/// 装载工件清单，解析并安装全部模块，启动文件监视
pub fn setup_jit_and_watch(
    artifact_configuration_file_path: &Path,
    repositories_file_paths: &[PathBuf],
    build_directory: &Path,
) -> JitResult<JitRunner> {
    std::fs::create_dir_all(build_directory).map_err(|source| JitError::Io {
        path: build_directory.to_path_buf(),
        source,
    })?;

    let artifact = get_artifact(artifact_configuration_file_path)?;
    let parser: Arc<dyn ModuleParser> = Arc::new(IrFileParser);
    let engine = JitEngine::new(BackendOptions {
        optimization_level: OptimizationLevel::None,
        emit_debug_locations: true,
    })?;

    // 本工件与其仓库依赖的全部源文件
    let mut source_files = resolve_include_files(&artifact)?;
    source_files.extend(resolve_dependency_sources(
        &artifact,
        repositories_file_paths,
    )?);

    for source_file in &source_files {
        let module = parser.parse_module(source_file, build_directory)?;
        tracing::info!(module = %module.name, path = %source_file.display(), "Loading module");
        engine.install_module(module, source_file.clone())?;
    }

    // 监视根：include 根目录加各仓库清单所在目录
    let mut directories = find_root_include_directories(&artifact);
    for repository_path in repositories_file_paths {
        if let Some(parent) = repository_path.parent() {
            directories.push(parent.to_path_buf());
        }
    }

    let watcher = {
        let engine = Arc::clone(&engine);
        let parser = Arc::clone(&parser);
        let build_directory = build_directory.to_path_buf();
        FileWatcher::watch(&directories, move |event| {
            handle_file_event(&engine, &parser, &build_directory, event);
        })?
    };

    Ok(JitRunner {
        engine,
        artifact,
        build_directory: build_directory.to_path_buf(),
        _watcher: Some(watcher),
    })
}

/// 收集仓库依赖工件的源文件（跨工件 worklist，按名去重）
fn resolve_dependency_sources(
    artifact: &Artifact,
    repositories_file_paths: &[PathBuf],
) -> JitResult<Vec<PathBuf>> {
    let mut locations: HashMap<String, PathBuf> = HashMap::new();
    for repository_path in repositories_file_paths {
        let repository = get_repository(repository_path)?;
        locations.extend(repository.artifact_name_to_location(repository_path));
    }

    let mut sources = Vec::new();
    let mut visited: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<String> = artifact
        .dependencies
        .iter()
        .map(|dependency| dependency.artifact_name.clone())
        .collect();

    while let Some(artifact_name) = queue.pop_front() {
        if !visited.insert(artifact_name.clone()) {
            continue;
        }
        let Some(location) = locations.get(&artifact_name) else {
            tracing::warn!(artifact = %artifact_name, "Dependency artifact not found in repositories");
            continue;
        };

        let dependency_artifact = get_artifact(&location.join("hlang_artifact.json"))?;
        sources.extend(resolve_include_files(&dependency_artifact)?);
        queue.extend(
            dependency_artifact
                .dependencies
                .iter()
                .map(|dependency| dependency.artifact_name.clone()),
        );
    }

    Ok(sources)
}

/// 监视回调：重新解析、规划、迭代重装脏模块
fn handle_file_event(
    engine: &Arc<JitEngine>,
    parser: &Arc<dyn ModuleParser>,
    build_directory: &Path,
    event: FileEvent,
) {
    if event.kind == FileEventKind::Delete {
        tracing::debug!(path = %event.path.display(), "Ignoring delete event");
        return;
    }
    let is_module_source = event
        .path
        .extension()
        .is_some_and(|extension| extension == "hl");
    if !is_module_source {
        return;
    }

    // 只处理已装入模块的源文件
    let is_known = engine.with_maps(|maps| {
        maps.modules
            .values()
            .any(|loaded| loaded.source_file_path == event.path)
    });
    if !is_known {
        tracing::debug!(path = %event.path.display(), "Change in an unknown file, ignoring");
        return;
    }

    tracing::info!(path = %event.path.display(), "Source changed, recompiling");

    let mut queue: VecDeque<PathBuf> = VecDeque::new();
    queue.push_back(event.path.clone());
    let mut processed: HashSet<String> = HashSet::new();

    while let Some(path) = queue.pop_front() {
        let new_module = match parser.parse_module(&path, build_directory) {
            Ok(module) => module,
            Err(error) => {
                tracing::warn!(path = %path.display(), error = %error, "Parse failed, module not reinstalled");
                continue;
            }
        };

        if !processed.insert(new_module.name.clone()) {
            continue;
        }

        // 规划使用替换前的旧哈希与当前依赖图快照
        let (previous_hashes, graph, source_paths) = engine.with_maps(|maps| {
            (
                maps.module_hashes
                    .get(&new_module.name)
                    .cloned()
                    .unwrap_or_default(),
                maps.reverse_dependencies.clone(),
                maps.modules
                    .iter()
                    .map(|(name, loaded)| (name.clone(), loaded.source_file_path.clone()))
                    .collect::<HashMap<_, _>>(),
            )
        });

        let provider = ParsedExportProvider {
            source_paths: source_paths.clone(),
            parser: Arc::clone(parser),
            build_directory: build_directory.to_path_buf(),
        };
        let plan =
            find_modules_to_recompile(&new_module, &previous_hashes, &graph, &provider);

        let module_name = new_module.name.clone();
        if let Err(error) = engine.reinstall_module(new_module, path) {
            tracing::warn!(module = %module_name, error = %error, "Reload failed, previous generation stays live");
            continue;
        }

        // 重编译改变依赖者自身接口时，下一轮规划处理其上游
        for dependent in plan {
            if let Some(source_path) = source_paths.get(&dependent) {
                queue.push_back(source_path.clone());
            }
        }
    }
}
