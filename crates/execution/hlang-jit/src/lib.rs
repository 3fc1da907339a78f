//! # hlang-jit - 分层 JIT 与热重载
//!
//! 三层物化流水线把模块 IR 变为可执行代码：
//!
//! 1. 核心模块层（[`core_layer`]）：按需驱动后端驱动器，惰性
//!    物化整个模块为一代函数体。
//! 2. 重编译层（[`recompile_layer`]）：每代改写内部函数体符号
//!    名，安装/更新桩，管理惰性再导出。
//! 3. 本机编译层：Cranelift `JITModule`，每代一个，由资源
//!    追踪器整组撤销。
//!
//! [`runner`] 拥有会话：装载工件、查找入口点、驱动
//! 监视 → 规划 → 重装 的热重载回路。

pub mod core_layer;
pub mod error;
pub mod lazy;
pub mod parser;
pub mod recompile_layer;
pub mod resource_tracker;
pub mod runner;
pub mod stubs;
pub mod watcher;

pub use core_layer::{CoreModuleCompilationData, CoreModuleLayer};
pub use error::{JitError, JitResult};
pub use parser::{IrFileParser, ModuleParser};
pub use recompile_layer::RecompileModuleLayer;
pub use resource_tracker::{ResourceRegistry, ResourceTracker};
pub use runner::{setup_jit_and_watch, JitEngine, JitRunner};
pub use stubs::IndirectStubsManager;
pub use watcher::{FileEvent, FileEventKind, FileWatcher, DEBOUNCE_INTERVAL};
