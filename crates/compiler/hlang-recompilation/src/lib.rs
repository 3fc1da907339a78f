//! # hlang-recompilation - 变更检测与重编译规划
//!
//! 源文件变化后需要重建什么？本 crate 回答这个问题：
//!
//! 1. 对每个模块的导出接口计算稳定的 64 位指纹（XXH64，种子 0）。
//!    指纹只取决于外部可观察形状（名字、类型、标志、成员默认值），
//!    绝不取决于私有函数体。
//! 2. 维护反向依赖多重映射：`被导入模块 → {导入它的模块}`。
//! 3. 给定改动后的模块，对比新旧指纹并与各反向依赖的 `usages`
//!    求交，得到必须失效的模块集合。
//!
//! 规划器不自动递归：重编译某个依赖后它自身的指纹可能变化，
//! 由 JIT 运行器迭代调用规划器处理下一层。

pub mod error;
pub mod hash;
pub mod planner;
pub mod reverse_dependencies;

pub use error::{RecompilationError, RecompilationResult};
pub use hash::{hash_export_interface, SymbolNameToHash};
pub use planner::{find_modules_to_recompile, ModuleExportProvider};
pub use reverse_dependencies::ReverseDependencyGraph;
