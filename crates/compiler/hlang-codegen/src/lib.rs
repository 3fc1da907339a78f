//! # hlang-codegen - 后端驱动
//!
//! 把一个模块的 IR 翻译为后端模块。后端是 Cranelift，通过
//! `cranelift_module::Module` 这个窄接口寻址，因此同一套降级逻辑
//! 既服务 JIT（`JITModule`）也服务 AOT 目标文件（`ObjectModule`）。
//!
//! ## 职责
//!
//! - 类型映射：`IntegerType(n)` → n 位整数；浮点仅 32/64；指针、
//!   函数、结构体、数组按结构映射；自定义引用经声明数据库解析
//! - 按改名策略与链接性发射函数声明
//! - 逐语句、逐表达式降级函数定义；每个函数独立发射，单个函数
//!   失败不影响同模块的其他函数
//! - 源码范围映射为逐指令的 `SourceLoc`；活动调试作用域栈是
//!   翻译器的显式字段
//! - 目标文件发射与平台链接器驱动

pub mod driver;
pub mod error;
pub mod function_translator;
pub mod instructions;
pub mod isa;
pub mod layout;
pub mod linker;
pub mod mangle;
pub mod object;

pub use driver::{compile_module, BackendOptions, ModuleCompilation, OptimizationLevel};
pub use error::{CodegenError, CodegenResult};
pub use isa::create_native_isa;
pub use linker::{link, wrap_archive_into_shared_library, LinkType, LinkerError, LinkerInput};
pub use mangle::mangle_name;
pub use object::emit_object_file;

/// 合同失败时由生成代码调用的宿主符号名
pub const CONTRACT_FAIL_SYMBOL: &str = "hlang_contract_fail";
