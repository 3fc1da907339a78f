//! 间接桩管理器
//!
//! 每个公开符号对应一个稳定的桩（stub）：一段在专用 `JITModule`
//! 里编译的转发函数，加载堆上固定地址的指针槽并间接调用。
//! 热重载只改写槽内容（一次指针宽度的原子写），调用方看到的
//! 函数地址永不变化。
//!
//! 桩模块的生命周期覆盖整个会话，从不释放；各代函数体由
//! 资源追踪器单独管理。

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use cranelift_codegen::ir::{InstBuilder, MemFlags, Signature, Type};
use cranelift_codegen::isa::TargetIsa;
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext};
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{default_libcall_names, Linkage, Module as BackendModule};
use parking_lot::RwLock;

use crate::error::{JitError, JitResult};

/// 物化钩子的宿主符号名
pub const MATERIALIZE_SYMBOL: &str = "hlang_jit_materialize";

/// 物化钩子：`(引擎上下文, 符号 id) → 函数体地址`
pub type MaterializeHook = unsafe extern "C" fn(*const (), u64) -> *const u8;

/// 跨线程共享原始指针的包装。
/// 不变式：被包装的值只在引擎互斥锁内访问（cranelift-jit 自身
/// 对其符号表使用同样的手法）。
struct SendWrapper<T>(T);

unsafe impl<T> Send for SendWrapper<T> {}

/// 一个已安装桩的共享视图：解析器闭包无锁读取
#[derive(Clone)]
pub struct StubEntry {
    /// 桩转发函数的地址（稳定的公开符号）
    pub stub_address: usize,
    /// 指针槽；更新是单次原子写
    pub slot: Arc<AtomicUsize>,
}

/// 名字 → 桩 的共享索引。符号解析闭包在后端终结阶段读取，
/// 因此独立于引擎互斥锁。
#[derive(Default)]
pub struct StubIndex {
    map: RwLock<HashMap<String, StubEntry>>,
}

impl StubIndex {
    pub fn find(&self, name: &str) -> Option<StubEntry> {
        self.map.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.map.read().contains_key(name)
    }

    fn insert(&self, name: String, entry: StubEntry) {
        self.map.write().insert(name, entry);
    }
}

/// 间接桩管理器
pub struct IndirectStubsManager {
    jit: SendWrapper<JITModule>,
    index: Arc<StubIndex>,
    pointer_type: Type,
    /// 物化钩子的引擎上下文，引擎构造完成后填入
    engine_context: *const (),
    next_call_through: u64,
}

// 裸指针字段只在引擎互斥锁内使用
unsafe impl Send for IndirectStubsManager {}

impl IndirectStubsManager {
    pub fn new(
        isa: Arc<dyn TargetIsa>,
        materialize_hook: MaterializeHook,
        host_symbols: &[(&str, *const u8)],
    ) -> Self {
        let mut builder = JITBuilder::with_isa(isa, default_libcall_names());
        builder.symbol(MATERIALIZE_SYMBOL, materialize_hook as *const u8);
        for (name, address) in host_symbols {
            builder.symbol(*name, *address);
        }

        let jit = JITModule::new(builder);
        let pointer_type = jit.target_config().pointer_type();

        Self {
            jit: SendWrapper(jit),
            index: Arc::new(StubIndex::default()),
            pointer_type,
            engine_context: std::ptr::null(),
            next_call_through: 0,
        }
    }

    pub fn set_engine_context(&mut self, context: *const ()) {
        self.engine_context = context;
    }

    pub fn index(&self) -> Arc<StubIndex> {
        Arc::clone(&self.index)
    }

    pub fn backend(&mut self) -> &mut JITModule {
        &mut self.jit.0
    }

    pub fn find_stub(&self, name: &str) -> Option<StubEntry> {
        self.index.find(name)
    }

    /// 原子改写既有桩的目标。调用开始于改写之前的执行旧体到
    /// 结束；开始于改写之后的进入新体。
    pub fn update_pointer(&self, name: &str, new_address: usize) -> JitResult<()> {
        let entry = self.index.find(name).ok_or_else(|| JitError::LookupFailure {
            symbol: name.to_string(),
        })?;
        entry.slot.store(new_address, Ordering::SeqCst);
        Ok(())
    }

    /// 安装新桩：分配指针槽（初值指向惰性调用转发），编译
    /// 公开名下的转发函数。返回桩地址。
    pub fn create_stub(
        &mut self,
        name: &str,
        signature: &Signature,
        initial_target: usize,
    ) -> JitResult<StubEntry> {
        if let Some(existing) = self.index.find(name) {
            return Ok(existing);
        }

        let slot = Arc::new(AtomicUsize::new(initial_target));
        let slot_address = Arc::as_ptr(&slot) as usize;

        let stub_address = self.compile_stub_thunk(name, signature, slot_address)?;

        let entry = StubEntry {
            stub_address,
            slot,
        };
        self.index.insert(name.to_string(), entry.clone());
        Ok(entry)
    }

    /// 桩转发函数：加载槽里的函数体地址并原样转发实参
    fn compile_stub_thunk(
        &mut self,
        name: &str,
        signature: &Signature,
        slot_address: usize,
    ) -> JitResult<usize> {
        let jit = &mut self.jit.0;
        let mut ctx = jit.make_context();
        ctx.func.signature = signature.clone();

        let mut builder_context = FunctionBuilderContext::new();
        {
            let mut builder = FunctionBuilder::new(&mut ctx.func, &mut builder_context);
            let entry_block = builder.create_block();
            builder.append_block_params_for_function_params(entry_block);
            builder.switch_to_block(entry_block);
            builder.seal_block(entry_block);

            let arguments: Vec<_> = builder.block_params(entry_block).to_vec();
            let slot_pointer = builder.ins().iconst(self.pointer_type, slot_address as i64);
            let body_address =
                builder
                    .ins()
                    .load(self.pointer_type, MemFlags::trusted(), slot_pointer, 0);

            let signature_ref = builder.import_signature(signature.clone());
            let call = builder
                .ins()
                .call_indirect(signature_ref, body_address, &arguments);
            let results: Vec<_> = builder.inst_results(call).to_vec();
            builder.ins().return_(&results);
            builder.finalize();
        }

        let func_id = jit.declare_function(name, Linkage::Export, signature)?;
        jit.define_function(func_id, &mut ctx)?;
        jit.clear_context(&mut ctx);
        jit.finalize_definitions()?;

        Ok(jit.get_finalized_function(func_id) as usize)
    }

    /// 惰性调用转发：首次调用经物化钩子编译函数体，随后原样
    /// 转发本次实参。钩子同时把槽改写为函数体地址，后续调用
    /// 不再进入转发。
    pub fn create_lazy_call_through(
        &mut self,
        signature: &Signature,
        symbol_id: u64,
    ) -> JitResult<usize> {
        let engine_context = self.engine_context as i64;
        let call_through_name = format!("__hlang_lct_{}", self.next_call_through);
        self.next_call_through += 1;

        let jit = &mut self.jit.0;
        let mut ctx = jit.make_context();
        ctx.func.signature = signature.clone();

        let mut hook_signature = jit.make_signature();
        hook_signature
            .params
            .push(cranelift_codegen::ir::AbiParam::new(self.pointer_type));
        hook_signature
            .params
            .push(cranelift_codegen::ir::AbiParam::new(
                cranelift_codegen::ir::types::I64,
            ));
        hook_signature
            .returns
            .push(cranelift_codegen::ir::AbiParam::new(self.pointer_type));
        let hook_id = jit.declare_function(MATERIALIZE_SYMBOL, Linkage::Import, &hook_signature)?;

        let mut builder_context = FunctionBuilderContext::new();
        {
            let mut builder = FunctionBuilder::new(&mut ctx.func, &mut builder_context);
            let entry_block = builder.create_block();
            builder.append_block_params_for_function_params(entry_block);
            builder.switch_to_block(entry_block);
            builder.seal_block(entry_block);

            let arguments: Vec<_> = builder.block_params(entry_block).to_vec();

            let context_value = builder.ins().iconst(self.pointer_type, engine_context);
            let symbol_value = builder
                .ins()
                .iconst(cranelift_codegen::ir::types::I64, symbol_id as i64);

            let hook_ref = jit.declare_func_in_func(hook_id, builder.func);
            let hook_call = builder.ins().call(hook_ref, &[context_value, symbol_value]);
            let body_address = builder.inst_results(hook_call)[0];

            let signature_ref = builder.import_signature(signature.clone());
            let call = builder
                .ins()
                .call_indirect(signature_ref, body_address, &arguments);
            let results: Vec<_> = builder.inst_results(call).to_vec();
            builder.ins().return_(&results);
            builder.finalize();
        }

        let func_id = jit.declare_function(&call_through_name, Linkage::Local, &ctx.func.signature)?;
        jit.define_function(func_id, &mut ctx)?;
        jit.clear_context(&mut ctx);
        jit.finalize_definitions()?;

        Ok(jit.get_finalized_function(func_id) as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::hlang_contract_fail;
    use hlang_codegen::{create_native_isa, OptimizationLevel};

    unsafe extern "C" fn test_hook(_context: *const (), _symbol_id: u64) -> *const u8 {
        std::ptr::null()
    }

    extern "C" fn return_seven() -> i32 {
        7
    }

    extern "C" fn return_nine() -> i32 {
        9
    }

    fn int_signature(manager: &mut IndirectStubsManager) -> Signature {
        let mut signature = manager.backend().make_signature();
        signature
            .returns
            .push(cranelift_codegen::ir::AbiParam::new(
                cranelift_codegen::ir::types::I32,
            ));
        signature
    }

    #[test]
    fn test_stub_dispatches_and_swaps_atomically() {
        let isa = create_native_isa(OptimizationLevel::None, false).unwrap();
        let mut manager = IndirectStubsManager::new(
            isa,
            test_hook,
            &[(
                hlang_codegen::CONTRACT_FAIL_SYMBOL,
                hlang_contract_fail as *const u8,
            )],
        );

        let signature = int_signature(&mut manager);
        let entry = manager
            .create_stub("test_symbol", &signature, return_seven as usize)
            .unwrap();

        let stub: extern "C" fn() -> i32 =
            unsafe { std::mem::transmute(entry.stub_address) };
        assert_eq!(stub(), 7);

        // 同一个函数指针在槽改写后进入新函数体
        manager
            .update_pointer("test_symbol", return_nine as usize)
            .unwrap();
        assert_eq!(stub(), 9);
    }

    #[test]
    fn test_create_stub_is_idempotent() {
        let isa = create_native_isa(OptimizationLevel::None, false).unwrap();
        let mut manager = IndirectStubsManager::new(isa, test_hook, &[]);

        let signature = int_signature(&mut manager);
        let first = manager
            .create_stub("sym", &signature, return_seven as usize)
            .unwrap();
        let second = manager
            .create_stub("sym", &signature, return_nine as usize)
            .unwrap();

        // 第二次创建不得替换已有桩
        assert_eq!(first.stub_address, second.stub_address);
        assert_eq!(first.slot.load(Ordering::SeqCst), return_seven as usize);
    }

    #[test]
    fn test_update_pointer_on_missing_stub_fails() {
        let isa = create_native_isa(OptimizationLevel::None, false).unwrap();
        let manager = IndirectStubsManager::new(isa, test_hook, &[]);
        assert!(matches!(
            manager.update_pointer("missing", 1),
            Err(JitError::LookupFailure { .. })
        ));
    }
}
