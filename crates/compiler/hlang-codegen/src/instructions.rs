//! 指令原语
//!
//! 函数翻译器使用的构造辅助：入口块栈槽（Cranelift 栈槽本身即
//! 函数级实体，天然提升）、ABI 对齐的加载/存储、小块
//! memcpy / 清零、布尔 1 位截断，以及合同失败的中止辅助。

use cranelift_codegen::ir::{types, InstBuilder, MemFlags, StackSlot, StackSlotData, StackSlotKind, TrapCode, Type, Value};
use cranelift_frontend::FunctionBuilder;
use cranelift_module::{Linkage, Module};

use crate::error::CodegenResult;
use crate::CONTRACT_FAIL_SYMBOL;

fn align_shift(align: u32) -> u8 {
    align.max(1).trailing_zeros() as u8
}

/// 创建显式栈槽
pub fn create_stack_slot(builder: &mut FunctionBuilder<'_>, size: u32, align: u32) -> StackSlot {
    builder.create_sized_stack_slot(StackSlotData::new(
        StackSlotKind::ExplicitSlot,
        size,
        align_shift(align),
    ))
}

pub fn stack_slot_address(
    builder: &mut FunctionBuilder<'_>,
    pointer_type: Type,
    slot: StackSlot,
) -> Value {
    builder.ins().stack_addr(pointer_type, slot, 0)
}

/// ABI 对齐的加载。地址来自栈槽或已知布局的聚合，按构造对齐。
pub fn create_load(
    builder: &mut FunctionBuilder<'_>,
    value_type: Type,
    address: Value,
    offset: i32,
) -> Value {
    builder
        .ins()
        .load(value_type, MemFlags::trusted(), address, offset)
}

pub fn create_store(builder: &mut FunctionBuilder<'_>, value: Value, address: Value, offset: i32) {
    builder
        .ins()
        .store(MemFlags::trusted(), value, address, offset);
}

/// 常量大小的内存拷贝
pub fn emit_memory_copy<M: Module>(
    backend: &M,
    builder: &mut FunctionBuilder<'_>,
    destination: Value,
    source: Value,
    size: u32,
    align: u32,
) {
    let align = align.max(1).min(u32::from(u8::MAX)) as u8;
    builder.emit_small_memory_copy(
        backend.target_config(),
        destination,
        source,
        u64::from(size),
        align,
        align,
        true,
        MemFlags::trusted(),
    );
}

/// 常量大小的清零
pub fn emit_memory_zero<M: Module>(
    backend: &M,
    builder: &mut FunctionBuilder<'_>,
    destination: Value,
    size: u32,
    align: u32,
) {
    builder.emit_small_memset(
        backend.target_config(),
        destination,
        0,
        u64::from(size),
        align.max(1).min(u32::from(u8::MAX)) as u8,
        MemFlags::trusted(),
    );
}

/// C_bool 语义：截断到最低位
pub fn truncate_to_bool(builder: &mut FunctionBuilder<'_>, value: Value) -> Value {
    builder.ins().band_imm(value, 1)
}

/// 合同失败：调用宿主中止钩子后陷入不可达陷阱。
/// 钩子符号由 JIT 会话注册；目标文件路径下由链接环境提供。
pub fn emit_contract_failure<M: Module>(
    backend: &mut M,
    builder: &mut FunctionBuilder<'_>,
    message: &str,
) -> CodegenResult<()> {
    let data_id = backend.declare_anonymous_data(false, false)?;
    let mut description = cranelift_module::DataDescription::new();
    let mut bytes = message.as_bytes().to_vec();
    bytes.push(0);
    description.define(bytes.into_boxed_slice());
    backend.define_data(data_id, &description)?;

    let mut signature = backend.make_signature();
    signature
        .params
        .push(cranelift_codegen::ir::AbiParam::new(types::I64));
    let func_id = backend.declare_function(CONTRACT_FAIL_SYMBOL, Linkage::Import, &signature)?;

    let global_value = backend.declare_data_in_func(data_id, builder.func);
    let message_address = builder.ins().global_value(types::I64, global_value);

    let func_ref = backend.declare_func_in_func(func_id, builder.func);
    builder.ins().call(func_ref, &[message_address]);
    builder.ins().trap(TrapCode::User(1));
    Ok(())
}
