//! 函数翻译器
//!
//! 逐语句、逐表达式把一个函数定义降级为 Cranelift IR。表达式降级
//! 是对变体标签的递归访问器：`Binary` 按运算与操作数类型分发
//! （有符号/无符号除法、浮点等），`Constant` 产出经类型一致性检查
//! 的常量，`Call` 按改名解析并检查实参数量，`Return` 构造返回。
//!
//! 局部变量与参数一律落在栈槽里（栈槽是函数级实体，天然提升到
//! 入口），读写经对齐的加载/存储。聚合值以地址表示，按指针
//! 传递与返回（sret）。
//!
//! 活动调试作用域栈是翻译器的显式字段，随语句压入/弹出；
//! 逐指令的 `SourceLoc` 由表达式自身的源码范围或栈顶提供。

use std::collections::HashMap;

use cranelift_codegen::ir::condcodes::{FloatCC, IntCC};
use cranelift_codegen::ir::{
    types, AbiParam, ArgumentPurpose, InstBuilder, MemFlags, Signature, SourceLoc, Type, Value,
};
use cranelift_frontend::FunctionBuilder;
use cranelift_module::{Linkage, Module as BackendModule};

use hlang_core::database::{Declaration, DeclarationDatabase};
use hlang_core::declarations::{
    EnumDeclaration, FunctionDeclaration, FunctionDefinition, SourceRange, StructDeclaration,
};
use hlang_core::expressions::{
    AccessExpression, AssignmentExpression, BinaryExpression, BinaryOperation, BlockExpression,
    CallExpression, CastExpression, CastType, ConstantArrayExpression, ConstantExpression,
    Expression, ExpressionData, ExpressionIndex, IfExpression, InstantiateExpression,
    InstantiateExpressionType, ReturnExpression, Statement, UnaryExpression, UnaryOperation,
    VariableDeclarationExpression, WhileLoopExpression,
};
use hlang_core::module::Module;
use hlang_core::types::{FundamentalType, FunctionType, PointerType, TypeReference};

use crate::error::{CodegenError, CodegenResult};
use crate::instructions;
use crate::layout::{self, LoweredType};
use crate::mangle::mangle_name;

/// 函数的后端 ABI：标量按值，聚合经指针，聚合返回经 sret
pub struct FunctionAbi {
    pub signature: Signature,
    /// 各输入参数是否经指针传入
    pub indirect_inputs: Vec<bool>,
    /// 聚合返回类型（存在时签名首参为 sret 指针）
    pub sret: Option<TypeReference>,
}

pub fn build_function_abi<M: BackendModule>(
    backend: &M,
    database: &DeclarationDatabase,
    module_name: &str,
    function_type: &FunctionType,
) -> CodegenResult<FunctionAbi> {
    let pointer_type = backend.target_config().pointer_type();
    let mut signature = backend.make_signature();
    let mut indirect_inputs = Vec::with_capacity(function_type.input_parameter_types.len());
    let mut sret = None;

    if function_type.output_parameter_types.len() == 1 {
        let output = &function_type.output_parameter_types[0];
        match layout::lower_type(database, module_name, output)? {
            LoweredType::Scalar(scalar) => signature.returns.push(AbiParam::new(scalar)),
            LoweredType::Aggregate(_) => {
                signature
                    .params
                    .push(AbiParam::special(pointer_type, ArgumentPurpose::StructReturn));
                sret = Some(output.clone());
            }
        }
    } else {
        for output in &function_type.output_parameter_types {
            match layout::lower_type(database, module_name, output)? {
                LoweredType::Scalar(scalar) => signature.returns.push(AbiParam::new(scalar)),
                LoweredType::Aggregate(_) => {
                    return Err(CodegenError::UnsupportedType(
                        "aggregate outputs are only supported for single-output functions"
                            .to_string(),
                    ))
                }
            }
        }
    }

    for input in &function_type.input_parameter_types {
        match layout::lower_type(database, module_name, input)? {
            LoweredType::Scalar(scalar) => {
                signature.params.push(AbiParam::new(scalar));
                indirect_inputs.push(false);
            }
            LoweredType::Aggregate(_) => {
                signature.params.push(AbiParam::new(pointer_type));
                indirect_inputs.push(true);
            }
        }
    }

    Ok(FunctionAbi {
        signature,
        indirect_inputs,
        sret,
    })
}

/// 值的存放位置
#[derive(Debug, Clone, Copy)]
enum ValuePlace {
    Scalar(Value),
    Address(Value),
}

/// 已降级的表达式值
#[derive(Debug, Clone)]
struct Lowered {
    place: ValuePlace,
    type_reference: TypeReference,
}

/// 名字解析结果
enum Resolved {
    Value(Lowered),
    /// 模块别名
    Module(String),
    /// 某模块内的声明
    Declaration { module_name: String, name: String },
}

#[derive(Debug, Clone)]
struct LocalVariable {
    address: Value,
    type_reference: TypeReference,
}

/// 活动调试作用域栈（显式字段，不用线程局部状态）
#[derive(Debug, Default)]
struct DebugScopeStack {
    stack: Vec<SourceRange>,
}

impl DebugScopeStack {
    fn push(&mut self, range: SourceRange) {
        self.stack.push(range);
    }

    fn pop(&mut self) {
        self.stack.pop();
    }

    fn current(&self) -> Option<&SourceRange> {
        self.stack.last()
    }
}

fn pack_source_loc(range: &SourceRange) -> SourceLoc {
    // 行在高 20 位、列在低 12 位
    SourceLoc::new(((range.start.line & 0xFFFFF) << 12) | (range.start.column & 0xFFF))
}

pub struct FunctionTranslator<'a, 'b, M: BackendModule> {
    backend: &'a mut M,
    database: &'a DeclarationDatabase,
    core_module: &'a Module,
    builder: FunctionBuilder<'b>,
    pointer_type: Type,
    locals: HashMap<String, LocalVariable>,
    sret_pointer: Option<Value>,
    output_types: Vec<TypeReference>,
    debug_scopes: DebugScopeStack,
    emit_debug_locations: bool,
    block_terminated: bool,
}

impl<'a, 'b, M: BackendModule> FunctionTranslator<'a, 'b, M> {
    pub fn new(
        backend: &'a mut M,
        database: &'a DeclarationDatabase,
        core_module: &'a Module,
        builder: FunctionBuilder<'b>,
        emit_debug_locations: bool,
    ) -> Self {
        let pointer_type = backend.target_config().pointer_type();
        Self {
            backend,
            database,
            core_module,
            builder,
            pointer_type,
            locals: HashMap::new(),
            sret_pointer: None,
            output_types: Vec::new(),
            debug_scopes: DebugScopeStack::default(),
            emit_debug_locations,
            block_terminated: false,
        }
    }

    /// 翻译整个函数体。入口参数拷入栈槽后逐语句降级；
    /// 控制流块在结尾统一密封。
    pub fn translate(
        &mut self,
        declaration: &FunctionDeclaration,
        definition: &FunctionDefinition,
        abi: &FunctionAbi,
    ) -> CodegenResult<()> {
        self.output_types = declaration.function_type.output_parameter_types.clone();

        let entry_block = self.builder.create_block();
        self.builder
            .append_block_params_for_function_params(entry_block);
        self.builder.switch_to_block(entry_block);

        let block_params: Vec<Value> = self.builder.block_params(entry_block).to_vec();
        let mut next_param = 0;

        if abi.sret.is_some() {
            self.sret_pointer = Some(block_params[next_param]);
            next_param += 1;
        }

        for (index, parameter_name) in declaration.input_parameter_names.iter().enumerate() {
            let parameter_type = &declaration.function_type.input_parameter_types[index];
            let incoming = block_params[next_param];
            next_param += 1;

            let (size, align) =
                layout::size_and_align(self.database, &self.core_module.name, parameter_type)?;
            let slot = instructions::create_stack_slot(&mut self.builder, size, align);
            let address =
                instructions::stack_slot_address(&mut self.builder, self.pointer_type, slot);

            if abi.indirect_inputs[index] {
                instructions::emit_memory_copy(
                    self.backend,
                    &mut self.builder,
                    address,
                    incoming,
                    size,
                    align,
                );
            } else {
                instructions::create_store(&mut self.builder, incoming, address, 0);
            }

            self.locals.insert(
                parameter_name.clone(),
                LocalVariable {
                    address,
                    type_reference: parameter_type.clone(),
                },
            );
        }

        for statement in &definition.statements {
            // 终结符之后的语句不可达，不再发射
            if self.block_terminated {
                break;
            }
            self.lower_statement(statement)?;
        }

        if !self.block_terminated {
            if self.output_types.is_empty() || self.sret_pointer.is_some() {
                self.builder.ins().return_(&[]);
            } else {
                instructions::emit_contract_failure(
                    self.backend,
                    &mut self.builder,
                    "function fell off the end without returning a value",
                )?;
            }
        }

        self.builder.seal_all_blocks();
        Ok(())
    }

    pub fn finalize(self) {
        self.builder.finalize();
    }

    // -----------------------------------------------------------------------
    // 语句
    // -----------------------------------------------------------------------

    fn lower_statement(&mut self, statement: &Statement) -> CodegenResult<()> {
        let Some(root) = statement.root_expression() else {
            return Ok(());
        };

        if let Some(range) = &root.source_range {
            self.debug_scopes.push(*range);
        }
        self.apply_source_loc(root);

        let result = self.lower_root_expression(statement, root);

        if root.source_range.is_some() {
            self.debug_scopes.pop();
        }
        result
    }

    fn lower_root_expression(
        &mut self,
        statement: &Statement,
        root: &Expression,
    ) -> CodegenResult<()> {
        match &root.data {
            ExpressionData::ReturnExpression(data) => self.lower_return(statement, data),
            ExpressionData::VariableDeclarationExpression(data) => {
                self.lower_variable_declaration(statement, data)
            }
            ExpressionData::AssignmentExpression(data) => self.lower_assignment(statement, data),
            ExpressionData::IfExpression(data) => self.lower_if(data),
            ExpressionData::WhileLoopExpression(data) => self.lower_while(data),
            ExpressionData::BlockExpression(data) => self.lower_block(data),
            ExpressionData::CallExpression(data) => {
                self.lower_call(statement, data, None).map(|_| ())
            }
            _ => {
                // 表达式语句：求值并丢弃
                self.lower_expression(statement, root, None).map(|_| ())
            }
        }
    }

    fn lower_return(
        &mut self,
        statement: &Statement,
        data: &ReturnExpression,
    ) -> CodegenResult<()> {
        match data.expression {
            None => {
                if !self.output_types.is_empty() && self.sret_pointer.is_none() {
                    return Err(CodegenError::TypeMismatch(
                        "return without a value in a function with outputs".to_string(),
                    ));
                }
                self.builder.ins().return_(&[]);
            }
            Some(index) => {
                if self.output_types.is_empty() {
                    return Err(CodegenError::TypeMismatch(
                        "return with a value in a function without outputs".to_string(),
                    ));
                }
                let expected = self.output_types.first().cloned();
                let lowered = self.lower_expression_at(statement, index, expected.as_ref())?;

                if let Some(sret_pointer) = self.sret_pointer {
                    let (size, align) = layout::size_and_align(
                        self.database,
                        &self.core_module.name,
                        &lowered.type_reference,
                    )?;
                    let source = self.address_of(&lowered)?;
                    instructions::emit_memory_copy(
                        self.backend,
                        &mut self.builder,
                        sret_pointer,
                        source,
                        size,
                        align,
                    );
                    self.builder.ins().return_(&[]);
                } else {
                    if let Some(expected) = &expected {
                        self.check_types_match(expected, &lowered.type_reference, "return value")?;
                    }
                    let value = self.scalar_of(&lowered)?;
                    self.builder.ins().return_(&[value]);
                }
            }
        }
        self.block_terminated = true;
        Ok(())
    }

    fn lower_variable_declaration(
        &mut self,
        statement: &Statement,
        data: &VariableDeclarationExpression,
    ) -> CodegenResult<()> {
        let lowered = self.lower_expression_at(statement, data.right_hand_side, None)?;
        let (size, align) = layout::size_and_align(
            self.database,
            &self.core_module.name,
            &lowered.type_reference,
        )?;

        let slot = instructions::create_stack_slot(&mut self.builder, size, align);
        let address = instructions::stack_slot_address(&mut self.builder, self.pointer_type, slot);
        self.store_into(address, &lowered, size, align)?;

        self.locals.insert(
            data.name.clone(),
            LocalVariable {
                address,
                type_reference: lowered.type_reference,
            },
        );
        Ok(())
    }

    fn lower_assignment(
        &mut self,
        statement: &Statement,
        data: &AssignmentExpression,
    ) -> CodegenResult<()> {
        let target = self.lower_expression_at(statement, data.left_hand_side, None)?;
        let ValuePlace::Address(target_address) = target.place else {
            return Err(CodegenError::TypeMismatch(
                "left-hand side of assignment is not assignable".to_string(),
            ));
        };

        let value = self.lower_expression_at(
            statement,
            data.right_hand_side,
            Some(&target.type_reference.clone()),
        )?;
        self.check_types_match(&target.type_reference, &value.type_reference, "assignment")?;

        let (size, align) = layout::size_and_align(
            self.database,
            &self.core_module.name,
            &target.type_reference,
        )?;

        match data.additional_operation {
            None => self.store_into(target_address, &value, size, align)?,
            Some(operation) => {
                let current = Lowered {
                    place: ValuePlace::Address(target_address),
                    type_reference: target.type_reference.clone(),
                };
                let combined = self.emit_binary_operation(operation, &current, &value)?;
                self.store_into(target_address, &combined, size, align)?;
            }
        }
        Ok(())
    }

    fn lower_if(&mut self, data: &IfExpression) -> CodegenResult<()> {
        let condition = self.lower_condition(&data.condition)?;

        let then_block = self.builder.create_block();
        let else_block = self.builder.create_block();
        let merge_block = self.builder.create_block();

        self.builder
            .ins()
            .brif(condition, then_block, &[], else_block, &[]);

        self.builder.switch_to_block(then_block);
        self.block_terminated = false;
        for statement in &data.then_statements {
            if self.block_terminated {
                break;
            }
            self.lower_statement(statement)?;
        }
        if !self.block_terminated {
            self.builder.ins().jump(merge_block, &[]);
        }

        self.builder.switch_to_block(else_block);
        self.block_terminated = false;
        for statement in &data.else_statements {
            if self.block_terminated {
                break;
            }
            self.lower_statement(statement)?;
        }
        if !self.block_terminated {
            self.builder.ins().jump(merge_block, &[]);
        }

        self.builder.switch_to_block(merge_block);
        self.block_terminated = false;
        Ok(())
    }

    fn lower_while(&mut self, data: &WhileLoopExpression) -> CodegenResult<()> {
        let header_block = self.builder.create_block();
        let body_block = self.builder.create_block();
        let exit_block = self.builder.create_block();

        self.builder.ins().jump(header_block, &[]);
        self.builder.switch_to_block(header_block);

        let condition = self.lower_condition(&data.condition)?;
        self.builder
            .ins()
            .brif(condition, body_block, &[], exit_block, &[]);

        self.builder.switch_to_block(body_block);
        self.block_terminated = false;
        for statement in &data.then_statements {
            if self.block_terminated {
                break;
            }
            self.lower_statement(statement)?;
        }
        if !self.block_terminated {
            self.builder.ins().jump(header_block, &[]);
        }

        self.builder.switch_to_block(exit_block);
        self.block_terminated = false;
        Ok(())
    }

    fn lower_block(&mut self, data: &BlockExpression) -> CodegenResult<()> {
        // 块级作用域：内部声明遮蔽外部，离开时恢复
        let saved_locals = self.locals.clone();
        for statement in &data.statements {
            if self.block_terminated {
                break;
            }
            self.lower_statement(statement)?;
        }
        self.locals = saved_locals;
        Ok(())
    }

    fn lower_condition(&mut self, condition: &Statement) -> CodegenResult<Value> {
        let root = condition.root_expression().ok_or_else(|| {
            CodegenError::UnsupportedExpression("empty condition statement".to_string())
        })?;
        let lowered = self.lower_expression(condition, root, None)?;
        self.scalar_of(&lowered)
    }

    // -----------------------------------------------------------------------
    // 表达式
    // -----------------------------------------------------------------------

    fn expression_at<'s>(
        &self,
        statement: &'s Statement,
        index: ExpressionIndex,
    ) -> CodegenResult<&'s Expression> {
        statement
            .expression_at(index)
            .ok_or_else(|| CodegenError::UnsupportedExpression(format!(
                "expression index {} is out of bounds",
                index.expression_index
            )))
    }

    fn lower_expression_at(
        &mut self,
        statement: &Statement,
        index: ExpressionIndex,
        expected: Option<&TypeReference>,
    ) -> CodegenResult<Lowered> {
        let expression = self.expression_at(statement, index)?;
        self.lower_expression(statement, expression, expected)
    }

    fn apply_source_loc(&mut self, expression: &Expression) {
        if !self.emit_debug_locations {
            return;
        }
        if let Some(range) = &expression.source_range {
            self.builder.set_srcloc(pack_source_loc(range));
        } else if let Some(range) = self.debug_scopes.current() {
            self.builder.set_srcloc(pack_source_loc(range));
        }
    }

    fn lower_expression(
        &mut self,
        statement: &Statement,
        expression: &Expression,
        expected: Option<&TypeReference>,
    ) -> CodegenResult<Lowered> {
        self.apply_source_loc(expression);

        match &expression.data {
            ExpressionData::AccessExpression(data) => {
                match self.resolve_access(statement, data)? {
                    Resolved::Value(lowered) => Ok(lowered),
                    Resolved::Declaration { module_name, name } => {
                        self.lower_declaration_value(&module_name, &name)
                    }
                    Resolved::Module(name) => Err(CodegenError::UnsupportedExpression(format!(
                        "module alias '{name}' used as a value"
                    ))),
                }
            }
            ExpressionData::BinaryExpression(data) => self.lower_binary(statement, data),
            ExpressionData::CallExpression(data) => self
                .lower_call(statement, data, expected)?
                .ok_or_else(|| {
                    CodegenError::TypeMismatch(
                        "call to a function without outputs used as a value".to_string(),
                    )
                }),
            ExpressionData::CastExpression(data) => self.lower_cast(statement, data),
            ExpressionData::ConstantExpression(data) => self.lower_constant(data, expected),
            ExpressionData::ConstantArrayExpression(data) => {
                self.lower_constant_array(data, expected)
            }
            ExpressionData::InstantiateExpression(data) => self.lower_instantiate(data, expected),
            ExpressionData::NullPointerExpression(_) => {
                let value = self.builder.ins().iconst(self.pointer_type, 0);
                let type_reference = match expected {
                    Some(expected @ TypeReference::PointerType(_)) => expected.clone(),
                    _ => TypeReference::PointerType(PointerType {
                        element_type: None,
                        is_mutable: false,
                    }),
                };
                Ok(Lowered {
                    place: ValuePlace::Scalar(value),
                    type_reference,
                })
            }
            ExpressionData::ParenthesisExpression(data) => {
                self.lower_expression_at(statement, data.expression, expected)
            }
            ExpressionData::UnaryExpression(data) => self.lower_unary(statement, data),
            ExpressionData::VariableExpression(data) => {
                match self.resolve_variable(&data.name)? {
                    Resolved::Value(lowered) => Ok(lowered),
                    Resolved::Declaration { module_name, name } => {
                        self.lower_declaration_value(&module_name, &name)
                    }
                    Resolved::Module(name) => Err(CodegenError::UnsupportedExpression(format!(
                        "module alias '{name}' used as a value"
                    ))),
                }
            }
            ExpressionData::ReturnExpression(_)
            | ExpressionData::VariableDeclarationExpression(_)
            | ExpressionData::AssignmentExpression(_)
            | ExpressionData::IfExpression(_)
            | ExpressionData::WhileLoopExpression(_)
            | ExpressionData::BlockExpression(_) => Err(CodegenError::UnsupportedExpression(
                "statement-level expression used as a value".to_string(),
            )),
            ExpressionData::StructExpression(_)
            | ExpressionData::EnumExpression(_)
            | ExpressionData::UnionExpression(_)
            | ExpressionData::TypeExpression(_) => Err(CodegenError::UnsupportedExpression(
                "compile-time expression reached the backend".to_string(),
            )),
        }
    }

    // -----------------------------------------------------------------------
    // 名字解析
    // -----------------------------------------------------------------------

    fn resolve_variable(&mut self, name: &str) -> CodegenResult<Resolved> {
        if let Some(local) = self.locals.get(name) {
            return Ok(Resolved::Value(Lowered {
                place: ValuePlace::Address(local.address),
                type_reference: local.type_reference.clone(),
            }));
        }

        if let Some(alias_import) = self
            .core_module
            .dependencies
            .alias_imports
            .iter()
            .find(|alias_import| alias_import.alias == name)
        {
            return Ok(Resolved::Module(alias_import.module_name.clone()));
        }

        if self
            .database
            .find_declaration(&self.core_module.name, name)
            .is_some()
        {
            return Ok(Resolved::Declaration {
                module_name: self.core_module.name.clone(),
                name: name.to_string(),
            });
        }

        Err(CodegenError::UndefinedVariable(name.to_string()))
    }

    fn resolve_access(
        &mut self,
        statement: &Statement,
        data: &AccessExpression,
    ) -> CodegenResult<Resolved> {
        let base_expression = self.expression_at(statement, data.expression)?;

        let base = match &base_expression.data {
            ExpressionData::VariableExpression(variable) => self.resolve_variable(&variable.name)?,
            ExpressionData::AccessExpression(inner) => self.resolve_access(statement, inner)?,
            _ => Resolved::Value(self.lower_expression(statement, base_expression, None)?),
        };

        match base {
            Resolved::Module(module_name) => Ok(Resolved::Declaration {
                module_name,
                name: data.member_name.clone(),
            }),
            Resolved::Declaration { module_name, name } => {
                let declaration = self
                    .database
                    .find_declaration(&module_name, &name)
                    .ok_or_else(|| CodegenError::TypeResolutionFailure(format!(
                        "unknown declaration '{module_name}.{name}'"
                    )))?;
                match declaration {
                    Declaration::Enum(enum_declaration) => {
                        let value = enum_member_value(&enum_declaration, &data.member_name)?;
                        let constant = self.builder.ins().iconst(types::I32, value);
                        Ok(Resolved::Value(Lowered {
                            place: ValuePlace::Scalar(constant),
                            type_reference: hlang_core::types::create_custom_type_reference(
                                &module_name,
                                &name,
                            ),
                        }))
                    }
                    _ => Err(CodegenError::UnsupportedExpression(format!(
                        "member access on declaration '{module_name}.{name}'"
                    ))),
                }
            }
            Resolved::Value(lowered) => {
                self.member_access(&lowered, &data.member_name).map(Resolved::Value)
            }
        }
    }

    /// 结构体/联合体成员访问；指针基自动解引用一层
    fn member_access(&mut self, base: &Lowered, member_name: &str) -> CodegenResult<Lowered> {
        let mut base = base.clone();

        if let TypeReference::PointerType(pointer) = &base.type_reference {
            let element_type = pointer.element_type.as_deref().cloned().ok_or_else(|| {
                CodegenError::TypeMismatch("member access through a void pointer".to_string())
            })?;
            let address = self.scalar_of(&base)?;
            base = Lowered {
                place: ValuePlace::Address(address),
                type_reference: element_type,
            };
        }

        let underlying = self
            .database
            .get_underlying_type(&self.core_module.name, &base.type_reference)?
            .ok_or_else(|| {
                CodegenError::TypeResolutionFailure(
                    "member access on an unresolved type".to_string(),
                )
            })?;

        let TypeReference::CustomTypeReference(custom) = &underlying else {
            return Err(CodegenError::TypeMismatch(format!(
                "member access on a non-aggregate type: {underlying:?}"
            )));
        };

        let declaration = self
            .database
            .find_declaration(&custom.module_reference.name, &custom.name)
            .ok_or_else(|| CodegenError::TypeResolutionFailure(format!(
                "unknown declaration '{}.{}'",
                custom.module_reference.name, custom.name
            )))?;

        let ValuePlace::Address(base_address) = base.place else {
            return Err(CodegenError::TypeMismatch(
                "member access on a non-addressable value".to_string(),
            ));
        };

        let (member_type, offset) = match &declaration {
            Declaration::Struct(struct_declaration) => {
                let index = member_index(&struct_declaration.member_names, member_name)
                    .ok_or_else(|| CodegenError::TypeMismatch(format!(
                        "struct '{}' has no member '{member_name}'",
                        struct_declaration.name
                    )))?;
                let aggregate_layout = layout::struct_layout(
                    self.database,
                    &custom.module_reference.name,
                    struct_declaration,
                )?;
                (
                    struct_declaration.member_types[index].clone(),
                    aggregate_layout.member_offsets[index],
                )
            }
            Declaration::Union(union_declaration) => {
                let index = member_index(&union_declaration.member_names, member_name)
                    .ok_or_else(|| CodegenError::TypeMismatch(format!(
                        "union '{}' has no member '{member_name}'",
                        union_declaration.name
                    )))?;
                (union_declaration.member_types[index].clone(), 0)
            }
            _ => {
                return Err(CodegenError::TypeMismatch(format!(
                    "member access on '{}.{}' which is not a struct or union",
                    custom.module_reference.name, custom.name
                )))
            }
        };

        let member_address = if offset == 0 {
            base_address
        } else {
            self.builder
                .ins()
                .iadd_imm(base_address, i64::from(offset))
        };

        // 成员类型中的未限定引用归属声明所在模块
        let member_type = hlang_core::types::fix_custom_type_reference(
            member_type,
            &custom.module_reference.name,
        );

        Ok(Lowered {
            place: ValuePlace::Address(member_address),
            type_reference: member_type,
        })
    }

    /// 把声明当作值使用：函数 → 函数指针；全局变量 → 地址
    fn lower_declaration_value(
        &mut self,
        module_name: &str,
        name: &str,
    ) -> CodegenResult<Lowered> {
        let declaration = self
            .database
            .find_declaration(module_name, name)
            .ok_or_else(|| CodegenError::TypeResolutionFailure(format!(
                "unknown declaration '{module_name}.{name}'"
            )))?;

        match declaration {
            Declaration::Function(function_declaration) => {
                let mangled = mangle_name(
                    module_name,
                    &function_declaration.name,
                    function_declaration.unique_name.as_deref(),
                    self.database.name_mangling_of(module_name),
                );
                let abi = build_function_abi(
                    self.backend,
                    self.database,
                    module_name,
                    &function_declaration.function_type,
                )?;
                let func_id =
                    self.backend
                        .declare_function(&mangled, Linkage::Import, &abi.signature)?;
                let func_ref = self.backend.declare_func_in_func(func_id, self.builder.func);
                let address = self.builder.ins().func_addr(self.pointer_type, func_ref);
                Ok(Lowered {
                    place: ValuePlace::Scalar(address),
                    type_reference: TypeReference::FunctionType(
                        function_declaration.function_type.clone(),
                    ),
                })
            }
            Declaration::GlobalVariable(global_declaration) => {
                let mangled = mangle_name(
                    module_name,
                    &global_declaration.name,
                    global_declaration.unique_name.as_deref(),
                    self.database.name_mangling_of(module_name),
                );
                let data_id = self.backend.declare_data(
                    &mangled,
                    Linkage::Import,
                    global_declaration.is_mutable,
                    false,
                )?;
                let global_value = self.backend.declare_data_in_func(data_id, self.builder.func);
                let address = self
                    .builder
                    .ins()
                    .global_value(self.pointer_type, global_value);

                let type_reference = global_declaration
                    .type_reference
                    .clone()
                    .ok_or_else(|| CodegenError::TypeResolutionFailure(format!(
                        "global variable '{module_name}.{name}' has no resolved type"
                    )))?;
                Ok(Lowered {
                    place: ValuePlace::Address(address),
                    type_reference: hlang_core::types::fix_custom_type_reference(
                        type_reference,
                        module_name,
                    ),
                })
            }
            _ => Err(CodegenError::UnsupportedExpression(format!(
                "declaration '{module_name}.{name}' cannot be used as a value"
            ))),
        }
    }

    // -----------------------------------------------------------------------
    // 调用
    // -----------------------------------------------------------------------

    fn lower_call(
        &mut self,
        statement: &Statement,
        data: &CallExpression,
        _expected: Option<&TypeReference>,
    ) -> CodegenResult<Option<Lowered>> {
        let callee_expression = self.expression_at(statement, data.expression)?;

        let resolved = match &callee_expression.data {
            ExpressionData::VariableExpression(variable) => self.resolve_variable(&variable.name)?,
            ExpressionData::AccessExpression(access) => self.resolve_access(statement, access)?,
            _ => Resolved::Value(self.lower_expression(statement, callee_expression, None)?),
        };

        match resolved {
            Resolved::Declaration { module_name, name } => {
                let declaration = self
                    .database
                    .find_declaration(&module_name, &name)
                    .ok_or_else(|| CodegenError::TypeResolutionFailure(format!(
                        "unknown function '{module_name}.{name}'"
                    )))?;
                let Declaration::Function(function_declaration) = declaration else {
                    return Err(CodegenError::TypeMismatch(format!(
                        "'{module_name}.{name}' is not callable"
                    )));
                };
                self.lower_direct_call(statement, data, &module_name, &function_declaration)
            }
            Resolved::Value(lowered) => {
                let TypeReference::FunctionType(function_type) = lowered.type_reference.clone()
                else {
                    return Err(CodegenError::TypeMismatch(
                        "callee is not a function".to_string(),
                    ));
                };
                let callee = self.scalar_of(&lowered)?;
                self.lower_indirect_call(statement, data, callee, &function_type)
            }
            Resolved::Module(name) => Err(CodegenError::TypeMismatch(format!(
                "module alias '{name}' is not callable"
            ))),
        }
    }

    fn lower_call_arguments(
        &mut self,
        statement: &Statement,
        data: &CallExpression,
        function_name: &str,
        // 被调方所在模块：参数类型中的未限定引用归属于它
        callee_module_name: &str,
        function_type: &FunctionType,
        abi: &FunctionAbi,
    ) -> CodegenResult<(Vec<Value>, Option<Lowered>)> {
        let fixed = function_type.input_parameter_types.len();
        let matches_arity = if function_type.is_variadic {
            data.arguments.len() >= fixed
        } else {
            data.arguments.len() == fixed
        };
        if !matches_arity {
            return Err(CodegenError::ArityMismatch {
                function_name: function_name.to_string(),
                expected: fixed,
                found: data.arguments.len(),
            });
        }

        let mut arguments = Vec::with_capacity(data.arguments.len() + 1);
        let mut sret_result = None;

        if let Some(output_type) = &abi.sret {
            let output_type = hlang_core::types::fix_custom_type_reference(
                output_type.clone(),
                callee_module_name,
            );
            let (size, align) =
                layout::size_and_align(self.database, &self.core_module.name, &output_type)?;
            let slot = instructions::create_stack_slot(&mut self.builder, size, align);
            let address =
                instructions::stack_slot_address(&mut self.builder, self.pointer_type, slot);
            arguments.push(address);
            sret_result = Some(Lowered {
                place: ValuePlace::Address(address),
                type_reference: output_type,
            });
        }

        for (index, argument_index) in data.arguments.iter().enumerate() {
            let expected = function_type.input_parameter_types.get(index).map(|parameter| {
                hlang_core::types::fix_custom_type_reference(
                    parameter.clone(),
                    callee_module_name,
                )
            });
            let lowered =
                self.lower_expression_at(statement, *argument_index, expected.as_ref())?;

            if let Some(expected) = &expected {
                self.check_types_match(expected, &lowered.type_reference, function_name)?;
            }

            let is_indirect = abi.indirect_inputs.get(index).copied().unwrap_or(false);
            if is_indirect {
                // 按值语义：把实参拷贝进临时槽后传地址
                let (size, align) = layout::size_and_align(
                    self.database,
                    &self.core_module.name,
                    &lowered.type_reference,
                )?;
                let slot = instructions::create_stack_slot(&mut self.builder, size, align);
                let address =
                    instructions::stack_slot_address(&mut self.builder, self.pointer_type, slot);
                self.store_into(address, &lowered, size, align)?;
                arguments.push(address);
            } else {
                arguments.push(self.scalar_of(&lowered)?);
            }
        }

        Ok((arguments, sret_result))
    }

    fn lower_direct_call(
        &mut self,
        statement: &Statement,
        data: &CallExpression,
        module_name: &str,
        declaration: &FunctionDeclaration,
    ) -> CodegenResult<Option<Lowered>> {
        let abi = build_function_abi(
            self.backend,
            self.database,
            module_name,
            &declaration.function_type,
        )?;
        let mangled = mangle_name(
            module_name,
            &declaration.name,
            declaration.unique_name.as_deref(),
            self.database.name_mangling_of(module_name),
        );

        let (arguments, sret_result) = self.lower_call_arguments(
            statement,
            data,
            &declaration.name,
            module_name,
            &declaration.function_type,
            &abi,
        )?;

        let func_id = self
            .backend
            .declare_function(&mangled, Linkage::Import, &abi.signature)?;

        let call = if declaration.function_type.is_variadic
            && data.arguments.len() > declaration.function_type.input_parameter_types.len()
        {
            // 变参调用：按实际实参类型构造调用点签名，经地址间接调用
            let func_ref = self.backend.declare_func_in_func(func_id, self.builder.func);
            let address = self.builder.ins().func_addr(self.pointer_type, func_ref);

            let mut site_signature = abi.signature.clone();
            for argument in arguments.iter().skip(site_signature.params.len()) {
                let argument_type = self.builder.func.dfg.value_type(*argument);
                site_signature.params.push(AbiParam::new(argument_type));
            }
            let signature_ref = self.builder.import_signature(site_signature);
            self.builder
                .ins()
                .call_indirect(signature_ref, address, &arguments)
        } else {
            let func_ref = self.backend.declare_func_in_func(func_id, self.builder.func);
            self.builder.ins().call(func_ref, &arguments)
        };

        let output_type = declaration
            .function_type
            .output_parameter_types
            .first()
            .map(|output| {
                hlang_core::types::fix_custom_type_reference(output.clone(), module_name)
            });
        self.call_result(call, output_type, sret_result)
    }

    fn lower_indirect_call(
        &mut self,
        statement: &Statement,
        data: &CallExpression,
        callee: Value,
        function_type: &FunctionType,
    ) -> CodegenResult<Option<Lowered>> {
        let abi = build_function_abi(
            self.backend,
            self.database,
            &self.core_module.name,
            function_type,
        )?;

        let current_module_name = self.core_module.name.clone();
        let (arguments, sret_result) = self.lower_call_arguments(
            statement,
            data,
            "<indirect>",
            &current_module_name,
            function_type,
            &abi,
        )?;

        let signature_ref = self.builder.import_signature(abi.signature.clone());
        let call = self
            .builder
            .ins()
            .call_indirect(signature_ref, callee, &arguments);

        self.call_result(
            call,
            function_type.output_parameter_types.first().cloned(),
            sret_result,
        )
    }

    fn call_result(
        &mut self,
        call: cranelift_codegen::ir::Inst,
        output_type: Option<TypeReference>,
        sret_result: Option<Lowered>,
    ) -> CodegenResult<Option<Lowered>> {
        if let Some(sret_result) = sret_result {
            return Ok(Some(sret_result));
        }

        let results = self.builder.inst_results(call);
        match (results.first().copied(), output_type) {
            (Some(value), Some(output_type)) => Ok(Some(Lowered {
                place: ValuePlace::Scalar(value),
                type_reference: output_type,
            })),
            _ => Ok(None),
        }
    }

    // -----------------------------------------------------------------------
    // 运算符
    // -----------------------------------------------------------------------

    fn lower_binary(
        &mut self,
        statement: &Statement,
        data: &BinaryExpression,
    ) -> CodegenResult<Lowered> {
        let left = self.lower_expression_at(statement, data.left_hand_side, None)?;
        let right =
            self.lower_expression_at(statement, data.right_hand_side, Some(&left.type_reference.clone()))?;
        self.emit_binary_operation(data.operation, &left, &right)
    }

    fn emit_binary_operation(
        &mut self,
        operation: BinaryOperation,
        left: &Lowered,
        right: &Lowered,
    ) -> CodegenResult<Lowered> {
        self.check_types_match(&left.type_reference, &right.type_reference, "binary operands")?;

        let left_value = self.scalar_of(left)?;
        let right_value = self.scalar_of(right)?;

        let operand_type = left.type_reference.clone();
        let signed = layout::is_signed(&operand_type);
        let float = layout::is_float(&operand_type);

        use BinaryOperation::*;
        let (value, result_type) = match operation {
            Add => {
                let value = if float {
                    self.builder.ins().fadd(left_value, right_value)
                } else {
                    self.builder.ins().iadd(left_value, right_value)
                };
                (value, operand_type)
            }
            Subtract => {
                let value = if float {
                    self.builder.ins().fsub(left_value, right_value)
                } else {
                    self.builder.ins().isub(left_value, right_value)
                };
                (value, operand_type)
            }
            Multiply => {
                let value = if float {
                    self.builder.ins().fmul(left_value, right_value)
                } else {
                    self.builder.ins().imul(left_value, right_value)
                };
                (value, operand_type)
            }
            Divide => {
                let value = if float {
                    self.builder.ins().fdiv(left_value, right_value)
                } else if signed {
                    self.builder.ins().sdiv(left_value, right_value)
                } else {
                    self.builder.ins().udiv(left_value, right_value)
                };
                (value, operand_type)
            }
            Modulus => {
                if float {
                    return Err(CodegenError::UnsupportedExpression(
                        "modulus on floating-point operands".to_string(),
                    ));
                }
                let value = if signed {
                    self.builder.ins().srem(left_value, right_value)
                } else {
                    self.builder.ins().urem(left_value, right_value)
                };
                (value, operand_type)
            }
            Equal | NotEqual | LessThan | LessThanOrEqualTo | GreaterThan
            | GreaterThanOrEqualTo => {
                let value = if float {
                    let condition = match operation {
                        Equal => FloatCC::Equal,
                        NotEqual => FloatCC::NotEqual,
                        LessThan => FloatCC::LessThan,
                        LessThanOrEqualTo => FloatCC::LessThanOrEqual,
                        GreaterThan => FloatCC::GreaterThan,
                        _ => FloatCC::GreaterThanOrEqual,
                    };
                    self.builder.ins().fcmp(condition, left_value, right_value)
                } else {
                    let condition = match (operation, signed) {
                        (Equal, _) => IntCC::Equal,
                        (NotEqual, _) => IntCC::NotEqual,
                        (LessThan, true) => IntCC::SignedLessThan,
                        (LessThan, false) => IntCC::UnsignedLessThan,
                        (LessThanOrEqualTo, true) => IntCC::SignedLessThanOrEqual,
                        (LessThanOrEqualTo, false) => IntCC::UnsignedLessThanOrEqual,
                        (GreaterThan, true) => IntCC::SignedGreaterThan,
                        (GreaterThan, false) => IntCC::UnsignedGreaterThan,
                        (_, true) => IntCC::SignedGreaterThanOrEqual,
                        (_, false) => IntCC::UnsignedGreaterThanOrEqual,
                    };
                    self.builder.ins().icmp(condition, left_value, right_value)
                };
                (value, hlang_core::types::create_bool_type_reference())
            }
            LogicalAnd => (
                self.builder.ins().band(left_value, right_value),
                hlang_core::types::create_bool_type_reference(),
            ),
            LogicalOr => (
                self.builder.ins().bor(left_value, right_value),
                hlang_core::types::create_bool_type_reference(),
            ),
            BitwiseAnd => (
                self.builder.ins().band(left_value, right_value),
                operand_type,
            ),
            BitwiseOr => (
                self.builder.ins().bor(left_value, right_value),
                operand_type,
            ),
            BitwiseXor => (
                self.builder.ins().bxor(left_value, right_value),
                operand_type,
            ),
            BitShiftLeft => (
                self.builder.ins().ishl(left_value, right_value),
                operand_type,
            ),
            BitShiftRight => {
                let value = if signed {
                    self.builder.ins().sshr(left_value, right_value)
                } else {
                    self.builder.ins().ushr(left_value, right_value)
                };
                (value, operand_type)
            }
        };

        Ok(Lowered {
            place: ValuePlace::Scalar(value),
            type_reference: result_type,
        })
    }

    fn lower_unary(
        &mut self,
        statement: &Statement,
        data: &UnaryExpression,
    ) -> CodegenResult<Lowered> {
        match data.operation {
            UnaryOperation::AddressOf => {
                let operand = self.lower_expression_at(statement, data.expression, None)?;
                let address = self.address_of(&operand)?;
                Ok(Lowered {
                    place: ValuePlace::Scalar(address),
                    type_reference: TypeReference::PointerType(PointerType {
                        element_type: Some(Box::new(operand.type_reference)),
                        is_mutable: true,
                    }),
                })
            }
            UnaryOperation::Indirection => {
                let operand = self.lower_expression_at(statement, data.expression, None)?;
                let TypeReference::PointerType(pointer) = &operand.type_reference else {
                    return Err(CodegenError::TypeMismatch(
                        "indirection on a non-pointer value".to_string(),
                    ));
                };
                let element_type = pointer.element_type.as_deref().cloned().ok_or_else(|| {
                    CodegenError::TypeMismatch("indirection through a void pointer".to_string())
                })?;
                let address = self.scalar_of(&operand)?;
                Ok(Lowered {
                    place: ValuePlace::Address(address),
                    type_reference: element_type,
                })
            }
            UnaryOperation::Not => {
                let operand = self.lower_expression_at(statement, data.expression, None)?;
                let value = self.scalar_of(&operand)?;
                let negated = self.builder.ins().bxor_imm(value, 1);
                let truncated = instructions::truncate_to_bool(&mut self.builder, negated);
                Ok(Lowered {
                    place: ValuePlace::Scalar(truncated),
                    type_reference: hlang_core::types::create_bool_type_reference(),
                })
            }
            UnaryOperation::BitwiseNot => {
                let operand = self.lower_expression_at(statement, data.expression, None)?;
                let value = self.scalar_of(&operand)?;
                let result = self.builder.ins().bnot(value);
                Ok(Lowered {
                    place: ValuePlace::Scalar(result),
                    type_reference: operand.type_reference,
                })
            }
            UnaryOperation::Minus => {
                let operand = self.lower_expression_at(statement, data.expression, None)?;
                let value = self.scalar_of(&operand)?;
                let result = if layout::is_float(&operand.type_reference) {
                    self.builder.ins().fneg(value)
                } else {
                    self.builder.ins().ineg(value)
                };
                Ok(Lowered {
                    place: ValuePlace::Scalar(result),
                    type_reference: operand.type_reference,
                })
            }
        }
    }

    fn lower_cast(
        &mut self,
        statement: &Statement,
        data: &CastExpression,
    ) -> CodegenResult<Lowered> {
        let source = self.lower_expression_at(statement, data.source, None)?;
        let source_value = self.scalar_of(&source)?;

        let source_type = layout::scalar_type(
            self.database,
            &self.core_module.name,
            &source.type_reference,
        )?;
        let destination_type = layout::scalar_type(
            self.database,
            &self.core_module.name,
            &data.destination_type,
        )?;

        let value = match data.cast_type {
            CastType::BitCast => {
                if source_type == destination_type {
                    source_value
                } else {
                    self.builder
                        .ins()
                        .bitcast(destination_type, MemFlags::new(), source_value)
                }
            }
            CastType::Numeric => {
                let source_float = layout::is_float(&source.type_reference);
                let destination_float = layout::is_float(&data.destination_type);

                match (source_float, destination_float) {
                    (false, false) => {
                        let source_bits = source_type.bits();
                        let destination_bits = destination_type.bits();
                        if destination_bits == source_bits {
                            source_value
                        } else if destination_bits < source_bits {
                            self.builder.ins().ireduce(destination_type, source_value)
                        } else if layout::is_signed(&source.type_reference) {
                            self.builder.ins().sextend(destination_type, source_value)
                        } else {
                            self.builder.ins().uextend(destination_type, source_value)
                        }
                    }
                    (false, true) => {
                        if layout::is_signed(&source.type_reference) {
                            self.builder
                                .ins()
                                .fcvt_from_sint(destination_type, source_value)
                        } else {
                            self.builder
                                .ins()
                                .fcvt_from_uint(destination_type, source_value)
                        }
                    }
                    (true, false) => {
                        if layout::is_signed(&data.destination_type) {
                            self.builder
                                .ins()
                                .fcvt_to_sint(destination_type, source_value)
                        } else {
                            self.builder
                                .ins()
                                .fcvt_to_uint(destination_type, source_value)
                        }
                    }
                    (true, true) => {
                        if destination_type.bits() > source_type.bits() {
                            self.builder.ins().fpromote(destination_type, source_value)
                        } else if destination_type.bits() < source_type.bits() {
                            self.builder.ins().fdemote(destination_type, source_value)
                        } else {
                            source_value
                        }
                    }
                }
            }
        };

        Ok(Lowered {
            place: ValuePlace::Scalar(value),
            type_reference: data.destination_type.clone(),
        })
    }

    // -----------------------------------------------------------------------
    // 常量与构造
    // -----------------------------------------------------------------------

    fn lower_constant(
        &mut self,
        data: &ConstantExpression,
        expected: Option<&TypeReference>,
    ) -> CodegenResult<Lowered> {
        if let Some(expected) = expected {
            self.check_types_match(expected, &data.type_reference, "constant")?;
        }

        let value = match &data.type_reference {
            TypeReference::IntegerType(integer_type) => {
                let parsed = parse_integer_constant(&data.data)?;
                check_integer_fits(parsed, integer_type.number_of_bits, integer_type.is_signed, &data.data)?;
                let value_type = layout::scalar_type(
                    self.database,
                    &self.core_module.name,
                    &data.type_reference,
                )?;
                self.builder.ins().iconst(value_type, parsed as i64)
            }
            TypeReference::FundamentalType(fundamental) => match fundamental {
                FundamentalType::Bool | FundamentalType::CBool => {
                    let value = match data.data.as_str() {
                        "true" | "1" => 1,
                        "false" | "0" => 0,
                        other => {
                            return Err(CodegenError::ConstantMismatch {
                                data: other.to_string(),
                                message: "expected a boolean literal".to_string(),
                            })
                        }
                    };
                    self.builder.ins().iconst(types::I8, value)
                }
                FundamentalType::Float32 => {
                    let parsed: f32 = data.data.parse().map_err(|_| {
                        CodegenError::ConstantMismatch {
                            data: data.data.clone(),
                            message: "expected a 32-bit float literal".to_string(),
                        }
                    })?;
                    self.builder.ins().f32const(parsed)
                }
                FundamentalType::Float64 => {
                    let parsed: f64 = data.data.parse().map_err(|_| {
                        CodegenError::ConstantMismatch {
                            data: data.data.clone(),
                            message: "expected a 64-bit float literal".to_string(),
                        }
                    })?;
                    self.builder.ins().f64const(parsed)
                }
                FundamentalType::String => {
                    let address = self.emit_string_constant(&data.data)?;
                    return Ok(Lowered {
                        place: ValuePlace::Scalar(address),
                        type_reference: data.type_reference.clone(),
                    });
                }
                FundamentalType::Byte
                | FundamentalType::CChar
                | FundamentalType::CSchar
                | FundamentalType::CUchar
                | FundamentalType::CShort
                | FundamentalType::CUshort
                | FundamentalType::CInt
                | FundamentalType::CUint
                | FundamentalType::CLong
                | FundamentalType::CUlong
                | FundamentalType::CLonglong
                | FundamentalType::CUlonglong => {
                    let parsed = parse_integer_constant(&data.data)?;
                    let value_type = layout::scalar_type(
                        self.database,
                        &self.core_module.name,
                        &data.type_reference,
                    )?;
                    self.builder.ins().iconst(value_type, parsed as i64)
                }
                FundamentalType::Float16 | FundamentalType::AnyType => {
                    return Err(CodegenError::UnsupportedType(format!(
                        "constants of type {fundamental:?} are not supported"
                    )))
                }
            },
            other => {
                return Err(CodegenError::ConstantMismatch {
                    data: data.data.clone(),
                    message: format!("constants of type {other:?} are not supported"),
                })
            }
        };

        Ok(Lowered {
            place: ValuePlace::Scalar(value),
            type_reference: data.type_reference.clone(),
        })
    }

    fn emit_string_constant(&mut self, contents: &str) -> CodegenResult<Value> {
        let data_id = self.backend.declare_anonymous_data(false, false)?;
        let mut description = cranelift_module::DataDescription::new();
        let mut bytes = contents.as_bytes().to_vec();
        bytes.push(0);
        description.define(bytes.into_boxed_slice());
        self.backend.define_data(data_id, &description)?;

        let global_value = self.backend.declare_data_in_func(data_id, self.builder.func);
        Ok(self
            .builder
            .ins()
            .global_value(self.pointer_type, global_value))
    }

    fn lower_constant_array(
        &mut self,
        data: &ConstantArrayExpression,
        expected: Option<&TypeReference>,
    ) -> CodegenResult<Lowered> {
        let array_type = match (&data.type_reference, expected) {
            (TypeReference::ConstantArrayType(array), _) => array.clone(),
            (_, Some(TypeReference::ConstantArrayType(array))) => array.clone(),
            _ => {
                return Err(CodegenError::TypeMismatch(
                    "constant array without an array type".to_string(),
                ))
            }
        };

        let element_type = (*array_type.value_type).clone();
        let (element_size, element_align) =
            layout::size_and_align(self.database, &self.core_module.name, &element_type)?;
        let stride = element_size.next_multiple_of(element_align.max(1));
        let total = stride * array_type.size as u32;

        let slot = instructions::create_stack_slot(&mut self.builder, total.max(1), element_align);
        let base = instructions::stack_slot_address(&mut self.builder, self.pointer_type, slot);

        if data.array_data.len() as u64 != array_type.size {
            return Err(CodegenError::TypeMismatch(format!(
                "constant array with {} elements for a type of size {}",
                data.array_data.len(),
                array_type.size
            )));
        }

        for (index, element_statement) in data.array_data.iter().enumerate() {
            let lowered = self.lower_statement_value(element_statement, Some(&element_type))?;
            let address = self
                .builder
                .ins()
                .iadd_imm(base, i64::from(stride * index as u32));
            self.store_into(address, &lowered, element_size, element_align)?;
        }

        Ok(Lowered {
            place: ValuePlace::Address(base),
            type_reference: TypeReference::ConstantArrayType(array_type),
        })
    }

    fn lower_instantiate(
        &mut self,
        data: &InstantiateExpression,
        expected: Option<&TypeReference>,
    ) -> CodegenResult<Lowered> {
        let expected = expected.ok_or_else(|| {
            CodegenError::UnsupportedExpression(
                "instantiate expression without a type context".to_string(),
            )
        })?;

        let underlying = self
            .database
            .get_underlying_type(&self.core_module.name, expected)?
            .ok_or_else(|| {
                CodegenError::TypeResolutionFailure(
                    "instantiate target resolves to nothing".to_string(),
                )
            })?;
        let TypeReference::CustomTypeReference(custom) = &underlying else {
            return Err(CodegenError::TypeMismatch(
                "instantiate target is not a struct".to_string(),
            ));
        };
        let declaration = self
            .database
            .find_declaration(&custom.module_reference.name, &custom.name)
            .ok_or_else(|| CodegenError::TypeResolutionFailure(format!(
                "unknown declaration '{}.{}'",
                custom.module_reference.name, custom.name
            )))?;
        let Declaration::Struct(struct_declaration) = declaration else {
            return Err(CodegenError::TypeMismatch(
                "instantiate target is not a struct".to_string(),
            ));
        };

        let aggregate_layout = layout::struct_layout(
            self.database,
            &custom.module_reference.name,
            &struct_declaration,
        )?;
        let slot = instructions::create_stack_slot(
            &mut self.builder,
            aggregate_layout.size.max(1),
            aggregate_layout.align,
        );
        let base = instructions::stack_slot_address(&mut self.builder, self.pointer_type, slot);

        if data.instantiate_type == InstantiateExpressionType::Explicit {
            for member_name in &struct_declaration.member_names {
                if !data.members.iter().any(|pair| &pair.member_name == member_name) {
                    return Err(CodegenError::TypeMismatch(format!(
                        "explicit instantiate is missing member '{member_name}'"
                    )));
                }
            }
        }
        for pair in &data.members {
            if !struct_declaration.member_names.contains(&pair.member_name) {
                return Err(CodegenError::TypeMismatch(format!(
                    "struct '{}' has no member '{}'",
                    struct_declaration.name, pair.member_name
                )));
            }
        }

        for (index, member_name) in struct_declaration.member_names.iter().enumerate() {
            let member_type = hlang_core::types::fix_custom_type_reference(
                struct_declaration.member_types[index].clone(),
                &custom.module_reference.name,
            );
            let (member_size, member_align) =
                layout::size_and_align(self.database, &self.core_module.name, &member_type)?;

            let value_statement = data
                .members
                .iter()
                .find(|pair| &pair.member_name == member_name)
                .map(|pair| &pair.value)
                .or_else(|| struct_declaration.member_default_values.get(index));

            let Some(value_statement) = value_statement else {
                return Err(CodegenError::TypeMismatch(format!(
                    "no value or default for member '{member_name}'"
                )));
            };

            let lowered = self.lower_statement_value(value_statement, Some(&member_type))?;
            let address = self
                .builder
                .ins()
                .iadd_imm(base, i64::from(aggregate_layout.member_offsets[index]));
            self.store_into(address, &lowered, member_size, member_align)?;
        }

        Ok(Lowered {
            place: ValuePlace::Address(base),
            type_reference: expected.clone(),
        })
    }

    /// 嵌套语句作为值（实例化成员、数组元素、条件等）
    fn lower_statement_value(
        &mut self,
        statement: &Statement,
        expected: Option<&TypeReference>,
    ) -> CodegenResult<Lowered> {
        let root = statement.root_expression().ok_or_else(|| {
            CodegenError::UnsupportedExpression("empty value statement".to_string())
        })?;
        self.lower_expression(statement, root, expected)
    }

    // -----------------------------------------------------------------------
    // 值搬运
    // -----------------------------------------------------------------------

    /// 取标量值；地址处的标量按 ABI 对齐加载
    fn scalar_of(&mut self, lowered: &Lowered) -> CodegenResult<Value> {
        match lowered.place {
            ValuePlace::Scalar(value) => Ok(value),
            ValuePlace::Address(address) => {
                let value_type = layout::scalar_type(
                    self.database,
                    &self.core_module.name,
                    &lowered.type_reference,
                )?;
                Ok(instructions::create_load(
                    &mut self.builder,
                    value_type,
                    address,
                    0,
                ))
            }
        }
    }

    fn address_of(&mut self, lowered: &Lowered) -> CodegenResult<Value> {
        match lowered.place {
            ValuePlace::Address(address) => Ok(address),
            ValuePlace::Scalar(_) => Err(CodegenError::TypeMismatch(
                "cannot take the address of a temporary".to_string(),
            )),
        }
    }

    fn store_into(
        &mut self,
        destination: Value,
        value: &Lowered,
        size: u32,
        align: u32,
    ) -> CodegenResult<()> {
        match layout::lower_type(self.database, &self.core_module.name, &value.type_reference)? {
            LoweredType::Scalar(_) => {
                let mut scalar = self.scalar_of(value)?;
                if matches!(
                    value.type_reference,
                    TypeReference::FundamentalType(FundamentalType::CBool)
                ) {
                    scalar = instructions::truncate_to_bool(&mut self.builder, scalar);
                }
                instructions::create_store(&mut self.builder, scalar, destination, 0);
            }
            LoweredType::Aggregate(_) => {
                let source = self.address_of(value)?;
                instructions::emit_memory_copy(
                    self.backend,
                    &mut self.builder,
                    destination,
                    source,
                    size,
                    align,
                );
            }
        }
        Ok(())
    }

    /// 结构等价检查：双方各自解析底层类型后比较
    fn check_types_match(
        &self,
        expected: &TypeReference,
        found: &TypeReference,
        context: &str,
    ) -> CodegenResult<()> {
        if expected == found {
            return Ok(());
        }

        let resolved_expected = self
            .database
            .get_underlying_type(&self.core_module.name, expected)?;
        let resolved_found = self
            .database
            .get_underlying_type(&self.core_module.name, found)?;

        match (resolved_expected, resolved_found) {
            (Some(left), Some(right)) if left == right => Ok(()),
            _ => Err(CodegenError::TypeMismatch(format!(
                "{context}: expected {expected:?}, found {found:?}"
            ))),
        }
    }
}

fn member_index(member_names: &[String], member_name: &str) -> Option<usize> {
    member_names.iter().position(|name| name == member_name)
}

/// 解析整型字面量（十进制，可带符号或 0x 前缀）
fn parse_integer_constant(data: &str) -> CodegenResult<i128> {
    let parsed = if let Some(hex) = data.strip_prefix("0x").or_else(|| data.strip_prefix("0X")) {
        i128::from_str_radix(hex, 16)
    } else if let Some(hex) = data.strip_prefix("-0x").or_else(|| data.strip_prefix("-0X")) {
        i128::from_str_radix(hex, 16).map(|value| -value)
    } else {
        data.parse::<i128>()
    };

    parsed.map_err(|_| CodegenError::ConstantMismatch {
        data: data.to_string(),
        message: "expected an integer literal".to_string(),
    })
}

/// 常量位宽与声明精度必须一致
fn check_integer_fits(
    value: i128,
    number_of_bits: u32,
    is_signed: bool,
    data: &str,
) -> CodegenResult<()> {
    let fits = if is_signed {
        let min = -(1i128 << (number_of_bits - 1));
        let max = (1i128 << (number_of_bits - 1)) - 1;
        value >= min && value <= max
    } else {
        value >= 0 && value < (1i128 << number_of_bits)
    };

    if fits {
        Ok(())
    } else {
        Err(CodegenError::ConstantMismatch {
            data: data.to_string(),
            message: format!(
                "value does not fit in {number_of_bits}-bit {} integer",
                if is_signed { "signed" } else { "unsigned" }
            ),
        })
    }
}

/// 枚举成员的整数值：缺省从 0 递增，显式常量重置计数
pub fn enum_member_value(declaration: &EnumDeclaration, member_name: &str) -> CodegenResult<i64> {
    let mut current: i64 = 0;
    for value in &declaration.values {
        if let Some(statement) = &value.value {
            if let Some(expression) = statement.root_expression() {
                if let ExpressionData::ConstantExpression(constant) = &expression.data {
                    current = parse_integer_constant(&constant.data)? as i64;
                }
            }
        }
        if value.name == member_name {
            return Ok(current);
        }
        current += 1;
    }

    Err(CodegenError::TypeMismatch(format!(
        "enum '{}' has no member '{member_name}'",
        declaration.name
    )))
}

/// 供驱动使用的辅助：结构体声明按名查成员下标
pub fn struct_member_index(declaration: &StructDeclaration, member_name: &str) -> Option<usize> {
    member_index(&declaration.member_names, member_name)
}
