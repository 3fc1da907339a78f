//! 导出接口哈希
//!
//! 对模块的每个导出声明计算 `名字 → 64 位摘要`。同一接口的两次
//! 编译必须得到相同映射；语句内表达式列表的重排不是无害编辑
//! （下标即语义），因此会改变摘要。
//!
//! 馈入顺序是规范化的：标签字节在前，字段按声明顺序，标量按
//! 小端字节序。表达式从语句的第 0 个（根）开始，嵌套的
//! `ExpressionIndex` 递归访问被引用表达式。

use std::collections::HashMap;
use std::hash::Hasher;

use twox_hash::XxHash64;

use hlang_core::declarations::{
    AliasTypeDeclaration, EnumDeclaration, FunctionDeclaration, GlobalVariableDeclaration,
    Linkage, StructDeclaration, UnionDeclaration,
};
use hlang_core::expressions::{Expression, ExpressionData, ExpressionIndex, Statement};
use hlang_core::module::Module;
use hlang_core::types::{FunctionType, TypeReference};

/// 一个模块导出接口的指纹映射
pub type SymbolNameToHash = HashMap<String, u64>;

/// 64 位流式哈希，种子固定为 0
struct InterfaceHasher {
    state: XxHash64,
}

impl InterfaceHasher {
    fn new() -> Self {
        Self {
            state: XxHash64::with_seed(0),
        }
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        self.state.write(bytes);
    }

    fn write_str(&mut self, value: &str) {
        self.state.write(value.as_bytes());
    }

    fn write_optional_str(&mut self, value: Option<&str>) {
        if let Some(value) = value {
            self.write_str(value);
        }
    }

    fn write_tag(&mut self, tag: u8) {
        self.write_bytes(&[tag]);
    }

    fn write_bool(&mut self, value: bool) {
        self.write_bytes(&[u8::from(value)]);
    }

    fn write_u32(&mut self, value: u32) {
        self.write_bytes(&value.to_le_bytes());
    }

    fn write_u64(&mut self, value: u64) {
        self.write_bytes(&value.to_le_bytes());
    }

    fn finish(&self) -> u64 {
        self.state.finish()
    }
}

fn update_type_reference(hasher: &mut InterfaceHasher, type_reference: &TypeReference) {
    match type_reference {
        TypeReference::BuiltinTypeReference(data) => {
            hasher.write_tag(0);
            hasher.write_str(&data.value);
        }
        TypeReference::ConstantArrayType(data) => {
            hasher.write_tag(1);
            update_type_reference(hasher, &data.value_type);
            hasher.write_u64(data.size);
        }
        TypeReference::CustomTypeReference(data) => {
            hasher.write_tag(2);
            hasher.write_str(&data.module_reference.name);
            hasher.write_str(&data.name);
        }
        TypeReference::FundamentalType(data) => {
            hasher.write_tag(3);
            hasher.write_u32(*data as u32);
        }
        TypeReference::FunctionType(data) => {
            hasher.write_tag(4);
            update_function_type(hasher, data);
        }
        TypeReference::IntegerType(data) => {
            hasher.write_tag(5);
            hasher.write_u32(data.number_of_bits);
            hasher.write_bool(data.is_signed);
        }
        TypeReference::ParameterType(data) => {
            hasher.write_tag(6);
            hasher.write_str(&data.name);
        }
        TypeReference::PointerType(data) => {
            hasher.write_tag(7);
            if let Some(element_type) = &data.element_type {
                update_type_reference(hasher, element_type);
            }
            hasher.write_bool(data.is_mutable);
        }
        TypeReference::TypeInstance(data) => {
            hasher.write_tag(8);
            hasher.write_str(&data.type_constructor.module_reference.name);
            hasher.write_str(&data.type_constructor.name);
            for statement in &data.arguments {
                update_statement(hasher, statement);
            }
        }
    }
}

fn update_function_type(hasher: &mut InterfaceHasher, function_type: &FunctionType) {
    for parameter_type in &function_type.input_parameter_types {
        update_type_reference(hasher, parameter_type);
    }
    for parameter_type in &function_type.output_parameter_types {
        update_type_reference(hasher, parameter_type);
    }
    hasher.write_bool(function_type.is_variadic);
}

fn update_statement_expression(
    hasher: &mut InterfaceHasher,
    statement: &Statement,
    index: ExpressionIndex,
) {
    if let Some(expression) = statement.expression_at(index) {
        update_expression(hasher, statement, expression);
    }
}

fn update_expression(
    hasher: &mut InterfaceHasher,
    statement: &Statement,
    expression: &Expression,
) {
    match &expression.data {
        ExpressionData::AccessExpression(data) => {
            hasher.write_tag(0);
            update_statement_expression(hasher, statement, data.expression);
            hasher.write_str(&data.member_name);
            hasher.write_u32(data.access_type as u32);
        }
        ExpressionData::AssignmentExpression(data) => {
            hasher.write_tag(1);
            update_statement_expression(hasher, statement, data.left_hand_side);
            update_statement_expression(hasher, statement, data.right_hand_side);
            if let Some(operation) = data.additional_operation {
                hasher.write_u32(operation as u32);
            }
        }
        ExpressionData::BinaryExpression(data) => {
            hasher.write_tag(2);
            update_statement_expression(hasher, statement, data.left_hand_side);
            update_statement_expression(hasher, statement, data.right_hand_side);
            hasher.write_u32(data.operation as u32);
        }
        ExpressionData::BlockExpression(data) => {
            hasher.write_tag(3);
            for nested in &data.statements {
                update_statement(hasher, nested);
            }
        }
        ExpressionData::CallExpression(data) => {
            hasher.write_tag(4);
            update_statement_expression(hasher, statement, data.expression);
            for argument in &data.arguments {
                update_statement_expression(hasher, statement, *argument);
            }
        }
        ExpressionData::CastExpression(data) => {
            hasher.write_tag(5);
            update_statement_expression(hasher, statement, data.source);
            update_type_reference(hasher, &data.destination_type);
            hasher.write_u32(data.cast_type as u32);
        }
        ExpressionData::ConstantExpression(data) => {
            hasher.write_tag(6);
            update_type_reference(hasher, &data.type_reference);
            hasher.write_str(&data.data);
        }
        ExpressionData::ConstantArrayExpression(data) => {
            hasher.write_tag(7);
            update_type_reference(hasher, &data.type_reference);
            for nested in &data.array_data {
                update_statement(hasher, nested);
            }
        }
        ExpressionData::EnumExpression(data) => {
            hasher.write_tag(8);
            hasher.write_str(&data.declaration.name);
        }
        ExpressionData::IfExpression(data) => {
            hasher.write_tag(9);
            update_statement(hasher, &data.condition);
            for nested in &data.then_statements {
                update_statement(hasher, nested);
            }
            for nested in &data.else_statements {
                update_statement(hasher, nested);
            }
        }
        ExpressionData::InstantiateExpression(data) => {
            hasher.write_tag(10);
            hasher.write_u32(data.instantiate_type as u32);
            for pair in &data.members {
                hasher.write_str(&pair.member_name);
                update_statement(hasher, &pair.value);
            }
        }
        ExpressionData::NullPointerExpression(_) => {
            hasher.write_tag(11);
        }
        ExpressionData::ParenthesisExpression(data) => {
            hasher.write_tag(12);
            update_statement_expression(hasher, statement, data.expression);
        }
        ExpressionData::ReturnExpression(data) => {
            hasher.write_tag(13);
            if let Some(index) = data.expression {
                update_statement_expression(hasher, statement, index);
            }
        }
        ExpressionData::StructExpression(data) => {
            hasher.write_tag(14);
            hasher.write_str(&data.declaration.name);
        }
        ExpressionData::TypeExpression(data) => {
            hasher.write_tag(15);
            update_type_reference(hasher, &data.type_reference);
        }
        ExpressionData::UnaryExpression(data) => {
            hasher.write_tag(16);
            update_statement_expression(hasher, statement, data.expression);
            hasher.write_u32(data.operation as u32);
        }
        ExpressionData::UnionExpression(data) => {
            hasher.write_tag(17);
            hasher.write_str(&data.declaration.name);
        }
        ExpressionData::VariableExpression(data) => {
            hasher.write_tag(18);
            hasher.write_str(&data.name);
            hasher.write_u32(data.access_type as u32);
        }
        ExpressionData::VariableDeclarationExpression(data) => {
            hasher.write_tag(19);
            hasher.write_str(&data.name);
            hasher.write_bool(data.is_mutable);
            update_statement_expression(hasher, statement, data.right_hand_side);
        }
        ExpressionData::WhileLoopExpression(data) => {
            hasher.write_tag(20);
            update_statement(hasher, &data.condition);
            for nested in &data.then_statements {
                update_statement(hasher, nested);
            }
        }
    }
}

/// 从根表达式开始馈入一条语句
fn update_statement(hasher: &mut InterfaceHasher, statement: &Statement) {
    if let Some(root) = statement.root_expression() {
        update_expression(hasher, statement, root);
    }
}

fn update_linkage(hasher: &mut InterfaceHasher, linkage: Linkage) {
    hasher.write_u32(linkage as u32);
}

pub fn hash_struct_declaration(declaration: &StructDeclaration) -> u64 {
    let mut hasher = InterfaceHasher::new();

    hasher.write_str(&declaration.name);
    hasher.write_optional_str(declaration.unique_name.as_deref());

    for member_type in &declaration.member_types {
        update_type_reference(&mut hasher, member_type);
    }
    // member_names 的插入顺序参与哈希：成员重排必须改变摘要
    for member_name in &declaration.member_names {
        hasher.write_str(member_name);
    }
    for member_default_value in &declaration.member_default_values {
        update_statement(&mut hasher, member_default_value);
    }

    hasher.write_bool(declaration.is_packed);
    hasher.write_bool(declaration.is_literal);

    hasher.finish()
}

pub fn hash_union_declaration(declaration: &UnionDeclaration) -> u64 {
    let mut hasher = InterfaceHasher::new();

    hasher.write_str(&declaration.name);
    hasher.write_optional_str(declaration.unique_name.as_deref());
    for member_type in &declaration.member_types {
        update_type_reference(&mut hasher, member_type);
    }
    for member_name in &declaration.member_names {
        hasher.write_str(member_name);
    }

    hasher.finish()
}

pub fn hash_enum_declaration(declaration: &EnumDeclaration) -> u64 {
    let mut hasher = InterfaceHasher::new();

    hasher.write_str(&declaration.name);
    hasher.write_optional_str(declaration.unique_name.as_deref());
    for value in &declaration.values {
        hasher.write_str(&value.name);
        if let Some(statement) = &value.value {
            update_statement(&mut hasher, statement);
        }
    }

    hasher.finish()
}

pub fn hash_alias_declaration(declaration: &AliasTypeDeclaration) -> u64 {
    let mut hasher = InterfaceHasher::new();

    hasher.write_str(&declaration.name);
    hasher.write_optional_str(declaration.unique_name.as_deref());
    if let Some(aliased_type) = &declaration.aliased_type {
        update_type_reference(&mut hasher, aliased_type);
    }

    hasher.finish()
}

/// 函数声明的指纹只覆盖签名形状，绝不覆盖函数体
pub fn hash_function_declaration(declaration: &FunctionDeclaration) -> u64 {
    let mut hasher = InterfaceHasher::new();

    hasher.write_str(&declaration.name);
    hasher.write_optional_str(declaration.unique_name.as_deref());
    update_function_type(&mut hasher, &declaration.function_type);
    for parameter_name in &declaration.input_parameter_names {
        hasher.write_str(parameter_name);
    }
    for parameter_name in &declaration.output_parameter_names {
        hasher.write_str(parameter_name);
    }
    update_linkage(&mut hasher, declaration.linkage);

    hasher.finish()
}

pub fn hash_global_variable_declaration(declaration: &GlobalVariableDeclaration) -> u64 {
    let mut hasher = InterfaceHasher::new();

    hasher.write_str(&declaration.name);
    hasher.write_optional_str(declaration.unique_name.as_deref());
    if let Some(type_reference) = &declaration.type_reference {
        update_type_reference(&mut hasher, type_reference);
    }
    update_statement(&mut hasher, &declaration.initial_value);
    hasher.write_bool(declaration.is_mutable);
    update_linkage(&mut hasher, declaration.linkage);

    hasher.finish()
}

/// 为模块的每个导出声明计算指纹
pub fn hash_export_interface(module: &Module) -> SymbolNameToHash {
    let exports = &module.export_declarations;
    let mut map = SymbolNameToHash::with_capacity(
        exports.alias_type_declarations.len()
            + exports.enum_declarations.len()
            + exports.global_variable_declarations.len()
            + exports.struct_declarations.len()
            + exports.union_declarations.len()
            + exports.function_declarations.len(),
    );

    for declaration in &exports.alias_type_declarations {
        map.insert(declaration.name.clone(), hash_alias_declaration(declaration));
    }
    for declaration in &exports.enum_declarations {
        map.insert(declaration.name.clone(), hash_enum_declaration(declaration));
    }
    for declaration in &exports.global_variable_declarations {
        map.insert(
            declaration.name.clone(),
            hash_global_variable_declaration(declaration),
        );
    }
    for declaration in &exports.struct_declarations {
        map.insert(declaration.name.clone(), hash_struct_declaration(declaration));
    }
    for declaration in &exports.union_declarations {
        map.insert(declaration.name.clone(), hash_union_declaration(declaration));
    }
    for declaration in &exports.function_declarations {
        map.insert(
            declaration.name.clone(),
            hash_function_declaration(declaration),
        );
    }

    map
}
