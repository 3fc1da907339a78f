//! IR 访问器
//!
//! 遍历模块或声明内的所有 `TypeReference` 与 `Expression`。
//! 回调返回 `true` 表示停止遍历。可变变体支撑 IR 编辑与
//! 泛型参数替换。

use std::collections::HashMap;

use crate::declarations::{
    AliasTypeDeclaration, EnumDeclaration, FunctionDeclaration, FunctionDefinition,
    GlobalVariableDeclaration, StructDeclaration, UnionDeclaration,
};
use crate::expressions::{Expression, ExpressionData, Statement};
use crate::module::{Module, ModuleDeclarations};
use crate::types::{FunctionType, TypeReference};

// ---------------------------------------------------------------------------
// 类型引用遍历（只读）
// ---------------------------------------------------------------------------

pub fn visit_type_references_in_type_reference(
    type_reference: &TypeReference,
    process: &mut dyn FnMut(&TypeReference) -> bool,
) -> bool {
    if process(type_reference) {
        return true;
    }

    match type_reference {
        TypeReference::ConstantArrayType(data) => {
            visit_type_references_in_type_reference(&data.value_type, process)
        }
        TypeReference::PointerType(data) => match &data.element_type {
            Some(element_type) => visit_type_references_in_type_reference(element_type, process),
            None => false,
        },
        TypeReference::FunctionType(data) => visit_type_references_in_function_type(data, process),
        TypeReference::TypeInstance(data) => data
            .arguments
            .iter()
            .any(|statement| visit_type_references_in_statement(statement, process)),
        _ => false,
    }
}

fn visit_type_references_in_function_type(
    function_type: &FunctionType,
    process: &mut dyn FnMut(&TypeReference) -> bool,
) -> bool {
    function_type
        .input_parameter_types
        .iter()
        .chain(function_type.output_parameter_types.iter())
        .any(|type_reference| visit_type_references_in_type_reference(type_reference, process))
}

pub fn visit_type_references_in_statement(
    statement: &Statement,
    process: &mut dyn FnMut(&TypeReference) -> bool,
) -> bool {
    statement
        .expressions
        .iter()
        .any(|expression| visit_type_references_in_expression(expression, process))
}

pub fn visit_type_references_in_expression(
    expression: &Expression,
    process: &mut dyn FnMut(&TypeReference) -> bool,
) -> bool {
    match &expression.data {
        ExpressionData::BlockExpression(data) => data
            .statements
            .iter()
            .any(|statement| visit_type_references_in_statement(statement, process)),
        ExpressionData::CastExpression(data) => {
            visit_type_references_in_type_reference(&data.destination_type, process)
        }
        ExpressionData::ConstantExpression(data) => {
            visit_type_references_in_type_reference(&data.type_reference, process)
        }
        ExpressionData::ConstantArrayExpression(data) => {
            visit_type_references_in_type_reference(&data.type_reference, process)
                || data
                    .array_data
                    .iter()
                    .any(|statement| visit_type_references_in_statement(statement, process))
        }
        ExpressionData::EnumExpression(data) => {
            visit_type_references_in_enum_declaration(&data.declaration, process)
        }
        ExpressionData::IfExpression(data) => {
            visit_type_references_in_statement(&data.condition, process)
                || data
                    .then_statements
                    .iter()
                    .chain(data.else_statements.iter())
                    .any(|statement| visit_type_references_in_statement(statement, process))
        }
        ExpressionData::InstantiateExpression(data) => data
            .members
            .iter()
            .any(|pair| visit_type_references_in_statement(&pair.value, process)),
        ExpressionData::StructExpression(data) => {
            visit_type_references_in_struct_declaration(&data.declaration, process)
        }
        ExpressionData::TypeExpression(data) => {
            visit_type_references_in_type_reference(&data.type_reference, process)
        }
        ExpressionData::UnionExpression(data) => {
            visit_type_references_in_union_declaration(&data.declaration, process)
        }
        ExpressionData::WhileLoopExpression(data) => {
            visit_type_references_in_statement(&data.condition, process)
                || data
                    .then_statements
                    .iter()
                    .any(|statement| visit_type_references_in_statement(statement, process))
        }
        _ => false,
    }
}

pub fn visit_type_references_in_alias_declaration(
    declaration: &AliasTypeDeclaration,
    process: &mut dyn FnMut(&TypeReference) -> bool,
) -> bool {
    match &declaration.aliased_type {
        Some(type_reference) => visit_type_references_in_type_reference(type_reference, process),
        None => false,
    }
}

pub fn visit_type_references_in_enum_declaration(
    declaration: &EnumDeclaration,
    process: &mut dyn FnMut(&TypeReference) -> bool,
) -> bool {
    declaration.values.iter().any(|value| {
        value
            .value
            .as_ref()
            .is_some_and(|statement| visit_type_references_in_statement(statement, process))
    })
}

pub fn visit_type_references_in_struct_declaration(
    declaration: &StructDeclaration,
    process: &mut dyn FnMut(&TypeReference) -> bool,
) -> bool {
    declaration
        .member_types
        .iter()
        .any(|type_reference| visit_type_references_in_type_reference(type_reference, process))
        || declaration
            .member_default_values
            .iter()
            .any(|statement| visit_type_references_in_statement(statement, process))
}

pub fn visit_type_references_in_union_declaration(
    declaration: &UnionDeclaration,
    process: &mut dyn FnMut(&TypeReference) -> bool,
) -> bool {
    declaration
        .member_types
        .iter()
        .any(|type_reference| visit_type_references_in_type_reference(type_reference, process))
}

pub fn visit_type_references_in_function_declaration(
    declaration: &FunctionDeclaration,
    process: &mut dyn FnMut(&TypeReference) -> bool,
) -> bool {
    visit_type_references_in_function_type(&declaration.function_type, process)
}

pub fn visit_type_references_in_global_variable_declaration(
    declaration: &GlobalVariableDeclaration,
    process: &mut dyn FnMut(&TypeReference) -> bool,
) -> bool {
    declaration
        .type_reference
        .as_ref()
        .is_some_and(|type_reference| {
            visit_type_references_in_type_reference(type_reference, process)
        })
        || visit_type_references_in_statement(&declaration.initial_value, process)
}

pub fn visit_type_references_in_function_definition(
    definition: &FunctionDefinition,
    process: &mut dyn FnMut(&TypeReference) -> bool,
) -> bool {
    definition
        .statements
        .iter()
        .any(|statement| visit_type_references_in_statement(statement, process))
}

pub fn visit_type_references_in_module_declarations(
    declarations: &ModuleDeclarations,
    process: &mut dyn FnMut(&TypeReference) -> bool,
) -> bool {
    declarations
        .alias_type_declarations
        .iter()
        .any(|declaration| visit_type_references_in_alias_declaration(declaration, process))
        || declarations
            .enum_declarations
            .iter()
            .any(|declaration| visit_type_references_in_enum_declaration(declaration, process))
        || declarations
            .global_variable_declarations
            .iter()
            .any(|declaration| {
                visit_type_references_in_global_variable_declaration(declaration, process)
            })
        || declarations
            .struct_declarations
            .iter()
            .any(|declaration| visit_type_references_in_struct_declaration(declaration, process))
        || declarations
            .union_declarations
            .iter()
            .any(|declaration| visit_type_references_in_union_declaration(declaration, process))
        || declarations
            .function_declarations
            .iter()
            .any(|declaration| visit_type_references_in_function_declaration(declaration, process))
}

pub fn visit_type_references_in_module(
    module: &Module,
    process: &mut dyn FnMut(&TypeReference) -> bool,
) -> bool {
    visit_type_references_in_module_declarations(&module.export_declarations, process)
        || visit_type_references_in_module_declarations(&module.internal_declarations, process)
        || module
            .definitions
            .function_definitions
            .iter()
            .any(|definition| visit_type_references_in_function_definition(definition, process))
}

// ---------------------------------------------------------------------------
// 类型引用遍历（可变，IR 编辑与泛型替换使用）
// ---------------------------------------------------------------------------

pub fn visit_type_references_mut_in_type_reference(
    type_reference: &mut TypeReference,
    process: &mut dyn FnMut(&mut TypeReference),
) {
    process(type_reference);

    match type_reference {
        TypeReference::ConstantArrayType(data) => {
            visit_type_references_mut_in_type_reference(&mut data.value_type, process);
        }
        TypeReference::PointerType(data) => {
            if let Some(element_type) = &mut data.element_type {
                visit_type_references_mut_in_type_reference(element_type, process);
            }
        }
        TypeReference::FunctionType(data) => {
            for parameter_type in data
                .input_parameter_types
                .iter_mut()
                .chain(data.output_parameter_types.iter_mut())
            {
                visit_type_references_mut_in_type_reference(parameter_type, process);
            }
        }
        TypeReference::TypeInstance(data) => {
            for statement in &mut data.arguments {
                visit_type_references_mut_in_statement(statement, process);
            }
        }
        _ => {}
    }
}

pub fn visit_type_references_mut_in_statement(
    statement: &mut Statement,
    process: &mut dyn FnMut(&mut TypeReference),
) {
    for expression in &mut statement.expressions {
        visit_type_references_mut_in_expression(expression, process);
    }
}

pub fn visit_type_references_mut_in_expression(
    expression: &mut Expression,
    process: &mut dyn FnMut(&mut TypeReference),
) {
    match &mut expression.data {
        ExpressionData::BlockExpression(data) => {
            for statement in &mut data.statements {
                visit_type_references_mut_in_statement(statement, process);
            }
        }
        ExpressionData::CastExpression(data) => {
            visit_type_references_mut_in_type_reference(&mut data.destination_type, process);
        }
        ExpressionData::ConstantExpression(data) => {
            visit_type_references_mut_in_type_reference(&mut data.type_reference, process);
        }
        ExpressionData::ConstantArrayExpression(data) => {
            visit_type_references_mut_in_type_reference(&mut data.type_reference, process);
            for statement in &mut data.array_data {
                visit_type_references_mut_in_statement(statement, process);
            }
        }
        ExpressionData::IfExpression(data) => {
            visit_type_references_mut_in_statement(&mut data.condition, process);
            for statement in data
                .then_statements
                .iter_mut()
                .chain(data.else_statements.iter_mut())
            {
                visit_type_references_mut_in_statement(statement, process);
            }
        }
        ExpressionData::InstantiateExpression(data) => {
            for pair in &mut data.members {
                visit_type_references_mut_in_statement(&mut pair.value, process);
            }
        }
        ExpressionData::StructExpression(data) => {
            visit_type_references_mut_in_struct_declaration(&mut data.declaration, process);
        }
        ExpressionData::TypeExpression(data) => {
            visit_type_references_mut_in_type_reference(&mut data.type_reference, process);
        }
        ExpressionData::WhileLoopExpression(data) => {
            visit_type_references_mut_in_statement(&mut data.condition, process);
            for statement in &mut data.then_statements {
                visit_type_references_mut_in_statement(statement, process);
            }
        }
        _ => {}
    }
}

pub fn visit_type_references_mut_in_struct_declaration(
    declaration: &mut StructDeclaration,
    process: &mut dyn FnMut(&mut TypeReference),
) {
    for member_type in &mut declaration.member_types {
        visit_type_references_mut_in_type_reference(member_type, process);
    }
    for statement in &mut declaration.member_default_values {
        visit_type_references_mut_in_statement(statement, process);
    }
}

pub fn visit_type_references_mut_in_function_declaration(
    declaration: &mut FunctionDeclaration,
    process: &mut dyn FnMut(&mut TypeReference),
) {
    for parameter_type in declaration
        .function_type
        .input_parameter_types
        .iter_mut()
        .chain(declaration.function_type.output_parameter_types.iter_mut())
    {
        visit_type_references_mut_in_type_reference(parameter_type, process);
    }
}

pub fn visit_type_references_mut_in_function_definition(
    definition: &mut FunctionDefinition,
    process: &mut dyn FnMut(&mut TypeReference),
) {
    for statement in &mut definition.statements {
        visit_type_references_mut_in_statement(statement, process);
    }
}

// ---------------------------------------------------------------------------
// 表达式遍历
// ---------------------------------------------------------------------------

/// 遍历语句内全部表达式（含嵌套语句），回调收到所属语句与表达式
pub fn visit_expressions_in_statement(
    statement: &Statement,
    process: &mut dyn FnMut(&Statement, &Expression) -> bool,
) -> bool {
    for expression in &statement.expressions {
        if process(statement, expression) {
            return true;
        }

        let nested_stopped = match &expression.data {
            ExpressionData::BlockExpression(data) => data
                .statements
                .iter()
                .any(|nested| visit_expressions_in_statement(nested, process)),
            ExpressionData::ConstantArrayExpression(data) => data
                .array_data
                .iter()
                .any(|nested| visit_expressions_in_statement(nested, process)),
            ExpressionData::IfExpression(data) => {
                visit_expressions_in_statement(&data.condition, process)
                    || data
                        .then_statements
                        .iter()
                        .chain(data.else_statements.iter())
                        .any(|nested| visit_expressions_in_statement(nested, process))
            }
            ExpressionData::InstantiateExpression(data) => data
                .members
                .iter()
                .any(|pair| visit_expressions_in_statement(&pair.value, process)),
            ExpressionData::WhileLoopExpression(data) => {
                visit_expressions_in_statement(&data.condition, process)
                    || data
                        .then_statements
                        .iter()
                        .any(|nested| visit_expressions_in_statement(nested, process))
            }
            _ => false,
        };
        if nested_stopped {
            return true;
        }
    }
    false
}

pub fn visit_expressions_in_function_definition(
    definition: &FunctionDefinition,
    process: &mut dyn FnMut(&Statement, &Expression) -> bool,
) -> bool {
    definition
        .statements
        .iter()
        .any(|statement| visit_expressions_in_statement(statement, process))
}

pub fn visit_expressions_in_module(
    module: &Module,
    process: &mut dyn FnMut(&Statement, &Expression) -> bool,
) -> bool {
    module
        .definitions
        .function_definitions
        .iter()
        .any(|definition| visit_expressions_in_function_definition(definition, process))
}

// ---------------------------------------------------------------------------
// 泛型参数替换
// ---------------------------------------------------------------------------

fn substitute(type_reference: &mut TypeReference, arguments: &HashMap<String, TypeReference>) {
    if let TypeReference::ParameterType(parameter) = type_reference {
        if let Some(replacement) = arguments.get(&parameter.name) {
            *type_reference = replacement.clone();
        }
    }
}

/// 将结构体声明中的 `ParameterType` 替换为实例实参
pub fn substitute_parameter_types_in_struct_declaration(
    declaration: &mut StructDeclaration,
    arguments: &HashMap<String, TypeReference>,
) {
    visit_type_references_mut_in_struct_declaration(declaration, &mut |type_reference| {
        substitute(type_reference, arguments);
    });
}

pub fn substitute_parameter_types_in_function_declaration(
    declaration: &mut FunctionDeclaration,
    arguments: &HashMap<String, TypeReference>,
) {
    visit_type_references_mut_in_function_declaration(declaration, &mut |type_reference| {
        substitute(type_reference, arguments);
    });
}

pub fn substitute_parameter_types_in_function_definition(
    definition: &mut FunctionDefinition,
    arguments: &HashMap<String, TypeReference>,
) {
    visit_type_references_mut_in_function_definition(definition, &mut |type_reference| {
        substitute(type_reference, arguments);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declarations::Linkage;
    use crate::expressions::{create_constant_expression, create_statement};
    use crate::types::{
        create_integer_type_type_reference, create_pointer_type_type_reference, ParameterType,
    };

    fn generic_struct() -> StructDeclaration {
        StructDeclaration {
            name: "Box".to_string(),
            unique_name: None,
            member_types: vec![
                TypeReference::ParameterType(ParameterType {
                    name: "T".to_string(),
                }),
                create_pointer_type_type_reference(
                    Some(TypeReference::ParameterType(ParameterType {
                        name: "T".to_string(),
                    })),
                    true,
                ),
            ],
            member_names: vec!["value".to_string(), "pointer".to_string()],
            member_default_values: vec![],
            is_packed: false,
            is_literal: false,
            linkage: Linkage::External,
            member_source_positions: None,
            source_location: None,
        }
    }

    #[test]
    fn test_visit_counts_nested_type_references() {
        let declaration = generic_struct();
        let mut count = 0;
        visit_type_references_in_struct_declaration(&declaration, &mut |_| {
            count += 1;
            false
        });
        // T、*T 与其元素类型 T，共 3 个
        assert_eq!(count, 3);
    }

    #[test]
    fn test_visit_stops_early() {
        let declaration = generic_struct();
        let mut count = 0;
        let stopped = visit_type_references_in_struct_declaration(&declaration, &mut |_| {
            count += 1;
            true
        });
        assert!(stopped);
        assert_eq!(count, 1);
    }

    #[test]
    fn test_substitute_parameter_types() {
        let mut declaration = generic_struct();
        let mut arguments = HashMap::new();
        arguments.insert("T".to_string(), create_integer_type_type_reference(32, true));

        substitute_parameter_types_in_struct_declaration(&mut declaration, &arguments);

        assert_eq!(
            declaration.member_types[0],
            create_integer_type_type_reference(32, true)
        );
        match &declaration.member_types[1] {
            TypeReference::PointerType(pointer) => {
                assert_eq!(
                    pointer.element_type.as_deref(),
                    Some(&create_integer_type_type_reference(32, true))
                );
            }
            other => panic!("unexpected type: {other:?}"),
        }
    }

    #[test]
    fn test_visit_expressions_in_statement_visits_nested() {
        let inner = create_statement(vec![create_constant_expression(
            create_integer_type_type_reference(32, true),
            "1",
        )]);
        let statement = create_statement(vec![crate::expressions::create_expression(
            ExpressionData::BlockExpression(crate::expressions::BlockExpression {
                statements: vec![inner],
            }),
        )]);

        let mut count = 0;
        visit_expressions_in_statement(&statement, &mut |_, _| {
            count += 1;
            false
        });
        assert_eq!(count, 2);
    }
}
