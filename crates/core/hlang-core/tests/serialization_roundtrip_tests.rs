//! 序列化往返的性质测试：随机生成模块，JSON 与二进制两种编码
//! 都必须与内存 IR 双射。

use proptest::prelude::*;

use hlang_core::declarations::{
    FunctionDeclaration, FunctionDefinition, Linkage, StructDeclaration,
};
use hlang_core::expressions::{
    create_constant_expression, create_return_expression, create_statement, ExpressionIndex,
    Statement,
};
use hlang_core::module::{
    ImportModuleWithAlias, LanguageVersion, Module, ModuleDeclarations, ModuleDefinitions,
    NameMangling,
};
use hlang_core::serialization;
use hlang_core::types::{FundamentalType, FunctionType, PointerType, TypeReference};

fn identifier() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,10}".prop_map(|s| s)
}

fn fundamental_type() -> impl Strategy<Value = FundamentalType> {
    prop_oneof![
        Just(FundamentalType::Bool),
        Just(FundamentalType::Byte),
        Just(FundamentalType::Float32),
        Just(FundamentalType::Float64),
        Just(FundamentalType::CInt),
        Just(FundamentalType::CChar),
    ]
}

fn type_reference() -> impl Strategy<Value = TypeReference> {
    let leaf = prop_oneof![
        fundamental_type().prop_map(TypeReference::FundamentalType),
        (prop_oneof![Just(8u32), Just(16), Just(32), Just(64)], any::<bool>()).prop_map(
            |(bits, signed)| hlang_core::types::create_integer_type_type_reference(bits, signed)
        ),
    ];
    leaf.prop_recursive(2, 8, 2, |inner| {
        prop_oneof![
            (inner.clone(), any::<bool>()).prop_map(|(element, is_mutable)| {
                TypeReference::PointerType(PointerType {
                    element_type: Some(Box::new(element)),
                    is_mutable,
                })
            }),
            (inner, 1u64..8).prop_map(|(value_type, size)| {
                TypeReference::ConstantArrayType(hlang_core::types::ConstantArrayType {
                    value_type: Box::new(value_type),
                    size,
                })
            }),
        ]
    })
}

fn constant_statement() -> impl Strategy<Value = Statement> {
    any::<i32>().prop_map(|value| {
        create_statement(vec![create_constant_expression(
            hlang_core::types::create_integer_type_type_reference(32, true),
            &value.to_string(),
        )])
    })
}

fn struct_declaration() -> impl Strategy<Value = StructDeclaration> {
    (
        identifier(),
        prop::collection::vec((identifier(), type_reference(), constant_statement()), 0..4),
        any::<bool>(),
        any::<bool>(),
    )
        .prop_map(|(name, members, is_packed, is_literal)| StructDeclaration {
            name,
            unique_name: None,
            member_types: members.iter().map(|(_, t, _)| t.clone()).collect(),
            member_names: members.iter().map(|(n, _, _)| n.clone()).collect(),
            member_default_values: members.into_iter().map(|(_, _, v)| v).collect(),
            is_packed,
            is_literal,
            linkage: Linkage::External,
            member_source_positions: None,
            source_location: None,
        })
}

fn function_declaration() -> impl Strategy<Value = FunctionDeclaration> {
    (
        identifier(),
        prop::collection::vec((identifier(), type_reference()), 0..3),
        prop::option::of(type_reference()),
        any::<bool>(),
    )
        .prop_map(|(name, inputs, output, is_variadic)| FunctionDeclaration {
            name,
            unique_name: None,
            function_type: FunctionType {
                input_parameter_types: inputs.iter().map(|(_, t)| t.clone()).collect(),
                output_parameter_types: output.into_iter().collect(),
                is_variadic,
            },
            input_parameter_names: inputs.into_iter().map(|(n, _)| n).collect(),
            output_parameter_names: vec![],
            input_parameter_source_positions: None,
            output_parameter_source_positions: None,
            linkage: Linkage::External,
            source_location: None,
        })
}

prop_compose! {
    fn module()(
        name in identifier(),
        structs in prop::collection::vec(struct_declaration(), 0..3),
        functions in prop::collection::vec(function_declaration(), 0..3),
        imports in prop::collection::vec((identifier(), prop::collection::vec(identifier(), 0..3)), 0..2),
        mangling in prop_oneof![Just(NameMangling::DeclarationName), Just(NameMangling::ModuleAndDeclarationName)],
        value in any::<i32>(),
    ) -> Module {
        // 定义一个小函数体，保证 definitions 也参与往返
        let definitions = functions.first().map(|declaration| FunctionDefinition {
            name: declaration.name.clone(),
            statements: vec![create_statement(vec![
                create_return_expression(Some(ExpressionIndex::new(1))),
                create_constant_expression(
                    hlang_core::types::create_integer_type_type_reference(32, true),
                    &value.to_string(),
                ),
            ])],
            source_location: None,
        });

        Module {
            name,
            source_file_path: None,
            content_hash: Some(value as u64),
            language_version: LanguageVersion { major: 0, minor: 1, patch: 0 },
            name_mangling: mangling,
            dependencies: hlang_core::module::ModuleDependencies {
                alias_imports: imports
                    .into_iter()
                    .map(|(module_name, usages)| ImportModuleWithAlias {
                        alias: module_name.clone(),
                        module_name,
                        usages,
                    })
                    .collect(),
            },
            export_declarations: ModuleDeclarations {
                struct_declarations: structs,
                function_declarations: functions,
                ..Default::default()
            },
            internal_declarations: ModuleDeclarations::default(),
            definitions: ModuleDefinitions {
                function_definitions: definitions.into_iter().collect(),
            },
            comment: None,
        }
    }
}

proptest! {
    #[test]
    fn json_round_trip_preserves_module(module in module()) {
        let json = serialization::to_json_string(&module).unwrap();
        let decoded = serialization::from_json_string(&json).unwrap();
        prop_assert_eq!(&module, &decoded);

        // 再序列化得到相同文本
        let json_again = serialization::to_json_string(&decoded).unwrap();
        prop_assert_eq!(json, json_again);
    }

    #[test]
    fn binary_round_trip_preserves_module(module in module()) {
        let bytes = serialization::to_binary(&module).unwrap();
        let decoded = serialization::from_binary(&bytes).unwrap();
        prop_assert_eq!(&module, &decoded);

        let bytes_again = serialization::to_binary(&decoded).unwrap();
        prop_assert_eq!(bytes, bytes_again);
    }
}
