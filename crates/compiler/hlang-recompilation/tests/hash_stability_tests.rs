//! 接口哈希的稳定性：对任意模块，序列化往返前后的导出接口
//! 指纹必须逐符号一致。

use proptest::prelude::*;

use hlang_core::declarations::{Linkage, StructDeclaration};
use hlang_core::expressions::{create_constant_expression, create_statement, Statement};
use hlang_core::module::{Module, ModuleDeclarations};
use hlang_core::serialization;
use hlang_core::types::TypeReference;
use hlang_recompilation::hash_export_interface;

fn identifier() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,8}".prop_map(|s| s)
}

fn member_type() -> impl Strategy<Value = TypeReference> {
    prop_oneof![
        (prop_oneof![Just(8u32), Just(16), Just(32), Just(64)], any::<bool>()).prop_map(
            |(bits, signed)| hlang_core::types::create_integer_type_type_reference(bits, signed)
        ),
        Just(hlang_core::types::create_bool_type_reference()),
        Just(hlang_core::types::create_pointer_type_type_reference(None, true)),
    ]
}

fn default_value() -> impl Strategy<Value = Statement> {
    any::<i16>().prop_map(|value| {
        create_statement(vec![create_constant_expression(
            hlang_core::types::create_integer_type_type_reference(32, true),
            &value.to_string(),
        )])
    })
}

prop_compose! {
    fn module()(
        name in identifier(),
        structs in prop::collection::vec(
            (identifier(), prop::collection::vec((identifier(), member_type(), default_value()), 0..4), any::<bool>()),
            1..4
        ),
    ) -> Module {
        let mut declarations: Vec<StructDeclaration> = Vec::new();
        for (struct_name, members, is_packed) in structs {
            // 同名声明违反 (module, name) 唯一性，丢弃后来者
            if declarations.iter().any(|declaration| declaration.name == struct_name) {
                continue;
            }
            declarations.push(StructDeclaration {
                name: struct_name,
                unique_name: None,
                member_types: members.iter().map(|(_, t, _)| t.clone()).collect(),
                member_names: members.iter().map(|(n, _, _)| n.clone()).collect(),
                member_default_values: members.into_iter().map(|(_, _, v)| v).collect(),
                is_packed,
                is_literal: false,
                linkage: Linkage::External,
                member_source_positions: None,
                source_location: None,
            });
        }

        Module {
            name,
            export_declarations: ModuleDeclarations {
                struct_declarations: declarations,
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

proptest! {
    /// hash(M) == hash(deserialize(serialize(M)))，两种编码都成立
    #[test]
    fn hash_is_stable_across_serialization(module in module()) {
        let direct = hash_export_interface(&module);

        let json = serialization::to_json_string(&module).unwrap();
        let from_json = serialization::from_json_string(&json).unwrap();
        prop_assert_eq!(&direct, &hash_export_interface(&from_json));

        let bytes = serialization::to_binary(&module).unwrap();
        let from_binary = serialization::from_binary(&bytes).unwrap();
        prop_assert_eq!(&direct, &hash_export_interface(&from_binary));
    }

    /// 两个独立克隆产生逐符号相同的映射
    #[test]
    fn hash_is_deterministic(module in module()) {
        let first = hash_export_interface(&module);
        let second = hash_export_interface(&module.clone());
        prop_assert_eq!(first, second);
    }
}
