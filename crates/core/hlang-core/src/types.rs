//! 类型引用
//!
//! `TypeReference` 是按标签分发的和类型（sum type），覆盖内建类型、
//! 基础类型、定宽整数、定长数组、指针、函数类型、自定义（模块限定）
//! 类型、未绑定泛型参数与类型实例。
//!
//! 本模块同时提供类型谓词与构造函数。谓词是全函数；可能失败的取值
//! 操作（如 `remove_pointer`）以 `Option` 表达前置条件。

use serde::{Deserialize, Serialize};

use crate::expressions::Statement;

/// 基础类型
///
/// `C_*` 家族对应 C 互操作使用的平台整数/字符类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FundamentalType {
    Bool,
    Byte,
    Float16,
    Float32,
    Float64,
    String,
    AnyType,
    CBool,
    CChar,
    CSchar,
    CUchar,
    CShort,
    CUshort,
    CInt,
    CUint,
    CLong,
    CUlong,
    CLonglong,
    CUlonglong,
}

/// 模块引用。空名字表示"当前模块"，由解析器在首次查找时归一化。
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModuleReference {
    pub name: String,
}

/// 编译器内建类型的命名引用
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BuiltinTypeReference {
    pub value: String,
}

/// 定宽整数类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IntegerType {
    pub number_of_bits: u32,
    pub is_signed: bool,
}

/// 定长数组类型
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstantArrayType {
    pub value_type: Box<TypeReference>,
    pub size: u64,
}

/// 指针类型。`element_type` 为 `None` 时表示 `*void`，
/// 这是唯一合法的类型擦除指针编码。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointerType {
    pub element_type: Option<Box<TypeReference>>,
    pub is_mutable: bool,
}

/// 函数类型
///
/// 不变式：`input_parameter_types.len()` 与声明处的参数名数量一致，
/// 输出参数同理（由声明结构保证）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionType {
    pub input_parameter_types: Vec<TypeReference>,
    pub output_parameter_types: Vec<TypeReference>,
    pub is_variadic: bool,
}

/// 模块限定的自定义类型引用
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CustomTypeReference {
    pub module_reference: ModuleReference,
    pub name: String,
}

/// 未绑定的泛型参数
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParameterType {
    pub name: String,
}

/// 类型实例：类型构造器 + 实参
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeInstance {
    pub type_constructor: CustomTypeReference,
    pub arguments: Vec<Statement>,
}

/// 类型引用的和类型。二进制序列化时以变体序号作为整数标签。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeReference {
    BuiltinTypeReference(BuiltinTypeReference),
    ConstantArrayType(ConstantArrayType),
    CustomTypeReference(CustomTypeReference),
    FundamentalType(FundamentalType),
    FunctionType(FunctionType),
    IntegerType(IntegerType),
    ParameterType(ParameterType),
    PointerType(PointerType),
    TypeInstance(TypeInstance),
}

pub fn create_bool_type_reference() -> TypeReference {
    create_fundamental_type_type_reference(FundamentalType::Bool)
}

pub fn create_fundamental_type_type_reference(value: FundamentalType) -> TypeReference {
    TypeReference::FundamentalType(value)
}

pub fn create_integer_type_type_reference(number_of_bits: u32, is_signed: bool) -> TypeReference {
    TypeReference::IntegerType(IntegerType {
        number_of_bits,
        is_signed,
    })
}

pub fn create_custom_type_reference(module_name: &str, name: &str) -> TypeReference {
    TypeReference::CustomTypeReference(CustomTypeReference {
        module_reference: ModuleReference {
            name: module_name.to_string(),
        },
        name: name.to_string(),
    })
}

pub fn create_pointer_type_type_reference(
    element_type: Option<TypeReference>,
    is_mutable: bool,
) -> TypeReference {
    TypeReference::PointerType(PointerType {
        element_type: element_type.map(Box::new),
        is_mutable,
    })
}

pub fn create_function_type_type_reference(function_type: FunctionType) -> TypeReference {
    TypeReference::FunctionType(function_type)
}

pub fn is_bool(type_reference: &TypeReference) -> bool {
    matches!(
        type_reference,
        TypeReference::FundamentalType(FundamentalType::Bool)
    )
}

pub fn is_integer(type_reference: &TypeReference) -> bool {
    matches!(type_reference, TypeReference::IntegerType(_))
}

pub fn is_signed_integer(type_reference: &TypeReference) -> bool {
    match type_reference {
        TypeReference::IntegerType(data) => data.is_signed,
        _ => false,
    }
}

pub fn is_unsigned_integer(type_reference: &TypeReference) -> bool {
    match type_reference {
        TypeReference::IntegerType(data) => !data.is_signed,
        _ => false,
    }
}

pub fn is_floating_point(type_reference: &TypeReference) -> bool {
    matches!(
        type_reference,
        TypeReference::FundamentalType(
            FundamentalType::Float16 | FundamentalType::Float32 | FundamentalType::Float64
        )
    )
}

pub fn is_pointer(type_reference: &TypeReference) -> bool {
    matches!(type_reference, TypeReference::PointerType(_))
}

/// 非 void 指针：存在元素类型的指针
pub fn is_non_void_pointer(type_reference: &TypeReference) -> bool {
    match type_reference {
        TypeReference::PointerType(pointer_type) => pointer_type.element_type.is_some(),
        _ => false,
    }
}

/// C 字符串：元素类型为 `C_char` 的指针
pub fn is_c_string(type_reference: &TypeReference) -> bool {
    match type_reference {
        TypeReference::PointerType(pointer_type) => matches!(
            pointer_type.element_type.as_deref(),
            Some(TypeReference::FundamentalType(FundamentalType::CChar))
        ),
        _ => false,
    }
}

pub fn is_custom_type_reference(type_reference: &TypeReference) -> bool {
    matches!(type_reference, TypeReference::CustomTypeReference(_))
}

/// 去除一层指针。非指针类型返回 `None`；`*void` 返回 `Some(None)`。
pub fn remove_pointer(type_reference: &TypeReference) -> Option<Option<TypeReference>> {
    match type_reference {
        TypeReference::PointerType(pointer_type) => Some(
            pointer_type
                .element_type
                .as_deref()
                .cloned(),
        ),
        _ => None,
    }
}

/// 将空的模块名填充为当前模块名
pub fn set_custom_type_reference_module_name_if_empty(
    type_reference: &mut TypeReference,
    module_name: &str,
) {
    if let TypeReference::CustomTypeReference(data) = type_reference {
        if data.module_reference.name.is_empty() {
            data.module_reference.name = module_name.to_string();
        }
    }
}

pub fn fix_custom_type_reference(
    mut type_reference: TypeReference,
    module_name: &str,
) -> TypeReference {
    set_custom_type_reference_module_name_if_empty(&mut type_reference, module_name);
    type_reference
}

/// 取函数的返回类型：单返回值返回该类型，多返回值返回第一个，
/// 多值聚合由后端负责。无输出时返回 `None`。
pub fn get_function_output_type_reference(function_type: &FunctionType) -> Option<TypeReference> {
    function_type.output_parameter_types.first().cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_bool() {
        assert!(is_bool(&create_bool_type_reference()));
        assert!(!is_bool(&create_integer_type_type_reference(32, true)));
    }

    #[test]
    fn test_is_integer_predicates() {
        let signed = create_integer_type_type_reference(32, true);
        let unsigned = create_integer_type_type_reference(8, false);

        assert!(is_integer(&signed));
        assert!(is_signed_integer(&signed));
        assert!(!is_signed_integer(&unsigned));
        assert!(is_unsigned_integer(&unsigned));
        assert!(!is_integer(&create_bool_type_reference()));
    }

    #[test]
    fn test_is_floating_point() {
        assert!(is_floating_point(&create_fundamental_type_type_reference(
            FundamentalType::Float32
        )));
        assert!(!is_floating_point(&create_integer_type_type_reference(
            32, true
        )));
    }

    #[test]
    fn test_pointer_predicates() {
        let void_pointer = create_pointer_type_type_reference(None, false);
        let int_pointer = create_pointer_type_type_reference(
            Some(create_integer_type_type_reference(32, true)),
            true,
        );
        let c_string = create_pointer_type_type_reference(
            Some(create_fundamental_type_type_reference(FundamentalType::CChar)),
            false,
        );

        assert!(is_pointer(&void_pointer));
        assert!(!is_non_void_pointer(&void_pointer));
        assert!(is_non_void_pointer(&int_pointer));
        assert!(is_c_string(&c_string));
        assert!(!is_c_string(&int_pointer));
    }

    #[test]
    fn test_remove_pointer() {
        let int_type = create_integer_type_type_reference(64, false);
        let pointer = create_pointer_type_type_reference(Some(int_type.clone()), false);

        assert_eq!(remove_pointer(&pointer), Some(Some(int_type)));
        assert_eq!(
            remove_pointer(&create_pointer_type_type_reference(None, false)),
            Some(None)
        );
        assert_eq!(remove_pointer(&create_bool_type_reference()), None);
    }

    #[test]
    fn test_fix_custom_type_reference() {
        let unqualified = create_custom_type_reference("", "My_struct");
        let fixed = fix_custom_type_reference(unqualified, "My_module");

        match fixed {
            TypeReference::CustomTypeReference(data) => {
                assert_eq!(data.module_reference.name, "My_module");
                assert_eq!(data.name, "My_struct");
            }
            _ => panic!("expected custom type reference"),
        }

        // 已限定的引用保持不变
        let qualified = create_custom_type_reference("Other", "My_struct");
        let unchanged = fix_custom_type_reference(qualified.clone(), "My_module");
        assert_eq!(unchanged, qualified);
    }

    #[test]
    fn test_get_function_output_type_reference() {
        let function_type = FunctionType {
            input_parameter_types: vec![create_bool_type_reference()],
            output_parameter_types: vec![
                create_integer_type_type_reference(32, true),
                create_bool_type_reference(),
            ],
            is_variadic: false,
        };

        assert_eq!(
            get_function_output_type_reference(&function_type),
            Some(create_integer_type_type_reference(32, true))
        );

        let void_function = FunctionType {
            input_parameter_types: vec![],
            output_parameter_types: vec![],
            is_variadic: false,
        };
        assert_eq!(get_function_output_type_reference(&void_function), None);
    }
}
