//! 类型映射与内存布局
//!
//! 标量类型映射为 Cranelift 值类型；结构体、联合体与定长数组是
//! 内存类型：大小/对齐/成员偏移由此模块计算，按 ABI 对齐，
//! `is_packed` 时对齐为 1。聚合值经指针传递与返回。

use cranelift_codegen::ir::{types, Type};

use hlang_core::database::{Declaration, DeclarationDatabase};
use hlang_core::declarations::{StructDeclaration, UnionDeclaration};
use hlang_core::types::{FundamentalType, TypeReference};

use crate::error::{CodegenError, CodegenResult};

/// 聚合类型布局
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateLayout {
    pub size: u32,
    pub align: u32,
    /// 成员偏移，按声明顺序；联合体所有成员偏移为 0
    pub member_offsets: Vec<u32>,
}

/// 类型的降级分类
#[derive(Debug, Clone, PartialEq)]
pub enum LoweredType {
    /// 单个 Cranelift 值
    Scalar(Type),
    /// 内存中的聚合
    Aggregate(AggregateLayout),
}

fn fundamental_scalar(fundamental: FundamentalType) -> CodegenResult<Type> {
    match fundamental {
        FundamentalType::Bool | FundamentalType::CBool => Ok(types::I8),
        FundamentalType::Byte => Ok(types::I8),
        FundamentalType::Float32 => Ok(types::F32),
        FundamentalType::Float64 => Ok(types::F64),
        FundamentalType::Float16 => Err(CodegenError::UnsupportedType(
            "Float16 is not supported by this backend".to_string(),
        )),
        // C 字符串指针
        FundamentalType::String => Ok(types::I64),
        FundamentalType::CChar | FundamentalType::CSchar | FundamentalType::CUchar => Ok(types::I8),
        FundamentalType::CShort | FundamentalType::CUshort => Ok(types::I16),
        FundamentalType::CInt | FundamentalType::CUint => Ok(types::I32),
        FundamentalType::CLong
        | FundamentalType::CUlong
        | FundamentalType::CLonglong
        | FundamentalType::CUlonglong => Ok(types::I64),
        FundamentalType::AnyType => Err(CodegenError::UnsupportedType(
            "Any_type cannot be lowered".to_string(),
        )),
    }
}

fn integer_scalar(number_of_bits: u32) -> CodegenResult<Type> {
    match number_of_bits {
        8 => Ok(types::I8),
        16 => Ok(types::I16),
        32 => Ok(types::I32),
        64 => Ok(types::I64),
        other => Err(CodegenError::UnsupportedType(format!(
            "{other}-bit integers are not supported"
        ))),
    }
}

/// 符号视角的有符号性（算术指令选择使用）
pub fn is_signed(type_reference: &TypeReference) -> bool {
    match type_reference {
        TypeReference::IntegerType(data) => data.is_signed,
        TypeReference::FundamentalType(
            FundamentalType::CChar
            | FundamentalType::CSchar
            | FundamentalType::CShort
            | FundamentalType::CInt
            | FundamentalType::CLong
            | FundamentalType::CLonglong,
        ) => true,
        _ => false,
    }
}

pub fn is_float(type_reference: &TypeReference) -> bool {
    hlang_core::types::is_floating_point(type_reference)
}

/// 解析后降级一个类型。自定义引用先经数据库求底层类型；
/// 未解析的引用是 `TypeResolutionFailure`。
pub fn lower_type(
    database: &DeclarationDatabase,
    current_module_name: &str,
    type_reference: &TypeReference,
) -> CodegenResult<LoweredType> {
    match type_reference {
        TypeReference::FundamentalType(fundamental) => {
            Ok(LoweredType::Scalar(fundamental_scalar(*fundamental)?))
        }
        TypeReference::IntegerType(data) => {
            Ok(LoweredType::Scalar(integer_scalar(data.number_of_bits)?))
        }
        TypeReference::PointerType(_) | TypeReference::FunctionType(_) => {
            Ok(LoweredType::Scalar(types::I64))
        }
        TypeReference::ConstantArrayType(data) => {
            let element = size_and_align(database, current_module_name, &data.value_type)?;
            let element_stride = element.0.next_multiple_of(element.1.max(1));
            Ok(LoweredType::Aggregate(AggregateLayout {
                size: element_stride * data.size as u32,
                align: element.1,
                member_offsets: (0..data.size as u32)
                    .map(|index| index * element_stride)
                    .collect(),
            }))
        }
        TypeReference::CustomTypeReference(_) => {
            let underlying = database
                .get_underlying_type(current_module_name, type_reference)?
                .ok_or_else(|| {
                    CodegenError::TypeResolutionFailure(format!(
                        "alias chain resolves to nothing for {type_reference:?}"
                    ))
                })?;

            match &underlying {
                TypeReference::CustomTypeReference(data) => {
                    let declaration = database
                        .find_declaration(&data.module_reference.name, &data.name)
                        .ok_or_else(|| {
                            CodegenError::TypeResolutionFailure(format!(
                                "unknown declaration '{}.{}'",
                                data.module_reference.name, data.name
                            ))
                        })?;
                    lower_declaration_type(database, &data.module_reference.name, &declaration)
                }
                other => lower_type(database, current_module_name, other),
            }
        }
        TypeReference::BuiltinTypeReference(data) => Err(CodegenError::UnsupportedType(format!(
            "builtin type '{}' cannot be lowered",
            data.value
        ))),
        TypeReference::ParameterType(data) => Err(CodegenError::UnsupportedType(format!(
            "unbound generic parameter '{}' reached the backend",
            data.name
        ))),
        TypeReference::TypeInstance(data) => Err(CodegenError::UnsupportedType(format!(
            "uninstantiated type instance of '{}' reached the backend",
            data.type_constructor.name
        ))),
    }
}

fn lower_declaration_type(
    database: &DeclarationDatabase,
    module_name: &str,
    declaration: &Declaration,
) -> CodegenResult<LoweredType> {
    match declaration {
        // 枚举降级为 32 位整数
        Declaration::Enum(_) => Ok(LoweredType::Scalar(types::I32)),
        Declaration::Struct(data) => Ok(LoweredType::Aggregate(struct_layout(
            database,
            module_name,
            data,
        )?)),
        Declaration::Union(data) => Ok(LoweredType::Aggregate(union_layout(
            database,
            module_name,
            data,
        )?)),
        Declaration::Alias(_) => Err(CodegenError::TypeResolutionFailure(
            "alias escaped underlying-type resolution".to_string(),
        )),
        Declaration::Function(_) | Declaration::GlobalVariable(_) => {
            Err(CodegenError::UnsupportedType(
                "declaration is not a type".to_string(),
            ))
        }
    }
}

/// 类型的（大小, 对齐）
pub fn size_and_align(
    database: &DeclarationDatabase,
    current_module_name: &str,
    type_reference: &TypeReference,
) -> CodegenResult<(u32, u32)> {
    match lower_type(database, current_module_name, type_reference)? {
        LoweredType::Scalar(scalar) => {
            let size = scalar.bytes();
            Ok((size, size))
        }
        LoweredType::Aggregate(layout) => Ok((layout.size, layout.align)),
    }
}

pub fn struct_layout(
    database: &DeclarationDatabase,
    module_name: &str,
    declaration: &StructDeclaration,
) -> CodegenResult<AggregateLayout> {
    let mut offset: u32 = 0;
    let mut align: u32 = 1;
    let mut member_offsets = Vec::with_capacity(declaration.member_types.len());

    for member_type in &declaration.member_types {
        let (member_size, member_align) = size_and_align(database, module_name, member_type)?;
        let effective_align = if declaration.is_packed { 1 } else { member_align };

        offset = offset.next_multiple_of(effective_align.max(1));
        member_offsets.push(offset);
        offset += member_size;
        align = align.max(effective_align);
    }

    Ok(AggregateLayout {
        size: offset.next_multiple_of(align.max(1)),
        align,
        member_offsets,
    })
}

pub fn union_layout(
    database: &DeclarationDatabase,
    module_name: &str,
    declaration: &UnionDeclaration,
) -> CodegenResult<AggregateLayout> {
    let mut size: u32 = 0;
    let mut align: u32 = 1;

    for member_type in &declaration.member_types {
        let (member_size, member_align) = size_and_align(database, module_name, member_type)?;
        size = size.max(member_size);
        align = align.max(member_align);
    }

    Ok(AggregateLayout {
        size: size.next_multiple_of(align.max(1)),
        align,
        member_offsets: vec![0; declaration.member_types.len()],
    })
}

/// 标量类型的 Cranelift 值类型；聚合类型报 `UnsupportedType`
pub fn scalar_type(
    database: &DeclarationDatabase,
    current_module_name: &str,
    type_reference: &TypeReference,
) -> CodegenResult<Type> {
    match lower_type(database, current_module_name, type_reference)? {
        LoweredType::Scalar(scalar) => Ok(scalar),
        LoweredType::Aggregate(_) => Err(CodegenError::UnsupportedType(
            "aggregate used where a scalar is required".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hlang_core::declarations::Linkage;
    use hlang_core::module::{Module, ModuleDeclarations};
    use hlang_core::types::{
        create_custom_type_reference, create_integer_type_type_reference,
        create_pointer_type_type_reference,
    };

    fn empty_database() -> DeclarationDatabase {
        DeclarationDatabase::new()
    }

    fn struct_declaration(member_types: Vec<TypeReference>, is_packed: bool) -> StructDeclaration {
        StructDeclaration {
            name: "S".to_string(),
            unique_name: None,
            member_names: (0..member_types.len()).map(|i| format!("m{i}")).collect(),
            member_default_values: vec![],
            member_types,
            is_packed,
            is_literal: false,
            linkage: Linkage::External,
            member_source_positions: None,
            source_location: None,
        }
    }

    #[test]
    fn test_integer_widths() {
        let database = empty_database();
        for (bits, expected) in [(8, types::I8), (16, types::I16), (32, types::I32), (64, types::I64)] {
            let lowered = lower_type(
                &database,
                "m",
                &create_integer_type_type_reference(bits, true),
            )
            .unwrap();
            assert_eq!(lowered, LoweredType::Scalar(expected));
        }

        assert!(matches!(
            lower_type(&database, "m", &create_integer_type_type_reference(24, true)),
            Err(CodegenError::UnsupportedType(_))
        ));
    }

    #[test]
    fn test_float16_is_rejected() {
        let database = empty_database();
        let float16 = TypeReference::FundamentalType(FundamentalType::Float16);
        assert!(matches!(
            lower_type(&database, "m", &float16),
            Err(CodegenError::UnsupportedType(_))
        ));
    }

    #[test]
    fn test_pointer_is_pointer_sized() {
        let database = empty_database();
        let pointer = create_pointer_type_type_reference(None, false);
        assert_eq!(
            lower_type(&database, "m", &pointer).unwrap(),
            LoweredType::Scalar(types::I64)
        );
    }

    #[test]
    fn test_struct_layout_with_padding() {
        let database = empty_database();
        // { i8, i32, i8 } → 偏移 0, 4, 8；大小 12，对齐 4
        let declaration = struct_declaration(
            vec![
                create_integer_type_type_reference(8, false),
                create_integer_type_type_reference(32, false),
                create_integer_type_type_reference(8, false),
            ],
            false,
        );
        let layout = struct_layout(&database, "m", &declaration).unwrap();
        assert_eq!(layout.member_offsets, vec![0, 4, 8]);
        assert_eq!(layout.size, 12);
        assert_eq!(layout.align, 4);
    }

    #[test]
    fn test_packed_struct_layout() {
        let database = empty_database();
        let declaration = struct_declaration(
            vec![
                create_integer_type_type_reference(8, false),
                create_integer_type_type_reference(32, false),
            ],
            true,
        );
        let layout = struct_layout(&database, "m", &declaration).unwrap();
        assert_eq!(layout.member_offsets, vec![0, 1]);
        assert_eq!(layout.size, 5);
        assert_eq!(layout.align, 1);
    }

    #[test]
    fn test_custom_reference_resolves_through_alias() {
        let mut database = DeclarationDatabase::new();
        let mut module = Module {
            name: "m".to_string(),
            ..Default::default()
        };
        module.export_declarations = ModuleDeclarations {
            alias_type_declarations: vec![hlang_core::declarations::AliasTypeDeclaration {
                name: "MyInt".to_string(),
                unique_name: None,
                aliased_type: Some(create_integer_type_type_reference(32, true)),
                linkage: Linkage::External,
                source_location: None,
            }],
            ..Default::default()
        };
        database.add_declarations(&module).unwrap();

        let lowered = lower_type(&database, "m", &create_custom_type_reference("", "MyInt")).unwrap();
        assert_eq!(lowered, LoweredType::Scalar(types::I32));
    }

    #[test]
    fn test_unknown_custom_reference_is_resolution_failure() {
        let database = empty_database();
        let result = lower_type(&database, "m", &create_custom_type_reference("m", "Missing"));
        assert!(matches!(result, Err(CodegenError::TypeResolutionFailure(_))));
    }
}
