//! 声明
//!
//! 每个声明有 `name`、可选的 `unique_name`（改名覆盖）、
//! `linkage` 与可选的源码位置。模块内 `(声明种类, 名字)` 唯一。

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::expressions::Statement;
use crate::types::{FunctionType, TypeReference};

/// 链接性。`Private` 在后端映射为隐藏可见性，但仍注册进符号表
/// 以便重编译层查找。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Linkage {
    #[default]
    External,
    Private,
}

/// 源码位置（1 基行列）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourcePosition {
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceRange {
    pub start: SourcePosition,
    pub end: SourcePosition,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceRangeLocation {
    pub file_path: Option<PathBuf>,
    pub range: SourceRange,
}

/// 类型别名。`aliased_type` 为 `None` 表示空链（畸形 IR，
/// 解析时产生 `None` 而不是悬挂）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AliasTypeDeclaration {
    pub name: String,
    pub unique_name: Option<String>,
    pub aliased_type: Option<TypeReference>,
    pub linkage: Linkage,
    pub source_location: Option<SourceRangeLocation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumValue {
    pub name: String,
    pub value: Option<Statement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumDeclaration {
    pub name: String,
    pub unique_name: Option<String>,
    pub values: Vec<EnumValue>,
    pub linkage: Linkage,
    pub source_location: Option<SourceRangeLocation>,
}

/// 结构体声明。成员按 `member_types` / `member_names` /
/// `member_default_values` 三个平行向量的声明顺序存放。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructDeclaration {
    pub name: String,
    pub unique_name: Option<String>,
    pub member_types: Vec<TypeReference>,
    pub member_names: Vec<String>,
    pub member_default_values: Vec<Statement>,
    pub is_packed: bool,
    pub is_literal: bool,
    pub linkage: Linkage,
    pub member_source_positions: Option<Vec<SourcePosition>>,
    pub source_location: Option<SourceRangeLocation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnionDeclaration {
    pub name: String,
    pub unique_name: Option<String>,
    pub member_types: Vec<TypeReference>,
    pub member_names: Vec<String>,
    pub linkage: Linkage,
    pub member_source_positions: Option<Vec<SourcePosition>>,
    pub source_location: Option<SourceRangeLocation>,
}

/// 函数声明
///
/// 不变式：`function_type.input_parameter_types.len() ==
/// input_parameter_names.len()`，输出侧同理。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    pub name: String,
    pub unique_name: Option<String>,
    pub function_type: FunctionType,
    pub input_parameter_names: Vec<String>,
    pub output_parameter_names: Vec<String>,
    pub input_parameter_source_positions: Option<Vec<SourcePosition>>,
    pub output_parameter_source_positions: Option<Vec<SourcePosition>>,
    pub linkage: Linkage,
    pub source_location: Option<SourceRangeLocation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalVariableDeclaration {
    pub name: String,
    pub unique_name: Option<String>,
    pub type_reference: Option<TypeReference>,
    pub initial_value: Statement,
    pub is_mutable: bool,
    pub linkage: Linkage,
    pub source_location: Option<SourceRangeLocation>,
}

/// 函数定义：有序语句列表
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub statements: Vec<Statement>,
    pub source_location: Option<SourceRangeLocation>,
}
