//! 模块
//!
//! 模块是编译单元，对应一个源文件。从解析产物构造，注册进声明
//! 数据库，计算接口哈希，然后编译进 JIT 或落入缓存。

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::declarations::{
    AliasTypeDeclaration, EnumDeclaration, FunctionDeclaration, FunctionDefinition,
    GlobalVariableDeclaration, StructDeclaration, UnionDeclaration,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LanguageVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

/// 别名导入。`usages` 列出导入方实际引用的符号，
/// 重编译规划器据此判定是否需要重建。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportModuleWithAlias {
    pub module_name: String,
    pub alias: String,
    pub usages: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleDependencies {
    pub alias_imports: Vec<ImportModuleWithAlias>,
}

/// 一组声明，按种类分列，均保持声明顺序
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleDeclarations {
    pub alias_type_declarations: Vec<AliasTypeDeclaration>,
    pub enum_declarations: Vec<EnumDeclaration>,
    pub global_variable_declarations: Vec<GlobalVariableDeclaration>,
    pub struct_declarations: Vec<StructDeclaration>,
    pub union_declarations: Vec<UnionDeclaration>,
    pub function_declarations: Vec<FunctionDeclaration>,
}

impl ModuleDeclarations {
    pub fn is_empty(&self) -> bool {
        self.alias_type_declarations.is_empty()
            && self.enum_declarations.is_empty()
            && self.global_variable_declarations.is_empty()
            && self.struct_declarations.is_empty()
            && self.union_declarations.is_empty()
            && self.function_declarations.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleDefinitions {
    pub function_definitions: Vec<FunctionDefinition>,
}

/// 符号改名策略，按模块记录在 IR 中
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameMangling {
    /// 仅声明名（默认，保证 C 互操作）
    #[default]
    DeclarationName,
    /// `module_name` 中的 `.` 替换为 `_` 后前缀到声明名
    ModuleAndDeclarationName,
}

/// 编译单元
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Module {
    /// 点分标识符，如 `app.main`
    pub name: String,
    pub source_file_path: Option<PathBuf>,
    /// 源文件指纹，用于缓存判定
    pub content_hash: Option<u64>,
    pub language_version: LanguageVersion,
    pub name_mangling: NameMangling,
    pub dependencies: ModuleDependencies,
    pub export_declarations: ModuleDeclarations,
    pub internal_declarations: ModuleDeclarations,
    pub definitions: ModuleDefinitions,
    pub comment: Option<String>,
}

impl Module {
    /// 在导出与内部声明中查找函数声明
    pub fn find_function_declaration(&self, name: &str) -> Option<&FunctionDeclaration> {
        self.export_declarations
            .function_declarations
            .iter()
            .chain(self.internal_declarations.function_declarations.iter())
            .find(|declaration| declaration.name == name)
    }

    pub fn find_function_definition(&self, name: &str) -> Option<&FunctionDefinition> {
        self.definitions
            .function_definitions
            .iter()
            .find(|definition| definition.name == name)
    }

    /// 仅保留导出声明的浅视图（规划器检查反向依赖时使用）
    pub fn to_export_declarations_only(&self) -> Module {
        Module {
            name: self.name.clone(),
            source_file_path: self.source_file_path.clone(),
            content_hash: self.content_hash,
            language_version: self.language_version,
            name_mangling: self.name_mangling,
            dependencies: self.dependencies.clone(),
            export_declarations: self.export_declarations.clone(),
            internal_declarations: ModuleDeclarations::default(),
            definitions: ModuleDefinitions::default(),
            comment: None,
        }
    }
}
