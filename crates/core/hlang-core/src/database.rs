//! 声明数据库
//!
//! 映射 `module_name → (declaration_name → Declaration)`，跨所有
//! 已加载模块聚合。声明以 `Arc` 持有，名字即稳定 ID：类型之间
//! 通过模块限定名互相引用，不存在指针环。
//!
//! 生命周期：数据库在一次 JIT 会话内累积；模块替换时先整体移除
//! 旧版本条目再插入新条目（写锁内完成，外部观察不到撕裂状态）。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::declarations::{
    AliasTypeDeclaration, EnumDeclaration, FunctionDeclaration, GlobalVariableDeclaration,
    StructDeclaration, UnionDeclaration,
};
use crate::error::{CoreError, CoreResult};
use crate::module::{Module, ModuleDeclarations, NameMangling};
use crate::types::{fix_custom_type_reference, TypeReference};

/// 数据库中的一条声明
#[derive(Debug, Clone)]
pub enum Declaration {
    Alias(Arc<AliasTypeDeclaration>),
    Enum(Arc<EnumDeclaration>),
    Function(Arc<FunctionDeclaration>),
    GlobalVariable(Arc<GlobalVariableDeclaration>),
    Struct(Arc<StructDeclaration>),
    Union(Arc<UnionDeclaration>),
}

impl Declaration {
    pub fn name(&self) -> &str {
        match self {
            Declaration::Alias(declaration) => &declaration.name,
            Declaration::Enum(declaration) => &declaration.name,
            Declaration::Function(declaration) => &declaration.name,
            Declaration::GlobalVariable(declaration) => &declaration.name,
            Declaration::Struct(declaration) => &declaration.name,
            Declaration::Union(declaration) => &declaration.name,
        }
    }

    pub fn is_alias(&self) -> bool {
        matches!(self, Declaration::Alias(_))
    }
}

type DeclarationMap = HashMap<String, Declaration>;

/// 声明数据库
#[derive(Debug, Default)]
pub struct DeclarationDatabase {
    map: HashMap<String, DeclarationMap>,
    /// 各模块记录在 IR 中的符号改名策略，后端降级调用点查询
    module_mangling: HashMap<String, NameMangling>,
}

impl DeclarationDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册一个模块的导出与内部声明。
    /// `(module, name)` 冲突返回错误，绝不静默替换。
    pub fn add_declarations(&mut self, module: &Module) -> CoreResult<()> {
        // 先在临时表上校验再合并，避免半插入状态
        let mut additions: DeclarationMap = HashMap::new();
        Self::collect_declarations(&module.name, &module.export_declarations, &mut additions)?;
        Self::collect_declarations(&module.name, &module.internal_declarations, &mut additions)?;

        let map = self.map.entry(module.name.clone()).or_default();
        for name in additions.keys() {
            if map.contains_key(name) {
                return Err(CoreError::DuplicateDeclaration {
                    module_name: module.name.clone(),
                    declaration_name: name.clone(),
                });
            }
        }
        map.extend(additions);
        self.module_mangling
            .insert(module.name.clone(), module.name_mangling);
        Ok(())
    }

    fn collect_declarations(
        module_name: &str,
        declarations: &ModuleDeclarations,
        output: &mut DeclarationMap,
    ) -> CoreResult<()> {
        let mut insert = |name: &str, declaration: Declaration| -> CoreResult<()> {
            if output
                .insert(name.to_string(), declaration)
                .is_some()
            {
                return Err(CoreError::DuplicateDeclaration {
                    module_name: module_name.to_string(),
                    declaration_name: name.to_string(),
                });
            }
            Ok(())
        };

        for declaration in &declarations.alias_type_declarations {
            insert(
                &declaration.name,
                Declaration::Alias(Arc::new(declaration.clone())),
            )?;
        }
        for declaration in &declarations.enum_declarations {
            insert(
                &declaration.name,
                Declaration::Enum(Arc::new(declaration.clone())),
            )?;
        }
        for declaration in &declarations.global_variable_declarations {
            insert(
                &declaration.name,
                Declaration::GlobalVariable(Arc::new(declaration.clone())),
            )?;
        }
        for declaration in &declarations.struct_declarations {
            insert(
                &declaration.name,
                Declaration::Struct(Arc::new(declaration.clone())),
            )?;
        }
        for declaration in &declarations.union_declarations {
            insert(
                &declaration.name,
                Declaration::Union(Arc::new(declaration.clone())),
            )?;
        }
        for declaration in &declarations.function_declarations {
            insert(
                &declaration.name,
                Declaration::Function(Arc::new(declaration.clone())),
            )?;
        }
        Ok(())
    }

    /// 移除一个模块的全部条目（热替换的显式移除步骤）。
    /// 返回是否确有该模块。
    pub fn remove_module_declarations(&mut self, module_name: &str) -> bool {
        self.module_mangling.remove(module_name);
        self.map.remove(module_name).is_some()
    }

    /// 模块记录的改名策略；未注册的模块取默认策略
    pub fn name_mangling_of(&self, module_name: &str) -> NameMangling {
        self.module_mangling
            .get(module_name)
            .copied()
            .unwrap_or_default()
    }

    pub fn contains_module(&self, module_name: &str) -> bool {
        self.map.contains_key(module_name)
    }

    /// 平均 O(1) 查找，同时覆盖命名模块的导出与内部声明
    pub fn find_declaration(&self, module_name: &str, declaration_name: &str) -> Option<Declaration> {
        self.map
            .get(module_name)?
            .get(declaration_name)
            .cloned()
    }

    /// 递归解析别名链直到非别名类型。
    ///
    /// 未限定的自定义引用继承其所在声明的模块。返回 `Ok(None)`
    /// 仅当别名解析到空链（畸形 IR）。环通过已访问集检测，
    /// 报 `CyclicAlias` 而不是悬挂。
    pub fn get_underlying_type(
        &self,
        current_module_name: &str,
        type_reference: &TypeReference,
    ) -> CoreResult<Option<TypeReference>> {
        let mut visited: HashSet<(String, String)> = HashSet::new();
        self.get_underlying_type_impl(current_module_name, type_reference, &mut visited)
    }

    fn get_underlying_type_impl(
        &self,
        current_module_name: &str,
        type_reference: &TypeReference,
        visited: &mut HashSet<(String, String)>,
    ) -> CoreResult<Option<TypeReference>> {
        let TypeReference::CustomTypeReference(data) = type_reference else {
            return Ok(Some(type_reference.clone()));
        };

        let module_name = if data.module_reference.name.is_empty() {
            current_module_name
        } else {
            data.module_reference.name.as_str()
        };

        if !visited.insert((module_name.to_string(), data.name.clone())) {
            return Err(CoreError::CyclicAlias {
                module_name: module_name.to_string(),
                declaration_name: data.name.clone(),
            });
        }

        let declaration = self.find_declaration(module_name, &data.name).ok_or_else(|| {
            CoreError::UnknownDeclaration {
                module_name: module_name.to_string(),
                declaration_name: data.name.clone(),
            }
        })?;

        match declaration {
            Declaration::Alias(alias) => match &alias.aliased_type {
                Some(aliased_type) => {
                    self.get_underlying_type_impl(module_name, aliased_type, visited)
                }
                None => Ok(None),
            },
            _ => Ok(Some(fix_custom_type_reference(
                type_reference.clone(),
                module_name,
            ))),
        }
    }

    /// 解析别名声明最终指向的非别名声明。
    /// 链以非自定义类型或空链收尾时返回 `Ok(None)`。
    pub fn get_underlying_declaration(
        &self,
        current_module_name: &str,
        declaration: &AliasTypeDeclaration,
    ) -> CoreResult<Option<Declaration>> {
        let Some(aliased_type) = &declaration.aliased_type else {
            return Ok(None);
        };

        let underlying_type = self.get_underlying_type(current_module_name, aliased_type)?;
        let Some(TypeReference::CustomTypeReference(data)) = underlying_type else {
            return Ok(None);
        };

        let module_name = if data.module_reference.name.is_empty() {
            current_module_name
        } else {
            data.module_reference.name.as_str()
        };
        Ok(self.find_declaration(module_name, &data.name))
    }

    pub fn module_names(&self) -> impl Iterator<Item = &str> {
        self.map.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declarations::Linkage;
    use crate::module::Module;
    use crate::types::create_custom_type_reference;

    fn alias(name: &str, target: Option<TypeReference>) -> AliasTypeDeclaration {
        AliasTypeDeclaration {
            name: name.to_string(),
            unique_name: None,
            aliased_type: target,
            linkage: Linkage::External,
            source_location: None,
        }
    }

    fn struct_declaration(name: &str) -> StructDeclaration {
        StructDeclaration {
            name: name.to_string(),
            unique_name: None,
            member_types: vec![],
            member_names: vec![],
            member_default_values: vec![],
            is_packed: false,
            is_literal: false,
            linkage: Linkage::External,
            member_source_positions: None,
            source_location: None,
        }
    }

    fn module_with(name: &str, declarations: ModuleDeclarations) -> Module {
        Module {
            name: name.to_string(),
            export_declarations: declarations,
            ..Default::default()
        }
    }

    #[test]
    fn test_add_and_find_declaration() {
        let mut database = DeclarationDatabase::new();
        let module = module_with(
            "m",
            ModuleDeclarations {
                struct_declarations: vec![struct_declaration("S")],
                ..Default::default()
            },
        );

        database.add_declarations(&module).unwrap();
        assert!(database.find_declaration("m", "S").is_some());
        assert!(database.find_declaration("m", "T").is_none());
        assert!(database.find_declaration("other", "S").is_none());
    }

    #[test]
    fn test_duplicate_declaration_is_rejected() {
        let mut database = DeclarationDatabase::new();
        let module = module_with(
            "m",
            ModuleDeclarations {
                struct_declarations: vec![struct_declaration("S")],
                ..Default::default()
            },
        );

        database.add_declarations(&module).unwrap();
        let error = database.add_declarations(&module).unwrap_err();
        assert!(matches!(error, CoreError::DuplicateDeclaration { .. }));
    }

    #[test]
    fn test_replace_requires_explicit_removal() {
        let mut database = DeclarationDatabase::new();
        let module = module_with(
            "m",
            ModuleDeclarations {
                struct_declarations: vec![struct_declaration("S")],
                ..Default::default()
            },
        );

        database.add_declarations(&module).unwrap();
        assert!(database.remove_module_declarations("m"));
        assert!(!database.contains_module("m"));
        database.add_declarations(&module).unwrap();
        assert!(database.find_declaration("m", "S").is_some());
    }

    #[test]
    fn test_underlying_type_resolves_alias_chain() {
        let mut database = DeclarationDatabase::new();
        let module = module_with(
            "m",
            ModuleDeclarations {
                alias_type_declarations: vec![
                    alias("A", Some(create_custom_type_reference("", "B"))),
                    alias("B", Some(create_custom_type_reference("", "S"))),
                ],
                struct_declarations: vec![struct_declaration("S")],
                ..Default::default()
            },
        );
        database.add_declarations(&module).unwrap();

        let resolved = database
            .get_underlying_type("m", &create_custom_type_reference("", "A"))
            .unwrap()
            .unwrap();
        match resolved {
            TypeReference::CustomTypeReference(data) => {
                // 未限定引用被归一化到当前模块
                assert_eq!(data.module_reference.name, "m");
                assert_eq!(data.name, "S");
            }
            other => panic!("unexpected type: {other:?}"),
        }
    }

    #[test]
    fn test_cyclic_alias_is_detected() {
        let mut database = DeclarationDatabase::new();
        let module = module_with(
            "m",
            ModuleDeclarations {
                alias_type_declarations: vec![
                    alias("X", Some(create_custom_type_reference("", "Y"))),
                    alias("Y", Some(create_custom_type_reference("", "X"))),
                ],
                ..Default::default()
            },
        );
        database.add_declarations(&module).unwrap();

        let error = database
            .get_underlying_type("m", &create_custom_type_reference("", "X"))
            .unwrap_err();
        assert!(matches!(error, CoreError::CyclicAlias { .. }));
    }

    #[test]
    fn test_empty_alias_chain_resolves_to_none() {
        let mut database = DeclarationDatabase::new();
        let module = module_with(
            "m",
            ModuleDeclarations {
                alias_type_declarations: vec![alias("Opaque", None)],
                ..Default::default()
            },
        );
        database.add_declarations(&module).unwrap();

        let resolved = database
            .get_underlying_type("m", &create_custom_type_reference("", "Opaque"))
            .unwrap();
        assert!(resolved.is_none());
    }

    #[test]
    fn test_underlying_declaration_follows_cross_module_chain() {
        let mut database = DeclarationDatabase::new();
        let other = module_with(
            "other",
            ModuleDeclarations {
                struct_declarations: vec![struct_declaration("S")],
                ..Default::default()
            },
        );
        let alias_declaration = alias("A", Some(create_custom_type_reference("other", "S")));
        let main = module_with(
            "main",
            ModuleDeclarations {
                alias_type_declarations: vec![alias_declaration.clone()],
                ..Default::default()
            },
        );
        database.add_declarations(&other).unwrap();
        database.add_declarations(&main).unwrap();

        let resolved = database
            .get_underlying_declaration("main", &alias_declaration)
            .unwrap()
            .unwrap();
        assert!(matches!(resolved, Declaration::Struct(_)));
        assert_eq!(resolved.name(), "S");
    }

    #[test]
    fn test_unknown_reference_is_an_error() {
        let database = DeclarationDatabase::new();
        let error = database
            .get_underlying_type("m", &create_custom_type_reference("m", "Missing"))
            .unwrap_err();
        assert!(matches!(error, CoreError::UnknownDeclaration { .. }));
    }
}
