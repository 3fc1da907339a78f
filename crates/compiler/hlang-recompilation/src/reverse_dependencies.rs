//! 反向依赖图
//!
//! 多重映射 `被导入模块 → {导入它的模块}`，由各模块
//! `dependencies.alias_imports[*].module_name` 填充。增量维护：
//! 模块新增/替换时更新其各导入项的条目，移除时清除反向条目。

use std::collections::{BTreeSet, HashMap};

use hlang_core::module::Module;

#[derive(Debug, Clone, Default)]
pub struct ReverseDependencyGraph {
    map: HashMap<String, BTreeSet<String>>,
}

impl ReverseDependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册一个模块的导入边
    pub fn add_module(&mut self, module: &Module) {
        for alias_import in &module.dependencies.alias_imports {
            self.map
                .entry(alias_import.module_name.clone())
                .or_default()
                .insert(module.name.clone());
        }
    }

    /// 按旧 IR 精确移除一个模块的导入边
    pub fn remove_module(&mut self, module: &Module) {
        for alias_import in &module.dependencies.alias_imports {
            if let Some(importers) = self.map.get_mut(&alias_import.module_name) {
                importers.remove(&module.name);
                if importers.is_empty() {
                    self.map.remove(&alias_import.module_name);
                }
            }
        }
    }

    /// 旧 IR 不可用时的全扫描移除
    pub fn remove_importer(&mut self, importer_name: &str) {
        self.map.retain(|_, importers| {
            importers.remove(importer_name);
            !importers.is_empty()
        });
    }

    /// 用新版本替换模块的导入边
    pub fn replace_module(&mut self, previous: Option<&Module>, module: &Module) {
        match previous {
            Some(previous) => self.remove_module(previous),
            None => self.remove_importer(&module.name),
        }
        self.add_module(module);
    }

    /// 导入了 `module_name` 的全部模块（字典序）
    pub fn range_of(&self, module_name: &str) -> impl Iterator<Item = &str> {
        self.map
            .get(module_name)
            .into_iter()
            .flat_map(|importers| importers.iter().map(String::as_str))
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hlang_core::module::{ImportModuleWithAlias, Module};

    fn module_importing(name: &str, imports: &[&str]) -> Module {
        let mut module = Module {
            name: name.to_string(),
            ..Default::default()
        };
        for import in imports {
            module.dependencies.alias_imports.push(ImportModuleWithAlias {
                module_name: import.to_string(),
                alias: import.to_string(),
                usages: vec![],
            });
        }
        module
    }

    #[test]
    fn test_add_and_range() {
        let mut graph = ReverseDependencyGraph::new();
        graph.add_module(&module_importing("b", &["a"]));
        graph.add_module(&module_importing("c", &["a"]));

        let importers: Vec<&str> = graph.range_of("a").collect();
        assert_eq!(importers, vec!["b", "c"]);
        assert_eq!(graph.range_of("b").count(), 0);
    }

    #[test]
    fn test_remove_module() {
        let mut graph = ReverseDependencyGraph::new();
        let importer = module_importing("b", &["a"]);
        graph.add_module(&importer);
        graph.remove_module(&importer);
        assert!(graph.is_empty());
    }

    #[test]
    fn test_replace_module_updates_edges() {
        let mut graph = ReverseDependencyGraph::new();
        let old_version = module_importing("b", &["a"]);
        graph.add_module(&old_version);

        let new_version = module_importing("b", &["c"]);
        graph.replace_module(Some(&old_version), &new_version);

        assert_eq!(graph.range_of("a").count(), 0);
        assert_eq!(graph.range_of("c").collect::<Vec<_>>(), vec!["b"]);
    }

    #[test]
    fn test_remove_importer_without_old_ir() {
        let mut graph = ReverseDependencyGraph::new();
        graph.add_module(&module_importing("b", &["a", "c"]));
        graph.remove_importer("b");
        assert!(graph.is_empty());
    }
}
