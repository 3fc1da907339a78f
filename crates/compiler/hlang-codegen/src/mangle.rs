//! 符号改名
//!
//! 两种策略，按模块记录在 IR 中：仅声明名（默认，C 互操作），
//! 或 `模块名（'.'→'_'）_声明名`。`unique_name` 覆盖两者。

use hlang_core::module::NameMangling;

/// 计算一个声明的后端符号名
pub fn mangle_name(
    module_name: &str,
    declaration_name: &str,
    unique_name: Option<&str>,
    strategy: NameMangling,
) -> String {
    if let Some(unique_name) = unique_name {
        return unique_name.to_string();
    }

    match strategy {
        NameMangling::DeclarationName => declaration_name.to_string(),
        NameMangling::ModuleAndDeclarationName => {
            format!("{}_{}", module_name.replace('.', "_"), declaration_name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declaration_name_strategy() {
        assert_eq!(
            mangle_name("app.main", "run", None, NameMangling::DeclarationName),
            "run"
        );
    }

    #[test]
    fn test_module_and_declaration_name_strategy() {
        assert_eq!(
            mangle_name(
                "app.main",
                "run",
                None,
                NameMangling::ModuleAndDeclarationName
            ),
            "app_main_run"
        );
    }

    #[test]
    fn test_unique_name_overrides_strategy() {
        assert_eq!(
            mangle_name(
                "app.main",
                "run",
                Some("my_run"),
                NameMangling::ModuleAndDeclarationName
            ),
            "my_run"
        );
    }
}
