//! JIT 运行器端到端测试：装载、执行、修改源码并观察桩切换。

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use hlang_core::declarations::{FunctionDeclaration, FunctionDefinition, Linkage};
use hlang_core::expressions::{
    create_constant_expression, create_expression, create_return_expression, create_statement,
    create_variable_expression, AccessExpression, AccessType, CallExpression, ExpressionData,
    ExpressionIndex, Statement,
};
use hlang_core::module::{ImportModuleWithAlias, Module, ModuleDeclarations, ModuleDefinitions};
use hlang_core::serialization;
use hlang_core::types::{create_integer_type_type_reference, FunctionType, TypeReference};
use hlang_jit::runner::setup_jit_and_watch;
use hlang_project::{write_artifact_to_file, Artifact, ArtifactInfo, ArtifactType, ExecutableInfo};

fn int32() -> TypeReference {
    create_integer_type_type_reference(32, true)
}

fn index(value: u64) -> ExpressionIndex {
    ExpressionIndex::new(value)
}

fn declaration(name: &str, outputs: Vec<TypeReference>) -> FunctionDeclaration {
    FunctionDeclaration {
        name: name.to_string(),
        unique_name: None,
        function_type: FunctionType {
            input_parameter_types: vec![],
            output_parameter_types: outputs,
            is_variadic: false,
        },
        input_parameter_names: vec![],
        output_parameter_names: vec!["result".to_string()],
        input_parameter_source_positions: None,
        output_parameter_source_positions: None,
        linkage: Linkage::External,
        source_location: None,
    }
}

fn return_constant(value: &str) -> Vec<Statement> {
    vec![create_statement(vec![
        create_return_expression(Some(index(1))),
        create_constant_expression(int32(), value),
    ])]
}

fn call_local(function_name: &str) -> Vec<Statement> {
    vec![create_statement(vec![
        create_return_expression(Some(index(1))),
        create_expression(ExpressionData::CallExpression(CallExpression {
            expression: index(2),
            arguments: vec![],
        })),
        create_variable_expression(function_name, AccessType::Read),
    ])]
}

fn call_imported(alias: &str, function_name: &str) -> Vec<Statement> {
    vec![create_statement(vec![
        create_return_expression(Some(index(1))),
        create_expression(ExpressionData::CallExpression(CallExpression {
            expression: index(2),
            arguments: vec![],
        })),
        create_expression(ExpressionData::AccessExpression(AccessExpression {
            expression: index(3),
            member_name: function_name.to_string(),
            access_type: AccessType::Read,
        })),
        create_variable_expression(alias, AccessType::Read),
    ])]
}

/// `module test; function get_result() -> Int32 { return <value>; }
///  export function main() -> Int32 { return get_result(); }`
fn test_module(value: &str) -> Module {
    Module {
        name: "test".to_string(),
        export_declarations: ModuleDeclarations {
            function_declarations: vec![declaration("main", vec![int32()])],
            ..Default::default()
        },
        internal_declarations: ModuleDeclarations {
            function_declarations: vec![FunctionDeclaration {
                linkage: Linkage::Private,
                ..declaration("get_result", vec![int32()])
            }],
            ..Default::default()
        },
        definitions: ModuleDefinitions {
            function_definitions: vec![
                FunctionDefinition {
                    name: "get_result".to_string(),
                    statements: return_constant(value),
                    source_location: None,
                },
                FunctionDefinition {
                    name: "main".to_string(),
                    statements: call_local("get_result"),
                    source_location: None,
                },
            ],
        },
        ..Default::default()
    }
}

fn write_module(directory: &Path, file_name: &str, module: &Module) -> PathBuf {
    let path = directory.join(file_name);
    serialization::write_module_to_file(&path, module).unwrap();
    path
}

fn write_executable_artifact(directory: &Path, entry_point: &str) -> PathBuf {
    let artifact = Artifact {
        file_path: directory.join("hlang_artifact.json"),
        name: "jit_test".to_string(),
        version: "0.1.0".parse().unwrap(),
        artifact_type: ArtifactType::Executable,
        dependencies: vec![],
        info: Some(ArtifactInfo::Executable(ExecutableInfo {
            source: PathBuf::from("main.hl"),
            entry_point: entry_point.to_string(),
            include: vec!["./*.hl".to_string()],
        })),
    };
    let path = directory.join("hlang_artifact.json");
    write_artifact_to_file(&artifact, &path).unwrap();
    path
}

/// 轮询直到函数指针返回期望值或超时
fn wait_for_result(
    function_pointer: extern "C" fn() -> i32,
    expected: i32,
    timeout: Duration,
) -> i32 {
    let deadline = Instant::now() + timeout;
    loop {
        let result = function_pointer();
        if result == expected || Instant::now() >= deadline {
            return result;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
}

#[test]
fn test_run_jit_and_modify_code() {
    let root = tempfile::tempdir().unwrap();
    let build_directory = root.path().join("build");

    write_module(root.path(), "main.hl", &test_module("10"));
    let artifact_path = write_executable_artifact(root.path(), "main");

    let runner = setup_jit_and_watch(&artifact_path, &[], &build_directory).unwrap();

    let function_pointer: extern "C" fn() -> i32 =
        unsafe { runner.get_function("test", "main") }.expect("main must resolve");

    let first_result = function_pointer();
    assert_eq!(first_result, 10);

    // 覆盖源文件：get_result 改为返回 20
    write_module(root.path(), "main.hl", &test_module("20"));

    // 去抖 + 重编译后，同一个函数指针观察到新函数体
    let second_result = wait_for_result(function_pointer, 20, Duration::from_secs(10));
    assert_eq!(second_result, 20);
}

#[test]
fn test_cross_module_reload_through_stub() {
    let root = tempfile::tempdir().unwrap();
    let build_directory = root.path().join("build");

    // 模块 a 导出 get_value；模块 app 经别名导入调用它
    let module_a = Module {
        name: "a".to_string(),
        export_declarations: ModuleDeclarations {
            function_declarations: vec![declaration("get_value", vec![int32()])],
            ..Default::default()
        },
        definitions: ModuleDefinitions {
            function_definitions: vec![FunctionDefinition {
                name: "get_value".to_string(),
                statements: return_constant("1"),
                source_location: None,
            }],
        },
        ..Default::default()
    };

    let mut module_app = Module {
        name: "app".to_string(),
        export_declarations: ModuleDeclarations {
            function_declarations: vec![declaration("main", vec![int32()])],
            ..Default::default()
        },
        definitions: ModuleDefinitions {
            function_definitions: vec![FunctionDefinition {
                name: "main".to_string(),
                statements: call_imported("a", "get_value"),
                source_location: None,
            }],
        },
        ..Default::default()
    };
    module_app
        .dependencies
        .alias_imports
        .push(ImportModuleWithAlias {
            module_name: "a".to_string(),
            alias: "a".to_string(),
            usages: vec!["get_value".to_string()],
        });

    write_module(root.path(), "a.hl", &module_a);
    write_module(root.path(), "app.hl", &module_app);
    let artifact_path = write_executable_artifact(root.path(), "main");

    let runner = setup_jit_and_watch(&artifact_path, &[], &build_directory).unwrap();

    let main: extern "C" fn() -> i32 =
        unsafe { runner.get_function("app", "main") }.expect("main must resolve");
    assert_eq!(main(), 1);

    // 只改 a：app 的调用经桩进入新一代 get_value
    let mut updated_a = module_a.clone();
    updated_a.definitions.function_definitions[0].statements = return_constant("7");
    write_module(root.path(), "a.hl", &updated_a);

    assert_eq!(wait_for_result(main, 7, Duration::from_secs(10)), 7);
}

#[test]
fn test_failed_reload_keeps_previous_generation() {
    let root = tempfile::tempdir().unwrap();
    let build_directory = root.path().join("build");

    write_module(root.path(), "main.hl", &test_module("10"));
    let artifact_path = write_executable_artifact(root.path(), "main");

    let runner = setup_jit_and_watch(&artifact_path, &[], &build_directory).unwrap();
    let main: extern "C" fn() -> i32 =
        unsafe { runner.get_function("test", "main") }.expect("main must resolve");
    assert_eq!(main(), 10);

    // 畸形源码：解析失败，模块不被重装
    std::fs::write(root.path().join("main.hl"), "this is not json").unwrap();
    std::thread::sleep(Duration::from_millis(1500));
    assert_eq!(main(), 10);

    // 恢复为合法源码后重载继续工作：运行器保持存活
    write_module(root.path(), "main.hl", &test_module("30"));
    assert_eq!(wait_for_result(main, 30, Duration::from_secs(10)), 30);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_call_as_main_without_arguments() {
    let root = tempfile::tempdir().unwrap();
    let build_directory = root.path().join("build");

    write_module(root.path(), "main.hl", &test_module("0"));
    let artifact_path = write_executable_artifact(root.path(), "main");

    let runner = setup_jit_and_watch(&artifact_path, &[], &build_directory).unwrap();
    let handle = runner.call_as_main_without_arguments("main").unwrap();
    assert_eq!(handle.await.unwrap(), 0);
}

#[test]
fn test_cyclic_alias_module_is_not_installed() {
    use hlang_core::declarations::AliasTypeDeclaration;
    use hlang_core::types::create_custom_type_reference;

    let root = tempfile::tempdir().unwrap();
    let build_directory = root.path().join("build");

    // type X = Y; type Y = X;
    let mut module = Module {
        name: "cyclic".to_string(),
        ..Default::default()
    };
    module.export_declarations.alias_type_declarations = vec![
        AliasTypeDeclaration {
            name: "X".to_string(),
            unique_name: None,
            aliased_type: Some(create_custom_type_reference("", "Y")),
            linkage: Linkage::External,
            source_location: None,
        },
        AliasTypeDeclaration {
            name: "Y".to_string(),
            unique_name: None,
            aliased_type: Some(create_custom_type_reference("", "X")),
            linkage: Linkage::External,
            source_location: None,
        },
    ];

    write_module(root.path(), "cyclic.hl", &module);
    let artifact_path = write_executable_artifact(root.path(), "main");

    let result = setup_jit_and_watch(&artifact_path, &[], &build_directory);
    assert!(result.is_err());
    let message = result.err().unwrap().to_string();
    assert!(message.contains("Cyclic alias"), "unexpected error: {message}");
}

#[test]
fn test_get_function_for_unknown_symbol_is_none() {
    let root = tempfile::tempdir().unwrap();
    let build_directory = root.path().join("build");

    write_module(root.path(), "main.hl", &test_module("0"));
    let artifact_path = write_executable_artifact(root.path(), "main");

    let runner = setup_jit_and_watch(&artifact_path, &[], &build_directory).unwrap();
    let missing: Option<extern "C" fn() -> i32> =
        unsafe { runner.get_function("test", "missing") };
    assert!(missing.is_none());

    let missing_module: Option<extern "C" fn() -> i32> =
        unsafe { runner.get_function("nope", "main") };
    assert!(missing_module.is_none());
}
