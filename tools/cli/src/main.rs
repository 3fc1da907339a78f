//! hlang 构建/JIT 驱动
//!
//! ```text
//! hlang build-executable <file> [--build-directory=DIR] [--entry=NAME]
//!                               [--output=OUT] [--module-search-path=DIR]*
//! hlang build-artifact   [--artifact-file=F] [--build-directory=DIR]
//!                        [--header-search-path=DIR]*
//! hlang run              [--artifact-file=F] [--build-directory=DIR]
//! ```
//!
//! 成功退出码为 0；任何降级、链接或解析错误为非零。诊断按行
//! 写到 stderr。

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use hlang_codegen::driver::{BackendOptions, OptimizationLevel};
use hlang_codegen::{emit_object_file, link, LinkType, LinkerInput};
use hlang_core::module::Module;
use hlang_core::serialization;
use hlang_core::DeclarationDatabase;
use hlang_project::{get_artifact, resolve_include_files, ArtifactInfo, ArtifactType};

#[derive(Parser)]
#[command(name = "hlang", version, about = "hlang compiler toolchain driver")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 把单个模块源文件构建为可执行文件
    BuildExecutable {
        /// 模块源文件（`.hl`）
        file: PathBuf,
        #[arg(long, default_value = "build")]
        build_directory: PathBuf,
        /// 入口符号（默认 main）
        #[arg(long)]
        entry: Option<String>,
        #[arg(long)]
        output: Option<PathBuf>,
        /// 解析导入模块的搜索目录，可多次给出
        #[arg(long = "module-search-path")]
        module_search_paths: Vec<PathBuf>,
    },
    /// 构建一个工件（可执行文件或库）
    BuildArtifact {
        #[arg(long, default_value = "hlang_artifact.json")]
        artifact_file: PathBuf,
        #[arg(long, default_value = "build")]
        build_directory: PathBuf,
        /// C 头文件搜索目录（交给外部导入器），可多次给出
        #[arg(long = "header-search-path")]
        header_search_paths: Vec<PathBuf>,
    },
    /// JIT 运行一个工件并监视源文件变化
    Run {
        #[arg(long, default_value = "hlang_artifact.json")]
        artifact_file: PathBuf,
        #[arg(long, default_value = "build")]
        build_directory: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::BuildExecutable {
            file,
            build_directory,
            entry,
            output,
            module_search_paths,
        } => build_executable(&file, &build_directory, entry, output, &module_search_paths),
        Command::BuildArtifact {
            artifact_file,
            build_directory,
            header_search_paths,
        } => build_artifact(&artifact_file, &build_directory, &header_search_paths),
        Command::Run {
            artifact_file,
            build_directory,
        } => run(&artifact_file, &build_directory).await,
    };

    if let Err(error) = result {
        eprintln!("error: {error:#}");
        std::process::exit(1);
    }
}

/// 读取模块并按搜索路径递归装入其导入模块的声明
fn load_module_with_imports(
    file: &Path,
    module_search_paths: &[PathBuf],
) -> Result<(Module, DeclarationDatabase)> {
    let module = serialization::read_module_from_file(file)
        .with_context(|| format!("could not read module '{}'", file.display()))?;

    let mut database = DeclarationDatabase::new();
    database.add_declarations(&module)?;

    let mut pending: Vec<String> = module
        .dependencies
        .alias_imports
        .iter()
        .map(|alias_import| alias_import.module_name.clone())
        .collect();
    let mut visited: HashSet<String> = HashSet::new();
    visited.insert(module.name.clone());

    while let Some(import_name) = pending.pop() {
        if !visited.insert(import_name.clone()) {
            continue;
        }

        let Some(path) = module_search_paths
            .iter()
            .map(|directory| directory.join(format!("{import_name}.hl")))
            .find(|candidate| candidate.exists())
        else {
            bail!("imported module '{import_name}' not found in any --module-search-path");
        };

        let imported = serialization::read_module_export_declarations(&path)
            .with_context(|| format!("could not read module '{}'", path.display()))?;
        pending.extend(
            imported
                .dependencies
                .alias_imports
                .iter()
                .map(|alias_import| alias_import.module_name.clone()),
        );
        database.add_declarations(&imported)?;
    }

    Ok((module, database))
}

fn backend_options() -> BackendOptions {
    BackendOptions {
        optimization_level: OptimizationLevel::Speed,
        emit_debug_locations: true,
    }
}

fn build_executable(
    file: &Path,
    build_directory: &Path,
    entry: Option<String>,
    output: Option<PathBuf>,
    module_search_paths: &[PathBuf],
) -> Result<()> {
    std::fs::create_dir_all(build_directory)?;

    let (module, database) = load_module_with_imports(file, module_search_paths)?;

    let object_path = build_directory.join(format!("{}.o", module.name));
    emit_object_file(&database, &module, &backend_options(), &object_path)?;

    let output_path = output.unwrap_or_else(|| build_directory.join(&module.name));
    link(
        &LinkerInput {
            object_files: vec![object_path],
            library_search_paths: vec![],
            libraries: vec![],
            entry_point: entry,
            link_type: LinkType::Executable,
            debug: true,
        },
        &output_path,
    )?;

    tracing::info!(output = %output_path.display(), "Executable built");
    Ok(())
}

fn build_artifact(
    artifact_file: &Path,
    build_directory: &Path,
    header_search_paths: &[PathBuf],
) -> Result<()> {
    std::fs::create_dir_all(build_directory)?;

    let artifact = get_artifact(artifact_file)?;

    if let Some(ArtifactInfo::Library(library)) = &artifact.info {
        if !library.c_headers.is_empty() {
            // C 头导入由外部导入器完成；搜索路径原样转交
            tracing::warn!(
                headers = library.c_headers.len(),
                search_paths = header_search_paths.len(),
                "C header import is delegated to the external importer"
            );
        }
    }

    let source_files = resolve_include_files(&artifact)?;
    if source_files.is_empty() {
        bail!("artifact '{}' has no source files", artifact.name);
    }

    // 先全部装入数据库，再逐个发射目标文件
    let mut database = DeclarationDatabase::new();
    let mut modules = Vec::with_capacity(source_files.len());
    for source_file in &source_files {
        let module = serialization::read_module_from_file(source_file)
            .with_context(|| format!("could not read module '{}'", source_file.display()))?;
        database.add_declarations(&module)?;
        modules.push(module);
    }

    let mut object_files = Vec::with_capacity(modules.len());
    for module in &modules {
        let object_path = build_directory.join(format!("{}.o", module.name));
        emit_object_file(&database, module, &backend_options(), &object_path)?;
        object_files.push(object_path);
    }

    let (link_type, output_path) = match artifact.artifact_type {
        ArtifactType::Executable => (LinkType::Executable, build_directory.join(&artifact.name)),
        ArtifactType::Library => (
            LinkType::SharedLibrary,
            build_directory.join(format!("lib{}.so", artifact.name)),
        ),
    };

    link(
        &LinkerInput {
            object_files,
            library_search_paths: vec![],
            libraries: vec![],
            entry_point: artifact.entry_point().map(str::to_string),
            link_type,
            debug: true,
        },
        &output_path,
    )?;

    tracing::info!(artifact = %artifact.name, output = %output_path.display(), "Artifact built");
    Ok(())
}

async fn run(artifact_file: &Path, build_directory: &Path) -> Result<()> {
    let runner = hlang_jit::setup_jit_and_watch(artifact_file, &[], build_directory)?;

    let entry_point = runner
        .artifact()
        .entry_point()
        .unwrap_or("main")
        .to_string();
    let handle = runner.call_as_main_without_arguments(&entry_point)?;
    let exit_code = handle.await.context("entry point panicked")?;

    tracing::info!(exit_code, "Program finished");
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
    Ok(())
}
