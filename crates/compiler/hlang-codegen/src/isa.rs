//! 目标 ISA 构建

use std::sync::Arc;

use cranelift_codegen::isa::TargetIsa;
use cranelift_codegen::settings::{self, Configurable};

use crate::driver::OptimizationLevel;
use crate::error::{CodegenError, CodegenResult};

/// 为宿主机器创建目标 ISA
pub fn create_native_isa(
    optimization_level: OptimizationLevel,
    position_independent: bool,
) -> CodegenResult<Arc<dyn TargetIsa>> {
    let mut flag_builder = settings::builder();

    let opt_level = match optimization_level {
        OptimizationLevel::None => "none",
        OptimizationLevel::Speed => "speed",
        OptimizationLevel::SpeedAndSize => "speed_and_size",
    };
    flag_builder
        .set("opt_level", opt_level)
        .map_err(|error| CodegenError::BackendError(format!("could not set opt_level: {error}")))?;
    flag_builder
        .set("use_colocated_libcalls", "false")
        .map_err(|error| {
            CodegenError::BackendError(format!("could not set use_colocated_libcalls: {error}"))
        })?;
    flag_builder
        .set("is_pic", if position_independent { "true" } else { "false" })
        .map_err(|error| CodegenError::BackendError(format!("could not set is_pic: {error}")))?;

    let isa_builder = cranelift_native::builder().map_err(|message| {
        CodegenError::BackendError(format!("host machine is not supported: {message}"))
    })?;

    isa_builder
        .finish(settings::Flags::new(flag_builder))
        .map_err(|error| CodegenError::BackendError(format!("could not finish ISA: {error}")))
}
