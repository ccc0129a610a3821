//! 服务提供者抽象接口

use crate::builder::ContainerBuilder;
use crate::pass::{CompilerPass, PassStage};
use infrastructure_common::ContainerResult;

/// 服务提供者 trait
///
/// 向构建器贡献服务定义，可选地贡献编译步骤和别名。
pub trait ServiceProvider: Send + Sync {
    /// 提供者名称，同名提供者只能注册一次
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// 注册服务定义
    fn build(&self, builder: &mut ContainerBuilder) -> ContainerResult<()>;

    /// 贡献的编译步骤
    fn pipelines(&self) -> Vec<(PassStage, Box<dyn CompilerPass>)> {
        Vec::new()
    }

    /// 贡献的别名（别名 → 目标）
    fn aliases(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    /// 是否允许重复注册并合并
    fn is_mergeable(&self) -> bool {
        false
    }
}
