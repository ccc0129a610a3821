//! 编译管道引擎
//!
//! 内置步骤与服务提供者贡献的步骤在同一阶段内按优先级合并执行（稳定排序，
//! 同优先级时内置步骤在前）。内置步骤每次运行都重新创建，不会被写回构建器，
//! 因此对同一个构建器重复编译不会重复注册它们。

use crate::passes::{
    CheckDefinitionsPass, InlineServiceDefinitionsPass, RemoveAbstractDefinitionsPass,
    RemoveUnusedDefinitionsPass, ResolveAliasesPass, ResolveInvalidReferencesPass,
    ResolveOptionDefinitionPass, ResolveParameterPlaceholdersPass,
    ResolveTaggedIteratorArgumentPass,
};
use di_abstractions::{CompilerPass, ContainerBuilder, PassStage, PipelineConfig};
use infrastructure_common::{ContainerConfig, ContainerResult};
use serde::Serialize;
use std::cmp::Reverse;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// 按配置生成内置步骤
pub fn default_pipeline(config: &ContainerConfig) -> PipelineConfig {
    let mut pipeline = PipelineConfig::new();
    pipeline.add_pass(
        PassStage::BeforeOptimization,
        Box::new(ResolveTaggedIteratorArgumentPass::new()),
    );

    pipeline.add_pass(PassStage::Optimization, Box::new(ResolveParameterPlaceholdersPass::new()));
    pipeline.add_pass(PassStage::Optimization, Box::new(ResolveOptionDefinitionPass::new()));
    pipeline.add_pass(PassStage::Optimization, Box::new(ResolveAliasesPass::new()));
    pipeline.add_pass(PassStage::Optimization, Box::new(ResolveInvalidReferencesPass::new()));

    pipeline.add_pass(PassStage::AfterOptimization, Box::new(CheckDefinitionsPass::new()));

    pipeline.add_pass(PassStage::Removing, Box::new(RemoveAbstractDefinitionsPass::new()));
    if config.inline_services {
        pipeline.add_pass(PassStage::Removing, Box::new(InlineServiceDefinitionsPass::new()));
    }
    if config.remove_unused {
        pipeline.add_pass(PassStage::Removing, Box::new(RemoveUnusedDefinitionsPass::new()));
    }
    pipeline
}

/// 一次步骤执行记录
#[derive(Debug, Clone, Serialize)]
pub struct ExecutedPass {
    pub stage: PassStage,
    pub name: String,
    pub elapsed: Duration,
}

/// 管道执行报告
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineReport {
    pub executed: Vec<ExecutedPass>,
}

impl PipelineReport {
    /// 按执行顺序排列的步骤名称
    pub fn pass_names(&self) -> Vec<&str> {
        self.executed.iter().map(|pass| pass.name.as_str()).collect()
    }

    /// 总耗时
    pub fn total_elapsed(&self) -> Duration {
        self.executed.iter().map(|pass| pass.elapsed).sum()
    }
}

/// 管道引擎
#[derive(Debug, Default)]
pub struct PipelineEngine {
    defaults: PipelineConfig,
}

impl PipelineEngine {
    /// 只执行构建器中已注册步骤的引擎
    pub fn new() -> Self {
        Self::default()
    }

    /// 附带内置步骤的引擎
    pub fn with_defaults(config: &ContainerConfig) -> Self {
        Self {
            defaults: default_pipeline(config),
        }
    }

    /// 按阶段顺序执行全部步骤
    ///
    /// 执行期间管道配置从构建器中取出，结束后（无论成功与否）归还。
    pub fn run(&mut self, builder: &mut ContainerBuilder) -> ContainerResult<PipelineReport> {
        let mut registered = builder.take_pipeline_config();
        info!(
            "开始执行编译管道: {} 个内置步骤, {} 个注册步骤",
            self.defaults.len(),
            registered.len()
        );
        let result = self.run_stages(&mut registered, builder);
        builder.restore_pipeline_config(registered);

        match &result {
            Ok(report) => info!(
                "编译管道执行完成, 共 {} 个步骤, 耗时 {:?}",
                report.executed.len(),
                report.total_elapsed()
            ),
            Err(error) => warn!("编译管道执行失败: {}", error),
        }
        result
    }

    fn run_stages(
        &mut self,
        registered: &mut PipelineConfig,
        builder: &mut ContainerBuilder,
    ) -> ContainerResult<PipelineReport> {
        let mut report = PipelineReport::default();
        for stage in PassStage::ALL {
            let mut passes: Vec<&mut Box<dyn CompilerPass>> = self.defaults.passes_mut(stage);
            passes.extend(registered.passes_mut(stage));
            passes.sort_by_key(|pass| Reverse(pass.priority()));

            for pass in passes {
                let name = pass.name().to_string();
                debug!("执行编译步骤 {} ({})", name, stage);
                let started = Instant::now();
                pass.process(builder)?;
                report.executed.push(ExecutedPass {
                    stage,
                    name,
                    elapsed: started.elapsed(),
                });
            }
        }
        Ok(report)
    }
}
