//! 编译管道抽象
//!
//! 管道按固定顺序执行四个阶段，每个阶段内的编译步骤按注册顺序执行，
//! 声明了优先级的步骤按优先级从高到低排列（稳定排序）。

use crate::builder::ContainerBuilder;
use infrastructure_common::ContainerResult;
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::fmt;

/// 管道阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum PassStage {
    /// 优化前：通常根据标签新增或改写定义
    BeforeOptimization,
    /// 优化：解析参数、配置选项和别名
    Optimization,
    /// 优化后：结构校验
    AfterOptimization,
    /// 移除：清理抽象、内联和未使用的定义
    Removing,
}

impl PassStage {
    /// 全部阶段，按执行顺序排列
    pub const ALL: [PassStage; 4] = [
        PassStage::BeforeOptimization,
        PassStage::Optimization,
        PassStage::AfterOptimization,
        PassStage::Removing,
    ];

    /// 阶段名称
    pub fn name(self) -> &'static str {
        match self {
            Self::BeforeOptimization => "before-optimization",
            Self::Optimization => "optimization",
            Self::AfterOptimization => "after-optimization",
            Self::Removing => "removing",
        }
    }
}

impl fmt::Display for PassStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 编译步骤 trait
///
/// 编译步骤可以读取标签、定义和参数，并原地改写构建器。对同一输入重复执行
/// 必须得到相同结果。
pub trait CompilerPass: Send + Sync {
    /// 步骤名称
    fn name(&self) -> &str {
        let full = std::any::type_name::<Self>();
        full.rsplit("::").next().unwrap_or(full)
    }

    /// 阶段内优先级，数值越高越先执行
    fn priority(&self) -> i32 {
        0
    }

    /// 处理构建器
    fn process(&mut self, builder: &mut ContainerBuilder) -> ContainerResult<()>;
}

/// 管道配置
#[derive(Default)]
pub struct PipelineConfig {
    stages: BTreeMap<PassStage, Vec<Box<dyn CompilerPass>>>,
}

impl PipelineConfig {
    /// 创建空配置
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加编译步骤
    pub fn add_pass(&mut self, stage: PassStage, pass: Box<dyn CompilerPass>) {
        self.stages.entry(stage).or_default().push(pass);
    }

    /// 阶段内按执行顺序排列的编译步骤
    pub fn passes_mut(&mut self, stage: PassStage) -> Vec<&mut Box<dyn CompilerPass>> {
        let mut passes: Vec<&mut Box<dyn CompilerPass>> = self
            .stages
            .get_mut(&stage)
            .map(|passes| passes.iter_mut().collect())
            .unwrap_or_default();
        passes.sort_by_key(|pass| Reverse(pass.priority()));
        passes
    }

    /// 阶段内按执行顺序排列的步骤名称
    pub fn pass_names(&self, stage: PassStage) -> Vec<String> {
        let mut passes: Vec<&Box<dyn CompilerPass>> = self
            .stages
            .get(&stage)
            .map(|passes| passes.iter().collect())
            .unwrap_or_default();
        passes.sort_by_key(|pass| Reverse(pass.priority()));
        passes.iter().map(|pass| pass.name().to_string()).collect()
    }

    /// 编译步骤总数
    pub fn len(&self) -> usize {
        self.stages.values().map(Vec::len).sum()
    }

    /// 是否没有编译步骤
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 合并另一份配置，保持各自的注册顺序
    pub fn merge(&mut self, other: PipelineConfig) {
        for (stage, passes) in other.stages {
            self.stages.entry(stage).or_default().extend(passes);
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for stage in PassStage::ALL {
            map.entry(&stage.name(), &self.pass_names(stage));
        }
        map.finish()
    }
}
