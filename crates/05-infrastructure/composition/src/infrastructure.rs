//! 容器基础设施主入口

use crate::builder::ContainerBootstrapper;
use chrono::{DateTime, Utc};
use di_abstractions::{Instance, ServiceContainer};
use di_impl::{CompiledContainer, EntryKind, PipelineReport, RuntimeContainer};
use infrastructure_common::{ContainerConfig, InfrastructureError, InfrastructureResult};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

/// 编译完成的容器基础设施
///
/// 持有运行时容器以及本次编译的摘要信息，负责运行状态和统计。
pub struct ContainerInfrastructure {
    /// 运行时容器
    container: RuntimeContainer,
    /// 编译配置
    config: ContainerConfig,
    /// 编译标识
    compilation_id: Uuid,
    /// 编译时间
    compiled_at: DateTime<Utc>,
    /// 已注册的服务提供者
    providers: Vec<String>,
    /// 编译管道报告
    report: PipelineReport,
    /// 调试清单
    manifest: Option<String>,
    /// 启动前必须设置的公开合成服务
    required_synthetic: Vec<String>,
    /// 运行状态
    status: RwLock<InfrastructureStatus>,
    /// 统计信息
    metrics: RwLock<InfrastructureMetrics>,
    /// 解析次数
    resolutions: AtomicU64,
}

impl ContainerInfrastructure {
    /// 创建容器启动器
    pub fn builder() -> ContainerBootstrapper {
        ContainerBootstrapper::new()
    }

    /// 内部构造函数
    pub(crate) fn new(
        compiled: CompiledContainer,
        config: ContainerConfig,
        providers: Vec<String>,
        report: PipelineReport,
        manifest: Option<String>,
    ) -> Self {
        let required_synthetic = compiled
            .entries()
            .values()
            .filter(|entry| entry.kind == EntryKind::Synthetic && entry.public)
            .map(|entry| entry.id.clone())
            .collect();
        let metrics = InfrastructureMetrics {
            registered_services_count: compiled.entries().len(),
            aliases_count: compiled.aliases().len(),
            providers_count: providers.len(),
            executed_passes_count: report.executed.len(),
            ..InfrastructureMetrics::default()
        };

        Self {
            compilation_id: compiled.compilation_id(),
            compiled_at: compiled.compiled_at(),
            container: compiled.into_container(),
            config,
            providers,
            report,
            manifest,
            required_synthetic,
            status: RwLock::new(InfrastructureStatus::Initialized),
            metrics: RwLock::new(metrics),
            resolutions: AtomicU64::new(0),
        }
    }

    /// 启动：检查公开合成服务是否都已设置
    pub fn start(&self) -> InfrastructureResult<()> {
        info!("启动容器 {}", self.container.class_name());
        *self.status.write() = InfrastructureStatus::Starting;
        self.metrics.write().start_time = Some(Utc::now());

        let missing: Vec<&str> = self
            .required_synthetic
            .iter()
            .filter(|id| !self.container.has(id))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            error!("合成服务未设置: {:?}", missing);
            *self.status.write() = InfrastructureStatus::Failed;
            return Err(InfrastructureError::BootstrapFailed {
                message: format!("合成服务未设置: {}", missing.join(", ")),
            });
        }

        *self.status.write() = InfrastructureStatus::Running;
        info!("容器启动完成");
        Ok(())
    }

    /// 停止
    pub fn stop(&self) -> InfrastructureResult<()> {
        info!("停止容器 {}", self.container.class_name());
        *self.status.write() = InfrastructureStatus::Stopped;
        self.metrics.write().stop_time = Some(Utc::now());
        Ok(())
    }

    /// 获取服务
    pub fn get(&self, id: &str) -> InfrastructureResult<Instance> {
        self.resolutions.fetch_add(1, Ordering::Relaxed);
        Ok(self.container.get(id)?)
    }

    /// 获取服务并转换为具体类型
    pub fn resolve<T: Any + Send + Sync>(&self, id: &str) -> InfrastructureResult<Arc<T>> {
        self.resolutions.fetch_add(1, Ordering::Relaxed);
        Ok(self.container.resolve::<T>(id)?)
    }

    /// 设置合成服务
    pub fn set(&self, id: &str, instance: Instance) -> InfrastructureResult<()> {
        Ok(self.container.set(id, instance)?)
    }

    /// 获取参数并反序列化
    pub fn parameter<T: for<'de> Deserialize<'de>>(&self, name: &str) -> InfrastructureResult<T> {
        let value = self.container.get_parameter(name)?;
        Ok(T::deserialize(value)?)
    }

    pub fn container(&self) -> &RuntimeContainer {
        &self.container
    }

    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    pub fn compilation_id(&self) -> Uuid {
        self.compilation_id
    }

    pub fn compiled_at(&self) -> DateTime<Utc> {
        self.compiled_at
    }

    pub fn providers(&self) -> &[String] {
        &self.providers
    }

    pub fn report(&self) -> &PipelineReport {
        &self.report
    }

    /// 调试模式下的编译清单
    pub fn manifest(&self) -> Option<&str> {
        self.manifest.as_deref()
    }

    /// 获取运行状态
    pub fn status(&self) -> InfrastructureStatus {
        *self.status.read()
    }

    /// 获取统计信息
    pub fn metrics(&self) -> InfrastructureMetrics {
        let mut metrics = self.metrics.read().clone();
        metrics.resolution_count = self.resolutions.load(Ordering::Relaxed);
        metrics.construction_count = self.container.constructions();
        metrics.proxies_count = self.container.proxies_created();
        metrics
    }
}

impl std::fmt::Debug for ContainerInfrastructure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerInfrastructure")
            .field("container", &self.container)
            .field("compilation_id", &self.compilation_id)
            .field("status", &self.status())
            .finish()
    }
}

/// 运行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InfrastructureStatus {
    /// 已编译
    Initialized,
    /// 启动中
    Starting,
    /// 运行中
    Running,
    /// 已停止
    Stopped,
    /// 失败
    Failed,
}

/// 统计信息
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InfrastructureMetrics {
    /// 启动时间
    pub start_time: Option<DateTime<Utc>>,
    /// 停止时间
    pub stop_time: Option<DateTime<Utc>>,
    /// 编译后的服务数量
    pub registered_services_count: usize,
    /// 别名数量
    pub aliases_count: usize,
    /// 服务提供者数量
    pub providers_count: usize,
    /// 执行的编译步骤数量
    pub executed_passes_count: usize,
    /// 服务解析次数
    pub resolution_count: u64,
    /// 实际构造次数
    pub construction_count: usize,
    /// 创建的代理数量
    pub proxies_count: usize,
}

impl InfrastructureMetrics {
    /// 计算运行时间
    pub fn uptime(&self) -> Option<chrono::Duration> {
        match (self.start_time, self.stop_time) {
            (Some(start), Some(stop)) => Some(stop - start),
            (Some(start), None) => Some(Utc::now() - start),
            _ => None,
        }
    }
}
