//! 容器编译配置

use crate::errors::InfrastructureResult;
use serde::{Deserialize, Serialize};

/// 容器配置
///
/// 控制编译管道与导出器的行为，可以从任意 JSON 配置树中反序列化。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    /// 编译产物的类名
    pub class_name: String,
    /// 编译产物的命名空间
    pub namespace: Option<String>,
    /// 是否按服务拆分编译单元
    pub partition: bool,
    /// 是否保留调试元数据
    pub debug: bool,
    /// 是否启用内联私有服务
    pub inline_services: bool,
    /// 是否移除未使用的私有服务
    pub remove_unused: bool,
    /// 是否启用循环引用检测
    pub enable_circular_reference_detection: bool,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            class_name: "CompiledContainer".to_string(),
            namespace: None,
            partition: false,
            debug: false,
            inline_services: true,
            remove_unused: true,
            enable_circular_reference_detection: true,
        }
    }
}

impl ContainerConfig {
    /// 从配置树创建
    pub fn from_value(value: serde_json::Value) -> InfrastructureResult<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// 开发环境配置：保留调试元数据
    pub fn development() -> Self {
        Self {
            debug: true,
            ..Self::default()
        }
    }

    /// 生产环境配置：按服务拆分编译单元
    pub fn production() -> Self {
        Self {
            partition: true,
            ..Self::default()
        }
    }

    /// 带命名空间的完整类名
    pub fn qualified_class_name(&self) -> String {
        qualified_class_name(self.namespace.as_deref(), &self.class_name)
    }
}

/// 拼接命名空间和类名，空命名空间视为没有命名空间
pub fn qualified_class_name(namespace: Option<&str>, class_name: &str) -> String {
    match namespace {
        Some(namespace) if !namespace.is_empty() => format!("{}::{}", namespace, class_name),
        _ => class_name.to_string(),
    }
}
