//! 错误类型定义

use thiserror::Error;

/// 容器错误类型
///
/// 覆盖容器构建、编译（管道、解析、导出）以及运行时解析的全部失败情形。
#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("服务未找到: {id}")]
    NotFound { id: String },

    #[error("别名无效: {alias}, 原因: {message}")]
    InvalidAlias { alias: String, message: String },

    #[error("检测到循环引用: {}", .build_stack.join(" -> "))]
    CircularReference { build_stack: Vec<String> },

    #[error("服务提供者重复注册: {provider}")]
    DuplicateServiceProvider { provider: String },

    #[error("服务不是公开的: {id}")]
    ServiceNotPublic { id: String },

    #[error("服务不是合成服务，不能直接设置: {id}")]
    NotSynthetic { id: String },

    #[error("合成服务尚未设置: {id}")]
    SyntheticNotSet { id: String },

    #[error("容器导出失败: {id}, 原因: {message}")]
    Dump { id: String, message: String },

    #[error("参数无效: {message}")]
    InvalidArgument { message: String },

    #[error("服务定义无效: {id}, 原因: {message}")]
    InvalidDefinition { id: String, message: String },

    #[error("参数不存在: {name}")]
    ParameterNotFound { name: String },

    #[error("参数循环引用: {}", .chain.join(" -> "))]
    ParameterCircularReference { chain: Vec<String> },

    #[error("容器构建器已冻结，不能执行: {operation}")]
    Frozen { operation: String },

    #[error("运行时检测到循环依赖: {}", .build_stack.join(" -> "))]
    CircularDependencyAtRuntime { build_stack: Vec<String> },

    #[error("服务创建失败: {id}, 原因: {source}")]
    ConstructionFailed {
        id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("服务类型不匹配: {id}, 期望 {expected}")]
    TypeMismatch { id: String, expected: String },

    #[error("容器内部错误: {message}")]
    Internal { message: String },
}

impl ContainerError {
    /// 创建服务未找到错误
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// 创建参数无效错误
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// 创建服务定义无效错误
    pub fn invalid_definition(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidDefinition {
            id: id.into(),
            message: message.into(),
        }
    }

    /// 创建导出错误
    pub fn dump(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Dump {
            id: id.into(),
            message: message.into(),
        }
    }

    /// 创建冻结错误
    pub fn frozen(operation: impl Into<String>) -> Self {
        Self::Frozen {
            operation: operation.into(),
        }
    }

    /// 创建内部错误
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// 运行时出现该错误是否意味着编译器自身的不变量被破坏
    ///
    /// 循环引用和导出错误只属于编译期，正确编译的容器在 `get`/`has` 时不应出现。
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::Internal { .. }
                | Self::CircularDependencyAtRuntime { .. }
                | Self::CircularReference { .. }
                | Self::Dump { .. }
        )
    }
}

/// 基础设施错误类型
#[derive(Error, Debug)]
pub enum InfrastructureError {
    #[error("容器错误: {source}")]
    ContainerError {
        #[from]
        source: ContainerError,
    },

    #[error("配置解析失败: {source}")]
    ConfigError {
        #[from]
        source: serde_json::Error,
    },

    #[error("基础设施启动失败: {message}")]
    BootstrapFailed { message: String },
}

/// 结果类型别名
pub type ContainerResult<T> = Result<T, ContainerError>;
pub type InfrastructureResult<T> = Result<T, InfrastructureError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circular_reference_display_lists_stack() {
        let error = ContainerError::CircularReference {
            build_stack: vec!["a".to_string(), "b".to_string(), "a".to_string()],
        };
        assert_eq!(error.to_string(), "检测到循环引用: a -> b -> a");
        assert!(error.is_internal());
    }

    #[test]
    fn test_user_errors_are_not_internal() {
        assert!(!ContainerError::not_found("logger").is_internal());
        assert!(!ContainerError::SyntheticNotSet { id: "request".into() }.is_internal());
    }

    #[test]
    fn test_infrastructure_error_wraps_container_error() {
        let error: InfrastructureError = ContainerError::not_found("x").into();
        assert!(matches!(error, InfrastructureError::ContainerError { .. }));
    }
}
