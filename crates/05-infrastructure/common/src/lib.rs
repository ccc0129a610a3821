//! # Infrastructure Common
//!
//! 这个 crate 提供了容器编译器各层共享的错误类型、元数据和配置。
//!
//! ## 核心内容
//!
//! - [`ContainerError`] - 容器构建、编译和解析的错误分类
//! - [`TypeInfo`] / [`DefinitionMetadata`] - 服务类型与诊断元数据
//! - [`ContainerConfig`] - 编译配置

pub mod configuration;
pub mod errors;
pub mod metadata;

pub use configuration::*;
pub use errors::*;
pub use metadata::*;
