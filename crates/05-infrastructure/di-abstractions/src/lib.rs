//! # Dependency Injection Abstractions
//!
//! 依赖注入抽象层，定义服务定义图的数据模型以及编译管道和运行时容器的核心接口。
//!
//! ## 核心接口
//!
//! - [`Definition`] / [`Reference`] / [`Argument`] - 服务定义、引用与参数类型
//! - [`ContainerBuilder`] - 可变的服务定义图
//! - [`ServiceProvider`] - 服务提供者接口
//! - [`CompilerPass`] - 编译步骤接口
//! - [`ServiceContainer`] - 运行时容器接口
//! - [`LazyProxy`] / [`Lazy`] - 延迟加载代理

pub mod argument;
pub mod builder;
pub mod container;
pub mod definition;
pub mod pass;
pub mod provider;
pub mod proxy;
pub mod reference;
pub mod resolved;

pub use argument::*;
pub use builder::*;
pub use container::*;
pub use definition::*;
pub use pass::*;
pub use provider::*;
pub use proxy::*;
pub use reference::*;
pub use resolved::*;
