//! # 容器组合层
//!
//! 把服务提供者、编译配置和日志初始化组合成一个编译完成、可以直接使用的容器。
//!
//! ## 基本使用
//!
//! ```rust,no_run
//! use di_abstractions::{ContainerBuilder, Definition, ServiceProvider};
//! use infrastructure_common::ContainerResult;
//! use infrastructure_composition::{ContainerBootstrapper, LoggingConfig};
//!
//! struct Greeter;
//!
//! struct AppProvider;
//!
//! impl ServiceProvider for AppProvider {
//!     fn build(&self, builder: &mut ContainerBuilder) -> ContainerResult<()> {
//!         builder.set_definition("greeter", Definition::class(|_| Ok(Greeter)).public(true))?;
//!         Ok(())
//!     }
//! }
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let infrastructure = ContainerBootstrapper::new()
//!         .add_provider(AppProvider)
//!         .with_logging(LoggingConfig::development())
//!         .build()?;
//!
//!     infrastructure.start()?;
//!     let _greeter = infrastructure.resolve::<Greeter>("greeter")?;
//!     infrastructure.stop()?;
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod infrastructure;

// 重新导出主要类型
pub use builder::{ContainerBootstrapper, LoggingConfig};
pub use infrastructure::{ContainerInfrastructure, InfrastructureMetrics, InfrastructureStatus};

// 重新导出错误类型
pub use infrastructure_common::InfrastructureError;
