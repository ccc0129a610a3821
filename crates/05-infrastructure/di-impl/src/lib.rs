//! # 依赖注入容器编译器
//!
//! 把服务提供者填充的 [`ContainerBuilder`](di_abstractions::ContainerBuilder)
//! 编译为可执行的运行时容器。
//!
//! ## 组成
//!
//! - [`PipelineEngine`] - 按阶段和优先级执行编译步骤，内置步骤见 [`passes`]
//! - [`ReferenceResolver`] / [`CycleDetector`] - 引用分类与构造循环检测
//! - [`ProxyFactory`] - 懒加载服务的代理创建
//! - [`Dumper`] - 校验并导出 [`CompiledContainer`]
//! - [`RuntimeContainer`] - 编译产物的执行器
//! - [`ContainerCompiler`] - 串联以上各部分的入口

pub mod compiler;
pub mod dumper;
pub mod passes;
pub mod pipeline;
pub mod proxy;
pub mod resolver;
pub mod runtime;

pub use compiler::ContainerCompiler;
pub use dumper::{
    sanitize, CompiledAlias, CompiledCall, CompiledConstructor, CompiledContainer,
    CompiledProperty, CompiledUnit, CompiledValue, ContainerManifest, DumpOptions, Dumper,
    EntryKind, Recipe, ResolutionEntry, ServiceManifest,
};
pub use passes::*;
pub use pipeline::{default_pipeline, ExecutedPass, PipelineEngine, PipelineReport};
pub use proxy::ProxyFactory;
pub use resolver::{CycleDetector, ReferenceResolver, ResolvedReference};
pub use runtime::RuntimeContainer;
