//! 容器编译器
//!
//! 把管道、循环检测和导出串成一次完整的编译：
//! 执行编译管道 → 检测构造循环 → 冻结构建器 → 导出编译产物。

use crate::dumper::{CompiledContainer, DumpOptions, Dumper};
use crate::pipeline::{PipelineEngine, PipelineReport};
use crate::proxy::ProxyFactory;
use crate::resolver::CycleDetector;
use crate::runtime::RuntimeContainer;
use di_abstractions::ContainerBuilder;
use infrastructure_common::{ContainerConfig, ContainerResult};
use tracing::{debug, info};

/// 容器编译器
#[derive(Debug, Clone, Default)]
pub struct ContainerCompiler {
    config: ContainerConfig,
}

impl ContainerCompiler {
    pub fn new(config: ContainerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    /// 编译构建器
    pub fn compile(&self, builder: &mut ContainerBuilder) -> ContainerResult<CompiledContainer> {
        self.compile_with_report(builder).map(|(compiled, _)| compiled)
    }

    /// 编译构建器并返回管道执行报告
    ///
    /// 已经冻结的构建器不再执行管道，只重新导出，此时报告为 `None`。
    pub fn compile_with_report(
        &self,
        builder: &mut ContainerBuilder,
    ) -> ContainerResult<(CompiledContainer, Option<PipelineReport>)> {
        let report = if builder.is_frozen() {
            debug!("构建器已冻结，跳过编译管道");
            None
        } else {
            Some(self.optimize(builder)?)
        };

        let compiled = Dumper::new(DumpOptions::from(&self.config)).dump(builder)?;
        info!(
            "容器 {} 编译完成: {} 个服务, {} 个别名, {} 个编译单元",
            compiled.class_name(),
            compiled.entries().len(),
            compiled.aliases().len(),
            compiled.units().len()
        );
        Ok((compiled, report))
    }

    /// 编译并创建运行时容器
    pub fn build(&self, builder: &mut ContainerBuilder) -> ContainerResult<RuntimeContainer> {
        Ok(self.compile(builder)?.into_container())
    }

    fn optimize(&self, builder: &mut ContainerBuilder) -> ContainerResult<PipelineReport> {
        let report = PipelineEngine::with_defaults(&self.config).run(builder)?;

        if self.config.enable_circular_reference_detection {
            CycleDetector::new(builder).check()?;
        } else {
            debug!("循环引用检测已关闭");
        }

        let lazy = ProxyFactory::lazy_services(builder);
        if !lazy.is_empty() {
            debug!("以下服务将以代理形式注入: {:?}", lazy);
        }

        builder.freeze();
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use di_abstractions::{Definition, Lazy, Reference, ServiceContainer};
    use infrastructure_common::ContainerError;
    use serde_json::json;
    use std::sync::Arc;

    struct Logger;

    struct Service {
        logger: Arc<Logger>,
    }

    #[test]
    fn test_compile_and_resolve() {
        let mut builder = ContainerBuilder::new();
        builder
            .set_definition("logger", Definition::class(|_| Ok(Logger)).public(true))
            .unwrap();
        builder
            .set_definition(
                "service",
                Definition::class(|arguments| {
                    Ok(Service {
                        logger: arguments.service(0)?,
                    })
                })
                .public(true)
                .with_argument(Reference::new("logger")),
            )
            .unwrap();

        let container = ContainerCompiler::default().build(&mut builder).unwrap();
        let service = container.resolve::<Service>("service").unwrap();
        let logger = container.resolve::<Logger>("logger").unwrap();
        assert!(Arc::ptr_eq(&service.logger, &logger));

        assert!(builder.is_frozen());
        assert!(matches!(
            builder.set_parameter("late", 1),
            Err(ContainerError::Frozen { .. })
        ));
    }

    #[test]
    fn test_recompiling_a_frozen_builder_only_dumps() {
        let mut builder = ContainerBuilder::new();
        builder
            .set_definition("value", Definition::value(json!(1)).public(true))
            .unwrap();
        let compiler = ContainerCompiler::default();

        let (_, first) = compiler.compile_with_report(&mut builder).unwrap();
        assert!(first.is_some());
        let (compiled, second) = compiler.compile_with_report(&mut builder).unwrap();
        assert!(second.is_none());
        assert!(compiled.entry("value").is_some());
    }

    fn cyclic_builder(lazy: bool) -> ContainerBuilder {
        struct Node;
        let mut builder = ContainerBuilder::new();
        builder
            .set_definition(
                "A",
                Definition::class(|_| Ok(Node))
                    .public(true)
                    .with_argument(Reference::new("B")),
            )
            .unwrap();
        builder
            .set_definition(
                "B",
                Definition::class(|_| Ok(Node))
                    .lazy(lazy)
                    .with_argument(Reference::new("A")),
            )
            .unwrap();
        builder
    }

    #[test]
    fn test_eager_cycle_is_rejected() {
        let mut builder = cyclic_builder(false);
        match ContainerCompiler::default().compile(&mut builder) {
            Err(ContainerError::CircularReference { build_stack }) => {
                assert_eq!(build_stack, vec!["A", "B"]);
            }
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
        assert!(!builder.is_frozen());
    }

    #[test]
    fn test_lazy_edge_breaks_cycle() {
        let mut builder = cyclic_builder(true);
        let container = ContainerCompiler::default().build(&mut builder).unwrap();
        container.get("A").unwrap();
        assert_eq!(container.constructions(), 1);
        assert_eq!(container.proxies_created(), 1);
    }

    #[test]
    fn test_disabled_detection_surfaces_cycle_at_runtime() {
        let config = ContainerConfig {
            enable_circular_reference_detection: false,
            ..ContainerConfig::default()
        };
        let mut builder = cyclic_builder(false);
        let container = ContainerCompiler::new(config).build(&mut builder).unwrap();
        match container.get("A") {
            Err(ContainerError::CircularDependencyAtRuntime { build_stack }) => {
                assert_eq!(build_stack, vec!["A", "B", "A"]);
            }
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_private_single_use_definitions_are_inlined() {
        struct Transport;
        struct Mailer {
            transport: Arc<Transport>,
        }

        let mut builder = ContainerBuilder::new();
        builder
            .set_definition("transport", Definition::class(|_| Ok(Transport)).shared(false))
            .unwrap();
        builder
            .set_definition(
                "mailer",
                Definition::class(|arguments| {
                    Ok(Mailer {
                        transport: arguments.service(0)?,
                    })
                })
                .public(true)
                .with_argument(Reference::new("transport")),
            )
            .unwrap();
        builder
            .set_definition("orphan", Definition::class(|_| Ok(Transport)))
            .unwrap();

        let compiled = ContainerCompiler::default().compile(&mut builder).unwrap();
        assert!(compiled.entry("transport").is_none());
        assert!(compiled.entry("orphan").is_none());

        let container = compiled.into_container();
        let mailer = container.resolve::<Mailer>("mailer").unwrap();
        assert_eq!(Arc::strong_count(&mailer.transport), 1);
    }

    #[test]
    fn test_lazy_handle_is_injected_without_construction() {
        struct Heavy;
        struct Consumer {
            heavy: Lazy<Heavy>,
        }

        let mut builder = ContainerBuilder::new();
        builder
            .set_definition("heavy", Definition::class(|_| Ok(Heavy)).lazy(true))
            .unwrap();
        builder
            .set_definition(
                "consumer",
                Definition::class(|arguments| {
                    Ok(Consumer {
                        heavy: arguments.lazy(0)?,
                    })
                })
                .public(true)
                .with_argument(Reference::new("heavy")),
            )
            .unwrap();

        let container = ContainerCompiler::default().build(&mut builder).unwrap();
        let consumer = container.resolve::<Consumer>("consumer").unwrap();
        assert!(!consumer.heavy.is_initialized());
        assert_eq!(container.constructions(), 1);
        consumer.heavy.get().unwrap();
        assert!(consumer.heavy.is_initialized());
        assert_eq!(container.constructions(), 2);
    }
}
