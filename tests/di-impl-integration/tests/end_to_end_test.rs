//! 端到端场景：从服务提供者到运行时容器

use di_abstractions::{
    ContainerBuilder, Definition, Lazy, Reference, ServiceContainer, ServiceProvider,
};
use di_impl::ContainerCompiler;
use infrastructure_common::{ContainerError, ContainerResult};
use infrastructure_composition::ContainerBootstrapper;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug)]
struct Logger;

#[derive(Debug)]
struct Service {
    logger: Arc<Logger>,
}

/// 定义 Logger 和依赖它的 Service
struct LoggingProvider;

impl ServiceProvider for LoggingProvider {
    fn build(&self, builder: &mut ContainerBuilder) -> ContainerResult<()> {
        builder.set_definition("Logger", Definition::class(|_| Ok(Logger)).public(true))?;
        builder.set_definition(
            "Service",
            Definition::class(|arguments| {
                Ok(Service {
                    logger: arguments.service(0)?,
                })
            })
            .public(true)
            .with_argument(Reference::new("Logger")),
        )?;
        Ok(())
    }

    fn aliases(&self) -> Vec<(String, String)> {
        vec![("logger".to_string(), "Logger".to_string())]
    }
}

#[test]
fn test_injected_logger_is_the_shared_logger() {
    let infrastructure = ContainerBootstrapper::new()
        .add_provider(LoggingProvider)
        .build()
        .unwrap();

    let service = infrastructure.resolve::<Service>("Service").unwrap();
    let logger = infrastructure.resolve::<Logger>("Logger").unwrap();
    assert!(Arc::ptr_eq(&service.logger, &logger));
}

#[test]
fn test_alias_resolves_to_the_same_instance() {
    let infrastructure = ContainerBootstrapper::new()
        .add_provider(LoggingProvider)
        .build()
        .unwrap();
    let container = infrastructure.container();

    for _ in 0..3 {
        let through_alias = container.resolve::<Logger>("logger").unwrap();
        let direct = container.resolve::<Logger>("Logger").unwrap();
        assert!(Arc::ptr_eq(&through_alias, &direct));
    }
}

#[derive(Debug, PartialEq)]
struct Connection {
    dsn: String,
}

#[test]
fn test_sharing_semantics() {
    let mut builder = ContainerBuilder::new();
    builder
        .set_definition(
            "shared",
            Definition::class(|arguments| {
                Ok(Connection {
                    dsn: arguments.deserialize(0)?,
                })
            })
            .public(true)
            .with_argument("sqlite::memory:"),
        )
        .unwrap();
    builder
        .set_definition(
            "factory",
            Definition::class(|arguments| {
                Ok(Connection {
                    dsn: arguments.deserialize(0)?,
                })
            })
            .public(true)
            .shared(false)
            .with_argument("sqlite::memory:"),
        )
        .unwrap();
    let container = ContainerCompiler::default().build(&mut builder).unwrap();

    let first = container.resolve::<Connection>("shared").unwrap();
    let second = container.resolve::<Connection>("shared").unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    let one = container.resolve::<Connection>("factory").unwrap();
    let two = container.resolve::<Connection>("factory").unwrap();
    assert!(!Arc::ptr_eq(&one, &two));
    assert_eq!(one, two);
}

#[test]
fn test_synthetic_slot_safety() {
    let mut builder = ContainerBuilder::new();
    builder
        .set_definition("request", Definition::synthetic().public(true))
        .unwrap();
    let container = ContainerCompiler::default().build(&mut builder).unwrap();

    let error = container.get("request").unwrap_err();
    assert!(matches!(error, ContainerError::SyntheticNotSet { ref id } if id == "request"));
    assert!(!error.is_internal());

    let request: Arc<String> = Arc::new("GET /health".to_string());
    container.set("request", request.clone()).unwrap();
    let resolved = container.resolve::<String>("request").unwrap();
    assert!(Arc::ptr_eq(&resolved, &request));
}

struct A {
    b: Lazy<B>,
}

impl A {
    fn peer(&self) -> anyhow::Result<Arc<B>> {
        Ok(self.b.get()?)
    }
}

struct B {
    a: Arc<A>,
}

#[test]
fn test_lazy_edge_defers_construction_until_first_use() {
    let b_constructions = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&b_constructions);

    let mut builder = ContainerBuilder::new();
    builder
        .set_definition(
            "A",
            Definition::class(|arguments| {
                Ok(A {
                    b: arguments.lazy(0)?,
                })
            })
            .public(true)
            .with_argument(Reference::new("B")),
        )
        .unwrap();
    builder
        .set_definition(
            "B",
            Definition::class(move |arguments| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(B {
                    a: arguments.service(0)?,
                })
            })
            .lazy(true)
            .with_argument(Reference::new("A")),
        )
        .unwrap();

    let container = ContainerCompiler::default().build(&mut builder).unwrap();
    let a = container.resolve::<A>("A").unwrap();
    assert_eq!(b_constructions.load(Ordering::SeqCst), 0);

    let b = a.peer().unwrap();
    assert_eq!(b_constructions.load(Ordering::SeqCst), 1);
    assert!(Arc::ptr_eq(&b.a, &a));

    a.peer().unwrap();
    assert_eq!(b_constructions.load(Ordering::SeqCst), 1);
}
