//! 并发解析

use di_abstractions::{ContainerBuilder, Definition, Reference, ServiceContainer};
use di_impl::ContainerCompiler;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct Pool;

struct Repository {
    pool: Arc<Pool>,
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_shared_service_is_built_once_under_contention() {
    let constructions = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&constructions);

    let mut builder = ContainerBuilder::new();
    builder
        .set_definition(
            "pool",
            Definition::class(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(25));
                Ok(Pool)
            })
            .public(true),
        )
        .unwrap();
    builder
        .set_definition(
            "repository",
            Definition::class(|arguments| {
                Ok(Repository {
                    pool: arguments.service(0)?,
                })
            })
            .public(true)
            .shared(false)
            .with_argument(Reference::new("pool")),
        )
        .unwrap();
    let container = ContainerCompiler::default().build(&mut builder).unwrap();

    let mut handles = Vec::new();
    for _ in 0..16 {
        let container = container.clone();
        handles.push(tokio::task::spawn_blocking(move || {
            container.resolve::<Repository>("repository")
        }));
    }

    let mut repositories = Vec::new();
    for handle in handles {
        repositories.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(constructions.load(Ordering::SeqCst), 1);
    let pool = container.resolve::<Pool>("pool").unwrap();
    assert!(repositories
        .iter()
        .all(|repository| Arc::ptr_eq(&repository.pool, &pool)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_synthetic_service_set_before_sharing_is_visible_everywhere() {
    let mut builder = ContainerBuilder::new();
    builder
        .set_definition("kernel", Definition::synthetic().public(true))
        .unwrap();
    let container = ContainerCompiler::default().build(&mut builder).unwrap();
    let kernel: Arc<String> = Arc::new("kernel".to_string());
    container.set("kernel", kernel.clone()).unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let container = container.clone();
        handles.push(tokio::spawn(async move { container.resolve::<String>("kernel") }));
    }
    for handle in handles {
        let resolved = handle.await.unwrap().unwrap();
        assert!(Arc::ptr_eq(&resolved, &kernel));
    }
}
