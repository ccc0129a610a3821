//! 代理工厂

use di_abstractions::{ContainerBuilder, Definition, Initializer, LazyProxy};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// 代理工厂
///
/// 编译期决定哪些定义以代理形式注入，运行期负责创建代理并计数。
#[derive(Debug, Default)]
pub struct ProxyFactory {
    created: AtomicUsize,
}

impl ProxyFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// 定义是否需要代理
    pub fn is_proxy_candidate(definition: &Definition) -> bool {
        definition.is_lazy() && !definition.is_synthetic()
    }

    /// 构建器中需要代理的服务，按注册顺序排列
    pub fn lazy_services(builder: &ContainerBuilder) -> Vec<String> {
        builder
            .definitions()
            .iter()
            .filter(|(_, definition)| Self::is_proxy_candidate(definition))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// 创建代理，持有代理不会触发构造
    pub fn create(&self, id: &str, initializer: Initializer) -> Arc<LazyProxy> {
        let count = self.created.fetch_add(1, Ordering::Relaxed) + 1;
        debug!("为懒加载服务 {} 创建代理 (第 {} 个)", id, count);
        Arc::new(LazyProxy::new(id, initializer))
    }

    /// 已创建的代理数量
    pub fn created(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }
}
