//! 运行时容器抽象接口
//!
//! 编译后的容器只暴露查询能力：`get`、`has`，以及为合成服务准备的 `set`。

use crate::proxy::LazyProxy;
use crate::reference::Reference;
use crate::resolved::Instance;
use infrastructure_common::{ContainerError, ContainerResult};
use std::any::Any;
use std::sync::Arc;

/// 运行时容器 trait
pub trait ServiceContainer: Send + Sync {
    /// 按标识解析公开服务
    ///
    /// 懒加载服务返回的是代理本身，持有它不会触发构造。
    fn get(&self, id: &str) -> ContainerResult<Instance>;

    /// 检查服务是否存在，不会触发构造
    fn has(&self, id: &str) -> bool;

    /// 设置合成服务
    fn set(&self, id: &str, instance: Instance) -> ContainerResult<()>;

    /// 解析服务并转换为具体类型，遇到代理时会触发构造
    fn resolve<T: Any + Send + Sync>(&self, id: &str) -> ContainerResult<Arc<T>>
    where
        Self: Sized,
    {
        downcast_instance::<T>(id, self.get(id)?)
    }
}

/// 服务定位器 trait
///
/// 供惰性迭代器和代理在容器内部按引用解析成员，不检查公开性。
pub trait ServiceLocator: Send + Sync {
    /// 按引用解析，返回真实实例（会穿透代理）
    ///
    /// 可忽略的引用在目标缺失或未初始化时返回 `None`。
    fn locate(&self, reference: &Reference) -> ContainerResult<Option<Instance>>;
}

/// 将实例转换为具体类型，必要时穿透代理
pub fn downcast_instance<T: Any + Send + Sync>(id: &str, instance: Instance) -> ContainerResult<Arc<T>> {
    match instance.downcast::<T>() {
        Ok(service) => Ok(service),
        Err(instance) => match instance.downcast::<LazyProxy>() {
            Ok(proxy) => proxy.downcast::<T>(),
            Err(_) => Err(ContainerError::TypeMismatch {
                id: id.to_string(),
                expected: std::any::type_name::<T>().to_string(),
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downcast_through_proxy() {
        let proxy: Instance = Arc::new(LazyProxy::ready("name", Arc::new(String::from("x"))));
        let service = downcast_instance::<String>("name", proxy).unwrap();
        assert_eq!(service.as_str(), "x");
    }

    #[test]
    fn test_downcast_mismatch() {
        let instance: Instance = Arc::new(1_i32);
        assert!(matches!(
            downcast_instance::<String>("n", instance),
            Err(ContainerError::TypeMismatch { .. })
        ));
    }
}
