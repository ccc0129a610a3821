//! 延迟加载代理
//!
//! 懒加载服务被注入为 [`LazyProxy`]：它持有一个初始化闭包，第一次真正使用时
//! 才会构造目标服务，之后复用同一个实例。

use crate::resolved::Instance;
use infrastructure_common::{ContainerError, ContainerResult};
use once_cell::sync::OnceCell;
use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// 代理初始化闭包
pub type Initializer = Box<dyn Fn() -> ContainerResult<Instance> + Send + Sync>;

/// 延迟加载代理
pub struct LazyProxy {
    id: String,
    cell: OnceCell<Instance>,
    initializer: Initializer,
}

impl LazyProxy {
    /// 创建尚未初始化的代理
    pub fn new(id: impl Into<String>, initializer: Initializer) -> Self {
        Self {
            id: id.into(),
            cell: OnceCell::new(),
            initializer,
        }
    }

    /// 用已有实例创建代理
    pub fn ready(id: impl Into<String>, instance: Instance) -> Self {
        let id = id.into();
        let missing = id.clone();
        Self {
            id,
            cell: OnceCell::with_value(instance),
            initializer: Box::new(move || Err(ContainerError::internal(format!(
                "已初始化的代理不应再次初始化: {}",
                missing
            )))),
        }
    }

    /// 代理的服务标识
    pub fn id(&self) -> &str {
        &self.id
    }

    /// 获取目标实例，首次调用时构造
    ///
    /// 并发调用只有一个会执行初始化。初始化失败时错误返回给本次调用者，
    /// 代理保持未初始化状态。
    pub fn instance(&self) -> ContainerResult<Instance> {
        self.cell
            .get_or_try_init(|| (self.initializer)())
            .map(Arc::clone)
    }

    /// 获取目标实例并转换为具体类型
    pub fn downcast<T: Any + Send + Sync>(&self) -> ContainerResult<Arc<T>> {
        self.instance()?
            .downcast::<T>()
            .map_err(|_| ContainerError::TypeMismatch {
                id: self.id.clone(),
                expected: std::any::type_name::<T>().to_string(),
            })
    }

    /// 是否已经初始化
    pub fn is_initialized(&self) -> bool {
        self.cell.get().is_some()
    }
}

impl fmt::Debug for LazyProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyProxy")
            .field("id", &self.id)
            .field("initialized", &self.is_initialized())
            .field("initializer", &"<function>")
            .finish()
    }
}

/// 类型化的延迟服务句柄
///
/// 持有句柄不会产生任何副作用，只有调用 [`Lazy::get`] 才会触发构造。
pub struct Lazy<T: Any + Send + Sync> {
    proxy: Arc<LazyProxy>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Any + Send + Sync> Lazy<T> {
    /// 包装代理
    pub fn new(proxy: Arc<LazyProxy>) -> Self {
        Self {
            proxy,
            _marker: PhantomData,
        }
    }

    /// 获取服务，首次访问时构造
    pub fn get(&self) -> ContainerResult<Arc<T>> {
        self.proxy.downcast::<T>()
    }

    /// 是否已经初始化
    pub fn is_initialized(&self) -> bool {
        self.proxy.is_initialized()
    }

    /// 服务标识
    pub fn id(&self) -> &str {
        self.proxy.id()
    }
}

impl<T: Any + Send + Sync> Clone for Lazy<T> {
    fn clone(&self) -> Self {
        Self::new(Arc::clone(&self.proxy))
    }
}

impl<T: Any + Send + Sync> fmt::Debug for Lazy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lazy")
            .field("type", &std::any::type_name::<T>())
            .field("id", &self.proxy.id())
            .field("initialized", &self.is_initialized())
            .finish()
    }
}
