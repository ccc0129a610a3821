//! 解析后的参数值
//!
//! 构造函数、方法调用和属性赋值收到的都是解析后的值：字面量、服务实例、
//! 延迟代理、惰性迭代器，或者显式的"缺失"标记。

use crate::container::ServiceLocator;
use crate::proxy::{Lazy, LazyProxy};
use crate::reference::Reference;
use anyhow::{anyhow, Context};
use infrastructure_common::{ContainerError, ContainerResult};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

/// 共享的服务实例
pub type Instance = Arc<dyn Any + Send + Sync>;

/// 构造中的服务实例，方法调用和属性赋值完成后才会被共享
pub type ServiceBox = Box<dyn Any + Send + Sync>;

/// 解析后的值
#[derive(Clone)]
pub enum ResolvedValue {
    /// 字面量
    Value(Value),
    /// 服务实例
    Service(Instance),
    /// 延迟代理
    Proxy(Arc<LazyProxy>),
    /// 可忽略引用解析为空
    Absent,
    /// 数组或引用集合
    Array(Vec<(Option<String>, ResolvedValue)>),
    /// 惰性服务迭代器
    Iterator(ServiceIterator),
}

impl ResolvedValue {
    /// 是否为空
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// 字面量
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(value) => Some(value),
            _ => None,
        }
    }

    /// 获取服务实例，遇到代理时会触发构造
    pub fn service<T: Any + Send + Sync>(&self) -> anyhow::Result<Arc<T>> {
        match self {
            Self::Service(instance) => Arc::clone(instance)
                .downcast::<T>()
                .map_err(|_| anyhow!("服务类型不匹配, 期望 {}", std::any::type_name::<T>())),
            Self::Proxy(proxy) => Ok(proxy.downcast::<T>()?),
            Self::Absent => Err(anyhow!("服务缺失")),
            _ => Err(anyhow!("参数不是服务")),
        }
    }

    /// 获取可选服务
    pub fn optional<T: Any + Send + Sync>(&self) -> anyhow::Result<Option<Arc<T>>> {
        match self {
            Self::Absent => Ok(None),
            _ => self.service::<T>().map(Some),
        }
    }

    /// 获取延迟句柄，不会触发构造
    pub fn lazy<T: Any + Send + Sync>(&self) -> anyhow::Result<Lazy<T>> {
        match self {
            Self::Proxy(proxy) => Ok(Lazy::new(Arc::clone(proxy))),
            Self::Service(instance) => Ok(Lazy::new(Arc::new(LazyProxy::ready(
                "<eager>",
                Arc::clone(instance),
            )))),
            _ => Err(anyhow!("参数不是服务")),
        }
    }

    /// 将字面量反序列化为具体类型
    pub fn deserialize<T: DeserializeOwned>(&self) -> anyhow::Result<T> {
        let value = self.as_value().ok_or_else(|| anyhow!("参数不是字面量"))?;
        serde_json::from_value(value.clone()).context("字面量反序列化失败")
    }

    /// 数组元素
    pub fn as_array(&self) -> Option<&[(Option<String>, ResolvedValue)]> {
        match self {
            Self::Array(entries) => Some(entries),
            _ => None,
        }
    }

    /// 惰性迭代器
    pub fn as_iterator(&self) -> Option<&ServiceIterator> {
        match self {
            Self::Iterator(iterator) => Some(iterator),
            _ => None,
        }
    }
}

impl fmt::Debug for ResolvedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Service(_) => f.write_str("Service(<instance>)"),
            Self::Proxy(proxy) => f.debug_tuple("Proxy").field(proxy).finish(),
            Self::Absent => f.write_str("Absent"),
            Self::Array(entries) => f.debug_tuple("Array").field(entries).finish(),
            Self::Iterator(iterator) => f.debug_tuple("Iterator").field(iterator).finish(),
        }
    }
}

/// 按位置访问的解析后参数
#[derive(Debug, Clone, Default)]
pub struct ResolvedArguments {
    values: Vec<ResolvedValue>,
}

impl ResolvedArguments {
    /// 创建参数列表
    pub fn new(values: Vec<ResolvedValue>) -> Self {
        Self { values }
    }

    /// 获取指定位置的参数
    pub fn get(&self, index: usize) -> anyhow::Result<&ResolvedValue> {
        self.values
            .get(index)
            .ok_or_else(|| anyhow!("缺少第 {} 个参数", index))
    }

    /// 获取指定位置的服务
    pub fn service<T: Any + Send + Sync>(&self, index: usize) -> anyhow::Result<Arc<T>> {
        self.get(index)?
            .service::<T>()
            .with_context(|| format!("第 {} 个参数", index))
    }

    /// 获取指定位置的可选服务，缺少该位置同样视为空
    pub fn optional<T: Any + Send + Sync>(&self, index: usize) -> anyhow::Result<Option<Arc<T>>> {
        match self.values.get(index) {
            Some(value) => value.optional::<T>(),
            None => Ok(None),
        }
    }

    /// 获取指定位置的延迟句柄
    pub fn lazy<T: Any + Send + Sync>(&self, index: usize) -> anyhow::Result<Lazy<T>> {
        self.get(index)?.lazy::<T>()
    }

    /// 获取指定位置的字面量
    pub fn value(&self, index: usize) -> anyhow::Result<&Value> {
        self.get(index)?
            .as_value()
            .ok_or_else(|| anyhow!("第 {} 个参数不是字面量", index))
    }

    /// 将指定位置的字面量反序列化
    pub fn deserialize<T: DeserializeOwned>(&self, index: usize) -> anyhow::Result<T> {
        self.get(index)?
            .deserialize::<T>()
            .with_context(|| format!("第 {} 个参数", index))
    }

    /// 获取指定位置的惰性迭代器
    pub fn iterator(&self, index: usize) -> anyhow::Result<&ServiceIterator> {
        self.get(index)?
            .as_iterator()
            .ok_or_else(|| anyhow!("第 {} 个参数不是迭代器", index))
    }

    /// 参数个数
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// 是否没有参数
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// 全部参数
    pub fn values(&self) -> &[ResolvedValue] {
        &self.values
    }
}

/// 惰性服务迭代器
///
/// 只有在迭代时才会解析每个成员，缺失的可忽略成员会被跳过。
#[derive(Clone)]
pub struct ServiceIterator {
    locator: Weak<dyn ServiceLocator>,
    references: Vec<Reference>,
}

impl ServiceIterator {
    /// 创建迭代器
    pub fn new(locator: Weak<dyn ServiceLocator>, references: Vec<Reference>) -> Self {
        Self {
            locator,
            references,
        }
    }

    /// 成员个数（含可能被跳过的成员）
    pub fn len(&self) -> usize {
        self.references.len()
    }

    /// 是否没有成员
    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }

    /// 逐个解析成员，产出成员标识和实例
    pub fn iter(&self) -> impl Iterator<Item = ContainerResult<(&str, Instance)>> + '_ {
        let locator = self.locator.upgrade();
        self.references
            .iter()
            .filter_map(move |reference| match &locator {
                Some(locator) => locator
                    .locate(reference)
                    .map(|found| found.map(|instance| (reference.id(), instance)))
                    .transpose(),
                None => Some(Err(ContainerError::internal("容器已被释放"))),
            })
    }

    /// 解析全部成员并转换为具体类型
    pub fn collect_as<T: Any + Send + Sync>(&self) -> ContainerResult<Vec<Arc<T>>> {
        self.iter()
            .map(|member| {
                let (id, instance) = member?;
                instance
                    .downcast::<T>()
                    .map_err(|_| ContainerError::TypeMismatch {
                        id: id.to_string(),
                        expected: std::any::type_name::<T>().to_string(),
                    })
            })
            .collect()
    }
}

impl fmt::Debug for ServiceIterator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceIterator")
            .field("references", &self.references)
            .finish()
    }
}
