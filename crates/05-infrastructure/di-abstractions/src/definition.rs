//! 服务定义
//!
//! 描述如何构造一个服务：类型与构造参数、工厂函数、构造后的方法调用和属性赋值，
//! 以及共享、公开、合成、懒加载等标志。

use crate::argument::{Argument, ReferenceEdge};
use crate::resolved::{ResolvedArguments, ResolvedValue, ServiceBox};
use anyhow::anyhow;
use indexmap::IndexMap;
use infrastructure_common::{ContainerError, ContainerResult, DefinitionMetadata, TypeInfo};
use serde_json::{Map, Value};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// 构造函数
pub type ConstructorFn = Arc<dyn Fn(&ResolvedArguments) -> anyhow::Result<ServiceBox> + Send + Sync>;

/// 构造后的方法调用
pub type MethodFn =
    Arc<dyn Fn(&mut (dyn Any + Send + Sync), &ResolvedArguments) -> anyhow::Result<()> + Send + Sync>;

/// 属性赋值
pub type PropertyFn =
    Arc<dyn Fn(&mut (dyn Any + Send + Sync), &ResolvedValue) -> anyhow::Result<()> + Send + Sync>;

/// 标签属性
pub type TagAttributes = Map<String, Value>;

/// 构造方式
#[derive(Clone)]
pub enum Construction {
    /// 按类型构造
    Class(ConstructorFn),
    /// 工厂函数
    Factory { name: String, factory: ConstructorFn },
    /// 字面量服务
    Value(Value),
    /// 配置选项占位符，由选项解析阶段替换为字面量
    Option(OptionKey),
}

impl fmt::Debug for Construction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Class(_) => f.write_str("Class(<constructor>)"),
            Self::Factory { name, .. } => write!(f, "Factory({})", name),
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Option(key) => f.debug_tuple("Option").field(key).finish(),
        }
    }
}

/// 配置选项键
///
/// 在 `config` 参数树中按 `dimensions` 逐级查找，再读取 `key`。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionKey {
    /// 使用该选项的类型，用作缓存键
    pub class: String,
    /// 维度路径
    pub dimensions: Vec<String>,
    /// 选项名称
    pub key: String,
    /// 缺省值
    pub default: Option<Value>,
}

impl OptionKey {
    /// 创建选项键
    pub fn new<I, S>(class: impl Into<String>, dimensions: I, key: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            class: class.into(),
            dimensions: dimensions.into_iter().map(Into::into).collect(),
            key: key.into(),
            default: None,
        }
    }

    /// 设置缺省值
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// 完整路径，用于诊断
    pub fn path(&self) -> String {
        let mut segments = self.dimensions.clone();
        segments.push(self.key.clone());
        segments.join(".")
    }
}

/// 构造后的方法调用
#[derive(Clone)]
pub struct MethodCall {
    /// 方法名
    pub name: String,
    /// 调用参数
    pub arguments: Vec<Argument>,
    invoke: MethodFn,
}

impl MethodCall {
    /// 执行调用
    pub fn invoke(
        &self,
        service: &mut (dyn Any + Send + Sync),
        arguments: &ResolvedArguments,
    ) -> anyhow::Result<()> {
        (self.invoke)(service, arguments)
    }
}

impl fmt::Debug for MethodCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodCall")
            .field("name", &self.name)
            .field("arguments", &self.arguments)
            .finish()
    }
}

/// 属性赋值
#[derive(Clone)]
pub struct PropertyAssignment {
    /// 属性值
    pub value: Argument,
    assign: PropertyFn,
}

impl PropertyAssignment {
    /// 执行赋值
    pub fn assign(
        &self,
        service: &mut (dyn Any + Send + Sync),
        value: &ResolvedValue,
    ) -> anyhow::Result<()> {
        (self.assign)(service, value)
    }
}

impl fmt::Debug for PropertyAssignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyAssignment")
            .field("value", &self.value)
            .finish()
    }
}

/// 标签
#[derive(Debug, Clone, PartialEq)]
pub struct Tag {
    /// 标签名称
    pub name: String,
    /// 标签属性
    pub attributes: TagAttributes,
}

/// 服务定义
#[derive(Clone)]
pub struct Definition {
    class: Option<TypeInfo>,
    construction: Option<Construction>,
    arguments: Vec<Argument>,
    method_calls: Vec<MethodCall>,
    properties: IndexMap<String, PropertyAssignment>,
    shared: bool,
    public: bool,
    synthetic: bool,
    lazy: bool,
    is_abstract: bool,
    tags: Vec<Tag>,
    source: Option<String>,
}

impl Default for Definition {
    fn default() -> Self {
        Self {
            class: None,
            construction: None,
            arguments: Vec::new(),
            method_calls: Vec::new(),
            properties: IndexMap::new(),
            shared: true,
            public: false,
            synthetic: false,
            lazy: false,
            is_abstract: false,
            tags: Vec::new(),
            source: None,
        }
    }
}

impl Definition {
    /// 创建空定义（共享、私有）
    pub fn new() -> Self {
        Self::default()
    }

    /// 按类型构造的定义
    pub fn class<T, F>(constructor: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&ResolvedArguments) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        Self {
            class: Some(TypeInfo::of::<T>()),
            construction: Some(Construction::Class(Arc::new(move |arguments| {
                Ok(Box::new(constructor(arguments)?) as ServiceBox)
            }))),
            ..Self::default()
        }
    }

    /// 由工厂函数构造的定义，不声明类型
    pub fn factory<T, F>(name: impl Into<String>, factory: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&ResolvedArguments) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        Self {
            construction: Some(Construction::Factory {
                name: name.into(),
                factory: Arc::new(move |arguments| Ok(Box::new(factory(arguments)?) as ServiceBox)),
            }),
            ..Self::default()
        }
    }

    /// 字面量服务
    pub fn value(value: impl Into<Value>) -> Self {
        Self {
            class: Some(TypeInfo::of::<Value>()),
            construction: Some(Construction::Value(value.into())),
            ..Self::default()
        }
    }

    /// 配置选项占位定义
    pub fn option(key: OptionKey) -> Self {
        Self {
            class: Some(TypeInfo::of::<Value>()),
            construction: Some(Construction::Option(key)),
            ..Self::default()
        }
    }

    /// 合成服务：由外部注入，编译时只保留插槽
    pub fn synthetic() -> Self {
        Self {
            synthetic: true,
            ..Self::default()
        }
    }

    /// 添加构造参数
    pub fn with_argument(mut self, argument: impl Into<Argument>) -> Self {
        self.arguments.push(argument.into());
        self
    }

    /// 设置全部构造参数
    pub fn with_arguments(mut self, arguments: Vec<Argument>) -> Self {
        self.arguments = arguments;
        self
    }

    /// 添加构造后的方法调用
    pub fn with_method_call<T, F>(
        mut self,
        name: impl Into<String>,
        arguments: Vec<Argument>,
        call: F,
    ) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&mut T, &ResolvedArguments) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let name = name.into();
        let method = name.clone();
        self.method_calls.push(MethodCall {
            name,
            arguments,
            invoke: Arc::new(move |service, arguments| {
                let target = service.downcast_mut::<T>().ok_or_else(|| {
                    anyhow!("方法 {} 的目标不是 {}", method, std::any::type_name::<T>())
                })?;
                call(target, arguments)
            }),
        });
        self
    }

    /// 添加属性赋值
    pub fn with_property<T, F>(
        mut self,
        name: impl Into<String>,
        value: impl Into<Argument>,
        assign: F,
    ) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&mut T, &ResolvedValue) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let name = name.into();
        let property = name.clone();
        self.properties.insert(
            name,
            PropertyAssignment {
                value: value.into(),
                assign: Arc::new(move |service, value| {
                    let target = service.downcast_mut::<T>().ok_or_else(|| {
                        anyhow!("属性 {} 的目标不是 {}", property, std::any::type_name::<T>())
                    })?;
                    assign(target, value)
                }),
            },
        );
        self
    }

    /// 设置是否共享
    pub fn shared(mut self, shared: bool) -> Self {
        self.shared = shared;
        self
    }

    /// 设置是否公开
    pub fn public(mut self, public: bool) -> Self {
        self.public = public;
        self
    }

    /// 设置是否懒加载
    pub fn lazy(mut self, lazy: bool) -> Self {
        self.lazy = lazy;
        self
    }

    /// 设置是否抽象
    pub fn abstract_(mut self, is_abstract: bool) -> Self {
        self.is_abstract = is_abstract;
        self
    }

    /// 添加标签
    pub fn with_tag(self, name: impl Into<String>) -> Self {
        self.with_tag_attributes(name, TagAttributes::new())
    }

    /// 添加带属性的标签
    pub fn with_tag_attributes(mut self, name: impl Into<String>, attributes: TagAttributes) -> Self {
        self.tags.push(Tag {
            name: name.into(),
            attributes,
        });
        self
    }

    /// 类型信息
    pub fn class_info(&self) -> Option<&TypeInfo> {
        self.class.as_ref()
    }

    /// 构造方式
    pub fn construction(&self) -> Option<&Construction> {
        self.construction.as_ref()
    }

    /// 替换构造方式
    pub fn set_construction(&mut self, construction: Construction) {
        self.construction = Some(construction);
    }

    /// 构造参数
    pub fn arguments(&self) -> &[Argument] {
        &self.arguments
    }

    /// 构造参数（可修改）
    pub fn arguments_mut(&mut self) -> &mut Vec<Argument> {
        &mut self.arguments
    }

    /// 方法调用
    pub fn method_calls(&self) -> &[MethodCall] {
        &self.method_calls
    }

    /// 方法调用（可修改）
    pub fn method_calls_mut(&mut self) -> &mut Vec<MethodCall> {
        &mut self.method_calls
    }

    /// 属性赋值
    pub fn properties(&self) -> &IndexMap<String, PropertyAssignment> {
        &self.properties
    }

    /// 属性赋值（可修改）
    pub fn properties_mut(&mut self) -> &mut IndexMap<String, PropertyAssignment> {
        &mut self.properties
    }

    pub fn is_shared(&self) -> bool {
        self.shared
    }

    pub fn is_public(&self) -> bool {
        self.public
    }

    pub fn is_synthetic(&self) -> bool {
        self.synthetic
    }

    pub fn is_lazy(&self) -> bool {
        self.lazy
    }

    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    pub fn set_shared(&mut self, shared: bool) {
        self.shared = shared;
    }

    pub fn set_public(&mut self, public: bool) {
        self.public = public;
    }

    /// 设置懒加载，合成服务不能是懒加载的
    pub fn set_lazy(&mut self, lazy: bool) -> ContainerResult<()> {
        let previous = std::mem::replace(&mut self.lazy, lazy);
        self.revalidate(|definition| definition.lazy = previous)
    }

    /// 设置为合成服务，违反合成约束时保持原状并返回错误
    pub fn set_synthetic(&mut self, synthetic: bool) -> ContainerResult<()> {
        let previous = std::mem::replace(&mut self.synthetic, synthetic);
        self.revalidate(|definition| definition.synthetic = previous)
    }

    fn revalidate(&mut self, rollback: impl FnOnce(&mut Self)) -> ContainerResult<()> {
        let label = self
            .class
            .as_ref()
            .map_or("<definition>", TypeInfo::short_name)
            .to_string();
        if let Err(error) = self.validate(&label) {
            rollback(self);
            return Err(error);
        }
        Ok(())
    }

    /// 标签
    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    /// 是否带有指定标签
    pub fn has_tag(&self, name: &str) -> bool {
        self.tags.iter().any(|tag| tag.name == name)
    }

    /// 指定标签的全部属性（同一标签可以出现多次）
    pub fn tag_attributes(&self, name: &str) -> Vec<&TagAttributes> {
        self.tags
            .iter()
            .filter(|tag| tag.name == name)
            .map(|tag| &tag.attributes)
            .collect()
    }

    /// 注册该定义的服务提供者
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn set_source(&mut self, source: impl Into<String>) {
        self.source = Some(source.into());
    }

    /// 校验定义的结构约束
    pub fn validate(&self, id: &str) -> ContainerResult<()> {
        if self.synthetic {
            if self.construction.is_some() || self.class.is_some() || !self.arguments.is_empty() {
                return Err(ContainerError::invalid_definition(
                    id,
                    "合成服务不能同时声明类型、构造方式或构造参数",
                ));
            }
            if self.lazy {
                return Err(ContainerError::invalid_definition(id, "合成服务不能是懒加载的"));
            }
        }
        Ok(())
    }

    /// 遍历全部参数树：构造参数、方法调用参数和属性值
    pub fn walk_arguments_mut(&mut self, visit: &mut dyn FnMut(&mut Argument)) {
        for argument in &mut self.arguments {
            argument.walk_mut(visit);
        }
        for call in &mut self.method_calls {
            for argument in &mut call.arguments {
                argument.walk_mut(visit);
            }
        }
        for property in self.properties.values_mut() {
            property.value.walk_mut(visit);
        }
    }

    /// 遍历全部引用（可修改）
    pub fn for_each_reference_mut(&mut self, visit: &mut dyn FnMut(&mut crate::Reference)) {
        for argument in &mut self.arguments {
            argument.for_each_reference_mut(visit);
        }
        for call in &mut self.method_calls {
            for argument in &mut call.arguments {
                argument.for_each_reference_mut(visit);
            }
        }
        for property in self.properties.values_mut() {
            property.value.for_each_reference_mut(visit);
        }
    }

    /// 收集定义中的全部引用边
    pub fn references(&self) -> Vec<ReferenceEdge<'_>> {
        let mut edges = Vec::new();
        self.collect_references_into(true, &mut edges);
        edges
    }

    pub(crate) fn collect_references_into<'a>(&'a self, eager: bool, edges: &mut Vec<ReferenceEdge<'a>>) {
        for argument in &self.arguments {
            argument.collect_references(eager, edges);
        }
        for call in &self.method_calls {
            for argument in &call.arguments {
                argument.collect_references(eager, edges);
            }
        }
        for property in self.properties.values() {
            property.value.collect_references(eager, edges);
        }
    }

    /// 诊断元数据
    pub fn metadata(&self, id: &str) -> DefinitionMetadata {
        let mut metadata = DefinitionMetadata::new(id);
        if let Some(class) = &self.class {
            metadata = metadata.with_class(class.module_path.clone());
        } else if let Some(Construction::Factory { name, .. }) = &self.construction {
            metadata = metadata.with_class(format!("factory:{}", name));
        }
        if let Some(source) = &self.source {
            metadata = metadata.with_source(source.clone());
        }
        for tag in &self.tags {
            metadata = metadata.with_tag(tag.name.clone());
        }
        metadata
    }
}

impl fmt::Debug for Definition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Definition")
            .field("class", &self.class.as_ref().map(TypeInfo::short_name))
            .field("construction", &self.construction)
            .field("arguments", &self.arguments)
            .field("method_calls", &self.method_calls)
            .field("properties", &self.properties)
            .field("shared", &self.shared)
            .field("public", &self.public)
            .field("synthetic", &self.synthetic)
            .field("lazy", &self.lazy)
            .field("abstract", &self.is_abstract)
            .field("tags", &self.tags)
            .finish()
    }
}

/// 别名
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alias {
    target: String,
    public: bool,
}

impl Alias {
    /// 创建公开别名
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            public: true,
        }
    }

    /// 设置是否公开
    pub fn public(mut self, public: bool) -> Self {
        self.public = public;
        self
    }

    /// 目标标识
    pub fn target(&self) -> &str {
        &self.target
    }

    /// 重定向目标（展开别名链时使用）
    pub fn set_target(&mut self, target: impl Into<String>) {
        self.target = target.into();
    }

    pub fn is_public(&self) -> bool {
        self.public
    }
}
