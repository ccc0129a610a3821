//! 运行时容器
//!
//! 编译产物的执行器。共享服务使用 `OnceCell` 保证只构造一次，
//! 合成服务保存在 `DashMap` 插槽中，懒加载服务以代理形式交付。
//! 容器可以在线程间共享；合成服务应当在共享之前设置完毕。

use crate::dumper::{
    CompiledAlias, CompiledConstructor, CompiledContainer, CompiledValue, EntryKind, Recipe,
    ResolutionEntry,
};
use crate::proxy::ProxyFactory;
use dashmap::DashMap;
use di_abstractions::{
    Instance, InvalidBehavior, LazyProxy, Reference, ResolvedArguments, ResolvedValue,
    ServiceBox, ServiceContainer, ServiceIterator, ServiceLocator,
};
use indexmap::IndexMap;
use infrastructure_common::{ContainerError, ContainerResult};
use once_cell::sync::OnceCell;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info};
use uuid::Uuid;

thread_local! {
    /// 当前线程正在构造的服务，按容器实例区分
    static BUILD_STACK: RefCell<Vec<(Uuid, String)>> = RefCell::new(Vec::new());
}

/// 构建栈守卫，离开作用域时出栈
struct BuildGuard;

impl BuildGuard {
    fn enter(container: Uuid, id: &str) -> ContainerResult<Self> {
        BUILD_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            if stack.iter().any(|(owner, entry)| *owner == container && entry == id) {
                let mut build_stack: Vec<String> = stack
                    .iter()
                    .filter(|(owner, _)| *owner == container)
                    .map(|(_, entry)| entry.clone())
                    .collect();
                build_stack.push(id.to_string());
                return Err(ContainerError::CircularDependencyAtRuntime { build_stack });
            }
            stack.push((container, id.to_string()));
            Ok(BuildGuard)
        })
    }
}

impl Drop for BuildGuard {
    fn drop(&mut self) {
        BUILD_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

fn construction_failed(id: &str, source: anyhow::Error) -> ContainerError {
    ContainerError::ConstructionFailed {
        id: id.to_string(),
        source,
    }
}

fn wrap_instance(instance: Instance) -> ResolvedValue {
    match instance.downcast::<LazyProxy>() {
        Ok(proxy) => ResolvedValue::Proxy(proxy),
        Err(instance) => ResolvedValue::Service(instance),
    }
}

struct ContainerState {
    instance_id: Uuid,
    class_name: String,
    entries: IndexMap<String, ResolutionEntry>,
    aliases: IndexMap<String, CompiledAlias>,
    parameters: IndexMap<String, Value>,
    shared: HashMap<String, OnceCell<Instance>>,
    synthetic: DashMap<String, Instance>,
    proxies: ProxyFactory,
    constructions: AtomicUsize,
    handle: Weak<ContainerState>,
}

impl ContainerState {
    /// 按公开规则查找表项：别名看别名自身的公开性，定义看定义的公开性
    fn lookup_public(&self, id: &str) -> ContainerResult<&ResolutionEntry> {
        if let Some(alias) = self.aliases.get(id) {
            if !alias.public {
                return Err(ContainerError::ServiceNotPublic { id: id.to_string() });
            }
            return self.entries.get(&alias.target).ok_or_else(|| {
                ContainerError::internal(format!("别名 {} 指向不存在的表项 {}", id, alias.target))
            });
        }
        let entry = self
            .entries
            .get(id)
            .ok_or_else(|| ContainerError::not_found(id))?;
        if !entry.public {
            return Err(ContainerError::ServiceNotPublic { id: id.to_string() });
        }
        Ok(entry)
    }

    fn lookup(&self, id: &str) -> Option<&ResolutionEntry> {
        match self.aliases.get(id) {
            Some(alias) => self.entries.get(&alias.target),
            None => self.entries.get(id),
        }
    }

    fn shared_cell(&self, entry: &ResolutionEntry) -> ContainerResult<&OnceCell<Instance>> {
        self.shared
            .get(&entry.id)
            .ok_or_else(|| ContainerError::internal(format!("共享服务 {} 没有缓存槽", entry.id)))
    }

    /// 已经存在的实例（或代理），不会触发构造
    fn existing(&self, entry: &ResolutionEntry) -> Option<Instance> {
        match entry.kind {
            EntryKind::Synthetic => self.synthetic.get(&entry.id).map(|slot| Arc::clone(slot.value())),
            EntryKind::Shared => self.shared.get(&entry.id).and_then(|cell| cell.get().cloned()),
            EntryKind::Factory => None,
        }
    }

    /// 解析表项，懒加载服务返回代理
    fn instance(&self, entry: &ResolutionEntry) -> ContainerResult<Instance> {
        match entry.kind {
            EntryKind::Synthetic => self.existing(entry).ok_or_else(|| ContainerError::SyntheticNotSet {
                id: entry.id.clone(),
            }),
            EntryKind::Shared if entry.lazy => self
                .shared_cell(entry)?
                .get_or_try_init(|| -> ContainerResult<Instance> { Ok(self.proxy(entry)) })
                .map(Arc::clone),
            EntryKind::Factory if entry.lazy => Ok(self.proxy(entry)),
            EntryKind::Shared => {
                let cell = self.shared_cell(entry)?;
                if let Some(instance) = cell.get() {
                    return Ok(Arc::clone(instance));
                }
                // 必须在进入 OnceCell 之前检查构建栈，同一线程重入初始化会死锁
                let _guard = BuildGuard::enter(self.instance_id, &entry.id)?;
                cell.get_or_try_init(|| self.construct(entry)).map(Arc::clone)
            }
            EntryKind::Factory => {
                let _guard = BuildGuard::enter(self.instance_id, &entry.id)?;
                self.construct(entry)
            }
        }
    }

    fn proxy(&self, entry: &ResolutionEntry) -> Instance {
        let handle = self.handle.clone();
        let id = entry.id.clone();
        let proxy = self.proxies.create(
            &entry.id,
            Box::new(move || {
                let state = handle
                    .upgrade()
                    .ok_or_else(|| ContainerError::internal("容器已被释放"))?;
                let entry = state
                    .entries
                    .get(&id)
                    .ok_or_else(|| ContainerError::internal(format!("代理目标 {} 不存在", id)))?;
                let _guard = BuildGuard::enter(state.instance_id, &id)?;
                state.construct(entry)
            }),
        );
        proxy
    }

    fn construct(&self, entry: &ResolutionEntry) -> ContainerResult<Instance> {
        let recipe = entry
            .recipe
            .as_ref()
            .ok_or_else(|| ContainerError::internal(format!("服务 {} 没有构造配方", entry.id)))?;
        let instance = self.build(&entry.id, recipe)?;
        let count = self.constructions.fetch_add(1, Ordering::Relaxed) + 1;
        debug!("构造服务 {} (累计 {} 次)", entry.id, count);
        Ok(instance)
    }

    fn build(&self, owner: &str, recipe: &Recipe) -> ContainerResult<Instance> {
        let arguments = ResolvedArguments::new(self.resolve_values(owner, &recipe.arguments)?);
        let mut service: ServiceBox = match &recipe.constructor {
            CompiledConstructor::Literal(value) => Box::new(value.clone()),
            CompiledConstructor::Call(constructor) => {
                constructor(&arguments).map_err(|source| construction_failed(owner, source))?
            }
        };

        for compiled in &recipe.method_calls {
            let arguments = ResolvedArguments::new(self.resolve_values(owner, &compiled.arguments)?);
            compiled
                .call
                .invoke(service.as_mut(), &arguments)
                .map_err(|source| construction_failed(owner, source))?;
        }
        for property in &recipe.properties {
            let value = self.resolve_value(owner, &property.value)?;
            property
                .assignment
                .assign(service.as_mut(), &value)
                .map_err(|source| construction_failed(owner, source))?;
        }
        Ok(Arc::from(service))
    }

    fn resolve_values(&self, owner: &str, values: &[CompiledValue]) -> ContainerResult<Vec<ResolvedValue>> {
        values
            .iter()
            .map(|value| self.resolve_value(owner, value))
            .collect()
    }

    fn resolve_value(&self, owner: &str, value: &CompiledValue) -> ContainerResult<ResolvedValue> {
        Ok(match value {
            CompiledValue::Literal(value) => ResolvedValue::Value(value.clone()),
            CompiledValue::Service(reference) => self.resolve_reference(reference)?,
            CompiledValue::Array(entries) => {
                let mut resolved = Vec::with_capacity(entries.len());
                for (key, entry) in entries {
                    resolved.push((key.clone(), self.resolve_value(owner, entry)?));
                }
                ResolvedValue::Array(resolved)
            }
            CompiledValue::Iterator(references) => {
                let locator: Weak<dyn ServiceLocator> = self.handle.clone();
                ResolvedValue::Iterator(ServiceIterator::new(locator, references.clone()))
            }
            CompiledValue::Condition {
                candidates,
                argument,
            } => {
                let resolved = self.resolve_values(owner, candidates)?;
                argument
                    .select(&resolved)
                    .map_err(|source| construction_failed(owner, source))?
            }
            CompiledValue::Inline(recipe) => ResolvedValue::Service(self.build(owner, recipe)?),
            CompiledValue::Absent => ResolvedValue::Absent,
        })
    }

    fn resolve_reference(&self, reference: &Reference) -> ContainerResult<ResolvedValue> {
        let Some(entry) = self.lookup(reference.id()) else {
            if reference.behavior().is_ignorable() {
                return Ok(ResolvedValue::Absent);
            }
            return Err(ContainerError::internal(format!(
                "编译产物中残留了无效引用 {}",
                reference
            )));
        };

        match reference.behavior() {
            InvalidBehavior::IgnoreOnUninitializedReference => {
                Ok(self.existing(entry).map_or(ResolvedValue::Absent, wrap_instance))
            }
            InvalidBehavior::IgnoreOnInvalidReference => match self.instance(entry) {
                Err(ContainerError::SyntheticNotSet { .. }) => Ok(ResolvedValue::Absent),
                other => other.map(wrap_instance),
            },
            InvalidBehavior::Fail => self.instance(entry).map(wrap_instance),
        }
    }
}

impl ServiceLocator for ContainerState {
    fn locate(&self, reference: &Reference) -> ContainerResult<Option<Instance>> {
        match self.resolve_reference(reference)? {
            ResolvedValue::Service(instance) => Ok(Some(instance)),
            ResolvedValue::Proxy(proxy) => proxy.instance().map(Some),
            ResolvedValue::Absent => Ok(None),
            other => Err(ContainerError::internal(format!(
                "引用 {} 解析出了非服务值 {:?}",
                reference, other
            ))),
        }
    }
}

/// 运行时容器
///
/// 克隆得到的是同一个容器的另一个句柄。
#[derive(Clone)]
pub struct RuntimeContainer {
    state: Arc<ContainerState>,
}

impl RuntimeContainer {
    /// 从编译产物创建容器
    pub fn new(compiled: CompiledContainer) -> Self {
        let (class_name, entries, aliases, parameters) = compiled.into_parts();
        let shared = entries
            .values()
            .filter(|entry| entry.kind == EntryKind::Shared)
            .map(|entry| (entry.id.clone(), OnceCell::new()))
            .collect();
        let instance_id = Uuid::new_v4();
        info!(
            "创建运行时容器 {} ({}), 共 {} 个服务",
            class_name,
            instance_id,
            entries.len()
        );

        let state = Arc::new_cyclic(|handle| ContainerState {
            instance_id,
            class_name,
            entries,
            aliases,
            parameters,
            shared,
            synthetic: DashMap::new(),
            proxies: ProxyFactory::new(),
            constructions: AtomicUsize::new(0),
            handle: handle.clone(),
        });
        Self { state }
    }

    /// 容器实例标识
    pub fn instance_id(&self) -> Uuid {
        self.state.instance_id
    }

    /// 编译产物类名
    pub fn class_name(&self) -> &str {
        &self.state.class_name
    }

    /// 获取参数
    pub fn get_parameter(&self, name: &str) -> ContainerResult<&Value> {
        self.state
            .parameters
            .get(name)
            .ok_or_else(|| ContainerError::ParameterNotFound {
                name: name.to_string(),
            })
    }

    pub fn has_parameter(&self, name: &str) -> bool {
        self.state.parameters.contains_key(name)
    }

    /// 服务是否已经实例化（懒加载服务看代理是否已触发构造）
    pub fn initialized(&self, id: &str) -> bool {
        self.state
            .lookup(id)
            .and_then(|entry| self.state.existing(entry))
            .map_or(false, |instance| match instance.downcast::<LazyProxy>() {
                Ok(proxy) => proxy.is_initialized(),
                Err(_) => true,
            })
    }

    /// 公开的服务标识和公开别名
    pub fn service_ids(&self) -> Vec<&str> {
        self.state
            .entries
            .values()
            .filter(|entry| entry.public)
            .map(|entry| entry.id.as_str())
            .chain(
                self.state
                    .aliases
                    .iter()
                    .filter(|(_, alias)| alias.public)
                    .map(|(id, _)| id.as_str()),
            )
            .collect()
    }

    /// 实际执行的构造次数
    pub fn constructions(&self) -> usize {
        self.state.constructions.load(Ordering::Relaxed)
    }

    /// 已创建的代理数量
    pub fn proxies_created(&self) -> usize {
        self.state.proxies.created()
    }
}

impl ServiceContainer for RuntimeContainer {
    fn get(&self, id: &str) -> ContainerResult<Instance> {
        let entry = self.state.lookup_public(id)?;
        self.state.instance(entry)
    }

    fn has(&self, id: &str) -> bool {
        let entry = match self.state.aliases.get(id) {
            Some(alias) if alias.public => self.state.entries.get(&alias.target),
            Some(_) => None,
            None => self.state.entries.get(id).filter(|entry| entry.public),
        };
        entry.map_or(false, |entry| {
            entry.kind != EntryKind::Synthetic || self.state.synthetic.contains_key(&entry.id)
        })
    }

    fn set(&self, id: &str, instance: Instance) -> ContainerResult<()> {
        match self.state.lookup(id) {
            Some(entry) if entry.kind == EntryKind::Synthetic => {
                debug!("设置合成服务 {}", entry.id);
                self.state.synthetic.insert(entry.id.clone(), instance);
                Ok(())
            }
            _ => Err(ContainerError::NotSynthetic { id: id.to_string() }),
        }
    }
}

impl ServiceLocator for RuntimeContainer {
    fn locate(&self, reference: &Reference) -> ContainerResult<Option<Instance>> {
        self.state.locate(reference)
    }
}

impl std::fmt::Debug for RuntimeContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeContainer")
            .field("instance_id", &self.state.instance_id)
            .field("class_name", &self.state.class_name)
            .field("services", &self.state.entries.len())
            .finish()
    }
}
