//! 导出器
//!
//! 将冻结的构建器转换为可执行的编译产物：每个服务一条解析表项、别名表、
//! 参数表，以及按命名约定组织的编译单元。导出前会做最后一次校验，
//! 任何残留的不可忽略缺失引用或未解析的占位符都会导致导出失败。

use crate::passes::unescape_value;
use crate::proxy::ProxyFactory;
use crate::resolver::{ReferenceResolver, ResolvedReference};
use crate::runtime::RuntimeContainer;
use chrono::{DateTime, Utc};
use di_abstractions::{
    Argument, ConditionArgument, ConstructorFn, ContainerBuilder, Construction, Definition,
    InvalidBehavior, MethodCall, PropertyAssignment, Reference,
};
use indexmap::{IndexMap, IndexSet};
use infrastructure_common::{
    ContainerConfig, ContainerError, ContainerResult, DefinitionMetadata, InfrastructureResult,
};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, info};
use uuid::Uuid;

/// 导出选项
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpOptions {
    /// 编译产物类名
    pub class_name: String,
    /// 命名空间
    pub namespace: Option<String>,
    /// 是否按服务拆分编译单元
    pub partition: bool,
    /// 是否保留调试元数据
    pub debug: bool,
}

impl DumpOptions {
    /// 带命名空间的完整类名
    pub fn qualified_class_name(&self) -> String {
        infrastructure_common::qualified_class_name(self.namespace.as_deref(), &self.class_name)
    }
}

impl Default for DumpOptions {
    fn default() -> Self {
        Self::from(&ContainerConfig::default())
    }
}

impl From<&ContainerConfig> for DumpOptions {
    fn from(config: &ContainerConfig) -> Self {
        Self {
            class_name: config.class_name.clone(),
            namespace: config.namespace.clone(),
            partition: config.partition,
            debug: config.debug,
        }
    }
}

/// 表项类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EntryKind {
    /// 共享：首次构造后缓存
    Shared,
    /// 非共享：每次解析都重新构造
    Factory,
    /// 合成：由外部设置的插槽
    Synthetic,
}

impl EntryKind {
    /// 编译单元命名中使用的名称
    pub fn name(self) -> &'static str {
        match self {
            Self::Shared => "Shared",
            Self::Factory => "Factory",
            Self::Synthetic => "Synthetic",
        }
    }
}

/// 编译后的构造方式
#[derive(Clone)]
pub enum CompiledConstructor {
    /// 调用构造函数或工厂
    Call(ConstructorFn),
    /// 字面量
    Literal(Value),
}

impl fmt::Debug for CompiledConstructor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Call(_) => f.write_str("Call(<constructor>)"),
            Self::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
        }
    }
}

/// 编译后的参数
#[derive(Debug, Clone)]
pub enum CompiledValue {
    /// 字面量（`%%` 已还原）
    Literal(Value),
    /// 指向最终目标的服务引用，保留原有的缺失策略
    Service(Reference),
    /// 数组
    Array(Vec<(Option<String>, CompiledValue)>),
    /// 惰性迭代器成员
    Iterator(Vec<Reference>),
    /// 条件参数
    Condition {
        candidates: Vec<CompiledValue>,
        argument: ConditionArgument,
    },
    /// 内联构造
    Inline(Box<Recipe>),
    /// 空值
    Absent,
}

impl CompiledValue {
    fn collect_service_ids(&self, ids: &mut IndexSet<String>) {
        match self {
            Self::Service(reference) => {
                ids.insert(reference.id().to_string());
            }
            Self::Array(entries) => {
                for (_, entry) in entries {
                    entry.collect_service_ids(ids);
                }
            }
            Self::Iterator(references) => {
                for reference in references {
                    ids.insert(reference.id().to_string());
                }
            }
            Self::Condition { candidates, .. } => {
                for candidate in candidates {
                    candidate.collect_service_ids(ids);
                }
            }
            Self::Inline(recipe) => recipe.collect_service_ids(ids),
            Self::Literal(_) | Self::Absent => {}
        }
    }
}

/// 编译后的方法调用
#[derive(Debug, Clone)]
pub struct CompiledCall {
    pub call: MethodCall,
    pub arguments: Vec<CompiledValue>,
}

/// 编译后的属性赋值
#[derive(Debug, Clone)]
pub struct CompiledProperty {
    pub name: String,
    pub assignment: PropertyAssignment,
    pub value: CompiledValue,
}

/// 构造配方
#[derive(Debug, Clone)]
pub struct Recipe {
    pub constructor: CompiledConstructor,
    pub arguments: Vec<CompiledValue>,
    pub method_calls: Vec<CompiledCall>,
    pub properties: Vec<CompiledProperty>,
}

impl Recipe {
    /// 配方直接或间接引用的服务
    pub fn service_ids(&self) -> Vec<String> {
        let mut ids = IndexSet::new();
        self.collect_service_ids(&mut ids);
        ids.into_iter().collect()
    }

    fn collect_service_ids(&self, ids: &mut IndexSet<String>) {
        let values = self
            .arguments
            .iter()
            .chain(self.method_calls.iter().flat_map(|call| call.arguments.iter()))
            .chain(self.properties.iter().map(|property| &property.value));
        for value in values {
            value.collect_service_ids(ids);
        }
    }
}

/// 解析表项
#[derive(Debug, Clone)]
pub struct ResolutionEntry {
    pub id: String,
    pub kind: EntryKind,
    pub public: bool,
    /// 是否以代理形式注入
    pub lazy: bool,
    /// 合成服务没有配方
    pub recipe: Option<Recipe>,
    /// 所在编译单元
    pub unit: String,
    /// 调试元数据，只在调试模式下保留
    pub metadata: Option<DefinitionMetadata>,
}

/// 编译后的别名
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompiledAlias {
    pub target: String,
    pub public: bool,
}

/// 编译单元
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompiledUnit {
    /// `<ClassName>` 或 `<ClassName>/<Kind>_<sanitized_id>`
    pub name: String,
    /// 单元内的服务
    pub services: Vec<String>,
    /// 引用的其他单元
    pub references: Vec<String>,
}

/// 编译产物
#[derive(Debug, Clone)]
pub struct CompiledContainer {
    class_name: String,
    compilation_id: Uuid,
    compiled_at: DateTime<Utc>,
    debug: bool,
    entries: IndexMap<String, ResolutionEntry>,
    aliases: IndexMap<String, CompiledAlias>,
    parameters: IndexMap<String, Value>,
    units: Vec<CompiledUnit>,
}

impl CompiledContainer {
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn compilation_id(&self) -> Uuid {
        self.compilation_id
    }

    pub fn compiled_at(&self) -> DateTime<Utc> {
        self.compiled_at
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    pub fn entry(&self, id: &str) -> Option<&ResolutionEntry> {
        self.entries.get(id)
    }

    pub fn entries(&self) -> &IndexMap<String, ResolutionEntry> {
        &self.entries
    }

    pub fn aliases(&self) -> &IndexMap<String, CompiledAlias> {
        &self.aliases
    }

    pub fn parameters(&self) -> &IndexMap<String, Value> {
        &self.parameters
    }

    pub fn units(&self) -> &[CompiledUnit] {
        &self.units
    }

    /// 按名称查找编译单元
    pub fn unit(&self, name: &str) -> Option<&CompiledUnit> {
        self.units.iter().find(|unit| unit.name == name)
    }

    /// 服务（或别名）所在的编译单元
    pub fn unit_of(&self, id: &str) -> Option<&CompiledUnit> {
        let id = self.aliases.get(id).map(|alias| alias.target.as_str()).unwrap_or(id);
        let entry = self.entries.get(id)?;
        self.unit(&entry.unit)
    }

    /// 产物清单
    pub fn manifest(&self) -> ContainerManifest<'_> {
        ContainerManifest {
            class_name: &self.class_name,
            compilation_id: self.compilation_id,
            compiled_at: self.compiled_at,
            debug: self.debug,
            services: self
                .entries
                .values()
                .map(|entry| ServiceManifest {
                    id: &entry.id,
                    kind: entry.kind,
                    public: entry.public,
                    lazy: entry.lazy,
                    unit: &entry.unit,
                    metadata: entry.metadata.as_ref(),
                })
                .collect(),
            aliases: &self.aliases,
            parameters: &self.parameters,
            units: &self.units,
        }
    }

    /// 以 JSON 形式输出产物清单
    pub fn manifest_json(&self) -> InfrastructureResult<String> {
        Ok(serde_json::to_string_pretty(&self.manifest())?)
    }

    /// 创建运行时容器
    pub fn into_container(self) -> RuntimeContainer {
        RuntimeContainer::new(self)
    }

    pub(crate) fn into_parts(
        self,
    ) -> (
        String,
        IndexMap<String, ResolutionEntry>,
        IndexMap<String, CompiledAlias>,
        IndexMap<String, Value>,
    ) {
        (self.class_name, self.entries, self.aliases, self.parameters)
    }
}

/// 产物清单
#[derive(Debug, Serialize)]
pub struct ContainerManifest<'a> {
    pub class_name: &'a str,
    pub compilation_id: Uuid,
    pub compiled_at: DateTime<Utc>,
    pub debug: bool,
    pub services: Vec<ServiceManifest<'a>>,
    pub aliases: &'a IndexMap<String, CompiledAlias>,
    pub parameters: &'a IndexMap<String, Value>,
    pub units: &'a [CompiledUnit],
}

/// 清单中的服务
#[derive(Debug, Serialize)]
pub struct ServiceManifest<'a> {
    pub id: &'a str,
    pub kind: EntryKind,
    pub public: bool,
    pub lazy: bool,
    pub unit: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<&'a DefinitionMetadata>,
}

/// 导出器
#[derive(Debug, Clone, Default)]
pub struct Dumper {
    options: DumpOptions,
}

impl Dumper {
    pub fn new(options: DumpOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &DumpOptions {
        &self.options
    }

    /// 导出冻结的构建器
    pub fn dump(&self, builder: &ContainerBuilder) -> ContainerResult<CompiledContainer> {
        if !builder.is_frozen() {
            return Err(ContainerError::dump(
                self.options.qualified_class_name(),
                "构建器必须先冻结才能导出",
            ));
        }
        let class_name = self.options.qualified_class_name();
        info!(
            "开始导出容器 {}, 共 {} 个服务定义",
            class_name,
            builder.definitions().len()
        );

        let compiler = RecipeCompiler {
            resolver: ReferenceResolver::new(builder),
        };
        let units = self.assign_units(builder, &class_name);

        let mut entries = IndexMap::with_capacity(builder.definitions().len());
        for (id, definition) in builder.definitions() {
            let entry = self.compile_entry(&compiler, id, definition, &units)?;
            entries.insert(id.clone(), entry);
        }

        let mut aliases = IndexMap::with_capacity(builder.aliases().len());
        for (alias, definition) in builder.aliases() {
            let target = compiler.resolver.flatten_alias(alias)?;
            if !entries.contains_key(&target) {
                return Err(ContainerError::dump(
                    alias.clone(),
                    format!("别名指向不存在的服务 {}", target),
                ));
            }
            aliases.insert(
                alias.clone(),
                CompiledAlias {
                    target,
                    public: definition.is_public(),
                },
            );
        }

        let parameters = builder
            .parameters()
            .iter()
            .map(|(name, value)| (name.clone(), unescape_value(value)))
            .collect();

        let units = self.build_units(&entries, &class_name);
        let container = CompiledContainer {
            class_name,
            compilation_id: Uuid::new_v4(),
            compiled_at: Utc::now(),
            debug: self.options.debug,
            entries,
            aliases,
            parameters,
            units,
        };
        info!(
            "容器 {} 导出完成: {} 个服务, {} 个别名, {} 个编译单元",
            container.class_name,
            container.entries.len(),
            container.aliases.len(),
            container.units.len()
        );
        Ok(container)
    }

    fn compile_entry(
        &self,
        compiler: &RecipeCompiler<'_>,
        id: &str,
        definition: &Definition,
        units: &IndexMap<String, String>,
    ) -> ContainerResult<ResolutionEntry> {
        if definition.is_abstract() {
            return Err(ContainerError::dump(id, "抽象定义不能被导出"));
        }
        let (kind, recipe) = if definition.is_synthetic() {
            (EntryKind::Synthetic, None)
        } else {
            let kind = if definition.is_shared() {
                EntryKind::Shared
            } else {
                EntryKind::Factory
            };
            (kind, Some(compiler.recipe(id, definition)?))
        };
        debug!("导出服务 {} ({})", id, kind.name());

        Ok(ResolutionEntry {
            id: id.to_string(),
            kind,
            public: definition.is_public(),
            lazy: ProxyFactory::is_proxy_candidate(definition),
            recipe,
            unit: units.get(id).cloned().unwrap_or_default(),
            metadata: self.options.debug.then(|| definition.metadata(id)),
        })
    }

    fn assign_units(&self, builder: &ContainerBuilder, class_name: &str) -> IndexMap<String, String> {
        let mut used = HashSet::new();
        builder
            .definitions()
            .iter()
            .map(|(id, definition)| {
                if !self.options.partition {
                    return (id.clone(), class_name.to_string());
                }
                let kind = if definition.is_synthetic() {
                    EntryKind::Synthetic
                } else if definition.is_shared() {
                    EntryKind::Shared
                } else {
                    EntryKind::Factory
                };
                let base = format!("{}/{}_{}", class_name, kind.name(), sanitize(id));
                let mut name = base.clone();
                let mut suffix = 2;
                while !used.insert(name.clone()) {
                    name = format!("{}_{}", base, suffix);
                    suffix += 1;
                }
                (id.clone(), name)
            })
            .collect()
    }

    fn build_units(&self, entries: &IndexMap<String, ResolutionEntry>, class_name: &str) -> Vec<CompiledUnit> {
        if !self.options.partition {
            return vec![CompiledUnit {
                name: class_name.to_string(),
                services: entries.keys().cloned().collect(),
                references: Vec::new(),
            }];
        }

        entries
            .values()
            .map(|entry| {
                let mut references = IndexSet::new();
                if let Some(recipe) = &entry.recipe {
                    for id in recipe.service_ids() {
                        if let Some(target) = entries.get(&id) {
                            if target.unit != entry.unit {
                                references.insert(target.unit.clone());
                            }
                        }
                    }
                }
                CompiledUnit {
                    name: entry.unit.clone(),
                    services: vec![entry.id.clone()],
                    references: references.into_iter().collect(),
                }
            })
            .collect()
    }
}

/// 将服务标识转换为编译单元名称中可用的字符
pub fn sanitize(id: &str) -> String {
    let sanitized: String = id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if sanitized.is_empty() {
        "_".to_string()
    } else {
        sanitized
    }
}

/// 将定义翻译为构造配方，同时执行导出前校验
struct RecipeCompiler<'a> {
    resolver: ReferenceResolver<'a>,
}

impl RecipeCompiler<'_> {
    fn recipe(&self, owner: &str, definition: &Definition) -> ContainerResult<Recipe> {
        let constructor = match definition.construction() {
            Some(Construction::Class(constructor)) => CompiledConstructor::Call(constructor.clone()),
            Some(Construction::Factory { factory, .. }) => CompiledConstructor::Call(factory.clone()),
            Some(Construction::Value(value)) => CompiledConstructor::Literal(unescape_value(value)),
            Some(Construction::Option(key)) => {
                return Err(ContainerError::dump(
                    owner,
                    format!("配置选项 {} 未被解析", key.path()),
                ))
            }
            None => return Err(ContainerError::dump(owner, "定义没有构造方式")),
        };

        let arguments = self.values(owner, definition.arguments())?;
        let mut method_calls = Vec::with_capacity(definition.method_calls().len());
        for call in definition.method_calls() {
            method_calls.push(CompiledCall {
                call: call.clone(),
                arguments: self.values(owner, &call.arguments)?,
            });
        }
        let mut properties = Vec::with_capacity(definition.properties().len());
        for (name, assignment) in definition.properties() {
            properties.push(CompiledProperty {
                name: name.clone(),
                assignment: assignment.clone(),
                value: self.value(owner, &assignment.value)?,
            });
        }

        Ok(Recipe {
            constructor,
            arguments,
            method_calls,
            properties,
        })
    }

    fn values(&self, owner: &str, arguments: &[Argument]) -> ContainerResult<Vec<CompiledValue>> {
        arguments
            .iter()
            .map(|argument| self.value(owner, argument))
            .collect()
    }

    fn value(&self, owner: &str, argument: &Argument) -> ContainerResult<CompiledValue> {
        Ok(match argument {
            Argument::Value(value) => CompiledValue::Literal(unescape_value(value)),
            Argument::Reference(reference) => self.reference(owner, reference)?,
            Argument::Array(array) => {
                let mut entries = Vec::with_capacity(array.len());
                for (key, entry) in array.entries() {
                    entries.push((key.clone(), self.value(owner, entry)?));
                }
                CompiledValue::Array(entries)
            }
            Argument::Iterator(iterator) => {
                let mut members = Vec::with_capacity(iterator.references().len());
                for reference in iterator.references() {
                    if let CompiledValue::Service(member) = self.reference(owner, reference)? {
                        members.push(member);
                    }
                }
                CompiledValue::Iterator(members)
            }
            Argument::TaggedIterator(tagged) => {
                return Err(ContainerError::dump(
                    owner,
                    format!("标签集合 {} 未被展开", tagged.tag()),
                ))
            }
            Argument::Condition(condition) => {
                let mut candidates = Vec::with_capacity(condition.references().len());
                for reference in condition.references() {
                    candidates.push(self.reference(owner, reference)?);
                }
                CompiledValue::Condition {
                    candidates,
                    argument: condition.clone(),
                }
            }
            Argument::ReferenceSet(set) => {
                let mut entries = Vec::with_capacity(set.references().len());
                for reference in set.references() {
                    let member = self.reference(owner, reference)?;
                    if !matches!(member, CompiledValue::Absent) {
                        entries.push((None, member));
                    }
                }
                CompiledValue::Array(entries)
            }
            Argument::Inline(definition) => {
                CompiledValue::Inline(Box::new(self.recipe(owner, definition)?))
            }
            Argument::Absent => CompiledValue::Absent,
        })
    }

    fn reference(&self, owner: &str, reference: &Reference) -> ContainerResult<CompiledValue> {
        Ok(match self.resolver.resolve(reference)? {
            ResolvedReference::Definition(target) => {
                CompiledValue::Service(Reference::new(target).with_behavior(reference.behavior()))
            }
            ResolvedReference::Uninitialized(target) => CompiledValue::Service(
                Reference::new(target).with_behavior(InvalidBehavior::IgnoreOnUninitializedReference),
            ),
            ResolvedReference::Absent => CompiledValue::Absent,
            ResolvedReference::Missing(target) => {
                return Err(ContainerError::dump(
                    owner,
                    format!("引用了不存在的服务 {}", target),
                ))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use di_abstractions::{Alias, IteratorArgument, TaggedIteratorArgument};
    use serde_json::json;

    fn frozen(mut builder: ContainerBuilder) -> ContainerBuilder {
        builder.freeze();
        builder
    }

    fn graph() -> ContainerBuilder {
        let mut builder = ContainerBuilder::new();
        builder
            .set_definition("logger", Definition::value(json!("log")).public(true))
            .unwrap();
        builder
            .set_definition(
                "mailer",
                Definition::value(json!("mail"))
                    .public(true)
                    .shared(false)
                    .with_argument(Reference::new("logger")),
            )
            .unwrap();
        builder.set_definition("request", Definition::synthetic().public(true)).unwrap();
        builder
    }

    #[test]
    fn test_unfrozen_builder_is_rejected() {
        assert!(matches!(
            Dumper::default().dump(&graph()),
            Err(ContainerError::Dump { .. })
        ));
    }

    #[test]
    fn test_entries_reflect_definition_kinds() {
        let compiled = Dumper::default().dump(&frozen(graph())).unwrap();
        assert_eq!(compiled.entry("logger").unwrap().kind, EntryKind::Shared);
        assert_eq!(compiled.entry("mailer").unwrap().kind, EntryKind::Factory);
        let request = compiled.entry("request").unwrap();
        assert_eq!(request.kind, EntryKind::Synthetic);
        assert!(request.recipe.is_none());

        assert_eq!(compiled.units().len(), 1);
        assert_eq!(compiled.units()[0].name, "CompiledContainer");
        assert_eq!(compiled.unit_of("mailer").unwrap().name, "CompiledContainer");
    }

    #[test]
    fn test_dangling_reference_fails_dump() {
        let mut builder = graph();
        builder
            .set_definition("broken", Definition::value(json!(null)).with_argument(Reference::new("nowhere")))
            .unwrap();
        match Dumper::default().dump(&frozen(builder)) {
            Err(ContainerError::Dump { id, message }) => {
                assert_eq!(id, "broken");
                assert!(message.contains("nowhere"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_ignorable_references_compile_to_absent() {
        let mut builder = graph();
        builder
            .set_definition(
                "consumer",
                Definition::value(json!(null))
                    .with_argument(Reference::ignore_on_invalid("nowhere"))
                    .with_argument(IteratorArgument::new(vec![
                        Reference::new("logger"),
                        Reference::ignore_on_invalid("nowhere"),
                    ])),
            )
            .unwrap();
        let compiled = Dumper::default().dump(&frozen(builder)).unwrap();
        let recipe = compiled.entry("consumer").unwrap().recipe.as_ref().unwrap();
        assert!(matches!(recipe.arguments[0], CompiledValue::Absent));
        assert!(matches!(&recipe.arguments[1], CompiledValue::Iterator(members) if members.len() == 1));
    }

    #[test]
    fn test_unresolved_placeholders_fail_dump() {
        let mut builder = graph();
        builder
            .set_definition(
                "loader",
                Definition::value(json!(null)).with_argument(TaggedIteratorArgument::new("cmd")),
            )
            .unwrap();
        assert!(Dumper::default().dump(&frozen(builder)).is_err());
    }

    #[test]
    fn test_dangling_alias_fails_dump() {
        let mut builder = graph();
        builder
            .set_alias_definition("ghost", Alias::new("nowhere"))
            .unwrap();
        assert!(matches!(
            Dumper::default().dump(&frozen(builder)),
            Err(ContainerError::Dump { id, .. }) if id == "ghost"
        ));
    }

    #[test]
    fn test_partitioned_units_are_named_per_service() {
        let mut builder = graph();
        builder.set_definition("app.mailer", Definition::value(json!(1))).unwrap();
        builder.set_definition("app_mailer", Definition::value(json!(2))).unwrap();
        let options = DumpOptions {
            class_name: "AppContainer".to_string(),
            namespace: Some("app".to_string()),
            partition: true,
            debug: false,
        };
        let compiled = Dumper::new(options).dump(&frozen(builder)).unwrap();

        let names: Vec<&str> = compiled.units().iter().map(|unit| unit.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "app::AppContainer/Shared_logger",
                "app::AppContainer/Factory_mailer",
                "app::AppContainer/Synthetic_request",
                "app::AppContainer/Shared_app_mailer",
                "app::AppContainer/Shared_app_mailer_2",
            ]
        );
        assert_eq!(
            compiled.unit("app::AppContainer/Factory_mailer").unwrap().references,
            vec!["app::AppContainer/Shared_logger"]
        );
    }

    #[test]
    fn test_debug_manifest_carries_metadata() {
        let options = DumpOptions {
            debug: true,
            ..DumpOptions::default()
        };
        let compiled = Dumper::new(options).dump(&frozen(graph())).unwrap();
        let manifest: Value = serde_json::from_str(&compiled.manifest_json().unwrap()).unwrap();
        assert_eq!(manifest["class_name"], json!("CompiledContainer"));
        assert_eq!(manifest["services"][0]["id"], json!("logger"));
        assert!(manifest["services"][0]["metadata"].is_object());

        let plain = Dumper::default().dump(&frozen(graph())).unwrap();
        let manifest: Value = serde_json::from_str(&plain.manifest_json().unwrap()).unwrap();
        assert!(manifest["services"][0].get("metadata").is_none());
    }

    #[test]
    fn test_escaped_percent_is_restored() {
        let mut builder = ContainerBuilder::new();
        builder
            .set_definition("ratio", Definition::value(json!("100%%")).public(true))
            .unwrap();
        builder.set_parameter("label", "50%% off").unwrap();
        let compiled = Dumper::default().dump(&frozen(builder)).unwrap();
        assert!(matches!(
            &compiled.entry("ratio").unwrap().recipe.as_ref().unwrap().constructor,
            CompiledConstructor::Literal(value) if value == "100%"
        ));
        assert_eq!(compiled.parameters()["label"], json!("50% off"));
    }
}
