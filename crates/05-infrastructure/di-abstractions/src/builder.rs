//! 容器构建器
//!
//! 可变的服务定义图：标识到定义的映射、别名表、参数表和标签视图。
//! 构建器不是线程安全的，编译期间只应由一个线程持有。

use crate::definition::{Alias, Definition, TagAttributes};
use crate::pass::{CompilerPass, PassStage, PipelineConfig};
use crate::provider::ServiceProvider;
use indexmap::{IndexMap, IndexSet};
use infrastructure_common::{ContainerError, ContainerResult};
use serde_json::Value;
use tracing::{debug, info, warn};

/// 带标签的服务
#[derive(Debug, Clone)]
pub struct TaggedService<'a> {
    /// 服务标识
    pub id: &'a str,
    /// 服务定义
    pub definition: &'a Definition,
    /// 标签属性
    pub attributes: &'a TagAttributes,
}

/// 容器构建器
#[derive(Debug, Default)]
pub struct ContainerBuilder {
    definitions: IndexMap<String, Definition>,
    aliases: IndexMap<String, Alias>,
    parameters: IndexMap<String, Value>,
    pipeline: PipelineConfig,
    providers: IndexSet<String>,
    current_provider: Option<String>,
    frozen: bool,
}

impl ContainerBuilder {
    /// 创建空构建器
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_mutable(&self, operation: &str) -> ContainerResult<()> {
        if self.frozen {
            return Err(ContainerError::frozen(operation));
        }
        Ok(())
    }

    /// 注册服务提供者
    ///
    /// 同名提供者重复注册时报错，除非它声明自己可以合并。
    /// 合并注册只重新执行 `build`，编译步骤只在首次注册时加入。
    pub fn register(&mut self, provider: &dyn ServiceProvider) -> ContainerResult<()> {
        self.ensure_mutable("register")?;
        let name = provider.name().to_string();

        let merging = self.providers.contains(&name);
        if merging {
            if !provider.is_mergeable() {
                return Err(ContainerError::DuplicateServiceProvider { provider: name });
            }
            debug!("合并重复注册的服务提供者: {}", name);
        }
        info!("注册服务提供者: {}", name);

        let previous = self.current_provider.replace(name.clone());
        let result = provider.build(self);
        self.current_provider = previous;
        result?;

        if !merging {
            for (stage, pass) in provider.pipelines() {
                debug!("服务提供者 {} 贡献编译步骤 {} ({})", name, pass.name(), stage);
                self.pipeline.add_pass(stage, pass);
            }
        }
        for (alias, target) in provider.aliases() {
            self.set_alias(alias, target)?;
        }

        self.providers.insert(name);
        Ok(())
    }

    /// 已注册的服务提供者
    pub fn registered_providers(&self) -> impl Iterator<Item = &str> {
        self.providers.iter().map(String::as_str)
    }

    /// 设置服务定义，同名别名会被移除
    pub fn set_definition(
        &mut self,
        id: impl Into<String>,
        mut definition: Definition,
    ) -> ContainerResult<&mut Definition> {
        self.ensure_mutable("set_definition")?;
        let id = id.into();
        if id.is_empty() {
            return Err(ContainerError::invalid_definition(id, "服务标识不能为空"));
        }
        definition.validate(&id)?;

        if definition.source().is_none() {
            if let Some(provider) = &self.current_provider {
                definition.set_source(provider.clone());
            }
        }
        if self.aliases.shift_remove(&id).is_some() {
            warn!("服务定义 {} 覆盖了同名别名", id);
        }
        debug!("设置服务定义: {}", id);

        let (index, _) = self.definitions.insert_full(id, definition);
        Ok(&mut self.definitions[index])
    }

    /// 获取服务定义，会穿透别名
    pub fn get_definition(&self, id: &str) -> ContainerResult<&Definition> {
        self.find_definition(id)
            .ok_or_else(|| ContainerError::not_found(id))
    }

    /// 获取服务定义（可修改），会穿透别名
    pub fn get_definition_mut(&mut self, id: &str) -> ContainerResult<&mut Definition> {
        self.ensure_mutable("get_definition_mut")?;
        let target = self
            .resolve_alias_target(id)
            .unwrap_or_else(|| id.to_string());
        self.definitions
            .get_mut(&target)
            .ok_or_else(|| ContainerError::not_found(id))
    }

    /// 查找服务定义，会穿透别名
    pub fn find_definition(&self, id: &str) -> Option<&Definition> {
        match self.definitions.get(id) {
            Some(definition) => Some(definition),
            None => self
                .resolve_alias_target(id)
                .and_then(|target| self.definitions.get(&target)),
        }
    }

    /// 是否存在服务定义或别名
    pub fn has(&self, id: &str) -> bool {
        self.definitions.contains_key(id) || self.aliases.contains_key(id)
    }

    /// 是否存在服务定义（不含别名）
    pub fn has_definition(&self, id: &str) -> bool {
        self.definitions.contains_key(id)
    }

    /// 移除服务定义
    pub fn remove_definition(&mut self, id: &str) -> ContainerResult<Option<Definition>> {
        self.ensure_mutable("remove_definition")?;
        Ok(self.definitions.shift_remove(id))
    }

    /// 全部服务定义，按注册顺序排列
    pub fn definitions(&self) -> &IndexMap<String, Definition> {
        &self.definitions
    }

    /// 全部服务定义（可修改）
    pub fn definitions_mut(&mut self) -> ContainerResult<&mut IndexMap<String, Definition>> {
        self.ensure_mutable("definitions_mut")?;
        Ok(&mut self.definitions)
    }

    /// 设置公开别名
    pub fn set_alias(&mut self, alias: impl Into<String>, target: impl Into<String>) -> ContainerResult<()> {
        self.set_alias_definition(alias, Alias::new(target))
    }

    /// 设置别名
    ///
    /// 直接自引用立即报错；若新别名使已有别名链闭合成环，也在此时报告循环引用。
    pub fn set_alias_definition(&mut self, alias: impl Into<String>, definition: Alias) -> ContainerResult<()> {
        self.ensure_mutable("set_alias")?;
        let alias = alias.into();
        if alias.is_empty() {
            return Err(ContainerError::InvalidAlias {
                alias,
                message: "别名不能为空".to_string(),
            });
        }
        if alias == definition.target() {
            return Err(ContainerError::InvalidAlias {
                message: format!("别名不能指向自身: {}", alias),
                alias,
            });
        }

        let mut chain = vec![alias.clone(), definition.target().to_string()];
        let mut current = definition.target().to_string();
        while let Some(next) = self.aliases.get(&current) {
            current = next.target().to_string();
            chain.push(current.clone());
            if current == alias {
                return Err(ContainerError::CircularReference { build_stack: chain });
            }
            if chain.len() > self.aliases.len() + 2 {
                break;
            }
        }

        if self.definitions.shift_remove(&alias).is_some() {
            warn!("别名 {} 覆盖了同名服务定义", alias);
        }
        debug!("设置别名: {} -> {}", alias, definition.target());
        self.aliases.insert(alias, definition);
        Ok(())
    }

    /// 获取别名
    pub fn get_alias(&self, alias: &str) -> ContainerResult<&Alias> {
        self.aliases
            .get(alias)
            .ok_or_else(|| ContainerError::not_found(alias))
    }

    /// 是否存在别名
    pub fn has_alias(&self, alias: &str) -> bool {
        self.aliases.contains_key(alias)
    }

    /// 移除别名
    pub fn remove_alias(&mut self, alias: &str) -> ContainerResult<Option<Alias>> {
        self.ensure_mutable("remove_alias")?;
        Ok(self.aliases.shift_remove(alias))
    }

    /// 全部别名
    pub fn aliases(&self) -> &IndexMap<String, Alias> {
        &self.aliases
    }

    /// 全部别名（可修改）
    pub fn aliases_mut(&mut self) -> ContainerResult<&mut IndexMap<String, Alias>> {
        self.ensure_mutable("aliases_mut")?;
        Ok(&mut self.aliases)
    }

    /// 沿别名链找到最终目标，遇到环时返回 `None`
    pub fn resolve_alias_target(&self, id: &str) -> Option<String> {
        let mut current = self.aliases.get(id)?.target().to_string();
        let mut hops = 0;
        while let Some(next) = self.aliases.get(&current) {
            hops += 1;
            if hops > self.aliases.len() {
                return None;
            }
            current = next.target().to_string();
        }
        Some(current)
    }

    /// 设置参数
    pub fn set_parameter(&mut self, name: impl Into<String>, value: impl Into<Value>) -> ContainerResult<()> {
        self.ensure_mutable("set_parameter")?;
        self.parameters.insert(name.into(), value.into());
        Ok(())
    }

    /// 获取参数
    pub fn get_parameter(&self, name: &str) -> ContainerResult<&Value> {
        self.parameters
            .get(name)
            .ok_or_else(|| ContainerError::ParameterNotFound {
                name: name.to_string(),
            })
    }

    /// 是否存在参数
    pub fn has_parameter(&self, name: &str) -> bool {
        self.parameters.contains_key(name)
    }

    /// 全部参数
    pub fn parameters(&self) -> &IndexMap<String, Value> {
        &self.parameters
    }

    /// 全部参数（可修改）
    pub fn parameters_mut(&mut self) -> ContainerResult<&mut IndexMap<String, Value>> {
        self.ensure_mutable("parameters_mut")?;
        Ok(&mut self.parameters)
    }

    /// 查找带有指定标签的服务，按注册顺序排列
    ///
    /// 同一服务多次带有该标签时，每次出现都会返回一项。
    pub fn find_tagged(&self, tag: &str) -> Vec<TaggedService<'_>> {
        self.definitions
            .iter()
            .flat_map(|(id, definition)| {
                definition
                    .tags()
                    .iter()
                    .filter(move |candidate| candidate.name == tag)
                    .map(move |candidate| TaggedService {
                        id: id.as_str(),
                        definition,
                        attributes: &candidate.attributes,
                    })
            })
            .collect()
    }

    /// 全部标签名称，按首次出现顺序排列
    pub fn find_tags(&self) -> Vec<String> {
        let mut tags = IndexSet::new();
        for definition in self.definitions.values() {
            for tag in definition.tags() {
                tags.insert(tag.name.clone());
            }
        }
        tags.into_iter().collect()
    }

    /// 添加编译步骤
    pub fn add_pass(&mut self, stage: PassStage, pass: Box<dyn CompilerPass>) -> ContainerResult<()> {
        self.ensure_mutable("add_pass")?;
        self.pipeline.add_pass(stage, pass);
        Ok(())
    }

    /// 管道配置
    pub fn pipeline_config(&self) -> &PipelineConfig {
        &self.pipeline
    }

    /// 取出管道配置，供管道引擎在执行期间独占
    pub fn take_pipeline_config(&mut self) -> PipelineConfig {
        std::mem::take(&mut self.pipeline)
    }

    /// 归还管道配置，执行期间新增的步骤追加在后面
    pub fn restore_pipeline_config(&mut self, mut config: PipelineConfig) {
        let added = std::mem::take(&mut self.pipeline);
        config.merge(added);
        self.pipeline = config;
    }

    /// 冻结构建器，之后的修改都会失败
    pub fn freeze(&mut self) {
        if !self.frozen {
            info!("容器构建器已冻结, 共 {} 个服务定义", self.definitions.len());
        }
        self.frozen = true;
    }

    /// 是否已冻结
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct MailProvider;

    impl ServiceProvider for MailProvider {
        fn name(&self) -> &str {
            "MailProvider"
        }

        fn build(&self, builder: &mut ContainerBuilder) -> ContainerResult<()> {
            builder.set_definition("mailer", Definition::value(json!("smtp")).public(true))?;
            Ok(())
        }

        fn aliases(&self) -> Vec<(String, String)> {
            vec![("mail".to_string(), "mailer".to_string())]
        }
    }

    struct MergeableProvider;

    impl ServiceProvider for MergeableProvider {
        fn build(&self, builder: &mut ContainerBuilder) -> ContainerResult<()> {
            builder.set_definition("counter", Definition::value(json!(1)))?;
            Ok(())
        }

        fn is_mergeable(&self) -> bool {
            true
        }
    }

    #[test]
    fn test_register_records_source_and_aliases() {
        let mut builder = ContainerBuilder::new();
        builder.register(&MailProvider).unwrap();

        let definition = builder.get_definition("mail").unwrap();
        assert_eq!(definition.source(), Some("MailProvider"));
        assert_eq!(builder.get_alias("mail").unwrap().target(), "mailer");
        assert_eq!(builder.registered_providers().collect::<Vec<_>>(), vec!["MailProvider"]);
    }

    #[test]
    fn test_duplicate_provider_is_rejected() {
        let mut builder = ContainerBuilder::new();
        builder.register(&MailProvider).unwrap();
        assert!(matches!(
            builder.register(&MailProvider),
            Err(ContainerError::DuplicateServiceProvider { .. })
        ));
    }

    #[test]
    fn test_mergeable_provider_can_register_twice() {
        let mut builder = ContainerBuilder::new();
        builder.register(&MergeableProvider).unwrap();
        builder.register(&MergeableProvider).unwrap();
        assert_eq!(builder.registered_providers().count(), 1);
        assert!(builder.has_definition("counter"));
    }

    #[test]
    fn test_get_definition_not_found() {
        let builder = ContainerBuilder::new();
        assert!(matches!(
            builder.get_definition("missing"),
            Err(ContainerError::NotFound { .. })
        ));
    }

    #[test]
    fn test_self_alias_is_invalid() {
        let mut builder = ContainerBuilder::new();
        assert!(matches!(
            builder.set_alias("a", "a"),
            Err(ContainerError::InvalidAlias { .. })
        ));
    }

    #[test]
    fn test_alias_may_precede_target() {
        let mut builder = ContainerBuilder::new();
        builder.set_alias("logger", "monolog").unwrap();
        assert!(builder.get_definition("logger").is_err());
        builder
            .set_definition("monolog", Definition::value(json!("log")))
            .unwrap();
        assert!(builder.get_definition("logger").is_ok());
    }

    #[test]
    fn test_closing_alias_cycle_is_reported() {
        let mut builder = ContainerBuilder::new();
        builder.set_alias("a", "b").unwrap();
        builder.set_alias("b", "c").unwrap();
        match builder.set_alias("c", "a") {
            Err(ContainerError::CircularReference { build_stack }) => {
                assert_eq!(build_stack, vec!["c", "a", "b", "c"]);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_find_tagged_preserves_registration_order() {
        let mut builder = ContainerBuilder::new();
        builder
            .set_definition("second", Definition::value(json!(2)).with_tag("x"))
            .unwrap();
        builder
            .set_definition("other", Definition::value(json!(0)).with_tag("y"))
            .unwrap();
        builder
            .set_definition("first", Definition::value(json!(1)).with_tag("x"))
            .unwrap();
        let ids: Vec<&str> = builder.find_tagged("x").iter().map(|tagged| tagged.id).collect();
        assert_eq!(ids, vec!["second", "first"]);
        assert_eq!(builder.find_tags(), vec!["x", "y"]);
    }

    #[test]
    fn test_frozen_builder_rejects_mutation() {
        let mut builder = ContainerBuilder::new();
        builder.freeze();
        assert!(matches!(
            builder.set_parameter("debug", true),
            Err(ContainerError::Frozen { .. })
        ));
        assert!(builder.set_definition("x", Definition::new()).is_err());
    }

    #[test]
    fn test_parameters() {
        let mut builder = ContainerBuilder::new();
        builder.set_parameter("locale", "en").unwrap();
        assert_eq!(builder.get_parameter("locale").unwrap(), &json!("en"));
        assert!(matches!(
            builder.get_parameter("missing"),
            Err(ContainerError::ParameterNotFound { .. })
        ));
    }
}
