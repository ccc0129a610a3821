//! 配置选项定义解析

use super::parameters::escape_value;
use di_abstractions::{CompilerPass, ContainerBuilder, Construction, OptionKey};
use infrastructure_common::{ContainerError, ContainerResult};
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

/// 存放配置树的参数名
pub const CONFIG_PARAMETER: &str = "config";

/// (类型, 维度) → 维度对应的配置节
type SectionCache = HashMap<(String, Vec<String>), Option<Value>>;

/// 将 [`Construction::Option`] 占位定义替换为配置树中的字面量
///
/// 同一类型的选项共享一次维度查找，缓存只在一次 `process` 调用内有效。
#[derive(Debug, Default)]
pub struct ResolveOptionDefinitionPass {
    tree_walks: usize,
}

impl ResolveOptionDefinitionPass {
    pub fn new() -> Self {
        Self::default()
    }

    /// 上一次执行时实际遍历配置树的次数
    pub fn tree_walks(&self) -> usize {
        self.tree_walks
    }

    fn lookup(
        &mut self,
        config: &Value,
        key: &OptionKey,
        cache: &mut SectionCache,
    ) -> ContainerResult<Value> {
        let cache_key = (key.class.clone(), key.dimensions.clone());
        if !cache.contains_key(&cache_key) {
            self.tree_walks += 1;
            let mut current = Some(config);
            for dimension in &key.dimensions {
                current = current.and_then(|node| node.get(dimension));
            }
            cache.insert(cache_key.clone(), current.cloned());
        }

        cache[&cache_key]
            .as_ref()
            .and_then(|node| node.get(&key.key))
            .cloned()
            // 配置树已经过占位符解析，默认值没有，需要补上转义
            .or_else(|| key.default.as_ref().map(escape_value))
            .ok_or_else(|| ContainerError::not_found(format!("{}.{}", CONFIG_PARAMETER, key.path())))
    }
}

impl CompilerPass for ResolveOptionDefinitionPass {
    fn priority(&self) -> i32 {
        // 在参数占位符解析之后，配置树中的占位符已经被替换
        50
    }

    fn process(&mut self, builder: &mut ContainerBuilder) -> ContainerResult<()> {
        self.tree_walks = 0;
        let config = builder
            .parameters()
            .get(CONFIG_PARAMETER)
            .cloned()
            .unwrap_or(Value::Null);
        let mut cache = HashMap::new();

        for (id, definition) in builder.definitions_mut()?.iter_mut() {
            let Some(Construction::Option(key)) = definition.construction() else {
                continue;
            };
            let key = key.clone();
            let value = self.lookup(&config, &key, &mut cache)?;
            debug!("服务 {} 解析配置选项 {} = {}", id, key.path(), value);
            definition.set_construction(Construction::Value(value));
        }
        Ok(())
    }
}
