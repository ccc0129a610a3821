//! 移除阶段：抽象定义、内联私有服务、未使用的私有服务

use di_abstractions::{Argument, CompilerPass, ContainerBuilder, Definition, InvalidBehavior, Reference};
use infrastructure_common::{ContainerError, ContainerResult};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// 移除抽象定义
#[derive(Debug, Default)]
pub struct RemoveAbstractDefinitionsPass;

impl RemoveAbstractDefinitionsPass {
    pub fn new() -> Self {
        Self
    }
}

impl CompilerPass for RemoveAbstractDefinitionsPass {
    fn priority(&self) -> i32 {
        100
    }

    fn process(&mut self, builder: &mut ContainerBuilder) -> ContainerResult<()> {
        let definitions = builder.definitions_mut()?;
        let before = definitions.len();
        definitions.retain(|_, definition| !definition.is_abstract());
        let removed = before - definitions.len();
        if removed > 0 {
            debug!("移除 {} 个抽象定义", removed);
        }
        Ok(())
    }
}

/// 内联只被引用一次的私有非共享服务
///
/// 候选定义必须是私有、非共享、非懒加载、非合成的，没有别名指向它，
/// 全图只有一处引用且是直接的 `Fail` 引用，并且不处在引用环上
/// （环上的定义保留下来，让循环检测报告完整的构建栈）。
#[derive(Debug, Default)]
pub struct InlineServiceDefinitionsPass;

impl InlineServiceDefinitionsPass {
    pub fn new() -> Self {
        Self
    }

    /// 一次性找出全部候选
    ///
    /// 内联只是把唯一一处引用换成定义本身，引用计数、别名和环都不会变化，
    /// 所以候选集合在一次执行中保持不变。
    fn candidates(builder: &ContainerBuilder) -> Vec<String> {
        let mut totals: HashMap<&str, usize> = HashMap::new();
        let mut direct: HashMap<&str, usize> = HashMap::new();
        for definition in builder.definitions().values() {
            for edge in definition.references() {
                *totals.entry(edge.reference.id()).or_default() += 1;
            }
            let mut references = Vec::new();
            collect_direct_definition(definition, &mut references);
            for reference in references {
                if reference.behavior() == InvalidBehavior::Fail {
                    *direct.entry(reference.id()).or_default() += 1;
                }
            }
        }
        let aliased: HashSet<&str> = builder.aliases().values().map(|alias| alias.target()).collect();

        builder
            .definitions()
            .iter()
            .filter(|(id, definition)| {
                !definition.is_public()
                    && !definition.is_shared()
                    && !definition.is_lazy()
                    && !definition.is_synthetic()
                    && !definition.is_abstract()
                    && definition.construction().is_some()
                    && !aliased.contains(id.as_str())
                    && totals.get(id.as_str()) == Some(&1)
                    && direct.get(id.as_str()) == Some(&1)
            })
            .map(|(id, _)| id.clone())
            .filter(|id| !reaches_itself(builder, id))
            .collect()
    }
}

impl CompilerPass for InlineServiceDefinitionsPass {
    fn process(&mut self, builder: &mut ContainerBuilder) -> ContainerResult<()> {
        let candidates = Self::candidates(builder);
        for id in &candidates {
            let definition = builder
                .remove_definition(id)?
                .ok_or_else(|| ContainerError::internal(format!("内联候选 {} 已不存在", id)))?;

            // 引用可能已经随另一个候选一起被内联，遍历会深入内联定义
            for (owner, target) in builder.definitions_mut()?.iter_mut() {
                target.walk_arguments_mut(&mut |argument| {
                    let matched = matches!(argument, Argument::Reference(reference)
                        if reference.id() == id && reference.behavior() == InvalidBehavior::Fail);
                    if matched {
                        debug!("将私有服务 {} 内联到 {}", id, owner);
                        *argument = Argument::Inline(Box::new(definition.clone()));
                    }
                });
            }
        }
        if !candidates.is_empty() {
            debug!("共内联 {} 个私有服务", candidates.len());
        }
        Ok(())
    }
}

/// 移除从任何公开定义或公开别名都不可达的私有定义，以及未被引用的私有别名
#[derive(Debug, Default)]
pub struct RemoveUnusedDefinitionsPass;

impl RemoveUnusedDefinitionsPass {
    pub fn new() -> Self {
        Self
    }
}

impl CompilerPass for RemoveUnusedDefinitionsPass {
    fn priority(&self) -> i32 {
        -100
    }

    fn process(&mut self, builder: &mut ContainerBuilder) -> ContainerResult<()> {
        let mut pending: Vec<String> = builder
            .definitions()
            .iter()
            .filter(|(_, definition)| definition.is_public())
            .map(|(id, _)| id.clone())
            .collect();
        pending.extend(
            builder
                .aliases()
                .values()
                .filter(|alias| alias.is_public())
                .map(|alias| alias.target().to_string()),
        );

        let mut reachable = HashSet::new();
        let mut used_aliases = HashSet::new();
        while let Some(id) = pending.pop() {
            if let Some(alias) = builder.aliases().get(&id) {
                if used_aliases.insert(id.clone()) {
                    pending.push(alias.target().to_string());
                }
                continue;
            }
            if !reachable.insert(id.clone()) {
                continue;
            }
            if let Some(definition) = builder.definitions().get(&id) {
                pending.extend(
                    definition
                        .references()
                        .into_iter()
                        .map(|edge| edge.reference.id().to_string()),
                );
            }
        }

        let definitions = builder.definitions_mut()?;
        let before = definitions.len();
        definitions.retain(|id, _| reachable.contains(id));
        let removed = before - definitions.len();

        builder
            .aliases_mut()?
            .retain(|id, alias| alias.is_public() || used_aliases.contains(id));
        if removed > 0 {
            debug!("移除 {} 个未使用的私有服务", removed);
        }
        Ok(())
    }
}

fn collect_direct<'a>(argument: &'a Argument, references: &mut Vec<&'a Reference>) {
    match argument {
        Argument::Reference(reference) => references.push(reference),
        Argument::Array(array) => {
            for (_, entry) in array.entries() {
                collect_direct(entry, references);
            }
        }
        Argument::Inline(definition) => collect_direct_definition(definition, references),
        _ => {}
    }
}

fn collect_direct_definition<'a>(definition: &'a Definition, references: &mut Vec<&'a Reference>) {
    let arguments = definition
        .arguments()
        .iter()
        .chain(definition.method_calls().iter().flat_map(|call| call.arguments.iter()))
        .chain(definition.properties().values().map(|property| &property.value));
    for argument in arguments {
        collect_direct(argument, references);
    }
}

fn reaches_itself(builder: &ContainerBuilder, id: &str) -> bool {
    let mut pending: Vec<String> = Vec::new();
    let mut seen = HashSet::new();
    if let Some(definition) = builder.definitions().get(id) {
        pending.extend(definition.references().iter().map(|edge| edge.reference.id().to_string()));
    }
    while let Some(current) = pending.pop() {
        let current = builder.resolve_alias_target(&current).unwrap_or(current);
        if current == id {
            return true;
        }
        if !seen.insert(current.clone()) {
            continue;
        }
        if let Some(definition) = builder.definitions().get(&current) {
            pending.extend(definition.references().iter().map(|edge| edge.reference.id().to_string()));
        }
    }
    false
}
