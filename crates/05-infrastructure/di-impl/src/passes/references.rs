//! 别名展开与无效引用处理

use crate::resolver::ReferenceResolver;
use di_abstractions::{Argument, CompilerPass, ContainerBuilder, InvalidBehavior, Reference};
use infrastructure_common::ContainerResult;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// 展开别名链，使每个别名和引用都直接指向最终目标
#[derive(Debug, Default)]
pub struct ResolveAliasesPass;

impl ResolveAliasesPass {
    pub fn new() -> Self {
        Self
    }
}

impl CompilerPass for ResolveAliasesPass {
    fn process(&mut self, builder: &mut ContainerBuilder) -> ContainerResult<()> {
        let resolver = ReferenceResolver::new(builder);
        let mut targets = HashMap::with_capacity(builder.aliases().len());
        for alias in builder.aliases().keys() {
            targets.insert(alias.clone(), resolver.flatten_alias(alias)?);
        }

        for (alias, definition) in builder.aliases_mut()?.iter_mut() {
            if let Some(target) = targets.get(alias) {
                if definition.target() != target {
                    debug!("展开别名 {}: {} -> {}", alias, definition.target(), target);
                    definition.set_target(target.clone());
                }
            }
        }

        for definition in builder.definitions_mut()?.values_mut() {
            definition.for_each_reference_mut(&mut |reference| {
                if let Some(target) = targets.get(reference.id()) {
                    reference.set_id(target.clone());
                }
            });
        }
        Ok(())
    }
}

/// 处理目标不存在的可忽略引用
///
/// 直接引用替换为 [`Argument::Absent`]，集合中的成员被移除；
/// 顶层参数含有 `IgnoreOnInvalidReference` 缺失引用的方法调用整个被移除。
/// 不可忽略的缺失引用保持原样，由导出器报告。
#[derive(Debug, Default)]
pub struct ResolveInvalidReferencesPass;

impl ResolveInvalidReferencesPass {
    pub fn new() -> Self {
        Self
    }
}

impl CompilerPass for ResolveInvalidReferencesPass {
    fn priority(&self) -> i32 {
        -50
    }

    fn process(&mut self, builder: &mut ContainerBuilder) -> ContainerResult<()> {
        let resolver = ReferenceResolver::new(builder);
        let mut known: HashSet<String> = builder.definitions().keys().cloned().collect();
        for alias in builder.aliases().keys() {
            if builder.has_definition(&resolver.flatten_alias(alias)?) {
                known.insert(alias.clone());
            }
        }
        let dropped = |reference: &Reference| {
            reference.behavior().is_ignorable() && !known.contains(reference.id())
        };

        for (id, definition) in builder.definitions_mut()?.iter_mut() {
            definition.method_calls_mut().retain(|call| {
                let removable = call.arguments.iter().any(|argument| {
                    matches!(argument, Argument::Reference(reference)
                        if reference.behavior() == InvalidBehavior::IgnoreOnInvalidReference
                            && dropped(reference))
                });
                if removable {
                    warn!("服务 {} 的方法调用 {} 依赖缺失的可选服务, 已移除", id, call.name);
                }
                !removable
            });

            definition.walk_arguments_mut(&mut |argument| match argument {
                Argument::Reference(reference) if dropped(reference) => {
                    debug!("服务 {} 的可选依赖 {} 不存在", id, reference.id());
                    *argument = Argument::Absent;
                }
                Argument::Array(array) => array.entries_mut().retain(|(_, entry)| {
                    !matches!(entry, Argument::Reference(reference) if dropped(reference))
                }),
                Argument::Iterator(iterator) => {
                    iterator.references_mut().retain(|reference| !dropped(reference))
                }
                Argument::ReferenceSet(set) => {
                    set.references_mut().retain(|reference| !dropped(reference))
                }
                _ => {}
            });
        }
        Ok(())
    }
}
