//! 带标签服务集合展开

use di_abstractions::{
    Argument, CompilerPass, ContainerBuilder, IteratorArgument, Reference, TagAttributes,
};
use infrastructure_common::ContainerResult;
use std::collections::HashMap;
use tracing::debug;

/// 将 [`Argument::TaggedIterator`] 展开为引用全部带标签服务的惰性迭代器
///
/// 成员按注册顺序排列；声明了排序属性时按属性值降序做稳定排序，
/// 缺省或非数值属性视为 0。同一服务多次带有同一标签时只出现一次。
/// 抽象定义只是模板，不会成为成员。
#[derive(Debug, Default)]
pub struct ResolveTaggedIteratorArgumentPass;

impl ResolveTaggedIteratorArgumentPass {
    pub fn new() -> Self {
        Self
    }

    fn members(
        tagged: &[(String, TagAttributes)],
        priority_attribute: Option<&str>,
    ) -> Vec<Reference> {
        let mut members: Vec<(&str, i64)> = Vec::with_capacity(tagged.len());
        for (id, attributes) in tagged {
            if members.iter().any(|(seen, _)| seen == id) {
                continue;
            }
            let priority = priority_attribute
                .and_then(|attribute| attributes.get(attribute))
                .and_then(|value| value.as_i64())
                .unwrap_or(0);
            members.push((id.as_str(), priority));
        }
        if priority_attribute.is_some() {
            members.sort_by(|left, right| right.1.cmp(&left.1));
        }
        members
            .into_iter()
            .map(|(id, _)| Reference::new(id))
            .collect()
    }
}

impl CompilerPass for ResolveTaggedIteratorArgumentPass {
    fn priority(&self) -> i32 {
        // 同阶段的自定义步骤可能还会生成标签集合
        -100
    }

    fn process(&mut self, builder: &mut ContainerBuilder) -> ContainerResult<()> {
        let mut index: HashMap<String, Vec<(String, TagAttributes)>> = HashMap::new();
        for tag in builder.find_tags() {
            let tagged = builder
                .find_tagged(&tag)
                .into_iter()
                .filter(|service| {
                    let concrete = !service.definition.is_abstract();
                    if !concrete {
                        debug!("跳过带标签 {} 的抽象定义 {}", tag, service.id);
                    }
                    concrete
                })
                .map(|service| (service.id.to_string(), service.attributes.clone()))
                .collect();
            index.insert(tag, tagged);
        }

        let mut rewritten = 0usize;
        for (id, definition) in builder.definitions_mut()?.iter_mut() {
            definition.walk_arguments_mut(&mut |argument| {
                if let Argument::TaggedIterator(tagged) = argument {
                    let members = index
                        .get(tagged.tag())
                        .map(|services| Self::members(services, tagged.priority_attribute()))
                        .unwrap_or_default();
                    debug!(
                        "服务 {} 的标签集合 {} 展开为 {} 个成员",
                        id,
                        tagged.tag(),
                        members.len()
                    );
                    *argument = Argument::Iterator(IteratorArgument::new(members));
                    rewritten += 1;
                }
            });
        }
        if rewritten > 0 {
            debug!("共展开 {} 个标签集合", rewritten);
        }
        Ok(())
    }
}
