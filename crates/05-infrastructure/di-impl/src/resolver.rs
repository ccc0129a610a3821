//! 引用解析与循环依赖检测
//!
//! 引用会透明地穿过别名；别名链在做环检测之前先被展开。

use di_abstractions::{ContainerBuilder, InvalidBehavior, Reference};
use infrastructure_common::{ContainerError, ContainerResult};
use std::collections::HashSet;
use tracing::debug;

/// 引用解析结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedReference {
    /// 指向存在的服务定义
    Definition(String),
    /// 可忽略引用的目标不存在
    Absent,
    /// 目标存在，但只在已实例化时取值，不构成构造依赖
    Uninitialized(String),
    /// 目标不存在且不可忽略，由导出器报告
    Missing(String),
}

/// 引用解析器
#[derive(Debug, Clone, Copy)]
pub struct ReferenceResolver<'a> {
    builder: &'a ContainerBuilder,
}

impl<'a> ReferenceResolver<'a> {
    /// 创建解析器
    pub fn new(builder: &'a ContainerBuilder) -> Self {
        Self { builder }
    }

    /// 展开别名链，返回最终的标识
    ///
    /// 非别名原样返回；别名链成环时报告循环引用。
    pub fn flatten_alias(&self, id: &str) -> ContainerResult<String> {
        let mut chain = vec![id.to_string()];
        let mut current = id;
        while let Some(alias) = self.builder.aliases().get(current) {
            current = alias.target();
            if chain.iter().any(|seen| seen == current) {
                chain.push(current.to_string());
                return Err(ContainerError::CircularReference { build_stack: chain });
            }
            chain.push(current.to_string());
        }
        Ok(current.to_string())
    }

    /// 解析引用
    pub fn resolve(&self, reference: &Reference) -> ContainerResult<ResolvedReference> {
        let target = self.flatten_alias(reference.id())?;
        let exists = self.builder.has_definition(&target);
        Ok(match (exists, reference.behavior()) {
            (true, InvalidBehavior::IgnoreOnUninitializedReference) => {
                ResolvedReference::Uninitialized(target)
            }
            (true, _) => ResolvedReference::Definition(target),
            (false, InvalidBehavior::Fail) => ResolvedReference::Missing(target),
            (false, _) => ResolvedReference::Absent,
        })
    }
}

/// 循环依赖检测器
///
/// 从每个定义出发做深度优先遍历并维护构建栈。只有构造时立即解析的引用才算
/// 构造边：指向懒加载服务的边由代理推迟，`IgnoreOnUninitializedReference`
/// 不会触发构造，惰性迭代器成员在使用时才解析，这些边都不会形成循环。
#[derive(Debug)]
pub struct CycleDetector<'a> {
    builder: &'a ContainerBuilder,
    resolver: ReferenceResolver<'a>,
}

impl<'a> CycleDetector<'a> {
    /// 创建检测器
    pub fn new(builder: &'a ContainerBuilder) -> Self {
        Self {
            builder,
            resolver: ReferenceResolver::new(builder),
        }
    }

    /// 检测整个定义图
    pub fn check(&self) -> ContainerResult<()> {
        let definitions = self.builder.definitions();
        let roots = definitions
            .iter()
            .filter(|(_, definition)| definition.is_public() && !definition.is_lazy())
            .chain(
                definitions
                    .iter()
                    .filter(|(_, definition)| !definition.is_public() || definition.is_lazy()),
            )
            .map(|(id, _)| id.as_str());

        let mut visited = HashSet::new();
        let mut stack = Vec::new();
        for root in roots {
            self.visit(root, &mut stack, &mut visited)?;
        }
        debug!("循环依赖检测完成, 共检查 {} 个服务", visited.len());
        Ok(())
    }

    /// 某个服务的构造依赖（已展开别名）
    pub fn construction_edges(&self, id: &str) -> ContainerResult<Vec<String>> {
        let Some(definition) = self.builder.definitions().get(id) else {
            return Ok(Vec::new());
        };
        let mut targets = Vec::new();
        for edge in definition.references() {
            if !edge.eager {
                continue;
            }
            if let ResolvedReference::Definition(target) = self.resolver.resolve(edge.reference)? {
                let is_lazy = self
                    .builder
                    .definitions()
                    .get(&target)
                    .map(|definition| definition.is_lazy())
                    .unwrap_or(false);
                if !is_lazy {
                    targets.push(target);
                }
            }
        }
        Ok(targets)
    }

    fn visit(
        &self,
        id: &str,
        stack: &mut Vec<String>,
        visited: &mut HashSet<String>,
    ) -> ContainerResult<()> {
        if stack.iter().any(|entry| entry == id) {
            return Err(ContainerError::CircularReference {
                build_stack: stack.clone(),
            });
        }
        if visited.contains(id) {
            return Ok(());
        }

        stack.push(id.to_string());
        for target in self.construction_edges(id)? {
            self.visit(&target, stack, visited)?;
        }
        stack.pop();
        visited.insert(id.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use di_abstractions::{Definition, IteratorArgument};
    use serde_json::json;

    fn service(dependencies: &[Reference]) -> Definition {
        let mut definition = Definition::value(json!(null)).public(true);
        for reference in dependencies {
            definition = definition.with_argument(reference.clone());
        }
        definition
    }

    #[test]
    fn test_two_node_cycle_lists_build_stack() {
        let mut builder = ContainerBuilder::new();
        builder.set_definition("A", service(&[Reference::new("B")])).unwrap();
        builder.set_definition("B", service(&[Reference::new("A")])).unwrap();

        match CycleDetector::new(&builder).check() {
            Err(ContainerError::CircularReference { build_stack }) => {
                assert_eq!(build_stack, vec!["A", "B"]);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_lazy_edge_breaks_cycle() {
        let mut builder = ContainerBuilder::new();
        builder.set_definition("A", service(&[Reference::new("B")])).unwrap();
        builder
            .set_definition("B", service(&[Reference::new("A")]).lazy(true))
            .unwrap();
        assert!(CycleDetector::new(&builder).check().is_ok());
    }

    #[test]
    fn test_cycle_through_alias_is_detected() {
        let mut builder = ContainerBuilder::new();
        builder.set_definition("A", service(&[Reference::new("b.alias")])).unwrap();
        builder.set_definition("B", service(&[Reference::new("A")])).unwrap();
        builder.set_alias("b.alias", "B").unwrap();
        assert!(matches!(
            CycleDetector::new(&builder).check(),
            Err(ContainerError::CircularReference { .. })
        ));
    }

    #[test]
    fn test_uninitialized_and_iterator_edges_do_not_form_cycles() {
        let mut builder = ContainerBuilder::new();
        builder
            .set_definition("A", service(&[Reference::ignore_on_uninitialized("B")]))
            .unwrap();
        builder
            .set_definition(
                "B",
                service(&[]).with_argument(IteratorArgument::new(vec![Reference::new("A")])),
            )
            .unwrap();
        assert!(CycleDetector::new(&builder).check().is_ok());
    }

    #[test]
    fn test_self_reference() {
        let mut builder = ContainerBuilder::new();
        builder.set_definition("A", service(&[Reference::new("A")])).unwrap();
        match CycleDetector::new(&builder).check() {
            Err(ContainerError::CircularReference { build_stack }) => {
                assert_eq!(build_stack, vec!["A"]);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_resolver_classification() {
        let mut builder = ContainerBuilder::new();
        builder.set_definition("logger", service(&[])).unwrap();
        builder.set_alias("log", "logger").unwrap();
        let resolver = ReferenceResolver::new(&builder);

        assert_eq!(
            resolver.resolve(&Reference::new("log")).unwrap(),
            ResolvedReference::Definition("logger".into())
        );
        assert_eq!(
            resolver.resolve(&Reference::ignore_on_invalid("missing")).unwrap(),
            ResolvedReference::Absent
        );
        assert_eq!(
            resolver.resolve(&Reference::new("missing")).unwrap(),
            ResolvedReference::Missing("missing".into())
        );
        assert_eq!(
            resolver.resolve(&Reference::ignore_on_uninitialized("log")).unwrap(),
            ResolvedReference::Uninitialized("logger".into())
        );
    }
}
