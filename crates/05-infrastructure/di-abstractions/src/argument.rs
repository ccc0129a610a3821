//! 参数类型
//!
//! 构造参数是一个封闭的和类型，导出时可以穷尽匹配。

use crate::definition::Definition;
use crate::reference::Reference;
use crate::resolved::ResolvedValue;
use infrastructure_common::{ContainerError, ContainerResult};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// 构造参数
#[derive(Debug, Clone)]
pub enum Argument {
    /// 字面量，字符串中可以包含 `%name%` 参数占位符
    Value(Value),
    /// 服务引用
    Reference(Reference),
    /// 有序（可带键）的集合
    Array(ArrayArgument),
    /// 惰性引用序列
    Iterator(IteratorArgument),
    /// 带标签服务的集合占位符，编译时展开为迭代器
    TaggedIterator(TaggedIteratorArgument),
    /// 解析时才决定取值的条件参数
    Condition(ConditionArgument),
    /// 只包含引用的集合
    ReferenceSet(ReferenceSetArgument),
    /// 被内联的私有服务定义
    Inline(Box<Definition>),
    /// 可忽略引用被移除后留下的空值
    Absent,
}

impl Argument {
    /// 创建字面量参数
    pub fn value(value: impl Into<Value>) -> Self {
        Self::Value(value.into())
    }

    /// 创建引用参数
    pub fn reference(id: impl Into<String>) -> Self {
        Self::Reference(Reference::new(id))
    }

    /// 先序遍历参数树，回调可以原地替换当前节点
    pub fn walk_mut(&mut self, visit: &mut dyn FnMut(&mut Argument)) {
        visit(self);
        match self {
            Self::Array(array) => {
                for (_, entry) in array.entries_mut() {
                    entry.walk_mut(visit);
                }
            }
            Self::Inline(definition) => definition.walk_arguments_mut(visit),
            _ => {}
        }
    }

    /// 收集参数树中的全部引用
    ///
    /// `eager` 为 `false` 的引用只会在使用时解析（例如迭代器成员），
    /// 不构成构造依赖。
    pub fn collect_references<'a>(&'a self, eager: bool, edges: &mut Vec<ReferenceEdge<'a>>) {
        match self {
            Self::Reference(reference) => edges.push(ReferenceEdge { reference, eager }),
            Self::Array(array) => {
                for (_, entry) in array.entries() {
                    entry.collect_references(eager, edges);
                }
            }
            Self::Iterator(iterator) => {
                for reference in iterator.references() {
                    edges.push(ReferenceEdge {
                        reference,
                        eager: false,
                    });
                }
            }
            Self::Condition(condition) => {
                for reference in condition.references() {
                    edges.push(ReferenceEdge { reference, eager });
                }
            }
            Self::ReferenceSet(set) => {
                for reference in set.references() {
                    edges.push(ReferenceEdge { reference, eager });
                }
            }
            Self::Inline(definition) => definition.collect_references_into(eager, edges),
            Self::Value(_) | Self::TaggedIterator(_) | Self::Absent => {}
        }
    }

    /// 遍历参数树中全部引用（可修改）
    pub fn for_each_reference_mut(&mut self, visit: &mut dyn FnMut(&mut Reference)) {
        self.walk_mut(&mut |argument| match argument {
            Argument::Reference(reference) => visit(reference),
            Argument::Iterator(iterator) => iterator.references_mut().iter_mut().for_each(&mut *visit),
            Argument::Condition(condition) => {
                condition.references_mut().iter_mut().for_each(&mut *visit)
            }
            Argument::ReferenceSet(set) => set.references_mut().iter_mut().for_each(&mut *visit),
            _ => {}
        });
    }
}

impl From<Reference> for Argument {
    fn from(reference: Reference) -> Self {
        Self::Reference(reference)
    }
}

impl From<Value> for Argument {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<&str> for Argument {
    fn from(value: &str) -> Self {
        Self::Value(Value::String(value.to_string()))
    }
}

impl From<String> for Argument {
    fn from(value: String) -> Self {
        Self::Value(Value::String(value))
    }
}

impl From<bool> for Argument {
    fn from(value: bool) -> Self {
        Self::Value(Value::Bool(value))
    }
}

impl From<i64> for Argument {
    fn from(value: i64) -> Self {
        Self::Value(Value::from(value))
    }
}

impl From<ArrayArgument> for Argument {
    fn from(array: ArrayArgument) -> Self {
        Self::Array(array)
    }
}

impl From<IteratorArgument> for Argument {
    fn from(iterator: IteratorArgument) -> Self {
        Self::Iterator(iterator)
    }
}

impl From<TaggedIteratorArgument> for Argument {
    fn from(tagged: TaggedIteratorArgument) -> Self {
        Self::TaggedIterator(tagged)
    }
}

impl From<ConditionArgument> for Argument {
    fn from(condition: ConditionArgument) -> Self {
        Self::Condition(condition)
    }
}

impl From<ReferenceSetArgument> for Argument {
    fn from(set: ReferenceSetArgument) -> Self {
        Self::ReferenceSet(set)
    }
}

/// 依赖图中的一条引用边
#[derive(Debug, Clone, Copy)]
pub struct ReferenceEdge<'a> {
    /// 引用
    pub reference: &'a Reference,
    /// 是否在构造时立即解析
    pub eager: bool,
}

/// 数组参数
#[derive(Debug, Clone, Default)]
pub struct ArrayArgument {
    entries: Vec<(Option<String>, Argument)>,
}

impl ArrayArgument {
    /// 创建空数组
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加无键元素
    pub fn push(mut self, value: impl Into<Argument>) -> Self {
        self.entries.push((None, value.into()));
        self
    }

    /// 追加带键元素，键已存在时原位替换
    pub fn insert(mut self, key: impl Into<String>, value: impl Into<Argument>) -> Self {
        let key = key.into();
        let value = value.into();
        match self
            .entries
            .iter_mut()
            .find(|(existing, _)| existing.as_deref() == Some(key.as_str()))
        {
            Some(entry) => entry.1 = value,
            None => self.entries.push((Some(key), value)),
        }
        self
    }

    /// 全部元素
    pub fn entries(&self) -> &[(Option<String>, Argument)] {
        &self.entries
    }

    /// 全部元素（可修改）
    pub fn entries_mut(&mut self) -> &mut Vec<(Option<String>, Argument)> {
        &mut self.entries
    }

    /// 元素个数
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<Vec<Argument>> for ArrayArgument {
    fn from(values: Vec<Argument>) -> Self {
        Self {
            entries: values.into_iter().map(|value| (None, value)).collect(),
        }
    }
}

/// 惰性迭代器参数
///
/// 注入时不会实例化任何成员，迭代时才逐个解析。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IteratorArgument {
    references: Vec<Reference>,
}

impl IteratorArgument {
    /// 创建迭代器参数
    pub fn new(references: Vec<Reference>) -> Self {
        Self { references }
    }

    /// 成员引用
    pub fn references(&self) -> &[Reference] {
        &self.references
    }

    /// 成员引用（可修改）
    pub fn references_mut(&mut self) -> &mut Vec<Reference> {
        &mut self.references
    }
}

/// 带标签服务集合
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedIteratorArgument {
    tag: String,
    priority_attribute: Option<String>,
}

impl TaggedIteratorArgument {
    /// 按注册顺序收集指定标签的服务
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            priority_attribute: None,
        }
    }

    /// 按标签属性降序排列（稳定排序，缺省视为 0）
    pub fn ordered_by(mut self, attribute: impl Into<String>) -> Self {
        self.priority_attribute = Some(attribute.into());
        self
    }

    /// 标签名称
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// 排序属性
    pub fn priority_attribute(&self) -> Option<&str> {
        self.priority_attribute.as_deref()
    }
}

/// 条件选择回调
pub type ConditionSelector =
    Arc<dyn Fn(&[ResolvedValue]) -> anyhow::Result<ResolvedValue> + Send + Sync>;

/// 条件参数
///
/// 候选引用在解析时按各自的策略解析，再由回调决定最终取值。
#[derive(Clone)]
pub struct ConditionArgument {
    references: Vec<Reference>,
    selector: ConditionSelector,
}

impl ConditionArgument {
    /// 创建条件参数
    pub fn new<F>(references: Vec<Reference>, selector: F) -> Self
    where
        F: Fn(&[ResolvedValue]) -> anyhow::Result<ResolvedValue> + Send + Sync + 'static,
    {
        Self {
            references,
            selector: Arc::new(selector),
        }
    }

    /// 选择第一个存在的候选服务，全部缺失时为空
    pub fn first_available(references: Vec<Reference>) -> Self {
        Self::new(references, |candidates| {
            Ok(candidates
                .iter()
                .find(|candidate| !candidate.is_absent())
                .cloned()
                .unwrap_or(ResolvedValue::Absent))
        })
    }

    /// 候选引用
    pub fn references(&self) -> &[Reference] {
        &self.references
    }

    /// 候选引用（可修改）
    pub fn references_mut(&mut self) -> &mut Vec<Reference> {
        &mut self.references
    }

    /// 执行选择
    pub fn select(&self, candidates: &[ResolvedValue]) -> anyhow::Result<ResolvedValue> {
        (self.selector)(candidates)
    }
}

impl fmt::Debug for ConditionArgument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConditionArgument")
            .field("references", &self.references)
            .field("selector", &"<function>")
            .finish()
    }
}

/// 引用集合参数
///
/// 只能包含引用，在修改时即拒绝其他元素。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceSetArgument {
    references: Vec<Reference>,
}

impl ReferenceSetArgument {
    /// 从任意参数创建，包含非引用元素时失败
    pub fn new(values: Vec<Argument>) -> ContainerResult<Self> {
        let mut set = Self::default();
        for value in values {
            set.push(value)?;
        }
        Ok(set)
    }

    /// 从引用创建
    pub fn from_references(references: Vec<Reference>) -> Self {
        Self { references }
    }

    /// 追加元素，非引用元素返回 `InvalidArgument`
    pub fn push(&mut self, value: Argument) -> ContainerResult<()> {
        match value {
            Argument::Reference(reference) => {
                self.references.push(reference);
                Ok(())
            }
            other => Err(ContainerError::invalid_argument(format!(
                "引用集合只能包含引用, 实际为 {:?}",
                other
            ))),
        }
    }

    /// 成员引用
    pub fn references(&self) -> &[Reference] {
        &self.references
    }

    /// 成员引用（可修改）
    pub fn references_mut(&mut self) -> &mut Vec<Reference> {
        &mut self.references
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reference_set_rejects_literals() {
        let result = ReferenceSetArgument::new(vec![
            Argument::reference("a"),
            Argument::value(json!("b")),
        ]);
        assert!(matches!(result, Err(ContainerError::InvalidArgument { .. })));

        let mut set = ReferenceSetArgument::from_references(vec![Reference::new("a")]);
        assert!(set.push(Argument::Absent).is_err());
        assert!(set.push(Argument::reference("b")).is_ok());
        assert_eq!(set.references().len(), 2);
    }

    #[test]
    fn test_collect_references_marks_iterator_members_lazy() {
        let argument = Argument::Array(
            ArrayArgument::new()
                .push(Reference::new("logger"))
                .insert(
                    "handlers",
                    IteratorArgument::new(vec![Reference::new("h1"), Reference::new("h2")]),
                ),
        );
        let mut edges = Vec::new();
        argument.collect_references(true, &mut edges);
        let summary: Vec<(&str, bool)> = edges
            .iter()
            .map(|edge| (edge.reference.id(), edge.eager))
            .collect();
        assert_eq!(summary, vec![("logger", true), ("h1", false), ("h2", false)]);
    }

    #[test]
    fn test_array_insert_replaces_existing_key() {
        let array = ArrayArgument::new()
            .insert("host", "localhost")
            .insert("host", "example.org");
        assert_eq!(array.len(), 1);
        assert!(matches!(&array.entries()[0].1, Argument::Value(v) if v == "example.org"));
    }

    #[test]
    fn test_first_available_condition() {
        let condition = ConditionArgument::first_available(vec![
            Reference::ignore_on_invalid("a"),
            Reference::ignore_on_invalid("b"),
        ]);
        let chosen = condition
            .select(&[ResolvedValue::Absent, ResolvedValue::Value(json!(2))])
            .unwrap();
        assert_eq!(chosen.as_value(), Some(&json!(2)));
    }
}
