//! 元数据定义
//!
//! 提供服务类型和定义的诊断元数据

use serde::Serialize;
use std::any::TypeId;

/// 类型信息
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeInfo {
    /// 类型名称
    pub name: String,
    /// 类型ID
    pub id: TypeId,
    /// 完整路径
    pub module_path: String,
}

impl TypeInfo {
    /// 从类型获取类型信息
    pub fn of<T: ?Sized + 'static>() -> Self {
        let full = std::any::type_name::<T>();
        Self {
            name: short_type_name(full).to_string(),
            id: TypeId::of::<T>(),
            module_path: full.to_string(),
        }
    }

    /// 获取简短的类型名称（不包含模块路径）
    pub fn short_name(&self) -> &str {
        &self.name
    }

    /// 是否描述同一个具体类型
    pub fn is<T: ?Sized + 'static>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }
}

/// 去掉模块路径，保留泛型参数
fn short_type_name(full: &str) -> &str {
    let head = full.split('<').next().unwrap_or(full);
    match head.rfind("::") {
        Some(idx) => &full[idx + 2..],
        None => full,
    }
}

/// 服务定义的诊断元数据
///
/// 调试模式下随编译产物一起保留，非调试模式下省略。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DefinitionMetadata {
    /// 服务标识
    pub id: String,
    /// 服务类型名称
    pub class: Option<String>,
    /// 注册该定义的服务提供者
    pub source: Option<String>,
    /// 标签名称
    pub tags: Vec<String>,
}

impl DefinitionMetadata {
    /// 创建新的定义元数据
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            class: None,
            source: None,
            tags: Vec::new(),
        }
    }

    /// 设置类型名称
    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.class = Some(class.into());
        self
    }

    /// 设置来源
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// 添加标签
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }
}
