//! 服务引用
//!
//! 引用以标识符指向另一个服务，而不是直接持有值。

use serde::Serialize;
use std::fmt;

/// 引用无效时的处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum InvalidBehavior {
    /// 目标不存在时报错
    #[default]
    Fail,
    /// 目标不存在时解析为空
    IgnoreOnInvalidReference,
    /// 目标存在但尚未实例化时解析为空，且不会触发实例化
    IgnoreOnUninitializedReference,
}

impl InvalidBehavior {
    /// 是否可以在目标缺失时忽略
    pub fn is_ignorable(self) -> bool {
        !matches!(self, Self::Fail)
    }
}

/// 服务引用
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    id: String,
    behavior: InvalidBehavior,
}

impl Reference {
    /// 创建新的引用，目标缺失时报错
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            behavior: InvalidBehavior::Fail,
        }
    }

    /// 目标缺失时解析为空的引用
    pub fn ignore_on_invalid(id: impl Into<String>) -> Self {
        Self::new(id).with_behavior(InvalidBehavior::IgnoreOnInvalidReference)
    }

    /// 目标未实例化时解析为空的引用
    pub fn ignore_on_uninitialized(id: impl Into<String>) -> Self {
        Self::new(id).with_behavior(InvalidBehavior::IgnoreOnUninitializedReference)
    }

    /// 设置处理策略
    pub fn with_behavior(mut self, behavior: InvalidBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    /// 目标标识
    pub fn id(&self) -> &str {
        &self.id
    }

    /// 处理策略
    pub fn behavior(&self) -> InvalidBehavior {
        self.behavior
    }

    /// 重定向到新的目标（别名展开时使用）
    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = id.into();
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.behavior {
            InvalidBehavior::Fail => write!(f, "@{}", self.id),
            InvalidBehavior::IgnoreOnInvalidReference => write!(f, "@?{}", self.id),
            InvalidBehavior::IgnoreOnUninitializedReference => write!(f, "@!{}", self.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_behavior_fails() {
        let reference = Reference::new("logger");
        assert_eq!(reference.behavior(), InvalidBehavior::Fail);
        assert!(!reference.behavior().is_ignorable());
        assert_eq!(reference.to_string(), "@logger");
    }

    #[test]
    fn test_ignorable_references() {
        assert!(Reference::ignore_on_invalid("events").behavior().is_ignorable());
        assert_eq!(Reference::ignore_on_uninitialized("events").to_string(), "@!events");
    }
}
