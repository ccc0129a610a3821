//! 定义结构校验

use di_abstractions::{CompilerPass, ContainerBuilder};
use infrastructure_common::{ContainerError, ContainerResult};

/// 校验每个定义的结构约束
///
/// 合成服务的约束由 [`Definition::validate`](di_abstractions::Definition::validate)
/// 检查；非合成、非抽象的定义必须能够被构造。
#[derive(Debug, Default)]
pub struct CheckDefinitionsPass;

impl CheckDefinitionsPass {
    pub fn new() -> Self {
        Self
    }
}

impl CompilerPass for CheckDefinitionsPass {
    fn process(&mut self, builder: &mut ContainerBuilder) -> ContainerResult<()> {
        for (id, definition) in builder.definitions() {
            definition.validate(id)?;
            if !definition.is_synthetic() && !definition.is_abstract() && definition.construction().is_none() {
                return Err(ContainerError::invalid_definition(
                    id.clone(),
                    "定义既不是合成服务, 也没有声明构造方式",
                ));
            }
        }
        Ok(())
    }
}
