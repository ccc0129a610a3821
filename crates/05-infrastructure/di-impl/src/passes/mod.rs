//! 内置编译步骤
//!
//! 每个步骤都是幂等的：对自己的输出再执行一次不会改变构建器。

mod check;
mod options;
mod parameters;
mod references;
mod removing;
mod tagged_iterator;

pub use check::CheckDefinitionsPass;
pub use options::{ResolveOptionDefinitionPass, CONFIG_PARAMETER};
pub use parameters::ResolveParameterPlaceholdersPass;
pub use references::{ResolveAliasesPass, ResolveInvalidReferencesPass};
pub use removing::{InlineServiceDefinitionsPass, RemoveAbstractDefinitionsPass, RemoveUnusedDefinitionsPass};
pub use tagged_iterator::ResolveTaggedIteratorArgumentPass;

pub(crate) use parameters::unescape_value;
