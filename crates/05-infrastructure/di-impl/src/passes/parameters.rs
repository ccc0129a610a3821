//! 参数占位符解析
//!
//! 整个字符串恰好是 `%name%` 时替换为参数的原始类型；嵌在字符串中的占位符
//! 按字符串拼接。解析结果中的每个字面 `%` 都写成转义形式 `%%`（包括不构成占位符的
//! 单个 `%` 和参数值里带出来的 `%`），导出时才统一还原为 `%`，
//! 这样重复执行不会把还原出来的 `%` 误认为新的占位符。

use di_abstractions::{Argument, CompilerPass, ContainerBuilder, Construction};
use indexmap::IndexMap;
use infrastructure_common::{ContainerError, ContainerResult};
use serde_json::Value;
use tracing::debug;

/// 参数占位符解析步骤
#[derive(Debug, Default)]
pub struct ResolveParameterPlaceholdersPass;

impl ResolveParameterPlaceholdersPass {
    pub fn new() -> Self {
        Self
    }
}

impl CompilerPass for ResolveParameterPlaceholdersPass {
    fn priority(&self) -> i32 {
        100
    }

    fn process(&mut self, builder: &mut ContainerBuilder) -> ContainerResult<()> {
        let mut resolver = ParameterResolver::new(builder.parameters().clone());
        let names: Vec<String> = builder.parameters().keys().cloned().collect();
        for name in &names {
            resolver.resolve_parameter(name, &mut Vec::new())?;
        }
        let resolved = resolver.into_resolved();

        let mut failure = None;
        for (id, definition) in builder.definitions_mut()?.iter_mut() {
            if let Some(Construction::Value(value)) = definition.construction() {
                let value = resolve_value(value, &resolved)?;
                definition.set_construction(Construction::Value(value));
            }
            definition.walk_arguments_mut(&mut |argument| {
                if failure.is_some() {
                    return;
                }
                if let Argument::Value(value) = argument {
                    match resolve_value(value, &resolved) {
                        Ok(replacement) => *value = replacement,
                        Err(error) => {
                            debug!("服务 {} 的参数占位符解析失败: {}", id, error);
                            failure = Some(error);
                        }
                    }
                }
            });
            if let Some(error) = failure.take() {
                return Err(error);
            }
        }

        *builder.parameters_mut()? = resolved;
        debug!("参数占位符解析完成, 共 {} 个参数", names.len());
        Ok(())
    }
}

/// 带循环检测的参数解析器
struct ParameterResolver {
    raw: IndexMap<String, Value>,
    resolved: IndexMap<String, Value>,
}

impl ParameterResolver {
    fn new(raw: IndexMap<String, Value>) -> Self {
        Self {
            raw,
            resolved: IndexMap::new(),
        }
    }

    fn resolve_parameter(&mut self, name: &str, chain: &mut Vec<String>) -> ContainerResult<Value> {
        if let Some(value) = self.resolved.get(name) {
            return Ok(value.clone());
        }
        if chain.iter().any(|seen| seen == name) {
            chain.push(name.to_string());
            return Err(ContainerError::ParameterCircularReference {
                chain: chain.clone(),
            });
        }
        let raw = self
            .raw
            .get(name)
            .cloned()
            .ok_or_else(|| ContainerError::ParameterNotFound {
                name: name.to_string(),
            })?;

        chain.push(name.to_string());
        let value = self.resolve_nested(&raw, chain)?;
        chain.pop();
        self.resolved.insert(name.to_string(), value.clone());
        Ok(value)
    }

    fn resolve_nested(&mut self, value: &Value, chain: &mut Vec<String>) -> ContainerResult<Value> {
        match value {
            Value::String(text) => self.resolve_string(text, chain),
            Value::Array(items) => items
                .iter()
                .map(|item| self.resolve_nested(item, chain))
                .collect::<ContainerResult<Vec<_>>>()
                .map(Value::Array),
            Value::Object(map) => {
                let mut resolved = serde_json::Map::with_capacity(map.len());
                for (key, item) in map {
                    resolved.insert(key.clone(), self.resolve_nested(item, chain)?);
                }
                Ok(Value::Object(resolved))
            }
            other => Ok(other.clone()),
        }
    }

    fn resolve_string(&mut self, text: &str, chain: &mut Vec<String>) -> ContainerResult<Value> {
        if let Some(name) = whole_placeholder(text) {
            return self.resolve_parameter(name, chain);
        }
        let mut lookup = |name: &str| self.resolve_parameter(name, chain);
        interpolate(text, &mut lookup).map(Value::String)
    }

    fn into_resolved(self) -> IndexMap<String, Value> {
        self.resolved
    }
}

/// 用已解析的参数表替换字面量中的占位符
pub(crate) fn resolve_value(value: &Value, parameters: &IndexMap<String, Value>) -> ContainerResult<Value> {
    let lookup = |name: &str| {
        parameters
            .get(name)
            .cloned()
            .ok_or_else(|| ContainerError::ParameterNotFound {
                name: name.to_string(),
            })
    };
    match value {
        Value::String(text) => match whole_placeholder(text) {
            Some(name) => lookup(name),
            None => interpolate(text, &mut |name| lookup(name)).map(Value::String),
        },
        Value::Array(items) => items
            .iter()
            .map(|item| resolve_value(item, parameters))
            .collect::<ContainerResult<Vec<_>>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut resolved = serde_json::Map::with_capacity(map.len());
            for (key, item) in map {
                resolved.insert(key.clone(), resolve_value(item, parameters)?);
            }
            Ok(Value::Object(resolved))
        }
        other => Ok(other.clone()),
    }
}

/// 把字面量中的 `%` 写成转义形式，用于没有经过占位符解析的值
pub(crate) fn escape_value(value: &Value) -> Value {
    match value {
        Value::String(text) => Value::String(text.replace('%', "%%")),
        Value::Array(items) => Value::Array(items.iter().map(escape_value).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, item)| (key.clone(), escape_value(item)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// 将转义的 `%%` 还原为 `%`，只在导出时调用
pub(crate) fn unescape_value(value: &Value) -> Value {
    match value {
        Value::String(text) => Value::String(text.replace("%%", "%")),
        Value::Array(items) => Value::Array(items.iter().map(unescape_value).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, item)| (key.clone(), unescape_value(item)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn is_placeholder_name(name: &str) -> bool {
    !name.is_empty() && !name.contains('%') && !name.chars().any(char::is_whitespace)
}

fn whole_placeholder(text: &str) -> Option<&str> {
    let name = text.strip_prefix('%')?.strip_suffix('%')?;
    is_placeholder_name(name).then_some(name)
}

fn interpolate(
    text: &str,
    lookup: &mut dyn FnMut(&str) -> ContainerResult<Value>,
) -> ContainerResult<String> {
    if !text.contains('%') {
        return Ok(text.to_string());
    }

    let mut output = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('%') {
        output.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        if let Some(stripped) = after.strip_prefix('%') {
            output.push_str("%%");
            rest = stripped;
            continue;
        }
        match after.find('%') {
            Some(end) if is_placeholder_name(&after[..end]) => {
                let name = &after[..end];
                // 已解析的参数值本身就是转义形式
                match lookup(name)? {
                    Value::String(value) => output.push_str(&value),
                    Value::Number(number) => output.push_str(&number.to_string()),
                    Value::Bool(flag) => output.push_str(if flag { "true" } else { "false" }),
                    Value::Null => {}
                    _ => {
                        return Err(ContainerError::invalid_argument(format!(
                            "参数 {} 不是标量, 不能嵌入字符串 \"{}\"",
                            name, text
                        )))
                    }
                }
                rest = &after[end + 1..];
            }
            _ => {
                output.push_str("%%");
                rest = after;
            }
        }
    }
    output.push_str(rest);
    Ok(output)
}
