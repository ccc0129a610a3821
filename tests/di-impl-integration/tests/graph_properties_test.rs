//! 定义图性质：循环检测、标签顺序、悬空引用、步骤幂等

use di_abstractions::{
    ContainerBuilder, Definition, InvalidBehavior, Reference, ServiceProvider,
    TaggedIteratorArgument,
};
use di_impl::{CompiledValue, ContainerCompiler, PipelineEngine};
use infrastructure_common::{ContainerConfig, ContainerError, ContainerResult};
use proptest::prelude::*;
use serde_json::{json, Value};

fn node(dependencies: Vec<Reference>) -> Definition {
    Definition::value(json!(null))
        .public(true)
        .with_arguments(dependencies.into_iter().map(Into::into).collect())
}

#[test]
fn test_eager_cycle_lists_build_stack() {
    let mut builder = ContainerBuilder::new();
    builder.set_definition("A", node(vec![Reference::new("B")])).unwrap();
    builder.set_definition("B", node(vec![Reference::new("A")])).unwrap();

    match ContainerCompiler::default().compile(&mut builder) {
        Err(ContainerError::CircularReference { build_stack }) => {
            assert_eq!(build_stack, vec!["A", "B"]);
        }
        other => panic!("expected a circular reference, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_lazy_target_compiles() {
    let mut builder = ContainerBuilder::new();
    builder.set_definition("A", node(vec![Reference::new("B")])).unwrap();
    builder
        .set_definition("B", node(vec![Reference::new("A")]).lazy(true))
        .unwrap();
    assert!(ContainerCompiler::default().compile(&mut builder).is_ok());
}

#[test]
fn test_cycle_through_alias_is_detected() {
    let mut builder = ContainerBuilder::new();
    builder.set_definition("A", node(vec![Reference::new("b.alias")])).unwrap();
    builder.set_definition("B", node(vec![Reference::new("A")])).unwrap();
    builder.set_alias("b.alias", "B").unwrap();

    assert!(matches!(
        ContainerCompiler::default().compile(&mut builder),
        Err(ContainerError::CircularReference { .. })
    ));
}

struct Tagging {
    name: &'static str,
    ids: &'static [&'static str],
}

impl ServiceProvider for Tagging {
    fn name(&self) -> &str {
        self.name
    }

    fn build(&self, builder: &mut ContainerBuilder) -> ContainerResult<()> {
        for id in self.ids {
            builder.set_definition(*id, Definition::value(json!(id)).with_tag("x"))?;
        }
        Ok(())
    }
}

fn tagged_ids(providers: &[&Tagging]) -> Vec<String> {
    let mut builder = ContainerBuilder::new();
    for provider in providers {
        builder.register(*provider).unwrap();
    }
    builder
        .find_tagged("x")
        .into_iter()
        .map(|tagged| tagged.id.to_string())
        .collect()
}

#[test]
fn test_tag_order_follows_registration() {
    let first = Tagging {
        name: "first",
        ids: &["a", "c"],
    };
    let second = Tagging {
        name: "second",
        ids: &["b"],
    };

    assert_eq!(tagged_ids(&[&first, &second]), vec!["a", "c", "b"]);
    assert_eq!(tagged_ids(&[&second, &first]), vec!["b", "a", "c"]);
}

fn snapshot(builder: &ContainerBuilder) -> String {
    format!("{:?} {:?} {:?}", builder.definitions(), builder.aliases(), builder.parameters())
}

#[test]
fn test_builtin_passes_are_idempotent() {
    let mut builder = ContainerBuilder::new();
    builder.set_parameter("name", "app").unwrap();
    builder.set_parameter("literal", "100%% %name%").unwrap();
    builder
        .set_definition("handler.one", Definition::value(json!(1)).with_tag("handler"))
        .unwrap();
    builder
        .set_definition("handler.two", Definition::value(json!(2)).with_tag("handler"))
        .unwrap();
    builder
        .set_definition("helper", Definition::value(json!("%name%")).shared(false))
        .unwrap();
    builder
        .set_definition(
            "registry",
            Definition::value(json!(null))
                .public(true)
                .with_argument(TaggedIteratorArgument::new("handler"))
                .with_argument(Reference::new("helper"))
                .with_argument(Reference::ignore_on_invalid("nowhere"))
                .with_argument("%literal%"),
        )
        .unwrap();
    builder.set_alias("services", "registry").unwrap();
    builder
        .set_definition("unused", Definition::value(json!(0)))
        .unwrap();

    let mut engine = PipelineEngine::with_defaults(&ContainerConfig::default());
    engine.run(&mut builder).unwrap();
    let once = snapshot(&builder);
    engine.run(&mut builder).unwrap();
    let twice = snapshot(&builder);

    assert_eq!(once, twice);
    assert!(!builder.has_definition("unused"));
    assert!(!builder.has_definition("helper"));
    assert_eq!(builder.get_parameter("literal").unwrap(), &json!("100%% app"));
}

#[derive(Debug, Clone)]
struct Edge {
    target: usize,
    behavior: InvalidBehavior,
}

fn edge() -> impl Strategy<Value = Edge> {
    (
        0usize..10,
        prop_oneof![
            Just(InvalidBehavior::Fail),
            Just(InvalidBehavior::IgnoreOnInvalidReference),
            Just(InvalidBehavior::IgnoreOnUninitializedReference),
        ],
    )
        .prop_map(|(target, behavior)| Edge { target, behavior })
}

proptest! {
    /// 只引用更早的节点，其余一律悬空：悬空且不可忽略的引用必须在导出前被拒绝
    #[test]
    fn dangling_references_are_rejected_unless_ignorable(
        graph in prop::collection::vec(prop::collection::vec(edge(), 0..4), 1..8)
    ) {
        let mut builder = ContainerBuilder::new();
        let mut expect_failure = false;
        for (index, edges) in graph.iter().enumerate() {
            let references = edges
                .iter()
                .map(|edge| {
                    let id = if edge.target < index {
                        format!("svc{}", edge.target)
                    } else {
                        format!("missing{}", edge.target)
                    };
                    if edge.target >= index && edge.behavior == InvalidBehavior::Fail {
                        expect_failure = true;
                    }
                    Reference::new(id).with_behavior(edge.behavior)
                })
                .collect();
            builder.set_definition(format!("svc{}", index), node(references)).unwrap();
        }

        let result = ContainerCompiler::default().compile(&mut builder);
        if expect_failure {
            let rejected = matches!(result, Err(ContainerError::Dump { .. }));
            prop_assert!(rejected);
        } else {
            prop_assert!(result.is_ok());
        }
    }

    /// 参数值里的 `%` 经过多次编译步骤后仍然原样出现在导出的字面量中
    #[test]
    fn percent_in_parameter_values_survives_the_pipeline(
        pieces in prop::collection::vec(prop_oneof![Just("% "), Just("a"), Just("50"), Just(" ")], 0..6),
        trailing in any::<bool>(),
    ) {
        let mut value: String = pieces.concat();
        if trailing {
            value.push('%');
        }

        let mut builder = ContainerBuilder::new();
        builder.set_parameter("p", value.clone()).unwrap();
        builder
            .set_definition(
                "label",
                Definition::value(json!(null))
                    .public(true)
                    .with_argument("%p%%p%")
                    .with_argument("[%p%]"),
            )
            .unwrap();

        let mut engine = PipelineEngine::with_defaults(&ContainerConfig::default());
        engine.run(&mut builder).unwrap();
        let once = snapshot(&builder);
        engine.run(&mut builder).unwrap();
        prop_assert_eq!(once, snapshot(&builder));

        let compiled = ContainerCompiler::default().compile(&mut builder).unwrap();
        let recipe = compiled.entry("label").and_then(|entry| entry.recipe.as_ref()).unwrap();
        let literals: Vec<Value> = recipe
            .arguments
            .iter()
            .map(|argument| match argument {
                CompiledValue::Literal(literal) => literal.clone(),
                other => panic!("unexpected argument: {:?}", other),
            })
            .collect();
        prop_assert_eq!(
            literals,
            vec![json!(format!("{0}{0}", value)), json!(format!("[{}]", value))]
        );
        prop_assert_eq!(&compiled.parameters()["p"], &json!(value));
    }
}
