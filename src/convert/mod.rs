//! Format conversion as a shortest-path problem.
//!
//! A [`ConversionGraph`] has one node per `(type, format)` pair, holding the
//! validator that recognises data in that format, and one directed edge per
//! registered converter. Converting data means finding the path with the
//! fewest converters between two formats of the same type and running the
//! converters one after the other.

mod path;

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

use petgraph::Graph;
use petgraph::graph::{EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::Serialize;

pub use crate::convert::path::{ConversionPath, ConversionStep};

use crate::engine::{FormatRegistry, ScriptDefinition};
use crate::error::{ConversionError, PipelineError, TaskError};
use crate::factory::TaskFactory;
use crate::pipeline::Pipeline;
use crate::script::Vocabulary;
use crate::spec::Specification;
use crate::value::{Shared, Value};

/// Identifies a node: a semantic type and one of its concrete formats.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FormatKey {
    #[serde(rename = "type")]
    pub kind: String,
    pub format: String,
}

impl FormatKey {
    pub fn new(kind: impl Into<String>, format: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            format: format.into(),
        }
    }
}

impl fmt::Display for FormatKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.kind, self.format)
    }
}

struct ValidatorNode {
    key: FormatKey,
    spec: Specification,
    definition: ScriptDefinition,
}

struct Converter {
    name: String,
    definition: ScriptDefinition,
}

/// A registered validator, as listed by [`ConversionGraph::validators`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidatorInfo {
    #[serde(rename = "type")]
    pub kind: String,
    pub format: String,
    pub validator: Specification,
}

/// A registered converter, as listed by [`ConversionGraph::converters`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConverterInfo {
    #[serde(rename = "type")]
    pub kind: String,
    pub from: String,
    pub to: String,
    pub name: String,
}

/// The registry of format validators and converters.
///
/// The graph is built up front and read afterwards; it is `Send + Sync`, so
/// hosts registering formats from several threads wrap it in a lock.
pub struct ConversionGraph {
    graph: Graph<ValidatorNode, Converter>,
    index: HashMap<FormatKey, NodeIndex>,
    factory: TaskFactory,
}

impl ConversionGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self {
            graph: Graph::new(),
            index: HashMap::new(),
            factory: TaskFactory::new(),
        }
    }

    /// Sets the type wrappers validator and converter scripts may call.
    pub fn with_vocabulary(mut self, vocabulary: Vocabulary) -> Self {
        self.factory = self.factory.with_vocabulary(vocabulary);
        self
    }

    pub(crate) fn factory(&self) -> &TaskFactory {
        &self.factory
    }

    fn node(&self, kind: &str, format: &str) -> Result<NodeIndex, ConversionError> {
        self.index
            .get(&FormatKey::new(kind, format))
            .copied()
            .ok_or_else(|| ConversionError::UnknownFormat {
                kind: kind.to_string(),
                format: format.to_string(),
            })
    }

    pub fn contains(&self, kind: &str, format: &str) -> bool {
        self.index.contains_key(&FormatKey::new(kind, format))
    }

    /// Registers the validator of `kind.format`, replacing any earlier one.
    /// The validator takes exactly one input and produces exactly one output,
    /// a boolean.
    pub fn add_validator_node(
        &mut self,
        kind: &str,
        format: &str,
        validator: &Specification,
    ) -> Result<(), ConversionError> {
        if validator.inputs.len() != 1 || validator.outputs.len() != 1 {
            return Err(ConversionError::InvalidValidator {
                kind: kind.to_string(),
                format: format.to_string(),
                reason: format!(
                    "expected one input and one output, found {} and {}",
                    validator.inputs.len(),
                    validator.outputs.len()
                ),
            });
        }

        let key = FormatKey::new(kind, format);
        let node = ValidatorNode {
            key: key.clone(),
            spec: validator.clone(),
            definition: self.factory.build(validator)?,
        };

        match self.index.get(&key) {
            Some(&index) => {
                tracing::debug!(format = %key, "replaced validator");
                self.graph[index] = node;
            }
            None => {
                tracing::debug!(format = %key, "registered validator");
                let index = self.graph.add_node(node);
                self.index.insert(key, index);
            }
        }

        Ok(())
    }

    /// Registers a converter from `kind.from` to `kind.to`. Both formats must
    /// already have a validator. Registering the very same converter twice
    /// is a no-op; different converters between the same formats coexist.
    pub fn add_converter_edge(
        &mut self,
        kind: &str,
        from: &str,
        to: &str,
        converter: &Specification,
    ) -> Result<(), ConversionError> {
        let source = self.node(kind, from)?;
        let target = self.node(kind, to)?;

        let name = if converter.name.is_empty() {
            format!("{kind}.{from} -> {kind}.{to}")
        } else {
            converter.name.clone()
        };

        if converter.inputs.len() != 1 || converter.outputs.len() != 1 {
            return Err(ConversionError::InvalidConverter {
                name,
                reason: format!(
                    "expected one input and one output, found {} and {}",
                    converter.inputs.len(),
                    converter.outputs.len()
                ),
            });
        }

        let digest = converter.digest();
        let known = self
            .graph
            .edges_connecting(source, target)
            .any(|edge| edge.weight().definition.digest() == digest);
        if known {
            tracing::debug!(converter = %name, "converter already registered");
            return Ok(());
        }

        let definition = self.factory.build(converter)?;
        self.graph
            .add_edge(source, target, Converter { name, definition });

        tracing::debug!(from = %self.graph[source].key, to = %self.graph[target].key, "registered converter");
        Ok(())
    }

    /// Finds the chain with the fewest converters from `kind.from` to
    /// `kind.to`. Among equally short chains, the one whose converters were
    /// registered first wins. Converting a format to itself needs no
    /// converter at all.
    pub fn resolve(&self, kind: &str, from: &str, to: &str) -> Result<ConversionPath, ConversionError> {
        let start = self.node(kind, from)?;
        let goal = self.node(kind, to)?;

        let mut previous: HashMap<NodeIndex, EdgeIndex> = HashMap::new();
        let mut visited = HashSet::from([start]);
        let mut queue = VecDeque::from([start]);

        'search: while let Some(node) = queue.pop_front() {
            // Graph iterates a node's edges newest first.
            let mut edges: Vec<_> = self.graph.edges(node).collect();
            edges.sort_by_key(|edge| edge.id());

            for edge in edges {
                let next = edge.target();
                if visited.insert(next) {
                    previous.insert(next, edge.id());
                    if next == goal {
                        break 'search;
                    }
                    queue.push_back(next);
                }
            }
        }

        if start != goal && !previous.contains_key(&goal) {
            return Err(ConversionError::NoConversionPath {
                kind: kind.to_string(),
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        let mut steps = Vec::new();
        let mut node = goal;
        while node != start {
            let Some(&edge) = previous.get(&node) else {
                break;
            };
            let converter = &self.graph[edge];
            steps.push(ConversionStep::new(&converter.name, converter.definition.clone()));
            let Some((source, _)) = self.graph.edge_endpoints(edge) else {
                break;
            };
            node = source;
        }
        steps.reverse();

        tracing::debug!(kind, from, to, steps = steps.len(), "resolved conversion path");
        Ok(ConversionPath::new(FormatKey::new(kind, from), FormatKey::new(kind, to), steps))
    }

    /// Runs the validator of `kind.format` on `value`.
    ///
    /// A validator failing at run time means the value does not conform. A
    /// validator producing anything but a boolean is an error.
    pub fn validate(&self, kind: &str, format: &str, value: &Shared) -> Result<bool, ConversionError> {
        let node = &self.graph[self.node(kind, format)?];
        let definition = &node.definition;

        let invalid = |reason: String| ConversionError::InvalidValidator {
            kind: kind.to_string(),
            format: format.to_string(),
            reason,
        };

        let (Some(input), Some(output)) = (definition.inputs().first(), definition.outputs().first())
        else {
            return Err(invalid("expected one input and one output".to_string()));
        };

        let mut pipeline = Pipeline::new();
        let task = pipeline.add(definition.instantiate());

        let result = pipeline
            .set_input(task, input.name(), value.clone())
            .and_then(|_| pipeline.output_data(task, output.name()));

        match result {
            Ok(result) => match *result {
                Value::Bool(valid) => Ok(valid),
                ref other => Err(invalid(format!(
                    "returned a value of type '{}' instead of a boolean",
                    other.type_name()
                ))),
            },
            Err(PipelineError::Task {
                error: TaskError::Script { error, .. },
                ..
            }) => {
                tracing::debug!(format = %node.key, %error, "validator failed, value does not conform");
                Ok(false)
            }
            Err(error) => Err(ConversionError::Step {
                step: definition.name().to_string(),
                error,
            }),
        }
    }

    /// Converts `value` from `kind.from` to `kind.to`, optionally checking
    /// first that it really is in `kind.from`.
    pub fn convert(
        &self,
        kind: &str,
        value: impl Into<Shared>,
        from: &str,
        to: &str,
        validate_input: bool,
    ) -> Result<Shared, ConversionError> {
        let value = value.into();
        let path = self.resolve(kind, from, to)?;

        if validate_input && !self.validate(kind, from, &value)? {
            return Err(ConversionError::Validation {
                kind: kind.to_string(),
                format: from.to_string(),
            });
        }

        path.execute(value)
    }

    /// Lists registered validators, optionally restricted to one type and
    /// one format, ordered by type and format.
    pub fn validators(&self, kind: Option<&str>, format: Option<&str>) -> Vec<ValidatorInfo> {
        let mut list: Vec<_> = self
            .graph
            .node_weights()
            .filter(|node| kind.is_none_or(|kind| node.key.kind == kind))
            .filter(|node| format.is_none_or(|format| node.key.format == format))
            .map(|node| ValidatorInfo {
                kind: node.key.kind.clone(),
                format: node.key.format.clone(),
                validator: node.spec.clone(),
            })
            .collect();

        list.sort_by(|a, b| (&a.kind, &a.format).cmp(&(&b.kind, &b.format)));
        list
    }

    /// Lists registered converters in registration order.
    pub fn converters(&self, kind: Option<&str>) -> Vec<ConverterInfo> {
        self.graph
            .edge_references()
            .filter_map(|edge| {
                let from = &self.graph[edge.source()].key;
                let to = &self.graph[edge.target()].key;
                kind.is_none_or(|kind| from.kind == kind).then(|| ConverterInfo {
                    kind: from.kind.clone(),
                    from: from.format.clone(),
                    to: to.format.clone(),
                    name: edge.weight().name.clone(),
                })
            })
            .collect()
    }
}

impl Default for ConversionGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl FormatRegistry for ConversionGraph {
    fn validate(&self, kind: &str, format: &str, value: &Shared) -> Result<bool, ConversionError> {
        ConversionGraph::validate(self, kind, format, value)
    }

    fn contains(&self, kind: &str, format: &str) -> bool {
        ConversionGraph::contains(self, kind, format)
    }

    fn convert(&self, kind: &str, value: Shared, from: &str, to: &str) -> Result<Shared, ConversionError> {
        ConversionGraph::convert(self, kind, value, from, to, false)
    }
}

impl fmt::Debug for ConversionGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionGraph")
            .field("validators", &self.graph.node_count())
            .field("converters", &self.graph.edge_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::extract::SpecExtractor;

    fn spec(name: &str, script: &str) -> Specification {
        SpecExtractor::new().extract_spec(name, script).unwrap()
    }

    /// A geo graph with formats A, B and C holding a tagged map, where each
    /// converter records its own name.
    fn geo() -> ConversionGraph {
        let mut graph = ConversionGraph::new();
        for format in ["A", "B", "C", "D"] {
            let validator = spec(
                &format!("is {format}"),
                &format!("ok = Output(has_key(Geo(data), 'format') and data['format'] == '{format}')"),
            );
            graph.add_validator_node("geo", format, &validator).unwrap();
        }
        graph
    }

    fn converter(from: &str, to: &str) -> Specification {
        spec(
            &format!("{from}->{to}"),
            &format!("out = Output({{'format': '{to}', 'via': Geo(data)['via'] + ['{from}->{to}']}})"),
        )
    }

    fn sample(format: &str) -> Shared {
        Arc::new(Value::from(serde_json::json!({"format": format, "via": []})))
    }

    fn via(value: &Value) -> Vec<String> {
        let Ok(Value::List(items)) = value.index(&Value::from("via")) else {
            panic!("expected a list of steps");
        };
        items.iter().map(|item| item.to_string()).collect()
    }

    #[test]
    fn test_two_hop_chain() {
        let mut graph = geo();
        graph.add_converter_edge("geo", "A", "B", &converter("A", "B")).unwrap();
        graph.add_converter_edge("geo", "B", "C", &converter("B", "C")).unwrap();

        let path = graph.resolve("geo", "A", "C").unwrap();
        assert_eq!(path.names().collect::<Vec<_>>(), ["A->B", "B->C"]);

        let out = path.execute(sample("A")).unwrap();
        assert_eq!(via(&out), ["A->B", "B->C"]);
        assert!(graph.validate("geo", "C", &out).unwrap());
    }

    #[test]
    fn test_direct_edge_is_preferred() {
        let mut graph = geo();
        graph.add_converter_edge("geo", "A", "B", &converter("A", "B")).unwrap();
        graph.add_converter_edge("geo", "B", "C", &converter("B", "C")).unwrap();
        graph.add_converter_edge("geo", "A", "C", &converter("A", "C")).unwrap();

        let path = graph.resolve("geo", "A", "C").unwrap();
        assert_eq!(path.len(), 1);

        let out = graph.convert("geo", sample("A"), "A", "C", true).unwrap();
        assert_eq!(out.index(&Value::from("format")), Ok(Value::from("C")));
        assert_eq!(via(&out), ["A->C"]);
    }

    #[test]
    fn test_ties_follow_registration_order() {
        let mut graph = geo();
        graph.add_converter_edge("geo", "A", "C", &converter("A", "C")).unwrap();
        graph.add_converter_edge("geo", "A", "B", &converter("A", "B")).unwrap();
        graph.add_converter_edge("geo", "C", "D", &converter("C", "D")).unwrap();
        graph.add_converter_edge("geo", "B", "D", &converter("B", "D")).unwrap();

        let path = graph.resolve("geo", "A", "D").unwrap();
        assert_eq!(path.names().collect::<Vec<_>>(), ["A->C", "C->D"]);
    }

    #[test]
    fn test_identity() {
        let graph = geo();
        let path = graph.resolve("geo", "B", "B").unwrap();
        assert!(path.is_empty());

        let value = sample("B");
        let out = path.execute(value.clone()).unwrap();
        assert!(Arc::ptr_eq(&out, &value));
    }

    #[test]
    fn test_unknown_format() {
        let mut graph = geo();
        assert!(matches!(
            graph.resolve("geo", "A", "Z"),
            Err(ConversionError::UnknownFormat { format, .. }) if format == "Z"
        ));
        assert!(matches!(
            graph.resolve("table", "A", "B"),
            Err(ConversionError::UnknownFormat { .. })
        ));
        assert!(matches!(
            graph.add_converter_edge("geo", "A", "Z", &converter("A", "Z")),
            Err(ConversionError::UnknownFormat { .. })
        ));
    }

    #[test]
    fn test_no_path() {
        let mut graph = geo();
        graph.add_converter_edge("geo", "A", "B", &converter("A", "B")).unwrap();

        assert!(matches!(
            graph.resolve("geo", "B", "A"),
            Err(ConversionError::NoConversionPath { .. })
        ));
        assert!(matches!(
            graph.resolve("geo", "A", "C"),
            Err(ConversionError::NoConversionPath { .. })
        ));
    }

    #[test]
    fn test_duplicate_converter_is_ignored() {
        let mut graph = geo();
        graph.add_converter_edge("geo", "A", "B", &converter("A", "B")).unwrap();
        graph.add_converter_edge("geo", "A", "B", &converter("A", "B")).unwrap();
        assert_eq!(graph.converters(None).len(), 1);

        let mut other = converter("A", "B");
        other.name = "another A->B".into();
        graph.add_converter_edge("geo", "A", "B", &other).unwrap();
        assert_eq!(graph.converters(Some("geo")).len(), 2);
        assert!(graph.converters(Some("table")).is_empty());
    }

    #[test]
    fn test_signature_checks() {
        let mut graph = geo();
        let two_outputs = spec("bad", "a = Output(Geo(x))\nb = Output(x)");
        assert!(matches!(
            graph.add_converter_edge("geo", "A", "B", &two_outputs),
            Err(ConversionError::InvalidConverter { name, .. }) if name == "bad"
        ));
        assert!(matches!(
            graph.add_validator_node("geo", "E", &two_outputs),
            Err(ConversionError::InvalidValidator { .. })
        ));
    }

    #[test]
    fn test_validation() {
        let mut graph = geo();
        assert!(graph.validate("geo", "A", &sample("A")).unwrap());
        assert!(!graph.validate("geo", "A", &sample("B")).unwrap());
        assert!(!graph.validate("geo", "A", &Arc::new(Value::Int(3))).unwrap());

        // Indexing a number fails inside the validator.
        let strict = spec("is E", "ok = Output(Geo(data)['format'] == 'E')");
        graph.add_validator_node("geo", "E", &strict).unwrap();
        assert!(!graph.validate("geo", "E", &Arc::new(Value::Int(3))).unwrap());
        assert!(graph.validate("geo", "E", &sample("E")).unwrap());

        let not_a_predicate = spec("len", "n = Output(len(Geo(data)))");
        graph.add_validator_node("geo", "A", &not_a_predicate).unwrap();
        assert!(matches!(
            graph.validate("geo", "A", &sample("A")),
            Err(ConversionError::InvalidValidator { .. })
        ));
    }

    #[test]
    fn test_convert_checks_input() {
        let mut graph = geo();
        graph.add_converter_edge("geo", "A", "B", &converter("A", "B")).unwrap();

        assert!(matches!(
            graph.convert("geo", sample("C"), "A", "B", true),
            Err(ConversionError::Validation { format, .. }) if format == "A"
        ));
        assert!(graph.convert("geo", sample("C"), "A", "B", false).is_ok());
    }

    #[test]
    fn test_listing() {
        let graph = geo();
        let all = graph.validators(None, None);
        assert_eq!(all.len(), 4);
        assert_eq!(all[0].format, "A");

        let one = graph.validators(Some("geo"), Some("B"));
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].validator.name, "is B");
        assert!(graph.validators(Some("table"), None).is_empty());

        let json = serde_json::to_value(&one[0]).unwrap();
        assert_eq!(json["type"], "geo");
        assert_eq!(json["validator"]["inputs"][0]["name"], "data");
    }
}
