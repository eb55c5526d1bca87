//! Dependency resolution.
//!
//! Flattens a task's declared dependencies into the ordered set of leaf
//! sources that must supply data before the task can run.
//!
//! ## Algorithm
//! 1. Walk the direct dependencies of the task in declaration order
//! 2. A leaf (source) is emitted the first time it is seen
//! 3. Anything else is expanded recursively, depth first
//! 4. A name that is already on the current walk path is a cycle

use std::collections::HashSet;

use crate::error::{ConfigError, Result};
use crate::graph::ConfigGraph;

/// Resolve the leaf sources `task` depends on, directly or transitively.
///
/// Output order is first-seen order of a depth-first walk, so the result
/// is stable for a given configuration.
pub fn resolve(graph: &ConfigGraph, task: &str) -> Result<Vec<String>> {
    let mut walk = Walk {
        graph,
        path: Vec::new(),
        seen: HashSet::new(),
        leaves: Vec::new(),
    };
    walk.visit(task)?;
    Ok(walk.leaves)
}

struct Walk<'a> {
    graph: &'a ConfigGraph,
    /// Names currently being expanded, outermost first
    path: Vec<&'a str>,
    seen: HashSet<&'a str>,
    leaves: Vec<String>,
}

impl<'a> Walk<'a> {
    fn visit(&mut self, name: &str) -> Result<()> {
        let graph = self.graph;
        let definition = graph
            .lookup(name)
            .ok_or_else(|| ConfigError::UnknownTask(name.to_string()))?;
        let name = definition.name();

        if let Some(start) = self.path.iter().position(|on_path| *on_path == name) {
            let mut cycle: Vec<String> = self.path[start..].iter().map(|n| n.to_string()).collect();
            cycle.push(name.to_string());
            return Err(ConfigError::DependencyCycle { path: cycle });
        }

        self.path.push(name);
        for dependency in definition.dependencies() {
            let upstream = graph.lookup(dependency).ok_or_else(|| {
                ConfigError::UnknownReference {
                    task: name.to_string(),
                    reference: dependency.clone(),
                }
            })?;
            if upstream.is_leaf() {
                if self.seen.insert(upstream.name()) {
                    self.leaves.push(upstream.name().to_string());
                }
            } else {
                self.visit(upstream.name())?;
            }
        }
        self.path.pop();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AlgoTransformConfig, FeatureConfig, SourceConfig, TaskDefinition, TaskSpec};
    use records::{Field, FieldType};

    fn source(name: &str) -> TaskDefinition {
        TaskDefinition::new(TaskSpec::Source(SourceConfig {
            name: name.to_string(),
            columns: vec![Field::new("id", FieldType::Str)],
            rows: None,
            filter: None,
        }))
    }

    fn feature(name: &str, from: &[&str]) -> TaskDefinition {
        TaskDefinition::new(TaskSpec::Feature(FeatureConfig {
            name: name.to_string(),
            from: from.iter().map(|s| s.to_string()).collect(),
            join: None,
            columns: Vec::new(),
        }))
    }

    fn transform(name: &str, feature: &[&str], nested: &[&str]) -> TaskDefinition {
        TaskDefinition::new(TaskSpec::AlgoTransform(AlgoTransformConfig {
            name: name.to_string(),
            feature: feature.iter().map(|s| s.to_string()).collect(),
            algo_transform: nested.iter().map(|s| s.to_string()).collect(),
            join: None,
            actions: Vec::new(),
            columns: Vec::new(),
        }))
    }

    fn graph(definitions: Vec<TaskDefinition>) -> ConfigGraph {
        ConfigGraph::unchecked(definitions)
    }

    #[test]
    fn test_direct_leaves_are_deduplicated_in_order() {
        let g = graph(vec![
            source("a"),
            source("b"),
            feature("f", &["b", "a", "b"]),
        ]);

        assert_eq!(resolve(&g, "f").unwrap(), vec!["b", "a"]);
    }

    #[test]
    fn test_nested_transforms_are_flattened_depth_first() {
        let g = graph(vec![
            source("users"),
            source("items"),
            source("clicks"),
            feature("user_feature", &["users"]),
            feature("item_feature", &["items", "users"]),
            transform("inner", &["item_feature"], &[]),
            transform("outer", &["user_feature"], &["inner"]),
            transform("top", &["clicks"], &["outer", "inner"]),
        ]);

        assert_eq!(
            resolve(&g, "top").unwrap(),
            vec!["clicks", "users", "items"]
        );
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let g = graph(vec![
            source("a"),
            source("b"),
            feature("f", &["a"]),
            transform("t", &["f", "b"], &[]),
        ]);

        let first = resolve(&g, "t").unwrap();
        let second = resolve(&g, "t").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_leaf_resolves_to_nothing() {
        let g = graph(vec![source("a")]);
        assert!(resolve(&g, "a").unwrap().is_empty());
    }

    #[test]
    fn test_two_task_cycle_fails_fast() {
        let g = graph(vec![
            source("s"),
            transform("a", &["s"], &["b"]),
            transform("b", &[], &["a"]),
        ]);

        match resolve(&g, "a") {
            Err(ConfigError::DependencyCycle { path }) => {
                assert_eq!(path, vec!["a", "b", "a"]);
            }
            other => panic!("expected a cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_self_reference_is_a_cycle() {
        let g = graph(vec![transform("loop", &[], &["loop"])]);
        assert!(matches!(
            resolve(&g, "loop"),
            Err(ConfigError::DependencyCycle { .. })
        ));
    }

    #[test]
    fn test_unknown_names() {
        let g = graph(vec![feature("f", &["missing"])]);

        assert!(matches!(resolve(&g, "nope"), Err(ConfigError::UnknownTask(_))));
        assert!(matches!(
            resolve(&g, "f"),
            Err(ConfigError::UnknownReference { .. })
        ));
    }
}
