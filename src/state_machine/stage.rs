use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{LintasError, Result};

/// The kinds of records that flow through a stage graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Delivery,
    Cleaning,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Delivery => "delivery",
            EntityKind::Cleaning => "cleaning",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Directed graph of named stages with a level overlay.
///
/// A transition is legal only when the edge exists in the table *and* it
/// moves exactly one level forward. Levels holding more than one stage model
/// parallel alternatives (a partial order); single-stage levels give a
/// strict total order.
#[derive(Debug, Clone)]
pub struct StageGraph {
    levels: Vec<Vec<String>>,
    rank: HashMap<String, usize>,
    edges: HashSet<(String, String)>,
}

impl StageGraph {
    /// Build a graph from ordered levels and an optional edge table.
    ///
    /// Without an explicit edge table every stage is connected to every stage
    /// of the next level.
    pub fn new(levels: Vec<Vec<String>>, edges: Option<Vec<(String, String)>>) -> Result<Self> {
        if levels.is_empty() {
            return Err(LintasError::Config("stage table has no levels".into()));
        }

        let mut rank = HashMap::new();
        for (level, stages) in levels.iter().enumerate() {
            if stages.is_empty() {
                return Err(LintasError::Config(format!("stage level {level} is empty")));
            }
            for stage in stages {
                if rank.insert(stage.clone(), level).is_some() {
                    return Err(LintasError::Config(format!("duplicate stage `{stage}`")));
                }
            }
        }

        let edges: HashSet<(String, String)> = match edges {
            Some(edges) => {
                for (from, to) in &edges {
                    for stage in [from, to] {
                        if !rank.contains_key(stage) {
                            return Err(LintasError::Config(format!(
                                "edge {from} -> {to} names unknown stage `{stage}`"
                            )));
                        }
                    }
                }
                edges.into_iter().collect()
            }
            None => levels
                .windows(2)
                .flat_map(|pair| {
                    pair[0].iter().flat_map(move |from| {
                        pair[1].iter().map(move |to| (from.clone(), to.clone()))
                    })
                })
                .collect(),
        };

        Ok(Self {
            levels,
            rank,
            edges,
        })
    }

    /// Build a strictly sequential graph from an ordered stage list.
    pub fn sequential<S: AsRef<str>>(stages: &[S]) -> Result<Self> {
        let levels = stages.iter().map(|s| vec![s.as_ref().to_string()]).collect();
        Self::new(levels, None)
    }

    /// Default delivery lifecycle, from the kitchen to the container pickup.
    pub fn delivery() -> Self {
        Self::sequential(&default_stages(EntityKind::Delivery))
            .expect("built-in delivery table is valid")
    }

    /// Default ompreng cleaning lifecycle.
    pub fn cleaning() -> Self {
        Self::sequential(&default_stages(EntityKind::Cleaning))
            .expect("built-in cleaning table is valid")
    }

    /// Check a proposed status change. Pure; safe to call from any task.
    pub fn validate(&self, from: &str, to: &str) -> Result<()> {
        let reachable = self.edges.contains(&(from.to_string(), to.to_string()));
        let in_sequence = match (self.rank.get(from), self.rank.get(to)) {
            (Some(&a), Some(&b)) => b == a + 1,
            _ => false,
        };

        if reachable && in_sequence {
            Ok(())
        } else {
            Err(LintasError::InvalidTransition {
                from: from.to_string(),
                to: to.to_string(),
            })
        }
    }

    /// The stage new records start in. With a parallel first level, the
    /// first listed stage wins.
    pub fn initial(&self) -> &str {
        &self.levels[0][0]
    }

    pub fn contains(&self, stage: &str) -> bool {
        self.rank.contains_key(stage)
    }

    pub fn levels(&self) -> &[Vec<String>] {
        &self.levels
    }

    /// Stages reachable in one legal step from `from`.
    pub fn successors(&self, from: &str) -> Vec<&str> {
        let Some(&level) = self.rank.get(from) else {
            return Vec::new();
        };
        self.levels
            .get(level + 1)
            .map(|next| {
                next.iter()
                    .map(String::as_str)
                    .filter(|to| self.edges.contains(&(from.to_string(), to.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Built-in stage names per kind.
pub fn default_stages(kind: EntityKind) -> Vec<&'static str> {
    match kind {
        EntityKind::Delivery => vec![
            "cooking",
            "cooked",
            "ready-to-pack",
            "packed",
            "ready-to-ship",
            "in-transit",
            "received-by-school",
            "container-collected",
            "container-returned",
        ],
        EntityKind::Cleaning => vec![
            "container-returned",
            "container-in-wash",
            "container-washed",
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn levels(spec: &[&[&str]]) -> Vec<Vec<String>> {
        spec.iter()
            .map(|level| level.iter().map(|s| s.to_string()).collect())
            .collect()
    }

    fn edge(from: &str, to: &str) -> (String, String) {
        (from.to_string(), to.to_string())
    }

    #[test]
    fn delivery_happy_path_is_accepted() {
        let graph = StageGraph::delivery();
        let stages = default_stages(EntityKind::Delivery);
        for pair in stages.windows(2) {
            assert!(graph.validate(pair[0], pair[1]).is_ok(), "{pair:?}");
        }
    }

    #[test]
    fn every_pair_outside_the_table_is_rejected() {
        let graph = StageGraph::delivery();
        let stages = default_stages(EntityKind::Delivery);
        let legal: HashSet<(&str, &str)> = stages.windows(2).map(|p| (p[0], p[1])).collect();

        for from in &stages {
            for to in &stages {
                let result = graph.validate(from, to);
                if legal.contains(&(*from, *to)) {
                    assert!(result.is_ok());
                } else {
                    assert!(
                        matches!(result, Err(LintasError::InvalidTransition { .. })),
                        "{from} -> {to} should be rejected"
                    );
                }
            }
        }
    }

    #[test]
    fn skip_edge_in_table_is_caught_by_sequence_check() {
        let graph = StageGraph::new(
            levels(&[&["cooking"], &["cooked"], &["ready-to-pack"]]),
            Some(vec![
                edge("cooking", "cooked"),
                edge("cooked", "ready-to-pack"),
                edge("cooking", "ready-to-pack"),
            ]),
        )
        .unwrap();

        let err = graph.validate("cooking", "ready-to-pack").unwrap_err();
        match err {
            LintasError::InvalidTransition { from, to } => {
                assert_eq!(from, "cooking");
                assert_eq!(to, "ready-to-pack");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_edge_is_rejected_even_when_in_sequence() {
        let graph = StageGraph::new(
            levels(&[&["a"], &["b", "c"], &["d"]]),
            Some(vec![edge("a", "b"), edge("b", "d"), edge("c", "d")]),
        )
        .unwrap();

        assert!(graph.validate("a", "b").is_ok());
        assert!(graph.validate("a", "c").is_err());
        assert!(graph.validate("c", "d").is_ok());
    }

    #[test]
    fn partial_order_allows_parallel_branches_but_not_sideways() {
        let graph = StageGraph::new(levels(&[&["a"], &["b", "c"], &["d"]]), None).unwrap();

        assert!(graph.validate("a", "b").is_ok());
        assert!(graph.validate("a", "c").is_ok());
        assert!(graph.validate("b", "d").is_ok());
        assert!(graph.validate("b", "c").is_err());
        assert!(graph.validate("d", "a").is_err());
        assert_eq!(graph.successors("a"), vec!["b", "c"]);
        assert!(graph.successors("d").is_empty());
    }

    #[test]
    fn unknown_stages_are_rejected() {
        let graph = StageGraph::cleaning();
        assert!(graph.validate("container-returned", "lost").is_err());
        assert!(graph.validate("lost", "container-in-wash").is_err());
        assert!(graph.validate("container-returned", "container-returned").is_err());
    }

    #[test]
    fn construction_rejects_bad_tables() {
        assert!(StageGraph::new(Vec::new(), None).is_err());
        assert!(StageGraph::new(levels(&[&["a"], &[]]), None).is_err());
        assert!(StageGraph::new(levels(&[&["a"], &["a"]]), None).is_err());
        assert!(StageGraph::new(levels(&[&["a"], &["b"]]), Some(vec![edge("a", "z")])).is_err());
    }

    #[test]
    fn initial_stage_is_first_level() {
        assert_eq!(StageGraph::delivery().initial(), "cooking");
        assert_eq!(StageGraph::cleaning().initial(), "container-returned");
    }

    #[test]
    fn kind_display() {
        assert_eq!(EntityKind::Delivery.to_string(), "delivery");
        assert_eq!(EntityKind::Cleaning.to_string(), "cleaning");
    }
}
