//! Acyclicity verification
//!
//! A [`DependencyGraph`] is a snapshot of every provider and decorator in a
//! scope tree, plus any hypothetical participant being registered. Checks
//! run on the snapshot, so a rejected registration never touches the tree.

use crate::key::Key;
use crate::types::{Location, NodeId};
use indexmap::IndexMap;
use petgraph::graphmap::DiGraphMap;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// One hop of a dependency cycle: the participant at `location` requires `key`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleStep {
    /// The required key
    pub key: Key,
    /// The participant requiring it
    pub location: Location,
}

/// Ordered chain of hops that returns to its first participant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CyclePath(pub Vec<CycleStep>);

impl CyclePath {
    /// Hops in dependency order
    #[inline]
    #[must_use]
    pub fn steps(&self) -> &[CycleStep] {
        &self.0
    }

    /// Number of hops
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the path has no hops
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Keys along the cycle, in order
    pub fn keys(&self) -> impl Iterator<Item = &Key> + '_ {
        self.0.iter().map(|step| &step.key)
    }
}

impl fmt::Display for CyclePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" -> ")?;
            }
            write!(f, "{} depends on {}", step.location, step.key)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct Participant {
    location: Location,
    requires: Vec<Key>,
    /// Keys rewrapped by a decorator; empty for providers
    wraps: Vec<Key>,
}

/// Snapshot of the `requires` relation across a scope tree
#[derive(Debug, Default)]
pub(crate) struct DependencyGraph {
    participants: IndexMap<NodeId, Participant>,
    providers: HashMap<Key, Vec<NodeId>>,
    decorators: HashMap<Key, Vec<NodeId>>,
    /// Decorators applied to a key at resolution, innermost first
    chains: HashMap<Key, Vec<NodeId>>,
}

impl DependencyGraph {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add_provider(
        &mut self,
        id: NodeId,
        location: &Location,
        requires: impl IntoIterator<Item = Key>,
        produces: impl IntoIterator<Item = Key>,
    ) {
        if self.participants.contains_key(&id) {
            return;
        }
        self.participants.insert(
            id,
            Participant {
                location: location.clone(),
                requires: requires.into_iter().collect(),
                wraps: Vec::new(),
            },
        );
        for key in produces {
            self.providers.entry(key).or_default().push(id);
        }
    }

    pub(crate) fn add_decorator(
        &mut self,
        id: NodeId,
        location: &Location,
        requires: impl IntoIterator<Item = Key>,
        wraps: Vec<Key>,
    ) {
        if self.participants.contains_key(&id) {
            return;
        }
        for key in &wraps {
            self.decorators.entry(key.clone()).or_default().push(id);
        }
        self.participants.insert(
            id,
            Participant {
                location: location.clone(),
                requires: requires.into_iter().collect(),
                wraps,
            },
        );
    }

    /// Keys rewrapped by at least one decorator
    pub(crate) fn decorated_keys(&self) -> Vec<Key> {
        self.decorators.keys().cloned().collect()
    }

    /// Record the order in which decorators of `key` apply, innermost first
    pub(crate) fn set_chain(&mut self, key: Key, chain: Vec<NodeId>) {
        self.chains.insert(key, chain);
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.participants.len()
    }

    /// Participants that can satisfy `key` for `requester`.
    ///
    /// A decorator reads the keys it rewraps through the decorators inside
    /// it on the chain, down to the providers. A decorator outside the chain
    /// is never applied and reads only the providers. Everyone else reads
    /// through the whole chain, or every decorator of the key when no chain
    /// was recorded.
    fn targets(&self, id: NodeId, requester: &Participant, key: &Key) -> Vec<NodeId> {
        let mut targets = self.providers.get(key).cloned().unwrap_or_default();
        let chain = self.chains.get(key);
        if requester.wraps.contains(key) {
            if let Some(chain) = chain {
                if let Some(position) = chain.iter().position(|&member| member == id) {
                    targets.extend_from_slice(&chain[..position]);
                }
            }
        } else if let Some(chain) = chain {
            targets.extend(chain.iter().copied());
        } else if let Some(decorators) = self.decorators.get(key) {
            targets.extend(decorators.iter().copied());
        }
        targets
    }

    fn adjacency(&self) -> DiGraphMap<NodeId, Key> {
        let mut graph = DiGraphMap::new();
        for (&id, participant) in &self.participants {
            graph.add_node(id);
            for key in &participant.requires {
                for target in self.targets(id, participant, key) {
                    if !graph.contains_edge(id, target) {
                        graph.add_edge(id, target, key.clone());
                    }
                }
            }
        }
        graph
    }

    /// Search the whole graph for a cycle
    pub(crate) fn find_cycle(&self) -> Option<CyclePath> {
        let graph = self.adjacency();
        let mut detector = CycleDetector::new(&graph);
        self.participants
            .keys()
            .find_map(|&id| detector.visit(id))
            .map(|ids| self.path(&graph, &ids))
    }

    /// Search only the cycles reachable from `start`
    pub(crate) fn find_cycle_from(&self, start: NodeId) -> Option<CyclePath> {
        let graph = self.adjacency();
        let mut detector = CycleDetector::new(&graph);
        detector.visit(start).map(|ids| self.path(&graph, &ids))
    }

    fn path(&self, graph: &DiGraphMap<NodeId, Key>, ids: &[NodeId]) -> CyclePath {
        let steps = ids
            .windows(2)
            .filter_map(|pair| {
                let key = graph.edge_weight(pair[0], pair[1])?;
                let participant = self.participants.get(&pair[0])?;
                Some(CycleStep {
                    key: key.clone(),
                    location: participant.location.clone(),
                })
            })
            .collect();
        CyclePath(steps)
    }
}

/// Depth-first search keeping the current path.
///
/// `visiting` holds the participants on the current path, `visited` the ones
/// whose whole subgraph is known to be acyclic.
pub(crate) struct CycleDetector<'g> {
    graph: &'g DiGraphMap<NodeId, Key>,
    visiting: HashSet<NodeId>,
    visited: HashSet<NodeId>,
    stack: Vec<NodeId>,
}

impl<'g> CycleDetector<'g> {
    pub(crate) fn new(graph: &'g DiGraphMap<NodeId, Key>) -> Self {
        Self {
            graph,
            visiting: HashSet::new(),
            visited: HashSet::new(),
            stack: Vec::new(),
        }
    }

    /// Returns the cycle as a closed list of ids (first == last)
    pub(crate) fn visit(&mut self, node: NodeId) -> Option<Vec<NodeId>> {
        if self.visiting.contains(&node) {
            let start = self.stack.iter().position(|&id| id == node)?;
            let mut cycle = self.stack[start..].to_vec();
            cycle.push(node);
            return Some(cycle);
        }
        if self.visited.contains(&node) {
            return None;
        }

        self.visiting.insert(node);
        self.stack.push(node);

        let graph = self.graph;
        for neighbor in graph.neighbors(node) {
            if let Some(cycle) = self.visit(neighbor) {
                return Some(cycle);
            }
        }

        self.stack.pop();
        self.visiting.remove(&node);
        self.visited.insert(node);
        None
    }
}
