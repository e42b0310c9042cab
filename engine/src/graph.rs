//! The advancement graph: one directed acyclic graph over games, stored once
//! as an arena of nodes keyed by game id, with forward (winner/loser targets)
//! and back (`depends_on`) indices over a single edge list.
//!
//! Games persist only their outgoing edges (`Game::advances`); everything
//! upstream is derived here, so the two directions cannot drift apart.

use crate::schedule::GameSkeleton;
use crate::{Advance, EngineError, EngineResult, Game, GameId, Outcome};
use std::collections::{HashMap, HashSet, VecDeque};

/// Most feeds a game can take: one per team slot.
pub const MAX_FEEDS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Edge {
    from: usize,
    to: usize,
    outcome: Outcome,
}

#[derive(Debug, Clone, Default)]
pub struct AdvancementGraph {
    ids: Vec<GameId>,
    index: HashMap<GameId, usize>,
    edges: Vec<Edge>,
    forward: Vec<Vec<usize>>,
    backward: Vec<Vec<usize>>,
}

impl AdvancementGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from stored games. Every game becomes a node even without edges.
    pub fn from_games(games: &[Game]) -> Self {
        let mut graph = Self::new();
        for game in games {
            graph.node(&game.id);
        }
        for game in games {
            for advance in &game.advances {
                graph.insert(&game.id, &advance.to, advance.outcome);
            }
        }
        graph
    }

    pub fn from_skeletons(skeletons: &[GameSkeleton]) -> Self {
        let mut graph = Self::new();
        for s in skeletons {
            graph.node(&s.id);
        }
        for s in skeletons {
            for advance in &s.advances {
                graph.insert(&s.id, &advance.to, advance.outcome);
            }
        }
        graph
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    fn node(&mut self, id: &str) -> usize {
        if let Some(&idx) = self.index.get(id) {
            return idx;
        }
        let idx = self.ids.len();
        self.ids.push(id.to_owned());
        self.index.insert(id.to_owned(), idx);
        self.forward.push(Vec::new());
        self.backward.push(Vec::new());
        idx
    }

    /// Adds the edge without validation. Returns false for a duplicate.
    fn insert(&mut self, from: &str, to: &str, outcome: Outcome) -> bool {
        let from = self.node(from);
        let to = self.node(to);
        let edge = Edge { from, to, outcome };
        if self.forward[from].iter().any(|&e| self.edges[e] == edge) {
            return false;
        }
        let e = self.edges.len();
        self.edges.push(edge);
        self.forward[from].push(e);
        self.backward[to].push(e);
        true
    }

    fn reindex(&mut self) {
        self.forward = vec![Vec::new(); self.ids.len()];
        self.backward = vec![Vec::new(); self.ids.len()];
        for (e, edge) in self.edges.iter().enumerate() {
            self.forward[edge.from].push(e);
            self.backward[edge.to].push(e);
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn targets(&self, id: &str, outcome: Outcome) -> Vec<&str> {
        let Some(&idx) = self.index.get(id) else {
            return Vec::new();
        };
        self.forward[idx]
            .iter()
            .map(|&e| self.edges[e])
            .filter(|edge| edge.outcome == outcome)
            .map(|edge| self.ids[edge.to].as_str())
            .collect()
    }

    pub fn winner_targets(&self, id: &str) -> Vec<&str> {
        self.targets(id, Outcome::Winner)
    }

    pub fn loser_targets(&self, id: &str) -> Vec<&str> {
        self.targets(id, Outcome::Loser)
    }

    /// Incoming feeds of a game as (source game, outcome), in insertion order.
    pub fn feeds(&self, id: &str) -> Vec<(&str, Outcome)> {
        let Some(&idx) = self.index.get(id) else {
            return Vec::new();
        };
        self.backward[idx]
            .iter()
            .map(|&e| self.edges[e])
            .map(|edge| (self.ids[edge.from].as_str(), edge.outcome))
            .collect()
    }

    /// Distinct upstream games whose outcomes fill this game's slots.
    pub fn depends_on(&self, id: &str) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.feeds(id)
            .into_iter()
            .map(|(from, _)| from)
            .filter(|from| seen.insert(*from))
            .collect()
    }

    /// Outgoing edges of a game, in the form games persist them.
    pub fn advances_of(&self, id: &str) -> Vec<Advance> {
        let Some(&idx) = self.index.get(id) else {
            return Vec::new();
        };
        self.forward[idx]
            .iter()
            .map(|&e| self.edges[e])
            .map(|edge| Advance { to: self.ids[edge.to].clone(), outcome: edge.outcome })
            .collect()
    }

    /// True if `ancestor` is reachable from `id` by walking `depends_on` edges.
    pub fn is_ancestor(&self, ancestor: &str, id: &str) -> bool {
        let (Some(&target), Some(&start)) = (self.index.get(ancestor), self.index.get(id)) else {
            return false;
        };
        let mut visited = vec![false; self.ids.len()];
        let mut queue = VecDeque::from([start]);
        while let Some(node) = queue.pop_front() {
            for &e in &self.backward[node] {
                let up = self.edges[e].from;
                if up == target {
                    return true;
                }
                if !visited[up] {
                    visited[up] = true;
                    queue.push_back(up);
                }
            }
        }
        false
    }

    // -----------------------------------------------------------------------
    // Edits (configuration time)
    // -----------------------------------------------------------------------

    /// Validate a new `from -> to` edge without applying it. An edge that
    /// already exists is accepted as a no-op.
    pub fn check_link(&self, from: &str, to: &str, outcome: Outcome) -> EngineResult<()> {
        if from == to {
            return Err(EngineError::CycleDetected { from: from.into(), to: to.into() });
        }
        for id in [from, to] {
            if !self.contains(id) {
                return Err(EngineError::NotFound(format!("game {id}")));
            }
        }
        let feeds = self.feeds(to);
        if feeds.contains(&(from, outcome)) {
            return Ok(());
        }
        if feeds.len() >= MAX_FEEDS {
            return Err(EngineError::CapacityExceeded { target: to.into() });
        }
        if self.is_ancestor(to, from) {
            return Err(EngineError::CycleDetected { from: from.into(), to: to.into() });
        }
        Ok(())
    }

    /// Validate and add an edge. Returns whether the graph changed.
    pub fn link(&mut self, from: &str, to: &str, outcome: Outcome) -> EngineResult<bool> {
        self.check_link(from, to, outcome)?;
        Ok(self.insert(from, to, outcome))
    }

    /// Remove every edge from `from` into `to`. Returns how many were removed.
    pub fn unlink(&mut self, from: &str, to: &str) -> usize {
        let (Some(&f), Some(&t)) = (self.index.get(from), self.index.get(to)) else {
            return 0;
        };
        let before = self.edges.len();
        self.edges.retain(|edge| !(edge.from == f && edge.to == t));
        let removed = before - self.edges.len();
        if removed > 0 {
            self.reindex();
        }
        removed
    }

    /// Replace all outgoing edges of `from`. Validation runs against the graph
    /// without `from`'s old edges; on error nothing changes.
    pub fn replace_advances(&mut self, from: &str, advances: &[Advance]) -> EngineResult<()> {
        let mut candidate = self.clone();
        if let Some(&f) = candidate.index.get(from) {
            candidate.edges.retain(|edge| edge.from != f);
            candidate.reindex();
        }
        for advance in advances {
            candidate.link(from, &advance.to, advance.outcome)?;
        }
        *self = candidate;
        Ok(())
    }
}
