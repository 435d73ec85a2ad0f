//! Cycle detection over a scope's dependency edges.

use std::collections::HashMap;

use camino::Utf8PathBuf;

/// Tracks the visitation state of a node during cycle detection.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum VisitState {
    Visiting,
    Visited,
}

/// Find a dependency cycle, if any, in canonical rotation.
///
/// Inputs that are not outputs of any edge (sources, external libraries)
/// are leaves and never part of a cycle.
pub(crate) fn find_cycle(edges: &HashMap<Utf8PathBuf, Vec<Utf8PathBuf>>) -> Option<Vec<Utf8PathBuf>> {
    let mut detector = CycleDetector::new(edges);
    let mut nodes: Vec<_> = edges.keys().collect();
    nodes.sort();
    for node in nodes {
        if detector.is_visited(node) {
            continue;
        }
        if let Some(found) = detector.visit(node.clone()) {
            return Some(found);
        }
    }
    None
}

struct CycleDetector<'a> {
    edges: &'a HashMap<Utf8PathBuf, Vec<Utf8PathBuf>>,
    stack: Vec<Utf8PathBuf>,
    states: HashMap<Utf8PathBuf, VisitState>,
}

impl<'a> CycleDetector<'a> {
    fn new(edges: &'a HashMap<Utf8PathBuf, Vec<Utf8PathBuf>>) -> Self {
        Self {
            edges,
            stack: Vec::new(),
            states: HashMap::new(),
        }
    }

    fn is_visited(&self, node: &Utf8PathBuf) -> bool {
        matches!(self.states.get(node), Some(VisitState::Visited))
    }

    fn visit(&mut self, node: Utf8PathBuf) -> Option<Vec<Utf8PathBuf>> {
        match self.states.get(&node) {
            Some(VisitState::Visited) => return None,
            Some(VisitState::Visiting) => {
                let idx = self
                    .stack
                    .iter()
                    .position(|n| n == &node)
                    .unwrap_or_else(|| {
                        debug_assert!(false, "visiting node must be on the stack");
                        0
                    });
                let mut cycle: Vec<Utf8PathBuf> = self.stack.iter().skip(idx).cloned().collect();
                cycle.push(node);
                return Some(canonicalize_cycle(cycle));
            }
            None => {
                self.states.insert(node.clone(), VisitState::Visiting);
            }
        }

        self.stack.push(node.clone());

        if let Some(inputs) = self.edges.get(&node) {
            for dep in inputs {
                if !self.edges.contains_key(dep) {
                    continue;
                }
                if let Some(cycle) = self.visit(dep.clone()) {
                    return Some(cycle);
                }
            }
        }

        self.stack.pop();
        self.states.insert(node, VisitState::Visited);
        None
    }
}

fn canonicalize_cycle(mut cycle: Vec<Utf8PathBuf>) -> Vec<Utf8PathBuf> {
    if cycle.len() < 2 {
        return cycle;
    }
    let len = cycle.len() - 1;
    let start = cycle
        .iter()
        .take(len)
        .enumerate()
        .min_by(|(_, a), (_, b)| a.cmp(b))
        .map_or(0, |(idx, _)| idx);
    let (prefix, suffix) = cycle.split_at_mut(len);
    prefix.rotate_left(start);
    if let (Some(first), Some(slot)) = (prefix.first().cloned(), suffix.first_mut()) {
        slot.clone_from(&first);
    }
    cycle
}
