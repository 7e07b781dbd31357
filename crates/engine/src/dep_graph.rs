//! Dependency graph between derived variables.
//!
//! # Edge Direction
//!
//! ```text
//! A → B  means  "B depends on A"  (A is referenced by B's formula)
//! ```
//!
//! Only variables with a formula have precedents. Plain variables and
//! products only ever appear as precedents.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::catalog::VariableRef;
use crate::formula::refs;

/// Bidirectional adjacency over variable ids.
///
/// # Invariants
///
/// 1. **Bidirectional consistency:** If A ∈ preds[B] then B ∈ succs[A], and vice versa.
/// 2. **No dangling entries:** Empty sets are removed, not stored.
/// 3. **Atomic updates:** `replace_edges` is the only mutator that touches both maps.
#[derive(Default, Debug, Clone)]
pub struct DepGraph {
    /// Derived variable -> ids its formula references.
    preds: FxHashMap<String, FxHashSet<String>>,
    /// Referenced id -> derived variables that reference it.
    succs: FxHashMap<String, FxHashSet<String>>,
    /// Every derived variable, including ones whose formula references nothing.
    derived: FxHashSet<String>,
}

impl DepGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Graph of every variable with a non-empty formula.
    pub fn from_variables(variables: &[VariableRef]) -> Self {
        let mut graph = Self::new();
        for v in variables {
            if let Some(formula) = v.derived_formula() {
                let preds = refs::referenced_ids(formula).into_iter().collect();
                graph.replace_edges(&v.id, preds);
            }
        }
        graph
    }

    pub fn precedents<'a>(&'a self, id: &str) -> impl Iterator<Item = &'a str> + 'a {
        self.preds
            .get(id)
            .into_iter()
            .flat_map(|s| s.iter().map(String::as_str))
    }

    pub fn dependents<'a>(&'a self, id: &str) -> impl Iterator<Item = &'a str> + 'a {
        self.succs
            .get(id)
            .into_iter()
            .flat_map(|s| s.iter().map(String::as_str))
    }

    pub fn derived_count(&self) -> usize {
        self.derived.len()
    }

    /// Replace all edges of a derived variable.
    pub fn replace_edges(&mut self, id: &str, new_preds: FxHashSet<String>) {
        if let Some(old_preds) = self.preds.remove(id) {
            for pred in old_preds {
                if let Some(deps) = self.succs.get_mut(&pred) {
                    deps.remove(id);
                    if deps.is_empty() {
                        self.succs.remove(&pred);
                    }
                }
            }
        }

        self.derived.insert(id.to_string());
        if new_preds.is_empty() {
            return;
        }

        for pred in &new_preds {
            self.succs.entry(pred.clone()).or_default().insert(id.to_string());
        }
        self.preds.insert(id.to_string(), new_preds);
    }

    fn sorted_derived_preds(&self, id: &str) -> Vec<&str> {
        let mut out: Vec<&str> = self.precedents(id).filter(|p| self.derived.contains(*p)).collect();
        out.sort_unstable();
        out
    }

    /// Derived variables that sit on a cycle (self-references included).
    ///
    /// Tarjan's algorithm over derived-to-derived edges, iterative, visiting
    /// nodes in sorted order so the result is deterministic. Variables that
    /// merely depend on a cycle are not members.
    pub fn find_cycle_members(&self) -> Vec<String> {
        let mut roots: Vec<&str> = self.derived.iter().map(String::as_str).collect();
        roots.sort_unstable();

        struct Frame<'a> {
            node: &'a str,
            neighbours: Vec<&'a str>,
            next: usize,
        }

        let mut counter = 0u32;
        let mut indices: FxHashMap<&str, u32> = FxHashMap::default();
        let mut lowlinks: FxHashMap<&str, u32> = FxHashMap::default();
        let mut stack: Vec<&str> = Vec::new();
        let mut on_stack: FxHashSet<&str> = FxHashSet::default();
        let mut members: Vec<String> = Vec::new();

        for root in roots {
            if indices.contains_key(root) {
                continue;
            }

            indices.insert(root, counter);
            lowlinks.insert(root, counter);
            counter += 1;
            stack.push(root);
            on_stack.insert(root);
            let mut dfs = vec![Frame { node: root, neighbours: self.sorted_derived_preds(root), next: 0 }];

            while let Some(frame) = dfs.last_mut() {
                if frame.next < frame.neighbours.len() {
                    let w = frame.neighbours[frame.next];
                    frame.next += 1;
                    let v = frame.node;

                    if !indices.contains_key(w) {
                        indices.insert(w, counter);
                        lowlinks.insert(w, counter);
                        counter += 1;
                        stack.push(w);
                        on_stack.insert(w);
                        dfs.push(Frame { node: w, neighbours: self.sorted_derived_preds(w), next: 0 });
                    } else if on_stack.contains(w) {
                        let w_idx = indices[w];
                        if let Some(low) = lowlinks.get_mut(v) {
                            *low = (*low).min(w_idx);
                        }
                    }
                    continue;
                }

                let Some(finished) = dfs.pop() else { break };
                let v = finished.node;
                let v_low = lowlinks[v];

                if let Some(parent) = dfs.last() {
                    if let Some(low) = lowlinks.get_mut(parent.node) {
                        *low = (*low).min(v_low);
                    }
                }

                if v_low == indices[v] {
                    let mut scc = Vec::new();
                    while let Some(w) = stack.pop() {
                        on_stack.remove(w);
                        scc.push(w);
                        if w == v {
                            break;
                        }
                    }
                    let self_loop = scc.len() == 1 && self.precedents(v).any(|p| p == v);
                    if scc.len() > 1 || self_loop {
                        members.extend(scc.into_iter().map(str::to_string));
                    }
                }
            }
        }

        members.sort_unstable();
        members
    }

    /// Derived variables in dependency order, precedents first.
    ///
    /// Ids in `skip` are left out and treated as plain values. Kahn's
    /// algorithm with sorted tie-breaking for a stable order. Returns the
    /// ids that could not be ordered as the error (only possible when `skip`
    /// does not cover every cycle).
    pub fn topo_order(&self, skip: &FxHashSet<String>) -> Result<Vec<String>, Vec<String>> {
        let nodes: FxHashSet<&str> = self
            .derived
            .iter()
            .map(String::as_str)
            .filter(|id| !skip.contains(*id))
            .collect();

        let mut in_degree: FxHashMap<&str, usize> = nodes
            .iter()
            .map(|&id| (id, self.precedents(id).filter(|p| nodes.contains(p)).count()))
            .collect();

        let mut queue: Vec<&str> = in_degree
            .iter()
            .filter(|(_, &deg)| deg == 0)
            .map(|(&id, _)| id)
            .collect();
        // Descending so the smallest id is popped first
        queue.sort_unstable_by(|a, b| b.cmp(a));

        let mut order = Vec::with_capacity(nodes.len());
        while let Some(id) = queue.pop() {
            order.push(id.to_string());

            let mut ready: Vec<&str> = Vec::new();
            for dep in self.dependents(id) {
                if let Some(deg) = in_degree.get_mut(dep) {
                    *deg = deg.saturating_sub(1);
                    if *deg == 0 {
                        ready.push(dep);
                    }
                }
            }
            ready.sort_unstable_by(|a, b| b.cmp(a));
            queue.extend(ready);
            queue.sort_unstable_by(|a, b| b.cmp(a));
        }

        if order.len() < nodes.len() {
            let mut left: Vec<String> = nodes
                .iter()
                .filter(|id| !order.iter().any(|o| o == *id))
                .map(|id| id.to_string())
                .collect();
            left.sort_unstable();
            return Err(left);
        }
        Ok(order)
    }

    /// Check all invariants. Panics if any are violated.
    #[cfg(test)]
    pub fn assert_consistent(&self) {
        for (node, preds) in &self.preds {
            assert!(self.derived.contains(node), "{} has edges but is not derived", node);
            for pred in preds {
                assert!(
                    self.succs.get(pred).is_some_and(|s| s.contains(node)),
                    "Missing succ edge: {} should list {}",
                    pred,
                    node
                );
            }
        }
        for (pred, succs) in &self.succs {
            assert!(!succs.is_empty(), "Dangling empty succ set for {}", pred);
            for succ in succs {
                assert!(
                    self.preds.get(succ).is_some_and(|p| p.contains(pred)),
                    "Missing pred edge: {} should list {}",
                    succ,
                    pred
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn derived(id: &str, formula: &str) -> VariableRef {
        VariableRef::new(id, id.to_uppercase(), 0.0).with_formula(formula)
    }

    fn no_skip() -> FxHashSet<String> {
        FxHashSet::default()
    }

    #[test]
    fn test_empty_graph() {
        let g = DepGraph::new();
        assert_eq!(g.derived_count(), 0);
        assert!(g.find_cycle_members().is_empty());
        assert_eq!(g.topo_order(&no_skip()), Ok(vec![]));
    }

    #[test]
    fn test_edges_from_variables() {
        let vars = vec![
            VariableRef::new("a", "A", 1.0),
            derived("v", "{a}*2+{a}"),
            derived("w", "{v}+{p1}"),
        ];
        let g = DepGraph::from_variables(&vars);
        g.assert_consistent();
        assert_eq!(g.derived_count(), 2);
        let mut deps: Vec<_> = g.dependents("v").collect();
        deps.sort();
        assert_eq!(deps, vec!["w"]);
        assert_eq!(g.precedents("v").collect::<Vec<_>>(), vec!["a"]);
    }

    #[test]
    fn test_rewire_edges() {
        let mut g = DepGraph::from_variables(&[derived("v", "{a}")]);
        g.replace_edges("v", ["b".to_string()].into_iter().collect());
        g.assert_consistent();
        assert_eq!(g.dependents("a").count(), 0);
        assert_eq!(g.dependents("b").collect::<Vec<_>>(), vec!["v"]);
        g.replace_edges("v", FxHashSet::default());
        g.assert_consistent();
        assert_eq!(g.dependents("b").count(), 0);
        assert_eq!(g.derived_count(), 1);
    }

    #[test]
    fn test_topo_chain() {
        let g = DepGraph::from_variables(&[derived("c", "{b}+1"), derived("b", "{a}*2"), derived("a", "{x}")]);
        assert_eq!(g.topo_order(&no_skip()), Ok(vec!["a".to_string(), "b".to_string(), "c".to_string()]));
    }

    #[test]
    fn test_topo_diamond_stable() {
        let g = DepGraph::from_variables(&[
            derived("d", "{b}+{c}"),
            derived("c", "{a}"),
            derived("b", "{a}"),
            derived("a", "1"),
        ]);
        assert_eq!(
            g.topo_order(&no_skip()).unwrap(),
            vec!["a".to_string(), "b".to_string(), "c".to_string(), "d".to_string()]
        );
    }

    #[test]
    fn test_self_reference_is_cycle() {
        let g = DepGraph::from_variables(&[derived("v", "{v}+1"), derived("w", "{x}")]);
        assert_eq!(g.find_cycle_members(), vec!["v".to_string()]);
    }

    #[test]
    fn test_cycle_members_exclude_downstream() {
        let g = DepGraph::from_variables(&[
            derived("a", "{b}"),
            derived("b", "{a}"),
            derived("c", "{a}+1"),
        ]);
        assert_eq!(g.find_cycle_members(), vec!["a".to_string(), "b".to_string()]);
        assert!(g.topo_order(&no_skip()).is_err());

        let skip: FxHashSet<String> = g.find_cycle_members().into_iter().collect();
        assert_eq!(g.topo_order(&skip), Ok(vec!["c".to_string()]));
    }
}
