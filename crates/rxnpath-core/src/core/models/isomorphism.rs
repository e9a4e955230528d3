//! Graph isomorphism for small labeled graphs.
//!
//! Colour refinement (1-WL) partitions both graphs in lockstep; a graph pair
//! whose colour multisets differ is rejected immediately, otherwise a
//! backtracking search maps atoms class by class.

use std::collections::HashMap;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

#[inline]
fn fnv_mix(hash: u64, value: u64) -> u64 {
    value.to_le_bytes().iter().fold(hash, |h, byte| {
        (h ^ u64::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}

/// Node- and edge-labeled undirected graph on indices `0..n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LabeledGraph {
    labels: Vec<u64>,
    adjacency: Vec<Vec<(usize, u8)>>,
}

impl LabeledGraph {
    pub(crate) fn new(labels: Vec<u64>, edges: impl IntoIterator<Item = (usize, usize, u8)>) -> Self {
        let mut adjacency = vec![Vec::new(); labels.len()];
        for (i, j, label) in edges {
            adjacency[i].push((j, label));
            adjacency[j].push((i, label));
        }
        for neighbors in &mut adjacency {
            neighbors.sort_unstable();
        }
        Self { labels, adjacency }
    }

    #[inline]
    pub(crate) fn node_count(&self) -> usize {
        self.labels.len()
    }

    fn edge_count(&self) -> usize {
        self.adjacency.iter().map(Vec::len).sum::<usize>() / 2
    }

    fn edge_label(&self, i: usize, j: usize) -> Option<u8> {
        self.adjacency[i]
            .binary_search_by_key(&j, |(n, _)| *n)
            .ok()
            .map(|pos| self.adjacency[i][pos].1)
    }

    fn initial_colors(&self) -> Vec<u64> {
        self.labels
            .iter()
            .zip(&self.adjacency)
            .map(|(label, nbrs)| fnv_mix(fnv_mix(FNV_OFFSET, *label), nbrs.len() as u64))
            .collect()
    }

    fn refine(&self, colors: &[u64]) -> Vec<u64> {
        let mut scratch: Vec<(u64, u8)> = Vec::new();
        self.adjacency
            .iter()
            .enumerate()
            .map(|(v, nbrs)| {
                scratch.clear();
                scratch.extend(nbrs.iter().map(|(u, label)| (colors[*u], *label)));
                scratch.sort_unstable();
                scratch.iter().fold(fnv_mix(FNV_OFFSET, colors[v]), |h, (c, l)| {
                    fnv_mix(fnv_mix(h, *c), u64::from(*l))
                })
            })
            .collect()
    }

    /// Isomorphism-invariant hash of the refined colouring.
    pub(crate) fn invariant_hash(&self) -> u64 {
        let mut colors = self.initial_colors();
        let mut classes = distinct_count(&colors);
        for _ in 0..self.node_count() {
            let next = self.refine(&colors);
            let next_classes = distinct_count(&next);
            colors = next;
            if next_classes <= classes {
                break;
            }
            classes = next_classes;
        }
        let mut sorted = colors;
        sorted.sort_unstable();
        sorted
            .iter()
            .fold(fnv_mix(FNV_OFFSET, self.edge_count() as u64), |h, c| {
                fnv_mix(h, *c)
            })
    }
}

fn distinct_count(colors: &[u64]) -> usize {
    let mut sorted = colors.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    sorted.len()
}

/// Refines both graphs for the same number of rounds until the joint
/// partition stops splitting.
fn joint_refinement(a: &LabeledGraph, b: &LabeledGraph) -> (Vec<u64>, Vec<u64>) {
    let mut ca = a.initial_colors();
    let mut cb = b.initial_colors();
    let joint = |x: &[u64], y: &[u64]| {
        let mut all: Vec<u64> = x.iter().chain(y).copied().collect();
        all.sort_unstable();
        all.dedup();
        all.len()
    };
    let mut classes = joint(&ca, &cb);
    for _ in 0..a.node_count() {
        let na = a.refine(&ca);
        let nb = b.refine(&cb);
        let next_classes = joint(&na, &nb);
        ca = na;
        cb = nb;
        if next_classes <= classes {
            break;
        }
        classes = next_classes;
    }
    (ca, cb)
}

/// Finds a label- and edge-preserving bijection from `a` to `b`.
///
/// Returns `mapping` with `mapping[i]` the node of `b` matched to node `i` of `a`.
pub(crate) fn find_isomorphism(a: &LabeledGraph, b: &LabeledGraph) -> Option<Vec<usize>> {
    if a.node_count() != b.node_count() || a.edge_count() != b.edge_count() {
        return None;
    }
    let (colors_a, colors_b) = joint_refinement(a, b);

    let mut sorted_a = colors_a.clone();
    let mut sorted_b = colors_b.clone();
    sorted_a.sort_unstable();
    sorted_b.sort_unstable();
    if sorted_a != sorted_b {
        return None;
    }

    let mut classes: HashMap<u64, Vec<usize>> = HashMap::new();
    for (v, color) in colors_b.iter().enumerate() {
        classes.entry(*color).or_default().push(v);
    }

    let order = matching_order(a, &colors_a, &classes);
    let mut matcher = Matcher {
        a,
        b,
        colors_a: &colors_a,
        classes: &classes,
        order,
        mapping: vec![None; a.node_count()],
        used: vec![false; b.node_count()],
    };
    if matcher.search(0) {
        matcher.mapping.into_iter().collect()
    } else {
        None
    }
}

/// Connectivity-first ordering: each next node has the most already-ordered
/// neighbours, ties broken by the smallest colour class.
fn matching_order(a: &LabeledGraph, colors: &[u64], classes: &HashMap<u64, Vec<usize>>) -> Vec<usize> {
    let n = a.node_count();
    let class_size = |v: usize| classes.get(&colors[v]).map_or(0, Vec::len);
    let mut placed = vec![false; n];
    let mut links = vec![0usize; n];
    let mut order = Vec::with_capacity(n);

    for _ in 0..n {
        let next = (0..n)
            .filter(|v| !placed[*v])
            .min_by_key(|v| (std::cmp::Reverse(links[*v]), class_size(*v), *v));
        let Some(v) = next else { break };
        placed[v] = true;
        order.push(v);
        for (u, _) in &a.adjacency[v] {
            links[*u] += 1;
        }
    }
    order
}

struct Matcher<'g> {
    a: &'g LabeledGraph,
    b: &'g LabeledGraph,
    colors_a: &'g [u64],
    classes: &'g HashMap<u64, Vec<usize>>,
    order: Vec<usize>,
    mapping: Vec<Option<usize>>,
    used: Vec<bool>,
}

impl Matcher<'_> {
    fn search(&mut self, depth: usize) -> bool {
        if depth == self.order.len() {
            return true;
        }
        let va = self.order[depth];
        let Some(candidates) = self.classes.get(&self.colors_a[va]) else {
            return false;
        };
        for &vb in candidates {
            if self.used[vb] || !self.feasible(va, vb) {
                continue;
            }
            self.mapping[va] = Some(vb);
            self.used[vb] = true;
            if self.search(depth + 1) {
                return true;
            }
            self.mapping[va] = None;
            self.used[vb] = false;
        }
        false
    }

    fn feasible(&self, va: usize, vb: usize) -> bool {
        let mut mapped = 0;
        for (ua, label) in &self.a.adjacency[va] {
            if let Some(ub) = self.mapping[*ua] {
                mapped += 1;
                if self.b.edge_label(vb, ub) != Some(*label) {
                    return false;
                }
            }
        }
        let mapped_b = self.b.adjacency[vb]
            .iter()
            .filter(|(ub, _)| self.used[*ub])
            .count();
        mapped == mapped_b
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(labels: &[u64]) -> LabeledGraph {
        let edges = (1..labels.len()).map(|i| (i - 1, i, 0));
        LabeledGraph::new(labels.to_vec(), edges)
    }

    #[test]
    fn identical_graphs_map_onto_themselves() {
        let g = path(&[6, 6, 8]);
        let mapping = find_isomorphism(&g, &g).unwrap();
        assert_eq!(mapping, vec![0, 1, 2]);
    }

    #[test]
    fn relabeled_path_is_found() {
        let a = path(&[1, 6, 8]);
        let b = LabeledGraph::new(vec![8, 1, 6], [(1, 2, 0), (2, 0, 0)]);
        let mapping = find_isomorphism(&a, &b).unwrap();
        assert_eq!(mapping, vec![1, 2, 0]);
    }

    #[test]
    fn different_labels_are_rejected() {
        assert!(find_isomorphism(&path(&[6, 6, 8]), &path(&[6, 8, 8])).is_none());
    }

    #[test]
    fn edge_labels_must_match() {
        let a = LabeledGraph::new(vec![6, 6], [(0, 1, 0)]);
        let b = LabeledGraph::new(vec![6, 6], [(0, 1, 1)]);
        assert!(find_isomorphism(&a, &b).is_none());
    }

    #[test]
    fn regular_graphs_with_equal_colours_are_distinguished_by_search() {
        // A hexagon and two triangles are both 2-regular on six nodes.
        let hexagon = LabeledGraph::new(vec![6; 6], (0..6).map(|i| (i, (i + 1) % 6, 0)));
        let triangles = LabeledGraph::new(
            vec![6; 6],
            [(0, 1, 0), (1, 2, 0), (2, 0, 0), (3, 4, 0), (4, 5, 0), (5, 3, 0)],
        );
        assert_eq!(hexagon.invariant_hash(), triangles.invariant_hash());
        assert!(find_isomorphism(&hexagon, &triangles).is_none());
        assert!(find_isomorphism(&hexagon, &hexagon).is_some());
    }

    #[test]
    fn invariant_hash_ignores_node_numbering() {
        let a = path(&[1, 6, 8, 1]);
        let b = LabeledGraph::new(vec![8, 1, 6, 1], [(3, 0, 0), (0, 2, 0), (2, 1, 0)]);
        assert_eq!(a.invariant_hash(), b.invariant_hash());
    }
}
