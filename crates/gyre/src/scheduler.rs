//! Greedy feedback-arc-minimizing vertex ordering.
//!
//! A flattened netlist without processes or logic loops always admits a
//! topological order, but interdependencies between processes or module
//! instances can create strongly connected components without making
//! evaluation nondeterministic. To support such benign SCCs the graph is
//! ordered with the Eades, Lin and Smyth heuristic ("A Fast Effective
//! Heuristic For The Feedback Arc Set Problem", Information Processing
//! Letters Vol. 47, 1993): when the sorted graph has no feedback arcs,
//! eval() converges without delta cycles.
//!
//! Vertices live in an arena; the sources, sinks, and per-delta buckets
//! are intrusive circular doubly-linked lists threaded through the arena
//! with a sentinel record per list, so relinking is O(1) and ties break
//! first-in first-out.

use std::collections::{BTreeMap, BTreeSet};

const NONE: usize = usize::MAX;

#[derive(Debug)]
struct Vertex {
    prev: usize,
    next: usize,
    preds: BTreeSet<usize>,
    succs: BTreeSet<usize>,
}

impl Vertex {
    fn unlinked() -> Self {
        Vertex { prev: NONE, next: NONE, preds: BTreeSet::new(), succs: BTreeSet::new() }
    }

    fn delta(&self) -> i64 {
        self.succs.len() as i64 - self.preds.len() as i64
    }
}

#[derive(Debug)]
pub struct Scheduler {
    verts: Vec<Vertex>,
    count: usize,
    sources: usize,
    sinks: usize,
    bins: BTreeMap<i64, usize>,
}

impl Scheduler {
    pub fn new() -> Self {
        let mut scheduler = Scheduler {
            verts: Vec::new(),
            count: 0,
            sources: 0,
            sinks: 0,
            bins: BTreeMap::new(),
        };
        scheduler.sources = scheduler.alloc_sentinel();
        scheduler.sinks = scheduler.alloc_sentinel();
        scheduler
    }

    fn alloc_sentinel(&mut self) -> usize {
        let idx = self.verts.len();
        self.verts.push(Vertex { prev: idx, next: idx, preds: BTreeSet::new(), succs: BTreeSet::new() });
        idx
    }

    /// Adds a vertex; indices are dense and count from zero in insertion
    /// order, interleaved with internal sentinels, so callers must use
    /// the returned index rather than assume contiguity.
    pub fn add_vertex(&mut self) -> usize {
        let idx = self.verts.len();
        self.verts.push(Vertex::unlinked());
        self.count += 1;
        idx
    }

    pub fn add_edge(&mut self, pred: usize, succ: usize) {
        self.verts[pred].succs.insert(succ);
        self.verts[succ].preds.insert(pred);
    }

    fn list_empty(&self, sentinel: usize) -> bool {
        self.verts[sentinel].next == sentinel
    }

    fn link(&mut self, vertex: usize, sentinel: usize) {
        debug_assert_eq!(self.verts[vertex].prev, NONE);
        debug_assert_eq!(self.verts[vertex].next, NONE);
        let tail = self.verts[sentinel].prev;
        self.verts[vertex].next = sentinel;
        self.verts[vertex].prev = tail;
        self.verts[tail].next = vertex;
        self.verts[sentinel].prev = vertex;
    }

    fn unlink(&mut self, vertex: usize) {
        let (prev, next) = (self.verts[vertex].prev, self.verts[vertex].next);
        debug_assert_eq!(self.verts[prev].next, vertex);
        debug_assert_eq!(self.verts[next].prev, vertex);
        self.verts[prev].next = next;
        self.verts[next].prev = prev;
        self.verts[vertex].prev = NONE;
        self.verts[vertex].next = NONE;
    }

    fn relink(&mut self, vertex: usize) {
        if self.verts[vertex].succs.is_empty() {
            let sinks = self.sinks;
            self.link(vertex, sinks);
        } else if self.verts[vertex].preds.is_empty() {
            let sources = self.sources;
            self.link(vertex, sources);
        } else {
            let delta = self.verts[vertex].delta();
            let sentinel = match self.bins.get(&delta).copied() {
                Some(s) => s,
                None => {
                    let s = self.alloc_sentinel();
                    self.bins.insert(delta, s);
                    s
                }
            };
            self.link(vertex, sentinel);
        }
    }

    fn remove(&mut self, vertex: usize) -> usize {
        self.unlink(vertex);
        let preds: Vec<usize> = self.verts[vertex].preds.iter().copied().collect();
        for pred in preds {
            if pred == vertex {
                continue;
            }
            debug_assert!(self.verts[pred].succs.contains(&vertex));
            self.unlink(pred);
            self.verts[pred].succs.remove(&vertex);
            self.relink(pred);
        }
        let succs: Vec<usize> = self.verts[vertex].succs.iter().copied().collect();
        for succ in succs {
            if succ == vertex {
                continue;
            }
            debug_assert!(self.verts[succ].preds.contains(&vertex));
            self.unlink(succ);
            self.verts[succ].preds.remove(&vertex);
            self.relink(succ);
        }
        self.verts[vertex].preds.clear();
        self.verts[vertex].succs.clear();
        vertex
    }

    /// Consumes the graph and returns a linear order of every vertex
    /// that minimizes feedback edges: `s1 ++ reverse(s2r)`, with sinks
    /// drained into `s2r`, sources into `s1`, and otherwise the front
    /// vertex of the greatest-delta bucket into `s1`.
    pub fn schedule(&mut self) -> Vec<usize> {
        let mut s1 = Vec::with_capacity(self.count);
        let mut s2r = Vec::new();
        let real: Vec<usize> = (0..self.verts.len())
            .filter(|&v| v != self.sources && v != self.sinks && !self.bins.values().any(|&s| s == v))
            .collect();
        for vertex in real {
            self.relink(vertex);
        }
        let mut bins_empty = false;
        while !(self.list_empty(self.sinks) && self.list_empty(self.sources) && bins_empty) {
            while !self.list_empty(self.sinks) {
                let front = self.verts[self.sinks].next;
                s2r.push(self.remove(front));
            }
            while !self.list_empty(self.sources) {
                let front = self.verts[self.sources].next;
                s1.push(self.remove(front));
            }
            // The paper handwaves an O(1) find-max structure; a linear
            // scan over the ordered bucket keys is deliberate here.
            bins_empty = true;
            let deltas: Vec<i64> = self.bins.keys().rev().copied().collect();
            for delta in deltas {
                let sentinel = self.bins[&delta];
                if !self.list_empty(sentinel) {
                    bins_empty = false;
                    let front = self.verts[sentinel].next;
                    s1.push(self.remove(front));
                    break;
                }
            }
        }
        s1.extend(s2r.into_iter().rev());
        s1
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Scheduler::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn positions(order: &[usize]) -> BTreeMap<usize, usize> {
        order.iter().enumerate().map(|(pos, &v)| (v, pos)).collect()
    }

    #[test]
    fn chain_keeps_order() {
        let mut sched = Scheduler::new();
        let a = sched.add_vertex();
        let b = sched.add_vertex();
        let c = sched.add_vertex();
        sched.add_edge(a, b);
        sched.add_edge(b, c);
        let order = sched.schedule();
        let pos = positions(&order);
        assert!(pos[&a] < pos[&b]);
        assert!(pos[&b] < pos[&c]);
    }

    #[test]
    fn two_cycle_has_single_feedback_arc() {
        let mut sched = Scheduler::new();
        let a = sched.add_vertex();
        let b = sched.add_vertex();
        sched.add_edge(a, b);
        sched.add_edge(b, a);
        let order = sched.schedule();
        assert_eq!(order.len(), 2);
    }

    #[test]
    fn self_loop_is_tolerated() {
        let mut sched = Scheduler::new();
        let a = sched.add_vertex();
        sched.add_edge(a, a);
        assert_eq!(sched.schedule(), vec![a]);
    }

    #[test]
    fn diamond_is_acyclic_in_order() {
        let mut sched = Scheduler::new();
        let a = sched.add_vertex();
        let b = sched.add_vertex();
        let c = sched.add_vertex();
        let d = sched.add_vertex();
        sched.add_edge(a, b);
        sched.add_edge(a, c);
        sched.add_edge(b, d);
        sched.add_edge(c, d);
        let order = sched.schedule();
        let pos = positions(&order);
        assert!(pos[&a] < pos[&b] && pos[&a] < pos[&c]);
        assert!(pos[&b] < pos[&d] && pos[&c] < pos[&d]);
    }
}
