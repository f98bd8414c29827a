//! Ordering contracts by their import edges.

use std::collections::BTreeSet;

/// Directed graph over contract indices; an edge `a -> b` means `b` imports `a`.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    dependents: Vec<BTreeSet<usize>>,
}

impl DependencyGraph {
    pub fn new(nodes: usize) -> Self {
        Self {
            dependents: vec![BTreeSet::new(); nodes],
        }
    }

    pub fn len(&self) -> usize {
        self.dependents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dependents.is_empty()
    }

    /// Record that `dependent` must come after `dependency`.
    pub fn add_edge(&mut self, dependency: usize, dependent: usize) {
        self.dependents[dependency].insert(dependent);
    }

    /// Dependencies before dependents, ties broken by lowest index.
    ///
    /// On failure returns every cycle as its members sorted by index, the
    /// cycles themselves ordered by their first member.
    pub fn topological_order(&self) -> Result<Vec<usize>, Vec<Vec<usize>>> {
        let n = self.len();
        let mut in_degree = vec![0usize; n];
        for targets in &self.dependents {
            for &t in targets {
                in_degree[t] += 1;
            }
        }

        let mut ready: BTreeSet<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);
        while let Some(next) = ready.pop_first() {
            order.push(next);
            for &t in &self.dependents[next] {
                in_degree[t] -= 1;
                if in_degree[t] == 0 {
                    ready.insert(t);
                }
            }
        }

        if order.len() == n {
            Ok(order)
        } else {
            Err(self.cycles())
        }
    }

    /// Strongly connected components that form cycles, including self-loops.
    pub fn cycles(&self) -> Vec<Vec<usize>> {
        let mut tarjan = Tarjan {
            graph: self,
            index: 0,
            indices: vec![None; self.len()],
            low: vec![0; self.len()],
            stack: Vec::new(),
            on_stack: vec![false; self.len()],
            components: Vec::new(),
        };
        for node in 0..self.len() {
            if tarjan.indices[node].is_none() {
                tarjan.visit(node);
            }
        }

        let mut cycles: Vec<Vec<usize>> = tarjan
            .components
            .into_iter()
            .filter(|c| c.len() > 1 || self.dependents[c[0]].contains(&c[0]))
            .map(|mut c| {
                c.sort_unstable();
                c
            })
            .collect();
        cycles.sort();
        cycles
    }
}

struct Tarjan<'a> {
    graph: &'a DependencyGraph,
    index: usize,
    indices: Vec<Option<usize>>,
    low: Vec<usize>,
    stack: Vec<usize>,
    on_stack: Vec<bool>,
    components: Vec<Vec<usize>>,
}

impl Tarjan<'_> {
    fn visit(&mut self, node: usize) {
        self.indices[node] = Some(self.index);
        self.low[node] = self.index;
        self.index += 1;
        self.stack.push(node);
        self.on_stack[node] = true;

        for &next in &self.graph.dependents[node] {
            match self.indices[next] {
                None => {
                    self.visit(next);
                    self.low[node] = self.low[node].min(self.low[next]);
                }
                Some(idx) if self.on_stack[next] => {
                    self.low[node] = self.low[node].min(idx);
                }
                Some(_) => {}
            }
        }

        if Some(self.low[node]) == self.indices[node] {
            let mut component = Vec::new();
            while let Some(member) = self.stack.pop() {
                self.on_stack[member] = false;
                component.push(member);
                if member == node {
                    break;
                }
            }
            self.components.push(component);
        }
    }
}
