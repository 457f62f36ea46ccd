//! Molecular graph assembled during derivation.

use super::symbol::AtomSpec;

#[derive(Debug, Clone)]
pub(crate) struct GraphAtom {
    pub spec: AtomSpec,
    /// Bonding capacity left after explicit hydrogens.
    pub capacity: u32,
}

/// Outgoing bond. Chain bonds are stored on the parent only, ring bonds on
/// both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Edge {
    pub dst: usize,
    pub order: u32,
    pub stereo: Option<char>,
    pub ring: bool,
}

#[derive(Debug, Default)]
pub(crate) struct MolGraph {
    atoms: Vec<GraphAtom>,
    adjacency: Vec<Vec<Edge>>,
    /// Sum of bond orders per atom.
    bond_counts: Vec<u32>,
    roots: Vec<usize>,
}

impl MolGraph {
    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn atom(&self, idx: usize) -> &GraphAtom {
        &self.atoms[idx]
    }

    pub fn edges(&self, idx: usize) -> &[Edge] {
        &self.adjacency[idx]
    }

    /// First atom of every fragment, in derivation order.
    pub fn roots(&self) -> &[usize] {
        &self.roots
    }

    pub fn add_atom(&mut self, spec: AtomSpec, capacity: u32, root: bool) -> usize {
        let idx = self.atoms.len();
        self.atoms.push(GraphAtom { spec, capacity });
        self.adjacency.push(Vec::new());
        self.bond_counts.push(0);
        if root {
            self.roots.push(idx);
        }
        idx
    }

    pub fn add_bond(&mut self, src: usize, dst: usize, order: u32, stereo: Option<char>) {
        self.adjacency[src].push(Edge {
            dst,
            order,
            stereo,
            ring: false,
        });
        self.bond_counts[src] += order;
        self.bond_counts[dst] += order;
    }

    /// Insert a ring bond at the given positions of both adjacency lists.
    pub fn add_ring_bond(
        &mut self,
        (a, a_pos): (usize, usize),
        (b, b_pos): (usize, usize),
        order: u32,
        (a_stereo, b_stereo): (Option<char>, Option<char>),
    ) {
        let a_pos = a_pos.min(self.adjacency[a].len());
        self.adjacency[a].insert(
            a_pos,
            Edge {
                dst: b,
                order,
                stereo: a_stereo,
                ring: true,
            },
        );
        let b_pos = b_pos.min(self.adjacency[b].len());
        self.adjacency[b].insert(
            b_pos,
            Edge {
                dst: a,
                order,
                stereo: b_stereo,
                ring: true,
            },
        );
        self.bond_counts[a] += order;
        self.bond_counts[b] += order;
    }

    /// Order of the bond between `a` and `b`, in either direction.
    pub fn bond_order(&self, a: usize, b: usize) -> Option<u32> {
        let find = |src: usize, dst: usize| {
            self.adjacency[src]
                .iter()
                .find(|e| e.dst == dst)
                .map(|e| e.order)
        };
        find(a, b).or_else(|| find(b, a))
    }

    /// Change the order of an existing bond, keeping bond counts in step.
    pub fn set_bond_order(&mut self, a: usize, b: usize, order: u32) {
        let Some(old) = self.bond_order(a, b) else {
            return;
        };
        for (src, dst) in [(a, b), (b, a)] {
            for edge in self.adjacency[src].iter_mut().filter(|e| e.dst == dst) {
                edge.order = order;
            }
        }
        self.bond_counts[a] = self.bond_counts[a] + order - old;
        self.bond_counts[b] = self.bond_counts[b] + order - old;
    }

    /// Capacity not yet used by bonds.
    pub fn free_capacity(&self, idx: usize) -> u32 {
        self.atoms[idx].capacity.saturating_sub(self.bond_counts[idx])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn carbon() -> AtomSpec {
        AtomSpec {
            element: "C",
            isotope: None,
            chirality: None,
            h_count: 0,
            charge: 0,
        }
    }

    #[test]
    fn capacity_tracks_bonds() {
        let mut graph = MolGraph::default();
        let a = graph.add_atom(carbon(), 4, true);
        let b = graph.add_atom(carbon(), 4, false);
        graph.add_bond(a, b, 2, None);

        assert_eq!(graph.free_capacity(a), 2);
        assert_eq!(graph.bond_order(b, a), Some(2));
        assert_eq!(graph.roots(), &[a]);

        graph.set_bond_order(a, b, 3);
        assert_eq!(graph.free_capacity(a), 1);
        assert_eq!(graph.free_capacity(b), 1);
    }

    #[test]
    fn ring_bonds_are_stored_on_both_ends() {
        let mut graph = MolGraph::default();
        let a = graph.add_atom(carbon(), 4, true);
        let b = graph.add_atom(carbon(), 4, false);
        let c = graph.add_atom(carbon(), 4, false);
        graph.add_bond(a, b, 1, None);
        graph.add_bond(b, c, 1, None);
        graph.add_ring_bond((a, 0), (c, 0), 1, (None, None));

        assert!(graph.edges(a)[0].ring);
        assert_eq!(graph.edges(a)[1].dst, b);
        assert_eq!(graph.edges(c)[0].dst, a);
        assert_eq!(graph.free_capacity(a), 2);
        assert_eq!(graph.free_capacity(c), 2);
    }
}
