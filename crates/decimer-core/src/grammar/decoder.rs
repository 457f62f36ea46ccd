//! Derivation of a molecular graph from SELFIES symbols.
//!
//! Each symbol is read against the bonding capacity still available on the
//! previous atom (the derivation state). Atoms take as much of the requested
//! bond order as both ends allow, branches recurse with part of the state,
//! and rings are queued and closed once every fragment has been read.

use super::constraints::ValencePolicy;
use super::graph::MolGraph;
use super::symbol::{
    index_code, modernize_symbol, split_symbols, Symbol, DOT_SYMBOL, INDEX_BASE, NOP_SYMBOL,
};
use crate::error::{DecimerError, Result};

/// Symbols of one fragment, legacy spellings translated and `[nop]` removed.
struct SymbolStream {
    symbols: Vec<String>,
    pos: usize,
}

impl SymbolStream {
    fn new(fragment: &[&str]) -> Self {
        let symbols = fragment
            .iter()
            .filter(|s| **s != NOP_SYMBOL)
            .map(|s| modernize_symbol(s).into_owned())
            .collect();
        Self { symbols, pos: 0 }
    }

    fn next(&mut self) -> Option<&str> {
        let symbol = self.symbols.get(self.pos)?;
        self.pos += 1;
        Some(symbol.as_str())
    }

    /// Read a base-16 number from the next `len` symbols, most significant
    /// first. Missing symbols count as 0.
    fn read_index(&mut self, len: usize) -> usize {
        (0..len).fold(0, |acc, _| acc * INDEX_BASE + index_code(self.next()))
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingRing {
    left: usize,
    right: usize,
    order: u32,
    stereo: (Option<char>, Option<char>),
}

struct Derivation {
    policy: ValencePolicy,
    graph: MolGraph,
    rings: Vec<PendingRing>,
}

/// Derivation state after a symbol: `None` ends the current (sub)derivation.
fn remaining(capacity: u32) -> Option<u32> {
    (capacity > 0).then_some(capacity)
}

impl Derivation {
    fn new(policy: ValencePolicy) -> Self {
        Self {
            policy,
            graph: MolGraph::default(),
            rings: Vec::new(),
        }
    }

    /// Derive from `stream` starting with `init_state` free bonds on `root`.
    ///
    /// Consumes at most `max_derive` symbols (unbounded when `None`),
    /// including the ones skipped after capacity runs out. Returns the number
    /// consumed.
    fn derive(
        &mut self,
        stream: &mut SymbolStream,
        max_derive: Option<usize>,
        init_state: u32,
        root: Option<usize>,
    ) -> Result<usize> {
        let within = |n: usize| max_derive.map_or(true, |max| n < max);
        let mut consumed = 0;
        let mut state = Some(init_state);
        let mut prev = root;

        while let Some(current) = state {
            if !within(consumed) {
                break;
            }
            let Some(raw) = stream.next() else {
                break;
            };
            let raw = raw.to_string();
            consumed += 1;

            state = match Symbol::parse(&raw)? {
                Symbol::Branch { order, index_len } => {
                    if current <= 1 {
                        Some(current)
                    } else {
                        let branch_state = (current - 1).min(order);
                        let len = stream.read_index(index_len);
                        consumed += index_len;
                        consumed += self.derive(stream, Some(len + 1), branch_state, prev)?;
                        Some(current - branch_state)
                    }
                }
                Symbol::Ring {
                    order,
                    index_len,
                    stereo,
                } => {
                    if current == 0 {
                        Some(0)
                    } else {
                        let order = current.min(order);
                        let span = stream.read_index(index_len);
                        consumed += index_len;
                        let right = attached_to(prev, &raw)?;
                        self.rings.push(PendingRing {
                            left: right.saturating_sub(span + 1),
                            right,
                            order,
                            stereo,
                        });
                        remaining(current - order)
                    }
                }
                Symbol::Epsilon => (current == 0).then_some(0),
                Symbol::Atom { bond, atom } => {
                    let capacity = i64::from(self.policy.bonding_capacity(atom.element, atom.charge))
                        - i64::from(atom.h_count);
                    let capacity = u32::try_from(capacity).map_err(|_| {
                        DecimerError::Grammar(format!("too many hydrogens in '{}'", raw))
                    })?;

                    if current == 0 {
                        prev = Some(self.graph.add_atom(atom, capacity, true));
                        remaining(capacity)
                    } else if capacity == 0 {
                        // Saturated atoms cannot attach; the state carries on
                        Some(current)
                    } else {
                        let parent = attached_to(prev, &raw)?;
                        let order = bond.order().min(current).min(capacity);
                        let idx = self.graph.add_atom(atom, capacity, false);
                        self.graph.add_bond(parent, idx, order, bond.stereo());
                        prev = Some(idx);
                        remaining(capacity - order)
                    }
                }
            };
        }

        while within(consumed) && stream.next().is_some() {
            consumed += 1;
        }
        Ok(consumed)
    }

    /// Form queued ring bonds, limited by the free capacity of both atoms.
    fn close_rings(&mut self) {
        let mut made = vec![0usize; self.graph.len()];
        for ring in std::mem::take(&mut self.rings) {
            let (left, right) = (ring.left, ring.right);
            if left == right {
                continue;
            }
            let free = self
                .graph
                .free_capacity(left)
                .min(self.graph.free_capacity(right));
            if free == 0 {
                continue;
            }
            let order = ring.order.min(free);

            match self.graph.bond_order(left, right) {
                Some(existing) => self.graph.set_bond_order(left, right, (existing + order).min(3)),
                None => {
                    // Ring closures come right after the atom in SMILES
                    self.graph.add_ring_bond(
                        (left, made[left]),
                        (right, made[right]),
                        order,
                        ring.stereo,
                    );
                    made[left] += 1;
                    made[right] += 1;
                }
            }
        }
    }
}

fn attached_to(prev: Option<usize>, raw: &str) -> Result<usize> {
    prev.ok_or_else(|| DecimerError::Grammar(format!("'{}' has no atom to bond to", raw)))
}

/// Build the molecular graph of a SELFIES string.
pub(crate) fn derive_graph(selfies: &str, policy: ValencePolicy) -> Result<MolGraph> {
    let symbols = split_symbols(selfies)?;
    let mut derivation = Derivation::new(policy);

    for fragment in symbols.split(|s| *s == DOT_SYMBOL) {
        let mut stream = SymbolStream::new(fragment);
        derivation.derive(&mut stream, None, 0, None)?;
    }
    let rings = derivation.rings.len();
    derivation.close_rings();

    tracing::trace!(
        symbols = symbols.len(),
        atoms = derivation.graph.len(),
        rings,
        "derived molecular graph"
    );
    Ok(derivation.graph)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_reads_most_significant_first() {
        let mut stream = SymbolStream::new(&["[Ring1]", "[=Branch1]", "[C]"]);
        assert_eq!(stream.read_index(2), 16 + 4);
        assert_eq!(stream.next(), Some("[C]"));
        assert_eq!(stream.read_index(2), 0);
    }

    #[test]
    fn nop_and_legacy_are_normalised() {
        let mut stream = SymbolStream::new(&["[C]", "[nop]", "[Branch1_2]"]);
        assert_eq!(stream.next(), Some("[C]"));
        assert_eq!(stream.next(), Some("[=Branch1]"));
        assert_eq!(stream.next(), None);
    }

    #[test]
    fn chain_graph() {
        let graph = derive_graph("[C][=C][C]", ValencePolicy::Default).unwrap();
        assert_eq!(graph.len(), 3);
        assert_eq!(graph.bond_order(0, 1), Some(2));
        assert_eq!(graph.bond_order(1, 2), Some(1));
        assert_eq!(graph.free_capacity(2), 3);
    }

    #[test]
    fn ring_onto_bonded_atom_raises_order() {
        let graph = derive_graph("[C][C][Ring1][C]", ValencePolicy::Default).unwrap();
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.bond_order(0, 1), Some(2));
    }

    #[test]
    fn ring_limited_by_free_capacity() {
        // Oxygen ends with one free bond, so a requested double closure is single
        let graph = derive_graph("[C][C][O][=Ring1][Ring1]", ValencePolicy::Default).unwrap();
        assert_eq!(graph.bond_order(0, 2), Some(1));
        assert_eq!(graph.free_capacity(2), 0);
    }

    #[test]
    fn branch_length_bounds_recursion() {
        // [Branch1][Ring1]: branch of two symbols
        let graph = derive_graph("[C][Branch1][Ring1][C][C][O]", ValencePolicy::Default).unwrap();
        assert_eq!(graph.len(), 4);
        assert_eq!(graph.edges(0).len(), 2);
        assert_eq!(graph.edges(0)[1].dst, 3);
    }

    #[test]
    fn saturated_atom_is_skipped() {
        let graph = derive_graph("[C][CH4][O]", ValencePolicy::Default).unwrap();
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.atom(1).spec.element, "O");
    }
}
