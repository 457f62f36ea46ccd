//! SMILES output for a derived molecular graph.

use super::graph::{Edge, MolGraph};
use super::symbol::AtomSpec;
use crate::error::{DecimerError, Result};
use std::collections::HashMap;

/// Elements written without brackets when they carry no extra properties.
const ORGANIC_SUBSET: [&str; 10] = ["B", "C", "N", "O", "P", "S", "F", "Cl", "Br", "I"];

/// Highest ring-closure label SMILES can express.
const MAX_RING_LABEL: usize = 99;

pub(crate) fn write_smiles(graph: &MolGraph) -> Result<String> {
    let mut writer = SmilesWriter {
        graph,
        out: String::new(),
        open_rings: HashMap::new(),
        // Label 0 is never handed out
        labels_in_use: vec![true],
    };
    for (i, &root) in graph.roots().iter().enumerate() {
        if i > 0 {
            writer.out.push('.');
        }
        writer.write_node(root)?;
    }
    Ok(writer.out)
}

struct SmilesWriter<'a> {
    graph: &'a MolGraph,
    out: String,
    /// Ring bonds opened but not yet closed, keyed by (lower, higher) atom.
    open_rings: HashMap<(usize, usize), usize>,
    labels_in_use: Vec<bool>,
}

impl SmilesWriter<'_> {
    fn write_node(&mut self, node: usize) -> Result<()> {
        let graph = self.graph;
        write_atom(&graph.atom(node).spec, &mut self.out);

        let (rings, chain): (Vec<&Edge>, Vec<&Edge>) =
            graph.edges(node).iter().partition(|e| e.ring);

        for edge in rings {
            write_bond(edge, &mut self.out);
            let label = self.ring_label(node, edge.dst);
            self.out.push_str(&format_ring_label(label)?);
        }

        let last = chain.len().saturating_sub(1);
        for (i, edge) in chain.into_iter().enumerate() {
            let branch = i < last;
            if branch {
                self.out.push('(');
            }
            write_bond(edge, &mut self.out);
            self.write_node(edge.dst)?;
            if branch {
                self.out.push(')');
            }
        }
        Ok(())
    }

    /// Label of the ring bond between `a` and `b`: the one it was opened
    /// with, or the lowest free label when opening it.
    fn ring_label(&mut self, a: usize, b: usize) -> usize {
        let key = (a.min(b), a.max(b));
        if let Some(label) = self.open_rings.remove(&key) {
            self.labels_in_use[label] = false;
            return label;
        }
        let label = match self.labels_in_use.iter().position(|used| !used) {
            Some(label) => label,
            None => {
                self.labels_in_use.push(false);
                self.labels_in_use.len() - 1
            }
        };
        self.labels_in_use[label] = true;
        self.open_rings.insert(key, label);
        label
    }
}

fn format_ring_label(label: usize) -> Result<String> {
    match label {
        1..=9 => Ok(label.to_string()),
        10..=MAX_RING_LABEL => Ok(format!("%{}", label)),
        _ => Err(DecimerError::Grammar(format!(
            "more than {} rings open at once",
            MAX_RING_LABEL
        ))),
    }
}

fn write_bond(edge: &Edge, out: &mut String) {
    match edge.order {
        1 => {
            if let Some(stereo) = edge.stereo {
                out.push(stereo);
            }
        }
        2 => out.push('='),
        _ => out.push('#'),
    }
}

fn write_atom(atom: &AtomSpec, out: &mut String) {
    let bare = atom.isotope.is_none()
        && atom.chirality.is_none()
        && atom.h_count == 0
        && atom.charge == 0
        && ORGANIC_SUBSET.contains(&atom.element);
    if bare {
        out.push_str(atom.element);
        return;
    }

    out.push('[');
    if let Some(isotope) = atom.isotope {
        out.push_str(&isotope.to_string());
    }
    out.push_str(atom.element);
    if let Some(chirality) = atom.chirality {
        out.push_str(chirality);
    }
    match atom.h_count {
        0 => {}
        1 => out.push('H'),
        n => {
            out.push('H');
            out.push_str(&n.to_string());
        }
    }
    match atom.charge {
        0 => {}
        1 => out.push('+'),
        -1 => out.push('-'),
        c => out.push_str(&format!("{:+}", c)),
    }
    out.push(']');
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(element: &'static str) -> AtomSpec {
        AtomSpec {
            element,
            isotope: None,
            chirality: None,
            h_count: 0,
            charge: 0,
        }
    }

    fn atom_text(atom: AtomSpec) -> String {
        let mut out = String::new();
        write_atom(&atom, &mut out);
        out
    }

    #[test]
    fn organic_subset_is_bare() {
        assert_eq!(atom_text(spec("C")), "C");
        assert_eq!(atom_text(spec("Cl")), "Cl");
        assert_eq!(atom_text(spec("Na")), "[Na]");
        assert_eq!(atom_text(spec("H")), "[H]");
    }

    #[test]
    fn bracket_atoms() {
        let atom = AtomSpec {
            isotope: Some(13),
            chirality: Some("@"),
            h_count: 1,
            ..spec("C")
        };
        assert_eq!(atom_text(atom), "[13C@H]");

        let atom = AtomSpec {
            h_count: 3,
            charge: 1,
            ..spec("N")
        };
        assert_eq!(atom_text(atom), "[NH3+]");

        let atom = AtomSpec {
            charge: -2,
            ..spec("O")
        };
        assert_eq!(atom_text(atom), "[O-2]");
    }

    #[test]
    fn ring_labels() {
        assert_eq!(format_ring_label(1).unwrap(), "1");
        assert_eq!(format_ring_label(9).unwrap(), "9");
        assert_eq!(format_ring_label(12).unwrap(), "%12");
        assert!(format_ring_label(100).is_err());
    }

    #[test]
    fn labels_are_reused_after_closing() {
        let graph = MolGraph::default();
        let mut writer = SmilesWriter {
            graph: &graph,
            out: String::new(),
            open_rings: HashMap::new(),
            labels_in_use: vec![true],
        };
        assert_eq!(writer.ring_label(0, 3), 1);
        assert_eq!(writer.ring_label(1, 5), 2);
        assert_eq!(writer.ring_label(3, 0), 1);
        assert_eq!(writer.ring_label(4, 7), 1);
    }
}
