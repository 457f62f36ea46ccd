//! SELFIES to SMILES conversion.
//!
//! SELFIES strings are read symbol by symbol into a molecular graph whose
//! bonds never exceed the bonding capacity chosen by a [`ValencePolicy`].
//! The graph is then written out as SMILES, one fragment per root atom,
//! joined with `.`.
//!
//! Legacy symbols such as `[Branch1_2]` or `[NHexpl]` are accepted and
//! translated before decoding.

mod constraints;
mod decoder;
mod graph;
mod smiles;
mod symbol;

pub use constraints::{ValencePolicy, FALLBACK_CAPACITY};
pub use symbol::{
    modernize_symbol, split_symbols, AtomSpec, Bond, Symbol, DOT_SYMBOL, NOP_SYMBOL,
};

use crate::error::Result;

/// Decode a SELFIES string into SMILES.
///
/// An empty string decodes to an empty SMILES. A malformed symbol fails with
/// [`crate::DecimerError::Grammar`] naming the symbol.
pub fn decode_selfies(selfies: &str, policy: ValencePolicy) -> Result<String> {
    let graph = decoder::derive_graph(selfies, policy)?;
    smiles::write_smiles(&graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DecimerError;

    fn decode(selfies: &str) -> String {
        decode_selfies(selfies, ValencePolicy::Default).unwrap()
    }

    #[test]
    fn linear_chains() {
        assert_eq!(decode("[C][C][O]"), "CCO");
        assert_eq!(decode("[C][=C][C]"), "C=CC");
        assert_eq!(decode("[C][#N]"), "C#N");
    }

    #[test]
    fn empty_string() {
        assert_eq!(decode(""), "");
    }

    #[test]
    fn bond_order_capped_by_capacity() {
        assert_eq!(decode("[F][=C]"), "FC");
        assert_eq!(decode("[O][#C]"), "O=C");
    }

    #[test]
    fn symbols_after_saturation_are_ignored() {
        assert_eq!(decode("[C][=O][=O]"), "C=O");
        assert_eq!(decode("[F][F][C][C]"), "FF");
    }

    #[test]
    fn branches() {
        assert_eq!(decode("[C][Branch1][C][F][O]"), "C(F)O");
        assert_eq!(decode("[C][=Branch1][C][=O][O]"), "C(=O)O");
        // Branch skipped when only one bond is left; index read as an atom
        assert_eq!(decode("[F][Branch1][C][Cl]"), "FCCl");
    }

    #[test]
    fn rings() {
        assert_eq!(decode("[C][C][C][Ring1][Ring1]"), "C1CC1");
        assert_eq!(
            decode("[C][=C][C][=C][C][=C][Ring1][=Branch1]"),
            "C1=CC=CC=C1"
        );
        assert_eq!(decode("[C][C][Ring1][C]"), "C=C");
    }

    #[test]
    fn ring_labels_reused() {
        assert_eq!(
            decode("[C][C][C][Ring1][Ring1][C][C][C][Ring1][Ring1]"),
            "C1CC1C1CC1"
        );
    }

    #[test]
    fn fragments() {
        assert_eq!(decode("[C].[O]"), "C.O");
        assert_eq!(decode("[Na+1].[Cl-1]"), "[Na+].[Cl-]");
        assert_eq!(decode("[C]..[O]"), "C.O");
    }

    #[test]
    fn nop_and_epsilon() {
        assert_eq!(decode("[C][nop][O]"), "CO");
        assert_eq!(decode("[epsilon][C]"), "C");
    }

    #[test]
    fn legacy_alphabet() {
        assert_eq!(decode("[C][Branch1_1][C][F][O]"), "C(F)O");
        assert_eq!(decode("[C][NHexpl][C]"), "C[NH]C");
        assert_eq!(decode("[C][=N+expl][C]"), "C=[N+]C");
    }

    #[test]
    fn policies_change_capacity() {
        assert_eq!(decode("[Cl][=O]"), "ClO");
        assert_eq!(
            decode_selfies("[Cl][=O]", ValencePolicy::Hypervalent).unwrap(),
            "Cl=O"
        );

        assert_eq!(decode("[O][=S][=O]"), "O=S=O");
        assert_eq!(
            decode_selfies("[O][=S][=O]", ValencePolicy::OctetRule).unwrap(),
            "O=S"
        );
    }

    #[test]
    fn stereo_and_chirality_survive() {
        assert_eq!(decode("[F][/C][=C][/F]"), "F/C=C/F");
        assert_eq!(decode("[C][C@@H1][Branch1][C][O][N]"), "C[C@@H](O)N");
    }

    #[test]
    fn malformed_symbol_is_named() {
        match decode_selfies("[C][Xy][O]", ValencePolicy::Default) {
            Err(DecimerError::Grammar(msg)) => assert!(msg.contains("[Xy]")),
            other => panic!("expected grammar error, got {:?}", other),
        }
        assert!(decode_selfies("[C][O", ValencePolicy::Default).is_err());
        assert!(decode_selfies("[CH5]", ValencePolicy::Default).is_err());
    }
}
