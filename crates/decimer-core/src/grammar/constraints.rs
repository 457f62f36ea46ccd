//! Bonding capacities per element and charge.

use crate::error::{DecimerError, Result};
use std::fmt;
use std::str::FromStr;

/// (element, formal charge, bonding capacity)
type CapacityTable = &'static [(&'static str, i32, u32)];

const BASE_CAPACITIES: CapacityTable = &[
    ("H", 0, 1),
    ("F", 0, 1),
    ("Cl", 0, 1),
    ("Br", 0, 1),
    ("I", 0, 1),
    ("B", 0, 3),
    ("B", 1, 2),
    ("B", -1, 4),
    ("O", 0, 2),
    ("O", 1, 3),
    ("O", -1, 1),
    ("N", 0, 3),
    ("N", 1, 4),
    ("N", -1, 2),
    ("C", 0, 4),
    ("C", 1, 3),
    ("C", -1, 3),
    ("P", 0, 5),
    ("P", 1, 4),
    ("P", -1, 6),
    ("S", 0, 6),
    ("S", 1, 5),
    ("S", -1, 5),
];

const OCTET_RULE_CAPACITIES: CapacityTable = &[
    ("S", 0, 2),
    ("S", 1, 3),
    ("S", -1, 1),
    ("P", 0, 3),
    ("P", 1, 4),
    ("P", -1, 2),
];

const HYPERVALENT_CAPACITIES: CapacityTable = &[
    ("Cl", 0, 7),
    ("Br", 0, 7),
    ("I", 0, 7),
    ("N", 0, 5),
];

/// Capacity of any element/charge pair missing from the tables.
pub const FALLBACK_CAPACITY: u32 = 8;

/// Valence constraint set used while deriving a molecule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ValencePolicy {
    /// Common valences: S 6, P 5, N 3, halogens 1.
    #[default]
    Default,
    /// Octet rule for sulfur and phosphorus.
    OctetRule,
    /// Hypervalent halogens (7) and nitrogen (5).
    Hypervalent,
}

impl ValencePolicy {
    /// Name used on the command line and in configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            ValencePolicy::Default => "default",
            ValencePolicy::OctetRule => "octet_rule",
            ValencePolicy::Hypervalent => "hypervalent",
        }
    }

    fn overrides(&self) -> CapacityTable {
        match self {
            ValencePolicy::Default => &[],
            ValencePolicy::OctetRule => OCTET_RULE_CAPACITIES,
            ValencePolicy::Hypervalent => HYPERVALENT_CAPACITIES,
        }
    }

    /// Maximum total bond order an atom may carry, before hydrogens.
    pub fn bonding_capacity(&self, element: &str, charge: i32) -> u32 {
        lookup(self.overrides(), element, charge)
            .or_else(|| lookup(BASE_CAPACITIES, element, charge))
            .unwrap_or(FALLBACK_CAPACITY)
    }
}

fn lookup(table: CapacityTable, element: &str, charge: i32) -> Option<u32> {
    table
        .iter()
        .find(|(e, c, _)| *e == element && *c == charge)
        .map(|&(_, _, capacity)| capacity)
}

impl fmt::Display for ValencePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValencePolicy {
    type Err = DecimerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "default" => Ok(ValencePolicy::Default),
            "octet_rule" => Ok(ValencePolicy::OctetRule),
            "hypervalent" => Ok(ValencePolicy::Hypervalent),
            other => Err(DecimerError::Config(format!(
                "unknown valence policy '{}', expected default, octet_rule or hypervalent",
                other
            ))),
        }
    }
}
