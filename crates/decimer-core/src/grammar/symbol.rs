//! SELFIES symbol splitting and parsing.

use crate::error::{DecimerError, Result};
use std::borrow::Cow;

/// Symbols whose position encodes a digit of a branch or ring length.
const INDEX_ALPHABET: [&str; 16] = [
    "[C]", "[Ring1]", "[Ring2]", "[Branch1]", "[=Branch1]", "[#Branch1]", "[Branch2]",
    "[=Branch2]", "[#Branch2]", "[O]", "[N]", "[=N]", "[=C]", "[#C]", "[S]", "[P]",
];

/// Radix of multi-symbol lengths.
pub(crate) const INDEX_BASE: usize = INDEX_ALPHABET.len();

/// Symbol skipped wherever it appears.
pub const NOP_SYMBOL: &str = "[nop]";

/// Fragment separator.
pub const DOT_SYMBOL: &str = ".";

static ELEMENTS: [&str; 118] = [
    "H", "He", "Li", "Be", "B", "C", "N", "O", "F", "Ne",
    "Na", "Mg", "Al", "Si", "P", "S", "Cl", "Ar", "K", "Ca",
    "Sc", "Ti", "V", "Cr", "Mn", "Fe", "Co", "Ni", "Cu", "Zn",
    "Ga", "Ge", "As", "Se", "Br", "Kr", "Rb", "Sr", "Y", "Zr",
    "Nb", "Mo", "Tc", "Ru", "Rh", "Pd", "Ag", "Cd", "In", "Sn",
    "Sb", "Te", "I", "Xe", "Cs", "Ba", "La", "Ce", "Pr", "Nd",
    "Pm", "Sm", "Eu", "Gd", "Tb", "Dy", "Ho", "Er", "Tm", "Yb",
    "Lu", "Hf", "Ta", "W", "Re", "Os", "Ir", "Pt", "Au", "Hg",
    "Tl", "Pb", "Bi", "Po", "At", "Rn", "Fr", "Ra", "Ac", "Th",
    "Pa", "U", "Np", "Pu", "Am", "Cm", "Bk", "Cf", "Es", "Fm",
    "Md", "No", "Lr", "Rf", "Db", "Sg", "Bh", "Hs", "Mt", "Ds",
    "Rg", "Cn", "Nh", "Fl", "Mc", "Lv", "Ts", "Og",
];

/// Bond written in front of an atom symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bond {
    /// `-` or no prefix.
    Single,
    /// `=`
    Double,
    /// `#`
    Triple,
    /// `/`
    Up,
    /// `\`
    Down,
}

impl Bond {
    fn from_prefix(c: char) -> Option<Bond> {
        match c {
            '=' => Some(Bond::Double),
            '#' => Some(Bond::Triple),
            '/' => Some(Bond::Up),
            '\\' => Some(Bond::Down),
            _ => None,
        }
    }

    /// Requested bond order.
    pub fn order(self) -> u32 {
        match self {
            Bond::Single | Bond::Up | Bond::Down => 1,
            Bond::Double => 2,
            Bond::Triple => 3,
        }
    }

    /// Directional marker of a stereo single bond.
    pub fn stereo(self) -> Option<char> {
        match self {
            Bond::Up => Some('/'),
            Bond::Down => Some('\\'),
            _ => None,
        }
    }
}

/// Atom properties carried by an atom symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtomSpec {
    /// Element symbol.
    pub element: &'static str,
    /// Mass number.
    pub isotope: Option<u32>,
    /// `@` or `@@`.
    pub chirality: Option<&'static str>,
    /// Explicit hydrogens.
    pub h_count: u32,
    /// Formal charge.
    pub charge: i32,
}

/// One parsed SELFIES symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Symbol {
    /// Adds an atom bonded to the previous one.
    Atom {
        /// Requested bond to the previous atom.
        bond: Bond,
        /// The atom.
        atom: AtomSpec,
    },
    /// Opens a side chain whose length follows in index symbols.
    Branch {
        /// Requested order of the bond into the branch.
        order: u32,
        /// Number of index symbols encoding the branch length.
        index_len: usize,
    },
    /// Closes a ring back to an earlier atom.
    Ring {
        /// Requested ring bond order.
        order: u32,
        /// Number of index symbols encoding the ring span.
        index_len: usize,
        /// Directional markers at the (earlier, current) atom.
        stereo: (Option<char>, Option<char>),
    },
    /// Empty derivation.
    Epsilon,
}

impl Symbol {
    /// Parse one bracketed symbol. Legacy spellings must be translated first.
    pub fn parse(raw: &str) -> Result<Symbol> {
        let body = raw
            .strip_prefix('[')
            .and_then(|s| s.strip_suffix(']'))
            .ok_or_else(|| invalid(raw))?;

        if body == "epsilon" {
            return Ok(Symbol::Epsilon);
        }
        if let Some((prefix, index_len)) = split_keyword(body, "Branch") {
            let order = bond_order(prefix).ok_or_else(|| invalid(raw))?;
            return Ok(Symbol::Branch { order, index_len });
        }
        if let Some((prefix, index_len)) = split_keyword(body, "Ring") {
            if let Some(order) = bond_order(prefix) {
                return Ok(Symbol::Ring {
                    order,
                    index_len,
                    stereo: (None, None),
                });
            }
            let stereo = ring_stereo(prefix).ok_or_else(|| invalid(raw))?;
            return Ok(Symbol::Ring {
                order: 1,
                index_len,
                stereo,
            });
        }

        parse_atom(body)
            .map(|(bond, atom)| Symbol::Atom { bond, atom })
            .ok_or_else(|| invalid(raw))
    }
}

fn invalid(raw: &str) -> DecimerError {
    DecimerError::Grammar(format!("invalid SELFIES symbol '{}'", raw))
}

/// `<prefix><keyword><1-3>` → (prefix, digit)
fn split_keyword<'a>(body: &'a str, keyword: &str) -> Option<(&'a str, usize)> {
    let digit = body.chars().last()?;
    let n = digit.to_digit(10).filter(|n| (1..=3).contains(n))?;
    let head = &body[..body.len() - digit.len_utf8()];
    let prefix = head.strip_suffix(keyword)?;
    Some((prefix, n as usize))
}

fn bond_order(prefix: &str) -> Option<u32> {
    match prefix {
        "" => Some(1),
        "=" => Some(2),
        "#" => Some(3),
        _ => None,
    }
}

fn ring_stereo(prefix: &str) -> Option<(Option<char>, Option<char>)> {
    let marker = |c: char| match c {
        '-' => Some(None),
        '/' | '\\' => Some(Some(c)),
        _ => None,
    };
    let mut chars = prefix.chars();
    let (left, right) = (chars.next()?, chars.next()?);
    if chars.next().is_some() {
        return None;
    }
    Some((marker(left)?, marker(right)?))
}

/// `<bond>?<isotope>?<Element><@|@@>?<H n>?<+|- n>?`
fn parse_atom(body: &str) -> Option<(Bond, AtomSpec)> {
    let mut rest = body;

    let bond = match rest.chars().next().and_then(Bond::from_prefix) {
        Some(bond) => {
            rest = &rest[1..];
            bond
        }
        None => Bond::Single,
    };

    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    let isotope = match digits {
        0 => None,
        _ => Some(rest[..digits].parse().ok()?),
    };
    rest = &rest[digits..];

    let mut chars = rest.chars();
    chars.next().filter(char::is_ascii_uppercase)?;
    let len = match chars.next() {
        Some(c) if c.is_ascii_lowercase() => 2,
        _ => 1,
    };
    let element = ELEMENTS.iter().copied().find(|e| *e == &rest[..len])?;
    rest = &rest[len..];

    let chirality = if let Some(r) = rest.strip_prefix("@@") {
        rest = r;
        Some("@@")
    } else if let Some(r) = rest.strip_prefix('@') {
        rest = r;
        Some("@")
    } else {
        None
    };

    let h_count = match rest.strip_prefix('H') {
        Some(r) => {
            let count = r.chars().next()?.to_digit(10)?;
            rest = &r[1..];
            count
        }
        None => 0,
    };

    let charge = match rest.chars().next() {
        Some(sign @ ('+' | '-')) => {
            let digits = &rest[1..];
            if digits.is_empty() || !digits.bytes().all(|b| (b'1'..=b'9').contains(&b)) {
                return None;
            }
            let magnitude: i32 = digits.parse().ok()?;
            rest = "";
            if sign == '-' {
                -magnitude
            } else {
                magnitude
            }
        }
        _ => 0,
    };

    if !rest.is_empty() {
        return None;
    }

    Some((
        bond,
        AtomSpec {
            element,
            isotope,
            chirality,
            h_count,
            charge,
        },
    ))
}

/// Split a SELFIES string into bracketed symbols and `.` separators.
pub fn split_symbols(selfies: &str) -> Result<Vec<&str>> {
    let mut symbols = Vec::new();
    let mut rest = selfies;
    while !rest.is_empty() {
        if let Some(r) = rest.strip_prefix('.') {
            symbols.push(DOT_SYMBOL);
            rest = r;
            continue;
        }
        if !rest.starts_with('[') {
            return Err(DecimerError::Grammar(format!(
                "expected '[' at '{}'",
                rest
            )));
        }
        let end = rest.find(']').ok_or_else(|| {
            DecimerError::Grammar(format!("unclosed bracket in '{}'", rest))
        })?;
        symbols.push(&rest[..=end]);
        rest = &rest[end + 1..];
    }
    Ok(symbols)
}

/// Translate a legacy spelling to the current alphabet.
///
/// `[Branch1_2]` → `[=Branch1]`, `[Expl=Ring1]` → `[=Ring1]`,
/// `[NHexpl]` → `[NH1]`, `[N+expl]` → `[N+1]`. Current symbols pass through.
pub fn modernize_symbol(symbol: &str) -> Cow<'_, str> {
    let Some(body) = symbol.strip_prefix('[').and_then(|s| s.strip_suffix(']')) else {
        return Cow::Borrowed(symbol);
    };

    if let Some(rest) = body.strip_prefix("Branch") {
        if let [n, b'_', kind] = rest.as_bytes() {
            let bond = match *kind {
                b'1' => "",
                b'2' => "=",
                b'3' => "#",
                _ => return Cow::Borrowed(symbol),
            };
            return Cow::Owned(format!("[{}Branch{}]", bond, *n as char));
        }
    }
    if let Some(ring) = body.strip_prefix("Expl") {
        return Cow::Owned(format!("[{}]", ring));
    }
    if let Some(atom) = body.strip_suffix("expl") {
        return Cow::Owned(format!("[{}]", explicit_counts(atom)));
    }
    Cow::Borrowed(symbol)
}

/// Give bare `H`, `+` and `-` after the element an explicit count of 1.
fn explicit_counts(atom: &str) -> String {
    let split = atom
        .find(|c: char| c.is_ascii_uppercase())
        .map_or(atom.len(), |i| i + 1);
    let (head, tail) = atom.split_at(split);

    let mut out = String::with_capacity(atom.len() + 2);
    out.push_str(head);
    let mut chars = tail.chars().peekable();
    while let Some(c) = chars.next() {
        out.push(c);
        let counted = matches!(chars.peek(), Some(d) if d.is_ascii_digit());
        if matches!(c, 'H' | '+' | '-') && !counted {
            out.push('1');
        }
    }
    out
}

/// Digit value of an index symbol; anything outside the alphabet is 0.
pub(crate) fn index_code(symbol: Option<&str>) -> usize {
    symbol
        .and_then(|s| INDEX_ALPHABET.iter().position(|a| *a == s))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn atom(raw: &str) -> (Bond, AtomSpec) {
        match Symbol::parse(raw).unwrap() {
            Symbol::Atom { bond, atom } => (bond, atom),
            other => panic!("expected atom, got {:?}", other),
        }
    }

    #[test]
    fn plain_atoms() {
        let (bond, spec) = atom("[C]");
        assert_eq!(bond, Bond::Single);
        assert_eq!(spec.element, "C");
        assert_eq!(spec.h_count, 0);

        let (bond, spec) = atom("[=O]");
        assert_eq!(bond, Bond::Double);
        assert_eq!(spec.element, "O");

        assert_eq!(atom("[Cl]").1.element, "Cl");
        assert_eq!(atom("[#N]").0, Bond::Triple);
        assert_eq!(atom("[/C]").0.stereo(), Some('/'));
    }

    #[test]
    fn decorated_atom() {
        let (_, spec) = atom("[13C@@H1+1]");
        assert_eq!(spec.isotope, Some(13));
        assert_eq!(spec.element, "C");
        assert_eq!(spec.chirality, Some("@@"));
        assert_eq!(spec.h_count, 1);
        assert_eq!(spec.charge, 1);

        assert_eq!(atom("[O-1]").1.charge, -1);
        assert_eq!(atom("[NH3+1]").1.h_count, 3);
    }

    #[test]
    fn branches_and_rings() {
        assert_eq!(
            Symbol::parse("[=Branch2]").unwrap(),
            Symbol::Branch {
                order: 2,
                index_len: 2
            }
        );
        assert_eq!(
            Symbol::parse("[#Ring1]").unwrap(),
            Symbol::Ring {
                order: 3,
                index_len: 1,
                stereo: (None, None)
            }
        );
        assert_eq!(
            Symbol::parse("[-/Ring2]").unwrap(),
            Symbol::Ring {
                order: 1,
                index_len: 2,
                stereo: (None, Some('/'))
            }
        );
        assert_eq!(Symbol::parse("[epsilon]").unwrap(), Symbol::Epsilon);
    }

    #[test]
    fn rejects_malformed() {
        for raw in ["[Xx]", "[c]", "[C+]", "[CH]", "[Branch4]", "[$Ring1]", "C", "[C"] {
            assert!(
                matches!(Symbol::parse(raw), Err(DecimerError::Grammar(_))),
                "{} should be rejected",
                raw
            );
        }
    }

    #[test]
    fn split_keeps_dots() {
        assert_eq!(
            split_symbols("[C][=O].[Na+1]").unwrap(),
            vec!["[C]", "[=O]", ".", "[Na+1]"]
        );
        assert!(split_symbols("").unwrap().is_empty());
        assert!(split_symbols("[C][O").is_err());
        assert!(split_symbols("[C]x[O]").is_err());
    }

    #[test]
    fn legacy_symbols() {
        assert_eq!(modernize_symbol("[Branch1_1]"), "[Branch1]");
        assert_eq!(modernize_symbol("[Branch2_3]"), "[#Branch2]");
        assert_eq!(modernize_symbol("[Expl=Ring1]"), "[=Ring1]");
        assert_eq!(modernize_symbol("[NHexpl]"), "[NH1]");
        assert_eq!(modernize_symbol("[C@@Hexpl]"), "[C@@H1]");
        assert_eq!(modernize_symbol("[NH3+expl]"), "[NH3+1]");
        assert_eq!(modernize_symbol("[=N-expl]"), "[=N-1]");
        assert_eq!(modernize_symbol("[Hexpl]"), "[H]");
        assert!(matches!(modernize_symbol("[=Branch1]"), Cow::Borrowed(_)));
    }

    #[test]
    fn index_codes() {
        assert_eq!(index_code(Some("[C]")), 0);
        assert_eq!(index_code(Some("[=Branch1]")), 4);
        assert_eq!(index_code(Some("[P]")), 15);
        assert_eq!(index_code(Some("[F]")), 0);
        assert_eq!(index_code(None), 0);
    }
}
