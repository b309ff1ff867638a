//! Mnemonic matching primitives for SCPI command paths.
//!
//! SCPI mnemonics are written in mixed case: the uppercase letters form the
//! short form the instrument accepts (`MEASure` → `MEAS`), while the full text
//! is also accepted. Repeated mnemonics carry a numeric cardinality suffix
//! (`CHANnel2`) constrained by the grammar to an inclusive range.
//!
//! Everything here is pure and stateless; the autocomplete engine composes
//! these helpers while walking the command tree.

use std::cmp::Ordering;

use once_cell::sync::Lazy;
use regex::Regex;
use sclipi_types::MnemonicNode;

fn trailing_digits() -> &'static Regex {
    static TRAILING_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+$").expect("valid trailing digits pattern"));
    &TRAILING_DIGITS
}

fn leading_alpha() -> &'static Regex {
    static LEADING_ALPHA: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-zA-Z]+").expect("valid leading alpha pattern"));
    &LEADING_ALPHA
}

/// Extract the trailing run of digits of `segment` as a cardinality.
///
/// Returns `None` when the segment does not end in a digit (including
/// segments ending in `?`) or when the digits overflow `u32`.
pub fn cardinality_of(segment: &str) -> Option<u32> {
    trailing_digits()
        .find(segment)
        .and_then(|digits| digits.as_str().parse().ok())
}

/// Whether `segment` ends in digits, whether or not they fit a cardinality.
pub fn has_cardinality(segment: &str) -> bool {
    trailing_digits().is_match(segment)
}

/// Leading alphabetic run of `segment`, keeping a trailing `?` when present.
///
/// `CHAN12?` → `CHAN?`, `12` → empty.
pub fn strip_cardinality(segment: &str) -> String {
    match leading_alpha().find(segment) {
        Some(alpha) if segment.ends_with('?') => format!("{}?", alpha.as_str()),
        Some(alpha) => alpha.as_str().to_string(),
        None => String::new(),
    }
}

/// The instrument short form: every lowercase ASCII letter removed.
pub fn short_mnemonic(text: &str) -> String {
    text.chars().filter(|c| !c.is_ascii_lowercase()).collect()
}

/// Whether `candidate` spells the node's mnemonic in full or short form.
pub fn names_mnemonic(node: &MnemonicNode, candidate: &str) -> bool {
    candidate.eq_ignore_ascii_case(&node.text) || candidate.eq_ignore_ascii_case(&short_mnemonic(&node.text))
}

/// Whether a fully typed path segment selects `node`.
///
/// Unsuffixed nodes reject any cardinality. Suffixed nodes accept an in-range
/// cardinality or none at all, since the suffix may be omitted. Digits too
/// large for a cardinality are out of every range.
pub fn matches(node: &MnemonicNode, segment: &str) -> bool {
    let explicit = has_cardinality(segment);
    if !node.suffixed {
        return !explicit && names_mnemonic(node, segment);
    }

    let bare = strip_cardinality(segment);
    if !explicit {
        return names_mnemonic(node, &bare);
    }
    cardinality_of(segment).is_some_and(|value| (node.start..=node.stop).contains(&value))
        && names_mnemonic(node, &bare)
}

/// Case-insensitive prefix test used to filter candidates while typing.
pub fn starts_with_ignore_case(text: &str, prefix: &str) -> bool {
    text.len() >= prefix.len()
        && text
            .as_bytes()
            .iter()
            .zip(prefix.as_bytes())
            .all(|(a, b)| a.eq_ignore_ascii_case(b))
}

/// Candidate ordering: mnemonic text, then unsuffixed before suffixed.
pub fn compare_nodes(a: &MnemonicNode, b: &MnemonicNode) -> Ordering {
    a.text
        .cmp(&b.text)
        .then(a.suffixed.cmp(&b.suffixed))
        .then(a.start.cmp(&b.start))
        .then(a.stop.cmp(&b.stop))
}

/// Sort nodes into candidate order and drop exact duplicates.
pub fn sort_and_dedupe(nodes: &mut Vec<MnemonicNode>) {
    nodes.sort_by(compare_nodes);
    nodes.dedup();
}

/// Human-readable label: `CHANnel{1:4}`, `RADio{2}?`, or the plain text.
pub fn display_label(node: &MnemonicNode) -> String {
    if !node.suffixed {
        return node.text.clone();
    }
    let (base, query) = match node.text.strip_suffix('?') {
        Some(base) => (base, "?"),
        None => (node.text.as_str(), ""),
    };
    if node.start == node.stop {
        format!("{base}{{{}}}{query}", node.start)
    } else {
        format!("{base}{{{}:{}}}{query}", node.start, node.stop)
    }
}
