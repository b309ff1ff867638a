//! Grammar-driven completion candidates.
//!
//! The engine walks the command tree along the segments the operator has
//! already finished typing, then offers either the children of the reached
//! nodes filtered by the segment in progress, or, right after a suffixed
//! mnemonic was accepted, the cardinality values that mnemonic allows.

use indexmap::IndexMap;
use sclipi_types::{CommandTreeNode, Commands, MnemonicNode};
use sclipi_util::{
    compare_nodes, display_label, has_cardinality, matches, names_mnemonic, short_mnemonic, starts_with_ignore_case,
};

/// Completion state that outlives a single keystroke.
///
/// Set when a candidate is accepted and cleared as soon as the operator types
/// anything that is not part of a cardinality suffix.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StickyContext {
    /// The last accepted mnemonic takes a cardinality suffix.
    pub has_suffix: bool,
    /// The last accepted mnemonic was a query form.
    pub is_query: bool,
}

/// One completion offered to the operator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Candidate {
    /// A grammar node. `has_children` tells insertion whether a path separator follows.
    Mnemonic { node: MnemonicNode, has_children: bool },
    /// A cardinality value for the suffixed mnemonic just accepted, `?` included for queries.
    Cardinality(String),
}

impl Candidate {
    /// Text shown in a candidate list.
    pub fn label(&self, prefer_short: bool) -> String {
        match self {
            Candidate::Mnemonic { node, .. } if prefer_short => display_label(&MnemonicNode {
                text: short_mnemonic(&node.text),
                ..node.clone()
            }),
            Candidate::Mnemonic { node, .. } => display_label(node),
            Candidate::Cardinality(value) => value.clone(),
        }
    }
}

/// Inputs for one completion pass.
#[derive(Debug, Clone, Copy)]
pub struct CompletionRequest<'a> {
    pub text: &'a str,
    /// `None` while no grammar has been fetched.
    pub commands: Option<&'a Commands>,
    /// History browsing suppresses completion.
    pub browsing_history: bool,
    pub sticky: StickyContext,
}

pub struct AutocompleteEngine;

impl AutocompleteEngine {
    /// Compute the candidate list for the current input.
    ///
    /// Mnemonic candidates come back sorted and free of duplicates; cardinality
    /// candidates come back in ascending numeric order.
    pub fn build(request: &CompletionRequest<'_>) -> Vec<Candidate> {
        let Some(commands) = request.commands else {
            return Vec::new();
        };
        let text = request.text;
        if request.browsing_history || text.ends_with('?') || text.ends_with(' ') {
            return Vec::new();
        }

        if text.starts_with('*') {
            return complete_common(&commands.star_tree, text);
        }
        complete_path(&commands.colon_tree, text, request.sticky)
    }
}

fn complete_common(root: &CommandTreeNode, text: &str) -> Vec<Candidate> {
    let typed = text.strip_prefix('*').unwrap_or(text);
    let found = root.children.iter().filter(|child| {
        let name = child.content.text.strip_prefix('*').unwrap_or(&child.content.text);
        starts_with_ignore_case(name, typed)
    });
    collect_candidates(found)
}

fn complete_path(root: &CommandTreeNode, text: &str, sticky: StickyContext) -> Vec<Candidate> {
    let mut segments: Vec<&str> = text.split(':').collect();
    if segments.first() == Some(&"") {
        segments.remove(0);
    }
    let in_progress = segments.pop().unwrap_or("");

    let mut current: Vec<&CommandTreeNode> = vec![root];
    for segment in segments {
        let mut reached: Vec<&CommandTreeNode> = current
            .iter()
            .flat_map(|node| node.children.iter())
            .filter(|child| matches(&child.content, segment))
            .collect();
        if reached.is_empty() {
            return Vec::new();
        }
        reached.sort_by(|a, b| compare_nodes(&a.content, &b.content));

        // An explicit suffix can only have selected suffixed nodes; keep the last.
        if has_cardinality(segment) {
            reached.drain(..reached.len() - 1);
        }
        current = reached;
    }

    if sticky.has_suffix
        && let Some(values) = expand_range(&current, in_progress, sticky.is_query)
    {
        return values;
    }

    let found = current
        .iter()
        .flat_map(|node| node.children.iter())
        .filter(|child| starts_with_ignore_case(&child.content.text, in_progress));
    collect_candidates(found)
}

/// Cardinality values for a suffixed mnemonic the operator just finished.
///
/// `in_progress` is the mnemonic followed by any digits typed so far; only
/// values starting with those digits are offered.
fn expand_range(current: &[&CommandTreeNode], in_progress: &str, is_query: bool) -> Option<Vec<Candidate>> {
    let digits_at = in_progress.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    let (typed, digits) = in_progress.split_at(digits_at);
    if typed.is_empty() {
        return None;
    }

    let mut finished: Vec<&MnemonicNode> = current
        .iter()
        .flat_map(|node| node.children.iter())
        .map(|child| &child.content)
        .filter(|node| node.suffixed && names_ignoring_query(node, typed))
        .collect();
    finished.sort_by(|a, b| compare_nodes(a, b));
    let node = finished.last()?;

    let query = if is_query { "?" } else { "" };
    let values: Vec<Candidate> = (node.start..=node.stop)
        .map(|value| value.to_string())
        .filter(|value| value.starts_with(digits))
        .map(|value| Candidate::Cardinality(format!("{value}{query}")))
        .collect();
    if values.is_empty() { None } else { Some(values) }
}

/// Suffixed queries are inserted without their `?`, so the typed text names
/// them with or without it.
fn names_ignoring_query(node: &MnemonicNode, typed: &str) -> bool {
    if names_mnemonic(node, typed) {
        return true;
    }
    match node.text.strip_suffix('?') {
        Some(base) => names_mnemonic(&MnemonicNode::plain(base), typed),
        None => false,
    }
}

fn collect_candidates<'a>(found: impl Iterator<Item = &'a CommandTreeNode>) -> Vec<Candidate> {
    let mut unique: IndexMap<MnemonicNode, bool> = IndexMap::new();
    for child in found {
        let has_children = unique.entry(child.content.clone()).or_insert(false);
        *has_children |= !child.is_leaf();
    }
    unique.sort_by(|a, _, b, _| compare_nodes(a, b));
    unique
        .into_iter()
        .map(|(node, has_children)| Candidate::Mnemonic { node, has_children })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Small grammar used across the engine tests.
    pub(crate) fn sample_commands() -> Commands {
        let leaf = |text: &str| CommandTreeNode::leaf(MnemonicNode::plain(text));
        let colon_tree = CommandTreeNode::with_children(
            MnemonicNode::default(),
            vec![
                CommandTreeNode::with_children(
                    MnemonicNode::plain("MEASure"),
                    vec![leaf("VOLTage?"), leaf("CURRent?")],
                ),
                CommandTreeNode::with_children(
                    MnemonicNode::ranged("CHANnel", 1, 16),
                    vec![leaf("SCALe"), leaf("OFFSet")],
                ),
                CommandTreeNode::with_children(MnemonicNode::plain("CHANnel"), vec![leaf("COUNt?")]),
                CommandTreeNode::leaf(MnemonicNode::ranged("RADio?", 1, 4)),
                CommandTreeNode::with_children(
                    MnemonicNode::plain("SYSTem"),
                    vec![leaf("ERRor?"), leaf("VERSion?")],
                ),
                CommandTreeNode::with_children(
                    MnemonicNode::plain("SYSTem"),
                    vec![leaf("ERRor?"), leaf("DATE")],
                ),
            ],
        );
        let star_tree = CommandTreeNode::with_children(
            MnemonicNode::default(),
            vec![leaf("*IDN?"), leaf("*RST"), leaf("*CLS"), leaf("*RST")],
        );
        Commands { star_tree, colon_tree }
    }

    fn complete(commands: &Commands, text: &str, sticky: StickyContext) -> Vec<Candidate> {
        AutocompleteEngine::build(&CompletionRequest {
            text,
            commands: Some(commands),
            browsing_history: false,
            sticky,
        })
    }

    fn texts(candidates: &[Candidate]) -> Vec<String> {
        candidates.iter().map(|c| c.label(false)).collect()
    }

    #[test]
    fn no_grammar_or_history_browsing_yields_nothing() {
        let commands = sample_commands();
        assert!(
            AutocompleteEngine::build(&CompletionRequest {
                text: "ME",
                commands: None,
                browsing_history: false,
                sticky: StickyContext::default(),
            })
            .is_empty()
        );
        assert!(
            AutocompleteEngine::build(&CompletionRequest {
                text: "ME",
                commands: Some(&commands),
                browsing_history: true,
                sticky: StickyContext::default(),
            })
            .is_empty()
        );
    }

    #[test]
    fn finished_queries_and_trailing_space_yield_nothing() {
        let commands = sample_commands();
        assert!(complete(&commands, ":MEAS:VOLT?", StickyContext::default()).is_empty());
        assert!(complete(&commands, ":MEAS:VOLT ", StickyContext::default()).is_empty());
    }

    #[test]
    fn top_level_prefix_is_case_insensitive_sorted_and_unique() {
        let commands = sample_commands();
        let candidates = complete(&commands, "s", StickyContext::default());
        assert_eq!(texts(&candidates), vec!["SYSTem"]);

        let all = complete(&commands, ":", StickyContext::default());
        assert_eq!(texts(&all), vec!["CHANnel", "CHANnel{1:16}", "MEASure", "RADio{1:4}?", "SYSTem"]);
    }

    #[test]
    fn duplicate_children_from_sibling_nodes_are_merged() {
        let commands = sample_commands();
        let candidates = complete(&commands, ":SYST:", StickyContext::default());
        assert_eq!(texts(&candidates), vec!["DATE", "ERRor?", "VERSion?"]);
    }

    #[test]
    fn walks_short_and_long_forms() {
        let commands = sample_commands();
        assert_eq!(texts(&complete(&commands, ":MEAS:V", StickyContext::default())), vec!["VOLTage?"]);
        assert_eq!(texts(&complete(&commands, "measure:c", StickyContext::default())), vec!["CURRent?"]);
    }

    #[test]
    fn unmatched_segment_yields_nothing() {
        let commands = sample_commands();
        assert!(complete(&commands, ":BOGUS:V", StickyContext::default()).is_empty());
    }

    #[test]
    fn explicit_cardinality_selects_the_suffixed_node() {
        let commands = sample_commands();
        let candidates = complete(&commands, ":CHAN3:", StickyContext::default());
        assert_eq!(texts(&candidates), vec!["OFFSet", "SCALe"]);

        // Without a suffix both variants are reachable.
        let candidates = complete(&commands, ":CHAN:", StickyContext::default());
        assert_eq!(texts(&candidates), vec!["COUNt?", "OFFSet", "SCALe"]);
    }

    #[test]
    fn out_of_range_cardinality_yields_nothing() {
        let commands = sample_commands();
        assert!(complete(&commands, ":CHAN17:", StickyContext::default()).is_empty());
    }

    #[test]
    fn overflowing_cardinality_yields_nothing() {
        let commands = sample_commands();
        assert!(complete(&commands, ":CHAN99999999999:", StickyContext::default()).is_empty());
    }

    #[test]
    fn sticky_suffix_offers_the_range() {
        let commands = sample_commands();
        let sticky = StickyContext {
            has_suffix: true,
            is_query: false,
        };
        let candidates = complete(&commands, ":CHANnel", sticky);
        assert_eq!(candidates.len(), 16);
        assert_eq!(candidates[0], Candidate::Cardinality("1".into()));
        assert_eq!(candidates[15], Candidate::Cardinality("16".into()));
    }

    #[test]
    fn typed_digits_narrow_the_range() {
        let commands = sample_commands();
        let sticky = StickyContext {
            has_suffix: true,
            is_query: false,
        };
        let candidates = complete(&commands, ":CHANnel1", sticky);
        assert_eq!(texts(&candidates), vec!["1", "10", "11", "12", "13", "14", "15", "16"]);
    }

    #[test]
    fn short_form_of_a_suffixed_mnemonic_offers_the_range() {
        let commands = sample_commands();
        let sticky = StickyContext {
            has_suffix: true,
            is_query: false,
        };
        assert_eq!(complete(&commands, ":CHAN", sticky).len(), 16);
        let sticky = StickyContext {
            has_suffix: true,
            is_query: true,
        };
        assert_eq!(texts(&complete(&commands, ":RAD", sticky)), vec!["1?", "2?", "3?", "4?"]);
    }

    #[test]
    fn suffixed_query_range_carries_the_question_mark() {
        let commands = sample_commands();
        let sticky = StickyContext {
            has_suffix: true,
            is_query: true,
        };
        let candidates = complete(&commands, ":RADio", sticky);
        assert_eq!(texts(&candidates), vec!["1?", "2?", "3?", "4?"]);
    }

    #[test]
    fn without_sticky_suffix_no_range_is_offered() {
        let commands = sample_commands();
        let candidates = complete(&commands, ":CHANnel", StickyContext::default());
        assert_eq!(texts(&candidates), vec!["CHANnel", "CHANnel{1:16}"]);
    }

    #[test]
    fn common_commands_match_without_the_star() {
        let commands = sample_commands();
        assert_eq!(texts(&complete(&commands, "*", StickyContext::default())), vec!["*CLS", "*IDN?", "*RST"]);
        assert_eq!(texts(&complete(&commands, "*r", StickyContext::default())), vec!["*RST"]);
    }

    #[test]
    fn has_children_reflects_the_grammar() {
        let commands = sample_commands();
        let candidates = complete(&commands, ":ME", StickyContext::default());
        assert_eq!(
            candidates,
            vec![Candidate::Mnemonic {
                node: MnemonicNode::plain("MEASure"),
                has_children: true,
            }]
        );
    }

    #[test]
    fn short_labels_keep_the_suffix_range() {
        let commands = sample_commands();
        let labels: Vec<String> = complete(&commands, ":", StickyContext::default())
            .iter()
            .map(|c| c.label(true))
            .collect();
        assert_eq!(labels, vec!["CHAN", "CHAN{1:16}", "MEAS", "RAD{1:4}?", "SYST"]);
    }
}
