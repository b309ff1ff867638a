//! Inserting an accepted candidate into the input line.

use sclipi_util::short_mnemonic;

use crate::autocomplete::{Candidate, StickyContext};

/// Input text and sticky context after a candidate was accepted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppliedCompletion {
    pub text: String,
    pub sticky: StickyContext,
}

/// Splice `candidate` into `input`.
///
/// Mnemonics replace the segment after the last `:`; a `:` follows when the
/// mnemonic has sub-commands and takes no suffix, otherwise the operator still
/// has a cardinality to type. Suffixed queries are inserted without their `?`,
/// which the chosen cardinality candidate then carries. Cardinality values
/// replace any digits (and `?`) already typed after the mnemonic.
pub fn apply_completion(input: &str, candidate: &Candidate, prefer_short: bool) -> AppliedCompletion {
    match candidate {
        Candidate::Cardinality(value) => {
            let base = input.trim_end_matches('?').trim_end_matches(|c: char| c.is_ascii_digit());
            AppliedCompletion {
                text: format!("{base}{value}"),
                sticky: StickyContext::default(),
            }
        }
        Candidate::Mnemonic { node, has_children } => {
            let mut text = if prefer_short {
                short_mnemonic(&node.text)
            } else {
                node.text.clone()
            };

            if node.is_common() {
                return AppliedCompletion {
                    text,
                    sticky: StickyContext {
                        has_suffix: false,
                        is_query: node.is_query(),
                    },
                };
            }

            if node.suffixed
                && let Some(stripped) = text.strip_suffix('?')
            {
                text = stripped.to_string();
            }
            let prefix = match input.rfind(':') {
                Some(at) => &input[..=at],
                None => "",
            };
            let separator = if *has_children && !node.suffixed { ":" } else { "" };

            AppliedCompletion {
                text: format!("{prefix}{text}{separator}"),
                sticky: StickyContext {
                    has_suffix: node.suffixed,
                    is_query: node.is_query(),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use sclipi_types::MnemonicNode;

    use super::*;

    fn mnemonic(node: MnemonicNode, has_children: bool) -> Candidate {
        Candidate::Mnemonic { node, has_children }
    }

    #[test]
    fn branch_mnemonic_gets_a_separator() {
        let applied = apply_completion(":ME", &mnemonic(MnemonicNode::plain("MEASure"), true), false);
        assert_eq!(applied.text, ":MEASure:");
        assert_eq!(applied.sticky, StickyContext::default());
    }

    #[test]
    fn leaf_mnemonic_replaces_only_the_last_segment() {
        let applied = apply_completion(":MEAS:vo", &mnemonic(MnemonicNode::plain("VOLTage?"), false), false);
        assert_eq!(applied.text, ":MEAS:VOLTage?");
        assert_eq!(
            applied.sticky,
            StickyContext {
                has_suffix: false,
                is_query: true,
            }
        );
    }

    #[test]
    fn input_without_separator_is_replaced_whole() {
        let applied = apply_completion("sy", &mnemonic(MnemonicNode::plain("SYSTem"), true), false);
        assert_eq!(applied.text, "SYSTem:");
    }

    #[test]
    fn short_form_preference() {
        let applied = apply_completion(":ME", &mnemonic(MnemonicNode::plain("MEASure"), true), true);
        assert_eq!(applied.text, ":MEAS:");
    }

    #[test]
    fn short_form_preference_covers_suffixed_mnemonics() {
        let applied = apply_completion(":CH", &mnemonic(MnemonicNode::ranged("CHANnel", 1, 4), true), true);
        assert_eq!(applied.text, ":CHAN");
        assert!(applied.sticky.has_suffix);

        let applied = apply_completion(":RA", &mnemonic(MnemonicNode::ranged("RADio?", 1, 4), false), true);
        assert_eq!(applied.text, ":RAD");
        assert!(applied.sticky.is_query);
    }

    #[test]
    fn suffixed_mnemonic_waits_for_a_cardinality() {
        let applied = apply_completion(":CH", &mnemonic(MnemonicNode::ranged("CHANnel", 1, 4), true), false);
        assert_eq!(applied.text, ":CHANnel");
        assert_eq!(
            applied.sticky,
            StickyContext {
                has_suffix: true,
                is_query: false,
            }
        );

        let applied = apply_completion(&applied.text, &Candidate::Cardinality("3".into()), false);
        assert_eq!(applied.text, ":CHANnel3");
        assert_eq!(applied.sticky, StickyContext::default());
    }

    #[test]
    fn suffixed_query_drops_its_mark_until_the_cardinality() {
        let applied = apply_completion(":RA", &mnemonic(MnemonicNode::ranged("RADio?", 1, 4), false), false);
        assert_eq!(applied.text, ":RADio");
        assert!(applied.sticky.has_suffix && applied.sticky.is_query);

        let applied = apply_completion(&applied.text, &Candidate::Cardinality("2?".into()), false);
        assert_eq!(applied.text, ":RADio2?");
    }

    #[test]
    fn cardinality_replaces_partially_typed_digits() {
        let applied = apply_completion(":CHANnel1", &Candidate::Cardinality("12".into()), false);
        assert_eq!(applied.text, ":CHANnel12");
    }

    #[test]
    fn common_command_replaces_the_input() {
        let applied = apply_completion("*i", &mnemonic(MnemonicNode::plain("*IDN?"), false), false);
        assert_eq!(applied.text, "*IDN?");
        assert!(applied.sticky.is_query);
    }
}
