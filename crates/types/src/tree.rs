use serde::{Deserialize, Deserializer, Serialize};

/// A single mnemonic in the SCPI grammar, e.g. `MEASure`, `CHANnel{1:4}` or `*IDN?`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MnemonicNode {
    /// Canonical mnemonic text. Uppercase letters form the short form; a trailing
    /// `?` marks the query form and a leading `*` a common command.
    pub text: String,
    /// First accepted cardinality suffix (inclusive).
    #[serde(default)]
    pub start: u32,
    /// Last accepted cardinality suffix (inclusive).
    #[serde(default)]
    pub stop: u32,
    /// Whether the mnemonic accepts a numeric suffix in `start..=stop`.
    #[serde(default)]
    pub suffixed: bool,
}

impl MnemonicNode {
    /// Build an unsuffixed node.
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// Build a node accepting a cardinality suffix in `start..=stop`.
    pub fn ranged(text: impl Into<String>, start: u32, stop: u32) -> Self {
        Self {
            text: text.into(),
            start,
            stop,
            suffixed: true,
        }
    }

    pub fn is_query(&self) -> bool {
        self.text.ends_with('?')
    }

    pub fn is_common(&self) -> bool {
        self.text.starts_with('*')
    }
}

/// A grammar node and its sub-commands.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandTreeNode {
    pub content: MnemonicNode,
    /// Child mnemonics. The server encodes an empty list as `null`.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub children: Vec<CommandTreeNode>,
}

impl CommandTreeNode {
    pub fn leaf(content: MnemonicNode) -> Self {
        Self {
            content,
            children: Vec::new(),
        }
    }

    pub fn with_children(content: MnemonicNode, children: Vec<CommandTreeNode>) -> Self {
        Self { content, children }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Both grammar roots as served by `GET /api/commands`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Commands {
    /// Flat list of `*`-prefixed common commands under an unnamed root.
    pub star_tree: CommandTreeNode,
    /// Root of the colon-delimited hierarchical grammar.
    pub colon_tree: CommandTreeNode,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<CommandTreeNode>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<CommandTreeNode>>::deserialize(deserializer)?.unwrap_or_default())
}
