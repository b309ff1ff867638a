/// Keystrokes the console state machines react to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Backspace,
    Delete,
    Left,
    Right,
    Up,
    Down,
    Home,
    End,
    Tab,
    Enter,
    Escape,
}

impl Key {
    /// Keys that change the input text: printable characters, backspace and delete.
    pub fn is_edit(&self) -> bool {
        match self {
            Key::Char(c) => !c.is_control(),
            Key::Backspace | Key::Delete => true,
            _ => false,
        }
    }

    /// Whether the sticky completion context survives this key.
    ///
    /// Digits continue a cardinality suffix; navigation and editing keys do not
    /// count as new input. Every other character starts something new.
    pub fn keeps_completion_context(&self) -> bool {
        match self {
            Key::Char(c) => c.is_ascii_digit(),
            _ => true,
        }
    }
}
