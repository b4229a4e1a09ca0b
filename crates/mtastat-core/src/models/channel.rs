//! Mail delivery channels ("mailers") as declared in sendmail.cf.

use serde::Serialize;

/// Maximum number of mailers, including the built-in ones.
pub const MAX_CHANNELS: usize = 25;

/// Maximum length of a mailer name.
pub const MAX_CHANNEL_NAME_LEN: usize = 20;

/// Mailers sendmail always defines, occupying ordinals 1–3.
pub const BUILTIN_CHANNELS: [&str; 3] = ["prog", "*file*", "*include*"];

/// Outcome of declaring a channel name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Declaration {
    /// New channel stored at this 1-based ordinal.
    Added(u32),
    /// Name repeats one of the built-in mailers.
    BuiltinDuplicate(u32),
    /// Name repeats a channel declared earlier in the file.
    Duplicate(u32),
    /// All [`MAX_CHANNELS`] slots are taken.
    Full,
}

/// Ordered list of channel names, addressed by 1-based ordinal.
///
/// Ordinals are dense: rejected declarations never leave holes, and slots past
/// the last populated ordinal simply do not exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelList {
    names: Vec<String>,
}

impl Default for ChannelList {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl ChannelList {
    /// Creates a list holding only the built-in mailers.
    pub fn with_builtins() -> Self {
        let mut names = Vec::with_capacity(MAX_CHANNELS);
        names.extend(BUILTIN_CHANNELS.iter().map(|n| n.to_string()));
        Self { names }
    }

    /// Number of populated channels.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.names.len() >= MAX_CHANNELS
    }

    /// Returns the name at a 1-based ordinal.
    ///
    /// `Some("")` is a declared channel with an empty name; `None` means the
    /// ordinal is out of range.
    pub fn name(&self, ordinal: u32) -> Option<&str> {
        let idx = (ordinal as usize).checked_sub(1)?;
        self.names.get(idx).map(String::as_str)
    }

    /// Returns the 1-based ordinal of an exact name match.
    pub fn position(&self, name: &str) -> Option<u32> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|idx| idx as u32 + 1)
    }

    /// Declares a channel, enforcing the capacity and duplicate rules.
    ///
    /// Names longer than [`MAX_CHANNEL_NAME_LEN`] are truncated at a character
    /// boundary before comparison.
    pub fn declare(&mut self, name: &str) -> Declaration {
        if self.is_full() {
            return Declaration::Full;
        }

        let name = truncate_name(name);
        match self.position(name) {
            Some(ordinal) if (ordinal as usize) <= BUILTIN_CHANNELS.len() => {
                Declaration::BuiltinDuplicate(ordinal)
            }
            Some(ordinal) => Declaration::Duplicate(ordinal),
            None => {
                self.names.push(name.to_string());
                Declaration::Added(self.names.len() as u32)
            }
        }
    }

    /// Iterates over `(ordinal, name)` pairs in ordinal order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.names
            .iter()
            .enumerate()
            .map(|(idx, name)| (idx as u32 + 1, name.as_str()))
    }
}

fn truncate_name(name: &str) -> &str {
    match name.char_indices().nth(MAX_CHANNEL_NAME_LEN) {
        Some((end, _)) => &name[..end],
        None => name,
    }
}
