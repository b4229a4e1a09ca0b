//! Module configuration and the directives that change it.
//!
//! The host hands over `(key, value)` pairs, typically one per line of its
//! own configuration file. Keys are matched case-insensitively and each also
//! has an alias spelled the way older agent configurations wrote it.

use std::path::PathBuf;

use crate::collector::statfile::{StatGeometry, WordSize};

pub const DEFAULT_TABLE_INDEX: u32 = 1;
pub const DEFAULT_STATS_TTL: u64 = 5;
pub const DEFAULT_QUEUE_TTL: u64 = 10;

/// Longest accepted directive value.
pub const MAX_DIRECTIVE_VALUE_LEN: usize = 200;

/// Locations tried by `init_defaults` when nothing was configured.
pub const DEFAULT_CONFIG_PATHS: [&str; 2] = ["/etc/mail/sendmail.cf", "/etc/sendmail.cf"];
pub const DEFAULT_STATS_PATHS: [&str; 2] = ["/etc/mail/statistics", "/etc/mail/sendmail.st"];
pub const DEFAULT_QUEUE_PATHS: [&str; 1] = ["/var/spool/mqueue"];

/// Settings of the MTA statistics module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleConfig {
    pub stats_path: Option<PathBuf>,
    pub config_path: Option<PathBuf>,
    pub queue_path: Option<PathBuf>,
    /// First component of every table row key ("ApplIndex").
    pub table_index: u32,
    /// Seconds a statistics snapshot is served before the file is re-read.
    pub stats_ttl: u64,
    /// Seconds a queue snapshot is served before the directory is re-scanned.
    pub queue_ttl: u64,
    /// Word size and byte order of the statistics record.
    pub geometry: StatGeometry,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            stats_path: None,
            config_path: None,
            queue_path: None,
            table_index: DEFAULT_TABLE_INDEX,
            stats_ttl: DEFAULT_STATS_TTL,
            queue_ttl: DEFAULT_QUEUE_TTL,
            geometry: StatGeometry::default(),
        }
    }
}

/// Recognized configuration keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Directive {
    StatsPath,
    ConfigPath,
    QueuePath,
    TableIndex,
    StatsTtl,
    QueueTtl,
    StatsWordSize,
}

impl Directive {
    pub const ALL: [Directive; 7] = [
        Directive::StatsPath,
        Directive::ConfigPath,
        Directive::QueuePath,
        Directive::TableIndex,
        Directive::StatsTtl,
        Directive::QueueTtl,
        Directive::StatsWordSize,
    ];

    /// Canonical key.
    pub fn key(&self) -> &'static str {
        match self {
            Directive::StatsPath => "stats_path",
            Directive::ConfigPath => "config_path",
            Directive::QueuePath => "queue_path",
            Directive::TableIndex => "table_index",
            Directive::StatsTtl => "stats_ttl_seconds",
            Directive::QueueTtl => "queue_ttl_seconds",
            Directive::StatsWordSize => "stats_word_size",
        }
    }

    fn alias(&self) -> Option<&'static str> {
        match self {
            Directive::StatsPath => Some("sendmail_stats"),
            Directive::ConfigPath => Some("sendmail_config"),
            Directive::QueuePath => Some("sendmail_queue"),
            Directive::TableIndex => Some("sendmail_index"),
            Directive::StatsTtl => Some("sendmail_stats_t"),
            Directive::QueueTtl => Some("sendmail_queue_t"),
            Directive::StatsWordSize => None,
        }
    }

    /// Looks up a key or alias, ignoring case.
    pub fn from_key(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|d| {
            d.key().eq_ignore_ascii_case(name)
                || d.alias().is_some_and(|a| a.eq_ignore_ascii_case(name))
        })
    }
}

impl std::fmt::Display for Directive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// Error type for configuration directives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectiveError {
    UnknownKey(String),
    /// Value exceeds [`MAX_DIRECTIVE_VALUE_LEN`]; the directive is ignored.
    LineTooLong(Directive),
    /// A path directive without a value.
    MissingValue(Directive),
    /// Not a number, or out of range. The setting was reset to its default.
    InvalidValue { directive: Directive, value: String },
}

impl std::fmt::Display for DirectiveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DirectiveError::UnknownKey(key) => write!(f, "unknown directive \"{}\"", key),
            DirectiveError::LineTooLong(d) => write!(f, "{}: line too long", d),
            DirectiveError::MissingValue(d) => write!(f, "{}: missing value", d),
            DirectiveError::InvalidValue { directive, value } => match directive {
                Directive::TableIndex => write!(f, "invalid index number \"{}\"", value),
                Directive::StatsWordSize => write!(f, "invalid word size \"{}\"", value),
                _ => write!(f, "{}: invalid cache time \"{}\"", directive, value),
            },
        }
    }
}

impl std::error::Error for DirectiveError {}

impl ModuleConfig {
    /// Validates `value` and stores it under `directive`.
    ///
    /// Path values take the first whitespace-delimited word, with surrounding
    /// double quotes removed. Numeric values must be at least 1; an invalid
    /// number resets the setting to its default and is reported.
    pub fn apply(&mut self, directive: Directive, value: &str) -> Result<(), DirectiveError> {
        if value.len() > MAX_DIRECTIVE_VALUE_LEN {
            return Err(DirectiveError::LineTooLong(directive));
        }
        let word = first_word(value);
        let invalid = || DirectiveError::InvalidValue {
            directive,
            value: word.to_string(),
        };

        match directive {
            Directive::StatsPath | Directive::ConfigPath | Directive::QueuePath => {
                if word.is_empty() {
                    return Err(DirectiveError::MissingValue(directive));
                }
                let path = Some(PathBuf::from(word));
                match directive {
                    Directive::StatsPath => self.stats_path = path,
                    Directive::ConfigPath => self.config_path = path,
                    _ => self.queue_path = path,
                }
            }
            Directive::TableIndex => match parse_positive(word).and_then(|v| u32::try_from(v).ok())
            {
                Some(index) => self.table_index = index,
                None => {
                    self.table_index = DEFAULT_TABLE_INDEX;
                    return Err(invalid());
                }
            },
            Directive::StatsTtl => match parse_positive(word) {
                Some(ttl) => self.stats_ttl = ttl,
                None => {
                    self.stats_ttl = DEFAULT_STATS_TTL;
                    return Err(invalid());
                }
            },
            Directive::QueueTtl => match parse_positive(word) {
                Some(ttl) => self.queue_ttl = ttl,
                None => {
                    self.queue_ttl = DEFAULT_QUEUE_TTL;
                    return Err(invalid());
                }
            },
            Directive::StatsWordSize => {
                match word.parse::<u64>().ok().and_then(WordSize::from_bytes) {
                    Some(size) => self.geometry.word = size,
                    None => {
                        self.geometry.word = WordSize::native();
                        return Err(invalid());
                    }
                }
            }
        }
        Ok(())
    }
}

/// First whitespace-delimited word, without surrounding double quotes.
///
/// A quoted value may contain spaces: `"/var/spool/my queue"`.
fn first_word(value: &str) -> &str {
    let value = value.trim_start();
    if let Some(quoted) = value.strip_prefix('"') {
        return match quoted.find('"') {
            Some(end) => &quoted[..end],
            None => quoted,
        };
    }
    value.split_whitespace().next().unwrap_or("")
}

fn parse_positive(word: &str) -> Option<u64> {
    word.parse::<u64>().ok().filter(|v| *v >= 1)
}

/// One `key value` line of a directive file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectiveLine {
    pub line: usize,
    pub key: String,
    pub value: String,
}

/// Splits directive file content into `key value` pairs.
///
/// Blank lines and lines starting with `#` are skipped. The value is the rest
/// of the line after the key, with leading whitespace removed.
pub fn parse_directive_lines(content: &str) -> Vec<DirectiveLine> {
    content
        .lines()
        .enumerate()
        .filter_map(|(idx, raw)| {
            let text = raw.trim();
            if text.is_empty() || text.starts_with('#') {
                return None;
            }
            let (key, value) = match text.split_once(char::is_whitespace) {
                Some((key, value)) => (key, value.trim_start()),
                None => (text, ""),
            };
            Some(DirectiveLine {
                line: idx + 1,
                key: key.to_string(),
                value: value.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directive_keys_and_aliases() {
        assert_eq!(Directive::from_key("stats_path"), Some(Directive::StatsPath));
        assert_eq!(Directive::from_key("Sendmail_Config"), Some(Directive::ConfigPath));
        assert_eq!(Directive::from_key("SENDMAIL_QUEUE_T"), Some(Directive::QueueTtl));
        assert_eq!(Directive::from_key("sendmail_index"), Some(Directive::TableIndex));
        assert_eq!(Directive::from_key("stats_word_size"), Some(Directive::StatsWordSize));
        assert_eq!(Directive::from_key("sendmail_foo"), None);
    }

    #[test]
    fn test_defaults() {
        let config = ModuleConfig::default();
        assert_eq!(config.table_index, 1);
        assert_eq!(config.stats_ttl, 5);
        assert_eq!(config.queue_ttl, 10);
        assert!(config.stats_path.is_none());
    }

    #[test]
    fn test_path_values_take_first_word() {
        let mut config = ModuleConfig::default();
        config
            .apply(Directive::StatsPath, "  /etc/mail/statistics trailing")
            .unwrap();
        assert_eq!(config.stats_path, Some(PathBuf::from("/etc/mail/statistics")));

        config
            .apply(Directive::QueuePath, "\"/var/spool/my queue\"")
            .unwrap();
        assert_eq!(config.queue_path, Some(PathBuf::from("/var/spool/my queue")));

        assert_eq!(
            config.apply(Directive::ConfigPath, "   "),
            Err(DirectiveError::MissingValue(Directive::ConfigPath))
        );
    }

    #[test]
    fn test_value_too_long() {
        let mut config = ModuleConfig::default();
        let long = "/".repeat(MAX_DIRECTIVE_VALUE_LEN + 1);
        assert_eq!(
            config.apply(Directive::StatsPath, &long),
            Err(DirectiveError::LineTooLong(Directive::StatsPath))
        );
        assert!(config.stats_path.is_none());
    }

    #[test]
    fn test_numeric_values() {
        let mut config = ModuleConfig::default();
        config.apply(Directive::TableIndex, "3").unwrap();
        config.apply(Directive::StatsTtl, "60").unwrap();
        config.apply(Directive::QueueTtl, " 120 ").unwrap();
        assert_eq!(config.table_index, 3);
        assert_eq!(config.stats_ttl, 60);
        assert_eq!(config.queue_ttl, 120);
    }

    #[test]
    fn test_invalid_numbers_reset_to_default() {
        let mut config = ModuleConfig::default();
        config.apply(Directive::TableIndex, "3").unwrap();
        config.apply(Directive::StatsTtl, "60").unwrap();

        let err = config.apply(Directive::TableIndex, "0").unwrap_err();
        assert_eq!(err.to_string(), "invalid index number \"0\"");
        assert_eq!(config.table_index, DEFAULT_TABLE_INDEX);

        assert!(config.apply(Directive::StatsTtl, "soon").is_err());
        assert_eq!(config.stats_ttl, DEFAULT_STATS_TTL);

        assert!(config.apply(Directive::QueueTtl, "-5").is_err());
        assert_eq!(config.queue_ttl, DEFAULT_QUEUE_TTL);
    }

    #[test]
    fn test_word_size() {
        let mut config = ModuleConfig::default();
        config.apply(Directive::StatsWordSize, "4").unwrap();
        assert_eq!(config.geometry.word, WordSize::Four);
        assert!(config.apply(Directive::StatsWordSize, "2").is_err());
        assert_eq!(config.geometry.word, WordSize::native());
    }

    #[test]
    fn test_parse_directive_lines() {
        let lines = parse_directive_lines(
            "# mtastat directives\n\nsendmail_config /etc/mail/sendmail.cf\n  stats_ttl_seconds   30\ntable_index\n",
        );
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].line, 3);
        assert_eq!(lines[0].key, "sendmail_config");
        assert_eq!(lines[0].value, "/etc/mail/sendmail.cf");
        assert_eq!(lines[1].value, "30");
        assert_eq!(lines[2].key, "table_index");
        assert_eq!(lines[2].value, "");
    }
}
