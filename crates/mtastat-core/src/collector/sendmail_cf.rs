//! Extraction of mailer names and file locations from sendmail.cf.
//!
//! Only three kinds of line matter:
//!
//! - `M<name>,...` declares a mailer.
//! - `O StatusFile=<path>` / `OS<path>` names the statistics file.
//! - `O QueueDirectory=<path>` / `OQ<path>` names the queue directory.
//!
//! Everything else is ignored. Problems on individual lines are collected as
//! warnings and never stop the parse.

use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::collector::traits::{FileSystem, OpenError};
use crate::models::{ChannelList, Declaration, MAX_CHANNEL_NAME_LEN};

/// Longest accepted line, excluding its terminator.
pub const MAX_LINE_LEN: usize = 498;

/// Longest accepted file or directory name.
pub const MAX_PATH_LEN: usize = 200;

/// Non-fatal problem found on one line of the configuration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// Line exceeds [`MAX_LINE_LEN`]; skipped.
    LineTooLong { line: usize },
    /// Mailer table already full; declaration ignored.
    TooManyChannels { line: usize, name: String },
    /// Mailer declared twice; the second declaration is discarded.
    DuplicateChannel { line: usize, name: String },
    /// `O StatusFile` or `O QueueDirectory` without `=`.
    MissingEquals { line: usize },
    /// Path exceeds [`MAX_PATH_LEN`]; option ignored.
    PathTooLong { line: usize },
}

impl ConfigWarning {
    pub fn line(&self) -> usize {
        match self {
            ConfigWarning::LineTooLong { line }
            | ConfigWarning::TooManyChannels { line, .. }
            | ConfigWarning::DuplicateChannel { line, .. }
            | ConfigWarning::MissingEquals { line }
            | ConfigWarning::PathTooLong { line } => *line,
        }
    }
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::LineTooLong { line } => write!(f, "line {} is too long", line),
            ConfigWarning::TooManyChannels { line, name } => {
                write!(f, "line {}: too many mailers, ignoring \"{}\"", line, name)
            }
            ConfigWarning::DuplicateChannel { line, name } => {
                write!(f, "line {}: mailer \"{}\" already declared", line, name)
            }
            ConfigWarning::MissingEquals { line } => write!(f, "line {} is missing an '='", line),
            ConfigWarning::PathTooLong { line } => {
                write!(f, "line {} contains a filename that's too long", line)
            }
        }
    }
}

/// Result of parsing a sendmail.cf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedConfig {
    /// Built-in mailers followed by the declared ones.
    pub channels: ChannelList,
    /// Last `StatusFile` option seen.
    pub stats_path: Option<PathBuf>,
    /// Last `QueueDirectory` option seen.
    pub queue_path: Option<PathBuf>,
    pub warnings: Vec<ConfigWarning>,
}

impl Default for ParsedConfig {
    fn default() -> Self {
        Self {
            channels: ChannelList::with_builtins(),
            stats_path: None,
            queue_path: None,
            warnings: Vec::new(),
        }
    }
}

/// Opens and parses the configuration file at `path`.
///
/// Failing to open or read the file is the only error; per-line problems are
/// logged and returned in [`ParsedConfig::warnings`].
pub fn read_sendmail_cf<F: FileSystem>(fs: &F, path: &Path) -> Result<ParsedConfig, OpenError> {
    let mut content = Vec::new();
    fs.open(path)
        .and_then(|mut file| file.read_to_end(&mut content))
        .map_err(|e| {
            warn!("could not open file {:?}: {}", path, e);
            OpenError::file(path, e)
        })?;

    let parsed = parse_sendmail_cf(&content);
    for warning in &parsed.warnings {
        warn!("config file {:?}: {}", path, warning);
    }
    debug!(
        "{:?}: {} mailers, statistics {:?}, queue {:?}",
        path,
        parsed.channels.len(),
        parsed.stats_path,
        parsed.queue_path
    );
    Ok(parsed)
}

/// Parses sendmail.cf content.
pub fn parse_sendmail_cf(content: &[u8]) -> ParsedConfig {
    let mut parsed = ParsedConfig::default();

    for (idx, raw) in lines(content).enumerate() {
        let line = idx + 1;
        let Some(text) = raw else {
            parsed.warnings.push(ConfigWarning::LineTooLong { line });
            continue;
        };
        let text = text.strip_suffix(b"\r").unwrap_or(text);

        match text.first() {
            Some(b'M') => parse_mailer(&mut parsed, line, &text[1..]),
            Some(b'O') => parse_option(&mut parsed, line, &text[1..]),
            _ => {}
        }
    }

    parsed
}

/// Splits content into lines, yielding `None` for lines over the bound.
///
/// Text after the last terminator is a line that never ended; it is reported
/// like an overlong one.
fn lines(content: &[u8]) -> impl Iterator<Item = Option<&[u8]>> {
    let (terminated, tail) = match content.iter().rposition(|b| *b == b'\n') {
        Some(pos) => (Some(&content[..pos]), &content[pos + 1..]),
        None => (None, content),
    };
    terminated
        .into_iter()
        .flat_map(|text| text.split(|b| *b == b'\n'))
        .map(|line| (line.len() <= MAX_LINE_LEN).then_some(line))
        .chain((!tail.is_empty()).then_some(None))
}

fn parse_mailer(parsed: &mut ParsedConfig, line: usize, rest: &[u8]) {
    let end = rest
        .iter()
        .take(MAX_CHANNEL_NAME_LEN)
        .position(|b| *b == b',' || b.is_ascii_whitespace())
        .unwrap_or(rest.len().min(MAX_CHANNEL_NAME_LEN));
    let name = String::from_utf8_lossy(&rest[..end]).into_owned();

    match parsed.channels.declare(&name) {
        Declaration::Added(ordinal) => {
            debug!("found mailer \"{}\" at ordinal {}", name, ordinal);
        }
        Declaration::BuiltinDuplicate(_) => {
            debug!(
                "mailer \"{}\" already exists, but it is one of the predefined mailers",
                name
            );
        }
        Declaration::Duplicate(_) => {
            debug!("mailer \"{}\" already exists", name);
            parsed
                .warnings
                .push(ConfigWarning::DuplicateChannel { line, name });
        }
        Declaration::Full => {
            parsed
                .warnings
                .push(ConfigWarning::TooManyChannels { line, name });
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum PathOption {
    StatusFile,
    QueueDirectory,
}

impl PathOption {
    const LONG_FORMS: [(&'static str, PathOption); 2] = [
        ("StatusFile", PathOption::StatusFile),
        ("QueueDirectory", PathOption::QueueDirectory),
    ];

    fn store(self, parsed: &mut ParsedConfig, value: &[u8]) {
        let path = path_from_bytes(value);
        match self {
            PathOption::StatusFile => {
                debug!("found statistics file {:?}", path);
                parsed.stats_path = Some(path);
            }
            PathOption::QueueDirectory => {
                debug!("found mail queue directory {:?}", path);
                parsed.queue_path = Some(path);
            }
        }
    }
}

#[cfg(unix)]
fn path_from_bytes(value: &[u8]) -> PathBuf {
    use std::os::unix::ffi::OsStrExt;
    PathBuf::from(std::ffi::OsStr::from_bytes(value))
}

#[cfg(not(unix))]
fn path_from_bytes(value: &[u8]) -> PathBuf {
    PathBuf::from(String::from_utf8_lossy(value).into_owned())
}

fn parse_option(parsed: &mut ParsedConfig, line: usize, rest: &[u8]) {
    let (option, value) = match rest.first() {
        Some(b' ') => {
            let Some((option, after)) = match_long_form(&rest[1..]) else {
                return;
            };
            if !matches!(after.first(), Some(b' ' | b'=')) {
                return;
            }
            let after = trim_spaces(after);
            let Some(value) = after.strip_prefix(b"=") else {
                parsed.warnings.push(ConfigWarning::MissingEquals { line });
                return;
            };
            (option, trim_spaces(value))
        }
        Some(b'S') => (PathOption::StatusFile, &rest[1..]),
        Some(b'Q') => (PathOption::QueueDirectory, &rest[1..]),
        _ => return,
    };

    if value.len() > MAX_PATH_LEN {
        parsed.warnings.push(ConfigWarning::PathTooLong { line });
        return;
    }
    option.store(parsed, value);
}

/// Matches a long option keyword case-insensitively, returning the remainder.
fn match_long_form(text: &[u8]) -> Option<(PathOption, &[u8])> {
    PathOption::LONG_FORMS.iter().find_map(|(keyword, option)| {
        let head = text.get(..keyword.len())?;
        head.eq_ignore_ascii_case(keyword.as_bytes())
            .then(|| (*option, &text[keyword.len()..]))
    })
}

fn trim_spaces(text: &[u8]) -> &[u8] {
    let start = text.iter().position(|b| *b != b' ').unwrap_or(text.len());
    &text[start..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::{MockFs, SENDMAIL_CF};
    use crate::models::MAX_CHANNELS;

    fn names(parsed: &ParsedConfig) -> Vec<String> {
        parsed
            .channels
            .iter()
            .map(|(_, name)| name.to_string())
            .collect()
    }

    #[test]
    fn test_parse_typical_config() {
        let fs = MockFs::typical_sendmail();
        let parsed = read_sendmail_cf(&fs, Path::new(SENDMAIL_CF)).unwrap();
        assert_eq!(
            names(&parsed),
            vec!["prog", "*file*", "*include*", "local", "smtp", "esmtp", "relay"]
        );
        assert_eq!(parsed.stats_path, Some(PathBuf::from("/etc/mail/statistics")));
        assert_eq!(parsed.queue_path, Some(PathBuf::from("/var/spool/mqueue")));
        assert!(parsed.warnings.is_empty());
    }

    #[test]
    fn test_missing_file_is_open_error() {
        let fs = MockFs::new();
        let err = read_sendmail_cf(&fs, Path::new("/etc/sendmail.cf")).unwrap_err();
        assert_eq!(err.path, PathBuf::from("/etc/sendmail.cf"));
    }

    #[test]
    fn test_builtin_duplicate_does_not_grow_list() {
        let parsed = parse_sendmail_cf(b"Mprog, P=/bin/sh\nMlocal, P=/bin/mail\n");
        assert_eq!(parsed.channels.len(), 4);
        assert!(parsed.warnings.is_empty());
    }

    #[test]
    fn test_user_duplicate_counted_once() {
        let parsed = parse_sendmail_cf(b"Msmtp, P=[IPC]\nMsmtp, P=[IPC]\n");
        assert_eq!(parsed.channels.len(), 4);
        assert_eq!(
            parsed.warnings,
            vec![ConfigWarning::DuplicateChannel {
                line: 2,
                name: "smtp".to_string()
            }]
        );
    }

    #[test]
    fn test_mailer_name_terminators() {
        let parsed = parse_sendmail_cf(
            b"Mlocal\tP=/bin/mail\nMuucp-old\nMabcdefghijklmnopqrstuvwxyz, P=x\nM, P=y\n",
        );
        assert_eq!(
            names(&parsed)[3..],
            ["local", "uucp-old", "abcdefghijklmnopqrst", ""]
        );
    }

    #[test]
    fn test_too_many_mailers() {
        let mut content = String::new();
        for i in 0..30 {
            content.push_str(&format!("Mm{}, P=x\n", i));
        }
        let parsed = parse_sendmail_cf(content.as_bytes());
        assert_eq!(parsed.channels.len(), MAX_CHANNELS);
        assert_eq!(parsed.warnings.len(), 30 - (MAX_CHANNELS - 3));
        assert!(matches!(
            parsed.warnings[0],
            ConfigWarning::TooManyChannels { line: 23, .. }
        ));
    }

    #[test]
    fn test_long_form_options() {
        let parsed = parse_sendmail_cf(
            b"O statusfile = /var/log/sendmail.st\nO QUEUEDIRECTORY=/q\n",
        );
        assert_eq!(parsed.stats_path, Some(PathBuf::from("/var/log/sendmail.st")));
        assert_eq!(parsed.queue_path, Some(PathBuf::from("/q")));
    }

    #[test]
    fn test_long_form_other_keyword_ignored() {
        let parsed = parse_sendmail_cf(b"O StatusFileMode=0600\nO QueueDirectoryX=/tmp\n");
        assert_eq!(parsed.stats_path, None);
        assert_eq!(parsed.queue_path, None);
        assert!(parsed.warnings.is_empty());
    }

    #[test]
    fn test_long_form_missing_equals() {
        let parsed = parse_sendmail_cf(b"\nO StatusFile /etc/mail/statistics\n");
        assert_eq!(parsed.stats_path, None);
        assert_eq!(parsed.warnings, vec![ConfigWarning::MissingEquals { line: 2 }]);
    }

    #[test]
    fn test_short_form_options() {
        let parsed = parse_sendmail_cf(b"OS/etc/mail/sendmail.st\r\nOQ/var/spool/mqueue\n");
        assert_eq!(parsed.stats_path, Some(PathBuf::from("/etc/mail/sendmail.st")));
        assert_eq!(parsed.queue_path, Some(PathBuf::from("/var/spool/mqueue")));
    }

    #[test]
    fn test_path_too_long() {
        let long = "x".repeat(MAX_PATH_LEN + 1);
        let content = format!("OS/{}\nO QueueDirectory={}\n", long, long);
        let parsed = parse_sendmail_cf(content.as_bytes());
        assert_eq!(parsed.stats_path, None);
        assert_eq!(parsed.queue_path, None);
        assert_eq!(
            parsed.warnings,
            vec![
                ConfigWarning::PathTooLong { line: 1 },
                ConfigWarning::PathTooLong { line: 2 }
            ]
        );
    }

    #[test]
    fn test_long_line_skipped_and_resynchronised() {
        let content = format!("M{}\nMsmtp, P=[IPC]\n", "a".repeat(MAX_LINE_LEN));
        let parsed = parse_sendmail_cf(content.as_bytes());
        assert_eq!(names(&parsed)[3..], ["smtp"]);
        assert_eq!(parsed.warnings, vec![ConfigWarning::LineTooLong { line: 1 }]);
        assert_eq!(parsed.warnings[0].line(), 1);
    }

    #[test]
    fn test_line_at_bound_accepted() {
        let content = format!("Mx{}\n", " ".repeat(MAX_LINE_LEN - 2));
        let parsed = parse_sendmail_cf(content.as_bytes());
        assert_eq!(names(&parsed)[3..], ["x"]);
        assert!(parsed.warnings.is_empty());
    }

    #[test]
    fn test_unterminated_last_line_skipped() {
        let parsed = parse_sendmail_cf(b"Mlocal, P=/bin/mail\nOS/var/log/st");
        assert_eq!(names(&parsed)[3..], ["local"]);
        assert_eq!(parsed.stats_path, None);
        assert_eq!(parsed.warnings, vec![ConfigWarning::LineTooLong { line: 2 }]);

        let parsed = parse_sendmail_cf(b"Msmtp, P=[IPC]");
        assert_eq!(parsed.channels.len(), 3);
        assert_eq!(parsed.warnings, vec![ConfigWarning::LineTooLong { line: 1 }]);
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_path_kept_verbatim() {
        use std::os::unix::ffi::OsStrExt;

        let parsed = parse_sendmail_cf(b"OS/var/log/st\xff\nO QueueDirectory=/q\xfe\n");
        let stats = parsed.stats_path.unwrap();
        assert_eq!(stats.as_os_str().as_bytes(), b"/var/log/st\xff");
        let queue = parsed.queue_path.unwrap();
        assert_eq!(queue.as_os_str().as_bytes(), b"/q\xfe");
    }

    #[test]
    fn test_empty_and_unrelated_content() {
        assert_eq!(parse_sendmail_cf(b""), ParsedConfig::default());
        let parsed = parse_sendmail_cf(b"# comment\nCwlocalhost\nR$* $@ $1\n\n");
        assert_eq!(parsed, ParsedConfig::default());
    }

    #[test]
    fn test_reparse_is_idempotent() {
        let fs = MockFs::typical_sendmail();
        let first = read_sendmail_cf(&fs, Path::new(SENDMAIL_CF)).unwrap();
        let second = read_sendmail_cf(&fs, Path::new(SENDMAIL_CF)).unwrap();
        assert_eq!(first, second);
    }
}
