//! Context object tying configuration, collectors and table lookup together.
//!
//! A host drives [`MtaContext`] in two ways: it feeds configuration
//! directives, and it fetches rows. All state lives in the context and every
//! operation takes it by `&mut`, so requests are serialized by construction.

use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use crate::collector::cache::{Clock, RefreshCache};
use crate::collector::queue::QueueScanner;
use crate::collector::sendmail_cf::{ConfigWarning, read_sendmail_cf};
use crate::collector::statfile::{StatError, StatFileReader};
use crate::collector::traits::{FileSystem, OpenError};
use crate::config::{
    DEFAULT_CONFIG_PATHS, DEFAULT_QUEUE_PATHS, DEFAULT_STATS_PATHS, Directive, DirectiveError,
    ModuleConfig,
};
use crate::models::{ChannelList, StatLayout, StatisticsSnapshot};
use crate::table::{
    ChannelColumn, Column, DataSource, FetchMode, Field, FieldValue, Row, RowKey, SummaryColumn,
    TableId, channel_value, resolve_channel, resolve_summary, summary_value,
};

/// Error type for [`MtaContext::apply_directive`].
#[derive(Debug)]
pub enum ApplyError {
    /// Key or value rejected.
    Directive(DirectiveError),
    /// sendmail.cf could not be read.
    Config(OpenError),
    /// Statistics file could not be opened or recognized.
    Stats(StatError),
    /// Queue directory could not be opened.
    Queue(OpenError),
}

impl std::fmt::Display for ApplyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApplyError::Directive(e) => write!(f, "{}", e),
            ApplyError::Config(e) => write!(f, "{}", e),
            ApplyError::Stats(e) => write!(f, "{}", e),
            ApplyError::Queue(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ApplyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ApplyError::Directive(e) => Some(e),
            ApplyError::Config(e) | ApplyError::Queue(e) => Some(e),
            ApplyError::Stats(e) => Some(e),
        }
    }
}

impl From<DirectiveError> for ApplyError {
    fn from(e: DirectiveError) -> Self {
        ApplyError::Directive(e)
    }
}

/// State of the MTA statistics module.
pub struct MtaContext<F: FileSystem> {
    fs: F,
    config: ModuleConfig,
    channels: ChannelList,
    /// Whether a sendmail.cf has been read successfully.
    config_loaded: bool,
    cache: RefreshCache<F>,
}

impl<F: FileSystem + Clone> MtaContext<F> {
    /// Creates a context with default settings and only the built-in mailers.
    pub fn new(fs: F, clock: impl Clock + 'static) -> Self {
        Self {
            fs,
            config: ModuleConfig::default(),
            channels: ChannelList::with_builtins(),
            config_loaded: false,
            cache: RefreshCache::new(clock),
        }
    }

    pub fn config(&self) -> &ModuleConfig {
        &self.config
    }

    pub fn channels(&self) -> &ChannelList {
        &self.channels
    }

    /// Layout of the open statistics file.
    pub fn stats_layout(&self) -> Option<StatLayout> {
        self.cache.stats_source().map(|r| r.layout())
    }

    pub fn queue_dir(&self) -> Option<&Path> {
        self.cache.queue_source().map(|q| q.dir())
    }

    /// Current statistics snapshot, subject to the statistics TTL.
    pub fn statistics(&mut self) -> Option<&StatisticsSnapshot> {
        self.cache.get_stats(self.config.stats_ttl).ok()
    }

    /// Applies one `(key, value)` configuration directive.
    ///
    /// Path directives take effect immediately: the statistics file or queue
    /// directory is re-opened, and a configuration file is read and its
    /// declarations applied.
    pub fn apply_directive(&mut self, key: &str, value: &str) -> Result<(), ApplyError> {
        let directive = Directive::from_key(key).ok_or_else(|| {
            let err = DirectiveError::UnknownKey(key.to_string());
            warn!("{}", err);
            err
        })?;

        if let Err(e) = self.config.apply(directive, value) {
            warn!("{}", e);
            return Err(e.into());
        }
        debug!("{} = {:?}", directive, value.trim());

        match directive {
            Directive::StatsPath => {
                if let Some(path) = self.config.stats_path.clone() {
                    self.open_stats(path).map_err(ApplyError::Stats)?;
                }
            }
            Directive::ConfigPath => {
                if let Some(path) = self.config.config_path.clone() {
                    self.read_config_file(path).map_err(ApplyError::Config)?;
                }
            }
            Directive::QueuePath => {
                if let Some(path) = self.config.queue_path.clone() {
                    self.open_queue(path).map_err(ApplyError::Queue)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Reads sendmail.cf at `path`, replacing the mailer list.
    ///
    /// A statistics file or queue directory named in the file is opened right
    /// away; failures to do so are logged and leave that source unavailable.
    pub fn read_config_file(
        &mut self,
        path: impl Into<PathBuf>,
    ) -> Result<Vec<ConfigWarning>, OpenError> {
        let path = path.into();
        let parsed = read_sendmail_cf(&self.fs, &path)?;

        self.config.config_path = Some(path);
        self.config_loaded = true;
        self.channels = parsed.channels;

        if let Some(stats_path) = parsed.stats_path {
            // Already logged by open_stats.
            let _ = self.open_stats(stats_path);
        }
        if let Some(queue_path) = parsed.queue_path {
            let _ = self.open_queue(queue_path);
        }
        Ok(parsed.warnings)
    }

    /// (Re-)opens the statistics file and detects its layout.
    ///
    /// The previous handle and its cached snapshot are dropped whether or not
    /// the new file opens.
    pub fn open_stats(&mut self, path: impl Into<PathBuf>) -> Result<StatLayout, StatError> {
        let path = path.into();
        self.config.stats_path = Some(path.clone());

        match StatFileReader::open(&self.fs, path, self.config.geometry) {
            Ok(reader) => {
                let layout = reader.layout();
                info!(
                    "statistics file {:?} opened ({})",
                    reader.path(),
                    layout.describe()
                );
                self.cache.set_stats(Some(reader));
                Ok(layout)
            }
            Err(e) => {
                warn!("{}", e);
                self.cache.set_stats(None);
                Err(e)
            }
        }
    }

    /// (Re-)opens the queue directory.
    pub fn open_queue(&mut self, path: impl Into<PathBuf>) -> Result<(), OpenError> {
        let path = path.into();
        self.config.queue_path = Some(path.clone());

        match QueueScanner::open(&self.fs, path) {
            Ok(scanner) => {
                info!("mail queue directory {:?} opened", scanner.dir());
                self.cache.set_queue(Some(scanner));
                Ok(())
            }
            Err(e) => {
                warn!("{}", e);
                self.cache.set_queue(None);
                Err(e)
            }
        }
    }

    /// Tries the standard sendmail locations for anything not configured.
    ///
    /// sendmail.cf is only searched if none has been read yet; the statistics
    /// file and queue directory only if they are not open.
    pub fn init_defaults(&mut self) {
        if !self.config_loaded {
            for path in DEFAULT_CONFIG_PATHS {
                if self.read_config_file(path).is_ok() {
                    break;
                }
            }
        }
        if self.cache.stats_source().is_none() {
            for path in DEFAULT_STATS_PATHS {
                if self.open_stats(path).is_ok() {
                    break;
                }
            }
        }
        if self.cache.queue_source().is_none() {
            for path in DEFAULT_QUEUE_PATHS {
                if self.open_queue(path).is_ok() {
                    break;
                }
            }
        }
    }

    fn resolve(&self, table: TableId, key: &[u32], mode: FetchMode) -> Option<RowKey> {
        let index = self.config.table_index;
        match table {
            TableId::Summary => resolve_summary(index, key, mode),
            TableId::Channel => resolve_channel(index, self.channels.len() as u32, key, mode),
        }
    }

    /// Looks up a row and computes every column that has a value.
    pub fn fetch(&mut self, table: TableId, key: &[u32], mode: FetchMode) -> Option<Row> {
        let row_key = self.resolve(table, key, mode)?;
        let fields = match row_key.ordinal {
            None => SummaryColumn::ALL
                .into_iter()
                .filter_map(|c| {
                    let value = self.summary_field(c)?;
                    Some(Field {
                        column: Column::Summary(c),
                        value,
                    })
                })
                .collect(),
            Some(ordinal) => ChannelColumn::ALL
                .into_iter()
                .filter_map(|c| {
                    let value = self.channel_field(c, ordinal)?;
                    Some(Field {
                        column: Column::Channel(c),
                        value,
                    })
                })
                .collect(),
        };
        Some(Row {
            key: row_key,
            fields,
        })
    }

    /// Looks up a row and computes the column with MIB sub-id `sub_id`.
    pub fn fetch_field(
        &mut self,
        table: TableId,
        key: &[u32],
        mode: FetchMode,
        sub_id: u32,
    ) -> Option<(RowKey, FieldValue)> {
        let column = match table {
            TableId::Summary => SummaryColumn::from_sub_id(sub_id).map(Column::Summary),
            TableId::Channel => ChannelColumn::from_sub_id(sub_id).map(Column::Channel),
        };
        let Some(column) = column else {
            error!("unknown column {} in {}", sub_id, table.name());
            return None;
        };

        let row_key = self.resolve(table, key, mode)?;
        let value = match (column, row_key.ordinal) {
            (Column::Summary(c), None) => self.summary_field(c),
            (Column::Channel(c), Some(ordinal)) => self.channel_field(c, ordinal),
            _ => None,
        }?;
        Some((row_key, value))
    }

    /// All rows of a table, in key order.
    pub fn walk(&mut self, table: TableId) -> Vec<Row> {
        let mut rows = Vec::new();
        let mut key = Vec::new();
        while let Some(row) = self.fetch(table, &key, FetchMode::Next) {
            key = row.key.as_oid_suffix();
            rows.push(row);
        }
        rows
    }

    fn summary_field(&mut self, column: SummaryColumn) -> Option<FieldValue> {
        match column.source() {
            DataSource::Statistics => {
                let stats = self.cache.get_stats(self.config.stats_ttl).ok()?;
                summary_value(column, Some(stats), None)
            }
            DataSource::Queue => {
                let queue = self.cache.get_queue(self.config.queue_ttl).ok()?;
                summary_value(column, None, Some(queue))
            }
        }
    }

    fn channel_field(&mut self, column: ChannelColumn, ordinal: u32) -> Option<FieldValue> {
        let stats = match column.source() {
            Some(_) => Some(self.cache.get_stats(self.config.stats_ttl).ok()?),
            None => None,
        };
        channel_value(column, ordinal, &self.channels, stats)
    }
}
