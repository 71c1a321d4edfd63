//! Parser configuration.
//!
//! A [`Config`] is assembled with [`ConfigBuilder`] and never changes after
//! that. Parsers hold it behind an [`Arc`](std::sync::Arc), so one config can be
//! shared read-only by any number of connections, across threads.
//!
//! ```
//! use micro_htp::config::{Config, Personality};
//! use micro_htp::protocol::LogLevel;
//!
//! let config = Config::builder()
//!     .personality(Personality::Apache22)
//!     .log_level(LogLevel::Info)
//!     .tx_auto_destroy(false)
//!     .build();
//!
//! assert!(config.path().compress_separators);
//! ```

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::protocol::LogLevel;

/// Maximum size in bytes of a request or status line
const DEFAULT_MAX_LINE_BYTES: usize = 16 * 1024;

/// Maximum size in bytes allowed for an entire header section
const DEFAULT_MAX_HEADER_BYTES: usize = 16 * 1024;

/// Maximum number of fields in a header section
const DEFAULT_MAX_HEADER_NUM: usize = 64;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid server personality: {0}")]
    InvalidPersonality(i32),

    #[error("invalid log level: {0}")]
    InvalidLogLevel(i32),

    #[error("invalid limit {name}: {value}")]
    InvalidLimit { name: &'static str, value: usize },
}

/// Server behaviour presets. Each one adjusts the path normalization options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i32)]
pub enum Personality {
    #[default]
    Minimal = 0,
    Generic = 1,
    Ids = 2,
    Iis40 = 3,
    Iis50 = 4,
    Iis51 = 5,
    Iis60 = 6,
    Iis70 = 7,
    Iis75 = 8,
    Tomcat60 = 9,
    Apache = 10,
    Apache22 = 11,
}

impl TryFrom<i32> for Personality {
    type Error = ConfigError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        let personality = match code {
            0 => Personality::Minimal,
            1 => Personality::Generic,
            2 => Personality::Ids,
            3 => Personality::Iis40,
            4 => Personality::Iis50,
            5 => Personality::Iis51,
            6 => Personality::Iis60,
            7 => Personality::Iis70,
            8 => Personality::Iis75,
            9 => Personality::Tomcat60,
            10 => Personality::Apache,
            11 => Personality::Apache22,
            _ => return Err(ConfigError::InvalidPersonality(code)),
        };
        Ok(personality)
    }
}

/// What to do with a percent sequence that is not a valid encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum UrlEncodingHandling {
    /// Leave the sequence as it is, percent sign included.
    #[default]
    PreservePercent,
    /// Drop the percent sign, keep the following characters.
    RemovePercent,
    /// Decode the characters as if they were hex digits anyway.
    DecodeInvalid,
    /// Preserve, and expect the server to answer 400.
    Status400,
}

/// What to do with an unwanted byte (control character, invalid UTF-8) in the path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum UnwantedHandling {
    #[default]
    Ignore,
    Status400,
    Status404,
}

/// What to do with a NUL byte in the path, raw or percent encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NulHandling {
    #[default]
    Ignore,
    /// Cut the path at the NUL byte.
    Terminate,
    Status400,
    Status404,
}

/// Path normalization options.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PathConfig {
    /// Convert paths to lowercase.
    pub case_insensitive: bool,
    /// Compress sequential path separators into one.
    pub compress_separators: bool,
    /// Treat backslash as a path separator.
    pub backslash_separators: bool,
    /// Decode encoded path separators (`%2f`, and `%5c` with backslash separators).
    pub decode_separators: bool,
    /// Convert UTF-8 sequences to single bytes using a best-fit mapping.
    pub convert_utf8: bool,
    pub control_char_handling: UnwantedHandling,
    pub invalid_encoding_handling: UrlEncodingHandling,
    pub invalid_utf8_handling: UnwantedHandling,
    pub nul_encoded_handling: NulHandling,
    pub nul_raw_handling: NulHandling,
}

impl PathConfig {
    fn for_personality(personality: Personality) -> Self {
        let mut path = PathConfig::default();
        match personality {
            Personality::Minimal | Personality::Generic => {}
            Personality::Ids => {
                path.case_insensitive = true;
                path.backslash_separators = true;
                path.decode_separators = true;
                path.compress_separators = true;
                path.convert_utf8 = true;
            }
            Personality::Apache | Personality::Apache22 => {
                path.compress_separators = true;
                path.invalid_encoding_handling = UrlEncodingHandling::Status400;
                path.nul_encoded_handling = NulHandling::Status404;
                path.nul_raw_handling = NulHandling::Status400;
            }
            Personality::Tomcat60 => {
                path.compress_separators = true;
                path.invalid_encoding_handling = UrlEncodingHandling::Status400;
                path.nul_encoded_handling = NulHandling::Status400;
            }
            Personality::Iis40 | Personality::Iis50 | Personality::Iis51 | Personality::Iis60 => {
                path.case_insensitive = true;
                path.backslash_separators = true;
                path.decode_separators = true;
                path.compress_separators = true;
                path.convert_utf8 = personality != Personality::Iis40;
                path.invalid_encoding_handling = UrlEncodingHandling::PreservePercent;
                path.nul_encoded_handling = NulHandling::Terminate;
                path.control_char_handling = UnwantedHandling::Status400;
            }
            Personality::Iis70 | Personality::Iis75 => {
                path.case_insensitive = true;
                path.backslash_separators = true;
                path.decode_separators = true;
                path.compress_separators = true;
                path.convert_utf8 = true;
                path.invalid_encoding_handling = UrlEncodingHandling::Status400;
                path.nul_encoded_handling = NulHandling::Status400;
                path.control_char_handling = UnwantedHandling::Status400;
            }
        }
        path
    }
}

/// Immutable parser options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    personality: Personality,
    log_level: LogLevel,
    tx_auto_destroy: bool,
    generate_request_uri_normalized: bool,
    request_decompression: bool,
    response_decompression: bool,
    path: PathConfig,
    tmp_dir: PathBuf,
    max_line_bytes: usize,
    max_header_bytes: usize,
    max_header_num: usize,
}

impl Default for Config {
    /// The configuration of a parser created without one: everything at its default,
    /// with transactions destroyed as soon as they complete.
    fn default() -> Self {
        Config::builder().tx_auto_destroy(true).build()
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    pub fn personality(&self) -> Personality {
        self.personality
    }

    /// Log records more verbose than this level are dropped.
    pub fn log_level(&self) -> LogLevel {
        self.log_level
    }

    /// Whether transactions are removed from the store once both sides completed.
    pub fn tx_auto_destroy(&self) -> bool {
        self.tx_auto_destroy
    }

    pub fn generate_request_uri_normalized(&self) -> bool {
        self.generate_request_uri_normalized
    }

    pub fn request_decompression(&self) -> bool {
        self.request_decompression
    }

    pub fn response_decompression(&self) -> bool {
        self.response_decompression
    }

    pub fn path(&self) -> &PathConfig {
        &self.path
    }

    /// Directory that receives extracted request files.
    pub fn tmp_dir(&self) -> &Path {
        &self.tmp_dir
    }

    pub fn max_line_bytes(&self) -> usize {
        self.max_line_bytes
    }

    pub fn max_header_bytes(&self) -> usize {
        self.max_header_bytes
    }

    pub fn max_header_num(&self) -> usize {
        self.max_header_num
    }
}

/// Builder for [`Config`].
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config {
                personality: Personality::Minimal,
                log_level: LogLevel::default(),
                tx_auto_destroy: false,
                generate_request_uri_normalized: true,
                request_decompression: false,
                response_decompression: true,
                path: PathConfig::default(),
                tmp_dir: std::env::temp_dir(),
                max_line_bytes: DEFAULT_MAX_LINE_BYTES,
                max_header_bytes: DEFAULT_MAX_HEADER_BYTES,
                max_header_num: DEFAULT_MAX_HEADER_NUM,
            },
        }
    }

    /// Applies a server personality. This replaces all path options set so far.
    #[must_use]
    pub fn personality(mut self, personality: Personality) -> Self {
        self.config.personality = personality;
        self.config.path = PathConfig::for_personality(personality);
        self
    }

    /// Same as [`ConfigBuilder::personality`] for a raw numeric code.
    pub fn personality_code(self, code: i32) -> Result<Self, ConfigError> {
        Ok(self.personality(Personality::try_from(code)?))
    }

    #[must_use]
    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.config.log_level = level;
        self
    }

    /// Same as [`ConfigBuilder::log_level`] for a raw numeric code.
    pub fn log_level_code(self, code: i32) -> Result<Self, ConfigError> {
        let level = LogLevel::try_from(code).map_err(|e| ConfigError::InvalidLogLevel(e.code()))?;
        Ok(self.log_level(level))
    }

    #[must_use]
    pub fn tx_auto_destroy(mut self, enabled: bool) -> Self {
        self.config.tx_auto_destroy = enabled;
        self
    }

    #[must_use]
    pub fn generate_request_uri_normalized(mut self, enabled: bool) -> Self {
        self.config.generate_request_uri_normalized = enabled;
        self
    }

    #[must_use]
    pub fn request_decompression(mut self, enabled: bool) -> Self {
        self.config.request_decompression = enabled;
        self
    }

    #[must_use]
    pub fn response_decompression(mut self, enabled: bool) -> Self {
        self.config.response_decompression = enabled;
        self
    }

    /// Replaces all path options at once.
    #[must_use]
    pub fn path(mut self, path: PathConfig) -> Self {
        self.config.path = path;
        self
    }

    /// Adjusts individual path options.
    #[must_use]
    pub fn path_with(mut self, f: impl FnOnce(&mut PathConfig)) -> Self {
        f(&mut self.config.path);
        self
    }

    #[must_use]
    pub fn tmp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.tmp_dir = dir.into();
        self
    }

    pub fn max_line_bytes(mut self, max: usize) -> Result<Self, ConfigError> {
        crate::ensure!(max > 0, ConfigError::InvalidLimit { name: "max_line_bytes", value: max });
        self.config.max_line_bytes = max;
        Ok(self)
    }

    pub fn max_header_bytes(mut self, max: usize) -> Result<Self, ConfigError> {
        crate::ensure!(max > 0, ConfigError::InvalidLimit { name: "max_header_bytes", value: max });
        self.config.max_header_bytes = max;
        Ok(self)
    }

    pub fn max_header_num(mut self, max: usize) -> Result<Self, ConfigError> {
        crate::ensure!(max > 0, ConfigError::InvalidLimit { name: "max_header_num", value: max });
        self.config.max_header_num = max;
        Ok(self)
    }

    pub fn build(self) -> Config {
        self.config
    }
}
