//! Stable enumerations shared between the parser and its host.
//!
//! Every enumeration here carries a fixed numeric code so hosts that only deal
//! in integers (foreign bindings, configuration files) can round-trip values
//! through [`TryFrom<i32>`]. Inside the crate the enums are used directly and
//! no out-of-range value can exist.

use std::fmt;

use crate::protocol::CodeError;

macro_rules! coded_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $code:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(i32)]
        $vis enum $name {
            $( $(#[$vmeta])* $variant = $code ),+
        }

        impl $name {
            /// Returns the stable numeric code of this value.
            #[inline]
            #[must_use]
            pub const fn code(self) -> i32 {
                self as i32
            }
        }

        impl TryFrom<i32> for $name {
            type Error = CodeError;

            fn try_from(code: i32) -> Result<Self, CodeError> {
                match code {
                    $( $code => Ok(Self::$variant), )+
                    _ => Err(CodeError::new(stringify!($name), code)),
                }
            }
        }

        impl From<$name> for i32 {
            fn from(value: $name) -> Self {
                value.code()
            }
        }
    };
}

coded_enum! {
    /// Per-direction status of the parser, returned by every feed.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum StreamState {
        /// Nothing has been fed in this direction yet.
        New = 0,
        /// The last feed ended in the middle of a message.
        Open = 1,
        /// The connection was closed, further data is ignored.
        Closed = 2,
        /// Parsing failed. Terminal for the direction.
        Error = 3,
        /// The connection switched to an opaque tunnel (CONNECT or upgrade).
        Tunnel = 4,
        /// Parsing must continue on the other direction before this one can make progress.
        DataOther = 5,
        /// A handler asked the parser to suspend this direction.
        Stop = 6,
        /// All supplied data was consumed, more is welcome.
        Data = 9,
    }
}

coded_enum! {
    /// Control signal returned by a hook handler.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum HookResult {
        /// Abort parsing of the current direction.
        Error = -1,
        /// The handler was not interested, default behaviour applies.
        Declined = 0,
        /// Continue normally.
        Ok = 1,
        /// Suspend parsing of the current direction.
        Stop = 4,
    }
}

coded_enum! {
    /// HTTP protocol version marker.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
    pub enum Protocol {
        #[default]
        Unknown = -1,
        Http09 = 9,
        Http10 = 100,
        Http11 = 101,
    }
}

coded_enum! {
    /// Content coding applied to a message body.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub enum Compression {
        #[default]
        None = 0,
        Gzip = 1,
        Deflate = 2,
    }
}

coded_enum! {
    /// Severity of a log record, ordered from most severe to most verbose.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
    pub enum LogLevel {
        Error = 1,
        Warning = 2,
        #[default]
        Notice = 3,
        Info = 4,
        Debug = 5,
        Debug2 = 6,
    }
}

/// The two independently parsed halves of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Request,
    Response,
}

impl Protocol {
    /// Parses a protocol token such as `HTTP/1.1`.
    ///
    /// Anything that is not a recognised `HTTP/x.y` token yields [`Protocol::Unknown`].
    pub fn parse(token: &[u8]) -> Self {
        match token.trim_ascii() {
            b"HTTP/1.1" => Protocol::Http11,
            b"HTTP/1.0" => Protocol::Http10,
            b"HTTP/0.9" => Protocol::Http09,
            _ => Protocol::Unknown,
        }
    }
}

impl Compression {
    /// Selects the coding named by a `Content-Encoding` value.
    pub fn from_content_encoding(value: &[u8]) -> Self {
        let value = value.trim_ascii();
        if value.eq_ignore_ascii_case(b"gzip") || value.eq_ignore_ascii_case(b"x-gzip") {
            Compression::Gzip
        } else if value.eq_ignore_ascii_case(b"deflate") {
            Compression::Deflate
        } else {
            Compression::None
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Request => f.write_str("request"),
            Direction::Response => f.write_str("response"),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Error => "error",
            LogLevel::Warning => "warning",
            LogLevel::Notice => "notice",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Debug2 => "debug2",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(StreamState::Data.code(), 9);
        assert_eq!(HookResult::Error.code(), -1);
        assert_eq!(Protocol::Http11.code(), 101);
        assert_eq!(LogLevel::Debug2.code(), 6);
    }

    #[test]
    fn rejects_unknown_codes() {
        assert_eq!(HookResult::try_from(4).unwrap(), HookResult::Stop);
        assert!(HookResult::try_from(2).is_err());
        assert!(StreamState::try_from(7).is_err());
        assert!(Compression::try_from(3).is_err());
    }

    #[test]
    fn enums_with_an_error_variant_convert() {
        assert_eq!(StreamState::try_from(StreamState::Error.code()), Ok(StreamState::Error));
        assert_eq!(HookResult::try_from(HookResult::Error.code()), Ok(HookResult::Error));
        assert_eq!(LogLevel::try_from(1), Ok(LogLevel::Error));
        assert_eq!(LogLevel::try_from(42).unwrap_err().kind(), "LogLevel");
    }

    #[test]
    fn log_levels_order_by_verbosity() {
        assert!(LogLevel::Error < LogLevel::Warning);
        assert!(LogLevel::Debug < LogLevel::Debug2);
    }

    #[test]
    fn parse_protocol() {
        assert_eq!(Protocol::parse(b"HTTP/1.1"), Protocol::Http11);
        assert_eq!(Protocol::parse(b" HTTP/1.0\r"), Protocol::Http10);
        assert_eq!(Protocol::parse(b"HTTP/2"), Protocol::Unknown);
    }

    #[test]
    fn parse_content_encoding() {
        assert_eq!(Compression::from_content_encoding(b"GZIP"), Compression::Gzip);
        assert_eq!(Compression::from_content_encoding(b" deflate "), Compression::Deflate);
        assert_eq!(Compression::from_content_encoding(b"br"), Compression::None);
    }
}
