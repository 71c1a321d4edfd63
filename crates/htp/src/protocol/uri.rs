//! Request target decomposition.
//!
//! Every component is optional and absent components stay `None`, so a
//! handler can tell an absent query (`/a`) from an empty one (`/a?`).
//! Components hold the bytes as sent; a target need not be valid UTF-8.

use std::borrow::Cow;
use std::fmt;

/// Components of a request URI.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Uri {
    pub scheme: Option<Vec<u8>>,
    pub username: Option<Vec<u8>>,
    pub password: Option<Vec<u8>>,
    pub hostname: Option<Vec<u8>>,
    pub port: Option<Vec<u8>>,
    /// Numeric port, present only when `port` is a valid port number.
    pub port_number: Option<u16>,
    pub path: Option<Vec<u8>>,
    pub query: Option<Vec<u8>>,
    pub fragment: Option<Vec<u8>>,
}

impl Uri {
    /// Splits a request target into its components.
    ///
    /// Accepts origin form (`/p?q#f`), absolute form (`http://u:p@h:1/p`) and the asterisk form.
    pub fn parse(raw: &[u8]) -> Self {
        let mut uri = Uri::default();
        let mut rest = raw;

        if let Some(pos) = memchr::memchr(b'#', rest) {
            uri.fragment = Some(rest[pos + 1..].to_vec());
            rest = &rest[..pos];
        }

        if let Some(pos) = memchr::memchr(b'?', rest) {
            uri.query = Some(rest[pos + 1..].to_vec());
            rest = &rest[..pos];
        }

        if let Some(pos) = memchr::memmem::find(rest, b"://") {
            let scheme = &rest[..pos];
            if !scheme.is_empty() && scheme.iter().all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'-' | b'.')) {
                uri.scheme = Some(scheme.to_vec());
                rest = &rest[pos + 3..];

                let authority_end = memchr::memchr(b'/', rest).unwrap_or(rest.len());
                uri.fill_authority(&rest[..authority_end]);
                rest = &rest[authority_end..];
            }
        }

        if !rest.is_empty() {
            uri.path = Some(rest.to_vec());
        }

        uri
    }

    /// Parses a bare authority, as sent in the target of a `CONNECT` request.
    pub fn parse_authority(raw: &[u8]) -> Self {
        let mut uri = Uri::default();
        uri.fill_authority(raw.trim_ascii());
        uri
    }

    fn fill_authority(&mut self, mut authority: &[u8]) {
        if let Some(pos) = memchr::memrchr(b'@', authority) {
            let userinfo = &authority[..pos];
            match memchr::memchr(b':', userinfo) {
                Some(colon) => {
                    self.username = Some(userinfo[..colon].to_vec());
                    self.password = Some(userinfo[colon + 1..].to_vec());
                }
                None => self.username = Some(userinfo.to_vec()),
            }
            authority = &authority[pos + 1..];
        }

        // an IPv6 literal keeps its colons inside the brackets
        let port_search_start = match authority.first() {
            Some(b'[') => memchr::memchr(b']', authority).unwrap_or(0),
            _ => 0,
        };

        match memchr::memrchr(b':', &authority[port_search_start..]) {
            Some(colon) => {
                let colon = colon + port_search_start;
                self.hostname = Some(authority[..colon].to_vec());
                let port = &authority[colon + 1..];
                self.port = Some(port.to_vec());
                self.port_number = std::str::from_utf8(port).ok().and_then(|port| port.parse().ok());
            }
            None if !authority.is_empty() => self.hostname = Some(authority.to_vec()),
            None => {}
        }
    }

    /// Returns true if no component is present.
    pub fn is_empty(&self) -> bool {
        *self == Uri::default()
    }

    /// Lists the present components as `(name, value)` pairs, with invalid UTF-8 replaced.
    ///
    /// Absent components are omitted rather than reported as empty strings.
    pub fn components(&self) -> Vec<(&'static str, String)> {
        let mut components = Vec::with_capacity(9);
        let fields = [
            ("scheme", &self.scheme),
            ("username", &self.username),
            ("password", &self.password),
            ("hostname", &self.hostname),
            ("port", &self.port),
        ];
        for (name, value) in fields {
            if let Some(value) = value {
                components.push((name, text(value).into_owned()));
            }
        }
        if let Some(port_number) = self.port_number {
            components.push(("port_number", port_number.to_string()));
        }
        let fields = [("path", &self.path), ("query", &self.query), ("fragment", &self.fragment)];
        for (name, value) in fields {
            if let Some(value) = value {
                components.push((name, text(value).into_owned()));
            }
        }
        components
    }
}

/// Writes the target back out, with invalid UTF-8 replaced.
impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(scheme) = &self.scheme {
            write!(f, "{}://", text(scheme))?;
        }
        if let Some(username) = &self.username {
            f.write_str(&text(username))?;
            if let Some(password) = &self.password {
                write!(f, ":{}", text(password))?;
            }
            f.write_str("@")?;
        }
        if let Some(hostname) = &self.hostname {
            f.write_str(&text(hostname))?;
        }
        if let Some(port) = &self.port {
            write!(f, ":{}", text(port))?;
        }
        if let Some(path) = &self.path {
            f.write_str(&text(path))?;
        }
        if let Some(query) = &self.query {
            write!(f, "?{}", text(query))?;
        }
        if let Some(fragment) = &self.fragment {
            write!(f, "#{}", text(fragment))?;
        }
        Ok(())
    }
}

fn text(bytes: &[u8]) -> Cow<'_, str> {
    String::from_utf8_lossy(bytes)
}
