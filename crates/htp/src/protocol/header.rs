//! Ordered header collection.
//!
//! Unlike `http::HeaderMap`, the table keeps names exactly as they were
//! received and never merges repeated fields, so the host can see the message
//! the way it crossed the wire.

use bytes::Bytes;

/// A single header field as received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    name: Bytes,
    value: Bytes,
}

impl Header {
    pub fn new(name: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self { name: name.into(), value: value.into() }
    }

    /// Raw name, case preserved.
    pub fn name(&self) -> &[u8] {
        &self.name
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Name as text, lossy for non UTF-8 bytes.
    pub fn name_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.name)
    }

    /// Value as text, lossy for non UTF-8 bytes.
    pub fn value_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.value)
    }

    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name.as_bytes())
    }
}

/// Insertion ordered, duplicate preserving header table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderTable {
    headers: Vec<Header>,
}

impl HeaderTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { headers: Vec::with_capacity(capacity) }
    }

    pub fn append(&mut self, name: impl Into<Bytes>, value: impl Into<Bytes>) {
        self.headers.push(Header::new(name, value));
    }

    /// Returns the value of the first header whose name matches, ignoring ASCII case.
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.get_header(name).map(Header::value)
    }

    /// Same as [`HeaderTable::get`] but returns the whole entry.
    pub fn get_header(&self, name: &str) -> Option<&Header> {
        self.headers.iter().find(|header| header.is(name))
    }

    /// Returns every value recorded under `name`, in arrival order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a [u8]> + 'a {
        self.headers.iter().filter(move |header| header.is(name)).map(Header::value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get_header(name).is_some()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Header> {
        self.headers.iter()
    }

    /// Full enumeration as `(name, value)` text pairs, duplicates kept as separate entries.
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        self.headers.iter().map(|header| (header.name_str().into_owned(), header.value_str().into_owned())).collect()
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}

impl<'a> IntoIterator for &'a HeaderTable {
    type Item = &'a Header;
    type IntoIter = std::slice::Iter<'a, Header>;

    fn into_iter(self) -> Self::IntoIter {
        self.headers.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_duplicates_in_order() {
        let mut table = HeaderTable::new();
        table.append("Set-Cookie", "a=1");
        table.append("Host", "example.com");
        table.append("Set-Cookie", "b=2");

        assert_eq!(table.len(), 3);
        assert_eq!(table.get("set-cookie"), Some(&b"a=1"[..]));
        assert_eq!(table.get_all("Set-Cookie").collect::<Vec<_>>(), vec![&b"a=1"[..], &b"b=2"[..]]);

        let pairs = table.to_pairs();
        assert_eq!(pairs[0], ("Set-Cookie".to_string(), "a=1".to_string()));
        assert_eq!(pairs[2], ("Set-Cookie".to_string(), "b=2".to_string()));
    }

    #[test]
    fn preserves_name_case() {
        let mut table = HeaderTable::new();
        table.append("X-CuStOm", "v");

        let header = table.iter().next().unwrap();
        assert_eq!(header.name(), b"X-CuStOm");
        assert!(table.contains("x-custom"));
        assert_eq!(table.get("missing"), None);
    }
}
