//! Multi-valued, ordered, case-insensitive header collection.

use http::{HeaderMap, HeaderName, HeaderValue};

use crate::{ContentType, Error, Result};

/// Ordered header collection shared by canonical requests and responses.
///
/// Names are stored lower-cased; lookups ignore case. Repeated names keep
/// their insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(HeaderName, HeaderValue)>,
}

fn parse_name(name: &str) -> Result<HeaderName> {
    HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| Error::invalid_header(format!("{name:?}: {e}")))
}

fn parse_value(name: &str, value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| Error::invalid_header(format!("{name}: {e}")))
}

impl Headers {
    /// Creates an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries, counting repeated names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// No entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether a header with this name is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries
            .iter()
            .any(|(n, _)| n.as_str().eq_ignore_ascii_case(name))
    }

    /// All values for `name` joined with `", "`.
    ///
    /// Values that are not visible ASCII are skipped.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<String> {
        let values = self.get_all(name);
        if values.is_empty() {
            None
        } else {
            Some(values.join(", "))
        }
    }

    /// First value for `name`.
    #[must_use]
    pub fn first(&self, name: &str) -> Option<&str> {
        self.get_all(name).into_iter().next()
    }

    /// Every value for `name`, in insertion order.
    #[must_use]
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(n, _)| n.as_str().eq_ignore_ascii_case(name))
            .filter_map(|(_, v)| v.to_str().ok())
            .collect()
    }

    /// Replaces every value of `name` with `value`.
    ///
    /// The new entry takes the position of the first existing one.
    pub fn set(&mut self, name: &str, value: &str) -> Result<()> {
        let header_name = parse_name(name)?;
        let header_value = parse_value(name, value)?;
        self.insert(header_name, header_value);
        Ok(())
    }

    /// Adds a value, keeping existing ones.
    pub fn append(&mut self, name: &str, value: &str) -> Result<()> {
        let header_name = parse_name(name)?;
        let header_value = parse_value(name, value)?;
        self.entries.push((header_name, header_value));
        Ok(())
    }

    /// Typed variant of [`Headers::set`].
    pub fn insert(&mut self, name: HeaderName, value: HeaderValue) {
        match self.entries.iter().position(|(n, _)| *n == name) {
            Some(index) => {
                self.entries.retain(|(n, _)| *n != name);
                self.entries.insert(index, (name, value));
            }
            None => self.entries.push((name, value)),
        }
    }

    /// Removes every value of `name`. Returns `true` if something was removed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries
            .retain(|(n, _)| !n.as_str().eq_ignore_ascii_case(name));
        before != self.entries.len()
    }

    /// Iterates `(name, value)` pairs in order.
    ///
    /// Values that are not visible ASCII are skipped; use
    /// [`Headers::entries`] for raw access.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .filter_map(|(n, v)| v.to_str().ok().map(|v| (n.as_str(), v)))
    }

    /// Raw entries in order.
    #[must_use]
    pub fn entries(&self) -> &[(HeaderName, HeaderValue)] {
        &self.entries
    }

    /// Classified `Content-Type`, if present.
    #[must_use]
    pub fn content_type(&self) -> Option<ContentType> {
        self.first(http::header::CONTENT_TYPE.as_str())
            .map(ContentType::from_mime)
    }

    /// Builds an [`http::HeaderMap`], keeping every value.
    #[must_use]
    pub fn to_header_map(&self) -> HeaderMap {
        let mut map = HeaderMap::with_capacity(self.entries.len());
        for (name, value) in &self.entries {
            map.append(name.clone(), value.clone());
        }
        map
    }
}

impl From<&HeaderMap> for Headers {
    fn from(map: &HeaderMap) -> Self {
        map.iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }
}

impl FromIterator<(HeaderName, HeaderValue)> for Headers {
    fn from_iter<T: IntoIterator<Item = (HeaderName, HeaderValue)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Headers {
    type Item = (&'a str, &'a str);
    type IntoIter = Box<dyn Iterator<Item = (&'a str, &'a str)> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

#[cfg(test)]
mod tests {
    use assert2::check;

    use super::*;

    #[test]
    fn lookups_ignore_case() {
        let mut headers = Headers::new();
        headers.set("X-Custom-Header", "value").expect("set");

        check!(headers.contains("x-custom-header"));
        check!(headers.get("X-CUSTOM-HEADER") == Some("value".to_string()));
        check!(headers.iter().next() == Some(("x-custom-header", "value")));
    }

    #[test]
    fn append_keeps_duplicates_in_order() {
        let mut headers = Headers::new();
        headers.append("accept", "text/html").expect("append");
        headers.append("x-other", "1").expect("append");
        headers.append("Accept", "application/json").expect("append");

        check!(headers.len() == 3);
        check!(headers.get_all("accept") == vec!["text/html", "application/json"]);
        check!(headers.get("accept") == Some("text/html, application/json".to_string()));
        check!(headers.first("accept") == Some("text/html"));
    }

    #[test]
    fn set_replaces_every_value_in_place() {
        let mut headers = Headers::new();
        headers.append("a", "1").expect("append");
        headers.append("b", "2").expect("append");
        headers.append("a", "3").expect("append");

        headers.set("A", "4").expect("set");

        let pairs: Vec<_> = headers.iter().collect();
        check!(pairs == vec![("a", "4"), ("b", "2")]);
    }

    #[test]
    fn remove_drops_all_values() {
        let mut headers = Headers::new();
        headers.append("a", "1").expect("append");
        headers.append("a", "2").expect("append");

        check!(headers.remove("A"));
        check!(!headers.remove("a"));
        check!(headers.is_empty());
    }

    #[test]
    fn invalid_headers_are_rejected() {
        let mut headers = Headers::new();
        let err = headers.set("bad name", "v").expect_err("invalid name");
        check!(matches!(err, Error::InvalidHeader(_)));

        let err = headers.set("x", "line\nbreak").expect_err("invalid value");
        check!(matches!(err, Error::InvalidHeader(_)));
    }

    #[test]
    fn header_map_round_trip() {
        let mut headers = Headers::new();
        headers.append("set-cookie", "a=1").expect("append");
        headers.append("set-cookie", "b=2").expect("append");
        headers.set("content-type", "application/json").expect("set");

        let map = headers.to_header_map();
        check!(map.get_all("set-cookie").iter().count() == 2);

        let back = Headers::from(&map);
        check!(back.get_all("set-cookie") == vec!["a=1", "b=2"]);
        check!(back.content_type() == Some(ContentType::Json));
    }
}
