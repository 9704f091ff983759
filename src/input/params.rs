//! Parameter descriptors for logical inputs
//!
//! A [`ParamPackage`] is the opaque key-value descriptor that tells the device
//! factory which physical source feeds a logical input. It is stored in the
//! settings file in a compact text form:
//!
//! ```text
//! engine:keyboard,code:65,guid:0000000000000000000000000000000a,port:0
//! ```
//!
//! Separators inside keys and values are escaped (`$0` for `:`, `$1` for `,`
//! and `$2` for `$`). An empty package serializes to `[empty]`.

use std::collections::BTreeMap;
use std::fmt;

use tracing::warn;

const KEY_VALUE_SEPARATOR: char = ':';
const PARAM_SEPARATOR: char = ',';
const ESCAPE_CHARACTER: char = '$';
const EMPTY_PLACEHOLDER: &str = "[empty]";

/// Ordered key-value descriptor for one logical input binding
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamPackage {
    data: BTreeMap<String, String>,
}

impl ParamPackage {
    /// Create an empty package
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a package from its serialized text form
    ///
    /// Malformed pairs are logged and skipped; parsing never fails.
    pub fn parse(serialized: &str) -> Self {
        let mut package = Self::new();
        if serialized.is_empty() || serialized == EMPTY_PLACEHOLDER {
            return package;
        }

        for pair in serialized.split(PARAM_SEPARATOR) {
            let parts: Vec<&str> = pair.split(KEY_VALUE_SEPARATOR).collect();
            if parts.len() != 2 {
                warn!("Invalid key pair in parameter package: {:?}", pair);
                continue;
            }
            package.set(unescape(parts[0]), unescape(parts[1]));
        }

        package
    }

    /// Serialize the package to its text form
    pub fn serialize(&self) -> String {
        if self.data.is_empty() {
            return EMPTY_PLACEHOLDER.to_string();
        }

        self.data
            .iter()
            .map(|(key, value)| format!("{}{}{}", escape(key), KEY_VALUE_SEPARATOR, escape(value)))
            .collect::<Vec<_>>()
            .join(&PARAM_SEPARATOR.to_string())
    }

    /// Check whether a key is present
    pub fn has(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Check whether the package holds no keys at all
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get a string value, or the default when missing
    pub fn get_str(&self, key: &str, default: &str) -> String {
        self.data
            .get(key)
            .cloned()
            .unwrap_or_else(|| default.to_string())
    }

    /// Get an integer value, or the default when missing or unparsable
    pub fn get_int(&self, key: &str, default: i64) -> i64 {
        match self.data.get(key) {
            Some(value) => value.parse().unwrap_or_else(|_| {
                warn!("Parameter {} is not an integer: {:?}", key, value);
                default
            }),
            None => default,
        }
    }

    /// Get a float value, or the default when missing or unparsable
    pub fn get_float(&self, key: &str, default: f32) -> f32 {
        match self.data.get(key) {
            Some(value) => value.parse().unwrap_or_else(|_| {
                warn!("Parameter {} is not a float: {:?}", key, value);
                default
            }),
            None => default,
        }
    }

    /// Get a boolean value; accepts `1`/`0` and `true`/`false`
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.data.get(key).map(String::as_str) {
            Some("1") | Some("true") => true,
            Some("0") | Some("false") => false,
            Some(other) => {
                warn!("Parameter {} is not a boolean: {:?}", key, other);
                default
            }
            None => default,
        }
    }

    /// Set a value, replacing any previous one
    pub fn set(&mut self, key: impl Into<String>, value: impl ToString) {
        self.data.insert(key.into(), value.to_string());
    }

    /// Set a boolean value using the `1`/`0` convention
    pub fn set_bool(&mut self, key: impl Into<String>, value: bool) {
        self.set(key, if value { 1 } else { 0 });
    }

    /// Remove a key
    pub fn erase(&mut self, key: &str) {
        self.data.remove(key);
    }

    /// Iterate over key-value pairs in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.data.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Engine name this descriptor asks for (empty when unbound)
    pub fn engine(&self) -> String {
        self.get_str("engine", "")
    }
}

impl fmt::Display for ParamPackage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialize())
    }
}

fn escape(part: &str) -> String {
    let mut out = String::with_capacity(part.len());
    for c in part.chars() {
        match c {
            ESCAPE_CHARACTER => out.push_str("$2"),
            KEY_VALUE_SEPARATOR => out.push_str("$0"),
            PARAM_SEPARATOR => out.push_str("$1"),
            other => out.push(other),
        }
    }
    out
}

fn unescape(part: &str) -> String {
    let mut out = String::with_capacity(part.len());
    let mut chars = part.chars();
    while let Some(c) = chars.next() {
        if c != ESCAPE_CHARACTER {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('0') => out.push(KEY_VALUE_SEPARATOR),
            Some('1') => out.push(PARAM_SEPARATOR),
            Some('2') => out.push(ESCAPE_CHARACTER),
            // Unknown escape, keep it verbatim
            Some(other) => {
                out.push(ESCAPE_CHARACTER);
                out.push(other);
            }
            None => out.push(ESCAPE_CHARACTER),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple() {
        let params = ParamPackage::parse("engine:keyboard,code:65,port:0");
        assert_eq!(params.engine(), "keyboard");
        assert_eq!(params.get_int("code", 0), 65);
        assert_eq!(params.get_int("port", 7), 0);
        assert!(!params.has("guid"));
    }

    #[test]
    fn test_empty_placeholder() {
        assert!(ParamPackage::parse("[empty]").is_empty());
        assert!(ParamPackage::parse("").is_empty());
        assert_eq!(ParamPackage::new().serialize(), "[empty]");
    }

    #[test]
    fn test_escaping_survives_serialization() {
        let mut params = ParamPackage::new();
        params.set("engine", "sdl");
        params.set("name", "Pad: left, $5");

        let text = params.serialize();
        assert!(!text.contains("Pad: left"));
        assert_eq!(ParamPackage::parse(&text), params);
    }

    #[test]
    fn test_malformed_pair_is_skipped() {
        let params = ParamPackage::parse("engine:tas,broken,port:2");
        assert_eq!(params.engine(), "tas");
        assert_eq!(params.get_int("port", 0), 2);
    }

    #[test]
    fn test_typed_defaults() {
        let params = ParamPackage::parse("deadzone:abc,toggle:1");
        assert_eq!(params.get_float("deadzone", 0.15), 0.15);
        assert!(params.get_bool("toggle", false));
        assert!(!params.get_bool("inverted", false));
    }
}
