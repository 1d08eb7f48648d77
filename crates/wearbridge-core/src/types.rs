/*!
 * Core data types for Wearbridge.
 *
 * Device addresses and the loosely typed values carried by preferences,
 * option maps and device metadata.
 */
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// The stable identity of a device.
///
/// Radio addresses are reported in mixed case by different stacks, so
/// equality, hashing and ordering ignore ASCII case. The original spelling
/// is preserved for display and for handing back to transports.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Create an address from a string
    pub fn new<S: AsRef<str>>(s: S) -> Self {
        Self(s.as_ref().trim().to_string())
    }

    /// Get the string representation of the address
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Number of `:` separators in the address
    pub fn separator_count(&self) -> usize {
        self.0.matches(':').count()
    }

    fn folded(&self) -> impl Iterator<Item = u8> + '_ {
        self.0.bytes().map(|b| b.to_ascii_lowercase())
    }
}

impl PartialEq for Address {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Eq for Address {}

impl Hash for Address {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for b in self.folded() {
            state.write_u8(b);
        }
        state.write_u8(0xff);
    }
}

impl PartialOrd for Address {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Address {
    fn cmp(&self, other: &Self) -> Ordering {
        self.folded().cmp(other.folded())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Address {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// A loosely typed value, as stored in preferences and option maps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    /// Null value
    #[default]
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value
    Integer(i64),
    /// Floating-point value
    Float(f64),
    /// String value
    String(String),
    /// Array of values
    Array(Vec<Value>),
}

impl Value {
    /// Interpret the value as a boolean.
    ///
    /// Strings `"true"` and `"false"` are accepted since preference stores
    /// frequently keep everything as text.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// Interpret the value as an integer, parsing strings if needed
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Float(f) if *f == (*f as i64) as f64 => Some(*f as i64),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Try to get a string value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Interpret the value as a list of strings.
    ///
    /// Arrays yield their string elements; a single string is split on commas.
    pub fn as_string_list(&self) -> Vec<String> {
        match self {
            Value::Array(items) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            Value::String(s) => s
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i64::from(i))
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(a: Vec<Value>) -> Self {
        Value::Array(a)
    }
}

/// A key-value map of loosely typed values
pub type Metadata = HashMap<String, Value>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_address_ignores_case() {
        let a = Address::new("AA:BB:CC:DD:EE:FF");
        let b = Address::new("aa:bb:cc:dd:ee:ff");
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a.clone());
        assert!(set.contains(&b));
        assert_eq!(a.cmp(&b), Ordering::Equal);
        assert_eq!(b.to_string(), "aa:bb:cc:dd:ee:ff");
    }

    #[test]
    fn test_address_separator_count() {
        assert_eq!(Address::new("test").separator_count(), 0);
        assert_eq!(Address::new("192.168.1.20:9000").separator_count(), 1);
        assert_eq!(Address::new("AA:BB:CC:DD:EE:FF").separator_count(), 5);
    }

    #[test]
    fn test_value_lenient_parsing() {
        assert_eq!(Value::from("true").as_bool(), Some(true));
        assert_eq!(Value::from(" 60 ").as_integer(), Some(60));
        assert_eq!(Value::from(-100).as_integer(), Some(-100));
        assert_eq!(Value::Float(3.0).as_integer(), Some(3));
        assert_eq!(Value::Float(3.5).as_integer(), None);
        assert_eq!(Value::from("nope").as_bool(), None);
    }

    #[test]
    fn test_value_string_list() {
        assert_eq!(
            Value::from("german, russian,,greek").as_string_list(),
            vec!["german", "russian", "greek"]
        );
        let v = Value::Array(vec![Value::from("a"), Value::from(1), Value::from("b")]);
        assert_eq!(v.as_string_list(), vec!["a", "b"]);
        assert!(Value::Null.as_string_list().is_empty());
    }
}
