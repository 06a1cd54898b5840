//! Field-level state diffs for assertion failures.
//!
//! States are compared structurally through `serde_json`, so a failure can
//! name the exact path that diverged (`todos[2].title`) instead of dumping
//! two whole states.

use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// One diverging location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Difference {
    /// Path from the root, e.g. `items[2].title`; empty for the root itself
    pub path: String,
    /// Value the test declared
    pub expected: String,
    /// Value the reducer produced
    pub actual: String,
}

/// Every location where two states differ
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateDiff {
    differences: Vec<Difference>,
}

impl StateDiff {
    /// Diff `expected` against `actual`.
    ///
    /// Falls back to comparing `Debug` output if either state fails to
    /// serialize.
    #[must_use]
    pub fn between<S>(expected: &S, actual: &S) -> Self
    where
        S: Serialize + fmt::Debug,
    {
        let mut diff = Self::default();
        match (serde_json::to_value(expected), serde_json::to_value(actual)) {
            (Ok(expected), Ok(actual)) => diff.walk(String::new(), &expected, &actual),
            _ => {
                let (expected, actual) = (format!("{expected:?}"), format!("{actual:?}"));
                if expected != actual {
                    diff.push(String::new(), expected, actual);
                }
            },
        }
        diff
    }

    /// Whether the states were equal
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.differences.is_empty()
    }

    /// The diverging locations, in key order
    #[must_use]
    pub fn differences(&self) -> &[Difference] {
        &self.differences
    }

    fn push(&mut self, path: String, expected: String, actual: String) {
        self.differences.push(Difference {
            path,
            expected,
            actual,
        });
    }

    fn walk(&mut self, path: String, expected: &Value, actual: &Value) {
        match (expected, actual) {
            (Value::Object(expected), Value::Object(actual)) => {
                for (key, expected_value) in expected {
                    let child = join_key(&path, key);
                    match actual.get(key) {
                        Some(actual_value) => self.walk(child, expected_value, actual_value),
                        None => self.push(child, expected_value.to_string(), "<missing>".to_string()),
                    }
                }
                for (key, actual_value) in actual {
                    if !expected.contains_key(key) {
                        self.push(join_key(&path, key), "<missing>".to_string(), actual_value.to_string());
                    }
                }
            },
            (Value::Array(expected), Value::Array(actual)) => {
                for index in 0..expected.len().max(actual.len()) {
                    let child = format!("{path}[{index}]");
                    match (expected.get(index), actual.get(index)) {
                        (Some(e), Some(a)) => self.walk(child, e, a),
                        (Some(e), None) => self.push(child, e.to_string(), "<missing>".to_string()),
                        (None, Some(a)) => self.push(child, "<missing>".to_string(), a.to_string()),
                        (None, None) => {},
                    }
                }
            },
            (expected, actual) if expected != actual => {
                self.push(path, expected.to_string(), actual.to_string());
            },
            _ => {},
        }
    }
}

fn join_key(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

impl fmt::Display for StateDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for difference in &self.differences {
            let path = if difference.path.is_empty() {
                "<root>"
            } else {
                difference.path.as_str()
            };
            writeln!(f, "  {path}")?;
            writeln!(f, "    - expected: {}", difference.expected)?;
            writeln!(f, "    + actual:   {}", difference.actual)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[derive(Debug, Serialize)]
    struct Todo {
        title: String,
        done: bool,
    }

    #[derive(Debug, Serialize)]
    struct Todos {
        items: Vec<Todo>,
        filter: Option<String>,
    }

    fn todo(title: &str, done: bool) -> Todo {
        Todo {
            title: title.to_string(),
            done,
        }
    }

    #[test]
    fn test_equal_states_have_no_diff() {
        let a = Todos {
            items: vec![todo("milk", false)],
            filter: None,
        };
        let b = Todos {
            items: vec![todo("milk", false)],
            filter: None,
        };
        assert!(StateDiff::between(&a, &b).is_empty());
    }

    #[test]
    fn test_diff_names_nested_paths() {
        let expected = Todos {
            items: vec![todo("milk", true), todo("eggs", false)],
            filter: None,
        };
        let actual = Todos {
            items: vec![todo("milk", false)],
            filter: Some("open".to_string()),
        };

        let diff = StateDiff::between(&expected, &actual);
        let find = |path: &str| {
            diff.differences()
                .iter()
                .find(|d| d.path == path)
                .cloned()
                .expect("path should differ")
        };

        assert_eq!(diff.differences().len(), 3);
        assert_eq!(find("items[0].done").expected, "true");
        assert_eq!(find("items[0].done").actual, "false");
        assert_eq!(find("items[1]").actual, "<missing>");
        assert_eq!(find("filter").actual, "\"open\"");
    }

    #[test]
    fn test_scalar_root_diff() {
        let diff = StateDiff::between(&1_u32, &2_u32);
        assert_eq!(diff.to_string(), "  <root>\n    - expected: 1\n    + actual:   2\n");
    }
}
