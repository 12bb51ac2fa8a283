//! Named value converters referenced by migration rules.
//!
//! Rules name their converter instead of embedding a closure, which keeps
//! rule tables plain data. The registry maps those names to functions and
//! accepts custom converters next to the built-in ones.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{Number, Value};

use super::error::ConvertError;

/// A pure value conversion.
pub type Converter = Arc<dyn Fn(&Value) -> Result<Value, ConvertError> + Send + Sync>;

/// Registry of converters available to a rule table.
#[derive(Clone)]
pub struct ConverterRegistry {
    converters: HashMap<String, Converter>,
}

impl ConverterRegistry {
    /// An empty registry.
    pub fn empty() -> Self {
        Self {
            converters: HashMap::new(),
        }
    }

    /// A registry holding the built-in converters.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register("int", to_int);
        registry.register("float", to_float);
        registry.register("bool", to_bool);
        registry.register("string", to_string);
        registry.register("px", append_px);
        registry.register("strip_px", strip_px);
        registry.register("lowercase", lowercase);
        registry
    }

    /// Register (or replace) a converter under `name`.
    pub fn register<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(&Value) -> Result<Value, ConvertError> + Send + Sync + 'static,
    {
        self.converters.insert(name.into(), Arc::new(f));
        self
    }

    /// Look up a converter.
    pub fn get(&self, name: &str) -> Option<&Converter> {
        self.converters.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.converters.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.converters.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Run the converter `name` on `value`.
    pub fn convert(&self, name: &str, value: &Value) -> Result<Value, ConvertError> {
        let converter = self
            .get(name)
            .ok_or_else(|| ConvertError::new(format!("converter '{name}' is not registered")))?;
        converter(value)
    }
}

impl Default for ConverterRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConverterRegistry")
            .field("converters", &self.names())
            .finish()
    }
}

/// parseInt semantics: leading sign and digits of a string, truncation of
/// floats, bools as 0/1.
fn to_int(value: &Value) -> Result<Value, ConvertError> {
    match value {
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                Ok(value.clone())
            } else {
                let f = n.as_f64().unwrap_or_default();
                Ok(Value::from(f.trunc() as i64))
            }
        }
        Value::Bool(b) => Ok(Value::from(i64::from(*b))),
        Value::String(s) => parse_leading_int(s).map(Value::from),
        other => Err(ConvertError::new(format!("cannot convert {other} to an integer"))),
    }
}

fn parse_leading_int(s: &str) -> Result<i64, ConvertError> {
    let trimmed = s.trim_start();
    let sign_len = usize::from(trimmed.starts_with(['-', '+']));
    let end = trimmed[sign_len..]
        .find(|c: char| !c.is_ascii_digit())
        .map_or(trimmed.len(), |i| sign_len + i);

    if end == sign_len {
        return Err(ConvertError::new(format!("'{s}' is not a number")));
    }

    trimmed[..end]
        .parse()
        .map_err(|e| ConvertError::new(format!("'{s}' is out of range: {e}")))
}

fn to_float(value: &Value) -> Result<Value, ConvertError> {
    let f = match value {
        Value::Number(n) => n.as_f64().unwrap_or_default(),
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| ConvertError::new(format!("'{s}' is not a number")))?,
        other => {
            return Err(ConvertError::new(format!("cannot convert {other} to a float")));
        }
    };

    Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| ConvertError::new(format!("{f} is not a finite number")))
}

fn to_bool(value: &Value) -> Result<Value, ConvertError> {
    match value {
        Value::Bool(_) => Ok(value.clone()),
        Value::Number(n) => Ok(Value::Bool(n.as_f64().is_some_and(|f| f != 0.0))),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Value::Bool(true)),
            "0" | "false" | "no" | "off" | "" => Ok(Value::Bool(false)),
            _ => Err(ConvertError::new(format!("'{s}' is not a boolean"))),
        },
        other => Err(ConvertError::new(format!("cannot convert {other} to a boolean"))),
    }
}

fn to_string(value: &Value) -> Result<Value, ConvertError> {
    match value {
        Value::String(_) => Ok(value.clone()),
        Value::Number(n) => Ok(Value::String(n.to_string())),
        Value::Bool(b) => Ok(Value::String(if *b { "1" } else { "0" }.to_string())),
        other => Err(ConvertError::new(format!("cannot convert {other} to a string"))),
    }
}

/// `2` and `"2"` become `"2px"`; values already carrying a unit are kept.
fn append_px(value: &Value) -> Result<Value, ConvertError> {
    match value {
        Value::Number(n) => Ok(Value::String(format!("{n}px"))),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.ends_with("px") {
                Ok(Value::String(trimmed.to_string()))
            } else if trimmed.parse::<f64>().is_ok() {
                Ok(Value::String(format!("{trimmed}px")))
            } else {
                Err(ConvertError::new(format!("'{s}' is not a pixel size")))
            }
        }
        other => Err(ConvertError::new(format!("cannot convert {other} to a pixel size"))),
    }
}

/// `"2px"` becomes `2`.
fn strip_px(value: &Value) -> Result<Value, ConvertError> {
    match value {
        Value::Number(_) => Ok(value.clone()),
        Value::String(s) => {
            let bare = s.trim().trim_end_matches("px").trim_end();
            if let Ok(i) = bare.parse::<i64>() {
                Ok(Value::from(i))
            } else {
                to_float(&Value::String(bare.to_string()))
                    .map_err(|_| ConvertError::new(format!("'{s}' is not a pixel size")))
            }
        }
        other => Err(ConvertError::new(format!("cannot convert {other} to a pixel size"))),
    }
}

fn lowercase(value: &Value) -> Result<Value, ConvertError> {
    match value {
        Value::String(s) => Ok(Value::String(s.to_lowercase())),
        other => Ok(other.clone()),
    }
}

#[cfg(test)]
// Tests are allowed to use unwrap/expect freely.
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn convert(name: &str, value: Value) -> Result<Value, ConvertError> {
        ConverterRegistry::with_builtins().convert(name, &value)
    }

    #[test]
    fn int_parses_leading_digits() {
        assert_eq!(convert("int", json!("2px")).unwrap(), json!(2));
        assert_eq!(convert("int", json!("  -14em")).unwrap(), json!(-14));
        assert_eq!(convert("int", json!("+7")).unwrap(), json!(7));
        assert_eq!(convert("int", json!(3.9)).unwrap(), json!(3));
        assert_eq!(convert("int", json!(5)).unwrap(), json!(5));
        assert_eq!(convert("int", json!(true)).unwrap(), json!(1));
    }

    #[test]
    fn int_rejects_non_numeric_strings() {
        let err = convert("int", json!("thick")).unwrap_err();
        assert!(err.to_string().contains("thick"));
        assert!(convert("int", json!("")).is_err());
        assert!(convert("int", json!("-")).is_err());
    }

    #[test]
    fn int_covers_the_full_i64_range() {
        assert_eq!(
            convert("int", json!("-9223372036854775808")).unwrap(),
            json!(i64::MIN)
        );
        assert_eq!(
            convert("int", json!("9223372036854775807px")).unwrap(),
            json!(i64::MAX)
        );
        let err = convert("int", json!("9223372036854775808")).unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn bool_accepts_common_spellings() {
        assert_eq!(convert("bool", json!("Yes")).unwrap(), json!(true));
        assert_eq!(convert("bool", json!("0")).unwrap(), json!(false));
        assert_eq!(convert("bool", json!(2)).unwrap(), json!(true));
        assert!(convert("bool", json!("maybe")).is_err());
    }

    #[test]
    fn px_round_trip() {
        assert_eq!(convert("px", json!(2)).unwrap(), json!("2px"));
        assert_eq!(convert("px", json!("4")).unwrap(), json!("4px"));
        assert_eq!(convert("px", json!("4px")).unwrap(), json!("4px"));
        assert_eq!(convert("strip_px", json!("4px")).unwrap(), json!(4));
        assert_eq!(convert("strip_px", json!("1.5px")).unwrap(), json!(1.5));
        assert!(convert("px", json!("wide")).is_err());
    }

    #[test]
    fn string_and_float() {
        assert_eq!(convert("string", json!(12)).unwrap(), json!("12"));
        assert_eq!(convert("string", json!(false)).unwrap(), json!("0"));
        assert_eq!(convert("float", json!("0.75")).unwrap(), json!(0.75));
    }

    #[test]
    fn lowercase_leaves_non_strings_alone() {
        assert_eq!(convert("lowercase", json!("#AABBCC")).unwrap(), json!("#aabbcc"));
        assert_eq!(convert("lowercase", json!(1)).unwrap(), json!(1));
    }

    #[test]
    fn custom_converters_can_be_registered() {
        let mut registry = ConverterRegistry::with_builtins();
        registry.register("double", |v: &Value| {
            v.as_i64()
                .map(|i| Value::from(i * 2))
                .ok_or_else(|| ConvertError::new("not an integer"))
        });

        assert!(registry.contains("double"));
        assert_eq!(registry.convert("double", &json!(21)).unwrap(), json!(42));
        assert!(registry.names().contains(&"double"));
    }

    #[test]
    fn unknown_converter_is_an_error() {
        let err = ConverterRegistry::empty()
            .convert("int", &json!("1"))
            .unwrap_err();
        assert!(err.to_string().contains("not registered"));
    }
}
