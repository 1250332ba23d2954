//! Closed-world access to the raw YAML tree.
//!
//! # Responsibilities
//! - Shape pass: diff the keys of a mapping against its allowed key set
//! - Typed getters that record a diagnostic instead of failing fast
//!
//! # Design Decisions
//! - Getters only look at keys the shape pass accepted, so a misspelled key is
//!   reported once as unknown and never as a bad value
//! - An explicit `null` counts as absent
//! - Getters return `None` when the key is absent without reporting anything;
//!   a missing required key is the shape pass's job

use serde_yaml::{Mapping, Value};

use crate::config::schema::BindAddress;
use crate::config::validation::{
    parse_bool_literal, validate_bind_address, validate_enum, ConfigEnum, FieldPath, ValidationError,
};

/// Accumulates every defect found during one validation pass.
#[derive(Debug, Default)]
pub(crate) struct Diagnostics {
    errors: Vec<ValidationError>,
}

impl Diagnostics {
    pub(crate) fn push(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    /// `Ok(value)` only if nothing was reported.
    pub(crate) fn finish<T>(self, value: Option<T>) -> Result<T, Vec<ValidationError>> {
        match value {
            Some(value) if self.errors.is_empty() => Ok(value),
            _ => Err(self.errors),
        }
    }
}

/// Keys allowed in one mapping.
#[derive(Debug, Clone, Copy)]
pub struct KeySchema {
    pub required: &'static [&'static str],
    pub optional: &'static [&'static str],
}

impl KeySchema {
    pub fn allows(&self, key: &str) -> bool {
        self.required.contains(&key) || self.optional.contains(&key)
    }
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    }
}

/// A mapping that went through the shape pass.
#[derive(Debug, Clone)]
pub(crate) struct Object<'a> {
    path: FieldPath,
    map: &'a Mapping,
    schema: KeySchema,
}

/// Shape pass over `value`.
///
/// Reports a non-mapping value, unknown keys and missing required keys. The
/// returned object is usable even when keys were rejected so that value
/// errors on the legal keys are still collected.
pub(crate) fn object<'a>(
    value: &'a Value,
    path: &FieldPath,
    schema: KeySchema,
    diags: &mut Diagnostics,
) -> Option<Object<'a>> {
    let Value::Mapping(map) = value else {
        diags.push(ValidationError::InvalidType {
            path: path.clone(),
            expected: "mapping",
            found: type_name(value),
        });
        return None;
    };

    for key in map.keys() {
        match key.as_str() {
            Some(key) if schema.allows(key) => {}
            Some(key) => diags.push(ValidationError::UnknownField { path: path.key(key) }),
            None => diags.push(ValidationError::InvalidType {
                path: path.key("<key>"),
                expected: "string key",
                found: type_name(key),
            }),
        }
    }

    for key in schema.required {
        if map.get(*key).map_or(true, Value::is_null) {
            diags.push(ValidationError::MissingRequiredField { path: path.key(key) });
        }
    }

    Some(Object {
        path: path.clone(),
        map,
        schema,
    })
}

impl<'a> Object<'a> {
    pub(crate) fn path(&self) -> &FieldPath {
        &self.path
    }

    pub(crate) fn child_path(&self, key: &str) -> FieldPath {
        self.path.key(key)
    }

    pub(crate) fn get(&self, key: &str) -> Option<&'a Value> {
        debug_assert!(self.schema.allows(key), "{key} is not in the schema");
        self.map.get(key).filter(|v| !v.is_null())
    }

    pub(crate) fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// `Some(default)` when `key` is absent, otherwise whatever `parse` yields.
    pub(crate) fn or_default<T>(&self, key: &str, default: T, parse: impl FnOnce(&Self) -> Option<T>) -> Option<T> {
        if self.contains(key) {
            parse(self)
        } else {
            Some(default)
        }
    }

    fn mismatch(&self, key: &str, expected: &'static str, found: &Value, diags: &mut Diagnostics) {
        diags.push(ValidationError::InvalidType {
            path: self.child_path(key),
            expected,
            found: type_name(found),
        });
    }

    fn quote_hint(&self, key: &str, found: &Value, literal: impl std::fmt::Display, diags: &mut Diagnostics) {
        diags.push(ValidationError::InvalidValue {
            path: self.child_path(key),
            reason: format!(
                "expected string, found {} {literal}; quote it to use it as text",
                type_name(found)
            ),
        });
    }

    pub(crate) fn string(&self, key: &str, diags: &mut Diagnostics) -> Option<&'a str> {
        let value = self.get(key)?;
        match value {
            Value::String(s) => Some(s.as_str()),
            // YAML reads `version: 5.1` as a number; point at the fix.
            Value::Number(n) => {
                self.quote_hint(key, value, n, diags);
                None
            }
            Value::Bool(b) => {
                self.quote_hint(key, value, b, diags);
                None
            }
            _ => {
                self.mismatch(key, "string", value, diags);
                None
            }
        }
    }

    pub(crate) fn non_empty_string(&self, key: &str, diags: &mut Diagnostics) -> Option<String> {
        let s = self.string(key, diags)?;
        if s.trim().is_empty() {
            diags.push(ValidationError::InvalidValue {
                path: self.child_path(key),
                reason: "must not be empty".to_string(),
            });
            return None;
        }
        Some(s.to_string())
    }

    pub(crate) fn u64(&self, key: &str, diags: &mut Diagnostics) -> Option<u64> {
        let value = self.get(key)?;
        let Value::Number(n) = value else {
            self.mismatch(key, "integer", value, diags);
            return None;
        };
        match n.as_u64() {
            Some(n) => Some(n),
            None => {
                diags.push(ValidationError::InvalidValue {
                    path: self.child_path(key),
                    reason: format!("{n} is not a non-negative 64-bit integer"),
                });
                None
            }
        }
    }

    pub(crate) fn u32(&self, key: &str, diags: &mut Diagnostics) -> Option<u32> {
        let n = self.u64(key, diags)?;
        match u32::try_from(n) {
            Ok(n) => Some(n),
            Err(_) => {
                diags.push(ValidationError::InvalidValue {
                    path: self.child_path(key),
                    reason: format!("{n} does not fit in 32 bits"),
                });
                None
            }
        }
    }

    /// Booleans, plus the usual string spellings (`yes`, `off`, ...).
    pub(crate) fn bool(&self, key: &str, diags: &mut Diagnostics) -> Option<bool> {
        let value = self.get(key)?;
        let coerced = match value {
            Value::Bool(b) => Some(*b),
            Value::String(s) => parse_bool_literal(s),
            _ => None,
        };
        if coerced.is_none() {
            self.mismatch(key, "boolean", value, diags);
        }
        coerced
    }

    pub(crate) fn address(&self, key: &str, diags: &mut Diagnostics) -> Option<BindAddress> {
        let raw = self.string(key, diags)?;
        match validate_bind_address(raw) {
            Ok(addr) => Some(addr),
            Err(source) => {
                diags.push(ValidationError::InvalidAddress {
                    path: self.child_path(key),
                    value: raw.to_string(),
                    source,
                });
                None
            }
        }
    }

    pub(crate) fn enumeration<T: ConfigEnum>(&self, key: &str, diags: &mut Diagnostics) -> Option<T> {
        let raw = self.string(key, diags)?;
        match validate_enum::<T>(raw) {
            Ok(v) => Some(v),
            Err(source) => {
                diags.push(ValidationError::InvalidEnumValue {
                    path: self.child_path(key),
                    source,
                });
                None
            }
        }
    }

    pub(crate) fn sequence(&self, key: &str, diags: &mut Diagnostics) -> Option<&'a [Value]> {
        let value = self.get(key)?;
        match value.as_sequence() {
            Some(seq) => Some(seq.as_slice()),
            None => {
                self.mismatch(key, "sequence", value, diags);
                None
            }
        }
    }

    /// Shape pass over a nested mapping.
    pub(crate) fn object(&self, key: &str, schema: KeySchema, diags: &mut Diagnostics) -> Option<Object<'a>> {
        let value = self.get(key)?;
        object(value, &self.child_path(key), schema, diags)
    }
}
