//! Assertion engine
//!
//! Stateless comparison functions that return a typed [`AssertionError`] instead of a
//! boolean, so call sites inside test callbacks read as assertions:
//!
//! ```rust,ignore
//! assert_is_equal(layers.len(), 3)?;
//! assert_json_object(&capabilities, &json!({"service": {"name": "WMS"}}))?;
//! ```
//!
//! [`assert_json_object`] performs an "is-at-least" structural match: every value of
//! `expected` must be reproduced inside `actual`, objects may carry extra keys and
//! arrays are matched by content in any order.

use std::any::Any;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

/// Result type for assertions
pub type AssertionResult = Result<(), AssertionError>;

/// Assertion failure with context
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AssertionError {
    #[error("Expected {expected}, got {actual}")]
    ValueMismatch { actual: String, expected: String },

    #[error("Expected {property} to be an array, got {actual}")]
    NotAnArray { property: String, actual: String },

    #[error("Expected array length {expected}, got {actual}")]
    ArrayLength { actual: usize, expected: usize },

    #[error("Expected array length of at least {minimal}, got {actual}")]
    ArrayLengthMinimal { actual: usize, minimal: usize },

    #[error("Expected array to include {value}")]
    ArrayIncludes { value: String },

    #[error("Expected array to exclude {value}")]
    ArrayExcludes { value: String },

    #[error("Arrays differ at index {index}: expected {expected}, got {actual}")]
    ArrayElementMismatch {
        index: usize,
        actual: String,
        expected: String,
    },

    #[error("Expected {property} to be defined")]
    Undefined { property: String },

    #[error("Expected {property} to be undefined, got {actual}")]
    Defined { property: String, actual: String },

    #[error("Expected an instance of {expected}")]
    WrongInstance { expected: String },

    #[error("Expected error {expected}, but no error was thrown")]
    NoErrorThrown { expected: String },

    #[error("Expected error {expected}, got: {actual}")]
    WrongErrorInstance { expected: String, actual: String },

    #[error("JSON object mismatch:\n  {}", .mismatches.join("\n  "))]
    JsonMismatch { mismatches: Vec<String> },

    #[error("Value cannot be compared as JSON: {message}")]
    NotSerializable { message: String },

    #[error("Test failed: {message}")]
    ManuallyFailed { message: String },
}

impl AssertionError {
    /// Get the failure kind as a string
    pub fn kind(&self) -> &'static str {
        match self {
            AssertionError::ValueMismatch { .. } => "value_mismatch",
            AssertionError::NotAnArray { .. } => "not_an_array",
            AssertionError::ArrayLength { .. } => "array_length",
            AssertionError::ArrayLengthMinimal { .. } => "array_length_minimal",
            AssertionError::ArrayIncludes { .. } => "array_includes",
            AssertionError::ArrayExcludes { .. } => "array_excludes",
            AssertionError::ArrayElementMismatch { .. } => "array_element_mismatch",
            AssertionError::Undefined { .. } => "undefined",
            AssertionError::Defined { .. } => "defined",
            AssertionError::WrongInstance { .. } => "wrong_instance",
            AssertionError::NoErrorThrown { .. } => "no_error_thrown",
            AssertionError::WrongErrorInstance { .. } => "wrong_error_instance",
            AssertionError::JsonMismatch { .. } => "json_mismatch",
            AssertionError::NotSerializable { .. } => "not_serializable",
            AssertionError::ManuallyFailed { .. } => "manually_failed",
        }
    }

    /// Actual value (stringified), where the failure carries one
    pub fn actual(&self) -> Option<String> {
        match self {
            AssertionError::ValueMismatch { actual, .. }
            | AssertionError::NotAnArray { actual, .. }
            | AssertionError::ArrayElementMismatch { actual, .. }
            | AssertionError::Defined { actual, .. }
            | AssertionError::WrongErrorInstance { actual, .. } => Some(actual.clone()),
            AssertionError::ArrayLength { actual, .. }
            | AssertionError::ArrayLengthMinimal { actual, .. } => Some(actual.to_string()),
            _ => None,
        }
    }

    /// Expected value (stringified), where the failure carries one
    pub fn expected(&self) -> Option<String> {
        match self {
            AssertionError::ValueMismatch { expected, .. }
            | AssertionError::ArrayElementMismatch { expected, .. }
            | AssertionError::WrongInstance { expected }
            | AssertionError::NoErrorThrown { expected }
            | AssertionError::WrongErrorInstance { expected, .. } => Some(expected.clone()),
            AssertionError::ArrayLength { expected, .. } => Some(expected.to_string()),
            AssertionError::ArrayLengthMinimal { minimal, .. } => Some(minimal.to_string()),
            AssertionError::ArrayIncludes { value } | AssertionError::ArrayExcludes { value } => {
                Some(value.clone())
            }
            _ => None,
        }
    }
}

fn render(value: impl fmt::Debug) -> String {
    format!("{:?}", value)
}

// =====================
// Equality Assertions
// =====================

/// Assert `actual == expected`
pub fn assert_is_equal<A, E>(actual: A, expected: E) -> AssertionResult
where
    A: PartialEq<E> + fmt::Debug,
    E: fmt::Debug,
{
    if actual == expected {
        Ok(())
    } else {
        Err(AssertionError::ValueMismatch {
            actual: render(&actual),
            expected: render(&expected),
        })
    }
}

/// Assert two sequences have the same length and equal elements at every index
pub fn assert_is_array_equal<A, E>(actual: &[A], expected: &[E]) -> AssertionResult
where
    A: PartialEq<E> + fmt::Debug,
    E: fmt::Debug,
{
    if actual.len() != expected.len() {
        return Err(AssertionError::ArrayLength {
            actual: actual.len(),
            expected: expected.len(),
        });
    }

    match actual.iter().zip(expected).position(|(a, e)| a != e) {
        None => Ok(()),
        Some(index) => Err(AssertionError::ArrayElementMismatch {
            index,
            actual: render(&actual[index]),
            expected: render(&expected[index]),
        }),
    }
}

// =====================
// Presence Assertions
// =====================

/// Assert a value is present, handing it back
pub fn assert_is_defined<T>(value: Option<T>, property: &str) -> Result<T, AssertionError> {
    value.ok_or_else(|| AssertionError::Undefined {
        property: property.to_string(),
    })
}

/// Assert a value is absent
pub fn assert_is_undefined<T: fmt::Debug>(value: Option<T>, property: &str) -> AssertionResult {
    match value {
        None => Ok(()),
        Some(actual) => Err(AssertionError::Defined {
            property: property.to_string(),
            actual: render(&actual),
        }),
    }
}

// =====================
// Instance Assertions
// =====================

/// Assert a value is present and of type `T`, handing back the typed reference
pub fn assert_is_instance<'a, T: Any>(value: Option<&'a dyn Any>) -> Result<&'a T, AssertionError> {
    value
        .and_then(|v| v.downcast_ref::<T>())
        .ok_or_else(|| AssertionError::WrongInstance {
            expected: std::any::type_name::<T>().to_string(),
        })
}

/// Assert an error was raised and that it is an `E`
pub fn assert_is_error_instance<'a, E>(
    error: Option<&'a anyhow::Error>,
) -> Result<&'a E, AssertionError>
where
    E: fmt::Display + fmt::Debug + Send + Sync + 'static,
{
    let expected = std::any::type_name::<E>().to_string();
    let Some(error) = error else {
        return Err(AssertionError::NoErrorThrown { expected });
    };

    error
        .downcast_ref::<E>()
        .ok_or_else(|| AssertionError::WrongErrorInstance {
            expected,
            actual: error.to_string(),
        })
}

// =====================
// Collection Assertions
// =====================

/// Assert exact length; a missing array counts as empty
pub fn assert_is_array_length_equal<T>(array: Option<&[T]>, expected: usize) -> AssertionResult {
    let actual = array.map_or(0, <[T]>::len);
    if actual == expected {
        Ok(())
    } else {
        Err(AssertionError::ArrayLength { actual, expected })
    }
}

/// Assert minimal length; a missing array counts as empty
pub fn assert_is_array_length_minimal<T>(array: Option<&[T]>, minimal: usize) -> AssertionResult {
    let actual = array.map_or(0, <[T]>::len);
    if actual >= minimal {
        Ok(())
    } else {
        Err(AssertionError::ArrayLengthMinimal { actual, minimal })
    }
}

/// Assert the array contains `value`
pub fn assert_array_includes<T: PartialEq + fmt::Debug>(array: &[T], value: &T) -> AssertionResult {
    if array.contains(value) {
        Ok(())
    } else {
        Err(AssertionError::ArrayIncludes { value: render(value) })
    }
}

/// Assert the array does not contain `value`
pub fn assert_array_excludes<T: PartialEq + fmt::Debug>(array: &[T], value: &T) -> AssertionResult {
    if array.contains(value) {
        Err(AssertionError::ArrayExcludes { value: render(value) })
    } else {
        Ok(())
    }
}

/// Borrow a JSON value as an array
pub fn as_array<'a>(value: &'a JsonValue, property: &str) -> Result<&'a Vec<JsonValue>, AssertionError> {
    value.as_array().ok_or_else(|| AssertionError::NotAnArray {
        property: property.to_string(),
        actual: value.to_string(),
    })
}

/// Force a failure with a message
pub fn fail(message: impl Into<String>) -> AssertionResult {
    Err(AssertionError::ManuallyFailed {
        message: message.into(),
    })
}

// =====================
// JSON Assertions
// =====================

/// Outcome of an "is-at-least" match
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonMatch {
    pub ok: bool,
    /// One entry per mismatch: path followed by expected and actual values
    pub mismatches: Vec<String>,
}

/// "Is-at-least" structural match of `actual` against `expected`
pub fn match_json(actual: &JsonValue, expected: &JsonValue) -> JsonMatch {
    let mut mismatches = Vec::new();
    let ok = is_at_least(Some(actual), expected, "", &mut mismatches);
    JsonMatch { ok, mismatches }
}

/// Assert `actual` contains at least everything in `expected`.
///
/// `actual` is anything serializable. Futures do not implement `Serialize`, so passing a
/// value that was not awaited is rejected at compile time.
pub fn assert_json_object<A>(actual: &A, expected: &JsonValue) -> AssertionResult
where
    A: Serialize + ?Sized,
{
    let actual = serde_json::to_value(actual).map_err(|e| AssertionError::NotSerializable {
        message: e.to_string(),
    })?;

    let outcome = match_json(&actual, expected);
    if outcome.ok {
        Ok(())
    } else {
        Err(AssertionError::JsonMismatch {
            mismatches: outcome.mismatches,
        })
    }
}

fn display_path(path: &str) -> &str {
    if path.is_empty() {
        "<root>"
    } else {
        path
    }
}

fn render_json(value: Option<&JsonValue>) -> String {
    value.map_or_else(|| "undefined".to_string(), JsonValue::to_string)
}

fn primitive_eq(actual: &JsonValue, expected: &JsonValue) -> bool {
    match (actual, expected) {
        (JsonValue::Number(a), JsonValue::Number(e)) => a == e || a.as_f64() == e.as_f64(),
        _ => actual == expected,
    }
}

fn is_at_least(
    actual: Option<&JsonValue>,
    expected: &JsonValue,
    path: &str,
    mismatches: &mut Vec<String>,
) -> bool {
    match expected {
        JsonValue::Array(expected_items) => {
            let Some(JsonValue::Array(actual_items)) = actual else {
                mismatches.push(format!(
                    "{}: expected an array, got {}",
                    display_path(path),
                    render_json(actual)
                ));
                return false;
            };

            let mut ok = true;
            for (index, expected_item) in expected_items.iter().enumerate() {
                let item_path = format!("{}[{}]", path, index);
                let mut first_failure: Option<Vec<String>> = None;

                let found = actual_items.iter().any(|candidate| {
                    let mut candidate_mismatches = Vec::new();
                    if is_at_least(Some(candidate), expected_item, &item_path, &mut candidate_mismatches) {
                        return true;
                    }
                    first_failure.get_or_insert(candidate_mismatches);
                    false
                });

                if !found {
                    ok = false;
                    match first_failure {
                        Some(failure) => mismatches.extend(failure),
                        None => mismatches.push(format!(
                            "{}: expected {}, got an empty array",
                            item_path, expected_item
                        )),
                    }
                }
            }
            ok
        }
        JsonValue::Object(expected_fields) => {
            let Some(JsonValue::Object(actual_fields)) = actual else {
                mismatches.push(format!(
                    "{}: expected an object, got {}",
                    display_path(path),
                    render_json(actual)
                ));
                return false;
            };

            let mut ok = true;
            for (key, expected_value) in expected_fields {
                let key_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", path, key)
                };
                if !is_at_least(actual_fields.get(key), expected_value, &key_path, mismatches) {
                    ok = false;
                }
            }
            ok
        }
        primitive => {
            if actual.is_some_and(|a| primitive_eq(a, primitive)) {
                true
            } else {
                mismatches.push(format!(
                    "{}: expected {}, got {}",
                    display_path(path),
                    primitive,
                    render_json(actual)
                ));
                false
            }
        }
    }
}
