//! # Action Parameter Types
//!
//! Declared parameter kinds of controller actions and the coercion table
//! that turns raw path segments into typed arguments.
//!
//! Coercion fails closed: one segment that does not parse aborts the whole
//! dispatch with `Error::Coercion`, which the router answers with 404.

use crate::error::{Error, Result};
use std::fmt;

/// Supported action parameter kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ParamType {
    /// String - taken verbatim
    #[default]
    String,
    /// Integer - parses to i64
    Int,
    /// Float - parses to f64
    Float,
    /// Boolean - `true`/`false`, `1`/`0`, `yes`/`no`
    Bool,
}

impl ParamType {
    /// Get the type name for error messages
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

/// Coerced argument value
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// String value
    String(String),
    /// Integer value
    Int(i64),
    /// Float value
    Float(f64),
    /// Boolean value
    Bool(bool),
}

impl ParamValue {
    /// Kind of the value
    #[must_use]
    pub const fn kind(&self) -> ParamType {
        match self {
            Self::String(_) => ParamType::String,
            Self::Int(_) => ParamType::Int,
            Self::Float(_) => ParamType::Float,
            Self::Bool(_) => ParamType::Bool,
        }
    }

    /// Get as i64 if Int variant
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as f64 if Float variant
    #[must_use]
    pub const fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Get as bool if Bool variant
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as &str if String variant
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

/// Declared action parameter
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    /// Parameter name, for diagnostics
    pub name: &'static str,
    /// Kind the raw segment is coerced to
    pub kind: ParamType,
    /// Value used when the segment is absent; `None` makes it required
    pub default: Option<ParamValue>,
}

impl ParamSpec {
    /// Required parameter
    #[must_use]
    pub const fn required(name: &'static str, kind: ParamType) -> Self {
        Self {
            name,
            kind,
            default: None,
        }
    }

    /// Parameter with a default value
    #[must_use]
    pub const fn optional(name: &'static str, kind: ParamType, default: ParamValue) -> Self {
        Self {
            name,
            kind,
            default: Some(default),
        }
    }
}

/// Coerce one raw segment to the declared kind
///
/// # Errors
///
/// Returns `Error::Coercion` if the segment does not parse.
pub fn coerce(raw: &str, kind: ParamType) -> Result<ParamValue> {
    let failed = || Error::Coercion {
        value: raw.to_string(),
        expected: kind.type_name(),
    };

    match kind {
        ParamType::String => Ok(ParamValue::String(raw.to_string())),
        ParamType::Int => raw.parse::<i64>().map(ParamValue::Int).map_err(|_| failed()),
        ParamType::Float => raw
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(ParamValue::Float)
            .ok_or_else(failed),
        ParamType::Bool => match raw.to_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(ParamValue::Bool(true)),
            "false" | "0" | "no" => Ok(ParamValue::Bool(false)),
            _ => Err(failed()),
        },
    }
}

/// Bind raw segments to declared parameters, positionally
///
/// Missing trailing segments take their declared default.
///
/// # Errors
///
/// Returns `Error::RouteNotFound` if there are more segments than declared
/// parameters or a required parameter has no segment, `Error::Coercion` if a
/// segment does not parse.
pub fn bind_args(path: &str, params: &[ParamSpec], raw: &[String]) -> Result<Args> {
    let miss = || Error::RouteNotFound {
        path: path.to_string(),
    };
    if raw.len() > params.len() {
        return Err(miss());
    }

    let mut values = Vec::with_capacity(params.len());

    for (index, spec) in params.iter().enumerate() {
        let value = match (raw.get(index), &spec.default) {
            (Some(segment), _) => coerce(segment, spec.kind)?,
            (None, Some(default)) => default.clone(),
            (None, None) => return Err(miss()),
        };
        values.push(value);
    }

    Ok(Args { values })
}

/// Coerced arguments handed to an action
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args {
    values: Vec<ParamValue>,
}

impl Args {
    /// Arguments from already typed values
    #[must_use]
    pub const fn new(values: Vec<ParamValue>) -> Self {
        Self { values }
    }

    /// Number of arguments
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if there are no arguments
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Argument by position
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&ParamValue> {
        self.values.get(index)
    }

    fn typed<T>(
        &self,
        index: usize,
        kind: ParamType,
        pick: impl FnOnce(&ParamValue) -> Option<T>,
    ) -> Result<T> {
        self.values.get(index).and_then(pick).ok_or_else(|| {
            Error::precondition(format!("action argument {index} is not declared as {kind}"))
        })
    }

    /// Integer argument
    ///
    /// # Errors
    ///
    /// Returns `Error::Precondition` if the position was not declared `Int`.
    pub fn int(&self, index: usize) -> Result<i64> {
        self.typed(index, ParamType::Int, ParamValue::as_int)
    }

    /// Float argument
    ///
    /// # Errors
    ///
    /// Returns `Error::Precondition` if the position was not declared `Float`.
    pub fn float(&self, index: usize) -> Result<f64> {
        self.typed(index, ParamType::Float, ParamValue::as_float)
    }

    /// Boolean argument
    ///
    /// # Errors
    ///
    /// Returns `Error::Precondition` if the position was not declared `Bool`.
    pub fn bool(&self, index: usize) -> Result<bool> {
        self.typed(index, ParamType::Bool, ParamValue::as_bool)
    }

    /// String argument
    ///
    /// # Errors
    ///
    /// Returns `Error::Precondition` if the position was not declared `String`.
    pub fn string(&self, index: usize) -> Result<String> {
        self.typed(index, ParamType::String, |v| v.as_str().map(str::to_string))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(segments: &[&str]) -> Vec<String> {
        segments.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_coerce_string() {
        let result = coerce("hello", ParamType::String).unwrap();
        assert_eq!(result, ParamValue::String("hello".to_string()));
    }

    #[test]
    fn test_coerce_int() {
        assert_eq!(coerce("123", ParamType::Int).unwrap(), ParamValue::Int(123));
        assert_eq!(coerce("-456", ParamType::Int).unwrap(), ParamValue::Int(-456));
    }

    #[test]
    fn test_coerce_int_invalid() {
        let err = coerce("abc", ParamType::Int).unwrap_err();
        assert!(matches!(err, Error::Coercion { expected: "int", .. }));
        assert!(err.is_routing_miss());
        assert!(coerce("", ParamType::Int).is_err());
    }

    #[test]
    fn test_coerce_float() {
        assert_eq!(coerce("2.5", ParamType::Float).unwrap(), ParamValue::Float(2.5));
        assert!(coerce("nan", ParamType::Float).is_err());
    }

    #[test]
    fn test_coerce_bool() {
        assert_eq!(coerce("true", ParamType::Bool).unwrap(), ParamValue::Bool(true));
        assert_eq!(coerce("no", ParamType::Bool).unwrap(), ParamValue::Bool(false));
        assert_eq!(coerce("1", ParamType::Bool).unwrap(), ParamValue::Bool(true));
        assert!(coerce("maybe", ParamType::Bool).is_err());
    }

    #[test]
    fn test_bind_with_defaults() {
        let params = [
            ParamSpec::required("id", ParamType::Int),
            ParamSpec::optional("page", ParamType::Int, ParamValue::Int(1)),
        ];

        let args = bind_args("/x", &params, &raw(&["7"])).unwrap();
        assert_eq!(args.int(0).unwrap(), 7);
        assert_eq!(args.int(1).unwrap(), 1);

        let args = bind_args("/x", &params, &raw(&["7", "3"])).unwrap();
        assert_eq!(args.len(), 2);
        assert_eq!(args.int(1).unwrap(), 3);
    }

    #[test]
    fn test_bind_too_many_segments_is_a_miss() {
        let params = [ParamSpec::required("id", ParamType::Int)];
        let err = bind_args("/x", &params, &raw(&["7", "8"])).unwrap_err();
        assert!(matches!(err, Error::RouteNotFound { .. }));
    }

    #[test]
    fn test_bind_missing_required_is_a_miss() {
        let params = [ParamSpec::required("id", ParamType::Int)];
        let err = bind_args("/customer/show", &params, &[]).unwrap_err();
        assert!(matches!(err, Error::RouteNotFound { .. }));
    }

    #[test]
    fn test_bind_coercion_failure_aborts() {
        let params = [
            ParamSpec::required("name", ParamType::String),
            ParamSpec::required("id", ParamType::Int),
        ];
        let err = bind_args("/x", &params, &raw(&["ann", "seven"])).unwrap_err();
        assert!(matches!(err, Error::Coercion { .. }));
    }

    #[test]
    fn test_args_accessors_check_kind() {
        let args = Args::new(vec![ParamValue::String("a".to_string()), ParamValue::Bool(true)]);
        assert_eq!(args.string(0).unwrap(), "a");
        assert!(args.bool(1).unwrap());
        assert!(matches!(args.int(0), Err(Error::Precondition { .. })));
        assert!(args.float(5).is_err());
        assert_eq!(args.get(1).map(ParamValue::kind), Some(ParamType::Bool));
    }
}
