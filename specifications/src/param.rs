//  PARAM.rs
//
//  Description:
//!   Defines the parameter model: the flat, dynamically-typed name/value
//!   pairs clients submit, the scope that determines who consumes them,
//!   and the declared `ParameterSpec` a method's catalog entry uses to
//!   coerce and validate them at admission time.

use std::collections::HashMap;
use std::fmt::{Display, Formatter, Result as FResult};

use serde::{Deserialize, Serialize};
use strum_macros::{Display as StrumDisplay, EnumString};


/***** ERRORS *****/
/// Errors raised while coercing a raw `Parameter` against its declared `ParameterSpec`.
#[derive(Debug)]
pub enum CoercionError {
    /// The parameter's value could not be parsed as its declared kind.
    InvalidValue { name: String, kind: ParameterKind, raw: String },
    /// The parameter's value is not among the declared enum values.
    NotInEnum { name: String, raw: String, allowed: Vec<String> },
}

impl Display for CoercionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        use CoercionError::*;
        match self {
            InvalidValue { name, kind, raw } => write!(f, "Parameter '{name}' has value '{raw}' which cannot be coerced to {kind}"),
            NotInEnum { name, raw, allowed } => write!(f, "Parameter '{name}' has value '{raw}' which is not one of the allowed values: {}", allowed.join(", ")),
        }
    }
}

impl std::error::Error for CoercionError {}



/***** LIBRARY *****/
/// Who consumes a parameter: the analysis as a whole, a specific dataset (as a
/// default, overridable per-dataset), or the system around the analysis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, StrumDisplay, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ParameterScope {
    Analysis,
    Dataset,
    Common,
}



/// The declared type tag of a parameter, as advertised by the method catalog.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ParameterKind {
    Int,
    Float,
    String,
    /// A closed set of allowed string values.
    Enum { values: Vec<String> },
}

impl Display for ParameterKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        match self {
            ParameterKind::Int => write!(f, "int"),
            ParameterKind::Float => write!(f, "float"),
            ParameterKind::String => write!(f, "string"),
            ParameterKind::Enum { values } => write!(f, "enum({})", values.join("|")),
        }
    }
}



/// A single raw name/value pair as submitted by a client, as transmitted: the
/// value is always a string, and its type is recovered at admission time
/// against the declared `ParameterSpec` for the method/dataset in question.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Parameter {
    pub name: String,
    pub value: String,
    pub scope: ParameterScope,
}

impl Parameter {
    /// Coerces this parameter's raw string value against the given spec.
    ///
    /// # Errors
    /// Fails closed if the value cannot be parsed as the
    /// declared kind, or is not among the declared enum values.
    pub fn coerce(&self, spec: &ParameterSpec) -> Result<CoercedValue, CoercionError> {
        match &spec.kind {
            ParameterKind::Int => self.value.parse::<i64>().map(CoercedValue::Int).map_err(|_| CoercionError::InvalidValue {
                name: self.name.clone(),
                kind: spec.kind.clone(),
                raw: self.value.clone(),
            }),
            ParameterKind::Float => self.value.parse::<f64>().map(CoercedValue::Float).map_err(|_| CoercionError::InvalidValue {
                name: self.name.clone(),
                kind: spec.kind.clone(),
                raw: self.value.clone(),
            }),
            ParameterKind::String => Ok(CoercedValue::String(self.value.clone())),
            ParameterKind::Enum { values } => {
                if values.iter().any(|v| v == &self.value) {
                    Ok(CoercedValue::String(self.value.clone()))
                } else {
                    Err(CoercionError::NotInEnum { name: self.name.clone(), raw: self.value.clone(), allowed: values.clone() })
                }
            }
        }
    }
}



/// The coerced, statically-typed result of validating a `Parameter` against its `ParameterSpec`.
#[derive(Clone, Debug, PartialEq)]
pub enum CoercedValue {
    Int(i64),
    Float(f64),
    String(String),
}

impl CoercedValue {
    pub fn as_str(&self) -> Option<&str> {
        if let CoercedValue::String(s) = self { Some(s) } else { None }
    }

    pub fn as_int(&self) -> Option<i64> {
        if let CoercedValue::Int(i) = self { Some(*i) } else { None }
    }

    pub fn as_float(&self) -> Option<f64> {
        if let CoercedValue::Float(f) = self { Some(*f) } else { None }
    }
}



/// A method-declared parameter: name, scope, type, and whether it is required.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ParameterSpec {
    pub name: String,
    pub scope: ParameterScope,
    pub kind: ParameterKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<String>,
}



/// Resolves a flat parameter list against a declared catalog, applying the
/// dataset-scoped default/override rule: a dataset-scoped
/// parameter set at the analysis level serves as a default; a per-dataset
/// setting of the same name overrides it. Unknown parameters are dropped
/// with a warning (the caller logs it); unknown enum values fail closed by
/// virtue of `Parameter::coerce` above.
pub fn resolve_dataset_parameter<'a>(
    name: &str,
    analysis_level: &'a HashMap<String, Parameter>,
    dataset_level: &'a HashMap<String, Parameter>,
) -> Option<&'a Parameter> {
    dataset_level.get(name).or_else(|| analysis_level.get(name))
}



#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coerces_int() {
        let p = Parameter { name: "top_n".into(), value: "25".into(), scope: ParameterScope::Analysis };
        let spec = ParameterSpec { name: "top_n".into(), scope: ParameterScope::Analysis, kind: ParameterKind::Int, required: false, default: None };
        assert_eq!(p.coerce(&spec).unwrap().as_int(), Some(25));
    }

    #[test]
    fn invalid_int_fails_closed() {
        let p = Parameter { name: "top_n".into(), value: "not-a-number".into(), scope: ParameterScope::Analysis };
        let spec = ParameterSpec { name: "top_n".into(), scope: ParameterScope::Analysis, kind: ParameterKind::Int, required: false, default: None };
        assert!(p.coerce(&spec).is_err());
    }

    #[test]
    fn enum_value_must_be_declared() {
        let p = Parameter { name: "direction".into(), value: "sideways".into(), scope: ParameterScope::Dataset };
        let spec = ParameterSpec {
            name: "direction".into(),
            scope: ParameterScope::Dataset,
            kind: ParameterKind::Enum { values: vec!["up".into(), "down".into()] },
            required: false,
            default: None,
        };
        assert!(p.coerce(&spec).is_err());
    }

    #[test]
    fn per_dataset_override_wins_over_analysis_default() {
        let mut analysis_level = HashMap::new();
        analysis_level.insert("norm".to_string(), Parameter { name: "norm".into(), value: "tmm".into(), scope: ParameterScope::Dataset });
        let mut dataset_level = HashMap::new();
        dataset_level.insert("norm".to_string(), Parameter { name: "norm".into(), value: "quantile".into(), scope: ParameterScope::Dataset });

        let resolved = resolve_dataset_parameter("norm", &analysis_level, &dataset_level).unwrap();
        assert_eq!(resolved.value, "quantile");
    }

    #[test]
    fn falls_back_to_analysis_default_when_absent() {
        let mut analysis_level = HashMap::new();
        analysis_level.insert("norm".to_string(), Parameter { name: "norm".into(), value: "tmm".into(), scope: ParameterScope::Dataset });
        let dataset_level = HashMap::new();

        let resolved = resolve_dataset_parameter("norm", &analysis_level, &dataset_level).unwrap();
        assert_eq!(resolved.value, "tmm");
    }
}
