//! Call arguments.
//!
//! A [`Call`] carries the positional and keyword arguments of one invocation
//! as JSON values, so it can be packed, stored and replayed on a worker.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ExecutionError, PackageError};

/// Positional and keyword arguments of a single invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Call {
    #[serde(default)]
    pub args: Vec<Value>,

    #[serde(default)]
    pub kwargs: Map<String, Value>,
}

impl Call {
    /// An empty call with no arguments.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a call from anything that serializes to a sequence.
    ///
    /// Tuples are the usual input: `Call::with_args(("World", 3))`.
    /// `()` produces an empty call.
    pub fn with_args<T: Serialize>(args: T) -> Result<Self, PackageError> {
        match serde_json::to_value(args).map_err(PackageError::serialization)? {
            Value::Array(args) => Ok(Self {
                args,
                kwargs: Map::new(),
            }),
            Value::Null => Ok(Self::new()),
            other => Err(PackageError::serialization(format!(
                "positional arguments must serialize to a sequence, got {}",
                kind_of(&other)
            ))),
        }
    }

    /// Append one positional argument.
    pub fn arg(mut self, value: impl Serialize) -> Result<Self, PackageError> {
        self.args
            .push(serde_json::to_value(value).map_err(PackageError::serialization)?);
        Ok(self)
    }

    /// Set one keyword argument.
    pub fn kwarg(
        mut self,
        name: impl Into<String>,
        value: impl Serialize,
    ) -> Result<Self, PackageError> {
        let value = serde_json::to_value(value).map_err(PackageError::serialization)?;
        self.kwargs.insert(name.into(), value);
        Ok(self)
    }

    /// Replace all keyword arguments with the fields of a serializable struct or map.
    pub fn with_kwargs<T: Serialize>(mut self, kwargs: T) -> Result<Self, PackageError> {
        match serde_json::to_value(kwargs).map_err(PackageError::serialization)? {
            Value::Object(map) => self.kwargs = map,
            Value::Null => self.kwargs = Map::new(),
            other => {
                return Err(PackageError::serialization(format!(
                    "keyword arguments must serialize to a map, got {}",
                    kind_of(&other)
                )))
            }
        }
        Ok(self)
    }

    /// Number of positional arguments.
    pub fn arity(&self) -> usize {
        self.args.len()
    }

    /// Decode the positional argument at `index`.
    pub fn positional<T: DeserializeOwned>(&self, index: usize) -> Result<T, ExecutionError> {
        let value = self.args.get(index).ok_or_else(|| {
            ExecutionError::invalid_arguments(format!(
                "missing positional argument {} (got {})",
                index,
                self.args.len()
            ))
        })?;
        serde_json::from_value(value.clone()).map_err(|e| {
            ExecutionError::invalid_arguments(format!("positional argument {}: {}", index, e))
        })
    }

    /// Decode the keyword argument `name`, if present.
    pub fn keyword<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, ExecutionError> {
        match self.kwargs.get(name) {
            None => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| {
                    ExecutionError::invalid_arguments(format!("keyword argument {}: {}", name, e))
                }),
        }
    }

    /// Decode all positional arguments at once, typically into a tuple.
    pub fn positional_tuple<T: DeserializeOwned>(&self) -> Result<T, ExecutionError> {
        serde_json::from_value(Value::Array(self.args.clone()))
            .map_err(|e| ExecutionError::invalid_arguments(e.to_string()))
    }
}

impl From<Vec<Value>> for Call {
    fn from(args: Vec<Value>) -> Self {
        Self {
            args,
            kwargs: Map::new(),
        }
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn tuple_becomes_positional_args() {
        let call = Call::with_args(("World", 3)).unwrap();
        assert_eq!(call.args, vec![json!("World"), json!(3)]);
        assert!(call.kwargs.is_empty());
    }

    #[test]
    fn unit_is_empty_call() {
        assert_eq!(Call::with_args(()).unwrap(), Call::new());
    }

    #[test]
    fn scalar_is_rejected() {
        let err = Call::with_args("World").unwrap_err();
        assert!(matches!(err, PackageError::Serialization { .. }));
        assert!(err.to_string().contains("string"));
    }

    #[test]
    fn non_string_map_keys_are_a_serialization_error() {
        let mut weird = HashMap::new();
        weird.insert((1, 2), "pair");
        let err = Call::new().arg(weird).unwrap_err();
        assert!(matches!(err, PackageError::Serialization { .. }));
    }

    #[test]
    fn builder_and_accessors() {
        let call = Call::new()
            .arg("Ada")
            .unwrap()
            .kwarg("excited", true)
            .unwrap();

        assert_eq!(call.arity(), 1);
        assert_eq!(call.positional::<String>(0).unwrap(), "Ada");
        assert_eq!(call.keyword::<bool>("excited").unwrap(), Some(true));
        assert_eq!(call.keyword::<bool>("absent").unwrap(), None);
    }

    #[test]
    fn missing_positional_is_invalid_arguments() {
        let err = Call::new().positional::<u32>(0).unwrap_err();
        assert!(matches!(err, ExecutionError::InvalidArguments { .. }));
    }

    #[test]
    fn wrong_type_is_invalid_arguments() {
        let call = Call::with_args(("not a number",)).unwrap();
        assert!(matches!(
            call.positional::<u32>(0),
            Err(ExecutionError::InvalidArguments { .. })
        ));
    }

    #[test]
    fn kwargs_from_struct() {
        #[derive(Serialize)]
        struct Options {
            retries: u32,
        }
        let call = Call::new().with_kwargs(Options { retries: 2 }).unwrap();
        assert_eq!(call.kwargs["retries"], json!(2));

        let err = Call::new().with_kwargs(vec![1, 2]).unwrap_err();
        assert!(err.to_string().contains("map"));
    }

    #[test]
    fn positional_tuple_decodes_all_args() {
        let call = Call::with_args((2, 40)).unwrap();
        let (a, b): (i64, i64) = call.positional_tuple().unwrap();
        assert_eq!(a + b, 42);
    }
}
