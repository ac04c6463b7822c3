//! Tasks compiled into the `silo-agent` binary.

use serde_json::Value;
use silo_core::{Call, ExecutionError, TaskRegistry};

/// Registry of the built-in tasks:
///
/// - `echo(*args)` returns its positional arguments as an array
/// - `greet(name, greeting="Hello")` returns `"{greeting}, {name}!"`
/// - `add(a, b)` adds two integers
/// - `sum(values)` adds a list of numbers
pub fn builtin_registry() -> TaskRegistry {
    TaskRegistry::new()
        .with("echo", echo)
        .with("greet", greet)
        .with_typed("add", |(a, b): (i64, i64)| {
            a.checked_add(b)
                .ok_or_else(|| ExecutionError::failed("integer overflow"))
        })
        .with_typed("sum", |(values,): (Vec<f64>,)| Ok(values.iter().sum::<f64>()))
}

fn echo(call: &Call) -> Result<Value, ExecutionError> {
    Ok(Value::Array(call.args.clone()))
}

fn greet(call: &Call) -> Result<Value, ExecutionError> {
    let name: String = call.positional(0)?;
    let greeting = call
        .keyword::<String>("greeting")?
        .unwrap_or_else(|| "Hello".to_string());
    Ok(Value::String(format!("{}, {}!", greeting, name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use silo_core::TaskDescriptor;

    fn invoke(name: &str, call: &Call) -> Result<Value, ExecutionError> {
        builtin_registry().invoke(&TaskDescriptor::named(name), call)
    }

    #[test]
    fn greet_with_and_without_keyword() {
        let call = Call::with_args(("World",)).unwrap();
        assert_eq!(invoke("greet", &call).unwrap(), json!("Hello, World!"));

        let call = call.kwarg("greeting", "Hi").unwrap();
        assert_eq!(invoke("greet", &call).unwrap(), json!("Hi, World!"));
    }

    #[test]
    fn add_and_sum() {
        assert_eq!(
            invoke("add", &Call::with_args((2, 3)).unwrap()).unwrap(),
            json!(5)
        );
        assert_eq!(
            invoke("sum", &Call::with_args((vec![1.5, 2.5],)).unwrap()).unwrap(),
            json!(4.0)
        );
    }

    #[test]
    fn add_overflow_is_a_failure() {
        let err = invoke("add", &Call::with_args((i64::MAX, 1)).unwrap()).unwrap_err();
        assert!(matches!(err, ExecutionError::Failed { .. }));
    }

    #[test]
    fn echo_returns_arguments() {
        let call = Call::with_args((1, "two", [3])).unwrap();
        assert_eq!(invoke("echo", &call).unwrap(), json!([1, "two", [3]]));
    }
}
