//! Pure transforms over numeric arguments.

use crate::error::{RegistrationError, SampleError};
use crate::registry::{Call, Registry, Signature};

fn maximum(call: &Call<'_>) -> Result<f64, SampleError> {
    Ok(call.numbers().fold(f64::NEG_INFINITY, f64::max))
}

fn minimum(call: &Call<'_>) -> Result<f64, SampleError> {
    Ok(call.numbers().fold(f64::INFINITY, f64::min))
}

pub fn register(registry: &mut Registry) -> Result<(), RegistrationError> {
    registry.register_callable(
        Signature::new("max").number("a").number("b").variadic("others").doc("The maximum value of all arguments"),
        maximum,
    )?;
    registry.register_callable(
        Signature::new("min").number("a").number("b").variadic("others").doc("The minimum value of all arguments"),
        minimum,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::registry::Registry;
    use std::time::Duration;

    fn eval(text: &str) -> f64 {
        let registry = Registry::with_builtins().unwrap();
        registry.compile_str(text, Duration::from_secs(1)).unwrap().sample().unwrap()
    }

    #[test]
    fn max_and_min_over_any_number_of_arguments() {
        assert_eq!(eval("max(1, 2)"), 2.0);
        assert_eq!(eval("max(1, 5, 2, -3)"), 5.0);
        assert_eq!(eval("min(1, 2)"), 1.0);
        assert_eq!(eval("min(1, 5, 2, -3)"), -3.0);
        assert_eq!(eval("max(min(4, 8), 2 * 3) - 1"), 5.0);
    }

    #[test]
    fn at_least_two_arguments_are_required() {
        let registry = Registry::with_builtins().unwrap();
        for text in ["max", "max()", "max(1)", "min(1)"] {
            assert!(registry.compile_str(text, Duration::from_secs(1)).is_err(), "{text}");
        }
    }
}
