//! `__MATH__` expression rewriting
//!
//! Allocation request properties may carry values of the form
//! `__MATH__(operand, propertyId, op)`. Before a request is sent, each such
//! value is replaced by the result of applying `op` to the referenced live
//! configuration property and the operand. The referenced property is looked
//! up first among the flat configure properties, then inside struct-typed
//! ones; the result keeps the matched property's numeric width.

use crate::error::{CreateError, Result};
use tracing::trace;
use waveforge_types::{Property, PropertyValue};

const MATH_PREFIX: &str = "__MATH__";

/// Rewrite every `__MATH__` value in `request`, recursing through nested
/// property tables
pub fn evaluate_math_in_request(
    request: &mut [Property],
    configure_properties: &[Property],
) -> Result<()> {
    for property in request.iter_mut() {
        if let PropertyValue::Table(members) = &mut property.value {
            evaluate_math_in_request(members, configure_properties)?;
            continue;
        }
        let statement = match property.value.as_str() {
            Some(text) if text.contains(MATH_PREFIX) => text.to_string(),
            _ => continue,
        };
        let rewritten = evaluate_statement(&statement, configure_properties)?;
        trace!(property = %property.id, value = %rewritten, "rewrote __MATH__ request property");
        property.value = rewritten;
    }
    Ok(())
}

fn evaluate_statement(text: &str, configure_properties: &[Property]) -> Result<PropertyValue> {
    let statement = text
        .trim()
        .strip_prefix(MATH_PREFIX)
        .ok_or_else(|| malformed(text))?;
    let inner = statement
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(|| malformed(statement))?;

    let args: Vec<&str> = inner.split(',').map(str::trim).collect();
    if args.len() != 3 {
        return Err(malformed(inner));
    }

    let operand: f64 = args[0]
        .parse()
        .map_err(|_| malformed(inner))?;

    let matched = find_configure_property(configure_properties, args[1]).ok_or_else(|| {
        CreateError::PropertyMatching(format!(
            "property id '{}' does not exist in the component as a configure property",
            args[1]
        ))
    })?;

    let current = matched.value.as_f64().ok_or_else(|| {
        CreateError::PropertyMatching(format!(
            "configure property '{}' is not numeric",
            matched.id
        ))
    })?;

    let result = match args[2] {
        "+" => current + operand,
        "-" => current - operand,
        "*" => current * operand,
        "/" => {
            if operand == 0.0 {
                return Err(CreateError::PropertyMatching(format!(
                    "division by zero in __MATH__ statement '{}'",
                    inner
                )));
            }
            current / operand
        }
        other => {
            return Err(CreateError::PropertyMatching(format!(
                "unsupported operator '{}' in __MATH__ statement",
                other
            )))
        }
    };

    matched.value.with_numeric(result).ok_or_else(|| {
        CreateError::PropertyMatching(format!(
            "configure property '{}' cannot carry a numeric result",
            matched.id
        ))
    })
}

/// Flat configure properties first, then members of struct-typed ones
fn find_configure_property<'a>(
    configure_properties: &'a [Property],
    id: &str,
) -> Option<&'a Property> {
    if let Some(found) = configure_properties.iter().find(|p| p.id == id) {
        return Some(found);
    }
    for property in configure_properties {
        if let PropertyValue::Table(members) = &property.value {
            if let Some(found) = members.iter().find(|m| m.id == id) {
                return Some(found);
            }
        }
    }
    None
}

fn malformed(statement: &str) -> CreateError {
    CreateError::PropertyMatching(format!("invalid __MATH__ statement; '{}'", statement))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configure() -> Vec<Property> {
        vec![
            Property::new("sampleRate", PropertyValue::Long(1_500_000)),
            Property::new(
                "tuner",
                PropertyValue::Table(vec![Property::new(
                    "bandwidth",
                    PropertyValue::Double(20_000.0),
                )]),
            ),
        ]
    }

    #[test]
    fn multiplies_and_keeps_the_matched_width() {
        let mut request = vec![Property::new(
            "capacity",
            PropertyValue::Str("__MATH__(2,sampleRate,*)".into()),
        )];
        evaluate_math_in_request(&mut request, &configure()).unwrap();
        assert_eq!(request[0].value, PropertyValue::Long(3_000_000));
    }

    #[test]
    fn looks_inside_struct_properties() {
        let mut request = vec![Property::new(
            "bw_request",
            PropertyValue::Str("__MATH__(2,bandwidth,/)".into()),
        )];
        evaluate_math_in_request(&mut request, &configure()).unwrap();
        assert_eq!(request[0].value, PropertyValue::Double(10_000.0));
    }

    #[test]
    fn recurses_into_nested_request_tables() {
        let mut request = vec![Property::new(
            "outer",
            PropertyValue::Table(vec![Property::new(
                "inner",
                PropertyValue::Str("__MATH__(100,sampleRate,+)".into()),
            )]),
        )];
        evaluate_math_in_request(&mut request, &configure()).unwrap();
        match &request[0].value {
            PropertyValue::Table(members) => {
                assert_eq!(members[0].value, PropertyValue::Long(1_500_100));
            }
            other => panic!("expected table, got {:?}", other),
        }
    }

    #[test]
    fn missing_property_is_a_matching_error() {
        let mut request = vec![Property::new(
            "capacity",
            PropertyValue::Str("__MATH__(2,missing,*)".into()),
        )];
        let err = evaluate_math_in_request(&mut request, &configure()).unwrap_err();
        assert!(matches!(err, CreateError::PropertyMatching(_)));
    }

    #[test]
    fn malformed_statements_are_rejected() {
        for bad in [
            "__MATH__(2,sampleRate)",
            "__MATH__2,sampleRate,*",
            "__MATH__(2,sampleRate,%)",
            "__MATH__(x,sampleRate,*)",
            "__MATH__(0,sampleRate,/)",
        ] {
            let mut request = vec![Property::new("p", PropertyValue::Str(bad.into()))];
            assert!(
                evaluate_math_in_request(&mut request, &configure()).is_err(),
                "expected rejection for {}",
                bad
            );
        }
    }

    #[test]
    fn plain_values_pass_through() {
        let mut request = vec![Property::new("cap", PropertyValue::Str("4096".into()))];
        evaluate_math_in_request(&mut request, &configure()).unwrap();
        assert_eq!(request[0].value, PropertyValue::Str("4096".into()));
    }
}
