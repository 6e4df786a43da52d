//! Property-level extraction and type checks
//!
//! A property value of `null` at the top level means the property is absent:
//! it is not stored, and clearing a stored property unsets it.

use strata_core::{
    CanonicalValue, Error, JsonPath, LeafKind, PropertyKind, PropertyMetadata, Result, ScalarType,
    Value,
};

use crate::extract::Extractor;

/// Check a canonical value against the property declaration
pub fn check_property(prop: &PropertyMetadata, value: &CanonicalValue) -> Result<()> {
    if value.is_null() {
        if prop.nullable {
            return Ok(());
        }
        return Err(Error::invalid_input(format!("property '{}' is required", prop.name)));
    }

    let PropertyKind::Scalar(ty) = &prop.kind else {
        return Ok(());
    };
    let matches = match (ty, value) {
        (ScalarType::String, CanonicalValue::String(_))
        | (ScalarType::Int, CanonicalValue::Int(_))
        | (ScalarType::Float, CanonicalValue::Float(_))
        | (ScalarType::Bool, CanonicalValue::Bool(_)) => true,
        (ScalarType::DateTime, CanonicalValue::Typed(leaf)) => leaf.kind() == LeafKind::DateTime,
        (ScalarType::Uuid, CanonicalValue::Typed(leaf)) => leaf.kind() == LeafKind::Uuid,
        _ => false,
    };
    if matches {
        Ok(())
    } else {
        Err(Error::invalid_input(format!(
            "property '{}' expects {}, got {}",
            prop.name,
            ty,
            match value {
                CanonicalValue::Typed(leaf) => leaf.kind().to_string(),
                other => other.type_name().to_lowercase(),
            }
        )))
    }
}

/// Extract and check a live property value
///
/// Returns `None` when the property is absent (top-level null).
pub fn extract_property(
    extractor: &Extractor<'_>,
    prop: &PropertyMetadata,
    value: &Value,
) -> Result<Option<CanonicalValue>> {
    let canonical = extractor.extract_at(value, &JsonPath::property(prop.name.clone()))?;
    check_property(prop, &canonical)?;
    Ok(normalize(canonical))
}

/// Map a top-level null to absence
pub fn normalize(value: CanonicalValue) -> Option<CanonicalValue> {
    match value {
        CanonicalValue::Null => None,
        other => Some(other),
    }
}
