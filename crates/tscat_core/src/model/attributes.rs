//! Open attribute map carried by events and catalogues.
//!
//! # Invariants
//! - Keys match `[A-Za-z][A-Za-z0-9_]*` and never name a reserved key of the
//!   owning entity kind.
//! - Values are stored in normalized form (see [`AttributeValue::normalized`]).

use crate::model::validation::ValidationError;
use crate::model::value::AttributeValue;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

static ATTRIBUTE_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").expect("valid attribute name regex"));

/// Variable attributes of one entity, ordered by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attributes {
    values: BTreeMap<String, AttributeValue>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttributeValue)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Builds a validated map from `(name, value)` pairs.
    ///
    /// Later duplicates overwrite earlier ones.
    pub(crate) fn from_pairs<I>(pairs: I, reserved: &[&str]) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = (String, AttributeValue)>,
    {
        let mut attributes = Self::new();
        for (name, value) in pairs {
            attributes.insert_checked(name, value, reserved)?;
        }
        Ok(attributes)
    }

    /// Validates, normalizes and inserts one attribute.
    pub(crate) fn insert_checked(
        &mut self,
        name: String,
        value: AttributeValue,
        reserved: &[&str],
    ) -> Result<(), ValidationError> {
        validate_attribute_name(&name, reserved)?;
        self.values.insert(name, value.normalized()?);
        Ok(())
    }

    /// Inserts an already-validated value read back from storage.
    pub(crate) fn insert_stored(&mut self, name: String, value: AttributeValue) {
        self.values.insert(name, value);
    }

    pub(crate) fn remove(&mut self, name: &str) -> Option<AttributeValue> {
        self.values.remove(name)
    }
}

/// Checks an attribute name against the naming rule and reserved keys.
pub fn validate_attribute_name(name: &str, reserved: &[&str]) -> Result<(), ValidationError> {
    if !ATTRIBUTE_NAME_RE.is_match(name) {
        return Err(ValidationError::InvalidAttributeName(name.to_string()));
    }
    if reserved.contains(&name) {
        return Err(ValidationError::ReservedAttributeName(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{validate_attribute_name, Attributes};
    use crate::model::validation::ValidationError;
    use crate::model::value::AttributeValue;

    #[test]
    fn attribute_names_follow_identifier_rule() {
        assert!(validate_attribute_name("field_1", &[]).is_ok());
        assert!(validate_attribute_name("X", &[]).is_ok());
        for bad in ["", "1abc", "_x", "with space", "dash-ed", "é"] {
            assert_eq!(
                validate_attribute_name(bad, &[]),
                Err(ValidationError::InvalidAttributeName(bad.to_string()))
            );
        }
        assert_eq!(
            validate_attribute_name("author", &["author"]),
            Err(ValidationError::ReservedAttributeName("author".to_string()))
        );
    }

    #[test]
    fn insert_checked_overwrites_and_normalizes() {
        let mut attributes = Attributes::new();
        attributes
            .insert_checked("a".to_string(), AttributeValue::Integer(1), &[])
            .unwrap();
        attributes
            .insert_checked("a".to_string(), "text".into(), &[])
            .unwrap();
        assert_eq!(attributes.len(), 1);
        assert_eq!(attributes.get("a"), Some(&AttributeValue::from("text")));
        assert!(attributes
            .insert_checked("b".to_string(), AttributeValue::Float(f64::INFINITY), &[])
            .is_err());
        assert!(!attributes.contains("b"));
    }
}
