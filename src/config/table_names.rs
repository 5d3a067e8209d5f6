//! Entity name to table name mapping.
//!
//! Table names come from plain environment variables, one per entity:
//! `OrderItemModel` resolves through `DYNAMODB_TABLE_ORDER_ITEM`.

use std::collections::HashMap;

use super::ConfigError;

/// Prefix of the per-entity table variables.
pub const TABLE_ENV_PREFIX: &str = "DYNAMODB_TABLE_";

const MODEL_SUFFIX: &str = "Model";

/// Convert a camel-case entity name to upper snake case.
///
/// A trailing `Model` suffix is dropped and an underscore is inserted at
/// every lower-to-upper boundary.
pub fn upper_snake_case(entity: &str) -> String {
    let base = entity
        .strip_suffix(MODEL_SUFFIX)
        .filter(|rest| !rest.is_empty())
        .unwrap_or(entity);

    let mut out = String::with_capacity(base.len() + 4);
    let mut prev_lower = false;
    for c in base.chars() {
        if c.is_uppercase() && prev_lower {
            out.push('_');
        }
        prev_lower = c.is_lowercase() || c.is_ascii_digit();
        out.extend(c.to_uppercase());
    }
    out
}

/// Resolved table names keyed by variable name.
#[derive(Debug, Clone, Default)]
pub struct TableNames {
    vars: HashMap<String, String>,
}

impl TableNames {
    /// Snapshot every `DYNAMODB_TABLE_*` variable of the current process.
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars().filter(|(k, _)| k.starts_with(TABLE_ENV_PREFIX)))
    }

    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: vars
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Variable name consulted for `entity`.
    pub fn variable_for(entity: &str) -> String {
        format!("{}{}", TABLE_ENV_PREFIX, upper_snake_case(entity))
    }

    /// Table name for `entity`, or [`ConfigError::MissingTableName`].
    pub fn resolve(&self, entity: &str) -> Result<&str, ConfigError> {
        let variable = Self::variable_for(entity);
        match self.vars.get(&variable).map(String::as_str) {
            Some(name) if !name.trim().is_empty() => Ok(name),
            _ => Err(ConfigError::MissingTableName {
                entity: entity.to_string(),
                variable,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    #[test]
    fn test_upper_snake_case() {
        assert_eq!(upper_snake_case("UserModel"), "USER");
        assert_eq!(upper_snake_case("OrderItemModel"), "ORDER_ITEM");
        assert_eq!(upper_snake_case("orderItem"), "ORDER_ITEM");
        assert_eq!(upper_snake_case("Model"), "MODEL");
        assert_eq!(upper_snake_case("Page2Visit"), "PAGE2_VISIT");
        assert_eq!(upper_snake_case("URL"), "URL");
    }

    #[test]
    fn test_resolve() {
        let names = TableNames::from_vars([("DYNAMODB_TABLE_ORDER_ITEM", "prod-order-items")]);
        assert_eq!(names.resolve("OrderItemModel").unwrap(), "prod-order-items");
    }

    #[test]
    fn test_missing_mapping() {
        let names = TableNames::from_vars([("DYNAMODB_TABLE_USER", "")]);
        match names.resolve("UserModel") {
            Err(ConfigError::MissingTableName { entity, variable }) => {
                assert_eq!(entity, "UserModel");
                assert_eq!(variable, "DYNAMODB_TABLE_USER");
            }
            other => panic!("expected MissingTableName, got {:?}", other),
        }
    }

    #[test]
    #[serial]
    fn test_from_env() {
        std::env::set_var("DYNAMODB_TABLE_INVOICE", "invoices-test");
        let names = TableNames::from_env();
        std::env::remove_var("DYNAMODB_TABLE_INVOICE");

        assert_eq!(names.resolve("Invoice").unwrap(), "invoices-test");
    }
}
