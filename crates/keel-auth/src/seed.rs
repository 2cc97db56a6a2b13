use std::path::Path;

use jsonschema::{validator_for, Validator};
use keel_protocol::Role;
use once_cell::sync::Lazy;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::AuthError;

/// Users created at startup, read from the TOML file named by `KEEL_AUTH_USERS`.
#[derive(Debug, Default, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SeedFile {
    #[serde(default)]
    pub users: Vec<SeedUser>,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SeedUser {
    #[schemars(length(min = 3, max = 254))]
    pub email: String,
    pub name: String,
    #[schemars(length(min = 8, max = 128))]
    pub password: String,
    /// Defaults to `user`.
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub email_verified: Option<bool>,
}

static SEED_SCHEMA: Lazy<Validator> = Lazy::new(|| {
    let schema = schemars::schema_for!(SeedFile);
    let schema_value = serde_json::to_value(&schema).expect("schema value");
    validator_for(&schema_value).expect("valid schema")
});

/// Read, schema-check and parse a seed file.
pub fn load_seed(path: impl AsRef<Path>) -> Result<SeedFile, AuthError> {
    let path = path.as_ref();
    let seed_error = |reason: String| AuthError::Seed {
        path: path.display().to_string(),
        reason,
    };
    let content = std::fs::read_to_string(path)?;
    let raw: toml::Value = toml::from_str(&content).map_err(|e| seed_error(e.to_string()))?;
    let json_value = serde_json::to_value(&raw).map_err(|e| seed_error(e.to_string()))?;
    let validation_errors: Vec<_> = SEED_SCHEMA
        .iter_errors(&json_value)
        .map(|e| format!("{}: {}", e.instance_path, e))
        .collect();
    if !validation_errors.is_empty() {
        return Err(seed_error(validation_errors.join(", ")));
    }
    toml::from_str(&content).map_err(|e| seed_error(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_seed(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_valid_seed() {
        let file = write_seed(
            r#"
[[users]]
email = "root@example.com"
name = "Root"
password = "hunter2hunter2"
role = "admin"

[[users]]
email = "ada@example.com"
name = "Ada"
password = "correct horse"
"#,
        );
        let seed = load_seed(file.path()).unwrap();
        assert_eq!(seed.users.len(), 2);
        assert_eq!(seed.users[0].role, Some(Role::Admin));
        assert_eq!(seed.users[1].role, None);
    }

    #[test]
    fn schema_rejects_short_passwords_and_unknown_roles() {
        let file = write_seed(
            r#"
[[users]]
email = "root@example.com"
name = "Root"
password = "short"
"#,
        );
        let err = load_seed(file.path()).unwrap_err();
        assert!(matches!(err, AuthError::Seed { ref reason, .. } if reason.contains("/users/0/password")));

        let file = write_seed(
            r#"
[[users]]
email = "root@example.com"
name = "Root"
password = "hunter2hunter2"
role = "owner"
"#,
        );
        assert!(matches!(load_seed(file.path()), Err(AuthError::Seed { .. })));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_seed("/nonexistent/keel-users.toml").unwrap_err();
        assert!(matches!(err, AuthError::Io(_)));
    }
}
