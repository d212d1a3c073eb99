//! Secrets input files.
//!
//! Create and update read a YAML map from secret id to the environment
//! variable holding its value:
//!
//! ```yaml
//! secretsNames:
//!   api_key: [API_KEY_ENV]
//! ```
//!
//! Delete reads a plain list of ids:
//!
//! ```yaml
//! secretsNames: [api_key, db_password]
//! ```

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Result, VaultError};
use crate::types::{SecretItem, DEFAULT_NAMESPACE};

/// Most secrets one request may carry.
pub const MAX_SECRET_ITEMS_PER_PAYLOAD: usize = 10;

#[derive(Deserialize)]
struct UpsertFile {
    #[serde(rename = "secretsNames", default)]
    secrets_names: BTreeMap<String, Vec<String>>,
}

#[derive(Deserialize)]
struct DeleteFile {
    #[serde(rename = "secretsNames", default)]
    secrets_names: Vec<String>,
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

fn read_file(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .map_err(|e| VaultError::validation(format!("failed to read secrets file {}: {e}", path.display())))
}

/// Resolve create/update inputs, reading values from the process environment.
pub fn resolve_upsert_inputs(path: &Path) -> Result<Vec<SecretItem>> {
    resolve_upsert_inputs_with(path, |name| std::env::var_os(name))
}

/// Resolve create/update inputs with an explicit variable lookup.
pub fn resolve_upsert_inputs_with<F>(path: &Path, lookup: F) -> Result<Vec<SecretItem>>
where
    F: Fn(&str) -> Option<OsString>,
{
    if !is_yaml(path) {
        return Err(VaultError::validation(
            "expected a YAML file; for the MSIG second step use `secrets execute <bundle.json>`",
        ));
    }
    let file: UpsertFile = serde_yaml::from_str(&read_file(path)?)
        .map_err(|e| VaultError::validation(format!("failed to parse YAML: {e}")))?;
    if file.secrets_names.is_empty() {
        return Err(VaultError::validation("YAML must contain a non-empty 'secretsNames' map"));
    }

    let mut items = Vec::with_capacity(file.secrets_names.len());
    for (id, env_names) in file.secrets_names {
        let env_name = match env_names.as_slice() {
            [] => return Err(VaultError::validation(format!("secret {id:?} has no values"))),
            [one] => one.trim(),
            many => {
                return Err(VaultError::validation(format!(
                    "secret {id:?} must have exactly one env var name; got {}",
                    many.len()
                )))
            }
        };
        if env_name.is_empty() {
            return Err(VaultError::validation(format!("secret {id:?} has an empty env var name")));
        }
        let value = lookup(env_name).ok_or_else(|| {
            VaultError::validation(format!(
                "environment variable {env_name:?} for secret {id:?} not found; please export it"
            ))
        })?;
        let value = value.into_string().map_err(|_| {
            VaultError::validation(format!(
                "value for secret {id:?} (env {env_name:?}) contains invalid UTF-8"
            ))
        })?;

        items.push(SecretItem {
            id,
            value,
            namespace: DEFAULT_NAMESPACE.to_string(),
        });
        if items.len() > MAX_SECRET_ITEMS_PER_PAYLOAD {
            return Err(VaultError::validation(format!(
                "cannot have more than {MAX_SECRET_ITEMS_PER_PAYLOAD} items in a single payload; check your secrets YAML"
            )));
        }
    }

    validate_items(&items)?;
    Ok(items)
}

/// Resolve delete inputs: trimmed, non-empty ids in file order.
pub fn resolve_delete_inputs(path: &Path) -> Result<Vec<SecretItem>> {
    if !is_yaml(path) {
        return Err(VaultError::validation("expected a YAML file for secrets delete"));
    }
    let file: DeleteFile = serde_yaml::from_str(&read_file(path)?)
        .map_err(|e| VaultError::validation(format!("failed to parse YAML: {e}")))?;
    if file.secrets_names.is_empty() {
        return Err(VaultError::validation("YAML must contain a non-empty 'secretsNames' list"));
    }

    let mut items = Vec::with_capacity(file.secrets_names.len());
    for raw in file.secrets_names {
        let id = raw.trim();
        if id.is_empty() {
            return Err(VaultError::validation("'secretsNames' list contains an empty id"));
        }
        items.push(SecretItem {
            id: id.to_string(),
            value: String::new(),
            namespace: DEFAULT_NAMESPACE.to_string(),
        });
    }
    if items.len() > MAX_SECRET_ITEMS_PER_PAYLOAD {
        return Err(VaultError::validation(format!(
            "cannot have more than {MAX_SECRET_ITEMS_PER_PAYLOAD} items in a single payload; check your secrets YAML"
        )));
    }
    Ok(items)
}

/// Check that every item names a secret, a namespace and a value.
pub fn validate_items(items: &[SecretItem]) -> Result<()> {
    if items.is_empty() {
        return Err(VaultError::validation("no secrets provided: file contains empty array"));
    }
    for (i, item) in items.iter().enumerate() {
        let missing = if item.id.is_empty() {
            Some("id")
        } else if item.value.is_empty() {
            Some("value")
        } else if item.namespace.is_empty() {
            Some("namespace")
        } else {
            None
        };
        if let Some(field) = missing {
            return Err(VaultError::validation(format!(
                "validation failed for SecretItem at index {i}: {field} is required"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn write(dir: &tempfile::TempDir, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, body).unwrap();
        path
    }

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<OsString> {
        let map: HashMap<String, OsString> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), OsString::from(v)))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_upsert_resolves_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "s.yaml", "secretsNames:\n  b: [B_ENV]\n  a: [A_ENV]\n");
        let items = resolve_upsert_inputs_with(&path, env(&[("A_ENV", "1"), ("B_ENV", "2")])).unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, "a");
        assert_eq!(items[0].value, "1");
        assert_eq!(items[1].namespace, "main");
    }

    #[test]
    fn test_upsert_rejects_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        let lookup = || env(&[("X", "v")]);

        let json = write(&dir, "s.json", "{}");
        assert!(resolve_upsert_inputs_with(&json, lookup()).unwrap_err().to_string().contains("execute"));

        let empty = write(&dir, "e.yaml", "secretsNames: {}\n");
        assert!(resolve_upsert_inputs_with(&empty, lookup()).is_err());

        let two = write(&dir, "t.yml", "secretsNames:\n  a: [X, Y]\n");
        assert!(resolve_upsert_inputs_with(&two, lookup()).unwrap_err().to_string().contains("exactly one"));

        let missing = write(&dir, "m.yaml", "secretsNames:\n  a: [NOPE]\n");
        assert!(resolve_upsert_inputs_with(&missing, lookup()).unwrap_err().to_string().contains("please export"));

        let blank = write(&dir, "b.yaml", "secretsNames:\n  a: [\"  \"]\n");
        assert!(resolve_upsert_inputs_with(&blank, lookup()).unwrap_err().to_string().contains("empty env var"));
    }

    #[test]
    fn test_upsert_item_limit() {
        let dir = tempfile::tempdir().unwrap();
        let body: String = std::iter::once("secretsNames:\n".to_string())
            .chain((0..11).map(|i| format!("  s{i}: [X]\n")))
            .collect();
        let path = write(&dir, "many.yaml", &body);
        let err = resolve_upsert_inputs_with(&path, env(&[("X", "v")])).unwrap_err();
        assert!(err.to_string().contains("more than 10"));
    }

    #[test]
    fn test_empty_value_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "s.yaml", "secretsNames:\n  a: [X]\n");
        let err = resolve_upsert_inputs_with(&path, env(&[("X", "")])).unwrap_err();
        assert!(err.to_string().contains("index 0"));
    }

    #[test]
    fn test_delete_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "d.yaml", "secretsNames: [ ' b ', a ]\n");
        let items = resolve_delete_inputs(&path).unwrap();
        let ids: Vec<_> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, ["b", "a"]);

        let blank = write(&dir, "x.yaml", "secretsNames: [a, '']\n");
        assert!(resolve_delete_inputs(&blank).is_err());
        let none = write(&dir, "n.yaml", "other: 1\n");
        assert!(resolve_delete_inputs(&none).is_err());
    }
}
