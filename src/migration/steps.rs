//! Built-in schema migrations
//!
//! Each transform receives the whole document and returns the rewritten one.
//! Top-level tables are presets; other top-level keys are left alone.

use toml::{Table, Value};

use crate::config::split_csv;

/// Per-source ignore options replaced by the single `ignore` list in 1.1.0.
pub const LEGACY_IGNORE_KEYS: [&str; 3] = [
    "ignore_from_odoo_requirements",
    "ignore_from_addons_dirs_requirements",
    "ignore_from_addons_manifests_requirements",
];

/// List options that 0.1.0 files wrote as comma-separated strings.
const CSV_LIST_KEYS: [&str; 6] = [
    "extra_requirement",
    "addons_path",
    "ignore",
    "ignore_from_odoo_requirements",
    "ignore_from_addons_dirs_requirements",
    "ignore_from_addons_manifests_requirements",
];

fn presets_mut(document: &mut Table) -> impl Iterator<Item = (&String, &mut Table)> {
    document
        .iter_mut()
        .filter_map(|(name, value)| value.as_table_mut().map(|t| (name, t)))
}

/// 0.1.0 → 1.0.0: comma-separated list options become arrays.
pub fn csv_lists_to_arrays(mut document: Table) -> Result<Table, String> {
    for (name, preset) in presets_mut(&mut document) {
        for key in CSV_LIST_KEYS {
            let Some(value) = preset.get_mut(key) else {
                continue;
            };
            match value {
                Value::String(s) => {
                    let items = split_csv(s).into_iter().map(Value::String).collect();
                    *value = Value::Array(items);
                }
                Value::Array(_) => {}
                other => {
                    return Err(format!(
                        "preset '{}': '{}' must be a string or an array, got {}",
                        name,
                        key,
                        other.type_str()
                    ))
                }
            }
        }
    }
    Ok(document)
}

/// 1.0.0 → 1.1.0: fold the per-source ignore lists into `ignore`.
pub fn fold_legacy_ignores(mut document: Table) -> Result<Table, String> {
    for (name, preset) in presets_mut(&mut document) {
        let mut folded: Vec<Value> = Vec::new();
        for key in LEGACY_IGNORE_KEYS {
            match preset.remove(key) {
                Some(Value::Array(items)) => folded.extend(items),
                Some(other) => {
                    return Err(format!(
                        "preset '{}': '{}' must be an array, got {}",
                        name,
                        key,
                        other.type_str()
                    ))
                }
                None => {}
            }
        }
        if folded.is_empty() {
            continue;
        }

        let ignore = match preset
            .entry("ignore")
            .or_insert_with(|| Value::Array(Vec::new()))
        {
            Value::Array(items) => items,
            other => {
                return Err(format!(
                    "preset '{}': 'ignore' must be an array, got {}",
                    name,
                    other.type_str()
                ))
            }
        };
        for item in folded {
            if !ignore.contains(&item) {
                ignore.push(item);
            }
        }
    }
    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(src: &str) -> Table {
        toml::from_str(src).unwrap()
    }

    #[test]
    fn test_csv_lists_to_arrays() {
        let out = csv_lists_to_arrays(doc(
            "[dev]\nextra_requirement = \"ipython, debugpy\"\naddons_path = [\"a\"]\ndescription = \"x, y\"",
        ))
        .unwrap();
        let dev = out["dev"].as_table().unwrap();
        assert_eq!(
            dev["extra_requirement"],
            Value::Array(vec![Value::String("ipython".into()), Value::String("debugpy".into())])
        );
        assert_eq!(dev["addons_path"], Value::Array(vec![Value::String("a".into())]));
        // Scalars untouched
        assert_eq!(dev["description"], Value::String("x, y".into()));
    }

    #[test]
    fn test_csv_lists_wrong_type() {
        let err = csv_lists_to_arrays(doc("[dev]\nignore = 3")).unwrap_err();
        assert!(err.contains("dev"));
        assert!(err.contains("ignore"));
    }

    #[test]
    fn test_fold_legacy_ignores() {
        let out = fold_legacy_ignores(doc(
            "[legacy]\nignore = [\"a\"]\nignore_from_odoo_requirements = [\"b\", \"a\"]\n\
             ignore_from_addons_manifests_requirements = [\"c\"]",
        ))
        .unwrap();
        let legacy = out["legacy"].as_table().unwrap();
        let ignore: Vec<_> = legacy["ignore"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        assert_eq!(ignore, vec!["a", "b", "c"]);
        assert!(!legacy.contains_key("ignore_from_odoo_requirements"));
        assert!(!legacy.contains_key("ignore_from_addons_manifests_requirements"));
    }

    #[test]
    fn test_fold_without_legacy_keys_is_noop() {
        let before = doc("[dev]\nextra_requirement = [\"x\"]");
        let after = fold_legacy_ignores(before.clone()).unwrap();
        assert_eq!(before, after);
    }
}
