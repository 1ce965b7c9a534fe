//! Reconciles a persisted settings document against the compiled defaults.
//!
//! The persisted file may come from any earlier plugin version, may have been
//! edited by hand, or may be missing entirely. `load` never fails because of
//! its contents: every unusable piece is replaced by the compiled default and
//! a write-back is requested so the file converges to the normalized form.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::settings::{FieldSchema, SettingsDocument, Width, UNCATEGORIZED};

const EDITOR_CONFIG: &str = "editorConfig";
const THEMES: &str = "themes";
const LIBRARY_DATA: &str = "libraryData";
const SYSTEM_SETTINGS: &str = "systemSettings";

/// Outcome of [`load`].
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub document: SettingsDocument,
    /// The persisted copy differs from `document` in a way that should be
    /// written back silently (no view refresh).
    pub needs_write_back: bool,
}

/// Merge `persisted` over `defaults`, reconcile the field schema and migrate
/// theme records.
pub fn load(persisted: Option<&Value>, defaults: &SettingsDocument) -> Result<Reconciled> {
    let persisted = match persisted {
        Some(Value::Object(map)) => Some(map),
        Some(other) => {
            warn!(kind = json_kind(other), "Persisted settings are not an object, using defaults");
            None
        }
        None => None,
    };

    let defaults_value = defaults.to_json()?;
    let mut merged = match persisted {
        Some(map) => {
            let mut overrides = map.clone();
            overrides.remove(EDITOR_CONFIG);
            deep_merge(&defaults_value, &Value::Object(overrides))
        }
        None => defaults_value,
    };

    let editor_config =
        reconcile_editor_config(&defaults.editor_config, persisted.and_then(|p| p.get(EDITOR_CONFIG)));

    let mut needs_write_back = sanitize_library(&mut merged);
    let migrated = migrate_themes(&mut merged);
    if migrated > 0 {
        info!(themes = migrated, "Migrated theme data to new format");
        needs_write_back = true;
    }

    let (document, fell_back) = into_document(merged, editor_config, defaults);
    Ok(Reconciled {
        document,
        needs_write_back: needs_write_back || fell_back,
    })
}

/// Recursively combine two JSON values. Objects merge key by key with
/// `persisted` winning; anything else (arrays included) in `persisted`
/// replaces the default outright. Keys only in `persisted` pass through.
pub fn deep_merge(defaults: &Value, persisted: &Value) -> Value {
    match (defaults, persisted) {
        (Value::Object(base), Value::Object(overrides)) => {
            let mut out = base.clone();
            for (key, value) in overrides {
                let merged = match out.get(key) {
                    Some(existing @ Value::Object(_)) if value.is_object() => deep_merge(existing, value),
                    _ => value.clone(),
                };
                out.insert(key.clone(), merged);
            }
            Value::Object(out)
        }
        _ => persisted.clone(),
    }
}

/// Start from the compiled schema and carry over user `label`/`width`
/// overrides, but only when the persisted schema has the same version.
pub fn reconcile_editor_config(compiled: &FieldSchema, persisted: Option<&Value>) -> FieldSchema {
    let mut schema = compiled.clone();
    let Some(saved) = persisted else {
        return schema;
    };

    // Hand-edited files may carry `2.0`
    let saved_version = saved.get("version").and_then(Value::as_f64);
    if saved_version != Some(f64::from(compiled.version)) {
        debug!(
            saved = ?saved_version,
            compiled = compiled.version,
            "Field schema version changed, dropping saved field customizations"
        );
        return schema;
    }

    let Some(saved_fields) = saved.get("fields").and_then(Value::as_array) else {
        return schema;
    };

    for field in &mut schema.fields {
        let saved_field = saved_fields
            .iter()
            .find(|f| f.get("id").and_then(Value::as_str) == Some(field.id.as_str()));
        let Some(saved_field) = saved_field else {
            continue;
        };

        if let Some(label) = saved_field.get("label").and_then(Value::as_str) {
            field.label = label.to_string();
        }
        if let Some(width) = saved_field
            .get("width")
            .and_then(Value::as_str)
            .and_then(Width::from_str)
        {
            field.width = width;
        }
    }

    schema
}

/// Normalize every theme in `doc["themes"]`. Returns how many themes were
/// changed or dropped.
fn migrate_themes(doc: &mut Value) -> usize {
    let Some(themes) = doc.get_mut(THEMES).and_then(Value::as_object_mut) else {
        return 0;
    };

    let before = themes.len();
    themes.retain(|name, theme| {
        let keep = theme.is_object();
        if !keep {
            warn!(theme = %name, kind = json_kind(theme), "Dropping theme that is not an object");
        }
        keep
    });
    let mut changed = before - themes.len();

    for theme in themes.values_mut() {
        if let Some(record) = theme.as_object_mut() {
            if normalize_theme(record) {
                changed += 1;
            }
        }
    }

    changed
}

/// Bring one theme record to the current shape: all four attributes
/// present with the right JSON types, no legacy per-theme schema. Returns
/// whether anything was changed.
pub(crate) fn normalize_theme(record: &mut Map<String, Value>) -> bool {
    let mut changed = false;

    match record.get_mut("fieldValues") {
        Some(Value::Object(values)) => {
            changed |= coerce_field_values(values);
        }
        _ => {
            record.insert("fieldValues".to_string(), Value::Object(Map::new()));
            changed = true;
        }
    }
    if !matches!(record.get("imageUrl"), Some(Value::String(_))) {
        record.insert("imageUrl".to_string(), Value::String(String::new()));
        changed = true;
    }
    if !matches!(record.get("category"), Some(Value::String(_))) {
        record.insert("category".to_string(), Value::String(UNCATEGORIZED.to_string()));
        changed = true;
    }
    if !matches!(record.get("isFavorite"), Some(Value::Bool(_))) {
        record.insert("isFavorite".to_string(), Value::Bool(false));
        changed = true;
    }
    if record.remove(EDITOR_CONFIG).is_some() {
        changed = true;
    }

    changed
}

/// Field values are strings. Numbers and booleans are stringified, anything
/// else is dropped.
fn coerce_field_values(values: &mut Map<String, Value>) -> bool {
    let mut changed = false;
    values.retain(|_, value| {
        let text = match value {
            Value::String(_) => return true,
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => {
                changed = true;
                return false;
            }
        };
        *value = Value::String(text);
        changed = true;
        true
    });
    changed
}

/// Library entries are sorted, deduplicated lists of strings; drop anything
/// else.
fn sanitize_library(doc: &mut Value) -> bool {
    let Some(library) = doc.get_mut(LIBRARY_DATA).and_then(Value::as_object_mut) else {
        return false;
    };

    let before = library.len();
    library.retain(|key, items| {
        let keep = items.is_array();
        if !keep {
            warn!(key = %key, "Dropping library entry that is not a list");
        }
        keep
    });
    let mut changed = before != library.len();

    for items in library.values_mut() {
        let Some(list) = items.as_array_mut() else {
            continue;
        };
        let mut kept: Vec<String> = list
            .iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect();
        kept.sort();
        kept.dedup();
        if kept.len() != list.len() || list.iter().zip(&kept).any(|(item, text)| item.as_str() != Some(text.as_str())) {
            *list = kept.into_iter().map(Value::String).collect();
            changed = true;
        }
    }

    changed
}

fn into_document(merged: Value, editor_config: FieldSchema, defaults: &SettingsDocument) -> (SettingsDocument, bool) {
    let mut root = match merged {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    root.remove(EDITOR_CONFIG);

    let mut fell_back = false;
    let library_data = take_section(&mut root, LIBRARY_DATA, &defaults.library_data, &mut fell_back);
    let themes = take_section(&mut root, THEMES, &defaults.themes, &mut fell_back);
    let system_settings = take_section(&mut root, SYSTEM_SETTINGS, &defaults.system_settings, &mut fell_back);

    let document = SettingsDocument {
        editor_config,
        library_data,
        themes,
        system_settings,
        extra: root,
    };
    (document, fell_back)
}

fn take_section<T: DeserializeOwned + Clone>(
    root: &mut Map<String, Value>,
    key: &str,
    default: &T,
    fell_back: &mut bool,
) -> T {
    match root.remove(key) {
        Some(value) => match serde_json::from_value(value) {
            Ok(section) => section,
            Err(e) => {
                warn!(section = key, error = %e, "Unusable settings section, restoring defaults");
                *fell_back = true;
                default.clone()
            }
        },
        None => default.clone(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
