use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::error::{LibraryError, Result};
use crate::settings::{Behavior, FieldSchema, DEFAULT_RATIO, PRESET_RATIOS, RATIO_KEY};

const TITLE_PLACEHOLDER: &str = "输入标题";

fn snippet_separator() -> &'static Regex {
    static SEPARATOR: OnceLock<Regex> = OnceLock::new();
    SEPARATOR.get_or_init(|| Regex::new(r",\s*").expect("valid snippet separator"))
}

// ── Composition ────────────────────────────────────────────────────────────

/// Build the prompt text: trimmed non-empty values of non-special fields in
/// schema order, joined with `", "`, then ` --ar {ratio}` when the schema has
/// a ratio field. The suffix is added even when every part is empty, which
/// leaves a leading space.
pub fn compose_prompt(schema: &FieldSchema, values: &BTreeMap<String, String>, current_ratio: &str) -> String {
    let parts: Vec<&str> = schema
        .fields
        .iter()
        .filter(|field| !field.is_special())
        .filter_map(|field| values.get(&field.data_key))
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .collect();

    let mut output = parts.join(", ");
    if schema.has_ratio() {
        output.push_str(" --ar ");
        output.push_str(current_ratio);
    }
    output
}

/// Title shown above the preview.
pub fn preview_title(schema: &FieldSchema, values: &BTreeMap<String, String>) -> String {
    schema
        .title_field()
        .and_then(|field| values.get(&field.data_key))
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .unwrap_or(TITLE_PLACEHOLDER)
        .to_string()
}

// ── Library items ──────────────────────────────────────────────────────────

/// Apply a library snippet to a field value. Appending never duplicates a
/// snippet already present in the comma-separated value.
pub fn apply_library_item(behavior: Behavior, current: &str, item: &str) -> String {
    match behavior {
        Behavior::Replace => item.to_string(),
        Behavior::Append | Behavior::Special => {
            let current = current.trim();
            if current.is_empty() {
                item.to_string()
            } else if split_snippets(current).any(|part| part == item) {
                current.to_string()
            } else {
                format!("{}, {}", current, item)
            }
        }
    }
}

fn split_snippets(value: &str) -> impl Iterator<Item = &str> {
    snippet_separator().split(value).map(str::trim)
}

/// Add a snippet to the library under `data_key`, keeping the list sorted and
/// free of duplicates. Returns whether the library changed.
pub fn add_library_item(library: &mut BTreeMap<String, Vec<String>>, data_key: &str, value: &str) -> bool {
    let value = value.trim();
    if value.is_empty() {
        return false;
    }

    let items = library.entry(data_key.to_string()).or_default();
    if items.iter().any(|item| item == value) {
        return false;
    }
    items.push(value.to_string());
    items.sort();
    true
}

/// Remove a snippet. Returns whether the library changed.
pub fn remove_library_item(library: &mut BTreeMap<String, Vec<String>>, data_key: &str, value: &str) -> bool {
    let value = value.trim();
    let Some(items) = library.get_mut(data_key) else {
        return false;
    };
    match items.iter().position(|item| item == value) {
        Some(index) => {
            items.remove(index);
            true
        }
        None => false,
    }
}

/// Ratio presets followed by the user's custom ratios, without repeats.
pub fn available_ratios(custom: &[String]) -> Vec<String> {
    let mut ratios: Vec<String> = Vec::with_capacity(PRESET_RATIOS.len() + custom.len());
    for ratio in PRESET_RATIOS.iter().copied().chain(custom.iter().map(String::as_str)) {
        if !ratios.iter().any(|r| r == ratio) {
            ratios.push(ratio.to_string());
        }
    }
    ratios
}

// ── Editor working copy ────────────────────────────────────────────────────

/// Values currently in the editor. Not persisted; themes snapshot it.
#[derive(Debug, Clone, PartialEq)]
pub struct EditorState {
    pub values: BTreeMap<String, String>,
    pub current_ratio: String,
}

impl Default for EditorState {
    fn default() -> Self {
        Self {
            values: BTreeMap::new(),
            current_ratio: DEFAULT_RATIO.to_string(),
        }
    }
}

impl EditorState {
    /// Load values for the schema's fields from `data`; keys the schema does
    /// not know are ignored. A non-empty `ratio` becomes the current ratio.
    pub fn import_values(&mut self, schema: &FieldSchema, data: &BTreeMap<String, String>) {
        if let Some(ratio) = data.get(RATIO_KEY).filter(|r| !r.is_empty()) {
            self.current_ratio = ratio.clone();
        }
        for field in &schema.fields {
            if field.data_key == RATIO_KEY {
                continue;
            }
            if let Some(value) = data.get(&field.data_key) {
                self.values.insert(field.data_key.clone(), value.clone());
            }
        }
    }

    /// Snapshot of every schema field, ratio included.
    pub fn field_values(&self, schema: &FieldSchema) -> BTreeMap<String, String> {
        schema
            .fields
            .iter()
            .map(|field| {
                let value = if field.data_key == RATIO_KEY {
                    self.current_ratio.clone()
                } else {
                    self.values.get(&field.data_key).cloned().unwrap_or_default()
                };
                (field.data_key.clone(), value)
            })
            .collect()
    }

    /// Empty every field; the ratio is kept.
    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn set_value(&mut self, data_key: &str, value: impl Into<String>) {
        self.values.insert(data_key.to_string(), value.into());
    }

    pub fn apply_library_item(&mut self, schema: &FieldSchema, field_id: &str, item: &str) -> Result<()> {
        let field = schema
            .field(field_id)
            .ok_or_else(|| LibraryError::NotFound(format!("Field '{}'", field_id)))?;
        let current = self.values.get(&field.data_key).map(String::as_str).unwrap_or("");
        let updated = apply_library_item(field.behavior, current, item);
        self.values.insert(field.data_key.clone(), updated);
        Ok(())
    }

    pub fn compose(&self, schema: &FieldSchema) -> String {
        compose_prompt(schema, &self.values, &self.current_ratio)
    }

    pub fn title(&self, schema: &FieldSchema) -> String {
        preview_title(schema, &self.values)
    }
}
