//! JSON text formats exchanged through the clipboard and exported files.
//!
//! Every `parse_*` function validates the whole input before returning, so a
//! caller can apply the result knowing nothing partial slipped through.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

use crate::error::{LibraryError, Result};
use crate::reconcile::normalize_theme;
use crate::settings::{SettingsDocument, ThemeRecord, TITLE_KEY, UNCATEGORIZED};

pub const THEMES_EXPORT_FILE: &str = "prompt_library_themes.json";
pub const LIBRARY_EXPORT_FILE: &str = "prompt_library_elements.json";

/// Exported text with the file name offered to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportFile {
    pub file_name: String,
    pub contents: String,
}

fn parse_json(text: &str) -> Result<Value> {
    serde_json::from_str(text).map_err(|e| LibraryError::InvalidImportJson(e.to_string()))
}

fn expect_object(value: Value, what: &str) -> Result<Map<String, Value>> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(LibraryError::InvalidImportJson(format!("{} must be a JSON object", what))),
    }
}

fn pretty<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// Strings as-is, numbers and booleans stringified, anything else skipped.
fn string_map(map: &Map<String, Value>) -> BTreeMap<String, String> {
    map.iter()
        .filter_map(|(key, value)| {
            let text = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => return None,
            };
            Some((key.clone(), text))
        })
        .collect()
}

// ── Structured editor content ──────────────────────────────────────────────

pub fn export_structured_content(field_values: &BTreeMap<String, String>) -> Result<String> {
    pretty(&json!({ "fieldValues": field_values }))
}

pub fn parse_structured_content(text: &str) -> Result<BTreeMap<String, String>> {
    let root = expect_object(parse_json(text)?, "Structured content")?;
    match root.get("fieldValues") {
        Some(Value::Object(values)) => Ok(string_map(values)),
        _ => Err(LibraryError::MissingRequiredField("fieldValues")),
    }
}

// ── Shared single theme ────────────────────────────────────────────────────

/// The four theme attributes, without any extra keys.
pub fn export_shared_theme(theme: &ThemeRecord) -> Result<String> {
    pretty(&json!({
        "fieldValues": theme.field_values,
        "imageUrl": theme.image_url,
        "category": theme.category,
        "isFavorite": theme.is_favorite,
    }))
}

/// Parse a shared theme; its name is the trimmed `fieldValues.title`.
pub fn parse_shared_theme(text: &str) -> Result<(String, ThemeRecord)> {
    let root = expect_object(parse_json(text)?, "Theme")?;
    let Some(Value::Object(values)) = root.get("fieldValues") else {
        return Err(LibraryError::MissingRequiredField("fieldValues"));
    };
    let field_values = string_map(values);
    let name = field_values
        .get(TITLE_KEY)
        .map(|title| title.trim())
        .filter(|title| !title.is_empty())
        .ok_or(LibraryError::MissingRequiredField("title"))?
        .to_string();

    let text_or = |key: &str, fallback: &str| {
        root.get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .unwrap_or(fallback)
            .to_string()
    };
    let mut theme = ThemeRecord::new(field_values);
    theme.image_url = text_or("imageUrl", "");
    theme.category = text_or("category", UNCATEGORIZED);
    theme.is_favorite = root.get("isFavorite").and_then(Value::as_bool).unwrap_or(false);

    Ok((name, theme))
}

// ── Theme bundle ───────────────────────────────────────────────────────────

pub fn export_themes(themes: &BTreeMap<String, ThemeRecord>) -> Result<String> {
    if themes.is_empty() {
        return Err(LibraryError::NothingToExport);
    }
    pretty(themes)
}

pub fn themes_file(themes: &BTreeMap<String, ThemeRecord>) -> Result<ExportFile> {
    Ok(ExportFile {
        file_name: THEMES_EXPORT_FILE.to_string(),
        contents: export_themes(themes)?,
    })
}

/// Parse an exported theme bundle, migrating each entry to the current shape.
pub fn parse_theme_bundle(text: &str) -> Result<BTreeMap<String, ThemeRecord>> {
    let root = expect_object(parse_json(text)?, "Theme bundle")?;
    let mut bundle = BTreeMap::new();
    for (name, entry) in root {
        let Value::Object(mut record) = entry else {
            return Err(LibraryError::InvalidImportJson(format!(
                "Theme '{}' must be a JSON object",
                name
            )));
        };
        normalize_theme(&mut record);
        let theme: ThemeRecord = serde_json::from_value(Value::Object(record))
            .map_err(|e| LibraryError::InvalidImportJson(format!("Theme '{}': {}", name, e)))?;
        bundle.insert(name, theme);
    }
    Ok(bundle)
}

// ── Library bundle ─────────────────────────────────────────────────────────

pub fn export_library(library: &BTreeMap<String, Vec<String>>) -> Result<String> {
    pretty(library)
}

pub fn library_file(library: &BTreeMap<String, Vec<String>>) -> Result<ExportFile> {
    Ok(ExportFile {
        file_name: LIBRARY_EXPORT_FILE.to_string(),
        contents: export_library(library)?,
    })
}

/// Parse a library bundle. Lists come back sorted and deduplicated;
/// non-string items are dropped.
pub fn parse_library(text: &str) -> Result<BTreeMap<String, Vec<String>>> {
    let root = expect_object(parse_json(text)?, "Library")?;
    let mut library = BTreeMap::new();
    for (key, entry) in root {
        let Value::Array(items) = entry else {
            return Err(LibraryError::InvalidImportJson(format!(
                "Library entry '{}' must be a list",
                key
            )));
        };
        let mut items: Vec<String> = items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s),
                _ => None,
            })
            .collect();
        items.sort();
        items.dedup();
        library.insert(key, items);
    }
    Ok(library)
}

/// Imported keys replace existing keys wholesale.
pub fn merge_library(library: &mut BTreeMap<String, Vec<String>>, imported: BTreeMap<String, Vec<String>>) {
    library.extend(imported);
}

// ── Backup ─────────────────────────────────────────────────────────────────

pub fn backup_file_name(now: DateTime<Utc>) -> String {
    format!("prompt_library_backup_{}.json", now.timestamp_millis())
}

pub fn export_backup(doc: &SettingsDocument) -> Result<String> {
    pretty(doc)
}

pub fn backup_file(doc: &SettingsDocument, now: DateTime<Utc>) -> Result<ExportFile> {
    Ok(ExportFile {
        file_name: backup_file_name(now),
        contents: export_backup(doc)?,
    })
}

/// A backup is restored verbatim, so only its outer shape is checked here;
/// the reconciler does the rest on the next load.
pub fn parse_backup(text: &str) -> Result<Value> {
    let root = expect_object(parse_json(text)?, "Backup")?;
    Ok(Value::Object(root))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_structured_content_round_trip() {
        let mut values = BTreeMap::new();
        values.insert("title".to_string(), "Glass".to_string());
        values.insert("ratio".to_string(), "16:9".to_string());
        let text = export_structured_content(&values).unwrap();
        assert!(text.contains("\"fieldValues\": {"));
        assert_eq!(parse_structured_content(&text).unwrap(), values);
    }

    #[test]
    fn test_structured_content_errors() {
        assert!(matches!(
            parse_structured_content("not json"),
            Err(LibraryError::InvalidImportJson(_))
        ));
        assert!(matches!(
            parse_structured_content("[1]"),
            Err(LibraryError::InvalidImportJson(_))
        ));
        assert!(matches!(
            parse_structured_content(r#"{"values": {}}"#),
            Err(LibraryError::MissingRequiredField("fieldValues"))
        ));
    }

    #[test]
    fn test_shared_theme_defaults_and_title() {
        let (name, theme) =
            parse_shared_theme(r#"{"fieldValues": {"title": "  Neon  ", "style": "glow"}}"#).unwrap();
        assert_eq!(name, "Neon");
        assert_eq!(theme.image_url, "");
        assert_eq!(theme.category, UNCATEGORIZED);
        assert!(!theme.is_favorite);
        assert_eq!(theme.field_values["style"], "glow");

        assert!(matches!(
            parse_shared_theme(r#"{"fieldValues": {"title": "   "}}"#),
            Err(LibraryError::MissingRequiredField("title"))
        ));
        assert!(matches!(
            parse_shared_theme(r#"{"imageUrl": "x"}"#),
            Err(LibraryError::MissingRequiredField("fieldValues"))
        ));
    }

    #[test]
    fn test_shared_theme_export_drops_extra_keys() {
        let mut theme = ThemeRecord::new(BTreeMap::new());
        theme.is_favorite = true;
        theme.extra.insert("internal".to_string(), json!(1));
        let value: Value = serde_json::from_str(&export_shared_theme(&theme).unwrap()).unwrap();
        assert_eq!(
            value,
            json!({ "fieldValues": {}, "imageUrl": "", "category": "未分类", "isFavorite": true })
        );
    }

    #[test]
    fn test_theme_bundle_migrates_entries() {
        let bundle = parse_theme_bundle(
            r#"{ "A": { "fieldValues": { "title": "A" }, "editorConfig": { "version": 1 } } }"#,
        )
        .unwrap();
        assert_eq!(bundle["A"], ThemeRecord::new(bundle["A"].field_values.clone()));
        assert!(parse_theme_bundle(r#"{ "A": 3 }"#).is_err());
        assert!(matches!(
            export_themes(&BTreeMap::new()),
            Err(LibraryError::NothingToExport)
        ));
    }

    #[test]
    fn test_library_parse_and_merge() {
        let imported = parse_library(r#"{ "style": ["b", "a", "b", 1] }"#).unwrap();
        assert_eq!(imported["style"], vec!["a".to_string(), "b".to_string()]);
        assert!(parse_library(r#"{ "style": "a" }"#).is_err());

        let mut library = BTreeMap::new();
        library.insert("style".to_string(), vec!["old".to_string()]);
        library.insert("light".to_string(), vec!["soft".to_string()]);
        merge_library(&mut library, imported);
        assert_eq!(library["style"], vec!["a".to_string(), "b".to_string()]);
        assert_eq!(library["light"], vec!["soft".to_string()]);
    }

    #[test]
    fn test_export_files_carry_names() {
        let mut themes = BTreeMap::new();
        themes.insert("A".to_string(), ThemeRecord::new(BTreeMap::new()));
        let file = themes_file(&themes).unwrap();
        assert_eq!(file.file_name, "prompt_library_themes.json");
        assert_eq!(parse_theme_bundle(&file.contents).unwrap(), themes);
        assert!(themes_file(&BTreeMap::new()).is_err());

        let file = library_file(&BTreeMap::new()).unwrap();
        assert_eq!(file.file_name, "prompt_library_elements.json");
        assert_eq!(file.contents, "{}");

        let at = Utc.timestamp_millis_opt(42).unwrap();
        let file = backup_file(&SettingsDocument::default(), at).unwrap();
        assert_eq!(file.file_name, "prompt_library_backup_42.json");
        assert!(parse_backup(&file.contents).is_ok());
    }

    #[test]
    fn test_backup_name_and_shape() {
        let at = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        assert_eq!(backup_file_name(at), "prompt_library_backup_1700000000123.json");
        assert!(parse_backup("[]").is_err());
        assert!(parse_backup("{").is_err());

        let text = export_backup(&SettingsDocument::default()).unwrap();
        let value = parse_backup(&text).unwrap();
        assert!(value.get("editorConfig").is_some());
    }
}
