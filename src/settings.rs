use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Category assigned to themes that have none.
pub const UNCATEGORIZED: &str = "未分类";

/// Current built-in field schema version. Bump it whenever the built-in field
/// list changes shape; user label/width overrides from other versions are
/// dropped on load.
pub const EDITOR_CONFIG_VERSION: u32 = 2;

/// `dataKey` of the aspect-ratio field.
pub const RATIO_KEY: &str = "ratio";

/// `dataKey` of the title field; also the theme name when saving.
pub const TITLE_KEY: &str = "title";

pub const DEFAULT_RATIO: &str = "16:9";

/// Ratio presets offered before the user's custom ratios.
pub const PRESET_RATIOS: [&str; 5] = ["16:9", "9:16", "4:3", "1:1", "3:4"];

const DEFAULT_OLLAMA_PROMPT: &str = "请将以下中文文本翻译成英文，不需要额外的思考，不输出think标签内容包括在这两个标签 <think></think> ，只输出英文 Text: \"{text}\" English translation:";

// ── Field schema ───────────────────────────────────────────────────────────

/// How applying a library snippet interacts with the field's current value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Behavior {
    Append,
    Replace,
    /// Title and ratio: rendered specially, skipped by composition.
    Special,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Width {
    Full,
    Half,
}

impl Width {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "full" => Some(Width::Full),
            "half" => Some(Width::Half),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Input,
    Textarea,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDef {
    /// Stable identity across schema versions
    pub id: String,
    /// Key into field values, library data and theme values
    pub data_key: String,
    /// User-editable display text
    pub label: String,
    pub behavior: Behavior,
    /// User-editable layout width
    pub width: Width,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub field_type: Option<FieldType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<u32>,
}

impl FieldDef {
    fn textarea(id: &str, data_key: &str, label: &str, rows: u32, behavior: Behavior, width: Width) -> Self {
        Self {
            id: id.to_string(),
            data_key: data_key.to_string(),
            label: label.to_string(),
            behavior,
            width,
            field_type: Some(FieldType::Textarea),
            rows: Some(rows),
        }
    }

    pub fn is_special(&self) -> bool {
        self.behavior == Behavior::Special
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub version: u32,
    pub fields: Vec<FieldDef>,
}

impl FieldSchema {
    pub fn field(&self, id: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.id == id)
    }

    pub fn field_mut(&mut self, id: &str) -> Option<&mut FieldDef> {
        self.fields.iter_mut().find(|f| f.id == id)
    }

    pub fn field_by_key(&self, data_key: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.data_key == data_key)
    }

    /// The special single-line field whose value is the title.
    pub fn title_field(&self) -> Option<&FieldDef> {
        self.fields
            .iter()
            .find(|f| f.is_special() && f.field_type == Some(FieldType::Input))
    }

    pub fn has_ratio(&self) -> bool {
        self.field_by_key(RATIO_KEY).is_some()
    }
}

impl Default for FieldSchema {
    fn default() -> Self {
        use Behavior::{Append, Replace, Special};
        use Width::{Full, Half};

        Self {
            version: EDITOR_CONFIG_VERSION,
            fields: vec![
                FieldDef {
                    id: "field_title".to_string(),
                    data_key: TITLE_KEY.to_string(),
                    label: "标题".to_string(),
                    behavior: Special,
                    width: Full,
                    field_type: Some(FieldType::Input),
                    rows: None,
                },
                FieldDef::textarea("field_image_theme", "promptTopic", "生图主题", 1, Append, Full),
                FieldDef::textarea("field_main_content", "objects", "主体内容", 2, Append, Full),
                FieldDef::textarea("field_style", "style", "风格", 1, Replace, Full),
                FieldDef::textarea("field_material", "material", "材质", 1, Append, Half),
                FieldDef::textarea("field_view", "view", "视图", 1, Replace, Half),
                FieldDef::textarea("field_light", "light", "光线", 1, Append, Half),
                FieldDef::textarea("field_color", "color", "颜色", 1, Replace, Half),
                FieldDef::textarea("field_composition", "composition", "构图", 1, Append, Full),
                FieldDef::textarea("field_background", "background", "背景", 1, Append, Full),
                FieldDef {
                    id: "field_ratio".to_string(),
                    data_key: RATIO_KEY.to_string(),
                    label: "比例".to_string(),
                    behavior: Special,
                    width: Full,
                    field_type: None,
                    rows: None,
                },
            ],
        }
    }
}

// ── Themes ─────────────────────────────────────────────────────────────────

fn default_category() -> String {
    UNCATEGORIZED.to_string()
}

/// A named snapshot of field values plus gallery metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThemeRecord {
    #[serde(default)]
    pub field_values: BTreeMap<String, String>,
    #[serde(default)]
    pub image_url: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub is_favorite: bool,
    /// Keys written by newer versions, kept as-is
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ThemeRecord {
    pub fn new(field_values: BTreeMap<String, String>) -> Self {
        Self {
            field_values,
            image_url: String::new(),
            category: default_category(),
            is_favorite: false,
            extra: Map::new(),
        }
    }

    /// Gallery caption: the non-empty values joined, or a placeholder.
    pub fn summary(&self) -> String {
        let parts: Vec<&str> = self
            .field_values
            .values()
            .map(String::as_str)
            .filter(|v| !v.is_empty())
            .collect();
        if parts.is_empty() {
            "无内容".to_string()
        } else {
            parts.join(", ")
        }
    }
}

// ── System settings ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranslationService {
    Ollama,
    /// Also chosen for any service name this version does not know.
    #[serde(other)]
    MyMemory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OllamaConfig {
    pub url: String,
    pub model: String,
    /// Template; the first `{text}` is replaced with the source text
    pub prompt: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:11434".to_string(),
            model: "qwen3:8b".to_string(),
            prompt: DEFAULT_OLLAMA_PROMPT.to_string(),
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MyMemoryConfig {
    pub source_lang: String,
    pub target_lang: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for MyMemoryConfig {
    fn default() -> Self {
        Self {
            source_lang: "zh-CN".to_string(),
            target_lang: "en-GB".to_string(),
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationSettings {
    pub service: TranslationService,
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub mymemory: MyMemoryConfig,
    /// Settings of services this version does not know
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for TranslationSettings {
    fn default() -> Self {
        Self {
            service: TranslationService::Ollama,
            ollama: OllamaConfig::default(),
            mymemory: MyMemoryConfig::default(),
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemSettings {
    pub translation: TranslationSettings,
    pub custom_ratios: Vec<String>,
    pub theme_categories: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for SystemSettings {
    fn default() -> Self {
        Self {
            translation: TranslationSettings::default(),
            custom_ratios: vec!["21:9".to_string(), "32:9".to_string(), "4:5".to_string()],
            theme_categories: vec![
                "默认".to_string(),
                "3D".to_string(),
                "插图".to_string(),
                "摄影".to_string(),
            ],
            extra: Map::new(),
        }
    }
}

// ── Root document ──────────────────────────────────────────────────────────

/// The whole persisted plugin state. `Default` is the compiled-in defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SettingsDocument {
    pub editor_config: FieldSchema,
    /// dataKey -> snippets, deduplicated and sorted on load
    pub library_data: BTreeMap<String, Vec<String>>,
    /// theme name (case-sensitive) -> theme
    pub themes: BTreeMap<String, ThemeRecord>,
    pub system_settings: SystemSettings,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SettingsDocument {
    pub fn to_json(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_schema_shape() {
        let schema = FieldSchema::default();
        assert_eq!(schema.version, EDITOR_CONFIG_VERSION);
        assert_eq!(schema.fields.len(), 11);
        assert_eq!(schema.title_field().unwrap().data_key, "title");
        assert!(schema.has_ratio());
        assert_eq!(schema.field("field_style").unwrap().behavior, Behavior::Replace);
        assert_eq!(schema.field("field_main_content").unwrap().rows, Some(2));
    }

    #[test]
    fn test_document_serializes_camel_case() {
        let value = SettingsDocument::default().to_json().unwrap();
        assert_eq!(value["editorConfig"]["version"], json!(2));
        assert_eq!(value["editorConfig"]["fields"][0]["dataKey"], json!("title"));
        assert_eq!(value["editorConfig"]["fields"][0]["type"], json!("input"));
        assert!(value["editorConfig"]["fields"][10].get("type").is_none());
        assert_eq!(value["systemSettings"]["translation"]["service"], json!("ollama"));
        assert_eq!(value["systemSettings"]["translation"]["mymemory"]["sourceLang"], json!("zh-CN"));
        assert_eq!(value["systemSettings"]["customRatios"], json!(["21:9", "32:9", "4:5"]));
        assert_eq!(value["libraryData"], json!({}));
    }

    #[test]
    fn test_unknown_service_maps_to_mymemory() {
        let settings: TranslationSettings =
            serde_json::from_value(json!({ "service": "deepl" })).unwrap();
        assert_eq!(settings.service, TranslationService::MyMemory);
        assert_eq!(settings.ollama, OllamaConfig::default());
    }

    #[test]
    fn test_theme_keeps_unknown_keys() {
        let theme: ThemeRecord = serde_json::from_value(json!({
            "fieldValues": { "title": "X" },
            "rating": 5
        }))
        .unwrap();
        assert_eq!(theme.category, UNCATEGORIZED);
        assert_eq!(theme.extra.get("rating"), Some(&json!(5)));
        let back = serde_json::to_value(&theme).unwrap();
        assert_eq!(back["rating"], json!(5));
    }

    #[test]
    fn test_theme_summary() {
        let mut values = BTreeMap::new();
        assert_eq!(ThemeRecord::new(values.clone()).summary(), "无内容");
        values.insert("a".to_string(), "glass".to_string());
        values.insert("b".to_string(), String::new());
        values.insert("c".to_string(), "neon".to_string());
        assert_eq!(ThemeRecord::new(values).summary(), "glass, neon");
    }
}
