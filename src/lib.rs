pub mod editor;
pub mod error;
pub mod preferences;
pub mod reconcile;
pub mod settings;
pub mod storage;
pub mod themes;
pub mod transfer;
pub mod translate;

use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::RwLock;
use tokio::sync::broadcast;
use chrono::Utc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

pub use editor::EditorState;
pub use error::{LibraryError, Result, TranslationError};
pub use settings::{
    Behavior, FieldDef, FieldSchema, FieldType, MyMemoryConfig, OllamaConfig, SettingsDocument,
    SystemSettings, ThemeRecord, TranslationService, TranslationSettings, Width,
};
pub use storage::{JsonFileStore, MemoryStore, SaveMode, SettingsStore};
pub use themes::{Direction, ImportSummary, SaveOutcome, ThemeFilter};
pub use transfer::ExportFile;
pub use translate::Translator;

const EVENT_CAPACITY: usize = 16;

/// Install a fmt subscriber filtered by `RUST_LOG`, defaulting to this
/// crate at `info`. Safe to call more than once.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("prompt_library=info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Sent to subscribers after a `SaveMode::Notify` save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LibraryEvent {
    SettingsUpdated,
}

// ── Library state ──────────────────────────────────────────────────────────

/// The live settings document, the editor working copy and the store they
/// are persisted to.
///
/// Mutations run against a clone of the document; the clone is written to
/// the store and only then swapped in, so a failed operation or failed write
/// leaves the live document as it was.
pub struct PromptLibrary {
    document: RwLock<SettingsDocument>,
    editor: RwLock<EditorState>,
    store: Box<dyn SettingsStore>,
    events: broadcast::Sender<LibraryEvent>,
    translator: Translator,
}

impl PromptLibrary {
    pub fn open(store: impl SettingsStore + 'static) -> Result<Self> {
        Self::open_with_translator(store, Translator::new()?)
    }

    pub fn open_with_translator(store: impl SettingsStore + 'static, translator: Translator) -> Result<Self> {
        let persisted = store.read_persisted()?;
        let reconciled = reconcile::load(persisted.as_ref(), &SettingsDocument::default())?;
        if reconciled.needs_write_back {
            info!("Writing back migrated settings");
            store.write_persisted(&reconciled.document.to_json()?)?;
        }

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            document: RwLock::new(reconciled.document),
            editor: RwLock::new(EditorState::default()),
            store: Box::new(store),
            events,
            translator,
        })
    }

    pub fn document(&self) -> SettingsDocument {
        self.document.read().expect("settings read lock").clone()
    }

    pub fn editor(&self) -> EditorState {
        self.editor.read().expect("editor read lock").clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LibraryEvent> {
        self.events.subscribe()
    }

    /// Persist the live document as-is.
    pub fn save(&self, mode: SaveMode) -> Result<()> {
        let doc = self.document.read().expect("settings read lock");
        self.persist(&doc, mode)
    }

    fn persist(&self, doc: &SettingsDocument, mode: SaveMode) -> Result<()> {
        self.store.write_persisted(&doc.to_json()?)?;
        debug!(?mode, "Settings saved");
        if mode == SaveMode::Notify {
            // No receivers is fine
            let _ = self.events.send(LibraryEvent::SettingsUpdated);
        }
        Ok(())
    }

    fn mutate<T>(&self, mode: SaveMode, op: impl FnOnce(&mut SettingsDocument) -> Result<T>) -> Result<T> {
        let mut live = self.document.write().expect("settings write lock");
        let mut next = live.clone();
        let out = op(&mut next)?;
        self.persist(&next, mode)?;
        *live = next;
        Ok(out)
    }

    // ── Editor ─────────────────────────────────────────────────────────────

    pub fn set_field_value(&self, data_key: &str, value: &str) {
        let mut editor = self.editor.write().expect("editor write lock");
        if data_key == settings::RATIO_KEY {
            editor.current_ratio = value.to_string();
        } else {
            editor.set_value(data_key, value);
        }
    }

    pub fn set_ratio(&self, ratio: &str) {
        self.editor.write().expect("editor write lock").current_ratio = ratio.to_string();
    }

    pub fn clear_editor(&self) {
        self.editor.write().expect("editor write lock").clear();
    }

    pub fn compose(&self) -> String {
        let doc = self.document.read().expect("settings read lock");
        self.editor.read().expect("editor read lock").compose(&doc.editor_config)
    }

    pub fn preview_title(&self) -> String {
        let doc = self.document.read().expect("settings read lock");
        self.editor.read().expect("editor read lock").title(&doc.editor_config)
    }

    pub fn field_values(&self) -> BTreeMap<String, String> {
        let doc = self.document.read().expect("settings read lock");
        self.editor.read().expect("editor read lock").field_values(&doc.editor_config)
    }

    pub fn available_ratios(&self) -> Vec<String> {
        let doc = self.document.read().expect("settings read lock");
        editor::available_ratios(&doc.system_settings.custom_ratios)
    }

    /// Apply a library snippet to the field with `field_id`.
    pub fn apply_library_item(&self, field_id: &str, item: &str) -> Result<()> {
        let doc = self.document.read().expect("settings read lock");
        self.editor
            .write()
            .expect("editor write lock")
            .apply_library_item(&doc.editor_config, field_id, item)
    }

    // ── Library snippets ───────────────────────────────────────────────────

    /// Returns false when the snippet was empty or already present.
    pub fn add_library_item(&self, data_key: &str, value: &str) -> Result<bool> {
        self.mutate(SaveMode::Silent, |doc| {
            Ok(editor::add_library_item(&mut doc.library_data, data_key, value))
        })
    }

    pub fn remove_library_item(&self, data_key: &str, value: &str) -> Result<bool> {
        self.mutate(SaveMode::Silent, |doc| {
            Ok(editor::remove_library_item(&mut doc.library_data, data_key, value))
        })
    }

    // ── Themes ─────────────────────────────────────────────────────────────

    /// Save the editor contents as a theme named after the title field.
    pub fn save_theme(&self, overwrite: bool) -> Result<SaveOutcome> {
        let values = self.field_values();
        let name = values.get(settings::TITLE_KEY).cloned().unwrap_or_default();
        let outcome = self.mutate(SaveMode::Notify, |doc| themes::save_theme(doc, &name, values, overwrite))?;
        info!(theme = name.trim(), ?outcome, "Theme saved");
        Ok(outcome)
    }

    /// Load a theme's values into the editor.
    pub fn load_theme(&self, name: &str) -> Result<()> {
        let doc = self.document.read().expect("settings read lock");
        let theme = doc
            .themes
            .get(name)
            .ok_or_else(|| LibraryError::NotFound(format!("Theme '{}'", name)))?;
        self.editor
            .write()
            .expect("editor write lock")
            .import_values(&doc.editor_config, &theme.field_values);
        Ok(())
    }

    pub fn delete_theme(&self, name: &str) -> Result<()> {
        self.mutate(SaveMode::Notify, |doc| themes::delete_theme(doc, name))?;
        info!(theme = name, "Theme deleted");
        Ok(())
    }

    pub fn toggle_favorite(&self, name: &str) -> Result<bool> {
        self.mutate(SaveMode::Notify, |doc| themes::toggle_favorite(doc, name))
    }

    pub fn update_theme_details(&self, name: &str, image_url: &str, category: &str) -> Result<()> {
        self.mutate(SaveMode::Notify, |doc| {
            themes::update_theme_details(doc, name, image_url, category)
        })
    }

    pub fn filter_themes(&self, filter: &ThemeFilter) -> Vec<String> {
        let doc = self.document.read().expect("settings read lock");
        themes::filter_themes(&doc, filter)
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    pub fn category_options(&self, current: &str) -> Vec<String> {
        themes::category_options(&self.document.read().expect("settings read lock"), current)
    }

    // ── Categories ─────────────────────────────────────────────────────────

    pub fn add_category(&self, name: &str) -> Result<()> {
        self.mutate(SaveMode::Notify, |doc| themes::add_category(doc, name))
    }

    pub fn rename_category(&self, index: usize, new_name: &str) -> Result<bool> {
        self.mutate(SaveMode::Notify, |doc| themes::rename_category(doc, index, new_name))
    }

    pub fn move_category(&self, index: usize, direction: Direction) -> Result<bool> {
        self.mutate(SaveMode::Notify, |doc| themes::move_category(doc, index, direction))
    }

    pub fn remove_category(&self, index: usize) -> Result<String> {
        self.mutate(SaveMode::Notify, |doc| themes::remove_category(doc, index))
    }

    // ── Preferences ────────────────────────────────────────────────────────

    pub fn add_custom_ratio(&self, ratio: &str) -> Result<()> {
        self.mutate(SaveMode::Notify, |doc| preferences::add_custom_ratio(doc, ratio))
    }

    pub fn remove_custom_ratio(&self, index: usize) -> Result<String> {
        self.mutate(SaveMode::Notify, |doc| preferences::remove_custom_ratio(doc, index))
    }

    pub fn set_field_label(&self, field_id: &str, label: &str) -> Result<()> {
        self.mutate(SaveMode::Notify, |doc| preferences::set_field_label(doc, field_id, label))
    }

    pub fn set_field_width(&self, field_id: &str, width: Width) -> Result<()> {
        self.mutate(SaveMode::Notify, |doc| preferences::set_field_width(doc, field_id, width))
    }

    pub fn set_translation_service(&self, service: TranslationService) -> Result<()> {
        self.mutate(SaveMode::Notify, |doc| {
            preferences::set_translation_service(doc, service);
            Ok(())
        })
    }

    // Typed into settings text boxes, so no view refresh.
    pub fn update_ollama(&self, config: OllamaConfig) -> Result<()> {
        self.mutate(SaveMode::Silent, |doc| {
            preferences::update_ollama(doc, config);
            Ok(())
        })
    }

    pub fn update_mymemory(&self, config: MyMemoryConfig) -> Result<()> {
        self.mutate(SaveMode::Silent, |doc| {
            preferences::update_mymemory(doc, config);
            Ok(())
        })
    }

    // ── Clipboard ──────────────────────────────────────────────────────────

    pub fn copy_structured_content(&self) -> Result<String> {
        transfer::export_structured_content(&self.field_values())
    }

    pub fn paste_structured_content(&self, text: &str) -> Result<()> {
        let values = transfer::parse_structured_content(text)?;
        let doc = self.document.read().expect("settings read lock");
        self.editor
            .write()
            .expect("editor write lock")
            .import_values(&doc.editor_config, &values);
        Ok(())
    }

    pub fn copy_shared_theme(&self, name: &str) -> Result<String> {
        let doc = self.document.read().expect("settings read lock");
        let theme = doc
            .themes
            .get(name)
            .ok_or_else(|| LibraryError::NotFound(format!("Theme '{}'", name)))?;
        transfer::export_shared_theme(theme)
    }

    /// Add a theme copied from another vault. Returns its name.
    pub fn paste_shared_theme(&self, text: &str, overwrite: bool) -> Result<(String, SaveOutcome)> {
        let (name, theme) = transfer::parse_shared_theme(text)?;
        let outcome = self.mutate(SaveMode::Notify, |doc| {
            themes::insert_shared_theme(doc, &name, theme, overwrite)
        })?;
        Ok((name, outcome))
    }

    // ── Import / export ────────────────────────────────────────────────────

    pub fn export_themes(&self) -> Result<ExportFile> {
        transfer::themes_file(&self.document.read().expect("settings read lock").themes)
    }

    pub fn import_themes(&self, text: &str, overwrite: bool) -> Result<ImportSummary> {
        let bundle = transfer::parse_theme_bundle(text)?;
        let summary = self.mutate(SaveMode::Notify, |doc| themes::import_themes(doc, bundle, overwrite))?;
        info!(added = summary.added, replaced = summary.replaced, "Themes imported");
        Ok(summary)
    }

    pub fn export_library(&self) -> Result<ExportFile> {
        transfer::library_file(&self.document.read().expect("settings read lock").library_data)
    }

    pub fn import_library(&self, text: &str) -> Result<usize> {
        let imported = transfer::parse_library(text)?;
        let keys = imported.len();
        self.mutate(SaveMode::Notify, |doc| {
            transfer::merge_library(&mut doc.library_data, imported);
            Ok(())
        })?;
        info!(keys, "Library imported");
        Ok(keys)
    }

    pub fn export_backup(&self) -> Result<ExportFile> {
        transfer::backup_file(&self.document.read().expect("settings read lock"), Utc::now())
    }

    /// Replace everything with a backup. The backup is written verbatim and
    /// then reconciled like any other persisted file.
    ///
    /// Once the verbatim write succeeds the restore has taken effect. A
    /// failed write-back of the normalized form is only logged: the store
    /// reconciles to the same document on the next `open`.
    pub fn restore_backup(&self, text: &str) -> Result<()> {
        let backup: Value = transfer::parse_backup(text)?;
        let reconciled = reconcile::load(Some(&backup), &SettingsDocument::default())?;
        let normalized = reconciled.document.to_json()?;

        let mut live = self.document.write().expect("settings write lock");
        self.store.write_persisted(&backup)?;
        *live = reconciled.document;
        if reconciled.needs_write_back {
            if let Err(e) = self.store.write_persisted(&normalized) {
                warn!(error = %e, "Failed to write back restored settings");
            }
        }
        drop(live);

        let _ = self.events.send(LibraryEvent::SettingsUpdated);
        info!("Backup restored");
        Ok(())
    }

    // ── Translation ────────────────────────────────────────────────────────

    /// Translate the composed prompt with the configured service.
    pub async fn translate(&self, text: &str) -> Result<String> {
        let settings = self
            .document
            .read()
            .expect("settings read lock")
            .system_settings
            .translation
            .clone();
        Ok(self.translator.translate(text, &settings).await?)
    }

    pub async fn translate_prompt(&self) -> Result<String> {
        let text = self.compose();
        self.translate(&text).await
    }
}
