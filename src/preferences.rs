use crate::error::{LibraryError, Result};
use crate::settings::{
    FieldDef, MyMemoryConfig, OllamaConfig, SettingsDocument, TranslationService, Width,
};

// ── Custom ratios ──────────────────────────────────────────────────────────

pub fn add_custom_ratio(doc: &mut SettingsDocument, ratio: &str) -> Result<()> {
    let ratio = ratio.trim();
    if ratio.is_empty() || !ratio.contains(':') {
        return Err(LibraryError::InvalidInput(format!(
            "'{}' is not a ratio like 21:9",
            ratio
        )));
    }
    let ratios = &mut doc.system_settings.custom_ratios;
    if ratios.iter().any(|r| r == ratio) {
        return Err(LibraryError::conflict("Ratio", ratio));
    }
    ratios.push(ratio.to_string());
    Ok(())
}

pub fn remove_custom_ratio(doc: &mut SettingsDocument, index: usize) -> Result<String> {
    let ratios = &mut doc.system_settings.custom_ratios;
    if index >= ratios.len() {
        return Err(LibraryError::NotFound(format!("Ratio #{}", index)));
    }
    Ok(ratios.remove(index))
}

// ── Field customization ────────────────────────────────────────────────────

/// Set a field's display label; an empty label falls back to its data key.
pub fn set_field_label(doc: &mut SettingsDocument, field_id: &str, label: &str) -> Result<()> {
    let field = customizable_field(doc, field_id)?;
    let label = label.trim();
    field.label = if label.is_empty() {
        field.data_key.clone()
    } else {
        label.to_string()
    };
    Ok(())
}

pub fn set_field_width(doc: &mut SettingsDocument, field_id: &str, width: Width) -> Result<()> {
    customizable_field(doc, field_id)?.width = width;
    Ok(())
}

/// Special fields (title, ratio) are not user-customizable.
fn customizable_field<'a>(doc: &'a mut SettingsDocument, field_id: &str) -> Result<&'a mut FieldDef> {
    match doc.editor_config.field_mut(field_id) {
        Some(field) if !field.is_special() => Ok(field),
        _ => Err(LibraryError::NotFound(format!("Field '{}'", field_id))),
    }
}

// ── Translation ────────────────────────────────────────────────────────────

pub fn set_translation_service(doc: &mut SettingsDocument, service: TranslationService) {
    doc.system_settings.translation.service = service;
}

pub fn update_ollama(doc: &mut SettingsDocument, config: OllamaConfig) {
    doc.system_settings.translation.ollama = config;
}

pub fn update_mymemory(doc: &mut SettingsDocument, config: MyMemoryConfig) {
    doc.system_settings.translation.mymemory = config;
}
