use std::collections::BTreeMap;

use crate::error::{LibraryError, Result};
use crate::settings::{SettingsDocument, ThemeRecord, UNCATEGORIZED};

// Conflict policy: anything that would overwrite an existing theme or
// category fails with `DuplicateNameConflict` unless `overwrite` is set.
// Hosts confirm with the user and call again.

// ── Gallery filter ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThemeFilter {
    All,
    Favorites,
    Category(String),
}

/// Theme names matching `filter`, sorted.
pub fn filter_themes<'a>(doc: &'a SettingsDocument, filter: &ThemeFilter) -> Vec<&'a str> {
    // BTreeMap iterates in key order already.
    doc.themes
        .iter()
        .filter(|(_, theme)| match filter {
            ThemeFilter::All => true,
            ThemeFilter::Favorites => theme.is_favorite,
            ThemeFilter::Category(category) => {
                let own = if theme.category.is_empty() {
                    UNCATEGORIZED
                } else {
                    theme.category.as_str()
                };
                own == category
            }
        })
        .map(|(name, _)| name.as_str())
        .collect()
}

/// Choices for a theme's category picker: its current category, the
/// uncategorized sentinel, then the configured categories.
pub fn category_options(doc: &SettingsDocument, current: &str) -> Vec<String> {
    let mut options: Vec<String> = Vec::new();
    let candidates = [current, UNCATEGORIZED]
        .into_iter()
        .chain(doc.system_settings.theme_categories.iter().map(String::as_str));
    for candidate in candidates {
        if !options.iter().any(|o| o == candidate) {
            options.push(candidate.to_string());
        }
    }
    options
}

// ── Theme operations ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Created,
    Replaced,
}

/// Save the editor values under `name`. An existing theme keeps its image,
/// category and favorite flag.
pub fn save_theme(
    doc: &mut SettingsDocument,
    name: &str,
    field_values: BTreeMap<String, String>,
    overwrite: bool,
) -> Result<SaveOutcome> {
    let name = name.trim();
    if name.is_empty() {
        return Err(LibraryError::MissingRequiredField("title"));
    }

    match doc.themes.get_mut(name) {
        Some(_) if !overwrite => Err(LibraryError::conflict("Theme", name)),
        Some(existing) => {
            existing.field_values = field_values;
            Ok(SaveOutcome::Replaced)
        }
        None => {
            doc.themes.insert(name.to_string(), ThemeRecord::new(field_values));
            Ok(SaveOutcome::Created)
        }
    }
}

/// Insert a theme that came from the clipboard. On overwrite, the incoming
/// attributes replace the existing ones; unknown keys of the existing record
/// are kept.
pub fn insert_shared_theme(
    doc: &mut SettingsDocument,
    name: &str,
    theme: ThemeRecord,
    overwrite: bool,
) -> Result<SaveOutcome> {
    let name = name.trim();
    if name.is_empty() {
        return Err(LibraryError::MissingRequiredField("title"));
    }

    match doc.themes.get_mut(name) {
        Some(_) if !overwrite => Err(LibraryError::conflict("Theme", name)),
        Some(existing) => {
            let ThemeRecord {
                field_values,
                image_url,
                category,
                is_favorite,
                extra,
            } = theme;
            existing.field_values = field_values;
            existing.image_url = image_url;
            existing.category = category;
            existing.is_favorite = is_favorite;
            existing.extra.extend(extra);
            Ok(SaveOutcome::Replaced)
        }
        None => {
            doc.themes.insert(name.to_string(), theme);
            Ok(SaveOutcome::Created)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImportSummary {
    pub added: usize,
    pub replaced: usize,
}

/// Merge a theme bundle. All or nothing: without `overwrite`, any name
/// collision aborts the import and reports every colliding name.
pub fn import_themes(
    doc: &mut SettingsDocument,
    bundle: BTreeMap<String, ThemeRecord>,
    overwrite: bool,
) -> Result<ImportSummary> {
    let collisions: Vec<String> = bundle
        .keys()
        .filter(|name| doc.themes.contains_key(*name))
        .cloned()
        .collect();

    if !collisions.is_empty() && !overwrite {
        return Err(LibraryError::DuplicateNameConflict {
            kind: "Theme",
            names: collisions,
        });
    }

    let summary = ImportSummary {
        added: bundle.len() - collisions.len(),
        replaced: collisions.len(),
    };
    doc.themes.extend(bundle);
    Ok(summary)
}

pub fn delete_theme(doc: &mut SettingsDocument, name: &str) -> Result<ThemeRecord> {
    doc.themes
        .remove(name)
        .ok_or_else(|| LibraryError::NotFound(format!("Theme '{}'", name)))
}

/// Flip the favorite flag; returns the new value.
pub fn toggle_favorite(doc: &mut SettingsDocument, name: &str) -> Result<bool> {
    let theme = theme_mut(doc, name)?;
    theme.is_favorite = !theme.is_favorite;
    Ok(theme.is_favorite)
}

pub fn update_theme_details(doc: &mut SettingsDocument, name: &str, image_url: &str, category: &str) -> Result<()> {
    let theme = theme_mut(doc, name)?;
    theme.image_url = image_url.trim().to_string();
    theme.category = category.to_string();
    Ok(())
}

fn theme_mut<'a>(doc: &'a mut SettingsDocument, name: &str) -> Result<&'a mut ThemeRecord> {
    doc.themes
        .get_mut(name)
        .ok_or_else(|| LibraryError::NotFound(format!("Theme '{}'", name)))
}

// ── Categories ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

pub fn add_category(doc: &mut SettingsDocument, name: &str) -> Result<()> {
    let name = name.trim();
    if name.is_empty() {
        return Err(LibraryError::InvalidInput("Category name cannot be empty".to_string()));
    }
    let categories = &mut doc.system_settings.theme_categories;
    if categories.iter().any(|c| c == name) {
        return Err(LibraryError::conflict("Category", name));
    }
    categories.push(name.to_string());
    Ok(())
}

/// Rename the category at `index`. Themes in the old category move with it.
/// Returns false when the name did not change.
pub fn rename_category(doc: &mut SettingsDocument, index: usize, new_name: &str) -> Result<bool> {
    let new_name = new_name.trim();
    let old_name = category_at(doc, index)?.to_string();
    if new_name == old_name {
        return Ok(false);
    }
    if new_name.is_empty() {
        return Err(LibraryError::InvalidInput("Category name cannot be empty".to_string()));
    }

    let lowered = new_name.to_lowercase();
    let taken = doc
        .system_settings
        .theme_categories
        .iter()
        .enumerate()
        .any(|(i, c)| i != index && c.to_lowercase() == lowered);
    if taken {
        return Err(LibraryError::conflict("Category", new_name));
    }

    doc.system_settings.theme_categories[index] = new_name.to_string();
    for theme in doc.themes.values_mut() {
        if theme.category == old_name {
            theme.category = new_name.to_string();
        }
    }
    Ok(true)
}

/// Swap the category with its neighbour. Returns false at either end.
pub fn move_category(doc: &mut SettingsDocument, index: usize, direction: Direction) -> Result<bool> {
    category_at(doc, index)?;
    let categories = &mut doc.system_settings.theme_categories;
    let target = match direction {
        Direction::Up if index > 0 => index - 1,
        Direction::Down if index + 1 < categories.len() => index + 1,
        _ => return Ok(false),
    };
    categories.swap(index, target);
    Ok(true)
}

/// Remove the category at `index`; its themes become uncategorized.
pub fn remove_category(doc: &mut SettingsDocument, index: usize) -> Result<String> {
    category_at(doc, index)?;
    let removed = doc.system_settings.theme_categories.remove(index);
    for theme in doc.themes.values_mut() {
        if theme.category == removed {
            theme.category = UNCATEGORIZED.to_string();
        }
    }
    Ok(removed)
}

fn category_at(doc: &SettingsDocument, index: usize) -> Result<&str> {
    doc.system_settings
        .theme_categories
        .get(index)
        .map(String::as_str)
        .ok_or_else(|| LibraryError::NotFound(format!("Category #{}", index)))
}
