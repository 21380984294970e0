use crate::blocks::SETTINGS_KEY;
use crate::errors::{AppError, AppResult};
use crate::models::NotebookSettings;
use crate::store::Persistence;

pub fn load_settings(persistence: &Persistence) -> NotebookSettings {
    persistence
        .read_json::<NotebookSettings>(SETTINGS_KEY)
        .unwrap_or_default()
}

/// Deep-merges `update` into the stored settings and persists the result.
pub fn update_settings(persistence: &Persistence, update: serde_json::Value) -> AppResult<NotebookSettings> {
    let current = load_settings(persistence);
    let mut merged = serde_json::to_value(current)?;
    merge_json(&mut merged, update);
    let settings: NotebookSettings =
        serde_json::from_value(merged).map_err(|error| AppError::Invalid(format!("invalid settings: {error}")))?;

    if !persistence.write_json(SETTINGS_KEY, &settings) {
        return Err(AppError::Storage("failed to persist notebook settings".to_string()));
    }
    Ok(settings)
}

fn merge_json(target: &mut serde_json::Value, update: serde_json::Value) {
    match (target, update) {
        (serde_json::Value::Object(target_map), serde_json::Value::Object(update_map)) => {
            for (key, value) in update_map {
                merge_json(target_map.entry(key).or_insert(serde_json::Value::Null), value);
            }
        }
        (target, update) => {
            *target = update;
        }
    }
}
