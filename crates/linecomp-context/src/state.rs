//! Persisted context instances and settings.
//!
//! Every mutation is a pure `ExtensionState -> ExtensionState` step applied by
//! [`StateStore::update`], which reloads, applies and atomically rewrites the
//! state file under an exclusive lock.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use linecomp_core::{ContextInstance, ContextItem};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_INSTANCE_NAME: &str = "Default";
const INSTANCE_ID_PREFIX: &str = "ctx-";

#[derive(Debug, Error)]
pub enum StateError {
    #[error("state io failed for {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("state file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("no context instance with id {0}")]
    UnknownInstance(String),
    #[error("item index {index} is out of range for {len} items")]
    ItemOutOfRange { index: usize, len: usize },
    #[error("item {0} is not a text item")]
    NotText(usize),
    #[error("name must not be empty")]
    EmptyName,
    #[error("model config {0} already exists")]
    DuplicateModel(String),
    #[error("no model config named {0}")]
    UnknownModel(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    pub name: String,
    pub url: String,
    #[serde(rename = "pasteDelay", default)]
    pub paste_delay_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jina_api_key: Option<String>,
    #[serde(default)]
    pub model_configs: Vec<ModelConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionState {
    pub active_instance_id: String,
    #[serde(default)]
    pub instances: Vec<ContextInstance>,
    #[serde(flatten)]
    pub settings: Settings,
}

impl Default for ExtensionState {
    fn default() -> Self {
        let instance = ContextInstance::new(instance_id(1), DEFAULT_INSTANCE_NAME);
        Self {
            active_instance_id: instance.id.clone(),
            instances: vec![instance],
            settings: Settings::default(),
        }
    }
}

fn instance_id(number: u64) -> String {
    format!("{INSTANCE_ID_PREFIX}{number}")
}

fn checked_name(name: &str) -> Result<String, StateError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(StateError::EmptyName);
    }
    Ok(name.to_owned())
}

impl ExtensionState {
    /// Repairs states written by hand or by older builds: at least one
    /// instance, a valid active id, and main indexes that point at items.
    pub fn normalized(mut self) -> Self {
        if self.instances.is_empty() {
            let fallback = ContextInstance::new(self.next_instance_id(), DEFAULT_INSTANCE_NAME);
            self.instances.push(fallback);
        }
        if !self
            .instances
            .iter()
            .any(|instance| instance.id == self.active_instance_id)
        {
            self.active_instance_id = self.instances[0].id.clone();
        }
        for instance in &mut self.instances {
            if instance
                .main_item
                .is_some_and(|index| index >= instance.items.len())
            {
                instance.main_item = None;
            }
        }
        self
    }

    pub fn active_instance(&self) -> Option<&ContextInstance> {
        self.instance(&self.active_instance_id)
    }

    pub fn instance(&self, id: &str) -> Option<&ContextInstance> {
        self.instances.iter().find(|instance| instance.id == id)
    }

    fn instance_mut(&mut self, id: &str) -> Result<&mut ContextInstance, StateError> {
        self.instances
            .iter_mut()
            .find(|instance| instance.id == id)
            .ok_or_else(|| StateError::UnknownInstance(id.to_owned()))
    }

    fn active_mut(&mut self) -> Result<&mut ContextInstance, StateError> {
        let id = self.active_instance_id.clone();
        self.instance_mut(&id)
    }

    fn next_instance_id(&self) -> String {
        let highest = self
            .instances
            .iter()
            .filter_map(|instance| instance.id.strip_prefix(INSTANCE_ID_PREFIX)?.parse::<u64>().ok())
            .max()
            .unwrap_or(0);
        instance_id(highest + 1)
    }

    /// Adds an empty instance and makes it active.
    pub fn create_instance(mut self, name: &str) -> Result<Self, StateError> {
        let instance = ContextInstance::new(self.next_instance_id(), checked_name(name)?);
        self.active_instance_id = instance.id.clone();
        self.instances.push(instance);
        Ok(self)
    }

    pub fn rename_instance(mut self, id: &str, name: &str) -> Result<Self, StateError> {
        let name = checked_name(name)?;
        self.instance_mut(id)?.name = name;
        Ok(self)
    }

    /// Removing the last instance leaves a fresh default one behind.
    pub fn remove_instance(mut self, id: &str) -> Result<Self, StateError> {
        let position = self
            .instances
            .iter()
            .position(|instance| instance.id == id)
            .ok_or_else(|| StateError::UnknownInstance(id.to_owned()))?;
        let fallback_id = self.next_instance_id();
        self.instances.remove(position);

        if self.instances.is_empty() {
            self.instances
                .push(ContextInstance::new(fallback_id, DEFAULT_INSTANCE_NAME));
        }
        if self.active_instance_id == id {
            let next = position.min(self.instances.len() - 1);
            self.active_instance_id = self.instances[next].id.clone();
        }
        Ok(self)
    }

    pub fn activate(mut self, id: &str) -> Result<Self, StateError> {
        self.instance_mut(id)?;
        self.active_instance_id = id.to_owned();
        Ok(self)
    }

    pub fn add_item(mut self, item: ContextItem) -> Result<Self, StateError> {
        self.active_mut()?.items.push(item);
        Ok(self)
    }

    pub fn remove_item(mut self, index: usize) -> Result<Self, StateError> {
        let instance = self.active_mut()?;
        check_index(instance, index)?;
        instance.items.remove(index);
        instance.main_item = match instance.main_item {
            Some(main) if main == index => None,
            Some(main) if main > index => Some(main - 1),
            other => other,
        };
        Ok(self)
    }

    pub fn edit_text(mut self, index: usize, text: &str) -> Result<Self, StateError> {
        let instance = self.active_mut()?;
        check_index(instance, index)?;
        match &mut instance.items[index] {
            ContextItem::Text { body, .. } => *body = text.to_owned(),
            _ => return Err(StateError::NotText(index)),
        }
        Ok(self)
    }

    /// Moves one item; the main marker follows the item it points at.
    pub fn move_item(mut self, from: usize, to: usize) -> Result<Self, StateError> {
        let instance = self.active_mut()?;
        check_index(instance, from)?;
        check_index(instance, to)?;
        let item = instance.items.remove(from);
        instance.items.insert(to, item);
        instance.main_item = instance.main_item.map(|main| {
            if main == from {
                to
            } else if from < main && main <= to {
                main - 1
            } else if to <= main && main < from {
                main + 1
            } else {
                main
            }
        });
        Ok(self)
    }

    pub fn toggle_ignore(mut self, index: usize) -> Result<Self, StateError> {
        let instance = self.active_mut()?;
        check_index(instance, index)?;
        match &mut instance.items[index] {
            ContextItem::Text { ignored, .. } => *ignored = !*ignored,
            _ => return Err(StateError::NotText(index)),
        }
        Ok(self)
    }

    pub fn set_main(mut self, index: usize) -> Result<Self, StateError> {
        let instance = self.active_mut()?;
        check_index(instance, index)?;
        if !matches!(instance.items[index], ContextItem::Text { .. }) {
            return Err(StateError::NotText(index));
        }
        instance.main_item = Some(index);
        Ok(self)
    }

    pub fn clear_main(mut self) -> Result<Self, StateError> {
        self.active_mut()?.main_item = None;
        Ok(self)
    }

    pub fn set_web_search(mut self, enabled: bool) -> Result<Self, StateError> {
        self.active_mut()?.web_search_enabled = enabled;
        Ok(self)
    }

    /// A blank key clears the stored one.
    pub fn set_jina_api_key(mut self, key: &str) -> Self {
        let key = key.trim();
        self.settings.jina_api_key = (!key.is_empty()).then(|| key.to_owned());
        self
    }

    pub fn add_model_config(mut self, config: ModelConfig) -> Result<Self, StateError> {
        let name = checked_name(&config.name)?;
        if self
            .settings
            .model_configs
            .iter()
            .any(|existing| existing.name == name)
        {
            return Err(StateError::DuplicateModel(name));
        }
        self.settings.model_configs.push(ModelConfig { name, ..config });
        Ok(self)
    }

    pub fn remove_model_config(mut self, name: &str) -> Result<Self, StateError> {
        let before = self.settings.model_configs.len();
        self.settings
            .model_configs
            .retain(|config| config.name != name);
        if self.settings.model_configs.len() == before {
            return Err(StateError::UnknownModel(name.to_owned()));
        }
        Ok(self)
    }
}

fn check_index(instance: &ContextInstance, index: usize) -> Result<(), StateError> {
    if index >= instance.items.len() {
        return Err(StateError::ItemOutOfRange {
            index,
            len: instance.items.len(),
        });
    }
    Ok(())
}

/// JSON file holding one [`ExtensionState`].
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn for_workspace(workspace_root: impl AsRef<Path>) -> Self {
        Self::new(linecomp_config::state_path(workspace_root))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        self.path.with_extension("lock")
    }

    fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StateError + '_ {
        move |source| StateError::Io {
            path: path.display().to_string(),
            source,
        }
    }

    /// Current state; a missing file reads as the default state.
    pub fn load(&self) -> Result<ExtensionState, StateError> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => Ok(serde_json::from_str::<ExtensionState>(&raw)?.normalized()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(ExtensionState::default()),
            Err(err) => Err(Self::io_error(&self.path)(err)),
        }
    }

    /// Reloads, applies `change` and persists the result before returning it.
    pub fn update<F>(&self, change: F) -> Result<ExtensionState, StateError>
    where
        F: FnOnce(ExtensionState) -> Result<ExtensionState, StateError>,
    {
        let parent = self
            .path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent).map_err(Self::io_error(parent))?;

        let lock_path = self.lock_path();
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(Self::io_error(&lock_path))?;
        lock.lock_exclusive().map_err(Self::io_error(&lock_path))?;

        let result = self
            .load()
            .and_then(change)
            .map(ExtensionState::normalized)
            .and_then(|next| {
                self.write_atomic(parent, &next)?;
                Ok(next)
            });

        if let Err(err) = FileExt::unlock(&lock) {
            tracing::debug!(path = %lock_path.display(), error = %err, "state unlock failed");
        }
        result
    }

    fn write_atomic(&self, dir: &Path, state: &ExtensionState) -> Result<(), StateError> {
        let bytes = serde_json::to_vec_pretty(state)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(Self::io_error(dir))?;
        tmp.write_all(&bytes).map_err(Self::io_error(tmp.path()))?;
        tmp.as_file().sync_all().map_err(Self::io_error(&self.path))?;
        tmp.persist(&self.path)
            .map_err(|err| Self::io_error(&self.path)(err.error))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_lock(path: &Path) -> std::io::Result<std::fs::File> {
        OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
    }

    fn state_with_items() -> ExtensionState {
        ExtensionState::default()
            .add_item(ContextItem::text("a"))
            .and_then(|state| state.add_item(ContextItem::file("b.py")))
            .and_then(|state| state.add_item(ContextItem::text("c")))
            .and_then(|state| state.add_item(ContextItem::url("https://d")))
            .expect("items")
    }

    #[test]
    fn removing_last_instance_recreates_default() {
        let state = ExtensionState::default();
        let only = state.active_instance_id.clone();
        let state = state.remove_instance(&only).expect("remove");
        assert_eq!(state.instances.len(), 1);
        assert_eq!(state.instances[0].name, DEFAULT_INSTANCE_NAME);
        assert_ne!(state.instances[0].id, only);
        assert_eq!(state.active_instance_id, state.instances[0].id);

        let again = state.active_instance_id.clone();
        let state = state.remove_instance(&again).expect("remove again");
        assert_eq!(state.instances.len(), 1);
    }

    #[test]
    fn create_and_remove_moves_active() {
        let state = ExtensionState::default()
            .create_instance("Feature")
            .and_then(|state| state.create_instance("Bugfix"))
            .expect("create");
        assert_eq!(state.instances.len(), 3);
        assert_eq!(state.active_instance_id, "ctx-3");

        let state = state.remove_instance("ctx-3").expect("remove");
        assert_eq!(state.active_instance_id, "ctx-2");
        let state = state.create_instance("Next").expect("create");
        assert_eq!(state.active_instance_id, "ctx-3");
        assert!(matches!(
            state.clone().create_instance("   "),
            Err(StateError::EmptyName)
        ));
        assert!(matches!(
            state.activate("ctx-99"),
            Err(StateError::UnknownInstance(_))
        ));
    }

    #[test]
    fn main_marker_tracks_moves_and_removals() {
        let state = state_with_items().set_main(2).expect("main");
        let state = state.move_item(2, 0).expect("move");
        assert_eq!(state.active_instance().and_then(|i| i.main_item), Some(0));
        assert_eq!(state.active_instance().and_then(|i| i.main_text()), Some("c"));

        let state = state.move_item(1, 3).expect("move");
        assert_eq!(state.active_instance().and_then(|i| i.main_item), Some(0));

        // [c, b.py, url, a]
        let state = state.set_main(3).expect("main");
        let state = state.move_item(0, 3).expect("move");
        assert_eq!(state.active_instance().and_then(|i| i.main_item), Some(2));
        assert_eq!(state.active_instance().and_then(|i| i.main_text()), Some("a"));

        let state = state.remove_item(0).expect("remove");
        assert_eq!(state.active_instance().and_then(|i| i.main_item), Some(1));
        let state = state.remove_item(1).expect("remove");
        assert_eq!(state.active_instance().and_then(|i| i.main_item), None);
    }

    #[test]
    fn text_only_operations_reject_other_items() {
        let state = state_with_items();
        assert!(matches!(state.clone().set_main(1), Err(StateError::NotText(1))));
        assert!(matches!(state.clone().toggle_ignore(3), Err(StateError::NotText(3))));
        assert!(matches!(
            state.clone().edit_text(9, "x"),
            Err(StateError::ItemOutOfRange { index: 9, len: 4 })
        ));

        let state = state.toggle_ignore(0).and_then(|s| s.edit_text(0, "edited")).expect("edit");
        assert_eq!(
            state.active_instance().map(|i| i.items[0].clone()),
            Some(ContextItem::Text {
                body: "edited".to_owned(),
                ignored: true
            })
        );
    }

    #[test]
    fn settings_round_through_json_with_wire_names() {
        let state = ExtensionState::default()
            .set_jina_api_key(" jina-key ")
            .add_model_config(ModelConfig {
                name: "chat".to_owned(),
                url: "https://chat.example.com".to_owned(),
                paste_delay_ms: 800,
            })
            .expect("model");
        let json = serde_json::to_value(&state).expect("json");
        assert_eq!(json["activeInstanceId"], "ctx-1");
        assert_eq!(json["jinaApiKey"], "jina-key");
        assert_eq!(json["modelConfigs"][0]["pasteDelay"], 800);

        assert!(matches!(
            state.clone().add_model_config(ModelConfig {
                name: "chat".to_owned(),
                url: String::new(),
                paste_delay_ms: 0,
            }),
            Err(StateError::DuplicateModel(_))
        ));
        let state = state.remove_model_config("chat").expect("remove");
        assert!(state.settings.model_configs.is_empty());
        assert!(state.set_jina_api_key("").settings.jina_api_key.is_none());
    }

    #[test]
    fn normalization_repairs_dangling_references() {
        let raw = r#"{"activeInstanceId":"gone","instances":[{"id":"ctx-4","name":"A","mainItem":3}]}"#;
        let state = serde_json::from_str::<ExtensionState>(raw)
            .expect("parse")
            .normalized();
        assert_eq!(state.active_instance_id, "ctx-4");
        assert_eq!(state.instances[0].main_item, None);

        let empty = serde_json::from_str::<ExtensionState>(r#"{"activeInstanceId":""}"#)
            .expect("parse")
            .normalized();
        assert_eq!(empty.instances.len(), 1);
    }

    #[test]
    fn store_persists_each_update() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = StateStore::new(dir.path().join(".linecomp").join("state.json"));
        assert_eq!(store.load().expect("load"), ExtensionState::default());

        store
            .update(|state| state.add_item(ContextItem::text("remember me")))
            .expect("update");
        let reloaded = StateStore::new(store.path()).load().expect("reload");
        assert_eq!(
            reloaded.active_instance().map(|i| i.items.len()),
            Some(1)
        );

        let failed = store.update(|state| state.remove_item(7));
        assert!(failed.is_err());
        assert_eq!(store.load().expect("load"), reloaded);
    }

    #[test]
    fn update_waits_for_lock_holder() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = StateStore::new(dir.path().join("state.json"));
        let held = open_lock(&store.lock_path()).expect("lock file");
        held.lock_exclusive().expect("lock");

        let background = store.clone();
        let handle = std::thread::spawn(move || {
            background.update(|state| state.add_item(ContextItem::text("late")))
        });
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert!(!store.path().exists());

        FileExt::unlock(&held).expect("unlock");
        handle.join().expect("join").expect("update");
        assert!(store.path().exists());
    }
}
