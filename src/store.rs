//! Whole-document storage for topic and plan files.
//!
//! Documents are read entirely into memory, mutated, and written back with a
//! temp-file-and-rename so an interrupted write never leaves a half-written
//! document behind. Fields the engine does not understand round-trip as-is.

use serde_json::Value;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::story::{topics_from_value, Role, Topic};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{path}: could not read: {message}")]
    Read { path: String, message: String },
    #[error("{path}: invalid JSON: {message}")]
    Parse { path: String, message: String },
    #[error("{path}: could not write: {message}")]
    Write { path: String, message: String },
    #[error("topic {title:?} not found")]
    TopicNotFound { title: String },
    #[error("topic {title:?} has no {role} beat")]
    BeatNotFound { title: String, role: Role },
}

/// A loaded topic or plan document.
#[derive(Debug, Clone)]
pub struct Document {
    path: PathBuf,
    root: Value,
}

impl Document {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| StoreError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let root = serde_json::from_str(&content).map_err(|e| StoreError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            root,
        })
    }

    pub fn from_value(path: impl Into<PathBuf>, root: Value) -> Self {
        Self {
            path: path.into(),
            root,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    pub fn topics(&self) -> Vec<Topic> {
        topics_from_value(&self.root)
    }

    /// The stored text of one beat, located by exact topic title and role.
    pub fn beat_text(&self, title: &str, role: Role) -> Result<&str, StoreError> {
        let topic = find_topic(&self.root, title).ok_or_else(|| StoreError::TopicNotFound {
            title: title.to_string(),
        })?;
        topic
            .get("story")
            .and_then(|s| s.get(role.as_str()))
            .and_then(|b| b.get("text"))
            .and_then(Value::as_str)
            .ok_or_else(|| StoreError::BeatNotFound {
                title: title.to_string(),
                role,
            })
    }

    /// Replace the text of one beat in memory.
    pub fn set_beat_text(&mut self, title: &str, role: Role, text: &str) -> Result<(), StoreError> {
        let topic = find_topic_mut(&mut self.root, title).ok_or_else(|| {
            StoreError::TopicNotFound {
                title: title.to_string(),
            }
        })?;
        set_text(topic, title, role, text)
    }

    /// Replace the text of one beat in the topic at `index`, in the order
    /// `topics()` returns them. Unlike `set_beat_text` this is unambiguous
    /// when a plan repeats a title.
    pub fn set_beat_text_at(
        &mut self,
        index: usize,
        role: Role,
        text: &str,
    ) -> Result<(), StoreError> {
        let topic = topic_at_mut(&mut self.root, index).ok_or_else(|| {
            StoreError::TopicNotFound {
                title: format!("#{}", index),
            }
        })?;
        let title = topic
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        set_text(topic, &title, role, text)
    }

    /// Write the whole document back atomically.
    pub fn save(&self) -> Result<(), StoreError> {
        write_json_atomic(&self.path, &self.root)
    }
}

fn is_plan(root: &Value) -> bool {
    root.get("topics").map(Value::is_array).unwrap_or(false)
}

fn title_matches(topic: &Value, title: &str) -> bool {
    topic.get("title").and_then(Value::as_str) == Some(title)
}

fn find_topic<'a>(root: &'a Value, title: &str) -> Option<&'a Value> {
    if is_plan(root) {
        root.get("topics")?
            .as_array()?
            .iter()
            .find(|t| title_matches(t, title))
    } else if title_matches(root, title) {
        Some(root)
    } else {
        None
    }
}

fn find_topic_mut<'a>(root: &'a mut Value, title: &str) -> Option<&'a mut Value> {
    if is_plan(root) {
        root.get_mut("topics")?
            .as_array_mut()?
            .iter_mut()
            .find(|t| title_matches(t, title))
    } else if title_matches(root, title) {
        Some(root)
    } else {
        None
    }
}

fn topic_at_mut(root: &mut Value, index: usize) -> Option<&mut Value> {
    if is_plan(root) {
        root.get_mut("topics")?.as_array_mut()?.get_mut(index)
    } else if index == 0 {
        Some(root)
    } else {
        None
    }
}

fn set_text(topic: &mut Value, title: &str, role: Role, text: &str) -> Result<(), StoreError> {
    let beat = topic
        .get_mut("story")
        .and_then(|s| s.get_mut(role.as_str()))
        .and_then(Value::as_object_mut)
        .ok_or_else(|| StoreError::BeatNotFound {
            title: title.to_string(),
            role,
        })?;
    beat.insert("text".to_string(), Value::String(text.to_string()));
    Ok(())
}

/// Serialize `value` as pretty JSON and atomically replace `path` with it.
pub fn write_json_atomic(path: &Path, value: &Value) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| write_err(parent, e))?;
        }
    }

    let tmp_path = tmp_write_path(path);
    let write_result = (|| -> Result<(), StoreError> {
        let file = File::create(&tmp_path).map_err(|e| write_err(&tmp_path, e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, value).map_err(|e| write_err(&tmp_path, e))?;
        writer
            .write_all(b"\n")
            .map_err(|e| write_err(&tmp_path, e))?;
        let file = writer
            .into_inner()
            .map_err(|e| write_err(&tmp_path, e.error()))?;
        file.sync_all().map_err(|e| write_err(&tmp_path, e))?;
        Ok(())
    })();

    if let Err(error) = write_result {
        let _ = fs::remove_file(&tmp_path);
        return Err(error);
    }

    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        write_err(path, e)
    })?;

    Ok(())
}

fn write_err(path: &Path, e: impl std::fmt::Display) -> StoreError {
    StoreError::Write {
        path: path.display().to_string(),
        message: e.to_string(),
    }
}

fn tmp_write_path(path: &Path) -> PathBuf {
    let mut name: OsString = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".tmp-{}", std::process::id()));
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_load_reports_parse_errors() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bad.json");
        fs::write(&path, "{ \"title\": ").unwrap();
        let err = Document::load(&path).unwrap_err();
        assert!(matches!(err, StoreError::Parse { .. }));
        assert!(err.to_string().contains("bad.json"));

        let err = Document::load(temp.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, StoreError::Read { .. }));
    }

    #[test]
    fn test_locate_beat_in_plan() {
        let root = json!({
            "topics": [
                { "title": "A", "story": { "hook": { "text": "First." } } },
                { "title": "B", "story": { "hook": { "text": "Second." } } }
            ]
        });
        let mut doc = Document::from_value("plan.json", root);
        assert_eq!(doc.beat_text("B", Role::Hook).unwrap(), "Second.");
        assert!(matches!(
            doc.beat_text("C", Role::Hook),
            Err(StoreError::TopicNotFound { .. })
        ));
        assert!(matches!(
            doc.beat_text("A", Role::Twist),
            Err(StoreError::BeatNotFound { .. })
        ));

        doc.set_beat_text("A", Role::Hook, "Changed.").unwrap();
        assert_eq!(doc.beat_text("A", Role::Hook).unwrap(), "Changed.");
        assert_eq!(doc.beat_text("B", Role::Hook).unwrap(), "Second.");
    }

    #[test]
    fn test_set_by_index_with_repeated_titles() {
        let root = json!({
            "topics": [
                { "title": "Same", "story": { "hook": { "text": "First." } } },
                { "title": "Same", "story": { "hook": { "text": "Second." } } }
            ]
        });
        let mut doc = Document::from_value("plan.json", root);
        doc.set_beat_text_at(1, Role::Hook, "Changed.").unwrap();
        assert_eq!(doc.root()["topics"][0]["story"]["hook"]["text"], json!("First."));
        assert_eq!(doc.root()["topics"][1]["story"]["hook"]["text"], json!("Changed."));
        assert!(matches!(
            doc.set_beat_text_at(2, Role::Hook, "Nope."),
            Err(StoreError::TopicNotFound { .. })
        ));
    }

    #[test]
    fn test_save_preserves_unknown_fields_and_order() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("topic.json");
        fs::write(
            &path,
            r#"{"title":"T","published":true,"story":{"hook":{"text":"Old.","visual":"x"}},"quiz":[1,2]}"#,
        )
        .unwrap();

        let mut doc = Document::load(&path).unwrap();
        doc.set_beat_text("T", Role::Hook, "New.").unwrap();
        doc.save().unwrap();

        let reloaded = Document::load(&path).unwrap();
        assert_eq!(reloaded.beat_text("T", Role::Hook).unwrap(), "New.");
        assert_eq!(reloaded.root()["quiz"], json!([1, 2]));
        assert_eq!(reloaded.root()["story"]["hook"]["visual"], json!("x"));
        let keys: Vec<_> = reloaded.root().as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["title", "published", "story", "quiz"]);

        // no temp files left behind
        let leftovers: Vec<_> = fs::read_dir(temp.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp-"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
