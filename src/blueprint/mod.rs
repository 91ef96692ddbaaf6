//! Project blueprints: folders and files describing a project skeleton.
//!
//! Blueprints come from the built-in templates, from the language model or
//! from the memory of a previous project.

mod generator;
mod templates;

use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{Result, ValError};

pub use generator::{BlueprintGenerator, flutter_fallback, parse_response};
pub use templates::ProjectTemplate;

/// A file to create, relative to the project root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEntry {
    pub path: String,
    pub content: String,
}

impl FileEntry {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self { path: path.into(), content: content.into() }
    }

    /// Parse the compact `"path:content"` form; a plain path gets no content.
    pub fn parse_line(line: &str) -> Self {
        match line.split_once(':') {
            Some((path, content)) => Self::new(path.trim(), content),
            None => Self::new(line.trim(), ""),
        }
    }
}

impl<'de> Deserialize<'de> for FileEntry {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawEntry {
            Object {
                path: String,
                #[serde(default)]
                content: Option<Value>,
            },
            Line(String),
        }

        Ok(match RawEntry::deserialize(deserializer)? {
            RawEntry::Object { path, content } => {
                let content = match content {
                    None | Some(Value::Null) => String::new(),
                    Some(Value::String(text)) => text,
                    // Models sometimes inline package.json and friends as objects
                    Some(other) => serde_json::to_string_pretty(&other).unwrap_or_default(),
                };
                FileEntry::new(path, content)
            }
            RawEntry::Line(line) => FileEntry::parse_line(&line),
        })
    }
}

/// Folders and files of a project skeleton.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blueprint {
    #[serde(default)]
    pub folders: Vec<String>,
    #[serde(default)]
    pub files: Vec<FileEntry>,
}

/// Normalise a relative path, rejecting anything that escapes the project root.
fn clean_relative(path: &str) -> Result<Option<String>> {
    let path = path.trim().replace('\\', "/");
    let path = path.trim_start_matches("./").trim_end_matches('/').to_string();
    if path.is_empty() || path == "." {
        return Ok(None);
    }

    let bytes = path.as_bytes();
    let has_drive = bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic();
    if path.starts_with('/') || has_drive {
        return Err(ValError::Blueprint(format!("absolute path not allowed: {}", path)));
    }
    if path.split('/').any(|part| part == "..") {
        return Err(ValError::Blueprint(format!("path escapes the project: {}", path)));
    }
    Ok(Some(path))
}

impl Blueprint {
    /// Blueprint with folders and no files.
    #[cfg(test)]
    pub fn folders_only(folders: &[&str]) -> Self {
        Self { folders: folders.iter().map(|f| f.to_string()).collect(), files: Vec::new() }
    }

    /// Build from user-entered comma separated lists.
    pub fn from_lists(folders: &str, files: &str) -> Self {
        let split = |text: &str| text.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect::<Vec<_>>();
        Self { folders: split(folders), files: split(files).iter().map(|f| FileEntry::parse_line(f)).collect() }
    }

    /// Parse a blueprint from arbitrary JSON.
    ///
    /// # Errors
    /// Returns `ValError::Blueprint` if the value is not an object or has the wrong shape.
    pub fn from_value(value: Value) -> Result<Self> {
        if !value.is_object() {
            return Err(ValError::Blueprint(format!("expected an object, got {}", value)));
        }
        serde_json::from_value(value).map_err(|e| ValError::Blueprint(e.to_string()))
    }

    /// Clean the blueprint: trim entries, drop empty ones and duplicates.
    ///
    /// # Errors
    /// Returns `ValError::Blueprint` for absolute paths or `..` components.
    pub fn validate(self) -> Result<Self> {
        let mut folders: Vec<String> = Vec::new();
        for folder in &self.folders {
            if let Some(folder) = clean_relative(folder)?
                && !folders.contains(&folder)
            {
                folders.push(folder);
            }
        }

        let mut files: Vec<FileEntry> = Vec::new();
        for file in self.files {
            if let Some(path) = clean_relative(&file.path)?
                && !files.iter().any(|f| f.path == path)
            {
                files.push(FileEntry::new(path, file.content));
            }
        }

        Ok(Self { folders, files })
    }

    /// Preview lines for the blueprint under `base`.
    pub fn preview(&self, base: &Path) -> Vec<String> {
        let dirs = self.folders.iter().map(|d| format!("[DIR ] {}", base.join(d).display()));
        let files = self.files.iter().map(|f| format!("[FILE] {}", base.join(&f.path).display()));
        dirs.chain(files).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.folders.is_empty() && self.files.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_accepts_all_file_forms() {
        let blueprint = Blueprint::from_value(json!({
            "folders": ["src"],
            "files": [
                {"path": "README.md", "content": "# App"},
                "main.py:print('hi')",
                "LICENSE",
                {"path": "package.json", "content": {"name": "app"}}
            ]
        }))
        .unwrap();

        assert_eq!(blueprint.files[0], FileEntry::new("README.md", "# App"));
        assert_eq!(blueprint.files[1], FileEntry::new("main.py", "print('hi')"));
        assert_eq!(blueprint.files[2], FileEntry::new("LICENSE", ""));
        assert!(blueprint.files[3].content.contains("\"name\": \"app\""));
    }

    #[test]
    fn test_non_object_is_rejected() {
        assert!(matches!(Blueprint::from_value(json!(["src"])), Err(ValError::Blueprint(_))));
    }

    #[test]
    fn test_validate_cleans_entries() {
        let blueprint = Blueprint {
            folders: vec![" src ".into(), "".into(), "./src/".into(), "docs\\api".into()],
            files: vec![FileEntry::new("  ", "x"), FileEntry::new("src/main.rs", "fn main() {}")],
        }
        .validate()
        .unwrap();

        assert_eq!(blueprint.folders, vec!["src", "docs/api"]);
        assert_eq!(blueprint.files, vec![FileEntry::new("src/main.rs", "fn main() {}")]);
    }

    #[test]
    fn test_validate_rejects_escaping_paths() {
        assert!(Blueprint::folders_only(&["../outside"]).validate().is_err());
        assert!(Blueprint::folders_only(&["/etc"]).validate().is_err());
        assert!(Blueprint::folders_only(&["C:/Windows"]).validate().is_err());
    }

    #[test]
    fn test_preview_lists_dirs_then_files() {
        let blueprint = Blueprint::from_lists("lib, test", "lib/main.dart");
        let lines = blueprint.preview(Path::new("/tmp/app"));
        assert_eq!(lines, vec!["[DIR ] /tmp/app/lib", "[DIR ] /tmp/app/test", "[FILE] /tmp/app/lib/main.dart"]);
    }
}
