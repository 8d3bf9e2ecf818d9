//! Project configuration and document discovery

use crate::cache::is_cache_artifact;
use crate::error::{Result, SdeError};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Name of the per-project configuration file
pub const PROJECT_FILE: &str = "project.json";

/// Contents of `project.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    pub id: String,

    /// Project languages, in output order
    pub languages: Vec<String>,

    /// Content directory relative to the project root
    #[serde(default)]
    pub content_dir: Option<PathBuf>,
}

/// An opened project
#[derive(Debug, Clone)]
pub struct Project {
    pub root: PathBuf,
    pub config: ProjectConfig,
}

impl Project {
    /// Open `<workspace_root>/<project_id>`
    ///
    /// A missing directory or config file is an engine-wide failure.
    pub fn open(workspace_root: &Path, project_id: &str) -> Result<Self> {
        if !is_safe_segment(project_id) {
            return Err(SdeError::InvalidPath {
                path: PathBuf::from(project_id),
                reason: "project id must be a single path segment".to_string(),
            });
        }

        let root = workspace_root.join(project_id);
        if !root.is_dir() {
            return Err(SdeError::ProjectNotFound {
                project_id: project_id.to_string(),
            });
        }

        let config_path = root.join(PROJECT_FILE);
        let content = std::fs::read_to_string(&config_path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SdeError::InvalidConfig {
                    message: format!("{} missing for project {}", PROJECT_FILE, project_id),
                }
            } else {
                SdeError::FileRead {
                    path: config_path.clone(),
                    source: e,
                }
            }
        })?;

        let config: ProjectConfig =
            serde_json::from_str(&content).map_err(|e| SdeError::JsonParse {
                path: config_path.clone(),
                message: e.to_string(),
                source: e,
            })?;

        if !is_safe_segment(&config.id) || config.id != project_id {
            return Err(SdeError::InvalidConfig {
                message: format!(
                    "{} of project {} declares id {:?}",
                    PROJECT_FILE, project_id, config.id
                ),
            });
        }

        if config.languages.is_empty() {
            return Err(SdeError::InvalidConfig {
                message: format!("project {} declares no languages", project_id),
            });
        }

        Ok(Self { root, config })
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn languages(&self) -> &[String] {
        &self.config.languages
    }

    pub fn content_root(&self) -> PathBuf {
        match &self.config.content_dir {
            Some(dir) => self.root.join(dir),
            None => self.root.clone(),
        }
    }

    /// All content documents, sorted, excluding caches and the project file
    pub fn documents(&self) -> Vec<PathBuf> {
        let mut documents: Vec<PathBuf> = WalkDir::new(self.content_root())
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| p.extension().map(|e| e == "json").unwrap_or(false))
            .filter(|p| !is_cache_artifact(p))
            .filter(|p| p.file_name().map(|n| n != PROJECT_FILE).unwrap_or(false))
            .collect();

        documents.sort();
        debug!(project = %self.id(), count = documents.len(), "Discovered documents");
        documents
    }

    /// Project-relative, `/`-separated reference for a document path
    pub fn document_ref(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Resolve a document reference, rejecting traversal outside the project
    pub fn resolve(&self, document_ref: &str) -> Result<PathBuf> {
        let relative = Path::new(document_ref);
        let safe = !document_ref.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));

        if !safe {
            return Err(SdeError::InvalidPath {
                path: relative.to_path_buf(),
                reason: "document reference must stay inside the project".to_string(),
            });
        }

        Ok(self.root.join(relative))
    }
}

fn is_safe_segment(value: &str) -> bool {
    let mut components = Path::new(value).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_project(root: &Path, id: &str) -> PathBuf {
        let dir = root.join(id);
        std::fs::create_dir_all(dir.join("chapters")).unwrap();
        std::fs::write(
            dir.join(PROJECT_FILE),
            format!(r#"{{"id": "{}", "languages": ["en", "nl"]}}"#, id),
        )
        .unwrap();
        dir
    }

    #[test]
    fn test_open_and_discover_documents() {
        let ws = tempdir().unwrap();
        let dir = write_project(ws.path(), "ar2025");
        std::fs::write(dir.join("chapters/intro.json"), "{}").unwrap();
        std::fs::write(dir.join("chapters/__structured-data--intro.json"), "{}").unwrap();
        std::fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let project = Project::open(ws.path(), "ar2025").unwrap();
        assert_eq!(project.languages(), &["en".to_string(), "nl".to_string()]);

        let docs = project.documents();
        assert_eq!(docs.len(), 1);
        assert_eq!(project.document_ref(&docs[0]), "chapters/intro.json");
    }

    #[test]
    fn test_missing_project_and_config() {
        let ws = tempdir().unwrap();
        assert!(matches!(
            Project::open(ws.path(), "nope"),
            Err(SdeError::ProjectNotFound { .. })
        ));

        std::fs::create_dir_all(ws.path().join("bare")).unwrap();
        assert!(matches!(
            Project::open(ws.path(), "bare"),
            Err(SdeError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_config_id_must_match_directory() {
        let ws = tempdir().unwrap();
        for (dir, id) in [("blank", ""), ("b", "a"), ("nested", "../nested"), ("dot", ".")] {
            std::fs::create_dir_all(ws.path().join(dir)).unwrap();
            std::fs::write(
                ws.path().join(dir).join(PROJECT_FILE),
                format!(r#"{{"id": "{}", "languages": ["en"]}}"#, id),
            )
            .unwrap();

            assert!(
                matches!(
                    Project::open(ws.path(), dir),
                    Err(SdeError::InvalidConfig { .. })
                ),
                "id {:?} in {} was accepted",
                id,
                dir
            );
        }
    }

    #[test]
    fn test_resolve_rejects_traversal() {
        let ws = tempdir().unwrap();
        write_project(ws.path(), "p");
        let project = Project::open(ws.path(), "p").unwrap();

        assert!(project.resolve("chapters/intro.json").is_ok());
        assert!(project.resolve("../other/secret.json").is_err());
        assert!(project.resolve("/etc/passwd").is_err());
        assert!(Project::open(ws.path(), "../p").is_err());
    }
}
