use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::PromptError;

/// One version of a prompt, as stored in a YAML file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Prompt {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    /// Input name to description.
    #[serde(default)]
    pub inputs: BTreeMap<String, String>,
    pub template: String,
}

impl Prompt {
    pub fn text(&self) -> &str {
        &self.template
    }
}

/// Prompts loaded from a directory of `*.yaml` files, keyed by `(name, version)`.
#[derive(Debug, Clone, Default)]
pub struct PromptsLibrary {
    directory: PathBuf,
    prompts: BTreeMap<(String, String), (Prompt, PathBuf)>,
}

impl PromptsLibrary {
    /// Parse every `*.yaml` file directly inside `directory`.
    pub fn load(directory: impl AsRef<Path>) -> Result<Self, PromptError> {
        let directory = directory.as_ref();
        if !directory.is_dir() {
            return Err(PromptError::DirectoryNotFound(directory.to_path_buf()));
        }

        tracing::info!(directory = %directory.display(), "loading prompts");

        let pattern = format!(
            "{}/*.yaml",
            glob::Pattern::escape(&directory.to_string_lossy())
        );

        let mut prompts: BTreeMap<(String, String), (Prompt, PathBuf)> = BTreeMap::new();
        for entry in glob::glob(&pattern)? {
            let path = entry.map_err(|e| {
                let path = e.path().to_path_buf();
                PromptError::Io {
                    path,
                    source: std::io::Error::from(e),
                }
            })?;
            if !path.is_file() {
                continue;
            }

            let prompt = load_prompt(&path)?;
            let key = (prompt.name.clone(), prompt.version.clone());
            if let Some((_, first)) = prompts.get(&key) {
                tracing::error!(
                    name = %prompt.name,
                    version = %prompt.version,
                    first = %first.display(),
                    "duplicate prompt"
                );
                return Err(PromptError::Duplicate {
                    name: prompt.name,
                    version: prompt.version,
                    path,
                });
            }

            tracing::debug!(
                name = %prompt.name,
                version = %prompt.version,
                path = %path.display(),
                "loaded prompt"
            );
            prompts.insert(key, (prompt, path));
        }

        tracing::info!(count = prompts.len(), "loaded prompts");
        Ok(Self {
            directory: directory.to_path_buf(),
            prompts,
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn get(&self, name: &str, version: &str) -> Result<&Prompt, PromptError> {
        self.prompts
            .get(&(name.to_string(), version.to_string()))
            .map(|(prompt, _)| prompt)
            .ok_or_else(|| PromptError::NotFound {
                name: name.to_string(),
                version: version.to_string(),
            })
    }

    /// File the prompt was loaded from.
    pub fn source_path(&self, name: &str, version: &str) -> Option<&Path> {
        self.prompts
            .get(&(name.to_string(), version.to_string()))
            .map(|(_, path)| path.as_path())
    }

    /// Sorted `(name, version)` pairs.
    pub fn list(&self) -> Vec<(&str, &str)> {
        self.prompts
            .keys()
            .map(|(name, version)| (name.as_str(), version.as_str()))
            .collect()
    }

    /// Sorted versions of `name`; empty if unknown.
    pub fn versions(&self, name: &str) -> Vec<&str> {
        self.prompts
            .keys()
            .filter(|(n, _)| n == name)
            .map(|(_, version)| version.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.prompts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }
}

fn load_prompt(path: &Path) -> Result<Prompt, PromptError> {
    let content = std::fs::read_to_string(path).map_err(|e| PromptError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;

    serde_yaml::from_str(&content).map_err(|e| PromptError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    fn write(dir: &TempDir, file: &str, content: &str) {
        fs::write(dir.path().join(file), content).unwrap();
    }

    fn prompt_yaml(name: &str, version: &str) -> String {
        format!(
            "name: {}\nversion: \"{}\"\ndescription: test prompt\ninputs:\n  question: user question\ntemplate: |\n  Answer: {{question}}\n",
            name, version
        )
    }

    #[test]
    fn test_load_and_get() {
        let dir = TempDir::new().unwrap();
        write(&dir, "qa_v1.yaml", &prompt_yaml("qa", "1.0"));

        let library = PromptsLibrary::load(dir.path()).unwrap();
        let prompt = library.get("qa", "1.0").unwrap();

        assert_eq!(prompt.description, "test prompt");
        assert_eq!(prompt.inputs["question"], "user question");
        assert_eq!(prompt.text(), "Answer: {question}\n");
        assert_eq!(
            library.source_path("qa", "1.0"),
            Some(dir.path().join("qa_v1.yaml").as_path())
        );
    }

    #[test]
    fn test_list_and_versions_sorted() {
        let dir = TempDir::new().unwrap();
        write(&dir, "b.yaml", &prompt_yaml("summarize", "2.0"));
        write(&dir, "a.yaml", &prompt_yaml("summarize", "1.0"));
        write(&dir, "c.yaml", &prompt_yaml("qa", "1.0"));
        write(&dir, "notes.txt", "ignored");

        let library = PromptsLibrary::load(dir.path()).unwrap();

        assert_eq!(library.len(), 3);
        assert_eq!(
            library.list(),
            [("qa", "1.0"), ("summarize", "1.0"), ("summarize", "2.0")]
        );
        assert_eq!(library.versions("summarize"), ["1.0", "2.0"]);
        assert!(library.versions("unknown").is_empty());
    }

    #[test]
    fn test_not_found_message() {
        let dir = TempDir::new().unwrap();
        let library = PromptsLibrary::load(dir.path()).unwrap();

        assert!(library.is_empty());
        let err = library.get("qa", "9.9").unwrap_err();
        assert_eq!(err.to_string(), "prompt 'qa' version '9.9' not found");
    }

    #[test]
    fn test_missing_directory() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");

        assert!(matches!(
            PromptsLibrary::load(&missing),
            Err(PromptError::DirectoryNotFound(path)) if path == missing
        ));
    }

    #[test]
    fn test_duplicate_rejected() {
        let dir = TempDir::new().unwrap();
        write(&dir, "one.yaml", &prompt_yaml("qa", "1.0"));
        write(&dir, "two.yaml", &prompt_yaml("qa", "1.0"));

        assert!(matches!(
            PromptsLibrary::load(dir.path()),
            Err(PromptError::Duplicate { name, version, .. }) if name == "qa" && version == "1.0"
        ));
    }

    #[test]
    fn test_parse_errors_name_the_file() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "bad.yaml",
            "name: qa\nversion: \"1\"\ntemplate: x\nauthor: someone\n",
        );

        match PromptsLibrary::load(dir.path()) {
            Err(PromptError::Parse { path, .. }) => {
                assert_eq!(path, dir.path().join("bad.yaml"))
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_optional_fields_default() {
        let dir = TempDir::new().unwrap();
        write(&dir, "min.yaml", "name: min\nversion: \"1\"\ntemplate: hi\n");

        let library = PromptsLibrary::load(dir.path()).unwrap();
        let prompt = library.get("min", "1").unwrap();
        assert!(prompt.description.is_empty());
        assert!(prompt.inputs.is_empty());
    }

    #[test]
    fn test_directory_with_glob_characters() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("prompts[v1]");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("qa.yaml"), prompt_yaml("qa", "1.0")).unwrap();

        let library = PromptsLibrary::load(&dir).unwrap();
        assert_eq!(library.list(), [("qa", "1.0")]);
    }
}
