//! Reading fragment files for ingestion.

use std::fs;
use std::path::{Path, PathBuf};

use rag_core::{NewFragment, RagError, Result};

/// Tags applied to fragments that do not carry their own.
#[derive(Debug, Clone, Default)]
pub struct FragmentDefaults {
    pub doc_type: Option<String>,
    pub language: Option<String>,
}

impl FragmentDefaults {
    fn apply(&self, mut fragment: NewFragment) -> NewFragment {
        if fragment.doc_type.is_none() {
            fragment.doc_type = self.doc_type.clone();
        }
        if fragment.language.is_none() {
            fragment.language = self.language.clone();
        }
        fragment
    }
}

/// Collect ingestible files under `path`.
pub fn collect_files(path: &Path, recursive: bool) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    if path.is_file() {
        files.push(path.to_path_buf());
    } else if path.is_dir() {
        let mut entries: Vec<PathBuf> = fs::read_dir(path)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<std::io::Result<_>>()?;
        entries.sort();

        for entry_path in entries {
            if entry_path.is_file() && is_supported_file(&entry_path) {
                files.push(entry_path);
            } else if entry_path.is_dir() && recursive {
                files.extend(collect_files(&entry_path, recursive)?);
            }
        }
    }

    Ok(files)
}

fn is_supported_file(path: &Path) -> bool {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    matches!(ext, "jsonl" | "txt" | "md" | "markdown" | "text")
}

fn is_jsonl(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("jsonl")
}

/// Parse a file's content into fragments.
///
/// `.jsonl` files hold one fragment object per line. Anything else is split
/// into paragraphs on blank lines.
pub fn parse_fragments(
    path: &Path,
    content: &str,
    defaults: &FragmentDefaults,
) -> Result<Vec<NewFragment>> {
    let fragments = if is_jsonl(path) {
        parse_jsonl(path, content)?
    } else {
        split_paragraphs(content)
            .into_iter()
            .map(NewFragment::new)
            .collect()
    };
    Ok(fragments.into_iter().map(|f| defaults.apply(f)).collect())
}

fn parse_jsonl(path: &Path, content: &str) -> Result<Vec<NewFragment>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str::<NewFragment>(line).map_err(|e| {
                RagError::invalid_argument(format!("{}:{}: {}", path.display(), i + 1, e))
            })
        })
        .collect()
}

fn split_paragraphs(content: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in content.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                paragraphs.push(current.join("\n"));
                current.clear();
            }
        } else {
            current.push(line.trim_end());
        }
    }
    if !current.is_empty() {
        paragraphs.push(current.join("\n"));
    }
    paragraphs
}
