// Copyright 2021 The Jujutsu Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! One tracked dot-file: component C. Either a full branching [`HistoryTree`]
//! or a flat snapshot, never both — see the exclusivity invariant on
//! [`DotFile`].

use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::checksum::Checksum;
use crate::fs::Filesystem;
use crate::fs::PathError;
use crate::history::HistoryError;
use crate::history::HistoryTree;
use crate::history::NodeId;
use crate::history::Timestamp;

#[derive(Debug, Error)]
pub enum DotFileError {
    #[error("path {0:?} is not absolute")]
    NotAbsolute(PathBuf),
    #[error("operation requires a history-tracked file")]
    NotHistory,
    #[error("operation requires a snapshot (non-history) file")]
    IsHistory,
    /// Sentinel: the per-file directory does not exist. Not logged as an
    /// error — the reconciler checks for this with `matches!` and treats it
    /// as "not yet in the store".
    #[error("base path not found")]
    BasePathNotFound,
    #[error(transparent)]
    Io(#[from] PathError),
    #[error("malformed dot-file metadata: {0}")]
    Decode(String),
    #[error(transparent)]
    History(#[from] HistoryError),
}

/// One tracked dot-file: either a full history tree or a flat snapshot.
pub struct DotFile {
    path: PathBuf,
    mnemonic: String,
    has_history: bool,
    history: Option<HistoryTree>,
    current_history: Option<NodeId>,
    content: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct WireMetadata {
    #[serde(rename = "Mnemonic")]
    mnemonic: String,
    #[serde(rename = "HasHistory")]
    has_history: bool,
    #[serde(rename = "CurrentHistory")]
    current_history: String,
}

impl DotFile {
    /// Reads `path` from the live filesystem and creates a fresh tracked
    /// file. Fails if `path` is not absolute.
    pub fn new(
        fs: &dyn Filesystem,
        path: PathBuf,
        mnemonic: String,
        want_history: bool,
        timestamp: Timestamp,
    ) -> Result<Self, DotFileError> {
        if !fs.is_absolute(&path) {
            return Err(DotFileError::NotAbsolute(path));
        }
        let contents = fs.read(&path)?;

        let dot_file = if want_history {
            let (tree, root) = HistoryTree::new(contents, timestamp);
            Self {
                path,
                mnemonic,
                has_history: true,
                history: Some(tree),
                current_history: Some(root),
                content: None,
            }
        } else {
            Self {
                path,
                mnemonic,
                has_history: false,
                history: None,
                current_history: None,
                content: Some(contents),
            }
        };
        tracing::debug!(path = %dot_file.path.display(), has_history = want_history, "dotfile: created");
        Ok(dot_file)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mnemonic(&self) -> &str {
        &self.mnemonic
    }

    pub fn has_history(&self) -> bool {
        self.has_history
    }

    /// The current snapshot content: the live-reconstructed current history
    /// node's content if tracked with history, else the stored snapshot.
    pub fn current_content(&self) -> Result<String, HistoryError> {
        match (&self.history, self.current_history) {
            (Some(tree), Some(node)) => tree.content(node),
            _ => Ok(self.content.clone().unwrap_or_default()),
        }
    }

    /// Reads the live file and, if its content differs from the current
    /// history node, commits it and advances `current_history`. Returns
    /// whether a commit was made.
    pub fn add_commit(
        &mut self,
        fs: &dyn Filesystem,
        timestamp: Timestamp,
    ) -> Result<bool, DotFileError> {
        if !self.has_history {
            return Err(DotFileError::NotHistory);
        }
        let contents = fs.read(&self.path)?;
        let tree = self.history.as_mut().expect("has_history implies a tree");
        let current = self.current_history.expect("has_history implies a current node");

        match tree.add_commit(current, &contents, timestamp)? {
            Some(new_node) => {
                self.current_history = Some(new_node);
                tracing::debug!(path = %self.path.display(), node = %new_node, "dotfile: committed");
                Ok(true)
            }
            None => {
                tracing::debug!(path = %self.path.display(), "dotfile: add_commit is a no-op");
                Ok(false)
            }
        }
    }

    /// Reads the live file and replaces the stored snapshot if it changed.
    /// Returns whether it changed.
    pub fn update_content(&mut self, fs: &dyn Filesystem) -> Result<bool, DotFileError> {
        if self.has_history {
            return Err(DotFileError::IsHistory);
        }
        let contents = fs.read(&self.path)?;
        let changed = self.content.as_deref() != Some(contents.as_str());
        if changed {
            self.content = Some(contents);
            tracing::debug!(path = %self.path.display(), "dotfile: snapshot updated");
        }
        Ok(changed)
    }

    /// Starts tracking history from the current snapshot. Only valid on a
    /// snapshot file; calling this twice without an intervening
    /// `remove_history` is a programmer error.
    pub fn init_history(&mut self, timestamp: Timestamp) {
        assert!(!self.has_history, "init_history called on a file that already has history");
        let content = self.content.take().expect("snapshot files always carry content");
        let (tree, root) = HistoryTree::new(content, timestamp);
        self.history = Some(tree);
        self.current_history = Some(root);
        self.has_history = true;
        tracing::debug!(path = %self.path.display(), "dotfile: history initialized");
    }

    /// Collapses the history tree to a flat snapshot taken from the current
    /// history node. Only valid on a history file; calling this on a
    /// snapshot file is a programmer error.
    pub fn remove_history(&mut self) -> Result<(), HistoryError> {
        assert!(self.has_history, "remove_history called on a file without history");
        let tree = self.history.as_ref().expect("has_history implies a tree");
        let current = self.current_history.expect("has_history implies a current node");
        let content = tree.content(current)?;

        self.content = Some(content);
        self.history = None;
        self.current_history = None;
        self.has_history = false;
        tracing::debug!(path = %self.path.display(), "dotfile: history removed");
        Ok(())
    }

    /// This file's path with the home-directory prefix stripped, expressed
    /// with `/` separators regardless of platform.
    pub fn relative_path(&self, home: &Path) -> String {
        let relative = self.path.strip_prefix(home).unwrap_or(&self.path);
        relative
            .components()
            .filter_map(|c| c.as_os_str().to_str())
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Lowercase hex SHA-1 of [`Self::relative_path`]; the on-disk
    /// directory name for this file.
    pub fn relative_path_hash(&self, home: &Path) -> String {
        Checksum::of(&self.relative_path(home)).hex()
    }

    /// Persists this file's 3-file directory layout into `dir`.
    pub fn save_to_disk(&self, fs: &dyn Filesystem, dir: &Path) -> Result<(), DotFileError> {
        fs.mkdir_all(dir)?;

        let current_history = match (self.has_history, self.current_history) {
            (true, Some(node)) => node.to_string(),
            _ => String::new(),
        };
        let metadata = WireMetadata {
            mnemonic: self.mnemonic.clone(),
            has_history: self.has_history,
            current_history,
        };
        let metadata_json = serde_json::to_string_pretty(&metadata)
            .map_err(|err| DotFileError::Decode(err.to_string()))?;
        fs.write(&dir.join("metadata"), &metadata_json)?;

        let content = match &self.history {
            Some(tree) => tree.root_content().to_owned(),
            None => self.content.clone().unwrap_or_default(),
        };
        fs.write(&dir.join("content"), &content)?;

        if let Some(tree) = &self.history {
            let history_json =
                tree.to_json().map_err(|err| DotFileError::Decode(err.to_string()))?;
            fs.write(&dir.join("history"), &history_json)?;
        }
        Ok(())
    }

    /// Loads this file's 3-file directory layout from `dir`. Returns the
    /// [`DotFileError::BasePathNotFound`] sentinel if `dir` does not exist —
    /// callers must check for it with `matches!` rather than treating it as
    /// a hard failure.
    pub fn load_from_disk(
        fs: &dyn Filesystem,
        dir: &Path,
        path: PathBuf,
    ) -> Result<Self, DotFileError> {
        if !fs.exists(dir) || !fs.is_dir(dir) {
            return Err(DotFileError::BasePathNotFound);
        }

        let metadata_text = fs.read(&dir.join("metadata"))?;
        let metadata: WireMetadata = serde_json::from_str(&metadata_text)
            .map_err(|err| DotFileError::Decode(err.to_string()))?;
        let content = fs.read(&dir.join("content"))?;

        if metadata.has_history {
            let history_text = fs.read(&dir.join("history"))?;
            let tree = HistoryTree::from_json(&history_text, content)?;
            let current: NodeId = metadata
                .current_history
                .parse()
                .map_err(|_| DotFileError::Decode(format!(
                    "unknown CurrentHistory id {:?}",
                    metadata.current_history
                )))?;
            if !tree.contains(current) {
                return Err(DotFileError::Decode(format!(
                    "unknown CurrentHistory id {:?}",
                    metadata.current_history
                )));
            }
            Ok(Self {
                path,
                mnemonic: metadata.mnemonic,
                has_history: true,
                history: Some(tree),
                current_history: Some(current),
                content: None,
            })
        } else {
            Ok(Self {
                path,
                mnemonic: metadata.mnemonic,
                has_history: false,
                history: None,
                current_history: None,
                content: Some(content),
            })
        }
    }
}
