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

//! The declarative configuration surface the reconciler consumes. Parsing
//! this out of an on-disk YAML file is an external collaborator's job; this
//! crate only defines the validated shape and the checks that must pass
//! before a config is handed to the reconciler.

use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Home-relative path, e.g. `.tmux.conf`.
    pub path: String,
    pub mnemonic: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub name: String,
    pub store_location: PathBuf,
    pub with_history: Vec<FileEntry>,
    pub without_history: Vec<FileEntry>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("mnemonic {0:?} is used by more than one entry")]
    DuplicateMnemonic(String),
    #[error("path {0:?} is declared in both with-history and without-history")]
    HistoryModeCollision(String),
}

impl Config {
    /// Rejects a config the reconciler must not be handed: duplicate
    /// mnemonics across either list, or a path declared in both lists.
    /// Resolves the two Design Note 9 open questions (see DESIGN.md)
    /// rather than leaving them to caller discretion.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen_mnemonics = std::collections::HashSet::new();
        for entry in self.with_history.iter().chain(&self.without_history) {
            if !entry.mnemonic.is_empty() && !seen_mnemonics.insert(entry.mnemonic.as_str()) {
                return Err(ConfigError::DuplicateMnemonic(entry.mnemonic.clone()));
            }
        }

        let with_history_paths: std::collections::HashSet<&str> =
            self.with_history.iter().map(|e| e.path.as_str()).collect();
        for entry in &self.without_history {
            if with_history_paths.contains(entry.path.as_str()) {
                return Err(ConfigError::HistoryModeCollision(entry.path.clone()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str, mnemonic: &str) -> FileEntry {
        FileEntry {
            path: path.to_owned(),
            mnemonic: mnemonic.to_owned(),
        }
    }

    #[test]
    fn valid_config_passes() {
        let config = Config {
            name: "main".to_owned(),
            store_location: PathBuf::from("/home/user/.dotted"),
            with_history: vec![entry(".tmux.conf", "tmux")],
            without_history: vec![entry(".bashrc", "bash")],
        };
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn duplicate_mnemonic_is_rejected() {
        let config = Config {
            name: "main".to_owned(),
            store_location: PathBuf::from("/home/user/.dotted"),
            with_history: vec![entry(".tmux.conf", "dup")],
            without_history: vec![entry(".bashrc", "dup")],
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::DuplicateMnemonic("dup".to_owned()))
        );
    }

    #[test]
    fn empty_mnemonics_do_not_collide() {
        let config = Config {
            name: "main".to_owned(),
            store_location: PathBuf::from("/home/user/.dotted"),
            with_history: vec![entry(".tmux.conf", "")],
            without_history: vec![entry(".bashrc", "")],
        };
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn path_in_both_lists_is_rejected() {
        let config = Config {
            name: "main".to_owned(),
            store_location: PathBuf::from("/home/user/.dotted"),
            with_history: vec![entry(".foo", "a")],
            without_history: vec![entry(".foo", "b")],
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::HistoryModeCollision(".foo".to_owned()))
        );
    }
}
