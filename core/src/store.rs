// Copyright 2020 The Jujutsu Authors
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

//! The store reconciler: component D. Load reconciles three sources of
//! truth — the declarative [`Config`], the on-disk store directory, and the
//! live filesystem — into a single in-memory [`Store`]; save writes that
//! [`Store`] back out as a manifest plus one directory per tracked file.
//!
//! Grounded on `original_source/store/store.go`'s `LoadStore`, which this
//! module follows step for step (manifest walk, three-way classification,
//! then config-ordered adoption of anything left over).

use std::collections::HashMap;
use std::collections::HashSet;
use std::path::Path;
use std::path::PathBuf;

use thiserror::Error;

use crate::checksum::Checksum;
use crate::config::Config;
use crate::config::ConfigError;
use crate::dotfile::DotFile;
use crate::dotfile::DotFileError;
use crate::fs::Filesystem;
use crate::fs::HomeDirError;
use crate::fs::PathError;
use crate::history::Timestamp;

const MANIFEST_NAME: &str = "paths";

/// The whole collection: every dot-file the reconciler resolved for a
/// single config, plus the store's own identity.
pub struct Store {
    name: String,
    path: PathBuf,
    files: Vec<DotFile>,
}

impl Store {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn files(&self) -> &[DotFile] {
        &self.files
    }

    pub fn files_mut(&mut self) -> &mut [DotFile] {
        &mut self.files
    }

    pub fn find_by_path(&self, path: &Path) -> Option<&DotFile> {
        self.files.iter().find(|f| f.path() == path)
    }

    /// Last-wins lookup by mnemonic: per DESIGN.md, `Config::validate`
    /// rejects duplicate mnemonics before a config ever reaches here, so in
    /// practice at most one file can match.
    pub fn find_by_mnemonic(&self, mnemonic: &str) -> Option<&DotFile> {
        self.files.iter().rev().find(|f| !f.mnemonic().is_empty() && f.mnemonic() == mnemonic)
    }
}

/// Everything that can go wrong one layer below the store: wrapped by
/// [`ReconcileError`] with "failed to load/save store" context.
#[derive(Debug, Error)]
pub enum ReconcileErrorKind {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    DotFile(#[from] DotFileError),
    #[error(transparent)]
    Io(#[from] PathError),
    #[error(transparent)]
    HomeDir(#[from] HomeDirError),
    #[error("store in inconsistent state: directory for {0:?} listed but not found")]
    Inconsistent(String),
    #[error("store location {0:?} exists but is not a directory")]
    NotADirectory(PathBuf),
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("failed to load store")]
    Load(#[source] ReconcileErrorKind),
    #[error("failed to save store")]
    Save(#[source] ReconcileErrorKind),
}

/// Reads `store_location/paths`, stripping a trailing empty line produced
/// by the one-newline-per-entry convention. A missing manifest (fresh
/// store) is an empty list, not an I/O error.
fn read_manifest(fs: &dyn Filesystem, store_location: &Path) -> Result<Vec<String>, PathError> {
    let manifest_path = fs.join(store_location, MANIFEST_NAME);
    if !fs.exists(&manifest_path) {
        return Ok(Vec::new());
    }
    let text = fs.read(&manifest_path)?;
    if text.is_empty() {
        return Ok(Vec::new());
    }
    let mut lines: Vec<String> = text.split('\n').map(ToOwned::to_owned).collect();
    if lines.last().is_some_and(String::is_empty) {
        lines.pop();
    }
    Ok(lines)
}

/// Loads and reconciles a [`Store`] for `config`. See the module docs for
/// the full algorithm.
#[tracing::instrument(skip(fs, config), fields(store = %config.name))]
pub fn load_store(fs: &dyn Filesystem, config: &Config) -> Result<Store, ReconcileError> {
    config.validate().map_err(|err| ReconcileError::Load(err.into()))?;

    let home = fs.home_dir().map_err(|err| ReconcileError::Load(err.into()))?;
    let manifest =
        read_manifest(fs, &config.store_location).map_err(|err| ReconcileError::Load(err.into()))?;

    let declared_history: HashMap<&str, &str> =
        config.with_history.iter().map(|e| (e.path.as_str(), e.mnemonic.as_str())).collect();
    let declared_no_history: HashMap<&str, &str> =
        config.without_history.iter().map(|e| (e.path.as_str(), e.mnemonic.as_str())).collect();

    let mut seen: HashSet<String> = HashSet::new();
    let mut files = Vec::new();

    for path in &manifest {
        let hash = Checksum::of(path).hex();
        let base_dir = fs.join(&config.store_location, &hash);
        let abs_path = fs.join(&home, path);

        let (dot_file, in_store) = match DotFile::load_from_disk(fs, &base_dir, abs_path) {
            Ok(dot_file) => (Some(dot_file), true),
            Err(DotFileError::BasePathNotFound) => (None, false),
            Err(err) => return Err(ReconcileError::Load(err.into())),
        };

        let wants_history = declared_history.contains_key(path.as_str());
        let in_config = wants_history || declared_no_history.contains_key(path.as_str());

        match (in_config, in_store) {
            (true, true) => {
                let mut dot_file = dot_file.expect("in_store implies load succeeded");
                if dot_file.has_history() != wants_history {
                    if wants_history {
                        dot_file.init_history(Timestamp::now());
                    } else {
                        dot_file
                            .remove_history()
                            .map_err(|err| ReconcileError::Load(DotFileError::from(err).into()))?;
                    }
                    tracing::debug!(path, wants_history, "reconciler: toggled history mode");
                }
                files.push(dot_file);
                seen.insert(path.clone());
            }
            (false, true) => {
                fs.remove_dir_all(&base_dir).map_err(|err| ReconcileError::Load(err.into()))?;
                tracing::info!(path, "reconciler: garbage-collected orphaned directory");
            }
            (true, false) => {
                // Directory missing but config still wants it: treated as a
                // fresh addition in the pass below, same as any path never
                // seen before.
            }
            (false, false) => {
                return Err(ReconcileError::Load(ReconcileErrorKind::Inconsistent(path.clone())));
            }
        }
    }

    for (entries, want_history) in
        [(&config.with_history, true), (&config.without_history, false)]
    {
        for entry in entries {
            if seen.contains(&entry.path) {
                continue;
            }
            let abs_path = fs.join(&home, &entry.path);
            let dot_file =
                DotFile::new(fs, abs_path, entry.mnemonic.clone(), want_history, Timestamp::now())
                    .map_err(|err| ReconcileError::Load(err.into()))?;
            tracing::info!(path = %entry.path, want_history, "reconciler: adopted new file");
            files.push(dot_file);
        }
    }

    Ok(Store {
        name: config.name.clone(),
        path: config.store_location.clone(),
        files,
    })
}

/// Saves `store` back out: the manifest, then every per-file directory.
#[tracing::instrument(skip(fs, store), fields(store = %store.name))]
pub fn save_store(fs: &dyn Filesystem, store: &Store) -> Result<(), ReconcileError> {
    if fs.exists(&store.path) {
        if !fs.is_dir(&store.path) {
            return Err(ReconcileError::Save(ReconcileErrorKind::NotADirectory(store.path.clone())));
        }
    } else {
        fs.mkdir_all(&store.path).map_err(|err| ReconcileError::Save(err.into()))?;
    }

    let home = fs.home_dir().map_err(|err| ReconcileError::Save(err.into()))?;

    let mut manifest = String::new();
    for file in &store.files {
        manifest.push_str(&file.relative_path(&home));
        manifest.push('\n');
    }
    let manifest_path = fs.join(&store.path, MANIFEST_NAME);
    fs.write(&manifest_path, &manifest).map_err(|err| ReconcileError::Save(err.into()))?;

    for file in &store.files {
        let hash = file.relative_path_hash(&home);
        let dir = fs.join(&store.path, &hash);
        fs.mkdir_all(&dir).map_err(|err| ReconcileError::Save(err.into()))?;
        file.save_to_disk(fs, &dir).map_err(|err| ReconcileError::Save(err.into()))?;
        tracing::debug!(path = %file.relative_path(&home), "reconciler: saved file");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::config::FileEntry;
    use crate::fs::MemFilesystem;

    const HOME: &str = "/home/user";

    fn entry(path: &str, mnemonic: &str) -> FileEntry {
        FileEntry {
            path: path.to_owned(),
            mnemonic: mnemonic.to_owned(),
        }
    }

    fn config(with_history: Vec<FileEntry>, without_history: Vec<FileEntry>) -> Config {
        Config {
            name: "Linux".to_owned(),
            store_location: PathBuf::from("/home/user/.store"),
            with_history,
            without_history,
        }
    }

    fn seed_history_file(fs: &MemFilesystem, rel_path: &str, mnemonic: &str, content: &str) {
        let abs = PathBuf::from(HOME).join(rel_path);
        fs.write(&abs, content).unwrap();
        let dot_file = DotFile::new(fs, abs, mnemonic.to_owned(), true, Timestamp::now()).unwrap();
        let hash = Checksum::of(rel_path).hex();
        let dir = PathBuf::from(HOME).join(".store").join(hash);
        dot_file.save_to_disk(fs, &dir).unwrap();
    }

    fn append_manifest_line(fs: &MemFilesystem, line: &str) {
        let manifest_path = PathBuf::from(HOME).join(".store/paths");
        let mut existing = fs.read(&manifest_path).unwrap_or_default();
        existing.push_str(line);
        existing.push('\n');
        fs.write(&manifest_path, &existing).unwrap();
    }

    #[test]
    fn loads_matching_config_from_manifest() {
        let fs = MemFilesystem::new(HOME);
        seed_history_file(&fs, ".config/alacritty/alacritty.yml", "alacritty", "font: mono");
        append_manifest_line(&fs, ".config/alacritty/alacritty.yml");
        fs.write(&PathBuf::from(HOME).join(".tmux.conf"), "set -g mouse on").unwrap();

        let cfg = config(
            vec![entry(".config/alacritty/alacritty.yml", "alacritty")],
            vec![entry(".tmux.conf", "tmux")],
        );
        let store = load_store(&fs, &cfg).unwrap();

        assert_eq!(store.name(), "Linux");
        assert_eq!(store.path(), Path::new("/home/user/.store"));
        assert_eq!(store.files().len(), 2);
        assert!(store.find_by_path(Path::new("/home/user/.tmux.conf")).is_some());
        assert!(
            store
                .find_by_path(Path::new("/home/user/.config/alacritty/alacritty.yml"))
                .is_some()
        );
    }

    #[test]
    fn toggles_history_off_when_config_drops_it() {
        let fs = MemFilesystem::new(HOME);
        seed_history_file(&fs, ".tmux.conf", "tmux", "set -g mouse on");
        append_manifest_line(&fs, ".tmux.conf");

        let cfg = config(vec![], vec![entry(".tmux.conf", "tmux")]);
        let store = load_store(&fs, &cfg).unwrap();

        assert_eq!(store.files().len(), 1);
        let dot_file = store.find_by_path(Path::new("/home/user/.tmux.conf")).unwrap();
        assert!(!dot_file.has_history());
        assert_eq!(dot_file.current_content().unwrap(), "set -g mouse on");
    }

    #[test]
    fn garbage_collects_files_dropped_from_config() {
        let fs = MemFilesystem::new(HOME);
        seed_history_file(&fs, ".config/alacritty/alacritty.yml", "alacritty", "font: mono");
        append_manifest_line(&fs, ".config/alacritty/alacritty.yml");
        seed_history_file(&fs, ".tmux.conf", "tmux", "set -g mouse on");
        append_manifest_line(&fs, ".tmux.conf");

        let cfg = config(vec![entry(".config/alacritty/alacritty.yml", "alacritty")], vec![]);
        let store = load_store(&fs, &cfg).unwrap();

        assert_eq!(store.files().len(), 1);
        let gone_hash = Checksum::of(".tmux.conf").hex();
        let gone_dir = PathBuf::from(HOME).join(".store").join(gone_hash);
        assert!(!fs.exists(&gone_dir));
    }

    #[test]
    fn detects_inconsistent_manifest() {
        let fs = MemFilesystem::new(HOME);
        append_manifest_line(&fs, ".foo");

        let cfg = config(vec![], vec![]);
        let err = load_store(&fs, &cfg).unwrap_err();
        assert_matches!(
            err,
            ReconcileError::Load(ReconcileErrorKind::Inconsistent(ref path)) if path == ".foo"
        );
    }

    #[test]
    fn directory_missing_but_still_in_config_is_recreated_from_live_file() {
        let fs = MemFilesystem::new(HOME);
        seed_history_file(&fs, ".config/alacritty/alacritty.yml", "alacritty", "font: mono");
        append_manifest_line(&fs, ".config/alacritty/alacritty.yml");
        let hash = Checksum::of(".config/alacritty/alacritty.yml").hex();
        fs.remove_dir_all(&PathBuf::from(HOME).join(".store").join(hash)).unwrap();

        fs.write(&PathBuf::from(HOME).join(".config/alacritty/alacritty.yml"), "font: updated")
            .unwrap();

        let cfg = config(vec![entry(".config/alacritty/alacritty.yml", "alacritty")], vec![]);
        let store = load_store(&fs, &cfg).unwrap();

        assert_eq!(store.files().len(), 1);
        let dot_file =
            store.find_by_path(Path::new("/home/user/.config/alacritty/alacritty.yml")).unwrap();
        assert_eq!(dot_file.current_content().unwrap(), "font: updated");
    }

    #[test]
    fn adopts_new_files_not_yet_in_manifest() {
        let fs = MemFilesystem::new(HOME);
        fs.write(&PathBuf::from(HOME).join(".bashrc"), "export PATH=foo").unwrap();

        let cfg = config(vec![], vec![entry(".bashrc", "bash")]);
        let store = load_store(&fs, &cfg).unwrap();

        assert_eq!(store.files().len(), 1);
        let dot_file = store.find_by_path(Path::new("/home/user/.bashrc")).unwrap();
        assert!(!dot_file.has_history());
    }

    #[test]
    fn save_then_load_round_trip_is_idempotent() {
        let fs = MemFilesystem::new(HOME);
        fs.write(&PathBuf::from(HOME).join(".bashrc"), "export PATH=foo").unwrap();
        fs.write(&PathBuf::from(HOME).join(".tmux.conf"), "set -g mouse on").unwrap();

        let cfg =
            config(vec![entry(".tmux.conf", "tmux")], vec![entry(".bashrc", "bash")]);
        let store = load_store(&fs, &cfg).unwrap();
        save_store(&fs, &store).unwrap();

        let manifest_after_first_save = fs.read(&PathBuf::from(HOME).join(".store/paths")).unwrap();

        let reloaded = load_store(&fs, &cfg).unwrap();
        save_store(&fs, &reloaded).unwrap();
        let manifest_after_second_save = fs.read(&PathBuf::from(HOME).join(".store/paths")).unwrap();

        assert_eq!(manifest_after_first_save, manifest_after_second_save);
        assert_eq!(reloaded.files().len(), store.files().len());
    }

    #[test]
    fn rejects_invalid_config_before_touching_disk() {
        let fs = MemFilesystem::new(HOME);
        let cfg = config(vec![entry(".foo", "same")], vec![entry(".bar", "same")]);
        let err = load_store(&fs, &cfg).unwrap_err();
        assert_matches!(
            err,
            ReconcileError::Load(ReconcileErrorKind::Config(ConfigError::DuplicateMnemonic(_)))
        );
        assert!(!fs.exists(&PathBuf::from(HOME).join(".store")));
    }
}
