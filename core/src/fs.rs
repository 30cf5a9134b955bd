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

//! A narrow filesystem capability, injected explicitly rather than called
//! through global `std::fs` bindings, so the store reconciler (component D)
//! can be exercised against an in-memory double instead of a real home
//! directory.

use std::collections::BTreeMap;
use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;

use thiserror::Error;

#[derive(Debug, Error)]
#[error("cannot access {path}")]
pub struct PathError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

pub trait IoResultExt<T> {
    fn context(self, path: impl AsRef<Path>) -> Result<T, PathError>;
}

impl<T> IoResultExt<T> for io::Result<T> {
    fn context(self, path: impl AsRef<Path>) -> Result<T, PathError> {
        self.map_err(|source| PathError {
            path: path.as_ref().to_path_buf(),
            source,
        })
    }
}

/// The filesystem operations the store reconciler needs. Implemented by
/// [`OsFilesystem`] in production and by [`MemFilesystem`] in tests.
pub trait Filesystem {
    fn read(&self, path: &Path) -> Result<String, PathError>;
    fn write(&self, path: &Path, content: &str) -> Result<(), PathError>;
    fn mkdir_all(&self, path: &Path) -> Result<(), PathError>;
    fn remove_dir_all(&self, path: &Path) -> Result<(), PathError>;
    fn exists(&self, path: &Path) -> bool;
    fn is_dir(&self, path: &Path) -> bool;
    fn home_dir(&self) -> Result<PathBuf, HomeDirError>;

    fn join(&self, base: &Path, component: &str) -> PathBuf {
        base.join(component)
    }

    fn is_absolute(&self, path: &Path) -> bool {
        path.is_absolute()
    }
}

#[derive(Debug, Error)]
#[error("could not determine the user's home directory")]
pub struct HomeDirError;

/// Production implementation, backed by `std::fs` with atomic
/// (write-to-temp-then-rename) writes, and `etcetera` for home-directory
/// resolution.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsFilesystem;

impl Filesystem for OsFilesystem {
    fn read(&self, path: &Path) -> Result<String, PathError> {
        std::fs::read_to_string(path).context(path)
    }

    fn write(&self, path: &Path, content: &str) -> Result<(), PathError> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut temp_file = tempfile::NamedTempFile::new_in(dir).context(dir)?;
        std::io::Write::write_all(&mut temp_file, content.as_bytes()).context(path)?;
        persist_temp_file(temp_file, path).context(path)
    }

    fn mkdir_all(&self, path: &Path) -> Result<(), PathError> {
        std::fs::create_dir_all(path).context(path)
    }

    fn remove_dir_all(&self, path: &Path) -> Result<(), PathError> {
        match std::fs::remove_dir_all(path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).context(path),
        }
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn home_dir(&self) -> Result<PathBuf, HomeDirError> {
        etcetera::home_dir().map_err(|_| HomeDirError)
    }
}

/// Persists the temporary file after synchronizing its content, the same
/// way as a content-addressed write: flush, then rename into place.
fn persist_temp_file(temp_file: tempfile::NamedTempFile, new_path: &Path) -> io::Result<()> {
    temp_file.as_file().sync_data()?;
    temp_file
        .persist(new_path)
        .map(|_file| ())
        .map_err(|err| err.error)
}

/// In-memory double used by the reconciler's unit tests. A directory is
/// implicit: any path with a written descendant, or explicitly created via
/// [`Filesystem::mkdir_all`], "exists" as a directory.
#[cfg(any(test, feature = "testing"))]
#[derive(Default)]
pub struct MemFilesystem {
    files: Mutex<BTreeMap<PathBuf, String>>,
    dirs: Mutex<std::collections::BTreeSet<PathBuf>>,
    home: PathBuf,
}

#[cfg(any(test, feature = "testing"))]
impl MemFilesystem {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        let home = home.into();
        let dirs = std::collections::BTreeSet::from([home.clone()]);
        Self {
            files: Mutex::new(BTreeMap::new()),
            dirs: Mutex::new(dirs),
            home,
        }
    }

    fn ensure_ancestors(&self, path: &Path) {
        let mut dirs = self.dirs.lock().unwrap();
        let mut ancestor = path.parent();
        while let Some(dir) = ancestor {
            if !dirs.insert(dir.to_path_buf()) {
                break;
            }
            ancestor = dir.parent();
        }
    }
}

#[cfg(any(test, feature = "testing"))]
impl Filesystem for MemFilesystem {
    fn read(&self, path: &Path) -> Result<String, PathError> {
        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| PathError {
                path: path.to_path_buf(),
                source: io::Error::from(io::ErrorKind::NotFound),
            })
    }

    fn write(&self, path: &Path, content: &str) -> Result<(), PathError> {
        self.ensure_ancestors(path);
        self.files.lock().unwrap().insert(path.to_path_buf(), content.to_owned());
        Ok(())
    }

    fn mkdir_all(&self, path: &Path) -> Result<(), PathError> {
        self.ensure_ancestors(path);
        self.dirs.lock().unwrap().insert(path.to_path_buf());
        Ok(())
    }

    fn remove_dir_all(&self, path: &Path) -> Result<(), PathError> {
        self.files.lock().unwrap().retain(|p, _| !p.starts_with(path));
        self.dirs.lock().unwrap().retain(|p| !p.starts_with(path) || p == path.parent().unwrap_or(p));
        self.dirs.lock().unwrap().remove(path);
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.lock().unwrap().contains_key(path) || self.dirs.lock().unwrap().contains(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.dirs.lock().unwrap().contains(path)
    }

    fn home_dir(&self) -> Result<PathBuf, HomeDirError> {
        Ok(self.home.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mem_fs_write_then_read_roundtrips() {
        let fs = MemFilesystem::new("/home/user");
        let path = Path::new("/home/user/.config/dotted/store/foo/content");
        fs.mkdir_all(path.parent().unwrap()).unwrap();
        fs.write(path, "hello").unwrap();
        assert_eq!(fs.read(path).unwrap(), "hello");
        assert!(fs.exists(path));
    }

    #[test]
    fn mem_fs_remove_dir_all_drops_descendants() {
        let fs = MemFilesystem::new("/home/user");
        let dir = Path::new("/home/user/.config/dotted/store/foo");
        fs.write(&dir.join("content"), "x").unwrap();
        fs.remove_dir_all(dir).unwrap();
        assert!(!fs.exists(&dir.join("content")));
        assert!(!fs.is_dir(dir));
    }

    #[test]
    fn mem_fs_read_missing_file_is_an_error() {
        let fs = MemFilesystem::new("/home/user");
        assert!(fs.read(Path::new("/home/user/nope")).is_err());
    }
}
