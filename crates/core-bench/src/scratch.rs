//! Benchmark files that must not outlive the iteration that created them.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Remove `path`, treating an already-missing file as success.
pub(crate) fn discard(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => log::trace!("scratch: removed {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("scratch: failed to remove {}: {}", path.display(), e),
    }
}

/// A path whose file is removed on drop.
#[derive(Debug)]
pub struct ScratchFile(PathBuf);

impl ScratchFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        discard(&self.0);
    }
}

/// One scratch file per worker, named `<file>.<iteration>.<worker>.tmp`.
#[derive(Debug)]
pub struct ScratchFiles {
    files: Vec<ScratchFile>,
}

impl ScratchFiles {
    pub fn new(dir: &Path, file_name: &str, iteration: usize, workers: usize) -> Self {
        let files = (0..workers)
            .map(|worker| ScratchFile::new(dir.join(format!("{file_name}.{iteration}.{worker}.tmp"))))
            .collect();
        Self { files }
    }

    pub fn path(&self, worker: usize) -> &Path {
        self.files[worker].path()
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.files.iter().map(ScratchFile::path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
