//! Writes buffered diagnostic dumps to disk.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use compilation::{Dump, DumpHandler};

/// Writes each dump of a released diagnostic context to its own file.
///
/// Files go to the context's own dump directory when it has one (retries
/// use `<output>/retry-dumps/<id>/`), otherwise to `<root>/<label>/`. Names
/// are `<seq>-<scope>-<label>.txt`.
#[derive(Debug, Clone)]
pub struct FileDumpHandler {
    root: PathBuf,
}

impl FileDumpHandler {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl DumpHandler for FileDumpHandler {
    fn flush(&self, label: &str, directory: Option<&Path>, dumps: Vec<Dump>) -> io::Result<()> {
        let directory = match directory {
            Some(dir) => dir.to_path_buf(),
            None => self.root.join(sanitize(label)),
        };
        fs::create_dir_all(&directory)?;

        // Keep numbering unique across several flushes into one directory.
        let offset = fs::read_dir(&directory)?.count();
        for (index, dump) in dumps.iter().enumerate() {
            let scope = if dump.scope.is_empty() {
                "task"
            } else {
                dump.scope.as_str()
            };
            let name = format!(
                "{:03}-{}-{}.txt",
                offset + index,
                sanitize(scope),
                sanitize(&dump.label)
            );
            fs::write(directory.join(name), &dump.contents)?;
        }
        tracing::debug!(
            id = label,
            count = dumps.len(),
            directory = %directory.display(),
            "dumps written"
        );
        Ok(())
    }
}

/// Replaces characters that are awkward in file names.
fn sanitize(part: &str) -> String {
    part.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '%') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
