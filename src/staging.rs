use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::debug;

use crate::error::{Error, Result};
use crate::records::RepositoryRecord;

/// Writes parsed pages as JSON Lines batches, one file per batch index.
#[derive(Debug, Clone)]
pub struct StagingWriter {
    dir: PathBuf,
}

impl StagingWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        StagingWriter { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn batch_path(&self, batch_index: usize) -> PathBuf {
        self.dir.join(format!("repo_{}.json", batch_index))
    }

    /// Replace the batch at `batch_index` with `records`.
    ///
    /// The batch is written beside the destination and renamed over it, so a
    /// failed write leaves the previous batch in place.
    pub fn write(&self, batch_index: usize, records: &[RepositoryRecord]) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir).map_err(|e| Error::io(&self.dir, e))?;

        let mut buf = Vec::new();
        for record in records {
            serde_json::to_writer(&mut buf, record)?;
            buf.push(b'\n');
        }

        let dest = self.batch_path(batch_index);
        let tmp = self.dir.join(format!(".repo_{}.json.tmp", batch_index));
        write_file(&tmp, &buf)?;
        fs::rename(&tmp, &dest).map_err(|e| Error::io(&dest, e))?;

        debug!("Staged {} records to {}", records.len(), dest.display());
        Ok(dest)
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = fs::File::create(path).map_err(|e| Error::io(path, e))?;
    file.write_all(bytes).map_err(|e| Error::io(path, e))?;
    file.sync_all().map_err(|e| Error::io(path, e))?;
    Ok(())
}

/// Staged batch files in `dir` whose names match `pattern`, sorted by path.
///
/// `pattern` is a file-name glob: `*` matches any run of characters, `?` a
/// single one. Hidden files never match. A missing directory has no batches.
pub fn staged_batches(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let re = glob_regex(pattern)?;

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(Error::io(dir, e)),
    };

    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| Error::io(dir, e))?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if name.starts_with('.') || !re.is_match(name) {
            continue;
        }
        if entry.file_type().map_err(|e| Error::io(entry.path(), e))?.is_file() {
            paths.push(entry.path());
        }
    }
    paths.sort();
    Ok(paths)
}

fn glob_regex(pattern: &str) -> Result<Regex> {
    let mut re = String::with_capacity(pattern.len() + 8);
    re.push('^');
    for c in pattern.chars() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            c => re.push_str(&regex::escape(&c.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).map_err(|source| Error::Pattern {
        pattern: pattern.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str) -> RepositoryRecord {
        RepositoryRecord::scraped(
            "octo-org",
            format!("https://github.com/octo-org/{}", name),
            name.to_string(),
        )
    }

    #[test]
    fn writes_one_json_object_per_line() {
        let tmp = tempfile::tempdir().unwrap();
        let writer = StagingWriter::new(tmp.path().join("extracted_data"));

        let path = writer.write(0, &[record("a"), record("b")]).unwrap();
        assert_eq!(path, tmp.path().join("extracted_data/repo_0.json"));

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["repository_name"], "a");
        assert_eq!(first["organization_name"], "octo-org");
        assert_eq!(first["num_prs"], "");
    }

    #[test]
    fn rewrite_replaces_batch() {
        let tmp = tempfile::tempdir().unwrap();
        let writer = StagingWriter::new(tmp.path());

        writer.write(3, &[record("a"), record("b"), record("c")]).unwrap();
        let path = writer.write(3, &[record("z")]).unwrap();

        let text = fs::read_to_string(path).unwrap();
        assert_eq!(text.lines().count(), 1);
        assert!(text.contains("\"z\""));
        assert_eq!(staged_batches(tmp.path(), "*.json").unwrap().len(), 1);
    }

    #[test]
    fn empty_batch_is_an_empty_file() {
        let tmp = tempfile::tempdir().unwrap();
        let writer = StagingWriter::new(tmp.path());
        let path = writer.write(0, &[]).unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "");
    }

    #[test]
    fn glob_selects_and_sorts() {
        let tmp = tempfile::tempdir().unwrap();
        for name in ["repo_1.json", "repo_0.json", "notes.txt", ".repo_2.json.tmp"] {
            fs::write(tmp.path().join(name), "").unwrap();
        }
        fs::create_dir(tmp.path().join("repo_9.json")).unwrap();

        let found = staged_batches(tmp.path(), "repo_*.json").unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, ["repo_0.json", "repo_1.json"]);

        assert_eq!(staged_batches(tmp.path(), "repo_?.json").unwrap().len(), 2);
        assert!(staged_batches(tmp.path(), "*.csv").unwrap().is_empty());
    }

    #[test]
    fn missing_dir_has_no_batches() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(staged_batches(&tmp.path().join("nope"), "*.json")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn glob_escapes_regex_metacharacters() {
        let re = glob_regex("repo_(1).json").unwrap();
        assert!(re.is_match("repo_(1).json"));
        assert!(!re.is_match("repo_1xjson"));
    }
}
