use std::fs::{self, File};
use std::io::{BufRead, BufReader, Read};

use camino::{Utf8Path, Utf8PathBuf};
use flate2::read::GzDecoder;
use tempfile::Builder;

use crate::error::LoadError;

/// Path layout over the downloads directory holding the already-fetched
/// archive files. Network retrieval is out of scope; the store only resolves
/// and opens what a separate fetch step has put on disk.
#[derive(Debug, Clone)]
pub struct InputStore {
    downloads_root: Utf8PathBuf,
    sample_suffix: String,
}

impl InputStore {
    pub fn new(downloads_root: Utf8PathBuf, sample_suffix: &str) -> Self {
        Self {
            downloads_root,
            sample_suffix: sample_suffix.to_string(),
        }
    }

    pub fn downloads_root(&self) -> &Utf8Path {
        &self.downloads_root
    }

    /// GEO per-experiment sample metadata file, `<id><suffix>`.
    pub fn geo_sample_file(&self, experiment_id: &str) -> Option<Utf8PathBuf> {
        self.resolve(
            self.downloads_root
                .join(format!("{experiment_id}{}", self.sample_suffix)),
        )
    }

    pub fn ae_experiment_file(&self, experiment_id: &str) -> Option<Utf8PathBuf> {
        self.resolve(self.downloads_root.join(format!("{experiment_id}.json")))
    }

    pub fn ae_sample_file(&self, experiment_id: &str) -> Option<Utf8PathBuf> {
        self.resolve(
            self.downloads_root
                .join(format!("{experiment_id}.sdrf.txt")),
        )
    }

    /// The plain path if present, otherwise its `.gz` sibling.
    fn resolve(&self, path: Utf8PathBuf) -> Option<Utf8PathBuf> {
        if path.as_std_path().exists() {
            return Some(path);
        }
        let gz = Utf8PathBuf::from(format!("{path}.gz"));
        gz.as_std_path().exists().then_some(gz)
    }

    /// Opens a text input, transparently decoding `.gz` files.
    pub fn open_text(path: &Utf8Path) -> Result<Box<dyn BufRead>, LoadError> {
        let file =
            File::open(path.as_std_path()).map_err(|err| LoadError::Filesystem(err.to_string()))?;
        let reader: Box<dyn Read> = if path.extension() == Some("gz") {
            Box::new(GzDecoder::new(file))
        } else {
            Box::new(file)
        };
        Ok(Box::new(BufReader::new(reader)))
    }

    pub fn read_to_string(path: &Utf8Path) -> Result<String, LoadError> {
        let mut reader = Self::open_text(path)?;
        let mut content = String::new();
        reader
            .read_to_string(&mut content)
            .map_err(|err| LoadError::Filesystem(err.to_string()))?;
        Ok(content)
    }

    /// Writes via a temp file in the destination directory, then renames, so
    /// a half-written report never replaces a previous one.
    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), LoadError> {
        let parent = path
            .parent()
            .ok_or_else(|| LoadError::Filesystem("invalid destination path".to_string()))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| LoadError::Filesystem(err.to_string()))?;
        let mut temp = Builder::new()
            .prefix("ht-metaload")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| LoadError::Filesystem(err.to_string()))?;
        use std::io::Write;
        temp.write_all(content)
            .map_err(|err| LoadError::Filesystem(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| LoadError::Filesystem(err.to_string()))?;
        Ok(())
    }
}
