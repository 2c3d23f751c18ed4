//! Path Registry: an external list of known records, used to patch the slugs a
//! bounded discovery sample cannot see.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// One known record. Extra fields in the source are ignored by serde.
#[derive(Clone, Debug, Deserialize)]
pub struct RegistryRecord {
    pub uri: String,
}

pub trait PathRegistry: Send + Sync {
    fn records(&self) -> Result<Vec<RegistryRecord>>;
}

/// In-memory registry.
#[derive(Clone, Debug, Default)]
pub struct StaticRegistry {
    uris: Vec<String>,
}

impl StaticRegistry {
    pub fn new<I, S>(uris: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { uris: uris.into_iter().map(Into::into).collect() }
    }
}

impl PathRegistry for StaticRegistry {
    fn records(&self) -> Result<Vec<RegistryRecord>> {
        Ok(self.uris.iter().map(|uri| RegistryRecord { uri: uri.clone() }).collect())
    }
}

/// Registry backed by a JSON array of `{"uri": "..."}` objects.
#[derive(Clone, Debug)]
pub struct JsonRegistry {
    path: PathBuf,
}

impl JsonRegistry {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }
}

impl PathRegistry for JsonRegistry {
    fn records(&self) -> Result<Vec<RegistryRecord>> {
        let f = File::open(&self.path)
            .with_context(|| format!("open registry {}", self.path.display()))?;
        let records: Vec<RegistryRecord> = serde_json::from_reader(BufReader::new(f))
            .with_context(|| format!("parse registry {}", self.path.display()))?;
        Ok(records)
    }
}
