//! Lazy scan of the catalog zip snapshot for booster descriptors.

use std::collections::VecDeque;
use std::io::{Cursor, Read};

use bytes::Bytes;
use pomwatch_shared::{CatalogEntry, PomwatchError, Result};
use serde::Deserialize;
use tracing::{debug, warn};
use zip::ZipArchive;

/// Member names that mark a booster descriptor inside the archive.
const DESCRIPTOR_MARKERS: [&str; 2] = ["booster.yaml", "common.yaml"];

/// An in-memory catalog archive, scanned lazily for descriptor entries.
#[derive(Debug)]
pub struct CatalogArchive {
    archive: ZipArchive<Cursor<Bytes>>,
}

impl CatalogArchive {
    /// Open a zip archive from raw bytes.
    pub fn from_bytes(bytes: Bytes) -> Result<Self> {
        let archive = ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| PomwatchError::parse(format!("invalid catalog archive: {e}")))?;
        Ok(Self { archive })
    }

    /// Number of members in the archive, descriptors and everything else.
    pub fn member_count(&self) -> usize {
        self.archive.len()
    }

    /// Iterate over (repository, ref) entries, reading one descriptor at a time.
    ///
    /// For each descriptor, environment ref overrides are yielded first in
    /// document order, followed by the top-level ref. Descriptors without a
    /// repository URL yield nothing; unparseable descriptors are logged at
    /// warn and skipped, and the scan continues.
    pub fn entries(&mut self) -> Entries<'_> {
        Entries {
            archive: &mut self.archive,
            index: 0,
            pending: VecDeque::new(),
        }
    }
}

/// Iterator over catalog entries. See [`CatalogArchive::entries`].
pub struct Entries<'a> {
    archive: &'a mut ZipArchive<Cursor<Bytes>>,
    index: usize,
    pending: VecDeque<CatalogEntry>,
}

impl Iterator for Entries<'_> {
    type Item = CatalogEntry;

    fn next(&mut self) -> Option<CatalogEntry> {
        loop {
            if let Some(entry) = self.pending.pop_front() {
                return Some(entry);
            }
            if self.index >= self.archive.len() {
                return None;
            }
            let index = self.index;
            self.index += 1;

            let mut member = match self.archive.by_index(index) {
                Ok(member) => member,
                Err(e) => {
                    warn!(index, error = %e, "skipping unreadable archive member");
                    continue;
                }
            };
            let name = member.name().to_string();
            if !is_descriptor(&name) {
                continue;
            }

            let mut raw = String::new();
            if let Err(e) = member.read_to_string(&mut raw) {
                warn!(member = %name, error = %e, "skipping unreadable descriptor");
                continue;
            }
            debug!(member = %name, "scanning catalog descriptor");
            self.pending = scan_descriptor(&name, &raw);
        }
    }
}

fn is_descriptor(name: &str) -> bool {
    DESCRIPTOR_MARKERS
        .iter()
        .any(|marker| name.contains(marker))
}

// ---------------------------------------------------------------------------
// Descriptor parsing
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct DescriptorDoc {
    #[serde(default)]
    source: SourceBlock,
    #[serde(default)]
    environment: serde_yaml::Mapping,
}

#[derive(Debug, Default, Deserialize)]
struct SourceBlock {
    #[serde(default)]
    git: GitBlock,
}

#[derive(Debug, Default, Deserialize)]
struct GitBlock {
    #[serde(default)]
    url: Option<String>,
    #[serde(default, rename = "ref")]
    git_ref: Option<String>,
}

/// Turn one descriptor document into its (repository, ref) entries.
fn scan_descriptor(name: &str, raw: &str) -> VecDeque<CatalogEntry> {
    let doc: DescriptorDoc = match serde_yaml::from_str(raw) {
        Ok(doc) => doc,
        Err(e) => {
            warn!(member = %name, error = %e, "skipping unparseable descriptor");
            return VecDeque::new();
        }
    };

    // No repository URL means nothing to publish from this descriptor.
    let Some(url) = doc.source.git.url else {
        return VecDeque::new();
    };

    let mut entries = VecDeque::new();
    for value in doc.environment.values() {
        if let Some(git_ref) = environment_ref(value) {
            entries.push_back(CatalogEntry::new(url.clone(), Some(git_ref)));
        }
    }
    entries.push_back(CatalogEntry::new(url, doc.source.git.git_ref));
    entries
}

/// Extract `source.git.ref` from one environment override, if declared.
fn environment_ref(value: &serde_yaml::Value) -> Option<String> {
    value
        .get("source")?
        .get("git")?
        .get("ref")?
        .as_str()
        .map(str::to_string)
}
