//! Core types for archive-worker

use crate::error::{ItemError, Result};
use crate::targets::ItemType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Extension of the compressed capture produced by the downloader
pub const WARC_GZ_EXTENSION: &str = "warc.gz";

/// Extension of an uncompressed capture (a misbuilt downloader)
pub const WARC_EXTENSION: &str = "warc";

/// One unit of work flowing through the pipeline.
///
/// Identity fields are fixed when the item is claimed. The staging fields start
/// empty and are filled in by the stages in order; `stats` is filled in after
/// the fetch. `extra` carries stage-specific accounting that has no fixed field.
#[derive(Clone, Debug)]
pub struct WorkItem {
    name: String,
    item_type: ItemType,
    value: String,
    data_dir: PathBuf,

    /// Per-item scratch directory (set by the prepare stage)
    pub item_dir: Option<PathBuf>,
    /// Base name of the WARC file, without extension (set by the prepare stage)
    pub warc_file_base: Option<String>,
    /// Final location of the artifact once it has left `item_dir`
    pub artifact: Option<PathBuf>,
    /// Accounting data reported to the tracker
    pub stats: Option<ItemStats>,
    /// Open extension map for stage-specific data
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl WorkItem {
    /// Build an item from a claimed name of the form `<type>:<value>`.
    ///
    /// Names with no separator, more than one separator, an empty part, or an
    /// unknown type are rejected before any stage sees them.
    pub fn new(name: &str, data_dir: impl Into<PathBuf>) -> Result<Self> {
        let malformed = || ItemError::MalformedName {
            name: name.to_string(),
        };

        let (kind, value) = name.split_once(':').ok_or_else(malformed)?;
        if kind.is_empty() || value.is_empty() || value.contains(':') {
            return Err(malformed().into());
        }
        let item_type: ItemType = kind.parse()?;

        Ok(Self {
            name: name.to_string(),
            item_type,
            value: value.to_string(),
            data_dir: data_dir.into(),
            item_dir: None,
            warc_file_base: None,
            artifact: None,
            stats: None,
            extra: BTreeMap::new(),
        })
    }

    /// Name as assigned by the tracker
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parsed item type
    pub fn item_type(&self) -> ItemType {
        self.item_type
    }

    /// Type-specific key (user name or prefix)
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Shared staging root
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Fetch targets for this item, recomputed on every call
    pub fn targets(&self) -> Vec<String> {
        self.item_type.targets(&self.value)
    }

    /// Scratch directory, or an error if the prepare stage has not run
    pub fn require_item_dir(&self) -> Result<&Path> {
        self.item_dir
            .as_deref()
            .ok_or_else(|| self.missing("item_dir"))
    }

    /// WARC base name, or an error if the prepare stage has not run
    pub fn require_warc_file_base(&self) -> Result<&str> {
        self.warc_file_base
            .as_deref()
            .ok_or_else(|| self.missing("warc_file_base"))
    }

    /// Where the downloader writes the compressed capture
    pub fn staged_artifact_path(&self) -> Result<PathBuf> {
        Ok(self.require_item_dir()?.join(format!(
            "{}.{WARC_GZ_EXTENSION}",
            self.require_warc_file_base()?
        )))
    }

    /// Where a downloader without zlib support would write instead
    pub fn uncompressed_artifact_path(&self) -> Result<PathBuf> {
        Ok(self.require_item_dir()?.join(format!(
            "{}.{WARC_EXTENSION}",
            self.require_warc_file_base()?
        )))
    }

    /// Path passed to the downloader's `--warc-file` (it adds the extension itself)
    pub fn warc_prefix_path(&self) -> Result<PathBuf> {
        Ok(self
            .require_item_dir()?
            .join(self.require_warc_file_base()?))
    }

    /// Final artifact location inside `data_dir`
    pub fn final_artifact_path(&self) -> Result<PathBuf> {
        Ok(self.data_dir.join(format!(
            "{}.{WARC_GZ_EXTENSION}",
            self.require_warc_file_base()?
        )))
    }

    fn missing(&self, field: &'static str) -> crate::error::Error {
        ItemError::MissingField {
            item: self.name.clone(),
            field,
        }
        .into()
    }
}

/// Accounting payload sent to the tracker with the done signal
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemStats {
    /// Downloader nickname
    pub downloader: String,
    /// Pipeline version string
    pub version: String,
    /// Byte counts per file group (e.g. `"data"`)
    pub bytes: BTreeMap<String, u64>,
    /// Provenance identifiers for the code that produced the capture
    pub id: ProvenanceId,
    /// Additional fields merged into the payload as-is
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Provenance identifiers attached to every done report
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenanceId {
    /// Hash of the pipeline configuration
    pub pipeline_hash: String,
    /// Hash of the downloader's fetch-policy script
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_hash: Option<String>,
    /// Version of the worker binary
    pub runtime_version: String,
}

/// Events emitted by the pipeline engine
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// An item was claimed from the tracker
    ItemClaimed {
        /// Item name
        item: String,
    },
    /// A claimed item was unusable and dropped before any stage ran
    ItemRejected {
        /// Item name
        item: String,
        /// Why it was rejected
        reason: String,
    },
    /// A stage started for an item
    StageStarted {
        /// Item name
        item: String,
        /// Stage name
        stage: &'static str,
    },
    /// A stage finished successfully for an item
    StageCompleted {
        /// Item name
        item: String,
        /// Stage name
        stage: &'static str,
    },
    /// Every stage succeeded and the tracker acknowledged the item
    ItemCompleted {
        /// Item name
        item: String,
    },
    /// A stage failed and the item was cleaned up without reporting done
    ItemAbandoned {
        /// Item name
        item: String,
        /// Stage that failed
        stage: &'static str,
        /// Error message
        error: String,
    },
    /// The tracker had nothing to hand out
    NoWorkAvailable,
}
