//! Media record collaborator interfaces.
//!
//! The metadata database itself is an external system; the pipeline only
//! needs a lookup before work (prior rendition markers, input date, supplier
//! for destination routing) and a result hand-off afterwards. Both sides of
//! that contract live here, together with a JSON-file-backed implementation
//! for deployments that stage record extracts on disk, and for tests.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Grouping marker on item records that routes output through the regional
/// archive supplier directories.
pub const VIDEO_DIGITISATION_GROUPING: &str = "H22: Video Digitisation: Item Outcomes";

/// Regional archive suppliers and their destination directory slugs.
/// Unlisted suppliers fall back to the default slug.
const SUPPLIERS: &[(&str, &str)] = &[
    ("East Anglian Film Archive", "eafa"),
    ("Imperial War Museum", "iwm"),
    ("London's Screen Archive", "lsa"),
    ("MACE", "mace"),
    ("North East Film Archive", "nefa"),
    ("Northern Ireland Screen", "nis"),
    ("Scottish Screen Archive", "nls"),
    ("National Screen and Sound Archive of Wales", "nssaw"),
    ("North West Film Archive", "nwfa"),
    ("Screen Archive South East", "sase"),
    ("Box, The", "thebox"),
    ("Wessex Film and Sound Archive", "wfsa"),
    ("Yorkshire Film Archive", "yfa"),
];

const DEFAULT_SLUG: &str = "bfi";

/// Media record fields the pipeline consumes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRecord {
    /// Record identifier, echoed back on update.
    pub id: String,
    /// Ingest date, `YYYY-MM-DD`.
    pub input_date: String,
    /// Prior full-size rendition name, when one was already written.
    #[serde(default)]
    pub largeimage: Option<String>,
    /// Prior thumbnail rendition name.
    #[serde(default)]
    pub thumbnail: Option<String>,
    /// Prior access MP4 rendition name.
    #[serde(default)]
    pub access_mp4: Option<String>,
    /// Acquisition source, used for supplier routing.
    #[serde(default)]
    pub supplier: Option<String>,
    /// Grouping markers from the item record.
    #[serde(default)]
    pub groupings: Vec<String>,
}

impl MediaRecord {
    /// Whether the record already carries all three rendition names for
    /// this source stem.
    pub fn has_all_renditions(&self, stem: &str) -> bool {
        let mp4_matches = self
            .access_mp4
            .as_deref()
            .is_some_and(|m| m.contains(stem));
        mp4_matches && self.largeimage.is_some() && self.thumbnail.is_some()
    }
}

/// Result handed back to the record updater at job end.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRecord {
    #[serde(default)]
    pub access_mp4: Option<String>,
    #[serde(default)]
    pub largeimage: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    pub success: bool,
    #[serde(default)]
    pub error_detail: Option<String>,
}

impl ResultRecord {
    pub fn failure(detail: impl Into<String>) -> Self {
        ResultRecord {
            success: false,
            error_detail: Some(detail.into()),
            ..Default::default()
        }
    }
}

/// Lookup and update against the external record store.
pub trait MediaRecords {
    /// Fetches the media record for a source by its original filename.
    fn lookup(&self, original_filename: &str) -> CoreResult<Option<MediaRecord>>;

    /// Hands the job result to the record store.
    fn update(&self, record_id: &str, result: &ResultRecord) -> CoreResult<()>;
}

/// Record store staged as one JSON document per source file in a directory:
/// `{original_filename}.json` for the record, with updates merged back into
/// the same document.
#[derive(Debug, Clone)]
pub struct JsonFileRecords {
    dir: PathBuf,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StagedRecord {
    #[serde(flatten)]
    record: MediaRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<ResultRecord>,
}

impl JsonFileRecords {
    pub fn new(dir: PathBuf) -> Self {
        JsonFileRecords { dir }
    }

    fn record_path(&self, original_filename: &str) -> PathBuf {
        self.dir.join(format!("{original_filename}.json"))
    }
}

impl MediaRecords for JsonFileRecords {
    fn lookup(&self, original_filename: &str) -> CoreResult<Option<MediaRecord>> {
        let path = self.record_path(original_filename);
        if !path.is_file() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&path)?;
        let staged: StagedRecord = serde_json::from_str(&raw)
            .map_err(|e| CoreError::Record(format!("record {}: {e}", path.display())))?;
        Ok(Some(staged.record))
    }

    fn update(&self, record_id: &str, result: &ResultRecord) -> CoreResult<()> {
        // The staged layout keys records by filename, so find the document
        // carrying this id and merge the result in.
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().map_or(true, |e| e != "json") {
                continue;
            }
            let raw = std::fs::read_to_string(&path)?;
            let Ok(mut staged) = serde_json::from_str::<StagedRecord>(&raw) else {
                continue;
            };
            if staged.record.id != record_id {
                continue;
            }
            if let Some(name) = &result.access_mp4 {
                staged.record.access_mp4 = Some(name.clone());
            }
            if let Some(name) = &result.largeimage {
                staged.record.largeimage = Some(name.clone());
            }
            if let Some(name) = &result.thumbnail {
                staged.record.thumbnail = Some(name.clone());
            }
            staged.result = Some(result.clone());
            let serialized = serde_json::to_string_pretty(&staged)
                .map_err(|e| CoreError::Record(format!("serialise record: {e}")))?;
            std::fs::write(&path, serialized)?;
            return Ok(());
        }
        Err(CoreError::Record(format!(
            "no staged record with id '{record_id}'"
        )))
    }
}

/// Destination slug for a supplier name; substring match against the known
/// archives, defaulting to the house slug.
pub fn supplier_slug(source: &str) -> &'static str {
    for (name, slug) in SUPPLIERS {
        if source.contains(name) {
            return slug;
        }
    }
    DEFAULT_SLUG
}

/// Year-month path component from a record input date (`YYYY-MM-DD` →
/// `YYYYMM`).
pub fn date_path(input_date: &str) -> CoreResult<String> {
    let digits: String = input_date.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() < 6 {
        return Err(CoreError::Record(format!(
            "input date too short for destination path: '{input_date}'"
        )));
    }
    Ok(digits[..6].to_string())
}

/// Destination subdirectory (below the transcode root) for a record:
/// supplier slug for grouped video digitisation items, house slug
/// otherwise, then the year-month of ingest.
pub fn destination_subdir(record: &MediaRecord) -> CoreResult<PathBuf> {
    let date = date_path(&record.input_date)?;
    let grouped = record
        .groupings
        .iter()
        .any(|g| g.contains(VIDEO_DIGITISATION_GROUPING));
    let slug = match (&record.supplier, grouped) {
        (Some(supplier), true) => supplier_slug(supplier),
        _ => DEFAULT_SLUG,
    };
    Ok(Path::new(slug).join(date))
}
