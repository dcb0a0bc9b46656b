//! Tuning cache, persisted best kernel choices per device bucket and operation signature.
//!
//! File format:
//! ```json
//! { "<compute units>": { "<signature>": { "kernel": "<kernel name>", "variant": 0 } } }
//! ```
//! The cache is loaded once and read only during compilation. [`TuningFile`] is
//! used by the offline tuning workflow to write the file.

use crate::TesselError;
use nanoserde::{DeJson, SerJson};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Bucket used when the device has no bucket of its own
pub const DEFAULT_BUCKET: &str = "24";

/// Best kernel for one signature
#[derive(Debug, Clone, PartialEq, Eq, DeJson, SerJson)]
pub struct TunedKernel {
    /// Name of kernel implementation
    pub kernel: String,
    /// Tuning variant of the kernel
    pub variant: usize,
}

type Buckets = HashMap<String, HashMap<String, TunedKernel>>;

/// Outcome of loading the tuning cache. None of these stop compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLoadResult {
    /// Cache loaded, entries come from this bucket
    Ok {
        /// Bucket in use, device bucket or the default bucket
        bucket: String,
    },
    /// No cache file, or neither device bucket nor default bucket is in it
    NotFound,
    /// Cache file could not be read or parsed
    ParseError(Box<str>),
}

/// Tuning entries of one bucket
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TuningCache {
    bucket: Option<String>,
    entries: BTreeMap<String, TunedKernel>,
}

impl TuningCache {
    /// Cache without entries
    #[must_use]
    pub fn empty() -> TuningCache {
        TuningCache::default()
    }

    /// Loads cache file and picks device bucket, or the default bucket if
    /// the device bucket is missing. Failures give an empty cache.
    #[must_use]
    pub fn load(path: &Path, bucket: &str, default_bucket: &str) -> (TuningCache, CacheLoadResult) {
        match std::fs::read_to_string(path) {
            Ok(json) => TuningCache::parse(&json, bucket, default_bucket),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                (TuningCache::empty(), CacheLoadResult::NotFound)
            }
            Err(e) => (
                TuningCache::empty(),
                CacheLoadResult::ParseError(format!("{}: {e}", path.display()).into()),
            ),
        }
    }

    /// Same as [`TuningCache::load`], from json string
    #[must_use]
    pub fn parse(json: &str, bucket: &str, default_bucket: &str) -> (TuningCache, CacheLoadResult) {
        let mut buckets = match Buckets::deserialize_json(json) {
            Ok(buckets) => buckets,
            Err(e) => {
                return (TuningCache::empty(), CacheLoadResult::ParseError(e.to_string().into()));
            }
        };
        for name in [bucket, default_bucket] {
            if let Some(entries) = buckets.remove(name) {
                let cache = TuningCache { bucket: Some(name.into()), entries: entries.into_iter().collect() };
                return (cache, CacheLoadResult::Ok { bucket: name.into() });
            }
        }
        (TuningCache::empty(), CacheLoadResult::NotFound)
    }

    /// Entry for operation signature
    #[must_use]
    pub fn get(&self, signature: &str) -> Option<&TunedKernel> {
        self.entries.get(signature)
    }

    /// Bucket in use
    #[must_use]
    pub fn bucket(&self) -> Option<&str> {
        self.bucket.as_deref()
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Is the cache empty?
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Whole tuning file, all buckets, for writing results of tuning runs.
/// Must not be written while a compilation reads the same file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TuningFile {
    buckets: Buckets,
}

impl TuningFile {
    /// Reads tuning file, missing file gives empty tuning file
    pub fn load_or_default(path: &Path) -> Result<TuningFile, TesselError> {
        match std::fs::read_to_string(path) {
            Ok(json) => {
                let buckets = Buckets::deserialize_json(&json)
                    .map_err(|e| TesselError::parse_error(format!("{}: {e}", path.display())))?;
                Ok(TuningFile { buckets })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(TuningFile::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Stores best kernel for signature in bucket, replacing older entry
    pub fn insert(&mut self, bucket: &str, signature: &str, entry: TunedKernel) -> Option<TunedKernel> {
        self.buckets.entry(bucket.into()).or_default().insert(signature.into(), entry)
    }

    /// Entry for signature in bucket
    #[must_use]
    pub fn get(&self, bucket: &str, signature: &str) -> Option<&TunedKernel> {
        self.buckets.get(bucket)?.get(signature)
    }

    /// Serializes to json
    #[must_use]
    pub fn to_json(&self) -> String {
        self.buckets.serialize_json()
    }

    /// Writes tuning file
    pub fn save(&self, path: &Path) -> Result<(), TesselError> {
        std::fs::write(path, self.to_json())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn written_file_is_readable_by_cache() {
        let mut file = TuningFile::default();
        file.insert("24", "sig", TunedKernel { kernel: "convolution_gpu_ref".into(), variant: 0 });
        let old = file.insert("24", "sig", TunedKernel { kernel: "convolution_gpu_bfyx_gemm_like".into(), variant: 1 });
        assert_eq!(old.map(|e| e.variant), Some(0));
        let (cache, result) = TuningCache::parse(&file.to_json(), "24", DEFAULT_BUCKET);
        assert_eq!(result, CacheLoadResult::Ok { bucket: "24".into() });
        assert_eq!(cache.get("sig").map(|e| e.kernel.as_str()), Some("convolution_gpu_bfyx_gemm_like"));
    }

    #[test]
    fn configurable_default_bucket() {
        let json = r#"{"12": {"s": {"kernel": "k", "variant": 0}}}"#;
        let (cache, result) = TuningCache::parse(json, "48", "12");
        assert_eq!(result, CacheLoadResult::Ok { bucket: "12".into() });
        assert_eq!(cache.len(), 1);
        let (cache, result) = TuningCache::parse(json, "48", DEFAULT_BUCKET);
        assert_eq!(result, CacheLoadResult::NotFound);
        assert!(cache.is_empty());
    }
}
