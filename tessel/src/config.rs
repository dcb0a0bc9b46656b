use crate::DebugMask;
use nanoserde::DeJson;
use std::path::PathBuf;

/// Contents of `tessel/config.json`, every field is optional
#[derive(Debug, Default, DeJson)]
struct ConfigFile {
    tuning_cache_path: Option<String>,
    default_bucket: Option<String>,
    optimize_data: Option<bool>,
    meaningful_kernel_names: Option<bool>,
    forced_kernel: Option<String>,
    local_size_bound: Option<usize>,
}

/// Engine configuration, passed explicitly to the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Tuning cache file, None means no cache
    pub tuning_cache_path: Option<PathBuf>,
    /// Bucket used when the device compute unit count has no bucket in the cache
    pub default_bucket: String,
    /// Pick input formats by performance preference (blocked formats)
    pub optimize_data: bool,
    /// Name kernel entry points after primitives instead of kernels
    pub meaningful_kernel_names: bool,
    /// Use this kernel whenever it is a valid candidate, debugging aid
    pub forced_kernel: Option<String>,
    /// Upper bound of local work size per dimension
    pub local_size_bound: usize,
    /// Debug output
    pub debug: DebugMask,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            tuning_cache_path: None,
            default_bucket: crate::tuning::DEFAULT_BUCKET.into(),
            optimize_data: false,
            meaningful_kernel_names: false,
            forced_kernel: None,
            local_size_bound: 32,
            debug: DebugMask::default(),
        }
    }
}

impl EngineConfig {
    /// Reads configuration from environment and from `tessel/config.json`
    /// in config directories. Anything missing falls back to defaults.
    ///
    /// `TESSEL_DEBUG` sets debug mask, `TESSEL_TUNING_CACHE` sets path to tuning cache.
    /// When neither config nor environment names a tuning cache,
    /// `tessel/cache.json` next to the config file is used.
    #[must_use]
    pub fn load() -> EngineConfig {
        let debug = DebugMask::from_env();
        let mut config = EngineConfig { debug, ..Default::default() };
        let mut config_dir = None;

        // Search through config directories and find tessel/config.json
        // If not found or failed to parse, use defaults.
        let file = xdg::BaseDirectories::new()
            .map_err(|e| {
                if debug.dev() {
                    println!("Failed to find config directories for config.json, {e}");
                }
            })
            .ok()
            .map(|bd| {
                let mut dirs = bd.get_config_dirs();
                dirs.push(bd.get_config_home());
                dirs
            })
            .and_then(|paths| {
                paths.into_iter().find_map(|mut path| {
                    path.push("tessel/config.json");
                    let file = std::fs::read_to_string(&path).ok()?;
                    path.pop();
                    config_dir = Some(path);
                    Some(file)
                })
            })
            .and_then(|file| {
                ConfigFile::deserialize_json(&file)
                    .map_err(|e| {
                        if debug.dev() {
                            println!("Failed to parse config.json, {e}");
                        }
                    })
                    .ok()
            })
            .inspect(|_| {
                if debug.dev() {
                    println!("Engine config successfully read and parsed.");
                }
            })
            .unwrap_or_else(|| {
                if debug.dev() {
                    println!("Failed to get engine config, using defaults.");
                }
                ConfigFile::default()
            });
        config.apply(file);

        if let Ok(path) = std::env::var("TESSEL_TUNING_CACHE") {
            config.tuning_cache_path = Some(path.into());
        }
        if config.tuning_cache_path.is_none() {
            if let Some(mut path) = config_dir {
                path.push("cache.json");
                config.tuning_cache_path = Some(path);
            }
        }
        config
    }

    /// Parses configuration from json, missing fields keep their defaults
    pub fn from_json(json: &str) -> Result<EngineConfig, crate::TesselError> {
        let file = ConfigFile::deserialize_json(json)
            .map_err(|e| crate::TesselError::parse_error(format!("engine config, {e}")))?;
        let mut config = EngineConfig::default();
        config.apply(file);
        Ok(config)
    }

    fn apply(&mut self, file: ConfigFile) {
        if let Some(path) = file.tuning_cache_path {
            self.tuning_cache_path = Some(path.into());
        }
        if let Some(bucket) = file.default_bucket {
            self.default_bucket = bucket;
        }
        if let Some(x) = file.optimize_data {
            self.optimize_data = x;
        }
        if let Some(x) = file.meaningful_kernel_names {
            self.meaningful_kernel_names = x;
        }
        if file.forced_kernel.is_some() {
            self.forced_kernel = file.forced_kernel;
        }
        if let Some(x) = file.local_size_bound {
            self.local_size_bound = x.max(1);
        }
    }
}

#[test]
fn partial_config_keeps_defaults() -> Result<(), crate::TesselError> {
    let config = EngineConfig::from_json(r#"{"optimize_data": true, "default_bucket": "12"}"#)?;
    assert!(config.optimize_data);
    assert_eq!(config.default_bucket, "12");
    assert_eq!(config.local_size_bound, 32);
    assert!(config.forced_kernel.is_none());
    Ok(())
}
