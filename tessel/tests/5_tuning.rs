use std::path::PathBuf;
use tessel::tuning::{CacheLoadResult, TunedKernel, TuningCache, TuningFile, DEFAULT_BUCKET};
use tessel::{DeviceInfo, Engine, EngineConfig, TesselError};

const CACHE: &str = r#"{
    "24": {
        "convolution|a": {"kernel": "convolution_gpu_bfyx_gemm_like", "variant": 0},
        "softmax|b": {"kernel": "softmax_gpu_bf", "variant": 0}
    },
    "12": {
        "convolution|a": {"kernel": "convolution_gpu_ref", "variant": 0}
    }
}"#;

fn temp_file(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("tessel_{}_{name}", std::process::id()))
}

#[test]
fn device_bucket_is_preferred() {
    let (cache, result) = TuningCache::parse(CACHE, "12", DEFAULT_BUCKET);
    assert_eq!(result, CacheLoadResult::Ok { bucket: "12".into() });
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.get("convolution|a").map(|e| e.kernel.as_str()), Some("convolution_gpu_ref"));
}

#[test]
fn missing_bucket_falls_back_to_default() {
    let (cache, result) = TuningCache::parse(CACHE, "48", DEFAULT_BUCKET);
    assert_eq!(result, CacheLoadResult::Ok { bucket: "24".into() });
    assert_eq!(cache.bucket(), Some("24"));
    assert_eq!(cache.len(), 2);
    assert!(cache.get("softmax|b").is_some());
}

#[test]
fn missing_file_and_bad_json() -> Result<(), TesselError> {
    let (cache, result) = TuningCache::load(&temp_file("does_not_exist.json"), "24", DEFAULT_BUCKET);
    assert_eq!(result, CacheLoadResult::NotFound);
    assert!(cache.is_empty());

    let path = temp_file("broken.json");
    std::fs::write(&path, "{\"24\": {\"x\": ")?;
    let (cache, result) = TuningCache::load(&path, "24", DEFAULT_BUCKET);
    std::fs::remove_file(&path)?;
    assert!(matches!(result, CacheLoadResult::ParseError(_)));
    assert!(cache.is_empty());
    Ok(())
}

#[test]
fn engine_reports_cache_status() -> Result<(), TesselError> {
    let path = temp_file("engine_cache.json");
    std::fs::write(&path, CACHE)?;
    let config = EngineConfig { tuning_cache_path: Some(path.clone()), ..Default::default() };
    let device = DeviceInfo { compute_units: 48, ..Default::default() };
    let engine = Engine::new(device, config);
    std::fs::remove_file(&path)?;
    assert_eq!(engine.cache_status(), &CacheLoadResult::Ok { bucket: "24".into() });
    assert_eq!(engine.cache().len(), 2);

    let engine = Engine::new(DeviceInfo::default(), EngineConfig::default());
    assert_eq!(engine.cache_status(), &CacheLoadResult::NotFound);
    Ok(())
}

#[test]
fn tuning_file_updates_survive_save() -> Result<(), TesselError> {
    let path = temp_file("tuning_file.json");
    let mut file = TuningFile::load_or_default(&path)?;
    assert!(file.get("24", "sig").is_none());
    file.insert("24", "sig", TunedKernel { kernel: "pooling_gpu_average_opt".into(), variant: 0 });
    file.insert("48", "sig", TunedKernel { kernel: "pooling_gpu_ref".into(), variant: 0 });
    file.save(&path)?;
    let loaded = TuningFile::load_or_default(&path)?;
    std::fs::remove_file(&path)?;
    assert_eq!(loaded, file);
    let (cache, _) = TuningCache::parse(&loaded.to_json(), "48", DEFAULT_BUCKET);
    assert_eq!(cache.get("sig").map(|e| e.kernel.as_str()), Some("pooling_gpu_ref"));
    Ok(())
}
