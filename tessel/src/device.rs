use crate::capability::{CapabilityKey, Machine};
use crate::TesselError;
use nanoserde::{DeJson, SerJson};

/// Description of the target device. Built once by the caller (usually from
/// a device query or a json description) and passed to the engine.
#[derive(Debug, Clone, PartialEq, Eq, DeJson, SerJson)]
pub struct DeviceInfo {
    /// Number of compute units, used as the tuning cache bucket
    pub compute_units: u32,
    /// Maximum local work size threads
    pub max_local_threads: usize,
    /// Maximum local work size dimensions
    pub max_local_work_dims: Vec<usize>,
    /// Local memory size in bytes
    pub local_mem_size: usize,
    /// Half precision arithmetic
    pub supports_fp16: bool,
    /// Sub-group extension
    pub supports_subgroups: bool,
    /// Short sub-group block reads
    pub supports_subgroups_short: bool,
    /// Integer multiply accumulate
    pub supports_imad: bool,
    /// Image objects
    pub supports_image: bool,
}

impl Default for DeviceInfo {
    fn default() -> Self {
        DeviceInfo {
            compute_units: 24,
            max_local_threads: 256,
            max_local_work_dims: vec![256, 256, 256],
            local_mem_size: 65536,
            supports_fp16: true,
            supports_subgroups: true,
            supports_subgroups_short: true,
            supports_imad: false,
            supports_image: true,
        }
    }
}

impl DeviceInfo {
    /// Parse device description from json
    pub fn from_json(json: &str) -> Result<DeviceInfo, TesselError> {
        DeviceInfo::deserialize_json(json)
            .map_err(|e| TesselError::parse_error(format!("device description, {e}")))
    }

    /// Maximum local size per dimension, missing dimensions are 1
    #[must_use]
    pub fn local_dims(&self) -> [usize; 3] {
        let mut dims = [1; 3];
        for (d, x) in dims.iter_mut().zip(&self.max_local_work_dims) {
            *d = (*x).max(1);
        }
        dims
    }

    /// Name of tuning cache bucket of this device
    #[must_use]
    pub fn bucket(&self) -> String {
        self.compute_units.to_string()
    }

    /// Machine features of this device as capability key
    #[must_use]
    pub fn capability_key(&self) -> CapabilityKey {
        let mut key = CapabilityKey::empty();
        if self.supports_subgroups {
            key = key.enable_machine(Machine::SubGroup);
        }
        if self.supports_subgroups_short {
            key = key.enable_machine(Machine::SubGroupShort);
        }
        if self.supports_fp16 {
            key = key.enable_machine(Machine::Fp16);
        }
        if self.supports_imad {
            key = key.enable_machine(Machine::Imad);
        }
        if self.supports_image {
            key = key.enable_machine(Machine::Image);
        }
        key
    }
}

#[test]
fn device_from_json() -> Result<(), TesselError> {
    let device = DeviceInfo::from_json(
        r#"{"compute_units": 48, "max_local_threads": 512, "max_local_work_dims": [512, 512],
        "local_mem_size": 32768, "supports_fp16": false, "supports_subgroups": true,
        "supports_subgroups_short": false, "supports_imad": false, "supports_image": false}"#,
    )?;
    assert_eq!(device.bucket(), "48");
    assert_eq!(device.local_dims(), [512, 512, 1]);
    let key = device.capability_key();
    assert!(key.has_machine(Machine::SubGroup));
    assert!(!key.has_machine(Machine::Fp16));
    Ok(())
}
