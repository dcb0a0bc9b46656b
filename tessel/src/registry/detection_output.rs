use super::{data_key, KernelImpl, Priority, Registry};
use crate::capability::{CapabilityKey, Feature};
use crate::dispatch::Dispatch;
use crate::selector::KernelParams;
use crate::{DType, DeviceInfo, Format, PrimitiveKind, TesselError};

pub(crate) fn register(registry: &mut Registry) {
    registry.register(Box::new(DetectionOutputRef));
}

/// Decodes boxes and runs non maximum suppression, one work item per image
struct DetectionOutputRef;

impl KernelImpl for DetectionOutputRef {
    fn name(&self) -> &'static str {
        "detection_output_gpu_ref"
    }

    fn kind(&self) -> PrimitiveKind {
        PrimitiveKind::DetectionOutput
    }

    fn supported_key(&self) -> CapabilityKey {
        data_key(&[DType::F16, DType::F32], &[Format::Bfyx])
            .enable_feature(Feature::TensorOffset)
            .enable_feature(Feature::TensorPitches)
            .enable_feature(Feature::Batching)
    }

    fn priority(&self, _params: &KernelParams) -> Priority {
        Priority::FALLBACK
    }

    fn dispatch(
        &self,
        params: &KernelParams,
        device: &DeviceInfo,
        _variant: usize,
        bound: usize,
    ) -> Result<Dispatch, TesselError> {
        Dispatch::new([params.input().size.batch, 1, 1], device, bound)
    }
}
