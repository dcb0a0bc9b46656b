use super::{data_key, tensor_features, KernelImpl, Priority, Registry};
use crate::capability::{CapabilityKey, Feature};
use crate::dispatch::Dispatch;
use crate::selector::KernelParams;
use crate::{DType, DeviceInfo, Format, PrimitiveKind, TesselError};

pub(crate) fn register(registry: &mut Registry) {
    registry.register(Box::new(SoftmaxRef));
    registry.register(Box::new(SoftmaxBf));
}

fn softmax_key() -> CapabilityKey {
    tensor_features(data_key(&[DType::F16, DType::F32], &[Format::Bfyx, Format::Yxfb]))
        .enable_feature(Feature::AxisFeature)
}

/// One work item per position, loops over features
struct SoftmaxRef;

impl KernelImpl for SoftmaxRef {
    fn name(&self) -> &'static str {
        "softmax_gpu_ref"
    }

    fn kind(&self) -> PrimitiveKind {
        PrimitiveKind::Softmax
    }

    fn supported_key(&self) -> CapabilityKey {
        softmax_key()
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
        let o = params.output.size;
        Dispatch::new([o.x(), o.y(), o.batch], device, bound)
    }
}

/// Features only, one sub-group of 16 reduces one batch
struct SoftmaxBf;

impl KernelImpl for SoftmaxBf {
    fn name(&self) -> &'static str {
        "softmax_gpu_bf"
    }

    fn kind(&self) -> PrimitiveKind {
        PrimitiveKind::Softmax
    }

    fn supported_key(&self) -> CapabilityKey {
        softmax_key()
    }

    fn validate(&self, params: &KernelParams, _device: &DeviceInfo) -> bool {
        params.output.size.spatial_count() == 1
    }

    fn priority(&self, _params: &KernelParams) -> Priority {
        Priority::P6
    }

    fn dispatch(
        &self,
        params: &KernelParams,
        device: &DeviceInfo,
        _variant: usize,
        _bound: usize,
    ) -> Result<Dispatch, TesselError> {
        Dispatch::with_local([params.output.size.batch * 16, 1, 1], [16, 1, 1], device)
    }
}
