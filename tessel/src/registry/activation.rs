use super::{data_key, elementwise_global, tensor_features, KernelImpl, Priority, Registry};
use crate::capability::{CapabilityKey, Feature};
use crate::dispatch::Dispatch;
use crate::selector::KernelParams;
use crate::{DType, DeviceInfo, Format, PrimitiveKind, TesselError};

pub(crate) fn register(registry: &mut Registry) {
    registry.register(Box::new(ActivationRef));
    registry.register(Box::new(ActivationOpt));
}

struct ActivationRef;

impl KernelImpl for ActivationRef {
    fn name(&self) -> &'static str {
        "activation_gpu_ref"
    }

    fn kind(&self) -> PrimitiveKind {
        PrimitiveKind::Activation
    }

    fn supported_key(&self) -> CapabilityKey {
        tensor_features(data_key(
            &[DType::F16, DType::F32, DType::I8, DType::I32],
            &[Format::Bfyx, Format::Yxfb, Format::Byxf, Format::Fyxb, Format::Bfyx_f16],
        ))
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
        Dispatch::new(elementwise_global(params), device, bound)
    }
}

/// Dense unpadded tensors, four elements per work item
struct ActivationOpt;

impl KernelImpl for ActivationOpt {
    fn name(&self) -> &'static str {
        "activation_gpu_opt"
    }

    fn kind(&self) -> PrimitiveKind {
        PrimitiveKind::Activation
    }

    fn supported_key(&self) -> CapabilityKey {
        data_key(&[DType::F16, DType::F32], &[Format::Bfyx, Format::Yxfb, Format::Byxf])
            .enable_feature(Feature::Batching)
    }

    fn validate(&self, params: &KernelParams, _device: &DeviceInfo) -> bool {
        params.output.count() % 4 == 0
    }

    fn priority(&self, _params: &KernelParams) -> Priority {
        Priority::P6
    }

    fn dispatch(
        &self,
        params: &KernelParams,
        device: &DeviceInfo,
        _variant: usize,
        bound: usize,
    ) -> Result<Dispatch, TesselError> {
        Dispatch::new([params.output.count() / 4, 1, 1], device, bound)
    }
}
