use super::{data_key, elementwise_global, tensor_features, KernelImpl, Priority, Registry};
use crate::capability::{CapabilityKey, Feature};
use crate::dispatch::Dispatch;
use crate::selector::KernelParams;
use crate::{DType, DeviceInfo, Format, PrimitiveKind, TesselError};

pub(crate) fn register(registry: &mut Registry) {
    registry.register(Box::new(DeconvolutionRef));
}

struct DeconvolutionRef;

impl KernelImpl for DeconvolutionRef {
    fn name(&self) -> &'static str {
        "deconvolution_gpu_ref"
    }

    fn kind(&self) -> PrimitiveKind {
        PrimitiveKind::Deconvolution
    }

    fn supported_key(&self) -> CapabilityKey {
        tensor_features(data_key(&[DType::F16, DType::F32], &[Format::Bfyx, Format::Yxfb]))
            .enable_weights_dtype(DType::F16)
            .enable_weights_dtype(DType::F32)
            .enable_feature(Feature::SplitSupport)
            .enable_feature(Feature::Grouped)
            .enable_feature(Feature::BiasPerFeature)
            .enable_feature(Feature::NonBiasTerm)
            .enable_feature(Feature::FusedActivation)
            .enable_feature(Feature::InputPadding)
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
