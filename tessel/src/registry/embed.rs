use super::{data_key, tensor_features, KernelImpl, Priority, Registry};
use crate::capability::{CapabilityKey, Feature};
use crate::dispatch::Dispatch;
use crate::selector::KernelParams;
use crate::{DType, DeviceInfo, Format, PrimitiveKind, TesselError};

pub(crate) fn register(registry: &mut Registry) {
    registry.register(Box::new(EmbedRef));
}

/// One work item per (token, batch), loops over embedding width
struct EmbedRef;

impl KernelImpl for EmbedRef {
    fn name(&self) -> &'static str {
        "embed_gpu_ref"
    }

    fn kind(&self) -> PrimitiveKind {
        PrimitiveKind::Embed
    }

    fn supported_key(&self) -> CapabilityKey {
        tensor_features(data_key(&[DType::F16, DType::F32], &[Format::Bfyx]))
            .enable_input_dtype(DType::I32)
            .enable_weights_dtype(DType::F16)
            .enable_weights_dtype(DType::F32)
            .enable_feature(Feature::BiasPerFeature)
            .enable_feature(Feature::NonBiasTerm)
            .enable_feature(Feature::DifferentTypes)
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
        Dispatch::new([o.x(), o.batch, 1], device, bound)
    }
}
