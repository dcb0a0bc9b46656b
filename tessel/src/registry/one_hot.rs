use super::{elementwise_global, KernelImpl, Priority, Registry};
use crate::capability::{CapabilityKey, Feature};
use crate::dispatch::Dispatch;
use crate::selector::KernelParams;
use crate::{DType, DeviceInfo, Format, PrimitiveKind, TesselError};

pub(crate) fn register(registry: &mut Registry) {
    registry.register(Box::new(OneHotRef));
}

struct OneHotRef;

impl KernelImpl for OneHotRef {
    fn name(&self) -> &'static str {
        "one_hot_ref"
    }

    fn kind(&self) -> PrimitiveKind {
        PrimitiveKind::OneHot
    }

    fn supported_key(&self) -> CapabilityKey {
        let mut key = CapabilityKey::empty()
            .enable_input_format(Format::Bfyx)
            .enable_output_format(Format::Bfyx)
            .enable_feature(Feature::TensorOffset)
            .enable_feature(Feature::TensorPitches)
            .enable_feature(Feature::Batching);
        for dtype in [DType::I8, DType::U8, DType::I32, DType::I64, DType::F16, DType::F32] {
            key = key.enable_input_dtype(dtype).enable_output_dtype(dtype);
        }
        key.enable_feature(Feature::DifferentTypes)
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
