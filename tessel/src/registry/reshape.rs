use super::{tensor_features, KernelImpl, Priority, Registry};
use crate::capability::CapabilityKey;
use crate::dispatch::Dispatch;
use crate::selector::KernelParams;
use crate::{DeviceInfo, PrimitiveKind, TesselError};

pub(crate) fn register(registry: &mut Registry) {
    registry.register(Box::new(ReshapeRef));
}

/// Copy for reshapes that could not be done in place
struct ReshapeRef;

impl KernelImpl for ReshapeRef {
    fn name(&self) -> &'static str {
        "reshape_ref"
    }

    fn kind(&self) -> PrimitiveKind {
        PrimitiveKind::Reshape
    }

    fn supported_key(&self) -> CapabilityKey {
        let key = CapabilityKey::empty()
            .enable_all_dtypes()
            .enable_all_input_formats()
            .enable_all_output_formats();
        tensor_features(key)
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
        let i = params.input().size;
        Dispatch::new([i.spatial_count(), i.feature, i.batch], device, bound)
    }
}
