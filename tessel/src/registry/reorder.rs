use super::{tensor_features, KernelImpl, Priority, Registry};
use crate::capability::{CapabilityKey, Feature};
use crate::dispatch::Dispatch;
use crate::selector::KernelParams;
use crate::{DType, DeviceInfo, Format, PrimitiveKind, TesselError};

pub(crate) fn register(registry: &mut Registry) {
    registry.register(Box::new(ReorderData));
    registry.register(Box::new(ReorderDataFastB1));
    registry.register(Box::new(ReorderWeights));
}

fn data_formats() -> impl Iterator<Item = Format> {
    Format::ALL.into_iter().filter(|f| !f.is_weights())
}

/// Any data format and type to any data format and type
fn conversion_key() -> CapabilityKey {
    let mut key = CapabilityKey::empty().enable_all_dtypes();
    for format in data_formats() {
        key = key.enable_input_format(format).enable_output_format(format);
    }
    tensor_features(key).enable_feature(Feature::DifferentTypes)
}

struct ReorderData;

impl KernelImpl for ReorderData {
    fn name(&self) -> &'static str {
        "reorder_data"
    }

    fn kind(&self) -> PrimitiveKind {
        PrimitiveKind::Reorder
    }

    fn supported_key(&self) -> CapabilityKey {
        conversion_key()
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

/// Single batch, one linear index per work item
struct ReorderDataFastB1;

impl KernelImpl for ReorderDataFastB1 {
    fn name(&self) -> &'static str {
        "reorder_data_fast_b1"
    }

    fn kind(&self) -> PrimitiveKind {
        PrimitiveKind::Reorder
    }

    fn supported_key(&self) -> CapabilityKey {
        conversion_key()
    }

    fn validate(&self, params: &KernelParams, _device: &DeviceInfo) -> bool {
        params.input().size.batch == 1 && params.output.size.batch == 1
    }

    fn priority(&self, _params: &KernelParams) -> Priority {
        Priority::P5
    }

    fn dispatch(
        &self,
        params: &KernelParams,
        device: &DeviceInfo,
        _variant: usize,
        bound: usize,
    ) -> Result<Dispatch, TesselError> {
        Dispatch::padded([params.output.count(), 1, 1], [16, 1, 1], device, bound)
    }
}

/// Plain weights to the blocked weights format a kernel reads
struct ReorderWeights;

impl KernelImpl for ReorderWeights {
    fn name(&self) -> &'static str {
        "reorder_weights"
    }

    fn kind(&self) -> PrimitiveKind {
        PrimitiveKind::Reorder
    }

    fn supported_key(&self) -> CapabilityKey {
        let mut key = CapabilityKey::empty();
        for dtype in [DType::F16, DType::F32, DType::I8] {
            key = key.enable_input_dtype(dtype).enable_output_dtype(dtype);
        }
        for format in Format::PLAIN {
            key = key.enable_input_format(format);
        }
        for format in Format::ALL.into_iter().filter(Format::is_weights) {
            key = key.enable_output_format(format);
        }
        tensor_features(key).enable_feature(Feature::WeightsReorder)
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
        let w = params.input().size;
        Dispatch::new([w.batch, w.feature, w.spatial_count()], device, bound)
    }
}
