use super::{data_key, tensor_features, KernelImpl, Priority, Registry};
use crate::capability::{CapabilityKey, Feature};
use crate::dispatch::Dispatch;
use crate::selector::KernelParams;
use crate::{DType, DeviceInfo, Format, PrimitiveKind, TesselError};

pub(crate) fn register(registry: &mut Registry) {
    registry.register(Box::new(ConcatenationRef));
    registry.register(Box::new(ConcatenationDepthBfyxNoPitch));
    registry.register(Box::new(ConcatenationBfzyxRef));
}

/// Largest input, every launch copies one input to its offset
fn largest_input(params: &KernelParams) -> [usize; 3] {
    let mut global = [1; 3];
    for input in &params.inputs {
        let s = input.size;
        let g = [s.spatial_count(), s.feature, s.batch];
        for d in 0..3 {
            global[d] = global[d].max(g[d]);
        }
    }
    global
}

struct ConcatenationRef;

impl KernelImpl for ConcatenationRef {
    fn name(&self) -> &'static str {
        "concatenation_gpu_ref"
    }

    fn kind(&self) -> PrimitiveKind {
        PrimitiveKind::Concatenation
    }

    fn supported_key(&self) -> CapabilityKey {
        tensor_features(data_key(
            &[DType::F16, DType::F32, DType::I8, DType::I32],
            &[Format::Bfyx, Format::Yxfb, Format::Byxf, Format::Fyxb],
        ))
        .enable_feature(Feature::AxisBatch)
        .enable_feature(Feature::AxisFeature)
        .enable_feature(Feature::AxisX)
        .enable_feature(Feature::AxisY)
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
        Dispatch::new(largest_input(params), device, bound)
    }
}

/// Reference kernel of 5D tensors, z is folded into the spatial work items
struct ConcatenationBfzyxRef;

impl KernelImpl for ConcatenationBfzyxRef {
    fn name(&self) -> &'static str {
        "concatenation_gpu_bfzyx_ref"
    }

    fn kind(&self) -> PrimitiveKind {
        PrimitiveKind::Concatenation
    }

    fn supported_key(&self) -> CapabilityKey {
        tensor_features(data_key(&[DType::F16, DType::F32, DType::I8, DType::I32], &[Format::Bfzyx]))
            .enable_feature(Feature::AxisBatch)
            .enable_feature(Feature::AxisFeature)
            .enable_feature(Feature::AxisX)
            .enable_feature(Feature::AxisY)
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
        Dispatch::new(largest_input(params), device, bound)
    }
}

/// Feature concatenation of dense bfyx tensors, plain copies
struct ConcatenationDepthBfyxNoPitch;

impl KernelImpl for ConcatenationDepthBfyxNoPitch {
    fn name(&self) -> &'static str {
        "concatenation_gpu_depth_bfyx_no_pitch"
    }

    fn kind(&self) -> PrimitiveKind {
        PrimitiveKind::Concatenation
    }

    fn supported_key(&self) -> CapabilityKey {
        data_key(&[DType::F16, DType::F32], &[Format::Bfyx])
            .enable_feature(Feature::Batching)
            .enable_feature(Feature::AxisFeature)
    }

    fn priority(&self, _params: &KernelParams) -> Priority {
        Priority::P1
    }

    fn dispatch(
        &self,
        params: &KernelParams,
        device: &DeviceInfo,
        _variant: usize,
        bound: usize,
    ) -> Result<Dispatch, TesselError> {
        let elements = params.inputs.iter().map(|l| l.count() / l.size.batch.max(1)).max().unwrap_or(1);
        Dispatch::padded([elements, params.output.size.batch, 1], [16, 1, 1], device, bound)
    }
}
