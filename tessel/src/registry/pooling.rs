use super::{data_key, elementwise_global, tensor_features, KernelImpl, Priority, Registry};
use crate::capability::{CapabilityKey, Feature};
use crate::dispatch::{round_up, Dispatch};
use crate::selector::KernelParams;
use crate::{DType, DeviceInfo, Format, PoolingMode, PrimitiveKind, TesselError};

pub(crate) fn register(registry: &mut Registry) {
    registry.register(Box::new(PoolingRef));
    registry.register(Box::new(PoolingAverageOpt));
    registry.register(Box::new(PoolingBFsYxFsv4));
}

struct PoolingRef;

impl KernelImpl for PoolingRef {
    fn name(&self) -> &'static str {
        "pooling_gpu_ref"
    }

    fn kind(&self) -> PrimitiveKind {
        PrimitiveKind::Pooling
    }

    fn supported_key(&self) -> CapabilityKey {
        tensor_features(data_key(
            &[DType::F16, DType::F32, DType::I8, DType::U8],
            &[Format::Bfyx, Format::Yxfb, Format::Byxf],
        ))
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

/// Average of 3x3 windows with unit stride, rows of 16 outputs share loads
struct PoolingAverageOpt;

impl KernelImpl for PoolingAverageOpt {
    fn name(&self) -> &'static str {
        "pooling_gpu_average_opt"
    }

    fn kind(&self) -> PrimitiveKind {
        PrimitiveKind::Pooling
    }

    fn supported_key(&self) -> CapabilityKey {
        tensor_features(data_key(&[DType::F16, DType::F32], &[Format::Bfyx]))
            .enable_feature(Feature::InputPadding)
    }

    fn validate(&self, params: &KernelParams, _device: &DeviceInfo) -> bool {
        params
            .desc
            .as_pooling()
            .is_ok_and(|p| p.mode == PoolingMode::Average && p.size == [3, 3] && p.stride == [1, 1])
    }

    fn priority(&self, _params: &KernelParams) -> Priority {
        Priority::P7
    }

    fn dispatch(
        &self,
        params: &KernelParams,
        device: &DeviceInfo,
        _variant: usize,
        bound: usize,
    ) -> Result<Dispatch, TesselError> {
        let o = params.output.size;
        Dispatch::padded([o.x(), o.y(), o.feature * o.batch], [16, 1, 1], device, bound)
    }
}

/// Blocked int8 pooling, four features per work item
struct PoolingBFsYxFsv4;

impl KernelImpl for PoolingBFsYxFsv4 {
    fn name(&self) -> &'static str {
        "pooling_gpu_b_fs_yx_fsv4"
    }

    fn kind(&self) -> PrimitiveKind {
        PrimitiveKind::Pooling
    }

    fn supported_key(&self) -> CapabilityKey {
        tensor_features(data_key(&[DType::I8, DType::U8], &[Format::B_fs_yx_fsv4]))
            .enable_feature(Feature::InputPadding)
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
        let o = params.output.size;
        let mut dispatch = Dispatch::new([o.x(), o.y(), round_up(o.feature, 4) * o.batch], device, bound)?;
        dispatch.padded = o.feature % 4 != 0;
        Ok(dispatch)
    }
}
