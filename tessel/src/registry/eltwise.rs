use super::{data_key, elementwise_global, tensor_features, KernelImpl, Priority, Registry};
use crate::capability::{CapabilityKey, Feature};
use crate::dispatch::{round_up, Dispatch};
use crate::selector::KernelParams;
use crate::{DType, DeviceInfo, Format, PrimitiveKind, TesselError};

pub(crate) fn register(registry: &mut Registry) {
    registry.register(Box::new(EltwiseRef));
    registry.register(Box::new(EltwiseFsBsYxBsv4Fsv32));
    registry.register(Box::new(EltwiseVload8));
}

fn eltwise_features(key: CapabilityKey) -> CapabilityKey {
    key.enable_feature(Feature::FusedActivation).enable_feature(Feature::EltwiseCoefficients)
}

struct EltwiseRef;

impl KernelImpl for EltwiseRef {
    fn name(&self) -> &'static str {
        "eltwise_gpu_ref"
    }

    fn kind(&self) -> PrimitiveKind {
        PrimitiveKind::Eltwise
    }

    fn supported_key(&self) -> CapabilityKey {
        let key = data_key(
            &[DType::F16, DType::F32, DType::I8, DType::I32],
            &[Format::Bfyx, Format::Yxfb, Format::Byxf, Format::Fyxb, Format::Bfyx_f16],
        );
        eltwise_features(tensor_features(key))
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

/// Int8 in the batch and feature blocked format, one block of 4x32 per sub-group
struct EltwiseFsBsYxBsv4Fsv32;

impl KernelImpl for EltwiseFsBsYxBsv4Fsv32 {
    fn name(&self) -> &'static str {
        "eltwise_gpu_fs_bs_yx_bsv4_fsv32"
    }

    fn kind(&self) -> PrimitiveKind {
        PrimitiveKind::Eltwise
    }

    fn supported_key(&self) -> CapabilityKey {
        eltwise_features(tensor_features(data_key(&[DType::I8], &[Format::Fs_bs_yx_bsv4_fsv32])))
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
        let global = [o.spatial_count(), round_up(o.feature, 32) / 4, round_up(o.batch, 4)];
        let mut dispatch = Dispatch::new(global, device, bound)?;
        dispatch.padded = o.feature % 32 != 0 || o.batch % 4 != 0;
        Ok(dispatch)
    }
}

/// Dense unpadded tensors, eight elements per work item
struct EltwiseVload8;

impl KernelImpl for EltwiseVload8 {
    fn name(&self) -> &'static str {
        "eltwise_gpu_vload8"
    }

    fn kind(&self) -> PrimitiveKind {
        PrimitiveKind::Eltwise
    }

    fn supported_key(&self) -> CapabilityKey {
        data_key(&[DType::F16, DType::F32], &[Format::Bfyx, Format::Yxfb, Format::Byxf])
            .enable_feature(Feature::Batching)
            .enable_feature(Feature::FusedActivation)
    }

    fn validate(&self, params: &KernelParams, _device: &DeviceInfo) -> bool {
        let same_format = params.inputs.iter().all(|l| l.format == params.output.format);
        same_format && params.output.count() % 8 == 0
    }

    fn priority(&self, _params: &KernelParams) -> Priority {
        Priority::P8
    }

    fn dispatch(
        &self,
        params: &KernelParams,
        device: &DeviceInfo,
        _variant: usize,
        bound: usize,
    ) -> Result<Dispatch, TesselError> {
        Dispatch::new([params.output.count() / 8, 1, 1], device, bound)
    }
}
