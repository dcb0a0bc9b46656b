use super::{data_key, tensor_features, KernelImpl, Priority, Registry};
use crate::capability::{CapabilityKey, Feature, Machine};
use crate::dispatch::{round_up, Dispatch};
use crate::selector::KernelParams;
use crate::{DType, DeviceInfo, Format, PrimitiveKind, TesselError};

pub(crate) fn register(registry: &mut Registry) {
    registry.register(Box::new(FullyConnectedRef));
    registry.register(Box::new(FullyConnectedYxfbRef));
    registry.register(Box::new(FullyConnectedBfIoGemm));
}

fn fully_connected_key(formats: &[Format]) -> CapabilityKey {
    tensor_features(data_key(&[DType::F16, DType::F32], formats))
        .enable_weights_dtype(DType::F16)
        .enable_weights_dtype(DType::F32)
        .enable_feature(Feature::BiasPerFeature)
        .enable_feature(Feature::NonBiasTerm)
        .enable_feature(Feature::FusedActivation)
}

fn output_global(params: &KernelParams) -> [usize; 3] {
    let o = params.output.size;
    [o.feature, o.batch, 1]
}

struct FullyConnectedRef;

impl KernelImpl for FullyConnectedRef {
    fn name(&self) -> &'static str {
        "fully_connected_gpu_ref"
    }

    fn kind(&self) -> PrimitiveKind {
        PrimitiveKind::FullyConnected
    }

    fn supported_key(&self) -> CapabilityKey {
        fully_connected_key(&[Format::Bfyx, Format::Yxfb])
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
        Dispatch::new(output_global(params), device, bound)
    }
}

/// Batch innermost, reads eight batches per load
struct FullyConnectedYxfbRef;

impl KernelImpl for FullyConnectedYxfbRef {
    fn name(&self) -> &'static str {
        "fully_connected_gpu_yxfb_ref"
    }

    fn kind(&self) -> PrimitiveKind {
        PrimitiveKind::FullyConnected
    }

    fn supported_key(&self) -> CapabilityKey {
        fully_connected_key(&[Format::Yxfb])
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
        Dispatch::new(output_global(params), device, bound)
    }
}

/// Single batch gemm, 16 output features per sub-group
struct FullyConnectedBfIoGemm;

impl KernelImpl for FullyConnectedBfIoGemm {
    fn name(&self) -> &'static str {
        "fully_connected_gpu_bf_io_gemm"
    }

    fn kind(&self) -> PrimitiveKind {
        PrimitiveKind::FullyConnected
    }

    fn supported_key(&self) -> CapabilityKey {
        fully_connected_key(&[Format::Bfyx])
    }

    fn needs(&self) -> CapabilityKey {
        CapabilityKey::empty().enable_machine(Machine::SubGroup)
    }

    fn validate(&self, params: &KernelParams, _device: &DeviceInfo) -> bool {
        params.output.size.batch == 1
    }

    fn priority(&self, _params: &KernelParams) -> Priority {
        Priority::P5
    }

    fn dispatch(
        &self,
        params: &KernelParams,
        device: &DeviceInfo,
        _variant: usize,
        _bound: usize,
    ) -> Result<Dispatch, TesselError> {
        let o = params.output.size;
        Dispatch::with_local([round_up(o.feature, 16), o.batch, 1], [16, 1, 1], device)
    }

    fn weights_format(&self, _params: &KernelParams) -> Option<Format> {
        Some(Format::Os_iyx_osv16)
    }
}
