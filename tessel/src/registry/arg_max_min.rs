use super::{data_key, tensor_features, KernelImpl, Priority, Registry};
use crate::capability::{CapabilityKey, Feature};
use crate::dispatch::Dispatch;
use crate::selector::KernelParams;
use crate::{Axis, DType, DeviceInfo, Format, PrimitiveKind, TesselError};

pub(crate) fn register(registry: &mut Registry) {
    registry.register(Box::new(ArgMaxMinRef));
    registry.register(Box::new(ArgMaxMinAxis));
}

fn arg_max_min_key() -> CapabilityKey {
    tensor_features(data_key(&[DType::F16, DType::F32, DType::I8], &[Format::Bfyx]))
}

/// Reduction over everything but batch, one group of 128 per batch
struct ArgMaxMinRef;

impl ArgMaxMinRef {
    const GROUP: usize = 128;
}

impl KernelImpl for ArgMaxMinRef {
    fn name(&self) -> &'static str {
        "arg_max_min_gpu_ref"
    }

    fn kind(&self) -> PrimitiveKind {
        PrimitiveKind::ArgMaxMin
    }

    fn supported_key(&self) -> CapabilityKey {
        arg_max_min_key().enable_feature(Feature::AxisAll)
    }

    fn validate(&self, _params: &KernelParams, device: &DeviceInfo) -> bool {
        device.max_local_threads >= ArgMaxMinRef::GROUP && device.local_dims()[0] >= ArgMaxMinRef::GROUP
    }

    fn priority(&self, _params: &KernelParams) -> Priority {
        Priority::FALLBACK
    }

    fn dispatch(
        &self,
        params: &KernelParams,
        device: &DeviceInfo,
        _variant: usize,
        _bound: usize,
    ) -> Result<Dispatch, TesselError> {
        let batch = params.input().size.batch;
        Dispatch::with_local([ArgMaxMinRef::GROUP, batch, 1], [ArgMaxMinRef::GROUP, 1, 1], device)
    }
}

/// Reduction along one axis, one work item per reduced line
struct ArgMaxMinAxis;

impl KernelImpl for ArgMaxMinAxis {
    fn name(&self) -> &'static str {
        "arg_max_min_gpu_axis"
    }

    fn kind(&self) -> PrimitiveKind {
        PrimitiveKind::ArgMaxMin
    }

    fn supported_key(&self) -> CapabilityKey {
        arg_max_min_key()
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
        let s = params.input().size;
        let (_, _, axis) = params.desc.as_arg_max_min()?;
        let global = match axis {
            Some(Axis::Batch) => [s.spatial_count(), s.feature, 1],
            Some(Axis::Feature) => [s.spatial_count(), 1, s.batch],
            Some(Axis::Y) => [s.x(), s.feature, s.batch],
            Some(Axis::X) => [s.y(), s.feature, s.batch],
            None => return Err(TesselError::geometry_error("axis kernel needs an axis")),
        };
        Dispatch::new(global, device, bound)
    }
}
