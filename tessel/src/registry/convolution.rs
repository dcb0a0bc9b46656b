use super::{data_key, elementwise_global, tensor_features, KernelImpl, Priority, Registry};
use crate::capability::{CapabilityKey, Feature, Machine};
use crate::dispatch::{ceil_div, round_up, Dispatch};
use crate::selector::KernelParams;
use crate::{DType, DeviceInfo, Format, PrimitiveKind, TesselError};

pub(crate) fn register(registry: &mut Registry) {
    registry.register(Box::new(ConvolutionRef));
    registry.register(Box::new(ConvolutionGemmLike));
    registry.register(Box::new(ConvolutionOsIyxOsv16));
    registry.register(Box::new(ConvolutionBfyxF16));
}

fn convolution_features(key: CapabilityKey) -> CapabilityKey {
    tensor_features(key)
        .enable_feature(Feature::BiasPerFeature)
        .enable_feature(Feature::NonBiasTerm)
        .enable_feature(Feature::FusedActivation)
        .enable_feature(Feature::InputPadding)
}

/// One work item per output element, supports everything
struct ConvolutionRef;

impl KernelImpl for ConvolutionRef {
    fn name(&self) -> &'static str {
        "convolution_gpu_ref"
    }

    fn kind(&self) -> PrimitiveKind {
        PrimitiveKind::Convolution
    }

    fn supported_key(&self) -> CapabilityKey {
        let key = data_key(&[DType::F16, DType::F32, DType::I8], &[Format::Bfyx, Format::Yxfb, Format::Byxf])
            .enable_weights_dtype(DType::F16)
            .enable_weights_dtype(DType::F32)
            .enable_weights_dtype(DType::I8)
            .enable_feature(Feature::SplitSupport)
            .enable_feature(Feature::Grouped)
            .enable_feature(Feature::Dilation);
        convolution_features(key)
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

/// Sub-group gemm over (output features) x (output pixels)
struct ConvolutionGemmLike;

struct GemmStyle {
    sub_block_m: usize,
    sub_block_n: usize,
    work_dx: usize,
    work_dy: usize,
    lws1: usize,
}

impl ConvolutionGemmLike {
    fn style(params: &KernelParams) -> GemmStyle {
        if params.input().dtype == DType::F16 {
            GemmStyle { sub_block_m: 1, sub_block_n: 32, work_dx: 32, work_dy: 1, lws1: 16 }
        } else {
            GemmStyle { sub_block_m: 2, sub_block_n: 32, work_dx: 32, work_dy: 2, lws1: 8 }
        }
    }
}

impl KernelImpl for ConvolutionGemmLike {
    fn name(&self) -> &'static str {
        "convolution_gpu_bfyx_gemm_like"
    }

    fn kind(&self) -> PrimitiveKind {
        PrimitiveKind::Convolution
    }

    fn supported_key(&self) -> CapabilityKey {
        let key = data_key(&[DType::F16, DType::F32], &[Format::Bfyx])
            .enable_weights_dtype(DType::F16)
            .enable_weights_dtype(DType::F32)
            .enable_feature(Feature::SplitSupport);
        convolution_features(key)
    }

    // Short sub-group reads are needed only for half precision, checked in validate
    fn needs(&self) -> CapabilityKey {
        CapabilityKey::empty().enable_machine(Machine::SubGroup)
    }

    fn validate(&self, params: &KernelParams, device: &DeviceInfo) -> bool {
        params.input().dtype != DType::F16 || device.supports_subgroups_short
    }

    fn priority(&self, params: &KernelParams) -> Priority {
        if params.input().dtype == DType::F16 {
            Priority::P6
        } else {
            Priority::P8
        }
    }

    fn dispatch(
        &self,
        params: &KernelParams,
        device: &DeviceInfo,
        _variant: usize,
        _bound: usize,
    ) -> Result<Dispatch, TesselError> {
        let style = ConvolutionGemmLike::style(params);
        let o = params.output.size;
        let sgemm_m = round_up(o.x() * o.y(), style.sub_block_m);
        let sgemm_n = round_up(o.feature, style.sub_block_n);
        let rows = ceil_div(sgemm_m, style.work_dy);
        let global = [ceil_div(sgemm_n, style.work_dx), rows, o.batch];
        let mut dispatch = Dispatch::with_local(global, [1, style.lws1, 1], device)?;
        dispatch.padded |= sgemm_m != o.x() * o.y() || sgemm_n != o.feature;
        Ok(dispatch)
    }

    fn weights_format(&self, params: &KernelParams) -> Option<Format> {
        Some(if params.input().dtype == DType::F16 {
            Format::Iy_xs_os_xsv2_osv16__ao32
        } else {
            Format::Iy_xs_os_xsv2_osv8__ao32
        })
    }
}

/// Output features in blocks of 16 per sub-group, output pixels in tuned blocks
struct ConvolutionOsIyxOsv16;

impl ConvolutionOsIyxOsv16 {
    /// (block width, block height) per tuning variant
    const BLOCKS: [(usize, usize); 3] = [(4, 2), (8, 1), (2, 4)];
}

impl KernelImpl for ConvolutionOsIyxOsv16 {
    fn name(&self) -> &'static str {
        "convolution_gpu_bfyx_os_iyx_osv16"
    }

    fn kind(&self) -> PrimitiveKind {
        PrimitiveKind::Convolution
    }

    fn supported_key(&self) -> CapabilityKey {
        let key = data_key(&[DType::F16, DType::F32], &[Format::Bfyx])
            .enable_weights_dtype(DType::F16)
            .enable_weights_dtype(DType::F32)
            .enable_feature(Feature::SplitSupport)
            .enable_feature(Feature::Dilation);
        convolution_features(key)
    }

    fn needs(&self) -> CapabilityKey {
        CapabilityKey::empty().enable_machine(Machine::SubGroup)
    }

    fn validate(&self, params: &KernelParams, _device: &DeviceInfo) -> bool {
        params.desc.as_convolution().is_ok_and(|c| c.stride[0] <= 2 && c.stride[1] <= 2)
    }

    fn priority(&self, _params: &KernelParams) -> Priority {
        Priority::P4
    }

    fn dispatch(
        &self,
        params: &KernelParams,
        device: &DeviceInfo,
        variant: usize,
        _bound: usize,
    ) -> Result<Dispatch, TesselError> {
        let (bw, bh) = ConvolutionOsIyxOsv16::BLOCKS
            .get(variant)
            .copied()
            .ok_or_else(|| TesselError::geometry_error(format!("no tuning variant {variant}")))?;
        let o = params.output.size;
        let global = [ceil_div(o.x(), bw), ceil_div(o.y(), bh), round_up(o.feature, 16) * o.batch];
        let mut dispatch = Dispatch::with_local(global, [1, 1, 16], device)?;
        dispatch.padded |= o.x() % bw != 0 || o.y() % bh != 0 || o.feature % 16 != 0;
        Ok(dispatch)
    }

    fn weights_format(&self, _params: &KernelParams) -> Option<Format> {
        Some(Format::Os_iyx_osv16)
    }

    fn tune_variants(&self, _params: &KernelParams) -> usize {
        ConvolutionOsIyxOsv16::BLOCKS.len()
    }
}

/// Blocked feature format, reads 16 input features per sub-group
struct ConvolutionBfyxF16;

impl KernelImpl for ConvolutionBfyxF16 {
    fn name(&self) -> &'static str {
        "convolution_gpu_bfyx_f16"
    }

    fn kind(&self) -> PrimitiveKind {
        PrimitiveKind::Convolution
    }

    fn supported_key(&self) -> CapabilityKey {
        let key = data_key(&[DType::F16, DType::F32], &[Format::Bfyx_f16])
            .enable_weights_dtype(DType::F16)
            .enable_weights_dtype(DType::F32)
            .enable_feature(Feature::Dilation);
        convolution_features(key)
    }

    fn needs(&self) -> CapabilityKey {
        CapabilityKey::empty().enable_machine(Machine::SubGroup)
    }

    fn validate(&self, params: &KernelParams, _device: &DeviceInfo) -> bool {
        params.input().size.feature % 16 == 0
    }

    fn priority(&self, _params: &KernelParams) -> Priority {
        Priority::P1
    }

    fn dispatch(
        &self,
        params: &KernelParams,
        device: &DeviceInfo,
        _variant: usize,
        _bound: usize,
    ) -> Result<Dispatch, TesselError> {
        const BLOCK_WIDTH: usize = 8;
        let o = params.output.size;
        let global = [ceil_div(o.x(), BLOCK_WIDTH) * o.y(), round_up(o.feature, 16), o.batch];
        let mut dispatch = Dispatch::with_local(global, [1, 16, 1], device)?;
        dispatch.padded |= o.x() % BLOCK_WIDTH != 0;
        Ok(dispatch)
    }

    fn weights_format(&self, _params: &KernelParams) -> Option<Format> {
        Some(Format::O_i_yx_i16_o16)
    }
}
