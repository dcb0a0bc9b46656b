use std::cell::RefCell;
use tessel::capability::{CapabilityKey, Feature};
use tessel::dispatch::Dispatch;
use tessel::registry::{KernelImpl, Priority, Registry};
use tessel::selector::{KernelParams, KernelRunner, KernelSelector, Selection};
use tessel::tuning::{CacheLoadResult, TunedKernel, TuningCache, TuningFile, DEFAULT_BUCKET};
use tessel::{
    ActivationFunc, ConvolutionParams, DType, DebugMask, DeviceInfo, Format, Layout, Primitive,
    PrimitiveKind, Shape, TesselError,
};

fn f32_bfyx(size: Shape) -> Layout {
    Layout::new(DType::F32, Format::Bfyx, size)
}

fn conv_params() -> Result<KernelParams, TesselError> {
    Ok(KernelParams {
        desc: Primitive::convolution("conv", "in", &["w"], &[], ConvolutionParams::default())?,
        inputs: vec![f32_bfyx(Shape::new(1, 3, 8, 8))],
        weights: vec![f32_bfyx(Shape::new(4, 3, 3, 3))],
        bias: Vec::new(),
        output: f32_bfyx(Shape::new(1, 4, 6, 6)),
        fused_activation: None,
    })
}

fn activation_params(dtype: DType, size: Shape) -> KernelParams {
    let layout = Layout::new(dtype, Format::Bfyx, size);
    KernelParams {
        desc: Primitive::activation("act", "in", ActivationFunc::Relu),
        inputs: vec![layout],
        weights: Vec::new(),
        bias: Vec::new(),
        output: layout,
        fused_activation: None,
    }
}

fn cache_with(signature: &str, kernel: &str, variant: usize) -> TuningCache {
    let mut file = TuningFile::default();
    file.insert(DEFAULT_BUCKET, signature, TunedKernel { kernel: kernel.into(), variant });
    let (cache, result) = TuningCache::parse(&file.to_json(), "24", DEFAULT_BUCKET);
    assert_eq!(result, CacheLoadResult::Ok { bucket: DEFAULT_BUCKET.into() });
    cache
}

#[test]
fn ranking_picks_lowest_priority() -> Result<(), TesselError> {
    let registry = Registry::with_default_kernels();
    let device = DeviceInfo::default();
    let cache = TuningCache::empty();
    let selector = KernelSelector::new(&registry, &device, &cache, 32, DebugMask::default());
    let params = conv_params()?;
    let names: Vec<&str> = selector.candidates(&params).iter().map(|r| r.kernel().name()).collect();
    assert_eq!(
        names,
        ["convolution_gpu_ref", "convolution_gpu_bfyx_gemm_like", "convolution_gpu_bfyx_os_iyx_osv16"]
    );
    let selection = selector.select(&params)?;
    assert_eq!(selection.kernel, "convolution_gpu_bfyx_os_iyx_osv16");
    assert_eq!(selection.priority, Priority::P4);
    assert_eq!(selection.weights_format, Some(Format::Os_iyx_osv16));
    assert_eq!(selection.dispatch.global, [2, 3, 16]);
    assert_eq!(selection.dispatch.local, [1, 1, 16]);
    assert!(!selection.from_cache);
    assert_eq!(selection.signature, params.signature());
    Ok(())
}

#[test]
fn cache_entry_overrides_ranking() -> Result<(), TesselError> {
    let registry = Registry::with_default_kernels();
    let device = DeviceInfo::default();
    let params = conv_params()?;
    let cache = cache_with(&params.signature(), "convolution_gpu_bfyx_os_iyx_osv16", 2);
    let selector = KernelSelector::new(&registry, &device, &cache, 32, DebugMask::default());
    let selection = selector.select(&params)?;
    assert!(selection.from_cache);
    assert_eq!(selection.variant, 2);
    // Third block is 2x4
    assert_eq!(selection.dispatch.global, [3, 2, 16]);

    let cache = cache_with(&params.signature(), "convolution_gpu_ref", 0);
    let selector = KernelSelector::new(&registry, &device, &cache, 32, DebugMask::default());
    let selection = selector.select(&params)?;
    assert_eq!((selection.kernel, selection.from_cache), ("convolution_gpu_ref", true));
    Ok(())
}

#[test]
fn stale_cache_entries_fall_back_to_ranking() -> Result<(), TesselError> {
    let registry = Registry::with_default_kernels();
    let device = DeviceInfo::default();
    let params = conv_params()?;
    for (kernel, variant) in [
        ("convolution_gpu_bfyx_os_iyx_osv16", 3),
        ("convolution_gpu_removed_long_ago", 0),
        // Not a candidate, input is not blocked
        ("convolution_gpu_bfyx_f16", 0),
    ] {
        let cache = cache_with(&params.signature(), kernel, variant);
        let selector = KernelSelector::new(&registry, &device, &cache, 32, DebugMask::default());
        let selection = selector.select(&params)?;
        assert_eq!(selection.kernel, "convolution_gpu_bfyx_os_iyx_osv16");
        assert_eq!(selection.variant, 0);
        assert!(!selection.from_cache);
    }
    // Entry for another signature is ignored
    let cache = cache_with("convolution|other", "convolution_gpu_ref", 0);
    let selector = KernelSelector::new(&registry, &device, &cache, 32, DebugMask::default());
    assert!(!selector.select(&params)?.from_cache);
    Ok(())
}

#[test]
fn device_features_filter_candidates() -> Result<(), TesselError> {
    let registry = Registry::with_default_kernels();
    let device = DeviceInfo { supports_subgroups: false, ..Default::default() };
    let cache = TuningCache::empty();
    let selector = KernelSelector::new(&registry, &device, &cache, 32, DebugMask::default());
    assert_eq!(selector.select(&conv_params()?)?.kernel, "convolution_gpu_ref");

    // Half precision data needs fp16 support
    let device = DeviceInfo { supports_fp16: false, ..Default::default() };
    let selector = KernelSelector::new(&registry, &device, &cache, 32, DebugMask::default());
    let params = activation_params(DType::F16, Shape::new(1, 8, 2, 2));
    assert!(matches!(
        selector.select(&params),
        Err(TesselError::NoCompatibleImplementation { kind: PrimitiveKind::Activation, .. })
    ));
    Ok(())
}

#[test]
fn unsupported_data_type() {
    let registry = Registry::with_default_kernels();
    let device = DeviceInfo::default();
    let cache = TuningCache::empty();
    let selector = KernelSelector::new(&registry, &device, &cache, 32, DebugMask::default());
    match selector.select(&activation_params(DType::U8, Shape::new(1, 8, 2, 2))) {
        Err(TesselError::NoCompatibleImplementation { id, signature, .. }) => {
            assert_eq!(id, "act");
            assert!(signature.starts_with("activation"));
        }
        other => panic!("expected no compatible implementation, got {other:?}"),
    }
}

#[test]
fn forced_kernel_wins_when_valid() -> Result<(), TesselError> {
    let registry = Registry::with_default_kernels();
    let device = DeviceInfo::default();
    let cache = TuningCache::empty();
    let selector = KernelSelector::new(&registry, &device, &cache, 32, DebugMask::default())
        .with_forced_kernel(Some("activation_gpu_ref"));
    let params = activation_params(DType::F32, Shape::new(1, 8, 2, 2));
    assert_eq!(selector.select(&params)?.kernel, "activation_gpu_ref");

    // Forcing a kernel that can not run falls back to ranking
    let selector = KernelSelector::new(&registry, &device, &cache, 32, DebugMask::default())
        .with_forced_kernel(Some("convolution_gpu_ref"));
    assert_eq!(selector.select(&params)?.kernel, "activation_gpu_opt");
    Ok(())
}

/// Activation kernel with configurable name and priority
struct CustomActivation {
    name: &'static str,
    priority: Priority,
}

impl KernelImpl for CustomActivation {
    fn name(&self) -> &'static str {
        self.name
    }

    fn kind(&self) -> PrimitiveKind {
        PrimitiveKind::Activation
    }

    fn supported_key(&self) -> CapabilityKey {
        CapabilityKey::empty()
            .enable_input_dtype(DType::F32)
            .enable_output_dtype(DType::F32)
            .enable_input_format(Format::Bfyx)
            .enable_output_format(Format::Bfyx)
            .enable_feature(Feature::Batching)
    }

    fn priority(&self, _params: &KernelParams) -> Priority {
        self.priority
    }

    fn dispatch(
        &self,
        params: &KernelParams,
        device: &DeviceInfo,
        _variant: usize,
        bound: usize,
    ) -> Result<Dispatch, TesselError> {
        Dispatch::new([params.output.count(), 1, 1], device, bound)
    }
}

#[test]
fn priority_ties_go_to_first_registered() -> Result<(), TesselError> {
    let mut registry = Registry::new();
    registry.register(Box::new(CustomActivation { name: "first", priority: Priority::P3 }));
    registry.register(Box::new(CustomActivation { name: "second", priority: Priority::P3 }));
    registry.register(Box::new(CustomActivation { name: "slow", priority: Priority::FALLBACK }));
    let device = DeviceInfo::default();
    let cache = TuningCache::empty();
    let params = activation_params(DType::F32, Shape::new(2, 4, 4, 4));
    {
        let selector = KernelSelector::new(&registry, &device, &cache, 32, DebugMask::default());
        let selection = selector.select(&params)?;
        assert_eq!(selection.kernel, "first");
        assert_eq!(selection.dispatch.global, [128, 1, 1]);
    }

    // Replacing a kernel keeps its place in registration order
    registry.register(Box::new(CustomActivation { name: "first", priority: Priority::P5 }));
    assert_eq!(registry.len(), 3);
    assert_eq!(registry.find("first").map(|r| r.order()), Some(0));
    let selector = KernelSelector::new(&registry, &device, &cache, 32, DebugMask::default());
    assert_eq!(selector.select(&params)?.kernel, "second");
    Ok(())
}

#[test]
fn custom_kernel_beats_builtin() -> Result<(), TesselError> {
    let mut registry = Registry::with_default_kernels();
    registry.register(Box::new(CustomActivation { name: "activation_custom", priority: Priority::P1 }));
    let device = DeviceInfo::default();
    let cache = TuningCache::empty();
    let selector = KernelSelector::new(&registry, &device, &cache, 32, DebugMask::default());
    let selections = selector.select_all(&[
        activation_params(DType::F32, Shape::new(1, 8, 2, 2)),
        activation_params(DType::F16, Shape::new(1, 8, 2, 2)),
    ])?;
    let kernels: Vec<&str> = selections.iter().map(|s| s.kernel).collect();
    assert_eq!(kernels, ["activation_custom", "activation_gpu_opt"]);
    Ok(())
}

/// Reports one kernel variant as fast and everything else as slow
struct FastestIs {
    kernel: &'static str,
    variant: usize,
    ran: RefCell<Vec<(&'static str, usize)>>,
}

impl FastestIs {
    fn new(kernel: &'static str, variant: usize) -> FastestIs {
        FastestIs { kernel, variant, ran: RefCell::new(Vec::new()) }
    }
}

impl KernelRunner for FastestIs {
    fn run(&self, _params: &KernelParams, selections: &[Selection]) -> Result<Vec<u64>, TesselError> {
        self.ran.borrow_mut().extend(selections.iter().map(|s| (s.kernel, s.variant)));
        Ok(selections
            .iter()
            .map(|s| if (s.kernel, s.variant) == (self.kernel, self.variant) { 1_000 } else { 50_000 })
            .collect())
    }
}

/// Runner that lost a result
struct Truncated;

impl KernelRunner for Truncated {
    fn run(&self, _params: &KernelParams, selections: &[Selection]) -> Result<Vec<u64>, TesselError> {
        Ok(vec![1; selections.len() - 1])
    }
}

#[test]
fn tuning_tries_every_candidate_and_variant() -> Result<(), TesselError> {
    let registry = Registry::with_default_kernels();
    let device = DeviceInfo::default();
    let cache = TuningCache::empty();
    let selector = KernelSelector::new(&registry, &device, &cache, 32, DebugMask::default());
    let params = conv_params()?;

    let runner = FastestIs::new("convolution_gpu_bfyx_os_iyx_osv16", 2);
    let tuned = selector.tune(&params, &runner)?;
    assert_eq!(tuned, TunedKernel { kernel: "convolution_gpu_bfyx_os_iyx_osv16".into(), variant: 2 });
    assert_eq!(
        runner.ran.into_inner(),
        [
            ("convolution_gpu_ref", 0),
            ("convolution_gpu_bfyx_gemm_like", 0),
            ("convolution_gpu_bfyx_os_iyx_osv16", 0),
            ("convolution_gpu_bfyx_os_iyx_osv16", 1),
            ("convolution_gpu_bfyx_os_iyx_osv16", 2),
        ]
    );

    // Tuned entry is what the selector uses afterwards
    let cache = cache_with(&params.signature(), &tuned.kernel, tuned.variant);
    let selector = KernelSelector::new(&registry, &device, &cache, 32, DebugMask::default());
    let selection = selector.select(&params)?;
    assert_eq!((selection.kernel, selection.variant, selection.from_cache), (tuned.kernel.as_str(), 2, true));
    Ok(())
}

#[test]
fn tuning_ties_and_runner_errors() -> Result<(), TesselError> {
    let registry = Registry::with_default_kernels();
    let device = DeviceInfo::default();
    let cache = TuningCache::empty();
    let selector = KernelSelector::new(&registry, &device, &cache, 32, DebugMask::default());
    let params = conv_params()?;

    // Nothing is faster, first registered kernel wins
    let tuned = selector.tune(&params, &FastestIs::new("no_such_kernel", 0))?;
    assert_eq!(tuned.kernel, "convolution_gpu_ref");

    assert!(matches!(selector.tune(&params, &Truncated), Err(TesselError::ParseError(_))));
    let params = activation_params(DType::U8, Shape::new(1, 8, 2, 2));
    assert!(matches!(
        selector.tune(&params, &Truncated),
        Err(TesselError::NoCompatibleImplementation { .. })
    ));
    Ok(())
}
