use tessel::capability::{CapabilityKey, Feature, Machine, FEATURES, INPUT_FORMAT, OUTPUT_DTYPE};
use tessel::registry::Registry;
use tessel::selector::{KernelParams, KernelSelector};
use tessel::tuning::TuningCache;
use tessel::{
    ActivationFunc, ConvolutionParams, DType, DebugMask, DeviceInfo, Format, Layout, Primitive, Shape,
    TesselError,
};

fn conv_like() -> CapabilityKey {
    CapabilityKey::empty()
        .enable_input_dtype(DType::F32)
        .enable_output_dtype(DType::F32)
        .enable_input_format(Format::Bfyx)
        .enable_output_format(Format::Bfyx)
        .enable_feature(Feature::Batching)
}

#[test]
fn key_supports_itself_and_subsets() {
    let key = conv_like().enable_feature(Feature::Dilation);
    assert!(key.supports(&key));
    assert!(key.supports(&conv_like()));
    assert!(key.supports(&CapabilityKey::empty()));
    assert!(!conv_like().supports(&key));
}

#[test]
fn every_required_bit_must_be_supported() {
    let supported = conv_like().enable_input_format(Format::Yxfb).enable_output_format(Format::Yxfb);
    // Bit of each field on its own
    assert!(!supported.supports(&conv_like().enable_input_dtype(DType::F16)));
    assert!(!supported.supports(&conv_like().enable_output_format(Format::Byxf)));
    assert!(!supported.supports(&conv_like().enable_weights_dtype(DType::I8)));
    assert!(!supported.supports(&conv_like().enable_feature(Feature::FusedActivation)));
    assert!(!supported.supports(&conv_like().enable_machine(Machine::SubGroup)));
    // Requiring fewer formats than supported is fine
    assert!(supported.supports(&conv_like()));
}

#[test]
fn union_covers_both_sides() {
    let a = conv_like();
    let b = CapabilityKey::empty().enable_output_dtype(DType::F16).enable_feature(Feature::AxisAll);
    let u = a.union(b);
    assert!(u.supports(&a) && u.supports(&b));
    assert_eq!(u.field(OUTPUT_DTYPE).count_ones(), 2);
    assert_eq!(u.field(FEATURES).count_ones(), 2);
}

#[test]
fn all_formats_excludes_weights_formats() {
    let key = CapabilityKey::empty().enable_all_input_formats();
    for format in Format::ALL {
        let required = CapabilityKey::empty().enable_input_format(format);
        assert_eq!(key.supports(&required), !format.is_weights(), "{format}");
    }
    assert!(key.field(INPUT_FORMAT) != 0);
}

#[test]
fn device_key_holds_machine_features() {
    let device = DeviceInfo { supports_subgroups_short: false, ..Default::default() };
    let key = device.capability_key();
    assert!(key.has_machine(Machine::SubGroup));
    assert!(!key.has_machine(Machine::SubGroupShort));
    assert!(!key.supports(&CapabilityKey::empty().enable_machine(Machine::SubGroupShort)));
    assert!(key.supports(&CapabilityKey::empty().enable_machine(Machine::Fp16)));
}

#[test]
fn registered_kernels_have_names_and_output_types() {
    let registry = Registry::with_default_kernels();
    assert!(registry.len() > 20);
    for (i, registered) in registry.iter().enumerate() {
        assert_eq!(registered.order(), i);
        let name = registered.kernel().name();
        assert!(registry.find(name).is_some_and(|r| r.order() == i), "{name} registered twice");
        assert_ne!(registered.key().field(OUTPUT_DTYPE), 0, "{name} has no output type");
        assert_eq!(registered.key(), registered.kernel().supported_key());
    }
}

/// Names of registered kernels whose key supports required
fn supporting(registry: &Registry, required: CapabilityKey) -> Vec<&'static str> {
    registry.iter().filter(|r| r.key().supports(&required)).map(|r| r.kernel().name()).collect()
}

#[test]
fn every_kernel_supports_its_own_key() {
    let registry = Registry::with_default_kernels();
    for r in registry.iter() {
        assert!(r.key().supports(&r.key()), "{}", r.kernel().name());
        assert!(supporting(&registry, r.key()).contains(&r.kernel().name()));
    }
}

#[test]
fn fewer_requirements_never_lose_kernels() {
    let registry = Registry::with_default_kernels();
    // Own key of every kernel, the most demanding requirement it accepts
    for r in registry.iter() {
        let required = r.key().bits();
        let full = supporting(&registry, r.key());
        for bit in (0..128).filter(|bit| required & (1 << bit) != 0) {
            let relaxed = supporting(&registry, CapabilityKey::from_bits(required & !(1 << bit)));
            for name in &full {
                assert!(relaxed.contains(name), "{name} lost after clearing bit {bit} of {}", r.kernel().name());
            }
        }
    }
}

#[test]
fn fused_activation_only_narrows_candidates() -> Result<(), TesselError> {
    let registry = Registry::with_default_kernels();
    let device = DeviceInfo::default();
    let cache = TuningCache::empty();
    let selector = KernelSelector::new(&registry, &device, &cache, 32, DebugMask::default());
    let f32_bfyx = |size| Layout::new(DType::F32, Format::Bfyx, size);
    let plain = KernelParams {
        desc: Primitive::convolution("conv", "in", &["w"], &[], ConvolutionParams::default())?,
        inputs: vec![f32_bfyx(Shape::new(2, 3, 8, 8))],
        weights: vec![f32_bfyx(Shape::new(4, 3, 3, 3))],
        bias: Vec::new(),
        output: f32_bfyx(Shape::new(2, 4, 6, 6)),
        fused_activation: None,
    };
    let fused = KernelParams { fused_activation: Some(ActivationFunc::Relu), ..plain.clone() };
    assert!(plain.required_key().supports(&CapabilityKey::empty()));
    assert!(fused.required_key().supports(&plain.required_key()));
    let wide: Vec<&str> = selector.candidates(&plain).iter().map(|r| r.kernel().name()).collect();
    for r in selector.candidates(&fused) {
        assert!(wide.contains(&r.kernel().name()), "{}", r.kernel().name());
    }
    Ok(())
}
