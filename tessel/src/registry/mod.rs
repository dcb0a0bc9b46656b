//! Registry of kernel implementations.
//!
//! Every implementation declares the capability key it supports, machine
//! features it needs, extra validation, static priority and how it computes
//! its dispatch geometry. Keys are computed once, at registration.

use crate::capability::{CapabilityKey, Feature};
use crate::dispatch::Dispatch;
use crate::selector::KernelParams;
use crate::{DType, DeviceInfo, Format, Map, PrimitiveKind, TesselError};
use std::fmt::Display;

mod activation;
mod arg_max_min;
mod concatenation;
mod convolution;
mod deconvolution;
mod detection_output;
mod eltwise;
mod embed;
mod fully_connected;
mod one_hot;
mod pooling;
mod reorder;
mod reshape;
mod softmax;

/// Static priority, lower is tried first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(pub u8);

impl Priority {
    /// Highest priority
    pub const P1: Priority = Priority(1);
    /// Priority 2
    pub const P2: Priority = Priority(2);
    /// Priority 3
    pub const P3: Priority = Priority(3);
    /// Priority 4
    pub const P4: Priority = Priority(4);
    /// Priority 5
    pub const P5: Priority = Priority(5);
    /// Priority 6
    pub const P6: Priority = Priority(6);
    /// Priority 7
    pub const P7: Priority = Priority(7);
    /// Priority 8
    pub const P8: Priority = Priority(8);
    /// Priority 9
    pub const P9: Priority = Priority(9);
    /// Reference kernels, used only when nothing else fits
    pub const FALLBACK: Priority = Priority(u8::MAX);
}

impl Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if *self == Priority::FALLBACK {
            f.write_str("fallback")
        } else {
            f.write_fmt(format_args!("p{}", self.0))
        }
    }
}

/// One kernel implementation of one primitive kind
pub trait KernelImpl: Send + Sync {
    /// Unique name
    fn name(&self) -> &'static str;

    /// Kind of primitive this kernel executes
    fn kind(&self) -> PrimitiveKind;

    /// Data types, formats and features this kernel supports
    fn supported_key(&self) -> CapabilityKey;

    /// Machine features the device must have
    fn needs(&self) -> CapabilityKey {
        CapabilityKey::empty()
    }

    /// Constraints not expressible as capability bits
    fn validate(&self, _params: &KernelParams, _device: &DeviceInfo) -> bool {
        true
    }

    /// Static priority for these parameters
    fn priority(&self, params: &KernelParams) -> Priority;

    /// Dispatch geometry of given tuning variant
    fn dispatch(
        &self,
        params: &KernelParams,
        device: &DeviceInfo,
        variant: usize,
        bound: usize,
    ) -> Result<Dispatch, TesselError>;

    /// Weights format this kernel reads, if it differs from the plain one
    fn weights_format(&self, _params: &KernelParams) -> Option<Format> {
        None
    }

    /// Number of tuning variants
    fn tune_variants(&self, _params: &KernelParams) -> usize {
        1
    }
}

/// Registered kernel with its precomputed keys
pub struct Registered {
    kernel: Box<dyn KernelImpl>,
    key: CapabilityKey,
    needs: CapabilityKey,
    order: usize,
}

impl Registered {
    /// The kernel
    #[must_use]
    pub fn kernel(&self) -> &dyn KernelImpl {
        self.kernel.as_ref()
    }

    /// Supported key, computed at registration
    #[must_use]
    pub const fn key(&self) -> CapabilityKey {
        self.key
    }

    /// Machine needs, computed at registration
    #[must_use]
    pub const fn needs(&self) -> CapabilityKey {
        self.needs
    }

    /// Registration order, breaks priority ties
    #[must_use]
    pub const fn order(&self) -> usize {
        self.order
    }
}

impl std::fmt::Debug for Registered {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registered")
            .field("name", &self.kernel.name())
            .field("kind", &self.kernel.kind())
            .field("order", &self.order)
            .finish()
    }
}

/// All kernel implementations, indexed by primitive kind
#[derive(Debug, Default)]
pub struct Registry {
    kernels: Vec<Registered>,
    by_kind: Map<PrimitiveKind, Vec<usize>>,
    by_name: Map<&'static str, usize>,
}

impl Registry {
    /// Registry without kernels
    #[must_use]
    pub fn new() -> Registry {
        Registry::default()
    }

    /// Registry with every built in kernel
    #[must_use]
    pub fn with_default_kernels() -> Registry {
        let mut registry = Registry::new();
        convolution::register(&mut registry);
        deconvolution::register(&mut registry);
        fully_connected::register(&mut registry);
        embed::register(&mut registry);
        pooling::register(&mut registry);
        eltwise::register(&mut registry);
        activation::register(&mut registry);
        reorder::register(&mut registry);
        reshape::register(&mut registry);
        concatenation::register(&mut registry);
        softmax::register(&mut registry);
        arg_max_min::register(&mut registry);
        one_hot::register(&mut registry);
        detection_output::register(&mut registry);
        registry
    }

    /// Adds kernel. Kernel with already registered name replaces the old one,
    /// keeping its registration order.
    pub fn register(&mut self, kernel: Box<dyn KernelImpl>) {
        let key = kernel.supported_key();
        let needs = kernel.needs();
        if let Some(&i) = self.by_name.get(kernel.name()) {
            let old_kind = self.kernels[i].kernel.kind();
            if let Some(list) = self.by_kind.get_mut(&old_kind) {
                list.retain(|&x| x != i);
            }
            self.by_kind.entry(kernel.kind()).or_default().push(i);
            let order = self.kernels[i].order;
            self.kernels[i] = Registered { kernel, key, needs, order };
            return;
        }
        let order = self.kernels.len();
        self.by_name.insert(kernel.name(), order);
        self.by_kind.entry(kernel.kind()).or_default().push(order);
        self.kernels.push(Registered { kernel, key, needs, order });
    }

    /// Kernels of given kind, in registration order
    pub fn candidates(&self, kind: PrimitiveKind) -> impl Iterator<Item = &Registered> {
        let mut list = self.by_kind.get(&kind).cloned().unwrap_or_default();
        list.sort_unstable();
        list.into_iter().map(move |i| &self.kernels[i])
    }

    /// Kernel by name
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&Registered> {
        self.by_name.get(name).map(|&i| &self.kernels[i])
    }

    /// Number of kernels
    #[must_use]
    pub fn len(&self) -> usize {
        self.kernels.len()
    }

    /// Is the registry empty?
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.kernels.is_empty()
    }

    /// All kernels in registration order
    pub fn iter(&self) -> impl Iterator<Item = &Registered> {
        self.kernels.iter()
    }
}

/// Features common to kernels that read and write arbitrary padded tensors
pub(crate) fn tensor_features(key: CapabilityKey) -> CapabilityKey {
    key.enable_feature(Feature::TensorOffset)
        .enable_feature(Feature::TensorPitches)
        .enable_feature(Feature::Batching)
}

/// Global size of reference kernels, one work item per output element
pub(crate) fn elementwise_global(params: &KernelParams) -> [usize; 3] {
    let o = params.output.size;
    [o.spatial_count(), o.feature, o.batch]
}

/// Key with given data types for input and output and given formats for input and output
pub(crate) fn data_key(dtypes: &[DType], formats: &[Format]) -> CapabilityKey {
    let mut key = CapabilityKey::empty();
    for &dtype in dtypes {
        key = key.enable_input_dtype(dtype).enable_output_dtype(dtype);
    }
    for &format in formats {
        key = key.enable_input_format(format).enable_output_format(format);
    }
    key
}
