//! Kernel selection, picks one registered implementation per node.

use crate::capability::{CapabilityKey, Feature, Machine};
use crate::dispatch::Dispatch;
use crate::graph::{NodeId, Program};
use crate::registry::{Priority, Registered, Registry};
use crate::tuning::{TunedKernel, TuningCache};
use crate::{
    ActivationFunc, DType, DebugMask, DeviceInfo, Format, Layout, Primitive, PrimitiveKind,
    TesselError,
};
use std::fmt::Write;

/// Everything a kernel needs to know about one node,
/// built from finalized layouts of the program.
#[derive(Debug, Clone)]
pub struct KernelParams {
    /// Primitive descriptor
    pub desc: Primitive,
    /// Layouts of primary inputs
    pub inputs: Vec<Layout>,
    /// Layouts of weights
    pub weights: Vec<Layout>,
    /// Layouts of biases
    pub bias: Vec<Layout>,
    /// Output layout
    pub output: Layout,
    /// Activation fused into the kernel
    pub fused_activation: Option<ActivationFunc>,
}

impl KernelParams {
    /// Params of node, layouts must be finalized
    pub fn from_node(program: &Program, node: NodeId) -> Result<KernelParams, TesselError> {
        let n = &program[node];
        let deps = n
            .deps()
            .iter()
            .map(|&d| program.layout(d))
            .collect::<Result<Vec<Layout>, TesselError>>()?;
        let inputs_end = n.input_count().min(deps.len());
        let weights_end = (inputs_end + n.desc().weights().len()).min(deps.len());
        Ok(KernelParams {
            desc: n.desc().clone(),
            inputs: deps[..inputs_end].to_vec(),
            weights: deps[inputs_end..weights_end].to_vec(),
            bias: deps[weights_end..].to_vec(),
            output: program.layout(node)?,
            fused_activation: n.fused_activation(),
        })
    }

    /// Kind of primitive
    #[must_use]
    pub fn kind(&self) -> PrimitiveKind {
        self.desc.kind()
    }

    /// First input layout, output layout for kinds without inputs
    #[must_use]
    pub fn input(&self) -> &Layout {
        self.inputs.first().unwrap_or(&self.output)
    }

    /// Capability key this node requires from its kernel
    #[must_use]
    pub fn required_key(&self) -> CapabilityKey {
        let mut key = self.desc.features();
        for input in &self.inputs {
            key = key.enable_input_dtype(input.dtype).enable_input_format(input.format);
        }
        for weights in &self.weights {
            key = key.enable_weights_dtype(weights.dtype);
        }
        key = key.enable_output_dtype(self.output.dtype).enable_output_format(self.output.format);
        let all = || self.inputs.iter().chain(std::iter::once(&self.output));
        if self.output.size.batch > 1 {
            key = key.enable_feature(Feature::Batching);
        }
        if all().any(|l| !l.padding.lower.is_zero()) {
            key = key.enable_feature(Feature::TensorOffset);
        }
        if all().any(|l| !l.padding.is_zero()) {
            key = key.enable_feature(Feature::TensorPitches);
        }
        if self.fused_activation.is_some() {
            key = key.enable_feature(Feature::FusedActivation);
        }
        if self.input().dtype != self.output.dtype {
            key = key.enable_feature(Feature::DifferentTypes);
        }
        if self.output.format.is_weights() {
            key = key.enable_feature(Feature::WeightsReorder);
        }
        key
    }

    /// Machine features required by data of this node
    #[must_use]
    pub fn machine_needs(&self) -> CapabilityKey {
        let half = self
            .inputs
            .iter()
            .chain(&self.weights)
            .chain(std::iter::once(&self.output))
            .any(|l| l.dtype == DType::F16);
        if half {
            CapabilityKey::empty().enable_machine(Machine::Fp16)
        } else {
            CapabilityKey::empty()
        }
    }

    /// Operation signature, key of the tuning cache. Contains kind, layouts,
    /// parameters and fused activation, never device identity.
    #[must_use]
    pub fn signature(&self) -> String {
        let mut s = String::from(self.kind().as_str());
        // Writing into string can not fail
        for input in &self.inputs {
            let _ = write!(s, "|in:{input}");
        }
        for weights in &self.weights {
            let _ = write!(s, "|w:{weights}");
        }
        let _ = write!(s, "|bias:{}|out:{}|{}", self.bias.len(), self.output, self.desc.param_string());
        if let Some(func) = self.fused_activation {
            let _ = write!(s, "|act:{func}");
        }
        s
    }
}

/// Kernel chosen for one node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Name of kernel implementation
    pub kernel: &'static str,
    /// Tuning variant
    pub variant: usize,
    /// Dispatch geometry
    pub dispatch: Dispatch,
    /// Weights format the kernel reads, weights are reordered to it
    pub weights_format: Option<Format>,
    /// Static priority of the kernel
    pub priority: Priority,
    /// Chosen from tuning cache instead of ranking
    pub from_cache: bool,
    /// Operation signature
    pub signature: String,
}

/// Runs kernels on a device and measures them, used by offline tuning.
/// Implemented by the execution engine, tessel itself never launches kernels.
pub trait KernelRunner {
    /// Runs every selection once on data described by params.
    /// Returns run time of each selection in nanoseconds, in the same order.
    fn run(&self, params: &KernelParams, selections: &[Selection]) -> Result<Vec<u64>, TesselError>;
}

/// Picks kernels for nodes
#[derive(Debug)]
pub struct KernelSelector<'a> {
    registry: &'a Registry,
    device: &'a DeviceInfo,
    device_key: CapabilityKey,
    cache: &'a TuningCache,
    forced_kernel: Option<&'a str>,
    local_size_bound: usize,
    debug: DebugMask,
}

impl<'a> KernelSelector<'a> {
    /// New selector
    #[must_use]
    pub fn new(
        registry: &'a Registry,
        device: &'a DeviceInfo,
        cache: &'a TuningCache,
        local_size_bound: usize,
        debug: DebugMask,
    ) -> KernelSelector<'a> {
        KernelSelector {
            registry,
            device,
            device_key: device.capability_key(),
            cache,
            forced_kernel: None,
            local_size_bound,
            debug,
        }
    }

    /// Prefer this kernel whenever it is a valid candidate
    #[must_use]
    pub fn with_forced_kernel(mut self, kernel: Option<&'a str>) -> KernelSelector<'a> {
        self.forced_kernel = kernel;
        self
    }

    /// Compatible and valid candidates, in registration order
    #[must_use]
    pub fn candidates(&self, params: &KernelParams) -> Vec<&'a Registered> {
        let required = params.required_key();
        let machine = params.machine_needs();
        self.registry
            .candidates(params.kind())
            .filter(|r| r.key().supports(&required))
            .filter(|r| self.device_key.supports(&r.needs().union(machine)))
            .filter(|r| r.kernel().validate(params, self.device))
            .collect()
    }

    /// Selects kernel for node. Forced kernel first, then tuning cache, then ranking.
    pub fn select(&self, params: &KernelParams) -> Result<Selection, TesselError> {
        let candidates = self.candidates(params);
        if candidates.is_empty() {
            return Err(TesselError::NoCompatibleImplementation {
                id: params.desc.id.clone(),
                kind: params.kind(),
                signature: params.signature().into(),
            });
        }
        let signature = params.signature();
        let forced = self
            .forced_kernel
            .and_then(|name| candidates.iter().find(|r| r.kernel().name() == name))
            .map(|r| (*r, 0));
        if let (Some(name), None, true) = (self.forced_kernel, &forced, self.debug.select()) {
            println!("Forced kernel {name} can not run {}, ranking candidates", params.desc.id);
        }
        let cached = || {
            let entry = self.cache.get(&signature)?;
            let r = candidates.iter().find(|r| r.kernel().name() == entry.kernel)?;
            (entry.variant < r.kernel().tune_variants(params)).then_some((*r, entry.variant))
        };
        let (chosen, variant, from_cache) = if let Some((r, v)) = forced {
            (r, v, false)
        } else if let Some((r, v)) = cached() {
            (r, v, true)
        } else {
            let best = candidates
                .iter()
                .min_by_key(|r| (r.kernel().priority(params), r.order()))
                .copied()
                .ok_or_else(|| TesselError::geometry_error("no candidate after filtering"))?;
            (best, 0, false)
        };
        let selection = self.selection(chosen, params, variant, from_cache, signature)?;
        if self.debug.select() {
            println!(
                "Selected {} for {} ({} candidates, {}), global {:?}, local {:?}",
                selection.kernel,
                params.desc.id,
                candidates.len(),
                if from_cache { "cached" } else { "ranked" },
                selection.dispatch.global,
                selection.dispatch.local
            );
        }
        Ok(selection)
    }

    fn selection(
        &self,
        chosen: &Registered,
        params: &KernelParams,
        variant: usize,
        from_cache: bool,
        signature: String,
    ) -> Result<Selection, TesselError> {
        let kernel = chosen.kernel();
        let dispatch = kernel.dispatch(params, self.device, variant, self.local_size_bound)?;
        dispatch.validate(self.device)?;
        Ok(Selection {
            kernel: kernel.name(),
            variant,
            dispatch,
            weights_format: kernel.weights_format(params),
            priority: kernel.priority(params),
            from_cache,
            signature,
        })
    }

    /// Runs every valid candidate in every tuning variant and returns the fastest.
    /// Ties go to the earlier registered kernel and the lower variant.
    /// Variants whose dispatch geometry does not fit the device are skipped.
    pub fn tune(&self, params: &KernelParams, runner: &dyn KernelRunner) -> Result<TunedKernel, TesselError> {
        let signature = params.signature();
        let mut tried = Vec::new();
        for r in self.candidates(params) {
            for variant in 0..r.kernel().tune_variants(params) {
                match self.selection(r, params, variant, false, signature.clone()) {
                    Ok(selection) => tried.push(selection),
                    Err(e) => {
                        if self.debug.select() {
                            println!("Skipping {} variant {variant} for {}, {e}", r.kernel().name(), params.desc.id);
                        }
                    }
                }
            }
        }
        if tried.is_empty() {
            return Err(TesselError::NoCompatibleImplementation {
                id: params.desc.id.clone(),
                kind: params.kind(),
                signature: signature.into(),
            });
        }
        let times = runner.run(params, &tried)?;
        if times.len() != tried.len() {
            return Err(TesselError::parse_error(format!(
                "kernel runner returned {} times for {} kernels",
                times.len(),
                tried.len()
            )));
        }
        let (fastest, time) = tried
            .iter()
            .zip(&times)
            .min_by_key(|(_, time)| **time)
            .ok_or_else(|| TesselError::parse_error("kernel runner returned no times"))?;
        if self.debug.select() {
            println!(
                "Tuned {} for {}, {} variant {} in {time} ns out of {} runs",
                params.desc.id,
                signature,
                fastest.kernel,
                fastest.variant,
                tried.len()
            );
        }
        Ok(TunedKernel { kernel: fastest.kernel.into(), variant: fastest.variant })
    }

    /// Selects kernels for many nodes. Selection of one node never depends on
    /// selection of another, so with the `parallel` feature this runs on rayon.
    pub fn select_all(&self, params: &[KernelParams]) -> Result<Vec<Selection>, TesselError> {
        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            params.par_iter().map(|p| self.select(p)).collect()
        }
        #[cfg(not(feature = "parallel"))]
        {
            params.iter().map(|p| self.select(p)).collect()
        }
    }
}
