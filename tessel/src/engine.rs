//! Engine ties device, configuration, kernel registry and tuning cache together
//! and compiles topologies into plans.

use crate::graph::{NodeId, Program};
use crate::passes::{post_optimize_weights, run_pipeline};
use crate::registry::Registry;
use crate::selector::{KernelParams, KernelRunner, KernelSelector, Selection};
use crate::tuning::{CacheLoadResult, TuningCache, TuningFile};
use crate::{CompiledPlan, DeviceInfo, EngineConfig, LayoutOptimizer, TesselError, Topology};
use std::collections::{BTreeMap, BTreeSet};

/// Compiles topologies for one device
#[derive(Debug)]
pub struct Engine {
    device: DeviceInfo,
    config: EngineConfig,
    registry: Registry,
    cache: TuningCache,
    cache_status: CacheLoadResult,
    optimizer: LayoutOptimizer,
}

impl Engine {
    /// Engine with all built in kernels. Loads tuning cache from
    /// the configured path, failing to load it is not an error.
    #[must_use]
    pub fn new(device: DeviceInfo, config: EngineConfig) -> Engine {
        let debug = config.debug;
        let (cache, cache_status) = match &config.tuning_cache_path {
            Some(path) => TuningCache::load(path, &device.bucket(), &config.default_bucket),
            None => (TuningCache::empty(), CacheLoadResult::NotFound),
        };
        if debug.dev() {
            match &cache_status {
                CacheLoadResult::Ok { bucket } => {
                    println!("Tuning cache loaded, {} entries from bucket {bucket}", cache.len());
                }
                CacheLoadResult::NotFound => {
                    println!("Tuning cache not found for bucket {}, selecting by priority", device.bucket());
                }
                CacheLoadResult::ParseError(e) => println!("Failed to read tuning cache, {e}"),
            }
            println!(
                "Device with {} compute units, local size limits {:?}, {} threads",
                device.compute_units,
                device.local_dims(),
                device.max_local_threads
            );
        }
        let optimizer = LayoutOptimizer::new(&device, &config);
        Engine { device, config, registry: Registry::with_default_kernels(), cache, cache_status, optimizer }
    }

    /// Replaces tuning cache
    #[must_use]
    pub fn with_cache(mut self, cache: TuningCache) -> Engine {
        self.cache_status = match cache.bucket() {
            Some(bucket) => CacheLoadResult::Ok { bucket: bucket.into() },
            None => CacheLoadResult::NotFound,
        };
        self.cache = cache;
        self
    }

    /// Replaces kernel registry
    #[must_use]
    pub fn with_registry(mut self, registry: Registry) -> Engine {
        self.registry = registry;
        self
    }

    /// Device this engine compiles for
    #[must_use]
    pub const fn device(&self) -> &DeviceInfo {
        &self.device
    }

    /// Configuration
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Kernel registry
    #[must_use]
    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Kernel registry, for registering additional kernels
    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    /// Tuning cache in use
    #[must_use]
    pub const fn cache(&self) -> &TuningCache {
        &self.cache
    }

    /// How loading of the tuning cache went
    #[must_use]
    pub const fn cache_status(&self) -> &CacheLoadResult {
        &self.cache_status
    }

    /// Builds program and runs the optimizer passes, layouts are finalized
    pub fn optimize(&self, topology: &Topology) -> Result<Program, TesselError> {
        let mut program = Program::build(topology, self.config.debug)?;
        run_pipeline(&mut program, &self.optimizer)?;
        program.finalize_layouts()?;
        Ok(program)
    }

    fn selector(&self) -> KernelSelector<'_> {
        KernelSelector::new(
            &self.registry,
            &self.device,
            &self.cache,
            self.config.local_size_bound,
            self.config.debug,
        )
        .with_forced_kernel(self.config.forced_kernel.as_deref())
    }

    /// Compiles topology into plan of kernel launches
    pub fn compile(&self, topology: &Topology) -> Result<CompiledPlan, TesselError> {
        let mut program = self.optimize(topology)?;
        let selector = self.selector();

        let nodes = kernel_nodes(&mut program);
        let mut selections = select(&selector, &nodes, &params(&program, &nodes)?)?;

        let reorders = post_optimize_weights(&mut program, &selections)?;
        if !reorders.is_empty() {
            program.finalize_layouts()?;
            selections.append(&mut select(&selector, &reorders, &params(&program, &reorders)?)?);
        }

        let plan = CompiledPlan::build(&mut program, &selections, self.config.meaningful_kernel_names)?;
        if self.config.debug.plan() {
            println!("Compiled plan with {} kernels", plan.len());
            print!("{plan}");
        }
        Ok(plan)
    }

    /// Offline tuning run. Every node that [`Engine::compile`] would launch is tuned
    /// with runner and the fastest kernel is stored in file under the device bucket.
    /// Nodes with equal signatures are tuned once. Returns number of tuned signatures.
    pub fn tune(
        &self,
        topology: &Topology,
        runner: &dyn KernelRunner,
        file: &mut TuningFile,
    ) -> Result<usize, TesselError> {
        let mut program = self.optimize(topology)?;
        let selector = self.selector();

        // Signatures are taken at the same point as in compile
        let nodes = kernel_nodes(&mut program);
        let mut all = params(&program, &nodes)?;
        let selections = select(&selector, &nodes, &all)?;
        let reorders = post_optimize_weights(&mut program, &selections)?;
        if !reorders.is_empty() {
            program.finalize_layouts()?;
            all.append(&mut params(&program, &reorders)?);
        }

        let bucket = self.device.bucket();
        let mut tuned = BTreeSet::new();
        for p in &all {
            let signature = p.signature();
            if tuned.contains(&signature) {
                continue;
            }
            let entry = selector.tune(p, runner)?;
            file.insert(&bucket, &signature, entry);
            tuned.insert(signature);
        }
        if self.config.debug.dev() {
            println!("Tuned {} signatures into bucket {bucket}", tuned.len());
        }
        Ok(tuned.len())
    }
}

/// Nodes that launch a kernel, in processing order
fn kernel_nodes(program: &mut Program) -> Vec<NodeId> {
    let order = program.processing_order();
    order
        .into_iter()
        .filter(|&n| !program[n].kind().is_memory() && !program[n].can_be_optimized())
        .collect()
}

fn params(program: &Program, nodes: &[NodeId]) -> Result<Vec<KernelParams>, TesselError> {
    nodes.iter().map(|&n| KernelParams::from_node(program, n)).collect()
}

fn select(
    selector: &KernelSelector,
    nodes: &[NodeId],
    params: &[KernelParams],
) -> Result<BTreeMap<NodeId, Selection>, TesselError> {
    let selections = selector.select_all(params)?;
    Ok(nodes.iter().copied().zip(selections).collect())
}
