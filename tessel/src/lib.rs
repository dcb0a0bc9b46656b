//! Tessel compiles topologies of tensor primitives into plans of GPU kernels.
//!
//! A [`Topology`] is turned into a [`graph::Program`], rewritten by the optimizer
//! [`passes`], and every remaining node gets a kernel implementation picked by the
//! [`selector::KernelSelector`] from the [`registry::Registry`], with dispatch
//! geometry and an optional hit in the persisted [`tuning::TuningCache`].
//! [`Engine::compile`] runs the whole pipeline.

// This is just a personal preference
#![allow(clippy::module_name_repetitions)]

use std::hash::BuildHasherDefault;

mod chasher;
mod config;
mod device;
mod dtype;
mod engine;
mod error;
mod layout;
mod layout_optimizer;
mod plan;
mod primitive;
mod topology;

pub mod capability;
pub mod dispatch;
pub mod graph;
pub mod passes;
pub mod registry;
pub mod selector;
pub mod tuning;

pub use config::EngineConfig;
pub use device::DeviceInfo;
pub use dtype::DType;
pub use engine::Engine;
pub use error::TesselError;
pub use layout::{Format, Layout, Padding, Shape};
pub use layout_optimizer::LayoutOptimizer;
pub use plan::{ArgBinding, ArgKind, CompiledPlan, PlanEntry};
pub use primitive::{
    ActivationFunc, ArgMode, Axis, ConvolutionParams, DetectionOutputParams, EltwiseMode, Op,
    PoolingMode, PoolingParams, Primitive, PrimitiveId, PrimitiveKind,
};
pub use topology::Topology;

type Map<K, V> = std::collections::HashMap<K, V, BuildHasherDefault<chasher::CHasher>>;

/// Debug bit mask, read from `TESSEL_DEBUG` environment variable.
///
/// * 1 - device, config and tuning cache loading
/// * 2 - optimizer passes
/// * 4 - kernel selection
/// * 8 - compiled plan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DebugMask(u32);

impl DebugMask {
    /// Mask with given bits
    #[must_use]
    pub const fn new(bits: u32) -> DebugMask {
        DebugMask(bits)
    }

    /// Reads the mask from `TESSEL_DEBUG`, unset or unparsable means no debug output
    #[must_use]
    pub fn from_env() -> DebugMask {
        std::env::var("TESSEL_DEBUG")
            .ok()
            .and_then(|x| x.parse::<u32>().ok())
            .map_or(DebugMask(0), DebugMask)
    }

    /// Print device, config and tuning cache messages
    #[must_use]
    pub const fn dev(&self) -> bool {
        self.0 & 1 != 0
    }

    /// Print optimizer pass progress
    #[must_use]
    pub const fn passes(&self) -> bool {
        self.0 & 2 != 0
    }

    /// Print kernel selection decisions
    #[must_use]
    pub const fn select(&self) -> bool {
        self.0 & 4 != 0
    }

    /// Print compiled plan
    #[must_use]
    pub const fn plan(&self) -> bool {
        self.0 & 8 != 0
    }
}
