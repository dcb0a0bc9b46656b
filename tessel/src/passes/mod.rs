//! Optimizer passes, each rewrites the program graph in place.
//!
//! Passes run in a fixed order: layout and format decisions first, then fusion,
//! then in place buffer reuse. Every pass is deterministic and running the
//! pipeline twice gives the same graph as running it once.

use crate::graph::{NodeId, Program};
use crate::{DType, Format, LayoutOptimizer, Primitive, TesselError};

mod handle_reshape;
mod post_optimize_weights;
mod pre_optimize_bias;
mod prepare_buffer_fusing;
mod prepare_primitive_fusing;
mod remove_redundant_reorders;
mod reorder_inputs;
mod trim_to_outputs;

pub use post_optimize_weights::post_optimize_weights;

/// One optimizer pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    /// Removes nodes that do not contribute to any output
    TrimToOutputs,
    /// Inserts reorders where consumers need another format of their input
    ReorderInputs,
    /// Removes reorders that do not change anything and collapses reorder chains
    RemoveRedundantReorders,
    /// Splits reshapes feeding reorders, bridges reshapes in blocked formats
    HandleReshape,
    /// Reorders biases to the plain format in the output data type
    PreOptimizeBias,
    /// Fuses activations into their producers
    PreparePrimitiveFusing,
    /// Marks reshapes and feature concatenations that can work in place
    PrepareBufferFusing,
}

/// Default pipeline
pub const PIPELINE: [Pass; 8] = [
    Pass::TrimToOutputs,
    Pass::ReorderInputs,
    Pass::RemoveRedundantReorders,
    Pass::HandleReshape,
    Pass::RemoveRedundantReorders,
    Pass::PreOptimizeBias,
    Pass::PreparePrimitiveFusing,
    Pass::PrepareBufferFusing,
];

impl Pass {
    /// Name used in logs
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Pass::TrimToOutputs => "trim_to_outputs",
            Pass::ReorderInputs => "reorder_inputs",
            Pass::RemoveRedundantReorders => "remove_redundant_reorders",
            Pass::HandleReshape => "handle_reshape",
            Pass::PreOptimizeBias => "pre_optimize_bias",
            Pass::PreparePrimitiveFusing => "prepare_primitive_fusing",
            Pass::PrepareBufferFusing => "prepare_buffer_fusing",
        }
    }

    /// Runs this pass on program
    pub fn run(&self, program: &mut Program, optimizer: &LayoutOptimizer) -> Result<(), TesselError> {
        match self {
            Pass::TrimToOutputs => trim_to_outputs::run(program),
            Pass::ReorderInputs => reorder_inputs::run(program, optimizer),
            Pass::RemoveRedundantReorders => remove_redundant_reorders::run(program),
            Pass::HandleReshape => handle_reshape::run(program),
            Pass::PreOptimizeBias => pre_optimize_bias::run(program),
            Pass::PreparePrimitiveFusing => prepare_primitive_fusing::run(program),
            Pass::PrepareBufferFusing => prepare_buffer_fusing::run(program),
        }
    }
}

/// Runs all passes of given pipeline in order
pub fn run_passes(
    program: &mut Program,
    optimizer: &LayoutOptimizer,
    passes: &[Pass],
) -> Result<(), TesselError> {
    for pass in passes {
        let before = program.len();
        pass.run(program, optimizer)?;
        if program.debug().passes() {
            println!("Pass {}: {before} -> {} nodes", pass.name(), program.len());
        }
    }
    Ok(())
}

/// Runs the default pipeline
pub fn run_pipeline(program: &mut Program, optimizer: &LayoutOptimizer) -> Result<(), TesselError> {
    run_passes(program, optimizer, &PIPELINE)
}

/// Reorder of producer output to format and data type, one per
/// (producer, format, data type) in the whole program.
/// Returns whether the reorder was created.
fn shared_reorder(program: &mut Program, producer: NodeId, format: Format, dtype: DType) -> (NodeId, bool) {
    let source = program[producer].id().clone();
    let desc = Primitive::reorder(format!("{source}_reorder_{format}_{dtype}"), source, format, dtype);
    program.get_or_create(desc)
}
