use super::shared_reorder;
use crate::graph::Program;
use crate::{LayoutOptimizer, TesselError};

/// Inserts a reorder on every edge whose consumer needs a different format.
/// Consumers needing the same (format, data type) of one producer share one reorder.
pub(super) fn run(program: &mut Program, optimizer: &LayoutOptimizer) -> Result<(), TesselError> {
    for node in program.processing_order() {
        for index in 0..program[node].input_count() {
            let Some(format) = optimizer.required_input_format(program, node, index)? else {
                continue;
            };
            let producer = program[node].deps()[index];
            let dtype = program.output_layout(producer)?.dtype;
            let (reorder, created) = shared_reorder(program, producer, format, dtype);
            if created && program.debug().passes() {
                println!("Reorder {} to {format} for {}", program[producer].id(), program[node].id());
            }
            program.add_intermediate(reorder, node, index)?;
        }
    }
    Ok(())
}
