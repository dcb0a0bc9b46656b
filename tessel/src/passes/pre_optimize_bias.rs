use super::shared_reorder;
use crate::graph::Program;
use crate::{Format, PrimitiveKind, TesselError};

/// Biases are read as plain vectors in the data type of the output
pub(super) fn run(program: &mut Program) -> Result<(), TesselError> {
    for node in program.processing_order() {
        match program[node].kind() {
            PrimitiveKind::Convolution
            | PrimitiveKind::Deconvolution
            | PrimitiveKind::FullyConnected
            | PrimitiveKind::Embed => {}
            _ => continue,
        }
        let dtype = program.output_layout(node)?.dtype;
        let bias_offset = program[node].input_count() + program[node].desc().weights().len();
        for index in bias_offset..program[node].deps().len() {
            let bias = program[node].deps()[index];
            let layout = program.output_layout(bias)?;
            if layout.format == Format::Bfyx && layout.dtype == dtype {
                continue;
            }
            let (reorder, _) = shared_reorder(program, bias, Format::Bfyx, dtype);
            program.add_intermediate(reorder, node, index)?;
            if program.debug().passes() {
                println!("Bias {} of {} reordered to bfyx {dtype}", program[bias].id(), program[node].id());
            }
        }
    }
    Ok(())
}
