use crate::graph::{NodeId, Program};
use crate::{Axis, Format, Padding, PrimitiveKind, Shape, TesselError};

/// Reshapes of dense bfyx data alias their input. Feature concatenation of single
/// batch bfyx tensors makes its producers write straight into the concatenated buffer.
pub(super) fn run(program: &mut Program) -> Result<(), TesselError> {
    for node in program.processing_order() {
        if program[node].is_removed() {
            continue;
        }
        match program[node].kind() {
            PrimitiveKind::Reshape => reshape_in_place(program, node)?,
            PrimitiveKind::Concatenation => concatenation_in_place(program, node)?,
            _ => {}
        }
    }
    Ok(())
}

fn reshape_in_place(program: &mut Program, node: NodeId) -> Result<(), TesselError> {
    let input = program[node].deps()[0];
    let input_layout = program.output_layout(input)?;
    let layout = program.output_layout(node)?;
    if input_layout.format != Format::Bfyx
        || !input_layout.padding.is_zero()
        || !layout.padding.is_zero()
        || program[input].reused_in_place()
    {
        return Ok(());
    }
    program.node_mut(node).can_be_optimized = true;
    if program.debug().passes() {
        println!("Reshape {} aliases {}", program[node].id(), program[input].id());
    }
    Ok(())
}

fn concatenation_in_place(program: &mut Program, node: NodeId) -> Result<(), TesselError> {
    if program[node].desc().as_concatenation()? != Axis::Feature {
        return Ok(());
    }
    let layout = program.output_layout(node)?;
    if layout.size.batch != 1 || layout.format != Format::Bfyx || !layout.padding.is_zero() {
        return Ok(());
    }
    let inputs = program[node].deps().to_vec();
    for (i, &input) in inputs.iter().enumerate() {
        let n = &program[input];
        if n.kind().is_memory()
            || n.is_output()
            || n.users().len() != 1
            || n.can_be_optimized()
            || n.reused_in_place()
            || inputs[..i].contains(&input)
        {
            return Ok(());
        }
        let l = program.output_layout(input)?;
        if l.format != Format::Bfyx || !l.padding.is_zero() || l.dtype != layout.dtype {
            return Ok(());
        }
    }
    let total = layout.size.feature;
    let mut offset = 0;
    for input in inputs {
        let features = program.output_layout(input)?.size.feature;
        let lower = Shape { feature: offset, ..Shape::zero() };
        let upper = Shape { feature: total - offset - features, ..Shape::zero() };
        program.set_output_padding(input, Padding::new(lower, upper));
        program.node_mut(input).reused_in_place = true;
        offset += features;
    }
    program.node_mut(node).can_be_optimized = true;
    if program.debug().passes() {
        println!("Concatenation {} in place", program[node].id());
    }
    Ok(())
}
