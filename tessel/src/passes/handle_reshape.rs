use crate::graph::{NodeId, Program};
use crate::{Format, Primitive, PrimitiveKind, TesselError};

/// Reshape only changes shape metadata, but a reorder right after it would see the
/// data in whatever format the producer left it. Each reorder user of a reshape
/// gets its own reshape, fed by a reorder to the format that user wants.
/// Non output reshapes left in blocked formats are bridged through bfyx.
pub(super) fn run(program: &mut Program) -> Result<(), TesselError> {
    for node in program.processing_order() {
        if program[node].is_removed() || program[node].kind() != PrimitiveKind::Reshape {
            continue;
        }
        let input = program[node].deps()[0];
        if program[input].kind() == PrimitiveKind::Reorder {
            continue;
        }
        let users = program[node].users().to_vec();
        let reorders: Vec<NodeId> =
            users.iter().copied().filter(|&u| program[u].kind() == PrimitiveKind::Reorder).collect();
        let mut served = Vec::with_capacity(reorders.len());
        // Original reshape serves a reorder only when nothing else reads it
        let keep_original = !reorders.is_empty() && reorders.len() == users.len();
        for (i, &user) in reorders.iter().enumerate() {
            if i == 0 && keep_original {
                served.push((node, user));
                continue;
            }
            let shape = program[node].desc().as_reshape()?;
            let id = format!("{}_split_for_{}", program[node].id(), program[user].id());
            let (clone, _) = program.get_or_create(Primitive::reshape(id, program[input].id().clone(), shape));
            let index = dependency_index(program, user, node)?;
            program.replace_dependency(user, index, input)?;
            program.add_intermediate(clone, user, index)?;
            served.push((clone, user));
        }
        for (reshape, reorder) in served {
            let target = program.output_layout(reorder)?;
            let id = format!("{}_input_{}_{}", program[reshape].id(), target.format, target.dtype);
            let desc = Primitive::reorder(id, program[input].id().clone(), target.format, target.dtype);
            let (reorder_input, _) = program.get_or_create(desc);
            program.add_intermediate(reorder_input, reshape, 0)?;
            if program.debug().passes() {
                println!("Reshape {} reads {} in {}", program[reshape].id(), program[input].id(), target.format);
            }
        }
        if keep_original || program[node].is_output() {
            continue;
        }
        let layout = program.output_layout(node)?;
        if layout.format == Format::Bfyx {
            continue;
        }
        let id = format!("{}_input_bfyx", program[node].id());
        let desc = Primitive::reorder(id, program[input].id().clone(), Format::Bfyx, layout.dtype);
        let (bridge_in, _) = program.get_or_create(desc);
        program.add_intermediate(bridge_in, node, 0)?;
        let id = format!("{}_output_{}", program[node].id(), layout.format);
        let desc = Primitive::reorder(id, program[node].id().clone(), layout.format, layout.dtype);
        let (bridge_out, _) = program.get_or_create(desc);
        for user in program[node].users().to_vec() {
            if user == bridge_out {
                continue;
            }
            for index in 0..program[user].deps().len() {
                if program[user].deps()[index] == node {
                    program.add_intermediate(bridge_out, user, index)?;
                }
            }
        }
        if program.debug().passes() {
            println!("Bridged reshape {} through bfyx", program[node].id());
        }
    }
    Ok(())
}

fn dependency_index(program: &Program, user: NodeId, dep: NodeId) -> Result<usize, TesselError> {
    program[user]
        .deps()
        .iter()
        .position(|&d| d == dep)
        .ok_or_else(|| TesselError::shape_error(program[user].id(), "reshape is not a dependency of its user"))
}
