use crate::graph::{NodeId, Program};
use crate::{PrimitiveKind, TesselError};

fn is_live_reorder(program: &Program, node: NodeId) -> bool {
    !program[node].is_removed() && program[node].kind() == PrimitiveKind::Reorder
}

/// Removes reorders whose output layout equals their input layout and
/// lets reorders skip over reorders that only change format.
pub(super) fn run(program: &mut Program) -> Result<(), TesselError> {
    for node in program.processing_order() {
        if !is_live_reorder(program, node) || program[node].is_output() {
            continue;
        }
        let input = program[node].deps()[0];
        // Chain a -> r1 -> r2, r2 reads a directly when r1 keeps the data type
        if is_live_reorder(program, input) {
            let source = program[input].deps()[0];
            let inner = program.output_layout(input)?;
            if inner.dtype == program.output_layout(source)?.dtype && inner.padding.is_zero() {
                program.replace_dependency(node, 0, source)?;
                if program[input].users().is_empty() && !program[input].is_output() {
                    program.remove(input);
                }
                if program.debug().passes() {
                    println!("Collapsed reorder chain into {}", program[node].id());
                }
            }
        }
        let input = program[node].deps()[0];
        if program.output_layout(node)?.is_identical(&program.output_layout(input)?) {
            if program.debug().passes() {
                println!("Removed redundant reorder {}", program[node].id());
            }
            program.bypass(node)?;
        }
    }
    Ok(())
}
