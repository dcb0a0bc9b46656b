use crate::graph::{NodeId, Program};
use crate::selector::Selection;
use crate::{Primitive, TesselError};
use std::collections::BTreeMap;

/// Reorders weights of nodes whose selected kernel reads them in a blocked format.
/// One reorder per (weights, format) is shared by all consumers.
/// Returns the created reorders, they still need kernels of their own.
pub fn post_optimize_weights(
    program: &mut Program,
    selections: &BTreeMap<NodeId, Selection>,
) -> Result<Vec<NodeId>, TesselError> {
    let mut created = Vec::new();
    for (&node, selection) in selections {
        let Some(format) = selection.weights_format else {
            continue;
        };
        let start = program[node].input_count();
        let end = start + program[node].desc().weights().len();
        for index in start..end {
            let weights = program[node].deps()[index];
            let layout = program.output_layout(weights)?;
            if layout.format == format {
                continue;
            }
            let source = program[weights].id().clone();
            let desc = Primitive::reorder(format!("{source}_weights_reorder_{format}"), source, format, layout.dtype);
            let (reorder, new) = program.get_or_create(desc);
            if new {
                created.push(reorder);
                if program.debug().passes() {
                    println!("Weights {} reordered to {format}", program[weights].id());
                }
            }
            program.add_intermediate(reorder, node, index)?;
        }
    }
    Ok(created)
}
