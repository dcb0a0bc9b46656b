use crate::graph::Program;
use crate::TesselError;

/// Marks every node that no output depends on as removed
pub(super) fn run(program: &mut Program) -> Result<(), TesselError> {
    let mut live = std::collections::BTreeSet::new();
    let mut params = program.outputs();
    while let Some(n) = params.pop() {
        if live.insert(n) {
            params.extend(program[n].deps().iter().copied());
        }
    }
    let dead: Vec<_> = program.nodes().map(|(id, _)| id).filter(|id| !live.contains(id)).collect();
    for node in dead {
        if program.debug().passes() {
            println!("Trimmed {}", program[node].id());
        }
        program.remove(node);
    }
    Ok(())
}
