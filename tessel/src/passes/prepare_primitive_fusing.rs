use crate::graph::Program;
use crate::{PrimitiveKind, TesselError};

/// Activation following a producer that only it reads becomes part of that producer
pub(super) fn run(program: &mut Program) -> Result<(), TesselError> {
    for node in program.processing_order() {
        let n = &program[node];
        if n.is_removed() || n.kind() != PrimitiveKind::Activation || n.is_output() {
            continue;
        }
        if !n.output_padding().is_zero() {
            continue;
        }
        let producer = n.deps()[0];
        let p = &program[producer];
        let fusable = matches!(
            p.kind(),
            PrimitiveKind::Convolution
                | PrimitiveKind::Deconvolution
                | PrimitiveKind::FullyConnected
                | PrimitiveKind::Eltwise
        );
        if !fusable || p.users().len() != 1 || p.is_output() || p.fused_activation().is_some() {
            continue;
        }
        let func = n.desc().as_activation()?;
        if program.debug().passes() {
            println!("Fused {} ({func}) into {}", n.id(), p.id());
        }
        program.node_mut(producer).fused_activation = Some(func);
        program.bypass(node)?;
    }
    Ok(())
}
