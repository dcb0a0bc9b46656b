use tessel::graph::{NodeId, Program};
use tessel::passes::{run_passes, run_pipeline, Pass};
use tessel::{
    ActivationFunc, Axis, ConvolutionParams, DType, DebugMask, DeviceInfo, EltwiseMode, EngineConfig,
    Format, Layout, LayoutOptimizer, Primitive, PrimitiveKind, Shape, TesselError, Topology,
};

fn layout(format: Format, b: usize, f: usize, y: usize, x: usize) -> Layout {
    Layout::new(DType::F32, format, Shape::new(b, f, y, x))
}

fn optimizer() -> LayoutOptimizer {
    LayoutOptimizer::new(&DeviceInfo::default(), &EngineConfig::default())
}

fn build(topology: &Topology) -> Result<Program, TesselError> {
    Program::build(topology, DebugMask::default())
}

fn dep(program: &Program, node: &str, index: usize) -> Result<NodeId, TesselError> {
    Ok(program[program.get(node)?].deps()[index])
}

/// Everything passes may change, for comparing two programs
fn snapshot(program: &mut Program) -> Result<Vec<String>, TesselError> {
    let mut lines = Vec::new();
    for node in program.processing_order() {
        let layout = program.output_layout(node)?;
        let n = &program[node];
        let deps: Vec<String> = n.deps().iter().map(|&d| program[d].id().to_string()).collect();
        lines.push(format!(
            "{} {} {deps:?} {layout} {:?} {} {}",
            n.id(),
            n.kind(),
            n.fused_activation(),
            n.can_be_optimized(),
            n.reused_in_place()
        ));
    }
    Ok(lines)
}

#[test]
fn shared_reorder_for_one_consumer() -> Result<(), TesselError> {
    let mut topology = Topology::new();
    topology
        .add(Primitive::input_layout("in", layout(Format::Bfyx, 1, 4, 2, 3)))
        .add(Primitive::input_layout("b", layout(Format::Byxf, 1, 2, 3, 4)))
        .add(Primitive::reshape("R", "in", Shape::new(1, 2, 3, 4)))
        .add(Primitive::softmax("sm1", "R"))
        .add(Primitive::softmax("sm2", "R"))
        .add(Primitive::eltwise("sum", &["b", "R"], EltwiseMode::Sum, Vec::new())?);
    let mut program = build(&topology)?;
    run_passes(&mut program, &optimizer(), &[Pass::ReorderInputs])?;

    assert_eq!(program.len(), 7);
    let r = program.get("R")?;
    assert_eq!(dep(&program, "sm1", 0)?, r);
    assert_eq!(dep(&program, "sm2", 0)?, r);
    let reorder = dep(&program, "sum", 1)?;
    assert_eq!(program[reorder].kind(), PrimitiveKind::Reorder);
    assert_eq!(program[reorder].deps(), &[r]);
    assert_eq!(program.output_layout(reorder)?.format, Format::Byxf);
    assert_eq!(program.output_layout(r)?.format, Format::Bfyx);

    // Nothing is left to reorder
    run_passes(&mut program, &optimizer(), &[Pass::ReorderInputs])?;
    assert_eq!(program.len(), 7);
    Ok(())
}

#[test]
fn reorder_does_not_take_over_node_with_same_id() -> Result<(), TesselError> {
    let mut topology = Topology::new();
    topology
        .add(Primitive::input_layout("in", layout(Format::Byxf, 1, 4, 2, 3)))
        .add(Primitive::activation("in_reorder_bfyx_f32", "in", ActivationFunc::Abs))
        .add(Primitive::softmax("sm", "in"));
    let mut program = build(&topology)?;
    run_passes(&mut program, &optimizer(), &[Pass::ReorderInputs])?;

    let input = program.get("in")?;
    let abs = program.get("in_reorder_bfyx_f32")?;
    assert_eq!(program[abs].kind(), PrimitiveKind::Activation);
    assert_eq!(program[abs].deps(), &[input]);
    let reorder = dep(&program, "sm", 0)?;
    assert_ne!(reorder, abs);
    assert_eq!(program[reorder].id().as_str(), "in_reorder_bfyx_f32_1");
    assert_eq!(program[reorder].kind(), PrimitiveKind::Reorder);
    assert_eq!(program[reorder].deps(), &[input]);
    assert_eq!(program.output_layout(reorder)?.format, Format::Bfyx);

    // Second run finds the suffixed reorder
    let nodes = program.len();
    run_passes(&mut program, &optimizer(), &[Pass::ReorderInputs])?;
    assert_eq!(program.len(), nodes);
    Ok(())
}

#[test]
fn consumers_of_same_format_share_reorder() -> Result<(), TesselError> {
    let mut topology = Topology::new();
    topology
        .add(Primitive::input_layout("x", layout(Format::Bfyx, 1, 8, 4, 4)))
        .add(Primitive::input_layout("y", layout(Format::Yxfb, 1, 8, 4, 4)))
        .add(Primitive::eltwise("sum", &["y", "x"], EltwiseMode::Sum, Vec::new())?)
        .add(Primitive::eltwise("max", &["y", "x"], EltwiseMode::Max, Vec::new())?);
    let mut program = build(&topology)?;
    run_passes(&mut program, &optimizer(), &[Pass::ReorderInputs])?;
    assert_eq!(program.len(), 5);
    let shared = dep(&program, "sum", 1)?;
    assert_eq!(dep(&program, "max", 1)?, shared);
    assert_eq!(program[shared].users().len(), 2);
    Ok(())
}

fn conv_topology() -> Result<Topology, TesselError> {
    let mut topology = Topology::new();
    topology
        .add(Primitive::input_layout("in", layout(Format::Byxf, 1, 3, 16, 16)))
        .add(Primitive::data("w", layout(Format::Bfyx, 8, 3, 3, 3)))
        .add(Primitive::data("bias", layout(Format::Yxfb, 1, 8, 1, 1)))
        .add(Primitive::convolution("conv", "in", &["w"], &["bias"], ConvolutionParams::new([1, 1], [1, 1]))?)
        .add(Primitive::activation("relu", "conv", ActivationFunc::Relu))
        .add(Primitive::reshape("flat", "relu", Shape::new(1, 8 * 16 * 16, 1, 1)))
        .add(Primitive::softmax("prob", "flat"))
        .add(Primitive::input_layout("unused", layout(Format::Bfyx, 1, 1, 1, 1)))
        .add(Primitive::activation("dead", "unused", ActivationFunc::Abs))
        .set_outputs(&["prob"]);
    Ok(topology)
}

#[test]
fn pipeline_is_idempotent() -> Result<(), TesselError> {
    let mut program = build(&conv_topology()?)?;
    run_pipeline(&mut program, &optimizer())?;
    let once = snapshot(&mut program)?;
    run_pipeline(&mut program, &optimizer())?;
    assert_eq!(once, snapshot(&mut program)?);
    Ok(())
}

#[test]
fn pipeline_rewrites_convolution_block() -> Result<(), TesselError> {
    let mut program = build(&conv_topology()?)?;
    run_pipeline(&mut program, &optimizer())?;

    // Not reachable from outputs
    assert!(program.find("dead").is_none());
    assert!(program.find("unused").is_none());

    // Input reordered to bfyx for the convolution
    let input = dep(&program, "conv", 0)?;
    assert_eq!(program[input].kind(), PrimitiveKind::Reorder);
    assert_eq!(program.output_layout(input)?.format, Format::Bfyx);

    // Bias reordered to plain format
    let bias = dep(&program, "conv", 2)?;
    assert_eq!(program[bias].kind(), PrimitiveKind::Reorder);
    assert_eq!(program.output_layout(bias)?.format, Format::Bfyx);

    // Activation fused, reshape of dense bfyx works in place
    assert!(program.find("relu").is_none());
    let conv = program.get("conv")?;
    assert_eq!(program[conv].fused_activation(), Some(ActivationFunc::Relu));
    assert_eq!(dep(&program, "flat", 0)?, conv);
    assert!(program[program.get("flat")?].can_be_optimized());
    Ok(())
}

#[test]
fn activation_with_shared_producer_is_not_fused() -> Result<(), TesselError> {
    let mut topology = Topology::new();
    topology
        .add(Primitive::input_layout("a", layout(Format::Bfyx, 1, 4, 4, 4)))
        .add(Primitive::input_layout("b", layout(Format::Bfyx, 1, 4, 4, 4)))
        .add(Primitive::eltwise("sum", &["a", "b"], EltwiseMode::Sum, Vec::new())?)
        .add(Primitive::activation("relu", "sum", ActivationFunc::Relu))
        .add(Primitive::activation("tanh", "sum", ActivationFunc::Tanh));
    let mut program = build(&topology)?;
    run_pipeline(&mut program, &optimizer())?;
    assert!(program.find("relu").is_some());
    assert!(program.find("tanh").is_some());
    assert_eq!(program[program.get("sum")?].fused_activation(), None);
    Ok(())
}

#[test]
fn reshape_split_per_reorder_user() -> Result<(), TesselError> {
    let mut topology = Topology::new();
    topology
        .add(Primitive::input_layout("in", layout(Format::Bfyx, 1, 4, 2, 3)))
        .add(Primitive::reshape("R", "in", Shape::new(1, 2, 3, 4)))
        .add(Primitive::reorder("to_yxfb", "R", Format::Yxfb, DType::F32))
        .add(Primitive::reorder("to_f16", "R", Format::Bfyx, DType::F16))
        .add(Primitive::softmax("sm", "R"));
    let mut program = build(&topology)?;
    run_passes(&mut program, &optimizer(), &[Pass::HandleReshape])?;

    let r = program.get("R")?;
    let input = program.get("in")?;
    assert_eq!(dep(&program, "sm", 0)?, r);
    assert_eq!(program[r].deps(), &[input]);
    for (user, format, dtype) in [("to_yxfb", Format::Yxfb, DType::F32), ("to_f16", Format::Bfyx, DType::F16)] {
        let clone = dep(&program, user, 0)?;
        assert_ne!(clone, r);
        assert_eq!(program[clone].kind(), PrimitiveKind::Reshape);
        assert_eq!(program[clone].users().len(), 1);
        let reorder = program[clone].deps()[0];
        assert_eq!(program[reorder].kind(), PrimitiveKind::Reorder);
        assert_eq!(program[reorder].deps(), &[input]);
        let l = program.output_layout(clone)?;
        assert_eq!((l.format, l.dtype, l.size), (format, dtype, Shape::new(1, 2, 3, 4)));
    }

    // Reorders after the split reshapes now do nothing
    run_passes(&mut program, &optimizer(), &[Pass::RemoveRedundantReorders])?;
    assert!(program.find("to_yxfb").is_some_and(|n| program[n].is_output()));
    Ok(())
}

#[test]
fn reshape_in_blocked_format_is_bridged() -> Result<(), TesselError> {
    let mut topology = Topology::new();
    topology
        .add(Primitive::input_layout("in", layout(Format::Byxf, 1, 4, 2, 3)))
        .add(Primitive::reshape("R", "in", Shape::new(1, 2, 3, 4)))
        .add(Primitive::activation("a1", "R", ActivationFunc::Relu))
        .add(Primitive::activation("a2", "R", ActivationFunc::Abs));
    let mut program = build(&topology)?;
    run_passes(&mut program, &optimizer(), &[Pass::HandleReshape])?;

    let r = program.get("R")?;
    let bridge_in = program[r].deps()[0];
    assert_eq!(program[bridge_in].kind(), PrimitiveKind::Reorder);
    assert_eq!(program.output_layout(r)?.format, Format::Bfyx);
    let bridge_out = dep(&program, "a1", 0)?;
    assert_eq!(dep(&program, "a2", 0)?, bridge_out);
    assert_eq!(program[bridge_out].deps(), &[r]);
    assert_eq!(program.output_layout(bridge_out)?.format, Format::Byxf);

    // Running again changes nothing, reshape input is a reorder now
    let nodes = program.len();
    run_passes(&mut program, &optimizer(), &[Pass::HandleReshape])?;
    assert_eq!(program.len(), nodes);
    Ok(())
}

#[test]
fn output_reshape_is_not_bridged() -> Result<(), TesselError> {
    let mut topology = Topology::new();
    topology
        .add(Primitive::input_layout("in", layout(Format::Byxf, 1, 4, 2, 3)))
        .add(Primitive::reshape("R", "in", Shape::new(1, 2, 3, 4)));
    let mut program = build(&topology)?;
    run_passes(&mut program, &optimizer(), &[Pass::HandleReshape])?;
    assert_eq!(program.len(), 2);
    Ok(())
}

#[test]
fn redundant_reorders_and_chains() -> Result<(), TesselError> {
    let mut topology = Topology::new();
    topology
        .add(Primitive::input_layout("in", layout(Format::Bfyx, 1, 4, 2, 2)))
        .add(Primitive::reorder("same", "in", Format::Bfyx, DType::F32))
        .add(Primitive::softmax("sm", "same"))
        .add(Primitive::reorder("r1", "in", Format::Yxfb, DType::F32))
        .add(Primitive::reorder("r2", "r1", Format::Byxf, DType::F16))
        .add(Primitive::activation("act", "r2", ActivationFunc::Relu));
    let mut program = build(&topology)?;
    run_passes(&mut program, &optimizer(), &[Pass::RemoveRedundantReorders])?;
    let input = program.get("in")?;
    assert!(program.find("same").is_none());
    assert_eq!(dep(&program, "sm", 0)?, input);
    assert!(program.find("r1").is_none());
    assert_eq!(dep(&program, "r2", 0)?, input);
    let l = program.output_layout(program.get("r2")?)?;
    assert_eq!((l.format, l.dtype), (Format::Byxf, DType::F16));
    Ok(())
}

#[test]
fn feature_concatenation_in_place() -> Result<(), TesselError> {
    let mut topology = Topology::new();
    topology
        .add(Primitive::input_layout("in", layout(Format::Bfyx, 1, 3, 8, 8)))
        .add(Primitive::data("w1", layout(Format::Bfyx, 4, 3, 1, 1)))
        .add(Primitive::data("w2", layout(Format::Bfyx, 6, 3, 1, 1)))
        .add(Primitive::convolution("c1", "in", &["w1"], &[], ConvolutionParams::default())?)
        .add(Primitive::convolution("c2", "in", &["w2"], &[], ConvolutionParams::default())?)
        .add(Primitive::concatenation("cat", &["c1", "c2"], Axis::Feature)?)
        .add(Primitive::softmax("prob", "cat"));
    let mut program = build(&topology)?;
    run_pipeline(&mut program, &optimizer())?;

    assert!(program[program.get("cat")?].can_be_optimized());
    let c1 = program.get("c1")?;
    let c2 = program.get("c2")?;
    assert!(program[c1].reused_in_place() && program[c2].reused_in_place());
    let p1 = program.output_layout(c1)?.padding;
    let p2 = program.output_layout(c2)?.padding;
    assert_eq!((p1.lower.feature, p1.upper.feature), (0, 6));
    assert_eq!((p2.lower.feature, p2.upper.feature), (4, 0));
    let cat = program.output_layout(program.get("cat")?)?;
    assert_eq!(cat.size, Shape::new(1, 10, 8, 8));
    assert!(cat.padding.is_zero());
    Ok(())
}

#[test]
fn concatenation_of_inputs_is_not_in_place() -> Result<(), TesselError> {
    let mut topology = Topology::new();
    topology
        .add(Primitive::input_layout("a", layout(Format::Bfyx, 1, 3, 8, 8)))
        .add(Primitive::input_layout("b", layout(Format::Bfyx, 1, 5, 8, 8)))
        .add(Primitive::concatenation("cat", &["a", "b"], Axis::Feature)?);
    let mut program = build(&topology)?;
    run_pipeline(&mut program, &optimizer())?;
    assert!(!program[program.get("cat")?].can_be_optimized());
    Ok(())
}
