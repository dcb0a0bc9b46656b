use tessel::graph::Program;
use tessel::{
    ActivationFunc, DType, DebugMask, EltwiseMode, Format, Layout, Padding, Primitive, PrimitiveId,
    Shape, TesselError, Topology,
};

fn f32_bfyx(b: usize, f: usize, y: usize, x: usize) -> Layout {
    Layout::new(DType::F32, Format::Bfyx, Shape::new(b, f, y, x))
}

#[test]
fn processing_order_puts_dependencies_first() -> Result<(), TesselError> {
    let mut topology = Topology::new();
    // Added out of dependency order on purpose
    topology
        .add(Primitive::softmax("sm", "sum"))
        .add(Primitive::eltwise("sum", &["relu", "in"], EltwiseMode::Sum, Vec::new())?)
        .add(Primitive::activation("relu", "in", ActivationFunc::Relu))
        .add(Primitive::input_layout("in", f32_bfyx(1, 8, 4, 4)));
    let mut program = Program::build(&topology, DebugMask::default())?;
    let order = program.processing_order();
    assert_eq!(order.len(), 4);
    for (i, &node) in order.iter().enumerate() {
        for dep in program[node].deps() {
            let position = order.iter().position(|n| n == dep);
            assert!(position.is_some_and(|p| p < i), "{} before its input", program[node].id());
        }
    }
    let outputs = program.outputs();
    assert_eq!(outputs.len(), 1);
    assert_eq!(program[outputs[0]].id(), &PrimitiveId::from("sm"));
    Ok(())
}

#[test]
fn dangling_input() {
    let mut topology = Topology::new();
    topology
        .add(Primitive::input_layout("in", f32_bfyx(1, 1, 1, 1)))
        .add(Primitive::activation("act", "missing_42", ActivationFunc::Relu));
    match Program::build(&topology, DebugMask::default()) {
        Err(TesselError::DanglingDependency(id)) => assert_eq!(id, "missing_42"),
        other => panic!("expected dangling dependency, got {other:?}"),
    }
}

#[test]
fn cycle_is_rejected() {
    let mut topology = Topology::new();
    topology
        .add(Primitive::activation("a", "b", ActivationFunc::Relu))
        .add(Primitive::activation("b", "a", ActivationFunc::Tanh));
    assert!(matches!(
        Program::build(&topology, DebugMask::default()),
        Err(TesselError::GraphCycle(_))
    ));
}

#[test]
fn duplicate_id_is_rejected() {
    let mut topology = Topology::new();
    topology
        .add(Primitive::input_layout("x", f32_bfyx(1, 1, 1, 1)))
        .add(Primitive::activation("x", "x", ActivationFunc::Relu));
    match Program::build(&topology, DebugMask::default()) {
        Err(TesselError::DuplicatePrimitive(id)) => assert_eq!(id, "x"),
        other => panic!("expected duplicate primitive, got {other:?}"),
    }
}

#[test]
fn declared_outputs() -> Result<(), TesselError> {
    let mut topology = Topology::new();
    topology
        .add(Primitive::input_layout("in", f32_bfyx(1, 4, 2, 2)))
        .add(Primitive::activation("relu", "in", ActivationFunc::Relu))
        .add(Primitive::softmax("sm", "relu"))
        .set_outputs(&["relu"]);
    let program = Program::build(&topology, DebugMask::default())?;
    let outputs: Vec<_> = program.outputs().into_iter().map(|o| program[o].id().clone()).collect();
    assert_eq!(outputs, vec![PrimitiveId::from("relu")]);

    topology.set_outputs(&["nothing"]);
    assert!(matches!(
        Program::build(&topology, DebugMask::default()),
        Err(TesselError::DanglingDependency(_))
    ));
    Ok(())
}

#[test]
fn layouts_follow_padding_changes() -> Result<(), TesselError> {
    let mut topology = Topology::new();
    topology
        .add(Primitive::input_layout("in", f32_bfyx(2, 3, 10, 10)))
        .add(Primitive::activation("relu", "in", ActivationFunc::Relu))
        .add(Primitive::reshape("flat", "relu", Shape::new(2, 300, 1, 1)));
    let mut program = Program::build(&topology, DebugMask::default())?;
    let relu = program.get("relu")?;
    let flat = program.get("flat")?;
    assert_eq!(program.output_layout(flat)?.size, Shape::new(2, 300, 1, 1));
    program.set_output_padding(relu, Padding::spatial(1, 1));
    // Reshape memo was cleared together with its input
    assert!(program[flat].cached_layout().is_none());
    assert_eq!(program.output_layout(relu)?.padding, Padding::spatial(1, 1));
    assert!(program.output_layout(flat)?.padding.is_zero());
    Ok(())
}

#[test]
fn shape_errors_surface_at_layout_inference() -> Result<(), TesselError> {
    let mut topology = Topology::new();
    topology
        .add(Primitive::input_layout("a", f32_bfyx(1, 3, 4, 4)))
        .add(Primitive::input_layout("b", f32_bfyx(1, 3, 4, 5)))
        .add(Primitive::eltwise("sum", &["a", "b"], EltwiseMode::Sum, Vec::new())?);
    let mut program = Program::build(&topology, DebugMask::default())?;
    assert!(matches!(program.finalize_layouts(), Err(TesselError::ShapeError { .. })));
    Ok(())
}

#[test]
fn dot_graph_lists_every_node() -> Result<(), TesselError> {
    let mut topology = Topology::new();
    topology
        .add(Primitive::input_layout("in", f32_bfyx(1, 1, 2, 2)))
        .add(Primitive::activation("relu", "in", ActivationFunc::Relu));
    let mut program = Program::build(&topology, DebugMask::default())?;
    program.finalize_layouts()?;
    let dot = program.plot_dot_graph();
    assert!(dot.starts_with("strict digraph"));
    assert!(dot.contains("relu"));
    assert!(dot.contains("0 -> 1"));
    Ok(())
}
