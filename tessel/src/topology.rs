use crate::{Primitive, PrimitiveId};

/// Collection of primitive descriptors forming a computation graph.
/// Order of primitives does not need to follow dependencies.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    primitives: Vec<Primitive>,
    outputs: Vec<PrimitiveId>,
}

impl Topology {
    /// Empty topology
    #[must_use]
    pub fn new() -> Topology {
        Topology::default()
    }

    /// Add primitive
    pub fn add(&mut self, primitive: Primitive) -> &mut Topology {
        self.primitives.push(primitive);
        self
    }

    /// Declare outputs. Without declared outputs every primitive without users is an output.
    pub fn set_outputs(&mut self, outputs: &[&str]) -> &mut Topology {
        self.outputs = outputs.iter().map(|x| PrimitiveId::from(*x)).collect();
        self
    }

    /// Primitives in insertion order
    #[must_use]
    pub fn primitives(&self) -> &[Primitive] {
        &self.primitives
    }

    /// Declared outputs
    #[must_use]
    pub fn outputs(&self) -> &[PrimitiveId] {
        &self.outputs
    }

    /// Number of primitives
    #[must_use]
    pub fn len(&self) -> usize {
        self.primitives.len()
    }

    /// Is there no primitive?
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.primitives.is_empty()
    }
}
