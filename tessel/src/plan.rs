//! Compiled plan, the list of kernel launches handed to the execution engine.

use crate::dispatch::Dispatch;
use crate::graph::{NodeId, Program};
use crate::registry::Priority;
use crate::selector::Selection;
use crate::{PrimitiveId, PrimitiveKind, TesselError};
use std::collections::BTreeMap;
use std::fmt::Display;

/// Role of one kernel argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ArgKind {
    /// Primary input with index
    Input(usize),
    /// Weights tensor with index
    Weights(usize),
    /// Bias tensor with index
    Bias(usize),
    /// Output buffer
    Output,
}

/// Kernel argument bound to the buffer that owns the data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgBinding {
    /// Role of the argument
    pub arg: ArgKind,
    /// Buffer, nodes working in place resolve to the buffer they write into
    pub buffer: PrimitiveId,
}

/// One kernel launch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanEntry {
    /// Primitive executed by this launch
    pub primitive: PrimitiveId,
    /// Kind of the primitive
    pub kind: PrimitiveKind,
    /// Name of kernel implementation
    pub kernel: &'static str,
    /// Unique entry point name within the plan
    pub entry_point: String,
    /// Tuning variant
    pub variant: usize,
    /// Launch geometry
    pub dispatch: Dispatch,
    /// Arguments in order inputs, weights, biases, output
    pub arguments: Vec<ArgBinding>,
    /// Static priority of the kernel
    pub priority: Priority,
    /// Kernel came from the tuning cache
    pub from_cache: bool,
}

/// Kernel launches in execution order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompiledPlan {
    /// Launches, every entry comes after the entries producing its inputs
    pub entries: Vec<PlanEntry>,
    /// Output primitives
    pub outputs: Vec<PrimitiveId>,
    /// Primitives without a launch of their own mapped to the buffer holding their data
    pub aliases: BTreeMap<PrimitiveId, PrimitiveId>,
}

impl CompiledPlan {
    /// Builds plan from optimized program with kernel selected for every kernel node
    pub(crate) fn build(
        program: &mut Program,
        selections: &BTreeMap<NodeId, Selection>,
        meaningful_kernel_names: bool,
    ) -> Result<CompiledPlan, TesselError> {
        let mut plan = CompiledPlan::default();
        for node in program.processing_order() {
            let n = &program[node];
            if n.kind().is_memory() {
                continue;
            }
            if n.can_be_optimized() {
                let owner = buffer_owner(program, node);
                if owner != node {
                    plan.aliases.insert(n.id().clone(), program[owner].id().clone());
                }
                continue;
            }
            let Some(selection) = selections.get(&node) else {
                return Err(TesselError::shape_error(n.id(), "node has no selected kernel"));
            };
            let input_count = n.input_count();
            let weights_count = n.desc().weights().len();
            let mut arguments: Vec<ArgBinding> = n
                .deps()
                .iter()
                .enumerate()
                .map(|(i, &dep)| {
                    let arg = if i < input_count {
                        ArgKind::Input(i)
                    } else if i < input_count + weights_count {
                        ArgKind::Weights(i - input_count)
                    } else {
                        ArgKind::Bias(i - input_count - weights_count)
                    };
                    ArgBinding { arg, buffer: program[buffer_owner(program, dep)].id().clone() }
                })
                .collect();
            arguments.push(ArgBinding { arg: ArgKind::Output, buffer: program[buffer_owner(program, node)].id().clone() });
            if n.reused_in_place() {
                plan.aliases.insert(n.id().clone(), program[buffer_owner(program, node)].id().clone());
            }
            let name = if meaningful_kernel_names { sanitize(n.id().as_str()) } else { selection.kernel.into() };
            plan.entries.push(PlanEntry {
                primitive: n.id().clone(),
                kind: n.kind(),
                kernel: selection.kernel,
                entry_point: format!("{name}_{}", plan.entries.len()),
                variant: selection.variant,
                dispatch: selection.dispatch,
                arguments,
                priority: selection.priority,
                from_cache: selection.from_cache,
            });
        }
        plan.outputs = program.outputs().into_iter().map(|o| program[o].id().clone()).collect();
        Ok(plan)
    }

    /// Launch of given primitive
    #[must_use]
    pub fn entry(&self, primitive: &str) -> Option<&PlanEntry> {
        self.entries.iter().find(|e| e.primitive == primitive)
    }

    /// Number of launches
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Is the plan empty?
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Node whose buffer holds the data of node. In place reshapes read their input's
/// buffer, producers reused in place write into their user's buffer.
fn buffer_owner(program: &Program, mut node: NodeId) -> NodeId {
    loop {
        let n = &program[node];
        if n.kind() == PrimitiveKind::Reshape && n.can_be_optimized() {
            node = n.deps()[0];
        } else if n.reused_in_place() {
            match n.users().first() {
                Some(&user) => node = user,
                None => return node,
            }
        } else {
            return node;
        }
    }
}

fn sanitize(id: &str) -> String {
    id.chars().map(|c| if c.is_ascii_alphanumeric() { c } else { '_' }).collect()
}

impl Display for CompiledPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for entry in &self.entries {
            f.write_fmt(format_args!(
                "{:>4} {} {} {} global {:?} local {:?}{}\n",
                entry.priority.to_string(),
                entry.entry_point,
                entry.kind,
                entry.primitive,
                entry.dispatch.global,
                entry.dispatch.local,
                if entry.from_cache { " cached" } else { "" },
            ))?;
            for binding in &entry.arguments {
                f.write_fmt(format_args!("       {:?} <- {}\n", binding.arg, binding.buffer))?;
            }
        }
        for (alias, owner) in &self.aliases {
            f.write_fmt(format_args!("  {alias} aliases {owner}\n"))?;
        }
        Ok(())
    }
}
