use crate::graph::{NodeId, Program};
use crate::{DType, DeviceInfo, EngineConfig, Format, PrimitiveKind, TesselError};

/// Decides which format each consumer wants for its primary inputs
#[derive(Debug, Clone)]
pub struct LayoutOptimizer {
    optimize_data: bool,
    subgroups: bool,
}

impl LayoutOptimizer {
    /// Layout optimizer for given device and config
    #[must_use]
    pub fn new(device: &DeviceInfo, config: &EngineConfig) -> LayoutOptimizer {
        LayoutOptimizer { optimize_data: config.optimize_data, subgroups: device.supports_subgroups }
    }

    /// Is format selection by performance preference enabled?
    #[must_use]
    pub const fn optimize_data(&self) -> bool {
        self.optimize_data
    }

    /// Format consumer needs for its primary input at index,
    /// None if the current format of that input is fine.
    pub fn required_input_format(
        &self,
        program: &mut Program,
        consumer: NodeId,
        index: usize,
    ) -> Result<Option<Format>, TesselError> {
        if index >= program[consumer].input_count() {
            return Ok(None);
        }
        let input = program.output_layout(program[consumer].deps()[index])?;
        let required = match program[consumer].kind() {
            PrimitiveKind::Convolution => {
                let f16_blocked = self.optimize_data
                    && self.subgroups
                    && input.dtype == DType::F16
                    && input.size.feature % 16 == 0
                    && input.size.batch == 1;
                if f16_blocked {
                    Format::Bfyx_f16
                } else if input.format == Format::Yxfb {
                    Format::Yxfb
                } else {
                    Format::Bfyx
                }
            }
            PrimitiveKind::FullyConnected => {
                if self.optimize_data && input.size.batch >= 8 && input.dtype == DType::F32 {
                    Format::Yxfb
                } else {
                    Format::Bfyx
                }
            }
            PrimitiveKind::Eltwise | PrimitiveKind::Concatenation => {
                if index == 0 {
                    return Ok(None);
                }
                let first = program[consumer].deps()[0];
                program.output_layout(first)?.format
            }
            PrimitiveKind::Deconvolution
            | PrimitiveKind::Embed
            | PrimitiveKind::Softmax
            | PrimitiveKind::ArgMaxMin
            | PrimitiveKind::OneHot
            | PrimitiveKind::DetectionOutput => Format::Bfyx,
            PrimitiveKind::InputLayout
            | PrimitiveKind::Data
            | PrimitiveKind::Pooling
            | PrimitiveKind::Activation
            | PrimitiveKind::Reshape
            | PrimitiveKind::Reorder => return Ok(None),
        };
        Ok((required != input.format).then_some(required))
    }
}
