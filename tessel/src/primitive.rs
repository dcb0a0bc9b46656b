//! Primitive descriptors, the user facing description of one tensor operation.
//!
//! Each descriptor is immutable after construction. Constructors validate
//! parameters, so every descriptor that exists is well formed on its own.
//! Whether it fits its inputs is checked later by [`Primitive::calc_output_layout`].

use crate::capability::{CapabilityKey, Feature};
use crate::{DType, Format, Layout, Padding, Shape, TesselError};
use std::fmt::{Display, Write};

/// Unique name of a primitive inside a topology
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PrimitiveId(String);

impl PrimitiveId {
    /// Id as string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PrimitiveId {
    fn from(value: &str) -> Self {
        PrimitiveId(value.into())
    }
}

impl From<String> for PrimitiveId {
    fn from(value: String) -> Self {
        PrimitiveId(value)
    }
}

impl From<&PrimitiveId> for PrimitiveId {
    fn from(value: &PrimitiveId) -> Self {
        value.clone()
    }
}

impl PartialEq<&str> for PrimitiveId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl PartialEq<str> for PrimitiveId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl Display for PrimitiveId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of operation, closed set
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PrimitiveKind {
    /// Input, filled by the user at execution time
    InputLayout,
    /// Constant data, weights and biases
    Data,
    /// 2D convolution
    Convolution,
    /// 2D transposed convolution
    Deconvolution,
    /// Fully connected layer
    FullyConnected,
    /// Embedding lookup
    Embed,
    /// Max or average pooling
    Pooling,
    /// Elementwise operation over several inputs
    Eltwise,
    /// Unary activation
    Activation,
    /// Change of shape without change of data
    Reshape,
    /// Change of format or data type without change of values
    Reorder,
    /// Concatenation along one axis
    Concatenation,
    /// Softmax along features
    Softmax,
    /// Top k indices of maximal or minimal values
    ArgMaxMin,
    /// One hot encoding
    OneHot,
    /// SSD detection output
    DetectionOutput,
}

impl PrimitiveKind {
    /// Name used in signatures and logs
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            PrimitiveKind::InputLayout => "input_layout",
            PrimitiveKind::Data => "data",
            PrimitiveKind::Convolution => "convolution",
            PrimitiveKind::Deconvolution => "deconvolution",
            PrimitiveKind::FullyConnected => "fully_connected",
            PrimitiveKind::Embed => "embed",
            PrimitiveKind::Pooling => "pooling",
            PrimitiveKind::Eltwise => "eltwise",
            PrimitiveKind::Activation => "activation",
            PrimitiveKind::Reshape => "reshape",
            PrimitiveKind::Reorder => "reorder",
            PrimitiveKind::Concatenation => "concatenation",
            PrimitiveKind::Softmax => "softmax",
            PrimitiveKind::ArgMaxMin => "arg_max_min",
            PrimitiveKind::OneHot => "one_hot",
            PrimitiveKind::DetectionOutput => "detection_output",
        }
    }

    /// Kinds that hold memory instead of running a kernel
    #[must_use]
    pub const fn is_memory(&self) -> bool {
        matches!(self, PrimitiveKind::InputLayout | PrimitiveKind::Data)
    }
}

impl Display for PrimitiveKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unary activation function
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActivationFunc {
    /// max(0, x)
    Relu,
    /// x for positive x, slope * x otherwise
    ReluNegativeSlope(f32),
    /// min(max(x, low), high)
    Clamp(f32, f32),
    /// 1 / (1 + exp(-x))
    Sigmoid,
    /// tanh(x)
    Tanh,
    /// exp(x) - 1 for negative x, x otherwise
    Elu,
    /// |x|
    Abs,
    /// a * x + b
    Linear(f32, f32),
}

impl Display for ActivationFunc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActivationFunc::Relu => f.write_str("relu"),
            ActivationFunc::ReluNegativeSlope(s) => f.write_fmt(format_args!("relu_negative_slope({s})")),
            ActivationFunc::Clamp(l, h) => f.write_fmt(format_args!("clamp({l},{h})")),
            ActivationFunc::Sigmoid => f.write_str("sigmoid"),
            ActivationFunc::Tanh => f.write_str("tanh"),
            ActivationFunc::Elu => f.write_str("elu"),
            ActivationFunc::Abs => f.write_str("abs"),
            ActivationFunc::Linear(a, b) => f.write_fmt(format_args!("linear({a},{b})")),
        }
    }
}

/// Tensor axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Axis {
    /// Batch
    Batch,
    /// Feature
    Feature,
    /// Spatial x
    X,
    /// Spatial y
    Y,
}

impl Axis {
    /// Capability feature of reductions along this axis
    #[must_use]
    pub const fn feature(&self) -> Feature {
        match self {
            Axis::Batch => Feature::AxisBatch,
            Axis::Feature => Feature::AxisFeature,
            Axis::X => Feature::AxisX,
            Axis::Y => Feature::AxisY,
        }
    }

    const fn as_str(&self) -> &'static str {
        match self {
            Axis::Batch => "b",
            Axis::Feature => "f",
            Axis::X => "x",
            Axis::Y => "y",
        }
    }
}

/// Elementwise operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EltwiseMode {
    /// a + b
    Sum,
    /// a - b
    Sub,
    /// a * b
    Prod,
    /// max(a, b)
    Max,
    /// min(a, b)
    Min,
}

/// Pooling operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PoolingMode {
    /// Maximum of window
    Max,
    /// Average of window, padding included
    Average,
}

/// Maximum or minimum for arg max min
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ArgMode {
    /// Indices of largest values
    Max,
    /// Indices of smallest values
    Min,
}

/// Parameters of convolution and deconvolution, spatial pairs are (x, y)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConvolutionParams {
    /// Stride
    pub stride: [usize; 2],
    /// Dilation
    pub dilation: [usize; 2],
    /// Symmetric input padding
    pub padding: [usize; 2],
    /// Number of independent weight tensors the input features are split into
    pub split: usize,
    /// Number of groups of one grouped weight tensor
    pub groups: usize,
}

impl Default for ConvolutionParams {
    fn default() -> Self {
        ConvolutionParams { stride: [1, 1], dilation: [1, 1], padding: [0, 0], split: 1, groups: 1 }
    }
}

impl ConvolutionParams {
    /// Default parameters with given stride and padding
    #[must_use]
    pub fn new(stride: [usize; 2], padding: [usize; 2]) -> ConvolutionParams {
        ConvolutionParams { stride, padding, ..Default::default() }
    }
}

/// Parameters of pooling, spatial pairs are (x, y)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolingParams {
    /// Max or average
    pub mode: PoolingMode,
    /// Window size
    pub size: [usize; 2],
    /// Stride
    pub stride: [usize; 2],
    /// Symmetric input padding
    pub padding: [usize; 2],
}

/// Parameters of SSD detection output
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionOutputParams {
    /// Number of classes, background included
    pub num_classes: usize,
    /// Number of boxes kept per image after non maximum suppression
    pub keep_top_k: usize,
    /// Number of boxes considered by non maximum suppression, 0 means all
    pub top_k: usize,
    /// Label of background class, 0 means none is skipped explicitly
    pub background_label_id: i32,
    /// Shift labels down by one to skip background label 0
    pub decrease_label_id: bool,
    /// Same box locations for all classes
    pub share_location: bool,
    /// Non maximum suppression overlap threshold
    pub nms_threshold: f32,
    /// Minimal confidence of kept boxes
    pub confidence_threshold: f32,
}

impl Default for DetectionOutputParams {
    fn default() -> Self {
        DetectionOutputParams {
            num_classes: 2,
            keep_top_k: 200,
            top_k: 0,
            background_label_id: 0,
            decrease_label_id: false,
            share_location: true,
            nms_threshold: 0.45,
            confidence_threshold: 0.01,
        }
    }
}

/// Operation with its immutable parameters. Auxiliary inputs (weights, biases)
/// are named here and follow the primary inputs in the dependency list.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// Input filled at execution time
    InputLayout {
        /// Layout of the input
        layout: Layout,
    },
    /// Constant memory
    Data {
        /// Layout of the constant
        layout: Layout,
    },
    /// Convolution
    Convolution {
        /// One weights tensor per split
        weights: Vec<PrimitiveId>,
        /// Empty or one bias per weights tensor
        bias: Vec<PrimitiveId>,
        /// Geometry
        params: ConvolutionParams,
    },
    /// Transposed convolution
    Deconvolution {
        /// One weights tensor per split
        weights: Vec<PrimitiveId>,
        /// Empty or one bias per weights tensor
        bias: Vec<PrimitiveId>,
        /// Geometry
        params: ConvolutionParams,
    },
    /// Fully connected
    FullyConnected {
        /// Weights (ofm, ifm, y, x)
        weights: PrimitiveId,
        /// Bias
        bias: Option<PrimitiveId>,
    },
    /// Embedding lookup
    Embed {
        /// Weights (embedding width, vocabulary, 1, 1)
        weights: PrimitiveId,
        /// Bias
        bias: Option<PrimitiveId>,
    },
    /// Pooling
    Pooling(PoolingParams),
    /// Elementwise
    Eltwise {
        /// Operation
        mode: EltwiseMode,
        /// Per input coefficients, empty or one per input, only for sum
        coefficients: Vec<f32>,
    },
    /// Activation
    Activation(ActivationFunc),
    /// Reshape to given shape
    Reshape(Shape),
    /// Reorder to given format and data type
    Reorder {
        /// Target format
        format: Format,
        /// Target data type
        dtype: DType,
    },
    /// Concatenation
    Concatenation(Axis),
    /// Softmax along features
    Softmax,
    /// Arg max or min
    ArgMaxMin {
        /// Max or min
        mode: ArgMode,
        /// Number of indices
        top_k: usize,
        /// Reduced axis, none means all dimensions but batch
        axis: Option<Axis>,
    },
    /// One hot
    OneHot {
        /// Output shape
        shape: Shape,
        /// Axis of the one hot dimension in b, f, y, x order
        axis: usize,
    },
    /// Detection output over location, confidence and prior box inputs
    DetectionOutput(DetectionOutputParams),
}

/// Descriptor of one operation in a topology
#[derive(Debug, Clone, PartialEq)]
pub struct Primitive {
    /// Unique id
    pub id: PrimitiveId,
    /// Primary inputs
    pub inputs: Vec<PrimitiveId>,
    /// Operation and its parameters
    pub op: Op,
    /// Requested padding of the output buffer
    pub output_padding: Padding,
}

fn ids(inputs: &[&str]) -> Vec<PrimitiveId> {
    inputs.iter().map(|x| PrimitiveId::from(*x)).collect()
}

impl Primitive {
    fn new(id: impl Into<PrimitiveId>, inputs: Vec<PrimitiveId>, op: Op) -> Primitive {
        Primitive { id: id.into(), inputs, op, output_padding: Padding::none() }
    }

    /// Input with given layout
    pub fn input_layout(id: impl Into<PrimitiveId>, layout: Layout) -> Primitive {
        Primitive::new(id, Vec::new(), Op::InputLayout { layout })
    }

    /// Constant data with given layout
    pub fn data(id: impl Into<PrimitiveId>, layout: Layout) -> Primitive {
        Primitive::new(id, Vec::new(), Op::Data { layout })
    }

    /// Convolution with one weights (and optionally bias) tensor per split
    pub fn convolution(
        id: impl Into<PrimitiveId>,
        input: impl Into<PrimitiveId>,
        weights: &[&str],
        bias: &[&str],
        params: ConvolutionParams,
    ) -> Result<Primitive, TesselError> {
        let id = id.into();
        validate_convolution(&id, weights.len(), bias.len(), &params)?;
        let op = Op::Convolution { weights: ids(weights), bias: ids(bias), params };
        Ok(Primitive::new(id, vec![input.into()], op))
    }

    /// Transposed convolution
    pub fn deconvolution(
        id: impl Into<PrimitiveId>,
        input: impl Into<PrimitiveId>,
        weights: &[&str],
        bias: &[&str],
        params: ConvolutionParams,
    ) -> Result<Primitive, TesselError> {
        let id = id.into();
        validate_convolution(&id, weights.len(), bias.len(), &params)?;
        if params.dilation != [1, 1] {
            return Err(TesselError::parameter_error(&id, "deconvolution does not support dilation"));
        }
        let op = Op::Deconvolution { weights: ids(weights), bias: ids(bias), params };
        Ok(Primitive::new(id, vec![input.into()], op))
    }

    /// Fully connected
    pub fn fully_connected(
        id: impl Into<PrimitiveId>,
        input: impl Into<PrimitiveId>,
        weights: impl Into<PrimitiveId>,
        bias: Option<&str>,
    ) -> Primitive {
        let op = Op::FullyConnected { weights: weights.into(), bias: bias.map(PrimitiveId::from) };
        Primitive::new(id, vec![input.into()], op)
    }

    /// Embedding lookup
    pub fn embed(
        id: impl Into<PrimitiveId>,
        input: impl Into<PrimitiveId>,
        weights: impl Into<PrimitiveId>,
        bias: Option<&str>,
    ) -> Primitive {
        let op = Op::Embed { weights: weights.into(), bias: bias.map(PrimitiveId::from) };
        Primitive::new(id, vec![input.into()], op)
    }

    /// Pooling
    pub fn pooling(
        id: impl Into<PrimitiveId>,
        input: impl Into<PrimitiveId>,
        params: PoolingParams,
    ) -> Result<Primitive, TesselError> {
        let id = id.into();
        if params.size.contains(&0) || params.stride.contains(&0) {
            return Err(TesselError::parameter_error(&id, "pooling size and stride must be non zero"));
        }
        Ok(Primitive::new(id, vec![input.into()], Op::Pooling(params)))
    }

    /// Elementwise operation, coefficients are allowed only for sum
    pub fn eltwise(
        id: impl Into<PrimitiveId>,
        inputs: &[&str],
        mode: EltwiseMode,
        coefficients: Vec<f32>,
    ) -> Result<Primitive, TesselError> {
        let id = id.into();
        if inputs.len() < 2 {
            return Err(TesselError::parameter_error(&id, "eltwise needs at least two inputs"));
        }
        if !coefficients.is_empty() {
            if mode != EltwiseMode::Sum {
                return Err(TesselError::parameter_error(
                    &id,
                    "coefficients are supported only for sum",
                ));
            }
            if coefficients.len() != inputs.len() {
                return Err(TesselError::parameter_error(
                    &id,
                    format!(
                        "got {} coefficients for {} inputs",
                        coefficients.len(),
                        inputs.len()
                    ),
                ));
            }
        }
        Ok(Primitive::new(id, ids(inputs), Op::Eltwise { mode, coefficients }))
    }

    /// Activation
    pub fn activation(
        id: impl Into<PrimitiveId>,
        input: impl Into<PrimitiveId>,
        func: ActivationFunc,
    ) -> Primitive {
        Primitive::new(id, vec![input.into()], Op::Activation(func))
    }

    /// Reshape
    pub fn reshape(id: impl Into<PrimitiveId>, input: impl Into<PrimitiveId>, shape: Shape) -> Primitive {
        Primitive::new(id, vec![input.into()], Op::Reshape(shape))
    }

    /// Reorder to given format and data type
    pub fn reorder(
        id: impl Into<PrimitiveId>,
        input: impl Into<PrimitiveId>,
        format: Format,
        dtype: DType,
    ) -> Primitive {
        Primitive::new(id, vec![input.into()], Op::Reorder { format, dtype })
    }

    /// Concatenation
    pub fn concatenation(
        id: impl Into<PrimitiveId>,
        inputs: &[&str],
        axis: Axis,
    ) -> Result<Primitive, TesselError> {
        let id = id.into();
        if inputs.is_empty() {
            return Err(TesselError::parameter_error(&id, "concatenation needs at least one input"));
        }
        Ok(Primitive::new(id, ids(inputs), Op::Concatenation(axis)))
    }

    /// Softmax along features
    pub fn softmax(id: impl Into<PrimitiveId>, input: impl Into<PrimitiveId>) -> Primitive {
        Primitive::new(id, vec![input.into()], Op::Softmax)
    }

    /// Arg max or min
    pub fn arg_max_min(
        id: impl Into<PrimitiveId>,
        input: impl Into<PrimitiveId>,
        mode: ArgMode,
        top_k: usize,
        axis: Option<Axis>,
    ) -> Result<Primitive, TesselError> {
        let id = id.into();
        if top_k == 0 {
            return Err(TesselError::parameter_error(&id, "top_k must be at least 1"));
        }
        Ok(Primitive::new(id, vec![input.into()], Op::ArgMaxMin { mode, top_k, axis }))
    }

    /// One hot, axis counts b, f, y, x from 0
    pub fn one_hot(
        id: impl Into<PrimitiveId>,
        input: impl Into<PrimitiveId>,
        shape: Shape,
        axis: usize,
    ) -> Result<Primitive, TesselError> {
        let id = id.into();
        if axis > 3 {
            return Err(TesselError::parameter_error(&id, "one_hot axis should be less or equal to 3"));
        }
        Ok(Primitive::new(id, vec![input.into()], Op::OneHot { shape, axis }))
    }

    /// Detection output over location, confidence and prior box inputs
    pub fn detection_output(
        id: impl Into<PrimitiveId>,
        location: impl Into<PrimitiveId>,
        confidence: impl Into<PrimitiveId>,
        prior_box: impl Into<PrimitiveId>,
        params: DetectionOutputParams,
    ) -> Result<Primitive, TesselError> {
        let id = id.into();
        if params.decrease_label_id && params.background_label_id != 0 {
            return Err(TesselError::parameter_error(
                &id,
                "cannot use decrease_label_id and background_label_id simultaneously",
            ));
        }
        if params.keep_top_k == 0 || params.num_classes == 0 {
            return Err(TesselError::parameter_error(&id, "keep_top_k and num_classes must be non zero"));
        }
        let inputs = vec![location.into(), confidence.into(), prior_box.into()];
        Ok(Primitive::new(id, inputs, Op::DetectionOutput(params)))
    }

    /// Same primitive, with padding requested around its output
    #[must_use]
    pub fn with_output_padding(mut self, padding: Padding) -> Primitive {
        self.output_padding = padding;
        self
    }

    /// Kind of this primitive
    #[must_use]
    pub const fn kind(&self) -> PrimitiveKind {
        match self.op {
            Op::InputLayout { .. } => PrimitiveKind::InputLayout,
            Op::Data { .. } => PrimitiveKind::Data,
            Op::Convolution { .. } => PrimitiveKind::Convolution,
            Op::Deconvolution { .. } => PrimitiveKind::Deconvolution,
            Op::FullyConnected { .. } => PrimitiveKind::FullyConnected,
            Op::Embed { .. } => PrimitiveKind::Embed,
            Op::Pooling(_) => PrimitiveKind::Pooling,
            Op::Eltwise { .. } => PrimitiveKind::Eltwise,
            Op::Activation(_) => PrimitiveKind::Activation,
            Op::Reshape(_) => PrimitiveKind::Reshape,
            Op::Reorder { .. } => PrimitiveKind::Reorder,
            Op::Concatenation(_) => PrimitiveKind::Concatenation,
            Op::Softmax => PrimitiveKind::Softmax,
            Op::ArgMaxMin { .. } => PrimitiveKind::ArgMaxMin,
            Op::OneHot { .. } => PrimitiveKind::OneHot,
            Op::DetectionOutput(_) => PrimitiveKind::DetectionOutput,
        }
    }

    /// Weights inputs, empty for kinds without weights
    #[must_use]
    pub fn weights(&self) -> &[PrimitiveId] {
        match &self.op {
            Op::Convolution { weights, .. } | Op::Deconvolution { weights, .. } => weights,
            Op::FullyConnected { weights, .. } | Op::Embed { weights, .. } => std::slice::from_ref(weights),
            _ => &[],
        }
    }

    /// Bias inputs, empty for kinds without bias
    #[must_use]
    pub fn bias(&self) -> &[PrimitiveId] {
        match &self.op {
            Op::Convolution { bias, .. } | Op::Deconvolution { bias, .. } => bias,
            Op::FullyConnected { bias, .. } | Op::Embed { bias, .. } => bias.as_slice(),
            _ => &[],
        }
    }

    /// All dependencies, primary inputs followed by weights and biases
    #[must_use]
    pub fn dependencies(&self) -> Vec<PrimitiveId> {
        let mut deps = self.inputs.clone();
        deps.extend(self.weights().iter().cloned());
        deps.extend(self.bias().iter().cloned());
        deps
    }

    fn mismatch(&self, expected: PrimitiveKind) -> TesselError {
        TesselError::KindMismatch { id: self.id.clone(), expected, found: self.kind() }
    }

    /// Layout of input or data primitive
    pub fn as_memory(&self) -> Result<&Layout, TesselError> {
        match &self.op {
            Op::InputLayout { layout } | Op::Data { layout } => Ok(layout),
            _ => Err(self.mismatch(PrimitiveKind::Data)),
        }
    }

    /// Convolution parameters
    pub fn as_convolution(&self) -> Result<&ConvolutionParams, TesselError> {
        match &self.op {
            Op::Convolution { params, .. } => Ok(params),
            _ => Err(self.mismatch(PrimitiveKind::Convolution)),
        }
    }

    /// Deconvolution parameters
    pub fn as_deconvolution(&self) -> Result<&ConvolutionParams, TesselError> {
        match &self.op {
            Op::Deconvolution { params, .. } => Ok(params),
            _ => Err(self.mismatch(PrimitiveKind::Deconvolution)),
        }
    }

    /// Pooling parameters
    pub fn as_pooling(&self) -> Result<&PoolingParams, TesselError> {
        match &self.op {
            Op::Pooling(params) => Ok(params),
            _ => Err(self.mismatch(PrimitiveKind::Pooling)),
        }
    }

    /// Eltwise mode and coefficients
    pub fn as_eltwise(&self) -> Result<(EltwiseMode, &[f32]), TesselError> {
        match &self.op {
            Op::Eltwise { mode, coefficients } => Ok((*mode, coefficients)),
            _ => Err(self.mismatch(PrimitiveKind::Eltwise)),
        }
    }

    /// Activation function
    pub fn as_activation(&self) -> Result<ActivationFunc, TesselError> {
        match &self.op {
            Op::Activation(func) => Ok(*func),
            _ => Err(self.mismatch(PrimitiveKind::Activation)),
        }
    }

    /// Target shape of reshape
    pub fn as_reshape(&self) -> Result<Shape, TesselError> {
        match &self.op {
            Op::Reshape(shape) => Ok(*shape),
            _ => Err(self.mismatch(PrimitiveKind::Reshape)),
        }
    }

    /// Target format and data type of reorder
    pub fn as_reorder(&self) -> Result<(Format, DType), TesselError> {
        match &self.op {
            Op::Reorder { format, dtype } => Ok((*format, *dtype)),
            _ => Err(self.mismatch(PrimitiveKind::Reorder)),
        }
    }

    /// Concatenation axis
    pub fn as_concatenation(&self) -> Result<Axis, TesselError> {
        match &self.op {
            Op::Concatenation(axis) => Ok(*axis),
            _ => Err(self.mismatch(PrimitiveKind::Concatenation)),
        }
    }

    /// Mode, top k and axis of arg max min
    pub fn as_arg_max_min(&self) -> Result<(ArgMode, usize, Option<Axis>), TesselError> {
        match &self.op {
            Op::ArgMaxMin { mode, top_k, axis } => Ok((*mode, *top_k, *axis)),
            _ => Err(self.mismatch(PrimitiveKind::ArgMaxMin)),
        }
    }

    /// Detection output parameters
    pub fn as_detection_output(&self) -> Result<&DetectionOutputParams, TesselError> {
        match &self.op {
            Op::DetectionOutput(params) => Ok(params),
            _ => Err(self.mismatch(PrimitiveKind::DetectionOutput)),
        }
    }

    /// Features required by parameters of this primitive,
    /// features that depend on layouts are added by the selector.
    #[must_use]
    pub fn features(&self) -> CapabilityKey {
        let mut key = CapabilityKey::empty();
        match &self.op {
            Op::Convolution { bias, params, .. } | Op::Deconvolution { bias, params, .. } => {
                if params.split > 1 {
                    key = key.enable_feature(Feature::SplitSupport);
                }
                if params.groups > 1 {
                    key = key.enable_feature(Feature::Grouped);
                }
                if params.dilation != [1, 1] {
                    key = key.enable_feature(Feature::Dilation);
                }
                if params.padding != [0, 0] {
                    key = key.enable_feature(Feature::InputPadding);
                }
                key = key.enable_feature(if bias.is_empty() {
                    Feature::NonBiasTerm
                } else {
                    Feature::BiasPerFeature
                });
            }
            Op::FullyConnected { bias, .. } | Op::Embed { bias, .. } => {
                key = key.enable_feature(if bias.is_none() {
                    Feature::NonBiasTerm
                } else {
                    Feature::BiasPerFeature
                });
            }
            Op::Pooling(params) => {
                if params.padding != [0, 0] {
                    key = key.enable_feature(Feature::InputPadding);
                }
            }
            Op::Eltwise { coefficients, .. } => {
                if !coefficients.is_empty() {
                    key = key.enable_feature(Feature::EltwiseCoefficients);
                }
            }
            Op::Concatenation(axis) => key = key.enable_feature(axis.feature()),
            Op::Softmax => key = key.enable_feature(Feature::AxisFeature),
            Op::ArgMaxMin { axis, .. } => {
                key = key.enable_feature(axis.map_or(Feature::AxisAll, |a| a.feature()));
            }
            Op::InputLayout { .. }
            | Op::Data { .. }
            | Op::Activation(_)
            | Op::Reshape(_)
            | Op::Reorder { .. }
            | Op::OneHot { .. }
            | Op::DetectionOutput(_) => {}
        }
        key
    }

    /// Deterministic string of the parameters, part of operation signatures
    #[must_use]
    pub fn param_string(&self) -> String {
        let mut s = String::new();
        // Writing into string can not fail
        let _: std::fmt::Result = match &self.op {
            Op::InputLayout { layout } | Op::Data { layout } => write!(s, "{layout}"),
            Op::Convolution { bias, params, .. } | Op::Deconvolution { bias, params, .. } => write!(
                s,
                "s{}x{}_d{}x{}_p{}x{}_split{}_g{}_bias{}",
                params.stride[0],
                params.stride[1],
                params.dilation[0],
                params.dilation[1],
                params.padding[0],
                params.padding[1],
                params.split,
                params.groups,
                !bias.is_empty()
            ),
            Op::FullyConnected { bias, .. } | Op::Embed { bias, .. } => write!(s, "bias{}", bias.is_some()),
            Op::Pooling(params) => write!(
                s,
                "{:?}_k{}x{}_s{}x{}_p{}x{}",
                params.mode,
                params.size[0],
                params.size[1],
                params.stride[0],
                params.stride[1],
                params.padding[0],
                params.padding[1]
            ),
            Op::Eltwise { mode, coefficients } => write!(s, "{mode:?}_{coefficients:?}"),
            Op::Activation(func) => write!(s, "{func}"),
            Op::Reshape(shape) => write!(s, "{shape}"),
            Op::Reorder { format, dtype } => write!(s, "{format}_{dtype}"),
            Op::Concatenation(axis) => write!(s, "{}", axis.as_str()),
            Op::Softmax => Ok(()),
            Op::ArgMaxMin { mode, top_k, axis } => {
                write!(s, "{mode:?}_k{top_k}_{}", axis.map_or("all", |a| a.as_str()))
            }
            Op::OneHot { shape, axis } => write!(s, "{shape}_a{axis}"),
            Op::DetectionOutput(p) => write!(
                s,
                "c{}_keep{}_top{}_bg{}_dec{}_share{}",
                p.num_classes,
                p.keep_top_k,
                p.top_k,
                p.background_label_id,
                p.decrease_label_id,
                p.share_location
            ),
        };
        s
    }

    /// Output layout (without output padding) from layouts of all dependencies,
    /// given in the order of [`Primitive::dependencies`].
    pub fn calc_output_layout(&self, deps: &[Layout]) -> Result<Layout, TesselError> {
        let id = &self.id;
        let input = |i: usize| -> Result<&Layout, TesselError> {
            deps.get(i).ok_or_else(|| {
                TesselError::shape_error(id, format!("missing layout of dependency {i}"))
            })
        };
        match &self.op {
            Op::InputLayout { layout } | Op::Data { layout } => Ok(layout.with_padding(Padding::none())),
            Op::Convolution { params, .. } => {
                let x = input(0)?;
                let w = input(1)?;
                let split = params.split * params.groups;
                if w.size.feature * split != x.size.feature {
                    return Err(TesselError::shape_error(
                        id,
                        format!(
                            "weights take {} input features, input has {}",
                            w.size.feature * split,
                            x.size.feature
                        ),
                    ));
                }
                let mut spatial = [1; 3];
                for d in 0..2 {
                    if w.size.spatial[d] == 0 {
                        return Err(TesselError::shape_error(id, "weights have zero spatial size"));
                    }
                    let padded = x.size.spatial[d] + 2 * params.padding[d];
                    let kernel = (w.size.spatial[d] - 1) * params.dilation[d] + 1;
                    if padded < kernel {
                        return Err(TesselError::shape_error(id, "kernel is larger than padded input"));
                    }
                    spatial[d] = (padded - kernel) / params.stride[d] + 1;
                }
                let ofm = w.size.batch * params.split;
                let size = Shape { batch: x.size.batch, feature: ofm, spatial };
                Ok(Layout::new(x.dtype, x.format, size))
            }
            Op::Deconvolution { params, .. } => {
                let x = input(0)?;
                let w = input(1)?;
                let mut spatial = [1; 3];
                for d in 0..2 {
                    let full = (x.size.spatial[d].max(1) - 1) * params.stride[d] + w.size.spatial[d];
                    if full <= 2 * params.padding[d] {
                        return Err(TesselError::shape_error(id, "padding is larger than output"));
                    }
                    spatial[d] = full - 2 * params.padding[d];
                }
                let ofm = w.size.batch * params.split;
                let size = Shape { batch: x.size.batch, feature: ofm, spatial };
                Ok(Layout::new(x.dtype, x.format, size))
            }
            Op::FullyConnected { .. } => {
                let x = input(0)?;
                let w = input(1)?;
                let in_count = x.size.count() / x.size.batch.max(1);
                let w_count = w.size.count() / w.size.batch.max(1);
                if in_count != w_count {
                    return Err(TesselError::shape_error(
                        id,
                        format!("input has {in_count} elements per batch, weights expect {w_count}"),
                    ));
                }
                let format = if x.format == Format::Yxfb { Format::Yxfb } else { Format::Bfyx };
                Ok(Layout::new(x.dtype, format, Shape::new(x.size.batch, w.size.batch, 1, 1)))
            }
            Op::Embed { .. } => {
                let x = input(0)?;
                let w = input(1)?;
                if x.size.feature != 1 || x.size.y() != 1 {
                    return Err(TesselError::shape_error(id, "embed input must be (batch, 1, 1, length)"));
                }
                Ok(Layout::new(
                    w.dtype,
                    Format::Bfyx,
                    Shape::new(x.size.batch, w.size.batch, 1, x.size.x()),
                ))
            }
            Op::Pooling(params) => {
                let x = input(0)?;
                let mut spatial = [1; 3];
                for d in 0..2 {
                    let padded = x.size.spatial[d] + 2 * params.padding[d];
                    if padded < params.size[d] {
                        return Err(TesselError::shape_error(id, "pooling window is larger than padded input"));
                    }
                    spatial[d] = (padded - params.size[d]).div_ceil(params.stride[d]) + 1;
                }
                let size = Shape { spatial, ..x.size };
                Ok(Layout::new(x.dtype, x.format, size))
            }
            Op::Eltwise { .. } => {
                let x = input(0)?;
                for other in &deps[1..] {
                    if other.size != x.size {
                        return Err(TesselError::shape_error(
                            id,
                            format!("eltwise inputs differ, {} and {}", x.size, other.size),
                        ));
                    }
                }
                Ok(Layout::new(x.dtype, x.format, x.size))
            }
            Op::Activation(_) | Op::Softmax => {
                let x = input(0)?;
                Ok(Layout::new(x.dtype, x.format, x.size))
            }
            Op::Reshape(shape) => {
                let x = input(0)?;
                if shape.count() != x.size.count() {
                    return Err(TesselError::shape_error(
                        id,
                        format!("can not reshape {} to {shape}", x.size),
                    ));
                }
                Ok(Layout::new(x.dtype, x.format, *shape))
            }
            Op::Reorder { format, dtype } => {
                let x = input(0)?;
                Ok(Layout::new(*dtype, *format, x.size))
            }
            Op::Concatenation(axis) => {
                let x = input(0)?;
                let mut size = x.size;
                for other in &deps[1..] {
                    let (mut a, mut b) = (size, other.size);
                    let (sa, sb) = match axis {
                        Axis::Batch => (&mut a.batch, &mut b.batch),
                        Axis::Feature => (&mut a.feature, &mut b.feature),
                        Axis::X => (&mut a.spatial[0], &mut b.spatial[0]),
                        Axis::Y => (&mut a.spatial[1], &mut b.spatial[1]),
                    };
                    let sum = *sa + *sb;
                    *sa = 0;
                    *sb = 0;
                    if a != b {
                        return Err(TesselError::shape_error(
                            id,
                            format!("concatenated inputs differ outside of axis, {} and {}", size, other.size),
                        ));
                    }
                    match axis {
                        Axis::Batch => size.batch = sum,
                        Axis::Feature => size.feature = sum,
                        Axis::X => size.spatial[0] = sum,
                        Axis::Y => size.spatial[1] = sum,
                    }
                }
                Ok(Layout::new(x.dtype, x.format, size))
            }
            Op::ArgMaxMin { top_k, axis, .. } => {
                let x = input(0)?;
                let s = x.size;
                let size = match axis {
                    None => Shape::new(s.batch, 1, *top_k, 1),
                    Some(Axis::Batch) => Shape::new(*top_k, s.feature, s.y(), s.x()),
                    Some(Axis::Feature) => Shape::new(s.batch, *top_k, s.y(), s.x()),
                    Some(Axis::Y) => Shape::new(s.batch, s.feature, *top_k, s.x()),
                    Some(Axis::X) => Shape::new(s.batch, s.feature, s.y(), *top_k),
                };
                Ok(Layout::new(x.dtype, Format::Bfyx, size))
            }
            Op::OneHot { shape, axis } => {
                let x = input(0)?;
                if x.size.batch != 1 {
                    return Err(TesselError::shape_error(id, "one_hot input batch size should be equal to 1"));
                }
                let input_dims = [x.size.batch, x.size.feature, x.size.y(), x.size.x()];
                let output_dims = [shape.batch, shape.feature, shape.y(), shape.x()];
                let mut j = 3;
                for i in (1..=3).rev() {
                    if j == *axis {
                        j -= 1;
                    }
                    if input_dims[i] != output_dims[j] {
                        return Err(TesselError::shape_error(id, "one_hot shape does not fit input size"));
                    }
                    j = j.saturating_sub(1);
                }
                Ok(Layout::new(x.dtype, x.format, *shape))
            }
            Op::DetectionOutput(params) => {
                let location = input(0)?;
                input(2)?;
                let size = Shape::new(1, 1, params.keep_top_k * location.size.batch, 7);
                Ok(Layout::new(location.dtype, Format::Bfyx, size))
            }
        }
    }
}

fn validate_convolution(
    id: &PrimitiveId,
    weights: usize,
    bias: usize,
    params: &ConvolutionParams,
) -> Result<(), TesselError> {
    if weights == 0 {
        return Err(TesselError::parameter_error(id, "at least one weights tensor is required"));
    }
    if params.split == 0 || params.groups == 0 {
        return Err(TesselError::parameter_error(id, "split and groups must be at least 1"));
    }
    if params.split > 1 && params.groups > 1 {
        return Err(TesselError::parameter_error(id, "split and groups are mutually exclusive"));
    }
    if weights != params.split {
        return Err(TesselError::parameter_error(
            id,
            format!("{weights} weights tensors for split {}", params.split),
        ));
    }
    if bias != 0 && bias != weights {
        return Err(TesselError::parameter_error(
            id,
            format!("{bias} bias tensors for {weights} weights tensors"),
        ));
    }
    if params.stride.contains(&0) || params.dilation.contains(&0) {
        return Err(TesselError::parameter_error(id, "stride and dilation must be non zero"));
    }
    Ok(())
}
