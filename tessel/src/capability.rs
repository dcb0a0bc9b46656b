//! Capability keys, bit sets of data types, formats, features and machine
//! requirements. Both kernel registration and required key computation use
//! the field constants from this module, so the bit layout is shared.
//!
//! Key layout (low to high bits):
//!
//! | field           | offset | width |
//! |-----------------|--------|-------|
//! | input dtype     | 0      | 8     |
//! | output dtype    | 8      | 8     |
//! | weights dtype   | 16     | 8     |
//! | input format    | 24     | 24    |
//! | output format   | 48     | 24    |
//! | features        | 72     | 32    |
//! | machine         | 104    | 16    |

use crate::{DType, Format};

/// One field of the capability key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    /// First bit of the field
    pub offset: u32,
    /// Number of bits
    pub width: u32,
}

impl Field {
    const fn mask(&self) -> u128 {
        ((1u128 << self.width) - 1) << self.offset
    }
}

/// Input data types
pub const INPUT_DTYPE: Field = Field { offset: 0, width: 8 };
/// Output data types
pub const OUTPUT_DTYPE: Field = Field { offset: 8, width: 8 };
/// Weights data types
pub const WEIGHTS_DTYPE: Field = Field { offset: 16, width: 8 };
/// Input formats
pub const INPUT_FORMAT: Field = Field { offset: 24, width: 24 };
/// Output formats
pub const OUTPUT_FORMAT: Field = Field { offset: 48, width: 24 };
/// Operation features
pub const FEATURES: Field = Field { offset: 72, width: 32 };
/// Device features
pub const MACHINE: Field = Field { offset: 104, width: 16 };

/// All fields, in bit order
pub const FIELDS: [Field; 7] =
    [INPUT_DTYPE, OUTPUT_DTYPE, WEIGHTS_DTYPE, INPUT_FORMAT, OUTPUT_FORMAT, FEATURES, MACHINE];

/// Operation features an implementation can support
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    /// Input or output starts at non zero offset (padding)
    TensorOffset,
    /// Non dense pitches
    TensorPitches,
    /// Batch larger than 1
    Batching,
    /// Convolution split
    SplitSupport,
    /// Grouped convolution
    Grouped,
    /// Bias per output feature
    BiasPerFeature,
    /// No bias
    NonBiasTerm,
    /// Activation fused into the kernel
    FusedActivation,
    /// Dilation other than 1
    Dilation,
    /// Input and output data types differ
    DifferentTypes,
    /// Reduction along batch
    AxisBatch,
    /// Reduction along feature
    AxisFeature,
    /// Reduction along x
    AxisX,
    /// Reduction along y
    AxisY,
    /// Reduction along all dimensions
    AxisAll,
    /// Eltwise with per input coefficients
    EltwiseCoefficients,
    /// Spatial padding of the input read by the kernel
    InputPadding,
    /// Reorder of weights
    WeightsReorder,
}

impl Feature {
    const fn bit(self) -> u32 {
        self as u32
    }
}

/// Device features an implementation may need
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Machine {
    /// Sub-group extension
    SubGroup,
    /// Short sub-group block reads
    SubGroupShort,
    /// Half precision arithmetic
    Fp16,
    /// Integer multiply accumulate
    Imad,
    /// Image objects
    Image,
}

impl Machine {
    const fn bit(self) -> u32 {
        self as u32
    }
}

/// Capability key, one bit per supported (or required) property
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CapabilityKey(u128);

impl CapabilityKey {
    /// Key with no bits set
    #[must_use]
    pub const fn empty() -> CapabilityKey {
        CapabilityKey(0)
    }

    /// Raw bits
    #[must_use]
    pub const fn bits(&self) -> u128 {
        self.0
    }

    /// Key from raw bits
    #[must_use]
    pub const fn from_bits(bits: u128) -> CapabilityKey {
        CapabilityKey(bits)
    }

    /// Bits of one field, shifted down to bit 0
    #[must_use]
    pub const fn field(&self, field: Field) -> u128 {
        (self.0 & field.mask()) >> field.offset
    }

    const fn set(mut self, field: Field, bit: u32) -> CapabilityKey {
        debug_assert!(bit < field.width);
        self.0 |= 1u128 << (field.offset + bit);
        self
    }

    /// Enable input data type
    #[must_use]
    pub const fn enable_input_dtype(self, dtype: DType) -> CapabilityKey {
        self.set(INPUT_DTYPE, dtype.bit())
    }

    /// Enable output data type
    #[must_use]
    pub const fn enable_output_dtype(self, dtype: DType) -> CapabilityKey {
        self.set(OUTPUT_DTYPE, dtype.bit())
    }

    /// Enable weights data type
    #[must_use]
    pub const fn enable_weights_dtype(self, dtype: DType) -> CapabilityKey {
        self.set(WEIGHTS_DTYPE, dtype.bit())
    }

    /// Enable input format
    #[must_use]
    pub const fn enable_input_format(self, format: Format) -> CapabilityKey {
        self.set(INPUT_FORMAT, format.bit())
    }

    /// Enable output format
    #[must_use]
    pub const fn enable_output_format(self, format: Format) -> CapabilityKey {
        self.set(OUTPUT_FORMAT, format.bit())
    }

    /// Enable feature
    #[must_use]
    pub const fn enable_feature(self, feature: Feature) -> CapabilityKey {
        self.set(FEATURES, feature.bit())
    }

    /// Enable machine feature
    #[must_use]
    pub const fn enable_machine(self, machine: Machine) -> CapabilityKey {
        self.set(MACHINE, machine.bit())
    }

    /// Enable all data types for both input and output
    #[must_use]
    pub fn enable_all_dtypes(mut self) -> CapabilityKey {
        for dtype in DType::ALL {
            self = self.enable_input_dtype(dtype).enable_output_dtype(dtype);
        }
        self
    }

    /// Enable all data formats (not weights formats) for input
    #[must_use]
    pub fn enable_all_input_formats(mut self) -> CapabilityKey {
        for format in Format::ALL.into_iter().filter(|f| !f.is_weights()) {
            self = self.enable_input_format(format);
        }
        self
    }

    /// Enable all data formats (not weights formats) for output
    #[must_use]
    pub fn enable_all_output_formats(mut self) -> CapabilityKey {
        for format in Format::ALL.into_iter().filter(|f| !f.is_weights()) {
            self = self.enable_output_format(format);
        }
        self
    }

    /// Union of two keys
    #[must_use]
    pub const fn union(self, other: CapabilityKey) -> CapabilityKey {
        CapabilityKey(self.0 | other.0)
    }

    /// Does this key cover every bit of required in every field?
    #[must_use]
    pub const fn supports(&self, required: &CapabilityKey) -> bool {
        required.0 & !self.0 == 0
    }

    /// Is machine feature enabled?
    #[must_use]
    pub const fn has_machine(&self, machine: Machine) -> bool {
        self.field(MACHINE) & (1 << machine.bit()) != 0
    }
}

#[test]
fn fields_do_not_overlap() {
    let mut seen = 0u128;
    for field in FIELDS {
        assert_eq!(seen & field.mask(), 0);
        seen |= field.mask();
    }
    assert!(Format::ALL.len() as u32 <= INPUT_FORMAT.width);
    assert!(DType::ALL.len() as u32 <= INPUT_DTYPE.width);
    assert!((Feature::WeightsReorder as u32) < FEATURES.width);
    assert!((Machine::Image as u32) < MACHINE.width);
}
