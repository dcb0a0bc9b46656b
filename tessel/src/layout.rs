//! Memory description of tensors, shape, padding, format and data type.

use crate::DType;
use std::fmt::Display;

/// Tensor shape, batch, feature and up to three spatial dimensions (x, y, z)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Shape {
    /// Batch
    pub batch: usize,
    /// Feature (channels)
    pub feature: usize,
    /// Spatial dimensions x, y, z
    pub spatial: [usize; 3],
}

impl Shape {
    /// 4D shape in b, f, y, x convention, arguments are in memory order of bfyx
    #[must_use]
    pub const fn new(batch: usize, feature: usize, y: usize, x: usize) -> Shape {
        Shape { batch, feature, spatial: [x, y, 1] }
    }

    /// 5D shape
    #[must_use]
    pub const fn new_3d(batch: usize, feature: usize, z: usize, y: usize, x: usize) -> Shape {
        Shape { batch, feature, spatial: [x, y, z] }
    }

    /// Shape with every dimension set to zero, used for padding
    #[must_use]
    pub const fn zero() -> Shape {
        Shape { batch: 0, feature: 0, spatial: [0, 0, 0] }
    }

    /// Spatial x
    #[must_use]
    pub const fn x(&self) -> usize {
        self.spatial[0]
    }

    /// Spatial y
    #[must_use]
    pub const fn y(&self) -> usize {
        self.spatial[1]
    }

    /// Spatial z
    #[must_use]
    pub const fn z(&self) -> usize {
        self.spatial[2]
    }

    /// Number of elements
    #[must_use]
    pub const fn count(&self) -> usize {
        self.batch * self.feature * self.spatial[0] * self.spatial[1] * self.spatial[2]
    }

    /// Number of spatial elements
    #[must_use]
    pub const fn spatial_count(&self) -> usize {
        self.spatial[0] * self.spatial[1] * self.spatial[2]
    }

    /// Elementwise sum
    #[must_use]
    pub const fn add(&self, other: &Shape) -> Shape {
        Shape {
            batch: self.batch + other.batch,
            feature: self.feature + other.feature,
            spatial: [
                self.spatial[0] + other.spatial[0],
                self.spatial[1] + other.spatial[1],
                self.spatial[2] + other.spatial[2],
            ],
        }
    }

    /// Is every dimension zero?
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.batch == 0
            && self.feature == 0
            && self.spatial[0] == 0
            && self.spatial[1] == 0
            && self.spatial[2] == 0
    }
}

impl Display for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.z() == 1 {
            f.write_fmt(format_args!("{}x{}x{}x{}", self.batch, self.feature, self.y(), self.x()))
        } else {
            f.write_fmt(format_args!(
                "{}x{}x{}x{}x{}",
                self.batch,
                self.feature,
                self.z(),
                self.y(),
                self.x()
            ))
        }
    }
}

/// Padding around tensor data, both sides are unsigned, so padding is never negative
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Padding {
    /// Padding before data in each dimension
    pub lower: Shape,
    /// Padding after data in each dimension
    pub upper: Shape,
}

impl Padding {
    /// No padding
    #[must_use]
    pub const fn none() -> Padding {
        Padding { lower: Shape::zero(), upper: Shape::zero() }
    }

    /// Padding with given lower and upper sizes
    #[must_use]
    pub const fn new(lower: Shape, upper: Shape) -> Padding {
        Padding { lower, upper }
    }

    /// Same padding on both sides of x and y
    #[must_use]
    pub const fn spatial(x: usize, y: usize) -> Padding {
        let pad = Shape { batch: 0, feature: 0, spatial: [x, y, 0] };
        Padding { lower: pad, upper: pad }
    }

    /// Is there no padding at all?
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.lower.is_zero() && self.upper.is_zero()
    }
}

impl Default for Padding {
    fn default() -> Self {
        Padding::none()
    }
}

/// Memory arrangement of tensor data. Data formats first, then weight formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[allow(non_camel_case_types)]
pub enum Format {
    /// Batch, feature, y, x, the canonical plain format
    Bfyx,
    /// y, x, feature, batch
    Yxfb,
    /// Batch, y, x, feature
    Byxf,
    /// Feature, y, x, batch
    Fyxb,
    /// Bfyx with feature blocked by 16
    Bfyx_f16,
    /// Bfyx with feature blocked by 4, used by int8 kernels
    B_fs_yx_fsv4,
    /// Feature slices of 32, batch blocked by 4, used by int8 kernels
    Fs_bs_yx_bsv4_fsv32,
    /// 5D batch, feature, z, y, x
    Bfzyx,
    /// Weights, output features blocked by 16
    Os_iyx_osv16,
    /// Weights, both input and output features blocked by 16
    O_i_yx_i16_o16,
    /// Weights for gemm like convolution in half precision
    Iy_xs_os_xsv2_osv16__ao32,
    /// Weights for gemm like convolution in single precision
    Iy_xs_os_xsv2_osv8__ao32,
}

impl Format {
    /// All formats, in bit index order
    pub const ALL: [Format; 12] = [
        Format::Bfyx,
        Format::Yxfb,
        Format::Byxf,
        Format::Fyxb,
        Format::Bfyx_f16,
        Format::B_fs_yx_fsv4,
        Format::Fs_bs_yx_bsv4_fsv32,
        Format::Bfzyx,
        Format::Os_iyx_osv16,
        Format::O_i_yx_i16_o16,
        Format::Iy_xs_os_xsv2_osv16__ao32,
        Format::Iy_xs_os_xsv2_osv8__ao32,
    ];

    /// Plain (not blocked) data formats
    pub const PLAIN: [Format; 4] = [Format::Bfyx, Format::Yxfb, Format::Byxf, Format::Fyxb];

    /// Position of this format inside capability format fields
    #[must_use]
    pub const fn bit(&self) -> u32 {
        *self as u32
    }

    /// Is this a weights only format?
    #[must_use]
    pub const fn is_weights(&self) -> bool {
        matches!(
            self,
            Format::Os_iyx_osv16
                | Format::O_i_yx_i16_o16
                | Format::Iy_xs_os_xsv2_osv16__ao32
                | Format::Iy_xs_os_xsv2_osv8__ao32
        )
    }

    /// Alignment of batch and feature dimension in memory
    #[must_use]
    pub const fn block(&self) -> (usize, usize) {
        match self {
            Format::Bfyx | Format::Yxfb | Format::Byxf | Format::Fyxb | Format::Bfzyx => (1, 1),
            Format::Bfyx_f16 => (1, 16),
            Format::B_fs_yx_fsv4 => (1, 4),
            Format::Fs_bs_yx_bsv4_fsv32 => (4, 32),
            Format::Os_iyx_osv16 => (16, 1),
            Format::O_i_yx_i16_o16 => (16, 16),
            Format::Iy_xs_os_xsv2_osv16__ao32 | Format::Iy_xs_os_xsv2_osv8__ao32 => (32, 1),
        }
    }

    /// Name used in kernel signatures and logs
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Format::Bfyx => "bfyx",
            Format::Yxfb => "yxfb",
            Format::Byxf => "byxf",
            Format::Fyxb => "fyxb",
            Format::Bfyx_f16 => "bfyx_f16",
            Format::B_fs_yx_fsv4 => "b_fs_yx_fsv4",
            Format::Fs_bs_yx_bsv4_fsv32 => "fs_bs_yx_bsv4_fsv32",
            Format::Bfzyx => "bfzyx",
            Format::Os_iyx_osv16 => "os_iyx_osv16",
            Format::O_i_yx_i16_o16 => "o_i_yx_i16_o16",
            Format::Iy_xs_os_xsv2_osv16__ao32 => "iy_xs_os_xsv2_osv16__ao32",
            Format::Iy_xs_os_xsv2_osv8__ao32 => "iy_xs_os_xsv2_osv8__ao32",
        }
    }
}

impl Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Data type, format, shape and padding of a tensor buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Layout {
    /// Element type
    pub dtype: DType,
    /// Memory arrangement
    pub format: Format,
    /// Logical shape
    pub size: Shape,
    /// Padding around data
    pub padding: Padding,
}

impl Layout {
    /// Layout without padding
    #[must_use]
    pub const fn new(dtype: DType, format: Format, size: Shape) -> Layout {
        Layout { dtype, format, size, padding: Padding::none() }
    }

    /// Same layout with different padding
    #[must_use]
    pub const fn with_padding(mut self, padding: Padding) -> Layout {
        self.padding = padding;
        self
    }

    /// Same layout with different format
    #[must_use]
    pub const fn with_format(mut self, format: Format) -> Layout {
        self.format = format;
        self
    }

    /// Same layout with different data type
    #[must_use]
    pub const fn with_dtype(mut self, dtype: DType) -> Layout {
        self.dtype = dtype;
        self
    }

    /// Number of logical elements
    #[must_use]
    pub const fn count(&self) -> usize {
        self.size.count()
    }

    /// Shape including padding
    #[must_use]
    pub const fn padded_size(&self) -> Shape {
        self.size.add(&self.padding.lower).add(&self.padding.upper)
    }

    /// Number of elements of the buffer backing this layout,
    /// that is shape plus padding, with blocked dimensions aligned to their block.
    #[must_use]
    pub const fn buffer_size(&self) -> usize {
        let padded = self.padded_size();
        let (bb, fb) = self.format.block();
        round_up(padded.batch, bb) * round_up(padded.feature, fb) * padded.spatial_count()
    }

    /// Size of the backing buffer in bytes
    #[must_use]
    pub const fn bytes(&self) -> usize {
        self.buffer_size() * self.dtype.byte_size()
    }

    /// Layouts are identical when data type, format, shape and padding match
    #[must_use]
    pub fn is_identical(&self, other: &Layout) -> bool {
        self == other
    }
}

impl Display for Layout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("{}:{}:{}", self.dtype, self.format, self.size))?;
        if !self.padding.is_zero() {
            f.write_fmt(format_args!(":pad{}/{}", self.padding.lower, self.padding.upper))?;
        }
        Ok(())
    }
}

pub(crate) const fn round_up(x: usize, multiple: usize) -> usize {
    x.div_ceil(multiple) * multiple
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_size_includes_padding() {
        let layout = Layout::new(DType::F32, Format::Bfyx, Shape::new(1, 3, 4, 4))
            .with_padding(Padding::spatial(1, 1));
        assert_eq!(layout.count(), 48);
        assert_eq!(layout.buffer_size(), 3 * 6 * 6);
        assert_eq!(layout.bytes(), 3 * 6 * 6 * 4);
    }

    #[test]
    fn blocked_formats_align_features() {
        let layout = Layout::new(DType::F16, Format::Bfyx_f16, Shape::new(2, 3, 5, 5));
        assert_eq!(layout.buffer_size(), 2 * 16 * 25);
        let weights = Layout::new(DType::F32, Format::Os_iyx_osv16, Shape::new(20, 3, 3, 3));
        assert_eq!(weights.buffer_size(), 32 * 3 * 9);
    }

    #[test]
    fn format_bits_are_unique() {
        for (i, format) in Format::ALL.iter().enumerate() {
            assert_eq!(format.bit() as usize, i);
        }
    }
}
