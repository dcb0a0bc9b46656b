//! Dispatch geometry, global and local work sizes of one kernel launch.

use crate::{DeviceInfo, TesselError};

/// Global and local work sizes. Every value of this type satisfies
/// `1 <= local[d] <= device max[d]` and `global[d] % local[d] == 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dispatch {
    /// Global work size
    pub global: [usize; 3],
    /// Local work size
    pub local: [usize; 3],
    /// Global size was rounded up to a structural block of the kernel,
    /// the kernel masks out of range work items
    pub padded: bool,
}

impl Dispatch {
    /// Dispatch with local size picked by [`optimal_local_size`]
    pub fn new(global: [usize; 3], device: &DeviceInfo, bound: usize) -> Result<Dispatch, TesselError> {
        let local = optimal_local_size(global, device, bound)?;
        Ok(Dispatch { global, local, padded: false })
    }

    /// Dispatch with global size rounded up to multiples of block, local size picked
    /// by [`optimal_local_size`]
    pub fn padded(
        global: [usize; 3],
        block: [usize; 3],
        device: &DeviceInfo,
        bound: usize,
    ) -> Result<Dispatch, TesselError> {
        let mut rounded = [0; 3];
        for d in 0..3 {
            if block[d] == 0 {
                return Err(TesselError::geometry_error(format!("zero block in dimension {d}")));
            }
            rounded[d] = round_up(global[d], block[d]);
        }
        let local = optimal_local_size(rounded, device, bound)?;
        Ok(Dispatch { global: rounded, local, padded: rounded != global })
    }

    /// Dispatch with fixed local size, global size is rounded up to multiples of it
    pub fn with_local(
        global: [usize; 3],
        local: [usize; 3],
        device: &DeviceInfo,
    ) -> Result<Dispatch, TesselError> {
        let mut rounded = [0; 3];
        for d in 0..3 {
            if global[d] == 0 {
                return Err(TesselError::geometry_error(format!("zero global size in dimension {d}")));
            }
            if local[d] == 0 {
                return Err(TesselError::geometry_error(format!("zero local size in dimension {d}")));
            }
            rounded[d] = round_up(global[d], local[d]);
        }
        let dispatch = Dispatch { global: rounded, local, padded: rounded != global };
        dispatch.validate(device)?;
        Ok(dispatch)
    }

    /// Checks geometry against device limits
    pub fn validate(&self, device: &DeviceInfo) -> Result<(), TesselError> {
        let max = device.local_dims();
        for d in 0..3 {
            if self.local[d] == 0 || self.local[d] > max[d] {
                return Err(TesselError::geometry_error(format!(
                    "local size {} in dimension {d} is out of 1..={}",
                    self.local[d], max[d]
                )));
            }
            if self.global[d] % self.local[d] != 0 {
                return Err(TesselError::geometry_error(format!(
                    "global size {} in dimension {d} is not divisible by local size {}",
                    self.global[d], self.local[d]
                )));
            }
        }
        let threads: usize = self.local.iter().product();
        if threads > device.max_local_threads {
            return Err(TesselError::geometry_error(format!(
                "{threads} local threads, device supports {}",
                device.max_local_threads
            )));
        }
        Ok(())
    }

    /// Total number of work items
    #[must_use]
    pub fn work_items(&self) -> usize {
        self.global.iter().product()
    }
}

/// Largest local size per dimension that divides the global size, starting at
/// `min(bound, device max, remaining thread budget, global)` and counting down.
pub fn optimal_local_size(
    global: [usize; 3],
    device: &DeviceInfo,
    bound: usize,
) -> Result<[usize; 3], TesselError> {
    let max = device.local_dims();
    let mut budget = device.max_local_threads.max(1);
    let mut local = [1; 3];
    for d in 0..3 {
        if global[d] == 0 {
            return Err(TesselError::geometry_error(format!("zero global size in dimension {d}")));
        }
        let mut l = bound.max(1).min(max[d]).min(budget).min(global[d]);
        while global[d] % l != 0 {
            l -= 1;
        }
        local[d] = l;
        budget /= l;
    }
    Ok(local)
}

/// Rounds x up to multiple
#[must_use]
pub const fn round_up(x: usize, multiple: usize) -> usize {
    crate::layout::round_up(x, multiple)
}

/// Division rounding up
#[must_use]
pub const fn ceil_div(x: usize, y: usize) -> usize {
    x.div_ceil(y)
}
