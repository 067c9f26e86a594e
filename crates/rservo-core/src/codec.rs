//! Bit-field value codec
//!
//! Converts between a control's logical value and the hardware value of the
//! register or GPIO bank it lives in:
//!
//! ```text
//! logical = (hw >> offset) & ((1 << width) - 1)
//! hw      = logical << offset
//! ```
//!
//! Encoding never truncates: a logical value that would set bits outside the
//! field is rejected before anything touches the bus.

use crate::config::ParamSet;
use crate::error::{DriverError, ValueError};

/// An `offset`/`width` bit field inside a hardware word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitField {
    offset: u32,
    width: u32,
}

impl BitField {
    /// Create a field of `width` bits starting at bit `offset`
    pub fn new(offset: u32, width: u32) -> Result<Self, ValueError> {
        if width == 0 || offset.checked_add(width).map_or(true, |end| end > 64) {
            return Err(ValueError::BadField { offset, width });
        }
        Ok(Self { offset, width })
    }

    /// Build a field from a control's `offset` and `width` params.
    ///
    /// `width` defaults to 1. Without `offset` there is no field and the
    /// value passes through untouched.
    pub fn from_params(params: &ParamSet) -> Result<Option<Self>, DriverError> {
        let Some(offset) = params.u32_param("offset")? else {
            return Ok(None);
        };
        let width = params.u32_param("width")?.unwrap_or(1);
        Ok(Some(Self::new(offset, width)?))
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    /// Largest logical value the field holds
    pub fn max_value(&self) -> u64 {
        u64::MAX >> (64 - self.width)
    }

    /// Field bits in hardware position
    pub fn mask(&self) -> u64 {
        self.max_value() << self.offset
    }

    /// Extract the logical value from a hardware word
    pub fn decode(&self, hw: u64) -> u64 {
        (hw >> self.offset) & self.max_value()
    }

    /// Shift a logical value into hardware position
    pub fn encode(&self, logical: u64) -> Result<u64, ValueError> {
        if logical > self.max_value() {
            return Err(ValueError::OutsideMask {
                value: logical.wrapping_shl(self.offset),
                mask: self.mask(),
            });
        }
        Ok(logical << self.offset)
    }

    /// Replace the field inside `current`, keeping every other bit
    pub fn merge(&self, current: u64, logical: u64) -> Result<u64, ValueError> {
        Ok((current & !self.mask()) | self.encode(logical)?)
    }
}
