//! `drv = "gpio"`: a bit field of a GPIO bank

use std::sync::Arc;

use super::{Driver, DriverContext};
use crate::codec::BitField;
use crate::error::DriverError;
use crate::host::ControlHost;
use crate::interface::GpioBank;
use crate::value::Value;

pub struct GpioDriver {
    bank: Arc<dyn GpioBank>,
    field: BitField,
}

impl GpioDriver {
    pub fn new(bank: Arc<dyn GpioBank>, field: BitField) -> Self {
        Self { bank, field }
    }
}

/// `offset` is mandatory, `width` defaults to 1
pub(crate) fn build(ctx: &DriverContext<'_>) -> Result<Box<dyn Driver>, DriverError> {
    let field = BitField::from_params(&ctx.params)?.ok_or(DriverError::MissingParam("offset"))?;
    Ok(Box::new(GpioDriver::new(ctx.gpio()?, field)))
}

impl Driver for GpioDriver {
    fn get(&self, _host: &dyn ControlHost) -> Result<Value, DriverError> {
        let levels = self.bank.read()?;
        Ok(Value::try_from(self.field.decode(levels))?)
    }

    fn set(&self, _host: &dyn ControlHost, value: &Value) -> Result<(), DriverError> {
        let hw = self.field.encode(value.as_u64()?)?;
        log::debug!(
            "{}: mask 0x{:x} <- 0x{:x}",
            self.bank.name(),
            self.field.mask(),
            hw
        );
        self.bank.update(self.field.mask(), hw)?;
        Ok(())
    }
}
