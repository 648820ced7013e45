/*!
  # Interrupt Management
  Global interrupt masking and external interrupt (EIC) line masking, as used
  by the SPI transaction bracket.

  ## Example
  ```ignore
    let mut irq = CortexM::new(dp.EIC);

    let was_enabled = irq.interrupts_enabled();
    irq.disable_interrupts();
    // ...
    if was_enabled {
        irq.enable_interrupts();
    }

    irq.disable_external(1 << 4);
  ```
*/

#[cfg(any(feature = "samd21g", feature = "samd21j"))]
use crate::pac::EIC;

/// Number of external interrupt lines routed through the EIC
pub const EXTERNAL_NUM_INTERRUPTS: u8 = 16;

/// Where an interrupt a driver cares about comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InterruptSource {
    /// The pin has no interrupt attached
    NotAnInterrupt,
    /// Non-maskable interrupt
    Nmi,
    /// EIC line `n`
    External(u8),
    /// Any other NVIC interrupt
    Peripheral(u8),
}

/// Interrupt masking operations
pub trait InterruptControl {
    /// Whether interrupts are globally enabled
    fn interrupts_enabled(&self) -> bool;

    /// Globally disable interrupts
    fn disable_interrupts(&mut self);

    /// Globally enable interrupts
    fn enable_interrupts(&mut self);

    /// Mask the EIC lines set in `mask`
    fn disable_external(&mut self, mask: u32);

    /// Unmask the EIC lines set in `mask`
    fn enable_external(&mut self, mask: u32);
}

impl<T: InterruptControl + ?Sized> InterruptControl for &mut T {
    fn interrupts_enabled(&self) -> bool {
        (**self).interrupts_enabled()
    }

    fn disable_interrupts(&mut self) {
        (**self).disable_interrupts()
    }

    fn enable_interrupts(&mut self) {
        (**self).enable_interrupts()
    }

    fn disable_external(&mut self, mask: u32) {
        (**self).disable_external(mask)
    }

    fn enable_external(&mut self, mask: u32) {
        (**self).enable_external(mask)
    }
}

/// PRIMASK for global masking, the EIC for external lines
#[cfg(any(feature = "samd21g", feature = "samd21j"))]
pub struct CortexM {
    eic: EIC,
}

#[cfg(any(feature = "samd21g", feature = "samd21j"))]
impl CortexM {
    pub fn new(eic: EIC) -> Self {
        CortexM { eic }
    }

    pub fn free(self) -> EIC {
        self.eic
    }
}

#[cfg(any(feature = "samd21g", feature = "samd21j"))]
#[allow(unused_unsafe)]
impl InterruptControl for CortexM {
    fn interrupts_enabled(&self) -> bool {
        cortex_m::register::primask::read().is_active()
    }

    fn disable_interrupts(&mut self) {
        cortex_m::interrupt::disable();
    }

    fn enable_interrupts(&mut self) {
        // SAFETY: only called to restore a state captured earlier
        unsafe { cortex_m::interrupt::enable() }
    }

    fn disable_external(&mut self, mask: u32) {
        self.eic.intenclr.write(|w| unsafe { w.bits(mask) });
    }

    fn enable_external(&mut self, mask: u32) {
        self.eic.intenset.write(|w| unsafe { w.bits(mask) });
    }
}
