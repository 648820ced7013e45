//! Pin routing for SERCOM pads
//!
//! The front-ends never pick multiplexer settings themselves. They are given
//! [`SercomPin`]s (pin plus peripheral function, usually from a board
//! variant table) and hand them to a [`PinControl`] implementation.

#[cfg(any(feature = "samd21g", feature = "samd21j"))]
use crate::pac::PORT;

/// Peripheral multiplexer function carrying a SERCOM pad
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PinFunction {
    /// Function C
    Sercom,
    /// Function D
    SercomAlt,
}

impl PinFunction {
    fn pmux(self) -> u8 {
        match self {
            PinFunction::Sercom => 2,
            PinFunction::SercomAlt => 3,
        }
    }
}

/// A port pin and the function connecting it to a SERCOM pad
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SercomPin {
    pub pin: u8,
    pub function: PinFunction,
}

impl SercomPin {
    pub const fn new(pin: u8, function: PinFunction) -> Self {
        SercomPin { pin, function }
    }
}

/// Pin routing service
pub trait PinControl {
    /// Hand `pin` to its SERCOM function
    fn into_peripheral(&mut self, pin: SercomPin);

    /// Make `pin` a GPIO output driven high
    fn into_output_high(&mut self, pin: u8);
}

impl<T: PinControl + ?Sized> PinControl for &mut T {
    fn into_peripheral(&mut self, pin: SercomPin) {
        (**self).into_peripheral(pin)
    }

    fn into_output_high(&mut self, pin: u8) {
        (**self).into_output_high(pin)
    }
}

/// `PMUX` byte with the half selecting `pin`'s function replaced
fn pmux_byte(current: u8, pin: u8, function: PinFunction) -> u8 {
    if pin % 2 == 0 {
        (current & 0xF0) | function.pmux()
    } else {
        (current & 0x0F) | (function.pmux() << 4)
    }
}

/// The PORT peripheral; pins 0-31 are PA, 32-63 PB
#[cfg(any(feature = "samd21g", feature = "samd21j"))]
pub struct Port {
    port: PORT,
}

#[cfg(any(feature = "samd21g", feature = "samd21j"))]
impl Port {
    pub fn new(port: PORT) -> Self {
        Port { port }
    }

    pub fn free(self) -> PORT {
        self.port
    }
}

// PA and PB registers have distinct PAC types
#[cfg(any(feature = "samd21g", feature = "samd21j"))]
macro_rules! group {
    ($port:expr, $pin:expr, |$pmux:ident, $pincfg:ident, $dirset:ident, $outset:ident| $body:block) => {
        if $pin < 32 {
            let $pmux = &$port.pmux0_;
            let $pincfg = &$port.pincfg0_;
            let $dirset = &$port.dirset0;
            let $outset = &$port.outset0;
            $body
        } else {
            let $pmux = &$port.pmux1_;
            let $pincfg = &$port.pincfg1_;
            let $dirset = &$port.dirset1;
            let $outset = &$port.outset1;
            $body
        }
    };
}

#[cfg(any(feature = "samd21g", feature = "samd21j"))]
#[allow(unused_unsafe, unused_variables)]
impl PinControl for Port {
    fn into_peripheral(&mut self, pin: SercomPin) {
        let n = (pin.pin & 31) as usize;
        group!(self.port, pin.pin, |pmux, pincfg, dirset, outset| {
            pmux[n / 2].modify(|r, w| unsafe {
                w.bits(pmux_byte(r.bits(), pin.pin, pin.function))
            });
            pincfg[n].modify(|_, w| w.pmuxen().set_bit());
        });
    }

    fn into_output_high(&mut self, pin: u8) {
        let n = (pin & 31) as usize;
        group!(self.port, pin, |pmux, pincfg, dirset, outset| {
            pincfg[n].modify(|_, w| w.pmuxen().clear_bit());
            outset.write(|w| unsafe { w.bits(1 << n) });
            dirset.write(|w| unsafe { w.bits(1 << n) });
        });
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) enum PinEvent {
        Peripheral(SercomPin),
        OutputHigh(u8),
    }

    /// Records routing requests
    #[derive(Default)]
    pub(crate) struct FakePins {
        pub(crate) events: Vec<PinEvent>,
    }

    impl PinControl for FakePins {
        fn into_peripheral(&mut self, pin: SercomPin) {
            self.events.push(PinEvent::Peripheral(pin));
        }

        fn into_output_high(&mut self, pin: u8) {
            self.events.push(PinEvent::OutputHigh(pin));
        }
    }

    #[test]
    fn pmux_keeps_the_neighbouring_pin() {
        let even = pmux_byte(0x00, 4, PinFunction::Sercom);
        assert_eq!(even, 0x02);
        assert_eq!(pmux_byte(even, 5, PinFunction::SercomAlt), 0x32);
        // re-routing one pin leaves the other half alone
        assert_eq!(pmux_byte(0x32, 4, PinFunction::SercomAlt), 0x33);
        assert_eq!(pmux_byte(0x32, 37, PinFunction::Sercom), 0x22);
    }
}
