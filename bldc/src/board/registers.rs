//! STM32F405 register blocks, limited to the registers the sampling loop touches.
//!
//! Offsets follow RM0090. Unused registers inside a block are kept as reserved padding so the
//! `#[repr(C)]` layout lines up with the hardware.

use paste::paste;
use static_assertions::const_assert_eq;

use crate::util::bitfield::{ReadProxy, Readable, Register, WriteProxy, Writeable};

pub const TIM1_BASE: usize = 0x4001_0000;
pub const TIM8_BASE: usize = 0x4001_0400;
pub const TIM13_BASE: usize = 0x4000_1C00;
pub const ADC1_BASE: usize = 0x4001_2000;
pub const ADC2_BASE: usize = 0x4001_2100;
pub const ADC3_BASE: usize = 0x4001_2200;
pub const GPIOA_BASE: usize = 0x4002_0000;
pub const GPIO_STRIDE: usize = 0x400;

pub struct Reserved;

macro_rules! registers {
    ($($name:ident),* $(,)?) => {
        $(
            pub struct $name;
            impl Readable for $name {}
            impl Writeable for $name {}
        )*
    };
}

macro_rules! flag {
    ($reg:ident, $field:ident, $offset:expr) => {
        paste! {
            impl ReadProxy<$reg> {
                #[inline(always)]
                pub fn $field(&self) -> bool {
                    self.bit($offset)
                }
            }
            impl WriteProxy<$reg> {
                #[inline(always)]
                pub fn [<set_ $field>](&mut self, value: bool) -> &mut Self {
                    self.bit($offset, value)
                }
            }
            pub const [<$reg:upper _ $field:upper>]: u32 = 1 << $offset;
        }
    };
}

macro_rules! field {
    ($reg:ident, $field:ident, $offset:expr, $mask:expr) => {
        paste! {
            impl ReadProxy<$reg> {
                #[inline(always)]
                pub fn $field(&self) -> u32 {
                    self.field($offset, $mask)
                }
            }
            impl WriteProxy<$reg> {
                #[inline(always)]
                pub fn [<set_ $field>](&mut self, value: u32) -> &mut Self {
                    self.field($offset, $mask, value)
                }
            }
        }
    };
}

pub mod tim {
    use super::*;

    registers!(Cr1, Dier, Sr, Cnt, Arr, Ccr, Bdtr);

    flag!(Cr1, cen, 0);
    flag!(Cr1, dir, 4);
    field!(Cr1, cms, 5, 0b11);
    flag!(Dier, uie, 0);
    flag!(Sr, uif, 0);
    field!(Cnt, cnt, 0, 0xFFFF);
    field!(Arr, arr, 0, 0xFFFF);
    field!(Ccr, ccr, 0, 0xFFFF);
    flag!(Bdtr, moe, 15);

    #[repr(C)]
    pub struct RegisterBlock {
        pub cr1: Register<Cr1>,
        _cr2: Register<Reserved>,
        _smcr: Register<Reserved>,
        pub dier: Register<Dier>,
        pub sr: Register<Sr>,
        _egr: Register<Reserved>,
        _ccmr: [Register<Reserved>; 2],
        _ccer: Register<Reserved>,
        pub cnt: Register<Cnt>,
        _psc: Register<Reserved>,
        pub arr: Register<Arr>,
        _rcr: Register<Reserved>,
        pub ccr: [Register<Ccr>; 4],
        pub bdtr: Register<Bdtr>,
    }

    const_assert_eq!(core::mem::size_of::<RegisterBlock>(), 0x48);

    impl RegisterBlock {
        pub const fn new() -> Self {
            RegisterBlock {
                cr1: Register::new(0),
                _cr2: Register::new(0),
                _smcr: Register::new(0),
                dier: Register::new(0),
                sr: Register::new(0),
                _egr: Register::new(0),
                _ccmr: [Register::new(0), Register::new(0)],
                _ccer: Register::new(0),
                cnt: Register::new(0),
                _psc: Register::new(0),
                arr: Register::new(0),
                _rcr: Register::new(0),
                ccr: [
                    Register::new(0),
                    Register::new(0),
                    Register::new(0),
                    Register::new(0),
                ],
                bdtr: Register::new(0),
            }
        }
    }
}

pub mod adc {
    use super::*;

    registers!(Sr, Cr2, Jdr, Dr);

    flag!(Sr, eoc, 1);
    flag!(Sr, jeoc, 2);
    flag!(Sr, ovr, 5);
    field!(Cr2, jexten, 20, 0b11);
    field!(Cr2, exten, 28, 0b11);
    field!(Jdr, jdata, 0, 0xFFFF);
    field!(Dr, data, 0, 0xFFFF);

    /// `EXTEN`/`JEXTEN` value for triggering on the rising edge.
    pub const TRIGGER_RISING: u32 = 0b01;

    #[repr(C)]
    pub struct RegisterBlock {
        pub sr: Register<Sr>,
        _cr1: Register<Reserved>,
        pub cr2: Register<Cr2>,
        _smpr: [Register<Reserved>; 2],
        _jofr: [Register<Reserved>; 4],
        _htr: Register<Reserved>,
        _ltr: Register<Reserved>,
        _sqr: [Register<Reserved>; 3],
        _jsqr: Register<Reserved>,
        pub jdr: [Register<Jdr>; 4],
        pub dr: Register<Dr>,
    }

    const_assert_eq!(core::mem::size_of::<RegisterBlock>(), 0x50);

    impl RegisterBlock {
        pub const fn new() -> Self {
            RegisterBlock {
                sr: Register::new(0),
                _cr1: Register::new(0),
                cr2: Register::new(0),
                _smpr: [Register::new(0), Register::new(0)],
                _jofr: [
                    Register::new(0),
                    Register::new(0),
                    Register::new(0),
                    Register::new(0),
                ],
                _htr: Register::new(0),
                _ltr: Register::new(0),
                _sqr: [Register::new(0), Register::new(0), Register::new(0)],
                _jsqr: Register::new(0),
                jdr: [
                    Register::new(0),
                    Register::new(0),
                    Register::new(0),
                    Register::new(0),
                ],
                dr: Register::new(0),
            }
        }
    }
}

pub mod gpio {
    use super::*;

    registers!(Idr, Odr);

    #[repr(C)]
    pub struct RegisterBlock {
        _moder: Register<Reserved>,
        _otyper: Register<Reserved>,
        _ospeedr: Register<Reserved>,
        _pupdr: Register<Reserved>,
        pub idr: Register<Idr>,
        pub odr: Register<Odr>,
    }

    const_assert_eq!(core::mem::size_of::<RegisterBlock>(), 0x18);

    impl RegisterBlock {
        pub const fn new() -> Self {
            RegisterBlock {
                _moder: Register::new(0),
                _otyper: Register::new(0),
                _ospeedr: Register::new(0),
                _pupdr: Register::new(0),
                idr: Register::new(0),
                odr: Register::new(0),
            }
        }
    }
}
