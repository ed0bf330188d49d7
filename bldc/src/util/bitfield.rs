use core::marker::PhantomData;

pub trait Readable {}
pub trait Writeable {}

/// A 32-bit memory-mapped register. `T` is a marker naming the register, so that field
/// accessors can be generated per register on the proxies.
#[repr(transparent)]
pub struct Register<T> {
    register: vcell::VolatileCell<u32>,
    _marker: PhantomData<T>,
}

impl<T> Register<T> {
    /// Only for register blocks that live in ordinary memory; hardware blocks are mapped, never
    /// constructed.
    pub const fn new(bits: u32) -> Self {
        Register {
            register: vcell::VolatileCell::new(bits),
            _marker: PhantomData,
        }
    }

    #[inline(always)]
    pub fn read(&self) -> ReadProxy<T> {
        ReadProxy::new(self.register.get())
    }
}

impl<T> Register<T>
where
    T: Writeable,
{
    #[inline(always)]
    pub fn write(&self, bits: u32) {
        self.register.set(bits)
    }
}

impl<T> Register<T>
where
    T: Readable + Writeable,
{
    pub fn modify<F>(&self, f: F)
    where
        for<'a> F: FnOnce(&ReadProxy<T>, &'a mut WriteProxy<T>) -> &'a mut WriteProxy<T>,
    {
        let bits = self.register.get();
        self.register.set(
            f(
                &ReadProxy::new(bits),
                &mut WriteProxy {
                    bits,
                    _marker: PhantomData,
                },
            )
            .bits,
        )
    }
}

pub struct ReadProxy<T> {
    pub bits: u32,
    _marker: PhantomData<T>,
}

impl<T> ReadProxy<T> {
    #[inline(always)]
    pub fn new(bits: u32) -> Self {
        Self {
            bits,
            _marker: PhantomData,
        }
    }

    #[inline(always)]
    pub fn bits(&self) -> u32 {
        self.bits
    }

    #[inline(always)]
    pub fn bit(&self, offset: u32) -> bool {
        self.bits & (1 << offset) != 0
    }

    #[inline(always)]
    pub fn field(&self, offset: u32, mask: u32) -> u32 {
        (self.bits >> offset) & mask
    }
}

pub struct WriteProxy<T> {
    pub bits: u32,
    _marker: PhantomData<T>,
}

impl<T> WriteProxy<T> {
    #[inline(always)]
    pub fn bit(&mut self, offset: u32, value: bool) -> &mut Self {
        if value {
            self.bits |= 1 << offset;
        } else {
            self.bits &= !(1 << offset);
        }
        self
    }

    #[inline(always)]
    pub fn field(&mut self, offset: u32, mask: u32, value: u32) -> &mut Self {
        self.bits = (self.bits & !(mask << offset)) | ((value & mask) << offset);
        self
    }
}
