#[macro_export]
macro_rules! define_mask {
    ($end:expr, $beg:expr) => {
        ((1 << $end) - (1 << $beg) + (1 << $end))
    };
}

#[macro_export]
macro_rules! define_bitfield {
    ($field:ident, [$($end:tt-$beg:tt)|*]) => {
        #[allow(non_upper_case_globals)]
        pub const $field: u64 = $( $crate::define_mask!($end, $beg) )|*;
    };
}

/// Defines a plain value type over a 64-bit register image.
///
/// Unlike the system registers, these values are never read with `mrs`:
/// they arrive in memory (e.g. the REC exit record) and are only decoded.
#[macro_export]
macro_rules! define_bits {
    ($name:ident, $($field:ident $bits:tt),* $(,)?) => {
        #[allow(non_snake_case)]
        #[derive(Copy, Clone, PartialEq, Eq, Default)]
        #[repr(C)]
        pub struct $name(u64);

        impl $name {
            #[inline(always)]
            pub const fn new(data: u64) -> $name {
                $name(data)
            }

            #[inline(always)]
            pub fn get(&self) -> u64 {
                self.0
            }

            #[inline(always)]
            pub fn get_masked(&self, mask: u64) -> u64 {
                self.0 & mask
            }

            #[inline(always)]
            pub fn get_masked_value(&self, mask: u64) -> u64 {
                (self.0 & mask) >> (mask.trailing_zeros())
            }

            #[inline(always)]
            pub fn set(&mut self, val: u64) -> &mut Self {
                self.0 = val;
                self
            }

            #[inline(always)]
            pub fn set_masked_value(&mut self, mask: u64, val: u64) -> &mut Self {
                self.0 = (self.0 & !mask) | ((val << (mask.trailing_zeros())) & mask);
                self
            }

            #[inline(always)]
            pub fn set_bits(&mut self, mask: u64) -> &mut Self {
                self.0 |= mask;
                self
            }

            #[inline(always)]
            pub fn clear_bits(&mut self, mask: u64) -> &mut Self {
                self.0 &= !mask;
                self
            }

            $( $crate::define_bitfield!($field, $bits); )*
        }

        impl From<u64> for $name {
            fn from(val: u64) -> Self {
                $name(val)
            }
        }

        impl core::fmt::Debug for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}({:#X})", stringify!($name), self.0)
            }
        }
    };
}
