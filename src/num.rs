use fastnum::{
    bint,
    decimal::{Context, RoundingMode, UnsignedDecimal},
};

/// Decimals of the native SOL token.
pub const SOL_DECIMALS: u8 = 9;

/// Fixed-point to decimal converter.
#[derive(Clone, Copy, Debug, Default)]
pub struct Converter {
    decimals: i32,
}

impl Converter {
    pub const fn new(decimals: u8) -> Self {
        Self {
            decimals: decimals as i32,
        }
    }

    /// Lamports to SOL.
    pub const fn sol() -> Self {
        Self::new(SOL_DECIMALS)
    }

    pub fn from_units<const N: usize>(&self, value: u64) -> UnsignedDecimal<N> {
        let unscaled = bint::UInt::<N>::from_le_slice(&value.to_le_bytes()).unwrap_or(bint::UInt::<N>::ZERO);
        UnsignedDecimal::<N>::from_parts(
            unscaled,
            -self.decimals,
            Context::default().with_rounding_mode(RoundingMode::Floor),
        )
    }
}
