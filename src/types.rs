//! Core fixed-point types: prices in nanos, quantities, timestamps, ids.

use std::fmt;

/// Number of price nanos per whole unit of the quote currency.
pub const NANOS_PER_UNIT: i64 = 1_000_000_000;

/// Price in units of 10⁻⁹ of the quote currency ("nanos").
///
/// `Price(1_500_000_000)` represents 1.50. Fixed-point integers avoid
/// floating-point drift in position and cash accounting; conversion to
/// floating point happens only at the display edge.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Price(pub i64);

impl Price {
    /// Sentinel meaning "no bid" in a top-of-book level.
    pub const NO_BID: Price = Price(0);
    /// Sentinel meaning "no ask" in a top-of-book level.
    pub const NO_ASK: Price = Price(i64::MAX);
    /// Upper bound on believable feed prices; anything above is corrupt data.
    pub const MAX_REASONABLE: Price = Price(10_000 * NANOS_PER_UNIT);

    /// Construct a price from whole units of the quote currency.
    pub const fn from_units(units: i64) -> Self {
        Price(units * NANOS_PER_UNIT)
    }

    /// True for a positive, non-sentinel, believable price.
    #[inline]
    pub fn is_plausible(self) -> bool {
        self.0 > 0 && self.0 != i64::MAX && self.0 <= Self::MAX_REASONABLE.0
    }

    /// True for a price a fill may legally execute at (positive, not the
    /// "no ask" sentinel). Looser than [`Price::is_plausible`]: the cap is a
    /// feed-sanity concern, not a matching concern.
    #[inline]
    pub fn is_fillable(self) -> bool {
        self.0 > 0 && self.0 != i64::MAX
    }

    /// Price in whole quote-currency units, for display only.
    #[inline]
    pub fn to_units_f64(self) -> f64 {
        self.0 as f64 / NANOS_PER_UNIT as f64
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Price::NO_ASK {
            return write!(f, "(no ask)");
        }
        let sign = if self.0 < 0 { "-" } else { "" };
        let n = self.0.unsigned_abs();
        let whole = n / NANOS_PER_UNIT as u64;
        let mut frac = n % NANOS_PER_UNIT as u64;
        // Trim trailing zeros down to two fractional digits.
        let mut digits = 9;
        while digits > 2 && frac % 10 == 0 {
            frac /= 10;
            digits -= 1;
        }
        write!(f, "{sign}${whole}.{frac:0width$}", width = digits)
    }
}

/// Order quantity in shares/contracts. Zero means empty/consumed.
pub type Quantity = u32;

/// Nanoseconds since epoch. Weakly monotone per input stream.
pub type Nanos = u64;

/// Instrument identifier carried on orders and trace records.
pub type SymbolId = u32;

/// Identifier of a simulated (participant-side) order, unique within a run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OrderId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "O{}", self.0)
    }
}
