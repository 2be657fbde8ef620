/// Money amounts and the service-tax price breakdown
///
/// Amounts are integer cents. The hosted backend stores decimals, so on the
/// wire a `Money` is a JSON number in major units (or a numeric string).
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::Add;

/// An amount of money in cents
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    /// Largest magnitude accepted from callers: $1,000,000,000,000.00.
    /// Keeps `cents * basis points` inside i64.
    pub const MAX: Money = Money(100_000_000_000_000);

    pub fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Whole currency units, e.g. `Money::from_major(100)` is $100.00.
    /// Saturates; untrusted input goes through `checked_from_major`.
    pub fn from_major(units: i64) -> Self {
        Money(units.saturating_mul(100))
    }

    pub fn checked_from_major(units: i64) -> Option<Self> {
        units.checked_mul(100).map(Money).filter(Money::in_range)
    }

    /// Convert a decimal amount, rounding to the nearest cent
    pub fn from_decimal(amount: f64) -> Option<Self> {
        if !amount.is_finite() {
            return None;
        }
        let cents = (amount * 100.0).round();
        if cents.abs() > Money::MAX.0 as f64 {
            return None;
        }
        Some(Money(cents as i64))
    }

    pub fn in_range(&self) -> bool {
        self.0.unsigned_abs() <= Money::MAX.0.unsigned_abs()
    }

    pub fn checked_add(self, rhs: Money) -> Option<Money> {
        self.0.checked_add(rhs.0).map(Money)
    }

    pub fn cents(&self) -> i64 {
        self.0
    }

    pub fn as_decimal(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }
}

impl Add for Money {
    type Output = Money;

    /// Saturating; used for running totals
    fn add(self, rhs: Money) -> Money {
        Money(self.0.saturating_add(rhs.0))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}${}.{:02}", sign, abs / 100, abs % 100)
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_decimal())
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MoneyVisitor;

        impl<'de> de::Visitor<'de> for MoneyVisitor {
            type Value = Money;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a decimal amount as a number or numeric string")
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Money, E> {
                Money::checked_from_major(v).ok_or_else(|| E::custom("amount out of range"))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Money, E> {
                i64::try_from(v)
                    .ok()
                    .and_then(Money::checked_from_major)
                    .ok_or_else(|| E::custom("amount out of range"))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Money, E> {
                Money::from_decimal(v).ok_or_else(|| E::custom("amount out of range"))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Money, E> {
                let parsed: f64 = v
                    .trim()
                    .parse()
                    .map_err(|_| E::custom(format!("invalid amount: {}", v)))?;
                self.visit_f64(parsed)
            }
        }

        deserializer.deserialize_any(MoneyVisitor)
    }
}

/// Service tax rate in basis points (1800 = 18%)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxRate(u32);

impl TaxRate {
    /// Accepts fractions in [0, 1)
    pub fn from_fraction(rate: f64) -> Option<Self> {
        if !rate.is_finite() || !(0.0..1.0).contains(&rate) {
            return None;
        }
        Some(TaxRate((rate * 10_000.0).round() as u32))
    }

    pub fn from_basis_points(bps: u32) -> Self {
        TaxRate(bps)
    }

    pub fn basis_points(&self) -> u32 {
        self.0
    }

    /// Tax owed on `price`, rounded half-up to the cent. `None` on overflow.
    pub fn tax_on(&self, price: Money) -> Option<Money> {
        let raw = price.cents().checked_mul(i64::from(self.0))?;
        let rounded = if raw >= 0 {
            raw.checked_add(5_000)? / 10_000
        } else {
            raw.checked_sub(5_000)? / 10_000
        };
        Some(Money::from_cents(rounded))
    }
}

/// Price, tax and total frozen into a transaction at creation time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBreakdown {
    pub price: Money,
    pub tax: Money,
    pub total: Money,
}

impl PriceBreakdown {
    /// `None` when the price is out of range
    pub fn compute(price: Money, rate: TaxRate) -> Option<Self> {
        if !price.in_range() {
            return None;
        }
        let tax = rate.tax_on(price)?;
        Some(Self {
            price,
            tax,
            total: price.checked_add(tax)?,
        })
    }

    /// Accept a caller-supplied breakdown only if it is in range and adds up
    pub fn from_parts(price: Money, tax: Money, total: Money) -> Option<Self> {
        if price.is_negative() || tax.is_negative() {
            return None;
        }
        if !(price.in_range() && tax.in_range() && total.in_range()) {
            return None;
        }
        if price.checked_add(tax) != Some(total) {
            return None;
        }
        Some(Self { price, tax, total })
    }
}
