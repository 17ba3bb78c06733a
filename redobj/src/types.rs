use chrono::{DateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};

pub use uuid::Uuid;

/// Point in time with nanosecond precision, stored as (seconds, nanos) since the Unix epoch.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Datetime(pub DateTime<Utc>);

impl Datetime {
    pub fn now() -> Self {
        Datetime(Utc::now())
    }

    pub fn from_timestamp(secs: i64, nanos: u32) -> Self {
        Datetime(Utc.timestamp_opt(secs, nanos).single().unwrap_or_default())
    }

    pub fn secs(&self) -> i64 {
        self.0.timestamp()
    }

    pub fn subsec_nanos(&self) -> u32 {
        self.0.timestamp_subsec_nanos()
    }
}

impl From<DateTime<Utc>> for Datetime {
    fn from(dt: DateTime<Utc>) -> Self {
        Datetime(dt)
    }
}

impl fmt::Display for Datetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

static PROCESS_RANDOM: Lazy<[u8; 5]> = Lazy::new(|| rand::rng().random());
static OBJECT_ID_COUNTER: Lazy<AtomicU32> = Lazy::new(|| AtomicU32::new(rand::rng().random()));

/// 12-byte object identifier: 4-byte big-endian timestamp, 5 random bytes fixed
/// per process, 3-byte big-endian counter.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(pub [u8; 12]);

impl ObjectId {
    pub fn generate() -> Self {
        let mut bytes = [0u8; 12];
        let secs = Utc::now().timestamp() as u32;
        bytes[0..4].copy_from_slice(&secs.to_be_bytes());
        bytes[4..9].copy_from_slice(&*PROCESS_RANDOM);
        let count = OBJECT_ID_COUNTER.fetch_add(1, AtomicOrdering::Relaxed);
        bytes[9..12].copy_from_slice(&count.to_be_bytes()[1..4]);
        ObjectId(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 12] {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

impl FromStr for ObjectId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 24 {
            return Err(format!("invalid ObjectId '{}': expected 24 hex characters", s));
        }
        let mut bytes = [0u8; 12];
        for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
            let hex = std::str::from_utf8(chunk).map_err(|e| e.to_string())?;
            bytes[i] = u8::from_str_radix(hex, 16).map_err(|e| e.to_string())?;
        }
        Ok(ObjectId(bytes))
    }
}

impl Serialize for ObjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Decimal number held as a normalized (mantissa, exponent) pair.
///
/// Covers the value range the binding needs for decimal columns; arithmetic
/// aligns exponents and falls back to widening the result exponent when the
/// mantissa would overflow.
#[derive(Copy, Clone, Debug, Default, Eq)]
pub struct Decimal128 {
    mantissa: i128,
    exponent: i32,
}

impl Decimal128 {
    pub fn new(mantissa: i128, exponent: i32) -> Self {
        Decimal128 { mantissa, exponent }.normalized()
    }

    pub fn mantissa(&self) -> i128 {
        self.mantissa
    }

    pub fn exponent(&self) -> i32 {
        self.exponent
    }

    fn normalized(mut self) -> Self {
        if self.mantissa == 0 {
            self.exponent = 0;
            return self;
        }
        while self.mantissa % 10 == 0 {
            self.mantissa /= 10;
            self.exponent += 1;
        }
        self
    }

    // Scales both operands to a common exponent, shrinking the more precise
    // mantissa if the scaled one would overflow i128.
    fn aligned(self, other: Self) -> (i128, i128, i32) {
        let (mut a, mut ea) = (self.mantissa, self.exponent);
        let (mut b, mut eb) = (other.mantissa, other.exponent);
        while ea > eb {
            match a.checked_mul(10) {
                Some(v) => {
                    a = v;
                    ea -= 1;
                }
                None => {
                    b /= 10;
                    eb += 1;
                }
            }
        }
        while eb > ea {
            match b.checked_mul(10) {
                Some(v) => {
                    b = v;
                    eb -= 1;
                }
                None => {
                    a /= 10;
                    ea += 1;
                }
            }
        }
        (a, b, ea)
    }

    pub fn to_f64(&self) -> f64 {
        self.mantissa as f64 * 10f64.powi(self.exponent)
    }

    /// `None` when the divisor is zero. Carries up to 18 extra digits of
    /// quotient precision before normalization.
    pub fn checked_div(self, rhs: Self) -> Option<Decimal128> {
        if rhs.mantissa == 0 {
            return None;
        }
        let mut scaled = self.mantissa;
        let mut extra = 0;
        for _ in 0..18 {
            match scaled.checked_mul(10) {
                Some(v) => {
                    scaled = v;
                    extra += 1;
                }
                None => break,
            }
        }
        Some(Decimal128::new(scaled / rhs.mantissa, self.exponent - rhs.exponent - extra))
    }
}

impl PartialEq for Decimal128 {
    fn eq(&self, other: &Self) -> bool {
        let (a, b, _) = self.aligned(*other);
        a == b
    }
}

impl PartialOrd for Decimal128 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Decimal128 {
    fn cmp(&self, other: &Self) -> Ordering {
        let (a, b, _) = self.aligned(*other);
        a.cmp(&b)
    }
}

impl std::ops::Add for Decimal128 {
    type Output = Decimal128;
    fn add(self, rhs: Self) -> Self {
        let (a, b, e) = self.aligned(rhs);
        Decimal128::new(a + b, e)
    }
}

impl std::ops::Sub for Decimal128 {
    type Output = Decimal128;
    fn sub(self, rhs: Self) -> Self {
        let (a, b, e) = self.aligned(rhs);
        Decimal128::new(a - b, e)
    }
}

impl std::ops::Mul for Decimal128 {
    type Output = Decimal128;
    fn mul(self, rhs: Self) -> Self {
        // Sheds trailing digits from the larger operand until the product
        // fits in an i128 mantissa.
        let (mut a, mut ea) = (self.mantissa, self.exponent);
        let (mut b, mut eb) = (rhs.mantissa, rhs.exponent);
        loop {
            match a.checked_mul(b) {
                Some(m) => return Decimal128::new(m, ea + eb),
                None => {
                    if a.unsigned_abs() >= b.unsigned_abs() {
                        a /= 10;
                        ea += 1;
                    } else {
                        b /= 10;
                        eb += 1;
                    }
                }
            }
        }
    }
}

impl From<i64> for Decimal128 {
    fn from(v: i64) -> Self {
        Decimal128::new(v as i128, 0)
    }
}

impl fmt::Display for Decimal128 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.exponent >= 0 {
            write!(f, "{}{}", self.mantissa, "0".repeat(self.exponent as usize))
        } else {
            let digits = self.mantissa.unsigned_abs().to_string();
            let sign = if self.mantissa < 0 { "-" } else { "" };
            let point = self.exponent.unsigned_abs() as usize;
            if digits.len() > point {
                let (int, frac) = digits.split_at(digits.len() - point);
                write!(f, "{}{}.{}", sign, int, frac)
            } else {
                write!(f, "{}0.{}{}", sign, "0".repeat(point - digits.len()), digits)
            }
        }
    }
}

impl FromStr for Decimal128 {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (int, frac) = match s.split_once('.') {
            Some((i, f)) => (i, f),
            None => (s, ""),
        };
        let digits = format!("{}{}", int, frac);
        let mantissa: i128 = digits.parse().map_err(|_| format!("invalid decimal '{}'", s))?;
        Ok(Decimal128::new(mantissa, -(frac.len() as i32)))
    }
}

impl Serialize for Decimal128 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Decimal128 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_ids_are_unique_and_round_trip() {
        let a = ObjectId::generate();
        let b = ObjectId::generate();
        assert_ne!(a, b);
        let parsed: ObjectId = a.to_string().parse().unwrap();
        assert_eq!(a, parsed);
    }

    #[test]
    fn decimal_arithmetic_aligns_exponents() {
        let a: Decimal128 = "1.5".parse().unwrap();
        let b: Decimal128 = "2.25".parse().unwrap();
        assert_eq!((a + b).to_string(), "3.75");
        assert_eq!((b - a).to_string(), "0.75");
        assert_eq!((a * b).to_string(), "3.375");
        assert!(a < b);
        assert_eq!(a, "1.50".parse().unwrap());
    }

    #[test]
    fn decimal_division_keeps_precision() {
        let a = Decimal128::from(1);
        let b = Decimal128::from(4);
        assert_eq!(a.checked_div(b).unwrap().to_string(), "0.25");
    }

    #[test]
    fn decimal_division_by_zero_is_none() {
        let a = Decimal128::from(7);
        assert!(a.checked_div(Decimal128::default()).is_none());
    }

    #[test]
    fn decimal_multiplication_sheds_precision_instead_of_overflowing() {
        let big = Decimal128::new(i128::MAX / 10, 0);
        let product = big * Decimal128::new(999, 0);
        assert!(product > big);
        assert_eq!(Decimal128::new(2, 30) * Decimal128::new(3, -30), Decimal128::from(6));
    }

    #[test]
    fn datetime_preserves_nanos() {
        let dt = Datetime::from_timestamp(1_700_000_000, 123_456_789);
        assert_eq!(dt.secs(), 1_700_000_000);
        assert_eq!(dt.subsec_nanos(), 123_456_789);
    }
}
