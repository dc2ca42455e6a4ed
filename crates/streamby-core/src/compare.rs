//! Null-aware total ordering for chunk value types
//!
//! Every value type that can be aggregated carries a three-way comparison
//! that places nulls consistently: null sorts before every other value.
//! Floating point types additionally order NaN after every other value
//! (including +inf) and treat -0.0 and 0.0 as equal.

use std::cmp::Ordering;

pub const NULL_CHAR: char = '\u{FFFF}';
pub const NULL_BYTE: i8 = i8::MIN;
pub const NULL_SHORT: i16 = i16::MIN;
pub const NULL_INT: i32 = i32::MIN;
pub const NULL_LONG: i64 = i64::MIN;
pub const NULL_FLOAT: f32 = -f32::MAX;
pub const NULL_DOUBLE: f64 = -f64::MAX;

/// Three-way comparison with a consistent placement for null and NaN.
///
/// Implementations must be a total order; the winner-selection loops rely on
/// it and do not defend against inconsistent results.
pub trait TotalOrd {
    fn compare(&self, other: &Self) -> Ordering;

    /// Returns true if this value is the type's null sentinel
    fn is_null(&self) -> bool {
        false
    }
}

macro_rules! impl_total_ord_signed {
    ($($t:ty => $null:expr),* $(,)?) => {
        $(
            impl TotalOrd for $t {
                // The sentinel is the type minimum, so natural order already
                // places it first.
                #[inline]
                fn compare(&self, other: &Self) -> Ordering {
                    self.cmp(other)
                }

                #[inline]
                fn is_null(&self) -> bool {
                    *self == $null
                }
            }
        )*
    };
}

macro_rules! impl_total_ord_unsigned {
    ($($t:ty),* $(,)?) => {
        $(
            impl TotalOrd for $t {
                #[inline]
                fn compare(&self, other: &Self) -> Ordering {
                    self.cmp(other)
                }
            }
        )*
    };
}

macro_rules! impl_total_ord_float {
    ($($t:ty => $null:expr),* $(,)?) => {
        $(
            impl TotalOrd for $t {
                #[inline]
                fn compare(&self, other: &Self) -> Ordering {
                    let (lhs, rhs) = (*self, *other);
                    match (lhs == $null, rhs == $null) {
                        (true, true) => return Ordering::Equal,
                        (true, false) => return Ordering::Less,
                        (false, true) => return Ordering::Greater,
                        (false, false) => {}
                    }
                    match (lhs.is_nan(), rhs.is_nan()) {
                        (true, true) => Ordering::Equal,
                        (true, false) => Ordering::Greater,
                        (false, true) => Ordering::Less,
                        (false, false) => lhs.partial_cmp(&rhs).unwrap_or(Ordering::Equal),
                    }
                }

                #[inline]
                fn is_null(&self) -> bool {
                    *self == $null
                }
            }
        )*
    };
}

impl_total_ord_signed!(
    i8 => NULL_BYTE,
    i16 => NULL_SHORT,
    i32 => NULL_INT,
    i64 => NULL_LONG,
);

impl_total_ord_unsigned!(u8, u16, u32, u64);

impl_total_ord_float!(f32 => NULL_FLOAT, f64 => NULL_DOUBLE);

impl TotalOrd for char {
    #[inline]
    fn compare(&self, other: &Self) -> Ordering {
        match (*self == NULL_CHAR, *other == NULL_CHAR) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => self.cmp(other),
        }
    }

    #[inline]
    fn is_null(&self) -> bool {
        *self == NULL_CHAR
    }
}

/// Object values: `None` is null
impl<T: Ord> TotalOrd for Option<T> {
    #[inline]
    fn compare(&self, other: &Self) -> Ordering {
        // Option's derived order already puts None first
        self.cmp(other)
    }

    #[inline]
    fn is_null(&self) -> bool {
        self.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_double_null_sorts_first() {
        assert_eq!(NULL_DOUBLE.compare(&f64::NEG_INFINITY), Ordering::Less);
        assert_eq!(f64::NEG_INFINITY.compare(&NULL_DOUBLE), Ordering::Greater);
        assert_eq!(NULL_DOUBLE.compare(&NULL_DOUBLE), Ordering::Equal);
        assert!(NULL_DOUBLE.is_null());
        assert!(!0.0f64.is_null());
    }

    #[test]
    fn test_double_nan_sorts_last() {
        assert_eq!(f64::NAN.compare(&f64::INFINITY), Ordering::Greater);
        assert_eq!(f64::INFINITY.compare(&f64::NAN), Ordering::Less);
        assert_eq!(f64::NAN.compare(&f64::NAN), Ordering::Equal);
        assert_eq!(NULL_DOUBLE.compare(&f64::NAN), Ordering::Less);
    }

    #[test]
    fn test_signed_zero_is_equal() {
        assert_eq!((-0.0f64).compare(&0.0), Ordering::Equal);
        assert_eq!((-0.0f32).compare(&0.0), Ordering::Equal);
    }

    #[test]
    fn test_float_matches_double() {
        assert_eq!(NULL_FLOAT.compare(&f32::MIN), Ordering::Less);
        assert_eq!(f32::NAN.compare(&1.0), Ordering::Greater);
        assert_eq!(1.0f32.compare(&2.0), Ordering::Less);
    }

    #[test]
    fn test_integer_sentinels() {
        assert_eq!(NULL_LONG.compare(&(i64::MIN + 1)), Ordering::Less);
        assert!(NULL_INT.is_null());
        assert!(NULL_SHORT.is_null());
        assert!(NULL_BYTE.is_null());
        assert!(!0u64.is_null());
        assert_eq!(3u32.compare(&2), Ordering::Greater);
    }

    #[test]
    fn test_char_null_sorts_first() {
        assert_eq!(NULL_CHAR.compare(&'\0'), Ordering::Less);
        assert_eq!('a'.compare(&'b'), Ordering::Less);
        assert!(NULL_CHAR.is_null());
    }

    #[test]
    fn test_object_none_sorts_first() {
        let none: Option<String> = None;
        let a = Some("a".to_string());
        assert_eq!(none.compare(&a), Ordering::Less);
        assert_eq!(a.compare(&Some("b".to_string())), Ordering::Less);
        assert!(none.is_null());
    }
}
