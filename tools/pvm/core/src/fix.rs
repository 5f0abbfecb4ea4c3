use core::fmt;
use core::ops::{Add, AddAssign, Div, Mul, Neg, Rem, Sub, SubAssign};

/// 16.16 signed fixed point, the only number type scripts see.
#[derive(Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Fix32(i32);

impl Fix32 {
    pub const ZERO: Fix32 = Fix32(0);
    pub const ONE: Fix32 = Fix32(0x1_0000);
    pub const MAX: Fix32 = Fix32(0x7FFF_FFFF);
    pub const MIN: Fix32 = Fix32(-0x7FFF_FFFF);

    pub const fn from_bits(bits: i32) -> Self {
        Fix32(bits)
    }

    pub const fn to_bits(self) -> i32 {
        self.0
    }

    /// Integers outside -32768..32767 wrap, as they do on the console.
    pub const fn from_int(n: i32) -> Self {
        Fix32(n.wrapping_shl(16))
    }

    pub fn from_f64(v: f64) -> Self {
        Fix32((v * 65536.0) as i64 as i32)
    }

    pub fn to_f64(self) -> f64 {
        self.0 as f64 / 65536.0
    }

    /// Integer part, rounded toward negative infinity.
    pub const fn to_int(self) -> i32 {
        self.0 >> 16
    }

    pub const fn fract_bits(self) -> u16 {
        self.0 as u16
    }

    pub const fn flr(self) -> Self {
        Fix32(self.0 & !0xFFFF)
    }

    pub fn ceil(self) -> Self {
        -(-self).flr()
    }

    pub fn abs(self) -> Self {
        Fix32(self.0.wrapping_abs())
    }

    pub fn sgn(self) -> Self {
        if self.0 < 0 { -Fix32::ONE } else { Fix32::ONE }
    }

    /// Middle value of three, whatever their order.
    pub fn mid(a: Self, b: Self, c: Self) -> Self {
        a.max(b).min(a.min(b).max(c))
    }

    pub fn parse(s: &[u8]) -> Option<Self> {
        let (neg, s) = match s.split_first() {
            Some((b'-', rest)) => (true, rest),
            _ => (false, s),
        };
        if s.is_empty() {
            return None;
        }

        let bits = if let Some(hex) = strip_prefix_ci(s, b"0x") {
            parse_radix(hex, 16)?
        } else if let Some(bin) = strip_prefix_ci(s, b"0b") {
            parse_radix(bin, 2)?
        } else {
            parse_decimal(s)?
        };

        Some(Fix32(if neg { bits.wrapping_neg() } else { bits }))
    }

    /// `0xhhhh.hhhh` rendering of the raw bits.
    pub fn fmt_hex(self, f: &mut impl fmt::Write) -> fmt::Result {
        let bits = self.0 as u32;
        write!(f, "0x{:04x}.{:04x}", bits >> 16, bits & 0xFFFF)
    }
}

fn strip_prefix_ci<'a>(s: &'a [u8], prefix: &[u8]) -> Option<&'a [u8]> {
    if s.len() >= prefix.len() && s[..prefix.len()].eq_ignore_ascii_case(prefix) {
        Some(&s[prefix.len()..])
    } else {
        None
    }
}

fn parse_radix(s: &[u8], radix: u32) -> Option<i32> {
    let (int, frac) = match s.iter().position(|&b| b == b'.') {
        Some(dot) => (&s[..dot], &s[dot + 1..]),
        None => (s, &[][..]),
    };
    if int.is_empty() && frac.is_empty() {
        return None;
    }

    let mut whole: u32 = 0;
    for &b in int {
        whole = whole.wrapping_mul(radix).wrapping_add((b as char).to_digit(radix)?);
    }

    let shift = radix.trailing_zeros();
    let mut fraction: u32 = 0;
    let mut used = 0;
    for &b in frac {
        let d = (b as char).to_digit(radix)?;
        if used + shift <= 16 {
            used += shift;
            fraction |= d << (16 - used);
        }
    }

    Some((whole << 16 | fraction) as i32)
}

fn parse_decimal(s: &[u8]) -> Option<i32> {
    let (int, frac) = match s.iter().position(|&b| b == b'.') {
        Some(dot) => (&s[..dot], &s[dot + 1..]),
        None => (s, &[][..]),
    };
    if int.is_empty() && frac.is_empty() {
        return None;
    }

    let mut whole: u32 = 0;
    for &b in int {
        if !b.is_ascii_digit() {
            return None;
        }
        whole = whole.wrapping_mul(10).wrapping_add((b - b'0') as u32);
    }

    let mut num: u64 = 0;
    let mut den: u64 = 1;
    for &b in frac {
        if !b.is_ascii_digit() {
            return None;
        }
        if den < 1_000_000_000 {
            num = num * 10 + (b - b'0') as u64;
            den *= 10;
        }
    }
    let fraction = ((num << 16) + den / 2) / den;

    Some(((whole << 16) as u64 + fraction) as u32 as i32)
}

impl fmt::Display for Fix32 {
    /// Up to four decimals with trailing zeros dropped.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let neg = self.0 < 0;
        let mag = (self.0 as i64).unsigned_abs();
        let mut whole = mag >> 16;
        let mut dec = ((mag & 0xFFFF) * 10_000 + 0x8000) >> 16;
        if dec >= 10_000 {
            whole += 1;
            dec -= 10_000;
        }

        if neg && (whole != 0 || dec != 0) {
            f.write_str("-")?;
        }
        write!(f, "{}", whole)?;
        if dec != 0 {
            let mut digits = 4;
            while dec % 10 == 0 {
                dec /= 10;
                digits -= 1;
            }
            write!(f, ".{:0width$}", dec, width = digits)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Fix32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fix32({})", self)
    }
}

impl From<i16> for Fix32 {
    fn from(n: i16) -> Self {
        Fix32::from_int(n as i32)
    }
}

impl From<u8> for Fix32 {
    fn from(n: u8) -> Self {
        Fix32::from_int(n as i32)
    }
}

impl From<bool> for Fix32 {
    fn from(b: bool) -> Self {
        if b { Fix32::ONE } else { Fix32::ZERO }
    }
}

impl Add for Fix32 {
    type Output = Fix32;
    fn add(self, rhs: Fix32) -> Fix32 {
        Fix32(self.0.wrapping_add(rhs.0))
    }
}

impl AddAssign for Fix32 {
    fn add_assign(&mut self, rhs: Fix32) {
        *self = *self + rhs;
    }
}

impl Sub for Fix32 {
    type Output = Fix32;
    fn sub(self, rhs: Fix32) -> Fix32 {
        Fix32(self.0.wrapping_sub(rhs.0))
    }
}

impl SubAssign for Fix32 {
    fn sub_assign(&mut self, rhs: Fix32) {
        *self = *self - rhs;
    }
}

impl Mul for Fix32 {
    type Output = Fix32;
    fn mul(self, rhs: Fix32) -> Fix32 {
        Fix32(((self.0 as i64 * rhs.0 as i64) >> 16) as i32)
    }
}

impl Div for Fix32 {
    type Output = Fix32;
    /// Division by zero saturates toward the sign of the dividend.
    fn div(self, rhs: Fix32) -> Fix32 {
        if rhs.0 == 0 {
            return if self.0 < 0 { Fix32::MIN } else { Fix32::MAX };
        }
        let q = ((self.0 as i64) << 16) / rhs.0 as i64;
        Fix32(q.clamp(Fix32::MIN.0 as i64, Fix32::MAX.0 as i64) as i32)
    }
}

impl Rem for Fix32 {
    type Output = Fix32;
    /// Result takes the sign of the divisor; `x % 0` is 0.
    fn rem(self, rhs: Fix32) -> Fix32 {
        if rhs.0 == 0 {
            return Fix32::ZERO;
        }
        let mut r = self.0.wrapping_rem(rhs.0);
        if r != 0 && (r ^ rhs.0) < 0 {
            r = r.wrapping_add(rhs.0);
        }
        Fix32(r)
    }
}

impl Neg for Fix32 {
    type Output = Fix32;
    fn neg(self) -> Fix32 {
        Fix32(self.0.wrapping_neg())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::{String, ToString};

    fn fx(v: f64) -> Fix32 {
        Fix32::from_f64(v)
    }

    #[test]
    fn display_trims_decimals() {
        assert_eq!(Fix32::from_int(3).to_string(), "3");
        assert_eq!(fx(0.5).to_string(), "0.5");
        assert_eq!(fx(-1.25).to_string(), "-1.25");
        assert_eq!((Fix32::ONE / Fix32::from_int(3)).to_string(), "0.3333");
        assert_eq!(Fix32::from_bits(6554).to_string(), "0.1");
        assert_eq!(Fix32::MAX.to_string(), "32768");
    }

    #[test]
    fn hex_formatting() {
        let mut s = String::new();
        fx(1.5).fmt_hex(&mut s).unwrap();
        assert_eq!(s, "0x0001.8000");
    }

    #[test]
    fn parse_forms() {
        assert_eq!(Fix32::parse(b"12"), Some(Fix32::from_int(12)));
        assert_eq!(Fix32::parse(b"-3.5"), Some(fx(-3.5)));
        assert_eq!(Fix32::parse(b".25"), Some(fx(0.25)));
        assert_eq!(Fix32::parse(b"0x10"), Some(Fix32::from_int(16)));
        assert_eq!(Fix32::parse(b"0x1.8"), Some(fx(1.5)));
        assert_eq!(Fix32::parse(b"0b101.1"), Some(fx(5.5)));
        assert_eq!(Fix32::parse(b"abc"), None);
        assert_eq!(Fix32::parse(b""), None);
        assert_eq!(Fix32::parse(b"-"), None);
    }

    #[test]
    fn division_by_zero_saturates() {
        assert_eq!(Fix32::ONE / Fix32::ZERO, Fix32::MAX);
        assert_eq!(-Fix32::ONE / Fix32::ZERO, Fix32::MIN);
    }

    #[test]
    fn remainder_follows_divisor_sign() {
        assert_eq!(Fix32::from_int(-1) % Fix32::from_int(3), Fix32::from_int(2));
        assert_eq!(Fix32::from_int(7) % Fix32::from_int(3), Fix32::ONE);
        assert_eq!(Fix32::from_int(7) % Fix32::ZERO, Fix32::ZERO);
    }

    #[test]
    fn floor_ceil_and_mid() {
        assert_eq!(fx(-1.5).flr(), Fix32::from_int(-2));
        assert_eq!(fx(1.25).ceil(), Fix32::from_int(2));
        assert_eq!(Fix32::mid(Fix32::from_int(5), Fix32::ONE, Fix32::from_int(3)), Fix32::from_int(3));
    }

    #[test]
    fn integers_wrap() {
        assert_eq!(Fix32::from_int(32768), Fix32::from_int(-32768));
        assert_eq!(Fix32::from_int(65536), Fix32::ZERO);
    }
}
