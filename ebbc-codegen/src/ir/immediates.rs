//! Immediate operands

use std::fmt;
use std::str::FromStr;

/// A 64-bit immediate integer operand.
///
/// Small values print in decimal, everything else in hexadecimal with `_`
/// between groups of four digits: `0x3b9a_ca00`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Imm64(i64);

impl Imm64 {
    pub fn new(x: i64) -> Self {
        Imm64(x)
    }

    pub fn value(self) -> i64 {
        self.0
    }
}

impl From<i64> for Imm64 {
    fn from(x: i64) -> Self {
        Imm64(x)
    }
}

fn write_hex(x: u64, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut pos = (64 - x.leading_zeros()).saturating_sub(1) & 0xf0;
    write!(f, "0x{:04x}", (x >> pos) & 0xffff)?;
    while pos > 0 {
        pos -= 16;
        write!(f, "_{:04x}", (x >> pos) & 0xffff)?;
    }
    Ok(())
}

impl fmt::Display for Imm64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let x = self.0;
        if -10_000 < x && x < 10_000 {
            write!(f, "{}", x)
        } else {
            write_hex(x as u64, f)
        }
    }
}

impl FromStr for Imm64 {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (negative, body) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let digits: String = body.chars().filter(|&c| c != '_').collect();
        if digits.is_empty() {
            return Err(format!("invalid immediate `{}`", s));
        }
        let magnitude = if let Some(hex) = digits
            .strip_prefix("0x")
            .or_else(|| digits.strip_prefix("0X"))
        {
            if hex.is_empty() || hex.len() > 16 {
                return Err(format!("invalid hexadecimal immediate `{}`", s));
            }
            u64::from_str_radix(hex, 16).map_err(|_| format!("invalid hexadecimal immediate `{}`", s))?
        } else {
            digits
                .parse::<u64>()
                .map_err(|_| format!("invalid decimal immediate `{}`", s))?
        };
        if negative {
            if magnitude > i64::MAX as u64 + 1 {
                return Err(format!("immediate `{}` out of range", s));
            }
            Ok(Imm64((magnitude as i64).wrapping_neg()))
        } else {
            Ok(Imm64(magnitude as i64))
        }
    }
}

/// A 32-bit float immediate, stored as raw bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ieee32(u32);

impl Ieee32 {
    pub fn with_float(x: f32) -> Self {
        Ieee32(x.to_bits())
    }

    pub fn bits(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Ieee32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", f32::from_bits(self.0))
    }
}

impl FromStr for Ieee32 {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<f32>()
            .map(Ieee32::with_float)
            .map_err(|_| format!("invalid f32 immediate `{}`", s))
    }
}

/// A 64-bit float immediate, stored as raw bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ieee64(u64);

impl Ieee64 {
    pub fn with_float(x: f64) -> Self {
        Ieee64(x.to_bits())
    }

    pub fn bits(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Ieee64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", f64::from_bits(self.0))
    }
}

impl FromStr for Ieee64 {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<f64>()
            .map(Ieee64::with_float)
            .map_err(|_| format!("invalid f64 immediate `{}`", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn small_values_print_decimal() {
        assert_eq!(Imm64::new(0).to_string(), "0");
        assert_eq!(Imm64::new(9999).to_string(), "9999");
        assert_eq!(Imm64::new(-9999).to_string(), "-9999");
    }

    #[test]
    fn large_values_print_grouped_hex() {
        assert_eq!(Imm64::new(10_000).to_string(), "0x2710");
        assert_eq!(Imm64::new(1_000_000_000).to_string(), "0x3b9a_ca00");
        assert_eq!(Imm64::new(0x5555_5555).to_string(), "0x5555_5555");
        assert_eq!(Imm64::new(-10_000).to_string(), "0xffff_ffff_ffff_d8f0");
    }

    #[test]
    fn parse_accepts_all_spellings() {
        assert_eq!("42".parse::<Imm64>(), Ok(Imm64::new(42)));
        assert_eq!("-42".parse::<Imm64>(), Ok(Imm64::new(-42)));
        assert_eq!("0x3b9a_ca00".parse::<Imm64>(), Ok(Imm64::new(1_000_000_000)));
        assert_eq!("-0x10".parse::<Imm64>(), Ok(Imm64::new(-16)));
        assert_eq!(
            "0xffff_ffff_ffff_ffff".parse::<Imm64>(),
            Ok(Imm64::new(-1))
        );
        assert!("0x".parse::<Imm64>().is_err());
        assert!("12ab".parse::<Imm64>().is_err());
    }

    #[test]
    fn printed_immediates_parse_back() {
        for x in [0, 17, -3, 1_000_000_000, -123_456_789, i64::MIN, i64::MAX] {
            let imm = Imm64::new(x);
            assert_eq!(imm.to_string().parse::<Imm64>(), Ok(imm));
        }
    }

    #[test]
    fn floats_print_debug_style() {
        assert_eq!(Ieee32::with_float(1.5).to_string(), "1.5");
        assert_eq!(Ieee64::with_float(-0.0).to_string(), "-0.0");
        assert_eq!("inf".parse::<Ieee64>(), Ok(Ieee64::with_float(f64::INFINITY)));
    }
}
