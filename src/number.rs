use std::{
    cmp::Ordering,
    fmt::{self, Display},
    ops::{Add, Mul, Sub},
    str::FromStr,
};

use crate::error::{LispError, LispResult};

/// Signed arbitrary-precision decimal, stored as base-10 digit vectors for
/// the integer and fractional parts. The `decimal` flag is independent of
/// the fractional digits so that `1.0` keeps printing with a decimal point
/// after its trailing zeros are trimmed.
#[derive(Debug, Clone)]
pub struct Number {
    negative: bool,
    decimal: bool,
    whole: Vec<u8>,
    frac: Vec<u8>,
}

impl Number {
    pub fn zero() -> Self {
        Number {
            negative: false,
            decimal: false,
            whole: vec![0],
            frac: Vec::new(),
        }
    }

    pub fn pi() -> Self {
        Number {
            negative: false,
            decimal: true,
            whole: vec![3],
            frac: vec![1, 4, 1, 5, 9, 2, 6, 5, 3, 5, 8, 9, 7, 9, 3, 2, 3, 8, 4, 6],
        }
    }

    pub fn is_negative(&self) -> bool {
        self.negative
    }

    pub fn is_decimal(&self) -> bool {
        self.decimal
    }

    pub fn is_zero(&self) -> bool {
        self.whole.iter().all(|&d| d == 0) && self.frac.iter().all(|&d| d == 0)
    }

    pub fn abs(&self) -> Number {
        let mut result = self.clone();
        result.negative = false;
        result
    }

    pub fn neg(&self) -> Number {
        let mut result = self.clone();
        result.negative = true;
        result
    }

    /// Orders by magnitude only: integer-part length first, then the digit
    /// vectors lexicographically. Correct only for canonical operands, and
    /// the sign is deliberately ignored (a limitation carried over from the
    /// original engine).
    pub fn cmp_digits(&self, other: &Number) -> Ordering {
        match self.whole.len().cmp(&other.whole.len()) {
            Ordering::Equal => {}
            order => return order,
        }
        match self.whole.cmp(&other.whole) {
            Ordering::Equal => {}
            order => return order,
        }
        self.frac.cmp(&other.frac)
    }

    /// Shifts the decimal point: negative moves it right (multiply by ten
    /// per place), positive moves it left.
    fn move_decimal(&mut self, places: i32) {
        if places < 0 {
            for _ in 0..-places {
                if self.frac.is_empty() {
                    self.whole.push(0);
                } else {
                    let digit = self.frac.remove(0);
                    self.whole.push(digit);
                }
            }
        } else {
            for _ in 0..places {
                match self.whole.pop() {
                    Some(digit) => self.frac.insert(0, digit),
                    None => self.frac.insert(0, 0),
                }
            }
        }
        trim_leading(&mut self.whole);
        trim_trailing(&mut self.frac);
        if !self.decimal && !self.frac.is_empty() {
            self.decimal = true;
        }
    }

    /// Digit-wise difference; callers guarantee both operands are
    /// non-negative and `self` has the larger magnitude.
    fn sub_digits(&self, other: &Number) -> Number {
        let width = self.frac.len().max(other.frac.len());
        let mut frac = vec![0u8; width];
        let mut borrow = 0i16;
        for i in (0..width).rev() {
            let a = self.frac.get(i).copied().unwrap_or(0) as i16;
            let b = other.frac.get(i).copied().unwrap_or(0) as i16;
            let mut digit = a - b - borrow;
            if digit < 0 {
                digit += 10;
                borrow = 1;
            } else {
                borrow = 0;
            }
            frac[i] = digit as u8;
        }

        let left_count = self.whole.len();
        let right_count = other.whole.len();
        let mut whole = vec![0u8; left_count];
        for i in 0..left_count {
            let a = self.whole[left_count - 1 - i] as i16;
            let b = if i < right_count {
                other.whole[right_count - 1 - i] as i16
            } else {
                0
            };
            let mut digit = a - b - borrow;
            if digit < 0 {
                digit += 10;
                borrow = 1;
            } else {
                borrow = 0;
            }
            whole[left_count - 1 - i] = digit as u8;
        }

        trim_leading(&mut whole);
        trim_trailing(&mut frac);
        Number {
            negative: false,
            decimal: self.decimal || other.decimal,
            whole,
            frac,
        }
    }

    /// Adds one when the leading fractional digit is five or more, then
    /// drops the fractional part entirely.
    pub fn round(&self) -> Number {
        let mut result = self.clone();
        if result.frac.first().is_some_and(|&d| d >= 5) {
            result = &result + &Number::from(1);
        }
        result.frac.clear();
        result.decimal = false;
        result
    }

    pub fn to_i64(&self) -> LispResult<i64> {
        let mut text = String::new();
        if self.negative {
            text.push('-');
        }
        if self.whole.is_empty() {
            text.push('0');
        }
        for &digit in &self.whole {
            text.push((b'0' + digit) as char);
        }
        text.parse()
            .map_err(|_| LispError::NotANumber(self.to_string()))
    }

    pub fn to_f64(&self) -> LispResult<f64> {
        self.to_string()
            .parse()
            .map_err(|_| LispError::NotANumber(self.to_string()))
    }

    /// Reconstructs a number from a float's decimal rendering. Fails on
    /// non-finite values, whose text has no digit representation.
    pub fn from_f64(value: f64) -> LispResult<Number> {
        format!("{value}").parse()
    }

    pub fn div(&self, other: &Number) -> LispResult<Number> {
        if other.is_zero() {
            return Err(LispError::DivisionByZero);
        }
        Number::from_f64(self.to_f64()? / other.to_f64()?)
    }

    pub fn rem(&self, other: &Number) -> LispResult<Number> {
        if other.is_zero() {
            return Err(LispError::DivisionByZero);
        }
        Number::from_f64(self.to_f64()? % other.to_f64()?)
    }
}

fn trim_leading(digits: &mut Vec<u8>) {
    match digits.iter().position(|&d| d != 0) {
        Some(index) => {
            digits.drain(..index);
        }
        None => {
            let keep_from = digits.len().saturating_sub(1);
            digits.drain(..keep_from);
        }
    }
}

fn trim_trailing(digits: &mut Vec<u8>) {
    match digits.iter().rposition(|&d| d != 0) {
        Some(index) => digits.truncate(index + 1),
        None => digits.clear(),
    }
}

impl Add for &Number {
    type Output = Number;

    fn add(self, other: &Number) -> Number {
        // Mixed signs reduce to a subtraction of magnitudes.
        if !self.negative && other.negative {
            return self - &other.abs();
        }
        if self.negative && !other.negative {
            return other - &self.abs();
        }

        let width = self.frac.len().max(other.frac.len());
        let mut frac = Vec::with_capacity(width);
        let mut carry = 0u8;
        for i in (0..width).rev() {
            let mut sum = carry;
            if i < self.frac.len() {
                sum += self.frac[i];
            }
            if i < other.frac.len() {
                sum += other.frac[i];
            }
            carry = sum / 10;
            frac.insert(0, sum % 10);
        }
        trim_trailing(&mut frac);

        let left_count = self.whole.len();
        let right_count = other.whole.len();
        let mut whole = Vec::new();
        for i in 0..left_count.max(right_count) {
            let mut sum = carry;
            if i < left_count {
                sum += self.whole[left_count - 1 - i];
            }
            if i < right_count {
                sum += other.whole[right_count - 1 - i];
            }
            carry = sum / 10;
            whole.insert(0, sum % 10);
        }
        if carry != 0 {
            whole.insert(0, carry);
        }
        trim_leading(&mut whole);

        Number {
            negative: self.negative,
            decimal: self.decimal || other.decimal,
            whole,
            frac,
        }
    }
}

impl Sub for &Number {
    type Output = Number;

    fn sub(self, other: &Number) -> Number {
        if other.negative {
            return self + &other.abs();
        }
        if self.negative {
            return (&self.abs() + other).neg();
        }
        if other.cmp_digits(self) == Ordering::Greater {
            return (other - self).neg();
        }
        self.sub_digits(other)
    }
}

impl Mul for &Number {
    type Output = Number;

    /// Repeated addition scaled by decimal-point shifts, one digit of the
    /// multiplier at a time. Linear in the multiplier's digit values; a
    /// known performance ceiling inherited from the original engine.
    fn mul(self, other: &Number) -> Number {
        let mut result = Number::zero();

        for i in (0..other.frac.len()).rev() {
            let mut partial = Number::zero();
            for _ in 0..other.frac[i] {
                partial = &partial + self;
            }
            partial.move_decimal(i as i32 + 1);
            result = &result + &partial;
        }

        let right_count = other.whole.len();
        for i in (0..right_count).rev() {
            let mut partial = Number::zero();
            for _ in 0..other.whole[i] {
                partial = &partial + self;
            }
            partial.move_decimal(-((right_count - 1 - i) as i32));
            result = &result + &partial;
        }

        result.negative = self.negative ^ other.negative;
        result
    }
}

impl From<i64> for Number {
    fn from(value: i64) -> Self {
        let negative = value < 0;
        let mut rest = value.unsigned_abs();
        let mut whole = Vec::new();
        loop {
            whole.insert(0, (rest % 10) as u8);
            if rest < 10 {
                break;
            }
            rest /= 10;
        }
        Number {
            negative,
            decimal: false,
            whole,
            frac: Vec::new(),
        }
    }
}

impl FromStr for Number {
    type Err = LispError;

    fn from_str(s: &str) -> LispResult<Self> {
        let mut number = Number {
            negative: false,
            decimal: false,
            whole: Vec::new(),
            frac: Vec::new(),
        };
        let mut rest = s;
        if let Some(stripped) = rest.strip_prefix('-') {
            number.negative = true;
            rest = stripped;
        }
        for c in rest.chars() {
            if c == '.' {
                if number.decimal {
                    return Err(LispError::NotANumber(s.to_string()));
                }
                number.decimal = true;
            } else if let Some(digit) = c.to_digit(10) {
                if number.decimal {
                    number.frac.push(digit as u8);
                } else {
                    number.whole.push(digit as u8);
                }
            } else {
                return Err(LispError::NotANumber(s.to_string()));
            }
        }
        Ok(number)
    }
}

impl Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negative {
            write!(f, "-")?;
        }
        if self.whole.is_empty() {
            write!(f, "0")?;
        }
        for &digit in &self.whole {
            write!(f, "{digit}")?;
        }
        if self.decimal {
            write!(f, ".")?;
            if self.frac.is_empty() {
                write!(f, "0")?;
            }
            for &digit in &self.frac {
                write!(f, "{digit}")?;
            }
        }
        Ok(())
    }
}

// Two numbers are equal exactly when their printed forms are equal, which
// keeps 1 and 1.0 distinct the way the rest of the value model expects.
impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}

impl Eq for Number {}

#[cfg(test)]
fn n(text: &str) -> Number {
    text.parse().unwrap()
}

#[test]
fn test_add() {
    assert_eq!((&n("2") + &n("3")).to_string(), "5");
    assert_eq!((&n("999") + &n("1")).to_string(), "1000");
    assert_eq!((&n("0.5") + &n("0.5")).to_string(), "1.0");
    assert_eq!((&n("1.25") + &n("2.75")).to_string(), "4.0");
    assert_eq!((&n("-2") + &n("-3")).to_string(), "-5");
    assert_eq!((&n("5") + &n("-3")).to_string(), "2");
    assert_eq!((&n("-5") + &n("3")).to_string(), "-2");
    assert_eq!(
        (&n("12345678901234567890") + &n("98765432109876543210")).to_string(),
        "111111111011111111100"
    );
}

#[test]
fn test_sub() {
    assert_eq!((&n("100") - &n("1")).to_string(), "99");
    assert_eq!((&n("1") - &n("2")).to_string(), "-1");
    assert_eq!((&n("2.5") - &n("0.25")).to_string(), "2.25");
    assert_eq!((&n("5") - &n("-3")).to_string(), "8");
    assert_eq!((&n("-5") - &n("3")).to_string(), "-8");
    assert_eq!((&n("-5") - &n("-3")).to_string(), "-2");
}

#[test]
fn test_mul() {
    assert_eq!((&n("12") * &n("10")).to_string(), "120");
    assert_eq!((&n("23") * &n("47")).to_string(), "1081");
    assert_eq!((&n("0.5") * &n("4")).to_string(), "2.0");
    assert_eq!((&n("1.5") * &n("1.5")).to_string(), "2.25");
    assert_eq!((&n("-3") * &n("4")).to_string(), "-12");
    assert_eq!((&n("7") * &n("0")).to_string(), "0");
}

#[test]
fn test_div() {
    assert_eq!(n("1").div(&n("4")).unwrap().to_string(), "0.25");
    assert_eq!(n("10").div(&n("4")).unwrap().to_string(), "2.5");
    assert!(matches!(
        n("1").div(&n("0")),
        Err(LispError::DivisionByZero)
    ));
    assert!(matches!(
        n("1").div(&n("0.0")),
        Err(LispError::DivisionByZero)
    ));
}

#[test]
fn test_rem() {
    assert_eq!(n("7").rem(&n("3")).unwrap().to_string(), "1");
    assert!(matches!(n("7").rem(&n("0")), Err(LispError::DivisionByZero)));
}

#[test]
fn test_round() {
    assert_eq!(n("1.5").round().to_string(), "2");
    assert_eq!(n("1.4").round().to_string(), "1");
    assert_eq!(n("2").round().to_string(), "2");
    // The original adds one before clearing the fraction, so negative
    // halves collapse toward zero.
    assert_eq!(n("-1.5").round().to_string(), "-0");
}

#[test]
fn test_cmp_digits() {
    assert_eq!(n("2").cmp_digits(&n("10")), Ordering::Less);
    assert_eq!(n("12").cmp_digits(&n("19")), Ordering::Less);
    assert_eq!(n("21").cmp_digits(&n("19")), Ordering::Greater);
    assert_eq!(n("0.5").cmp_digits(&n("0.49")), Ordering::Greater);
    assert_eq!(n("0.5").cmp_digits(&n("0.51")), Ordering::Less);
    assert_eq!(n("3").cmp_digits(&n("3")), Ordering::Equal);
}

#[test]
fn test_conversions() {
    assert_eq!(n("-42").to_i64().unwrap(), -42);
    assert_eq!(n("0.25").to_f64().unwrap(), 0.25);
    assert_eq!(Number::from(-7).to_string(), "-7");
    assert_eq!(Number::from_f64(2.5).unwrap().to_string(), "2.5");
    assert!(Number::from_f64(f64::NAN).is_err());
}

#[test]
fn test_parse_keeps_digits_verbatim() {
    // Literal text is stored digit-for-digit; only arithmetic results are
    // canonicalized.
    assert_eq!(n("007").to_string(), "007");
    assert_eq!(n("-.5").to_string(), "-0.5");
    assert!("1.2.3".parse::<Number>().is_err());
}
