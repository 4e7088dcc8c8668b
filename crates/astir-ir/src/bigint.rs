//! Arbitrary-width integer arithmetic (`spec.md` §4.2, component C2).
//!
//! Backs `_BitInt` constant folding and the runtime representation of
//! compile-time constants wider than 64 bits. Storage is a little-endian
//! vector of 64-bit limbs, always masked so that bits at or above `width`
//! are zero; `signed` only affects *interpretation* (sign extension,
//! comparison, conversion to floating point), never the stored bit pattern.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bigint {
    pub width: u32,
    pub signed: bool,
    limbs: Vec<u64>,
}

fn limb_count(width: u32) -> usize {
    ((width as usize) + 63) / 64
}

impl Bigint {
    pub fn zero(width: u32, signed: bool) -> Self {
        Bigint {
            width,
            signed,
            limbs: vec![0; limb_count(width).max(1)],
        }
    }

    pub fn from_i64(width: u32, signed: bool, value: i64) -> Self {
        let mut limbs = vec![if value < 0 { u64::MAX } else { 0 }; limb_count(width).max(1)];
        limbs[0] = value as u64;
        let mut result = Bigint {
            width,
            signed,
            limbs,
        };
        result.mask_to_width();
        result
    }

    pub fn from_u64(width: u32, signed: bool, value: u64) -> Self {
        let mut limbs = vec![0u64; limb_count(width).max(1)];
        limbs[0] = value;
        let mut result = Bigint {
            width,
            signed,
            limbs,
        };
        result.mask_to_width();
        result
    }

    fn mask_to_width(&mut self) {
        let full_limbs = (self.width as usize) / 64;
        let rem_bits = (self.width as usize) % 64;
        for limb in self.limbs.iter_mut().skip(full_limbs + if rem_bits > 0 { 1 } else { 0 }) {
            *limb = 0;
        }
        if rem_bits > 0 {
            if let Some(top) = self.limbs.get_mut(full_limbs) {
                *top &= (1u64 << rem_bits) - 1;
            }
        }
    }

    fn sign_bit(&self) -> bool {
        if self.width == 0 {
            return false;
        }
        let idx = (self.width - 1) as usize;
        (self.limbs[idx / 64] >> (idx % 64)) & 1 == 1
    }

    /// Reinterprets raw bits at a new width, zero/sign-extending or
    /// truncating without regard to `self.signed`.
    pub fn copy_resize(&self, new_width: u32) -> Self {
        let mut limbs = vec![0u64; limb_count(new_width).max(1)];
        let copy_len = limbs.len().min(self.limbs.len());
        limbs[..copy_len].copy_from_slice(&self.limbs[..copy_len]);
        let mut result = Bigint {
            width: new_width,
            signed: self.signed,
            limbs,
        };
        result.mask_to_width();
        result
    }

    pub fn resize_cast_signed(&self, new_width: u32) -> Self {
        let extend = self.sign_bit();
        let mut result = self.copy_resize(new_width.max(self.width));
        if extend {
            for bit in self.width..result.width {
                let idx = bit as usize;
                result.limbs[idx / 64] |= 1 << (idx % 64);
            }
        }
        result.width = new_width;
        result.mask_to_width();
        result.limbs.truncate(limb_count(new_width).max(1));
        result
    }

    pub fn resize_cast_unsigned(&self, new_width: u32) -> Self {
        let mut result = self.copy_resize(new_width);
        result.width = new_width;
        result.mask_to_width();
        result
    }

    pub fn set_signed_value(&mut self, value: i64) {
        *self = Bigint::from_i64(self.width, self.signed, value);
    }

    pub fn set_unsigned_value(&mut self, value: u64) {
        *self = Bigint::from_u64(self.width, self.signed, value);
    }

    /// Low 64 bits, sign-extended from `width` when `width < 64`. Values
    /// wider than 64 bits lose precision here by design -- callers needing
    /// the full magnitude use the limb-wise operations instead.
    pub fn get_signed(&self) -> i64 {
        let low = self.limbs[0];
        if self.width == 0 {
            0
        } else if self.width >= 64 {
            low as i64
        } else if self.sign_bit() {
            (low | (!0u64 << self.width)) as i64
        } else {
            low as i64
        }
    }

    pub fn get_unsigned(&self) -> u64 {
        self.limbs[0]
    }

    pub fn negate(&mut self) {
        self.invert();
        let one = Bigint::from_u64(self.width, self.signed, 1);
        *self = self.wrapping_add(&one);
    }

    pub fn invert(&mut self) {
        for limb in &mut self.limbs {
            *limb = !*limb;
        }
        self.mask_to_width();
    }

    pub fn is_zero(&self) -> bool {
        self.limbs.iter().all(|&l| l == 0)
    }

    pub fn signed_compare(&self, other: &Bigint) -> Ordering {
        match (self.sign_bit(), other.sign_bit()) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            _ => self.unsigned_compare(other),
        }
    }

    pub fn unsigned_compare(&self, other: &Bigint) -> Ordering {
        for i in (0..self.limbs.len().max(other.limbs.len())).rev() {
            let a = self.limbs.get(i).copied().unwrap_or(0);
            let b = other.limbs.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                other_order => return other_order,
            }
        }
        Ordering::Equal
    }

    pub fn signed_to_long_double(&self) -> f64 {
        self.get_signed() as f64
    }

    pub fn unsigned_to_long_double(&self) -> f64 {
        self.get_unsigned() as f64
    }

    pub fn signed_from_long_double(width: u32, signed: bool, value: f64) -> Self {
        Bigint::from_i64(width, signed, value.trunc() as i64)
    }

    pub fn unsigned_from_long_double(width: u32, signed: bool, value: f64) -> Self {
        Bigint::from_u64(width, signed, value.trunc() as u64)
    }

    /// Count of leading zero bits within `width`, MSB-first. Returns
    /// `default` (or `width` if `default` is `None`) when the value is zero.
    pub fn leading_zeros(&self, default: Option<u32>) -> u32 {
        if self.is_zero() {
            return default.unwrap_or(self.width);
        }
        for bit in (0..self.width).rev() {
            let idx = bit as usize;
            if (self.limbs[idx / 64] >> (idx % 64)) & 1 == 1 {
                return self.width - 1 - bit;
            }
        }
        self.width
    }

    pub fn trailing_zeros(&self, default: Option<u32>) -> u32 {
        if self.is_zero() {
            return default.unwrap_or(self.width);
        }
        for bit in 0..self.width {
            let idx = bit as usize;
            if (self.limbs[idx / 64] >> (idx % 64)) & 1 == 1 {
                return bit;
            }
        }
        self.width
    }

    pub fn nonzero_count(&self) -> u32 {
        let mut count = 0;
        for bit in 0..self.width {
            let idx = bit as usize;
            if (self.limbs[idx / 64] >> (idx % 64)) & 1 == 1 {
                count += 1;
            }
        }
        count
    }

    pub fn parity(&self) -> bool {
        self.nonzero_count() % 2 == 1
    }

    /// Number of bits, beyond the sign bit, that equal the sign bit (the
    /// `clrsb` family): zero for a value using its full width.
    pub fn redundant_sign_bits(&self) -> u32 {
        if self.width <= 1 {
            return 0;
        }
        let sign = self.sign_bit();
        let mut count = 0;
        for bit in (0..self.width - 1).rev() {
            let idx = bit as usize;
            let set = (self.limbs[idx / 64] >> (idx % 64)) & 1 == 1;
            if set == sign {
                count += 1;
            } else {
                break;
            }
        }
        count
    }

    pub fn least_significant_nonzero(&self) -> Option<u32> {
        if self.is_zero() {
            None
        } else {
            Some(self.trailing_zeros(None))
        }
    }

    pub fn wrapping_add(&self, other: &Bigint) -> Self {
        let len = self.limbs.len().max(other.limbs.len());
        let mut limbs = vec![0u64; len];
        let mut carry: u128 = 0;
        for i in 0..len {
            let a = self.limbs.get(i).copied().unwrap_or(0) as u128;
            let b = other.limbs.get(i).copied().unwrap_or(0) as u128;
            let sum = a + b + carry;
            limbs[i] = sum as u64;
            carry = sum >> 64;
        }
        let mut result = Bigint {
            width: self.width,
            signed: self.signed,
            limbs,
        };
        result.mask_to_width();
        result
    }

    pub fn wrapping_sub(&self, other: &Bigint) -> Self {
        let mut negated = other.clone();
        negated.negate();
        self.wrapping_add(&negated)
    }

    pub fn wrapping_mul(&self, other: &Bigint) -> Self {
        let len = limb_count(self.width).max(1);
        let mut acc = vec![0u128; len + 1];
        for (i, &a) in self.limbs.iter().enumerate() {
            if a == 0 {
                continue;
            }
            let mut carry: u128 = 0;
            for (j, &b) in other.limbs.iter().enumerate() {
                if i + j >= acc.len() {
                    break;
                }
                let product = (a as u128) * (b as u128) + acc[i + j] + carry;
                acc[i + j] = product & (u64::MAX as u128);
                carry = product >> 64;
            }
            if i + other.limbs.len() < acc.len() {
                acc[i + other.limbs.len()] += carry;
            }
        }
        let mut limbs = vec![0u64; len];
        for (i, limb) in limbs.iter_mut().enumerate() {
            *limb = acc[i] as u64;
        }
        let mut result = Bigint {
            width: self.width,
            signed: self.signed,
            limbs,
        };
        result.mask_to_width();
        result
    }

    fn shift_left(&self, amount: u32) -> Self {
        if amount >= self.width {
            return Bigint::zero(self.width, self.signed);
        }
        let mut result = Bigint::zero(self.width, self.signed);
        for bit in 0..self.width {
            let idx = bit as usize;
            if (self.limbs[idx / 64] >> (idx % 64)) & 1 == 1 {
                let dest = bit + amount;
                if dest < result.width {
                    let didx = dest as usize;
                    result.limbs[didx / 64] |= 1 << (didx % 64);
                }
            }
        }
        result
    }

    fn shift_right_logical(&self, amount: u32) -> Self {
        if amount >= self.width {
            return Bigint::zero(self.width, self.signed);
        }
        let mut result = Bigint::zero(self.width, self.signed);
        for bit in amount..self.width {
            let idx = bit as usize;
            if (self.limbs[idx / 64] >> (idx % 64)) & 1 == 1 {
                let dest = bit - amount;
                let didx = dest as usize;
                result.limbs[didx / 64] |= 1 << (didx % 64);
            }
        }
        result
    }

    fn shift_right_arithmetic(&self, amount: u32) -> Self {
        let mut result = self.shift_right_logical(amount);
        if self.sign_bit() {
            for bit in (self.width.saturating_sub(amount))..self.width {
                let idx = bit as usize;
                result.limbs[idx / 64] |= 1 << (idx % 64);
            }
        }
        result
    }

    pub fn shift_left_wrapping(&self, amount: u32) -> Self {
        self.shift_left(amount)
    }

    pub fn shift_right(&self, amount: u32, arithmetic: bool) -> Self {
        if arithmetic {
            self.shift_right_arithmetic(amount)
        } else {
            self.shift_right_logical(amount)
        }
    }

    pub fn bitand(&self, other: &Bigint) -> Self {
        self.zip_bits(other, |a, b| a & b)
    }

    pub fn bitor(&self, other: &Bigint) -> Self {
        self.zip_bits(other, |a, b| a | b)
    }

    pub fn bitxor(&self, other: &Bigint) -> Self {
        self.zip_bits(other, |a, b| a ^ b)
    }

    fn zip_bits(&self, other: &Bigint, f: impl Fn(u64, u64) -> u64) -> Self {
        let len = self.limbs.len().max(other.limbs.len());
        let mut limbs = vec![0u64; len];
        for i in 0..len {
            let a = self.limbs.get(i).copied().unwrap_or(0);
            let b = other.limbs.get(i).copied().unwrap_or(0);
            limbs[i] = f(a, b);
        }
        let mut result = Bigint {
            width: self.width,
            signed: self.signed,
            limbs,
        };
        result.mask_to_width();
        result
    }

    /// Unsigned division via binary long division; correct for arbitrary
    /// width. Divisor of zero panics, matching the div-by-zero contract the
    /// caller (the constant evaluator) must have already rejected.
    pub fn unsigned_div_rem(&self, divisor: &Bigint) -> (Self, Self) {
        assert!(!divisor.is_zero(), "division by zero");
        let mut quotient = Bigint::zero(self.width, false);
        let mut remainder = Bigint::zero(self.width, false);
        for bit in (0..self.width).rev() {
            remainder = remainder.shift_left(1);
            let idx = bit as usize;
            if (self.limbs[idx / 64] >> (idx % 64)) & 1 == 1 {
                remainder.limbs[0] |= 1;
            }
            if remainder.unsigned_compare(divisor) != Ordering::Less {
                remainder = remainder.wrapping_sub(divisor);
                let qidx = bit as usize;
                quotient.limbs[qidx / 64] |= 1 << (qidx % 64);
            }
        }
        (quotient, remainder)
    }

    pub fn signed_div_rem(&self, divisor: &Bigint) -> (Self, Self) {
        let lhs_neg = self.sign_bit();
        let rhs_neg = divisor.sign_bit();
        let mut lhs = self.clone();
        if lhs_neg {
            lhs.negate();
        }
        let mut rhs = divisor.clone();
        if rhs_neg {
            rhs.negate();
        }
        let (mut quotient, mut remainder) = lhs.unsigned_div_rem(&rhs);
        if lhs_neg != rhs_neg {
            quotient.negate();
        }
        if lhs_neg {
            remainder.negate();
        }
        quotient.signed = self.signed;
        remainder.signed = self.signed;
        (quotient, remainder)
    }
}
