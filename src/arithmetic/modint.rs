use serde::{Deserialize, Serialize};

/// Arithmetic in the prime field GF(modulus). Elements are `u32` values in
/// `[0, modulus)`; products are computed in `u64` before reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Field {
    modulus: u32,
}

impl Field {
    /// Creates the field. The modulus is assumed to be prime; see
    /// [`is_prime`].
    pub const fn new(modulus: u32) -> Self {
        Self { modulus }
    }

    pub const fn modulus(&self) -> u32 {
        self.modulus
    }

    /// Maps an arbitrary integer into the field.
    pub fn reduce(&self, x: u64) -> u32 {
        (x % self.modulus as u64) as u32
    }

    pub fn add(&self, a: u32, b: u32) -> u32 {
        ((a as u64 + b as u64) % self.modulus as u64) as u32
    }

    pub fn sub(&self, a: u32, b: u32) -> u32 {
        let m = self.modulus as u64;
        ((a as u64 + m - (b as u64 % m)) % m) as u32
    }

    pub fn mul(&self, a: u32, b: u32) -> u32 {
        ((a as u64 * b as u64) % self.modulus as u64) as u32
    }

    pub fn neg(&self, a: u32) -> u32 {
        self.sub(0, a)
    }

    /// Square-and-multiply exponentiation.
    pub fn pow(&self, base: u32, mut exp: u64) -> u32 {
        let mut result = self.reduce(1);
        let mut base = self.reduce(base as u64);
        while exp > 0 {
            if exp & 1 == 1 {
                result = self.mul(result, base);
            }
            base = self.mul(base, base);
            exp >>= 1;
        }
        result
    }

    /// Multiplicative inverse by Fermat's little theorem. Zero has none.
    pub fn inv(&self, a: u32) -> Option<u32> {
        let a = self.reduce(a as u64);
        if a == 0 {
            return None;
        }
        Some(self.pow(a, self.modulus as u64 - 2))
    }
}

/// Trial division primality test, at most 2^16 divisions for a `u32`.
pub fn is_prime(n: u32) -> bool {
    if n < 2 {
        return false;
    }
    if n % 2 == 0 {
        return n == 2;
    }
    let n = n as u64;
    let mut d = 3u64;
    while d * d <= n {
        if n % d == 0 {
            return false;
        }
        d += 2;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    const LARGE_PRIME: u32 = 4294967291;

    #[test]
    fn test_is_prime() {
        assert!(is_prime(2));
        assert!(is_prime(65521));
        assert!(is_prime(LARGE_PRIME));
        assert!(!is_prime(0));
        assert!(!is_prime(1));
        assert!(!is_prime(65535));
        assert!(!is_prime(u32::MAX));
    }

    #[test]
    fn test_add_and_sub() {
        let f = Field::new(65521);
        assert_eq!(f.add(65520, 1), 0);
        assert_eq!(f.add(65520, 2), 1);
        assert_eq!(f.sub(1, 2), 65520);
        assert_eq!(f.neg(0), 0);
        assert_eq!(f.neg(1), 65520);
    }

    #[test]
    fn test_mul_without_overflow() {
        let f = Field::new(LARGE_PRIME);
        assert_eq!(f.mul(LARGE_PRIME - 1, LARGE_PRIME - 1), 1);
        assert_eq!(f.mul(1 << 31, 2), 5);
    }

    #[test]
    fn test_inv() {
        let f = Field::new(65521);
        assert_eq!(f.inv(0), None);
        for a in [1, 2, 3, 1000, 65520] {
            let inv = f.inv(a).unwrap();
            assert_eq!(f.mul(a, inv), 1, "{}", a);
        }
        assert_eq!(f.inv(2), Some(32761));
    }

    #[test]
    fn test_pow() {
        let f = Field::new(65521);
        assert_eq!(f.pow(3, 0), 1);
        assert_eq!(f.pow(3, 4), 81);
        assert_eq!(f.pow(12345, 65520), 1);
    }
}
