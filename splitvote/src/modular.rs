use num_bigint::BigUint;
use num_integer::Integer;
use num_traits::{One, Zero};

const SMALL_PRIMES: [u32; 20] = [
    2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47, 53, 59, 61, 67, 71,
];

/// Primality test: trial division by small primes, then Miller-Rabin using those primes as witnesses
pub fn is_prime(n: &BigUint) -> bool {
    for p in SMALL_PRIMES.iter() {
        let p = BigUint::from(*p);
        if *n == p {
            return true;
        }
        if n.is_multiple_of(&p) {
            return false;
        }
    }
    if *n < BigUint::from(SMALL_PRIMES[SMALL_PRIMES.len() - 1]) {
        // 0 and 1
        return false;
    }

    let one = BigUint::one();
    let n_minus_one = n - &one;
    let mut d = n_minus_one.clone();
    let mut s = 0u32;
    while d.is_even() {
        d >>= 1;
        s += 1;
    }

    'witness: for a in SMALL_PRIMES.iter() {
        let mut x = BigUint::from(*a).modpow(&d, n);
        if x == one || x == n_minus_one {
            continue;
        }
        for _ in 1..s {
            x = x.modpow(&BigUint::from(2u32), n);
            if x == n_minus_one {
                continue 'witness;
            }
        }
        return false;
    }
    true
}

/// Smallest prime strictly greater than `n`
pub fn next_prime(n: &BigUint) -> BigUint {
    let two = BigUint::from(2u32);
    let mut candidate = n + 1u32;
    if candidate <= two {
        return two;
    }
    if candidate.is_even() {
        candidate += 1u32;
    }
    while !is_prime(&candidate) {
        candidate += 2u32;
    }
    candidate
}

/// Smallest prime greater than or equal to `n`
pub fn make_prime(n: &BigUint) -> BigUint {
    if is_prime(n) {
        n.clone()
    } else {
        next_prime(n)
    }
}

/// Little-endian integer value of a byte string
pub fn bytes_to_int(bytes: &[u8]) -> BigUint {
    BigUint::from_bytes_le(bytes)
}

/// Minimal little-endian encoding (zero encodes as a single zero byte)
pub fn int_to_bytes(value: &BigUint) -> Vec<u8> {
    value.to_bytes_le()
}

/// `(a - b) mod m` for values already reduced mod `m`
pub fn sub_mod(a: &BigUint, b: &BigUint, m: &BigUint) -> BigUint {
    ((a + m) - b) % m
}

pub fn add_mod(a: &BigUint, b: &BigUint, m: &BigUint) -> BigUint {
    (a + b) % m
}

/// Modular inverse for prime `m` via Fermat's little theorem
pub fn inv_mod(a: &BigUint, m: &BigUint) -> Option<BigUint> {
    let a = a % m;
    if a.is_zero() {
        return None;
    }
    Some(a.modpow(&(m - 2u32), m))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn big(n: u64) -> BigUint {
        BigUint::from(n)
    }

    #[test]
    fn next_prime_examples() {
        assert_eq!(next_prime(&big(0)), big(2));
        assert_eq!(next_prime(&big(2)), big(3));
        assert_eq!(next_prime(&big(5)), big(7));
        assert_eq!(next_prime(&big(15)), big(17));
        assert_eq!(next_prime(&big(100)), big(101));
        assert_eq!(next_prime(&big(256)), big(257));
        assert_eq!(next_prime(&big(1000)), big(1009));
        assert_eq!(next_prime(&big(1_000_000)), big(1_000_003));

        let two_256: BigUint = BigUint::one() << 256;
        assert_eq!(next_prime(&two_256), two_256 + 297u32);
    }

    #[test]
    fn make_prime_keeps_primes() {
        assert_eq!(make_prime(&big(257)), big(257));
        assert_eq!(make_prime(&big(256)), big(257));
        assert!(!is_prime(&big(1)));
        assert!(!is_prime(&big(561)));
        assert!(is_prime(&big(65537)));
    }

    #[test]
    fn bytes_roundtrip_little_endian() {
        let value = bytes_to_int("yes".as_bytes());
        assert_eq!(value, big(0x73_65_79));
        assert_eq!(int_to_bytes(&value), b"yes".to_vec());
        assert_eq!(int_to_bytes(&BigUint::zero()), vec![0u8]);
    }

    #[test]
    fn modular_helpers() {
        let m = big(11);
        assert_eq!(sub_mod(&big(3), &big(5), &m), big(9));
        assert_eq!(add_mod(&big(7), &big(5), &m), big(1));
        assert_eq!(inv_mod(&big(3), &m), Some(big(4)));
        assert_eq!(inv_mod(&big(0), &m), None);
    }
}
