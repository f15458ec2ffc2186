use crate::*;
use num_bigint::BigUint;
use num_traits::{One, Zero};

/// A Shamir share: evaluation point (1-based) and value
pub type Share = (usize, BigUint);

/// Split `secret` into `n` shares such that any `threshold` of them reconstruct it.
///
/// Shares are the evaluations of a random polynomial with constant term `secret` at
/// `x = 1..=n`, modulo the prime `modulus`. A single share (`n == 1`) is the secret itself.
pub fn share(
    secret: &BigUint,
    n: usize,
    threshold: usize,
    rng: &mut RandomSource,
    modulus: &BigUint,
) -> Result<Vec<Share>, Error> {
    if threshold == 0 || threshold > n {
        return Err(Error::Configuration(format!(
            "threshold {} is invalid for {} shares",
            threshold, n
        )));
    }
    if BigUint::from(n) >= *modulus || secret >= modulus {
        return Err(Error::Configuration(
            "secret or share count exceeds the modulus".to_owned(),
        ));
    }

    let mut coefs: Vec<BigUint> = Vec::with_capacity(threshold);
    coefs.push(secret.clone());
    for _ in 1..threshold {
        coefs.push(rng.below(modulus));
    }

    let shares = (1..=n)
        .map(|x| {
            let point = BigUint::from(x);
            let y = coefs
                .iter()
                .rev()
                .fold(BigUint::zero(), |acc, c| (acc * &point + c) % modulus);
            (x, y)
        })
        .collect();

    Ok(shares)
}

/// Reconstruct a secret from at least `threshold` shares by Lagrange interpolation at zero.
///
/// Only the first `threshold` shares are used.
pub fn lagrange(
    shares: &[Share],
    n: usize,
    threshold: usize,
    modulus: &BigUint,
) -> Result<BigUint, Error> {
    if threshold == 0 || threshold > n {
        return Err(Error::Configuration(format!(
            "threshold {} is invalid for {} shares",
            threshold, n
        )));
    }
    if shares.len() < threshold {
        return Err(Error::NotEnoughShares(threshold, shares.len()));
    }
    let shares = &shares[..threshold];

    let mut secret = BigUint::zero();
    for (i, (xi, yi)) in shares.iter().enumerate() {
        let mut numerator = BigUint::one();
        let mut denominator = BigUint::one();
        let xi = BigUint::from(*xi) % modulus;
        for (j, (xj, _)) in shares.iter().enumerate() {
            if i == j {
                continue;
            }
            let xj = BigUint::from(*xj) % modulus;
            // (0 - xj) / (xi - xj)
            numerator = numerator * sub_mod(&BigUint::zero(), &xj, modulus) % modulus;
            denominator = denominator * sub_mod(&xi, &xj, modulus) % modulus;
        }
        let inverse = inv_mod(&denominator, modulus).ok_or(Error::SecretRecoveryFailed)?;
        secret = (secret + yi * numerator % modulus * inverse) % modulus;
    }
    Ok(secret)
}

/// Random split-value representation `(u, v)` with `u + v = x (mod modulus)`
pub fn split_value(x: &BigUint, rng: &mut RandomSource, modulus: &BigUint) -> (BigUint, BigUint) {
    let u = rng.below(modulus);
    let v = sub_mod(&(x % modulus), &u, modulus);
    (u, v)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn modulus() -> BigUint {
        make_prime(&BigUint::from(65536u32))
    }

    #[test]
    fn any_threshold_subset_recovers() {
        let m = modulus();
        let mut rng = RandomSource::from_seed([3u8; 32]);
        let secret = BigUint::from(4242u32);
        let shares = share(&secret, 5, 3, &mut rng, &m).unwrap();
        assert_eq!(shares.len(), 5);
        assert_eq!(lagrange(&shares, 5, 3, &m).unwrap(), secret);

        let subset = vec![shares[4].clone(), shares[1].clone(), shares[2].clone()];
        assert_eq!(lagrange(&subset, 5, 3, &m).unwrap(), secret);

        let too_few = vec![shares[0].clone(), shares[3].clone()];
        match lagrange(&too_few, 5, 3, &m) {
            Err(Error::NotEnoughShares(3, 2)) => {}
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn single_row_is_the_secret() {
        let m = modulus();
        let mut rng = RandomSource::from_seed([4u8; 32]);
        let shares = share(&BigUint::zero(), 1, 1, &mut rng, &m).unwrap();
        assert_eq!(shares, vec![(1, BigUint::zero())]);
        assert_eq!(lagrange(&shares, 1, 1, &m).unwrap(), BigUint::zero());
    }

    #[test]
    fn rejects_bad_threshold() {
        let m = modulus();
        let mut rng = RandomSource::from_seed([5u8; 32]);
        assert!(share(&BigUint::one(), 2, 3, &mut rng, &m).is_err());
        assert!(share(&BigUint::one(), 2, 0, &mut rng, &m).is_err());
    }

    #[test]
    fn split_value_sums_back() {
        let m = modulus();
        let mut rng = RandomSource::from_seed([6u8; 32]);
        let x = BigUint::from(31337u32);
        let (u, v) = split_value(&x, &mut rng, &m);
        assert_eq!(add_mod(&u, &v, &m), x);
    }
}
