use crate::*;
use hmac::{Hmac, Mac, NewMac};
use num_bigint::BigUint;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Commit to an integer value: HMAC-SHA256 keyed by the randomizer over the value's little-endian bytes
pub fn commit(value: &BigUint, randomizer: &Randomizer) -> Commitment {
    let mut mac = HmacSha256::new_from_slice(randomizer.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(&int_to_bytes(value));
    let mut out = [0u8; 32];
    out.copy_from_slice(&mac.finalize().into_bytes());
    Commitment(out)
}

/// Check that `(value, randomizer)` opens `commitment`
pub fn opens(commitment: &Commitment, value: &BigUint, randomizer: &Randomizer) -> bool {
    commit(value, randomizer) == *commitment
}

impl RandomSource {
    pub fn randomizer(&mut self) -> Randomizer {
        Randomizer(self.bytes32())
    }
}

/// Both halves of a committed split value
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SplitOpening {
    #[serde(with = "biguint_str")]
    pub u: BigUint,
    #[serde(with = "biguint_str")]
    pub v: BigUint,
    pub ru: Randomizer,
    pub rv: Randomizer,
    pub cu: Commitment,
    pub cv: Commitment,
}

impl SplitOpening {
    /// Split `x` into `(u, v)` and commit to both halves with fresh randomizers
    pub fn new(x: &BigUint, rng: &mut RandomSource, modulus: &BigUint) -> Self {
        let (u, v) = split_value(x, rng, modulus);
        let ru = rng.randomizer();
        let rv = rng.randomizer();
        SplitOpening {
            cu: commit(&u, &ru),
            cv: commit(&v, &rv),
            u,
            v,
            ru,
            rv,
        }
    }

    pub fn value(&self, modulus: &BigUint) -> BigUint {
        add_mod(&self.u, &self.v, modulus)
    }

    /// Reveal only the half selected by the challenge
    pub fn half(&self, side: Side) -> HalfOpening {
        match side {
            Side::Left => HalfOpening::U {
                u: self.u.clone(),
                ru: self.ru,
            },
            Side::Right => HalfOpening::V {
                v: self.v.clone(),
                rv: self.rv,
            },
        }
    }
}

/// One revealed half of a split value: `{u, ru}` for left, `{v, rv}` for right
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum HalfOpening {
    U {
        #[serde(with = "biguint_str")]
        u: BigUint,
        ru: Randomizer,
    },
    V {
        #[serde(with = "biguint_str")]
        v: BigUint,
        rv: Randomizer,
    },
}

impl HalfOpening {
    pub fn side(&self) -> Side {
        match self {
            HalfOpening::U { .. } => Side::Left,
            HalfOpening::V { .. } => Side::Right,
        }
    }

    pub fn value(&self) -> &BigUint {
        match self {
            HalfOpening::U { u, .. } => u,
            HalfOpening::V { v, .. } => v,
        }
    }

    /// Check against the pair of commitments `(cu, cv)`
    pub fn opens(&self, cu: &Commitment, cv: &Commitment) -> bool {
        match self {
            HalfOpening::U { u, ru } => opens(cu, u, ru),
            HalfOpening::V { v, rv } => opens(cv, v, rv),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commitment_binds_value_and_key() {
        let r = Randomizer([9u8; 32]);
        let c = commit(&BigUint::from(5u32), &r);
        assert!(opens(&c, &BigUint::from(5u32), &r));
        assert!(!opens(&c, &BigUint::from(6u32), &r));
        assert!(!opens(&c, &BigUint::from(5u32), &Randomizer([8u8; 32])));
    }

    #[test]
    fn halves_open_their_own_commitment() {
        let m = make_prime(&BigUint::from(1u32 << 16));
        let mut rng = RandomSource::from_seed([2u8; 32]);
        let opening = SplitOpening::new(&BigUint::from(777u32), &mut rng, &m);
        assert_eq!(opening.value(&m), BigUint::from(777u32));

        let left = opening.half(Side::Left);
        let right = opening.half(Side::Right);
        assert_eq!(left.side(), Side::Left);
        assert!(left.opens(&opening.cu, &opening.cv));
        assert!(right.opens(&opening.cu, &opening.cv));

        let json = serde_json::to_value(&left).unwrap();
        assert!(json.get("u").is_some() && json.get("v").is_none());
        let back: HalfOpening = serde_json::from_value(json).unwrap();
        assert_eq!(back, left);
    }
}
