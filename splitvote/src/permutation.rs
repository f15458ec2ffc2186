use crate::*;

/// A permutation of voter positions `0..n`.
///
/// Applying it to a sequence gives `y[i] = x[pi[i]]`: output position `i` takes its value
/// from input position `pi[i]`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(try_from = "Vec<usize>", into = "Vec<usize>")]
pub struct Permutation(Vec<usize>);

impl Permutation {
    /// Fisher-Yates shuffle driven by `rng`
    pub fn random(n: usize, rng: &mut RandomSource) -> Self {
        let mut pi: Vec<usize> = (0..n).collect();
        for i in 1..n {
            let j = rng.below_usize(i + 1);
            pi.swap(i, j);
        }
        Permutation(pi)
    }

    /// Validate that `pi` is a bijection on `0..pi.len()`
    pub fn from_vec(pi: Vec<usize>) -> Result<Self, Error> {
        let mut seen = vec![false; pi.len()];
        for &p in pi.iter() {
            if p >= seen.len() || seen[p] {
                return Err(Error::InvalidPermutation);
            }
            seen[p] = true;
        }
        Ok(Permutation(pi))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Image of `i`
    pub fn get(&self, i: usize) -> usize {
        self.0[i]
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    pub fn inverse(&self) -> Self {
        let mut inv = vec![0; self.0.len()];
        for (i, &p) in self.0.iter().enumerate() {
            inv[p] = i;
        }
        Permutation(inv)
    }

    /// `y[i] = x[pi[i]]`
    pub fn apply<T: Clone>(&self, x: &[T]) -> Result<Vec<T>, Error> {
        if x.len() != self.0.len() {
            return Err(Error::InvalidPermutation);
        }
        Ok(self.0.iter().map(|&p| x[p].clone()).collect())
    }
}

impl std::convert::TryFrom<Vec<usize>> for Permutation {
    type Error = Error;

    fn try_from(pi: Vec<usize>) -> Result<Self, Self::Error> {
        Permutation::from_vec(pi)
    }
}

impl From<Permutation> for Vec<usize> {
    fn from(pi: Permutation) -> Self {
        pi.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn rejects_non_bijections() {
        assert!(Permutation::from_vec(vec![0, 0, 1]).is_err());
        assert!(Permutation::from_vec(vec![0, 3, 1]).is_err());
        assert!(Permutation::from_vec(vec![2, 0, 1]).is_ok());
        assert!(serde_json::from_str::<Permutation>("[1,1]").is_err());
    }

    #[test]
    fn apply_takes_from_source_index() {
        let pi = Permutation::from_vec(vec![2, 0, 1]).unwrap();
        assert_eq!(pi.apply(&["a", "b", "c"]).unwrap(), vec!["c", "a", "b"]);
        assert!(pi.apply(&["a"]).is_err());
    }

    proptest! {
        #[test]
        fn inverse_roundtrip(n in 1usize..64, seed in any::<[u8; 32]>()) {
            let mut rng = RandomSource::from_seed(seed);
            let pi = Permutation::random(n, &mut rng);
            let x: Vec<usize> = (100..100 + n).collect();
            let mixed = pi.apply(&x).unwrap();
            prop_assert_eq!(pi.inverse().apply(&mixed).unwrap(), x);
            prop_assert!(Permutation::from_vec(pi.clone().into()).is_ok());
        }
    }
}
