use crate::*;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Which half of a split value the verifier asks to see
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// open `u`
    Left,
    /// open `v`
    Right,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Side::Left => write!(f, "left"),
            Side::Right => write!(f, "right"),
        }
    }
}

/// The cut-and-choose partition of replicas
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CutChallenge {
    /// Input-comparison list: replicas checked against the cast votes by half-openings
    pub icl: Vec<char>,
    /// Output-production list: replicas fully opened to prove the outcome
    pub opl: Vec<char>,
}

impl CutChallenge {
    /// Derive the partition Fiat-Shamir style from a bulletin-board hash
    pub fn derive(sbb_hash: &[u8; 32], k_list: &[char]) -> Result<Self, Error> {
        let n_reps = k_list.len();
        if n_reps == 0 || n_reps % 2 != 0 {
            return Err(Error::MalformedChallenge(format!(
                "cannot split {} replicas in half",
                n_reps
            )));
        }
        let m = n_reps / 2;
        let mut rng = RandomSource::from_seed(*sbb_hash);
        let pi = Permutation::random(n_reps, &mut rng);

        let mut first: Vec<usize> = pi.as_slice()[..m].to_vec();
        let mut second: Vec<usize> = pi.as_slice()[m..].to_vec();
        first.sort_unstable();
        second.sort_unstable();

        Ok(CutChallenge {
            icl: first.into_iter().map(|i| k_list[i]).collect(),
            opl: second.into_iter().map(|i| k_list[i]).collect(),
        })
    }

    /// `|icl| = |opl| = n_reps / 2`, disjoint, and together exactly `k_list`
    pub fn validate(&self, k_list: &[char]) -> Result<(), Error> {
        if self.icl.len() != self.opl.len() || self.icl.len() * 2 != k_list.len() {
            return Err(Error::MalformedChallenge(format!(
                "icl has {} replicas and opl has {}, expected {} each",
                self.icl.len(),
                self.opl.len(),
                k_list.len() / 2
            )));
        }
        let icl: BTreeSet<char> = self.icl.iter().cloned().collect();
        let opl: BTreeSet<char> = self.opl.iter().cloned().collect();
        if icl.len() != self.icl.len() || opl.len() != self.opl.len() {
            return Err(Error::MalformedChallenge("repeated replica".to_owned()));
        }
        if !icl.is_disjoint(&opl) {
            return Err(Error::MalformedChallenge(
                "icl and opl overlap".to_owned(),
            ));
        }
        let all: BTreeSet<char> = k_list.iter().cloned().collect();
        if icl.union(&opl).cloned().collect::<BTreeSet<char>>() != all {
            return Err(Error::MalformedChallenge(
                "icl and opl do not cover the replicas".to_owned(),
            ));
        }
        Ok(())
    }
}

/// Per race, per voter position: which half to open
pub type LeftRight = BTreeMap<String, BTreeMap<String, Side>>;

/// Draw one fair coin per race (in sorted race order) per voter position
pub fn derive_leftright(sbb_hash: &[u8; 32], race_ids: &[&str], p_list: &[String]) -> LeftRight {
    let mut rng = RandomSource::from_seed(*sbb_hash);
    let mut sorted = race_ids.to_vec();
    sorted.sort_unstable();

    let mut leftright = LeftRight::new();
    for race_id in sorted {
        let sides = p_list
            .iter()
            .map(|p| {
                let side = if rng.coin() { Side::Left } else { Side::Right };
                (p.clone(), side)
            })
            .collect();
        leftright.insert(race_id.to_owned(), sides);
    }
    leftright
}

/// Check that a left/right challenge covers every race and position
pub fn validate_leftright(
    leftright: &LeftRight,
    race_ids: &[&str],
    p_list: &[String],
) -> Result<(), Error> {
    if leftright.len() != race_ids.len() {
        return Err(Error::MalformedChallenge(format!(
            "left/right challenge covers {} races, expected {}",
            leftright.len(),
            race_ids.len()
        )));
    }
    for race_id in race_ids {
        let sides = leftright.get(*race_id).ok_or_else(|| {
            Error::MalformedChallenge(format!("no left/right challenge for race {}", race_id))
        })?;
        if sides.len() != p_list.len() || p_list.iter().any(|p| !sides.contains_key(p)) {
            return Err(Error::MalformedChallenge(format!(
                "left/right challenge for race {} does not cover every position",
                race_id
            )));
        }
    }
    Ok(())
}

/// Challenges a mix cell has learned so far
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Challenges {
    pub cut: Option<CutChallenge>,
    pub leftright: Option<LeftRight>,
}

impl Challenges {
    pub fn cut(&self) -> Option<&CutChallenge> {
        self.cut.as_ref()
    }

    pub fn leftright(&self) -> Option<&LeftRight> {
        self.leftright.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn letters(n: usize) -> Vec<char> {
        k_list(n).unwrap()
    }

    #[test]
    fn partition_property() {
        for n_reps in (2..=26).step_by(2) {
            for seed in 0..8u8 {
                let k = letters(n_reps);
                let cut = CutChallenge::derive(&[seed; 32], &k).unwrap();
                cut.validate(&k).unwrap();
                assert_eq!(cut.icl.len(), n_reps / 2);
                assert!(cut.icl.windows(2).all(|w| w[0] < w[1]));
                assert!(cut.opl.windows(2).all(|w| w[0] < w[1]));
            }
        }
    }

    #[test]
    fn derivation_is_a_function_of_the_hash() {
        let k = letters(24);
        let a = CutChallenge::derive(&[1; 32], &k).unwrap();
        let b = CutChallenge::derive(&[1; 32], &k).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn malformed_partitions() {
        let k = letters(4);
        let unequal = CutChallenge {
            icl: vec!['A'],
            opl: vec!['B', 'C', 'D'],
        };
        let overlap = CutChallenge {
            icl: vec!['A', 'B'],
            opl: vec!['B', 'C'],
        };
        let foreign = CutChallenge {
            icl: vec!['A', 'B'],
            opl: vec!['C', 'Z'],
        };
        for cut in &[unequal, overlap, foreign] {
            match cut.validate(&k) {
                Err(Error::MalformedChallenge(_)) => {}
                other => panic!("expected malformed challenge, got {:?}", other),
            }
        }
    }

    #[test]
    fn leftright_in_sorted_race_order() {
        let ps = p_list(20);
        let a = derive_leftright(&[5; 32], &["taxes", "mayor"], &ps);
        let b = derive_leftright(&[5; 32], &["mayor", "taxes"], &ps);
        assert_eq!(a, b);
        validate_leftright(&a, &["mayor", "taxes"], &ps).unwrap();
        assert!(validate_leftright(&a, &["mayor"], &ps).is_err());

        let json = serde_json::to_value(&a).unwrap();
        let side = json["mayor"]["p00"].as_str().unwrap();
        assert!(side == "left" || side == "right");
    }
}
