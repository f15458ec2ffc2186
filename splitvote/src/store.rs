use crate::*;
use num_bigint::BigUint;
use std::collections::BTreeMap;

/// One voter's cast-vote data for one row: the Shamir share `x` and its committed split value
#[derive(Clone, Debug, PartialEq)]
pub struct CastVoteShare {
    pub ballot_id: String,
    pub x: BigUint,
    pub opening: SplitOpening,
}

/// Mixing state of one replica at one cell. Vectors are indexed by voter position.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReplicaState {
    /// input of this column
    pub x: Vec<BigUint>,
    /// output of this column
    pub y: Vec<BigUint>,
    pub pi: Option<Permutation>,
    pub pi_inv: Option<Permutation>,
    /// this row's share of the column's obfuscation values
    pub fuzz: Vec<BigUint>,
    /// committed split values of `y`, last column only
    pub outputs: Vec<SplitOpening>,
}

/// Partial replica state pushed by a peer; present fields overlay the receiver's
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReplicaPatch {
    pub x: Option<Vec<BigUint>>,
    pub y: Option<Vec<BigUint>>,
    pub pi: Option<Permutation>,
    pub pi_inv: Option<Permutation>,
    pub fuzz: Option<Vec<BigUint>>,
}

/// A cell's data for one race
#[derive(Clone, Debug, Default)]
pub struct RaceSlice {
    /// first column only
    pub cast: Vec<CastVoteShare>,

    pub replicas: BTreeMap<char, ReplicaState>,

    /// `(pi, pi_inv)` for icl replicas, as shared by the other cells
    pub peer_permutations: BTreeMap<CellId, BTreeMap<char, (Permutation, Permutation)>>,

    /// `(u, v)` of the cast votes, sent along the row to the last column
    pub row_inputs: Option<(Vec<BigUint>, Vec<BigUint>)>,

    /// Final outputs `y` broadcast by the other rows of the last column, by row then replica
    pub peer_outputs: BTreeMap<char, BTreeMap<char, Vec<BigUint>>>,
}

/// A typed update from one cell into another's store
#[derive(Clone, Debug, PartialEq)]
pub enum StoreDelta {
    CastVotes {
        race_id: String,
        votes: Vec<CastVoteShare>,
    },
    Replica {
        race_id: String,
        replica: char,
        patch: ReplicaPatch,
    },
    PeerPermutations {
        from: CellId,
        race_id: String,
        permutations: BTreeMap<char, (Permutation, Permutation)>,
    },
    RowInputs {
        race_id: String,
        u: Vec<BigUint>,
        v: Vec<BigUint>,
    },
    PeerOutputs {
        from_row: char,
        race_id: String,
        replica: char,
        y: Vec<BigUint>,
    },
    Challenges(Challenges),
}

impl StoreDelta {
    pub fn kind(&self) -> &'static str {
        match self {
            StoreDelta::CastVotes { .. } => "cast votes",
            StoreDelta::Replica { .. } => "replica state",
            StoreDelta::PeerPermutations { .. } => "icl permutations",
            StoreDelta::RowInputs { .. } => "row inputs",
            StoreDelta::PeerOutputs { .. } => "peer outputs",
            StoreDelta::Challenges(_) => "challenges",
        }
    }
}

/// The store owned by a single mix cell
#[derive(Clone, Debug)]
pub struct CellStore {
    pub cell: CellId,
    pub races: BTreeMap<String, RaceSlice>,
    pub challenges: Challenges,
    n_voters: usize,
    k_list: Vec<char>,
    race_ids: Vec<String>,
}

impl CellStore {
    /// An empty store with one empty replica slot per race and replica
    pub fn new(cell: CellId, election: &Election) -> Self {
        let mut races = BTreeMap::new();
        for race in election.races.iter() {
            let mut slice = RaceSlice::default();
            for k in election.k_list.iter() {
                slice.replicas.insert(*k, ReplicaState::default());
            }
            races.insert(race.race_id.clone(), slice);
        }
        CellStore {
            cell,
            races,
            challenges: Challenges::default(),
            n_voters: election.n_voters,
            k_list: election.k_list.clone(),
            race_ids: election.races.iter().map(|r| r.race_id.clone()).collect(),
        }
    }

    pub fn race(&self, race_id: &str) -> Result<&RaceSlice, Error> {
        self.races.get(race_id).ok_or_else(|| self.missing("race", race_id))
    }

    pub fn race_mut(&mut self, race_id: &str) -> Result<&mut RaceSlice, Error> {
        let err = self.missing("race", race_id);
        self.races.get_mut(race_id).ok_or(err)
    }

    pub fn replica(&self, race_id: &str, k: char) -> Result<&ReplicaState, Error> {
        self.race(race_id)?
            .replicas
            .get(&k)
            .ok_or_else(|| self.missing("replica", race_id))
    }

    pub fn replica_mut(&mut self, race_id: &str, k: char) -> Result<&mut ReplicaState, Error> {
        let err = self.missing("replica", race_id);
        self.race_mut(race_id)?.replicas.get_mut(&k).ok_or(err)
    }

    /// `(pi, pi_inv)` of replica `k` at `cell`, from this cell's own state or from what peers shared
    pub fn permutations(
        &self,
        race_id: &str,
        cell: CellId,
        k: char,
    ) -> Result<(&Permutation, &Permutation), Error> {
        if cell == self.cell {
            let replica = self.replica(race_id, k)?;
            match (&replica.pi, &replica.pi_inv) {
                (Some(pi), Some(pi_inv)) => Ok((pi, pi_inv)),
                _ => Err(self.missing("permutation", race_id)),
            }
        } else {
            self.race(race_id)?
                .peer_permutations
                .get(&cell)
                .and_then(|perms| perms.get(&k))
                .map(|(pi, pi_inv)| (pi, pi_inv))
                .ok_or_else(|| self.missing("peer permutation", race_id))
        }
    }

    pub fn missing(&self, what: &'static str, race_id: &str) -> Error {
        Error::MissingState {
            what,
            race_id: race_id.to_owned(),
            cell: self.cell,
        }
    }

    fn check_len(&self, what: &str, len: usize) -> Result<(), Error> {
        if len != self.n_voters {
            return Err(Error::MalformedUpdate(format!(
                "{} has {} entries, expected {}",
                what, len, self.n_voters
            )));
        }
        Ok(())
    }

    fn check_permutation(&self, pi: &Permutation) -> Result<(), Error> {
        if pi.len() != self.n_voters {
            return Err(Error::InvalidPermutation);
        }
        Ok(())
    }

    /// Merge a peer-pushed delta. Present values overlay old ones; nothing else is touched,
    /// so delivering the same delta twice is harmless.
    pub fn merge(&mut self, delta: StoreDelta) -> Result<(), Error> {
        match delta {
            StoreDelta::CastVotes { race_id, votes } => {
                self.check_len("cast votes", votes.len())?;
                self.race_mut(&race_id)?.cast = votes;
            }
            StoreDelta::Replica {
                race_id,
                replica,
                patch,
            } => {
                for (what, v) in [("x", &patch.x), ("y", &patch.y), ("fuzz", &patch.fuzz)].iter() {
                    if let Some(v) = v {
                        self.check_len(what, v.len())?;
                    }
                }
                for pi in [&patch.pi, &patch.pi_inv].iter() {
                    if let Some(pi) = pi {
                        self.check_permutation(pi)?;
                    }
                }
                if let (Some(pi), Some(pi_inv)) = (&patch.pi, &patch.pi_inv) {
                    if pi.inverse() != *pi_inv {
                        return Err(Error::InvalidPermutation);
                    }
                }
                let state = self.replica_mut(&race_id, replica)?;
                if let Some(x) = patch.x {
                    state.x = x;
                }
                if let Some(y) = patch.y {
                    state.y = y;
                }
                if let Some(pi) = patch.pi {
                    state.pi = Some(pi);
                }
                if let Some(pi_inv) = patch.pi_inv {
                    state.pi_inv = Some(pi_inv);
                }
                if let Some(fuzz) = patch.fuzz {
                    state.fuzz = fuzz;
                }
            }
            StoreDelta::PeerPermutations {
                from,
                race_id,
                permutations,
            } => {
                for (k, (pi, pi_inv)) in permutations.iter() {
                    if !self.k_list.contains(k) {
                        return Err(Error::MalformedUpdate(format!("unknown replica {}", k)));
                    }
                    self.check_permutation(pi)?;
                    if pi.inverse() != *pi_inv {
                        return Err(Error::InvalidPermutation);
                    }
                }
                self.race_mut(&race_id)?
                    .peer_permutations
                    .entry(from)
                    .or_default()
                    .extend(permutations);
            }
            StoreDelta::RowInputs { race_id, u, v } => {
                self.check_len("u", u.len())?;
                self.check_len("v", v.len())?;
                self.race_mut(&race_id)?.row_inputs = Some((u, v));
            }
            StoreDelta::PeerOutputs {
                from_row,
                race_id,
                replica,
                y,
            } => {
                self.check_len("y", y.len())?;
                self.race_mut(&race_id)?
                    .peer_outputs
                    .entry(from_row)
                    .or_default()
                    .insert(replica, y);
            }
            StoreDelta::Challenges(challenges) => {
                if let Some(cut) = challenges.cut {
                    cut.validate(&self.k_list)?;
                    self.challenges.cut = Some(cut);
                }
                if let Some(leftright) = challenges.leftright {
                    let race_ids: Vec<&str> = self.race_ids.iter().map(|r| r.as_str()).collect();
                    let p_list = p_list(self.n_voters);
                    validate_leftright(&leftright, &race_ids, &p_list)?;
                    self.challenges.leftright = Some(leftright);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn election() -> Election {
        Election::new(ElectionParameters {
            n_voters: 3,
            n_reps: 2,
            n_leak: 0,
            seed: Some("11".repeat(32)),
            ballot_style: vec![("taxes".into(), vec!["yes".into(), "no".into()])],
            ..Default::default()
        })
        .unwrap()
    }

    fn values(v: &[u32]) -> Vec<BigUint> {
        v.iter().map(|x| BigUint::from(*x)).collect()
    }

    #[test]
    fn replica_patch_overlays_only_present_fields() {
        let election = election();
        let mut store = CellStore::new(CellId::new('a', 0), &election);
        let patch = ReplicaPatch {
            x: Some(values(&[1, 2, 3])),
            ..Default::default()
        };
        let delta = StoreDelta::Replica {
            race_id: "taxes".into(),
            replica: 'A',
            patch,
        };
        store.merge(delta.clone()).unwrap();
        store.merge(delta).unwrap();

        let pi = Permutation::from_vec(vec![2, 0, 1]).unwrap();
        store
            .merge(StoreDelta::Replica {
                race_id: "taxes".into(),
                replica: 'A',
                patch: ReplicaPatch {
                    pi_inv: Some(pi.inverse()),
                    pi: Some(pi.clone()),
                    ..Default::default()
                },
            })
            .unwrap();

        let state = store.replica("taxes", 'A').unwrap();
        assert_eq!(state.x, values(&[1, 2, 3]));
        assert_eq!(state.pi, Some(pi));
        assert!(state.y.is_empty());
    }

    #[test]
    fn replica_patch_needs_matching_inverse() {
        let election = election();
        let mut store = CellStore::new(CellId::new('a', 0), &election);
        let pi = Permutation::from_vec(vec![2, 0, 1]).unwrap();
        let delta = StoreDelta::Replica {
            race_id: "taxes".into(),
            replica: 'A',
            patch: ReplicaPatch {
                x: Some(values(&[1, 2, 3])),
                pi_inv: Some(pi.clone()),
                pi: Some(pi),
                ..Default::default()
            },
        };
        match store.merge(delta) {
            Err(Error::InvalidPermutation) => {}
            other => panic!("unexpected {:?}", other),
        }
        let state = store.replica("taxes", 'A').unwrap();
        assert!(state.x.is_empty());
        assert_eq!(state.pi, None);
    }

    #[test]
    fn rejects_wrong_lengths_and_unknown_races() {
        let election = election();
        let mut store = CellStore::new(CellId::new('a', 0), &election);
        let short = StoreDelta::RowInputs {
            race_id: "taxes".into(),
            u: values(&[1]),
            v: values(&[1]),
        };
        assert!(store.merge(short).is_err());

        let unknown = StoreDelta::RowInputs {
            race_id: "mayor".into(),
            u: values(&[1, 2, 3]),
            v: values(&[1, 2, 3]),
        };
        match store.merge(unknown) {
            Err(Error::MissingState { .. }) => {}
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn malformed_challenge_is_refused() {
        let election = election();
        let mut store = CellStore::new(CellId::new('a', 0), &election);
        let bad = Challenges {
            cut: Some(CutChallenge {
                icl: vec!['A', 'B'],
                opl: vec![],
            }),
            leftright: None,
        };
        match store.merge(StoreDelta::Challenges(bad)) {
            Err(Error::MalformedChallenge(_)) => {}
            other => panic!("unexpected {:?}", other),
        }
        assert!(store.challenges.cut.is_none());
    }

    #[test]
    fn peer_permutations_must_be_consistent() {
        let election = election();
        let mut store = CellStore::new(CellId::new('a', 0), &election);
        let pi = Permutation::from_vec(vec![1, 2, 0]).unwrap();
        let mut perms = BTreeMap::new();
        perms.insert('A', (pi.clone(), pi.clone()));
        let delta = StoreDelta::PeerPermutations {
            from: CellId::new('b', 0),
            race_id: "taxes".into(),
            permutations: perms,
        };
        assert!(store.merge(delta).is_err());

        let mut perms = BTreeMap::new();
        perms.insert('A', (pi.clone(), pi.inverse()));
        store
            .merge(StoreDelta::PeerPermutations {
                from: CellId::new('b', 0),
                race_id: "taxes".into(),
                permutations: perms,
            })
            .unwrap();
        let (got, _) = store.permutations("taxes", CellId::new('b', 0), 'A').unwrap();
        assert_eq!(*got, pi);
    }
}
