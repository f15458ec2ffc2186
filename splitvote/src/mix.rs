use crate::*;
use log::debug;
use num_bigint::BigUint;
use num_traits::Zero;
use std::collections::BTreeMap;
use std::fmt;

/// Mixing phases, in the order the coordinator drives them
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MixPhase {
    /// 0: synchronization point, no work
    Synchronize,
    /// 1: first column copies the cast shares into every replica
    ReplicateInput,
    /// 2: first row draws each column's permutations and shares them down the column
    GeneratePermutations,
    /// 3: first row deals each column's obfuscation shares, one per row
    GenerateObfuscation,
    /// 4..=3+cols: column `j` permutes and obfuscates, then passes its output on
    MixColumn(usize),
    /// nothing left to do
    Finished,
}

impl MixPhase {
    pub fn from_number(phase: u32, cols: usize) -> Self {
        let phase = phase as usize;
        match phase {
            0 => MixPhase::Synchronize,
            1 => MixPhase::ReplicateInput,
            2 => MixPhase::GeneratePermutations,
            3 => MixPhase::GenerateObfuscation,
            n if n < 4 + cols => MixPhase::MixColumn(n - 4),
            _ => MixPhase::Finished,
        }
    }

    /// Does `cell` have work to do in this phase?
    pub fn applies_to(&self, cell: CellId, server: &ServerArray) -> bool {
        match self {
            MixPhase::Synchronize => true,
            MixPhase::ReplicateInput => cell.col == 0,
            MixPhase::GeneratePermutations | MixPhase::GenerateObfuscation => {
                cell.row == server.first_row()
            }
            MixPhase::MixColumn(j) => cell.col == *j,
            MixPhase::Finished => false,
        }
    }
}

impl fmt::Display for MixPhase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MixPhase::Synchronize => write!(f, "mix:synchronize"),
            MixPhase::ReplicateInput => write!(f, "mix:replicate-input"),
            MixPhase::GeneratePermutations => write!(f, "mix:generate-permutations"),
            MixPhase::GenerateObfuscation => write!(f, "mix:generate-obfuscation"),
            MixPhase::MixColumn(j) => write!(f, "mix:column-{}", j),
            MixPhase::Finished => write!(f, "mix:finished"),
        }
    }
}

/// What a phase produced for other parties: bulletin-board posts and peer updates
#[derive(Debug, Default)]
pub struct PhaseWork {
    pub posts: Vec<Publication>,
    pub updates: Vec<(CellId, StoreDelta)>,
}

/// One mix cell: its coordinates, its own store and its private randomness
pub struct MixServer {
    pub election: Election,
    pub cell: CellId,
    pub store: CellStore,
    pub ledger: OpeningLedger,
    rngs: BTreeMap<String, RandomSource>,
}

impl MixServer {
    pub fn new(election: Election, role_index: usize) -> Result<Self, Error> {
        let cell = election.server.cell_of(role_index).ok_or_else(|| {
            Error::Configuration(format!(
                "role index {} is outside the {}x{} server array",
                role_index, election.server.rows, election.server.cols
            ))
        })?;
        let rngs = election
            .races
            .iter()
            .map(|race| {
                let label = format!("server:{}:{}:{}", race.race_id, cell.row, cell.col);
                (race.race_id.clone(), RandomSource::derive(&election.seed, &label))
            })
            .collect();
        let store = CellStore::new(cell, &election);

        Ok(MixServer {
            election,
            cell,
            store,
            ledger: OpeningLedger::default(),
            rngs,
        })
    }

    pub fn server(&self) -> &ServerArray {
        &self.election.server
    }

    pub fn is_first_col(&self) -> bool {
        self.cell.col == 0
    }

    pub fn is_last_col(&self) -> bool {
        self.cell.col == self.server().last_col()
    }

    pub(crate) fn rng(&mut self, race_id: &str) -> Result<&mut RandomSource, Error> {
        let err = self.store.missing("randomness source", race_id);
        self.rngs.get_mut(race_id).ok_or(err)
    }

    pub(crate) fn guard<P: fmt::Display>(&self, phase: P, allowed: bool) -> Result<(), Error> {
        if allowed {
            Ok(())
        } else {
            Err(Error::ProtocolPrecondition {
                phase: phase.to_string(),
                cell: self.cell,
            })
        }
    }

    /// Deliver `delta` to `to`, merging it directly when `to` is this cell
    pub(crate) fn route(
        &mut self,
        work: &mut PhaseWork,
        to: CellId,
        delta: StoreDelta,
    ) -> Result<(), Error> {
        if to == self.cell {
            self.store.merge(delta)
        } else {
            work.updates.push((to, delta));
            Ok(())
        }
    }

    /// Run one mixing phase. Phases that do not apply to this cell fail with `ProtocolPrecondition`.
    pub fn run_mix_phase(&mut self, phase: MixPhase) -> Result<PhaseWork, Error> {
        self.guard(phase, phase.applies_to(self.cell, self.server()))?;
        debug!("cell {}: running {}", self.cell, phase);
        match phase {
            MixPhase::Synchronize | MixPhase::Finished => Ok(PhaseWork::default()),
            MixPhase::ReplicateInput => self.replicate_input(),
            MixPhase::GeneratePermutations => self.generate_permutations(),
            MixPhase::GenerateObfuscation => self.generate_obfuscation(),
            MixPhase::MixColumn(j) => self.mix_column(j),
        }
    }

    /// Copy each race's cast shares `x` into every replica
    pub fn replicate_input(&mut self) -> Result<PhaseWork, Error> {
        self.guard(MixPhase::ReplicateInput, self.is_first_col())?;
        let n_voters = self.election.n_voters;
        for race_id in self.race_ids() {
            let slice = self.store.race_mut(&race_id)?;
            if slice.cast.len() != n_voters {
                return Err(self.store.missing("cast votes", &race_id));
            }
            let x: Vec<BigUint> = slice.cast.iter().map(|c| c.x.clone()).collect();
            for state in slice.replicas.values_mut() {
                state.x = x.clone();
            }
        }
        Ok(PhaseWork::default())
    }

    /// Draw this column's permutation per race and replica, and share it down the column
    pub fn generate_permutations(&mut self) -> Result<PhaseWork, Error> {
        let first_row = self.server().first_row();
        self.guard(MixPhase::GeneratePermutations, self.cell.row == first_row)?;
        let mut work = PhaseWork::default();
        let n_voters = self.election.n_voters;
        let peers = self.server().column_peers(self.cell);

        for race_id in self.race_ids() {
            for k in self.election.k_list.clone() {
                let pi = Permutation::random(n_voters, self.rng(&race_id)?);
                let pi_inv = pi.inverse();
                let patch = ReplicaPatch {
                    pi: Some(pi),
                    pi_inv: Some(pi_inv),
                    ..Default::default()
                };
                for peer in peers.iter() {
                    let delta = StoreDelta::Replica {
                        race_id: race_id.clone(),
                        replica: k,
                        patch: patch.clone(),
                    };
                    self.route(&mut work, *peer, delta)?;
                }
                let own = StoreDelta::Replica {
                    race_id: race_id.clone(),
                    replica: k,
                    patch,
                };
                self.route(&mut work, self.cell, own)?;
            }
        }
        Ok(work)
    }

    /// Deal, per race, replica and position, a threshold sharing of zero across the column's rows
    pub fn generate_obfuscation(&mut self) -> Result<PhaseWork, Error> {
        let first_row = self.server().first_row();
        self.guard(MixPhase::GenerateObfuscation, self.cell.row == first_row)?;
        let mut work = PhaseWork::default();
        let server = *self.server();
        let rows = server.row_list();
        let n_voters = self.election.n_voters;

        for race in self.election.races.clone() {
            for k in self.election.k_list.clone() {
                let mut by_row: Vec<Vec<BigUint>> = vec![Vec::with_capacity(n_voters); rows.len()];
                for _ in 0..n_voters {
                    let rng = self.rng(&race.race_id)?;
                    let shares = share(
                        &BigUint::zero(),
                        server.rows,
                        server.threshold,
                        rng,
                        &race.race_modulus,
                    )?;
                    for (r, (_, value)) in shares.into_iter().enumerate() {
                        by_row[r].push(value);
                    }
                }
                for (row, fuzz) in rows.iter().zip(by_row.into_iter()) {
                    let delta = StoreDelta::Replica {
                        race_id: race.race_id.clone(),
                        replica: k,
                        patch: ReplicaPatch {
                            fuzz: Some(fuzz),
                            ..Default::default()
                        },
                    };
                    self.route(&mut work, CellId::new(*row, self.cell.col), delta)?;
                }
            }
        }
        Ok(work)
    }

    /// `y[e] = x[pi[e]] + fuzz[e] (mod M)`; pass `y` right, or broadcast it down the last column
    pub fn mix_column(&mut self, col: usize) -> Result<PhaseWork, Error> {
        self.guard(MixPhase::MixColumn(col), self.cell.col == col)?;
        let mut work = PhaseWork::default();
        let last = self.is_last_col();
        let peers = self.server().column_peers(self.cell);

        for race in self.election.races.clone() {
            for k in self.election.k_list.clone() {
                let state = self.store.replica(&race.race_id, k)?;
                let pi = state
                    .pi
                    .as_ref()
                    .ok_or_else(|| self.store.missing("permutation", &race.race_id))?;
                if state.x.len() != pi.len() || state.fuzz.len() != pi.len() {
                    return Err(self.store.missing("mix input", &race.race_id));
                }
                let permuted = pi.apply(&state.x)?;
                let y: Vec<BigUint> = permuted
                    .iter()
                    .zip(state.fuzz.iter())
                    .map(|(x, f)| add_mod(x, f, &race.race_modulus))
                    .collect();

                self.store.replica_mut(&race.race_id, k)?.y = y.clone();

                if !last {
                    let next = CellId::new(self.cell.row, col + 1);
                    let delta = StoreDelta::Replica {
                        race_id: race.race_id.clone(),
                        replica: k,
                        patch: ReplicaPatch {
                            x: Some(y),
                            ..Default::default()
                        },
                    };
                    self.route(&mut work, next, delta)?;
                } else {
                    for peer in peers.iter() {
                        let delta = StoreDelta::PeerOutputs {
                            from_row: self.cell.row,
                            race_id: race.race_id.clone(),
                            replica: k,
                            y: y.clone(),
                        };
                        self.route(&mut work, *peer, delta)?;
                    }
                }
            }
        }
        Ok(work)
    }

    pub(crate) fn race_ids(&self) -> Vec<String> {
        self.election.races.iter().map(|r| r.race_id.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn election(n_fail: usize, n_leak: usize) -> Election {
        Election::new(ElectionParameters {
            n_voters: 6,
            n_reps: 2,
            n_fail,
            n_leak,
            seed: Some("22".repeat(32)),
            ..Default::default()
        })
        .unwrap()
    }

    /// Run the mix phases over a grid of cells, delivering updates directly
    fn run_grid(election: &Election, inputs: &BTreeMap<(String, char), Vec<BigUint>>) -> Vec<MixServer> {
        let server = election.server;
        let mut cells: Vec<MixServer> = (0..server.num_cells())
            .map(|i| MixServer::new(election.clone(), i).unwrap())
            .collect();
        for cell in cells.iter_mut().filter(|c| c.cell.col == 0) {
            for race in election.races.iter() {
                let x = &inputs[&(race.race_id.clone(), cell.cell.row)];
                let mut rng = RandomSource::from_seed([0u8; 32]);
                let votes = x
                    .iter()
                    .map(|x| CastVoteShare {
                        ballot_id: "b".into(),
                        x: x.clone(),
                        opening: SplitOpening::new(x, &mut rng, &race.race_modulus),
                    })
                    .collect();
                cell.store
                    .merge(StoreDelta::CastVotes {
                        race_id: race.race_id.clone(),
                        votes,
                    })
                    .unwrap();
            }
        }
        for n in 0..(5 + server.cols as u32) {
            let phase = MixPhase::from_number(n, server.cols);
            let mut deliveries = vec![];
            for cell in cells.iter_mut() {
                if phase.applies_to(cell.cell, &server) {
                    let work = cell.run_mix_phase(phase).unwrap();
                    deliveries.extend(work.updates);
                }
            }
            for (to, delta) in deliveries {
                let i = server.index_of(to).unwrap();
                cells[i].store.merge(delta).unwrap();
            }
        }
        cells
    }

    fn inputs_for(election: &Election) -> BTreeMap<(String, char), Vec<BigUint>> {
        let mut inputs = BTreeMap::new();
        for race in election.races.iter() {
            for (r, row) in election.server.row_list().into_iter().enumerate() {
                let x = (0..election.n_voters)
                    .map(|p| BigUint::from((p * 10 + r) as u32))
                    .collect();
                inputs.insert((race.race_id.clone(), row), x);
            }
        }
        inputs
    }

    #[test]
    fn phase_numbering() {
        assert_eq!(MixPhase::from_number(0, 2), MixPhase::Synchronize);
        assert_eq!(MixPhase::from_number(4, 2), MixPhase::MixColumn(0));
        assert_eq!(MixPhase::from_number(5, 2), MixPhase::MixColumn(1));
        assert_eq!(MixPhase::from_number(6, 2), MixPhase::Finished);
        assert_eq!(MixPhase::from_number(5, 1), MixPhase::Finished);
    }

    #[test]
    fn unauthorized_cell_fails_loudly() {
        let election = election(0, 1);
        let mut cell = MixServer::new(election, 3).unwrap(); // (b, 1)
        assert_eq!(cell.cell, CellId::new('b', 1));
        for phase in &[
            MixPhase::ReplicateInput,
            MixPhase::GeneratePermutations,
            MixPhase::MixColumn(0),
        ] {
            match cell.run_mix_phase(*phase) {
                Err(Error::ProtocolPrecondition { cell: c, .. }) => assert_eq!(c, cell.cell),
                other => panic!("unexpected {:?}", other.map(|_| ())),
            }
        }
    }

    #[test]
    fn single_cell_mix_is_a_pure_permutation() {
        let election = election(0, 0);
        let inputs = inputs_for(&election);
        let cells = run_grid(&election, &inputs);
        assert_eq!(cells.len(), 1);
        for race in election.races.iter() {
            for k in election.k_list.iter() {
                let state = cells[0].store.replica(&race.race_id, *k).unwrap();
                assert!(state.fuzz.iter().all(|f| f.is_zero()));
                let expected = state.pi.as_ref().unwrap().apply(&state.x).unwrap();
                assert_eq!(state.y, expected);
            }
        }
    }

    #[test]
    fn rows_share_permutations_and_fuzz_cancels() {
        let election = election(1, 1); // 4 rows, 2 cols, threshold 3
        let server = election.server;
        let inputs = inputs_for(&election);
        let cells = run_grid(&election, &inputs);
        let race = &election.races[0];
        let m = &race.race_modulus;

        for col in 0..server.cols {
            for k in election.k_list.iter() {
                let a = cells[server.index_of(CellId::new('a', col)).unwrap()]
                    .store
                    .replica(&race.race_id, *k)
                    .unwrap()
                    .clone();
                for row in server.row_list() {
                    let other = cells[server.index_of(CellId::new(row, col)).unwrap()]
                        .store
                        .replica(&race.race_id, *k)
                        .unwrap();
                    assert_eq!(other.pi, a.pi);
                    let expected: Vec<BigUint> = other
                        .pi
                        .as_ref()
                        .unwrap()
                        .apply(&other.x)
                        .unwrap()
                        .iter()
                        .zip(other.fuzz.iter())
                        .map(|(x, f)| add_mod(x, f, m))
                        .collect();
                    assert_eq!(other.y, expected);
                }

                // any threshold of rows reconstructs every fuzz value to zero
                for e in 0..election.n_voters {
                    let shares: Vec<Share> = server
                        .row_list()
                        .into_iter()
                        .enumerate()
                        .skip(1)
                        .map(|(r, row)| {
                            let cell = &cells[server.index_of(CellId::new(row, col)).unwrap()];
                            (r + 1, cell.store.replica(&race.race_id, *k).unwrap().fuzz[e].clone())
                        })
                        .collect();
                    let zero = lagrange(&shares, server.rows, server.threshold, m).unwrap();
                    assert!(zero.is_zero());
                }
            }
        }

        // last column received every other row's output
        let tally_cell = &cells[server.index_of(server.tally_cell()).unwrap()];
        let peer_outputs = &tally_cell.store.race(&race.race_id).unwrap().peer_outputs;
        assert_eq!(peer_outputs.len(), server.rows - 1);
    }
}
