use crate::*;
use log::debug;
use num_enum::TryFromPrimitive;
use std::collections::BTreeMap;
use std::convert::TryFrom;
use std::fmt;

/// Proof phases, in the order the coordinator drives them
#[derive(Copy, Clone, Debug, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum ProofPhase {
    /// commit to split values of every final output
    OutputCommitments = 0,
    /// derive the cut-and-choose challenge from the board hash
    CutChallenge = 1,
    /// share each icl replica's permutations with every cell
    ShareIclPermutations = 2,
    /// publish the output -> input trace of every icl replica
    ComputePik = 3,
    /// send the cast `(u, v)` along each row to the last column
    ShareIclInputs = 4,
    /// publish t-values for every icl replica
    ComputeTValues = 5,
    /// derive the left/right challenge from the board hash
    LeftRightChallenge = 6,
    /// fully open the outputs of every opl replica
    ProveOutcome = 7,
    /// open the challenged half of every cast vote
    InputOpenings = 8,
    /// open the challenged half of every icl output
    OutputOpenings = 9,
}

impl ProofPhase {
    /// `None` once every phase has run
    pub fn from_number(phase: u32) -> Option<Self> {
        u8::try_from(phase)
            .ok()
            .and_then(|p| ProofPhase::try_from_primitive(p).ok())
    }

    pub fn applies_to(&self, cell: CellId, server: &ServerArray) -> bool {
        let first_col = cell.col == 0;
        let last_col = cell.col == server.last_col();
        match self {
            ProofPhase::OutputCommitments => last_col,
            ProofPhase::CutChallenge => cell == server.challenge_cell(),
            ProofPhase::ShareIclPermutations => true,
            ProofPhase::ComputePik => cell == server.pik_cell(),
            ProofPhase::ShareIclInputs => first_col,
            ProofPhase::ComputeTValues => last_col,
            ProofPhase::LeftRightChallenge => cell == server.challenge_cell(),
            ProofPhase::ProveOutcome => last_col,
            ProofPhase::InputOpenings => first_col,
            ProofPhase::OutputOpenings => last_col,
        }
    }

    /// Phases that read the bulletin-board hash before running
    pub fn needs_board_hash(&self) -> bool {
        matches!(
            self,
            ProofPhase::CutChallenge | ProofPhase::LeftRightChallenge
        )
    }
}

impl fmt::Display for ProofPhase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "proof:{}", *self as u8)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OpeningKind {
    Full,
    Half,
}

/// Tracks how each replica's outputs have been opened.
///
/// A replica opened both fully and by halves would let anyone link inputs to outputs.
#[derive(Clone, Debug, Default)]
pub struct OpeningLedger {
    opened: BTreeMap<(String, char), OpeningKind>,
}

impl OpeningLedger {
    pub fn record(&mut self, race_id: &str, k: char, kind: OpeningKind) -> Result<(), Error> {
        let key = (race_id.to_owned(), k);
        match self.opened.get(&key) {
            Some(prev) if *prev != kind => Err(Error::SecrecyViolation {
                race_id: race_id.to_owned(),
                replica: k,
            }),
            Some(_) => Ok(()),
            None => {
                self.opened.insert(key, kind);
                Ok(())
            }
        }
    }

    pub fn get(&self, race_id: &str, k: char) -> Option<OpeningKind> {
        self.opened.get(&(race_id.to_owned(), k)).copied()
    }
}

impl MixServer {
    /// Run one proof phase. Challenge phases need the current public board hash.
    pub fn run_proof_phase(
        &mut self,
        phase: ProofPhase,
        sbb_hash: Option<[u8; 32]>,
    ) -> Result<PhaseWork, Error> {
        self.guard(phase, phase.applies_to(self.cell, self.server()))?;
        debug!("cell {}: running {}", self.cell, phase);
        let hash = || {
            sbb_hash.ok_or_else(|| {
                Error::MalformedChallenge(format!("{} needs the board hash", phase))
            })
        };
        match phase {
            ProofPhase::OutputCommitments => self.output_commitments(),
            ProofPhase::CutChallenge => self.cut_challenge(&hash()?),
            ProofPhase::ShareIclPermutations => self.share_icl_permutations(),
            ProofPhase::ComputePik => self.compute_pik(),
            ProofPhase::ShareIclInputs => self.share_icl_inputs(),
            ProofPhase::ComputeTValues => self.compute_t_values(),
            ProofPhase::LeftRightChallenge => self.leftright_challenge(&hash()?),
            ProofPhase::ProveOutcome => self.prove_outcome(),
            ProofPhase::InputOpenings => self.input_openings(),
            ProofPhase::OutputOpenings => self.output_openings(),
        }
    }

    /// The cut-and-choose challenge this cell received, re-validated before use
    pub fn cut(&self) -> Result<CutChallenge, Error> {
        let cut = self.store.challenges.cut().ok_or_else(|| {
            Error::MalformedChallenge("cut-and-choose challenge not received".to_owned())
        })?;
        cut.validate(&self.election.k_list)?;
        Ok(cut.clone())
    }

    /// The left/right challenge this cell received, re-validated before use
    pub fn leftright(&self) -> Result<LeftRight, Error> {
        let leftright = self.store.challenges.leftright().ok_or_else(|| {
            Error::MalformedChallenge("left/right challenge not received".to_owned())
        })?;
        validate_leftright(
            leftright,
            &self.election.sorted_race_ids(),
            &self.election.p_list,
        )?;
        Ok(leftright.clone())
    }

    /// Input position that output position `py` of replica `k` came from, following row `row`
    fn trace_back(&self, race_id: &str, k: char, row: char, py: usize) -> Result<usize, Error> {
        let mut px = py;
        for col in (0..self.server().cols).rev() {
            let (pi, _) = self.store.permutations(race_id, CellId::new(row, col), k)?;
            px = pi.get(px);
        }
        Ok(px)
    }

    /// Output position that input position `px` of replica `k` ends up at, following row `row`
    fn trace_forward(&self, race_id: &str, k: char, row: char, px: usize) -> Result<usize, Error> {
        let mut py = px;
        for col in 0..self.server().cols {
            let (_, pi_inv) = self.store.permutations(race_id, CellId::new(row, col), k)?;
            py = pi_inv.get(py);
        }
        Ok(py)
    }

    fn broadcast_challenges(
        &mut self,
        work: &mut PhaseWork,
        challenges: Challenges,
    ) -> Result<(), Error> {
        for cell in self.server().cells() {
            self.route(work, cell, StoreDelta::Challenges(challenges.clone()))?;
        }
        Ok(())
    }

    /// Phase 0: commit to a fresh split of every output value
    pub fn output_commitments(&mut self) -> Result<PhaseWork, Error> {
        self.guard(ProofPhase::OutputCommitments, self.is_last_col())?;
        let row = key(self.cell.row);
        let mut commitments = ByRace::new();

        for race in self.election.races.clone() {
            let mut by_replica = ByReplica::new();
            for k in self.election.k_list.clone() {
                let y = self.store.replica(&race.race_id, k)?.y.clone();
                if y.len() != self.election.n_voters {
                    return Err(self.store.missing("mix output", &race.race_id));
                }
                let rng = self.rng(&race.race_id)?;
                let outputs: Vec<SplitOpening> = y
                    .iter()
                    .map(|y| SplitOpening::new(y, rng, &race.race_modulus))
                    .collect();

                let by_position: ByPosition<ByRow<CommitmentPair>> = self
                    .election
                    .p_list
                    .iter()
                    .zip(outputs.iter())
                    .map(|(p, o)| {
                        let mut by_row = ByRow::new();
                        by_row.insert(row.clone(), CommitmentPair { cu: o.cu, cv: o.cv });
                        (p.clone(), by_row)
                    })
                    .collect();
                by_replica.insert(key(k), by_position);
                self.store.replica_mut(&race.race_id, k)?.outputs = outputs;
            }
            commitments.insert(race.race_id.clone(), by_replica);
        }

        Ok(PhaseWork {
            posts: vec![Publication::new(
                PROOF_OUTPUT_COMMITMENTS,
                &OutputCommitments { commitments },
                false,
            )?],
            updates: vec![],
        })
    }

    /// Phase 1: derive, post and distribute the cut-and-choose challenge
    pub fn cut_challenge(&mut self, sbb_hash: &[u8; 32]) -> Result<PhaseWork, Error> {
        let allowed = self.cell == self.server().challenge_cell();
        self.guard(ProofPhase::CutChallenge, allowed)?;
        let cut = CutChallenge::derive(sbb_hash, &self.election.k_list)?;
        cut.validate(&self.election.k_list)?;
        debug!("cut challenge: icl {:?}, opl {:?}", cut.icl, cut.opl);

        let mut work = PhaseWork::default();
        work.posts.push(Publication::new(
            PROOF_CUT,
            &CutPublication {
                sbb_hash: Digest32(*sbb_hash),
                challenges: CutChallengeBody { cut: cut.clone() },
            },
            false,
        )?);
        self.broadcast_challenges(
            &mut work,
            Challenges {
                cut: Some(cut),
                leftright: None,
            },
        )?;
        Ok(work)
    }

    /// Phase 2: send `(pi, pi_inv)` of every icl replica to every other cell
    pub fn share_icl_permutations(&mut self) -> Result<PhaseWork, Error> {
        let cut = self.cut()?;
        let mut work = PhaseWork::default();
        let others: Vec<CellId> = self
            .server()
            .cells()
            .into_iter()
            .filter(|c| *c != self.cell)
            .collect();

        for race_id in self.race_ids() {
            let mut permutations = BTreeMap::new();
            for k in cut.icl.iter() {
                let (pi, pi_inv) = self.store.permutations(&race_id, self.cell, *k)?;
                permutations.insert(*k, (pi.clone(), pi_inv.clone()));
            }
            for cell in others.iter() {
                work.updates.push((
                    *cell,
                    StoreDelta::PeerPermutations {
                        from: self.cell,
                        race_id: race_id.clone(),
                        permutations: permutations.clone(),
                    },
                ));
            }
        }
        Ok(work)
    }

    /// Phase 3: publish, for each icl replica, the input position of every output position
    pub fn compute_pik(&mut self) -> Result<PhaseWork, Error> {
        let allowed = self.cell == self.server().pik_cell();
        self.guard(ProofPhase::ComputePik, allowed)?;
        let cut = self.cut()?;
        let row = self.server().first_row();
        let p_list = &self.election.p_list;
        let mut pik_dict = ByRace::new();

        for race_id in self.race_ids() {
            let mut by_replica = ByReplica::new();
            for k in cut.icl.iter() {
                let mut pik = ByPosition::new();
                for (py, p) in p_list.iter().enumerate() {
                    let px = self.trace_back(&race_id, *k, row, py)?;
                    pik.insert(p.clone(), p_list[px].clone());
                }
                by_replica.insert(key(*k), pik);
            }
            pik_dict.insert(race_id, by_replica);
        }

        Ok(PhaseWork {
            posts: vec![Publication::new(PROOF_PIK, &PikDict { pik_dict }, false)?],
            updates: vec![],
        })
    }

    /// Phase 4: send the split values of this row's cast votes to the last column
    pub fn share_icl_inputs(&mut self) -> Result<PhaseWork, Error> {
        self.guard(ProofPhase::ShareIclInputs, self.is_first_col())?;
        let mut work = PhaseWork::default();
        let to = CellId::new(self.cell.row, self.server().last_col());

        for race_id in self.race_ids() {
            let cast = &self.store.race(&race_id)?.cast;
            if cast.len() != self.election.n_voters {
                return Err(self.store.missing("cast votes", &race_id));
            }
            let u = cast.iter().map(|c| c.opening.u.clone()).collect();
            let v = cast.iter().map(|c| c.opening.v.clone()).collect();
            self.route(&mut work, to, StoreDelta::RowInputs { race_id, u, v })?;
        }
        Ok(work)
    }

    /// Phase 5: `t = output half - input half` along each icl replica's path, keyed by input position
    pub fn compute_t_values(&mut self) -> Result<PhaseWork, Error> {
        self.guard(ProofPhase::ComputeTValues, self.is_last_col())?;
        let cut = self.cut()?;
        let row = self.cell.row;
        let mut t_values = ByRace::new();

        for race in self.election.races.iter() {
            let m = &race.race_modulus;
            let slice = self.store.race(&race.race_id)?;
            let (ux, vx) = slice
                .row_inputs
                .as_ref()
                .ok_or_else(|| self.store.missing("row inputs", &race.race_id))?;

            let mut by_replica = ByReplica::new();
            for k in cut.icl.iter() {
                let outputs = &self.store.replica(&race.race_id, *k)?.outputs;
                if outputs.len() != self.election.n_voters {
                    return Err(self.store.missing("output commitments", &race.race_id));
                }
                let mut by_position = ByPosition::new();
                for (px, p) in self.election.p_list.iter().enumerate() {
                    let py = self.trace_forward(&race.race_id, *k, row, px)?;
                    let out = &outputs[py];
                    let t = TValue {
                        tu: sub_mod(&out.u, &ux[px], m),
                        tv: sub_mod(&out.v, &vx[px], m),
                    };
                    let mut by_row = ByRow::new();
                    by_row.insert(key(row), t);
                    by_position.insert(p.clone(), by_row);
                }
                by_replica.insert(key(*k), by_position);
            }
            t_values.insert(race.race_id.clone(), by_replica);
        }

        Ok(PhaseWork {
            posts: vec![Publication::new(PROOF_T_VALUES, &TValues { t_values }, false)?],
            updates: vec![],
        })
    }

    /// Phase 6: derive, post and distribute the left/right challenge
    pub fn leftright_challenge(&mut self, sbb_hash: &[u8; 32]) -> Result<PhaseWork, Error> {
        let allowed = self.cell == self.server().challenge_cell();
        self.guard(ProofPhase::LeftRightChallenge, allowed)?;
        let race_ids = self.election.sorted_race_ids();
        let leftright = derive_leftright(sbb_hash, &race_ids, &self.election.p_list);
        validate_leftright(&leftright, &race_ids, &self.election.p_list)?;

        let mut work = PhaseWork::default();
        work.posts.push(Publication::new(
            PROOF_LEFTRIGHT,
            &LeftRightPublication {
                sbb_hash: Digest32(*sbb_hash),
                challenges: LeftRightBody {
                    leftright: leftright.clone(),
                },
            },
            false,
        )?);
        self.broadcast_challenges(
            &mut work,
            Challenges {
                cut: None,
                leftright: Some(leftright),
            },
        )?;
        Ok(work)
    }

    /// Phase 7: fully open every output of every opl replica
    pub fn prove_outcome(&mut self) -> Result<PhaseWork, Error> {
        self.guard(ProofPhase::ProveOutcome, self.is_last_col())?;
        let cut = self.cut()?;
        let row = key(self.cell.row);
        let mut opened = ByRace::new();

        for race_id in self.race_ids() {
            let mut by_replica = ByReplica::new();
            for k in cut.opl.iter() {
                self.ledger.record(&race_id, *k, OpeningKind::Full)?;
                let state = self.store.replica(&race_id, *k)?;
                if state.outputs.len() != state.y.len() {
                    return Err(self.store.missing("output commitments", &race_id));
                }
                let by_position: ByPosition<ByRow<FullOpening>> = self
                    .election
                    .p_list
                    .iter()
                    .zip(state.y.iter().zip(state.outputs.iter()))
                    .map(|(p, (y, o))| {
                        let mut by_row = ByRow::new();
                        by_row.insert(
                            row.clone(),
                            FullOpening {
                                y: y.clone(),
                                u: o.u.clone(),
                                v: o.v.clone(),
                                ru: o.ru,
                                rv: o.rv,
                            },
                        );
                        (p.clone(), by_row)
                    })
                    .collect();
                by_replica.insert(key(*k), by_position);
            }
            opened.insert(race_id, by_replica);
        }

        Ok(PhaseWork {
            posts: vec![Publication::new(
                PROOF_OUTCOME,
                &OutcomeCheck {
                    opened_output_commitments: opened,
                },
                false,
            )?],
            updates: vec![],
        })
    }

    /// Phase 8: open the challenged half of each cast vote share in this row
    pub fn input_openings(&mut self) -> Result<PhaseWork, Error> {
        self.guard(ProofPhase::InputOpenings, self.is_first_col())?;
        self.cut()?;
        let leftright = self.leftright()?;
        let row = key(self.cell.row);
        let mut opened = ByRace::new();

        for race_id in self.race_ids() {
            let cast = &self.store.race(&race_id)?.cast;
            if cast.len() != self.election.n_voters {
                return Err(self.store.missing("cast votes", &race_id));
            }
            let sides = &leftright[&race_id];
            let by_position: ByPosition<ByRow<HalfOpening>> = self
                .election
                .p_list
                .iter()
                .zip(cast.iter())
                .map(|(p, c)| {
                    let mut by_row = ByRow::new();
                    by_row.insert(row.clone(), c.opening.half(sides[p]));
                    (p.clone(), by_row)
                })
                .collect();
            opened.insert(race_id, by_position);
        }

        Ok(PhaseWork {
            posts: vec![Publication::new(
                PROOF_INPUT_OPENINGS,
                &InputOpenings {
                    opened_commitments: opened,
                },
                false,
            )?],
            updates: vec![],
        })
    }

    /// Phase 9: for each icl output, open the half its traced input position was challenged on
    pub fn output_openings(&mut self) -> Result<PhaseWork, Error> {
        self.guard(ProofPhase::OutputOpenings, self.is_last_col())?;
        let cut = self.cut()?;
        let leftright = self.leftright()?;
        let row = self.cell.row;
        let mut opened = ByRace::new();

        for race_id in self.race_ids() {
            let sides = &leftright[&race_id];
            let mut by_replica = ByReplica::new();
            for k in cut.icl.iter() {
                self.ledger.record(&race_id, *k, OpeningKind::Half)?;
                let outputs = &self.store.replica(&race_id, *k)?.outputs;
                if outputs.len() != self.election.n_voters {
                    return Err(self.store.missing("output commitments", &race_id));
                }
                let mut by_position = ByPosition::new();
                for (py, p) in self.election.p_list.iter().enumerate() {
                    let px = self.trace_back(&race_id, *k, row, py)?;
                    let side = sides[&self.election.p_list[px]];
                    let mut by_row = ByRow::new();
                    by_row.insert(key(row), outputs[py].half(side));
                    by_position.insert(p.clone(), by_row);
                }
                by_replica.insert(key(*k), by_position);
            }
            opened.insert(race_id, by_replica);
        }

        Ok(PhaseWork {
            posts: vec![Publication::new(
                PROOF_OUTPUT_OPENINGS,
                &OutputOpenings {
                    opened_commitments: opened,
                },
                false,
            )?],
            updates: vec![],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_numbers_and_applicability() {
        assert_eq!(ProofPhase::from_number(0), Some(ProofPhase::OutputCommitments));
        assert_eq!(ProofPhase::from_number(9), Some(ProofPhase::OutputOpenings));
        assert_eq!(ProofPhase::from_number(10), None);
        assert_eq!(ProofPhase::from_number(1 << 20), None);

        let server = ServerArray::new(1, 1).unwrap(); // 4 x 2
        let applicable = |phase: ProofPhase| {
            server
                .cells()
                .into_iter()
                .filter(|c| phase.applies_to(*c, &server))
                .count()
        };
        assert_eq!(applicable(ProofPhase::OutputCommitments), 4);
        assert_eq!(applicable(ProofPhase::CutChallenge), 1);
        assert_eq!(applicable(ProofPhase::ShareIclPermutations), 8);
        assert_eq!(applicable(ProofPhase::ComputePik), 1);
        assert_eq!(applicable(ProofPhase::InputOpenings), 4);
        assert!(ProofPhase::LeftRightChallenge.applies_to(CellId::new('d', 1), &server));
        assert!(ProofPhase::ComputePik.applies_to(CellId::new('a', 0), &server));
    }

    #[test]
    fn ledger_refuses_mixed_openings() {
        let mut ledger = OpeningLedger::default();
        ledger.record("taxes", 'A', OpeningKind::Full).unwrap();
        ledger.record("taxes", 'A', OpeningKind::Full).unwrap();
        ledger.record("taxes", 'B', OpeningKind::Half).unwrap();
        ledger.record("mayor", 'A', OpeningKind::Half).unwrap();
        match ledger.record("taxes", 'A', OpeningKind::Half) {
            Err(Error::SecrecyViolation { race_id, replica }) => {
                assert_eq!(race_id, "taxes");
                assert_eq!(replica, 'A');
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(ledger.get("taxes", 'A'), Some(OpeningKind::Full));
    }

    #[test]
    fn cut_challenge_is_deterministic_and_refuses_other_cells() {
        let election = Election::new(ElectionParameters {
            n_voters: 4,
            n_reps: 4,
            n_fail: 0,
            n_leak: 1,
            seed: Some("33".repeat(32)),
            ..Default::default()
        })
        .unwrap();
        let challenge_index = election.server.num_cells() - 1;
        let mut designated = MixServer::new(election.clone(), challenge_index).unwrap();
        let mut other = MixServer::new(election.clone(), 0).unwrap();

        let hash = [5u8; 32];
        let work = designated
            .run_proof_phase(ProofPhase::CutChallenge, Some(hash))
            .unwrap();
        assert_eq!(work.posts.len(), 1);
        assert_eq!(work.posts[0].header, PROOF_CUT);
        // every cell but the designated one receives the challenge as an update
        assert_eq!(work.updates.len(), election.server.num_cells() - 1);
        let cut = designated.cut().unwrap();
        assert_eq!(cut, CutChallenge::derive(&hash, &election.k_list).unwrap());

        match other.run_proof_phase(ProofPhase::CutChallenge, Some(hash)) {
            Err(Error::ProtocolPrecondition { .. }) => {}
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
        match designated.run_proof_phase(ProofPhase::CutChallenge, None) {
            Err(Error::MalformedChallenge(_)) => {}
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn openings_require_a_valid_cut() {
        let election = Election::new(ElectionParameters {
            n_voters: 2,
            n_reps: 2,
            n_fail: 0,
            n_leak: 0,
            seed: Some("44".repeat(32)),
            ..Default::default()
        })
        .unwrap();
        let mut cell = MixServer::new(election, 0).unwrap();
        match cell.prove_outcome() {
            Err(Error::MalformedChallenge(_)) => {}
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
        // a tampered challenge that bypassed the store's merge checks
        cell.store.challenges.cut = Some(CutChallenge {
            icl: vec!['A', 'B'],
            opl: vec![],
        });
        match cell.output_openings() {
            Err(Error::MalformedChallenge(_)) => {}
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
        assert_eq!(cell.ledger.get("taxes", 'A'), None);
    }
}
