//! Public verification of a saved bulletin board.
//!
//! Everything here is recomputed from the board alone: the setup, the cast-vote
//! commitments and receipts, both Fiat-Shamir challenges, the outcome openings against
//! the published tally, and the input-consistency openings and t-values.

use crate::*;
use indexmap::IndexMap;
use log::info;
use num_bigint::BigUint;
use num_traits::Zero;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// What a successful verification established
#[derive(Clone, Debug, PartialEq)]
pub struct VerificationReport {
    pub election_id: String,
    pub n_voters: usize,
    pub n_reps: usize,
    pub tally: IndexMap<String, IndexMap<String, u64>>,
}

fn entry<'a, T, F>(
    map: &'a BTreeMap<String, T>,
    key: &str,
    header: &'static str,
    path: F,
) -> Result<&'a T, VerificationError>
where
    F: FnOnce() -> String,
{
    map.get(key)
        .ok_or_else(|| VerificationError::MissingEntry { header, path: path() })
}

fn in_range<F>(value: &BigUint, modulus: &BigUint, path: F) -> Result<(), VerificationError>
where
    F: FnOnce() -> String,
{
    if value >= modulus {
        return Err(VerificationError::OutOfRange(path()));
    }
    Ok(())
}

/// Public bodies by header; items posted under the same header are deep-merged
struct Bodies(BTreeMap<&'static str, Value>);

impl Bodies {
    fn collect(items: &[BoardItem]) -> Result<Self, VerificationError> {
        let mut bodies: BTreeMap<&'static str, Value> = BTreeMap::new();
        for item in items.iter().filter(|i| i.is_public()) {
            let header = HEADER_LIST
                .iter()
                .find(|h| **h == item.header)
                .ok_or_else(|| VerificationError::UnknownHeader(item.header.clone()))?;
            match bodies.get_mut(header) {
                Some(body) => merge_value(body, item.body.clone()),
                None => {
                    bodies.insert(*header, item.body.clone());
                }
            }
        }
        for header in HEADER_LIST.iter() {
            if !bodies.contains_key(header) {
                return Err(VerificationError::MissingHeader(*header));
            }
        }
        Ok(Bodies(bodies))
    }

    fn get<T: DeserializeOwned>(&self, header: &'static str) -> Result<T, VerificationError> {
        let body = self
            .0
            .get(header)
            .ok_or(VerificationError::MissingHeader(header))?;
        serde_json::from_value(body.clone())
            .map_err(|source| VerificationError::MalformedBody { header, source })
    }
}

/// The election as the board describes it
struct Setup {
    election_id: String,
    races: Vec<Race>,
    n_voters: usize,
    n_reps: usize,
    p_list: Vec<String>,
    k_list: Vec<char>,
    rows: Vec<char>,
    server: ServerArray,
}

impl Setup {
    fn read(bodies: &Bodies) -> Result<Self, VerificationError> {
        let start: SetupStart = bodies.get(SETUP_START)?;
        let voters: SetupVoters = bodies.get(SETUP_VOTERS)?;
        let races: SetupRaces = bodies.get(SETUP_RACES)?;
        let array: SetupServerArray = bodies.get(SETUP_SERVER_ARRAY)?;

        let invalid = |msg: String| VerificationError::InvalidSetup(msg);
        if voters.n_voters == 0 {
            return Err(invalid("no voters".to_owned()));
        }
        if array.rows == 0 || array.rows > 26 || array.cols == 0 {
            return Err(invalid(format!("{}x{} server array", array.rows, array.cols)));
        }
        if array.threshold == 0 || array.threshold > array.rows {
            return Err(invalid(format!(
                "threshold {} with {} rows",
                array.threshold, array.rows
            )));
        }
        if array.n_reps == 0 || array.n_reps % 2 != 0 {
            return Err(invalid(format!("{} replicas", array.n_reps)));
        }
        if races.ballot_style_race_dict.is_empty() {
            return Err(invalid("no races".to_owned()));
        }

        let mut parsed = Vec::with_capacity(races.ballot_style_race_dict.len());
        for (race_id, info) in races.ballot_style_race_dict.into_iter() {
            let race = Race::new(&race_id, info.choices)?;
            if race.race_modulus != info.race_modulus {
                return Err(invalid(format!("race {} has the wrong modulus", race_id)));
            }
            parsed.push(race);
        }

        let server = ServerArray {
            rows: array.rows,
            cols: array.cols,
            threshold: array.threshold,
        };
        Ok(Setup {
            election_id: start.election_id,
            races: parsed,
            n_voters: voters.n_voters,
            n_reps: array.n_reps,
            p_list: p_list(voters.n_voters),
            k_list: k_list(array.n_reps)?,
            rows: server.row_list(),
            server,
        })
    }

    fn sorted_race_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.races.iter().map(|r| r.race_id.as_str()).collect();
        ids.sort_unstable();
        ids
    }
}

fn check_monotonic_time(items: &[BoardItem]) -> Result<(), VerificationError> {
    let mut last: Option<&str> = None;
    for (i, item) in items.iter().enumerate() {
        if let Some(time) = item.time() {
            if let Some(prev) = last {
                if time < prev {
                    return Err(VerificationError::NonMonotonicTime(i));
                }
            }
            last = Some(time);
        }
    }
    Ok(())
}

fn check_election_ids(items: &[BoardItem], election_id: &str) -> Result<(), VerificationError> {
    for item in items.iter() {
        if let Some(id) = item.body.get("election_id") {
            if id.as_str() != Some(election_id) {
                return Err(VerificationError::ElectionIdMismatch(id.to_string()));
            }
        }
    }
    Ok(())
}

struct Verifier<'a> {
    items: &'a [BoardItem],
    setup: Setup,
    cast: CastVotes,
    commitments: OutputCommitments,
    cut: CutChallenge,
    leftright: LeftRight,
}

impl<'a> Verifier<'a> {
    fn cast_entry(&self, race_id: &str, p: &str, row: char) -> Result<&CastVoteCommitment, VerificationError> {
        let by_position = entry(&self.cast.cast_vote_dict, race_id, CASTING_VOTES, || race_id.to_owned())?;
        let by_row = entry(by_position, p, CASTING_VOTES, || format!("{}/{}", race_id, p))?;
        entry(by_row, &key(row), CASTING_VOTES, || format!("{}/{}/{}", race_id, p, row))
    }

    fn output_commitment(
        &self,
        race_id: &str,
        k: char,
        p: &str,
        row: char,
    ) -> Result<&CommitmentPair, VerificationError> {
        let header = PROOF_OUTPUT_COMMITMENTS;
        let by_replica = entry(&self.commitments.commitments, race_id, header, || race_id.to_owned())?;
        let by_position = entry(by_replica, &key(k), header, || format!("{}/{}", race_id, k))?;
        let by_row = entry(by_position, p, header, || format!("{}/{}/{}", race_id, k, p))?;
        entry(by_row, &key(row), header, || format!("{}/{}/{}/{}", race_id, k, p, row))
    }

    fn check_cast_votes(&self) -> Result<(), VerificationError> {
        let mut seen = BTreeSet::new();
        for race in self.setup.races.iter() {
            let by_position = entry(&self.cast.cast_vote_dict, &race.race_id, CASTING_VOTES, || {
                race.race_id.clone()
            })?;
            if by_position.len() != self.setup.n_voters {
                return Err(VerificationError::InvalidSetup(format!(
                    "race {} has {} cast votes for {} voters",
                    race.race_id,
                    by_position.len(),
                    self.setup.n_voters
                )));
            }
            for p in self.setup.p_list.iter() {
                let mut ballot_id: Option<&str> = None;
                for row in self.setup.rows.iter() {
                    let cast = self.cast_entry(&race.race_id, p, *row)?;
                    match ballot_id {
                        None => ballot_id = Some(cast.ballot_id.as_str()),
                        Some(id) if id != cast.ballot_id => {
                            return Err(VerificationError::BallotIdMismatch {
                                race_id: race.race_id.clone(),
                                position: p.clone(),
                            })
                        }
                        Some(_) => {}
                    }
                }
                if let Some(id) = ballot_id {
                    if !seen.insert(id.to_owned()) {
                        return Err(VerificationError::DuplicateBallotId(id.to_owned()));
                    }
                }
            }
        }
        Ok(())
    }

    fn check_receipts(&self, receipts: &Receipts) -> Result<(), VerificationError> {
        for race in self.setup.races.iter() {
            for p in self.setup.p_list.iter() {
                let ballot_id = &self.cast_entry(&race.race_id, p, self.setup.server.first_row())?.ballot_id;
                let by_row = &self.cast.cast_vote_dict[&race.race_id][p];
                let receipt = entry(&receipts.receipt_dict, ballot_id, CASTING_RECEIPTS, || {
                    ballot_id.clone()
                })?;
                if receipt.race_id != race.race_id || receipt.hash != receipt_hash(ballot_id, by_row)? {
                    return Err(VerificationError::ReceiptMismatch(ballot_id.clone()));
                }
            }
        }
        let expected = self.setup.n_voters * self.setup.races.len();
        if receipts.receipt_dict.len() != expected {
            return Err(VerificationError::ReceiptMismatch(format!(
                "{} receipts for {} ballots",
                receipts.receipt_dict.len(),
                expected
            )));
        }
        Ok(())
    }

    fn check_output_commitments(&self) -> Result<(), VerificationError> {
        for race in self.setup.races.iter() {
            for k in self.setup.k_list.iter() {
                for p in self.setup.p_list.iter() {
                    for row in self.setup.rows.iter() {
                        self.output_commitment(&race.race_id, *k, p, *row)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Full openings of opl replicas open the output commitments, with `y = u + v`
    fn check_outcome(&self, outcome: &OutcomeCheck) -> Result<(), VerificationError> {
        let header = PROOF_OUTCOME;
        for race in self.setup.races.iter() {
            let m = &race.race_modulus;
            let by_replica = entry(&outcome.opened_output_commitments, &race.race_id, header, || {
                race.race_id.clone()
            })?;
            for k in self.cut.opl.iter() {
                let by_position = entry(by_replica, &key(*k), header, || format!("{}/{}", race.race_id, k))?;
                for p in self.setup.p_list.iter() {
                    let by_row = entry(by_position, p, header, || format!("{}/{}/{}", race.race_id, k, p))?;
                    for row in self.setup.rows.iter() {
                        let path = || format!("{}/{}/{}/{}", race.race_id, k, p, row);
                        let o = entry(by_row, &key(*row), header, path)?;
                        in_range(&o.y, m, path)?;
                        in_range(&o.u, m, path)?;
                        in_range(&o.v, m, path)?;
                        if o.y != add_mod(&o.u, &o.v, m) {
                            return Err(VerificationError::BadSplit(path()));
                        }
                        let c = self.output_commitment(&race.race_id, *k, p, *row)?;
                        if !opens(&c.cu, &o.u, &o.ru) || !opens(&c.cv, &o.v, &o.rv) {
                            return Err(VerificationError::BadOpening { header, path: path() });
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Every opl replica's opened outputs reconstruct to the published tally
    fn check_tally(
        &self,
        outcome: &OutcomeCheck,
        published: &TallyResults,
    ) -> Result<(), VerificationError> {
        for k in self.cut.opl.iter() {
            for race in self.setup.races.iter() {
                let by_position = &outcome.opened_output_commitments[&race.race_id][&key(*k)];
                let mut rows: BTreeMap<char, Vec<BigUint>> = BTreeMap::new();
                for p in self.setup.p_list.iter() {
                    for row in self.setup.rows.iter() {
                        rows.entry(*row)
                            .or_default()
                            .push(by_position[p][&key(*row)].y.clone());
                    }
                }
                let view: BTreeMap<char, &Vec<BigUint>> = rows.iter().map(|(r, y)| (*r, y)).collect();
                let choices = reconstruct_outputs(race, &self.setup.server, &view)?;
                let counted = TallyResult::count(race, &choices);
                match published.tally.get(&race.race_id) {
                    Some(totals) if *totals == counted.totals => {}
                    _ => return Err(VerificationError::TallyMismatch(*k)),
                }
            }
        }
        if published.tally.len() != self.setup.races.len() {
            return Err(VerificationError::InvalidSetup(
                "tally lists races that are not on the ballot".to_owned(),
            ));
        }
        Ok(())
    }

    fn check_pik(&self, pik: &PikDict) -> Result<(), VerificationError> {
        let header = PROOF_PIK;
        let positions: BTreeSet<&String> = self.setup.p_list.iter().collect();
        for race in self.setup.races.iter() {
            let by_replica = entry(&pik.pik_dict, &race.race_id, header, || race.race_id.clone())?;
            for k in self.cut.icl.iter() {
                let map = entry(by_replica, &key(*k), header, || format!("{}/{}", race.race_id, k))?;
                let keys: BTreeSet<&String> = map.keys().collect();
                let values: BTreeSet<&String> = map.values().collect();
                if keys != positions || values != positions {
                    return Err(VerificationError::BadPik {
                        race_id: race.race_id.clone(),
                        replica: *k,
                    });
                }
            }
        }
        Ok(())
    }

    fn check_input_openings(&self, inputs: &InputOpenings) -> Result<(), VerificationError> {
        let header = PROOF_INPUT_OPENINGS;
        for race in self.setup.races.iter() {
            let sides = &self.leftright[&race.race_id];
            let by_position = entry(&inputs.opened_commitments, &race.race_id, header, || {
                race.race_id.clone()
            })?;
            for p in self.setup.p_list.iter() {
                let by_row = entry(by_position, p, header, || format!("{}/{}", race.race_id, p))?;
                for row in self.setup.rows.iter() {
                    let path = || format!("{}/{}/{}", race.race_id, p, row);
                    let half = entry(by_row, &key(*row), header, path)?;
                    in_range(half.value(), &race.race_modulus, path)?;
                    let cast = self.cast_entry(&race.race_id, p, *row)?;
                    if half.side() != sides[p] || !half.opens(&cast.cu, &cast.cv) {
                        return Err(VerificationError::BadOpening { header, path: path() });
                    }
                }
            }
        }
        Ok(())
    }

    fn check_output_openings(&self, outputs: &OutputOpenings) -> Result<(), VerificationError> {
        let header = PROOF_OUTPUT_OPENINGS;
        for race in self.setup.races.iter() {
            let by_replica = entry(&outputs.opened_commitments, &race.race_id, header, || {
                race.race_id.clone()
            })?;
            for k in self.cut.icl.iter() {
                let by_position = entry(by_replica, &key(*k), header, || format!("{}/{}", race.race_id, k))?;
                for p in self.setup.p_list.iter() {
                    let by_row = entry(by_position, p, header, || format!("{}/{}/{}", race.race_id, k, p))?;
                    for row in self.setup.rows.iter() {
                        let path = || format!("{}/{}/{}/{}", race.race_id, k, p, row);
                        let half = entry(by_row, &key(*row), header, path)?;
                        in_range(half.value(), &race.race_modulus, path)?;
                        let c = self.output_commitment(&race.race_id, *k, p, *row)?;
                        if !half.opens(&c.cu, &c.cv) {
                            return Err(VerificationError::BadOpening { header, path: path() });
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// The opened halves satisfy `t = out - in`, and the t-values of each path reconstruct to zero
    fn check_t_values(
        &self,
        t_values: &TValues,
        pik: &PikDict,
        inputs: &InputOpenings,
        outputs: &OutputOpenings,
    ) -> Result<(), VerificationError> {
        let header = PROOF_T_VALUES;
        let server = &self.setup.server;
        for race in self.setup.races.iter() {
            let m = &race.race_modulus;
            let sides = &self.leftright[&race.race_id];
            let by_replica = entry(&t_values.t_values, &race.race_id, header, || race.race_id.clone())?;
            for k in self.cut.icl.iter() {
                let by_position = entry(by_replica, &key(*k), header, || format!("{}/{}", race.race_id, k))?;
                let trace = &pik.pik_dict[&race.race_id][&key(*k)];
                for py in self.setup.p_list.iter() {
                    let px = &trace[py];
                    let side = sides[px];
                    let by_row = entry(by_position, px, header, || format!("{}/{}/{}", race.race_id, k, px))?;
                    let mut tu_shares: Vec<Share> = Vec::with_capacity(self.setup.rows.len());
                    let mut tv_shares: Vec<Share> = Vec::with_capacity(self.setup.rows.len());

                    for (r, row) in self.setup.rows.iter().enumerate() {
                        let path = || format!("{}/{}/{}/{}", race.race_id, k, px, row);
                        let t = entry(by_row, &key(*row), header, path)?;
                        in_range(&t.tu, m, path)?;
                        in_range(&t.tv, m, path)?;

                        let input = &inputs.opened_commitments[&race.race_id][px][&key(*row)];
                        let output = &outputs.opened_commitments[&race.race_id][&key(*k)][py][&key(*row)];
                        if input.side() != side || output.side() != side {
                            return Err(VerificationError::BadTValue(path()));
                        }
                        let expected = sub_mod(output.value(), input.value(), m);
                        let actual = match side {
                            Side::Left => &t.tu,
                            Side::Right => &t.tv,
                        };
                        if *actual != expected {
                            return Err(VerificationError::BadTValue(path()));
                        }
                        tu_shares.push((r + 1, t.tu.clone()));
                        tv_shares.push((r + 1, t.tv.clone()));
                    }

                    let tu = lagrange(&tu_shares, server.rows, server.threshold, m)?;
                    let tv = lagrange(&tv_shares, server.rows, server.threshold, m)?;
                    if !add_mod(&tu, &tv, m).is_zero() {
                        return Err(VerificationError::BadTValue(format!(
                            "{}/{}/{} does not reconstruct to zero",
                            race.race_id, k, px
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Every commitment a challenge is derived from must be on the board before that challenge
fn check_commitment_order(items: &[BoardItem]) -> Result<(), VerificationError> {
    let before_cut: &[&'static str] = &[CASTING_VOTES, CASTING_RECEIPTS, PROOF_OUTPUT_COMMITMENTS];
    let before_leftright: &[&'static str] = &[PROOF_CUT, PROOF_PIK, PROOF_T_VALUES];
    for (challenge, committed) in [(PROOF_CUT, before_cut), (PROOF_LEFTRIGHT, before_leftright)].iter() {
        let at = items
            .iter()
            .position(|i| i.header == *challenge)
            .ok_or(VerificationError::MissingHeader(*challenge))?;
        for (position, item) in items.iter().enumerate().skip(at) {
            if let Some(header) = committed.iter().find(|h| **h == item.header) {
                return Err(VerificationError::CommittedAfterChallenge {
                    header: *header,
                    challenge: *challenge,
                    position,
                });
            }
        }
    }
    Ok(())
}

impl<'a> Verifier<'a> {
    /// Read the setup and check that both challenges were derived honestly.
    /// Nothing else on the board is meaningful until this passes.
    fn new(items: &'a [BoardItem], bodies: &Bodies) -> Result<Self, VerificationError> {
        let setup = Setup::read(bodies)?;
        check_election_ids(items, &setup.election_id)?;
        info!(
            "setup: {} races, {} voters, {} replicas, {}x{} server array",
            setup.races.len(),
            setup.n_voters,
            setup.n_reps,
            setup.server.rows,
            setup.server.cols
        );
        check_commitment_order(items)?;

        let cut_pub: CutPublication = bodies.get(PROOF_CUT)?;
        let cut_hash = hash_prefix(items, PROOF_CUT)?;
        if cut_pub.sbb_hash.0 != cut_hash {
            return Err(VerificationError::ChallengeHashMismatch(PROOF_CUT));
        }
        let cut = cut_pub.challenges.cut;
        cut.validate(&setup.k_list)?;
        if CutChallenge::derive(&cut_hash, &setup.k_list)? != cut {
            return Err(VerificationError::ChallengeMismatch(PROOF_CUT));
        }
        info!("cut-and-choose challenge: icl {:?}, opl {:?}", cut.icl, cut.opl);

        let lr_pub: LeftRightPublication = bodies.get(PROOF_LEFTRIGHT)?;
        let lr_hash = hash_prefix(items, PROOF_LEFTRIGHT)?;
        if lr_pub.sbb_hash.0 != lr_hash {
            return Err(VerificationError::ChallengeHashMismatch(PROOF_LEFTRIGHT));
        }
        let leftright = lr_pub.challenges.leftright;
        let race_ids = setup.sorted_race_ids();
        validate_leftright(&leftright, &race_ids, &setup.p_list)?;
        if derive_leftright(&lr_hash, &race_ids, &setup.p_list) != leftright {
            return Err(VerificationError::ChallengeMismatch(PROOF_LEFTRIGHT));
        }
        info!("left/right challenge verified");

        Ok(Verifier {
            items,
            cast: bodies.get(CASTING_VOTES)?,
            commitments: bodies.get(PROOF_OUTPUT_COMMITMENTS)?,
            setup,
            cut,
            leftright,
        })
    }
}

/// Verify a complete election board
pub fn verify(items: &[BoardItem]) -> Result<VerificationReport, VerificationError> {
    let bodies = Bodies::collect(items)?;
    check_monotonic_time(items)?;
    let verifier = Verifier::new(items, &bodies)?;

    verifier.check_cast_votes()?;
    verifier.check_receipts(&bodies.get(CASTING_RECEIPTS)?)?;
    info!("cast votes and receipts verified");

    verifier.check_output_commitments()?;
    let outcome: OutcomeCheck = bodies.get(PROOF_OUTCOME)?;
    verifier.check_outcome(&outcome)?;
    let published: TallyResults = bodies.get(TALLY_RESULTS)?;
    verifier.check_tally(&outcome, &published)?;
    info!("outcome openings reproduce the published tally");

    let pik: PikDict = bodies.get(PROOF_PIK)?;
    verifier.check_pik(&pik)?;
    let inputs: InputOpenings = bodies.get(PROOF_INPUT_OPENINGS)?;
    verifier.check_input_openings(&inputs)?;
    let outputs: OutputOpenings = bodies.get(PROOF_OUTPUT_OPENINGS)?;
    verifier.check_output_openings(&outputs)?;
    let t_values: TValues = bodies.get(PROOF_T_VALUES)?;
    verifier.check_t_values(&t_values, &pik, &inputs, &outputs)?;
    info!("input consistency verified");

    info!("{} board items verified", verifier.items.len());
    Ok(VerificationReport {
        election_id: verifier.setup.election_id.clone(),
        n_voters: verifier.setup.n_voters,
        n_reps: verifier.setup.n_reps,
        tally: published.tally,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn board() -> Vec<BoardItem> {
        let params = ElectionParameters {
            election_id: "verifier_test".to_owned(),
            n_voters: 4,
            n_reps: 2,
            n_fail: 0,
            n_leak: 1,
            seed: Some("3c".repeat(32)),
            ..Default::default()
        };
        simulate(params, CoordinatorConfig::default()).unwrap().board
    }

    #[test]
    fn commitments_must_precede_their_challenge() {
        let item = |header: &str| BoardItem {
            header: header.to_owned(),
            body: json!({}),
        };
        let honest = vec![
            item(CASTING_VOTES),
            item(PROOF_OUTPUT_COMMITMENTS),
            item(PROOF_CUT),
            item(PROOF_PIK),
            item(PROOF_T_VALUES),
            item(PROOF_LEFTRIGHT),
        ];
        assert!(check_commitment_order(&honest).is_ok());

        let mut late_t_values = honest.clone();
        late_t_values.swap(4, 5);
        match check_commitment_order(&late_t_values) {
            Err(VerificationError::CommittedAfterChallenge {
                header: PROOF_T_VALUES,
                challenge: PROOF_LEFTRIGHT,
                position: 5,
            }) => {}
            other => panic!("unexpected {:?}", other),
        }

        let mut late_commitments = honest;
        late_commitments.swap(1, 2);
        match check_commitment_order(&late_commitments) {
            Err(VerificationError::CommittedAfterChallenge {
                header: PROOF_OUTPUT_COMMITMENTS,
                challenge: PROOF_CUT,
                ..
            }) => {}
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn pik_must_be_a_permutation() {
        let items = board();
        let bodies = Bodies::collect(&items).unwrap();
        let verifier = Verifier::new(&items, &bodies).unwrap();
        let mut pik: PikDict = bodies.get(PROOF_PIK).unwrap();
        verifier.check_pik(&pik).unwrap();

        let k = key(verifier.cut.icl[0]);
        let trace = pik.pik_dict.get_mut("taxes").unwrap().get_mut(&k).unwrap();
        let second = trace["p1"].clone();
        trace.insert("p0".to_owned(), second);
        match verifier.check_pik(&pik) {
            Err(VerificationError::BadPik { race_id, replica }) => {
                assert_eq!(race_id, "taxes");
                assert_eq!(replica, verifier.cut.icl[0]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn t_values_must_match_the_openings() {
        let items = board();
        let bodies = Bodies::collect(&items).unwrap();
        let verifier = Verifier::new(&items, &bodies).unwrap();
        let pik: PikDict = bodies.get(PROOF_PIK).unwrap();
        let inputs: InputOpenings = bodies.get(PROOF_INPUT_OPENINGS).unwrap();
        let outputs: OutputOpenings = bodies.get(PROOF_OUTPUT_OPENINGS).unwrap();
        let mut t_values: TValues = bodies.get(PROOF_T_VALUES).unwrap();
        verifier
            .check_t_values(&t_values, &pik, &inputs, &outputs)
            .unwrap();

        let m = verifier.setup.races[0].race_modulus.clone();
        let k = key(verifier.cut.icl[0]);
        let t = t_values
            .t_values
            .get_mut("taxes")
            .unwrap()
            .get_mut(&k)
            .unwrap()
            .get_mut("p0")
            .unwrap()
            .get_mut("a")
            .unwrap();
        t.tu = add_mod(&t.tu, &BigUint::from(1u32), &m);
        t.tv = add_mod(&t.tv, &BigUint::from(1u32), &m);
        match verifier.check_t_values(&t_values, &pik, &inputs, &outputs) {
            Err(VerificationError::BadTValue(path)) => assert!(path.starts_with("taxes/")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn missing_and_unknown_headers() {
        let board = BulletinBoard::open("e").unwrap();
        match verify(board.items()) {
            Err(VerificationError::MissingHeader(_)) => {}
            other => panic!("unexpected {:?}", other),
        }

        let mut board = BulletinBoard::open("e").unwrap();
        board.post("proof:made_up", json!({}), false).unwrap();
        match verify(board.items()) {
            Err(VerificationError::UnknownHeader(h)) => assert_eq!(h, "proof:made_up"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn time_must_not_go_backwards() {
        let items = vec![
            BoardItem {
                header: SBB_OPEN.to_owned(),
                body: json!({"time": "2020-01-02T00:00:00+0000"}),
            },
            BoardItem {
                header: SETUP_START.to_owned(),
                body: json!({"time": "2020-01-01T00:00:00+0000"}),
            },
        ];
        match check_monotonic_time(&items) {
            Err(VerificationError::NonMonotonicTime(1)) => {}
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn election_ids_agree() {
        let items = vec![
            BoardItem {
                header: SBB_OPEN.to_owned(),
                body: json!({"election_id": "e1"}),
            },
            BoardItem {
                header: ELECTION_DONE.to_owned(),
                body: json!({"election_id": "e2"}),
            },
        ];
        assert!(check_election_ids(&items[..1], "e1").is_ok());
        match check_election_ids(&items, "e1") {
            Err(VerificationError::ElectionIdMismatch(_)) => {}
            other => panic!("unexpected {:?}", other),
        }
    }
}
