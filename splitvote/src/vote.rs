use crate::*;
use indexmap::IndexMap;
use log::{debug, info};
use std::collections::{BTreeMap, BTreeSet};

const MAX_BALLOT_ID_DRAWS: usize = 1000;

/// One voter's ballot for one race, as shared over the rows of the first column
#[derive(Clone, Debug)]
pub struct Ballot {
    pub race_id: String,
    pub ballot_id: String,
    pub choice: String,
    /// one share per row, in row order
    pub shares: Vec<CastVoteShare>,
}

impl Ballot {
    /// Commitments per row, as they appear on the board
    pub fn commitments(&self, server: &ServerArray) -> ByRow<CastVoteCommitment> {
        server
            .row_list()
            .into_iter()
            .zip(self.shares.iter())
            .map(|(row, s)| {
                (
                    key(row),
                    CastVoteCommitment {
                        ballot_id: self.ballot_id.clone(),
                        cu: s.opening.cu,
                        cv: s.opening.cv,
                    },
                )
            })
            .collect()
    }
}

/// Receipt hash over the ballot id and the per-row commitments
pub fn receipt_hash(ballot_id: &str, commitments: &ByRow<CastVoteCommitment>) -> Result<Digest32, Error> {
    let pairs: ByRow<CommitmentPair> = commitments
        .iter()
        .map(|(row, c)| (row.clone(), CommitmentPair { cu: c.cu, cv: c.cv }))
        .collect();
    let bytes = serde_json::to_vec(&(ballot_id, pairs))?;
    Ok(Digest32(secure_hash(&bytes, "")))
}

/// A simulated voter at one position
pub struct Voter {
    pub position: String,
    rng: RandomSource,
}

impl Voter {
    pub fn new(election: &Election, position: &str) -> Self {
        Voter {
            position: position.to_owned(),
            rng: RandomSource::derive(&election.seed, &format!("voter:{}", position)),
        }
    }

    /// Pick a choice for every race and share it over the rows
    pub fn vote(&mut self, election: &Election, used_ids: &mut BTreeSet<String>) -> Result<Vec<Ballot>, Error> {
        let server = election.server;
        let mut ballots = Vec::with_capacity(election.races.len());
        for race in election.races.iter() {
            let choice = race.random_choice(&mut self.rng);
            let x = race.choice_str2int(&choice)?;

            let rng = &mut self.rng;
            let ballot_id = (0..MAX_BALLOT_ID_DRAWS)
                .map(|_| {
                    let mut id = hex::encode(rng.bytes32());
                    id.truncate(election.ballot_id_len);
                    id
                })
                .find(|id| used_ids.insert(id.clone()))
                .ok_or_else(|| {
                    Error::Configuration(format!(
                        "no unused ballot id of {} hex digits after {} draws",
                        election.ballot_id_len, MAX_BALLOT_ID_DRAWS
                    ))
                })?;

            let row_shares = share(
                &x,
                server.rows,
                server.threshold,
                &mut self.rng,
                &race.race_modulus,
            )?;
            let shares = row_shares
                .into_iter()
                .map(|(_, x)| CastVoteShare {
                    ballot_id: ballot_id.clone(),
                    opening: SplitOpening::new(&x, &mut self.rng, &race.race_modulus),
                    x,
                })
                .collect();

            ballots.push(Ballot {
                race_id: race.race_id.clone(),
                ballot_id,
                choice,
                shares,
            });
        }
        Ok(ballots)
    }
}

/// The voter role: every simulated voter and the ballots they cast
pub struct Electorate {
    election: Election,
    /// by race, then by position
    ballots: BTreeMap<String, Vec<Ballot>>,
}

impl Electorate {
    pub fn new(election: Election) -> Self {
        Electorate {
            election,
            ballots: BTreeMap::new(),
        }
    }

    pub fn election(&self) -> &Election {
        &self.election
    }

    pub fn has_voted(&self) -> bool {
        !self.ballots.is_empty()
    }

    /// Every voter votes once, and the cast votes and receipts are returned for posting
    pub fn cast_votes(&mut self) -> Result<Vec<Publication>, Error> {
        if self.has_voted() {
            return Err(Error::MalformedUpdate("votes were already cast".to_owned()));
        }
        let election = &self.election;
        let mut used_ids = BTreeSet::new();
        let mut ballots: BTreeMap<String, Vec<Ballot>> = BTreeMap::new();

        for p in election.p_list.iter() {
            let mut voter = Voter::new(election, p);
            for ballot in voter.vote(election, &mut used_ids)? {
                debug!("voter {} cast ballot {} in {}", p, ballot.ballot_id, ballot.race_id);
                ballots.entry(ballot.race_id.clone()).or_default().push(ballot);
            }
        }

        let mut cast_vote_dict = ByRace::new();
        let mut receipt_dict = BTreeMap::new();
        for (race_id, race_ballots) in ballots.iter() {
            let mut by_position = ByPosition::new();
            for (p, ballot) in election.p_list.iter().zip(race_ballots.iter()) {
                let commitments = ballot.commitments(&election.server);
                let hash = receipt_hash(&ballot.ballot_id, &commitments)?;
                receipt_dict.insert(
                    ballot.ballot_id.clone(),
                    Receipt {
                        race_id: race_id.clone(),
                        hash,
                    },
                );
                by_position.insert(p.clone(), commitments);
            }
            cast_vote_dict.insert(race_id.clone(), by_position);
        }
        info!(
            "{} voters cast {} ballots",
            election.n_voters,
            receipt_dict.len()
        );

        self.ballots = ballots;
        Ok(vec![
            Publication::new(CASTING_VOTES, &CastVotes { cast_vote_dict }, false)?,
            Publication::new(CASTING_RECEIPTS, &Receipts { receipt_dict }, false)?,
        ])
    }

    /// One `CastVotes` delta per race for each first-column cell
    pub fn distribution(&self) -> Result<Vec<(CellId, StoreDelta)>, Error> {
        if !self.has_voted() {
            return Err(Error::MalformedUpdate("no votes have been cast".to_owned()));
        }
        let mut deltas = vec![];
        for (r, row) in self.election.server.row_list().into_iter().enumerate() {
            for (race_id, race_ballots) in self.ballots.iter() {
                let votes = race_ballots.iter().map(|b| b.shares[r].clone()).collect();
                deltas.push((
                    CellId::new(row, 0),
                    StoreDelta::CastVotes {
                        race_id: race_id.clone(),
                        votes,
                    },
                ));
            }
        }
        Ok(deltas)
    }

    /// Plaintext counts, for checking a tally in a simulation
    pub fn plaintext_tally(&self) -> Vec<TallyResult> {
        self.election
            .races
            .iter()
            .map(|race| {
                let choices: Vec<String> = self
                    .ballots
                    .get(&race.race_id)
                    .map(|b| b.iter().map(|b| b.choice.clone()).collect())
                    .unwrap_or_default();
                TallyResult::count(race, &choices)
            })
            .collect()
    }

    /// Plaintext counts keyed by race id
    pub fn plaintext_totals(&self) -> IndexMap<String, IndexMap<String, u64>> {
        self.plaintext_tally()
            .into_iter()
            .map(|r| (r.race_id, r.totals))
            .collect()
    }
}
