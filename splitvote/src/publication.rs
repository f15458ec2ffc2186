//! Bulletin-board headers and the bodies posted under them.
//!
//! Nested maps are keyed by race id, replica letter, voter position and row letter, in that
//! order, matching what the verifier expects to find on a saved board.

use crate::*;
use indexmap::IndexMap;
use num_bigint::BigUint;
use serde::Serialize;
use std::collections::BTreeMap;

pub const SBB_OPEN: &str = "sbb:open";
pub const SETUP_START: &str = "setup:start";
pub const SETUP_RACES: &str = "setup:races";
pub const SETUP_VOTERS: &str = "setup:voters";
pub const SETUP_SERVER_ARRAY: &str = "setup:server-array";
pub const SETUP_FINISHED: &str = "setup:finished";
pub const CASTING_VOTES: &str = "casting:votes";
pub const CASTING_RECEIPTS: &str = "casting:receipts";
pub const TALLY_RESULTS: &str = "tally:results";
pub const PROOF_OUTPUT_COMMITMENTS: &str = "proof:output_commitments";
pub const PROOF_T_VALUES: &str = "proof:output_commitment_t_values";
pub const PROOF_LEFTRIGHT: &str = "proof:leftright_verifier_challenges";
pub const PROOF_CUT: &str = "proof:cutandchoose_verifier_challenges";
pub const PROOF_OUTCOME: &str = "proof:outcome_check";
pub const PROOF_INPUT_OPENINGS: &str = "proof:input_consistency:input_openings";
pub const PROOF_OUTPUT_OPENINGS: &str = "proof:input_consistency:output_openings";
pub const PROOF_PIK: &str = "proof:input_consistency:pik_for_k_in_icl";
pub const ELECTION_DONE: &str = "election:done.";
pub const SBB_CLOSE: &str = "sbb:close";

/// Every header a complete election board carries
pub const HEADER_LIST: [&str; 19] = [
    SBB_OPEN,
    SETUP_START,
    SETUP_RACES,
    SETUP_VOTERS,
    SETUP_SERVER_ARRAY,
    SETUP_FINISHED,
    CASTING_VOTES,
    CASTING_RECEIPTS,
    TALLY_RESULTS,
    PROOF_OUTPUT_COMMITMENTS,
    PROOF_T_VALUES,
    PROOF_LEFTRIGHT,
    PROOF_CUT,
    PROOF_OUTCOME,
    PROOF_INPUT_OPENINGS,
    PROOF_OUTPUT_OPENINGS,
    PROOF_PIK,
    ELECTION_DONE,
    SBB_CLOSE,
];

pub type ByRow<T> = BTreeMap<String, T>;
pub type ByPosition<T> = BTreeMap<String, T>;
pub type ByReplica<T> = BTreeMap<String, T>;
pub type ByRace<T> = BTreeMap<String, T>;

/// Map key for a row or replica letter
pub fn key(c: char) -> String {
    c.to_string()
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ElectionStamp {
    pub election_id: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SetupStart {
    pub election_id: String,
    pub about: String,
    pub legend: Vec<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RaceInfo {
    pub choices: Vec<String>,
    #[serde(with = "biguint_str")]
    pub race_modulus: BigUint,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SetupRaces {
    pub ballot_style_race_dict: IndexMap<String, RaceInfo>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SetupVoters {
    pub n_voters: usize,
    pub ballot_id_len: usize,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SetupServerArray {
    pub rows: usize,
    pub cols: usize,
    pub n_reps: usize,
    pub threshold: usize,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CastVoteCommitment {
    pub ballot_id: String,
    pub cu: Commitment,
    pub cv: Commitment,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CastVotes {
    pub cast_vote_dict: ByRace<ByPosition<ByRow<CastVoteCommitment>>>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Receipt {
    pub race_id: String,
    pub hash: Digest32,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Receipts {
    pub receipt_dict: BTreeMap<String, Receipt>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TallyResults {
    pub election_id: String,
    pub tally: IndexMap<String, IndexMap<String, u64>>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CommitmentPair {
    pub cu: Commitment,
    pub cv: Commitment,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OutputCommitments {
    pub commitments: ByRace<ByReplica<ByPosition<ByRow<CommitmentPair>>>>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TValue {
    #[serde(with = "biguint_str")]
    pub tu: BigUint,
    #[serde(with = "biguint_str")]
    pub tv: BigUint,
}

/// Keyed by the traced input position
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TValues {
    pub t_values: ByRace<ByReplica<ByPosition<ByRow<TValue>>>>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CutChallengeBody {
    pub cut: CutChallenge,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CutPublication {
    pub sbb_hash: Digest32,
    pub challenges: CutChallengeBody,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct LeftRightBody {
    pub leftright: LeftRight,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct LeftRightPublication {
    pub sbb_hash: Digest32,
    pub challenges: LeftRightBody,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FullOpening {
    #[serde(with = "biguint_str")]
    pub y: BigUint,
    #[serde(with = "biguint_str")]
    pub u: BigUint,
    #[serde(with = "biguint_str")]
    pub v: BigUint,
    pub ru: Randomizer,
    pub rv: Randomizer,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OutcomeCheck {
    pub opened_output_commitments: ByRace<ByReplica<ByPosition<ByRow<FullOpening>>>>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct InputOpenings {
    pub opened_commitments: ByRace<ByPosition<ByRow<HalfOpening>>>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OutputOpenings {
    pub opened_commitments: ByRace<ByReplica<ByPosition<ByRow<HalfOpening>>>>,
}

/// For each icl replica, output position -> input position
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PikDict {
    pub pik_dict: ByRace<ByReplica<ByPosition<String>>>,
}

/// A header and its typed body, ready to post
#[derive(Clone, Debug)]
pub struct Publication {
    pub header: &'static str,
    pub body: serde_json::Value,
    pub timestamped: bool,
}

impl Publication {
    pub fn new<T: Serialize>(header: &'static str, body: &T, timestamped: bool) -> Result<Self, Error> {
        Ok(Publication {
            header,
            body: serde_json::to_value(body)?,
            timestamped,
        })
    }
}
