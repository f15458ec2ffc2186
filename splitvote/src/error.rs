use crate::*;

use thiserror::Error;

/// Error types
#[derive(Debug, Error)]
pub enum Error {
    #[error("splitvote: invalid configuration: {0}")]
    Configuration(String),

    #[error("splitvote: {phase} invoked on unauthorized cell {cell}")]
    ProtocolPrecondition { phase: String, cell: CellId },

    #[error("splitvote: peer unavailable: {0}")]
    PeerUnavailable(Address),

    #[error("splitvote: malformed challenge: {0}")]
    MalformedChallenge(String),

    #[error("splitvote: missing {what} for race {race_id} at cell {cell}")]
    MissingState {
        what: &'static str,
        race_id: String,
        cell: CellId,
    },

    #[error("splitvote: malformed store update: {0}")]
    MalformedUpdate(String),

    #[error("splitvote: permutation is not a bijection")]
    InvalidPermutation,

    #[error("splitvote: not enough secret shares: need {0}, found {1}")]
    NotEnoughShares(usize, usize),

    #[error("splitvote: secret recovery failed")]
    SecretRecoveryFailed,

    #[error("splitvote: replica {replica} of race {race_id} would be opened both fully and by halves")]
    SecrecyViolation { race_id: String, replica: char },

    #[error("splitvote: replicas disagree on the outcome of race {0}")]
    InconsistentReplicas(String),

    #[error("splitvote: value does not decode to a valid choice for race {0}")]
    InvalidChoice(String),

    #[error("splitvote: bulletin board is closed")]
    BoardClosed,

    #[error("splitvote: role already assigned to {0}")]
    RoleAlreadyAssigned(Address),

    #[error("splitvote: unexpected request for role {0}")]
    UnexpectedRequest(RoleKind),

    #[error("splitvote: unexpected response")]
    UnexpectedResponse,

    #[error("splitvote: {stage} phase {phase} did not complete after {polls} polls")]
    BarrierStalled {
        stage: Stage,
        phase: u32,
        polls: usize,
    },

    #[error("splitvote: {stage} phase {phase} failed at {address}: {source}")]
    PhaseFailed {
        stage: Stage,
        phase: u32,
        address: Address,
        source: Box<Error>,
    },

    #[error("splitvote: invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("splitvote: JSON error: {0}")]
    JSON(#[from] serde_json::Error),

    #[error("splitvote: IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Transport failures that the barrier may retry
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::PeerUnavailable(_))
    }
}

/// Bulletin-board verification errors
#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("splitvote verify: missing header {0}")]
    MissingHeader(&'static str),

    #[error("splitvote verify: unknown header {0}")]
    UnknownHeader(String),

    #[error("splitvote verify: malformed body for {header}: {source}")]
    MalformedBody {
        header: &'static str,
        source: serde_json::Error,
    },

    #[error("splitvote verify: timestamps are not monotonic at item {0}")]
    NonMonotonicTime(usize),

    #[error("splitvote verify: inconsistent election id {0}")]
    ElectionIdMismatch(String),

    #[error("splitvote verify: invalid setup: {0}")]
    InvalidSetup(String),

    #[error("splitvote verify: {header} is missing an entry for {path}")]
    MissingEntry { header: &'static str, path: String },

    #[error("splitvote verify: ballot id {0} is not unique")]
    DuplicateBallotId(String),

    #[error("splitvote verify: ballot id mismatch across rows for race {race_id} position {position}")]
    BallotIdMismatch { race_id: String, position: String },

    #[error("splitvote verify: receipt for ballot {0} does not match cast commitments")]
    ReceiptMismatch(String),

    #[error("splitvote verify: {0} sbb_hash does not match the board prefix")]
    ChallengeHashMismatch(&'static str),

    #[error("splitvote verify: {header} at item {position} was posted after the {challenge} it feeds")]
    CommittedAfterChallenge {
        header: &'static str,
        challenge: &'static str,
        position: usize,
    },

    #[error("splitvote verify: {0} challenge does not match its sbb_hash")]
    ChallengeMismatch(&'static str),

    #[error("splitvote verify: {header} opening does not match commitment at {path}")]
    BadOpening { header: &'static str, path: String },

    #[error("splitvote verify: opened output y != u + v at {0}")]
    BadSplit(String),

    #[error("splitvote verify: replica {0} does not reproduce the published tally")]
    TallyMismatch(char),

    #[error("splitvote verify: pik for race {race_id} replica {replica} is not a permutation")]
    BadPik { race_id: String, replica: char },

    #[error("splitvote verify: t-value inconsistent at {0}")]
    BadTValue(String),

    #[error("splitvote verify: value out of range at {0}")]
    OutOfRange(String),

    #[error("splitvote verify: {0}")]
    Protocol(#[from] Error),
}
