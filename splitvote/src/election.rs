use crate::*;
use std::collections::BTreeSet;

pub const DEFAULT_BALLOT_ID_LEN: usize = 32;
pub const MAX_BALLOT_ID_LEN: usize = 64;

/// Election parameters, as read from a parameters file
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ElectionParameters {
    pub election_id: String,

    /// `[race_id, [choices...]]` in ballot order
    pub ballot_style: Vec<(String, Vec<String>)>,

    pub n_voters: usize,

    /// Number of replicas (2m); split evenly into icl and opl by the cut-and-choose challenge
    pub n_reps: usize,

    /// How many mix servers may fail
    pub n_fail: usize,

    /// How many mix servers may leak
    pub n_leak: usize,

    /// Length of ballot ids in hex digits
    #[serde(default = "default_ballot_id_len")]
    pub ballot_id_len: usize,

    /// Hex-encoded 32-byte master seed. When absent a fresh seed is drawn.
    #[serde(default)]
    pub seed: Option<String>,
}

fn default_ballot_id_len() -> usize {
    DEFAULT_BALLOT_ID_LEN
}

impl Default for ElectionParameters {
    fn default() -> Self {
        ElectionParameters {
            election_id: "default_election".to_owned(),
            ballot_style: vec![
                ("taxes".to_owned(), vec!["yes".to_owned(), "no".to_owned()]),
                (
                    "mayor".to_owned(),
                    vec![
                        "tom".to_owned(),
                        "rufus".to_owned(),
                        // 16-char write-ins
                        "*".repeat(16),
                    ],
                ),
            ],
            n_voters: 1000,
            n_reps: 24,
            n_fail: 0,
            n_leak: 2,
            ballot_id_len: DEFAULT_BALLOT_ID_LEN,
            seed: None,
        }
    }
}

/// A validated election: races, dimensions and the position / replica namespaces
#[derive(Clone, Debug)]
pub struct Election {
    pub election_id: String,
    pub races: Vec<Race>,
    pub n_voters: usize,
    pub n_reps: usize,
    pub n_fail: usize,
    pub n_leak: usize,
    pub ballot_id_len: usize,
    pub server: ServerArray,

    /// Voter position labels `p0, p1, ...`, zero padded so they sort in order
    pub p_list: Vec<String>,

    /// Replica labels `A, B, ...`
    pub k_list: Vec<char>,

    /// Master seed every party derives its randomness from
    pub seed: [u8; 32],
}

impl Election {
    pub fn new(params: ElectionParameters) -> Result<Self, Error> {
        if params.election_id.is_empty() {
            return Err(Error::Configuration("election_id must not be empty".to_owned()));
        }
        if params.ballot_style.is_empty() {
            return Err(Error::Configuration("ballot style has no races".to_owned()));
        }
        if params.n_voters == 0 {
            return Err(Error::Configuration("n_voters must be positive".to_owned()));
        }
        if params.n_reps == 0 || params.n_reps % 2 != 0 || params.n_reps > 26 {
            return Err(Error::Configuration(format!(
                "n_reps must be even and between 2 and 26, got {}",
                params.n_reps
            )));
        }
        if params.ballot_id_len == 0 || params.ballot_id_len > MAX_BALLOT_ID_LEN {
            return Err(Error::Configuration(format!(
                "ballot_id_len must be between 1 and {}",
                MAX_BALLOT_ID_LEN
            )));
        }

        let mut race_ids = BTreeSet::new();
        let mut races = Vec::with_capacity(params.ballot_style.len());
        for (race_id, choices) in params.ballot_style {
            if !race_ids.insert(race_id.clone()) {
                return Err(Error::Configuration(format!("duplicate race id {}", race_id)));
            }
            races.push(Race::new(&race_id, choices)?);
        }

        // ballot ids are drawn by rejection, so leave at least twice as many ids as ballots
        let n_ballots = (params.n_voters as u128) * (races.len() as u128);
        let n_ids = 16u128.checked_pow(params.ballot_id_len as u32);
        if matches!(n_ids, Some(n) if n < 2 * n_ballots) {
            return Err(Error::Configuration(format!(
                "ballot_id_len {} is too short for {} ballots",
                params.ballot_id_len, n_ballots
            )));
        }

        let server = ServerArray::new(params.n_fail, params.n_leak)?;

        let seed = match params.seed {
            Some(hex_seed) => {
                let mut seed = [0u8; 32];
                hex::decode_to_slice(&hex_seed, &mut seed).map_err(|e| {
                    Error::Configuration(format!("seed must be 64 hex digits: {}", e))
                })?;
                seed
            }
            None => generate_seed(),
        };

        Ok(Election {
            election_id: params.election_id,
            races,
            n_voters: params.n_voters,
            n_reps: params.n_reps,
            n_fail: params.n_fail,
            n_leak: params.n_leak,
            ballot_id_len: params.ballot_id_len,
            server,
            p_list: p_list(params.n_voters),
            k_list: k_list(params.n_reps)?,
            seed,
        })
    }

    pub fn race(&self, race_id: &str) -> Option<&Race> {
        self.races.iter().find(|r| r.race_id == race_id)
    }

    /// Race ids in sorted order, the order challenges are drawn in
    pub fn sorted_race_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.races.iter().map(|r| r.race_id.as_str()).collect();
        ids.sort_unstable();
        ids
    }
}

/// `p0 .. p{n-1}`, padded to the width of `n` so lexicographic order is numeric order
pub fn p_list(n_voters: usize) -> Vec<String> {
    let width = n_voters.to_string().len();
    (0..n_voters)
        .map(|i| format!("p{:0width$}", i, width = width))
        .collect()
}

/// `A, B, C, ...`
pub fn k_list(n_reps: usize) -> Result<Vec<char>, Error> {
    if n_reps > 26 {
        return Err(Error::Configuration(format!(
            "at most 26 replicas are supported, got {}",
            n_reps
        )));
    }
    Ok((b'A'..b'A' + n_reps as u8).map(char::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_params() -> ElectionParameters {
        ElectionParameters {
            n_voters: 12,
            n_reps: 4,
            n_leak: 1,
            seed: Some("00".repeat(32)),
            ..Default::default()
        }
    }

    #[test]
    fn position_labels_sort_numerically() {
        let ps = p_list(12);
        assert_eq!(ps[0], "p00");
        assert_eq!(ps[11], "p11");
        let mut sorted = ps.clone();
        sorted.sort();
        assert_eq!(sorted, ps);
        assert_eq!(p_list(10)[9], "p09");
    }

    #[test]
    fn replica_labels() {
        assert_eq!(k_list(4).unwrap(), vec!['A', 'B', 'C', 'D']);
        assert!(k_list(27).is_err());
    }

    #[test]
    fn builds_a_valid_election() {
        let election = Election::new(small_params()).unwrap();
        assert_eq!(election.p_list.len(), 12);
        assert_eq!(election.k_list.len(), 4);
        assert_eq!(election.server.rows, 2);
        assert_eq!(election.server.cols, 2);
        assert_eq!(election.seed, [0u8; 32]);
        assert_eq!(election.sorted_race_ids(), vec!["mayor", "taxes"]);
    }

    #[test]
    fn rejects_bad_parameters() {
        let cases = vec![
            ElectionParameters { n_reps: 3, ..small_params() },
            ElectionParameters { n_reps: 0, ..small_params() },
            ElectionParameters { n_reps: 28, ..small_params() },
            ElectionParameters { n_voters: 0, ..small_params() },
            ElectionParameters { n_fail: 20, n_leak: 5, ..small_params() },
            ElectionParameters { ballot_id_len: 65, ..small_params() },
            ElectionParameters { ballot_id_len: 0, ..small_params() },
            // 24 ballots, 16 one-digit ids
            ElectionParameters { ballot_id_len: 1, ..small_params() },
            ElectionParameters { ballot_id_len: 1, n_voters: 20, ..small_params() },
            ElectionParameters { seed: Some("xyz".into()), ..small_params() },
            ElectionParameters { ballot_style: vec![], ..small_params() },
            ElectionParameters {
                ballot_style: vec![
                    ("r".into(), vec!["a".into(), "b".into()]),
                    ("r".into(), vec!["c".into(), "d".into()]),
                ],
                ..small_params()
            },
        ];
        for params in cases {
            match Election::new(params) {
                Err(Error::Configuration(_)) => {}
                other => panic!("expected configuration error, got {:?}", other.map(|e| e.election_id)),
            }
        }
    }

    #[test]
    fn short_ballot_ids_are_allowed_for_small_elections() {
        // 2 races x 4 voters = 8 ballots, 16 ids
        let params = ElectionParameters {
            n_voters: 4,
            ballot_id_len: 1,
            ..small_params()
        };
        assert!(Election::new(params).is_ok());
        let params = ElectionParameters {
            n_voters: 5,
            ballot_id_len: 1,
            ..small_params()
        };
        assert!(Election::new(params).is_err());
    }

    #[test]
    fn parameters_file_defaults() {
        let json = r#"{
            "election_id": "e1",
            "ballot_style": [["taxes", ["yes", "no"]]],
            "n_voters": 3, "n_reps": 2, "n_fail": 0, "n_leak": 0
        }"#;
        let params: ElectionParameters = serde_json::from_str(json).unwrap();
        assert_eq!(params.ballot_id_len, DEFAULT_BALLOT_ID_LEN);
        assert!(params.seed.is_none());
    }
}
