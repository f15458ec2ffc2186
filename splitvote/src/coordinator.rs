use crate::*;
use indexmap::IndexMap;
use log::{debug, info, warn};
use serde::Serialize;

/// Barrier settings
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CoordinatorConfig {
    /// How many times a phase is polled before the barrier gives up
    #[serde(default = "default_max_polls")]
    pub max_polls_per_phase: usize,
}

fn default_max_polls() -> usize {
    3
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        CoordinatorConfig {
            max_polls_per_phase: default_max_polls(),
        }
    }
}

/// The result of a completed election run
#[derive(Clone, Debug)]
pub struct ElectionOutcome {
    pub tally: Vec<TallyResult>,
    pub board: Vec<BoardItem>,
}

/// What the coordinator saw after polling one phase
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BarrierOutcome {
    pub polls: usize,
    pub finished: bool,
}

/// Drives an election: roles, setup, casting, the mix and proof barriers, the tally and close
pub struct Coordinator<T: Transport> {
    transport: T,
    election: Election,
    roster: Roster,
    config: CoordinatorConfig,
}

impl Coordinator<Network> {
    /// Spawn one voter node, one bulletin node and a mixer per cell on a fresh in-memory network
    pub fn simulate(election: Election, config: CoordinatorConfig) -> Self {
        let mut network = Network::new();
        let voter = network.spawn();
        let bulletin = network.spawn();
        let mixers = (0..election.server.num_cells())
            .map(|_| network.spawn())
            .collect();
        let roster = Roster {
            voter,
            bulletin,
            mixers,
        };
        Coordinator::new(network, election, roster, config)
    }
}

impl<T: Transport> Coordinator<T> {
    pub fn new(transport: T, election: Election, roster: Roster, config: CoordinatorConfig) -> Self {
        Coordinator {
            transport,
            election,
            roster,
            config,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn election(&self) -> &Election {
        &self.election
    }

    /// Run the whole election and return the tally and the closed board
    pub fn run_election(&mut self) -> Result<ElectionOutcome, Error> {
        self.assign_roles()?;
        self.post_setup()?;
        self.broadcast_roster()?;
        self.cast_votes()?;
        self.run_stage(Stage::Mix)?;
        self.run_stage(Stage::Proof)?;
        let tally = self.tally()?;
        self.finish()?;
        let board = self.read_board()?;
        Ok(ElectionOutcome { tally, board })
    }

    pub fn assign_roles(&mut self) -> Result<(), Error> {
        let roster = self.roster.clone();
        let mut assignments = vec![
            (roster.voter, Assignment::Voter(self.election.clone())),
            (
                roster.bulletin,
                Assignment::Bulletin {
                    election_id: self.election.election_id.clone(),
                },
            ),
        ];
        for (role_index, addr) in roster.mixers.iter().enumerate() {
            assignments.push((
                *addr,
                Assignment::Mixer {
                    election: self.election.clone(),
                    role_index,
                },
            ));
        }
        for (addr, assignment) in assignments {
            expect_ack(self.transport.send(addr, Request::Assign(assignment))?)?;
        }

        for addr in roster.mixers.iter() {
            match self.transport.send(*addr, Request::GetRole)? {
                Response::Role(RoleKind::Mixer) => {}
                Response::Role(other) => {
                    return Err(Error::Configuration(format!(
                        "{} reports role {} instead of mixer",
                        addr, other
                    )))
                }
                _ => return Err(Error::UnexpectedResponse),
            }
        }
        info!(
            "roles assigned: voter {}, bulletin {}, {} mixers",
            roster.voter,
            roster.bulletin,
            roster.mixers.len()
        );
        Ok(())
    }

    fn post<B: Serialize>(&mut self, header: &'static str, body: &B, timestamped: bool) -> Result<(), Error> {
        let post = Publication::new(header, body, timestamped)?;
        expect_ack(self.transport.send(self.roster.bulletin, Request::Post(post))?)
    }

    pub fn post_setup(&mut self) -> Result<(), Error> {
        let election = self.election.clone();
        let server = election.server;
        self.post(
            SETUP_START,
            &SetupStart {
                election_id: election.election_id.clone(),
                about: "split-value voting mix-net simulation".to_owned(),
                legend: vec![
                    "voters cast split-value shares of their choices".to_owned(),
                    "a grid of mix servers permutes and obfuscates every replica".to_owned(),
                    "cut-and-choose challenges prove the tally consistent with the cast votes".to_owned(),
                ],
            },
            true,
        )?;
        self.post(
            SETUP_VOTERS,
            &SetupVoters {
                n_voters: election.n_voters,
                ballot_id_len: election.ballot_id_len,
            },
            false,
        )?;
        let ballot_style_race_dict: IndexMap<String, RaceInfo> = election
            .races
            .iter()
            .map(|race| {
                (
                    race.race_id.clone(),
                    RaceInfo {
                        choices: race.choices.clone(),
                        race_modulus: race.race_modulus.clone(),
                    },
                )
            })
            .collect();
        self.post(
            SETUP_RACES,
            &SetupRaces {
                ballot_style_race_dict,
            },
            false,
        )?;
        self.post(
            SETUP_SERVER_ARRAY,
            &SetupServerArray {
                rows: server.rows,
                cols: server.cols,
                n_reps: election.n_reps,
                threshold: server.threshold,
            },
            false,
        )?;
        self.post(
            SETUP_FINISHED,
            &ElectionStamp {
                election_id: election.election_id.clone(),
            },
            true,
        )?;
        debug!("setup posted");
        Ok(())
    }

    pub fn broadcast_roster(&mut self) -> Result<(), Error> {
        let roster = self.roster.clone();
        let mut addresses = vec![roster.voter, roster.bulletin];
        addresses.extend(roster.mixers.iter().copied());
        for addr in addresses {
            expect_ack(
                self.transport
                    .send(addr, Request::BroadcastRoles(roster.clone()))?,
            )?;
        }
        Ok(())
    }

    pub fn cast_votes(&mut self) -> Result<(), Error> {
        let voter = self.roster.voter;
        expect_ack(self.transport.send(voter, Request::ProduceVotes)?)?;
        expect_ack(self.transport.send(voter, Request::DistributeVotes)?)?;
        info!("{} voters cast their ballots", self.election.n_voters);
        Ok(())
    }

    /// Poll one phase on every mixer until all of them are done, or give up
    pub fn run_phase(&mut self, stage: Stage, phase: u32) -> Result<BarrierOutcome, Error> {
        let mixers = self.roster.mixers.clone();
        let mut polls = 0;
        loop {
            polls += 1;
            let mut all_done = true;
            let mut all_finished = true;
            for addr in mixers.iter() {
                let request = match stage {
                    Stage::Mix => Request::Mix(phase),
                    Stage::Proof => Request::Prove(phase),
                };
                let failed = |source: Error| Error::PhaseFailed {
                    stage,
                    phase,
                    address: *addr,
                    source: Box::new(source),
                };
                match self.transport.send(*addr, request) {
                    Ok(Response::Phase(report)) => {
                        all_done &= report.done;
                        all_finished &= report.finished;
                    }
                    Ok(_) => return Err(failed(Error::UnexpectedResponse)),
                    Err(e) if e.is_transient() => {
                        warn!("{} phase {}: {}", stage, phase, e);
                        all_done = false;
                        all_finished = false;
                    }
                    Err(e) => return Err(failed(e)),
                }
            }
            if all_done {
                debug!("{} phase {} done after {} poll(s)", stage, phase, polls);
                return Ok(BarrierOutcome {
                    polls,
                    finished: all_finished,
                });
            }
            if polls >= self.config.max_polls_per_phase {
                return Err(Error::BarrierStalled {
                    stage,
                    phase,
                    polls,
                });
            }
            warn!("{} phase {} not done, polling again", stage, phase);
        }
    }

    /// Advance through a stage's phases until every mixer reports it finished
    pub fn run_stage(&mut self, stage: Stage) -> Result<u32, Error> {
        let mut phase = 0;
        loop {
            if self.run_phase(stage, phase)?.finished {
                info!("{} stage finished after {} phases", stage, phase);
                return Ok(phase);
            }
            phase += 1;
        }
    }

    /// Ask every mixer for the tally; only the tally cell answers with results
    pub fn tally(&mut self) -> Result<Vec<TallyResult>, Error> {
        let mut tally = vec![];
        for addr in self.roster.mixers.clone() {
            match self.transport.send(addr, Request::Tally)? {
                Response::Tally(results) if !results.is_empty() => tally = results,
                Response::Tally(_) => {}
                _ => return Err(Error::UnexpectedResponse),
            }
        }
        if tally.is_empty() {
            return Err(Error::Configuration("no mixer produced a tally".to_owned()));
        }
        Ok(tally)
    }

    /// Post `election:done.` and close the board
    pub fn finish(&mut self) -> Result<(), Error> {
        let election_id = self.election.election_id.clone();
        self.post(ELECTION_DONE, &ElectionStamp { election_id }, true)?;
        expect_ack(
            self.transport
                .send(self.roster.bulletin, Request::CloseBoard)?,
        )?;
        info!("election {} done, board closed", self.election.election_id);
        Ok(())
    }

    pub fn read_board(&mut self) -> Result<Vec<BoardItem>, Error> {
        match self.transport.send(self.roster.bulletin, Request::ReadBoard)? {
            Response::Board(items) => Ok(items),
            _ => Err(Error::UnexpectedResponse),
        }
    }
}

/// Validate parameters, then run a full simulated election on an in-memory network
pub fn simulate(params: ElectionParameters, config: CoordinatorConfig) -> Result<ElectionOutcome, Error> {
    let election = Election::new(params)?;
    info!(
        "election {}: {} voters, {} replicas, {}x{} server array, threshold {}",
        election.election_id,
        election.n_voters,
        election.n_reps,
        election.server.rows,
        election.server.cols,
        election.server.threshold
    );
    Coordinator::simulate(election, config).run_election()
}
