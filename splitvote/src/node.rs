use crate::*;
use log::{debug, warn};
use std::collections::{BTreeSet, VecDeque};
use std::fmt;

/// What a node currently does
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq)]
pub enum RoleKind {
    Unassigned,
    Voter,
    Bulletin,
    Mixer,
}

impl fmt::Display for RoleKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            RoleKind::Unassigned => "unassigned",
            RoleKind::Voter => "voter",
            RoleKind::Bulletin => "bulletin",
            RoleKind::Mixer => "mixer",
        };
        write!(f, "{}", name)
    }
}

/// The two barrier-driven stages of an election
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Mix,
    Proof,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Stage::Mix => write!(f, "mix"),
            Stage::Proof => write!(f, "proof"),
        }
    }
}

/// Addresses of every party, mixers in role-index order
#[derive(Clone, Debug, PartialEq)]
pub struct Roster {
    pub voter: Address,
    pub bulletin: Address,
    pub mixers: Vec<Address>,
}

impl Roster {
    pub fn mixer(&self, server: &ServerArray, cell: CellId) -> Result<Address, Error> {
        server
            .index_of(cell)
            .and_then(|i| self.mixers.get(i).copied())
            .ok_or_else(|| Error::Configuration(format!("no mixer registered for cell {}", cell)))
    }
}

#[derive(Clone, Debug)]
pub enum Assignment {
    Voter(Election),
    Bulletin { election_id: String },
    Mixer { election: Election, role_index: usize },
}

#[derive(Clone, Debug)]
pub enum Request {
    GetRole,
    Assign(Assignment),
    BroadcastRoles(Roster),
    ProduceVotes,
    DistributeVotes,
    Post(Publication),
    ReadHash { public: bool },
    ReadBoard,
    CloseBoard,
    Mix(u32),
    Prove(u32),
    Tally,
    Update(StoreDelta),
}

impl Request {
    pub fn name(&self) -> &'static str {
        match self {
            Request::GetRole => "get-role",
            Request::Assign(_) => "assign",
            Request::BroadcastRoles(_) => "broadcast-roles",
            Request::ProduceVotes => "produce-votes",
            Request::DistributeVotes => "distribute-votes",
            Request::Post(_) => "post",
            Request::ReadHash { .. } => "read-hash",
            Request::ReadBoard => "read-board",
            Request::CloseBoard => "close-board",
            Request::Mix(_) => "mix",
            Request::Prove(_) => "prove",
            Request::Tally => "tally",
            Request::Update(_) => "update",
        }
    }
}

/// A mixer's answer to a barrier poll
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PhaseReport {
    pub phase: u32,
    /// the phase had work for this cell
    pub applicable: bool,
    /// the work is done and everything it produced was delivered
    pub done: bool,
    /// the stage has no phases left
    pub finished: bool,
}

#[derive(Debug)]
pub enum Response {
    Ack,
    Role(RoleKind),
    Hash([u8; 32]),
    Board(Vec<BoardItem>),
    Phase(PhaseReport),
    Tally(Vec<TallyResult>),
}

pub enum Role {
    Unassigned,
    Voter(Electorate),
    Bulletin(BulletinBoard),
    Mixer(Box<Mixer>),
}

impl Role {
    pub fn kind(&self) -> RoleKind {
        match self {
            Role::Unassigned => RoleKind::Unassigned,
            Role::Voter(_) => RoleKind::Voter,
            Role::Bulletin(_) => RoleKind::Bulletin,
            Role::Mixer(_) => RoleKind::Mixer,
        }
    }
}

enum Outgoing {
    Post(Publication),
    Update(Address, StoreDelta),
}

/// Work a mixer has computed but not yet delivered.
///
/// Each phase is computed at most once; a re-poll only retries what is still pending.
#[derive(Default)]
struct Outbox {
    computed: BTreeSet<(Stage, u32)>,
    pending: VecDeque<Outgoing>,
}

impl Outbox {
    fn queue(&mut self, work: PhaseWork, roster: &Roster, server: &ServerArray) -> Result<(), Error> {
        for post in work.posts {
            self.pending.push_back(Outgoing::Post(post));
        }
        for (cell, delta) in work.updates {
            let to = roster.mixer(server, cell)?;
            self.pending.push_back(Outgoing::Update(to, delta));
        }
        Ok(())
    }

    /// Deliver pending items in order. `Ok(false)` when a peer was unreachable.
    fn flush(&mut self, net: &mut dyn Transport, roster: &Roster) -> Result<bool, Error> {
        while let Some(item) = self.pending.front() {
            let result = match item {
                Outgoing::Post(post) => net.send(roster.bulletin, Request::Post(post.clone())),
                Outgoing::Update(to, delta) => net.send(*to, Request::Update(delta.clone())),
            };
            match result {
                Ok(Response::Ack) => {
                    self.pending.pop_front();
                }
                Ok(_) => return Err(Error::UnexpectedResponse),
                Err(e) if e.is_transient() => {
                    warn!("delivery deferred: {}", e);
                    return Ok(false);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(true)
    }
}

#[derive(Copy, Clone)]
enum Step {
    Mix(MixPhase),
    Proof(ProofPhase),
    Finished,
}

/// A mix cell together with its undelivered work
pub struct Mixer {
    pub server: MixServer,
    outbox: Outbox,
}

impl Mixer {
    pub fn new(server: MixServer) -> Self {
        Mixer {
            server,
            outbox: Outbox::default(),
        }
    }

    fn poll(
        &mut self,
        stage: Stage,
        phase: u32,
        net: &mut dyn Transport,
        roster: &Roster,
    ) -> Result<PhaseReport, Error> {
        let server = *self.server.server();
        let cell = self.server.cell;
        let step = match stage {
            Stage::Mix => match MixPhase::from_number(phase, server.cols) {
                MixPhase::Finished => Step::Finished,
                p => Step::Mix(p),
            },
            Stage::Proof => match ProofPhase::from_number(phase) {
                Some(p) => Step::Proof(p),
                None => Step::Finished,
            },
        };
        let applicable = match step {
            Step::Mix(p) => p.applies_to(cell, &server),
            Step::Proof(p) => p.applies_to(cell, &server),
            Step::Finished => false,
        };
        let mut report = PhaseReport {
            phase,
            applicable,
            done: false,
            finished: matches!(step, Step::Finished),
        };

        if applicable && !self.outbox.computed.contains(&(stage, phase)) {
            let work = match step {
                Step::Mix(p) => self.server.run_mix_phase(p)?,
                Step::Proof(p) => {
                    let hash = if p.needs_board_hash() {
                        match read_hash(net, roster) {
                            Ok(hash) => Some(hash),
                            Err(e) if e.is_transient() => {
                                warn!("cell {}: board hash unavailable: {}", cell, e);
                                return Ok(report);
                            }
                            Err(e) => return Err(e),
                        }
                    } else {
                        None
                    };
                    self.server.run_proof_phase(p, hash)?
                }
                Step::Finished => PhaseWork::default(),
            };
            self.outbox.queue(work, roster, &server)?;
            self.outbox.computed.insert((stage, phase));
        }

        report.done = self.outbox.flush(net, roster)?;
        Ok(report)
    }

    fn tally(&mut self, net: &mut dyn Transport, roster: &Roster) -> Result<Vec<TallyResult>, Error> {
        if self.server.cell != self.server.server().tally_cell() {
            return Ok(vec![]);
        }
        let results = self.server.tally()?;
        let body = tally_publication(&self.server.election.election_id, &results);
        let post = Publication::new(TALLY_RESULTS, &body, true)?;
        expect_ack(net.send(roster.bulletin, Request::Post(post))?)?;
        Ok(results)
    }
}

fn read_hash(net: &mut dyn Transport, roster: &Roster) -> Result<[u8; 32], Error> {
    match net.send(roster.bulletin, Request::ReadHash { public: true })? {
        Response::Hash(hash) => Ok(hash),
        _ => Err(Error::UnexpectedResponse),
    }
}

pub(crate) fn expect_ack(response: Response) -> Result<(), Error> {
    match response {
        Response::Ack => Ok(()),
        _ => Err(Error::UnexpectedResponse),
    }
}

/// One party in the network
pub struct Node {
    pub address: Address,
    role: Role,
    roster: Option<Roster>,
}

impl Node {
    pub fn new(address: Address) -> Self {
        Node {
            address,
            role: Role::Unassigned,
            roster: None,
        }
    }

    pub fn role(&self) -> RoleKind {
        self.role.kind()
    }

    pub fn electorate(&self) -> Option<&Electorate> {
        match &self.role {
            Role::Voter(electorate) => Some(electorate),
            _ => None,
        }
    }

    pub fn board(&self) -> Option<&BulletinBoard> {
        match &self.role {
            Role::Bulletin(board) => Some(board),
            _ => None,
        }
    }

    pub fn mix_server(&self) -> Option<&MixServer> {
        match &self.role {
            Role::Mixer(mixer) => Some(&mixer.server),
            _ => None,
        }
    }

    pub fn mix_server_mut(&mut self) -> Option<&mut MixServer> {
        match &mut self.role {
            Role::Mixer(mixer) => Some(&mut mixer.server),
            _ => None,
        }
    }

    fn assign(&mut self, assignment: Assignment) -> Result<(), Error> {
        if self.role() != RoleKind::Unassigned {
            return Err(Error::RoleAlreadyAssigned(self.address));
        }
        self.role = match assignment {
            Assignment::Voter(election) => Role::Voter(Electorate::new(election)),
            Assignment::Bulletin { election_id } => Role::Bulletin(BulletinBoard::open(&election_id)?),
            Assignment::Mixer {
                election,
                role_index,
            } => Role::Mixer(Box::new(Mixer::new(MixServer::new(election, role_index)?))),
        };
        debug!("{} assigned role {}", self.address, self.role());
        Ok(())
    }

    /// Handle one request. `net` reaches every other node.
    pub fn handle(&mut self, request: Request, net: &mut dyn Transport) -> Result<Response, Error> {
        match request {
            Request::GetRole => return Ok(Response::Role(self.role())),
            Request::Assign(assignment) => {
                self.assign(assignment)?;
                return Ok(Response::Ack);
            }
            Request::BroadcastRoles(roster) => {
                self.roster = Some(roster);
                return Ok(Response::Ack);
            }
            _ => {}
        }

        let kind = self.role();
        let roster = self.roster.clone().ok_or(Error::UnexpectedRequest(kind));
        match (&mut self.role, request) {
            (Role::Voter(electorate), Request::ProduceVotes) => {
                let roster = roster?;
                for post in electorate.cast_votes()? {
                    expect_ack(net.send(roster.bulletin, Request::Post(post))?)?;
                }
                Ok(Response::Ack)
            }
            (Role::Voter(electorate), Request::DistributeVotes) => {
                let roster = roster?;
                let server = electorate.election().server;
                for (cell, delta) in electorate.distribution()? {
                    let to = roster.mixer(&server, cell)?;
                    expect_ack(net.send(to, Request::Update(delta))?)?;
                }
                Ok(Response::Ack)
            }

            (Role::Bulletin(board), Request::Post(post)) => {
                board.post(post.header, post.body, post.timestamped)?;
                Ok(Response::Ack)
            }
            (Role::Bulletin(board), Request::ReadHash { public }) => {
                Ok(Response::Hash(board.hash(public)?))
            }
            (Role::Bulletin(board), Request::ReadBoard) => Ok(Response::Board(board.items().to_vec())),
            (Role::Bulletin(board), Request::CloseBoard) => {
                board.close()?;
                Ok(Response::Ack)
            }

            (Role::Mixer(mixer), Request::Update(delta)) => {
                debug!("cell {}: merging {}", mixer.server.cell, delta.kind());
                mixer.server.store.merge(delta)?;
                Ok(Response::Ack)
            }
            (Role::Mixer(mixer), Request::Mix(phase)) => {
                let roster = roster?;
                Ok(Response::Phase(mixer.poll(Stage::Mix, phase, net, &roster)?))
            }
            (Role::Mixer(mixer), Request::Prove(phase)) => {
                let roster = roster?;
                Ok(Response::Phase(mixer.poll(Stage::Proof, phase, net, &roster)?))
            }
            (Role::Mixer(mixer), Request::Tally) => {
                let roster = roster?;
                Ok(Response::Tally(mixer.tally(net, &roster)?))
            }

            (_, request) => {
                warn!("{} ({}) cannot handle {}", self.address, kind, request.name());
                Err(Error::UnexpectedRequest(kind))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn election() -> Election {
        Election::new(ElectionParameters {
            n_voters: 3,
            n_reps: 2,
            n_fail: 0,
            n_leak: 0,
            seed: Some("66".repeat(32)),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn roles_are_assigned_once() {
        let mut net = Network::new();
        let addr = net.spawn();
        net.send(
            addr,
            Request::Assign(Assignment::Bulletin {
                election_id: "e".into(),
            }),
        )
        .unwrap();
        match net.send(addr, Request::GetRole).unwrap() {
            Response::Role(RoleKind::Bulletin) => {}
            other => panic!("unexpected {:?}", other),
        }
        match net.send(addr, Request::Assign(Assignment::Voter(election()))) {
            Err(Error::RoleAlreadyAssigned(a)) => assert_eq!(a, addr),
            other => panic!("unexpected {:?}", other),
        }
        match net.send(addr, Request::Mix(0)) {
            Err(Error::UnexpectedRequest(RoleKind::Bulletin)) => {}
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn mixers_need_the_roster_before_polling() {
        let mut net = Network::new();
        let addr = net.spawn();
        net.send(
            addr,
            Request::Assign(Assignment::Mixer {
                election: election(),
                role_index: 0,
            }),
        )
        .unwrap();
        match net.send(addr, Request::Mix(0)) {
            Err(Error::UnexpectedRequest(RoleKind::Mixer)) => {}
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn pending_work_is_retried_not_recomputed() {
        let election = election();
        let mut net = Network::new();
        let bulletin = net.spawn();
        let mixer = net.spawn();
        net.send(
            bulletin,
            Request::Assign(Assignment::Bulletin {
                election_id: election.election_id.clone(),
            }),
        )
        .unwrap();
        net.send(
            mixer,
            Request::Assign(Assignment::Mixer {
                election: election.clone(),
                role_index: 0,
            }),
        )
        .unwrap();
        let roster = Roster {
            voter: Address(99),
            bulletin,
            mixers: vec![mixer],
        };
        for addr in &[bulletin, mixer] {
            net.send(*addr, Request::BroadcastRoles(roster.clone())).unwrap();
        }

        // the board is down when phase 0 first runs
        let server = net.node_mut(mixer).unwrap().mix_server_mut().unwrap();
        for race in election.races.iter() {
            for k in election.k_list.iter() {
                server.store.replica_mut(&race.race_id, *k).unwrap().y =
                    vec![Default::default(); election.n_voters];
            }
        }
        net.disconnect(bulletin);
        match net.send(mixer, Request::Prove(0)).unwrap() {
            Response::Phase(report) => {
                assert!(report.applicable);
                assert!(!report.done);
            }
            other => panic!("unexpected {:?}", other),
        }
        let first = net.node(mixer).unwrap().mix_server().unwrap().store.replica("taxes", 'A').unwrap().outputs.clone();

        net.reconnect(bulletin);
        match net.send(mixer, Request::Prove(0)).unwrap() {
            Response::Phase(report) => assert!(report.done),
            other => panic!("unexpected {:?}", other),
        }
        let second = net.node(mixer).unwrap().mix_server().unwrap().store.replica("taxes", 'A').unwrap().outputs.clone();
        assert_eq!(first, second);

        let board = net.node(bulletin).unwrap().board().unwrap();
        let posted = board
            .items()
            .iter()
            .filter(|i| i.header == PROOF_OUTPUT_COMMITMENTS)
            .count();
        assert_eq!(posted, 1);
    }
}
