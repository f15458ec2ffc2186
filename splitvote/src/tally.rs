use crate::*;
use indexmap::IndexMap;
use log::info;
use num_bigint::BigUint;
use std::collections::BTreeMap;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TallyResult {
    pub race_id: String,
    pub num_votes: usize,
    pub totals: IndexMap<String, u64>,
}

impl TallyResult {
    /// Count decoded choices; listed choices start at zero, write-ins appear as they are seen
    pub fn count(race: &Race, choices: &[String]) -> Self {
        let mut totals: IndexMap<String, u64> =
            race.listed_choices().map(|c| (c.clone(), 0)).collect();
        for choice in choices {
            *totals.entry(choice.clone()).or_insert(0) += 1;
        }
        TallyResult {
            race_id: race.race_id.clone(),
            num_votes: choices.len(),
            totals,
        }
    }

    /// Choices with the highest count
    pub fn winners(&self) -> Vec<&str> {
        let max = match self.totals.values().max() {
            Some(max) if *max > 0 => *max,
            _ => return vec![],
        };
        self.totals
            .iter()
            .filter(|(_, n)| **n == max)
            .map(|(c, _)| c.as_str())
            .collect()
    }
}

/// Reconstruct one replica's outputs from the row shares available, and decode them.
///
/// `rows` maps a row letter to that row's output vector. Any `threshold` rows suffice;
/// fewer is an error rather than a partial result.
pub fn reconstruct_outputs(
    race: &Race,
    server: &ServerArray,
    rows: &BTreeMap<char, &Vec<BigUint>>,
) -> Result<Vec<String>, Error> {
    if rows.len() < server.threshold {
        return Err(Error::NotEnoughShares(server.threshold, rows.len()));
    }
    let mut points = Vec::with_capacity(rows.len());
    let mut n_voters = None;
    for (row, y) in rows.iter() {
        let point = server
            .share_point(*row)
            .ok_or_else(|| Error::MalformedUpdate(format!("row {} is outside the grid", row)))?;
        match n_voters {
            None => n_voters = Some(y.len()),
            Some(n) if n != y.len() => {
                return Err(Error::MalformedUpdate(format!(
                    "row {} holds {} outputs, expected {}",
                    row,
                    y.len(),
                    n
                )))
            }
            Some(_) => {}
        }
        points.push((point, *y));
    }

    let n_voters = n_voters.unwrap_or(0);
    let mut choices = Vec::with_capacity(n_voters);
    for e in 0..n_voters {
        let shares: Vec<Share> = points
            .iter()
            .map(|(point, y)| (*point, y[e].clone()))
            .collect();
        let value = lagrange(&shares, server.rows, server.threshold, &race.race_modulus)?;
        choices.push(race.choice_int2str(&value)?);
    }
    choices.sort();
    Ok(choices)
}

/// Tally a race over the given replicas, each a map from row to output vector.
/// Every replica must decode to the same multiset of choices.
pub fn tally_race(
    race: &Race,
    server: &ServerArray,
    replicas: &BTreeMap<char, BTreeMap<char, &Vec<BigUint>>>,
) -> Result<TallyResult, Error> {
    let mut agreed: Option<Vec<String>> = None;
    for rows in replicas.values() {
        let choices = reconstruct_outputs(race, server, rows)?;
        match &agreed {
            None => agreed = Some(choices),
            Some(previous) if *previous != choices => {
                return Err(Error::InconsistentReplicas(race.race_id.clone()))
            }
            Some(_) => {}
        }
    }
    let choices = agreed.ok_or_else(|| Error::InconsistentReplicas(race.race_id.clone()))?;
    Ok(TallyResult::count(race, &choices))
}

impl MixServer {
    /// Tally every race from the opl replicas, using this cell's outputs and those its column peers broadcast
    pub fn tally(&self) -> Result<Vec<TallyResult>, Error> {
        let allowed = self.cell == self.server().tally_cell();
        self.guard("tally", allowed)?;
        let cut = self.cut()?;

        let mut results = Vec::with_capacity(self.election.races.len());
        for race in self.election.races.iter() {
            let slice = self.store.race(&race.race_id)?;
            let mut replicas = BTreeMap::new();
            for k in cut.opl.iter() {
                let mut rows = BTreeMap::new();
                rows.insert(self.cell.row, &self.store.replica(&race.race_id, *k)?.y);
                for (row, outputs) in slice.peer_outputs.iter() {
                    if let Some(y) = outputs.get(k) {
                        rows.insert(*row, y);
                    }
                }
                replicas.insert(*k, rows);
            }
            let result = tally_race(race, self.server(), &replicas)?;
            info!("race {}: {} votes tallied", result.race_id, result.num_votes);
            results.push(result);
        }
        Ok(results)
    }
}

/// The `tally:results` body for a finished tally
pub fn tally_publication(election_id: &str, results: &[TallyResult]) -> TallyResults {
    TallyResults {
        election_id: election_id.to_owned(),
        tally: results
            .iter()
            .map(|r| (r.race_id.clone(), r.totals.clone()))
            .collect(),
    }
}

/// Human-readable tally, winners first
pub fn format_tally(results: &[TallyResult]) -> String {
    let mut out = String::new();
    for result in results {
        out.push_str(&format!(
            "{} ({} votes)\n  winner: {}\n",
            result.race_id,
            result.num_votes,
            result.winners().join(", ")
        ));
        let mut totals: Vec<(&String, &u64)> = result.totals.iter().collect();
        totals.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        for (choice, count) in totals {
            out.push_str(&format!("  {:>8}  {}\n", count, choice));
        }
    }
    out
}

pub fn print_tally(results: &[TallyResult]) {
    print!("{}", format_tally(results));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn race() -> Race {
        Race::new("mayor", vec!["tom".into(), "rufus".into(), "*".repeat(16)]).unwrap()
    }

    fn shares_of(choices: &[&str], race: &Race, server: &ServerArray) -> BTreeMap<char, Vec<BigUint>> {
        let mut rng = RandomSource::from_seed([3u8; 32]);
        let mut by_row: BTreeMap<char, Vec<BigUint>> = BTreeMap::new();
        for choice in choices {
            let x = race.choice_str2int(choice).unwrap();
            let shares = share(&x, server.rows, server.threshold, &mut rng, &race.race_modulus).unwrap();
            for (row, (_, s)) in server.row_list().into_iter().zip(shares) {
                by_row.entry(row).or_default().push(s);
            }
        }
        by_row
    }

    #[test]
    fn counts_listed_choices_from_zero() {
        let race = race();
        let result = TallyResult::count(&race, &["tom".to_owned(), "Mickey Mouse".to_owned()]);
        assert_eq!(result.totals["tom"], 1);
        assert_eq!(result.totals["rufus"], 0);
        assert_eq!(result.totals["Mickey Mouse"], 1);
        assert_eq!(result.num_votes, 2);
        assert_eq!(result.winners(), vec!["tom", "Mickey Mouse"]);
    }

    #[test]
    fn any_threshold_of_rows_reconstructs() {
        let race = race();
        let server = ServerArray::new(1, 0).unwrap(); // 3 rows, threshold 2
        let by_row = shares_of(&["tom", "rufus", "tom"], &race, &server);

        for dropped in server.row_list() {
            let mut rows = view(&by_row);
            rows.remove(&dropped);
            let choices = reconstruct_outputs(&race, &server, &rows).unwrap();
            assert_eq!(choices, vec!["rufus", "tom", "tom"]);
        }

        let one: BTreeMap<char, &Vec<BigUint>> = by_row.iter().take(1).map(|(r, y)| (*r, y)).collect();
        match reconstruct_outputs(&race, &server, &one) {
            Err(Error::NotEnoughShares(2, 1)) => {}
            other => panic!("unexpected {:?}", other),
        }
    }

    fn view(m: &BTreeMap<char, Vec<BigUint>>) -> BTreeMap<char, &Vec<BigUint>> {
        m.iter().map(|(r, y)| (*r, y)).collect()
    }

    #[test]
    fn replicas_must_agree() {
        let race = race();
        let server = ServerArray::new(0, 0).unwrap();
        let a = shares_of(&["tom", "rufus"], &race, &server);
        let b = shares_of(&["rufus", "tom"], &race, &server);
        let c = shares_of(&["tom", "tom"], &race, &server);

        let mut replicas = BTreeMap::new();
        replicas.insert('A', view(&a));
        replicas.insert('B', view(&b));
        let result = tally_race(&race, &server, &replicas).unwrap();
        assert_eq!(result.totals["tom"], 1);
        assert_eq!(result.totals["rufus"], 1);

        replicas.insert('C', view(&c));
        match tally_race(&race, &server, &replicas) {
            Err(Error::InconsistentReplicas(id)) => assert_eq!(id, "mayor"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn formatted_tally_puts_winner_first() {
        let race = race();
        let result = TallyResult::count(
            &race,
            &["rufus".to_owned(), "rufus".to_owned(), "tom".to_owned()],
        );
        let text = format_tally(&[result]);
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("mayor (3 votes)"));
        assert_eq!(lines.next(), Some("  winner: rufus"));
        assert!(lines.next().unwrap().ends_with("rufus"));
    }
}
