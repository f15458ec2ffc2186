use crate::*;
use num_bigint::BigUint;

/// Write-in names used by simulated voters
pub const WRITE_INS: [&str; 3] = ["Donald Duck", "Lizard People", "Mickey Mouse"];

/// One contest on the ballot
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Race {
    pub race_id: String,

    /// Candidate names. A string made only of `*` is a write-in slot of that maximum length.
    pub choices: Vec<String>,

    /// Smallest prime >= 256^max_choice_len; all shares of this race live modulo it
    #[serde(with = "biguint_str")]
    pub race_modulus: BigUint,

    pub max_choice_len: usize,
}

fn is_write_in(choice: &str) -> bool {
    !choice.is_empty() && choice.chars().all(|c| c == '*')
}

impl Race {
    pub fn new(race_id: &str, choices: Vec<String>) -> Result<Self, Error> {
        if race_id.is_empty() {
            return Err(Error::Configuration("race id must not be empty".to_owned()));
        }
        if choices.is_empty() {
            return Err(Error::Configuration(format!(
                "race {} has no choices",
                race_id
            )));
        }
        if choices.len() == 1 && !is_write_in(&choices[0]) {
            return Err(Error::Configuration(format!(
                "race {} needs at least two choices or a write-in",
                race_id
            )));
        }
        let mut seen = std::collections::BTreeSet::new();
        for choice in choices.iter() {
            if choice.is_empty() || !seen.insert(choice.as_str()) {
                return Err(Error::Configuration(format!(
                    "race {} has an empty or duplicate choice",
                    race_id
                )));
            }
        }

        let max_choice_len = choices.iter().map(|c| c.len()).max().unwrap_or(1);
        let race_modulus = make_prime(&(BigUint::from(1u32) << (8 * max_choice_len)));

        Ok(Race {
            race_id: race_id.to_owned(),
            choices,
            race_modulus,
            max_choice_len,
        })
    }

    /// Is `choice` a listed candidate, or a write-in that fits a write-in slot?
    pub fn is_valid_choice(&self, choice: &str) -> bool {
        if self.choices.iter().any(|c| c == choice) {
            return true;
        }
        !choice.is_empty()
            && self
                .choices
                .iter()
                .any(|c| is_write_in(c) && choice.len() <= c.len())
    }

    /// Choices that start at zero in a tally (write-in slots excluded)
    pub fn listed_choices(&self) -> impl Iterator<Item = &String> {
        self.choices.iter().filter(|c| !is_write_in(c))
    }

    pub fn choice_str2int(&self, choice: &str) -> Result<BigUint, Error> {
        let value = bytes_to_int(choice.as_bytes());
        if !self.is_valid_choice(choice) || value >= self.race_modulus {
            return Err(Error::InvalidChoice(self.race_id.clone()));
        }
        Ok(value)
    }

    pub fn choice_int2str(&self, value: &BigUint) -> Result<String, Error> {
        let choice = String::from_utf8(int_to_bytes(value))
            .map_err(|_| Error::InvalidChoice(self.race_id.clone()))?;
        if !self.is_valid_choice(&choice) {
            return Err(Error::InvalidChoice(self.race_id.clone()));
        }
        Ok(choice)
    }

    /// A uniformly random choice; a write-in slot becomes one of the built-in names, truncated to fit
    pub fn random_choice(&self, rng: &mut RandomSource) -> String {
        let choice = &self.choices[rng.below_usize(self.choices.len())];
        if !is_write_in(choice) {
            return choice.clone();
        }
        let name = WRITE_INS[rng.below_usize(WRITE_INS.len())];
        name.chars().take(choice.len()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mayor() -> Race {
        Race::new(
            "mayor",
            vec!["tom".into(), "rufus".into(), "********".into()],
        )
        .unwrap()
    }

    #[test]
    fn modulus_covers_longest_choice() {
        let race = mayor();
        assert_eq!(race.max_choice_len, 8);
        assert!(race.race_modulus >= BigUint::from(1u32) << 64);
        assert!(is_prime(&race.race_modulus));
    }

    #[test]
    fn choice_encoding_roundtrip() {
        let race = mayor();
        for choice in &["tom", "rufus", "Mickey M"] {
            let value = race.choice_str2int(choice).unwrap();
            assert_eq!(race.choice_int2str(&value).unwrap(), *choice);
        }
        assert!(race.choice_str2int("Lizard People").is_err());
    }

    #[test]
    fn random_write_ins_fit() {
        let race = mayor();
        let mut rng = RandomSource::from_seed([11u8; 32]);
        for _ in 0..50 {
            let choice = race.random_choice(&mut rng);
            assert!(race.is_valid_choice(&choice), "{}", choice);
        }
    }

    #[test]
    fn rejects_bad_races() {
        assert!(Race::new("", vec!["a".into(), "b".into()]).is_err());
        assert!(Race::new("r", vec![]).is_err());
        assert!(Race::new("r", vec!["a".into()]).is_err());
        assert!(Race::new("r", vec!["a".into(), "a".into()]).is_err());
        assert!(Race::new("r", vec!["***".into()]).is_ok());
    }
}
