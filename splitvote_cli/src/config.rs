use std::path::PathBuf;

/// Settings read from the environment; command-line flags take precedence
#[derive(Debug, Default, Clone)]
pub struct Config {
    /// SPLITVOTE_PARAMS: election parameters file
    pub params_path: Option<PathBuf>,

    /// SPLITVOTE_SEED: hex-encoded master seed
    pub seed: Option<String>,

    /// SPLITVOTE_SBB_PATH: where `run` saves the bulletin board
    pub sbb_path: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Self {
        Config {
            params_path: std::env::var("SPLITVOTE_PARAMS").ok().map(|p| expand(&p)),
            seed: std::env::var("SPLITVOTE_SEED").ok().filter(|s| !s.is_empty()),
            sbb_path: std::env::var("SPLITVOTE_SBB_PATH").ok().map(|p| expand(&p)),
        }
    }
}

/// Expand `~` and environment variables in a path
pub fn expand(path: &str) -> PathBuf {
    match shellexpand::full(path) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_environment_variables() {
        std::env::set_var("SPLITVOTE_TEST_DIR", "/tmp/boards");
        assert_eq!(
            expand("$SPLITVOTE_TEST_DIR/election.json"),
            PathBuf::from("/tmp/boards/election.json")
        );
        assert_eq!(expand("plain.json"), PathBuf::from("plain.json"));
    }
}
