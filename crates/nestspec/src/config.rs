//! Run configuration.

/// Configuration for one [`Tester`](crate::Tester) run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunConfig {
    /// Report passing units and passing groups, not only failures.
    pub verbose: bool,
    /// Only run units whose full path contains this (case-insensitive).
    pub filter: Option<String>,
}

impl RunConfig {
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Parse from the process args (compatible with `cargo test -- <args>`)
    /// and the `NESTSPEC_VERBOSE` environment variable.
    pub fn from_args() -> Self {
        let mut config = Self::parse(std::env::args().skip(1));
        if let Ok(val) = std::env::var("NESTSPEC_VERBOSE") {
            if val == "1" || val.eq_ignore_ascii_case("true") {
                config.verbose = true;
            }
        }
        config
    }

    /// Parse an argument list (without the binary name).
    ///
    /// `--verbose`/`-v` and `--quiet`/`-q` toggle verbosity, the first bare
    /// argument becomes the filter, unknown flags are ignored.
    pub fn parse<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut config = RunConfig::default();
        for arg in args {
            match arg.as_ref() {
                "--verbose" | "-v" => config.verbose = true,
                "--quiet" | "-q" => config.verbose = false,
                arg if !arg.starts_with('-') && config.filter.is_none() => {
                    config.filter = Some(arg.to_string());
                }
                _ => {} // cargo test passes flags we don't handle
            }
        }
        config
    }

    /// Whether a unit at `path` is selected by the filter.
    pub fn selects(&self, path: &str) -> bool {
        match &self.filter {
            Some(f) => path.to_lowercase().contains(&f.to_lowercase()),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags_and_filter() {
        let config = RunConfig::parse(["--nocapture", "-v", "ledger", "other"]);
        assert!(config.verbose);
        assert_eq!(config.filter.as_deref(), Some("ledger"));
    }

    #[test]
    fn test_quiet_wins_when_last() {
        let config = RunConfig::parse(["--verbose", "--quiet"]);
        assert!(!config.verbose);
        assert_eq!(config.filter, None);
    }

    #[test]
    fn test_selects_is_case_insensitive() {
        let config = RunConfig::default().filter("Balance");
        assert!(config.selects("Sheets > balance > sums rows"));
        assert!(!config.selects("Sheets > email > renders"));
        assert!(RunConfig::default().selects("anything"));
    }
}
