//! Command-line arguments.

use crate::error::{DaemonError, DaemonResult};
use std::path::PathBuf;

/// Environment fallback for `--config`.
pub const CONFIG_ENV: &str = "CASEWATCH_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliArgs {
    pub config: Option<PathBuf>,
    /// Run a single cycle, flush its deletions, and exit.
    pub once: bool,
}

impl CliArgs {
    /// Parse process arguments, falling back to `CASEWATCH_CONFIG`.
    pub fn from_env() -> DaemonResult<Self> {
        let mut args = Self::parse(std::env::args().skip(1))?;
        if args.config.is_none() {
            args.config = std::env::var(CONFIG_ENV).ok().map(PathBuf::from);
        }
        Ok(args)
    }

    pub fn parse<I>(args: I) -> DaemonResult<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut parsed = Self::default();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            if arg == "--once" {
                parsed.once = true;
            } else if arg == "--config" {
                let path = args
                    .next()
                    .ok_or_else(|| DaemonError::Usage("--config needs a path".to_string()))?;
                parsed.config = Some(PathBuf::from(path));
            } else if let Some(path) = arg.strip_prefix("--config=") {
                parsed.config = Some(PathBuf::from(path));
            } else {
                return Err(DaemonError::Usage(format!("unknown argument {:?}", arg)));
            }
        }
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> DaemonResult<CliArgs> {
        CliArgs::parse(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_parse_forms() {
        assert_eq!(parse(&[]).unwrap(), CliArgs::default());
        let args = parse(&["--once", "--config", "casewatch.toml"]).unwrap();
        assert!(args.once);
        assert_eq!(args.config, Some(PathBuf::from("casewatch.toml")));
        let args = parse(&["--config=/etc/casewatch.toml"]).unwrap();
        assert_eq!(args.config, Some(PathBuf::from("/etc/casewatch.toml")));
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(matches!(parse(&["--config"]), Err(DaemonError::Usage(_))));
        assert!(matches!(parse(&["--verbose"]), Err(DaemonError::Usage(_))));
    }
}
