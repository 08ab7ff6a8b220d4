//! Log output setup.
//!
//! Logs go to stderr; stdout carries answers and the MCP transport.

use tracing_subscriber::EnvFilter;

/// Default filter for the given `-v` count and `-q` flag.
pub fn default_directives(verbose: u8, quiet: bool) -> String {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };
    // HTTP internals stay quiet unless asked for explicitly via RUST_LOG.
    format!("{level},hyper=warn,hyper_util=warn,reqwest=warn")
}

/// Install the global subscriber. `RUST_LOG` wins over the flags.
pub fn init(verbose: u8, quiet: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(verbose, quiet)));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose > 1)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_select_level() {
        assert!(default_directives(0, false).starts_with("warn,"));
        assert!(default_directives(1, false).starts_with("info,"));
        assert!(default_directives(2, false).starts_with("debug,"));
        assert!(default_directives(5, false).starts_with("trace,"));
        assert!(default_directives(3, true).starts_with("error,"));
    }

    #[test]
    fn directives_parse() {
        for verbose in 0..4 {
            EnvFilter::try_new(default_directives(verbose, false)).unwrap();
        }
    }
}
