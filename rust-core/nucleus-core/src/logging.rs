//! # Logging
//!
//! JSON structured logging through `tracing-subscriber`. `RUST_LOG`
//! overrides are layered on top of the default directive.

use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;

/// Default directive when none is given
pub const DEFAULT_DIRECTIVE: &str = "nucleus_core=info";

/// Install the global JSON subscriber.
///
/// Returns `false` if a subscriber was already installed. An unparsable
/// directive falls back to [`DEFAULT_DIRECTIVE`].
pub fn init_tracing(default_directive: &str) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(build_filter(default_directive))
        .json()
        .try_init()
        .is_ok()
}

fn build_filter(default_directive: &str) -> EnvFilter {
    let directive = default_directive
        .parse::<Directive>()
        .or_else(|_| DEFAULT_DIRECTIVE.parse::<Directive>());
    let filter = EnvFilter::from_default_env();
    match directive {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::filter::LevelFilter;

    #[test]
    fn test_build_filter_applies_directive() {
        let filter = build_filter("nucleus_core=trace");
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::TRACE));
    }

    #[test]
    fn test_build_filter_falls_back_on_bad_directive() {
        let filter = build_filter("nucleus_core=loudest");
        assert!(filter.max_level_hint() >= Some(LevelFilter::INFO));
    }

    #[test]
    fn test_init_twice() {
        let _ = init_tracing("nucleus_core=debug");
        assert!(!init_tracing("nucleus_core=debug"));
    }
}
