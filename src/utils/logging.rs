//! Diagnostic output for the `haven` binary.
//!
//! Diagnostics go to stderr so they never interleave with reply text on
//! stdout. `HAVEN_LOG` takes `EnvFilter` directives and overrides the
//! verbosity flag.

use tracing_subscriber::EnvFilter;

/// Environment variable holding filter directives, e.g. `haven=debug`.
pub const LOG_ENV: &str = "HAVEN_LOG";

/// HTTP stack crates kept at `warn` unless `HAVEN_LOG` says otherwise.
const NOISY_MODULES: &[&str] = &["hyper", "hyper_util", "reqwest", "h2", "rustls"];

fn level_for(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

pub(crate) fn build_filter(verbosity: u8, env_directives: Option<&str>) -> EnvFilter {
    if let Some(directives) = env_directives.filter(|value| !value.trim().is_empty()) {
        if let Ok(filter) = EnvFilter::try_new(directives) {
            return filter;
        }
    }

    let mut directives = level_for(verbosity).to_string();
    for module in NOISY_MODULES {
        directives.push_str(&format!(",{module}=warn"));
    }
    EnvFilter::new(directives)
}

/// Install the global subscriber. Safe to call more than once; later calls
/// are ignored.
pub fn init_tracing(verbosity: u8) {
    let env_directives = std::env::var(LOG_ENV).ok();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(build_filter(verbosity, env_directives.as_deref()))
        .with_target(verbosity > 1)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_selects_the_base_level() {
        assert_eq!(level_for(0), "warn");
        assert_eq!(level_for(2), "debug");
        assert_eq!(level_for(9), "trace");
    }

    #[test]
    fn default_filter_quiets_http_crates() {
        let filter = build_filter(2, None).to_string();
        assert!(filter.contains("debug"));
        assert!(filter.contains("reqwest=warn"));
        assert!(filter.contains("hyper=warn"));
    }

    #[test]
    fn environment_directives_override_verbosity() {
        let filter = build_filter(0, Some("haven=trace")).to_string();
        assert_eq!(filter, "haven=trace");

        let fallback = build_filter(1, Some("   ")).to_string();
        assert!(fallback.contains("info"));
    }
}
