use crate::error::{Error, Result};

pub const USAGE: &str = "usage: stacktime [output-threshold-percent]\n\
  output-threshold-percent: prune frames below this percent of total time \
(default 0.1)";

/// Report configuration handed to [`crate::state::State::finalize`].
#[derive(Debug, Clone)]
pub struct ReportConfig {
    /// Frames below this percentage of total root time are pruned from the
    /// report, subtree included.
    pub threshold: f64,
    /// Emit the JSON document instead of the two text trees.
    pub json: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        ReportConfig {
            threshold: 0.1,
            json: false,
        }
    }
}

impl ReportConfig {
    /// Parse the tool-argument list handed over by the embedding layer: at
    /// most one positional value, the output threshold in percent.
    pub fn from_tool_args<S: AsRef<str>>(args: &[S]) -> Result<ReportConfig> {
        let mut config = ReportConfig::default();
        match args {
            [] => {}
            [threshold] => {
                let raw = threshold.as_ref();
                config.threshold = raw.parse().map_err(|_| {
                    Error::InvalidArgument(format!("bad output threshold '{raw}'\n{USAGE}"))
                })?;
                if !(0.0..=100.0).contains(&config.threshold) {
                    return Err(Error::InvalidArgument(format!(
                        "output threshold must be a percentage, got {}\n{USAGE}",
                        config.threshold
                    )));
                }
            }
            _ => {
                return Err(Error::InvalidArgument(format!(
                    "expected at most one argument\n{USAGE}"
                )));
            }
        }
        config.json = Self::json_requested_by_env();
        Ok(config)
    }

    /// The host-runtime convention for selecting JSON output.
    pub fn json_requested_by_env() -> bool {
        std::env::var_os("KOKKOS_PROFILE_EXPORT_JSON").is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_arguments_means_defaults() {
        let config = ReportConfig::from_tool_args::<&str>(&[]).unwrap();
        assert_eq!(config.threshold, 0.1);
    }

    #[test]
    fn one_argument_sets_the_threshold() {
        let config = ReportConfig::from_tool_args(&["2.5"]).unwrap();
        assert_eq!(config.threshold, 2.5);
    }

    #[test]
    fn bad_threshold_is_rejected_with_usage() {
        let err = ReportConfig::from_tool_args(&["fast"]).unwrap_err();
        assert!(err.to_string().contains("usage:"));
    }

    #[test]
    fn out_of_range_threshold_is_rejected() {
        assert!(ReportConfig::from_tool_args(&["-1"]).is_err());
        assert!(ReportConfig::from_tool_args(&["250"]).is_err());
    }

    #[test]
    fn excess_arguments_are_rejected() {
        assert!(ReportConfig::from_tool_args(&["0.1", "0.2"]).is_err());
    }
}
