// src/config/validate.rs

use crate::config::model::{RawConfigFile, RunnerConfig};
use crate::errors::{Result, TaskError};

impl TryFrom<RawConfigFile> for RunnerConfig {
    type Error = crate::errors::TaskError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(RunnerConfig::new_unchecked(raw.runner, raw.tools, raw.test))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_runner(cfg)?;
    validate_tools(cfg)?;
    Ok(())
}

fn validate_runner(cfg: &RawConfigFile) -> Result<()> {
    if cfg.runner.worker_program.trim().is_empty() {
        return Err(TaskError::ConfigError(
            "[runner].worker_program must not be empty".to_string(),
        ));
    }

    if cfg.runner.max_cores == Some(0) {
        return Err(TaskError::ConfigError(
            "[runner].max_cores must be >= 1 (got 0)".to_string(),
        ));
    }

    Ok(())
}

fn validate_tools(cfg: &RawConfigFile) -> Result<()> {
    let tools = &cfg.tools;

    if tools.zoom_min > tools.zoom_max {
        return Err(TaskError::ConfigError(format!(
            "[tools].zoom_min ({}) must not exceed zoom_max ({})",
            tools.zoom_min, tools.zoom_max
        )));
    }

    for (key, program) in [
        ("tiler_program", &tools.tiler_program),
        ("point_cloud_program", &tools.point_cloud_program),
    ] {
        if program.trim().is_empty() {
            return Err(TaskError::ConfigError(format!(
                "[tools].{key} must not be empty"
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Result<RunnerConfig> {
        let raw: RawConfigFile = toml::from_str(toml_src)?;
        RunnerConfig::try_from(raw)
    }

    #[test]
    fn empty_config_uses_defaults() {
        let cfg = parse("").unwrap();
        assert_eq!(cfg.runner.worker_program, "python");
        assert_eq!(cfg.runner.worker_args, vec!["run.py".to_string()]);
        assert_eq!(cfg.tools.zoom_min, 16);
        assert_eq!(cfg.tools.zoom_max, 21);
        assert!(!cfg.test.enabled);
    }

    #[test]
    fn inverted_zoom_range_is_rejected() {
        let err = parse("[tools]\nzoom_min = 20\nzoom_max = 18\n").unwrap_err();
        match err {
            TaskError::ConfigError(msg) => assert!(msg.contains("zoom_min")),
            other => panic!("expected ConfigError, got {other:?}"),
        }
    }

    #[test]
    fn zero_max_cores_is_rejected() {
        assert!(matches!(
            parse("[runner]\nmax_cores = 0\n"),
            Err(TaskError::ConfigError(_))
        ));
    }

    #[test]
    fn blank_tool_program_is_rejected() {
        assert!(matches!(
            parse("[tools]\npoint_cloud_program = \"  \"\n"),
            Err(TaskError::ConfigError(_))
        ));
    }
}
