//! Optimiser Settings Overrides

use std::path::PathBuf;

use clap::Args;

use crate::{
    budget::BudgetMode,
    optimizer::{OptimizerSettings, SettingsError},
};

/// Command-line overrides layered on top of an optional YAML settings file.
#[derive(Debug, Default, Args)]
pub struct SettingsOverrides {
    /// YAML file with optimiser settings
    #[arg(long, env = "STOCKWISE_SETTINGS")]
    pub settings: Option<PathBuf>,

    /// Lower bound scale applied to each baseline
    #[arg(long, env = "STOCKWISE_LOW_SCALE")]
    pub low_scale: Option<f64>,

    /// Upper bound scale applied to each baseline
    #[arg(long, env = "STOCKWISE_HIGH_SCALE")]
    pub high_scale: Option<f64>,

    /// Floor applied to derived bounds
    #[arg(long, env = "STOCKWISE_MIN_FLOOR")]
    pub min_floor: Option<u32>,

    /// Require spend to land within a tolerance band of the budget
    #[arg(long, env = "STOCKWISE_TOLERANCE_EQUALITY", default_value_t = false)]
    pub tolerance_equality: bool,

    /// Tolerance band as a fraction of the budget (implies --tolerance-equality)
    #[arg(long, env = "STOCKWISE_TOLERANCE")]
    pub tolerance: Option<f64>,

    /// Solver time limit in seconds
    #[arg(long, env = "STOCKWISE_TIME_LIMIT")]
    pub time_limit: Option<f64>,

    /// Add explicit per-record bound constraints to the model
    #[arg(long, env = "STOCKWISE_EXPLICIT_BOUNDS", default_value_t = false)]
    pub explicit_bounds: bool,
}

impl SettingsOverrides {
    /// Load the settings file (or defaults) and apply every given override.
    ///
    /// # Errors
    ///
    /// Returns a [`SettingsError`] if the settings file cannot be read or parsed.
    pub fn resolve(&self) -> Result<OptimizerSettings, SettingsError> {
        let mut settings = match &self.settings {
            Some(path) => OptimizerSettings::from_yaml_file(path)?,
            None => OptimizerSettings::default(),
        };

        if let Some(low) = self.low_scale {
            settings.scale.low = low;
        }

        if let Some(high) = self.high_scale {
            settings.scale.high = high;
        }

        if let Some(floor) = self.min_floor {
            settings.scale.min_floor = floor;
        }

        settings.budget_mode = match (self.tolerance, settings.budget_mode) {
            (Some(fraction), _) => BudgetMode::ToleranceEquality { fraction },
            (None, BudgetMode::Inequality) if self.tolerance_equality => {
                BudgetMode::tolerance_equality()
            }
            (None, mode) => mode,
        };

        if let Some(secs) = self.time_limit {
            settings.time_limit_secs = secs;
        }

        settings.explicit_bound_constraints |= self.explicit_bounds;

        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use testresult::TestResult;

    use super::*;

    #[test]
    fn defaults_without_file_or_overrides() -> TestResult {
        let settings = SettingsOverrides::default().resolve()?;

        assert_eq!(settings, OptimizerSettings::default());

        Ok(())
    }

    #[test]
    fn overrides_apply_on_top_of_file() -> TestResult {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "scale:\n  low: 0.25\n  high: 2.0\ntime_limit_secs: 3")?;

        let overrides = SettingsOverrides {
            settings: Some(file.path().to_path_buf()),
            high_scale: Some(1.75),
            tolerance: Some(0.01),
            ..SettingsOverrides::default()
        };

        let settings = overrides.resolve()?;

        assert!((settings.scale.low - 0.25).abs() < f64::EPSILON);
        assert!((settings.scale.high - 1.75).abs() < f64::EPSILON);
        assert!((settings.time_limit_secs - 3.0).abs() < f64::EPSILON);
        assert_eq!(
            settings.budget_mode,
            BudgetMode::ToleranceEquality { fraction: 0.01 }
        );

        Ok(())
    }

    #[test]
    fn tolerance_flag_keeps_configured_fraction() -> TestResult {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "budget_mode:\n  kind: tolerance_equality\n  fraction: 0.05")?;

        let overrides = SettingsOverrides {
            settings: Some(file.path().to_path_buf()),
            tolerance_equality: true,
            ..SettingsOverrides::default()
        };

        assert_eq!(
            overrides.resolve()?.budget_mode,
            BudgetMode::ToleranceEquality { fraction: 0.05 }
        );

        Ok(())
    }

    #[test]
    fn missing_settings_file_is_an_error() {
        let overrides = SettingsOverrides {
            settings: Some(PathBuf::from("/nonexistent/stockwise.yaml")),
            ..SettingsOverrides::default()
        };

        assert!(matches!(overrides.resolve(), Err(SettingsError::Io(_))));
    }
}
