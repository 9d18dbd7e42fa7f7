use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::browser::{ExpansionPolicy, OverlayPolicy, StabilityPolicy, OVERLAY_CONTROLS};
use crate::{Result, Viewport, XshotError};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub browser: BrowserConfig,
    pub timeouts: Timeouts,
    pub overlay: OverlayPolicy,
    pub expansion: ExpansionPolicy,
    pub stability: StabilityPolicy,
    pub region: RegionPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Browser binary; discovered from `CHROME` or `PATH` when unset.
    pub executable: Option<PathBuf>,
    pub viewport: Viewport,
    pub device_scale_factor: f64,
    pub locale: String,
    pub headless: bool,
    pub extra_args: Vec<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            executable: None,
            viewport: Viewport::default(),
            device_scale_factor: 2.0,
            locale: "en-US".to_string(),
            headless: true,
            extra_args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    #[serde(with = "humantime_serde")]
    pub launch: Duration,
    #[serde(with = "humantime_serde")]
    pub navigation: Duration,
    #[serde(with = "humantime_serde")]
    pub region: Duration,
    #[serde(with = "humantime_serde")]
    pub capture: Duration,
    /// Budget for any single browser protocol call.
    #[serde(with = "humantime_serde")]
    pub command: Duration,
    /// Budget for the whole capture after the session is up. Must cover
    /// [`Config::minimum_overall`].
    #[serde(with = "humantime_serde")]
    pub overall: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            launch: Duration::from_secs(30),
            navigation: Duration::from_secs(30),
            region: Duration::from_secs(20),
            capture: Duration::from_secs(15),
            command: Duration::from_secs(10),
            overall: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionPolicy {
    /// Fall back to the first post on the page when the requested id never
    /// shows up. Can capture the wrong post on thread pages.
    pub allow_fallback: bool,
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
}

impl Default for RegionPolicy {
    fn default() -> Self {
        Self {
            allow_fallback: true,
            poll_interval: Duration::from_millis(250),
        }
    }
}

impl Config {
    /// Location of the per-user config file, if a config dir exists.
    pub fn central_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("xshot").join("config.toml"))
    }

    /// Loads config. Priority: explicit path > ~/.config/xshot/config.toml > defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => match Self::central_config_path() {
                Some(central) if central.is_file() => Self::from_file(&central),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| {
            XshotError::Config(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        Self::from_toml(&raw)
            .map_err(|e| XshotError::Config(format!("Invalid config ({}): {}", path.display(), e)))
    }

    pub fn from_toml(raw: &str) -> std::result::Result<Self, String> {
        let cfg: Config = toml::from_str(raw).map_err(|e| e.to_string())?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.browser.device_scale_factor < 1.0 {
            return Err(format!(
                "browser.device_scale_factor must be >= 1 (got {})",
                self.browser.device_scale_factor
            ));
        }
        if self.browser.viewport.width == 0 || self.browser.viewport.height == 0 {
            return Err("browser.viewport dimensions must be positive".to_string());
        }
        if self.browser.locale.trim().is_empty() {
            return Err("browser.locale must not be empty".to_string());
        }
        if self.stability.max_samples == 0 {
            return Err("stability.max_samples must be at least 1".to_string());
        }
        if self.stability.required_stable == 0 {
            return Err("stability.required_stable must be at least 1".to_string());
        }
        if self.expansion.max_passes == 0 {
            return Err("expansion.max_passes must be at least 1".to_string());
        }
        let timeouts = &self.timeouts;
        for (name, value) in [
            ("launch", timeouts.launch),
            ("navigation", timeouts.navigation),
            ("region", timeouts.region),
            ("capture", timeouts.capture),
            ("command", timeouts.command),
            ("overall", timeouts.overall),
        ] {
            if value.is_zero() {
                return Err(format!("timeouts.{name} must be non-zero"));
            }
        }
        let floor = self.minimum_overall();
        if timeouts.overall < floor {
            return Err(format!(
                "timeouts.overall ({:?}) is shorter than navigation + region + capture plus pipeline pauses ({:?})",
                timeouts.overall, floor
            ));
        }
        Ok(())
    }

    /// Worst-case time of a capture whose every step runs to its own limit.
    /// An overall budget below this would cut a step short and hide its error.
    pub fn minimum_overall(&self) -> Duration {
        let overlay = &self.overlay;
        let per_overlay = overlay.timeout + overlay.poll_interval + overlay.settle;
        let stability = &self.stability;
        let per_stability_pass =
            stability.interval * stability.max_samples as u32 + stability.settle;

        self.timeouts.navigation
            + self.timeouts.region
            + self.timeouts.capture
            + per_overlay * OVERLAY_CONTROLS.len() as u32
            + self.expansion.settle * self.expansion.max_passes as u32
            + per_stability_pass * 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_values_match_expected() {
        let cfg = Config::default();

        assert_eq!(cfg.browser.viewport.width, 1200);
        assert_eq!(cfg.browser.viewport.height, 2400);
        assert!((cfg.browser.device_scale_factor - 2.0).abs() < f64::EPSILON);
        assert_eq!(cfg.timeouts.navigation, Duration::from_secs(30));
        assert_eq!(cfg.timeouts.overall, Duration::from_secs(120));
        assert_eq!(cfg.stability.max_samples, 24);
        assert_eq!(cfg.expansion.max_passes, 8);
        assert!(cfg.region.allow_fallback);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg = Config::from_toml(
            r#"
            [browser]
            locale = "ko-KR"
            viewport = { width = 1000, height = 2000 }

            [timeouts]
            navigation = "12s"
            capture = "500ms"

            [region]
            allow_fallback = false
            "#,
        )
        .unwrap();

        assert_eq!(cfg.browser.locale, "ko-KR");
        assert_eq!(cfg.browser.viewport.width, 1000);
        assert_eq!(cfg.timeouts.navigation, Duration::from_secs(12));
        assert_eq!(cfg.timeouts.capture, Duration::from_millis(500));
        assert_eq!(cfg.timeouts.launch, Duration::from_secs(30));
        assert!(!cfg.region.allow_fallback);
        assert_eq!(cfg.stability.interval, Duration::from_millis(250));
    }

    #[test]
    fn rejects_scale_factor_below_one() {
        let err = Config::from_toml("[browser]\ndevice_scale_factor = 0.5\n").unwrap_err();
        assert!(err.contains("device_scale_factor"), "got: {err}");
    }

    #[test]
    fn rejects_zero_sample_budget() {
        let err = Config::from_toml("[stability]\nmax_samples = 0\n").unwrap_err();
        assert!(err.contains("max_samples"), "got: {err}");
    }

    #[test]
    fn default_overall_covers_every_step() {
        let cfg = Config::default();
        assert_eq!(cfg.minimum_overall(), Duration::from_millis(88_400));
        assert!(cfg.timeouts.overall >= cfg.minimum_overall());
    }

    #[test]
    fn rejects_overall_shorter_than_its_steps() {
        let err = Config::from_toml("[timeouts]\noverall = \"45s\"\n").unwrap_err();
        assert!(err.contains("timeouts.overall"), "got: {err}");

        let cfg = Config::from_toml(
            "[timeouts]\nnavigation = \"5s\"\nregion = \"5s\"\ncapture = \"5s\"\noverall = \"45s\"\n",
        )
        .unwrap();
        assert_eq!(cfg.timeouts.overall, Duration::from_secs(45));
    }

    #[test]
    fn rejects_zero_timeouts() {
        for name in ["launch", "navigation", "region", "capture", "command", "overall"] {
            let err = Config::from_toml(&format!("[timeouts]\n{name} = \"0s\"\n")).unwrap_err();
            assert!(err.contains(&format!("timeouts.{name}")), "got: {err}");
        }
    }

    #[test]
    fn load_reads_explicit_file() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("create temp file");
        writeln!(file, "[expansion]\nmax_passes = 3").unwrap();

        let cfg = Config::load(Some(file.path())).unwrap();
        assert_eq!(cfg.expansion.max_passes, 3);
    }

    #[test]
    fn load_missing_explicit_file_is_config_error() {
        let err = Config::load(Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
        assert!(matches!(err, XshotError::Config(_)));
    }
}
