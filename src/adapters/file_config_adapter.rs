//! INI file configuration adapter.

use crate::domain::error::ZlmaError;
use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

#[derive(Debug)]
pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ZlmaError> {
        let path = path.as_ref();
        let mut config = Ini::new();
        config.load(path).map_err(|reason| ZlmaError::ConfigParse {
            file: path.display().to_string(),
            reason,
        })?;
        log::debug!("loaded config from {}", path.display());
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, ZlmaError> {
        let mut config = Ini::new();
        config
            .read(content.to_string())
            .map_err(|reason| ZlmaError::ConfigParse {
                file: "<string>".into(),
                reason,
            })?;
        Ok(Self { config })
    }

    /// Empty configuration; every lookup falls back to its default.
    pub fn empty() -> Self {
        Self { config: Ini::new() }
    }

    fn parse_bool(value: &str) -> Option<bool> {
        match value.to_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        }
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config.get(section, key).filter(|v| !v.trim().is_empty())
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.config
            .getint(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        self.config
            .getfloat(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.config
            .get(section, key)
            .as_ref()
            .and_then(|v| Self::parse_bool(v))
            .unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::{AppConfig, StorageBackend};
    use crate::domain::ohlcv::Timeframe;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    #[test]
    fn from_string_parses_config() {
        let content = r#"
[indicators]
ema_period = 20
default_timeframe = 12h

[storage]
data_dir = /var/lib/zlma
"#;
        let adapter = FileConfigAdapter::from_string(content).unwrap();
        assert_eq!(adapter.get_int("indicators", "ema_period", 0), 20);
        assert_eq!(
            adapter.get_string("indicators", "default_timeframe"),
            Some("12h".to_string())
        );
        assert_eq!(
            adapter.get_string("storage", "data_dir"),
            Some("/var/lib/zlma".to_string())
        );
    }

    #[test]
    fn get_string_returns_none_for_missing_or_blank_key() {
        let adapter =
            FileConfigAdapter::from_string("[storage]\nbackend =\ndata_dir = data\n").unwrap();
        assert_eq!(adapter.get_string("storage", "missing"), None);
        assert_eq!(adapter.get_string("storage", "backend"), None);
        assert_eq!(adapter.get_string("missing_section", "key"), None);
    }

    #[test]
    fn get_int_returns_default_for_missing_or_non_numeric() {
        let adapter =
            FileConfigAdapter::from_string("[indicators]\nzlma_period = abc\n").unwrap();
        assert_eq!(adapter.get_int("indicators", "zlma_period", 15), 15);
        assert_eq!(adapter.get_int("indicators", "ema_period", 15), 15);
    }

    #[test]
    fn get_double_returns_value() {
        let adapter =
            FileConfigAdapter::from_string("[backtest]\ninitial_capital = 2500.5\n").unwrap();
        assert_eq!(adapter.get_double("backtest", "initial_capital", 0.0), 2500.5);
        assert_eq!(adapter.get_double("backtest", "missing", 99.9), 99.9);
    }

    #[test]
    fn get_bool_accepts_common_spellings() {
        let adapter =
            FileConfigAdapter::from_string("[signals]\na = yes\nb = 0\nc = maybe\n").unwrap();
        assert!(adapter.get_bool("signals", "a", false));
        assert!(!adapter.get_bool("signals", "b", true));
        assert!(adapter.get_bool("signals", "c", true));
    }

    #[test]
    fn from_file_feeds_app_config() {
        let file = create_temp_config(
            "[indicators]\nema_period = 10\nzlma_period = 12\ndefault_timeframe = 1w\n\n\
             [backtest]\ninitial_capital = 5000\nposition_size_pct = 0.25\n\n\
             [storage]\nbackend = csv\ndata_dir = /tmp/zlma\n",
        );
        let adapter = FileConfigAdapter::from_file(file.path()).unwrap();
        let cfg = AppConfig::from_port(&adapter).unwrap();
        assert_eq!(cfg.indicators.ema_period, 10);
        assert_eq!(cfg.indicators.zlma_period, 12);
        assert_eq!(cfg.indicators.default_timeframe, Timeframe::W1);
        assert_eq!(cfg.backtest.initial_capital, 5000.0);
        assert_eq!(cfg.backtest.position_size_pct, 0.25);
        assert_eq!(cfg.storage.backend, StorageBackend::Csv);
        assert_eq!(
            cfg.storage.signals_path(),
            std::path::PathBuf::from("/tmp/zlma/signals.csv")
        );
    }

    #[test]
    fn from_file_returns_error_for_missing_file() {
        let err = FileConfigAdapter::from_file("/nonexistent/path/zlma.ini").unwrap_err();
        assert!(matches!(err, ZlmaError::ConfigParse { .. }));
    }

    #[test]
    fn empty_config_yields_defaults() {
        let cfg = AppConfig::from_port(&FileConfigAdapter::empty()).unwrap();
        assert_eq!(cfg.indicators.ema_period, 15);
        assert_eq!(cfg.storage.backend, StorageBackend::Csv);
    }
}
