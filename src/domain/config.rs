//! Application configuration, built once from a `ConfigPort` and validated.

use std::path::PathBuf;

use crate::domain::backtest::BacktestConfig;
use crate::domain::error::ZlmaError;
use crate::domain::indicator::{DEFAULT_EMA_PERIOD, DEFAULT_ZLMA_PERIOD, IndicatorEngine};
use crate::domain::ohlcv::Timeframe;
use crate::ports::config_port::ConfigPort;

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorConfig {
    pub ema_period: usize,
    pub zlma_period: usize,
    pub history_months: u32,
    pub default_timeframe: Timeframe,
}

impl IndicatorConfig {
    pub fn engine(&self) -> IndicatorEngine {
        IndicatorEngine::new(self.ema_period, self.zlma_period)
    }
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            ema_period: DEFAULT_EMA_PERIOD,
            zlma_period: DEFAULT_ZLMA_PERIOD,
            history_months: 6,
            default_timeframe: Timeframe::D1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Csv,
    Sqlite,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub data_dir: PathBuf,
    pub signals_file: String,
    pub backtest_file: String,
    pub sqlite_path: Option<String>,
    pub sqlite_pool_size: u32,
}

impl StorageConfig {
    pub fn signals_path(&self) -> PathBuf {
        self.data_dir.join(&self.signals_file)
    }

    pub fn backtest_path(&self) -> PathBuf {
        self.data_dir.join(&self.backtest_file)
    }
}

/// `[signals]` settings. `save` is the default for persisting detected signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalsConfig {
    pub save: bool,
}

impl Default for SignalsConfig {
    fn default() -> Self {
        Self { save: true }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub indicators: IndicatorConfig,
    pub backtest: BacktestConfig,
    pub storage: StorageConfig,
    pub signals: SignalsConfig,
}

impl AppConfig {
    pub fn from_port(config: &dyn ConfigPort) -> Result<Self, ZlmaError> {
        let indicators = build_indicator_config(config)?;
        let backtest = build_backtest_config(config)?;
        let storage = build_storage_config(config)?;
        let signals = SignalsConfig {
            save: config.get_bool("signals", "save", true),
        };
        log::info!(
            "config loaded: EMA={} ZLMA={} backend={:?}",
            indicators.ema_period,
            indicators.zlma_period,
            storage.backend
        );
        Ok(AppConfig {
            indicators,
            backtest,
            storage,
            signals,
        })
    }
}

fn positive_period(config: &dyn ConfigPort, key: &str, default: usize) -> Result<usize, ZlmaError> {
    let value = config.get_int("indicators", key, default as i64);
    if value < 1 {
        return Err(ZlmaError::invalid(
            "indicators",
            key,
            format!("{key} must be at least 1"),
        ));
    }
    usize::try_from(value)
        .map_err(|_| ZlmaError::invalid("indicators", key, format!("{key} is out of range")))
}

fn positive_u32(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: u32,
) -> Result<u32, ZlmaError> {
    let value = config.get_int(section, key, i64::from(default));
    if value < 1 {
        return Err(ZlmaError::invalid(
            section,
            key,
            format!("{key} must be at least 1"),
        ));
    }
    u32::try_from(value).map_err(|_| {
        ZlmaError::invalid(
            section,
            key,
            format!("{key} must be at most {}", u32::MAX),
        )
    })
}

fn build_indicator_config(config: &dyn ConfigPort) -> Result<IndicatorConfig, ZlmaError> {
    let ema_period = positive_period(config, "ema_period", DEFAULT_EMA_PERIOD)?;
    let zlma_period = positive_period(config, "zlma_period", DEFAULT_ZLMA_PERIOD)?;

    let history_months = positive_u32(config, "indicators", "history_months", 6)?;

    let default_timeframe = match config.get_string("indicators", "default_timeframe") {
        Some(s) => s.parse::<Timeframe>().map_err(|_| {
            ZlmaError::invalid(
                "indicators",
                "default_timeframe",
                format!("unsupported timeframe {s:?}"),
            )
        })?,
        None => Timeframe::D1,
    };

    Ok(IndicatorConfig {
        ema_period,
        zlma_period,
        history_months,
        default_timeframe,
    })
}

fn build_backtest_config(config: &dyn ConfigPort) -> Result<BacktestConfig, ZlmaError> {
    let defaults = BacktestConfig::default();
    let bt = BacktestConfig {
        initial_capital: config.get_double("backtest", "initial_capital", defaults.initial_capital),
        position_size_pct: config.get_double(
            "backtest",
            "position_size_pct",
            defaults.position_size_pct,
        ),
        stop_loss_pct: config.get_double("backtest", "stop_loss_pct", defaults.stop_loss_pct),
        take_profit_pct: config.get_double("backtest", "take_profit_pct", defaults.take_profit_pct),
    };

    if bt.initial_capital <= 0.0 {
        return Err(ZlmaError::invalid(
            "backtest",
            "initial_capital",
            "initial_capital must be positive",
        ));
    }
    if bt.position_size_pct <= 0.0 || bt.position_size_pct > 1.0 {
        return Err(ZlmaError::invalid(
            "backtest",
            "position_size_pct",
            "position_size_pct must be between 0 and 1",
        ));
    }
    if bt.stop_loss_pct < 0.0 {
        return Err(ZlmaError::invalid(
            "backtest",
            "stop_loss_pct",
            "stop_loss_pct must be non-negative",
        ));
    }
    if bt.take_profit_pct < 0.0 {
        return Err(ZlmaError::invalid(
            "backtest",
            "take_profit_pct",
            "take_profit_pct must be non-negative",
        ));
    }
    Ok(bt)
}

fn build_storage_config(config: &dyn ConfigPort) -> Result<StorageConfig, ZlmaError> {
    let backend = match config
        .get_string("storage", "backend")
        .map(|s| s.trim().to_lowercase())
        .as_deref()
    {
        None | Some("csv") => StorageBackend::Csv,
        Some("sqlite") => StorageBackend::Sqlite,
        Some(other) => {
            return Err(ZlmaError::invalid(
                "storage",
                "backend",
                format!("unknown backend {other:?} (expected csv or sqlite)"),
            ));
        }
    };

    let sqlite_path = config.get_string("sqlite", "path");
    if backend == StorageBackend::Sqlite && sqlite_path.is_none() {
        return Err(ZlmaError::ConfigMissing {
            section: "sqlite".into(),
            key: "path".into(),
        });
    }

    let pool_size = positive_u32(config, "sqlite", "pool_size", 4)?;

    Ok(StorageConfig {
        backend,
        data_dir: PathBuf::from(
            config
                .get_string("storage", "data_dir")
                .unwrap_or_else(|| "data".to_string()),
        ),
        signals_file: config
            .get_string("storage", "signals_file")
            .unwrap_or_else(|| "signals.csv".to_string()),
        backtest_file: config
            .get_string("storage", "backtest_file")
            .unwrap_or_else(|| "backtest_results.csv".to_string()),
        sqlite_path,
        sqlite_pool_size: pool_size,
    })
}
