//! Runtime configuration structs. Following the teacher's "cold path"
//! runtime-config convention: one sub-struct per concern, `Decimal`/String
//! fields with `#[serde(default = "...")]`, loaded from TOML. Recognizes
//! exactly the option names spec §6 enumerates.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub order_manager: OrderManagerConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub settlement: SettlementConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            order_manager: OrderManagerConfig::default(),
            execution: ExecutionConfig::default(),
            settlement: SettlementConfig::default(),
            analytics: AnalyticsConfig::default(),
            monitoring: MonitoringConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderManagerConfig {
    #[serde(default = "default_order_types")]
    pub supported_order_types: Vec<String>,
    #[serde(default = "default_min_order_size")]
    pub min_order_size: Decimal,
    #[serde(default = "default_max_order_size")]
    pub max_order_size: Decimal,
    #[serde(default = "default_max_orders_per_user")]
    pub max_orders_per_user: usize,
    #[serde(default = "default_order_expiry_hours")]
    pub order_expiry_hours: u64,
    #[serde(default = "default_slippage_tolerance")]
    pub slippage_tolerance: Decimal,
    #[serde(default = "default_slippage_buffer")]
    pub market_order_slippage_buffer: Decimal,
    #[serde(default = "default_commission_rate")]
    pub commission_rate: Decimal,
    #[serde(default = "default_expiry_sweep_secs")]
    pub expiry_sweep_interval_secs: u64,
}

impl Default for OrderManagerConfig {
    fn default() -> Self {
        Self {
            supported_order_types: default_order_types(),
            min_order_size: default_min_order_size(),
            max_order_size: default_max_order_size(),
            max_orders_per_user: default_max_orders_per_user(),
            order_expiry_hours: default_order_expiry_hours(),
            slippage_tolerance: default_slippage_tolerance(),
            market_order_slippage_buffer: default_slippage_buffer(),
            commission_rate: default_commission_rate(),
            expiry_sweep_interval_secs: default_expiry_sweep_secs(),
        }
    }
}

fn default_order_types() -> Vec<String> {
    vec![
        "market".into(),
        "limit".into(),
        "stop".into(),
        "stop_limit".into(),
        "trailing_stop".into(),
    ]
}
fn default_min_order_size() -> Decimal {
    Decimal::new(1, 0)
}
fn default_max_order_size() -> Decimal {
    Decimal::new(10_000_000, 0)
}
fn default_max_orders_per_user() -> usize {
    200
}
fn default_order_expiry_hours() -> u64 {
    24
}
fn default_slippage_tolerance() -> Decimal {
    Decimal::new(5, 3) // 0.005
}
fn default_slippage_buffer() -> Decimal {
    Decimal::new(5, 3) // 0.005, used for market-order reservation estimate
}
fn default_commission_rate() -> Decimal {
    Decimal::new(1, 3) // 0.001 = 0.1%
}
fn default_expiry_sweep_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default = "default_execution_algorithms")]
    pub execution_algorithms: Vec<String>,
    #[serde(default = "default_max_slippage")]
    pub max_slippage: Decimal,
    #[serde(default = "default_execution_timeout_secs")]
    pub execution_timeout_secs: u64,
    #[serde(default = "default_price_improvement_threshold")]
    pub price_improvement_threshold: Decimal,
    #[serde(default = "default_true")]
    pub enable_smart_routing: bool,
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_max_partial_fills")]
    pub max_partial_fills: u32,
    #[serde(default = "default_participation_rate")]
    pub participation_rate: Decimal,
    #[serde(default = "default_expected_period_volume")]
    pub pov_expected_period_volume: Decimal,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            execution_algorithms: default_execution_algorithms(),
            max_slippage: default_max_slippage(),
            execution_timeout_secs: default_execution_timeout_secs(),
            price_improvement_threshold: default_price_improvement_threshold(),
            enable_smart_routing: true,
            tick_interval_ms: default_tick_interval_ms(),
            max_partial_fills: default_max_partial_fills(),
            participation_rate: default_participation_rate(),
            pov_expected_period_volume: default_expected_period_volume(),
        }
    }
}

fn default_execution_algorithms() -> Vec<String> {
    vec!["TWAP".into(), "VWAP".into(), "IS".into(), "POV".into(), "MM".into()]
}
fn default_max_slippage() -> Decimal {
    Decimal::new(5, 3) // 0.005
}
fn default_execution_timeout_secs() -> u64 {
    30
}
fn default_price_improvement_threshold() -> Decimal {
    Decimal::new(1, 4) // 1 pip for a 5dp pair
}
fn default_tick_interval_ms() -> u64 {
    100
}
fn default_max_partial_fills() -> u32 {
    3
}
fn default_participation_rate() -> Decimal {
    Decimal::new(1, 1) // 0.1, POV participation rate
}
fn default_expected_period_volume() -> Decimal {
    Decimal::new(1_000_000, 0)
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementConfig {
    #[serde(default = "default_settlement_cycles")]
    pub supported_settlement_cycles: Vec<String>,
    #[serde(default = "default_settlement_cycle")]
    pub default_settlement_cycle: String,
    #[serde(default)]
    pub cycle_overrides: std::collections::HashMap<String, String>,
    #[serde(default = "default_true")]
    pub enable_netting: bool,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
    #[serde(default = "default_max_settlement_amount")]
    pub max_settlement_amount: Decimal,
    #[serde(default = "default_processor_tick_secs")]
    pub processor_tick_interval_secs: u64,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            supported_settlement_cycles: default_settlement_cycles(),
            default_settlement_cycle: default_settlement_cycle(),
            cycle_overrides: [("USD/CAD".to_string(), "T+1".to_string())]
                .into_iter()
                .collect(),
            enable_netting: true,
            retry_attempts: default_retry_attempts(),
            retry_delay_secs: default_retry_delay_secs(),
            max_settlement_amount: default_max_settlement_amount(),
            processor_tick_interval_secs: default_processor_tick_secs(),
        }
    }
}

fn default_settlement_cycles() -> Vec<String> {
    vec!["T+0".into(), "T+1".into(), "T+2".into()]
}
fn default_settlement_cycle() -> String {
    "T+2".into()
}
fn default_retry_attempts() -> u32 {
    3
}
fn default_retry_delay_secs() -> u64 {
    30
}
fn default_max_settlement_amount() -> Decimal {
    Decimal::new(100_000_000, 0)
}
fn default_processor_tick_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    #[serde(default = "default_base_currency")]
    pub base_currency: String,
    #[serde(default = "default_pnl_interval_secs")]
    pub pnl_calculation_interval_secs: u64,
    #[serde(default = "default_reporting_currencies")]
    pub reporting_currencies: Vec<String>,
    #[serde(default = "default_true")]
    pub risk_metrics_enabled: bool,
    #[serde(default = "default_rate_validity_secs")]
    pub rate_validity_period_secs: u64,
    #[serde(default = "default_var_threshold")]
    pub var95_alert_threshold: Decimal,
    #[serde(default = "default_concentration_threshold")]
    pub concentration_alert_threshold: Decimal,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            base_currency: default_base_currency(),
            pnl_calculation_interval_secs: default_pnl_interval_secs(),
            reporting_currencies: default_reporting_currencies(),
            risk_metrics_enabled: true,
            rate_validity_period_secs: default_rate_validity_secs(),
            var95_alert_threshold: default_var_threshold(),
            concentration_alert_threshold: default_concentration_threshold(),
        }
    }
}

fn default_base_currency() -> String {
    "USD".into()
}
fn default_pnl_interval_secs() -> u64 {
    60
}
fn default_reporting_currencies() -> Vec<String> {
    vec!["USD".into(), "EUR".into(), "GBP".into(), "JPY".into()]
}
fn default_rate_validity_secs() -> u64 {
    60
}
fn default_var_threshold() -> Decimal {
    Decimal::new(100_000, 0)
}
fn default_concentration_threshold() -> Decimal {
    Decimal::new(60, 2) // 0.60 Herfindahl
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    #[serde(default = "default_true")]
    pub enable_prometheus: bool,
    #[serde(default = "default_metrics_addr")]
    pub metrics_addr: String,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enable_prometheus: true,
            metrics_addr: default_metrics_addr(),
        }
    }
}

fn default_metrics_addr() -> String {
    "127.0.0.1:9090".into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = Config::default();
        let serialized = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.order_manager.max_orders_per_user, config.order_manager.max_orders_per_user);
    }
}
