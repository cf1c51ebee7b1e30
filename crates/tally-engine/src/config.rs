//! # Engine Configuration

use std::time::Duration;

use tally_core::validation::validate_tax_rate_bps;
use tally_core::{TaxRate, ValidationError, DEFAULT_TAX_RATE, LOYALTY_POINTS_PER_SALE};

/// Default bound on a single engine operation.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(5);

/// Tunables of the sale engine.
///
/// ## Example
/// ```rust
/// use std::time::Duration;
/// use tally_core::TaxRate;
/// use tally_engine::EngineConfig;
///
/// let config = EngineConfig::default()
///     .tax_rate(TaxRate::from_bps(800))
///     .operation_timeout(Duration::from_secs(2));
/// assert_eq!(config.loyalty_points_per_sale, 10);
/// ```
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Applied to the subtotal of every new sale.
    pub tax_rate: TaxRate,

    /// Credited to the customer after each sale that names one.
    pub loyalty_points_per_sale: i64,

    /// Upper bound for create / update / get / list.
    pub operation_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            tax_rate: DEFAULT_TAX_RATE,
            loyalty_points_per_sale: LOYALTY_POINTS_PER_SALE,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
        }
    }
}

impl EngineConfig {
    pub fn tax_rate(mut self, rate: TaxRate) -> Self {
        self.tax_rate = rate;
        self
    }

    pub fn loyalty_points_per_sale(mut self, points: i64) -> Self {
        self.loyalty_points_per_sale = points;
        self
    }

    pub fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Checks the values before an engine is built from them.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_tax_rate_bps(self.tax_rate.bps())?;
        if self.loyalty_points_per_sale < 0 {
            return Err(ValidationError::Negative {
                field: "loyalty_points_per_sale".to_string(),
            });
        }
        if self.operation_timeout.is_zero() {
            return Err(ValidationError::MustBePositive {
                field: "operation_timeout".to_string(),
            });
        }
        Ok(())
    }
}
