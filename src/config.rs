use anyhow::{bail, Result};

use crate::model::{CostCategory, HealthBand, Sentiment, ServiceStatus};

pub const DEFAULT_ENDPOINT: &str = "https://script.google.com/macros/s/AKfycbwyA-59kaSfqKqJq3SjQBPIW7y5xNDvI31FT-bXs_GU9GbTx0ZKPB1rBaZ1mnIJ0zMV/exec";

/// Classification tables used by the normalizer.
#[derive(Debug, Clone, PartialEq)]
pub struct Policy {
    /// Service margin at or above which a service is excellent.
    pub service_excellent_pct: f64,
    /// Service margin at or above which a service is good.
    pub service_good_pct: f64,
    pub health_excellent: f64,
    pub health_good: f64,
    pub labor_ceiling_pct: Option<f64>,
    pub software_ceiling_pct: Option<f64>,
    pub materials_ceiling_pct: Option<f64>,
    /// Divisor applied to the annual opportunity when deriving potential profit.
    pub opportunity_periods: f64,
    pub positive_keywords: Vec<String>,
    pub warning_keywords: Vec<String>,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            service_excellent_pct: 35.0,
            service_good_pct: 20.0,
            health_excellent: 80.0,
            health_good: 60.0,
            labor_ceiling_pct: Some(45.0),
            software_ceiling_pct: Some(10.0),
            materials_ceiling_pct: Some(30.0),
            opportunity_periods: 12.0,
            positive_keywords: ["excellent", "strong", "healthy", "great"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            warning_keywords: ["need", "critical", "attention", "concern", "risk", "below", "exceed"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl Policy {
    /// Bands must be ordered so every margin lands in exactly one status.
    pub fn validate(&self) -> Result<()> {
        let bands = [
            self.service_excellent_pct,
            self.service_good_pct,
            self.health_excellent,
            self.health_good,
            self.opportunity_periods,
        ];
        if bands.iter().any(|b| !b.is_finite()) {
            bail!("policy bands must be finite numbers");
        }
        if self.service_excellent_pct < self.service_good_pct {
            bail!(
                "service bands out of order: excellent {} < good {}",
                self.service_excellent_pct,
                self.service_good_pct
            );
        }
        if self.health_excellent < self.health_good {
            bail!(
                "health bands out of order: excellent {} < good {}",
                self.health_excellent,
                self.health_good
            );
        }
        if self.opportunity_periods <= 0.0 {
            bail!("opportunity periods must be positive, got {}", self.opportunity_periods);
        }
        Ok(())
    }

    pub fn service_status(&self, margin_pct: f64) -> ServiceStatus {
        if margin_pct >= self.service_excellent_pct {
            ServiceStatus::Excellent
        } else if margin_pct >= self.service_good_pct {
            ServiceStatus::Good
        } else {
            ServiceStatus::Warning
        }
    }

    pub fn health_band(&self, score: f64) -> HealthBand {
        if score >= self.health_excellent {
            HealthBand::Excellent
        } else if score >= self.health_good {
            HealthBand::Good
        } else {
            HealthBand::NeedsAttention
        }
    }

    pub fn ceiling_pct(&self, category: CostCategory) -> Option<f64> {
        match category {
            CostCategory::Labor => self.labor_ceiling_pct,
            CostCategory::Software => self.software_ceiling_pct,
            CostCategory::Materials => self.materials_ceiling_pct,
            _ => None,
        }
    }

    /// Case-insensitive substring match; positive set wins over warning set.
    pub fn classify_text(&self, text: &str) -> Sentiment {
        let lower = text.to_lowercase();
        if self.positive_keywords.iter().any(|k| lower.contains(k.as_str())) {
            Sentiment::Positive
        } else if self.warning_keywords.iter().any(|k| lower.contains(k.as_str())) {
            Sentiment::Warning
        } else {
            Sentiment::Neutral
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub endpoint: String,
    pub policy: Policy,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let defaults = Policy::default();
        let policy = Policy {
            service_excellent_pct: env_f64("SERVICE_EXCELLENT_PCT", defaults.service_excellent_pct),
            service_good_pct: env_f64("SERVICE_GOOD_PCT", defaults.service_good_pct),
            labor_ceiling_pct: env_ceiling("LABOR_CEILING_PCT", defaults.labor_ceiling_pct),
            software_ceiling_pct: env_ceiling("SOFTWARE_CEILING_PCT", defaults.software_ceiling_pct),
            materials_ceiling_pct: env_ceiling("MATERIALS_CEILING_PCT", defaults.materials_ceiling_pct),
            opportunity_periods: env_f64("OPPORTUNITY_PERIODS", defaults.opportunity_periods),
            ..defaults
        };
        policy.validate()?;
        Ok(Self {
            endpoint: std::env::var("AUDIT_ENDPOINT").unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string()),
            policy,
        })
    }
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

// "none" disables a ceiling entirely
fn env_ceiling(key: &str, default: Option<f64>) -> Option<f64> {
    match std::env::var(key).as_deref() {
        Ok("none") => None,
        Ok(v) => v.parse().ok().or(default),
        Err(_) => default,
    }
}
