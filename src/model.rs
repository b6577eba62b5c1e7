//! The canonical view-model handed to the presentation layer.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CostCategory {
    Materials,
    Labor,
    Marketing,
    Software,
    RentUtilities,
    Other,
}

impl CostCategory {
    pub const ALL: [CostCategory; 6] = [
        CostCategory::Materials,
        CostCategory::Labor,
        CostCategory::Marketing,
        CostCategory::Software,
        CostCategory::RentUtilities,
        CostCategory::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CostCategory::Materials => "materials",
            CostCategory::Labor => "labor",
            CostCategory::Marketing => "marketing",
            CostCategory::Software => "software",
            CostCategory::RentUtilities => "rentUtilities",
            CostCategory::Other => "other",
        }
    }

    /// Upstream keys accepted for this category, canonical key first.
    pub fn upstream_keys(&self) -> &'static [&'static str] {
        match self {
            CostCategory::Materials => &["materials"],
            CostCategory::Labor => &["labor", "labour"],
            CostCategory::Marketing => &["marketing"],
            CostCategory::Software => &["software"],
            CostCategory::RentUtilities => &["rentUtilities", "rent_utilities", "rent"],
            CostCategory::Other => &["other"],
        }
    }
}

/// Itemized costs over the fixed category set. Every value is >= 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostBreakdown {
    pub materials: f64,
    pub labor: f64,
    pub marketing: f64,
    pub software: f64,
    pub rent_utilities: f64,
    pub other: f64,
}

impl CostBreakdown {
    pub fn get(&self, category: CostCategory) -> f64 {
        match category {
            CostCategory::Materials => self.materials,
            CostCategory::Labor => self.labor,
            CostCategory::Marketing => self.marketing,
            CostCategory::Software => self.software,
            CostCategory::RentUtilities => self.rent_utilities,
            CostCategory::Other => self.other,
        }
    }

    pub fn set(&mut self, category: CostCategory, value: f64) {
        let slot = match category {
            CostCategory::Materials => &mut self.materials,
            CostCategory::Labor => &mut self.labor,
            CostCategory::Marketing => &mut self.marketing,
            CostCategory::Software => &mut self.software,
            CostCategory::RentUtilities => &mut self.rent_utilities,
            CostCategory::Other => &mut self.other,
        };
        *slot = value;
    }

    pub fn total(&self) -> f64 {
        CostCategory::ALL.iter().map(|c| self.get(*c)).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostLine {
    pub category: CostCategory,
    pub amount: f64,
    pub share_of_expenses_pct: f64,
    pub share_of_revenue_pct: f64,
    pub ceiling_pct: Option<f64>,
    pub over_threshold: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Excellent,
    Good,
    Warning,
}

impl ServiceStatus {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "excellent" => Some(ServiceStatus::Excellent),
            "good" => Some(ServiceStatus::Good),
            "warning" => Some(ServiceStatus::Warning),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub name: String,
    pub revenue: f64,
    pub cost: f64,
    pub margin_pct: f64,
    pub status: ServiceStatus,
}

/// A recommended step. Sequence order is priority order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub title: String,
    pub description: String,
    pub annual_impact: f64,
    pub timeline: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Warning,
    Neutral,
}

impl Sentiment {
    /// Map an explicit upstream finding type onto a sentiment.
    pub fn from_type_tag(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "positive" | "success" | "strength" | "win" => Some(Sentiment::Positive),
            "warning" | "concern" | "critical" | "risk" | "negative" => Some(Sentiment::Warning),
            "neutral" | "info" => Some(Sentiment::Neutral),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub sentiment: Sentiment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HealthBand {
    Excellent,
    Good,
    NeedsAttention,
}

impl HealthBand {
    pub fn label(&self) -> &'static str {
        match self {
            HealthBand::Excellent => "Excellent",
            HealthBand::Good => "Good",
            HealthBand::NeedsAttention => "Needs Attention",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditViewModel {
    pub company_name: String,
    pub revenue: f64,
    pub total_expenses: f64,
    pub cost_breakdown: CostBreakdown,
    pub cost_lines: Vec<CostLine>,
    pub net_profit: f64,
    pub current_margin_pct: f64,
    pub target_margin_pct: f64,
    pub potential_profit: f64,
    pub profit_increase: f64,
    pub services: Vec<Service>,
    pub actions: Vec<Action>,
    pub findings: Vec<Finding>,
    pub total_opportunity: f64,
    pub health_score: f64,
    pub health_band: HealthBand,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit_date: Option<String>,
}

impl AuditViewModel {
    pub fn to_json_bytes(&self) -> Vec<u8> {
        // f64 fields are always finite, so serialization cannot fail
        serde_json::to_vec(self).unwrap_or_default()
    }

    /// SHA-256 over the canonical JSON encoding.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.to_json_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn flagged_categories(&self) -> Vec<CostCategory> {
        self.cost_lines
            .iter()
            .filter(|l| l.over_threshold)
            .map(|l| l.category)
            .collect()
    }
}
