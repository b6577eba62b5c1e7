//! Raw upstream payloads and the schema adapter.
//!
//! The spreadsheet endpoint has shipped two shapes over time: a flat
//! dashboard record and a nested audit record. Both are translated here into
//! one [`AuditInput`] so the normalizer never has to look at raw JSON.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::model::{Action, CostBreakdown, CostCategory, ServiceStatus};

/// Parsed upstream body. Always a JSON object; contents unchecked.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawAuditPayload(Map<String, Value>);

impl RawAuditPayload {
    pub fn new(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Returns `None` unless the value is an object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaVariant {
    /// `companyName`, `expenses`, `costs{..}`, string findings.
    Dashboard,
    /// `businessName`, `financials{..}`, structured findings, `totalImpact`.
    Audit,
}

/// A payload tagged with the schema it was recognised as.
#[derive(Debug, Clone, Copy)]
pub enum UpstreamRecord<'a> {
    Dashboard(&'a Map<String, Value>),
    Audit {
        root: &'a Map<String, Value>,
        financials: Option<&'a Map<String, Value>>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceInput {
    pub name: String,
    pub revenue: f64,
    pub cost: f64,
    pub status: Option<ServiceStatus>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FindingInput {
    pub text: String,
    pub detail: Option<String>,
    pub type_tag: Option<String>,
}

/// Schema-independent view of one upstream record. Optional fields are
/// upstream claims the normalizer may use or override.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AuditInput {
    pub company_name: String,
    pub revenue: f64,
    pub expenses: Option<f64>,
    pub costs: CostBreakdown,
    pub net_profit: Option<f64>,
    pub target_margin: Option<f64>,
    pub potential_profit: Option<f64>,
    pub total_opportunity: Option<f64>,
    pub health_score: Option<f64>,
    pub opportunity_periods: Option<f64>,
    pub services: Vec<ServiceInput>,
    pub actions: Vec<Action>,
    pub findings: Vec<FindingInput>,
    pub audit_date: Option<String>,
}

impl<'a> UpstreamRecord<'a> {
    pub fn detect(raw: &'a RawAuditPayload) -> Self {
        let root = raw.as_map();
        let financials = root.get("financials").and_then(Value::as_object);
        if financials.is_some() || root.contains_key("businessName") {
            UpstreamRecord::Audit { root, financials }
        } else {
            UpstreamRecord::Dashboard(root)
        }
    }

    pub fn variant(&self) -> SchemaVariant {
        match self {
            UpstreamRecord::Dashboard(_) => SchemaVariant::Dashboard,
            UpstreamRecord::Audit { .. } => SchemaVariant::Audit,
        }
    }

    pub fn adapt(&self) -> AuditInput {
        match *self {
            UpstreamRecord::Dashboard(root) => AuditInput {
                company_name: text_field(root, &["companyName", "businessName", "name"])
                    .unwrap_or_default(),
                revenue: num_field(root, &["revenue"]).unwrap_or(0.0),
                expenses: num_field(root, &["expenses", "totalExpenses"]),
                costs: read_costs(
                    object_field(root, &["costs", "costBreakdown"]).unwrap_or(root),
                ),
                net_profit: num_field(root, &["netProfit"]),
                target_margin: num_field(root, &["targetMargin"]),
                potential_profit: num_field(root, &["potentialProfit"]),
                total_opportunity: num_field(root, &["totalOpportunity", "totalImpact"]),
                health_score: num_field(root, &["healthScore"]),
                opportunity_periods: read_period(root),
                services: read_services(root),
                actions: read_actions(root),
                findings: read_findings(root),
                audit_date: text_field(root, &["auditDate", "date"]),
            },
            UpstreamRecord::Audit { root, financials } => {
                // financial figures prefer the nested block, then the root
                let fin = |keys: &[&str]| {
                    financials
                        .and_then(|f| num_field(f, keys))
                        .or_else(|| num_field(root, keys))
                };
                let cost_source = object_field(root, &["costBreakdown", "expenseBreakdown", "costs"])
                    .or_else(|| {
                        financials.and_then(|f| {
                            object_field(f, &["costBreakdown", "expenseBreakdown", "costs"])
                        })
                    })
                    .or_else(|| financials.filter(|f| has_any_cost_key(f)))
                    .unwrap_or(root);
                AuditInput {
                    company_name: text_field(root, &["businessName", "companyName", "name"])
                        .unwrap_or_default(),
                    revenue: fin(&["revenue", "totalRevenue"]).unwrap_or(0.0),
                    expenses: fin(&["totalExpenses", "expenses"]),
                    costs: read_costs(cost_source),
                    net_profit: fin(&["netProfit"]),
                    target_margin: fin(&["targetMargin"]),
                    potential_profit: fin(&["potentialProfit"]),
                    total_opportunity: num_field(root, &["totalImpact", "totalOpportunity"]),
                    health_score: num_field(root, &["healthScore"]),
                    opportunity_periods: read_period(root),
                    services: read_services(root),
                    actions: read_actions(root),
                    findings: read_findings(root),
                    audit_date: text_field(root, &["auditDate", "date"]),
                }
            }
        }
    }
}

// =============================================================================
// Lenient field readers
// =============================================================================

/// Reads a number that may arrive as a JSON number or as spreadsheet text
/// like `"$12,500"` or `"34.5%"`.
pub fn lenient_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let cleaned: String = s
                .trim()
                .chars()
                .filter(|c| !matches!(c, '$' | ',' | '%' | ' '))
                .collect();
            if cleaned.is_empty() {
                return None;
            }
            cleaned.parse::<f64>().ok()?
        }
        _ => return None,
    };
    n.is_finite().then_some(n)
}

fn num_field(map: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| map.get(*k).and_then(lenient_number))
}

fn text_field(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match map.get(*k)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn object_field<'m>(map: &'m Map<String, Value>, keys: &[&str]) -> Option<&'m Map<String, Value>> {
    keys.iter().find_map(|k| map.get(*k).and_then(Value::as_object))
}

fn list_field<'m>(map: &'m Map<String, Value>, key: &str) -> &'m [Value] {
    map.get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn has_any_cost_key(map: &Map<String, Value>) -> bool {
    CostCategory::ALL
        .iter()
        .flat_map(|c| c.upstream_keys().iter())
        .any(|k| map.contains_key(*k))
}

fn read_costs(source: &Map<String, Value>) -> CostBreakdown {
    let mut costs = CostBreakdown::default();
    for category in CostCategory::ALL {
        let value = num_field(source, category.upstream_keys()).unwrap_or(0.0);
        costs.set(category, value);
    }
    costs
}

fn read_period(root: &Map<String, Value>) -> Option<f64> {
    let period = text_field(root, &["reportingPeriod", "period"])?;
    match period.to_ascii_lowercase().as_str() {
        "annual" | "annually" | "yearly" | "year" => Some(1.0),
        "monthly" | "month" => Some(12.0),
        _ => None,
    }
}

fn read_services(root: &Map<String, Value>) -> Vec<ServiceInput> {
    list_field(root, "services")
        .iter()
        .filter_map(Value::as_object)
        .map(|s| ServiceInput {
            name: text_field(s, &["name", "service", "title"]).unwrap_or_default(),
            revenue: num_field(s, &["revenue"]).unwrap_or(0.0),
            cost: num_field(s, &["cost", "costs", "expenses"]).unwrap_or(0.0),
            status: s.get("status").and_then(Value::as_str).and_then(ServiceStatus::parse),
        })
        .collect()
}

fn read_actions(root: &Map<String, Value>) -> Vec<Action> {
    list_field(root, "actions")
        .iter()
        .filter_map(|entry| match entry {
            Value::Object(a) => Some(Action {
                title: text_field(a, &["title", "action", "name"]).unwrap_or_default(),
                description: text_field(a, &["description", "details"]).unwrap_or_default(),
                annual_impact: num_field(a, &["annualImpact", "impact", "annual_impact"])
                    .unwrap_or(0.0),
                timeline: text_field(a, &["timeline", "timeframe"]).unwrap_or_default(),
            }),
            Value::String(title) if !title.trim().is_empty() => Some(Action {
                title: title.trim().to_string(),
                description: String::new(),
                annual_impact: 0.0,
                timeline: String::new(),
            }),
            _ => None,
        })
        .collect()
}

fn read_findings(root: &Map<String, Value>) -> Vec<FindingInput> {
    list_field(root, "findings")
        .iter()
        .filter_map(|entry| match entry {
            Value::String(text) if !text.trim().is_empty() => Some(FindingInput {
                text: text.trim().to_string(),
                detail: None,
                type_tag: None,
            }),
            Value::Object(f) => {
                let title = text_field(f, &["title", "text", "finding"]);
                let description = text_field(f, &["description", "detail"]);
                let (text, detail) = match (title, description) {
                    (Some(t), d) => (t, d),
                    (None, Some(d)) => (d, None),
                    (None, None) => return None,
                };
                Some(FindingInput {
                    text,
                    detail,
                    type_tag: text_field(f, &["type", "sentiment"]),
                })
            }
            _ => None,
        })
        .collect()
}
