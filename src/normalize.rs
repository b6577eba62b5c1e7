//! Builds the canonical [`AuditViewModel`] from an upstream payload.
//!
//! `normalize` is total: any payload the fetcher accepted produces a
//! view-model. Profit and margin are always recomputed from revenue and
//! expenses; upstream totals are only compared and logged.

use crate::config::Policy;
use crate::logging::{log, log_upstream_mismatch, obj, v_num, v_str, Domain, Level, TimedScope};
use crate::model::{AuditViewModel, CostCategory, CostLine, Finding, Sentiment, Service};
use crate::payload::{AuditInput, FindingInput, RawAuditPayload, ServiceInput, UpstreamRecord};

const MISMATCH_TOLERANCE: f64 = 0.5;

pub fn normalize(raw: &RawAuditPayload, policy: &Policy) -> AuditViewModel {
    let _timing = TimedScope::new(Domain::Normalize, "normalize");
    let record = UpstreamRecord::detect(raw);
    let input = record.adapt();
    let model = build_view_model(&input, policy);
    log(
        Level::Info,
        Domain::Normalize,
        "view_model",
        obj(&[
            ("company", v_str(&model.company_name)),
            ("schema", serde_json::to_value(record.variant()).unwrap_or_default()),
            ("revenue", v_num(model.revenue)),
            ("net_profit", v_num(model.net_profit)),
            ("health_score", v_num(model.health_score)),
        ]),
    );
    model
}

/// Percentage with a zero guard on the denominator.
pub fn pct(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator * 100.0
    } else {
        0.0
    }
}

fn non_negative(v: f64) -> f64 {
    if v.is_finite() && v > 0.0 {
        v
    } else {
        0.0
    }
}

pub fn build_view_model(input: &AuditInput, policy: &Policy) -> AuditViewModel {
    let revenue = non_negative(input.revenue);

    let mut costs = input.costs;
    for category in CostCategory::ALL {
        costs.set(category, non_negative(costs.get(category)));
    }
    // breakdown must never exceed the total
    let total_expenses = non_negative(input.expenses.unwrap_or(0.0)).max(costs.total());

    let net_profit = revenue - total_expenses;
    let current_margin_pct = pct(net_profit, revenue);
    if let Some(upstream) = input.net_profit {
        if (upstream - net_profit).abs() > MISMATCH_TOLERANCE {
            log_upstream_mismatch("netProfit", upstream, net_profit);
        }
    }

    let cost_lines = CostCategory::ALL
        .iter()
        .map(|&category| {
            let amount = costs.get(category);
            let share_of_expenses_pct = pct(amount, total_expenses);
            let ceiling_pct = policy.ceiling_pct(category);
            CostLine {
                category,
                amount,
                share_of_expenses_pct,
                share_of_revenue_pct: pct(amount, revenue),
                ceiling_pct,
                over_threshold: ceiling_pct.map_or(false, |c| share_of_expenses_pct > c),
            }
        })
        .collect();

    let services = input.services.iter().map(|s| build_service(s, policy)).collect();
    let actions = input.actions.clone();

    let total_opportunity: f64 = actions.iter().map(|a| a.annual_impact).sum();
    if let Some(upstream) = input.total_opportunity {
        if (upstream - total_opportunity).abs() > MISMATCH_TOLERANCE {
            log_upstream_mismatch("totalOpportunity", upstream, total_opportunity);
        }
    }

    let periods = input
        .opportunity_periods
        .unwrap_or(policy.opportunity_periods)
        .max(1.0);
    let (potential_profit, target_margin_pct) = match (input.potential_profit, input.target_margin) {
        (Some(p), Some(t)) => (p, t),
        (Some(p), None) => (p, pct(p, revenue)),
        (None, Some(t)) => (revenue * t / 100.0, t),
        (None, None) => {
            let p = net_profit + total_opportunity / periods;
            (p, pct(p, revenue))
        }
    };

    let health_score = match input.health_score {
        Some(score) => score.clamp(0.0, 100.0),
        None if target_margin_pct > 0.0 => {
            (current_margin_pct / target_margin_pct * 100.0).clamp(0.0, 100.0)
        }
        None => 0.0,
    };

    AuditViewModel {
        company_name: input.company_name.clone(),
        revenue,
        total_expenses,
        cost_breakdown: costs,
        cost_lines,
        net_profit,
        current_margin_pct,
        target_margin_pct,
        potential_profit,
        profit_increase: potential_profit - net_profit,
        services,
        actions,
        findings: input.findings.iter().map(|f| classify_finding(f, policy)).collect(),
        total_opportunity,
        health_score,
        health_band: policy.health_band(health_score),
        audit_date: input.audit_date.clone(),
    }
}

fn build_service(input: &ServiceInput, policy: &Policy) -> Service {
    let revenue = non_negative(input.revenue);
    let cost = non_negative(input.cost);
    let margin_pct = pct(revenue - cost, revenue);
    Service {
        name: input.name.clone(),
        revenue,
        cost,
        margin_pct,
        status: input
            .status
            .unwrap_or_else(|| policy.service_status(margin_pct)),
    }
}

pub fn classify_finding(input: &FindingInput, policy: &Policy) -> Finding {
    let sentiment = input
        .type_tag
        .as_deref()
        .and_then(Sentiment::from_type_tag)
        .unwrap_or_else(|| match &input.detail {
            Some(detail) => policy.classify_text(&format!("{} {}", input.text, detail)),
            None => policy.classify_text(&input.text),
        });
    Finding {
        text: input.text.clone(),
        detail: input.detail.clone(),
        sentiment,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CostBreakdown, ServiceStatus};

    fn input_with_costs(revenue: f64, costs: CostBreakdown) -> AuditInput {
        AuditInput {
            revenue,
            costs,
            ..Default::default()
        }
    }

    #[test]
    fn pct_guards_zero_denominator() {
        assert_eq!(pct(5.0, 0.0), 0.0);
        assert_eq!(pct(5.0, -1.0), 0.0);
        assert_eq!(pct(1.0, 4.0), 25.0);
    }

    #[test]
    fn expenses_never_below_itemized_sum() {
        let mut input = input_with_costs(
            1000.0,
            CostBreakdown {
                labor: 300.0,
                other: 200.0,
                ..Default::default()
            },
        );
        input.expenses = Some(400.0);
        let vm = build_view_model(&input, &Policy::default());
        assert_eq!(vm.total_expenses, 500.0);

        input.expenses = Some(800.0);
        let vm = build_view_model(&input, &Policy::default());
        assert_eq!(vm.total_expenses, 800.0);
        assert_eq!(vm.net_profit, 200.0);
    }

    #[test]
    fn negative_values_clamp_to_zero() {
        let mut input = input_with_costs(
            -10.0,
            CostBreakdown {
                software: -5.0,
                ..Default::default()
            },
        );
        input.expenses = Some(-3.0);
        let vm = build_view_model(&input, &Policy::default());
        assert_eq!(vm.revenue, 0.0);
        assert_eq!(vm.total_expenses, 0.0);
        assert_eq!(vm.cost_breakdown.software, 0.0);
        assert_eq!(vm.current_margin_pct, 0.0);
    }

    #[test]
    fn upstream_status_wins_over_bands() {
        let input = AuditInput {
            services: vec![
                ServiceInput {
                    name: "Repairs".into(),
                    revenue: 100.0,
                    cost: 90.0,
                    status: Some(ServiceStatus::Excellent),
                },
                ServiceInput {
                    name: "Installs".into(),
                    revenue: 100.0,
                    cost: 70.0,
                    status: None,
                },
            ],
            ..Default::default()
        };
        let vm = build_view_model(&input, &Policy::default());
        assert_eq!(vm.services[0].status, ServiceStatus::Excellent);
        assert!((vm.services[1].margin_pct - 30.0).abs() < 1e-9);
        assert_eq!(vm.services[1].status, ServiceStatus::Good);
    }

    #[test]
    fn potential_profit_amortizes_opportunity() {
        let mut input = input_with_costs(
            120_000.0,
            CostBreakdown {
                labor: 100_000.0,
                ..Default::default()
            },
        );
        input.actions = vec![crate::model::Action {
            title: "Raise prices".into(),
            description: String::new(),
            annual_impact: 24_000.0,
            timeline: "30 days".into(),
        }];
        let vm = build_view_model(&input, &Policy::default());
        assert_eq!(vm.net_profit, 20_000.0);
        assert_eq!(vm.potential_profit, 22_000.0);
        assert_eq!(vm.profit_increase, 2_000.0);

        input.opportunity_periods = Some(1.0);
        let vm = build_view_model(&input, &Policy::default());
        assert_eq!(vm.potential_profit, 44_000.0);
        assert!((vm.target_margin_pct - 44_000.0 / 120_000.0 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn upstream_potential_and_target_used_verbatim() {
        let mut input = input_with_costs(100.0, CostBreakdown::default());
        input.potential_profit = Some(77.0);
        input.target_margin = Some(41.5);
        let vm = build_view_model(&input, &Policy::default());
        assert_eq!(vm.potential_profit, 77.0);
        assert_eq!(vm.target_margin_pct, 41.5);
        assert_eq!(vm.profit_increase, 77.0 - 100.0);
    }

    #[test]
    fn only_target_supplied_derives_potential() {
        let mut input = input_with_costs(200.0, CostBreakdown::default());
        input.target_margin = Some(25.0);
        let vm = build_view_model(&input, &Policy::default());
        assert_eq!(vm.potential_profit, 50.0);
    }

    #[test]
    fn health_score_derived_and_clamped() {
        let mut input = input_with_costs(
            100.0,
            CostBreakdown {
                labor: 80.0,
                ..Default::default()
            },
        );
        input.target_margin = Some(40.0);
        let vm = build_view_model(&input, &Policy::default());
        assert_eq!(vm.health_score, 50.0);
        assert_eq!(vm.health_band, crate::model::HealthBand::NeedsAttention);

        input.health_score = Some(140.0);
        let vm = build_view_model(&input, &Policy::default());
        assert_eq!(vm.health_score, 100.0);
        assert_eq!(vm.health_band, crate::model::HealthBand::Excellent);
    }

    #[test]
    fn explicit_type_beats_keywords() {
        let f = FindingInput {
            text: "Excellent retention".into(),
            detail: None,
            type_tag: Some("warning".into()),
        };
        assert_eq!(classify_finding(&f, &Policy::default()).sentiment, Sentiment::Warning);

        let f = FindingInput {
            text: "Labor".into(),
            detail: Some("Needs review".into()),
            type_tag: Some("unknown".into()),
        };
        assert_eq!(classify_finding(&f, &Policy::default()).sentiment, Sentiment::Warning);
    }

    #[test]
    fn zero_expenses_flags_nothing() {
        let vm = build_view_model(&input_with_costs(100.0, CostBreakdown::default()), &Policy::default());
        assert!(vm.flagged_categories().is_empty());
        assert!(vm.cost_lines.iter().all(|l| l.share_of_expenses_pct == 0.0));
    }
}
