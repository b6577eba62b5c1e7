//! Report shell: runs one load for a page query string and prints the
//! view-model as JSON on stdout.
//!
//! Usage: profitaudit [QUERY]    e.g. `profitaudit "?client=acme"`

use anyhow::{Context, Result};
use profitaudit::logging::{log, obj, v_str, Domain, Level};
use profitaudit::{Config, HttpAuditSource, LoadOutcome, ReportQuery, ReportSession};

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env().context("invalid report configuration")?;
    let query = ReportQuery::from_query_string(&std::env::args().nth(1).unwrap_or_default());
    log(
        Level::Info,
        Domain::System,
        "startup",
        obj(&[("endpoint", v_str(&cfg.endpoint))]),
    );

    let session = ReportSession::new(HttpAuditSource::new(cfg.endpoint.clone()), cfg.policy.clone());
    match session.load(&query).await {
        LoadOutcome::Published(model) => {
            let out = serde_json::to_string_pretty(&*model)
                .context("failed to encode view-model")?;
            println!("{}", out);
            Ok(())
        }
        LoadOutcome::Failed(err) => {
            eprintln!("Unable to Load Data: {}", err);
            std::process::exit(1);
        }
        LoadOutcome::Superseded { .. } => Ok(()),
    }
}
