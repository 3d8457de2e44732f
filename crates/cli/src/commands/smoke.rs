use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use staffflow_core::config::{AppConfig, LoadOptions};
use staffflow_core::{
    Actor, AgreementCombination, AgreementTerms, ApplicationError, CallContext, Candidate,
    LocationType, MemberSlot, RequestSpec, RequestType, StaticAgreementCatalog,
    StaticCandidateSource, WorkflowService,
};
use staffflow_db::{connect_with_config, migrations, InMemoryWorkflowStore};

use crate::commands::{current_thread_runtime, escape_json, CommandResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum SmokeStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct SmokeCheck {
    name: &'static str,
    status: SmokeStatus,
    elapsed_ms: u64,
    message: String,
}

#[derive(Debug, Serialize)]
struct SmokeReport {
    command: &'static str,
    status: SmokeStatus,
    summary: String,
    total_elapsed_ms: u64,
    checks: Vec<SmokeCheck>,
}

pub fn run() -> CommandResult {
    let started = Instant::now();
    let mut checks = Vec::new();

    let config = match timed_check(|| AppConfig::load(LoadOptions::default())) {
        Ok((elapsed_ms, config)) => {
            checks.push(SmokeCheck {
                name: "config_validation",
                status: SmokeStatus::Pass,
                elapsed_ms,
                message: "configuration loaded and validated".to_string(),
            });
            config
        }
        Err((elapsed_ms, error)) => {
            checks.push(SmokeCheck {
                name: "config_validation",
                status: SmokeStatus::Fail,
                elapsed_ms,
                message: error.to_string(),
            });
            checks.push(skipped("db_connectivity"));
            checks.push(skipped("migration_visibility"));
            checks.push(skipped("workflow_lifecycle"));
            return finalize_report(checks, elapsed_since(started));
        }
    };

    let runtime = match current_thread_runtime() {
        Ok(runtime) => runtime,
        Err(error) => {
            checks.push(SmokeCheck {
                name: "db_connectivity",
                status: SmokeStatus::Fail,
                elapsed_ms: 0,
                message: format!("failed to initialize async runtime: {error}"),
            });
            checks.push(skipped("migration_visibility"));
            checks.push(skipped("workflow_lifecycle"));
            return finalize_report(checks, elapsed_since(started));
        }
    };

    let db_started = Instant::now();
    let pool = match runtime.block_on(connect_with_config(&config.database)) {
        Ok(pool) => {
            checks.push(SmokeCheck {
                name: "db_connectivity",
                status: SmokeStatus::Pass,
                elapsed_ms: elapsed_since(db_started),
                message: format!("connected using `{}`", config.database.url),
            });
            pool
        }
        Err(error) => {
            checks.push(SmokeCheck {
                name: "db_connectivity",
                status: SmokeStatus::Fail,
                elapsed_ms: elapsed_since(db_started),
                message: format!("failed to connect: {error}"),
            });
            checks.push(skipped("migration_visibility"));
            checks.push(skipped("workflow_lifecycle"));
            return finalize_report(checks, elapsed_since(started));
        }
    };

    let migration_started = Instant::now();
    let migration_result = runtime.block_on(migrations::run_pending(&pool));
    runtime.block_on(pool.close());

    match migration_result {
        Ok(()) => checks.push(SmokeCheck {
            name: "migration_visibility",
            status: SmokeStatus::Pass,
            elapsed_ms: elapsed_since(migration_started),
            message: "migrations are visible and executable".to_string(),
        }),
        Err(error) => checks.push(SmokeCheck {
            name: "migration_visibility",
            status: SmokeStatus::Fail,
            elapsed_ms: elapsed_since(migration_started),
            message: format!("migration execution failed: {error}"),
        }),
    }

    let lifecycle_started = Instant::now();
    let lifecycle = runtime.block_on(workflow_lifecycle());
    checks.push(SmokeCheck {
        name: "workflow_lifecycle",
        status: if lifecycle.is_ok() { SmokeStatus::Pass } else { SmokeStatus::Fail },
        elapsed_ms: elapsed_since(lifecycle_started),
        message: match lifecycle {
            Ok(summary) => summary,
            Err(error) => format!("lifecycle step failed: {error}"),
        },
    });

    finalize_report(checks, elapsed_since(started))
}

/// Drives one request from draft to order against in-memory collaborators.
async fn workflow_lifecycle() -> Result<String, ApplicationError> {
    let slot = MemberSlot {
        domain_id: "smoke-domain".to_string(),
        domain_name: "Smoke".to_string(),
        role_id: "smoke-role".to_string(),
        role: "Engineer".to_string(),
        level: "Senior".to_string(),
        technology_level: "Common".to_string(),
        number_of_profiles_needed: 1,
    };
    let terms =
        AgreementTerms::new("smoke-agreement", vec![AgreementCombination::from_slot(&slot)]);
    let catalog = StaticAgreementCatalog::default().with_terms(terms);
    let candidates = StaticCandidateSource::default().with_candidates(
        slot.key(),
        vec![Candidate {
            provider_name: "Smoke Provider".to_string(),
            price: Decimal::new(1_000, 0),
            employee_profiles: Vec::new(),
        }],
    );
    let service = WorkflowService::new(
        Arc::new(InMemoryWorkflowStore::default()),
        Arc::new(catalog),
        Arc::new(candidates),
    );

    let user = CallContext::new(Actor::user("smoke-user"));
    let pm = CallContext::new(Actor::provider_manager("smoke-pm"));
    let spec = RequestSpec {
        agreement_id: "smoke-agreement".to_string(),
        task_description: "Smoke check".to_string(),
        project: "smoke".to_string(),
        request_type: RequestType::Single,
        location: "Remote".to_string(),
        location_type: LocationType::Onshore,
        begin: NaiveDate::from_ymd_opt(2024, 1, 8).unwrap_or_default(),
        end: NaiveDate::from_ymd_opt(2024, 1, 12).unwrap_or_default(),
        number_of_offers: 1,
        representatives: Default::default(),
        information_for_provider_manager: String::new(),
        consumer: "smoke".to_string(),
        selected_members: vec![slot],
    };

    let request = service.create_request(&user, spec, true).await?;
    service.assign(&pm, &request.id).await?;
    service.approve(&pm, &request.id, "smoke approval".to_string()).await?;
    let report = service.generate_offers(&user, &request.id).await?;
    for offer in &report.offers {
        service.select_offer(&user, &offer.id).await?;
    }
    service.send_for_pm_evaluation(&user, &request.id, "smoke evaluation".to_string()).await?;
    let order = service.approve_and_create_order(&pm, &request.id, None).await?;

    Ok(format!(
        "request {} produced order {} with {} approved offer(s), total {}",
        request.id,
        order.id,
        order.approved_offers.len(),
        order.total_price
    ))
}

fn elapsed_since(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn timed_check<T, E>(check: impl FnOnce() -> Result<T, E>) -> Result<(u64, T), (u64, E)> {
    let started = Instant::now();
    match check() {
        Ok(value) => Ok((elapsed_since(started), value)),
        Err(error) => Err((elapsed_since(started), error)),
    }
}

fn skipped(name: &'static str) -> SmokeCheck {
    SmokeCheck {
        name,
        status: SmokeStatus::Skipped,
        elapsed_ms: 0,
        message: "skipped due to previous failure".to_string(),
    }
}

fn finalize_report(checks: Vec<SmokeCheck>, total_elapsed_ms: u64) -> CommandResult {
    let passed = checks.iter().filter(|check| check.status == SmokeStatus::Pass).count();
    let total = checks.len();
    let failed = checks.iter().any(|check| check.status != SmokeStatus::Pass);

    let report = SmokeReport {
        command: "smoke",
        status: if failed { SmokeStatus::Fail } else { SmokeStatus::Pass },
        summary: format!("smoke: {passed}/{total} checks passed in {total_elapsed_ms}ms"),
        total_elapsed_ms,
        checks,
    };

    let human = report.summary.clone();
    let machine = serde_json::to_string(&report).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"smoke\",\"status\":\"fail\",\"summary\":\"serialization failed\",\"error\":\"{}\"}}",
            escape_json(&error.to_string())
        )
    });

    CommandResult { exit_code: if failed { 6 } else { 0 }, output: format!("{human}\n{machine}") }
}
