//! Run orchestration — wires the stages in dependency order.
//!
//! Stage order is fixed: aggregate, derive, reduce, health, rule risk,
//! ML risk, master join, summary, cohorts. Every stage is a pure
//! function of its inputs plus the reference instant, so one run with
//! the same tables, instant and config always produces byte-identical
//! master rows.

use crate::account::Account;
use crate::aggregate::{self, ActivityAggregate};
use crate::cohort::{self, CohortCell};
use crate::error::{PipelineError, PipelineResult};
use crate::event::Event;
use crate::features::{self, DerivedFeatures};
use crate::forest::ForestConfig;
use crate::health::{self, HealthScore};
use crate::master::{self, MasterRecord};
use crate::ml_model::{ModelReport, TrainedChurnModel};
use crate::population::PopulationStats;
use crate::risk::{ChurnRisk, ChurnRiskModel, UserSnapshot};
use crate::rule_model::RuleBasedRiskModel;
use crate::summary::RunSummary;
use crate::types::{RunId, UserId};
use chrono::NaiveDateTime;
use std::collections::{BTreeMap, BTreeSet};

/// The owned output of one run.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub run_id: RunId,
    pub as_of: NaiveDateTime,
    pub population: PopulationStats,
    pub master: Vec<MasterRecord>,
    pub model_report: ModelReport,
    pub summary: RunSummary,
    pub cohorts: Vec<CohortCell>,
}

/// Scoring engine. Trains the churn classifier lazily on the first run
/// and reuses it for later runs, so scoring never observes a partially
/// trained model.
pub struct Pipeline {
    config: ForestConfig,
    model: Option<TrainedChurnModel>,
}

impl Pipeline {
    pub fn new(config: ForestConfig) -> Self {
        Self { config, model: None }
    }

    /// Reuse a previously trained classifier instead of retraining.
    pub fn with_model(model: TrainedChurnModel) -> Self {
        Self {
            config: model.config,
            model: Some(model),
        }
    }

    pub fn model(&self) -> Option<&TrainedChurnModel> {
        self.model.as_ref()
    }

    pub fn run(
        &mut self,
        accounts: &[Account],
        events: &[Event],
        as_of: NaiveDateTime,
    ) -> PipelineResult<PipelineRun> {
        if accounts.is_empty() {
            return Err(PipelineError::EmptyPopulation);
        }
        // Duplicate ids would silently merge in every keyed stage;
        // fail before any map is built.
        let mut seen: BTreeSet<&str> = BTreeSet::new();
        for account in accounts {
            if !seen.insert(account.user_id.as_str()) {
                return Err(PipelineError::DuplicateUser {
                    user_id: account.user_id.clone(),
                });
            }
        }

        let mut aggregates = aggregate::aggregate_events(events, as_of);
        // Zero-fill before the reduce pass so every account participates
        // in the maxima, sentinel inactivity included.
        for account in accounts {
            aggregates
                .entry(account.user_id.clone())
                .or_insert_with(|| ActivityAggregate::zero(&account.user_id));
        }
        let orphan_users = aggregates.len().saturating_sub(accounts.len());
        if orphan_users > 0 {
            log::debug!("{orphan_users} event log users missing from the account registry");
        }

        let mut derived: BTreeMap<UserId, DerivedFeatures> = BTreeMap::new();
        for account in accounts {
            let record = features::derive(account, &aggregates[&account.user_id], as_of);
            derived.insert(account.user_id.clone(), record);
        }

        let stats = PopulationStats::collect(
            accounts
                .iter()
                .map(|account| (account, &aggregates[&account.user_id], &derived[&account.user_id])),
        );

        let mut health: BTreeMap<UserId, HealthScore> = BTreeMap::new();
        for account in accounts {
            let score = health::score_user(
                account,
                &aggregates[&account.user_id],
                &derived[&account.user_id],
                &stats,
            );
            health.insert(account.user_id.clone(), score);
        }

        let snapshots: Vec<UserSnapshot<'_>> = accounts
            .iter()
            .map(|account| UserSnapshot {
                account,
                aggregate: &aggregates[&account.user_id],
                derived: &derived[&account.user_id],
                health: &health[&account.user_id],
            })
            .collect();

        let rule_model = RuleBasedRiskModel::new(stats);
        let mut rule_risks: BTreeMap<UserId, ChurnRisk> = BTreeMap::new();
        for snapshot in &snapshots {
            rule_risks.insert(snapshot.account.user_id.clone(), rule_model.score(snapshot));
        }

        let config = self.config;
        let model = self.model.get_or_insert_with(|| {
            log::info!(
                "training churn classifier on {} users (seed={})",
                snapshots.len(),
                config.seed
            );
            TrainedChurnModel::train(&snapshots, &config)
        });

        let mut ml_risks: BTreeMap<UserId, ChurnRisk> = BTreeMap::new();
        for snapshot in &snapshots {
            ml_risks.insert(snapshot.account.user_id.clone(), model.score(snapshot));
        }

        let master = master::assemble(accounts, &aggregates, &derived, &health, &rule_risks, &ml_risks)?;
        let summary = RunSummary::from_master(&master);
        let cohorts = cohort::cohort_retention(accounts, events);

        let run_id = format!("run-{}-{}", config.seed, as_of.format("%Y%m%d%H%M%S"));
        log::info!(
            "run {run_id}: {} master rows, tiers {}g/{}y/{}r, {} high churn risk",
            master.len(),
            summary.health_tiers.green,
            summary.health_tiers.yellow,
            summary.health_tiers.red,
            summary.high_risk_users,
        );

        Ok(PipelineRun {
            run_id,
            as_of,
            population: stats,
            master,
            model_report: model.report(),
            summary,
            cohorts,
        })
    }
}
