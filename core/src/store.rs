//! SQLite persistence layer.
//!
//! RULE: Only store.rs talks to the database. Scoring stages work on
//! plain structs loaded up front; outputs are written back in one shot
//! at the end of a run. The master table is replaced inside a single
//! transaction, so a failed run leaves the previous snapshot intact.

use crate::account::{Account, PlanType};
use crate::error::{PipelineError, PipelineResult};
use crate::event::{Event, EventKind};
use crate::health::HealthTier;
use crate::master::MasterRecord;
use crate::ml_model::ModelReport;
use crate::pipeline::PipelineRun;
use crate::risk::RiskTier;
use crate::types::RunId;
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::types::Type;
use rusqlite::{params, Connection};

const DATE_FMT: &str = "%Y-%m-%d";
const INSTANT_FMT: &str = "%Y-%m-%d %H:%M:%S";

pub struct PipelineStore {
    conn: Connection,
}

impl PipelineStore {
    /// Open (or create) the pipeline database at `path`.
    pub fn open(path: &str) -> PipelineResult<Self> {
        let conn = Connection::open(path)?;
        // WAL mode: better concurrent read performance.
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> PipelineResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> PipelineResult<()> {
        self.conn.execute_batch(include_str!("../../migrations/001_inputs.sql"))?;
        self.conn.execute_batch(include_str!("../../migrations/002_outputs.sql"))?;
        Ok(())
    }

    // ── Accounts ─────────────────────────────────────────────────────────────

    pub fn insert_account(&self, account: &Account) -> PipelineResult<()> {
        self.conn.execute(
            "INSERT INTO account (user_id, signup_date, plan_type, portfolio_size,
                                  annual_revenue, is_active, nps_score,
                                  support_tickets_last_90d, success_manager_assigned,
                                  csm_id, renewal_due_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                account.user_id,
                account.signup_date.format(DATE_FMT).to_string(),
                account.plan_type.as_tag(),
                account.portfolio_size,
                account.annual_revenue,
                account.is_active,
                account.nps_score,
                account.support_tickets_last_90d,
                account.success_manager_assigned,
                account.csm_id,
                account.renewal_due_date.format(DATE_FMT).to_string(),
            ],
        )?;
        Ok(())
    }

    pub fn insert_accounts(&mut self, accounts: &[Account]) -> PipelineResult<()> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO account (user_id, signup_date, plan_type, portfolio_size,
                                      annual_revenue, is_active, nps_score,
                                      support_tickets_last_90d, success_manager_assigned,
                                      csm_id, renewal_due_date)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            )?;
            for account in accounts {
                stmt.execute(params![
                    account.user_id,
                    account.signup_date.format(DATE_FMT).to_string(),
                    account.plan_type.as_tag(),
                    account.portfolio_size,
                    account.annual_revenue,
                    account.is_active,
                    account.nps_score,
                    account.support_tickets_last_90d,
                    account.success_manager_assigned,
                    account.csm_id,
                    account.renewal_due_date.format(DATE_FMT).to_string(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Load the full registry, ordered by user_id.
    ///
    /// NULL numerics default to zero and an absent plan lands on
    /// `unknown`; a date that fails to parse is fatal.
    pub fn load_accounts(&self) -> PipelineResult<Vec<Account>> {
        let mut stmt = self.conn.prepare(
            "SELECT user_id, signup_date, plan_type, portfolio_size, annual_revenue,
                    is_active, nps_score, support_tickets_last_90d,
                    success_manager_assigned, csm_id, renewal_due_date
             FROM account ORDER BY user_id ASC",
        )?;
        let raw = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<i64>>(3)?,
                    row.get::<_, Option<f64>>(4)?,
                    row.get::<_, Option<bool>>(5)?,
                    row.get::<_, Option<f64>>(6)?,
                    row.get::<_, Option<i64>>(7)?,
                    row.get::<_, Option<bool>>(8)?,
                    row.get::<_, Option<String>>(9)?,
                    row.get::<_, Option<String>>(10)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut accounts = Vec::with_capacity(raw.len());
        for (user_id, signup, plan, portfolio, revenue, active, nps, tickets, csm, csm_id, renewal) in raw {
            accounts.push(Account {
                user_id,
                signup_date: parse_date("signup_date", signup)?,
                plan_type: plan.as_deref().map(PlanType::from_tag).unwrap_or(PlanType::Unknown),
                portfolio_size: portfolio.unwrap_or(0),
                annual_revenue: revenue.unwrap_or(0.0),
                is_active: active.unwrap_or(true),
                nps_score: nps.unwrap_or(0.0),
                support_tickets_last_90d: tickets.unwrap_or(0),
                success_manager_assigned: csm.unwrap_or(false),
                csm_id,
                renewal_due_date: parse_date("renewal_due_date", renewal)?,
            });
        }
        Ok(accounts)
    }

    pub fn account_count(&self) -> PipelineResult<i64> {
        let n = self.conn.query_row("SELECT COUNT(*) FROM account", [], |row| row.get(0))?;
        Ok(n)
    }

    // ── Events ───────────────────────────────────────────────────────────────

    pub fn insert_event(&self, event: &Event) -> PipelineResult<()> {
        self.conn.execute(
            "INSERT INTO event (user_id, event_type, event_ts, event_value_num, event_value_txt)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                event.user_id,
                event.kind.as_tag(),
                event.occurred_at.format(INSTANT_FMT).to_string(),
                event.value_num,
                event.value_txt,
            ],
        )?;
        Ok(())
    }

    /// Bulk insert inside one transaction.
    pub fn insert_events(&mut self, events: &[Event]) -> PipelineResult<()> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO event (user_id, event_type, event_ts, event_value_num, event_value_txt)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for event in events {
                stmt.execute(params![
                    event.user_id,
                    event.kind.as_tag(),
                    event.occurred_at.format(INSTANT_FMT).to_string(),
                    event.value_num,
                    event.value_txt,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Load the full event log in (user_id, timestamp) order. Unknown
    /// event tags land on `EventKind::Other` rather than failing.
    pub fn load_events(&self) -> PipelineResult<Vec<Event>> {
        let mut stmt = self.conn.prepare(
            "SELECT user_id, event_type, event_ts, event_value_num, event_value_txt
             FROM event ORDER BY user_id ASC, event_ts ASC, id ASC",
        )?;
        let raw = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<f64>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut events = Vec::with_capacity(raw.len());
        for (user_id, kind, ts, value_num, value_txt) in raw {
            events.push(Event {
                user_id,
                kind: EventKind::from_tag(&kind),
                occurred_at: parse_instant("event_ts", ts)?,
                value_num,
                value_txt,
            });
        }
        Ok(events)
    }

    pub fn event_count(&self) -> PipelineResult<i64> {
        let n = self.conn.query_row("SELECT COUNT(*) FROM event", [], |row| row.get(0))?;
        Ok(n)
    }

    // ── Runs ─────────────────────────────────────────────────────────────────

    /// Register a finished run. Re-recording the same run_id overwrites
    /// the earlier row, so reruns with an identical seed and reference
    /// instant stay idempotent.
    pub fn record_run(&self, run: &PipelineRun, version: &str) -> PipelineResult<()> {
        let summary_json = serde_json::to_string(&run.summary)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO pipeline_run (run_id, as_of, seed, version, user_rows, summary_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                run.run_id,
                run.as_of.format(INSTANT_FMT).to_string(),
                run.model_report.config.seed as i64,
                version,
                run.master.len() as i64,
                summary_json,
            ],
        )?;
        Ok(())
    }

    pub fn latest_run_id(&self) -> PipelineResult<Option<RunId>> {
        let mut stmt = self.conn.prepare(
            "SELECT run_id FROM pipeline_run ORDER BY as_of DESC, run_id DESC LIMIT 1",
        )?;
        let result = stmt.query_row([], |row| row.get::<_, String>(0)).ok();
        Ok(result)
    }

    // ── Master table ─────────────────────────────────────────────────────────

    /// Swap in a freshly computed snapshot: delete the previous rows and
    /// insert the new ones inside one transaction.
    pub fn replace_master(&mut self, run_id: &str, rows: &[MasterRecord]) -> PipelineResult<()> {
        let tx = self.conn.transaction()?;
        {
            tx.execute("DELETE FROM master_row", [])?;
            let mut stmt = tx.prepare(
                "INSERT INTO master_row (
                     user_id, run_id, signup_date, plan_type, portfolio_size,
                     annual_revenue, is_active, nps_score, support_tickets_last_90d,
                     success_manager_assigned, csm_id, renewal_due_date, total_events,
                     events_30d, events_60d, events_90d, active_days_30d,
                     active_days_60d, active_days_90d, last_activity,
                     days_since_last_activity, total_logins, avg_session_length,
                     logins_30d, avg_session_30d, property_added_count,
                     tenant_added_count, lease_signed_count, rent_payment_received_count,
                     maintenance_request_created_count, report_generated_count,
                     total_rent_collected, features_adopted, unique_features,
                     trainings_attended, unique_training_types, account_age_days,
                     days_to_renewal, engagement_declining, activity_trend,
                     usage_component, business_value_component, sentiment_component,
                     engagement_component, health_score, health_tier, at_renewal_risk,
                     rule_churn_probability, rule_churn_tier, ml_churn_probability,
                     ml_churn_tier)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                         ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26,
                         ?27, ?28, ?29, ?30, ?31, ?32, ?33, ?34, ?35, ?36, ?37, ?38,
                         ?39, ?40, ?41, ?42, ?43, ?44, ?45, ?46, ?47, ?48, ?49, ?50,
                         ?51)",
            )?;
            for row in rows {
                stmt.execute(params![
                    row.user_id,
                    run_id,
                    row.signup_date.format(DATE_FMT).to_string(),
                    row.plan_type.as_tag(),
                    row.portfolio_size,
                    row.annual_revenue,
                    row.is_active,
                    row.nps_score,
                    row.support_tickets_last_90d,
                    row.success_manager_assigned,
                    row.csm_id,
                    row.renewal_due_date.format(DATE_FMT).to_string(),
                    row.total_events,
                    row.events_30d,
                    row.events_60d,
                    row.events_90d,
                    row.active_days_30d,
                    row.active_days_60d,
                    row.active_days_90d,
                    row.last_activity.map(|ts| ts.format(INSTANT_FMT).to_string()),
                    row.days_since_last_activity,
                    row.total_logins,
                    row.avg_session_length,
                    row.logins_30d,
                    row.avg_session_30d,
                    row.property_added_count,
                    row.tenant_added_count,
                    row.lease_signed_count,
                    row.rent_payment_received_count,
                    row.maintenance_request_created_count,
                    row.report_generated_count,
                    row.total_rent_collected,
                    row.features_adopted,
                    row.unique_features,
                    row.trainings_attended,
                    row.unique_training_types,
                    row.account_age_days,
                    row.days_to_renewal,
                    row.engagement_declining,
                    row.activity_trend,
                    row.usage_component,
                    row.business_value_component,
                    row.sentiment_component,
                    row.engagement_component,
                    row.health_score,
                    row.health_tier.as_tag(),
                    row.at_renewal_risk,
                    row.rule_churn_probability,
                    row.rule_churn_tier.as_tag(),
                    row.ml_churn_probability,
                    row.ml_churn_tier.as_tag(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn master_row_count(&self) -> PipelineResult<i64> {
        let n = self.conn.query_row("SELECT COUNT(*) FROM master_row", [], |row| row.get(0))?;
        Ok(n)
    }

    /// Load the persisted snapshot, ordered by user_id.
    pub fn load_master(&self) -> PipelineResult<Vec<MasterRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT user_id, signup_date, plan_type, portfolio_size, annual_revenue,
                    is_active, nps_score, support_tickets_last_90d,
                    success_manager_assigned, csm_id, renewal_due_date, total_events,
                    events_30d, events_60d, events_90d, active_days_30d,
                    active_days_60d, active_days_90d, last_activity,
                    days_since_last_activity, total_logins, avg_session_length,
                    logins_30d, avg_session_30d, property_added_count,
                    tenant_added_count, lease_signed_count, rent_payment_received_count,
                    maintenance_request_created_count, report_generated_count,
                    total_rent_collected, features_adopted, unique_features,
                    trainings_attended, unique_training_types, account_age_days,
                    days_to_renewal, engagement_declining, activity_trend,
                    usage_component, business_value_component, sentiment_component,
                    engagement_component, health_score, health_tier, at_renewal_risk,
                    rule_churn_probability, rule_churn_tier, ml_churn_probability,
                    ml_churn_tier
             FROM master_row ORDER BY user_id ASC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(MasterRecord {
                    user_id: row.get(0)?,
                    signup_date: sql_date(1, row.get(1)?)?,
                    plan_type: PlanType::from_tag(&row.get::<_, String>(2)?),
                    portfolio_size: row.get(3)?,
                    annual_revenue: row.get(4)?,
                    is_active: row.get(5)?,
                    nps_score: row.get(6)?,
                    support_tickets_last_90d: row.get(7)?,
                    success_manager_assigned: row.get(8)?,
                    csm_id: row.get(9)?,
                    renewal_due_date: sql_date(10, row.get(10)?)?,
                    total_events: row.get(11)?,
                    events_30d: row.get(12)?,
                    events_60d: row.get(13)?,
                    events_90d: row.get(14)?,
                    active_days_30d: row.get(15)?,
                    active_days_60d: row.get(16)?,
                    active_days_90d: row.get(17)?,
                    last_activity: row
                        .get::<_, Option<String>>(18)?
                        .map(|raw| sql_instant(18, raw))
                        .transpose()?,
                    days_since_last_activity: row.get(19)?,
                    total_logins: row.get(20)?,
                    avg_session_length: row.get(21)?,
                    logins_30d: row.get(22)?,
                    avg_session_30d: row.get(23)?,
                    property_added_count: row.get(24)?,
                    tenant_added_count: row.get(25)?,
                    lease_signed_count: row.get(26)?,
                    rent_payment_received_count: row.get(27)?,
                    maintenance_request_created_count: row.get(28)?,
                    report_generated_count: row.get(29)?,
                    total_rent_collected: row.get(30)?,
                    features_adopted: row.get(31)?,
                    unique_features: row.get(32)?,
                    trainings_attended: row.get(33)?,
                    unique_training_types: row.get(34)?,
                    account_age_days: row.get(35)?,
                    days_to_renewal: row.get(36)?,
                    engagement_declining: row.get(37)?,
                    activity_trend: row.get(38)?,
                    usage_component: row.get(39)?,
                    business_value_component: row.get(40)?,
                    sentiment_component: row.get(41)?,
                    engagement_component: row.get(42)?,
                    health_score: row.get(43)?,
                    health_tier: sql_health_tier(44, row.get(44)?)?,
                    at_renewal_risk: row.get(45)?,
                    rule_churn_probability: row.get(46)?,
                    rule_churn_tier: sql_risk_tier(47, row.get(47)?)?,
                    ml_churn_probability: row.get(48)?,
                    ml_churn_tier: sql_risk_tier(49, row.get(49)?)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ── Model reports ────────────────────────────────────────────────────────

    pub fn insert_model_report(&self, run_id: &str, report: &ModelReport) -> PipelineResult<()> {
        let importance_json = serde_json::to_string(&report.evaluation.feature_importance)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO model_report (
                 model_id, run_id, tree_count, max_depth, min_samples_split, seed,
                 train_rows, test_rows, roc_auc, accuracy, precision_churned,
                 recall_churned, f1_churned, true_negatives, false_positives,
                 false_negatives, true_positives, importance_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                     ?15, ?16, ?17, ?18)",
            params![
                report.model_id,
                run_id,
                report.config.tree_count as i64,
                report.config.max_depth as i64,
                report.config.min_samples_split as i64,
                report.config.seed as i64,
                report.evaluation.train_rows as i64,
                report.evaluation.test_rows as i64,
                report.evaluation.roc_auc,
                report.evaluation.accuracy,
                report.evaluation.precision,
                report.evaluation.recall,
                report.evaluation.f1,
                report.evaluation.confusion.true_negatives,
                report.evaluation.confusion.false_positives,
                report.evaluation.confusion.false_negatives,
                report.evaluation.confusion.true_positives,
                importance_json,
            ],
        )?;
        Ok(())
    }
}

// ── Column parsing ───────────────────────────────────────────────────────────

fn parse_date(column: &'static str, raw: Option<String>) -> PipelineResult<NaiveDate> {
    let raw = raw.ok_or_else(|| PipelineError::InvalidColumn {
        column,
        value: "NULL".to_string(),
    })?;
    NaiveDate::parse_from_str(&raw, DATE_FMT)
        .map_err(|_| PipelineError::InvalidColumn { column, value: raw })
}

fn parse_instant(column: &'static str, raw: Option<String>) -> PipelineResult<NaiveDateTime> {
    let raw = raw.ok_or_else(|| PipelineError::InvalidColumn {
        column,
        value: "NULL".to_string(),
    })?;
    NaiveDateTime::parse_from_str(&raw, INSTANT_FMT)
        .map_err(|_| PipelineError::InvalidColumn { column, value: raw })
}

fn sql_date(index: usize, raw: String) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(&raw, DATE_FMT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(e)))
}

fn sql_instant(index: usize, raw: String) -> rusqlite::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(&raw, INSTANT_FMT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(e)))
}

fn sql_health_tier(index: usize, raw: String) -> rusqlite::Result<HealthTier> {
    HealthTier::from_tag(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            index,
            Type::Text,
            format!("unknown health tier '{raw}'").into(),
        )
    })
}

fn sql_risk_tier(index: usize, raw: String) -> rusqlite::Result<RiskTier> {
    RiskTier::from_tag(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            index,
            Type::Text,
            format!("unknown risk tier '{raw}'").into(),
        )
    })
}
