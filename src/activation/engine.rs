//! Runtime activation
//!
//! Insertion orders are indexed by the `(row, rule)` pair of their provenance, then each feed
//! row's effective rule decides which of them (or of their line items) should run:
//!
//! - IOs generated per row and rule: the effective rule's IO is activated, the other rules' IOs
//!   of the row are paused.
//! - IOs generated per row: their line items carrying a rule are toggled, active only for the
//!   effective rule.
//! - Static IOs: their line items are indexed by `(row, rule)` and toggled like per-rule IOs.
//!
//! Platform calls are issued one at a time; the first failure stops the run.

use super::audit::{AuditEntry, AuditOutcome};
use crate::config::RuleInfo;
use crate::error::ApiError;
use crate::platform::{EntityStatus, PlatformFacade};
use crate::rowset::{field, value_text, RowSet};
use crate::rules::ConditionEvaluator;
use crate::sdf::fields::{line_item, status};
use crate::sdf::{EntityKind, SdfStructure, SdfTable};
use std::collections::HashMap;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Default)]
pub struct ActivationOptions {
    /// Send every decision, even when the entity already has the status
    pub force_update: bool,
    /// Record decisions without calling the platform
    pub dry_run: bool,
}

/// An entity the run may toggle.
#[derive(Debug, Clone)]
struct EntityState {
    id: String,
    status: String,
}

impl EntityState {
    fn of(table: &SdfTable, index: usize) -> Self {
        Self {
            id: table.id(index),
            status: table.status(index),
        }
    }

    /// Archived and deleted entities are never targeted.
    fn is_retired(&self) -> bool {
        self.status == status::ARCHIVED || self.status == status::DELETED
    }

    fn has(&self, desired: EntityStatus) -> bool {
        match desired {
            EntityStatus::Active => self.status == status::ACTIVE,
            EntityStatus::Paused => self.status != status::ACTIVE,
        }
    }
}

type RowRuleKey = (String, String);

pub struct ActivationEngine<'p> {
    platform: &'p dyn PlatformFacade,
    options: ActivationOptions,
    evaluator: ConditionEvaluator,
    audit: Vec<AuditEntry>,
    mutated: usize,
}

impl<'p> ActivationEngine<'p> {
    pub fn new(platform: &'p dyn PlatformFacade, options: ActivationOptions) -> Self {
        Self {
            platform,
            options,
            evaluator: ConditionEvaluator::new(),
            audit: Vec::new(),
            mutated: 0,
        }
    }

    /// Use a specific evaluator, e.g. one pinned to a reference time.
    pub fn with_evaluator(mut self, evaluator: ConditionEvaluator) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// Decisions recorded so far, including those of a failed run.
    pub fn audit(&self) -> &[AuditEntry] {
        &self.audit
    }

    /// Mutations recorded so far (applied or dry-run).
    pub fn mutated(&self) -> usize {
        self.mutated
    }

    /// Align entity statuses of `structure` with the effective rule of every feed row.
    /// Returns the number of mutations.
    pub async fn run(
        &mut self,
        rules: &[RuleInfo],
        name_column: &str,
        feed: &RowSet,
        structure: &SdfStructure,
    ) -> Result<usize, ApiError> {
        if rules.is_empty() {
            return Err(ApiError::ConfigurationError(
                "There are no rules in configuration to process".to_string(),
            ));
        }
        let ios = structure
            .table(EntityKind::InsertionOrder)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::DataError("Campaign has no insertion orders".to_string()))?;
        let lis = structure.table(EntityKind::LineItem);
        let advertiser_id = structure.advertiser_id.as_str();
        let started = self.mutated;

        let ios_by_key = index_insertion_orders(ios);
        let static_lis = match (ios_by_key.get(&(String::new(), String::new())), lis) {
            (Some(static_ios), Some(lis)) => index_static_line_items(static_ios, lis),
            _ => HashMap::new(),
        };

        let mut effective = Vec::with_capacity(feed.row_count());
        for row in feed.iter() {
            let rule = self.evaluator.get_active_rule(rules, row)?;
            let row_name = field(row, name_column).map(value_text).unwrap_or_default();
            debug!(row = %row_name, rule = ?rule.map(|r| r.name.as_str()), "Effective rule");
            effective.push((row_name, rule.map(|r| r.name.clone())));
        }

        // IOs per row and rule
        for (row_name, active_rule) in &effective {
            for rule in rules {
                if active_rule.as_deref() == Some(rule.name.as_str()) {
                    continue;
                }
                if let Some(entities) = ios_by_key.get(&(row_name.clone(), rule.name.clone())) {
                    for io in entities {
                        self.apply(
                            advertiser_id,
                            EntityKind::InsertionOrder,
                            io,
                            EntityStatus::Paused,
                            lis,
                        )
                        .await?;
                    }
                }
            }
            if let Some(active_rule) = active_rule {
                if let Some(entities) = ios_by_key.get(&(row_name.clone(), active_rule.clone())) {
                    for io in entities {
                        self.apply(
                            advertiser_id,
                            EntityKind::InsertionOrder,
                            io,
                            EntityStatus::Active,
                            lis,
                        )
                        .await?;
                    }
                }
            }
        }

        // IOs per row: toggle their line items
        if let Some(lis) = lis {
            for (row_name, active_rule) in &effective {
                if row_name.is_empty() {
                    continue;
                }
                let Some(entities) = ios_by_key.get(&(row_name.clone(), String::new())) else {
                    continue;
                };
                for io in entities {
                    for index in lis.find_all(line_item::IO_ID, &io.id) {
                        let Some(rule_key) = lis
                            .provenance(index)
                            .map(|p| p.rule_key.as_str())
                            .filter(|r| !r.is_empty())
                        else {
                            continue;
                        };
                        let desired = if active_rule.as_deref() == Some(rule_key) {
                            EntityStatus::Active
                        } else {
                            EntityStatus::Paused
                        };
                        let li = EntityState::of(lis, index);
                        if li.is_retired() {
                            continue;
                        }
                        self.apply(advertiser_id, EntityKind::LineItem, &li, desired, None)
                            .await?;
                    }
                }
            }
        }

        // static IOs: line items per row and rule
        if !static_lis.is_empty() {
            for (row_name, active_rule) in &effective {
                for rule in rules {
                    if active_rule.as_deref() == Some(rule.name.as_str()) {
                        continue;
                    }
                    if let Some(entities) = static_lis.get(&(row_name.clone(), rule.name.clone())) {
                        for li in entities {
                            self.apply(
                                advertiser_id,
                                EntityKind::LineItem,
                                li,
                                EntityStatus::Paused,
                                None,
                            )
                            .await?;
                        }
                    }
                }
                if let Some(active_rule) = active_rule {
                    if let Some(entities) = static_lis.get(&(row_name.clone(), active_rule.clone())) {
                        for li in entities {
                            self.apply(
                                advertiser_id,
                                EntityKind::LineItem,
                                li,
                                EntityStatus::Active,
                                None,
                            )
                            .await?;
                        }
                    }
                }
            }
        }

        let mutated = self.mutated - started;
        info!(
            rows = feed.row_count(),
            mutated,
            audited = self.audit.len(),
            dry_run = self.options.dry_run,
            "Activation run completed"
        );
        Ok(mutated)
    }

    /// Bring one entity to `desired`. `line_items` is passed for IOs so a skipped activation can
    /// report the IO's active line items.
    async fn apply(
        &mut self,
        advertiser_id: &str,
        kind: EntityKind,
        entity: &EntityState,
        desired: EntityStatus,
        line_items: Option<&SdfTable>,
    ) -> Result<(), ApiError> {
        if !self.options.force_update && entity.has(desired) {
            self.record(AuditEntry::new(kind, &entity.id, desired, AuditOutcome::Skipped));
            if kind == EntityKind::InsertionOrder && desired == EntityStatus::Active {
                if let Some(lis) = line_items {
                    for index in lis.find_all(line_item::IO_ID, &entity.id) {
                        if lis.status(index) == status::ACTIVE {
                            self.record(AuditEntry::new(
                                EntityKind::LineItem,
                                lis.id(index),
                                EntityStatus::Active,
                                AuditOutcome::Skipped,
                            ));
                        }
                    }
                }
            }
            return Ok(());
        }

        if self.options.dry_run {
            self.record(AuditEntry::new(kind, &entity.id, desired, AuditOutcome::DryRun));
            return Ok(());
        }

        match kind {
            EntityKind::InsertionOrder => {
                self.platform
                    .set_insertion_order_status(advertiser_id, &entity.id, desired)
                    .await?
            }
            _ => {
                self.platform
                    .set_line_item_status(advertiser_id, &entity.id, desired)
                    .await?
            }
        }
        self.record(AuditEntry::new(kind, &entity.id, desired, AuditOutcome::Applied));
        Ok(())
    }

    fn record(&mut self, entry: AuditEntry) {
        info!(
            entity = %entry.kind,
            id = %entry.id,
            status = %entry.status,
            outcome = entry.outcome.as_str(),
            "{}",
            entry
        );
        if entry.outcome.is_mutation() {
            self.mutated += 1;
        }
        self.audit.push(entry);
    }
}

fn index_insertion_orders(ios: &SdfTable) -> HashMap<RowRuleKey, Vec<EntityState>> {
    let mut index: HashMap<RowRuleKey, Vec<EntityState>> = HashMap::new();
    for idx in 0..ios.len() {
        let Some(provenance) = ios.provenance(idx) else {
            debug!(io_id = %ios.id(idx), "Skipping insertion order without row/rule reference");
            continue;
        };
        let io = EntityState::of(ios, idx);
        if io.is_retired() {
            continue;
        }
        index
            .entry((provenance.row_key.clone(), provenance.rule_key.clone()))
            .or_default()
            .push(io);
    }
    index
}

fn index_static_line_items(
    static_ios: &[EntityState],
    lis: &SdfTable,
) -> HashMap<RowRuleKey, Vec<EntityState>> {
    let mut index: HashMap<RowRuleKey, Vec<EntityState>> = HashMap::new();
    for io in static_ios {
        for idx in lis.find_all(line_item::IO_ID, &io.id) {
            let li = EntityState::of(lis, idx);
            if li.is_retired() {
                continue;
            }
            if let Some(provenance) = lis.provenance(idx) {
                index
                    .entry((provenance.row_key.clone(), provenance.rule_key.clone()))
                    .or_default()
                    .push(li);
            }
        }
    }
    index
}
