//! Campaign structure generation
//!
//! Expands a template campaign across the joined feed and the configured rules. Each template
//! entity is expanded by one routine, [`CampaignStructureGenerator::expand`], over the axes its
//! level depends on (feed rows, rules, both or neither); a [`LevelPolicy`] per level supplies
//! those axes plus identity reconciliation and field filling.
//!
//! In update mode, entities of the existing campaign are matched by provenance and keep their
//! ids. Existing entities the run no longer produces are appended as archived (insertion orders,
//! line items) or deleted (ad groups, ads).

use super::fields::{ad, ad_group, campaign, insertion_order, line_item, status};
use super::template::{
    bid_value, creative_assignments, format_date, geo_targeting, has_budget_segment,
    parse_frequency, parse_sdf_date, reflight_budget, set_budget_amount, split_creatives,
    NameTemplates, TemplateAxes,
};
use super::{AdGroupLink, EntityKind, Provenance, ProvenanceKey, SdfStructure, SdfTable};
use crate::config::{CustomField, Media, RuleInfo, TriggeratorConfig};
use crate::error::ApiError;
use crate::rowset::{field, numeric_value, value_text, Row, RowSet};
use crate::rules::ConditionEvaluator;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// Generation inputs taken from the resolved configuration.
#[derive(Debug, Clone, Default)]
pub struct GeneratorConfig {
    pub templates: NameTemplates,
    pub name_column: String,
    pub geo_code_column: Option<String>,
    pub budget_factor_column: Option<String>,
    /// Declared feed names, for `feed.column` references in custom fields
    pub feed_names: Vec<String>,
    pub rules: Vec<RuleInfo>,
    pub custom_fields: Vec<CustomField>,
    pub total_budget: Option<f64>,
    pub campaign_name: Option<String>,
}

impl GeneratorConfig {
    pub fn from_config(config: &TriggeratorConfig) -> Self {
        Self {
            templates: NameTemplates::from_config(&config.template),
            name_column: config.feeds.name_column().to_string(),
            geo_code_column: config.feeds.geo_code_column.clone().filter(|c| !c.is_empty()),
            budget_factor_column: config
                .feeds
                .budget_factor_column
                .clone()
                .filter(|c| !c.is_empty()),
            feed_names: config.feeds.feeds.iter().map(|f| f.name.clone()).collect(),
            rules: config.rules.clone(),
            custom_fields: config.custom_fields.clone(),
            total_budget: config.template.total_budget,
            campaign_name: config.template.campaign_name.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenerationOptions {
    /// Set the campaign Active, which also makes generation recalculate statuses
    pub auto_activate: bool,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// Reference instant for conditions and for the campaign start check
    pub now: DateTime<Utc>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            auto_activate: false,
            start_date: None,
            end_date: None,
            now: Utc::now(),
        }
    }
}

/// Per-run lookup tables and reuse bookkeeping.
#[derive(Debug, Default)]
pub struct GenerationContext {
    campaign_id: String,
    recalculate_status: bool,
    /// Effective rule name per feed row (filled only when statuses are recalculated)
    effective_rules: Vec<Option<String>>,
    /// Template IO id to whether its line items are TrueView
    trueview_ios: HashMap<String, bool>,
    /// Existing IOs by provenance
    current_ios: HashMap<ProvenanceKey, usize>,
    /// Existing LIs by parent IO id and provenance
    current_lis: HashMap<(String, ProvenanceKey), usize>,
    /// Ids given to generated entities, by template id, row and rule
    generated: HashMap<(EntityKind, ProvenanceKey), String>,
    /// Existing entities matched during this run, by template id, row and rule
    matched: HashMap<(EntityKind, ProvenanceKey), usize>,
    reused: HashMap<EntityKind, HashSet<String>>,
    created: HashMap<EntityKind, usize>,
    retired: HashMap<EntityKind, usize>,
}

impl GenerationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn campaign_id(&self) -> &str {
        &self.campaign_id
    }

    /// Existing entities kept with their ids.
    pub fn reused(&self, kind: EntityKind) -> usize {
        self.reused.get(&kind).map_or(0, HashSet::len)
    }

    /// Entities given new `ext` ids.
    pub fn created(&self, kind: EntityKind) -> usize {
        self.created.get(&kind).copied().unwrap_or(0)
    }

    /// Existing entities appended as archived or deleted.
    pub fn retired(&self, kind: EntityKind) -> usize {
        self.retired.get(&kind).copied().unwrap_or(0)
    }

    fn is_trueview(&self, template_io_id: &str) -> bool {
        self.trueview_ios.get(template_io_id).copied().unwrap_or(false)
    }

    fn is_reused(&self, kind: EntityKind, id: &str) -> bool {
        self.reused.get(&kind).is_some_and(|ids| ids.contains(id))
    }
}

/// One combination of axis values a template entity is expanded for.
#[derive(Debug, Clone)]
struct Slot<'r> {
    feed_index: Option<usize>,
    row_name: String,
    rule: Option<&'r RuleInfo>,
}

impl Slot<'_> {
    fn rule_name(&self) -> &str {
        self.rule.map_or("", |r| r.name.as_str())
    }

    fn key(&self, source_id: &str) -> ProvenanceKey {
        ProvenanceKey::new(source_id, &self.row_name, self.rule_name())
    }
}

/// Level-specific behavior of the expansion routine.
trait LevelPolicy {
    fn kind(&self) -> EntityKind;

    fn axes(
        &self,
        generator: &CampaignStructureGenerator<'_>,
        ctx: &GenerationContext,
        template: &Row,
    ) -> TemplateAxes;

    /// Whether the level is expanded for this rule at all.
    fn includes(&self, _rule: &RuleInfo) -> bool {
        true
    }

    fn build(
        &self,
        generator: &CampaignStructureGenerator<'_>,
        ctx: &mut GenerationContext,
        template: &Row,
        slot: &Slot<'_>,
        no: usize,
    ) -> Result<Vec<(Row, Provenance)>, ApiError>;
}

/// Expands a template campaign into a generated (or updated) campaign structure.
pub struct CampaignStructureGenerator<'a> {
    config: &'a GeneratorConfig,
    feed: &'a RowSet,
    template: &'a SdfStructure,
    current: Option<&'a SdfStructure>,
    options: GenerationOptions,
}

impl<'a> CampaignStructureGenerator<'a> {
    /// `current` is the existing campaign in update mode, `None` for a new campaign.
    pub fn new(
        config: &'a GeneratorConfig,
        feed: &'a RowSet,
        template: &'a SdfStructure,
        current: Option<&'a SdfStructure>,
        options: GenerationOptions,
    ) -> Self {
        Self {
            config,
            feed,
            template,
            current,
            options,
        }
    }

    pub fn generate(&self) -> Result<SdfStructure, ApiError> {
        let mut ctx = GenerationContext::new();
        self.generate_in(&mut ctx)
    }

    /// Generate, leaving lookup tables and reuse counts in `ctx`.
    pub fn generate_in(&self, ctx: &mut GenerationContext) -> Result<SdfStructure, ApiError> {
        let campaigns = self.build_campaign(ctx)?;
        let template_ios = self
            .template
            .table(EntityKind::InsertionOrder)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                ApiError::ConfigurationError(format!(
                    "Template campaign {} doesn't contain Insertion Orders",
                    self.template.campaign_id().unwrap_or_default()
                ))
            })?;
        self.prepare(ctx)?;

        let mut result = SdfStructure::new(self.template.advertiser_id.clone());
        result.insert(campaigns);

        let mut ios = template_ios.empty_like();
        self.expand(&InsertionOrderLevel, ctx, template_ios, &mut ios)?;
        result.insert(ios);

        let levels: [&dyn LevelPolicy; 3] = [&LineItemLevel, &AdGroupLevel, &AdLevel];
        for level in levels {
            if let Some(template_table) = self.template.table(level.kind()) {
                let mut table = template_table.empty_like();
                self.expand(level, ctx, template_table, &mut table)?;
                result.insert(table);
            }
        }

        if let Some(current) = self.current {
            self.retire(ctx, current, &mut result);
        }

        info!(
            campaign_id = %ctx.campaign_id,
            insertion_orders = result.count(EntityKind::InsertionOrder),
            line_items = result.count(EntityKind::LineItem),
            ad_groups = result.count(EntityKind::AdGroup),
            ads = result.count(EntityKind::Ad),
            update = self.current.is_some(),
            "Generated campaign structure"
        );
        Ok(result)
    }

    fn build_campaign(&self, ctx: &mut GenerationContext) -> Result<SdfTable, ApiError> {
        let template = self
            .template
            .table(EntityKind::Campaign)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                ApiError::DataError("Template structure contains no campaign".to_string())
            })?;
        let mut table = template.clone();
        let last = table.len() - 1;
        let mut values: Vec<(&str, String)> = Vec::new();
        let mut current_start = None;

        match self.current {
            Some(current) => {
                let existing = current
                    .table(EntityKind::Campaign)
                    .filter(|t| !t.is_empty())
                    .ok_or_else(|| {
                        ApiError::DataError("Campaign being updated has no campaign row".to_string())
                    })?;
                let row = existing.len() - 1;
                ctx.campaign_id = existing.id(row);
                if current.count(EntityKind::InsertionOrder) == 0 {
                    return Err(ApiError::DataError(format!(
                        "Campaign {} that's being updated doesn't contain Insertion Orders",
                        ctx.campaign_id
                    )));
                }
                for column in [
                    campaign::NAME,
                    campaign::ID,
                    campaign::TIMESTAMP,
                    campaign::STATUS,
                    campaign::START_DATE,
                    campaign::END_DATE,
                ] {
                    values.push((column, existing.text(column, row)));
                }
                current_start = parse_sdf_date(&existing.text(campaign::START_DATE, row));
                debug!(campaign_id = %ctx.campaign_id, "Updating campaign");
            }
            None => {
                let name = self
                    .config
                    .campaign_name
                    .as_deref()
                    .filter(|n| !n.is_empty())
                    .ok_or_else(|| {
                        ApiError::ConfigurationError(
                            "New campaign name is not specified in configuration".to_string(),
                        )
                    })?;
                ctx.campaign_id = format!("ext{}", template.id(last));
                values.push((campaign::NAME, name.to_string()));
                values.push((campaign::ID, ctx.campaign_id.clone()));
                debug!(campaign_id = %ctx.campaign_id, "Generating a new campaign");
            }
        }

        if self.options.auto_activate {
            values.push((campaign::STATUS, status::ACTIVE.to_string()));
        }
        if let Some(start) = self.options.start_date {
            // a started campaign's start date can't be changed
            let today = self.options.now.date_naive();
            if self.current.is_none() || current_start.is_some_and(|d| d > today) {
                values.push((campaign::START_DATE, format_date(start)));
            }
        }
        if let Some(end) = self.options.end_date {
            values.push((campaign::END_DATE, format_date(end)));
        }
        for (column, value) in values {
            table.set(column, last, value)?;
        }

        ctx.recalculate_status = table.status(last) == status::ACTIVE;
        Ok(table)
    }

    /// Fill the lookup tables the levels consult.
    fn prepare(&self, ctx: &mut GenerationContext) -> Result<(), ApiError> {
        if let Some(lis) = self.template.table(EntityKind::LineItem) {
            for idx in 0..lis.len() {
                let io_id = lis.text(line_item::IO_ID, idx);
                let trueview = lis.text(line_item::TYPE, idx) == line_item::TRUEVIEW;
                if let Some(previous) = ctx.trueview_ios.get(&io_id) {
                    if *previous != trueview {
                        return Err(ApiError::ConfigurationError(format!(
                            "Insertion order {} in template campaign contains both TrueView and \
                             non-TrueView line items which is not supported",
                            io_id
                        )));
                    }
                }
                ctx.trueview_ios.insert(io_id, trueview);
            }
        }

        if let Some(current) = self.current {
            if let Some(ios) = current.table(EntityKind::InsertionOrder) {
                for (idx, (_, provenance)) in ios.iter().enumerate() {
                    if let Some(provenance) = provenance {
                        ctx.current_ios.insert(provenance.key(), idx);
                    }
                }
            }
            if let Some(lis) = current.table(EntityKind::LineItem) {
                for (idx, (_, provenance)) in lis.iter().enumerate() {
                    let Some(provenance) = provenance else { continue };
                    if provenance.row_key.is_empty() || provenance.rule_key.is_empty() {
                        continue;
                    }
                    ctx.current_lis
                        .insert((lis.text(line_item::IO_ID, idx), provenance.key()), idx);
                }
            }
            debug!(
                insertion_orders = ctx.current_ios.len(),
                line_items = ctx.current_lis.len(),
                "Indexed existing entities"
            );
        }

        if ctx.recalculate_status {
            let mut evaluator = ConditionEvaluator::with_now(self.options.now);
            ctx.effective_rules = self
                .feed
                .iter()
                .map(|row| {
                    evaluator
                        .get_active_rule(&self.config.rules, row)
                        .map(|rule| rule.map(|r| r.name.clone()))
                })
                .collect::<Result<_, _>>()?;
        }
        Ok(())
    }

    /// Expand every row of `templates` across its level's axes into `out`.
    fn expand(
        &self,
        level: &dyn LevelPolicy,
        ctx: &mut GenerationContext,
        templates: &SdfTable,
        out: &mut SdfTable,
    ) -> Result<(), ApiError> {
        for template in templates.rows().iter() {
            let axes = level.axes(self, ctx, template);
            if axes.rule && !axes.row {
                warn!(
                    entity = %level.kind(),
                    id = %text(template, level.kind().id_column()),
                    "Template entity depends on rules but not on feed rows, skipping"
                );
                continue;
            }
            for (no, slot) in self.slots(axes, level).iter().enumerate() {
                for (row, provenance) in level.build(self, ctx, template, slot, no)? {
                    out.push(row, Some(provenance));
                }
            }
        }
        Ok(())
    }

    fn slots<'r>(&'r self, axes: TemplateAxes, level: &dyn LevelPolicy) -> Vec<Slot<'r>> {
        if !axes.row {
            return vec![Slot {
                feed_index: None,
                row_name: String::new(),
                rule: None,
            }];
        }
        let mut slots = Vec::new();
        for (idx, row) in self.feed.iter().enumerate() {
            let row_name = field(row, &self.config.name_column)
                .map(value_text)
                .unwrap_or_default();
            if axes.rule {
                for rule in self.config.rules.iter().filter(|r| level.includes(r)) {
                    slots.push(Slot {
                        feed_index: Some(idx),
                        row_name: row_name.clone(),
                        rule: Some(rule),
                    });
                }
            } else {
                slots.push(Slot {
                    feed_index: Some(idx),
                    row_name,
                    rule: None,
                });
            }
        }
        slots
    }

    fn feed_row(&self, slot: &Slot<'_>) -> Option<&Row> {
        slot.feed_index.and_then(|idx| self.feed.rows().get(idx))
    }

    fn current_table(&self, kind: EntityKind) -> Option<&'a SdfTable> {
        self.current.and_then(|c| c.table(kind))
    }

    /// Whether `rule_name` is the effective rule of the slot's feed row.
    fn is_effective(&self, ctx: &GenerationContext, slot: &Slot<'_>, rule_name: &str) -> bool {
        slot.feed_index
            .and_then(|idx| ctx.effective_rules.get(idx))
            .and_then(Option::as_deref)
            == Some(rule_name)
    }

    /// Copy identity fields from an existing entity and mark it reused.
    fn adopt(
        &self,
        ctx: &mut GenerationContext,
        current: &SdfTable,
        index: usize,
        row: &mut Row,
        columns: &[&str],
    ) {
        if let Some(existing) = current.row(index) {
            for column in columns {
                if let Some(value) = existing.get(*column) {
                    row.insert(column.to_string(), value.clone());
                }
            }
        }
        put(row, status::COLUMN, fix_draft(&current.status(index)));
        ctx.reused
            .entry(current.kind())
            .or_default()
            .insert(current.id(index));
    }

    /// Give a new `ext` id.
    fn assign_new_id(&self, ctx: &mut GenerationContext, kind: EntityKind, row: &mut Row, id: String) {
        put(row, kind.id_column(), id);
        *ctx.created.entry(kind).or_default() += 1;
    }

    fn set_status(&self, ctx: &GenerationContext, row: &mut Row, active: bool) {
        if ctx.recalculate_status {
            put(
                row,
                status::COLUMN,
                if active { status::ACTIVE } else { status::PAUSED },
            );
        }
    }

    fn apply_budget(&self, row: &mut Row, slot: &Slot<'_>) -> Result<(), ApiError> {
        let original = text(row, insertion_order::BUDGET_SEGMENTS);
        let mut segments = original.clone();
        if let Some(total) = self.config.total_budget {
            let budget = match self.feed_row(slot) {
                Some(feed_row) => match &self.config.budget_factor_column {
                    Some(column) => {
                        total * field(feed_row, column).and_then(numeric_value).unwrap_or(f64::NAN)
                    }
                    None => total / self.feed.row_count() as f64,
                },
                None => total,
            };
            if budget.is_finite() {
                segments = set_budget_amount(&segments, budget);
            }
        }
        if self.current.is_none() && has_budget_segment(&segments) {
            let (Some(start), Some(end)) = (self.options.start_date, self.options.end_date) else {
                return Err(ApiError::ConfigurationError(
                    "Start and end dates are required for a new campaign with budget segments"
                        .to_string(),
                ));
            };
            if let Some(reflighted) = reflight_budget(&segments, start, end) {
                segments = reflighted;
            }
        }
        if segments != original {
            put(row, insertion_order::BUDGET_SEGMENTS, segments);
        }
        Ok(())
    }

    fn apply_custom_fields(
        &self,
        row: &mut Row,
        kind: EntityKind,
        rule_name: &str,
        media: Media,
        feed_row: Option<&Row>,
    ) -> Result<(), ApiError> {
        for custom in &self.config.custom_fields {
            if !custom.applies(kind, rule_name, media) {
                continue;
            }
            let value = match feed_row {
                Some(feed_row) if !custom.value.is_empty() => {
                    self.resolve_custom_value(&custom.value, feed_row)?
                }
                _ => custom.value.clone(),
            };
            if !value.is_empty() {
                put(row, &custom.sdf_field, value);
            }
        }
        Ok(())
    }

    /// `feed.column` and bare column references read from the feed row; anything else is literal.
    fn resolve_custom_value(&self, value: &str, feed_row: &Row) -> Result<String, ApiError> {
        if let Some((feed, column)) = value.split_once('.') {
            if self.config.feed_names.iter().any(|name| name == feed) {
                return field(feed_row, value)
                    .or_else(|| field(feed_row, column))
                    .map(value_text)
                    .ok_or_else(|| {
                        ApiError::DataError(format!(
                            "Custom field value '{}' refers to a column missing from the feed",
                            value
                        ))
                    });
            }
        }
        Ok(field(feed_row, value)
            .map(value_text)
            .unwrap_or_else(|| value.to_string()))
    }

    /// Existing ad group under a matched line item that the line item's links point at.
    fn find_current_ad_group(&self, li_index: usize, template_ad_group_id: &str) -> Option<usize> {
        let lis = self.current_table(EntityKind::LineItem)?;
        let ad_groups = self.current_table(EntityKind::AdGroup)?;
        let links = &lis.provenance(li_index)?.ad_groups;
        let candidates = ad_groups.find_all(ad_group::LINE_ITEM_ID, &lis.id(li_index));
        links
            .iter()
            .filter(|link| link.template_id == template_ad_group_id)
            .find_map(|link| {
                candidates
                    .iter()
                    .copied()
                    .find(|&idx| ad_groups.text(ad_group::NAME, idx) == link.name)
            })
    }

    /// Append existing entities this run did not reuse, as archived or deleted.
    fn retire(&self, ctx: &mut GenerationContext, current: &SdfStructure, result: &mut SdfStructure) {
        for kind in [
            EntityKind::InsertionOrder,
            EntityKind::LineItem,
            EntityKind::AdGroup,
            EntityKind::Ad,
        ] {
            let Some(existing) = current.table(kind) else {
                continue;
            };
            let mut table = result.remove(kind).unwrap_or_else(|| existing.empty_like());
            for idx in 0..existing.len() {
                if ctx.is_reused(kind, &existing.id(idx)) {
                    continue;
                }
                let Some(row) = existing.row(idx) else { continue };
                let mut row = row.clone();
                put(&mut row, status::COLUMN, kind.retired_status());
                table.push(row, existing.provenance(idx).cloned());
                *ctx.retired.entry(kind).or_default() += 1;
            }
            if ctx.retired(kind) > 0 {
                debug!(entity = %kind, count = ctx.retired(kind), "Retired entities");
            }
            result.insert(table);
        }
    }
}

struct InsertionOrderLevel;

impl LevelPolicy for InsertionOrderLevel {
    fn kind(&self) -> EntityKind {
        EntityKind::InsertionOrder
    }

    fn axes(
        &self,
        generator: &CampaignStructureGenerator<'_>,
        ctx: &GenerationContext,
        template: &Row,
    ) -> TemplateAxes {
        if ctx.is_trueview(&text(template, insertion_order::ID)) {
            TemplateAxes::ROW_AND_RULE
        } else {
            generator.config.templates.io_axes()
        }
    }

    fn build(
        &self,
        generator: &CampaignStructureGenerator<'_>,
        ctx: &mut GenerationContext,
        template: &Row,
        slot: &Slot<'_>,
        no: usize,
    ) -> Result<Vec<(Row, Provenance)>, ApiError> {
        let source_id = text(template, insertion_order::ID);
        let trueview = ctx.is_trueview(&source_id);
        let rule_name = slot.rule_name();
        let key = slot.key(&source_id);
        let mut row = template.clone();
        put(&mut row, insertion_order::CAMPAIGN_ID, ctx.campaign_id.clone());

        let matched = ctx.current_ios.get(&key).copied();
        match (matched, generator.current_table(self.kind())) {
            (Some(idx), Some(current)) => generator.adopt(
                ctx,
                current,
                idx,
                &mut row,
                &[insertion_order::ID, insertion_order::TIMESTAMP],
            ),
            _ => generator.assign_new_id(ctx, self.kind(), &mut row, format!("ext{}{}", source_id, no)),
        }

        let active = slot
            .rule
            .map_or(true, |rule| generator.is_effective(ctx, slot, &rule.name));
        generator.set_status(ctx, &mut row, active);

        let name = generator.config.templates.io_name(
            trueview,
            &text(&row, insertion_order::NAME),
            &slot.row_name,
            rule_name,
        );
        put(&mut row, insertion_order::NAME, name);
        generator.apply_budget(&mut row, slot)?;

        let media = media_of(trueview);
        if let Some(rule) = slot.rule {
            if let Some(frequency) = rule.state(media).and_then(|s| s.frequency_io.as_deref()) {
                let frequency = parse_frequency(frequency)?;
                put(&mut row, insertion_order::FREQUENCY_ENABLED, "TRUE");
                put(&mut row, insertion_order::FREQUENCY_EXPOSURES, frequency.exposures.to_string());
                put(&mut row, insertion_order::FREQUENCY_PERIOD, frequency.period.as_str());
                put(&mut row, insertion_order::FREQUENCY_AMOUNT, frequency.amount.to_string());
            }
        }
        generator.apply_custom_fields(
            &mut row,
            self.kind(),
            rule_name,
            media,
            generator.feed_row(slot),
        )?;

        ctx.generated
            .insert((self.kind(), key), text(&row, insertion_order::ID));
        Ok(vec![(
            row,
            Provenance::new(source_id, slot.row_name.clone(), rule_name),
        )])
    }
}

struct LineItemLevel;

impl LevelPolicy for LineItemLevel {
    fn kind(&self) -> EntityKind {
        EntityKind::LineItem
    }

    fn axes(&self, _: &CampaignStructureGenerator<'_>, _: &GenerationContext, _: &Row) -> TemplateAxes {
        TemplateAxes::ROW_AND_RULE
    }

    fn build(
        &self,
        generator: &CampaignStructureGenerator<'_>,
        ctx: &mut GenerationContext,
        template: &Row,
        slot: &Slot<'_>,
        no: usize,
    ) -> Result<Vec<(Row, Provenance)>, ApiError> {
        let source_id = text(template, line_item::ID);
        let trueview = text(template, line_item::TYPE) == line_item::TRUEVIEW;
        let rule_name = slot.rule_name();

        // the parent IO's key depends on the axes the IO was expanded over
        let io_source = text(template, line_item::IO_ID);
        let io_axes = if ctx.is_trueview(&io_source) {
            TemplateAxes::ROW_AND_RULE
        } else {
            generator.config.templates.io_axes()
        };
        let io_key = ProvenanceKey::new(
            &io_source,
            if io_axes.row { &slot.row_name } else { "" },
            if io_axes.rule { rule_name } else { "" },
        );
        let current_io_id = ctx.current_ios.get(&io_key).and_then(|&idx| {
            generator
                .current_table(EntityKind::InsertionOrder)
                .map(|ios| ios.id(idx))
        });

        let key = slot.key(&source_id);
        let matched = current_io_id
            .as_ref()
            .and_then(|io_id| ctx.current_lis.get(&(io_id.clone(), key.clone())).copied());
        let mut row = template.clone();
        match (matched, generator.current_table(self.kind())) {
            (Some(idx), Some(current)) => {
                generator.adopt(
                    ctx,
                    current,
                    idx,
                    &mut row,
                    &[line_item::IO_ID, line_item::ID, line_item::TIMESTAMP],
                );
                ctx.matched.insert((self.kind(), key.clone()), idx);
            }
            _ => {
                let parent = match current_io_id {
                    Some(id) => id,
                    None => ctx
                        .generated
                        .get(&(EntityKind::InsertionOrder, io_key))
                        .cloned()
                        .ok_or_else(|| missing_parent(self.kind(), &source_id, &io_source, slot))?,
                };
                put(&mut row, line_item::IO_ID, parent);
                generator.assign_new_id(ctx, self.kind(), &mut row, format!("ext{}{}", source_id, no));
            }
        }

        let active = io_axes.rule || generator.is_effective(ctx, slot, rule_name);
        generator.set_status(ctx, &mut row, active);

        let name = generator.config.templates.li_name(
            trueview,
            &text(&row, line_item::NAME),
            &slot.row_name,
            rule_name,
        );
        put(&mut row, line_item::NAME, name);

        if let (Some(column), Some(feed_row)) =
            (&generator.config.geo_code_column, generator.feed_row(slot))
        {
            let code = field(feed_row, column).cloned().unwrap_or(Value::Null);
            match geo_targeting(&code) {
                Some(geo) => put(&mut row, line_item::GEOGRAPHY_INCLUDE, geo),
                None => warn!(
                    line_item = %text(&row, line_item::NAME),
                    geo_code = %value_text(&code),
                    "Ignoring geo code, only numbers or ';'-separated lists of numbers are supported"
                ),
            }
        }

        let mut provenance = Provenance::new(source_id.clone(), slot.row_name.clone(), rule_name);
        let media = media_of(trueview);
        if let Some(rule) = slot.rule {
            let state = rule.state(media);
            if let Some(frequency) = state.and_then(|s| s.frequency_li.as_deref()) {
                let frequency = parse_frequency(frequency)?;
                put(&mut row, line_item::FREQUENCY_ENABLED, "TRUE");
                put(&mut row, line_item::FREQUENCY_EXPOSURES, frequency.exposures.to_string());
                put(&mut row, line_item::FREQUENCY_PERIOD, frequency.period.as_str());
                if !trueview {
                    put(&mut row, line_item::FREQUENCY_AMOUNT, frequency.amount.to_string());
                }
            }
            if !trueview {
                if let Some(bid) = state.and_then(|s| s.bid.as_deref()) {
                    let value = bid_value(bid, &text(&row, line_item::BID_STRATEGY_VALUE))?;
                    put(&mut row, line_item::BID_STRATEGY_VALUE, value);
                }
                if let Some(creatives) = state.and_then(|s| s.creatives.as_deref()) {
                    put(&mut row, line_item::CREATIVE_ASSIGNMENTS, creative_assignments(creatives));
                }
            }
        }
        if trueview {
            if let Some(ad_groups) = generator.template.table(EntityKind::AdGroup) {
                for idx in ad_groups.find_all(ad_group::LINE_ITEM_ID, &source_id) {
                    provenance.ad_groups.push(AdGroupLink {
                        name: generator.config.templates.ad_group_name(
                            &ad_groups.text(ad_group::NAME, idx),
                            &slot.row_name,
                            rule_name,
                        ),
                        template_id: ad_groups.id(idx),
                    });
                }
            }
        }

        generator.apply_custom_fields(
            &mut row,
            self.kind(),
            rule_name,
            media,
            generator.feed_row(slot),
        )?;
        ctx.generated
            .insert((self.kind(), key), text(&row, line_item::ID));
        Ok(vec![(row, provenance)])
    }
}

/// Video levels only exist for rules with an item-level YouTube frequency.
fn has_video_frequency(rule: &RuleInfo) -> bool {
    rule.youtube_state
        .as_ref()
        .and_then(|s| s.frequency_li.as_deref())
        .is_some_and(|f| !f.is_empty())
}

struct AdGroupLevel;

impl LevelPolicy for AdGroupLevel {
    fn kind(&self) -> EntityKind {
        EntityKind::AdGroup
    }

    fn axes(&self, _: &CampaignStructureGenerator<'_>, _: &GenerationContext, _: &Row) -> TemplateAxes {
        TemplateAxes::ROW_AND_RULE
    }

    fn includes(&self, rule: &RuleInfo) -> bool {
        has_video_frequency(rule)
    }

    fn build(
        &self,
        generator: &CampaignStructureGenerator<'_>,
        ctx: &mut GenerationContext,
        template: &Row,
        slot: &Slot<'_>,
        no: usize,
    ) -> Result<Vec<(Row, Provenance)>, ApiError> {
        let source_id = text(template, ad_group::ID);
        let li_source = text(template, ad_group::LINE_ITEM_ID);
        let rule_name = slot.rule_name();
        let li_key = slot.key(&li_source);
        let matched_li = ctx.matched.get(&(EntityKind::LineItem, li_key.clone())).copied();
        let matched = matched_li.and_then(|li_idx| generator.find_current_ad_group(li_idx, &source_id));

        let key = slot.key(&source_id);
        let mut row = template.clone();
        match (matched, generator.current_table(self.kind())) {
            (Some(idx), Some(current)) => {
                generator.adopt(
                    ctx,
                    current,
                    idx,
                    &mut row,
                    &[ad_group::LINE_ITEM_ID, ad_group::ID],
                );
                ctx.matched.insert((self.kind(), key.clone()), idx);
            }
            _ => {
                let parent = matched_li
                    .and_then(|idx| {
                        generator
                            .current_table(EntityKind::LineItem)
                            .map(|lis| lis.id(idx))
                    })
                    .or_else(|| ctx.generated.get(&(EntityKind::LineItem, li_key)).cloned())
                    .ok_or_else(|| missing_parent(self.kind(), &source_id, &li_source, slot))?;
                put(&mut row, ad_group::LINE_ITEM_ID, parent);
                generator.assign_new_id(ctx, self.kind(), &mut row, format!("ext{}{}", source_id, no));
            }
        }
        generator.set_status(ctx, &mut row, true);

        let name = generator.config.templates.ad_group_name(
            &text(&row, ad_group::NAME),
            &slot.row_name,
            rule_name,
        );
        put(&mut row, ad_group::NAME, name);
        if let Some(bid) = slot
            .rule
            .and_then(|r| r.youtube_state.as_ref())
            .and_then(|s| s.bid.as_deref())
        {
            let value = bid_value(bid, &text(&row, ad_group::BID_COST))?;
            put(&mut row, ad_group::BID_COST, value);
        }
        generator.apply_custom_fields(
            &mut row,
            self.kind(),
            rule_name,
            Media::YouTube,
            generator.feed_row(slot),
        )?;

        ctx.generated.insert((self.kind(), key), text(&row, ad_group::ID));
        Ok(vec![(
            row,
            Provenance::new(source_id, slot.row_name.clone(), rule_name),
        )])
    }
}

struct AdLevel;

impl LevelPolicy for AdLevel {
    fn kind(&self) -> EntityKind {
        EntityKind::Ad
    }

    fn axes(&self, _: &CampaignStructureGenerator<'_>, _: &GenerationContext, _: &Row) -> TemplateAxes {
        TemplateAxes::ROW_AND_RULE
    }

    fn includes(&self, rule: &RuleInfo) -> bool {
        has_video_frequency(rule)
    }

    fn build(
        &self,
        generator: &CampaignStructureGenerator<'_>,
        ctx: &mut GenerationContext,
        template: &Row,
        slot: &Slot<'_>,
        no: usize,
    ) -> Result<Vec<(Row, Provenance)>, ApiError> {
        let rule_name = slot.rule_name();
        let creatives = slot
            .rule
            .and_then(|r| r.youtube_state.as_ref())
            .and_then(|s| s.creatives.as_deref())
            .map(split_creatives)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| {
                ApiError::ConfigurationError(format!(
                    "Rule \"{}\" doesn't have a TrueView creative",
                    rule_name
                ))
            })?;

        let source_id = text(template, ad::ID);
        let ad_group_source = text(template, ad::AD_GROUP_ID);
        let ad_group_key = slot.key(&ad_group_source);
        let matched_ad_group = ctx
            .matched
            .get(&(EntityKind::AdGroup, ad_group_key.clone()))
            .and_then(|&idx| {
                generator
                    .current_table(EntityKind::AdGroup)
                    .map(|groups| groups.id(idx))
            });

        let mut generated = Vec::with_capacity(creatives.len());
        for (creative_idx, video_id) in creatives.iter().enumerate() {
            let mut row = template.clone();
            let current = generator.current_table(self.kind());
            let matched = match (&matched_ad_group, current) {
                (Some(group_id), Some(ads)) => ads
                    .find_all(ad::AD_GROUP_ID, group_id)
                    .into_iter()
                    .find(|&idx| ads.text(ad::VIDEO_ID, idx) == *video_id),
                _ => None,
            };
            match (matched, current) {
                (Some(idx), Some(current)) => {
                    generator.adopt(ctx, current, idx, &mut row, &[ad::AD_GROUP_ID, ad::ID])
                }
                _ => {
                    let parent = matched_ad_group
                        .clone()
                        .or_else(|| {
                            ctx.generated
                                .get(&(EntityKind::AdGroup, ad_group_key.clone()))
                                .cloned()
                        })
                        .ok_or_else(|| {
                            missing_parent(self.kind(), &source_id, &ad_group_source, slot)
                        })?;
                    put(&mut row, ad::AD_GROUP_ID, parent);
                    generator.assign_new_id(
                        ctx,
                        self.kind(),
                        &mut row,
                        format!("ext{}{}{}", source_id, no, creative_idx),
                    );
                }
            }
            generator.set_status(ctx, &mut row, true);

            let name =
                generator
                    .config
                    .templates
                    .ad_name(&text(&row, ad::NAME), &slot.row_name, rule_name);
            put(&mut row, ad::NAME, name);
            put(&mut row, ad::VIDEO_ID, video_id.clone());
            generator.apply_custom_fields(
                &mut row,
                self.kind(),
                rule_name,
                Media::YouTube,
                generator.feed_row(slot),
            )?;
            generated.push((
                row,
                Provenance::new(source_id.clone(), slot.row_name.clone(), rule_name),
            ));
        }
        Ok(generated)
    }
}

fn missing_parent(kind: EntityKind, source_id: &str, parent_id: &str, slot: &Slot<'_>) -> ApiError {
    ApiError::DataError(format!(
        "{} {} refers to {} which produced no entity for row '{}' and rule '{}'",
        kind,
        source_id,
        parent_id,
        slot.row_name,
        slot.rule_name()
    ))
}

fn media_of(trueview: bool) -> Media {
    if trueview {
        Media::YouTube
    } else {
        Media::Display
    }
}

fn fix_draft(value: &str) -> &str {
    if value == status::DRAFT {
        status::PAUSED
    } else {
        value
    }
}

fn text(row: &Row, column: &str) -> String {
    row.get(column).map(value_text).unwrap_or_default()
}

fn put(row: &mut Row, column: &str, value: impl Into<String>) {
    row.insert(column.to_string(), Value::String(value.into()));
}
