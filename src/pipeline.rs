//! Pipeline
//!
//! Wires configuration, feed loading, the platform and the core components into the two paths
//! the tool runs: generating (or updating) a campaign archive from the template, and the runtime
//! activation pass over a live campaign. Each path validates its configuration up front and
//! reports every problem at once.

use crate::activation::ActivationEngine;
use crate::config::{ConfigValidator, TriggeratorConfig};
use crate::error::ApiError;
use crate::feed::{load_all, FeedLoader};
use crate::platform::PlatformFacade;
use crate::rowset::{format_number, number_value, numeric_value, RowSet};
use crate::sdf::{
    write_archive, CampaignStructureGenerator, EntityKind, GenerationContext, GenerationOptions,
    GeneratorConfig, SdfStructure,
};
use chrono::{Local, NaiveDate};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Options of a generation run.
#[derive(Debug, Clone, Default)]
pub struct GenerateRequest {
    /// Update the configured campaign instead of creating a new one
    pub update: bool,
    pub auto_activate: bool,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// Archive path; defaults to a timestamped file in the destination folder
    pub output: Option<PathBuf>,
}

/// Per-level counts of a generation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LevelCounts {
    pub total: usize,
    pub reused: usize,
    pub created: usize,
    pub retired: usize,
}

#[derive(Debug, Clone)]
pub struct GenerateReport {
    pub structure: SdfStructure,
    pub path: PathBuf,
    pub feed_rows: usize,
    pub counts: BTreeMap<EntityKind, LevelCounts>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    pub feed_rows: usize,
    pub mutated: usize,
}

/// Generation and activation over configured collaborators.
pub struct Pipeline {
    config: Arc<TriggeratorConfig>,
    loader: Arc<dyn FeedLoader>,
    platform: Arc<dyn PlatformFacade>,
}

impl Pipeline {
    pub fn new(
        config: Arc<TriggeratorConfig>,
        loader: Arc<dyn FeedLoader>,
        platform: Arc<dyn PlatformFacade>,
    ) -> Self {
        Self {
            config,
            loader,
            platform,
        }
    }

    pub fn config(&self) -> &TriggeratorConfig {
        &self.config
    }

    pub fn platform(&self) -> &dyn PlatformFacade {
        self.platform.as_ref()
    }

    fn advertiser_id(&self) -> &str {
        self.config.execution.advertiser_id.as_deref().unwrap_or_default()
    }

    fn campaign_id(&self) -> &str {
        self.config.execution.campaign_id.as_deref().unwrap_or_default()
    }

    /// Load and join every feed, then check the configured columns against the result.
    pub async fn load_feed(&self) -> Result<RowSet, ApiError> {
        let feed = load_all(&self.config.feeds, self.loader.as_ref()).await?;
        ConfigValidator::ensure(ConfigValidator::validate_feed_columns(&self.config, &feed))?;
        Ok(feed)
    }

    /// Generate a campaign archive from the template campaign.
    pub async fn generate(&self, request: &GenerateRequest) -> Result<GenerateReport, ApiError> {
        ConfigValidator::ensure(ConfigValidator::validate_generation(
            &self.config,
            request.update,
        )?)?;
        let advertiser_id = self.advertiser_id();
        let template_campaign = self
            .config
            .template
            .template_campaign
            .as_deref()
            .unwrap_or_default();

        let mut feed = self.load_feed().await?;
        if let Some(column) = self
            .config
            .feeds
            .budget_factor_column
            .as_deref()
            .filter(|c| !c.is_empty())
        {
            normalize_budget_factors(&mut feed, column)?;
        }

        let template = self
            .platform
            .download_structure(advertiser_id, template_campaign)
            .await?;
        if template.count(EntityKind::Campaign) == 0 {
            return Err(ApiError::DataError(format!(
                "Couldn't load campaign {}, probably due to advertiser and campaign mismatch",
                template_campaign
            )));
        }
        let current = if request.update {
            let current = self
                .platform
                .download_structure(advertiser_id, self.campaign_id())
                .await?;
            if current.count(EntityKind::Campaign) == 0 {
                return Err(ApiError::DataError(format!(
                    "Couldn't load campaign {}, the platform returned an empty structure",
                    self.campaign_id()
                )));
            }
            Some(current)
        } else {
            None
        };

        let generator_config = GeneratorConfig::from_config(&self.config);
        let options = GenerationOptions {
            auto_activate: request.auto_activate,
            start_date: request.start_date,
            end_date: request.end_date,
            ..Default::default()
        };
        let mut ctx = GenerationContext::new();
        let structure = CampaignStructureGenerator::new(
            &generator_config,
            &feed,
            &template,
            current.as_ref(),
            options,
        )
        .generate_in(&mut ctx)?;

        let path = request
            .output
            .clone()
            .unwrap_or_else(|| self.default_output_path());
        write_archive(&structure, &path)?;

        let counts = EntityKind::ALL
            .into_iter()
            .filter(|kind| structure.table(*kind).is_some())
            .map(|kind| {
                (
                    kind,
                    LevelCounts {
                        total: structure.count(kind),
                        reused: ctx.reused(kind),
                        created: ctx.created(kind),
                        retired: ctx.retired(kind),
                    },
                )
            })
            .collect();
        Ok(GenerateReport {
            structure,
            path,
            feed_rows: feed.row_count(),
            counts,
        })
    }

    fn default_output_path(&self) -> PathBuf {
        let folder = self
            .config
            .template
            .destination_folder
            .clone()
            .unwrap_or_else(|| PathBuf::from("."));
        folder.join(format!("sdf-{}.zip", Local::now().format("%Y%m%d%H%M%S")))
    }

    /// Runtime pass: align the live campaign with the effective rules. Decisions accumulate on
    /// `engine`, so its audit stays readable when the run fails.
    pub async fn run(&self, engine: &mut ActivationEngine<'_>) -> Result<RunReport, ApiError> {
        ConfigValidator::ensure(ConfigValidator::validate_runtime(&self.config))?;
        let (feed, structure) = tokio::try_join!(
            self.load_feed(),
            self.platform
                .download_structure(self.advertiser_id(), self.campaign_id())
        )?;
        let mutated = engine
            .run(
                &self.config.rules,
                self.config.feeds.name_column(),
                &feed,
                &structure,
            )
            .await?;
        Ok(RunReport {
            feed_rows: feed.row_count(),
            mutated,
        })
    }
}

/// Scale the budget factor column so it sums to 1. Left unchanged when the sum is not a finite
/// non-zero number.
pub fn normalize_budget_factors(feed: &mut RowSet, column: &str) -> Result<bool, ApiError> {
    let factors: Vec<f64> = feed
        .iter()
        .map(|row| row.get(column).and_then(numeric_value).unwrap_or(f64::NAN))
        .collect();
    let total: f64 = factors.iter().sum();
    if !total.is_finite() || total == 0.0 {
        warn!(column, "Budget factors don't sum to a number, leaving them as is");
        return Ok(false);
    }
    for (idx, factor) in factors.into_iter().enumerate() {
        feed.set(column, idx as i64, number_value(factor / total))?;
    }
    info!(column, total = %format_number(total), "Normalized budget factors");
    Ok(true)
}
