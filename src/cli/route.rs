//! CLI route: single route table and run context. Dispatches to the pipeline and presentation.

use crate::activation::{ActivationEngine, ActivationOptions};
use crate::config::{ConfigLoader, ConfigValidator, RuleInfo, TriggeratorConfig};
use crate::error::ApiError;
use crate::feed::{load_all, SourceFeedLoader};
use crate::pipeline::{GenerateRequest, Pipeline};
use crate::platform::{HttpPlatformClient, LocalPlatform, PlatformFacade};
use crate::rowset::value_text;
use crate::rules::ConditionEvaluator;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::cli::help::{command_name, is_mutating};
use crate::cli::parse::Commands;
use crate::cli::presentation::{
    format_audit_table, format_feed_json, format_feed_preview, format_generate_report,
    format_rule_check, format_run_report, format_validation_result,
};

/// Runtime context for CLI execution: workspace, resolved config and the platform in use.
pub struct RunContext {
    config: Arc<TriggeratorConfig>,
    workspace_root: PathBuf,
    offline: Option<PathBuf>,
}

impl RunContext {
    /// Create run context from workspace root and optional config path. Uses ConfigLoader only.
    pub fn new(
        workspace_root: PathBuf,
        config_path: Option<PathBuf>,
        offline: Option<PathBuf>,
    ) -> Result<Self, ApiError> {
        let config = if let Some(ref cfg_path) = config_path {
            ConfigLoader::load_from_file(cfg_path)?
        } else {
            ConfigLoader::load(&workspace_root)?
        };
        Ok(Self::with_config(config, workspace_root, offline))
    }

    pub fn with_config(
        config: TriggeratorConfig,
        workspace_root: PathBuf,
        offline: Option<PathBuf>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            workspace_root,
            offline,
        }
    }

    pub fn config(&self) -> &TriggeratorConfig {
        &self.config
    }

    /// Execute a CLI command via the single route table.
    pub async fn execute(&self, command: &Commands) -> Result<String, ApiError> {
        let started = Instant::now();
        let name = command_name(command);
        info!(command = name, mutating = is_mutating(command), "Command started");
        let result = self.execute_inner(command).await;
        match &result {
            Ok(_) => info!(
                command = name,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Command finished"
            ),
            Err(e) => warn!(command = name, error = %e, "Command failed"),
        }
        result
    }

    async fn execute_inner(&self, command: &Commands) -> Result<String, ApiError> {
        match command {
            Commands::Validate { update, feeds } => self.handle_validate(*update, *feeds).await,
            Commands::Feeds { limit, format } => {
                let feed = self.pipeline(self.feed_platform())?.load_feed().await?;
                if format == "json" {
                    format_feed_json(&feed, *limit)
                } else {
                    Ok(format_feed_preview(&feed, *limit))
                }
            }
            Commands::CheckRule {
                condition,
                evaluate,
            } => self.handle_check_rule(condition, *evaluate).await,
            Commands::Generate {
                update,
                auto_activate,
                start_date,
                end_date,
                output,
            } => {
                let request = GenerateRequest {
                    update: *update,
                    auto_activate: *auto_activate,
                    start_date: *start_date,
                    end_date: *end_date,
                    output: output.clone(),
                };
                let pipeline = self.pipeline(self.platform()?)?;
                let report = pipeline.generate(&request).await?;
                Ok(format_generate_report(&report))
            }
            Commands::Run {
                force_update,
                dry_run,
                yes,
            } => {
                let options = ActivationOptions {
                    force_update: *force_update,
                    dry_run: *dry_run,
                };
                self.handle_run(options, *yes).await
            }
        }
    }

    async fn handle_validate(&self, update: bool, feeds: bool) -> Result<String, ApiError> {
        let mut errors = if update || self.config.template.template_campaign.is_some() {
            ConfigValidator::validate_generation(&self.config, update)?
        } else {
            ConfigValidator::validate_runtime(&self.config)
        };
        if feeds && errors.is_empty() {
            let feed = load_all(&self.config.feeds, &self.loader()?).await?;
            errors.extend(ConfigValidator::validate_feed_columns(&self.config, &feed));
        }
        Ok(format_validation_result(&errors, feeds))
    }

    async fn handle_check_rule(&self, condition: &str, evaluate: bool) -> Result<String, ApiError> {
        let mut evaluator = ConditionEvaluator::new();
        evaluator.validate(condition)?;
        if !evaluate {
            return Ok(format_rule_check(condition, &[]));
        }

        let feed = self.pipeline(self.feed_platform())?.load_feed().await?;
        let name_column = self.config.feeds.name_column();
        let rule = RuleInfo::new("check", condition);
        let values: Vec<_> = feed
            .iter()
            .map(|row| {
                let name = row.get(name_column).map(value_text).unwrap_or_default();
                let value = evaluator
                    .evaluate(&rule, row)
                    .map(|v| v.to_string())
                    .map_err(|e| e.to_string());
                (name, value)
            })
            .collect();
        Ok(format_rule_check(condition, &values))
    }

    async fn handle_run(&self, options: ActivationOptions, yes: bool) -> Result<String, ApiError> {
        if !yes && !options.dry_run {
            use dialoguer::Confirm;
            let confirmed = Confirm::new()
                .with_prompt(format!(
                    "Change statuses of campaign {} (advertiser {})?",
                    self.config.execution.campaign_id.as_deref().unwrap_or("?"),
                    self.config.execution.advertiser_id.as_deref().unwrap_or("?"),
                ))
                .interact()
                .map_err(|e| {
                    ApiError::ConfigurationError(format!("Failed to get user input: {}", e))
                })?;
            if !confirmed {
                return Ok("Run cancelled".to_string());
            }
        }

        let local = self.local_platform();
        let platform: Arc<dyn PlatformFacade> = match &local {
            Some(local) => Arc::clone(local) as Arc<dyn PlatformFacade>,
            None => self.platform()?,
        };
        let pipeline = self.pipeline(Arc::clone(&platform))?;
        let mut engine = ActivationEngine::new(platform.as_ref(), options);
        let result = pipeline.run(&mut engine).await;

        if let Some(local) = local.filter(|_| !options.dry_run && engine.mutated() > 0) {
            for path in local.save()? {
                info!(path = %path.display(), "Saved updated archive");
            }
        }
        match result {
            Ok(report) => Ok(format_run_report(&report, engine.audit(), options.dry_run)),
            Err(e) => {
                // Mutations sent before the failure stay in effect.
                eprintln!("{}", format_audit_table(engine.audit()));
                Err(e)
            }
        }
    }

    fn local_platform(&self) -> Option<Arc<LocalPlatform>> {
        self.offline
            .as_ref()
            .map(|dir| Arc::new(LocalPlatform::new(self.workspace_root.join(dir))))
    }

    fn platform(&self) -> Result<Arc<dyn PlatformFacade>, ApiError> {
        if let Some(local) = self.local_platform() {
            return Ok(local);
        }
        Ok(Arc::new(HttpPlatformClient::new(&self.config.platform)?))
    }

    /// Platform for commands that only read feeds; never needs credentials.
    fn feed_platform(&self) -> Arc<dyn PlatformFacade> {
        self.local_platform()
            .unwrap_or_else(|| Arc::new(LocalPlatform::from_config(&self.config.platform)))
    }

    fn loader(&self) -> Result<SourceFeedLoader, ApiError> {
        SourceFeedLoader::new(self.workspace_root.clone())
    }

    fn pipeline(&self, platform: Arc<dyn PlatformFacade>) -> Result<Pipeline, ApiError> {
        Ok(Pipeline::new(
            Arc::clone(&self.config),
            Arc::new(self.loader()?),
            platform,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::parse::Cli;
    use clap::Parser;
    use tempfile::TempDir;

    fn context(temp: &TempDir) -> RunContext {
        RunContext::with_config(
            TriggeratorConfig::default(),
            temp.path().to_path_buf(),
            Some(PathBuf::from("cache")),
        )
    }

    #[tokio::test]
    async fn test_check_rule_without_feed() {
        let temp = TempDir::new().unwrap();
        let ctx = context(&temp);
        let cli = Cli::try_parse_from(["triggerator", "check-rule", "temp > 20 and sky == 'clear'"])
            .unwrap();
        let out = ctx.execute(&cli.command).await.unwrap();
        assert!(out.contains("Condition is valid"));

        let cli = Cli::try_parse_from(["triggerator", "check-rule", "temp >"]).unwrap();
        let err = ctx.execute(&cli.command).await.unwrap_err();
        assert!(matches!(err, ApiError::ExpressionParse { .. }));
    }

    #[tokio::test]
    async fn test_validate_reports_missing_sections() {
        let temp = TempDir::new().unwrap();
        let ctx = context(&temp);
        let cli = Cli::try_parse_from(["triggerator", "validate"]).unwrap();
        let out = ctx.execute(&cli.command).await.unwrap();
        assert!(out.contains("Validation failed"));
    }

    #[tokio::test]
    async fn test_generate_requires_template_campaign() {
        let temp = TempDir::new().unwrap();
        let ctx = context(&temp);
        let cli = Cli::try_parse_from(["triggerator", "generate"]).unwrap();
        let err = ctx.execute(&cli.command).await.unwrap_err();
        assert!(matches!(err, ApiError::ConfigurationError(_)));
    }
}
