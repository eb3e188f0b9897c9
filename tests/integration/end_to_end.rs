//! Workspace on disk through the pipeline and the CLI route table

use super::test_utils::{flight, write_workspace, ADVERTISER, GENERATED_CAMPAIGN};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use triggerator::activation::{ActivationEngine, ActivationOptions};
use triggerator::cli::{Cli, RunContext};
use triggerator::config::ConfigLoader;
use triggerator::feed::SourceFeedLoader;
use triggerator::pipeline::{GenerateRequest, Pipeline};
use triggerator::platform::{archive_file_name, LocalPlatform};
use triggerator::sdf::{read_archive, EntityKind};

fn pipeline(root: &Path, platform: Arc<LocalPlatform>) -> Pipeline {
    let config = ConfigLoader::load(root).unwrap();
    Pipeline::new(
        Arc::new(config),
        Arc::new(SourceFeedLoader::new(root).unwrap()),
        platform,
    )
}

fn new_campaign_request(cache: &Path) -> GenerateRequest {
    let (start, end) = flight();
    GenerateRequest {
        start_date: Some(start),
        end_date: Some(end),
        output: Some(cache.join(archive_file_name(ADVERTISER, GENERATED_CAMPAIGN, 1000))),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_moscow_and_spb_campaign() {
    let temp = TempDir::new().unwrap();
    let cache = write_workspace(temp.path(), "{base_name}-{row_name}");
    let platform = Arc::new(LocalPlatform::new(&cache));
    let pipeline = pipeline(temp.path(), Arc::clone(&platform));

    let report = pipeline.generate(&new_campaign_request(&cache)).await.unwrap();
    assert_eq!(report.feed_rows, 2);
    assert_eq!(report.counts[&EntityKind::InsertionOrder].total, 2);
    assert_eq!(report.counts[&EntityKind::InsertionOrder].created, 2);
    assert_eq!(report.counts[&EntityKind::LineItem].total, 4);

    let sdf = read_archive(&report.path, ADVERTISER).unwrap();
    let campaigns = sdf.table(EntityKind::Campaign).unwrap();
    assert_eq!(campaigns.text("Name", 0), "Weather");
    assert_eq!(campaigns.id(0), GENERATED_CAMPAIGN);
    let ios = sdf.table(EntityKind::InsertionOrder).unwrap();
    let names: Vec<_> = (0..ios.len()).map(|i| ios.text("Name", i)).collect();
    assert_eq!(names, vec!["Camp-Moscow", "Camp-SPB"]);
    assert_eq!(
        ios.export_rows().get_text("Details", 1).unwrap(),
        "source:4001\ncity:SPB\ntier:"
    );
    let lis = sdf.table(EntityKind::LineItem).unwrap();
    let li_names: Vec<_> = (0..lis.len()).map(|i| lis.text("Name", i)).collect();
    assert!(li_names.contains(&"Banner-Moscow-Warm".to_string()));
    assert!(li_names.contains(&"Banner-SPB-Cold".to_string()));
    assert_eq!(lis.text("Creative Assignments", 0), "101;102;");
}

#[tokio::test]
async fn test_update_regenerates_with_full_reuse() {
    let temp = TempDir::new().unwrap();
    let cache = write_workspace(temp.path(), "{base_name}-{row_name}-{rule_name}");
    let platform = Arc::new(LocalPlatform::new(&cache));
    let pipeline = pipeline(temp.path(), platform);
    let first = pipeline.generate(&new_campaign_request(&cache)).await.unwrap();

    let update = GenerateRequest {
        update: true,
        output: Some(temp.path().join("out").join("update.zip")),
        ..Default::default()
    };
    let second = pipeline.generate(&update).await.unwrap();
    for kind in [EntityKind::InsertionOrder, EntityKind::LineItem] {
        let counts = second.counts[&kind];
        assert_eq!(counts.total, first.counts[&kind].total);
        assert_eq!(counts.reused, counts.total);
        assert_eq!(counts.created, 0);
        assert_eq!(counts.retired, 0);
    }
    assert!(second.path.exists());
}

#[tokio::test]
async fn test_generate_then_run_twice() {
    let temp = TempDir::new().unwrap();
    let cache = write_workspace(temp.path(), "{base_name}-{row_name}-{rule_name}");
    let platform = Arc::new(LocalPlatform::new(&cache));
    let pipeline = pipeline(temp.path(), Arc::clone(&platform));
    pipeline.generate(&new_campaign_request(&cache)).await.unwrap();

    let mut engine = ActivationEngine::new(platform.as_ref(), ActivationOptions::default());
    let report = pipeline.run(&mut engine).await.unwrap();
    assert_eq!(report.feed_rows, 2);
    assert_eq!(report.mutated, 2);
    let audit: Vec<_> = engine.audit().iter().map(|e| e.to_string()).collect();
    assert_eq!(audit.len(), 4);
    assert!(audit.contains(&format!(
        "IO:{}:Status=Active",
        warm_io_id(&platform, "Moscow")
    )));

    let mut engine = ActivationEngine::new(platform.as_ref(), ActivationOptions::default());
    let report = pipeline.run(&mut engine).await.unwrap();
    assert_eq!(report.mutated, 0);
    assert_eq!(engine.audit().len(), 4);
}

/// Id of the insertion order generated for `row` under the Warm rule.
fn warm_io_id(platform: &LocalPlatform, row: &str) -> String {
    let sdf = platform.structure(ADVERTISER, GENERATED_CAMPAIGN).unwrap();
    let ios = sdf.table(EntityKind::InsertionOrder).unwrap();
    (0..ios.len())
        .find(|&i| {
            ios.provenance(i)
                .is_some_and(|p| p.row_key == row && p.rule_key == "Warm")
        })
        .map(|i| ios.id(i))
        .unwrap()
}

#[tokio::test]
async fn test_cli_offline_run() {
    let temp = TempDir::new().unwrap();
    let cache = write_workspace(temp.path(), "{base_name}-{row_name}-{rule_name}");
    let ctx = RunContext::new(temp.path().to_path_buf(), None, Some(cache.clone())).unwrap();

    let output = cache.join(archive_file_name(ADVERTISER, GENERATED_CAMPAIGN, 1000));
    let output = output.to_string_lossy();
    let generate = Cli::try_parse_from([
        "triggerator",
        "generate",
        "--start-date",
        "2031-07-01",
        "--end-date",
        "2031-07-31",
        "--output",
        output.as_ref(),
    ])
    .unwrap();
    let text = ctx.execute(&generate.command).await.unwrap();
    assert!(text.contains("Generated from 2 feed row(s)"));

    let feeds = Cli::try_parse_from(["triggerator", "feeds"]).unwrap();
    let text = ctx.execute(&feeds.command).await.unwrap();
    assert!(text.contains("Moscow"));

    let run = Cli::try_parse_from(["triggerator", "run", "--yes"]).unwrap();
    let text = ctx.execute(&run.command).await.unwrap();
    assert!(text.contains("changed 2 entities"));

    // statuses were saved to the cache, so a new run has nothing to do
    let text = ctx.execute(&run.command).await.unwrap();
    assert!(text.contains("changed 0 entities"));
}
