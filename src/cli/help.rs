//! CLI help and command-name contract for logging and routing.

use crate::cli::parse::Commands;

/// Command name string for log fields (e.g. "generate", "check_rule").
pub fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::Validate { .. } => "validate",
        Commands::Feeds { .. } => "feeds",
        Commands::CheckRule { .. } => "check_rule",
        Commands::Generate { .. } => "generate",
        Commands::Run { .. } => "run",
    }
}

/// Whether the command may change the live campaign.
pub fn is_mutating(command: &Commands) -> bool {
    matches!(command, Commands::Run { dry_run: false, .. })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::parse::Cli;
    use chrono::NaiveDate;
    use clap::Parser;

    #[test]
    fn test_command_names() {
        let cli = Cli::try_parse_from(["triggerator", "check-rule", "temp > 20"]).unwrap();
        assert_eq!(command_name(&cli.command), "check_rule");
        let cli = Cli::try_parse_from(["triggerator", "generate", "--update"]).unwrap();
        assert_eq!(command_name(&cli.command), "generate");
    }

    #[test]
    fn test_mutating_commands() {
        let run = Cli::try_parse_from(["triggerator", "run", "--yes"]).unwrap();
        assert!(is_mutating(&run.command));
        let dry = Cli::try_parse_from(["triggerator", "run", "--dry-run"]).unwrap();
        assert!(!is_mutating(&dry.command));
        let feeds = Cli::try_parse_from(["triggerator", "feeds"]).unwrap();
        assert!(!is_mutating(&feeds.command));
    }

    #[test]
    fn test_generate_dates_parse() {
        let cli = Cli::try_parse_from([
            "triggerator",
            "generate",
            "--start-date",
            "2021-07-01",
            "--end-date",
            "2021-07-31",
        ])
        .unwrap();
        match cli.command {
            Commands::Generate {
                start_date,
                end_date,
                ..
            } => {
                assert_eq!(start_date, NaiveDate::from_ymd_opt(2021, 7, 1));
                assert_eq!(end_date, NaiveDate::from_ymd_opt(2021, 7, 31));
            }
            _ => panic!("expected generate"),
        }
        assert!(Cli::try_parse_from(["triggerator", "generate", "--start-date", "07/01/2021"])
            .is_err());
    }
}
