use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::commands::{self, CommandReport};

#[derive(Debug, Parser)]
#[command(
    name = "worklog-review",
    version,
    about = "Classify coding-assistant session logs by priority and roll them up into effort reports"
)]
struct Cli {
    /// Emit the command report as JSON.
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Report on turns timestamped inside a recent window or a local day.
    Daily {
        #[arg(long, default_value_t = 24, conflicts_with = "date")]
        hours: u32,
        /// Local calendar day (YYYY-MM-DD) in the configured timezone.
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        no_save: bool,
        /// Print the full report JSON to stdout.
        #[arg(long)]
        print: bool,
    },
    /// Review whole sessions modified in the last N days.
    Review {
        #[arg(long, default_value_t = 7)]
        days: u32,
        #[arg(long)]
        min_turns: Option<usize>,
        #[arg(long)]
        no_save: bool,
        #[arg(long)]
        print: bool,
    },
    /// Roll up saved daily reports.
    Weekly {
        #[arg(long, default_value_t = 7)]
        days: u32,
        #[arg(long)]
        no_save: bool,
        #[arg(long)]
        print: bool,
    },
    /// List eligible session logs.
    Sessions {
        #[arg(long)]
        since_days: Option<u32>,
        #[arg(long)]
        min_turns: Option<usize>,
    },
}

fn render(report: &CommandReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    if let Some(payload) = &report.payload {
        for line in &report.details {
            eprintln!("{line}");
        }
        println!("{}", serde_json::to_string_pretty(payload)?);
    } else {
        println!("command={}", report.command);
        for line in &report.details {
            println!("{line}");
        }
    }
    for issue in &report.issues {
        eprintln!("issue: {issue}");
    }
    Ok(())
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let report = match cli.command {
        Command::Daily {
            hours,
            date,
            no_save,
            print,
        } => commands::daily::run(&commands::daily::DailyOptions {
            hours,
            date,
            save: !no_save,
            print,
        })?,
        Command::Review {
            days,
            min_turns,
            no_save,
            print,
        } => commands::review::run(&commands::review::ReviewOptions {
            days,
            min_turns,
            save: !no_save,
            print,
        })?,
        Command::Weekly {
            days,
            no_save,
            print,
        } => commands::weekly::run(&commands::weekly::WeeklyOptions {
            days,
            save: !no_save,
            print,
        })?,
        Command::Sessions {
            since_days,
            min_turns,
        } => commands::sessions::run(&commands::sessions::SessionsOptions {
            since_days,
            min_turns,
        })?,
    };

    render(&report, cli.json)?;
    if !report.ok {
        anyhow::bail!(
            "{} finished with {} issue(s)",
            report.command,
            report.issues.len()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::Cli;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
