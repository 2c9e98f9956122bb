use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Args;

use flowtag_core::aggregate::aggregate_flow_log;
use flowtag_core::digest::InputFile;
use flowtag_core::flowlog::{FlowLogOptions, FlowLogReader};
use flowtag_core::lookup::LookupTable;
use flowtag_core::report::{FlowReport, ReportFormat, ReportInputs};

use super::ReferenceArgs;

#[derive(Args)]
pub struct ReportArgs {
    /// Path to the version 2 flow log
    pub flowlog: PathBuf,

    /// Lookup table CSV (dstport,protocol,tag)
    #[arg(short, long)]
    pub lookup: PathBuf,

    #[command(flatten)]
    pub reference: ReferenceArgs,

    /// Output file for the report
    #[arg(short, long, default_value = "output.txt")]
    pub out: PathBuf,

    /// Report format
    #[arg(short, long, default_value = "text", value_parser = parse_format)]
    pub format: ReportFormat,

    /// Maximum space separated fields tolerated per flow log line
    #[arg(long, default_value_t = FlowLogOptions::default().max_fields)]
    pub max_fields: usize,
}

fn parse_format(s: &str) -> Result<ReportFormat, String> {
    match s.to_lowercase().as_str() {
        "text" | "txt" => Ok(ReportFormat::Text),
        "json" => Ok(ReportFormat::Json),
        _ => Err(format!("unknown format '{}': expected text or json", s)),
    }
}

pub fn run(args: ReportArgs) -> Result<()> {
    let started = Instant::now();

    // a missing flow log fails before anything is loaded
    let log_file = File::open(&args.flowlog)
        .with_context(|| format!("cannot open flow log {}", args.flowlog.display()))?;

    // 1. Protocol reference
    println!(
        "  {} {}",
        console::style("[1/4] loading protocols").cyan().bold(),
        args.reference.describe(),
    );
    let protocols = args.reference.load()?;
    println!(
        "        {} protocol numbers",
        console::style(protocols.len()).green().bold(),
    );

    // 2. Lookup table
    println!(
        "  {} {}",
        console::style("[2/4] loading lookup table").cyan().bold(),
        args.lookup.display(),
    );
    let lookup = LookupTable::from_path(&args.lookup, &protocols)
        .with_context(|| format!("failed to load lookup table {}", args.lookup.display()))?;
    println!(
        "        {} entries",
        console::style(lookup.len()).green().bold(),
    );
    if lookup.overwritten() > 0 {
        println!(
            "  {} {} lookup rows redefined an earlier port/protocol, the last row wins",
            console::style("warning:").yellow().bold(),
            lookup.overwritten(),
        );
    }

    // 3. Flow log
    println!(
        "  {} {}",
        console::style("[3/4] tagging flow log").cyan().bold(),
        args.flowlog.display(),
    );
    let options = FlowLogOptions {
        max_fields: args.max_fields,
    };
    let reader = FlowLogReader::with_options(BufReader::new(log_file), options);
    let aggregates = aggregate_flow_log(reader, &lookup)
        .with_context(|| format!("failed to read flow log {}", args.flowlog.display()))?;

    let summary = &aggregates.summary;
    println!(
        "        {} records, {} skipped, {} tags, {} port/protocol combinations",
        console::style(summary.records).green().bold(),
        summary.skipped,
        aggregates.tag_counts.len(),
        aggregates.port_protocol_counts.len(),
    );
    for (reason, count) in &summary.skipped_by_reason {
        println!("          {}: {}", console::style(reason).yellow(), count);
    }

    // 4. Report
    println!(
        "  {}",
        console::style("[4/4] writing report").cyan().bold(),
    );
    let inputs = ReportInputs {
        flow_log: Some(InputFile::from_path(&args.flowlog)?),
        lookup_table: Some(InputFile::from_path(&args.lookup)?),
        protocols: match &args.reference.protocols {
            Some(path) => Some(InputFile::from_path(path)?),
            None => None,
        },
    };
    let report = FlowReport::build(&aggregates, &lookup, &protocols)
        .context("failed to resolve protocol names for report")?
        .with_inputs(inputs);

    let rendered = report
        .render(args.format)
        .context("failed to serialize report")?;
    std::fs::write(&args.out, &rendered)
        .with_context(|| format!("failed to write {}", args.out.display()))?;
    tracing::info!(out = %args.out.display(), bytes = rendered.len(), "report written");

    let elapsed = started.elapsed();
    println!();
    println!(
        "  {} {}",
        console::style("report ->").green().bold(),
        args.out.display(),
    );
    println!(
        "  {} {:.1}ms",
        console::style("completed in").white().bold(),
        elapsed.as_secs_f64() * 1000.0,
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_format() {
        assert_eq!(parse_format("JSON"), Ok(ReportFormat::Json));
        assert_eq!(parse_format("txt"), Ok(ReportFormat::Text));
        assert!(parse_format("xml").is_err());
    }

    #[test]
    fn test_run_writes_text_report() {
        let dir = tempfile::tempdir().unwrap();
        let flowlog = dir.path().join("flow.log");
        let lookup = dir.path().join("lookup.csv");
        let out = dir.path().join("output.txt");
        std::fs::write(
            &flowlog,
            "2 1 eni-1 10.0.0.1 10.0.0.2 50000 443 6 1 1 1 1 ACCEPT OK\n\
             2 1 eni-1 10.0.0.1 10.0.0.2 50000 443 17 1 1 1 1 ACCEPT OK\n",
        )
        .unwrap();
        std::fs::write(&lookup, "dstport,protocol,tag\n443,tcp,web\n").unwrap();

        run(ReportArgs {
            flowlog,
            lookup,
            reference: ReferenceArgs {
                protocols: None,
                iana_layout: false,
            },
            out: out.clone(),
            format: ReportFormat::Text,
            max_fields: 15,
        })
        .unwrap();

        let text = std::fs::read_to_string(&out).unwrap();
        assert_eq!(
            text,
            "Tag Counts:\nTag,Count\nweb,1\nUntagged,1\n\n\
             Port/Protocol Combination Counts:\nPort,Protocol,Count\n443,TCP,1\n443,UDP,1\n"
        );
    }

    #[test]
    fn test_run_fails_on_missing_flow_log() {
        let dir = tempfile::tempdir().unwrap();
        let err = run(ReportArgs {
            flowlog: dir.path().join("missing.log"),
            lookup: dir.path().join("lookup.csv"),
            reference: ReferenceArgs {
                protocols: None,
                iana_layout: false,
            },
            out: dir.path().join("output.txt"),
            format: ReportFormat::Text,
            max_fields: 15,
        })
        .unwrap_err();
        assert!(format!("{err:#}").contains("cannot open flow log"));
    }
}
