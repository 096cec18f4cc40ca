// Command line utility for building marker reports

use anyhow::{bail, format_err, Context, Error};
use clap::{value_parser, Arg, ArgAction, ArgGroup, ArgMatches, Command};
use log::info;
use marker_report::annotate::GeneDescriptions;
use marker_report::io::{read_table, write_table, write_tables};
use marker_report::report::{
    build_report, conserved_from_clusters, conserved_markers, top_markers, ReportConfig, ReportKind,
};
use marker_report::{Idents, RenameMap, Table};
use std::path::{Path, PathBuf};

fn report_args() -> Vec<Arg> {
    vec![
        Arg::new("ANNOTATIONS")
            .help("Gene annotation table with gene name and description columns")
            .short('a')
            .long("annotations")
            .required(true)
            .value_parser(value_parser!(PathBuf)),
        Arg::new("OUT")
            .help("Report file (.csv, .tsv, optionally .gz)")
            .short('o')
            .long("out")
            .required(true)
            .value_parser(value_parser!(PathBuf)),
        Arg::new("TOP_OUT")
            .help("Also write the top markers of each cluster to this file")
            .long("top-out")
            .value_parser(value_parser!(PathBuf)),
        Arg::new("TOP_N")
            .help("Number of top markers per cluster [default: 5]")
            .short('n')
            .long("top-n")
            .value_parser(value_parser!(usize)),
        Arg::new("TIES")
            .help("Rows tied with the last top marker")
            .long("ties")
            .value_parser(["keep", "strict"]),
        Arg::new("JOIN")
            .help("Keep (left) or drop (inner) markers without a description")
            .long("join")
            .value_parser(["inner", "left"]),
        Arg::new("RENAME")
            .help("Two-column table of old and new cluster labels")
            .long("rename")
            .value_parser(value_parser!(PathBuf)),
    ]
}

pub fn main() -> Result<(), Error> {
    let matches = Command::new("marker-report-cmd")
        .about("Annotate, sort and rank marker genes of single-cell clusters")
        .subcommand_required(true)
        .arg(
            Arg::new("CONFIG")
                .help("JSON config file")
                .short('c')
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("VERBOSE")
                .help("Debug logging")
                .short('v')
                .long("verbose")
                .global(true)
                .action(ArgAction::SetTrue),
        )
        .subcommand(
            Command::new("all")
                .about("Markers of every cluster against all other cells")
                .arg(
                    Arg::new("MARKERS")
                        .help("Marker table with gene and cluster columns")
                        .required(true)
                        .index(1)
                        .value_parser(value_parser!(PathBuf)),
                )
                .args(report_args()),
        )
        .subcommand(
            Command::new("conserved")
                .about("Markers of every cluster found in each condition")
                .arg(
                    Arg::new("CLUSTER")
                        .help("Cluster label and its conserved marker table, as LABEL=PATH; repeat per cluster")
                        .long("cluster")
                        .action(ArgAction::Append),
                )
                .arg(
                    Arg::new("CONDITION")
                        .help("Condition name and its all-cluster marker table, as NAME=PATH; repeat per condition")
                        .long("condition")
                        .action(ArgAction::Append),
                )
                .group(ArgGroup::new("INPUT").args(["CLUSTER", "CONDITION"]).required(true))
                .arg(
                    Arg::new("CLUSTERS")
                        .help("Clusters to report, in order [default: all, as found in the first condition]")
                        .long("clusters")
                        .requires("CONDITION")
                        .value_delimiter(','),
                )
                .args(report_args()),
        )
        .subcommand(
            Command::new("pairwise")
                .about("Markers between two clusters")
                .arg(
                    Arg::new("MARKERS")
                        .help("Marker table with genes as the first column")
                        .required(true)
                        .index(1)
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(
                    Arg::new("COMPARISON")
                        .help("Label of the comparison, written as the first column")
                        .long("comparison"),
                )
                .args(report_args()),
        )
        .subcommand(
            Command::new("rename-idents")
                .about("Relabel the cluster identity of every cell")
                .arg(
                    Arg::new("IDENTS")
                        .help("Table of cells and their cluster")
                        .required(true)
                        .index(1)
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(
                    Arg::new("MAP")
                        .help("Two-column table of old and new labels")
                        .long("map")
                        .required(true)
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(
                    Arg::new("OUT")
                        .short('o')
                        .long("out")
                        .required(true)
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(
                    Arg::new("IDENT_COLUMN")
                        .help("Cluster column of the cell table")
                        .long("ident-column")
                        .default_value("cluster"),
                )
                .arg(
                    Arg::new("SUBSET")
                        .help("Only write cells with these (new) labels")
                        .long("subset")
                        .value_delimiter(','),
                )
                .arg(
                    Arg::new("EXCLUDE")
                        .help("Drop cells whose (new) label contains this text")
                        .long("exclude"),
                )
                .arg(
                    Arg::new("ONLY")
                        .help("Drop cells whose (new) label does not contain this text")
                        .long("only")
                        .conflicts_with("EXCLUDE"),
                ),
        )
        .get_matches();

    let level = if matches.get_flag("VERBOSE") { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();

    let mut config = match matches.get_one::<PathBuf>("CONFIG") {
        Some(path) => ReportConfig::from_json(path)?,
        None => ReportConfig::default(),
    };

    match matches.subcommand() {
        Some(("all", sub)) => {
            apply_overrides(sub, &mut config)?;
            let markers = read_table(sub.get_one::<PathBuf>("MARKERS").unwrap(), "markers")?;
            run_report(ReportKind::Cluster, &markers, sub, &config)
        }
        Some(("conserved", sub)) => {
            apply_overrides(sub, &mut config)?;
            let markers = if let Some(clusters) = sub.get_many::<String>("CLUSTER") {
                let clusters = clusters.map(|c| read_labeled(c)).collect::<Result<Vec<_>, Error>>()?;
                conserved_from_clusters(&clusters, &config.columns)?
            } else {
                let conditions = sub
                    .get_many::<String>("CONDITION")
                    .unwrap()
                    .map(|c| read_labeled(c))
                    .collect::<Result<Vec<_>, Error>>()?;
                check_conditions(&conditions, &config.conditions)?;
                let clusters = sub
                    .get_many::<String>("CLUSTERS")
                    .map(|c| c.cloned().collect::<Vec<_>>());
                conserved_markers(&conditions, clusters.as_deref(), &config.columns)?
            };
            run_report(ReportKind::Conserved, &markers, sub, &config)
        }
        Some(("pairwise", sub)) => {
            apply_overrides(sub, &mut config)?;
            if let Some(comparison) = sub.get_one::<String>("COMPARISON") {
                config.comparison = Some(comparison.clone());
            }
            let markers = read_table(sub.get_one::<PathBuf>("MARKERS").unwrap(), "markers")?;
            run_report(ReportKind::Pairwise, &markers, sub, &config)
        }
        Some(("rename-idents", sub)) => rename_idents(sub, &config),
        _ => unreachable!("subcommand is required"),
    }
}

/// Fold command line options over the config file
fn apply_overrides(sub: &ArgMatches, config: &mut ReportConfig) -> Result<(), Error> {
    if let Some(&n) = sub.get_one::<usize>("TOP_N") {
        config.top_n = n;
    }
    if let Some(ties) = sub.get_one::<String>("TIES") {
        config.ties = ties.parse()?;
    }
    if let Some(join) = sub.get_one::<String>("JOIN") {
        config.join = Some(join.parse()?);
    }
    if let Some(path) = sub.get_one::<PathBuf>("RENAME") {
        config.rename = read_rename_map(path)?;
    }
    Ok(())
}

fn read_rename_map(path: &Path) -> Result<RenameMap, Error> {
    let table = read_table(path, "rename")?;
    let [from, to, ..] = table.header() else {
        bail!("{}: expected two columns of old and new labels", path.display());
    };
    RenameMap::from_table(&table, from, to).with_context(|| path.display().to_string())
}

fn parse_labeled(arg: &str) -> Result<(&str, &str), Error> {
    arg.split_once('=')
        .filter(|(label, path)| !label.is_empty() && !path.is_empty())
        .ok_or_else(|| format_err!("expected LABEL=PATH, got '{}'", arg))
}

/// Read the table of a `LABEL=PATH` argument
fn read_labeled(arg: &str) -> Result<(String, Table), Error> {
    let (label, path) = parse_labeled(arg)?;
    Ok((label.to_owned(), read_table(path, label)?))
}

/// The config file may name the expected conditions; they must match the command line.
fn check_conditions(conditions: &[(String, Table)], expected: &[String]) -> Result<(), Error> {
    if expected.is_empty() {
        return Ok(());
    }
    let given = conditions.iter().map(|(name, _)| name.as_str()).collect::<Vec<_>>();
    if given != expected {
        bail!(
            "conditions {:?} on the command line differ from {:?} in the config",
            given,
            expected
        );
    }
    Ok(())
}

fn run_report(kind: ReportKind, markers: &Table, sub: &ArgMatches, config: &ReportConfig) -> Result<(), Error> {
    let annotations = read_table(sub.get_one::<PathBuf>("ANNOTATIONS").unwrap(), "annotations")?;
    let descriptions =
        GeneDescriptions::from_table(&annotations, &config.columns.annotation_gene, &config.columns.description)?;

    let report = build_report(kind, markers, &descriptions, config)?;
    let top = match sub.get_one::<PathBuf>("TOP_OUT") {
        Some(path) => Some((path, top_markers(kind, &report, config)?)),
        None => None,
    };

    let mut outputs = vec![(&report, sub.get_one::<PathBuf>("OUT").unwrap().as_path())];
    if let Some((path, top)) = &top {
        info!("top {} markers per group: {} rows", config.top_n, top.len());
        outputs.push((top, path.as_path()));
    }
    write_tables(&outputs, config.delimiter_byte()?)
}

fn rename_idents(sub: &ArgMatches, config: &ReportConfig) -> Result<(), Error> {
    let cells = read_table(sub.get_one::<PathBuf>("IDENTS").unwrap(), "idents")?;
    let ident_column = sub.get_one::<String>("IDENT_COLUMN").unwrap();
    let ident_col = cells.column(ident_column)?;
    let map = read_rename_map(sub.get_one::<PathBuf>("MAP").unwrap())?;

    let renamed = Idents::from_assignments(&cells.values(ident_col).collect::<Vec<_>>()).rename(&map);
    info!(
        "{} cells in {} identities after renaming",
        renamed.num_cells(),
        renamed.labels.len()
    );
    let labels = renamed.assignments()?;

    let mut idents = renamed.clone();
    if let Some(pattern) = sub.get_one::<String>("EXCLUDE") {
        let dropped = idents.remove_like(pattern);
        info!("dropped {} cells with identities like '{}'", dropped.len(), pattern);
    }
    if let Some(pattern) = sub.get_one::<String>("ONLY") {
        let dropped = idents.remove_unlike(pattern);
        info!("dropped {} cells with identities unlike '{}'", dropped.len(), pattern);
    }
    let selected = match sub.get_many::<String>("SUBSET") {
        Some(subset) => idents.subset(&subset.map(String::as_str).collect::<Vec<_>>())?,
        None => {
            // every remaining cell, in input order
            let mut cells = idents.indices.clone();
            cells.sort_unstable();
            cells
        }
    };
    let rows = selected
        .into_iter()
        .map(|cell| {
            let mut row = cells.rows()[cell].clone();
            row[ident_col] = labels[cell].to_owned();
            row
        })
        .collect();
    let out = cells.with_rows(rows)?;
    write_table(&out, sub.get_one::<PathBuf>("OUT").unwrap(), config.delimiter_byte()?)
}
