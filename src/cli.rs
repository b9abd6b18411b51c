// Command line front end for firmpatch.
//
// Subcommands inspect, patch, re-encode and compare HEX images. An image is
// opened either with a meta file (CPU plus variables) or with a bare catalog
// CPU name.

use std::path::{Path, PathBuf};
use std::process;

use clap::{ArgAction, Args, Parser, Subcommand, ValueHint};
use log::info;
use serde::Serialize;

use crate::cpu::{self, CpuDescriptor};
use crate::error::{Error, Result};
use crate::hex::EncodeOptions;
use crate::hex::encoder::DEFAULT_MAX_RECORD_LENGTH;
use crate::image::Image;
use crate::io;
use crate::memory::MemoryMap;
use crate::variable::Value;

// ---------------------------------------------------------------------------
// Value parsers
// ---------------------------------------------------------------------------

fn parse_assignment(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected <variable>=<value>, got '{s}'")),
    }
}

// ---------------------------------------------------------------------------
// Clap CLI definition
// ---------------------------------------------------------------------------

/// Inspect and patch Intel-HEX firmware images.
#[derive(Parser, Debug)]
#[command(
    name = "firmpatch",
    version,
    about = "Inspect and patch Intel-HEX firmware images",
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,

    /// Force overwrite existing output files.
    #[arg(short = 'f', long, global = true)]
    force: bool,

    /// Quiet mode (suppress non-error output).
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Verbose mode (use multiple times for more detail).
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Print results as JSON.
    #[arg(long = "json", global = true)]
    json_output: bool,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// List the built-in CPU catalog.
    Cpus,
    /// Show regions and variables of an image.
    Info(InfoArgs),
    /// Print variable values.
    Get(GetArgs),
    /// Write variable values and save a new HEX file.
    Set(SetArgs),
    /// Re-encode an image.
    Dump(DumpArgs),
    /// Compare two images.
    Diff(DiffArgs),
}

/// How to lay out the image's memory.
#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct LayoutArgs {
    /// YAML meta file declaring the CPU and variables.
    #[arg(long, value_hint = ValueHint::FilePath)]
    meta: Option<PathBuf>,

    /// Catalog CPU name or comma separated aliases.
    #[arg(long)]
    cpu: Option<String>,
}

#[derive(Args, Debug)]
struct InfoArgs {
    #[command(flatten)]
    layout: LayoutArgs,

    /// HEX image.
    #[arg(value_hint = ValueHint::FilePath)]
    hex: PathBuf,
}

#[derive(Args, Debug)]
struct GetArgs {
    /// YAML meta file declaring the CPU and variables.
    #[arg(long, value_hint = ValueHint::FilePath)]
    meta: PathBuf,

    /// HEX image.
    #[arg(value_hint = ValueHint::FilePath)]
    hex: PathBuf,

    /// Variables to print (all when omitted).
    names: Vec<String>,
}

#[derive(Args, Debug)]
struct SetArgs {
    /// YAML meta file declaring the CPU and variables.
    #[arg(long, value_hint = ValueHint::FilePath)]
    meta: PathBuf,

    /// Write every variable's default value before the assignments.
    #[arg(long)]
    defaults: bool,

    /// Maximum data bytes per record.
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..), default_value_t = DEFAULT_MAX_RECORD_LENGTH as u8)]
    record_length: u8,

    /// HEX image.
    #[arg(value_hint = ValueHint::FilePath)]
    hex: PathBuf,

    /// Output HEX file.
    #[arg(value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// Assignments of the form <variable>=<value> (`null` leaves a variable untouched).
    #[arg(value_parser = parse_assignment)]
    assignments: Vec<(String, String)>,
}

#[derive(Args, Debug)]
struct DumpArgs {
    #[command(flatten)]
    layout: LayoutArgs,

    /// Maximum data bytes per record.
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..), default_value_t = DEFAULT_MAX_RECORD_LENGTH as u8)]
    record_length: u8,

    /// HEX image.
    #[arg(value_hint = ValueHint::FilePath)]
    hex: PathBuf,

    /// Output HEX file.
    #[arg(value_hint = ValueHint::FilePath)]
    output: PathBuf,
}

#[derive(Args, Debug)]
struct DiffArgs {
    #[command(flatten)]
    layout: LayoutArgs,

    /// Label of the base image in the output.
    #[arg(long, default_value = "base")]
    base_name: String,

    /// Base HEX image.
    #[arg(value_hint = ValueHint::FilePath)]
    base: PathBuf,

    /// HEX image compared against the base.
    #[arg(value_hint = ValueHint::FilePath)]
    other: PathBuf,
}

// ---------------------------------------------------------------------------
// Resolved command + options (flattened from Cli)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Cpus,
    Info,
    Get,
    Set,
    Dump,
    Diff,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Layout {
    None,
    Meta(PathBuf),
    Cpu(String),
}

impl From<LayoutArgs> for Layout {
    fn from(args: LayoutArgs) -> Self {
        match (args.meta, args.cpu) {
            (Some(meta), _) => Self::Meta(meta),
            (None, Some(cpu)) => Self::Cpu(cpu),
            (None, None) => Self::None,
        }
    }
}

#[derive(Debug)]
struct Options {
    command: Command,
    force: bool,
    quiet: bool,
    verbose: u8,
    json_output: bool,
    layout: Layout,
    input_file: Option<PathBuf>,
    other_file: Option<PathBuf>,
    output_file: Option<PathBuf>,
    names: Vec<String>,
    assignments: Vec<(String, String)>,
    apply_defaults: bool,
    record_length: usize,
    base_name: String,
}

fn resolve_options(cli: Cli) -> Options {
    let mut opts = Options {
        command: Command::Cpus,
        force: cli.force,
        quiet: cli.quiet,
        verbose: cli.verbose.min(3),
        json_output: cli.json_output,
        layout: Layout::None,
        input_file: None,
        other_file: None,
        output_file: None,
        names: Vec::new(),
        assignments: Vec::new(),
        apply_defaults: false,
        record_length: DEFAULT_MAX_RECORD_LENGTH,
        base_name: "base".to_string(),
    };

    match cli.command {
        Cmd::Cpus => {}
        Cmd::Info(args) => {
            opts.command = Command::Info;
            opts.layout = args.layout.into();
            opts.input_file = Some(args.hex);
        }
        Cmd::Get(args) => {
            opts.command = Command::Get;
            opts.layout = Layout::Meta(args.meta);
            opts.input_file = Some(args.hex);
            opts.names = args.names;
        }
        Cmd::Set(args) => {
            opts.command = Command::Set;
            opts.layout = Layout::Meta(args.meta);
            opts.input_file = Some(args.hex);
            opts.output_file = Some(args.output);
            opts.assignments = args.assignments;
            opts.apply_defaults = args.defaults;
            opts.record_length = usize::from(args.record_length);
        }
        Cmd::Dump(args) => {
            opts.command = Command::Dump;
            opts.layout = args.layout.into();
            opts.input_file = Some(args.hex);
            opts.output_file = Some(args.output);
            opts.record_length = usize::from(args.record_length);
        }
        Cmd::Diff(args) => {
            opts.command = Command::Diff;
            opts.layout = args.layout.into();
            opts.input_file = Some(args.base);
            opts.other_file = Some(args.other);
            opts.base_name = args.base_name;
        }
    }
    opts
}

#[cfg(any(test, feature = "fuzzing"))]
pub fn fuzz_try_parse_args(args: &[String]) {
    let argv: Vec<String> = std::iter::once("firmpatch".to_string())
        .chain(args.iter().cloned())
        .collect();
    if let Ok(cli) = Cli::try_parse_from(argv) {
        let _ = resolve_options(cli);
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct RegionSummary<'a> {
    name: &'a str,
    start_address: u32,
    size: u32,
    cell_size: usize,
    permissions: String,
    defined: usize,
}

fn region_summaries(map: &MemoryMap) -> Vec<RegionSummary<'_>> {
    map.iter()
        .map(|r| RegionSummary {
            name: r.name(),
            start_address: r.start_address(),
            size: r.size(),
            cell_size: r.cell_size(),
            permissions: r.permissions().to_string(),
            defined: r.contents().defined_count(),
        })
        .collect()
}

fn print_regions(regions: &[RegionSummary<'_>]) {
    for r in regions {
        println!(
            "  {:<14} {:#010X}  size {:#X}  cell {}  {:<2}  defined {}",
            r.name, r.start_address, r.size, r.cell_size, r.permissions, r.defined
        );
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| Error::Config(format!("cannot render JSON: {e}")))?;
    println!("{text}");
    Ok(())
}

fn open_image(layout: &Layout, hex: &Path) -> Result<Image> {
    match layout {
        Layout::Meta(meta) => io::load_image(hex, meta),
        Layout::Cpu(names) => io::load_image_for_cpu(hex, names),
        Layout::None => Err(Error::Config("either --meta or --cpu is required".into())),
    }
}

fn required<'a>(path: &'a Option<PathBuf>, what: &str) -> Result<&'a Path> {
    path.as_deref()
        .ok_or_else(|| Error::Config(format!("{what} file not specified")))
}

fn check_output(opts: &Options, output: &Path) -> Result<()> {
    if output.exists() && !opts.force {
        return Err(Error::Config(format!(
            "output file '{}' already exists (use --force to overwrite)",
            output.display()
        )));
    }
    Ok(())
}

fn save(opts: &Options, image: &Image, output: &Path) -> Result<()> {
    let lines = image.to_hex(&EncodeOptions {
        max_record_length: opts.record_length,
    })?;
    io::write_hex_lines(output, &lines)?;
    info!("wrote {} records to {}", lines.len(), output.display());
    if !opts.quiet && !opts.json_output {
        eprintln!("firmpatch: wrote {}", output.display());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct CpuSummary<'a> {
    name: &'a str,
    aliases: &'a [String],
    instruction_size: u32,
    padding_instruction: Option<u64>,
    regions: Vec<RegionSummary<'a>>,
}

fn cmd_cpus(opts: &Options) -> Result<i32> {
    let catalog = cpu::catalog();
    let maps = catalog
        .iter()
        .map(CpuDescriptor::build_map)
        .collect::<Result<Vec<_>>>()?;

    let summaries: Vec<CpuSummary<'_>> = catalog
        .iter()
        .zip(&maps)
        .map(|(cpu, map)| CpuSummary {
            name: &cpu.name,
            aliases: &cpu.aliases,
            instruction_size: cpu.instruction_size,
            padding_instruction: cpu.padding_instruction,
            regions: region_summaries(map),
        })
        .collect();

    if opts.json_output {
        print_json(&summaries)?;
    } else {
        for (cpu, summary) in catalog.iter().zip(&summaries) {
            println!("{cpu}");
            print_regions(&summary.regions);
        }
    }
    Ok(0)
}

#[derive(Debug, Serialize)]
struct VariableReport {
    name: String,
    #[serde(rename = "type")]
    var_type: String,
    region: String,
    address: u32,
    array_depth: Option<usize>,
    value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn variable_reports(image: &Image, names: &[String]) -> Result<Vec<VariableReport>> {
    let selected: Vec<_> = if names.is_empty() {
        image.variables().iter().collect()
    } else {
        names
            .iter()
            .map(|n| image.variable(n))
            .collect::<Result<Vec<_>>>()?
    };

    Ok(selected
        .into_iter()
        .map(|v| {
            let (value, error) = match image.get(v.name()) {
                Ok(value) => (value, None),
                Err(e) => (None, Some(e.to_string())),
            };
            VariableReport {
                name: v.name().to_string(),
                var_type: v.var_type().to_string(),
                region: v.region().to_string(),
                address: v.address(),
                array_depth: v.is_array().then(|| v.array_depth()),
                value,
                error,
            }
        })
        .collect())
}

fn value_text(r: &VariableReport) -> String {
    match (&r.value, &r.error) {
        (_, Some(error)) => format!("<error: {error}>"),
        (Some(value), None) => value.to_string(),
        (None, None) => "null".to_string(),
    }
}

#[derive(Debug, Serialize)]
struct InfoReport<'a> {
    cpu: &'a str,
    regions: Vec<RegionSummary<'a>>,
    variables: Vec<VariableReport>,
}

fn cmd_info(opts: &Options) -> Result<i32> {
    let image = open_image(&opts.layout, required(&opts.input_file, "input")?)?;
    let report = InfoReport {
        cpu: &image.cpu().name,
        regions: region_summaries(image.map()),
        variables: variable_reports(&image, &[])?,
    };

    if opts.json_output {
        print_json(&report)?;
        return Ok(0);
    }
    println!("cpu: {}", image.cpu());
    println!("regions:");
    print_regions(&report.regions);
    if !report.variables.is_empty() {
        println!("variables:");
        for (v, r) in image.variables().iter().zip(&report.variables) {
            println!("  {v} = {}", value_text(r));
        }
    }
    Ok(0)
}

fn cmd_get(opts: &Options) -> Result<i32> {
    let image = open_image(&opts.layout, required(&opts.input_file, "input")?)?;
    let reports = variable_reports(&image, &opts.names)?;

    if opts.json_output {
        print_json(&reports)?;
    } else {
        for r in &reports {
            println!("{} = {}", r.name, value_text(r));
        }
    }
    Ok(if reports.iter().any(|r| r.error.is_some()) { 1 } else { 0 })
}

fn cmd_set(opts: &Options) -> Result<i32> {
    let output = required(&opts.output_file, "output")?;
    check_output(opts, output)?;
    let mut image = open_image(&opts.layout, required(&opts.input_file, "input")?)?;

    if opts.apply_defaults {
        image.apply_defaults()?;
    }
    for (name, text) in &opts.assignments {
        image.set_text(name, text)?;
        info!("{name} <- {text}");
    }
    save(opts, &image, output)?;
    Ok(0)
}

fn cmd_dump(opts: &Options) -> Result<i32> {
    let output = required(&opts.output_file, "output")?;
    check_output(opts, output)?;
    let image = open_image(&opts.layout, required(&opts.input_file, "input")?)?;
    save(opts, &image, output)?;
    Ok(0)
}

fn cmd_diff(opts: &Options) -> Result<i32> {
    let base = open_image(&opts.layout, required(&opts.input_file, "base")?)?;
    let other = open_image(&opts.layout, required(&opts.other_file, "other")?)?;
    let diffs = base.diff(&other, &opts.base_name);

    if opts.json_output {
        print_json(&diffs)?;
    } else if !opts.quiet {
        for d in &diffs {
            println!("{d}");
        }
    }
    Ok(if diffs.is_empty() { 0 } else { 1 })
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn log_filter(quiet: bool, verbose: u8) -> &'static str {
    match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    }
}

/// Main CLI entry point. Parses arguments via clap, dispatches commands.
pub fn run() -> ! {
    let cli = Cli::parse();
    let opts = resolve_options(cli);

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(log_filter(opts.quiet, opts.verbose)),
    )
    .format_timestamp(None)
    .format_target(false)
    .init();

    let result = match opts.command {
        Command::Cpus => cmd_cpus(&opts),
        Command::Info => cmd_info(&opts),
        Command::Get => cmd_get(&opts),
        Command::Set => cmd_set(&opts),
        Command::Dump => cmd_dump(&opts),
        Command::Diff => cmd_diff(&opts),
    };

    let exit_code = match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("firmpatch: {e}");
            if opts.command == Command::Diff { 2 } else { 1 }
        }
    };
    process::exit(exit_code);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
