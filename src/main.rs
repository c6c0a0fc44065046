use clap::Parser;
use std::io;
use std::path::PathBuf;
use tracing::Level;
use xclbin::param::ParameterSectionData;
use xclbin::xclbin::{ReadOptions, WriteOptions, XclBin};

#[derive(Parser)]
#[command(name = "xclbinutil", version, about = "Create, edit and inspect xclbin device images")]
struct Cli {
    /// Input xclbin; omitted to start from an empty container
    #[arg(short, long)]
    input: Option<PathBuf>,
    /// Output xclbin
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Rebuild the input from its mirror data instead of the binary header
    #[arg(long)]
    migrate_forward: bool,

    /// <SECTION>[<INDEX>][-<SUBSECTION>]:<FORMAT>:<FILE>, or :JSON:<FILE> for every node
    #[arg(long, value_name = "SECTION:FORMAT:FILE")]
    add_section: Vec<String>,
    #[arg(long, value_name = "SECTION:FORMAT:FILE")]
    replace_section: Vec<String>,
    #[arg(long, value_name = "SECTION:FORMAT:FILE")]
    add_replace_section: Vec<String>,
    #[arg(long, value_name = "SECTION:FORMAT:FILE")]
    add_merge_section: Vec<String>,
    /// :JSON:<FILE>
    #[arg(long, value_name = ":JSON:FILE")]
    append_section: Vec<String>,
    /// <SECTION> or <SECTION>[<INDEX>]
    #[arg(long, value_name = "SECTION")]
    remove_section: Vec<String>,
    /// <SECTION>[<INDEX>][-<SUBSECTION>]:<FORMAT>:<FILE>, or :JSON:<FILE> for all sections
    #[arg(long, value_name = "SECTION:FORMAT:FILE")]
    dump_section: Vec<String>,

    /// [USER | SYS]:<key>:<value>
    #[arg(long, value_name = "DOMAIN:KEY:VALUE")]
    key_value: Vec<String>,
    /// User key to remove
    #[arg(long, value_name = "KEY")]
    remove_key: Vec<String>,
    /// <symbol_name>:<instances>:<path_to_shared_library>
    #[arg(long, value_name = "SYMBOL:INSTANCES:LIBRARY")]
    add_pskernel: Vec<String>,

    /// Keep the container UUID when writing
    #[arg(long)]
    skip_uuid_insertion: bool,
    /// Indent the mirror JSON in the output
    #[arg(long)]
    pretty_mirror: bool,
    /// Print a summary of the resulting container
    #[arg(long)]
    info: bool,
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,
    #[arg(short, long)]
    quiet: bool,
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::TRACE
    } else if cli.quiet {
        Level::WARN
    } else {
        Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).with_target(false).init();

    if let Err(e) = run(cli) {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut xb = match &cli.input {
        Some(path) => XclBin::read(path, ReadOptions { migrate: cli.migrate_forward })?,
        None => XclBin::new(),
    };

    // ── Edits ────────────────────────────────────────────────────────────────
    for name in &cli.remove_section {
        xb.remove_section(name)?;
    }
    for arg in &cli.add_replace_section {
        xb.add_replace_section(&parse(arg)?)?;
    }
    for arg in &cli.add_merge_section {
        xb.add_merge_section(&parse(arg)?)?;
    }
    for arg in &cli.replace_section {
        xb.replace_section(&parse(arg)?)?;
    }
    for arg in &cli.add_section {
        let psd = parse(arg)?;
        if psd.section_name().is_empty() {
            xb.add_sections(&psd)?;
        } else {
            xb.add_section(&psd)?;
        }
    }
    for arg in &cli.append_section {
        xb.append_sections(&parse(arg)?)?;
    }
    for arg in &cli.add_pskernel {
        xb.add_ps_kernel(arg)?;
    }
    for key in &cli.remove_key {
        xb.remove_key(key)?;
    }
    for kv in &cli.key_value {
        xb.set_key_value(kv)?;
    }

    // ── Output ───────────────────────────────────────────────────────────────
    if let Some(output) = &cli.output {
        let opts = WriteOptions {
            skip_uuid_insertion: cli.skip_uuid_insertion,
            pretty_mirror:       cli.pretty_mirror,
        };
        xb.write(output, opts)?;
    }

    for arg in &cli.dump_section {
        let psd = parse(arg)?;
        if psd.section_name().is_empty() {
            xb.dump_sections(&psd)?;
        } else {
            xb.dump_section(&psd)?;
        }
    }

    if cli.info {
        let source = cli
            .output
            .as_ref()
            .or(cli.input.as_ref())
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<new>".into());
        xb.report_info(io::stdout().lock(), &source)?;
    }

    Ok(())
}

fn parse(arg: &str) -> Result<ParameterSectionData, Box<dyn std::error::Error>> {
    Ok(ParameterSectionData::parse(arg)?)
}
