//! Thin command-line front-end for the stratum store.
//!
//! The heavy lifting (analysis, build planning, graph storage) lives
//! elsewhere: analyzers produce bundle JSON, `plan` writes a Makefile
//! whose rules invoke them, and `import`/`api describe` are small shims
//! over the store crate.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use stratum_graph::{Def, GraphOutput, Ref, SourceUnit, UnitKey};
use stratum_store::{
    by_commit_ids, by_def_path, by_files, by_repos, by_units, ref_filter_fn, CancellationToken,
    DefFilter, FsMultiRepoStore, MultiRepoImporter, RefFilter, UnitStore,
};
use stratum_vfs::LocalFs;

const CONFIG_FILE: &str = ".stratum/config.json";
const MAKEFILE: &str = ".stratum/Makefile";
const DEFAULT_STORE_DIR: &str = ".stratum/store";

#[derive(Parser)]
#[command(
    name = "stratum",
    version,
    about = "stratum CLI (config, plan, make, import, api)"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the resolved repository configuration
    Config(ConfigArgs),
    /// Write a Makefile with one analyzer rule per source unit
    Plan(ConfigArgs),
    /// Execute the planned Makefile
    Make(MakeArgs),
    /// Import an analyzer bundle into the store
    Import(ImportArgs),
    /// Read APIs over the stored graph
    Api(ApiArgs),
}

#[derive(Args)]
struct ConfigArgs {
    /// Repository root (defaults to the current directory)
    #[arg(short = 'C', long, default_value = ".")]
    directory: PathBuf,
}

#[derive(Args)]
struct MakeArgs {
    /// Repository root (defaults to the current directory)
    #[arg(short = 'C', long, default_value = ".")]
    directory: PathBuf,
    /// Makefile targets to build (default: all)
    targets: Vec<String>,
}

#[derive(Args)]
struct ImportArgs {
    /// Repository root (defaults to the current directory)
    #[arg(short = 'C', long, default_value = ".")]
    directory: PathBuf,
    /// Bundle JSON produced by an analyzer
    #[arg(long)]
    bundle: PathBuf,
    /// Source unit name the bundle belongs to
    #[arg(long)]
    unit: String,
    /// Source unit type the bundle belongs to
    #[arg(long)]
    unit_type: String,
    /// Store directory (defaults to `.stratum/store` under the repo root)
    #[arg(long)]
    store: Option<PathBuf>,
}

#[derive(Args)]
struct ApiArgs {
    #[command(subcommand)]
    command: ApiCommand,
}

#[derive(Subcommand)]
enum ApiCommand {
    /// Describe the def referenced at a byte position in a file
    Describe(DescribeArgs),
}

#[derive(Args)]
struct DescribeArgs {
    /// Repository root (defaults to the current directory)
    #[arg(short = 'C', long, default_value = ".")]
    directory: PathBuf,
    /// File the cursor is in, relative to the repo root
    #[arg(long)]
    file: String,
    /// Byte offset of the cursor
    #[arg(long)]
    start_byte: u32,
    /// Store directory (defaults to `.stratum/store` under the repo root)
    #[arg(long)]
    store: Option<PathBuf>,
}

/// `.stratum/config.json`: what the repo is and which units it contains.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct RepoConfig {
    repo: String,
    #[serde(rename = "CommitID")]
    commit_id: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    source_units: Vec<SourceUnit>,
}

impl RepoConfig {
    fn load(root: &Path) -> Result<Self> {
        let path = root.join(CONFIG_FILE);
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("read {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))
    }
}

fn open_store(root: &Path, store: &Option<PathBuf>) -> FsMultiRepoStore {
    let store_dir = store
        .clone()
        .unwrap_or_else(|| root.join(DEFAULT_STORE_DIR));
    FsMultiRepoStore::new(Arc::new(LocalFs::new(store_dir)))
}

fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Config(args) => {
            let config = RepoConfig::load(&args.directory)?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Command::Plan(args) => plan(&args.directory),
        Command::Make(args) => make(&args.directory, &args.targets),
        Command::Import(args) => import(&args),
        Command::Api(args) => match args.command {
            ApiCommand::Describe(args) => describe(&args),
        },
    }
}

/// Data file an analyzer rule writes its bundle to.
fn unit_data_file(config: &RepoConfig, unit: &SourceUnit) -> String {
    format!(
        ".stratum/data/{}/{}/{}.graph.json",
        config.commit_id, unit.unit_type, unit.name
    )
}

fn plan(root: &Path) -> Result<()> {
    let config = RepoConfig::load(root)?;
    if config.source_units.is_empty() {
        bail!("no source units configured in {CONFIG_FILE}");
    }

    let mut mf = String::new();
    let targets: Vec<String> = config
        .source_units
        .iter()
        .map(|u| unit_data_file(&config, u))
        .collect();
    mf.push_str(&format!(".PHONY: all\nall: {}\n", targets.join(" ")));
    for (unit, target) in config.source_units.iter().zip(&targets) {
        mf.push_str(&format!(
            "\n{target}: {prereqs}\n\t@mkdir -p $(@D)\n\tstratum-analyze graph --unit {unit_name} --unit-type {unit_type} 1> $@\n",
            prereqs = unit.files.join(" "),
            unit_name = unit.name,
            unit_type = unit.unit_type,
        ));
    }

    let path = root.join(MAKEFILE);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, mf).with_context(|| format!("write {}", path.display()))?;
    println!("wrote {}", path.display());
    Ok(())
}

fn make(root: &Path, targets: &[String]) -> Result<()> {
    let makefile = root.join(MAKEFILE);
    if !makefile.exists() {
        bail!("no planned Makefile at {}; run `stratum plan` first", makefile.display());
    }

    let mut cmd = std::process::Command::new("make");
    cmd.arg("-f").arg(&makefile).current_dir(root);
    if targets.is_empty() {
        cmd.arg("all");
    } else {
        cmd.args(targets);
    }

    let status = cmd.status().context("spawn make")?;
    if !status.success() {
        bail!("make failed with {status}");
    }
    Ok(())
}

fn import(args: &ImportArgs) -> Result<()> {
    let config = RepoConfig::load(&args.directory)?;
    let raw = fs::read_to_string(&args.bundle)
        .with_context(|| format!("read {}", args.bundle.display()))?;
    let output: GraphOutput =
        serde_json::from_str(&raw).with_context(|| format!("parse {}", args.bundle.display()))?;

    let unit = config
        .source_units
        .iter()
        .find(|u| u.name == args.unit && u.unit_type == args.unit_type)
        .cloned()
        .unwrap_or_else(|| SourceUnit::new(&args.unit_type, &args.unit));

    let store = open_store(&args.directory, &args.store);
    store.import_unit(&config.repo, &config.commit_id, &unit, output)?;
    println!(
        "imported {}:{} into {} at {}",
        args.unit_type, args.unit, config.repo, config.commit_id
    );
    Ok(())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    def: Option<Def>,
    r#ref: Ref,
}

fn describe(args: &DescribeArgs) -> Result<()> {
    let config = RepoConfig::load(&args.directory)?;
    let store = open_store(&args.directory, &args.store);
    let token = CancellationToken::new();

    let (file, start_byte) = (args.file.clone(), args.start_byte);
    let ref_filters: Vec<Arc<dyn RefFilter>> = vec![
        by_repos([config.repo.clone()]),
        by_commit_ids([config.commit_id.clone()]),
        by_files([args.file.clone()]),
        ref_filter_fn(move |r| r.file == file && r.start <= start_byte && start_byte < r.end),
    ];
    let refs = store.refs(&token, &ref_filters)?;
    let Some(r) = refs.into_iter().next() else {
        bail!("no ref found at {}:{}", args.file, args.start_byte);
    };

    let def_filters: Vec<Arc<dyn DefFilter>> = vec![
        by_repos([r.def_repo.clone()]),
        by_commit_ids([config.commit_id.clone()]),
        by_units([UnitKey::new(&r.def_unit_type, &r.def_unit)]),
        by_def_path(&r.def_path),
    ];
    let def = match store.defs(&token, &def_filters) {
        Ok(defs) => defs.into_iter().next(),
        // The def may live in a repo this store has never imported.
        Err(err) if err.is_not_exist() => None,
        Err(err) => return Err(err.into()),
    };

    let response = DescribeResponse { def, r#ref: r };
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
