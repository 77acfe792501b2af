//! Handler for `semsolve resolve`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;

use semsolve_resolver::config::SemsolveConfig;
use semsolve_resolver::oracle::Registry;
use semsolve_resolver::resolver::{Resolution, SemverResolver};
use semsolve_util::errors::{SemsolveError, SemsolveResult};

use crate::cli::OutputFormat;

/// Options for `semsolve resolve`.
pub struct ResolveOptions {
    pub registry: PathBuf,
    /// Raw `name=range` requirements, applied after the manifest.
    pub requires: Vec<String>,
    pub manifest: Option<PathBuf>,
    pub format: OutputFormat,
    pub depth: Option<usize>,
    pub why: Option<String>,
    pub max_passes: Option<usize>,
    pub config: Option<PathBuf>,
}

pub async fn exec(opts: &ResolveOptions) -> SemsolveResult<()> {
    let requirements = collect_requirements(&opts.requires, opts.manifest.as_deref())?;
    let registry = Registry::from_path(&opts.registry)?;

    let mut config = load_config(opts.config.as_deref())?;
    if let Some(max) = opts.max_passes {
        config.resolver.max_passes = Some(max);
    }

    tracing::debug!(
        "Resolving {} root requirements against {}",
        requirements.len(),
        opts.registry.display()
    );
    let resolution = SemverResolver::new(requirements, registry)?
        .with_config(config.resolver)
        .resolve()
        .await?;
    tracing::debug!("{}", resolution.backtracks());

    if let Some(ref target) = opts.why {
        print_why(&resolution, target);
        return Ok(());
    }

    match opts.format {
        OutputFormat::List => {
            for (name, version) in resolution.versions() {
                println!("{name}@{version}");
            }
        }
        OutputFormat::Json => println!("{}", to_json(&resolution)?),
        OutputFormat::Tree => print!("{}", resolution.graph().print_tree(opts.depth)),
    }
    Ok(())
}

/// Root requirements in declaration order. `--require` entries override
/// manifest entries of the same name.
fn collect_requirements(
    requires: &[String],
    manifest: Option<&Path>,
) -> Result<IndexMap<String, String>, SemsolveError> {
    let mut requirements = match manifest {
        Some(path) => read_manifest(path)?,
        None => IndexMap::new(),
    };

    for raw in requires {
        let (name, range) = parse_requirement(raw)?;
        requirements.insert(name, range);
    }

    if requirements.is_empty() {
        return Err(SemsolveError::Generic {
            message: "No root requirements given; pass --require NAME=RANGE or --manifest FILE"
                .to_string(),
        });
    }
    Ok(requirements)
}

fn read_manifest(path: &Path) -> Result<IndexMap<String, String>, SemsolveError> {
    let content = semsolve_util::fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|e| SemsolveError::Generic {
        message: format!("Failed to parse {}: {e}", path.display()),
    })
}

fn parse_requirement(raw: &str) -> Result<(String, String), SemsolveError> {
    match raw.split_once('=') {
        Some((name, range)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), range.trim().to_string()))
        }
        _ => Err(SemsolveError::Generic {
            message: format!("Invalid requirement `{raw}`: expected NAME=RANGE"),
        }),
    }
}

fn load_config(path: Option<&Path>) -> Result<SemsolveConfig, SemsolveError> {
    match path {
        Some(path) => SemsolveConfig::load(path),
        None => {
            let cwd = std::env::current_dir()?;
            SemsolveConfig::discover(&cwd)
        }
    }
}

fn to_json(resolution: &Resolution) -> Result<String, SemsolveError> {
    let versions: BTreeMap<&str, String> = resolution
        .versions()
        .iter()
        .map(|(name, version)| (name.as_str(), version.to_string()))
        .collect();
    serde_json::to_string_pretty(&versions).map_err(|e| SemsolveError::Generic {
        message: format!("Failed to serialize resolution: {e}"),
    })
}

fn print_why(resolution: &Resolution, target: &str) {
    let graph = resolution.graph();
    let Some(path) = graph.find_path(target) else {
        println!("Library '{target}' is not part of the resolution.");
        return;
    };
    println!("Path to {target}:");
    for (i, node) in path.iter().enumerate() {
        let indent = "  ".repeat(i);
        println!("{indent}{node}");
    }
    println!();
    print!("{}", graph.print_inverted_tree(target));
}
