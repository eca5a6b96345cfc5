//! Templates Checker CLI
//!
//! Checks a manifest of templates against a type catalog, and shows what the
//! checker sees along the way.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use templates_checker::{
    build_call_tree, run_batch, CheckerConfig, Manifest, OutputFormat, TypeCatalog, TypeExpr,
    TypeResolver, TypeShape,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "templates-checker")]
#[command(about = "Check that output templates match the types they render")]
struct Cli {
    /// Extra configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check every template of a manifest
    Check {
        /// Type catalog (overrides configuration)
        #[arg(long)]
        catalog: Option<PathBuf>,
        /// Template manifest (overrides configuration)
        #[arg(short, long)]
        manifest: Option<PathBuf>,
        /// Report format
        #[arg(short, long, value_parser = ["text", "json"])]
        format: Option<String>,
        /// Stop at the first template that cannot be checked
        #[arg(long)]
        fail_fast: bool,
        /// Do not suggest similar field names
        #[arg(long)]
        no_suggestions: bool,
    },

    /// Print the call tree of a template
    Tree {
        /// Template file
        #[arg(required_unless_present = "inline")]
        file: Option<PathBuf>,
        /// Template source given on the command line
        #[arg(short, long, conflicts_with = "file")]
        inline: Option<String>,
        /// Print JSON instead of an outline
        #[arg(long)]
        json: bool,
    },

    /// Print the fields templates can use on a type
    Fields {
        /// Type expression, e.g. "*app.Cluster"
        type_expr: String,
        /// Type catalog (overrides configuration)
        #[arg(long)]
        catalog: Option<PathBuf>,
    },

    /// Print the effective configuration
    Config {
        /// Write it to this file instead
        #[arg(long)]
        save: Option<PathBuf>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = CheckerConfig::load_from(cli.config.as_deref())
        .context("failed to load configuration")?;

    match cli.command {
        Commands::Check {
            catalog,
            manifest,
            format,
            fail_fast,
            no_suggestions,
        } => {
            if let Some(catalog) = catalog {
                config.checker.catalog = catalog;
            }
            if let Some(manifest) = manifest {
                config.checker.manifest = manifest;
            }
            match format.as_deref() {
                Some("json") => config.output.format = OutputFormat::Json,
                Some(_) => config.output.format = OutputFormat::Text,
                None => {}
            }
            config.checker.fail_fast |= fail_fast;
            config.checker.suggestions &= !no_suggestions;

            let catalog = load_catalog(&config.checker.catalog)?;
            let manifest = Manifest::load(&config.checker.manifest).with_context(|| {
                format!("failed to load manifest {}", config.checker.manifest.display())
            })?;

            let report = run_batch(&manifest, &catalog, config.check_options())?;
            match config.output.format {
                OutputFormat::Text => print!("{}", report.render_text()),
                OutputFormat::Json => println!("{}", report.to_json()?),
            }

            if !report.is_success() {
                std::process::exit(1);
            }
            Ok(())
        }

        Commands::Tree { file, inline, json } => {
            let source = match (inline, file) {
                (Some(source), _) => source,
                (None, Some(file)) => fs::read_to_string(&file)
                    .with_context(|| format!("failed to read {}", file.display()))?,
                (None, None) => bail!("either a template file or --inline is required"),
            };

            let tree = build_call_tree(&source)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&tree)?);
            } else if tree.is_leaf() {
                println!("(no field access)");
            } else {
                print!("{}", tree);
            }
            Ok(())
        }

        Commands::Fields { type_expr, catalog } => {
            let catalog_path = catalog.unwrap_or(config.checker.catalog);
            let catalog = load_catalog(&catalog_path)?;
            let ty: TypeExpr = type_expr.parse()?;

            let mut current = &ty;
            loop {
                match catalog.resolve(current) {
                    Some(TypeShape::Pointer(elem)) => current = elem,
                    Some(TypeShape::Struct(fields)) => {
                        println!("📋 {} ({} fields)", ty, fields.len());
                        for (name, field_ty) in fields.iter() {
                            println!("  {}: {}", name, field_ty);
                        }
                        return Ok(());
                    }
                    Some(TypeShape::Slice(_)) => bail!("'{}' is a list, not a struct", ty),
                    Some(TypeShape::Map { .. }) => bail!("'{}' is a map, not a struct", ty),
                    Some(TypeShape::Scalar) => bail!("'{}' is a scalar, not a struct", ty),
                    None => bail!("unknown type '{}'", current),
                }
            }
        }

        Commands::Config { save } => {
            if let Some(path) = save {
                config
                    .save(&path)
                    .with_context(|| format!("failed to write {}", path.display()))?;
                println!("✅ Configuration saved to {}", path.display());
            } else {
                println!("{}", toml::to_string_pretty(&config)?);
            }
            Ok(())
        }
    }
}

fn load_catalog(path: &std::path::Path) -> anyhow::Result<TypeCatalog> {
    TypeCatalog::load(path).with_context(|| format!("failed to load type catalog {}", path.display()))
}
