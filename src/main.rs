use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::fs;
use std::path::{Path, PathBuf};

use yunischema::compiler::CompilationPipeline;
use yunischema::model::{FeatureSet, ModuleId, QualifiedName, Revision, Unqualified};
use yunischema::reactor::ParserMode;
use yunischema::source::Lexer;

#[derive(Parser)]
#[command(name = "yunischema")]
#[command(author, version, about = "The Yuni schema compiler", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile schema modules into an effective model
    Compile {
        /// The module source files to compile
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Library modules, loaded only when another module requires them
        #[arg(long = "lib", value_name = "FILE")]
        libraries: Vec<PathBuf>,

        /// Feature to treat as supported, as <uri>#<name> or
        /// <uri>@<revision>#<name>; omit entirely to enable every feature
        #[arg(long = "feature", value_name = "QNAME", value_parser = parse_feature)]
        features: Vec<QualifiedName>,

        /// Require imports without revision-date to match a module
        /// identified without revision
        #[arg(long)]
        strict: bool,

        /// Output file for the effective model (JSON)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Dump the effective model to stdout
        #[arg(long)]
        dump_model: bool,

        /// Dump tokens to stdout
        #[arg(long)]
        dump_tokens: bool,
    },

    /// Check schema modules for errors without writing output
    Check {
        /// The module source files to check
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Library modules, loaded only when another module requires them
        #[arg(long = "lib", value_name = "FILE")]
        libraries: Vec<PathBuf>,

        /// Require imports without revision-date to match a module
        /// identified without revision
        #[arg(long)]
        strict: bool,
    },
}

fn main() -> Result<()> {
    // Initialize logger before parsing CLI args
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbose flag
    if cli.verbose {
        log::set_max_level(log::LevelFilter::Debug);
    }

    let result = match cli.command {
        Commands::Compile {
            inputs,
            libraries,
            features,
            strict,
            output,
            dump_model,
            dump_tokens,
        } => compile(
            inputs,
            libraries,
            features,
            strict,
            output,
            dump_model,
            dump_tokens,
            cli.verbose,
        ),
        Commands::Check {
            inputs,
            libraries,
            strict,
        } => check(inputs, libraries, strict),
    };

    if let Err(e) = result {
        eprintln!("{}: {}", "error".red().bold(), e);
        std::process::exit(1);
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn compile(
    inputs: Vec<PathBuf>,
    libraries: Vec<PathBuf>,
    features: Vec<QualifiedName>,
    strict: bool,
    output: Option<PathBuf>,
    dump_model: bool,
    dump_tokens: bool,
    verbose: bool,
) -> Result<()> {
    if verbose {
        println!(
            "{}: Compiling {} module source(s), {} library source(s)",
            "info".blue().bold(),
            inputs.len(),
            libraries.len()
        );
    }

    if dump_tokens {
        for input in &inputs {
            dump_file_tokens(input)?;
        }
    }

    let mut pipeline = CompilationPipeline::new(verbose);
    pipeline.set_parser_mode(parser_mode(strict));
    if !features.is_empty() {
        pipeline.set_supported_features(Some(features.into_iter().collect::<FeatureSet>()));
    }

    let Some(model) = pipeline.run(&inputs, &libraries)? else {
        anyhow::bail!("model construction failed");
    };

    if dump_model {
        println!("{}", "=== Effective model ===".blue().bold());
        println!("{}", serde_json::to_string_pretty(&model)?);
        println!();
    }

    if let Some(output_path) = output {
        let json = serde_json::to_string_pretty(&model)?;
        fs::write(&output_path, json)
            .with_context(|| format!("Failed to write model to {:?}", output_path))?;
        println!(
            "{}: Created model file {:?}",
            "success".green().bold(),
            output_path
        );
    } else {
        println!(
            "{}: Compiled {} module(s)",
            "success".green().bold(),
            model.modules.len()
        );
    }

    Ok(())
}

fn check(inputs: Vec<PathBuf>, libraries: Vec<PathBuf>, strict: bool) -> Result<()> {
    log::info!("Checking {} module source(s)", inputs.len());

    let mut pipeline = CompilationPipeline::new(false);
    pipeline.set_parser_mode(parser_mode(strict));

    match pipeline.run(&inputs, &libraries)? {
        Some(_) => {
            println!("{}: No errors found", "success".green().bold());
            Ok(())
        }
        None => anyhow::bail!("check failed"),
    }
}

fn parser_mode(strict: bool) -> ParserMode {
    if strict {
        ParserMode::Strict
    } else {
        ParserMode::Lenient
    }
}

/// Parse a `--feature` value of the form `<uri>#<name>` or
/// `<uri>@<revision>#<name>`.
fn parse_feature(raw: &str) -> Result<QualifiedName, String> {
    let Some((module, name)) = raw.rsplit_once('#') else {
        return Err("expected <uri>#<name> or <uri>@<revision>#<name>".to_owned());
    };
    let (uri, revision) = match module.rsplit_once('@') {
        Some((head, tail)) => match Revision::try_new(tail) {
            Ok(revision) => (head, Some(revision)),
            Err(_) => (module, None),
        },
        None => (module, None),
    };
    let local = Unqualified::try_new(name)?;
    Ok(QualifiedName::new(ModuleId::new(uri, revision), local))
}

fn dump_file_tokens(input: &Path) -> Result<()> {
    let text = fs::read_to_string(input)
        .with_context(|| format!("Failed to read source file: {:?}", input))?;
    println!(
        "{}",
        format!("=== Tokens: {} ===", input.display()).blue().bold()
    );
    for (i, token) in Lexer::new(&text).enumerate() {
        println!("{:4}: {:?}", i, token);
    }
    println!();
    Ok(())
}
