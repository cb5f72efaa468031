use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use ruxy_prerender::discovery::discover_registries;
use ruxy_prerender::{collect_errors, prerender, Diagnostic, PrerenderConfig, PrerenderError, Registry};

#[derive(Parser)]
#[command(name = "ruxy-prerender")]
#[command(about = "Pre-render Ruxy primitive registries to HTML")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to ruxy.prerender.json next to the input)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Render one registry file
    Render {
        registry: PathBuf,

        /// Write the output JSON here instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,

        #[arg(long)]
        pretty: bool,
    },

    /// Validate a registry and print diagnostics as JSON
    Check { registry: PathBuf },

    /// Render every *.registry.json below a directory
    RenderDir {
        dir: PathBuf,

        #[arg(long)]
        out_dir: PathBuf,

        #[arg(long)]
        pretty: bool,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let result = match &cli.command {
        Commands::Render {
            registry,
            out,
            pretty,
        } => render(cli.config.as_deref(), registry, out.as_deref(), *pretty),
        Commands::Check { registry } => check(registry),
        Commands::RenderDir {
            dir,
            out_dir,
            pretty,
        } => render_dir(cli.config.as_deref(), dir, out_dir, *pretty),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            let diagnostic = Diagnostic::from_error(&e, None);
            eprintln!("[{}] {}", diagnostic.code, diagnostic.message);
            for hint in &diagnostic.hints {
                eprintln!("  hint: {}", hint);
            }
            ExitCode::FAILURE
        }
    }
}

fn load_config(explicit: Option<&Path>, near: &Path) -> Result<PrerenderConfig, PrerenderError> {
    match explicit {
        Some(path) => PrerenderConfig::load(path),
        None => PrerenderConfig::discover(near.parent().unwrap_or_else(|| Path::new("."))),
    }
}

fn write_file(path: &Path, contents: &str) -> Result<(), PrerenderError> {
    let io_error = |source| PrerenderError::Io {
        path: path.display().to_string(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_error)?;
    }
    fs::write(path, contents).map_err(io_error)
}

fn render(
    config: Option<&Path>,
    registry_path: &Path,
    out: Option<&Path>,
    pretty: bool,
) -> Result<ExitCode, PrerenderError> {
    let config = load_config(config, registry_path)?;
    let registry = Registry::load(registry_path)?;
    let output = prerender(&registry, &config)?;
    let json = output.to_json(pretty);

    match out {
        Some(path) => write_file(path, &json)?,
        None => println!("{}", json),
    }
    Ok(ExitCode::SUCCESS)
}

fn check(registry_path: &Path) -> Result<ExitCode, PrerenderError> {
    let registry = Registry::load(registry_path)?;
    let diagnostics: Vec<Diagnostic> = collect_errors(&registry)
        .iter()
        .map(|e| Diagnostic::from_error(e, registry.route()))
        .collect();

    println!(
        "{}",
        serde_json::to_string_pretty(&diagnostics).unwrap_or_else(|_| "[]".to_string())
    );
    Ok(if diagnostics.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn render_dir(
    config: Option<&Path>,
    dir: &Path,
    out_dir: &Path,
    pretty: bool,
) -> Result<ExitCode, PrerenderError> {
    let config = match config {
        Some(path) => PrerenderConfig::load(path)?,
        None => PrerenderConfig::discover(dir)?,
    };

    let entries = discover_registries(dir);
    log::info!("found {} registries below {}", entries.len(), dir.display());

    for entry in &entries {
        let registry = Registry::load(&entry.path)?.with_route(entry.route.clone());
        let output = prerender(&registry, &config)?;
        write_file(&entry.output_path(out_dir), &output.to_json(pretty))?;
    }
    Ok(ExitCode::SUCCESS)
}
