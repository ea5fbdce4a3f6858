//! Schema Mock CLI
//!
//! Command-line interface for validating definitions and generating mock responses.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use schema_mock::{
    discover_config, lint_diagnostics, load_config, load_definition_auto, ApiError, Definition,
    HttpMethod, MockApi, MockConfig, RequestParts,
};

const SAMPLE_DEFINITION: &str = include_str!("../../demos/api.json");

const SAMPLE_CONFIG: &str = "\
# schema-mock settings
seed: 42
list_count: 5
validate_links: true
validate_responses: false
";

#[derive(Parser)]
#[command(name = "schema-mock")]
#[command(about = "Generate schema-driven mock responses from API definitions")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a definition for dangling links, cycles and duplicate endpoints
    Validate {
        /// Definition source: file path or URL (http:// or https://), optional #/fragment
        definition: String,

        /// Output format: text (default) or json
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Generate the response of one endpoint
    Generate {
        /// Definition source: file path or URL (http:// or https://), optional #/fragment
        definition: String,

        /// Request path (e.g. /users/42)
        #[arg(long)]
        path: String,

        /// HTTP method
        #[arg(long, short, default_value = "GET")]
        method: String,

        /// Request input as a JSON object
        #[arg(long)]
        input: Option<String>,

        /// Input parameter, typed by the endpoint's input schema (repeatable)
        #[arg(long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,

        /// Request header (repeatable)
        #[arg(long = "header", value_name = "NAME:VALUE")]
        headers: Vec<String>,

        /// Request cookie (repeatable)
        #[arg(long = "cookie", value_name = "NAME=VALUE")]
        cookies: Vec<String>,

        /// Seed for deterministic output (overrides config)
        #[arg(long)]
        seed: Option<u64>,

        /// Items per list response (overrides config and endpoint settings)
        #[arg(long)]
        count: Option<usize>,

        /// Config file (default: discover schema-mock.{yaml,yml,toml})
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output file (stdout if not specified)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Write one JSON fixture per endpoint
    Export {
        /// Definition source: file path or URL (http:// or https://), optional #/fragment
        definition: String,

        /// Directory for fixture files
        #[arg(long, short)]
        output: PathBuf,

        /// Seed for deterministic output (overrides config)
        #[arg(long)]
        seed: Option<u64>,

        /// Config file (default: discover schema-mock.{yaml,yml,toml})
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Scaffold an example definition and config
    Init {
        /// Target directory
        #[arg(long, default_value = ".")]
        dir: PathBuf,

        /// Overwrite existing files
        #[arg(long)]
        force: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Validate { definition, format } => run_validate(&definition, &format),

        Commands::Generate {
            definition,
            path,
            method,
            input,
            params,
            headers,
            cookies,
            seed,
            count,
            config,
            output,
            pretty,
        } => run_generate(GenerateArgs {
            definition,
            path,
            method,
            input,
            params,
            headers,
            cookies,
            seed,
            count,
            config,
            output,
            pretty,
        }),

        Commands::Export {
            definition,
            output,
            seed,
            config,
        } => run_export(&definition, &output, seed, config.as_deref()),

        Commands::Init { dir, force } => run_init(&dir, force),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

/// Log to stderr. `RUST_LOG` wins over `-v`.
fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();
}

fn load(source: &str) -> Result<Definition, u8> {
    load_definition_auto(source).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })
}

/// Explicit config file, else a discovered one, else defaults.
fn resolve_config(explicit: Option<&Path>) -> Result<MockConfig, u8> {
    let report = |e: schema_mock::ConfigError| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    };

    if let Some(path) = explicit {
        return load_config(path).map_err(report);
    }
    let Ok(cwd) = std::env::current_dir() else {
        return Ok(MockConfig::default());
    };
    match discover_config(&cwd).map_err(report)? {
        Some((path, config)) => {
            tracing::info!(path = %path.display(), "using discovered config");
            Ok(config)
        }
        None => Ok(MockConfig::default()),
    }
}

fn report_api_error(e: &ApiError) -> u8 {
    eprintln!("Error: {}", e);
    for error in e.schema_errors() {
        eprintln!("  {}", error);
    }
    e.exit_code() as u8
}

fn run_validate(source: &str, format: &str) -> Result<(), u8> {
    let definition = load(source)?;
    let diagnostics = lint_diagnostics(definition.endpoints());

    if format == "json" {
        let output = serde_json::json!({
            "valid": diagnostics.is_empty(),
            "schemas": definition.schemas().len(),
            "endpoints": definition.endpoints().len(),
            "diagnostics": diagnostics,
        });
        println!("{}", output);
    } else if diagnostics.is_empty() {
        println!(
            "OK: {} schema(s), {} endpoint(s)",
            definition.schemas().len(),
            definition.endpoints().len()
        );
    } else {
        eprintln!("Validation failed:");
        for diag in &diagnostics {
            eprintln!("  error[{}]: {}", diag.code, diag.message);
        }
    }

    if diagnostics.is_empty() {
        Ok(())
    } else {
        Err(1)
    }
}

struct GenerateArgs {
    definition: String,
    path: String,
    method: String,
    input: Option<String>,
    params: Vec<String>,
    headers: Vec<String>,
    cookies: Vec<String>,
    seed: Option<u64>,
    count: Option<usize>,
    config: Option<PathBuf>,
    output: Option<PathBuf>,
    pretty: bool,
}

fn run_generate(args: GenerateArgs) -> Result<(), u8> {
    let definition = load(&args.definition)?;
    let mut config = resolve_config(args.config.as_deref())?;
    if args.seed.is_some() {
        config.seed = args.seed;
    }

    let api = build_api(definition, config, args.count)?;

    let method = HttpMethod::parse(&args.method).ok_or_else(|| {
        eprintln!("Error: unknown HTTP method \"{}\"", args.method);
        2u8
    })?;

    let mut input = match &args.input {
        None => Map::new(),
        Some(text) => match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(map)) => map,
            Ok(other) => {
                eprintln!(
                    "Error: --input must be a JSON object, got {}",
                    schema_mock::json_type_name(&other)
                );
                return Err(2);
            }
            Err(e) => {
                eprintln!("Error: invalid --input JSON: {}", e);
                return Err(2);
            }
        },
    };

    let params = split_pairs(&args.params, '=', "--param")?;
    if !params.is_empty() {
        match api.find(method, &args.path) {
            Some((endpoint, _)) => input.extend(endpoint.input.coerce_params(&params)),
            None => input.extend(params.into_iter().map(|(k, v)| (k, Value::String(v)))),
        }
    }

    let mut request = RequestParts::new();
    for (name, value) in split_pairs(&args.headers, ':', "--header")? {
        request = request.with_header(name, value);
    }
    for (name, value) in split_pairs(&args.cookies, '=', "--cookie")? {
        request = request.with_cookie(name, value);
    }

    let body = api
        .respond(method, &args.path, &input, Some(&request))
        .map_err(|e| report_api_error(&e))?;

    let Some(body) = body else {
        tracing::info!(method = %method, path = %args.path, "endpoint has no response body");
        return Ok(());
    };

    let json_output = if args.pretty {
        serde_json::to_string_pretty(&body)
    } else {
        serde_json::to_string(&body)
    }
    .map_err(|e| {
        eprintln!("Error serializing output: {}", e);
        2u8
    })?;

    match args.output {
        Some(path) => {
            std::fs::write(&path, &json_output).map_err(|e| {
                eprintln!("Error writing to {}: {}", path.display(), e);
                3u8
            })?;
        }
        None => {
            println!("{}", json_output);
        }
    }

    Ok(())
}

fn build_api(definition: Definition, config: MockConfig, count: Option<usize>) -> Result<MockApi, u8> {
    let mut api = definition.into_api(config);
    if let Some(count) = count {
        api.override_list_count(count);
    }
    api.check().map_err(|e| report_api_error(&e))?;
    Ok(api)
}

/// Split `KEY<sep>VALUE` arguments, trimming whitespace around both parts.
fn split_pairs(raw: &[String], separator: char, flag: &str) -> Result<Vec<(String, String)>, u8> {
    raw.iter()
        .map(|item| {
            item.split_once(separator)
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                .filter(|(k, _)| !k.is_empty())
                .ok_or_else(|| {
                    eprintln!(
                        "Error: {} expects NAME{}VALUE, got \"{}\"",
                        flag, separator, item
                    );
                    2u8
                })
        })
        .collect()
}

fn run_export(source: &str, output: &Path, seed: Option<u64>, config_path: Option<&Path>) -> Result<(), u8> {
    let definition = load(source)?;
    let mut config = resolve_config(config_path)?;
    if seed.is_some() {
        config.seed = seed;
    }
    let api = build_api(definition, config, None)?;

    std::fs::create_dir_all(output).map_err(|e| {
        eprintln!("Error creating {}: {}", output.display(), e);
        3u8
    })?;

    let mut written = 0;
    for endpoint in api.endpoints() {
        let concrete = concrete_path(&endpoint.path);
        let body = match api.respond(endpoint.method, &concrete, &Map::new(), None) {
            Ok(Some(body)) => body,
            Ok(None) => {
                tracing::debug!(method = %endpoint.method, path = %endpoint.path, "no response body, skipped");
                continue;
            }
            Err(ApiError::InvalidInput { source }) => {
                eprintln!(
                    "Warning: skipping {} {}: {}",
                    endpoint.method, endpoint.path, source
                );
                continue;
            }
            Err(e) => return Err(report_api_error(&e)),
        };

        let file = output.join(format!("{}_{}.json", endpoint.route_id(), endpoint.method));
        let text = serde_json::to_string_pretty(&body).map_err(|e| {
            eprintln!("Error serializing output: {}", e);
            2u8
        })?;
        std::fs::write(&file, text).map_err(|e| {
            eprintln!("Error writing to {}: {}", file.display(), e);
            3u8
        })?;
        written += 1;
    }

    println!("Exported {} fixture(s) to {}", written, output.display());
    Ok(())
}

/// Fill every `{param}` segment with a placeholder value.
fn concrete_path(pattern: &str) -> String {
    pattern
        .split('/')
        .map(|segment| {
            if segment.starts_with('{') && segment.ends_with('}') {
                "1"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn run_init(dir: &Path, force: bool) -> Result<(), u8> {
    let files = [
        (dir.join("api.json"), SAMPLE_DEFINITION),
        (dir.join("schema-mock.yaml"), SAMPLE_CONFIG),
    ];

    if !force {
        if let Some((path, _)) = files.iter().find(|(path, _)| path.exists()) {
            eprintln!(
                "Error: {} already exists (use --force to overwrite)",
                path.display()
            );
            return Err(1);
        }
    }

    std::fs::create_dir_all(dir).map_err(|e| {
        eprintln!("Error creating {}: {}", dir.display(), e);
        3u8
    })?;
    for (path, content) in &files {
        std::fs::write(path, content).map_err(|e| {
            eprintln!("Error writing to {}: {}", path.display(), e);
            3u8
        })?;
        println!("Created {}", path.display());
    }
    Ok(())
}
