use anyhow::{Context, anyhow, bail};
use ariadne::{Config, Label, Report, ReportKind, Source};
use clap::{Args, Parser as ClapParser, Subcommand};
use lineage::{Error, EvalSettings, EvalState, ExperimentalFeature, Origin};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(ClapParser)]
#[command(name = "lineage")]
#[command(about = "Lazy expression evaluator with data lineage tracking")]
struct Cli {
    #[command(flatten)]
    options: EvalOptions,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct EvalOptions {
    /// Experimental features to enable, e.g. `provenance-tracking`
    #[arg(
        long = "extra-experimental-features",
        global = true,
        value_delimiter = ',',
        env = "LINEAGE_EXPERIMENTAL_FEATURES"
    )]
    experimental_features: Vec<ExperimentalFeature>,
    /// How deeply forcing may nest before evaluation is aborted
    #[arg(long, global = true, default_value_t = EvalSettings::default().max_call_depth)]
    max_call_depth: u32,
    /// Print evaluation counters as JSON on stderr
    #[arg(long, global = true)]
    stats: bool,
}

impl EvalOptions {
    fn settings(&self) -> EvalSettings {
        let mut settings = EvalSettings {
            max_call_depth: self.max_call_depth,
            ..EvalSettings::default()
        };
        settings
            .experimental_features
            .extend(self.experimental_features.iter().copied());
        settings
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate an inline expression
    Eval {
        /// The code to evaluate
        code: String,
    },
    /// Evaluate a file, or standard input when the path is `-`
    Run {
        /// Path to the source file
        file: PathBuf,
    },
    /// Check if code parses correctly
    Check {
        /// Path to the source file
        file: PathBuf,
    },
    /// Run test files with expected output verification
    Test {
        /// Paths to test files
        files: Vec<PathBuf>,
    },
}

fn main() {
    env_logger::Builder::from_default_env().init();
    let cli = Cli::parse();

    if let Err(error) = run(cli) {
        eprintln!("{error:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let options = cli.options;
    match cli.command {
        Commands::Eval { code } => {
            let json = eval_code_to_json(&options, &code, Origin::String, "«string»")?;
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        Commands::Run { file } => {
            let (code, origin, filename) = read_source(&file)?;
            log::info!("Running: {filename}");
            let json = eval_code_to_json(&options, &code, origin, &filename)?;
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        Commands::Check { file } => {
            let (code, origin, filename) = read_source(&file)?;
            let mut state = EvalState::new(options.settings());
            state
                .parse(&code, origin)
                .map_err(|error| describe(&state, &error, &filename, &code))?;
            eprintln!("{filename}: ok");
        }
        Commands::Test { files } => run_tests(&options, &files)?,
    }
    Ok(())
}

fn read_source(file: &Path) -> anyhow::Result<(String, Origin, String)> {
    if file == Path::new("-") {
        let code = std::io::read_to_string(std::io::stdin()).context("Error reading stdin")?;
        return Ok((code, Origin::Stdin, "«stdin»".to_owned()));
    }
    let code = fs::read_to_string(file)
        .with_context(|| format!("Error reading file {}", file.display()))?;
    let filename = file.display().to_string();
    Ok((code, Origin::Path(file.to_path_buf()), filename))
}

/// Evaluate code and return the deeply forced result as JSON.
fn eval_code_to_json(
    options: &EvalOptions,
    code: &str,
    origin: Origin,
    filename: &str,
) -> anyhow::Result<serde_json::Value> {
    let mut state = EvalState::new(options.settings());
    let result = state
        .eval_string(code, origin)
        .and_then(|value| Ok(state.to_json(value)?));
    if options.stats {
        eprintln!("{}", serde_json::to_string_pretty(&state.stats())?);
    }
    result.map_err(|error| describe(&state, &error, filename, code))
}

/// Turn a parse or evaluation error into a printable report.
fn describe(state: &EvalState, error: &Error, filename: &str, code: &str) -> anyhow::Error {
    match error {
        Error::Parse(diagnostics) => {
            let mut report_bytes = Vec::new();
            for diagnostic in diagnostics {
                let written = Report::build(ReportKind::Error, (filename, diagnostic.span.clone()))
                    .with_config(Config::default().with_color(false))
                    .with_message(&diagnostic.message)
                    .with_label(
                        Label::new((filename, diagnostic.span.clone()))
                            .with_message(&diagnostic.reason),
                    )
                    .finish()
                    .write((filename, Source::from(code)), &mut report_bytes);
                if let Err(error) = written {
                    return anyhow!("failed to render parse error: {error}");
                }
            }
            anyhow!("{}", String::from_utf8_lossy(&report_bytes).trim_end())
        }
        Error::Eval(error) => match state.positions.get(error.pos()) {
            Some(pos) => anyhow!("error: {error}\n       at {pos}"),
            None => anyhow!("error: {error}"),
        },
    }
}

/// Run test files with expected output verification.
/// Test file format:
/// ```text
/// # test: test_name
/// code here
/// # expect: expected_json_value
/// ```
fn run_tests(options: &EvalOptions, files: &[PathBuf]) -> anyhow::Result<()> {
    let mut total = 0;
    let mut passed = 0;
    let mut failed = 0;

    for file in files {
        match fs::read_to_string(file) {
            Ok(content) => {
                let results = run_test_file(options, file, &content);
                total += results.0;
                passed += results.1;
                failed += results.2;
            }
            Err(e) => {
                eprintln!("Error reading {}: {}", file.display(), e);
                failed += 1;
            }
        }
    }

    eprintln!("\n{} tests: {} passed, {} failed", total, passed, failed);
    if failed > 0 {
        bail!("{failed} test(s) failed");
    }
    Ok(())
}

/// Parse and run tests from a single test file.
/// Returns (total, passed, failed) counts.
fn run_test_file(options: &EvalOptions, file: &Path, content: &str) -> (usize, usize, usize) {
    let filename = file.display().to_string();
    let mut results = Vec::new();
    let mut current_test: Option<(&str, String)> = None;

    for line in content.lines() {
        if let Some(name) = line.strip_prefix("# test:") {
            // A test without `# expect:` only has to evaluate
            if let Some((name, code)) = current_test.take() {
                results.push(run_single_test(options, &filename, name, &code, None));
            }
            current_test = Some((name.trim(), String::new()));
        } else if let Some(expected) = line.strip_prefix("# expect:") {
            if let Some((name, code)) = current_test.take() {
                results.push(run_single_test(
                    options,
                    &filename,
                    name,
                    &code,
                    Some(expected.trim()),
                ));
            }
        } else if let Some((_, code)) = current_test.as_mut() {
            if !code.is_empty() {
                code.push('\n');
            }
            code.push_str(line);
        }
    }
    if let Some((name, code)) = current_test {
        results.push(run_single_test(options, &filename, name, &code, None));
    }

    let passed = results.iter().filter(|ok| **ok).count();
    (results.len(), passed, results.len() - passed)
}

/// Run a single test case.
fn run_single_test(
    options: &EvalOptions,
    filename: &str,
    name: &str,
    code: &str,
    expected: Option<&str>,
) -> bool {
    eprint!("  {} ... ", name);

    let result = eval_code_to_json(options, code, Origin::Path(filename.into()), filename);

    match (&result, expected) {
        (Ok(actual), Some(expected)) => match serde_json::from_str::<serde_json::Value>(expected) {
            Ok(expected_val) => {
                if actual == &expected_val {
                    eprintln!("ok");
                    true
                } else {
                    eprintln!("FAILED");
                    eprintln!("    expected: {}", expected);
                    eprintln!("    actual:   {}", actual);
                    false
                }
            }
            Err(e) => {
                eprintln!("FAILED (invalid expected JSON: {})", e);
                false
            }
        },
        (Ok(actual), None) => {
            eprintln!("ok ({})", actual);
            true
        }
        (Err(e), _) => {
            eprintln!("FAILED: {:#}", e);
            false
        }
    }
}
