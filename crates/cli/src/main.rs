// formwork CLI - headless formula editing and evaluation over a JSON catalog

mod exit_codes;
mod util;

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde_json::json;

use formwork_config::{ResolutionMode, Settings};
use formwork_engine::catalog::{Catalog, FormulaRef, ProductRef, VariableRef};
use formwork_engine::costing::{self, Element};
use formwork_engine::editor::{FormulaEditor, VariableCreator};
use formwork_engine::events::InputOutcome;
use formwork_engine::formula::eval::{unresolved_references, ValueTable};
use formwork_engine::formula::{self, Resolution};
use formwork_engine::recalc;
use formwork_engine::suggest::{self, SuggestOptions};
use formwork_engine::validation;

use exit_codes::{EXIT_FAILURE, EXIT_SUCCESS, EXIT_USAGE};
use util::{format_value, load_catalog, read_json};

#[derive(Parser)]
#[command(name = "fwk")]
#[command(about = "Build, check and evaluate pricing formulas against a variable catalog")]
#[command(version)]
struct Cli {
    /// Settings file (default: <config dir>/formwork/settings.json)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Debug logging (RUST_LOG still wins when set)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a formula (display or stored form)
    #[command(after_help = "\
Examples:
  fwk eval '{Wall Area}/350*{Coats}' --catalog catalog.json
  fwk eval '{3f2a}*{p-77}' --catalog catalog.json --refs refs.json
  fwk eval '{3f2a}*{p-77}' --catalog catalog.json --refs refs.json --live")]
    Eval {
        formula: String,

        /// Catalog file: { \"variables\": [...], \"products\": [...] }
        #[arg(long)]
        catalog: PathBuf,

        /// Stored reference values (JSON array) saved with the formula
        #[arg(long)]
        refs: Option<PathBuf>,

        /// Ignore stored reference values; resolve against the catalog only
        #[arg(long)]
        live: bool,
    },

    /// Check that a formula is complete and well-formed
    Check {
        formula: String,

        #[arg(long)]
        catalog: PathBuf,
    },

    /// Show the tokens a formula breaks into
    Tokens {
        formula: String,

        #[arg(long)]
        catalog: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Convert a display formula ({Name}) to its stored form ({id})
    Store {
        formula: String,

        #[arg(long)]
        catalog: PathBuf,
    },

    /// Convert a stored formula ({id}) to its display form ({Name})
    Show {
        formula: String,

        #[arg(long)]
        catalog: PathBuf,
    },

    /// List suggestions for partially typed text
    Suggest {
        partial: String,

        #[arg(long)]
        catalog: PathBuf,

        /// Name already used in the formula (repeatable)
        #[arg(long = "used", value_name = "NAME")]
        used: Vec<String>,

        /// Leave products out
        #[arg(long)]
        no_products: bool,
    },

    /// Recompute derived variables
    Recalc {
        #[arg(long)]
        catalog: PathBuf,

        #[arg(long)]
        json: bool,
    },

    /// Compute element costs
    Cost {
        #[arg(long)]
        catalog: PathBuf,

        /// Elements file (JSON array)
        #[arg(long)]
        elements: PathBuf,

        #[arg(long)]
        json: bool,
    },

    /// Type inputs into the formula editor, one Enter press each
    #[command(after_help = "\
Unknown names become new variables (value 0).

Examples:
  fwk build --catalog catalog.json 'Wall Area' / 350 '*' Coats
  fwk build --catalog catalog.json '(' Trim + 2 ')' '*' 'Trim Count'")]
    Build {
        #[arg(long)]
        catalog: PathBuf,

        #[arg(required = true)]
        inputs: Vec<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let settings = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    };

    let result = match cli.command {
        Commands::Eval { formula, catalog, refs, live } => {
            cmd_eval(&settings, &formula, &catalog, refs.as_deref(), live)
        }
        Commands::Check { formula, catalog } => cmd_check(&formula, &catalog),
        Commands::Tokens { formula, catalog, json } => cmd_tokens(&formula, &catalog, json),
        Commands::Store { formula, catalog } => cmd_store(&formula, &catalog),
        Commands::Show { formula, catalog } => cmd_show(&formula, &catalog),
        Commands::Suggest { partial, catalog, used, no_products } => {
            cmd_suggest(&settings, &partial, &catalog, &used, no_products)
        }
        Commands::Recalc { catalog, json } => cmd_recalc(&settings, &catalog, json),
        Commands::Cost { catalog, elements, json } => cmd_cost(&settings, &catalog, &elements, json),
        Commands::Build { catalog, inputs } => cmd_build(&settings, &catalog, &inputs),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .init();
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn usage(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn failure(msg: impl Into<String>) -> Self {
        Self { code: EXIT_FAILURE, message: msg.into(), hint: None }
    }

    pub fn io(err: io::Error) -> Self {
        Self::usage(err.to_string())
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

fn resolution(settings: &Settings, live: bool) -> Resolution {
    if live {
        return Resolution::Live;
    }
    match settings.resolution {
        ResolutionMode::Snapshot => Resolution::Snapshot,
        ResolutionMode::Live => Resolution::Live,
    }
}

fn suggest_options(settings: &Settings) -> SuggestOptions {
    SuggestOptions {
        min_create_len: settings.min_create_length,
        include_products: settings.include_products,
        exclude_variable_name: None,
        limit: settings.suggestion_limit,
    }
}

// ============================================================================
// eval
// ============================================================================

fn cmd_eval(
    settings: &Settings,
    input: &str,
    catalog_path: &Path,
    refs_path: Option<&Path>,
    live: bool,
) -> Result<(), CliError> {
    let catalog = load_catalog(catalog_path)?;
    let refs = refs_path.map(read_json::<Vec<FormulaRef>>).transpose()?;
    let refs = refs.map(|r| costing::merge_current_prices(&r, &catalog.products));

    // Rewrite names in place; re-tokenizing would repair malformed input
    let stored = formula::display_to_stored(input, &catalog, &[]);
    log::debug!("Evaluating {:?}", stored);

    let operands = catalog.operands();
    let mode = resolution(settings, live);
    let table = ValueTable::new(&operands, refs.as_deref(), mode);
    for unresolved in unresolved_references(&stored, &table) {
        eprintln!("warning: {} (counted as 0)", unresolved);
    }

    let value = formula::evaluate_with(&stored, &operands, refs.as_deref(), mode).ok_or_else(|| {
        CliError::failure(format!("formula did not evaluate: {}", input))
            .with_hint("check for division by zero or run `fwk check`")
    })?;

    println!("{}", format_value(value, settings.precision));
    Ok(())
}

// ============================================================================
// check
// ============================================================================

fn cmd_check(input: &str, catalog_path: &Path) -> Result<(), CliError> {
    let catalog = load_catalog(catalog_path)?;
    let sequence = formula::hydrate(input, &catalog, &[]);
    let verdict = validation::validate_complete(sequence.tokens());

    match verdict.display_message() {
        None => {
            println!("ok");
            Ok(())
        }
        Some(message) => Err(CliError::failure(message)),
    }
}

// ============================================================================
// tokens
// ============================================================================

fn cmd_tokens(input: &str, catalog_path: &Path, as_json: bool) -> Result<(), CliError> {
    let catalog = load_catalog(catalog_path)?;
    let sequence = formula::hydrate(input, &catalog, &[]);

    let stdout = io::stdout();
    let mut out = stdout.lock();

    if as_json {
        let tokens: Vec<_> = sequence
            .iter()
            .map(|t| json!({ "kind": t.kind, "raw": t.raw_text, "display": t.display_text }))
            .collect();
        let text = serde_json::to_string_pretty(&tokens).map_err(|e| CliError::usage(e.to_string()))?;
        writeln!(out, "{}", text).map_err(CliError::io)?;
        return Ok(());
    }

    for token in sequence.iter() {
        if token.raw_text == token.display_text {
            writeln!(out, "{:<9}{}", token.kind.noun(), token.raw_text).map_err(CliError::io)?;
        } else {
            writeln!(out, "{:<9}{} ({})", token.kind.noun(), token.display_text, token.raw_text)
                .map_err(CliError::io)?;
        }
    }
    Ok(())
}

// ============================================================================
// store / show
// ============================================================================

fn cmd_store(input: &str, catalog_path: &Path) -> Result<(), CliError> {
    let catalog = load_catalog(catalog_path)?;
    println!("{}", formula::display_to_stored(input, &catalog, &[]));
    Ok(())
}

fn cmd_show(input: &str, catalog_path: &Path) -> Result<(), CliError> {
    let catalog = load_catalog(catalog_path)?;
    println!("{}", formula::ids_to_display(input, &catalog, &[]));
    Ok(())
}

// ============================================================================
// suggest
// ============================================================================

fn cmd_suggest(
    settings: &Settings,
    partial: &str,
    catalog_path: &Path,
    used: &[String],
    no_products: bool,
) -> Result<(), CliError> {
    let catalog = load_catalog(catalog_path)?;
    let mut options = suggest_options(settings);
    if no_products {
        options.include_products = false;
    }
    let products: &[ProductRef] = if options.include_products { &catalog.products } else { &[] };

    let items = suggest::suggest(partial, &catalog.variables, &catalog.variables, products, used, &options);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for item in &items {
        let kind = match item.kind {
            suggest::SuggestionKind::Create => "create",
            suggest::SuggestionKind::Variable if item.is_global => "global",
            suggest::SuggestionKind::Variable => "variable",
            suggest::SuggestionKind::Product => "product",
        };
        writeln!(out, "{:<9}{}", kind, item.label).map_err(CliError::io)?;
    }
    Ok(())
}

// ============================================================================
// recalc
// ============================================================================

fn cmd_recalc(settings: &Settings, catalog_path: &Path, as_json: bool) -> Result<(), CliError> {
    let mut catalog = load_catalog(catalog_path)?;
    let report = recalc::recompute_derived_with(&mut catalog.variables, &catalog.products);
    log::info!("Recalc: {}", report.summary());

    let derived: Vec<&VariableRef> = catalog
        .variables
        .iter()
        .filter(|v| v.derived_formula().is_some())
        .collect();

    if as_json {
        let doc = json!({
            "variables": derived
                .iter()
                .map(|v| json!({ "id": v.id, "name": v.name, "value": v.value }))
                .collect::<Vec<_>>(),
            "changed": report.changed,
            "stale": report.stale,
            "cycle": report.cycle.as_ref().map(|c| json!({ "ids": c.ids, "message": c.message })),
        });
        let text = serde_json::to_string_pretty(&doc).map_err(|e| CliError::usage(e.to_string()))?;
        println!("{}", text);
    } else {
        for v in &derived {
            let marker = if report.stale.contains(&v.id) { " (stale)" } else { "" };
            println!("{} = {}{}", v.name, format_value(v.value, settings.precision), marker);
        }
    }

    if let Some(cycle) = &report.cycle {
        return Err(CliError::failure(cycle.to_string()));
    }
    if !report.stale.is_empty() {
        return Err(CliError::failure(format!(
            "{} derived variable(s) kept their previous value",
            report.stale.len()
        )));
    }
    Ok(())
}

// ============================================================================
// cost
// ============================================================================

fn cmd_cost(settings: &Settings, catalog_path: &Path, elements_path: &Path, as_json: bool) -> Result<(), CliError> {
    let catalog = load_catalog(catalog_path)?;
    let elements: Vec<Element> = read_json(elements_path)?;
    let costs = costing::element_costs(
        &elements,
        &catalog.operands(),
        &catalog.products,
        resolution(settings, false),
    );

    if as_json {
        let text = serde_json::to_string_pretty(&costs).map_err(|e| CliError::usage(e.to_string()))?;
        println!("{}", text);
        return Ok(());
    }

    let p = settings.precision;
    for element in &elements {
        if let Some(cost) = costs.get(&element.id) {
            let label = if element.name.is_empty() { &element.id } else { &element.name };
            println!(
                "{}: material {}, labor {}, total {}",
                label,
                format_value(cost.material, p),
                format_value(cost.labor, p),
                format_value(cost.total, p)
            );
        }
    }
    Ok(())
}

// ============================================================================
// build
// ============================================================================

/// Answers creation requests with a fresh uuid-keyed variable worth 0.
#[derive(Default)]
struct MintingCreator {
    minted: Vec<VariableRef>,
}

impl VariableCreator for MintingCreator {
    fn request_variable(&mut self, name: &str) {
        let id = uuid::Uuid::new_v4().to_string();
        log::info!("Created variable {:?} as {}", name, id);
        self.minted.push(VariableRef::new(id, name, 0.0));
    }
}

fn cmd_build(settings: &Settings, catalog_path: &Path, inputs: &[String]) -> Result<(), CliError> {
    let mut catalog: Catalog = load_catalog(catalog_path)?;
    // Variables attached to the formula being built
    let mut attached: Vec<VariableRef> = Vec::new();
    let mut editor = FormulaEditor::new(suggest_options(settings));
    let mut creator = MintingCreator::default();

    for input in inputs {
        editor.set_input(input.as_str());
        let outcome = match editor.commit_input(&catalog, &attached, &mut creator) {
            Ok(outcome) => outcome,
            Err(e) => {
                eprintln!("rejected {:?}: {}", input, e.user_message());
                continue;
            }
        };

        let accepted = match outcome {
            InputOutcome::Accepted(accepted) => Some(accepted),
            InputOutcome::CreationRequested { .. } => {
                let mut accepted = None;
                for variable in creator.minted.drain(..) {
                    catalog.apply_import(variable.clone());
                    match editor.on_variable_created(variable, &attached) {
                        Ok(result) => accepted = result,
                        Err(e) => eprintln!("rejected {:?}: {}", input, e.user_message()),
                    }
                }
                accepted
            }
            InputOutcome::CreationPending { name } => {
                eprintln!("ignored {:?}: creation of {:?} still pending", input, name);
                None
            }
            InputOutcome::Ignored => {
                eprintln!("ignored {:?}", input);
                None
            }
        };

        if let Some(import) = accepted.and_then(|a| a.catalog_import) {
            if !attached.iter().any(|v| v.id == import.id) {
                attached.push(import);
            }
        }
    }

    println!("{}", editor.to_storage_string());
    match editor.complete().display_message() {
        None => {
            println!("ok");
            Ok(())
        }
        Some(message) => Err(CliError::failure(message)),
    }
}
