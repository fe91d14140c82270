use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use miette::{Context, IntoDiagnostic};

use hlox_ir::{dump_module, verify_module};
use hlox_opt::{GatherExpander, GatherExpansionMode, PassManager};

/// Hlox: expand gather operations in a text-format module
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Input module in the HLO-like text format
    input: PathBuf,

    /// Which gathers to expand
    #[arg(short, long, value_enum, default_value_t = Mode::All)]
    mode: Mode,

    /// Output path (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Verify the module before and after the pass
    #[arg(long)]
    verify: bool,

    /// Dump the parsed module to stderr before expansion
    #[arg(long)]
    emit_input: bool,

    /// Run the pass without producing output
    #[arg(long)]
    dry_run: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Expand every gather, using a loop where needed
    All,
    /// Expand only gathers that need no loop
    Simple,
}

impl From<Mode> for GatherExpansionMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::All => GatherExpansionMode::EliminateAll,
            Mode::Simple => GatherExpansionMode::EliminateSimpleOnly,
        }
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> miette::Result<()> {
    let cli = Cli::parse();

    // 1. Read source file.
    let source = std::fs::read_to_string(&cli.input)
        .into_diagnostic()
        .wrap_err_with(|| format!("failed to read {}", cli.input.display()))?;

    // 2. Parse text to IR.
    let mut module = hlox_parser::parse(&source)
        .into_diagnostic()
        .wrap_err_with(|| format!("failed to parse {}", cli.input.display()))?;

    if cli.emit_input {
        eprintln!("{}", dump_module(&module));
    }
    if cli.verify {
        verify_module(&module)
            .into_diagnostic()
            .wrap_err("input module is malformed")?;
    }

    // 3. Expand gathers.
    let mut pm = PassManager::new();
    pm.add_pass(Box::new(GatherExpander::new(cli.mode.into())));
    pm.set_verify(cli.verify);
    let changed = pm
        .run(&mut module)
        .into_diagnostic()
        .wrap_err("gather expansion failed")?;
    if !changed {
        eprintln!("no gathers were expanded");
    }

    // 4. Dry-run: stop here.
    if cli.dry_run {
        return Ok(());
    }

    // 5. Write output.
    let text = dump_module(&module);
    match &cli.output {
        Some(path) => std::fs::write(path, text)
            .into_diagnostic()
            .wrap_err_with(|| format!("failed to write {}", path.display()))?,
        None => print!("{text}"),
    }

    Ok(())
}
