use clap::Parser;
use gyre::{Compiler, DEFAULT_OPT_LEVEL, Options};
use gyre_cli::json;
use miette::{IntoDiagnostic, Result, WrapErr, bail};
use std::fs;
use std::path::PathBuf;

const DRIVER_EXAMPLE: &str = "\
The generated code requires a driver; the following minimal driver runs
the design against a free-running clock:

    #include \"top.cc\"

    int main() {
        gyre_design::p_top top;
        while (1) {
            top.p_clk.next = value<1> {1u};
            top.step();
            top.p_clk.next = value<1> {0u};
            top.step();
        }
    }

Optimization levels: -O0 disables all optimization; -O1 elides internal
wires; -O2 additionally localizes internal wires; -O3 and -O4 extend
both to public wires not marked (*keep*); -O5 (the default) also splits
nets by driver first. Use the highest level a design tolerates.";

/// Compile a gate-level netlist to C++ simulator source.
#[derive(Parser)]
#[command(name = "gyre", version, after_long_help = DRIVER_EXAMPLE)]
struct Cli {
    /// Yosys JSON netlist to compile (`yosys -o design.json`)
    #[arg(long, value_name = "FILE")]
    input: PathBuf,

    /// Output file for the generated code; stdout if omitted
    filename: Option<PathBuf>,

    /// Generate separate interface (.h) and implementation files; the
    /// interface path is the output filename with its extension
    /// replaced, so a filename is required
    #[arg(long)]
    header: bool,

    /// Namespace the generated code is placed in
    #[arg(long, value_name = "NAME", default_value = "gyre_design")]
    namespace: String,

    /// Optimization level (0-5)
    #[arg(short = 'O', value_name = "LEVEL", default_value_t = DEFAULT_OPT_LEVEL)]
    opt_level: u32,

    /// Compile only this module and the modules it instantiates
    #[arg(long, value_name = "MODULE")]
    top: Option<String>,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let text = fs::read_to_string(&cli.input)
        .into_diagnostic()
        .wrap_err_with(|| format!("can't read `{}`", cli.input.display()))?;
    let mut design = json::parse_design(&text)
        .wrap_err_with(|| format!("`{}` is not a usable netlist", cli.input.display()))?;
    if let Some(top) = &cli.top {
        json::select_top(&mut design, top)?;
    }

    let mut options = Options::with_opt_level(cli.opt_level).into_diagnostic()?;
    options.namespace = cli.namespace.clone();

    let mut header_path = None;
    if cli.header {
        let Some(filename) = &cli.filename else {
            bail!("option --header must be used with a filename");
        };
        let path = filename.with_extension("h");
        options.split_interface = true;
        options.interface_filename = Some(path.display().to_string());
        header_path = Some(path);
    }

    log::info!("compiling `{}` at -O{}", cli.input.display(), cli.opt_level);
    let output = Compiler::new(options).compile(&mut design).into_diagnostic()?;

    match &cli.filename {
        Some(filename) => {
            if let (Some(path), Some(interface)) = (&header_path, &output.interface) {
                fs::write(path, interface)
                    .into_diagnostic()
                    .wrap_err_with(|| format!("can't write `{}`", path.display()))?;
            }
            fs::write(filename, &output.implementation)
                .into_diagnostic()
                .wrap_err_with(|| format!("can't write `{}`", filename.display()))?;
        }
        None => print!("{}", output.implementation),
    }
    Ok(())
}
