use clap::Parser;
use std::fs;
use std::path::PathBuf;
use texlang::prelude as txl;
use texlang::traits::*;
use texlang::*;
use texlang_stdlib::StdLibState;

/// Expand the macros in a TeX file and print the resulting text.
///
/// Run with `RUST_LOG=info` and set `\tracingmacros=1` in the file to see every expansion.
#[derive(Parser)]
#[clap(version)]
struct Cli {
    #[clap(subcommand)]
    sub_command: SubCommand,
}

#[derive(Parser)]
enum SubCommand {
    Doc(Doc),
    Run(Run),
}

/// Print documentation for a primitive
#[derive(Parser)]
struct Doc {
    /// Name of the control sequence
    name: Option<String>,
}

/// Expand a TeX file and print the output
#[derive(Parser)]
struct Run {
    /// Path to the TeX file to expand
    file_path: PathBuf,
}

fn main() {
    env_logger::init();
    let args: Cli = Cli::parse();
    let mut vm = StdLibState::new_vm();
    let result = match args.sub_command {
        SubCommand::Doc(d) => doc(&vm, d.name),
        SubCommand::Run(r) => run(&mut vm, r.file_path).map_err(|err| format!("{err}")),
    };
    if let Err(err) = result {
        println!["{err}"];
        std::process::exit(1);
    }
}

fn run(vm: &mut vm::VM<StdLibState>, mut path: PathBuf) -> txl::Result<()> {
    if path.extension().is_none() {
        path.set_extension("tex");
    }
    let source_code = match fs::read_to_string(&path) {
        Ok(source_code) => source_code,
        Err(err) => {
            println!["Failed to open file {:?}: {err}", &path];
            std::process::exit(1);
        }
    };
    vm.push_source(path, source_code);
    vm.run::<PrintHandlers>()?;
    println!();
    Ok(())
}

/// Handlers that print fully expanded text to standard output.
struct PrintHandlers;

impl vm::Handlers<StdLibState> for PrintHandlers {
    fn character_handler(
        token: token::Token,
        _: &mut vm::ExecutionInput<StdLibState>,
    ) -> txl::Result<()> {
        if let Some(c) = token.char() {
            print!("{c}");
        }
        Ok(())
    }

    fn unexpanded_expansion_command(
        token: token::Token,
        input: &mut vm::ExecutionInput<StdLibState>,
    ) -> txl::Result<()> {
        print!(
            "{}",
            token::write_tokens(&[token], input.vm().cs_name_interner())
        );
        Ok(())
    }
}

fn doc(vm: &vm::VM<StdLibState>, cs_name: Option<String>) -> Result<(), String> {
    let commands = vm.get_commands_as_map_slow();
    match cs_name {
        None => {
            let mut cs_names: Vec<&String> = commands.keys().collect();
            cs_names.sort();
            for cs_name in cs_names {
                let doc = commands[cs_name].doc().unwrap_or("");
                let first_line = doc.split('\n').next().unwrap_or("");
                println!["\\{cs_name}  {first_line}"];
            }
            Ok(())
        }
        Some(name) => match commands.get(&name) {
            None => Err(format!("Unknown command \\{name}")),
            Some(cmd) => {
                println!["\\{name}  {}", cmd.doc().unwrap_or("")];
                Ok(())
            }
        },
    }
}
