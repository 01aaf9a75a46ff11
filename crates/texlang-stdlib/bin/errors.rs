use texlang::*;
use texlang_stdlib::*;

fn main() {
    env_logger::init();
    println!("# All Texlang errors\n");
    for case in ErrorCase::all_error_cases() {
        let result = run(case);
        println!(
            "## {}\n\nInput:\n```\n{}\n```\nCode: `{}`\n\nOutput:\n```\n{}```\n\n",
            result.case.description,
            result.case.source_code,
            result.err.code(),
            result.err,
        )
    }
}

struct RunResult {
    case: ErrorCase,
    err: Box<error::Error>,
}

fn run(case: ErrorCase) -> RunResult {
    let mut vm = StdLibState::new_vm();
    vm.push_source("input.tex", case.source_code);
    let err = match vm.run::<vm::DefaultHandlers>() {
        Ok(_) => panic!(
            "successfully ran {} (`{}`) but expected an error",
            case.description, case.source_code
        ),
        Err(err) => err,
    };
    if err.code() != case.code {
        log::warn!(
            "{}: expected error code {} but got {}",
            case.description,
            case.code,
            err.code()
        );
    }
    RunResult { case, err }
}
