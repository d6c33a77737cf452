use std::fs;
use std::process::ExitCode;

use anyhow::{Context, Result};

use droidscript::adb::AdbClient;
use droidscript::builtins::{Console, HostContext, register_builtins};
use droidscript::interpreter::Interpreter;
use droidscript::{lexer, parser};

fn print_usage(program: &str) {
    println!("DroidScript - Android Automation Framework\n");
    println!("Usage:");
    println!("  {program} <script.ds>                Run a script");
    println!("  {program} --version                  Show version");
    println!("  {program} --help                     Show this help");
    println!("\nExamples:");
    println!("  {program} scripts/simple_login.ds");
    println!("  {program} my_script.ds");
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let program = args
        .first()
        .map(String::as_str)
        .unwrap_or("droidscript")
        .to_string();

    let Some(arg) = args.get(1) else {
        print_usage(&program);
        return ExitCode::FAILURE;
    };

    match arg.as_str() {
        "--help" | "-h" => {
            print_usage(&program);
            ExitCode::SUCCESS
        }
        "--version" | "-v" => {
            println!("DroidScript v{}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        path => match run_script(path) {
            Ok(code) => code,
            Err(error) => {
                eprintln!("Error: {error:#}");
                ExitCode::FAILURE
            }
        },
    }
}

fn run_script(path: &str) -> Result<ExitCode> {
    let source = fs::read_to_string(path).with_context(|| format!("Cannot open file: {path}"))?;

    let (tokens, lex_errors) = lexer::tokenize(&source);
    if !lex_errors.is_empty() {
        eprintln!("Lexer errors:");
        for error in &lex_errors {
            eprintln!("  {error}");
        }
        return Ok(ExitCode::FAILURE);
    }

    let (statements, parse_errors) = parser::parse(tokens);
    if !parse_errors.is_empty() {
        eprintln!("Parser errors:");
        for error in &parse_errors {
            eprintln!("  {error}");
        }
        return Ok(ExitCode::FAILURE);
    }

    let mut interpreter = Interpreter::new();
    let host = HostContext::new(Box::new(AdbClient::new()), Console::Standard);
    register_builtins(&mut interpreter, host);
    interpreter.execute(&statements);

    if interpreter.has_errors() {
        eprintln!("Runtime errors:");
        for error in interpreter.errors() {
            eprintln!("  {error}");
        }
        return Ok(ExitCode::FAILURE);
    }

    Ok(ExitCode::SUCCESS)
}
