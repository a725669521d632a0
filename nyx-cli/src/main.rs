//! # Nyx CLI
//!
//! Command-line interface for the Nyx language.
//!
//! Usage:
//!   nyx run <source.nyx>
//!   nyx compile <source.nyx> -o <artifact.nxb>
//!   nyx exec <artifact.nxb>
//!   nyx repl [--session <id>]
//!   nyx inspect <artifact.nxb>
//!
//! Exit codes: 0 success, 1 compile error, 2 runtime fault, 3 I/O or
//! format error.

use clap::{Parser as ClapParser, Subcommand};
use nyx_compiler::{tokenize, Compiler, Parser};
use nyx_error::{Error, ErrorKind};
use nyx_vm::collaborator::{
    CollaboratorConfig, ConsoleVoice, HttpKnowledgeClient, HttpVoiceClient, KnowledgeClient,
    StaticKnowledge, VoiceClient,
};
use nyx_vm::{container, CompiledUnit, Storage, Vm};
use std::io::Write;
use std::path::{Path, PathBuf};

const EXIT_COMPILE_ERROR: i32 = 1;
const EXIT_RUNTIME_FAULT: i32 = 2;
const EXIT_IO_ERROR: i32 = 3;

#[derive(ClapParser)]
#[command(name = "nyx")]
#[command(author, version, about = "Nyx - an AI-oriented scripting language")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output (disassembly and VM logs)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Lex, parse, compile and execute a source file in one step
    Run {
        /// Path to the .nyx source file
        source: PathBuf,
    },
    /// Compile a source file into a binary artifact without executing it
    Compile {
        /// Path to the .nyx source file
        source: PathBuf,

        /// Output artifact path (defaults to the source with a .nxb extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Deserialize and execute an artifact without recompiling
    Exec {
        /// Path to the .nxb artifact
        artifact: PathBuf,
    },
    /// Interactive loop: read one statement, compile, execute, print
    Repl {
        /// Session ID; the personality is persisted per session
        #[arg(short, long)]
        session: Option<String>,
    },
    /// Show an artifact's sections and disassembly
    Inspect {
        /// Path to the .nxb artifact
        artifact: PathBuf,
    },
}

fn exit_code_for(err: &Error) -> i32 {
    match err.kind() {
        ErrorKind::UnexpectedCharacter
        | ErrorKind::ParseFailed
        | ErrorKind::UnresolvedSymbol
        | ErrorKind::InvalidConstant
        | ErrorKind::ArityMismatch => EXIT_COMPILE_ERROR,

        ErrorKind::StackOverflow
        | ErrorKind::StackUnderflow
        | ErrorKind::IllegalOpcode
        | ErrorKind::InvalidJump
        | ErrorKind::TypeMismatch
        | ErrorKind::DivisionByZero
        | ErrorKind::CallDepthExceeded
        | ErrorKind::CollaboratorFailed
        | ErrorKind::CollaboratorTimeout
        | ErrorKind::CollaboratorUnavailable => EXIT_RUNTIME_FAULT,

        _ => EXIT_IO_ERROR,
    }
}

fn fail(err: &Error) -> ! {
    eprintln!("error: {}", err);
    std::process::exit(exit_code_for(err));
}

fn read_source(path: &Path) -> String {
    match std::fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) => fail(
            &Error::from(e)
                .with_operation("cli::read_source")
                .with_context("path", path.display().to_string()),
        ),
    }
}

/// Parse with item-level isolation so every error is reported, then refuse
/// to continue if any item failed.
fn compile_file(path: &Path, verbose: bool) -> CompiledUnit {
    let source = read_source(path);
    let (unit, errors) = Parser::new(tokenize(&source)).parse_program();
    if !errors.is_empty() {
        for err in &errors {
            eprintln!("error: {}", err);
        }
        std::process::exit(EXIT_COMPILE_ERROR);
    }

    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("main")
        .to_string();
    let compiled = match Compiler::new().with_source_name(name).compile(&unit) {
        Ok(compiled) => compiled,
        Err(err) => fail(&err),
    };

    if verbose {
        eprintln!("{}", compiled.disassemble());
    }
    compiled
}

/// Collaborators come from the environment when configured, with offline
/// fallbacks: a canned knowledge client and console voice.
fn build_knowledge() -> Box<dyn KnowledgeClient> {
    match std::env::var("NYX_KNOWLEDGE_URL") {
        Ok(url) => {
            let mut config = CollaboratorConfig::new(url);
            if let Ok(key) = std::env::var("NYX_API_KEY") {
                config = config.with_api_key(key);
            }
            match HttpKnowledgeClient::new(config) {
                Ok(client) => Box::new(client),
                Err(err) => fail(&err),
            }
        }
        Err(_) => Box::new(StaticKnowledge::new()),
    }
}

fn build_voice() -> Box<dyn VoiceClient> {
    match std::env::var("NYX_VOICE_URL") {
        Ok(url) => {
            let mut config = CollaboratorConfig::new(url);
            if let Ok(key) = std::env::var("NYX_API_KEY") {
                config = config.with_api_key(key);
            }
            match HttpVoiceClient::new(config) {
                Ok(client) => Box::new(client),
                Err(err) => fail(&err),
            }
        }
        Err(_) => Box::new(ConsoleVoice::new()),
    }
}

fn build_vm(verbose: bool) -> Vm {
    let mut vm = Vm::new(build_knowledge(), build_voice()).with_echo(true);
    if verbose {
        vm = vm.with_log_callback(|level, message| {
            eprintln!("[{:?}] {}", level, message);
        });
    }
    vm
}

fn execute(vm: &mut Vm, compiled: &CompiledUnit) {
    if let Err(err) = vm.run(compiled) {
        if let Some(fault) = vm.last_fault() {
            eprintln!("fault: {}", fault);
        }
        fail(&err);
    }
}

fn cmd_run(source: &Path, verbose: bool) {
    let compiled = compile_file(source, verbose);
    let mut vm = build_vm(verbose);
    execute(&mut vm, &compiled);
}

fn cmd_compile(source: &Path, output: Option<PathBuf>, verbose: bool) {
    let compiled = compile_file(source, verbose);
    let output = output.unwrap_or_else(|| source.with_extension("nxb"));
    if let Err(err) = container::write_file(&compiled, &output) {
        fail(&err);
    }
    println!(
        "wrote {} ({} instructions, {} constants)",
        output.display(),
        compiled.code.len(),
        compiled.constants.len()
    );
}

fn cmd_exec(artifact: &Path, verbose: bool) {
    let compiled = match container::read_file(artifact) {
        Ok(compiled) => compiled,
        Err(err) => fail(&err),
    };
    if verbose {
        eprintln!("{}", compiled.disassemble());
    }
    let mut vm = build_vm(verbose);
    execute(&mut vm, &compiled);
}

fn cmd_inspect(artifact: &Path) {
    let compiled = match container::read_file(artifact) {
        Ok(compiled) => compiled,
        Err(err) => fail(&err),
    };
    println!("artifact: {}", artifact.display());
    println!("format:   NXBC v{}", container::VERSION);
    println!(
        "metadata: {}",
        serde_json::to_string_pretty(&compiled.metadata).unwrap_or_default()
    );
    println!(
        "sections: {} instructions, {} constants, {} symbols",
        compiled.code.len(),
        compiled.constants.len(),
        compiled.symbols.len()
    );
    println!();
    print!("{}", compiled.disassemble());
}

fn cmd_repl(session: Option<String>, verbose: bool) {
    let mut storage = match Storage::file(".nyx_sessions") {
        Ok(storage) => Some(storage),
        Err(err) => {
            eprintln!("warning: session storage unavailable: {}", err);
            None
        }
    };

    let mut vm = build_vm(verbose);
    if let (Some(storage), Some(session)) = (&storage, &session) {
        if let Some(personality) = storage.load_personality(session) {
            println!("restored personality for session '{}'", session);
            vm = vm.with_personality(personality);
        }
    }

    let mut compiler = Compiler::repl();
    println!("Nyx REPL - 'exit' to leave");

    loop {
        print!("nyx> ");
        let _ = std::io::stdout().flush();

        let mut line = String::new();
        match std::io::stdin().read_line(&mut line) {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(e) => {
                eprintln!("error: {}", e);
                break;
            }
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            break;
        }

        let (unit, errors) = Parser::new(tokenize(line)).parse_program();
        if !errors.is_empty() {
            for err in &errors {
                eprintln!("error: {}", err);
            }
            continue;
        }

        let compiled = match compiler.compile(&unit) {
            Ok(compiled) => compiled,
            Err(err) => {
                eprintln!("error: {}", err);
                continue;
            }
        };

        if let Err(err) = vm.run(&compiled) {
            if let Some(fault) = vm.last_fault() {
                eprintln!("fault: {}", fault);
            } else {
                eprintln!("error: {}", err);
            }
            vm.reset();
        }

        // Persist the personality after every line so a killed session
        // keeps its state.
        if let (Some(storage), Some(session)) = (&mut storage, &session) {
            if let Err(err) = storage.save_personality(session, vm.personality()) {
                eprintln!("warning: failed to persist personality: {}", err);
            }
        }
    }

    if verbose {
        let changes: Vec<String> = vm
            .personality_mut()
            .drain_history()
            .map(|c| format!("  {} {} -> {}", c.which.name(), c.old, c.new))
            .collect();
        if !changes.is_empty() {
            eprintln!("personality changes this session:");
            for change in changes {
                eprintln!("{}", change);
            }
        }
    }
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { source } => cmd_run(&source, cli.verbose),
        Commands::Compile { source, output } => cmd_compile(&source, output, cli.verbose),
        Commands::Exec { artifact } => cmd_exec(&artifact, cli.verbose),
        Commands::Repl { session } => cmd_repl(session, cli.verbose),
        Commands::Inspect { artifact } => cmd_inspect(&artifact),
    }
}
