use std::{env, fs, path::PathBuf, process::ExitCode, rc::Rc};

use orchid::{ConfigOnlyMcp, Interp, InterpOptions, McpManager, NoMcp, lex, load_config, parse_tokens};

const USAGE: &str = "\
usage: orchid <script.orch> [options]

options:
  --help     show this help
  --trace    print the execution trace after the run
  --lex      print the token stream and exit
  --parse    print the parsed AST as JSON and exit
";

struct Args {
    script: Option<PathBuf>,
    trace: bool,
    lex_only: bool,
    parse_only: bool,
}

fn parse_args() -> Result<Args, String> {
    let mut args = Args {
        script: None,
        trace: false,
        lex_only: false,
        parse_only: false,
    };
    for arg in env::args().skip(1) {
        match arg.as_str() {
            "--help" | "-h" => return Err(String::new()),
            "--trace" => args.trace = true,
            "--lex" => args.lex_only = true,
            "--parse" => args.parse_only = true,
            other if other.starts_with('-') => {
                return Err(format!("unknown option '{other}'"));
            }
            path => {
                if args.script.is_some() {
                    return Err("expected exactly one script path".to_owned());
                }
                args.script = Some(PathBuf::from(path));
            }
        }
    }
    Ok(args)
}

fn main() -> ExitCode {
    simple_logger::init_with_level(log::Level::Warn).ok();

    let args = match parse_args() {
        Ok(args) => args,
        Err(message) => {
            if message.is_empty() {
                print!("{USAGE}");
                return ExitCode::SUCCESS;
            }
            eprintln!("error: {message}");
            eprint!("{USAGE}");
            return ExitCode::FAILURE;
        }
    };
    let Some(script) = args.script else {
        eprint!("{USAGE}");
        return ExitCode::FAILURE;
    };

    let code = match fs::read_to_string(&script) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: cannot read {}: {err}", script.display());
            return ExitCode::FAILURE;
        }
    };

    let tokens = match lex(&code) {
        Ok(tokens) => tokens,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };
    if args.lex_only {
        for token in &tokens {
            println!("{}:{}\t{:?}", token.pos.line, token.pos.col, token.token);
        }
        return ExitCode::SUCCESS;
    }

    let program = match parse_tokens(tokens) {
        Ok(program) => program,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };
    if args.parse_only {
        match serde_json::to_string_pretty(&program) {
            Ok(json) => println!("{json}"),
            Err(err) => {
                eprintln!("error: cannot render AST: {err}");
                return ExitCode::FAILURE;
            }
        }
        return ExitCode::SUCCESS;
    }

    let mut options = InterpOptions::for_script(&script);
    if let Some(paths) = env::var_os("ORCHID_PLUGIN_PATH") {
        options.plugin_path = env::split_paths(&paths).collect();
    }

    let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let mcp: Rc<dyn McpManager> = match load_config(&[options.script_dir.as_path(), cwd.as_path()]) {
        Ok(Some(config)) => Rc::new(ConfigOnlyMcp::new(config)),
        Ok(None) => Rc::new(NoMcp),
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };

    // No real provider is wired into the CLI; the deterministic echo
    // provider keeps the pipeline runnable end to end.
    let interp = Interp::builder().options(options).mcp(mcp).build();

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_time().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("error: cannot start runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(interp.run(&program));
    interp.shutdown();
    if args.trace {
        let trace = interp.trace_log();
        if !trace.is_empty() {
            eprintln!("{trace}");
        }
    }
    match result {
        Ok(value) => {
            println!("{value}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}
