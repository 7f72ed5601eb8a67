use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::process::ExitCode;

use docopt::Docopt;
use serde::Deserialize;

use esslt::{compile, CompileOptions, Input, OutputTarget, ShaderStage, ShaderVersion};

const USAGE: &str = "
esslc GLSL ES shader translator

Usage:
  esslc [options] <source-file>
  esslc --help

Options:
  -h --help            Show help.
  -o <output_file>     Output file, stdout if absent.
  --stage <stage>      vertex, fragment or compute; inferred from the
                       file extension (.vert/.frag/.comp) if absent.
  --target <target>    essl, glsl:<version>, hlsl, wgsl or hir [default: essl].
  --variables          Print the reflection table to stderr.
  --emulate-builtins   Route selected builtins through emulation wrappers.
  --prune              Remove unused variables and functions.
  --init-outputs       Zero-initialize output variables at the top of main.
  --loop-guards        Inject forward-progress guards into unprovable loops.
";

#[derive(Debug, Deserialize)]
struct Args {
    flag_o: Option<String>,
    flag_stage: Option<String>,
    flag_target: String,
    flag_variables: bool,
    flag_emulate_builtins: bool,
    flag_prune: bool,
    flag_init_outputs: bool,
    flag_loop_guards: bool,
    arg_source_file: String,
}

fn parse_stage(args: &Args) -> Option<ShaderStage> {
    if let Some(ref stage) = args.flag_stage {
        return match stage.as_str() {
            "vertex" => Some(ShaderStage::Vertex),
            "fragment" => Some(ShaderStage::Fragment),
            "compute" => Some(ShaderStage::Compute),
            _ => None,
        };
    }
    match Path::new(&args.arg_source_file)
        .extension()
        .and_then(|e| e.to_str())
    {
        Some("vert") => Some(ShaderStage::Vertex),
        Some("frag") => Some(ShaderStage::Fragment),
        Some("comp") => Some(ShaderStage::Compute),
        _ => None,
    }
}

fn parse_target(text: &str) -> Option<OutputTarget> {
    match text {
        "essl" => Some(OutputTarget::Essl),
        "hlsl" => Some(OutputTarget::Hlsl),
        "wgsl" => Some(OutputTarget::Wgsl),
        "hir" => Some(OutputTarget::Hir),
        _ => {
            let version = text.strip_prefix("glsl:")?.parse().ok()?;
            Some(OutputTarget::Glsl(version))
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Args = Docopt::new(USAGE)
        .and_then(|d| d.deserialize())
        .unwrap_or_else(|e| e.exit());

    let stage = match parse_stage(&args) {
        Some(stage) => stage,
        None => {
            eprintln!("cannot determine shader stage; pass --stage");
            return ExitCode::FAILURE;
        }
    };
    let target = match parse_target(&args.flag_target) {
        Some(target) => target,
        None => {
            eprintln!("unknown target '{}'", args.flag_target);
            return ExitCode::FAILURE;
        }
    };

    let mut source = String::new();
    match File::open(&args.arg_source_file) {
        Ok(mut file) => {
            if file.read_to_string(&mut source).is_err() {
                eprintln!("failed to read '{}'", args.arg_source_file);
                return ExitCode::FAILURE;
            }
        }
        Err(err) => {
            eprintln!("failed to open '{}': {}", args.arg_source_file, err);
            return ExitCode::FAILURE;
        }
    }

    let mut options = CompileOptions::OBJECT_CODE;
    if args.flag_variables {
        options |= CompileOptions::VARIABLES;
    }
    if args.flag_emulate_builtins {
        options |= CompileOptions::EMULATE_BUILTINS;
    }
    if args.flag_prune {
        options |= CompileOptions::PRUNE_UNUSED;
    }
    if args.flag_init_outputs {
        options |= CompileOptions::INIT_OUTPUT_VARIABLES;
    }
    if args.flag_loop_guards {
        options |= CompileOptions::LOOP_PROGRESS_GUARDS;
    }

    let output = match compile(Input {
        sources: &[&source],
        stage,
        version: ShaderVersion::Essl100,
        target,
        options,
        directive_handler: None,
    }) {
        Ok(output) => output,
        Err(err) => {
            eprintln!("error: {}", err);
            return ExitCode::FAILURE;
        }
    };

    if !output.info_log.is_empty() {
        eprint!("{}", output.info_log);
    }
    if !output.success {
        return ExitCode::FAILURE;
    }
    if let Some(table) = output.reflection {
        eprintln!("{:#?}", table);
    }

    let code = output.object_code.unwrap_or_default();
    match args.flag_o {
        Some(path) => {
            let mut file = match File::create(&path) {
                Ok(file) => file,
                Err(err) => {
                    eprintln!("failed to create '{}': {}", path, err);
                    return ExitCode::FAILURE;
                }
            };
            if file.write_all(code.as_bytes()).is_err() {
                eprintln!("failed to write '{}'", path);
                return ExitCode::FAILURE;
            }
        }
        None => print!("{}", code),
    }
    ExitCode::SUCCESS
}
