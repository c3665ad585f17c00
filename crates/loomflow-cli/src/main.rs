//! `loomc` - compile a graph JSON document to a standalone program.
//!
//! ```text
//! loomc compile graph.json [--target framework|zero] [--out DIR] [--print] [--strict]
//! ```
//!
//! Exit 0 on success, non-zero on schema or emit failure.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};

use loomflow_compiler::{compile_json, EmitProfile};

#[derive(Parser)]
#[command(name = "loomc", about = "Compile loomflow graph documents to standalone source")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
enum Target {
    /// Emit calls into the orchestration framework (langchain)
    Framework,
    /// Emit raw service-client calls only (openai)
    #[default]
    Zero,
}

impl From<Target> for EmitProfile {
    fn from(target: Target) -> Self {
        match target {
            Target::Framework => EmitProfile::Framework,
            Target::Zero => EmitProfile::Zero,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Compile a graph JSON file
    Compile {
        /// Path to the graph JSON document
        graph_json: PathBuf,

        /// Output profile
        #[arg(long, value_enum, default_value = "zero")]
        target: Target,

        /// Output directory for the compiled file
        #[arg(long, default_value = "compiled")]
        out: PathBuf,

        /// Print the generated source to stdout instead of writing a file
        #[arg(long)]
        print: bool,

        /// Treat unknown node types as errors rather than warnings
        #[arg(long)]
        strict: bool,
    },
}

/// `streaming-agent demo` -> `streaming_agent_demo.py`
fn output_filename(graph_name: &str) -> String {
    let safe = graph_name.to_lowercase().replace(['-', ' '], "_");
    format!("{safe}.py")
}

fn run_compile(
    graph_json: &PathBuf,
    target: Target,
    out: &PathBuf,
    print: bool,
    strict: bool,
) -> Result<(), String> {
    let text = fs::read_to_string(graph_json)
        .map_err(|e| format!("cannot read {}: {e}", graph_json.display()))?;
    let data: serde_json::Value =
        serde_json::from_str(&text).map_err(|e| format!("invalid JSON: {e}"))?;

    let graph_name = data
        .get("graph_name")
        .and_then(|v| v.as_str())
        .unwrap_or("compiled-graph")
        .to_string();
    log::info!("compiling '{graph_name}' ({:?} profile)", target);

    let source =
        compile_json(&data, EmitProfile::from(target), strict).map_err(|e| e.to_string())?;

    if print {
        println!("{source}");
        return Ok(());
    }

    fs::create_dir_all(out).map_err(|e| format!("cannot create {}: {e}", out.display()))?;
    let path = out.join(output_filename(&graph_name));
    fs::write(&path, source).map_err(|e| format!("cannot write {}: {e}", path.display()))?;
    println!("wrote {}", path.display());
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let result = match &cli.command {
        Command::Compile {
            graph_json,
            target,
            out,
            print,
            strict,
        } => run_compile(graph_json, *target, out, *print, *strict),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_filename() {
        assert_eq!(output_filename("streaming-agent"), "streaming_agent.py");
        assert_eq!(output_filename("My Demo"), "my_demo.py");
    }

    #[test]
    fn test_compile_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let graph_path = dir.path().join("graph.json");
        fs::write(
            &graph_path,
            serde_json::json!({
                "graph_name": "tiny-demo",
                "nodes": [
                    { "id": "n1", "type": "constant", "name": "seven",
                      "inputs": { "value": 7 } },
                    { "id": "n2", "type": "print", "name": "printer" }
                ],
                "edges": [
                    { "from_node": "n1", "from_port": "out",
                      "to_node": "n2", "to_port": "value" }
                ]
            })
            .to_string(),
        )
        .unwrap();

        let out_dir = dir.path().join("out");
        run_compile(&graph_path, Target::Zero, &out_dir, false, true).unwrap();

        let compiled = fs::read_to_string(out_dir.join("tiny_demo.py")).unwrap();
        assert!(compiled.contains("seven_out = 7"));
    }

    #[test]
    fn test_compile_rejects_bad_schema() {
        let dir = tempfile::tempdir().unwrap();
        let graph_path = dir.path().join("bad.json");
        fs::write(&graph_path, "{\"graph_name\": \"x\"}").unwrap();

        let out_dir = dir.path().join("out");
        let err = run_compile(&graph_path, Target::Zero, &out_dir, false, false).unwrap_err();
        assert!(err.contains("missing required field"));
    }
}
