//! Minimal CLI: graph document in → (transform | show) → JSON out
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use serde_json::Value;

use crate::describe::{build_graph, export_graph, load_doc, GraphDoc};
use crate::graph::TransformedStringKind;
use crate::rewrite::{
    default_needs_transformer, flatten_transformed_types, RunConfig, StringTypeMapping,
};

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// rewrite type graphs so unrepresentable types become carrier types with
/// attached decode/encode transformers
#[derive(Parser, Debug)]
pub struct CommandLineInterface {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// run the transformation pass and print the rewritten graph
    Transform(TransformOut),
    /// parse graph documents and print them back untransformed
    Show(ShowOut),
}

#[derive(Args, Debug, Clone)]
struct InputSettings {
    /// One or more graph documents. May be literal paths or quoted glob patterns
    #[arg(long, short, num_args = 1.., required = true)]
    input: Vec<String>,
}

#[derive(clap::Parser, Debug)]
struct TransformOut {
    #[command(flatten)]
    input_settings: InputSettings,

    /// transformed-string kinds the target represents natively
    /// (integer-string, bool-string); these are left untouched
    #[arg(long, num_args = 0..)]
    native: Vec<String>,

    /// also lift array items behind carrier types
    #[arg(long, default_value_t = false)]
    lift_arrays: bool,

    /// print each synthesized transformation to stderr
    #[arg(long)]
    debug_transformations: bool,

    /// trace type reconstitution to stderr
    #[arg(long)]
    debug_reconstitution: bool,

    /// output .json file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

#[derive(clap::Parser, Debug)]
struct ShowOut {
    #[command(flatten)]
    input_settings: InputSettings,

    /// output .json file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl InputSettings {
    fn load(&self) -> Result<Vec<(String, GraphDoc)>> {
        let source_paths = resolve_file_path_patterns(&self.input)?;
        let mut docs = Vec::with_capacity(source_paths.len());
        for source_path in source_paths {
            let source_path_str = source_path.to_string_lossy().to_string();
            let source = std::fs::read_to_string(&source_path)
                .with_context(|| format!("reading source file {source_path_str}"))?;
            let doc = load_doc(&source)
                .with_context(|| format!("parsing graph document {source_path_str}"))?;
            docs.push((source_path_str, doc));
        }
        Ok(docs)
    }
}

impl CommandLineInterface {
    pub fn load() -> Self {
        Self::parse()
    }

    pub fn run(&self) -> Result<()> {
        match &self.cmd {
            Command::Transform(target) => {
                let mapping = StringTypeMapping::with_native(parse_native(&target.native)?);
                let config = RunConfig {
                    debug_print_transformations: target.debug_transformations,
                    debug_print_reconstitution: target.debug_reconstitution,
                };
                let mut outputs = Vec::new();
                for (path, doc) in target.input_settings.load()? {
                    eprintln!("{}", format!("—— {path}").dimmed());
                    let graph = build_graph(&doc)
                        .with_context(|| format!("building type graph from {path}"))?;
                    let pred = default_needs_transformer(&mapping, target.lift_arrays);
                    let rewritten = flatten_transformed_types(&graph, &mapping, &config, &pred)
                        .with_context(|| format!("transforming {path}"))?;
                    outputs.push(export_graph(&rewritten)?);
                }
                emit(collect(outputs), target.out.as_deref())
            }
            Command::Show(target) => {
                let mut outputs = Vec::new();
                for (path, doc) in target.input_settings.load()? {
                    let graph = build_graph(&doc)
                        .with_context(|| format!("building type graph from {path}"))?;
                    outputs.push(export_graph(&graph)?);
                }
                emit(collect(outputs), target.out.as_deref())
            }
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

fn parse_native(names: &[String]) -> Result<Vec<TransformedStringKind>> {
    names
        .iter()
        .map(|name| match name.as_str() {
            "integer-string" => Ok(TransformedStringKind::IntegerString),
            "bool-string" => Ok(TransformedStringKind::BoolString),
            other => bail!("unknown transformed-string kind `{other}`"),
        })
        .collect()
}

/// A single document stays a single object; several become an array.
fn collect(mut outputs: Vec<Value>) -> Value {
    if outputs.len() == 1 {
        outputs.remove(0)
    } else {
        Value::Array(outputs)
    }
}

fn emit(value: Value, out: Option<&std::path::Path>) -> Result<()> {
    let rendered = serde_json::to_string_pretty(&value)?;
    if let Some(out) = out {
        if let Some(parent) = out.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating output directory {}", parent.display()))?;
        }
        std::fs::write(out, &rendered)
            .with_context(|| format!("writing output file {}", out.display()))?;
    } else {
        println!("{rendered}");
    }
    Ok(())
}

fn resolve_file_path_patterns<I>(patterns: I) -> Result<Vec<PathBuf>>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    fn has_glob_chars(s: &str) -> bool {
        // Minimal glob detection for the `glob` crate syntax.
        s.bytes().any(|b| matches!(b, b'*' | b'?' | b'[' | b'{'))
    }

    let mut out = Vec::<PathBuf>::new();

    for raw in patterns {
        let pattern = raw.as_ref();

        if has_glob_chars(pattern) {
            let mut matched_any = false;
            for entry in glob::glob(pattern)? {
                out.push(entry?);
                matched_any = true;
            }
            if !matched_any {
                // Pattern was explicitly a glob but matched nothing -> surface as an error
                bail!("glob pattern matched no files: {pattern}");
            }
        } else {
            // Treat as a literal path
            out.push(PathBuf::from(pattern));
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_kind_names_parse() {
        let kinds = parse_native(&["integer-string".to_string(), "bool-string".to_string()])
            .unwrap();
        assert_eq!(
            kinds,
            vec![
                TransformedStringKind::IntegerString,
                TransformedStringKind::BoolString,
            ]
        );
        assert!(parse_native(&["date-time".to_string()]).is_err());
    }

    #[test]
    fn literal_paths_pass_through_unresolved() {
        let paths = resolve_file_path_patterns(["graphs/root.json"]).unwrap();
        assert_eq!(paths, vec![PathBuf::from("graphs/root.json")]);
    }
}
