use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use renderer::compile::{DEFAULT_FRAGMENT, DEFAULT_VERTEX};
use renderer::{ProgramLayout, ShaderSources, ShaderValidator};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command, ConfigAction, ShaderAction, ShaderCheckArgs};
use crate::preview;

pub fn run(args: Cli) -> Result<()> {
    initialise_tracing();

    match args.command {
        Command::Config(command) => match command.action {
            ConfigAction::Fmt { file } => format_config(&file),
            ConfigAction::Check { file } => check_config(&file),
        },
        Command::Shader(command) => match command.action {
            ShaderAction::Check(args) => check_shader(&args),
        },
        Command::Preview(args) => preview::run(&args),
    }
}

fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

pub(crate) fn read_text(path: &Path, what: &str) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read {what} at {}", path.display()))
}

fn format_config(path: &Path) -> Result<()> {
    let text = read_text(path, "scene configuration")?;
    let decoded = sceneconfig::decode(&text)
        .with_context(|| format!("{} was rejected", path.display()))?;
    for issue in &decoded.issues {
        eprintln!("warning: {issue}");
    }
    println!("{}", sceneconfig::encode(&decoded.config));
    Ok(())
}

fn check_config(path: &Path) -> Result<()> {
    let text = read_text(path, "scene configuration")?;
    let decoded = sceneconfig::decode(&text)
        .with_context(|| format!("{} was rejected", path.display()))?;
    for issue in &decoded.issues {
        eprintln!("warning: {issue}");
    }
    println!(
        "{}: ok ({} ignored line(s))",
        path.display(),
        decoded.issues.len()
    );
    Ok(())
}

fn check_shader(args: &ShaderCheckArgs) -> Result<()> {
    let (sources, mut layout) = match args.mapping {
        Some(mapping) => (
            ShaderSources::for_mapping(mapping),
            ShaderSources::mapping_layout(mapping),
        ),
        None => {
            let vertex = match &args.vertex {
                Some(path) => read_text(path, "vertex shader")?,
                None => DEFAULT_VERTEX.to_string(),
            };
            let fragment = match &args.fragment {
                Some(path) => read_text(path, "fragment shader")?,
                None => DEFAULT_FRAGMENT.to_string(),
            };
            (ShaderSources::new(vertex, fragment), ProgramLayout::default())
        }
    };
    if !args.slots.is_empty() {
        layout = ProgramLayout::new(
            layout
                .bindings()
                .iter()
                .copied()
                .chain(args.slots.iter().map(|binding| (binding.slot, binding.kind))),
        );
    }

    ShaderValidator::naga()
        .validate(&sources, &layout)
        .context("shader rejected")?;
    println!("Shader compiled successfully");
    Ok(())
}
