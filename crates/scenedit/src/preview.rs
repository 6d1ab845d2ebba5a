use std::fs;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use renderer::compile::{DEFAULT_FRAGMENT, DEFAULT_VERTEX};
use renderer::{
    unit_cube, HeadlessOptions, ImageBlob, Notification, RenderLoop, RendererOptions,
    ShaderSources, ShaderValidator, TextureEntry, TextureParams, TextureSet, TextureSlot,
    WgpuBackend,
};

use crate::cli::{PreviewArgs, TextureArg};
use crate::run::read_text;

const TEXTURE_TIMEOUT: Duration = Duration::from_secs(30);

pub fn run(args: &PreviewArgs) -> Result<()> {
    if args.fps <= 0.0 || !args.fps.is_finite() {
        bail!("--fps must be a positive number");
    }

    let options = RendererOptions::default();
    let (width, height) = args.size;
    let backend = WgpuBackend::new(HeadlessOptions {
        width,
        height,
        max_anisotropy: options.max_anisotropy,
        ..HeadlessOptions::default()
    })
    .context("failed to bring up headless GPU device")?;
    tracing::info!(adapter = %backend.adapter().name, width, height, "headless preview ready");

    let start = Instant::now();
    let mut render_loop =
        RenderLoop::new(backend, ShaderValidator::naga(), unit_cube(), &options, start)?;
    render_loop.set_viewport(width, height);

    if let Some(path) = &args.config {
        let text = read_text(path, "scene configuration")?;
        let issues = render_loop
            .apply_config_text(&text, start)
            .with_context(|| format!("{} was rejected", path.display()))?;
        for issue in issues {
            tracing::warn!(%issue, "configuration line ignored");
        }
    }

    if let Some(sources) = shader_sources(args)? {
        render_loop.set_shaders(sources, start)?;
    }

    let textures = texture_set(args)?;
    if !textures.is_empty() {
        render_loop.set_textures(Arc::new(textures));
        render_loop.wait_for_textures(TEXTURE_TIMEOUT, start);
    }

    let step = Duration::from_secs_f32(1.0 / args.fps);
    let mut last_shown: Option<Notification> = None;
    for frame in 0..args.frames {
        let now = start + step * frame;
        let stats = render_loop.frame(now)?;
        tracing::trace!(frame = stats.frame, time = stats.time, "frame drawn");

        let shown = render_loop.notification(now).cloned();
        if shown.is_some() && shown != last_shown {
            if let Some(notification) = &shown {
                tracing::info!(
                    kind = ?notification.kind,
                    severity = ?notification.severity,
                    "{}",
                    notification.message
                );
            }
        }
        last_shown = shown;
    }

    let backend = render_loop.shutdown();
    if let Some(path) = &args.output {
        backend
            .read_pixels()?
            .save(path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        tracing::info!(path = %path.display(), "wrote last frame");
    }
    Ok(())
}

fn shader_sources(args: &PreviewArgs) -> Result<Option<ShaderSources>> {
    if args.vertex.is_none() && args.fragment.is_none() {
        return Ok(args.mapping.map(ShaderSources::for_mapping));
    }
    let vertex = match &args.vertex {
        Some(path) => read_text(path, "vertex shader")?,
        None => DEFAULT_VERTEX.to_string(),
    };
    let fragment = match &args.fragment {
        Some(path) => read_text(path, "fragment shader")?,
        None => DEFAULT_FRAGMENT.to_string(),
    };
    Ok(Some(ShaderSources::new(vertex, fragment)))
}

fn texture_set(args: &PreviewArgs) -> Result<TextureSet> {
    let mut set = TextureSet::new();
    for arg in &args.textures {
        let entry = texture_entry(arg, args)?;
        set.insert(entry.name.clone(), entry);
    }
    Ok(set)
}

fn texture_entry(arg: &TextureArg, args: &PreviewArgs) -> Result<TextureEntry> {
    let mut files = Vec::with_capacity(arg.paths.len());
    for path in &arg.paths {
        let bytes = fs::read(path)
            .with_context(|| format!("failed to read texture at {}", path.display()))?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        files.push(ImageBlob::new(file_name, bytes));
    }

    let mut params = TextureParams::default();
    if arg.slot == TextureSlot::Map {
        if let Some(mapping) = args.mapping {
            params.mapping = mapping;
        }
    }
    Ok(TextureEntry {
        name: arg.slot.to_string(),
        files,
        slot: arg.slot,
        params,
    })
}
