use std::path::PathBuf;

use clap::{Parser, Subcommand};
use renderer::uniforms::TextureKind;
use renderer::{TextureMapping, TextureSlot};

#[derive(Parser, Debug)]
#[command(
    name = "scenedit",
    author,
    version,
    about = "Shader, texture and scene configuration tools for the mesh editor"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Format or check a scene configuration document.
    Config(ConfigCommand),
    /// Validate shader sources without a GPU.
    Shader(ShaderCommand),
    /// Render a unit cube offscreen for a number of frames.
    Preview(PreviewArgs),
}

#[derive(Parser, Debug)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the canonical encoding; ignored lines are reported on stderr.
    Fmt {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Exit non-zero when the document would be rejected.
    Check {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

#[derive(Parser, Debug)]
pub struct ShaderCommand {
    #[command(subcommand)]
    pub action: ShaderAction,
}

#[derive(Subcommand, Debug)]
pub enum ShaderAction {
    /// Compile, link and validate a vertex/fragment pair.
    Check(ShaderCheckArgs),
}

#[derive(Parser, Debug)]
pub struct ShaderCheckArgs {
    /// Vertex body; the built-in vertex shader is used when omitted.
    #[arg(long, value_name = "FILE")]
    pub vertex: Option<PathBuf>,

    /// Fragment body; the built-in fragment shader is used when omitted.
    #[arg(long, value_name = "FILE")]
    pub fragment: Option<PathBuf>,

    /// Texture slot bound while validating, e.g. `map` or `envMap:cube`.
    #[arg(long = "slot", value_name = "SLOT[:cube]", value_parser = parse_slot_binding)]
    pub slots: Vec<SlotBinding>,

    /// Validate the generated material for a `map` mapping instead of files.
    #[arg(long, value_name = "MAPPING", value_parser = parse_mapping)]
    pub mapping: Option<TextureMapping>,
}

#[derive(Parser, Debug)]
pub struct PreviewArgs {
    /// Scene configuration document applied before the first frame.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[arg(long, value_name = "FILE")]
    pub vertex: Option<PathBuf>,

    #[arg(long, value_name = "FILE")]
    pub fragment: Option<PathBuf>,

    /// Texture for a slot; cube mappings take six comma-separated faces.
    #[arg(long = "texture", value_name = "SLOT=PATH[,PATH...]", value_parser = parse_texture_arg)]
    pub textures: Vec<TextureArg>,

    /// Mapping applied to the `map` texture; also selects the generated material.
    #[arg(long, value_name = "MAPPING", value_parser = parse_mapping)]
    pub mapping: Option<TextureMapping>,

    #[arg(long, value_name = "N", default_value_t = 60)]
    pub frames: u32,

    /// Simulated frame rate used to advance the clock.
    #[arg(long, value_name = "FPS", default_value_t = 60.0)]
    pub fps: f32,

    /// Render resolution (e.g. `512x512`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_size, default_value = "512x512")]
    pub size: (u32, u32),

    /// Write the last frame as a PNG.
    #[arg(long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlotBinding {
    pub slot: TextureSlot,
    pub kind: TextureKind,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextureArg {
    pub slot: TextureSlot,
    pub paths: Vec<PathBuf>,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_slot_binding(value: &str) -> Result<SlotBinding, String> {
    let (slot, kind) = match value.trim().split_once(':') {
        Some((slot, "cube")) => (slot, TextureKind::Cube),
        Some((slot, "2d")) => (slot, TextureKind::Texture2d),
        Some((_, other)) => {
            return Err(format!("unknown texture kind '{other}'; expected 2d or cube"))
        }
        None => (value.trim(), TextureKind::Texture2d),
    };
    Ok(SlotBinding {
        slot: slot.parse()?,
        kind,
    })
}

pub fn parse_texture_arg(value: &str) -> Result<TextureArg, String> {
    let (slot, paths) = value
        .split_once('=')
        .ok_or_else(|| format!("expected SLOT=PATH, got '{value}'"))?;
    let paths: Vec<PathBuf> = paths
        .split(',')
        .map(str::trim)
        .filter(|path| !path.is_empty())
        .map(PathBuf::from)
        .collect();
    if paths.is_empty() {
        return Err(format!("no texture file given for '{slot}'"));
    }
    Ok(TextureArg {
        slot: slot.parse()?,
        paths,
    })
}

pub fn parse_mapping(value: &str) -> Result<TextureMapping, String> {
    value.trim().to_ascii_lowercase().parse()
}

pub fn parse_size(value: &str) -> Result<(u32, u32), String> {
    let (width, height) = value
        .trim()
        .split_once(['x', 'X'])
        .ok_or_else(|| "expected WxH format, e.g. 512x512".to_string())?;
    let width: u32 = width
        .trim()
        .parse()
        .map_err(|_| "invalid width in size".to_string())?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|_| "invalid height in size".to_string())?;
    if width == 0 || height == 0 {
        return Err("dimensions must be greater than zero".to_string());
    }
    Ok((width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_binding_accepts_kind_suffix() {
        assert_eq!(
            parse_slot_binding("envMap:cube").unwrap(),
            SlotBinding {
                slot: TextureSlot::EnvMap,
                kind: TextureKind::Cube
            }
        );
        assert_eq!(
            parse_slot_binding("map").unwrap().kind,
            TextureKind::Texture2d
        );
        assert!(parse_slot_binding("map:3d").is_err());
        assert!(parse_slot_binding("bumpMap").is_err());
    }

    #[test]
    fn texture_arg_splits_faces() {
        let arg = parse_texture_arg("envMap=px.png, nx.png,py.png").unwrap();
        assert_eq!(arg.slot, TextureSlot::EnvMap);
        assert_eq!(arg.paths.len(), 3);
        assert!(parse_texture_arg("map").is_err());
        assert!(parse_texture_arg("map=").is_err());
    }

    #[test]
    fn size_requires_positive_dimensions() {
        assert_eq!(parse_size("640x480"), Ok((640, 480)));
        assert!(parse_size("0x10").is_err());
        assert!(parse_size("640").is_err());
    }

    #[test]
    fn cli_parses_preview() {
        let cli = Cli::try_parse_from([
            "scenedit",
            "preview",
            "--texture",
            "map=albedo.png",
            "--mapping",
            "uv",
            "--frames",
            "3",
        ])
        .unwrap();
        let Command::Preview(args) = cli.command else {
            panic!("expected preview command");
        };
        assert_eq!(args.frames, 3);
        assert_eq!(args.size, (512, 512));
        assert_eq!(args.mapping, Some(TextureMapping::Uv));
    }
}
