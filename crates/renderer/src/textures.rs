//! Turns uploaded image blobs into GPU textures.
//!
//! Decoding runs on a worker thread; GPU upload happens on the caller's
//! thread when [`TextureLoader::poll`] sees a complete batch. Every request
//! bumps a generation counter and only the newest generation is ever
//! committed, so a slow decode can never overwrite a newer texture set.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use image::imageops::{flip_vertical_in_place, FilterType};
use image::{DynamicImage, GenericImageView, Rgba32FImage};

use crate::gpu::GpuBackend;
use crate::types::{
    texture_sets_differ, PixelFormat, TexelType, TextureEntry, TextureParams, TextureSet,
    TextureSlot,
};
use crate::uniforms::{BoundTexture, TextureKind};

/// Faces of a cube texture, in upload order.
pub const CUBE_FACES: usize = 6;

#[derive(Debug, thiserror::Error)]
pub enum TextureLoadError {
    #[error("texture '{name}': no file")]
    MissingFile { name: String },
    #[error("texture '{name}': decode failed ({file})")]
    DecodeFailed {
        name: String,
        file: String,
        #[source]
        source: image::ImageError,
    },
    #[error("texture '{name}': cube mapping requires {} images, got {actual}", CUBE_FACES)]
    WrongImageCount { name: String, actual: usize },
    #[error("texture '{name}': cube faces must be square and equal in size, got {width}x{height}")]
    CubeFaceShape { name: String, width: u32, height: u32 },
    #[error("texture '{name}': upload failed: {reason}")]
    Gpu { name: String, reason: String },
}

impl TextureLoadError {
    pub fn texture_name(&self) -> &str {
        match self {
            TextureLoadError::MissingFile { name }
            | TextureLoadError::DecodeFailed { name, .. }
            | TextureLoadError::WrongImageCount { name, .. }
            | TextureLoadError::CubeFaceShape { name, .. }
            | TextureLoadError::Gpu { name, .. } => name,
        }
    }

    /// Short machine-readable cause, independent of the texture name.
    pub fn reason(&self) -> &'static str {
        match self {
            TextureLoadError::MissingFile { .. } => "no file",
            TextureLoadError::DecodeFailed { .. } => "decode failed",
            TextureLoadError::WrongImageCount { .. } => "cube mapping requires 6 images",
            TextureLoadError::CubeFaceShape { .. } => "cube faces differ in shape",
            TextureLoadError::Gpu { .. } => "upload failed",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Texels {
    Rgba8(Vec<u8>),
    /// IEEE half floats stored as raw bits.
    Rgba16Float(Vec<u16>),
}

/// CPU-side texels ready for upload; cube faces are packed layer-major.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedTexture {
    pub name: String,
    pub slot: TextureSlot,
    pub kind: TextureKind,
    pub params: TextureParams,
    pub width: u32,
    pub height: u32,
    pub layers: u32,
    pub texels: Texels,
}

/// Decodes and converts every image of `entry`. Touches no GPU state.
pub fn decode_entry(entry: &TextureEntry) -> Result<DecodedTexture, TextureLoadError> {
    let name = entry.name.clone();
    if entry.files.is_empty() {
        return Err(TextureLoadError::MissingFile { name });
    }

    let cube = entry.params.mapping.is_cube();
    let files = if cube {
        if entry.files.len() != CUBE_FACES {
            return Err(TextureLoadError::WrongImageCount {
                name,
                actual: entry.files.len(),
            });
        }
        &entry.files[..]
    } else {
        if entry.files.len() > 1 {
            tracing::warn!(
                texture = %entry.name,
                count = entry.files.len(),
                "flat mapping uses only the first image"
            );
        }
        &entry.files[..1]
    };

    let mut images = Vec::with_capacity(files.len());
    for file in files {
        let image = image::load_from_memory(&file.bytes).map_err(|err| {
            TextureLoadError::DecodeFailed {
                name: name.clone(),
                file: file.file_name.clone(),
                source: err,
            }
        })?;
        images.push(image);
    }

    let (width, height) = images[0].dimensions();
    if cube {
        let odd = images
            .iter()
            .map(|face| face.dimensions())
            .find(|&(w, h)| w != h || (w, h) != (width, height));
        if let Some((width, height)) = odd {
            return Err(TextureLoadError::CubeFaceShape {
                name,
                width,
                height,
            });
        }
    }

    let mut floats = Vec::with_capacity(width as usize * height as usize * 4 * images.len());
    for image in images {
        let mut rgba = expand_channels(&image, entry.params.format);
        if entry.params.flip_y && !cube {
            flip_vertical_in_place(&mut rgba);
        }
        floats.extend_from_slice(rgba.as_raw());
    }

    let texels = match entry.params.texel_type {
        TexelType::UnsignedByte => Texels::Rgba8(
            floats
                .iter()
                .map(|value| (value.clamp(0.0, 1.0) * 255.0).round() as u8)
                .collect(),
        ),
        TexelType::HalfFloat => Texels::Rgba16Float(
            floats
                .iter()
                .map(|value| half::f16::from_f32(*value).to_bits())
                .collect(),
        ),
    };

    Ok(DecodedTexture {
        name: entry.name.clone(),
        slot: entry.slot,
        kind: if cube {
            TextureKind::Cube
        } else {
            TextureKind::Texture2d
        },
        params: entry.params.clone(),
        width,
        height,
        layers: if cube { CUBE_FACES as u32 } else { 1 },
        texels,
    })
}

fn expand_channels(image: &DynamicImage, format: PixelFormat) -> Rgba32FImage {
    let mut rgba = image.to_rgba32f();
    for pixel in rgba.pixels_mut() {
        let [r, g, b, a] = pixel.0;
        let luma = 0.2126 * r + 0.7152 * g + 0.0722 * b;
        pixel.0 = match format {
            PixelFormat::Rgba => [r, g, b, a],
            PixelFormat::Rgb => [r, g, b, 1.0],
            PixelFormat::Alpha => [0.0, 0.0, 0.0, a],
            PixelFormat::Luminance => [luma, luma, luma, 1.0],
            PixelFormat::LuminanceAlpha => [luma, luma, luma, a],
        };
    }
    rgba
}

/// Mip chain for an RGBA8 layer, excluding level 0.
pub(crate) fn mip_chain_rgba8(width: u32, height: u32, level0: &[u8]) -> Vec<(u32, u32, Vec<u8>)> {
    let Some(base) = image::RgbaImage::from_raw(width, height, level0.to_vec()) else {
        return Vec::new();
    };
    let mut levels = Vec::new();
    let (mut w, mut h) = (width, height);
    while w > 1 || h > 1 {
        w = (w / 2).max(1);
        h = (h / 2).max(1);
        let level = image::imageops::resize(&base, w, h, FilterType::Triangle);
        levels.push((w, h, level.into_raw()));
    }
    levels
}

/// Decodes `entry` and uploads it in one go on the calling thread.
pub fn load_texture(
    entry: &TextureEntry,
    backend: &mut dyn GpuBackend,
) -> Result<BoundTexture, TextureLoadError> {
    let decoded = decode_entry(entry)?;
    upload(decoded, backend)
}

fn upload(
    decoded: DecodedTexture,
    backend: &mut dyn GpuBackend,
) -> Result<BoundTexture, TextureLoadError> {
    let id = backend
        .create_texture(&decoded)
        .map_err(|err| TextureLoadError::Gpu {
            name: decoded.name.clone(),
            reason: format!("{err:#}"),
        })?;
    tracing::debug!(
        texture = %decoded.name,
        slot = %decoded.slot,
        width = decoded.width,
        height = decoded.height,
        layers = decoded.layers,
        "texture uploaded"
    );
    Ok(BoundTexture {
        id,
        name: decoded.name,
        slot: decoded.slot,
        kind: decoded.kind,
        params: decoded.params,
        size: [decoded.width, decoded.height],
    })
}

/// Outcome of a committed texture batch.
#[derive(Debug, Default)]
pub struct TextureUpdate {
    pub bound: Vec<BoundTexture>,
    pub errors: Vec<TextureLoadError>,
}

struct DecodeResult {
    generation: u64,
    name: String,
    result: Result<DecodedTexture, TextureLoadError>,
}

struct PendingBatch {
    generation: u64,
    expected: usize,
    results: BTreeMap<String, Result<DecodedTexture, TextureLoadError>>,
}

impl PendingBatch {
    fn is_complete(&self) -> bool {
        self.results.len() >= self.expected
    }
}

/// Owns every texture it uploads and keeps them in step with the latest set.
pub struct TextureLoader {
    requested: Arc<TextureSet>,
    generation: Arc<AtomicU64>,
    pending: Option<PendingBatch>,
    sender: Sender<DecodeResult>,
    receiver: Receiver<DecodeResult>,
    resident: Vec<BoundTexture>,
}

impl TextureLoader {
    pub fn new() -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self {
            requested: Arc::new(TextureSet::new()),
            generation: Arc::new(AtomicU64::new(0)),
            pending: None,
            sender,
            receiver,
            resident: Vec::new(),
        }
    }

    /// Starts loading `set` unless it matches the last request.
    ///
    /// Returns false when nothing changed and no work was scheduled.
    pub fn request(&mut self, set: Arc<TextureSet>) -> bool {
        if !texture_sets_differ(&set, &self.requested) {
            tracing::debug!("texture set unchanged; keeping resident textures");
            return false;
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let entries: Vec<TextureEntry> = set.values().cloned().collect();
        self.requested = set;
        self.pending = Some(PendingBatch {
            generation,
            expected: entries.len(),
            results: BTreeMap::new(),
        });
        tracing::debug!(generation, textures = entries.len(), "texture batch requested");

        if entries.is_empty() {
            return true;
        }

        let sender = self.sender.clone();
        let latest = Arc::clone(&self.generation);
        let spawned = std::thread::Builder::new()
            .name("texture-decode".into())
            .spawn(move || {
                for entry in entries {
                    if latest.load(Ordering::SeqCst) != generation {
                        tracing::debug!(generation, "texture batch superseded; stopping decode");
                        break;
                    }
                    let result = decode_entry(&entry);
                    let message = DecodeResult {
                        generation,
                        name: entry.name,
                        result,
                    };
                    if sender.send(message).is_err() {
                        break;
                    }
                }
            });

        if let Err(err) = spawned {
            tracing::warn!(error = %err, "failed to spawn texture decoder; decoding inline");
            let requested = Arc::clone(&self.requested);
            for entry in requested.values() {
                let result = decode_entry(entry);
                self.accept(DecodeResult {
                    generation,
                    name: entry.name.clone(),
                    result,
                });
            }
        }
        true
    }

    /// Commits the pending batch if every decode has arrived.
    pub fn poll(&mut self, backend: &mut dyn GpuBackend) -> Option<TextureUpdate> {
        while let Ok(message) = self.receiver.try_recv() {
            self.accept(message);
        }
        self.commit(backend)
    }

    /// Like [`TextureLoader::poll`] but blocks up to `timeout` for the batch.
    pub fn wait(&mut self, backend: &mut dyn GpuBackend, timeout: Duration) -> Option<TextureUpdate> {
        let deadline = Instant::now() + timeout;
        while self
            .pending
            .as_ref()
            .is_some_and(|pending| !pending.is_complete())
        {
            match self.receiver.recv_deadline(deadline) {
                Ok(message) => self.accept(message),
                Err(_) => break,
            }
        }
        self.commit(backend)
    }

    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    pub fn resident(&self) -> &[BoundTexture] {
        &self.resident
    }

    /// Disposes every resident texture.
    pub fn release_all(&mut self, backend: &mut dyn GpuBackend) {
        for texture in self.resident.drain(..) {
            backend.dispose_texture(texture.id);
        }
    }

    fn accept(&mut self, message: DecodeResult) {
        match &mut self.pending {
            Some(pending) if pending.generation == message.generation => {
                pending.results.insert(message.name, message.result);
            }
            _ => tracing::debug!(
                generation = message.generation,
                texture = %message.name,
                "dropping superseded texture decode"
            ),
        }
    }

    fn commit(&mut self, backend: &mut dyn GpuBackend) -> Option<TextureUpdate> {
        if !self.pending.as_ref()?.is_complete() {
            return None;
        }
        let pending = self.pending.take()?;

        self.release_all(backend);

        let mut update = TextureUpdate::default();
        for (_, result) in pending.results {
            let uploaded = match result {
                Ok(decoded) => upload(decoded, backend),
                Err(err) => Err(err),
            };
            match uploaded {
                Ok(bound) => update.bound.push(bound),
                Err(err) => {
                    tracing::warn!(error = %err, "texture failed to load");
                    update.errors.push(err);
                }
            }
        }
        self.resident = update.bound.clone();
        tracing::debug!(
            generation = pending.generation,
            bound = update.bound.len(),
            failed = update.errors.len(),
            "texture batch committed"
        );
        Some(update)
    }
}

impl Default for TextureLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::gpu::tracking::TrackingBackend;
    use crate::types::{ImageBlob, TextureMapping};

    pub(crate) fn png(width: u32, height: u32, pixel: [u8; 4]) -> ImageBlob {
        let image = image::RgbaImage::from_pixel(width, height, image::Rgba(pixel));
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        ImageBlob::new("test.png", bytes)
    }

    fn set_of(entries: Vec<TextureEntry>) -> Arc<TextureSet> {
        Arc::new(
            entries
                .into_iter()
                .map(|entry| (entry.name.clone(), entry))
                .collect(),
        )
    }

    const WAIT: Duration = Duration::from_secs(10);

    #[test]
    fn decodes_and_flips_rows() {
        let image = image::RgbaImage::from_fn(1, 2, |_, y| {
            if y == 0 {
                image::Rgba([255, 0, 0, 255])
            } else {
                image::Rgba([0, 0, 255, 255])
            }
        });
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        let entry = TextureEntry::new("rows", ImageBlob::new("rows.png", bytes), TextureSlot::Map);

        let decoded = decode_entry(&entry).unwrap();
        assert_eq!((decoded.width, decoded.height, decoded.layers), (1, 2, 1));
        assert_eq!(
            decoded.texels,
            Texels::Rgba8(vec![0, 0, 255, 255, 255, 0, 0, 255])
        );
    }

    #[test]
    fn luminance_format_expands_grey() {
        let mut entry = TextureEntry::new("grey", png(1, 1, [255, 255, 255, 10]), TextureSlot::AoMap);
        entry.params.format = PixelFormat::Luminance;
        let decoded = decode_entry(&entry).unwrap();
        assert_eq!(decoded.texels, Texels::Rgba8(vec![255, 255, 255, 255]));
    }

    #[test]
    fn half_float_texels() {
        let mut entry = TextureEntry::new("hdr", png(1, 1, [255, 0, 0, 255]), TextureSlot::Hdri);
        entry.params.texel_type = TexelType::HalfFloat;
        let decoded = decode_entry(&entry).unwrap();
        let one = half::f16::from_f32(1.0).to_bits();
        let zero = half::f16::from_f32(0.0).to_bits();
        assert_eq!(decoded.texels, Texels::Rgba16Float(vec![one, zero, zero, one]));
    }

    #[test]
    fn cube_with_five_faces_never_reaches_gpu() {
        let mut backend = TrackingBackend::default();
        let mut entry = TextureEntry::new("sky", png(2, 2, [0; 4]), TextureSlot::EnvMap);
        entry.params.mapping = TextureMapping::CubeReflection;
        entry.files = (0..5).map(|_| png(2, 2, [0; 4])).collect();

        let err = load_texture(&entry, &mut backend).unwrap_err();
        assert!(matches!(
            err,
            TextureLoadError::WrongImageCount { ref name, actual: 5 } if name == "sky"
        ));
        assert_eq!(err.to_string(), "texture 'sky': cube mapping requires 6 images, got 5");
        assert_eq!(backend.texture_creates, 0);
    }

    #[test]
    fn cube_with_six_faces_is_layered() {
        let mut entry = TextureEntry::new("sky", png(2, 2, [0; 4]), TextureSlot::EnvMap);
        entry.params.mapping = TextureMapping::CubeRefraction;
        entry.files = (0..6).map(|_| png(2, 2, [9, 9, 9, 9])).collect();
        let decoded = decode_entry(&entry).unwrap();
        assert_eq!(decoded.kind, TextureKind::Cube);
        assert_eq!(decoded.layers, 6);
        let Texels::Rgba8(bytes) = decoded.texels else {
            panic!("expected 8-bit texels");
        };
        assert_eq!(bytes.len(), 2 * 2 * 4 * 6);
    }

    #[test]
    fn missing_and_corrupt_files_are_reported() {
        let mut entry = TextureEntry::new("empty", png(1, 1, [0; 4]), TextureSlot::Map);
        entry.files.clear();
        let missing = decode_entry(&entry).unwrap_err();
        assert!(matches!(missing, TextureLoadError::MissingFile { .. }));
        assert_eq!(missing.reason(), "no file");
        assert!(missing.to_string().ends_with("no file"));
        assert!(std::error::Error::source(&missing).is_none());

        let corrupt = TextureEntry::new(
            "junk",
            ImageBlob::new("junk.png", vec![0u8, 1, 2, 3]),
            TextureSlot::Map,
        );
        let failed = decode_entry(&corrupt).unwrap_err();
        assert!(matches!(failed, TextureLoadError::DecodeFailed { .. }));
        assert_eq!(failed.reason(), "decode failed");
        assert!(failed.to_string().contains("decode failed"));
        let source = std::error::Error::source(&failed).expect("decoder error kept");
        assert!(source.downcast_ref::<image::ImageError>().is_some());
    }

    #[test]
    fn mismatched_cube_faces_are_rejected() {
        let mut entry = TextureEntry::new("sky", png(2, 2, [0; 4]), TextureSlot::EnvMap);
        entry.params.mapping = TextureMapping::CubeReflection;
        entry.files = (0..6).map(|_| png(2, 2, [0; 4])).collect();
        entry.files[3] = png(4, 4, [0; 4]);

        let err = decode_entry(&entry).unwrap_err();
        assert!(matches!(
            err,
            TextureLoadError::CubeFaceShape { width: 4, height: 4, .. }
        ));
        assert_eq!(err.reason(), "cube faces differ in shape");

        entry.files = (0..6).map(|_| png(2, 1, [0; 4])).collect();
        assert!(matches!(
            decode_entry(&entry),
            Err(TextureLoadError::CubeFaceShape { width: 2, height: 1, .. })
        ));
    }

    #[test]
    fn unchanged_request_schedules_nothing() {
        let mut backend = TrackingBackend::default();
        let mut loader = TextureLoader::new();
        let set = set_of(vec![TextureEntry::new("a", png(1, 1, [1, 2, 3, 4]), TextureSlot::Map)]);

        assert!(loader.request(Arc::clone(&set)));
        let update = loader.wait(&mut backend, WAIT).unwrap();
        assert_eq!(update.bound.len(), 1);
        assert!(update.errors.is_empty());

        assert!(!loader.request(Arc::new(TextureSet::clone(&set))));
        assert!(loader.poll(&mut backend).is_none());
        assert_eq!(backend.texture_creates, 1);
    }

    #[test]
    fn changed_set_disposes_previous_textures() {
        let mut backend = TrackingBackend::default();
        let mut loader = TextureLoader::new();
        let entry = TextureEntry::new("a", png(1, 1, [1, 2, 3, 4]), TextureSlot::Map);
        loader.request(set_of(vec![entry.clone()]));
        let first = loader.wait(&mut backend, WAIT).unwrap();

        let mut rotated = entry;
        rotated.params.rotation = 1.0;
        loader.request(set_of(vec![rotated]));
        let second = loader.wait(&mut backend, WAIT).unwrap();

        assert!(!backend.live_textures.contains(&first.bound[0].id));
        assert!(backend.live_textures.contains(&second.bound[0].id));
        assert_eq!(backend.live_textures.len(), 1);
        assert_eq!(second.bound[0].params.rotation, 1.0);
    }

    #[test]
    fn only_latest_generation_is_committed() {
        let mut backend = TrackingBackend::default();
        let mut loader = TextureLoader::new();
        loader.request(set_of(vec![
            TextureEntry::new("old-a", png(4, 4, [0; 4]), TextureSlot::Map),
            TextureEntry::new("old-b", png(4, 4, [0; 4]), TextureSlot::AoMap),
        ]));
        loader.request(set_of(vec![TextureEntry::new(
            "new",
            png(1, 1, [0; 4]),
            TextureSlot::Map,
        )]));

        let update = loader.wait(&mut backend, WAIT).unwrap();
        let names: Vec<_> = update.bound.iter().map(|bound| bound.name.as_str()).collect();
        assert_eq!(names, ["new"]);
        assert_eq!(backend.texture_creates, 1);
        assert!(!loader.is_loading());
    }

    #[test]
    fn empty_set_releases_everything() {
        let mut backend = TrackingBackend::default();
        let mut loader = TextureLoader::new();
        loader.request(set_of(vec![TextureEntry::new("a", png(1, 1, [0; 4]), TextureSlot::Map)]));
        loader.wait(&mut backend, WAIT).unwrap();

        loader.request(Arc::new(TextureSet::new()));
        let update = loader.poll(&mut backend).unwrap();
        assert!(update.bound.is_empty());
        assert!(backend.live_textures.is_empty());
    }

    #[test]
    fn failed_entry_does_not_block_others() {
        let mut backend = TrackingBackend::default();
        let mut loader = TextureLoader::new();
        let mut cube = TextureEntry::new("cube", png(1, 1, [0; 4]), TextureSlot::EnvMap);
        cube.params.mapping = TextureMapping::CubeReflection;
        loader.request(set_of(vec![
            cube,
            TextureEntry::new("flat", png(1, 1, [0; 4]), TextureSlot::Map),
        ]));
        let update = loader.wait(&mut backend, WAIT).unwrap();
        assert_eq!(update.bound.len(), 1);
        assert_eq!(update.errors.len(), 1);
        assert_eq!(update.errors[0].texture_name(), "cube");
    }

    #[test]
    fn mip_chain_halves_to_one() {
        let levels = mip_chain_rgba8(4, 2, &[0u8; 4 * 2 * 4]);
        let sizes: Vec<_> = levels.iter().map(|(w, h, _)| (*w, *h)).collect();
        assert_eq!(sizes, [(2, 1), (1, 1)]);
    }
}
