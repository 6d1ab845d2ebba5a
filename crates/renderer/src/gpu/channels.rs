use anyhow::{bail, Result};
use wgpu::util::{DeviceExt, TextureDataOrder};

use crate::textures::{mip_chain_rgba8, DecodedTexture, Texels};
use crate::types::{MagFilter, MinFilter, TextureEncoding, TextureParams, WrapMode};
use crate::uniforms::TextureKind;

/// GPU objects backing one uploaded texture.
pub(crate) struct TextureResources {
    pub _texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
    pub kind: TextureKind,
}

pub(crate) fn create_resources(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    decoded: &DecodedTexture,
    max_anisotropy: u16,
) -> Result<TextureResources> {
    let format = texture_format(&decoded.params, &decoded.texels);
    let texel_size = format.block_copy_size(None).unwrap_or(4) as usize;
    let expected =
        decoded.width as usize * decoded.height as usize * decoded.layers as usize * texel_size;
    let level0 = texel_bytes(&decoded.texels);
    if level0.len() != expected {
        bail!(
            "texture '{}' has {} bytes of texels, expected {expected}",
            decoded.name,
            level0.len()
        );
    }

    let (data, mip_level_count) = with_mips(decoded, level0);
    let texture = device.create_texture_with_data(
        queue,
        &wgpu::TextureDescriptor {
            label: Some(&format!("{} texture", decoded.slot)),
            size: wgpu::Extent3d {
                width: decoded.width,
                height: decoded.height,
                depth_or_array_layers: decoded.layers,
            },
            mip_level_count,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        },
        TextureDataOrder::LayerMajor,
        &data,
    );

    let view = texture.create_view(&wgpu::TextureViewDescriptor {
        label: Some(&format!("{} view", decoded.slot)),
        dimension: Some(view_dimension(decoded.kind)),
        array_layer_count: Some(decoded.layers),
        ..Default::default()
    });
    let sampler = device.create_sampler(&sampler_descriptor(
        &decoded.params,
        mip_level_count > 1,
        max_anisotropy,
    ));

    tracing::debug!(
        name = %decoded.name,
        slot = %decoded.slot,
        ?format,
        width = decoded.width,
        height = decoded.height,
        mip_level_count,
        "uploaded texture"
    );

    Ok(TextureResources {
        _texture: texture,
        view,
        sampler,
        kind: decoded.kind,
    })
}

pub(crate) fn view_dimension(kind: TextureKind) -> wgpu::TextureViewDimension {
    match kind {
        TextureKind::Texture2d => wgpu::TextureViewDimension::D2,
        TextureKind::Cube => wgpu::TextureViewDimension::Cube,
    }
}

fn texture_format(params: &TextureParams, texels: &Texels) -> wgpu::TextureFormat {
    match texels {
        Texels::Rgba16Float(_) => wgpu::TextureFormat::Rgba16Float,
        Texels::Rgba8(_) if params.encoding == TextureEncoding::Srgb => {
            wgpu::TextureFormat::Rgba8UnormSrgb
        }
        Texels::Rgba8(_) => wgpu::TextureFormat::Rgba8Unorm,
    }
}

fn texel_bytes(texels: &Texels) -> &[u8] {
    match texels {
        Texels::Rgba8(bytes) => bytes,
        Texels::Rgba16Float(halves) => bytemuck::cast_slice(halves),
    }
}

/// Packs every layer's mip chain layer-major; half-float data stays single level.
fn with_mips(decoded: &DecodedTexture, level0: &[u8]) -> (Vec<u8>, u32) {
    let wants_mips = decoded.params.min_filter.uses_mipmaps()
        && matches!(decoded.texels, Texels::Rgba8(_))
        && (decoded.width > 1 || decoded.height > 1);
    if !wants_mips {
        return (level0.to_vec(), 1);
    }

    let layer_len = level0.len() / decoded.layers.max(1) as usize;
    let mut data = Vec::with_capacity(level0.len() * 4 / 3 + layer_len);
    let mut levels = 1;
    for layer in level0.chunks_exact(layer_len) {
        data.extend_from_slice(layer);
        let chain = mip_chain_rgba8(decoded.width, decoded.height, layer);
        levels = chain.len() as u32 + 1;
        for (_, _, level) in chain {
            data.extend_from_slice(&level);
        }
    }
    (data, levels)
}

fn address_mode(mode: WrapMode) -> wgpu::AddressMode {
    match mode {
        WrapMode::Repeat => wgpu::AddressMode::Repeat,
        WrapMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
        WrapMode::MirroredRepeat => wgpu::AddressMode::MirrorRepeat,
    }
}

fn min_filters(filter: MinFilter) -> (wgpu::FilterMode, wgpu::FilterMode) {
    use wgpu::FilterMode::{Linear, Nearest};
    match filter {
        MinFilter::Nearest => (Nearest, Nearest),
        MinFilter::Linear => (Linear, Nearest),
        MinFilter::NearestMipmapNearest => (Nearest, Nearest),
        MinFilter::NearestMipmapLinear => (Nearest, Linear),
        MinFilter::LinearMipmapNearest => (Linear, Nearest),
        MinFilter::LinearMipmapLinear => (Linear, Linear),
    }
}

pub(crate) fn sampler_descriptor(
    params: &TextureParams,
    has_mips: bool,
    max_anisotropy: u16,
) -> wgpu::SamplerDescriptor<'static> {
    let mag_filter = match params.mag_filter {
        MagFilter::Nearest => wgpu::FilterMode::Nearest,
        MagFilter::Linear => wgpu::FilterMode::Linear,
    };
    let (min_filter, mut mipmap_filter) = min_filters(params.min_filter);
    if !has_mips {
        mipmap_filter = wgpu::FilterMode::Nearest;
    }

    // Anisotropic sampling is only legal with every filter linear.
    let all_linear = [mag_filter, min_filter, mipmap_filter]
        .iter()
        .all(|filter| *filter == wgpu::FilterMode::Linear);
    let anisotropy_clamp = if all_linear {
        params.clamped_anisotropy().min(max_anisotropy.max(1))
    } else {
        1
    };

    wgpu::SamplerDescriptor {
        label: None,
        address_mode_u: address_mode(params.wrap_s),
        address_mode_v: address_mode(params.wrap_t),
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter,
        min_filter,
        mipmap_filter,
        anisotropy_clamp,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anisotropy_needs_linear_filtering() {
        let mut params = TextureParams {
            anisotropy: 8,
            ..TextureParams::default()
        };
        assert_eq!(sampler_descriptor(&params, true, 16).anisotropy_clamp, 8);
        assert_eq!(sampler_descriptor(&params, true, 4).anisotropy_clamp, 4);
        assert_eq!(sampler_descriptor(&params, false, 16).anisotropy_clamp, 1);

        params.mag_filter = MagFilter::Nearest;
        assert_eq!(sampler_descriptor(&params, true, 16).anisotropy_clamp, 1);
    }

    #[test]
    fn wrap_modes_map_to_address_modes() {
        let params = TextureParams {
            wrap_s: WrapMode::Repeat,
            wrap_t: WrapMode::MirroredRepeat,
            ..TextureParams::default()
        };
        let descriptor = sampler_descriptor(&params, false, 1);
        assert_eq!(descriptor.address_mode_u, wgpu::AddressMode::Repeat);
        assert_eq!(descriptor.address_mode_v, wgpu::AddressMode::MirrorRepeat);
    }

    #[test]
    fn srgb_encoding_selects_srgb_format() {
        let srgb = TextureParams {
            encoding: TextureEncoding::Srgb,
            ..TextureParams::default()
        };
        let texels = Texels::Rgba8(vec![0; 4]);
        assert_eq!(
            texture_format(&srgb, &texels),
            wgpu::TextureFormat::Rgba8UnormSrgb
        );
        assert_eq!(
            texture_format(&TextureParams::default(), &texels),
            wgpu::TextureFormat::Rgba8Unorm
        );
        assert_eq!(
            texture_format(&srgb, &Texels::Rgba16Float(vec![0; 4])),
            wgpu::TextureFormat::Rgba16Float
        );
    }
}
