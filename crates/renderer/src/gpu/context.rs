use anyhow::{bail, Context as AnyhowContext, Result};

/// Adapter power preference for the headless device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum GpuPowerPreference {
    #[default]
    Low,
    High,
}

/// What the selected adapter reported, kept for logs and diagnostics.
#[derive(Clone, Debug)]
pub struct AdapterProfile {
    pub name: String,
    pub backend: wgpu::Backend,
    pub device_type: wgpu::DeviceType,
    pub max_texture_dimension_2d: u32,
}

impl AdapterProfile {
    fn from_wgpu(info: &wgpu::AdapterInfo, limits: &wgpu::Limits) -> Self {
        Self {
            name: info.name.clone(),
            backend: info.backend,
            device_type: info.device_type,
            max_texture_dimension_2d: limits.max_texture_dimension_2d,
        }
    }

    pub fn is_software(&self) -> bool {
        matches!(self.device_type, wgpu::DeviceType::Cpu)
    }
}

/// Device and queue without a presentation surface.
pub(crate) struct GpuContext {
    pub _instance: wgpu::Instance,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter_profile: AdapterProfile,
    pub target_format: wgpu::TextureFormat,
    pub depth_format: wgpu::TextureFormat,
}

impl GpuContext {
    pub(crate) fn new(power: GpuPowerPreference, width: u32, height: u32) -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            flags: wgpu::InstanceFlags::default(),
            memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
            backend_options: wgpu::BackendOptions::default(),
        });

        let power_preference = match power {
            GpuPowerPreference::Low => wgpu::PowerPreference::LowPower,
            GpuPowerPreference::High => wgpu::PowerPreference::HighPerformance,
        };
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .context("failed to find a suitable GPU adapter")?;

        let limits = adapter.limits();
        let adapter_profile = AdapterProfile::from_wgpu(&adapter.get_info(), &limits);
        tracing::debug!(
            name = %adapter_profile.name,
            backend = ?adapter_profile.backend,
            device_type = ?adapter_profile.device_type,
            is_software = adapter_profile.is_software(),
            "selected GPU adapter"
        );

        let max_dimension = limits.max_texture_dimension_2d;
        if width.max(1) > max_dimension || height.max(1) > max_dimension {
            bail!(
                "GPU max texture dimension is {max_dimension}, requested target is {width}x{height}"
            );
        }

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("scenedit device"),
            required_features: wgpu::Features::empty(),
            required_limits: limits,
            memory_hints: wgpu::MemoryHints::MemoryUsage,
            trace: wgpu::Trace::default(),
        }))
        .context("failed to create GPU device")?;

        Ok(Self {
            _instance: instance,
            device,
            queue,
            adapter_profile,
            target_format: wgpu::TextureFormat::Rgba8UnormSrgb,
            depth_format: wgpu::TextureFormat::Depth32Float,
        })
    }
}
