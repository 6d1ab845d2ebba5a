//! Per-frame orchestration: config, textures, program and draw.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use sceneconfig::{
    ConfigStore, DecodeError, FieldPath, FieldValue, LineIssue, PatchError, SceneConfig,
};

use crate::compile::ShaderSources;
use crate::geometry::Geometry;
use crate::gpu::{DrawCall, GpuBackend, MeshId, ProgramId};
use crate::material::MaterialManager;
use crate::notify::{Notification, NotificationKind, Notifier};
use crate::scene::{Camera, SceneObject};
use crate::textures::{TextureLoader, TextureUpdate};
use crate::types::{RendererOptions, TextureEntry, TextureSet};
use crate::uniforms::{SceneBlock, UniformSet};
use crate::validate::{CapabilityError, ShaderValidator};

/// Monotonic time source for the `uTime` uniform; can be paused.
#[derive(Clone, Copy, Debug)]
pub struct FrameClock {
    start: Instant,
    paused_at: Option<Instant>,
    paused_total: Duration,
}

impl FrameClock {
    pub fn new(start: Instant) -> Self {
        Self {
            start,
            paused_at: None,
            paused_total: Duration::ZERO,
        }
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        let now = self.paused_at.unwrap_or(now);
        now.saturating_duration_since(self.start)
            .saturating_sub(self.paused_total)
    }

    pub fn pause(&mut self, now: Instant) {
        self.paused_at.get_or_insert(now);
    }

    pub fn resume(&mut self, now: Instant) {
        if let Some(paused_at) = self.paused_at.take() {
            self.paused_total += now.saturating_duration_since(paused_at);
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused_at.is_some()
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameStats {
    pub frame: u64,
    pub time: f32,
    pub program: ProgramId,
}

/// Owns one scene and everything needed to draw it.
pub struct RenderLoop<B: GpuBackend> {
    backend: B,
    config: ConfigStore,
    object: SceneObject,
    mesh: MeshId,
    camera: Camera,
    materials: MaterialManager,
    textures: TextureLoader,
    texture_set: Arc<TextureSet>,
    uniforms: UniformSet,
    notifier: Notifier,
    clock: FrameClock,
    frames: u64,
}

impl<B: GpuBackend> RenderLoop<B> {
    /// Uploads `geometry` and installs the built-in program.
    ///
    /// Fails when shaders cannot be validated at all or the GPU refuses the
    /// initial resources.
    pub fn new(
        mut backend: B,
        validator: ShaderValidator,
        geometry: Geometry,
        options: &RendererOptions,
        now: Instant,
    ) -> Result<Self> {
        let object = SceneObject::new(geometry);
        let mesh = backend
            .upload_mesh(object.geometry())
            .context("failed to upload mesh")?;

        let uniforms = UniformSet::default();
        let mut materials = MaterialManager::new(validator);
        materials.initialize(&uniforms.layout(), &mut backend)?;

        let mut render_loop = Self {
            backend,
            config: ConfigStore::default(),
            object,
            mesh,
            camera: Camera::default(),
            materials,
            textures: TextureLoader::new(),
            texture_set: Arc::new(TextureSet::new()),
            uniforms,
            notifier: Notifier::new(options),
            clock: FrameClock::new(now),
            frames: 0,
        };
        render_loop.sync_config();
        Ok(render_loop)
    }

    pub fn config(&self) -> Arc<SceneConfig> {
        self.config.current()
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn object(&self) -> &SceneObject {
        &self.object
    }

    pub fn materials(&self) -> &MaterialManager {
        &self.materials
    }

    pub fn uniforms(&self) -> &UniformSet {
        &self.uniforms
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn clock_mut(&mut self) -> &mut FrameClock {
        &mut self.clock
    }

    pub fn set_viewport(&mut self, width: u32, height: u32) {
        self.camera.set_viewport(width, height);
    }

    /// Replaces the configuration with decoded editor text.
    ///
    /// A rejected document leaves the running scene untouched.
    pub fn apply_config_text(
        &mut self,
        text: &str,
        now: Instant,
    ) -> Result<Vec<LineIssue>, DecodeError> {
        match self.config.apply_text(text) {
            Ok(issues) => {
                self.sync_config();
                Ok(issues)
            }
            Err(err) => {
                self.notifier
                    .post(Notification::error(NotificationKind::Config, err.to_string()), now);
                Err(err)
            }
        }
    }

    pub fn patch_config(&mut self, path: FieldPath, value: FieldValue) -> Result<(), PatchError> {
        self.config.patch(path, value)?;
        self.sync_config();
        Ok(())
    }

    /// Submits new shader sources against the current texture layout.
    pub fn set_shaders(&mut self, sources: ShaderSources, now: Instant) -> Result<(), CapabilityError> {
        let layout = self.uniforms.layout();
        let outcome = self.materials.submit(sources, &layout, &mut self.backend);
        self.report_material(outcome, now)
    }

    /// Schedules a texture set; unchanged sets are ignored.
    pub fn set_textures(&mut self, set: Arc<TextureSet>) -> bool {
        self.texture_set = Arc::clone(&set);
        self.textures.request(set)
    }

    /// Adds or replaces one texture by name.
    pub fn upsert_texture(&mut self, entry: TextureEntry) -> bool {
        let mut next = TextureSet::clone(&self.texture_set);
        next.insert(entry.name.clone(), entry);
        self.set_textures(Arc::new(next))
    }

    pub fn remove_texture(&mut self, name: &str) -> bool {
        let mut next = TextureSet::clone(&self.texture_set);
        if next.remove(name).is_none() {
            return false;
        }
        self.set_textures(Arc::new(next))
    }

    /// Blocks until a pending texture batch is committed or `timeout` passes.
    pub fn wait_for_textures(&mut self, timeout: Duration, now: Instant) {
        if let Some(update) = self.textures.wait(&mut self.backend, timeout) {
            self.apply_texture_update(update, now);
        }
    }

    /// Runs one frame: commits finished textures, advances rotation, updates
    /// uniforms and draws.
    pub fn frame(&mut self, now: Instant) -> Result<FrameStats> {
        if let Some(update) = self.textures.poll(&mut self.backend) {
            self.apply_texture_update(update, now);
        }

        let config = self.config.current();
        self.object.advance(&config.object.rotation);

        let time = self.clock.elapsed(now).as_secs_f32();
        self.uniforms.set_time(time);

        let program = self
            .materials
            .active()
            .context("no shader program is installed")?;
        let scene = SceneBlock::new(
            self.camera.projection_matrix(),
            self.camera.view_matrix(),
            self.object.model_matrix(),
            self.camera.position,
            time,
        );
        let transforms = self.uniforms.transform_block();
        self.backend.draw(&DrawCall {
            program,
            mesh: self.mesh,
            scene: &scene,
            transforms: &transforms,
            uniforms: &self.uniforms,
        })?;

        self.notifier.tick(now);
        self.frames += 1;
        Ok(FrameStats {
            frame: self.frames,
            time,
            program,
        })
    }

    pub fn notification(&self, now: Instant) -> Option<&Notification> {
        self.notifier.visible(now)
    }

    /// Disposes every GPU resource and hands the backend back.
    pub fn shutdown(mut self) -> B {
        self.textures.release_all(&mut self.backend);
        self.materials.release(&mut self.backend);
        self.backend.dispose_mesh(self.mesh);
        self.backend
    }

    fn sync_config(&mut self) {
        let config = self.config.current();
        self.object.apply_settings(&config.object);
        let skipped = self.camera.apply_settings(&config.camera);
        if !skipped.is_empty() {
            tracing::debug!(count = skipped.len(), "camera fields left unchanged");
        }
    }

    fn apply_texture_update(&mut self, update: TextureUpdate, now: Instant) {
        let time = self.uniforms.time();
        self.uniforms = UniformSet::from_textures(&update.bound);
        self.uniforms.set_time(time);

        for err in update.errors {
            let message = format!("{:#}", anyhow::Error::new(err));
            self.notifier
                .post(Notification::error(NotificationKind::Texture, message), now);
        }

        let layout = self.uniforms.layout();
        let outcome = self.materials.rebind(&layout, &mut self.backend);
        if let Err(err) = self.report_material(outcome, now) {
            tracing::error!(error = %err, "shader program could not follow texture change");
        }
    }

    fn report_material(
        &mut self,
        outcome: Result<Option<Notification>, CapabilityError>,
        now: Instant,
    ) -> Result<(), CapabilityError> {
        match outcome {
            Ok(Some(notification)) => {
                self.notifier.post(notification, now);
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(err) => {
                self.notifier.post(
                    Notification::error(NotificationKind::Unavailable, err.to_string()),
                    now,
                );
                Err(err)
            }
        }
    }
}
