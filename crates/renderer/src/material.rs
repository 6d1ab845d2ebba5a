//! Two-slot shader program state.
//!
//! `submitted` is whatever the user last typed, `last_good` is the newest
//! pair that validated. The installed program always comes from a validated
//! pair: a rejected submission leaves the previous program on screen, and a
//! replacement is fully built before the old one is disposed.

use anyhow::{Context, Result};

use crate::compile::ShaderSources;
use crate::gpu::{GpuBackend, ProgramId};
use crate::notify::{Notification, NotificationKind};
use crate::uniforms::ProgramLayout;
use crate::validate::{
    CapabilityError, ShaderStageError, ShaderValidator, ValidatedProgram, ValidationError,
    ValidationStage,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProgramStatus {
    Uncompiled,
    Valid,
    Invalid(ShaderStageError),
}

struct ActiveProgram {
    id: ProgramId,
    program: ValidatedProgram,
}

pub struct MaterialManager {
    validator: ShaderValidator,
    submitted: Option<ShaderSources>,
    status: ProgramStatus,
    last_good: ShaderSources,
    active: Option<ActiveProgram>,
}

impl MaterialManager {
    pub fn new(validator: ShaderValidator) -> Self {
        Self {
            validator,
            submitted: None,
            status: ProgramStatus::Uncompiled,
            last_good: ShaderSources::default(),
            active: None,
        }
    }

    /// Installs the built-in program.
    pub fn initialize(&mut self, layout: &ProgramLayout, backend: &mut dyn GpuBackend) -> Result<()> {
        let program = self
            .validator
            .validate(&ShaderSources::default(), layout)
            .context("built-in shader program failed validation")?;
        self.install(program, backend)
            .context("failed to create the built-in shader program")?;
        self.status = ProgramStatus::Valid;
        Ok(())
    }

    pub fn active(&self) -> Option<ProgramId> {
        self.active.as_ref().map(|active| active.id)
    }

    pub fn active_sources(&self) -> Option<&ShaderSources> {
        self.active.as_ref().map(|active| &active.program.sources)
    }

    pub fn status(&self) -> &ProgramStatus {
        &self.status
    }

    pub fn last_good(&self) -> &ShaderSources {
        &self.last_good
    }

    pub fn submitted(&self) -> Option<&ShaderSources> {
        self.submitted.as_ref()
    }

    /// Validates `sources` and swaps them in on success.
    ///
    /// Resubmitting the current sources against the installed layout is a
    /// no-op and yields no notification.
    pub fn submit(
        &mut self,
        sources: ShaderSources,
        layout: &ProgramLayout,
        backend: &mut dyn GpuBackend,
    ) -> Result<Option<Notification>, CapabilityError> {
        if self.submitted.as_ref() == Some(&sources) && self.active_layout() == Some(layout) {
            return Ok(None);
        }
        self.submitted = Some(sources.clone());

        match self.validator.validate(&sources, layout) {
            Ok(program) => Ok(Some(self.accept(program, layout, backend)?)),
            Err(ValidationError::Stage(err)) => Ok(Some(self.reject(err, layout, backend)?)),
            Err(ValidationError::Unavailable(err)) => Err(err),
        }
    }

    /// Follows a change in bound textures.
    ///
    /// A submission that was rejected is retried first, since it may only
    /// have been missing a sampler. Otherwise the last good sources are
    /// rebuilt against the new layout.
    pub fn rebind(
        &mut self,
        layout: &ProgramLayout,
        backend: &mut dyn GpuBackend,
    ) -> Result<Option<Notification>, CapabilityError> {
        if let (ProgramStatus::Invalid(_), Some(submitted)) = (&self.status, &self.submitted) {
            match self.validator.validate(submitted, layout) {
                Ok(program) => return Ok(Some(self.accept(program, layout, backend)?)),
                Err(ValidationError::Unavailable(err)) => return Err(err),
                Err(ValidationError::Stage(_)) => {}
            }
        }
        self.restore_last_good(layout, backend)?;
        Ok(None)
    }

    /// Disposes the installed program.
    pub fn release(&mut self, backend: &mut dyn GpuBackend) {
        if let Some(active) = self.active.take() {
            backend.dispose_program(active.id);
        }
    }

    fn active_layout(&self) -> Option<&ProgramLayout> {
        self.active.as_ref().map(|active| &active.program.layout)
    }

    fn accept(
        &mut self,
        program: ValidatedProgram,
        layout: &ProgramLayout,
        backend: &mut dyn GpuBackend,
    ) -> Result<Notification, CapabilityError> {
        let sources = program.sources.clone();
        match self.install(program, backend) {
            Ok(()) => {
                tracing::info!("shader program compiled and installed");
                self.last_good = sources;
                self.status = ProgramStatus::Valid;
                Ok(Notification::success(
                    NotificationKind::ShaderCompiled,
                    "Shader compiled successfully",
                ))
            }
            Err(err) => {
                let log = format!("{err:#}");
                let rejected = ShaderStageError {
                    stage: ValidationStage::Validate,
                    line: None,
                    message: log.clone(),
                    raw: log,
                };
                self.reject(rejected, layout, backend)
            }
        }
    }

    fn reject(
        &mut self,
        err: ShaderStageError,
        layout: &ProgramLayout,
        backend: &mut dyn GpuBackend,
    ) -> Result<Notification, CapabilityError> {
        tracing::warn!(stage = %err.stage, raw = %err.raw, "shader program rejected");
        let notification = Notification::error(NotificationKind::Shader(err.stage), err.to_string());
        self.status = ProgramStatus::Invalid(err);
        self.restore_last_good(layout, backend)?;
        Ok(notification)
    }

    /// Makes sure the installed program matches `layout`, rebuilding from
    /// the last good sources or, failing that, the built-in program.
    fn restore_last_good(
        &mut self,
        layout: &ProgramLayout,
        backend: &mut dyn GpuBackend,
    ) -> Result<(), CapabilityError> {
        if self.active_layout() == Some(layout) {
            return Ok(());
        }

        let program = match self.validator.validate(&self.last_good, layout) {
            Ok(program) => program,
            Err(ValidationError::Unavailable(err)) => return Err(err),
            Err(ValidationError::Stage(err)) => {
                tracing::warn!(
                    error = %err,
                    "last good shader does not fit the bound textures; using the built-in program"
                );
                match self.validator.validate(&ShaderSources::default(), layout) {
                    Ok(program) => program,
                    Err(ValidationError::Unavailable(err)) => return Err(err),
                    Err(ValidationError::Stage(err)) => {
                        tracing::error!(error = %err, "built-in shader failed validation");
                        return Ok(());
                    }
                }
            }
        };

        if let Err(err) = self.install(program, backend) {
            tracing::error!(error = %format!("{err:#}"), "failed to rebuild shader program");
        }
        Ok(())
    }

    fn install(&mut self, program: ValidatedProgram, backend: &mut dyn GpuBackend) -> Result<()> {
        let id = backend.create_program(&program)?;
        if let Some(previous) = self.active.replace(ActiveProgram { id, program }) {
            backend.dispose_program(previous.id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::{DEFAULT_FRAGMENT, DEFAULT_VERTEX};
    use crate::gpu::tracking::TrackingBackend;
    use crate::notify::Severity;
    use crate::types::TextureSlot;
    use crate::uniforms::TextureKind;
    use crate::validate::{ValidationBackend, ValidationContext};

    const RED: &str = "layout(location = 0) in vec2 vUv;\nlayout(location = 0) out vec4 fragColor;\nvoid main() {\n    fragColor = vec4(1.0, 0.0, 0.0, 1.0);\n}\n";
    const BROKEN: &str = "layout(location = 0) out vec4 fragColor;\nvoid main() {\n    fragColor = vec4(1.0) +;\n}\n";
    const SAMPLES_MAP: &str = "layout(location = 0) in vec2 vUv;\nlayout(location = 0) out vec4 fragColor;\nvoid main() {\n    fragColor = texture(u_map, vUv);\n}\n";

    fn ready() -> (MaterialManager, TrackingBackend) {
        let mut backend = TrackingBackend::default();
        let mut materials = MaterialManager::new(ShaderValidator::naga());
        materials
            .initialize(&ProgramLayout::default(), &mut backend)
            .unwrap();
        (materials, backend)
    }

    fn map_layout() -> ProgramLayout {
        ProgramLayout::new([(TextureSlot::Map, TextureKind::Texture2d)])
    }

    #[test]
    fn rejected_fragment_keeps_previous_program() {
        let (mut materials, mut backend) = ready();
        let before = materials.active();

        let notification = materials
            .submit(
                ShaderSources::new(DEFAULT_VERTEX, BROKEN),
                &ProgramLayout::default(),
                &mut backend,
            )
            .unwrap()
            .unwrap();

        assert_eq!(notification.severity, Severity::Error);
        assert!(notification.message.contains("Line 3"), "{}", notification.message);
        assert_eq!(materials.active(), before);
        assert_eq!(materials.last_good().fragment, DEFAULT_FRAGMENT);
        assert!(matches!(materials.status(), ProgramStatus::Invalid(err) if err.stage == ValidationStage::Fragment));
        assert_eq!(backend.live_programs.len(), 1);
    }

    #[test]
    fn accepted_program_replaces_and_disposes_old() {
        let (mut materials, mut backend) = ready();
        let before = materials.active().unwrap();

        let notification = materials
            .submit(
                ShaderSources::new(DEFAULT_VERTEX, RED),
                &ProgramLayout::default(),
                &mut backend,
            )
            .unwrap()
            .unwrap();

        assert_eq!(notification.severity, Severity::Success);
        let after = materials.active().unwrap();
        assert_ne!(before, after);
        assert!(!backend.live_programs.contains(&before));
        assert_eq!(backend.live_programs.len(), 1);
        assert_eq!(materials.last_good().fragment, RED);
    }

    #[test]
    fn resubmitting_identical_sources_is_quiet() {
        let (mut materials, mut backend) = ready();
        let broken = ShaderSources::new(DEFAULT_VERTEX, BROKEN);
        let layout = ProgramLayout::default();
        assert!(materials
            .submit(broken.clone(), &layout, &mut backend)
            .unwrap()
            .is_some());
        assert!(materials.submit(broken, &layout, &mut backend).unwrap().is_none());
        assert_eq!(backend.program_creates, 1);
    }

    #[test]
    fn rejected_submission_retried_when_sampler_appears() {
        let (mut materials, mut backend) = ready();
        let sources = ShaderSources::new(DEFAULT_VERTEX, SAMPLES_MAP);
        let rejected = materials
            .submit(sources.clone(), &ProgramLayout::default(), &mut backend)
            .unwrap()
            .unwrap();
        assert_eq!(rejected.severity, Severity::Error);

        let retried = materials.rebind(&map_layout(), &mut backend).unwrap().unwrap();
        assert_eq!(retried.severity, Severity::Success);
        assert_eq!(materials.last_good(), &sources);
        assert_eq!(backend.live_programs.len(), 1);
    }

    #[test]
    fn removed_sampler_falls_back_to_builtin() {
        let (mut materials, mut backend) = ready();
        let sources = ShaderSources::new(DEFAULT_VERTEX, SAMPLES_MAP);
        materials
            .submit(sources.clone(), &map_layout(), &mut backend)
            .unwrap();
        assert_eq!(materials.last_good(), &sources);

        assert!(materials
            .rebind(&ProgramLayout::default(), &mut backend)
            .unwrap()
            .is_none());
        assert_eq!(materials.active_sources(), Some(&ShaderSources::default()));
        assert_eq!(materials.last_good(), &sources);
        assert_eq!(backend.live_programs.len(), 1);
    }

    #[test]
    fn pipeline_failure_is_a_rejection() {
        let (mut materials, mut backend) = ready();
        let before = materials.active();
        backend.fail_programs = true;
        let notification = materials
            .submit(
                ShaderSources::new(DEFAULT_VERTEX, RED),
                &ProgramLayout::default(),
                &mut backend,
            )
            .unwrap()
            .unwrap();
        assert_eq!(notification.severity, Severity::Error);
        assert_eq!(materials.active(), before);
        assert_eq!(materials.last_good().fragment, DEFAULT_FRAGMENT);
    }

    #[test]
    fn unavailable_validation_is_surfaced() {
        struct Unavailable;
        impl ValidationBackend for Unavailable {
            fn open(&self) -> Result<Box<dyn ValidationContext>, CapabilityError> {
                Err(CapabilityError {
                    reason: "no context".into(),
                })
            }
        }
        let mut backend = TrackingBackend::default();
        let mut materials = MaterialManager::new(ShaderValidator::new(Box::new(Unavailable)));
        assert!(materials
            .initialize(&ProgramLayout::default(), &mut backend)
            .is_err());
        let err = materials
            .submit(ShaderSources::default(), &ProgramLayout::default(), &mut backend)
            .unwrap_err();
        assert_eq!(err.reason, "no context");
    }
}
