//! Shader validation ahead of pipeline creation.
//!
//! A program is checked in four steps: compile vertex, compile fragment,
//! link, validate. The first failing step wins and its compiler log is turned
//! into a [`ShaderStageError`]. Whatever the outcome, every handle created on
//! the way is released before returning.
//!
//! The steps run against a [`ValidationBackend`]. [`NagaBackend`] drives the
//! GLSL frontend and IR validator bundled with `wgpu`; link checks that every
//! fragment input location is written by the vertex stage with the same type.

use std::collections::BTreeMap;
use std::fmt;

use wgpu::naga;
use wgpu::naga::ShaderStage;

use crate::compile::{wrap_fragment, wrap_vertex, ShaderSources, WrappedShader};
use crate::uniforms::ProgramLayout;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValidationStage {
    Vertex,
    Fragment,
    Link,
    Validate,
}

impl fmt::Display for ValidationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ValidationStage::Vertex => "vertex shader",
            ValidationStage::Fragment => "fragment shader",
            ValidationStage::Link => "program link",
            ValidationStage::Validate => "program validation",
        })
    }
}

/// First failure hit while validating a program.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{stage} error: {message}")]
pub struct ShaderStageError {
    pub stage: ValidationStage,
    /// Line in the user's source, when the log names one.
    pub line: Option<u32>,
    /// `Line N: ...` when a line is known, otherwise the log text.
    pub message: String,
    /// Unmodified compiler log.
    pub raw: String,
}

impl ShaderStageError {
    fn from_log(stage: ValidationStage, log: &str) -> Self {
        let (line, text) = format_compiler_log(log);
        let message = match line {
            Some(line) => format!("Line {line}: {text}"),
            None => text,
        };
        Self {
            stage,
            line,
            message,
            raw: log.to_string(),
        }
    }
}

/// The environment cannot validate shaders at all.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("shader validation is unavailable: {reason}")]
pub struct CapabilityError {
    pub reason: String,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error(transparent)]
    Unavailable(#[from] CapabilityError),
    #[error(transparent)]
    Stage(#[from] ShaderStageError),
}

/// Extracts the line and message from the first error in a compiler log.
///
/// Logs of the form `ERROR: <col>:<line>: <message>` yield the line and the
/// text after the third colon. Anything else yields the trimmed text with an
/// `ERROR:` prefix removed.
pub fn format_compiler_log(log: &str) -> (Option<u32>, String) {
    let first = log
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default();

    let Some(rest) = first.strip_prefix("ERROR:") else {
        return (None, non_empty(first));
    };
    let mut parts = rest.trim_start().splitn(3, ':');
    if let (Some(column), Some(line), Some(message)) = (parts.next(), parts.next(), parts.next()) {
        if column.trim().parse::<u32>().is_ok() {
            if let Ok(line) = line.trim().parse::<u32>() {
                return (Some(line), non_empty(message.trim()));
            }
        }
    }
    (None, non_empty(rest.trim()))
}

fn non_empty(text: &str) -> String {
    if text.is_empty() {
        "Shader error".to_string()
    } else {
        text.to_string()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ShaderHandle(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ProgramHandle(pub u32);

/// Opens throwaway contexts that can compile and link shaders.
pub trait ValidationBackend: Send {
    fn open(&self) -> Result<Box<dyn ValidationContext>, CapabilityError>;
}

/// One validation session. Errors are compiler logs.
pub trait ValidationContext {
    fn compile(&mut self, stage: ShaderStage, shader: &WrappedShader) -> Result<ShaderHandle, String>;
    fn link(&mut self, vertex: ShaderHandle, fragment: ShaderHandle) -> Result<ProgramHandle, String>;
    fn validate(&mut self, program: ProgramHandle) -> Result<(), String>;
    fn delete_shader(&mut self, shader: ShaderHandle);
    fn delete_program(&mut self, program: ProgramHandle);
}

/// A program that passed every step, with the exact sources that were checked.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatedProgram {
    pub sources: ShaderSources,
    pub layout: ProgramLayout,
    pub vertex: WrappedShader,
    pub fragment: WrappedShader,
}

pub struct ShaderValidator {
    backend: Box<dyn ValidationBackend>,
}

impl ShaderValidator {
    pub fn new(backend: Box<dyn ValidationBackend>) -> Self {
        Self { backend }
    }

    /// Validator backed by the bundled naga toolchain.
    pub fn naga() -> Self {
        Self::new(Box::new(NagaBackend))
    }

    /// Succeeds only if both stages compile, link and validate.
    pub fn validate(
        &self,
        sources: &ShaderSources,
        layout: &ProgramLayout,
    ) -> Result<ValidatedProgram, ValidationError> {
        let vertex = wrap_vertex(&sources.vertex);
        let fragment = wrap_fragment(&sources.fragment, layout);

        let mut context = self.backend.open()?;
        let mut created = Created::default();
        let outcome = run_stages(context.as_mut(), &vertex, &fragment, &mut created);
        created.release(context.as_mut());
        outcome?;

        Ok(ValidatedProgram {
            sources: sources.clone(),
            layout: layout.clone(),
            vertex,
            fragment,
        })
    }
}

#[derive(Default)]
struct Created {
    shaders: Vec<ShaderHandle>,
    program: Option<ProgramHandle>,
}

impl Created {
    fn release(self, context: &mut dyn ValidationContext) {
        if let Some(program) = self.program {
            context.delete_program(program);
        }
        for shader in self.shaders {
            context.delete_shader(shader);
        }
    }
}

fn run_stages(
    context: &mut dyn ValidationContext,
    vertex: &WrappedShader,
    fragment: &WrappedShader,
    created: &mut Created,
) -> Result<(), ShaderStageError> {
    let vs = context
        .compile(ShaderStage::Vertex, vertex)
        .map_err(|log| ShaderStageError::from_log(ValidationStage::Vertex, &log))?;
    created.shaders.push(vs);

    let fs = context
        .compile(ShaderStage::Fragment, fragment)
        .map_err(|log| ShaderStageError::from_log(ValidationStage::Fragment, &log))?;
    created.shaders.push(fs);

    let program = context
        .link(vs, fs)
        .map_err(|log| ShaderStageError::from_log(ValidationStage::Link, &log))?;
    created.program = Some(program);

    context
        .validate(program)
        .map_err(|log| ShaderStageError::from_log(ValidationStage::Validate, &log))
}

/// Validation through naga's GLSL frontend and IR validator.
#[derive(Clone, Copy, Debug, Default)]
pub struct NagaBackend;

impl ValidationBackend for NagaBackend {
    fn open(&self) -> Result<Box<dyn ValidationContext>, CapabilityError> {
        Ok(Box::new(NagaContext::default()))
    }
}

struct CompiledStage {
    module: naga::Module,
    shader: WrappedShader,
}

#[derive(Default)]
struct NagaContext {
    shaders: Vec<Option<CompiledStage>>,
    programs: Vec<Option<(usize, usize)>>,
}

impl NagaContext {
    fn shader(&self, handle: ShaderHandle) -> Result<&CompiledStage, String> {
        self.shaders
            .get(handle.0 as usize)
            .and_then(Option::as_ref)
            .ok_or_else(|| format!("ERROR: shader handle {} is not live", handle.0))
    }
}

impl ValidationContext for NagaContext {
    fn compile(&mut self, stage: ShaderStage, shader: &WrappedShader) -> Result<ShaderHandle, String> {
        let mut frontend = naga::front::glsl::Frontend::default();
        let options = naga::front::glsl::Options::from(stage);
        let module = frontend.parse(&options, &shader.source).map_err(|errors| {
            let lines: Vec<String> = errors
                .errors
                .iter()
                .map(|error| {
                    let location = error.meta.location(&shader.source);
                    match shader.user_line(location.line_number) {
                        Some(line) => {
                            format!("ERROR: {}:{}: {}", location.line_position, line, error.kind)
                        }
                        None => format!("ERROR: {}", error.kind),
                    }
                })
                .collect();
            if lines.is_empty() {
                "ERROR: compilation failed".to_string()
            } else {
                lines.join("\n")
            }
        })?;

        self.shaders.push(Some(CompiledStage {
            module,
            shader: shader.clone(),
        }));
        Ok(ShaderHandle(self.shaders.len() as u32 - 1))
    }

    fn link(&mut self, vertex: ShaderHandle, fragment: ShaderHandle) -> Result<ProgramHandle, String> {
        let outputs = stage_interface(&self.shader(vertex)?.module, ShaderStage::Vertex, true);
        let inputs = stage_interface(&self.shader(fragment)?.module, ShaderStage::Fragment, false);

        for (location, wanted) in &inputs {
            match outputs.get(location) {
                None => {
                    return Err(format!(
                        "ERROR: fragment input at location {location} is not written by the vertex shader"
                    ))
                }
                Some(written) if written != wanted => {
                    return Err(format!(
                        "ERROR: location {location} is written as {} but read as {}",
                        type_name(written),
                        type_name(wanted)
                    ))
                }
                Some(_) => {}
            }
        }

        self.programs
            .push(Some((vertex.0 as usize, fragment.0 as usize)));
        Ok(ProgramHandle(self.programs.len() as u32 - 1))
    }

    fn validate(&mut self, program: ProgramHandle) -> Result<(), String> {
        let (vertex, fragment) = self
            .programs
            .get(program.0 as usize)
            .copied()
            .flatten()
            .ok_or_else(|| format!("ERROR: program handle {} is not live", program.0))?;

        for index in [vertex, fragment] {
            let stage = self.shader(ShaderHandle(index as u32))?;
            let mut validator = naga::valid::Validator::new(
                naga::valid::ValidationFlags::all(),
                naga::valid::Capabilities::all(),
            );
            if let Err(error) = validator.validate(&stage.module) {
                let mut message = error.as_inner().to_string();
                let mut source = std::error::Error::source(error.as_inner());
                while let Some(cause) = source {
                    message.push_str(": ");
                    message.push_str(&cause.to_string());
                    source = std::error::Error::source(cause);
                }
                let line = error
                    .spans()
                    .next()
                    .map(|(span, _)| span.location(&stage.shader.source).line_number)
                    .and_then(|line| stage.shader.user_line(line));
                return Err(match line {
                    Some(line) => format!("ERROR: 0:{line}: {message}"),
                    None => format!("ERROR: {message}"),
                });
            }
        }
        Ok(())
    }

    fn delete_shader(&mut self, shader: ShaderHandle) {
        if let Some(slot) = self.shaders.get_mut(shader.0 as usize) {
            *slot = None;
        }
    }

    fn delete_program(&mut self, program: ProgramHandle) {
        if let Some(slot) = self.programs.get_mut(program.0 as usize) {
            *slot = None;
        }
    }
}

/// Location-bound inputs (or outputs) of the module's entry point for `stage`.
fn stage_interface(
    module: &naga::Module,
    stage: ShaderStage,
    outputs: bool,
) -> BTreeMap<u32, naga::TypeInner> {
    let mut interface = BTreeMap::new();
    let Some(entry) = module.entry_points.iter().find(|entry| entry.stage == stage) else {
        return interface;
    };
    if outputs {
        if let Some(result) = &entry.function.result {
            collect_locations(module, result.ty, result.binding.as_ref(), &mut interface);
        }
    } else {
        for argument in &entry.function.arguments {
            collect_locations(module, argument.ty, argument.binding.as_ref(), &mut interface);
        }
    }
    interface
}

fn collect_locations(
    module: &naga::Module,
    ty: naga::Handle<naga::Type>,
    binding: Option<&naga::Binding>,
    out: &mut BTreeMap<u32, naga::TypeInner>,
) {
    match binding {
        Some(naga::Binding::Location { location, .. }) => {
            out.insert(*location, module.types[ty].inner.clone());
        }
        Some(naga::Binding::BuiltIn(_)) => {}
        None => {
            if let naga::TypeInner::Struct { members, .. } = &module.types[ty].inner {
                for member in members {
                    collect_locations(module, member.ty, member.binding.as_ref(), out);
                }
            }
        }
    }
}

fn type_name(inner: &naga::TypeInner) -> String {
    match inner {
        naga::TypeInner::Scalar(scalar) => format!("{:?}", scalar.kind).to_lowercase(),
        naga::TypeInner::Vector { size, scalar } => {
            format!("{:?}{}", scalar.kind, *size as u8).to_lowercase()
        }
        other => format!("{other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::compile::{DEFAULT_FRAGMENT, DEFAULT_VERTEX};
    use crate::types::{TextureMapping, TextureSlot};
    use crate::uniforms::TextureKind;

    #[test]
    fn formats_line_and_message() {
        let (line, message) = format_compiler_log("ERROR: 0:12: 'foo' : undeclared identifier\n");
        assert_eq!(line, Some(12));
        assert_eq!(message, "'foo' : undeclared identifier");
    }

    #[test]
    fn passes_unstructured_logs_through() {
        assert_eq!(
            format_compiler_log("ERROR: link failed"),
            (None, "link failed".to_string())
        );
        assert_eq!(format_compiler_log(""), (None, "Shader error".to_string()));
        assert_eq!(
            format_compiler_log("something odd"),
            (None, "something odd".to_string())
        );
    }

    #[test]
    fn default_program_validates() {
        let validator = ShaderValidator::naga();
        let program = validator
            .validate(&ShaderSources::default(), &ProgramLayout::default())
            .unwrap();
        assert_eq!(program.sources.vertex, DEFAULT_VERTEX);
        assert_eq!(program.sources.fragment, DEFAULT_FRAGMENT);
    }

    #[test]
    fn mapped_presets_validate() {
        let validator = ShaderValidator::naga();
        for mapping in [
            TextureMapping::Uv,
            TextureMapping::CubeReflection,
            TextureMapping::CubeRefraction,
            TextureMapping::EquirectangularReflection,
            TextureMapping::EquirectangularRefraction,
            TextureMapping::SphericalReflection,
        ] {
            let sources = ShaderSources::for_mapping(mapping);
            let layout = ShaderSources::mapping_layout(mapping);
            if let Err(err) = validator.validate(&sources, &layout) {
                panic!("{mapping:?} preset failed: {err}");
            }
        }
    }

    #[test]
    fn fragment_syntax_error_reports_user_line() {
        let fragment = "layout(location = 0) out vec4 fragColor;\nvoid main() {\n    fragColor = vec4(1.0) +;\n}\n";
        let sources = ShaderSources::new(DEFAULT_VERTEX, fragment);
        let err = ShaderValidator::naga()
            .validate(&sources, &ProgramLayout::default())
            .unwrap_err();
        let ValidationError::Stage(err) = err else {
            panic!("expected a stage error, got {err:?}");
        };
        assert_eq!(err.stage, ValidationStage::Fragment);
        assert_eq!(err.line, Some(3));
        assert!(err.message.starts_with("Line 3: "), "{}", err.message);
    }

    #[test]
    fn unbound_sampler_is_a_fragment_error() {
        let fragment = "layout(location = 0) in vec2 vUv;\nlayout(location = 0) out vec4 fragColor;\nvoid main() {\n    fragColor = texture(u_map, vUv);\n}\n";
        let sources = ShaderSources::new(DEFAULT_VERTEX, fragment);
        let validator = ShaderValidator::naga();
        let err = validator
            .validate(&sources, &ProgramLayout::default())
            .unwrap_err();
        assert!(matches!(
            err,
            ValidationError::Stage(ShaderStageError { stage: ValidationStage::Fragment, .. })
        ));

        let layout = ProgramLayout::new([(TextureSlot::Map, TextureKind::Texture2d)]);
        assert!(validator.validate(&sources, &layout).is_ok());
    }

    #[test]
    fn mismatched_varyings_fail_link() {
        let fragment = "layout(location = 1) in vec3 vNormal;\nlayout(location = 0) out vec4 fragColor;\nvoid main() {\n    fragColor = vec4(vNormal, 1.0);\n}\n";
        let sources = ShaderSources::new(DEFAULT_VERTEX, fragment);
        let err = ShaderValidator::naga()
            .validate(&sources, &ProgramLayout::default())
            .unwrap_err();
        let ValidationError::Stage(err) = err else {
            panic!("expected a stage error, got {err:?}");
        };
        assert_eq!(err.stage, ValidationStage::Link);
        assert_eq!(err.line, None);
        assert!(err.message.contains("location 1"), "{}", err.message);
    }

    /// Counts live handles and fails at a chosen step.
    struct Scripted {
        fail_at: Option<ValidationStage>,
        live: Arc<AtomicUsize>,
    }

    struct ScriptedContext {
        fail_at: Option<ValidationStage>,
        live: Arc<AtomicUsize>,
        next: u32,
    }

    impl ValidationBackend for Scripted {
        fn open(&self) -> Result<Box<dyn ValidationContext>, CapabilityError> {
            Ok(Box::new(ScriptedContext {
                fail_at: self.fail_at,
                live: Arc::clone(&self.live),
                next: 0,
            }))
        }
    }

    impl ScriptedContext {
        fn step(&mut self, stage: ValidationStage) -> Result<u32, String> {
            if self.fail_at == Some(stage) {
                return Err("ERROR: 0:7: scripted failure".to_string());
            }
            self.live.fetch_add(1, Ordering::SeqCst);
            self.next += 1;
            Ok(self.next)
        }
    }

    impl ValidationContext for ScriptedContext {
        fn compile(&mut self, stage: ShaderStage, _: &WrappedShader) -> Result<ShaderHandle, String> {
            let step = match stage {
                ShaderStage::Vertex => ValidationStage::Vertex,
                _ => ValidationStage::Fragment,
            };
            self.step(step).map(ShaderHandle)
        }

        fn link(&mut self, _: ShaderHandle, _: ShaderHandle) -> Result<ProgramHandle, String> {
            self.step(ValidationStage::Link).map(ProgramHandle)
        }

        fn validate(&mut self, _: ProgramHandle) -> Result<(), String> {
            if self.fail_at == Some(ValidationStage::Validate) {
                return Err("ERROR: validate failed".to_string());
            }
            Ok(())
        }

        fn delete_shader(&mut self, _: ShaderHandle) {
            self.live.fetch_sub(1, Ordering::SeqCst);
        }

        fn delete_program(&mut self, _: ProgramHandle) {
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn every_path_releases_handles() {
        for fail_at in [
            None,
            Some(ValidationStage::Vertex),
            Some(ValidationStage::Fragment),
            Some(ValidationStage::Link),
            Some(ValidationStage::Validate),
        ] {
            let live = Arc::new(AtomicUsize::new(0));
            let validator = ShaderValidator::new(Box::new(Scripted {
                fail_at,
                live: Arc::clone(&live),
            }));
            let result = validator.validate(&ShaderSources::default(), &ProgramLayout::default());
            assert_eq!(result.is_ok(), fail_at.is_none());
            if let (Some(stage), Err(ValidationError::Stage(err))) = (fail_at, &result) {
                assert_eq!(err.stage, stage);
            }
            assert_eq!(live.load(Ordering::SeqCst), 0, "leak when failing at {fail_at:?}");
        }
    }

    #[test]
    fn capability_error_is_distinct() {
        struct Unavailable;
        impl ValidationBackend for Unavailable {
            fn open(&self) -> Result<Box<dyn ValidationContext>, CapabilityError> {
                Err(CapabilityError {
                    reason: "no context".into(),
                })
            }
        }
        let err = ShaderValidator::new(Box::new(Unavailable))
            .validate(&ShaderSources::default(), &ProgramLayout::default())
            .unwrap_err();
        assert!(matches!(err, ValidationError::Unavailable(_)));
    }
}
