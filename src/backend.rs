//! Compiler backends the lifecycle manager submits flattened units to.

use std::error::Error as StdError;
use std::fmt::Write as _;

use naga::front::glsl;
use naga::valid::{Capabilities, ModuleInfo, ValidationFlags, Validator};
use naga::{Binding, Module, Span, TypeInner};
use serde::{Deserialize, Serialize};

use crate::remap::{DiagnosticFormat, DiagnosticFormatKind};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ShaderStage {
    Vertex,
    #[default]
    Fragment,
}

impl ShaderStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Vertex => "vertex",
            Self::Fragment => "fragment",
        }
    }

    fn naga(self) -> naga::ShaderStage {
        match self {
            Self::Vertex => naga::ShaderStage::Vertex,
            Self::Fragment => naga::ShaderStage::Fragment,
        }
    }
}

#[derive(Debug)]
pub enum CompileOutcome<U> {
    Compiled(U),
    /// Backend-native text, one diagnostic per line.
    Failed { raw_diagnostics: String },
}

pub trait CompilerBackend {
    type Unit;
    type Program;

    fn name(&self) -> &'static str;

    /// Shape of the raw diagnostics `compile` produces.
    fn diagnostic_format(&self) -> &'static dyn DiagnosticFormat {
        DiagnosticFormatKind::Paren.format()
    }

    fn compile(&mut self, source: &str, stage: ShaderStage) -> CompileOutcome<Self::Unit>;

    fn link(&mut self, vertex: &Self::Unit, fragment: Self::Unit) -> Result<Self::Program, String>;
}

/// A validated naga module for one stage.
#[derive(Debug)]
pub struct NagaStage {
    pub stage: ShaderStage,
    pub module: Module,
    pub info: ModuleInfo,
}

#[derive(Debug)]
pub struct NagaProgram {
    pub fragment: NagaStage,
    /// Locations the fragment stage reads from the vertex stage.
    pub varyings: Vec<u32>,
}

/// GLSL through naga's frontend and validator. Diagnostics are emitted in the
/// `0(<line>) : error: <message>` shape.
#[derive(Debug, Default)]
pub struct NagaGlslBackend {
    frontend: glsl::Frontend,
}

impl NagaGlslBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CompilerBackend for NagaGlslBackend {
    type Unit = NagaStage;
    type Program = NagaProgram;

    fn name(&self) -> &'static str {
        "naga-glsl"
    }

    fn compile(&mut self, source: &str, stage: ShaderStage) -> CompileOutcome<NagaStage> {
        let options = glsl::Options::from(stage.naga());
        let module = match self.frontend.parse(&options, source) {
            Ok(module) => module,
            Err(parse_error) => {
                let mut raw_diagnostics = String::new();
                for error in &parse_error.errors {
                    push_diagnostic(&mut raw_diagnostics, source, error.meta, &error.kind.to_string());
                }
                return CompileOutcome::Failed { raw_diagnostics };
            }
        };

        let mut validator = Validator::new(ValidationFlags::all(), Capabilities::all());
        match validator.validate(&module) {
            Ok(info) => CompileOutcome::Compiled(NagaStage {
                stage,
                module,
                info,
            }),
            Err(error) => {
                let span = error
                    .spans()
                    .map(|(span, _)| *span)
                    .find(Span::is_defined)
                    .unwrap_or_default();
                let mut raw_diagnostics = String::new();
                push_diagnostic(&mut raw_diagnostics, source, span, &error_chain(error.as_inner()));
                CompileOutcome::Failed { raw_diagnostics }
            }
        }
    }

    fn link(&mut self, vertex: &NagaStage, fragment: NagaStage) -> Result<NagaProgram, String> {
        let outputs = stage_locations(&vertex.module, naga::ShaderStage::Vertex, Interface::Outputs)
            .ok_or_else(|| "vertex stage has no entry point".to_owned())?;
        let varyings =
            stage_locations(&fragment.module, naga::ShaderStage::Fragment, Interface::Inputs)
                .ok_or_else(|| "fragment stage has no entry point".to_owned())?;

        if let Some(missing) = varyings.iter().find(|location| !outputs.contains(location)) {
            return Err(format!(
                "fragment input at location {missing} has no matching vertex output"
            ));
        }

        Ok(NagaProgram {
            fragment,
            varyings,
        })
    }
}

fn push_diagnostic(out: &mut String, source: &str, span: Span, message: &str) {
    if span.is_defined() {
        let location = span.location(source);
        let _ = writeln!(out, "0({}) : error: {}", location.line_number, message);
    } else {
        let _ = writeln!(out, "0 : error: {}", message);
    }
}

fn error_chain(error: &dyn StdError) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let _ = write!(message, ": {cause}");
        source = cause.source();
    }
    message
}

#[derive(Debug, Clone, Copy)]
enum Interface {
    Inputs,
    Outputs,
}

fn stage_locations(module: &Module, stage: naga::ShaderStage, side: Interface) -> Option<Vec<u32>> {
    let entry = module.entry_points.iter().find(|entry| entry.stage == stage)?;
    let mut locations = Vec::new();
    match side {
        Interface::Inputs => {
            for argument in &entry.function.arguments {
                collect_locations(module, argument.ty, argument.binding.as_ref(), &mut locations);
            }
        }
        Interface::Outputs => {
            if let Some(result) = &entry.function.result {
                collect_locations(module, result.ty, result.binding.as_ref(), &mut locations);
            }
        }
    }
    locations.sort_unstable();
    locations.dedup();
    Some(locations)
}

fn collect_locations(
    module: &Module,
    ty: naga::Handle<naga::Type>,
    binding: Option<&Binding>,
    locations: &mut Vec<u32>,
) {
    match binding {
        Some(Binding::Location { location, .. }) => locations.push(*location),
        Some(Binding::BuiltIn(_)) => {}
        None => {
            if let TypeInner::Struct { members, .. } = &module.types[ty].inner {
                for member in members {
                    collect_locations(module, member.ty, member.binding.as_ref(), locations);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader_unit::PASSTHROUGH_VERTEX_SHADER;

    const FRAGMENT: &str = "#version 450
layout(location = 0) in vec2 fragCoord;
layout(location = 0) out vec4 outColor;
void main() {
    outColor = vec4(fragCoord, 0.0, 1.0);
}
";

    fn compiled(backend: &mut NagaGlslBackend, source: &str, stage: ShaderStage) -> NagaStage {
        match backend.compile(source, stage) {
            CompileOutcome::Compiled(unit) => unit,
            CompileOutcome::Failed { raw_diagnostics } => {
                panic!("expected {} to compile:\n{raw_diagnostics}", stage.as_str())
            }
        }
    }

    #[test]
    fn compiles_and_links_a_fragment_against_the_passthrough_vertex() {
        let mut backend = NagaGlslBackend::new();
        let vertex = compiled(&mut backend, PASSTHROUGH_VERTEX_SHADER, ShaderStage::Vertex);
        let fragment = compiled(&mut backend, FRAGMENT, ShaderStage::Fragment);

        let program = backend.link(&vertex, fragment).unwrap();
        assert_eq!(program.fragment.stage, ShaderStage::Fragment);
    }

    #[test]
    fn syntax_errors_carry_the_flattened_line() {
        let mut backend = NagaGlslBackend::new();
        let source = "#version 450
layout(location = 0) out vec4 outColor;
void main() {
    outColor = vec4(1.0, 0.0, 0.0, 1.0) +;
}
";
        match backend.compile(source, ShaderStage::Fragment) {
            CompileOutcome::Failed { raw_diagnostics } => {
                assert!(raw_diagnostics.contains("0(4) : error:"), "{raw_diagnostics}");
                let parsed = backend
                    .diagnostic_format()
                    .parse_line(raw_diagnostics.lines().next().unwrap())
                    .unwrap();
                assert_eq!(parsed.line, 4);
            }
            CompileOutcome::Compiled(_) => panic!("broken shader compiled"),
        }
    }

    #[test]
    fn link_rejects_unmatched_fragment_inputs() {
        let mut backend = NagaGlslBackend::new();
        let vertex = compiled(&mut backend, PASSTHROUGH_VERTEX_SHADER, ShaderStage::Vertex);
        let fragment = compiled(
            &mut backend,
            "#version 450
layout(location = 3) in vec2 stray;
layout(location = 0) out vec4 outColor;
void main() {
    outColor = vec4(stray, 0.0, 1.0);
}
",
            ShaderStage::Fragment,
        );

        let error = backend.link(&vertex, fragment).unwrap_err();
        assert!(error.contains("location 3"), "{error}");
    }
}
