//! WGSL validation with naga.
//!
//! Compiling a stage means: parse, validate, and find the stage's entry point.
//! The resulting [`StageInterface`] lists the `@location` slots the entry
//! point consumes and produces, which is all linking needs to check.

use naga::valid::{Capabilities, ValidationFlags, Validator};

use crate::gpu::backend::ShaderStage;

/// Inter-stage interface of one compiled entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageInterface {
    pub stage: ShaderStage,
    /// `@location` slots read by the entry point.
    pub inputs: Vec<u32>,
    /// `@location` slots written by the entry point.
    pub outputs: Vec<u32>,
}

fn naga_stage(stage: ShaderStage) -> naga::ShaderStage {
    match stage {
        ShaderStage::Vertex => naga::ShaderStage::Vertex,
        ShaderStage::Fragment => naga::ShaderStage::Fragment,
    }
}

/// Parses and validates `source` as the given stage. Errors are naga's
/// rendered diagnostics, suitable for a compile log.
pub fn compile_stage(stage: ShaderStage, source: &str) -> Result<StageInterface, String> {
    let module = naga::front::wgsl::parse_str(source).map_err(|e| e.emit_to_string(source))?;

    Validator::new(ValidationFlags::all(), Capabilities::all())
        .validate(&module)
        .map_err(|e| e.emit_to_string(source))?;

    let entry_name = stage.entry_point();
    let entry = module
        .entry_points
        .iter()
        .find(|ep| ep.name == entry_name && ep.stage == naga_stage(stage))
        .ok_or_else(|| format!("no @{} entry point named '{}'", stage, entry_name))?;

    let mut inputs = Vec::new();
    for arg in &entry.function.arguments {
        collect_locations(&module, arg.ty, arg.binding.as_ref(), &mut inputs);
    }
    let mut outputs = Vec::new();
    if let Some(result) = &entry.function.result {
        collect_locations(&module, result.ty, result.binding.as_ref(), &mut outputs);
    }
    inputs.sort_unstable();
    outputs.sort_unstable();

    Ok(StageInterface { stage, inputs, outputs })
}

fn collect_locations(
    module: &naga::Module,
    ty: naga::Handle<naga::Type>,
    binding: Option<&naga::Binding>,
    out: &mut Vec<u32>,
) {
    match binding {
        Some(naga::Binding::Location { location, .. }) => out.push(*location),
        Some(naga::Binding::BuiltIn(_)) => {}
        None => {
            if let naga::TypeInner::Struct { members, .. } = &module.types[ty].inner {
                for member in members {
                    if let Some(naga::Binding::Location { location, .. }) = &member.binding {
                        out.push(*location);
                    }
                }
            }
        }
    }
}

/// Checks that the vertex stage feeds every location the fragment stage reads.
pub fn link_stages(vertex: &StageInterface, fragment: &StageInterface) -> Result<(), String> {
    if vertex.stage != ShaderStage::Vertex {
        return Err(format!("expected a vertex shader, got a {} shader", vertex.stage));
    }
    if fragment.stage != ShaderStage::Fragment {
        return Err(format!("expected a fragment shader, got a {} shader", fragment.stage));
    }
    let missing: Vec<String> = fragment
        .inputs
        .iter()
        .filter(|loc| !vertex.outputs.contains(loc))
        .map(|loc| loc.to_string())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(format!(
            "fragment input location(s) {} not written by the vertex stage",
            missing.join(", ")
        ))
    }
}
