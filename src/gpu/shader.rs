//! Shader program construction: WGSL validation and uniform reflection.
//!
//! Both shader stages are run through naga before any GPU object is created,
//! so a broken asset fails construction with full compiler diagnostics
//! instead of a device error at draw time. Validation also reflects the
//! uniform block layout into a name -> byte-offset table, the equivalent of
//! a linked program's uniform locations: setters address fields by name and
//! a name the shaders do not declare is a silent no-op to set.

use std::collections::HashMap;

use crate::error::BlurError;

/// Uniform block members the pipeline writes. The shader sources must
/// declare every one of them; a missing member is a configuration error in
/// the assets, caught at construction.
pub const REQUIRED_UNIFORMS: [&str; 6] = [
    "matrix",
    "resolution",
    "direction",
    "radius",
    "strength",
    "flip",
];

/// Byte offsets of uniform block members, reflected from the shader sources.
#[derive(Debug)]
pub struct UniformTable {
    offsets: HashMap<String, u32>,
}

impl UniformTable {
    /// Offset of `name` inside the uniform buffer, if the shaders declare it.
    pub fn offset(&self, name: &str) -> Option<u64> {
        self.offsets.get(name).map(|&o| o as u64)
    }

    /// Write `data` into the uniform buffer field `name`. Writing a name the
    /// shaders do not declare does nothing.
    pub fn write(&self, queue: &wgpu::Queue, buffer: &wgpu::Buffer, name: &str, data: &[u8]) {
        if let Some(offset) = self.offset(name) {
            queue.write_buffer(buffer, offset, data);
        }
    }
}

/// Compiled vertex + fragment modules plus the reflected uniform table.
pub struct ShaderProgram {
    pub vertex: wgpu::ShaderModule,
    pub fragment: wgpu::ShaderModule,
    pub uniforms: UniformTable,
}

impl ShaderProgram {
    /// Validate both stages and create the GPU modules. Fails without
    /// creating anything if either stage is invalid or the uniform block is
    /// incomplete.
    pub fn new(
        device: &wgpu::Device,
        vertex_src: &str,
        fragment_src: &str,
    ) -> Result<Self, BlurError> {
        let uniforms = validate_sources(vertex_src, fragment_src)?;

        let vertex = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Blur Vertex Shader"),
            source: wgpu::ShaderSource::Wgsl(vertex_src.into()),
        });
        let fragment = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Blur Fragment Shader"),
            source: wgpu::ShaderSource::Wgsl(fragment_src.into()),
        });

        Ok(Self {
            vertex,
            fragment,
            uniforms,
        })
    }
}

/// Validate both WGSL sources and reflect the uniform table. Pure with
/// respect to the GPU: usable in tests without a device.
pub fn validate_sources(vertex_src: &str, fragment_src: &str) -> Result<UniformTable, BlurError> {
    let vertex = validate_stage("vertex", vertex_src)?;
    let fragment = validate_stage("fragment", fragment_src)?;

    let mut offsets = HashMap::new();
    collect_uniform_members(&vertex, &mut offsets);
    collect_uniform_members(&fragment, &mut offsets);

    let mut missing: Vec<String> = REQUIRED_UNIFORMS
        .iter()
        .filter(|name| !offsets.contains_key(**name))
        .map(|name| name.to_string())
        .collect();

    // The sampled image and its sampler are bindings rather than block
    // members, but the program is just as unusable without them.
    if !has_global(&fragment, |inner| {
        matches!(inner, naga::TypeInner::Image { .. })
    }) {
        missing.push("texture".to_string());
    }
    if !has_global(&fragment, |inner| {
        matches!(inner, naga::TypeInner::Sampler { .. })
    }) {
        missing.push("sampler".to_string());
    }

    if !missing.is_empty() {
        return Err(BlurError::MissingUniforms(missing));
    }

    Ok(UniformTable { offsets })
}

fn validate_stage(stage: &'static str, source: &str) -> Result<naga::Module, BlurError> {
    let module = naga::front::wgsl::parse_str(source).map_err(|e| BlurError::ShaderCompile {
        stage,
        log: with_source_listing(&e.emit_to_string(source), source),
    })?;

    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    )
    .validate(&module)
    .map_err(|e| BlurError::ShaderCompile {
        stage,
        log: with_source_listing(&format!("{e:?}"), source),
    })?;

    Ok(module)
}

fn collect_uniform_members(module: &naga::Module, offsets: &mut HashMap<String, u32>) {
    for (_, var) in module.global_variables.iter() {
        if var.space != naga::AddressSpace::Uniform {
            continue;
        }
        if let naga::TypeInner::Struct { ref members, .. } = module.types[var.ty].inner {
            for member in members {
                if let Some(name) = &member.name {
                    offsets.insert(name.clone(), member.offset);
                }
            }
        }
    }
}

fn has_global(module: &naga::Module, pred: impl Fn(&naga::TypeInner) -> bool) -> bool {
    module
        .global_variables
        .iter()
        .any(|(_, var)| pred(&module.types[var.ty].inner))
}

/// Append a line-numbered listing of the failing source, for readable logs.
fn with_source_listing(message: &str, source: &str) -> String {
    let mut out = String::from(message);
    out.push_str("\n---\n");
    for (line_num, line) in source.lines().enumerate() {
        out.push_str(&format!("{:4} | {}\n", line_num + 1, line));
    }
    out.push_str("---\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL_VERTEX: &str = r#"
@vertex
fn vs_main(@location(0) position: vec2<f32>) -> @builtin(position) vec4<f32> {
    return vec4<f32>(position, 0.0, 1.0);
}
"#;

    const FRAGMENT_WITHOUT_UNIFORMS: &str = r#"
@group(0) @binding(1) var t: texture_2d<f32>;
@group(0) @binding(2) var s: sampler;

@fragment
fn fs_main(@builtin(position) p: vec4<f32>) -> @location(0) vec4<f32> {
    return textureSampleLevel(t, s, p.xy, 0.0);
}
"#;

    #[test]
    fn test_syntax_error_reports_stage_and_log() {
        let err = validate_sources("fn broken( -> {", FRAGMENT_WITHOUT_UNIFORMS).unwrap_err();
        match err {
            BlurError::ShaderCompile { stage, log } => {
                assert_eq!(stage, "vertex");
                assert!(!log.is_empty());
                // Diagnostics carry the numbered source listing
                assert!(log.contains("1 |"));
            }
            other => panic!("expected ShaderCompile, got {other:?}"),
        }
    }

    #[test]
    fn test_fragment_errors_attributed_to_fragment() {
        let err = validate_sources(MINIMAL_VERTEX, "@fragment fn fs_main() -> { }").unwrap_err();
        match err {
            BlurError::ShaderCompile { stage, .. } => assert_eq!(stage, "fragment"),
            other => panic!("expected ShaderCompile, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_uniform_block_members_are_reported() {
        let err = validate_sources(MINIMAL_VERTEX, FRAGMENT_WITHOUT_UNIFORMS).unwrap_err();
        match err {
            BlurError::MissingUniforms(missing) => {
                for name in REQUIRED_UNIFORMS {
                    assert!(missing.iter().any(|m| m == name), "{name} should be missing");
                }
            }
            other => panic!("expected MissingUniforms, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_texture_bindings_are_reported() {
        let fragment = r#"
struct Uniforms {
    matrix: mat4x4<f32>,
    resolution: vec2<f32>,
    direction: vec2<f32>,
    radius: f32,
    strength: f32,
    flip: u32,
}

@group(0) @binding(0) var<uniform> u: Uniforms;

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return vec4<f32>(u.radius, u.strength, f32(u.flip), 1.0);
}
"#;
        let err = validate_sources(MINIMAL_VERTEX, fragment).unwrap_err();
        match err {
            BlurError::MissingUniforms(missing) => {
                assert!(missing.iter().any(|m| m == "texture"));
                assert!(missing.iter().any(|m| m == "sampler"));
            }
            other => panic!("expected MissingUniforms, got {other:?}"),
        }
    }
}
