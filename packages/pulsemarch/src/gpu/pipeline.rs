use std::borrow::Cow;
use std::path::Path;

use anyhow::Context;

/// Bundled ray tracing shader.
pub const RAYTRACE_SHADER: &str = include_str!("shader_raytrace.wgsl");

/// Longest diagnostic log kept from a failed shader build.
pub const SHADER_LOG_MAX_LEN: usize = 1023;

/// Outcome of compiling and linking the ray tracing shader.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShaderStatus {
    pub linked: bool,
    /// Validation messages, at most [`SHADER_LOG_MAX_LEN`] characters.
    pub log: String,
}

impl ShaderStatus {
    pub fn ok() -> Self {
        Self {
            linked: true,
            log: String::new(),
        }
    }

    pub fn failed(log: &str) -> Self {
        Self {
            linked: false,
            log: truncate_log(log),
        }
    }

    /// Turn a failed status into an error carrying the log unmodified.
    pub fn into_result(self) -> anyhow::Result<()> {
        if self.linked {
            Ok(())
        } else {
            Err(anyhow::anyhow!("Shader failed to link:\n{}", self.log))
        }
    }
}

fn truncate_log(log: &str) -> String {
    match log.char_indices().nth(SHADER_LOG_MAX_LEN) {
        Some((end, _)) => log[..end].to_string(),
        None => log.to_string(),
    }
}

/// Shader source from `path`, or the bundled one.
pub fn load_shader_source(path: Option<&Path>) -> anyhow::Result<Cow<'static, str>> {
    match path {
        Some(path) => {
            let source = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read shader {}", path.display()))?;
            log::info!("Loaded shader from {}", path.display());
            Ok(Cow::Owned(source))
        }
        None => Ok(Cow::Borrowed(RAYTRACE_SHADER)),
    }
}

/// Vertex of the full-screen quad, in NDC.
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct QuadVertex {
    pub position: [f32; 2],
}

impl QuadVertex {
    const ATTRIBS: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x2];

    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBS,
        }
    }
}

/// Fullscreen quad vertices (two triangles covering NDC).
pub const QUAD_VERTICES: &[QuadVertex] = &[
    QuadVertex { position: [-1.0, -1.0] },
    QuadVertex { position: [ 1.0, -1.0] },
    QuadVertex { position: [ 1.0,  1.0] },
    QuadVertex { position: [-1.0, -1.0] },
    QuadVertex { position: [ 1.0,  1.0] },
    QuadVertex { position: [-1.0,  1.0] },
];

/// Compile `source` and build the ray tracing pipeline.
///
/// Runs inside a validation error scope, so a broken shader is reported in
/// the returned status instead of aborting the device.
pub fn create_raytrace_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    color_format: wgpu::TextureFormat,
    source: &str,
) -> (Option<wgpu::RenderPipeline>, ShaderStatus) {
    device.push_error_scope(wgpu::ErrorFilter::Validation);

    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("Ray Trace Shader"),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });

    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("Ray Trace Pipeline"),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            buffers: &[QuadVertex::desc()],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: color_format,
                blend: Some(wgpu::BlendState::REPLACE),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            ..Default::default()
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    });

    match pollster::block_on(device.pop_error_scope()) {
        None => (Some(pipeline), ShaderStatus::ok()),
        Some(error) => (None, ShaderStatus::failed(&error.to_string())),
    }
}
