use std::sync::Arc;

use anyhow::{anyhow, Context};
use wgpu::util::DeviceExt;
use winit::window::Window;

use crate::camera::CameraUniforms;
use crate::gpu::pipeline::{self, ShaderStatus, QUAD_VERTICES};
use crate::lighting::LightingUniforms;
use crate::scene_state::ObjectUniforms;
use crate::uploader::RenderBackend;

/// Pixel format of offscreen frames (PNG-ready RGBA8).
const OFFSCREEN_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

/// Row pitch alignment required for texture-to-buffer copies.
const COPY_ROW_ALIGNMENT: u32 = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

/// A window surface.
struct SurfaceTarget {
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
}

/// An offscreen texture plus the buffer its frames are copied into.
struct OffscreenTarget {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    readback: wgpu::Buffer,
    padded_bytes_per_row: u32,
}

impl OffscreenTarget {
    fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Offscreen Target"),
            size: wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: OFFSCREEN_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let unpadded_bytes_per_row = 4 * width;
        let padding = (COPY_ROW_ALIGNMENT - unpadded_bytes_per_row % COPY_ROW_ALIGNMENT) % COPY_ROW_ALIGNMENT;
        let padded_bytes_per_row = unpadded_bytes_per_row + padding;

        let readback = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Buffer"),
            size: (padded_bytes_per_row * height) as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        Self {
            texture,
            view,
            readback,
            padded_bytes_per_row,
        }
    }
}

enum RenderTarget {
    Surface(SurfaceTarget),
    Offscreen(OffscreenTarget),
}

/// wgpu backend drawing the ray traced scene on a full-screen quad.
pub struct Renderer {
    device: wgpu::Device,
    queue: wgpu::Queue,
    target: RenderTarget,
    size: (u32, u32),

    pipeline: wgpu::RenderPipeline,
    bind_group: wgpu::BindGroup,
    camera_buffer: wgpu::Buffer,
    objects_buffer: wgpu::Buffer,
    lights_buffer: wgpu::Buffer,
    quad_vertex_buffer: wgpu::Buffer,
    shader_status: ShaderStatus,
}

async fn request_adapter(
    instance: &wgpu::Instance,
    compatible_surface: Option<&wgpu::Surface<'_>>,
) -> anyhow::Result<wgpu::Adapter> {
    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface,
            force_fallback_adapter: false,
        })
        .await
        .ok_or_else(|| anyhow!("No adapter found"))?;

    let info = adapter.get_info();
    log::info!("Using adapter: {} ({:?})", info.name, info.backend);
    Ok(adapter)
}

fn uniform_buffer(device: &wgpu::Device, label: &str, size: usize) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size: size as wgpu::BufferAddress,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

fn uniform_layout_entry(binding: u32, size: usize) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: wgpu::BufferSize::new(size as u64),
        },
        count: None,
    }
}

impl Renderer {
    /// Renderer presenting to `window`.
    pub async fn for_window(window: Arc<Window>, shader_source: &str) -> anyhow::Result<Self> {
        let size = window.inner_size();
        let (width, height) = (size.width.max(1), size.height.max(1));

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
        let surface = instance.create_surface(window).context("Failed to create surface")?;
        let adapter = request_adapter(&instance, Some(&surface)).await?;
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor::default(), None)
            .await
            .context("Failed to create device")?;

        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| caps.formats.first().copied())
            .ok_or_else(|| anyhow!("Surface is not supported by the adapter"))?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width,
            height,
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let target = RenderTarget::Surface(SurfaceTarget { surface, config });
        Self::new(device, queue, format, target, (width, height), shader_source)
    }

    /// Headless renderer drawing into a `width` x `height` texture.
    pub async fn offscreen(width: u32, height: u32, shader_source: &str) -> anyhow::Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
        let adapter = request_adapter(&instance, None).await?;
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor::default(), None)
            .await
            .context("Failed to create device")?;

        let target = RenderTarget::Offscreen(OffscreenTarget::new(&device, width, height));
        Self::new(device, queue, OFFSCREEN_FORMAT, target, (width, height), shader_source)
    }

    fn new(
        device: wgpu::Device,
        queue: wgpu::Queue,
        format: wgpu::TextureFormat,
        target: RenderTarget,
        size: (u32, u32),
        shader_source: &str,
    ) -> anyhow::Result<Self> {
        let camera_size = std::mem::size_of::<CameraUniforms>();
        let objects_size = std::mem::size_of::<ObjectUniforms>();
        let lights_size = std::mem::size_of::<LightingUniforms>();

        let camera_buffer = uniform_buffer(&device, "Camera Uniform Buffer", camera_size);
        let objects_buffer = uniform_buffer(&device, "Objects Uniform Buffer", objects_size);
        let lights_buffer = uniform_buffer(&device, "Lights Uniform Buffer", lights_size);

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[
                uniform_layout_entry(0, camera_size),
                uniform_layout_entry(1, objects_size),
                uniform_layout_entry(2, lights_size),
            ],
            label: Some("scene_bind_group_layout"),
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: camera_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: objects_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: lights_buffer.as_entire_binding(),
                },
            ],
            label: Some("scene_bind_group"),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Ray Trace Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let (pipeline, shader_status) =
            pipeline::create_raytrace_pipeline(&device, &pipeline_layout, format, shader_source);
        if !shader_status.linked {
            log::error!("Shader failed to link");
        }
        shader_status.clone().into_result()?;
        let pipeline = pipeline.ok_or_else(|| anyhow!("Shader failed to link"))?;
        log::info!("Shader linked ({:?})", format);

        let quad_vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Quad Vertex Buffer"),
            contents: bytemuck::cast_slice(QUAD_VERTICES),
            usage: wgpu::BufferUsages::VERTEX,
        });

        Ok(Self {
            device,
            queue,
            target,
            size,
            pipeline,
            bind_group,
            camera_buffer,
            objects_buffer,
            lights_buffer,
            quad_vertex_buffer,
            shader_status,
        })
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    pub fn shader_status(&self) -> &ShaderStatus {
        &self.shader_status
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 || (width, height) == self.size {
            return;
        }
        self.size = (width, height);
        match &mut self.target {
            RenderTarget::Surface(target) => {
                target.config.width = width;
                target.config.height = height;
                target.surface.configure(&self.device, &target.config);
            }
            RenderTarget::Offscreen(target) => {
                *target = OffscreenTarget::new(&self.device, width, height);
            }
        }
    }

    fn render_to(&self, view: &wgpu::TextureView) {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("Frame Encoder") });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Ray Trace Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            render_pass.set_pipeline(&self.pipeline);
            render_pass.set_bind_group(0, &self.bind_group, &[]);
            render_pass.set_vertex_buffer(0, self.quad_vertex_buffer.slice(..));
            render_pass.draw(0..QUAD_VERTICES.len() as u32, 0..1);
        }

        self.queue.submit(Some(encoder.finish()));
    }

    /// Copy the last offscreen frame back as tightly packed RGBA8 rows.
    pub fn read_frame(&self) -> anyhow::Result<Vec<u8>> {
        let RenderTarget::Offscreen(target) = &self.target else {
            return Err(anyhow!("Frames can only be read back from an offscreen renderer"));
        };
        let (width, height) = self.size;

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &target.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &target.readback,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(target.padded_bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
        );
        self.queue.submit(Some(encoder.finish()));

        let buffer_slice = target.readback.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .context("Readback was dropped")?
            .context("Failed to map readback buffer")?;

        let data = buffer_slice.get_mapped_range();
        let row_bytes = (width * 4) as usize;
        let mut pixels = Vec::with_capacity(row_bytes * height as usize);
        for row in data.chunks(target.padded_bytes_per_row as usize).take(height as usize) {
            pixels.extend_from_slice(&row[..row_bytes]);
        }

        drop(data);
        target.readback.unmap();
        Ok(pixels)
    }
}

impl RenderBackend for Renderer {
    fn upload_camera(&mut self, uniforms: &CameraUniforms) {
        self.queue.write_buffer(&self.camera_buffer, 0, bytemuck::bytes_of(uniforms));
    }

    fn upload_objects(&mut self, uniforms: &ObjectUniforms) {
        self.queue.write_buffer(&self.objects_buffer, 0, bytemuck::bytes_of(uniforms));
    }

    fn upload_lights(&mut self, uniforms: &LightingUniforms) {
        self.queue.write_buffer(&self.lights_buffer, 0, bytemuck::bytes_of(uniforms));
    }

    fn draw(&mut self) -> anyhow::Result<()> {
        match &self.target {
            RenderTarget::Offscreen(target) => self.render_to(&target.view),
            RenderTarget::Surface(target) => match target.surface.get_current_texture() {
                Ok(output) => {
                    let view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());
                    self.render_to(&view);
                    output.present();
                }
                Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                    target.surface.configure(&self.device, &target.config);
                }
                Err(wgpu::SurfaceError::OutOfMemory) => {
                    log::error!("Surface out of memory");
                    return Err(anyhow!("Surface out of memory"));
                }
                Err(e) => {
                    log::warn!("Surface error: {:?}", e);
                }
            },
        }
        Ok(())
    }
}
