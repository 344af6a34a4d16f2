// ============================================================================
// kernel/gpu.rs — lifegrid
// wgpu backend: cell storage buffers, the storage-texture render target and
// one compute pipeline per entry point of cells.wgsl.
// ============================================================================

use wgpu::util::DeviceExt;

use super::{ComputeBackend, DeviceLimits, EntryPoint, KernelParams};
use crate::error::{Result, SandboxError};

pub const RENDER_TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

pub struct GpuBuffer {
    buffer: wgpu::Buffer,
    len: usize,
}

/// Render target written by both entry points and sampled by the
/// presentation pass. `generation` changes whenever the texture is replaced.
pub struct GpuImage {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    size: [u32; 2],
    generation: u64,
}

impl GpuImage {
    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

pub struct GpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    layout: wgpu::BindGroupLayout,
    pipelines: [wgpu::ComputePipeline; 2],
    params_buffers: [wgpu::Buffer; 2],
    next_generation: u64,
}

// ======================== Device Setup ========================

/// Pick an adapter (compatible with `surface` if given) and open a device.
pub async fn request_device(
    instance: &wgpu::Instance,
    surface: Option<&wgpu::Surface<'_>>,
) -> Result<(wgpu::Adapter, wgpu::Device, wgpu::Queue)> {
    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: surface,
            force_fallback_adapter: false,
        })
        .await
        .ok_or(SandboxError::NoAdapter)?;

    log::info!("GPU: {}", adapter.get_info().name);

    // Large grids need more than the default texture and storage limits.
    let supported = adapter.limits();
    let (device, queue) = adapter
        .request_device(
            &wgpu::DeviceDescriptor {
                label: Some("lifegrid_device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits {
                    max_texture_dimension_2d: supported.max_texture_dimension_2d,
                    max_storage_buffer_binding_size: supported.max_storage_buffer_binding_size,
                    max_buffer_size: supported.max_buffer_size,
                    ..Default::default()
                },
                memory_hints: Default::default(),
            },
            None,
        )
        .await?;

    Ok((adapter, device, queue))
}

impl GpuBackend {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("cells"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/cells.wgsl").into()),
        });

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("cells_bgl"),
            entries: &[
                bgl_storage_texture(0),
                bgl_storage_ro(1),
                bgl_storage_rw(2),
                bgl_storage_rw(3),
                bgl_uniform(4),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("cells_pipeline_layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let pipelines = EntryPoint::ALL.map(|entry| {
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(&format!("{}_pipeline", entry.name())),
                layout: Some(&pipeline_layout),
                module: &shader,
                entry_point: Some(entry.shader_entry()),
                compilation_options: Default::default(),
                cache: None,
            })
        });

        let params_buffers = EntryPoint::ALL.map(|entry| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{}_params", entry.name())),
                contents: bytemuck::bytes_of(&KernelParams::default()),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            })
        });

        Self {
            device,
            queue,
            layout,
            pipelines,
            params_buffers,
            next_generation: 0,
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }
}

impl ComputeBackend for GpuBackend {
    type Buffer = GpuBuffer;
    type Image = GpuImage;
    type Binding = wgpu::BindGroup;

    fn limits(&self) -> DeviceLimits {
        let limits = self.device.limits();
        DeviceLimits {
            max_texture_dimension: limits.max_texture_dimension_2d,
            max_buffer_bytes: (limits.max_storage_buffer_binding_size as u64)
                .min(limits.max_buffer_size),
        }
    }

    fn create_cell_buffer(&mut self, label: &str, cells: &[u32]) -> GpuBuffer {
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::cast_slice(cells),
                usage: wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::COPY_SRC
                    | wgpu::BufferUsages::COPY_DST,
            });
        GpuBuffer {
            buffer,
            len: cells.len(),
        }
    }

    fn write_cells(&mut self, buffer: &GpuBuffer, cells: &[u32]) {
        let n = buffer.len.min(cells.len());
        self.queue
            .write_buffer(&buffer.buffer, 0, bytemuck::cast_slice(&cells[..n]));
    }

    fn read_cells(&mut self, buffer: &GpuBuffer) -> Result<Vec<u32>> {
        let size = (buffer.len * std::mem::size_of::<u32>()) as u64;
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("cells_readback"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("readback_encoder"),
            });
        encoder.copy_buffer_to_buffer(&buffer.buffer, 0, &staging, 0, size);
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);

        match rx.recv() {
            Ok(Ok(())) => {
                let cells = bytemuck::cast_slice::<u8, u32>(&slice.get_mapped_range()).to_vec();
                staging.unmap();
                Ok(cells)
            }
            _ => Err(SandboxError::Readback),
        }
    }

    fn cell_buffer_len(&self, buffer: &GpuBuffer) -> usize {
        buffer.len
    }

    fn release_buffer(&mut self, buffer: GpuBuffer) {
        buffer.buffer.destroy();
    }

    fn create_render_target(&mut self, scale: [u32; 2]) -> GpuImage {
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("render_target"),
            size: wgpu::Extent3d {
                width: scale[0],
                height: scale[1],
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: RENDER_TARGET_FORMAT,
            usage: wgpu::TextureUsages::STORAGE_BINDING
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        self.next_generation += 1;
        GpuImage {
            texture,
            view,
            size: scale,
            generation: self.next_generation,
        }
    }

    fn render_target_size(&self, image: &GpuImage) -> [u32; 2] {
        image.size
    }

    fn release_render_target(&mut self, image: GpuImage) {
        image.texture.destroy();
    }

    fn write_params(&mut self, entry: EntryPoint, params: &KernelParams) {
        self.queue.write_buffer(
            &self.params_buffers[entry.index()],
            0,
            bytemuck::bytes_of(params),
        );
    }

    fn bind(
        &mut self,
        entry: EntryPoint,
        target: &GpuImage,
        cells: [&GpuBuffer; 3],
    ) -> wgpu::BindGroup {
        let [cells_in, cells_out, cells_swap] = cells;
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{}_bg", entry.name())),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&target.view),
                },
                bg_buffer(1, &cells_in.buffer),
                bg_buffer(2, &cells_out.buffer),
                bg_buffer(3, &cells_swap.buffer),
                bg_buffer(4, &self.params_buffers[entry.index()]),
            ],
        })
    }

    fn dispatch(&mut self, entry: EntryPoint, binding: &wgpu::BindGroup, workgroups: [u32; 3]) {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(&format!("{}_encoder", entry.name())),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(&format!("{}_pass", entry.name())),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipelines[entry.index()]);
            pass.set_bind_group(0, binding, &[]);
            pass.dispatch_workgroups(workgroups[0], workgroups[1], workgroups[2]);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
    }
}

// ======================== Layout Helpers ========================

fn bgl_storage_texture(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::StorageTexture {
            access: wgpu::StorageTextureAccess::WriteOnly,
            format: RENDER_TARGET_FORMAT,
            view_dimension: wgpu::TextureViewDimension::D2,
        },
        count: None,
    }
}

fn bgl_uniform(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn bgl_storage_ro(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: true },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn bgl_storage_rw(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: false },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn bg_buffer(binding: u32, buffer: &wgpu::Buffer) -> wgpu::BindGroupEntry<'_> {
    wgpu::BindGroupEntry {
        binding,
        resource: buffer.as_entire_binding(),
    }
}
