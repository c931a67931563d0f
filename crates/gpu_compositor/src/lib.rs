//! `wgpu` implementation of the compositor.
//!
//! Images live in RGBA8 textures decoded from their native encoding on the
//! CPU; indexed images keep their raw bytes so a palette change can re-decode
//! them. Every element operation re-renders all elements as textured quads
//! into a physical-size scanout texture and waits for the queue to finish.

use display_protocol::pixel::decode_pixel;
use display_protocol::{
    Compositor, CompositorError, DisplayCapture, ElementDesc, ElementHandle, ImageHandle,
    PaletteTable, PhysicalMode, PixelFormat, validate_upload,
};
use slotmap::SlotMap;

mod readback;
mod uniform;

use uniform::ElementUniform;

const SCANOUT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

struct GpuImage {
    format: PixelFormat,
    width: u32,
    height: u32,
    native: Vec<u8>,
    palette: PaletteTable,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl GpuImage {
    fn decode_rgba(&self) -> Vec<u8> {
        let bytes_per_pixel = self.format.bytes_per_pixel();
        let mut rgba = Vec::with_capacity(self.width as usize * self.height as usize * 4);
        for texel in self.native.chunks_exact(bytes_per_pixel) {
            let color = decode_pixel(self.format, texel, &self.palette);
            rgba.extend_from_slice(&[color.r, color.g, color.b, u8::MAX]);
        }
        rgba
    }
}

struct GpuElement {
    desc: ElementDesc,
    sequence: u64,
    uniform: wgpu::Buffer,
}

pub struct GpuCompositor {
    device: wgpu::Device,
    queue: wgpu::Queue,
    physical: PhysicalMode,
    scanout: wgpu::Texture,
    scanout_view: wgpu::TextureView,
    element_layout: wgpu::BindGroupLayout,
    element_pipeline: wgpu::RenderPipeline,
    sampler: wgpu::Sampler,
    images: SlotMap<ImageHandle, GpuImage>,
    elements: SlotMap<ElementHandle, GpuElement>,
    next_sequence: u64,
}

impl GpuCompositor {
    /// Opens a headless device, preferring the software fallback adapter.
    pub fn request_headless(physical: PhysicalMode) -> Result<Self, CompositorError> {
        let (device, queue) = pollster::block_on(request_device_queue())?;
        Self::new(device, queue, physical)
    }

    pub fn new(
        device: wgpu::Device,
        queue: wgpu::Queue,
        physical: PhysicalMode,
    ) -> Result<Self, CompositorError> {
        let max_dimension = device.limits().max_texture_dimension_2d;
        if physical.width == 0 || physical.height == 0 {
            return Err(CompositorError::ZeroSizedImage);
        }
        if physical.width > max_dimension || physical.height > max_dimension {
            return Err(CompositorError::Backend(format!(
                "physical mode {}x{} exceeds texture limit {max_dimension}",
                physical.width, physical.height
            )));
        }

        let scanout = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("gpu_compositor.scanout"),
            size: wgpu::Extent3d {
                width: physical.width,
                height: physical.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: SCANOUT_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let scanout_view = scanout.create_view(&wgpu::TextureViewDescriptor::default());

        let element_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("gpu_compositor.element_layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("gpu_compositor.sampler.nearest"),
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            ..Default::default()
        });
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("gpu_compositor.element_quad"),
            source: wgpu::ShaderSource::Wgsl(include_str!("element_quad.wgsl").into()),
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("gpu_compositor.pipeline_layout"),
            bind_group_layouts: &[&element_layout],
            immediate_size: 0,
        });
        let element_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("gpu_compositor.element_pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[],
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: SCANOUT_FORMAT,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleStrip,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });

        eprintln!(
            "[gpu_compositor] scanout {}x{} ready",
            physical.width, physical.height
        );
        let mut compositor = Self {
            device,
            queue,
            physical,
            scanout,
            scanout_view,
            element_layout,
            element_pipeline,
            sampler,
            images: SlotMap::with_key(),
            elements: SlotMap::with_key(),
            next_sequence: 0,
        };
        compositor.display_update()?;
        Ok(compositor)
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    fn upload_image(&self, image: &GpuImage) {
        let rgba = image.decode_rgba();
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &image.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &rgba,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(image.width * 4),
                rows_per_image: Some(image.height),
            },
            wgpu::Extent3d {
                width: image.width,
                height: image.height,
                depth_or_array_layers: 1,
            },
        );
    }

    /// Renders every element, lowest layer first, and waits for completion.
    fn display_update(&mut self) -> Result<(), CompositorError> {
        let mut order: Vec<(i32, u64, ElementHandle)> = self
            .elements
            .iter()
            .map(|(handle, element)| (element.desc.layer, element.sequence, handle))
            .collect();
        order.sort_unstable();

        let mut bind_groups = Vec::with_capacity(order.len());
        for (_, _, handle) in order {
            let element = &self.elements[handle];
            let Some(image) = self.images.get(element.desc.image) else {
                continue;
            };
            let uniform = ElementUniform::new(&element.desc, image.width, image.height, self.physical);
            self.queue
                .write_buffer(&element.uniform, 0, bytemuck::bytes_of(&uniform));
            bind_groups.push(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("gpu_compositor.element_bind_group"),
                layout: &self.element_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: element.uniform.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(&image.view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::Sampler(&self.sampler),
                    },
                ],
            }));
        }

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("gpu_compositor.display_update"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("gpu_compositor.scanout_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.scanout_view,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
            pass.set_pipeline(&self.element_pipeline);
            for bind_group in &bind_groups {
                pass.set_bind_group(0, bind_group, &[]);
                pass.draw(0..4, 0..1);
            }
        }
        self.queue.submit(Some(encoder.finish()));
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|error| backend_error("device poll", error))?;
        Ok(())
    }
}

async fn request_device_queue() -> Result<(wgpu::Device, wgpu::Queue), CompositorError> {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    });
    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::LowPower,
            compatible_surface: None,
            force_fallback_adapter: true,
        })
        .await
        .map_err(|error| backend_error("request adapter", error))?;
    let limits = adapter.limits();
    adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: Some("gpu_compositor.device"),
            required_features: wgpu::Features::empty(),
            required_limits: limits,
            experimental_features: wgpu::ExperimentalFeatures::disabled(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::Off,
        })
        .await
        .map_err(|error| backend_error("request device", error))
}

fn backend_error(context: &str, error: impl std::fmt::Display) -> CompositorError {
    CompositorError::Backend(format!("{context}: {error}"))
}

impl Compositor for GpuCompositor {
    fn display_mode(&self) -> PhysicalMode {
        self.physical
    }

    fn create_image(
        &mut self,
        format: PixelFormat,
        width: u32,
        height: u32,
    ) -> Result<ImageHandle, CompositorError> {
        if width == 0 || height == 0 {
            return Err(CompositorError::ZeroSizedImage);
        }
        let max_dimension = self.device.limits().max_texture_dimension_2d;
        if width > max_dimension || height > max_dimension {
            return Err(CompositorError::Backend(format!(
                "image {width}x{height} exceeds texture limit {max_dimension}"
            )));
        }
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("gpu_compositor.image"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let image = GpuImage {
            format,
            width,
            height,
            native: vec![0; format.row_bytes(width) * height as usize],
            palette: PaletteTable::default(),
            texture,
            view,
        };
        self.upload_image(&image);
        Ok(self.images.insert(image))
    }

    fn write_image(
        &mut self,
        image: ImageHandle,
        pitch: usize,
        pixels: &[u8],
    ) -> Result<(), CompositorError> {
        let target = self
            .images
            .get_mut(image)
            .ok_or(CompositorError::UnknownImage)?;
        validate_upload(target.format, target.width, target.height, pitch, pixels)?;
        let row_bytes = target.format.row_bytes(target.width);
        for (row, destination) in target.native.chunks_exact_mut(row_bytes).enumerate() {
            let start = row * pitch;
            destination.copy_from_slice(&pixels[start..start + row_bytes]);
        }
        let target = &self.images[image];
        self.upload_image(target);
        Ok(())
    }

    fn set_image_palette(
        &mut self,
        image: ImageHandle,
        palette: &PaletteTable,
    ) -> Result<(), CompositorError> {
        let target = self
            .images
            .get_mut(image)
            .ok_or(CompositorError::UnknownImage)?;
        if !target.format.is_indexed() {
            return Err(CompositorError::PaletteOnDirectColorImage);
        }
        target.palette = palette.clone();
        let target = &self.images[image];
        self.upload_image(target);
        Ok(())
    }

    fn delete_image(&mut self, image: ImageHandle) -> Result<(), CompositorError> {
        let removed = self
            .images
            .remove(image)
            .ok_or(CompositorError::UnknownImage)?;
        removed.texture.destroy();
        Ok(())
    }

    fn add_element(&mut self, element: ElementDesc) -> Result<ElementHandle, CompositorError> {
        if !self.images.contains_key(element.image) {
            return Err(CompositorError::UnknownImage);
        }
        let uniform = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("gpu_compositor.element_uniform"),
            size: std::mem::size_of::<ElementUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        let handle = self.elements.insert(GpuElement {
            desc: element,
            sequence,
            uniform,
        });
        let update = self.display_update();
        keep_if_committed(&mut self.elements, handle, update)
    }

    fn change_element_source(
        &mut self,
        element: ElementHandle,
        image: ImageHandle,
    ) -> Result<(), CompositorError> {
        if !self.images.contains_key(image) {
            return Err(CompositorError::UnknownImage);
        }
        let target = self
            .elements
            .get_mut(element)
            .ok_or(CompositorError::UnknownElement)?;
        target.desc.image = image;
        self.display_update()
    }

    fn remove_element(&mut self, element: ElementHandle) -> Result<(), CompositorError> {
        let removed = self
            .elements
            .remove(element)
            .ok_or(CompositorError::UnknownElement)?;
        removed.uniform.destroy();
        self.display_update()
    }

    fn capture_display(&mut self) -> Result<DisplayCapture, CompositorError> {
        let rgba = readback::read_texture_rgba8(
            &self.device,
            &self.queue,
            &self.scanout,
            self.physical.width,
            self.physical.height,
        )?;
        Ok(DisplayCapture {
            width: self.physical.width,
            height: self.physical.height,
            rgba,
        })
    }
}

/// Drops a freshly inserted element again when the update that should have
/// shown it failed, so a failed add leaves nothing behind.
fn keep_if_committed<V>(
    elements: &mut SlotMap<ElementHandle, V>,
    handle: ElementHandle,
    update: Result<(), CompositorError>,
) -> Result<ElementHandle, CompositorError> {
    match update {
        Ok(()) => Ok(handle),
        Err(error) => {
            elements.remove(handle);
            Err(error)
        }
    }
}
