//! wgpu implementation of [`DabDevice`]
//!
//! Accumulation surfaces are storage buffers of `vec4<f32>` so the kernel
//! can read one and write the other without format conversions. Readbacks
//! copy the requested rows into a staging buffer that is mapped
//! asynchronously and polled.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::task::Poll;

use bytemuck::{Pod, Zeroable};
use tracing::{debug, info};

use super::{AllocationTicket, DabDevice, DeviceError, ReadbackTicket, SubmissionIndex, SurfaceId};
use crate::blend::Rgba;
use crate::constants::{
    ALPHA_EPSILON, DAB_BATCH_CAPACITY, MIN_COVERAGE_RADIUS, PIXEL_BYTES, STAMP_WORKGROUP_SIZE,
};
use crate::rect::DirtyRect;
use crate::types::DabParams;

const STAMP_SHADER_TEMPLATE: &str = include_str!("stamp.wgsl");

/// Kernel source with the batch capacity and tip constants substituted
pub fn stamp_shader_source() -> String {
    STAMP_SHADER_TEMPLATE
        .replace("{{DAB_BATCH_CAPACITY}}", &DAB_BATCH_CAPACITY.to_string())
        .replace("{{WORKGROUP_SIZE}}", &STAMP_WORKGROUP_SIZE.to_string())
        .replace("{{MIN_COVERAGE_RADIUS}}", &format!("{:?}", MIN_COVERAGE_RADIUS))
        .replace("{{ALPHA_EPSILON}}", &format!("{:?}", ALPHA_EPSILON))
}

/// Uniform block for one dispatch (matches `struct Params` in the shader)
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct StampParams {
    origin_x: u32,
    origin_y: u32,
    region_width: u32,
    region_height: u32,
    surface_width: u32,
    dab_count: u32,
    _pad: [u32; 2],
}

struct GpuSurface {
    buffer: wgpu::Buffer,
    width: u32,
    height: u32,
}

type MapResult = Arc<Mutex<Option<Result<(), wgpu::BufferAsyncError>>>>;

enum PendingReadback {
    /// Nothing to copy
    Empty,
    Mapping {
        staging: wgpu::Buffer,
        mapped: MapResult,
    },
}

/// Compute-shader device
pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    params_buffer: wgpu::Buffer,
    dab_buffer: wgpu::Buffer,
    surfaces: HashMap<SurfaceId, GpuSurface>,
    allocations: HashMap<AllocationTicket, Result<[SurfaceId; 2], DeviceError>>,
    readbacks: HashMap<ReadbackTicket, PendingReadback>,
    next_id: u64,
    next_submission: u64,
    completed_through: Arc<AtomicU64>,
}

impl WgpuDevice {
    /// Open the default adapter and build the stamp pipeline
    pub fn new() -> Result<Self, DeviceError> {
        let instance = wgpu::Instance::default();
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            compatible_surface: None,
        }))
        .map_err(|e| DeviceError::AllocationFailed(format!("no adapter: {}", e)))?;

        info!("WgpuDevice: using adapter {:?}", adapter.get_info().name);

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("brushwork_device"),
            required_features: wgpu::Features::empty(),
            ..Default::default()
        }))
        .map_err(|e| DeviceError::AllocationFailed(format!("no device: {}", e)))?;

        Ok(Self::from_device(device, queue))
    }

    /// Build on an existing device (shared with a renderer)
    pub fn from_device(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("stamp_shader"),
            source: wgpu::ShaderSource::Wgsl(stamp_shader_source().into()),
        });

        let storage = |binding: u32, read_only: bool| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("stamp_bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                storage(1, true),
                storage(2, true),
                storage(3, false),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("stamp_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("stamp_pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });

        let params_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("stamp_params"),
            size: std::mem::size_of::<StampParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let dab_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("stamp_dabs"),
            size: (DAB_BATCH_CAPACITY * std::mem::size_of::<DabParams>()) as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            device,
            queue,
            pipeline,
            bind_group_layout,
            params_buffer,
            dab_buffer,
            surfaces: HashMap::new(),
            allocations: HashMap::new(),
            readbacks: HashMap::new(),
            next_id: 1,
            next_submission: 1,
            completed_through: Arc::new(AtomicU64::new(0)),
        }
    }

    fn next_handle(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn create_surface(&self, width: u32, height: u32) -> GpuSurface {
        // New buffers are zero-initialized (transparent)
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("accumulation_surface"),
            size: width as u64 * height as u64 * PIXEL_BYTES,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        GpuSurface {
            buffer,
            width,
            height,
        }
    }

    /// Submit an encoder and track its completion under our own index
    fn submit(&mut self, encoder: wgpu::CommandEncoder) -> SubmissionIndex {
        let index = self.next_submission;
        self.next_submission += 1;
        self.queue.submit([encoder.finish()]);

        let completed = Arc::clone(&self.completed_through);
        self.queue.on_submitted_work_done(move || {
            completed.fetch_max(index, Ordering::AcqRel);
        });
        SubmissionIndex(index)
    }

    fn poll_device(&self) {
        let _ = self.device.poll(wgpu::PollType::Poll);
    }

    fn take_mapped(staging: wgpu::Buffer, mapped: &MapResult) -> Result<Vec<Rgba>, DeviceError> {
        let status = mapped
            .lock()
            .map_err(|_| DeviceError::ReadbackFailed("map state poisoned".to_string()))?
            .take();
        match status {
            Some(Ok(())) => {
                let pixels = {
                    let data = staging.slice(..).get_mapped_range();
                    bytemuck::pod_collect_to_vec::<u8, Rgba>(&data)
                };
                staging.unmap();
                Ok(pixels)
            }
            Some(Err(e)) => Err(DeviceError::ReadbackFailed(e.to_string())),
            None => Err(DeviceError::ReadbackFailed("buffer not mapped".to_string())),
        }
    }
}

impl DabDevice for WgpuDevice {
    fn kernel_capacity(&self) -> usize {
        DAB_BATCH_CAPACITY
    }

    fn request_surfaces(&mut self, width: u32, height: u32) -> Result<AllocationTicket, DeviceError> {
        let ticket = AllocationTicket(self.next_handle());
        let size = width as u64 * height as u64 * PIXEL_BYTES;
        let limit = self.device.limits().max_storage_buffer_binding_size as u64;

        let result = if width == 0 || height == 0 || size > limit {
            Err(DeviceError::AllocationFailed(format!(
                "{}x{} surface does not fit a storage binding ({} bytes max)",
                width, height, limit
            )))
        } else {
            let a = SurfaceId(self.next_handle());
            let b = SurfaceId(self.next_handle());
            let (sa, sb) = (self.create_surface(width, height), self.create_surface(width, height));
            self.surfaces.insert(a, sa);
            self.surfaces.insert(b, sb);
            debug!("WgpuDevice: allocated {:?}/{:?} ({}x{})", a, b, width, height);
            Ok([a, b])
        };
        self.allocations.insert(ticket, result);
        Ok(ticket)
    }

    fn poll_surfaces(&mut self, ticket: AllocationTicket) -> Poll<Result<[SurfaceId; 2], DeviceError>> {
        match self.allocations.remove(&ticket) {
            Some(result) => Poll::Ready(result),
            None => Poll::Ready(Err(DeviceError::UnknownAllocation(ticket))),
        }
    }

    fn cancel_surfaces(&mut self, ticket: AllocationTicket) {
        if let Some(Ok(pair)) = self.allocations.remove(&ticket) {
            for id in pair {
                self.release(id);
            }
        }
    }

    fn dispatch(
        &mut self,
        read: SurfaceId,
        write: SurfaceId,
        batch: &[DabParams],
        region: DirtyRect,
    ) -> Result<SubmissionIndex, DeviceError> {
        if read == write {
            return Err(DeviceError::AliasedSurfaces(read));
        }
        if batch.len() > DAB_BATCH_CAPACITY {
            return Err(DeviceError::BatchTooLarge {
                len: batch.len(),
                capacity: DAB_BATCH_CAPACITY,
            });
        }
        let src = self.surfaces.get(&read).ok_or(DeviceError::SurfaceLost(read))?;
        let dst = self.surfaces.get(&write).ok_or(DeviceError::SurfaceLost(write))?;

        let region = region.clamped(dst.width, dst.height);
        let params = StampParams {
            origin_x: region.left.max(0) as u32,
            origin_y: region.top.max(0) as u32,
            region_width: region.width(),
            region_height: region.height(),
            surface_width: dst.width,
            dab_count: batch.len() as u32,
            _pad: [0; 2],
        };
        self.queue.write_buffer(&self.params_buffer, 0, bytemuck::bytes_of(&params));
        if !batch.is_empty() {
            self.queue.write_buffer(&self.dab_buffer, 0, bytemuck::cast_slice(batch));
        }

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("stamp_bind_group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.params_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: self.dab_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: src.buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: dst.buffer.as_entire_binding(),
                },
            ],
        });

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("stamp_encoder"),
        });
        if !region.is_empty() {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("stamp_pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(
                params.region_width.div_ceil(STAMP_WORKGROUP_SIZE),
                params.region_height.div_ceil(STAMP_WORKGROUP_SIZE),
                1,
            );
        }

        Ok(self.submit(encoder))
    }

    fn is_complete(&mut self, index: SubmissionIndex) -> bool {
        if index.0 > self.completed_through.load(Ordering::Acquire) {
            self.poll_device();
        }
        index.0 <= self.completed_through.load(Ordering::Acquire)
    }

    fn wait_for(&mut self, index: SubmissionIndex) -> Result<(), DeviceError> {
        if index.0 <= self.completed_through.load(Ordering::Acquire) {
            return Ok(());
        }
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| DeviceError::DispatchFailed(e.to_string()))?;
        Ok(())
    }

    fn request_readback(&mut self, surface: SurfaceId, rect: DirtyRect) -> Result<ReadbackTicket, DeviceError> {
        if !self.surfaces.contains_key(&surface) {
            return Err(DeviceError::SurfaceLost(surface));
        }
        let ticket = ReadbackTicket(self.next_handle());
        let source = self.surfaces.get(&surface).ok_or(DeviceError::SurfaceLost(surface))?;
        let rect = rect.clamped(source.width, source.height);

        if rect.is_empty() {
            self.readbacks.insert(ticket, PendingReadback::Empty);
            return Ok(ticket);
        }
        let (source_buffer, source_width) = (source.buffer.clone(), source.width);

        let row_bytes = rect.width() as u64 * PIXEL_BYTES;
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback_staging"),
            size: row_bytes * rect.height() as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("readback_encoder"),
        });
        for (row, y) in (rect.top..rect.bottom).enumerate() {
            let src_offset = (y as u64 * source_width as u64 + rect.left as u64) * PIXEL_BYTES;
            encoder.copy_buffer_to_buffer(&source_buffer, src_offset, &staging, row as u64 * row_bytes, row_bytes);
        }
        self.submit(encoder);

        let mapped: MapResult = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&mapped);
        staging.slice(..).map_async(wgpu::MapMode::Read, move |result| {
            if let Ok(mut guard) = slot.lock() {
                *guard = Some(result);
            }
        });

        self.readbacks.insert(ticket, PendingReadback::Mapping { staging, mapped });
        Ok(ticket)
    }

    fn poll_readback(&mut self, ticket: ReadbackTicket) -> Poll<Result<Vec<Rgba>, DeviceError>> {
        self.poll_device();
        let ready = match self.readbacks.get(&ticket) {
            None => return Poll::Ready(Err(DeviceError::UnknownReadback(ticket))),
            Some(PendingReadback::Empty) => true,
            Some(PendingReadback::Mapping { mapped, .. }) => {
                mapped.lock().map(|guard| guard.is_some()).unwrap_or(true)
            }
        };
        if !ready {
            return Poll::Pending;
        }
        match self.readbacks.remove(&ticket) {
            Some(PendingReadback::Empty) => Poll::Ready(Ok(Vec::new())),
            Some(PendingReadback::Mapping { staging, mapped }) => Poll::Ready(Self::take_mapped(staging, &mapped)),
            None => Poll::Ready(Err(DeviceError::UnknownReadback(ticket))),
        }
    }

    fn wait_readback(&mut self, ticket: ReadbackTicket) -> Result<Vec<Rgba>, DeviceError> {
        match self.readbacks.remove(&ticket) {
            None => Err(DeviceError::UnknownReadback(ticket)),
            Some(PendingReadback::Empty) => Ok(Vec::new()),
            Some(PendingReadback::Mapping { staging, mapped }) => {
                self.device
                    .poll(wgpu::PollType::wait_indefinitely())
                    .map_err(|e| DeviceError::ReadbackFailed(e.to_string()))?;
                Self::take_mapped(staging, &mapped)
            }
        }
    }

    fn release(&mut self, surface: SurfaceId) {
        if let Some(gpu_surface) = self.surfaces.remove(&surface) {
            gpu_surface.buffer.destroy();
        }
    }
}
