//! Reusable offscreen render targets
//!
//! Buffers are moved out to the holder on [`BufferPool::acquire`] and moved
//! back on [`BufferPool::release`]. The pool tracks which ids are out so a
//! buffer can never sit in the free list while someone still holds it.

use std::sync::Arc;

use rustc_hash::FxHashSet;

use crate::ResourceError;

/// Creates and recycles the storage behind pooled buffers
pub trait TargetAllocator {
    type Target;

    fn allocate(&mut self, width: u32, height: u32) -> Self::Target;
    fn resize(&mut self, target: &mut Self::Target, width: u32, height: u32);
    /// Reset contents to transparent black
    fn clear(&mut self, target: &Self::Target);
    fn destroy(&mut self, target: Self::Target);
    fn size(target: &Self::Target) -> (u32, u32);
}

/// A buffer on loan from a [`BufferPool`]
#[derive(Debug)]
pub struct PooledBuffer<T> {
    id: u64,
    target: T,
}

impl<T> PooledBuffer<T> {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn target(&self) -> &T {
        &self.target
    }
}

impl<T> std::ops::Deref for PooledBuffer<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.target
    }
}

/// Pool statistics for diagnostics
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Buffers created over the pool's lifetime
    pub allocated: usize,
    /// Buffers waiting in the free list
    pub free: usize,
    /// Buffers currently on loan
    pub held: usize,
    /// Reused buffers whose dimensions had to change
    pub resizes: usize,
}

pub struct BufferPool<A: TargetAllocator> {
    allocator: A,
    free: Vec<PooledBuffer<A::Target>>,
    held: FxHashSet<u64>,
    next_id: u64,
    allocated: usize,
    resizes: usize,
}

impl<A: TargetAllocator> BufferPool<A> {
    pub fn new(allocator: A) -> Self {
        Self {
            allocator,
            free: Vec::new(),
            held: FxHashSet::default(),
            next_id: 1,
            allocated: 0,
            resizes: 0,
        }
    }

    pub fn allocator(&self) -> &A {
        &self.allocator
    }

    /// Take a cleared buffer of the given size, reusing a free one when possible
    pub fn acquire(&mut self, width: u32, height: u32) -> PooledBuffer<A::Target> {
        let buffer = match self.free.pop() {
            Some(mut buffer) => {
                if A::size(&buffer.target) != (width, height) {
                    self.allocator.resize(&mut buffer.target, width, height);
                    self.resizes += 1;
                }
                buffer
            }
            None => {
                let id = self.next_id;
                self.next_id += 1;
                self.allocated += 1;
                tracing::debug!(
                    "buffer pool: allocated {}x{} buffer, {} total",
                    width,
                    height,
                    self.allocated
                );
                PooledBuffer {
                    id,
                    target: self.allocator.allocate(width, height),
                }
            }
        };
        self.allocator.clear(&buffer.target);
        self.held.insert(buffer.id);
        buffer
    }

    /// Return a buffer to the free list
    ///
    /// A buffer this pool did not hand out is destroyed instead of pooled.
    pub fn release(&mut self, buffer: PooledBuffer<A::Target>) -> Result<(), ResourceError> {
        if !self.held.remove(&buffer.id) {
            tracing::warn!("buffer pool: released buffer {} that is not held", buffer.id);
            let id = buffer.id;
            self.allocator.destroy(buffer.target);
            return Err(ResourceError::NotHeld(id));
        }
        self.free.push(buffer);
        Ok(())
    }

    /// Destroy every free buffer
    ///
    /// Buffers still on loan are reported as leaked; they are destroyed when
    /// their holder drops them.
    pub fn teardown(&mut self) -> Result<(), ResourceError> {
        for buffer in self.free.drain(..) {
            self.allocator.destroy(buffer.target);
        }
        if self.held.is_empty() {
            return Ok(());
        }
        let count = self.held.len();
        tracing::warn!("buffer pool: teardown with {} buffers still held", count);
        self.held.clear();
        Err(ResourceError::Leaked { count })
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            allocated: self.allocated,
            free: self.free.len(),
            held: self.held.len(),
            resizes: self.resizes,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// GPU targets
// ─────────────────────────────────────────────────────────────────────────────

/// Color texture usable as render attachment, sampled input and copy source
#[derive(Debug)]
pub struct RenderTarget {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub size: (u32, u32),
}

impl RenderTarget {
    pub fn new(device: &wgpu::Device, size: (u32, u32), format: wgpu::TextureFormat) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("inkframe_render_target"),
            size: wgpu::Extent3d {
                width: size.0.max(1),
                height: size.1.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            size,
        }
    }

    /// Check if this target matches the requested size
    pub fn matches_size(&self, size: (u32, u32)) -> bool {
        self.size == size
    }
}

/// Allocates canvas-format [`RenderTarget`]s on a wgpu device
pub struct GpuTargetAllocator {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    format: wgpu::TextureFormat,
}

impl GpuTargetAllocator {
    pub fn new(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        format: wgpu::TextureFormat,
    ) -> Self {
        Self {
            device,
            queue,
            format,
        }
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }
}

impl TargetAllocator for GpuTargetAllocator {
    type Target = RenderTarget;

    fn allocate(&mut self, width: u32, height: u32) -> RenderTarget {
        RenderTarget::new(&self.device, (width, height), self.format)
    }

    fn resize(&mut self, target: &mut RenderTarget, width: u32, height: u32) {
        let resized = RenderTarget::new(&self.device, (width, height), self.format);
        std::mem::replace(target, resized).texture.destroy();
    }

    fn clear(&mut self, target: &RenderTarget) {
        clear_view(&self.device, &self.queue, &target.view);
    }

    fn destroy(&mut self, target: RenderTarget) {
        target.texture.destroy();
    }

    fn size(target: &RenderTarget) -> (u32, u32) {
        target.size
    }
}

/// Clear a view to transparent black
pub(crate) fn clear_view(device: &wgpu::Device, queue: &wgpu::Queue, view: &wgpu::TextureView) {
    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("Clear Encoder"),
    });
    {
        let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Clear Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
    }
    queue.submit(std::iter::once(encoder.finish()));
}
