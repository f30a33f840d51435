// gpu/device.rs — wgpu device selection and workgroup configuration.
//
// Responsibilities:
//   - Enumerate Vulkan adapters, preferring real hardware over software
//     rasterizers.
//   - Expose a `DeviceProfile` that caps requested limits, so a kernel that
//     would exceed a small embedded GPU's limits fails on the dev machine.
//   - Provide `WorkgroupSize`, validated against the active profile and
//     baked into shader sources at pipeline creation.
//
// ADAPTER SELECTION:
// wgpu's default `request_adapter` may pick llvmpipe when a software
// Vulkan driver is installed alongside a real one. We enumerate explicitly
// and only fall back to a CPU adapter when nothing else exists.
//
// DEVICE LIMITS:
// Under a non-Native profile we request *lower* limits than the hardware
// supports. wgpu validates every dispatch against the requested limits,
// so callers size their dispatches with `dispatch_grid`, which checks each
// dimension against `max_compute_workgroups_per_dimension`.

use std::fmt;

use thiserror::Error;
use tracing::{info, warn};

/// Hardware profile controlling device limits and default workgroup sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceProfile {
    /// Use the adapter's actual hardware limits.
    Native,
    /// Simulate Raspberry Pi 4/5 (VideoCore VI/VII, V3DV Vulkan): 256
    /// invocations per workgroup, 128 MiB storage bindings.
    RaspberryPi,
}

impl fmt::Display for DeviceProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceProfile::Native => write!(f, "Native"),
            DeviceProfile::RaspberryPi => write!(f, "RaspberryPi (simulated limits)"),
        }
    }
}

/// A workgroup size for 2D compute dispatches (z is always 1).
///
/// The product `x * y` must not exceed the profile's
/// `max_compute_invocations_per_workgroup`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkgroupSize {
    pub x: u32,
    pub y: u32,
}

impl WorkgroupSize {
    /// Total invocations per workgroup (x * y).
    pub fn total(&self) -> u32 {
        self.x * self.y
    }

    /// Substitute `{{WG_X}}` / `{{WG_Y}}` placeholders in a shader template.
    ///
    /// naga does not accept `override` expressions in `@workgroup_size` on
    /// every backend we target, so the sizes are baked into the source.
    pub fn specialize(&self, template: &str) -> String {
        template
            .replace("{{WG_X}}", &self.x.to_string())
            .replace("{{WG_Y}}", &self.y.to_string())
    }

    /// Validated default for the given profile.
    ///
    /// - `Native`: 16×8 = 128 invocations (4 NVIDIA warps, 2 AMD waves).
    /// - `RaspberryPi`: 8×8 = 64, well inside the 256 limit.
    fn for_profile(profile: DeviceProfile) -> Self {
        match profile {
            DeviceProfile::Native => WorkgroupSize { x: 16, y: 8 },
            DeviceProfile::RaspberryPi => WorkgroupSize { x: 8, y: 8 },
        }
    }
}

impl fmt::Display for WorkgroupSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}×{} ({} invocations)", self.x, self.y, self.total())
    }
}

/// Cached adapter information for logging.
#[derive(Debug, Clone)]
pub struct AdapterInfo {
    pub name: String,
    pub vendor: u32,
    pub device: u32,
    pub device_type: wgpu::DeviceType,
    pub backend: wgpu::Backend,
}

impl fmt::Display for AdapterInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?}, {:?})", self.name, self.backend, self.device_type)
    }
}

/// The GPU context: device, queue and active profile.
///
/// Expensive to create. Hold one for the lifetime of the application and
/// build pipelines (e.g. [`GpuMorphology`](super::morphology::GpuMorphology))
/// against it.
///
/// # Field drop order
/// Fields drop top to bottom; `_instance` is last so the Vulkan instance
/// outlives `device` and `queue`.
pub struct GpuDevice {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub profile: DeviceProfile,
    pub adapter_info: AdapterInfo,
    pub workgroup_size: WorkgroupSize,
    _instance: wgpu::Instance,
}

impl GpuDevice {
    /// First hardware Vulkan adapter, `DeviceProfile::Native` limits.
    ///
    /// # Errors
    /// `NoSuitableAdapter` if no Vulkan adapter exists, `DeviceRequest` if
    /// the driver refuses the device.
    pub fn new() -> Result<Self, GpuError> {
        Self::new_with_profile(DeviceProfile::Native)
    }

    /// Create a device with an explicit hardware profile.
    pub fn new_with_profile(profile: DeviceProfile) -> Result<Self, GpuError> {
        pollster::block_on(Self::init_async(profile))
    }

    async fn init_async(profile: DeviceProfile) -> Result<Self, GpuError> {
        let flags = if cfg!(debug_assertions) {
            wgpu::InstanceFlags::VALIDATION
                | wgpu::InstanceFlags::ALLOW_UNDERLYING_NONCOMPLIANT_ADAPTER
        } else {
            wgpu::InstanceFlags::ALLOW_UNDERLYING_NONCOMPLIANT_ADAPTER
        };

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::VULKAN,
            flags,
            ..Default::default()
        });

        let all_adapters = instance.enumerate_adapters(wgpu::Backends::VULKAN);
        if all_adapters.is_empty() {
            return Err(GpuError::NoSuitableAdapter);
        }
        for a in &all_adapters {
            let info = a.get_info();
            info!(name = %info.name, backend = ?info.backend, device_type = ?info.device_type, "vulkan adapter");
        }

        // Tier 1: anything that is not a software rasterizer.
        // Tier 2: whatever exists.
        let mut hardware = None;
        let mut fallback = None;
        for a in all_adapters {
            if a.get_info().device_type == wgpu::DeviceType::Cpu {
                fallback.get_or_insert(a);
            } else if hardware.is_none() {
                hardware = Some(a);
            }
        }
        let adapter = match (hardware, fallback) {
            (Some(a), _) => a,
            (None, Some(a)) => {
                warn!(name = %a.get_info().name, "only a CPU adapter is available");
                a
            }
            (None, None) => return Err(GpuError::NoSuitableAdapter),
        };

        let raw_info = adapter.get_info();
        let adapter_info = AdapterInfo {
            name: raw_info.name.clone(),
            vendor: raw_info.vendor,
            device: raw_info.device,
            device_type: raw_info.device_type,
            backend: raw_info.backend,
        };

        // Auto-detect the Pi when the caller passed Native but the adapter is V3D.
        let profile = match profile {
            DeviceProfile::Native if raw_info.name.to_ascii_lowercase().contains("v3d") => {
                info!("V3D adapter detected, using RaspberryPi profile");
                DeviceProfile::RaspberryPi
            }
            other => other,
        };

        let (device, queue): (wgpu::Device, wgpu::Queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("morphsift"),
                    required_features: wgpu::Features::empty(),
                    required_limits: limits_for_profile(profile),
                    memory_hints: wgpu::MemoryHints::default(),
                },
                None,
            )
            .await?;

        let workgroup_size = WorkgroupSize::for_profile(profile);
        info!(adapter = %adapter_info, %profile, workgroup = %workgroup_size, "gpu device ready");

        Ok(GpuDevice {
            device,
            queue,
            profile,
            adapter_info,
            workgroup_size,
            _instance: instance,
        })
    }

    /// Override the default workgroup size, validating against the profile.
    pub fn set_workgroup_size(&mut self, x: u32, y: u32) -> Result<(), GpuError> {
        let total = x * y;
        let max = max_invocations_for_profile(self.profile);
        if total > max {
            return Err(GpuError::WorkgroupTooLarge { total, max });
        }
        self.workgroup_size = WorkgroupSize { x, y };
        Ok(())
    }

    /// Workgroups needed to cover a `width × height` grid (ceiling division),
    /// checked against the device's per-dimension dispatch limit.
    ///
    /// Shaders must guard against out-of-bounds invocations.
    pub fn dispatch_grid(&self, width: usize, height: usize) -> Result<(u32, u32), GpuError> {
        dispatch_grid(self.workgroup_size, width, height, self.max_workgroups_per_dimension())
    }

    /// Largest workgroup count accepted along any one dispatch axis.
    pub fn max_workgroups_per_dimension(&self) -> u32 {
        self.device.limits().max_compute_workgroups_per_dimension
    }

    /// Largest storage buffer binding the device accepts, in bytes.
    pub fn max_storage_binding(&self) -> u64 {
        self.device.limits().max_storage_buffer_binding_size as u64
    }
}

impl fmt::Display for GpuDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GpuDevice {{ adapter: {}, profile: {}, workgroup: {} }}",
            self.adapter_info, self.profile, self.workgroup_size
        )
    }
}

pub(crate) fn dispatch_grid(
    ws: WorkgroupSize,
    width: usize,
    height: usize,
    max_per_dim: u32,
) -> Result<(u32, u32), GpuError> {
    let groups = |len: usize, wg: u32, axis: char| {
        let n = (len as u64).div_ceil(wg as u64);
        u32::try_from(n)
            .ok()
            .filter(|&n| n <= max_per_dim)
            .ok_or(GpuError::DispatchTooLarge { axis, groups: n, max: max_per_dim })
    };
    Ok((groups(width, ws.x, 'x')?, groups(height, ws.y, 'y')?))
}

/// Split `planes` z-slices into `(offset, count)` runs of at most
/// `max_per_dim`, one dispatch each.
pub(crate) fn plane_chunks(planes: u32, max_per_dim: u32) -> impl Iterator<Item = (u32, u32)> {
    let step = max_per_dim.max(1);
    (0..planes)
        .step_by(step as usize)
        .map(move |offset| (offset, step.min(planes - offset)))
}

// ============================================================
// Limits helpers
// ============================================================

fn limits_for_profile(profile: DeviceProfile) -> wgpu::Limits {
    match profile {
        DeviceProfile::Native => wgpu::Limits::default(),

        DeviceProfile::RaspberryPi => wgpu::Limits {
            max_compute_invocations_per_workgroup: 256,
            max_compute_workgroup_size_x: 256,
            max_compute_workgroup_size_y: 256,
            max_compute_workgroup_size_z: 64,
            max_texture_dimension_2d: 4096,
            max_storage_buffer_binding_size: 128 << 20,
            ..wgpu::Limits::default()
        },
    }
}

fn max_invocations_for_profile(profile: DeviceProfile) -> u32 {
    match profile {
        DeviceProfile::Native => wgpu::Limits::default().max_compute_invocations_per_workgroup,
        DeviceProfile::RaspberryPi => 256,
    }
}

// ============================================================
// Error type
// ============================================================

/// Errors from GPU initialization, configuration and readback.
#[derive(Debug, Error)]
pub enum GpuError {
    /// No Vulkan adapter is visible at all.
    #[error("no suitable Vulkan adapter found; check that `vulkaninfo` lists a device")]
    NoSuitableAdapter,

    #[error("device request failed: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),

    #[error("workgroup size {total} exceeds profile limit of {max} invocations")]
    WorkgroupTooLarge { total: u32, max: u32 },

    /// A batch does not fit in one storage buffer binding.
    #[error("buffer of {size} bytes exceeds the device binding limit of {max} bytes")]
    BufferTooLarge { size: u64, max: u64 },

    /// A dispatch axis needs more workgroups than the device allows.
    #[error("dispatch needs {groups} workgroups along {axis}, device limit is {max}")]
    DispatchTooLarge { axis: char, groups: u64, max: u32 },

    #[error("buffer readback failed: {0}")]
    Readback(#[from] wgpu::BufferAsyncError),

    /// The map callback was dropped without firing.
    #[error("buffer readback was abandoned before completion")]
    ReadbackAbandoned,
}

// ============================================================
// Tests
// ============================================================
