// gpu/mod.rs — GPU compute layer (feature "gpu").
//
// wgpu compute pipelines that mirror CPU operators in the parent crate. The
// CPU implementations stay the reference: every GPU kernel is checked
// against them in the ignored integration tests.
//
//   device      adapter selection, hardware profiles, workgroup sizes
//   morphology  batched erosion / dilation, planes split at the dispatch limit
//
// SIFT stays on the CPU: a 41×41 patch is too small to amortise an upload.

pub mod device;
pub mod morphology;

pub use device::{DeviceProfile, GpuDevice, GpuError, WorkgroupSize};
pub use morphology::GpuMorphology;
