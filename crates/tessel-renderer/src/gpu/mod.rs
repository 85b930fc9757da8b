//! wgpu building blocks used by [`crate::backend::WgpuBackend`]

pub mod convert;
pub mod device;
pub mod mipmap;
pub mod surface;

pub use device::{create_instance, DeviceManager};
pub use mipmap::MipmapGenerator;
pub use surface::SurfaceManager;
