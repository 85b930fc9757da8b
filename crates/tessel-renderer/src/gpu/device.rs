//! Device management for wgpu
//!
//! Handles instance, adapter, device and queue initialization

use std::sync::Arc;
use tessel_core::{
    tessel_debug, tessel_error_rate_limited, tessel_info, ErrorContext, LogCategory,
    RendererConfig, Result, TesselError,
};
use wgpu::{
    Adapter, AdapterInfo, Backends, Device, DeviceDescriptor, Features, Instance,
    InstanceDescriptor, InstanceFlags, Limits, PowerPreference, Queue, RequestAdapterOptions,
    Surface,
};

/// Manages wgpu device and queue
pub struct DeviceManager {
    instance: Arc<Instance>,
    adapter: Adapter,
    device: Device,
    queue: Queue,
}

/// Create an instance with validation following the configuration
pub fn create_instance(config: &RendererConfig) -> Instance {
    let flags = if config.validation {
        InstanceFlags::VALIDATION | InstanceFlags::DEBUG
    } else {
        InstanceFlags::empty()
    };
    Instance::new(InstanceDescriptor {
        backends: Backends::all(),
        flags,
        ..Default::default()
    })
}

impl DeviceManager {
    /// Create a device manager
    ///
    /// `compatible_surface` restricts adapter selection to adapters that can
    /// present to it.
    ///
    /// # Errors
    /// Returns an initialization error if no adapter is found or the device
    /// request fails
    pub async fn new(instance: Arc<Instance>, compatible_surface: Option<&Surface<'_>>) -> Result<Self> {
        let adapter = instance
            .request_adapter(&RequestAdapterOptions {
                power_preference: PowerPreference::HighPerformance,
                compatible_surface,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| {
                TesselError::initialization_with_context(
                    "no suitable GPU adapter",
                    ErrorContext::new("request_adapter", "device"),
                )
            })?;

        let info = adapter.get_info();
        tessel_info!(
            LogCategory::Device,
            name = %info.name,
            vendor = info.vendor,
            device = info.device,
            backend = ?info.backend,
            "adapter selected"
        );

        let (device, queue) = adapter
            .request_device(
                &DeviceDescriptor {
                    label: Some("Tessel Device"),
                    required_features: Features::empty(),
                    required_limits: Limits::default().using_resolution(adapter.limits()),
                },
                None,
            )
            .await
            .map_err(|e| {
                TesselError::initialization_with_context(
                    format!("failed to create device: {}", e),
                    ErrorContext::new("request_device", "device")
                        .with_metadata("adapter", &info.name),
                )
            })?;

        device.on_uncaptured_error(Box::new(|error| {
            tessel_error_rate_limited!(LogCategory::Device, error = %error, "uncaptured GPU error");
        }));
        tessel_debug!(LogCategory::Device, "device ready");

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
        })
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    pub fn instance(&self) -> &Arc<Instance> {
        &self.instance
    }

    pub fn adapter_info(&self) -> AdapterInfo {
        self.adapter.get_info()
    }

    pub fn limits(&self) -> Limits {
        self.device.limits()
    }

    /// Run `create` inside a validation scope, turning a captured
    /// validation error into a creation error for `kind`
    pub fn scoped<T>(&self, kind: &'static str, create: impl FnOnce(&Device) -> T) -> Result<T> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = create(&self.device);
        match pollster::block_on(self.device.pop_error_scope()) {
            Some(error) => Err(TesselError::creation(kind, error.to_string())),
            None => Ok(value),
        }
    }

    /// Block until the queue is drained
    pub fn wait_idle(&self) {
        self.device.poll(wgpu::Maintain::Wait);
    }
}
