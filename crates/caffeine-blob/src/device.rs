/// Device type enumeration for buffer residency.
///
/// Represents the memory spaces a [`crate::SyncedMemory`] can mirror its contents into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Device {
    /// Host memory, computed on by the calling thread.
    #[default]
    Cpu,
    /// Device memory, a separate arena computed on by a dedicated worker pool.
    Parallel,
}

impl Device {
    /// Returns the device type as a string.
    pub fn device_type(&self) -> &str {
        match self {
            Device::Cpu => "cpu",
            Device::Parallel => "parallel",
        }
    }

    /// Returns true if the device is the host.
    pub fn is_cpu(&self) -> bool {
        matches!(self, Device::Cpu)
    }

    /// Returns true if the device owns memory separate from the host.
    pub fn is_device(&self) -> bool {
        !self.is_cpu()
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.device_type())
    }
}
