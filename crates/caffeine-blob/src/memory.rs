//! Lazily synchronised host/device memory.
//!
//! A [`SyncedMemory`] owns up to two copies of the same array: one in host memory and one
//! in device memory. A head tag records which copy is authoritative and a copy is made only
//! when the other side is requested.

use crate::device::Device;

/// Which copy of a [`SyncedMemory`] holds the current values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncHead {
    /// Nothing has been allocated yet.
    Uninitialized,
    /// The host copy is authoritative.
    HeadAtCpu,
    /// The device copy is authoritative.
    HeadAtDevice,
    /// Both copies hold the same values.
    Synced,
}

/// A fixed-length array mirrored between host and device memory.
///
/// Every accessor takes `&mut self` because reading one side may have to copy from the
/// other one first.
#[derive(Debug, Clone)]
pub struct SyncedMemory<T> {
    cpu: Vec<T>,
    device: Vec<T>,
    len: usize,
    head: SyncHead,
}

impl<T: Copy + Default> SyncedMemory<T> {
    /// Creates an uninitialized memory of `len` elements. Nothing is allocated until the
    /// first access.
    pub fn new(len: usize) -> Self {
        Self {
            cpu: Vec::new(),
            device: Vec::new(),
            len,
            head: SyncHead::Uninitialized,
        }
    }

    /// Creates a memory whose host copy holds `values`.
    pub fn from_vec(values: Vec<T>) -> Self {
        Self {
            len: values.len(),
            cpu: values,
            device: Vec::new(),
            head: SyncHead::HeadAtCpu,
        }
    }

    /// Returns the number of elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the memory holds no elements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the current head tag.
    #[inline]
    pub fn head(&self) -> SyncHead {
        self.head
    }

    fn to_cpu(&mut self) {
        match self.head {
            SyncHead::Uninitialized => {
                self.cpu = vec![T::default(); self.len];
                self.head = SyncHead::HeadAtCpu;
            }
            SyncHead::HeadAtDevice => {
                if self.cpu.len() != self.len {
                    self.cpu = vec![T::default(); self.len];
                }
                self.cpu.copy_from_slice(&self.device);
                self.head = SyncHead::Synced;
            }
            SyncHead::HeadAtCpu | SyncHead::Synced => {}
        }
    }

    fn to_device(&mut self) {
        match self.head {
            SyncHead::Uninitialized => {
                self.device = vec![T::default(); self.len];
                self.head = SyncHead::HeadAtDevice;
            }
            SyncHead::HeadAtCpu => {
                if self.device.len() != self.len {
                    self.device = vec![T::default(); self.len];
                }
                self.device.copy_from_slice(&self.cpu);
                self.head = SyncHead::Synced;
            }
            SyncHead::HeadAtDevice | SyncHead::Synced => {}
        }
    }

    /// Returns the host copy, copying from the device first if needed.
    pub fn cpu_data(&mut self) -> &[T] {
        self.to_cpu();
        &self.cpu
    }

    /// Returns the host copy for writing and marks it authoritative.
    pub fn mutable_cpu_data(&mut self) -> &mut [T] {
        self.to_cpu();
        self.head = SyncHead::HeadAtCpu;
        &mut self.cpu
    }

    /// Returns the device copy, copying from the host first if needed.
    pub fn device_data(&mut self) -> &[T] {
        self.to_device();
        &self.device
    }

    /// Returns the device copy for writing and marks it authoritative.
    pub fn mutable_device_data(&mut self) -> &mut [T] {
        self.to_device();
        self.head = SyncHead::HeadAtDevice;
        &mut self.device
    }

    /// Returns the copy resident on `device`.
    pub fn data(&mut self, device: Device) -> &[T] {
        match device {
            Device::Cpu => self.cpu_data(),
            Device::Parallel => self.device_data(),
        }
    }

    /// Returns the copy resident on `device` for writing.
    pub fn mutable_data(&mut self, device: Device) -> &mut [T] {
        match device {
            Device::Cpu => self.mutable_cpu_data(),
            Device::Parallel => self.mutable_device_data(),
        }
    }
}
