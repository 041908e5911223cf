use crate::{device::Device, error::BlobError, memory::SyncedMemory};

/// A 4-D numeric buffer holding values and their gradients.
///
/// The shape is `(num, channels, height, width)` in row-major order. The value and gradient
/// arrays always hold `count()` elements each and are mirrored between host and device
/// memory independently.
#[derive(Debug, Clone)]
pub struct Blob<T> {
    shape: [usize; 4],
    data: SyncedMemory<T>,
    diff: SyncedMemory<T>,
}

impl<T: Copy + Default> Default for Blob<T> {
    fn default() -> Self {
        Self::new(0, 0, 0, 0)
    }
}

impl<T: Copy + Default> Blob<T> {
    /// Creates a zero-initialized blob of shape `(num, channels, height, width)`.
    pub fn new(num: usize, channels: usize, height: usize, width: usize) -> Self {
        let shape = [num, channels, height, width];
        let count = shape.iter().product();
        Self {
            shape,
            data: SyncedMemory::new(count),
            diff: SyncedMemory::new(count),
        }
    }

    /// Creates a blob whose values are `values`, laid out in row-major order.
    ///
    /// # Errors
    ///
    /// Returns an error if the number of values does not match the shape.
    pub fn from_vec(shape: [usize; 4], values: Vec<T>) -> Result<Self, BlobError> {
        let count: usize = shape.iter().product();
        if values.len() != count {
            return Err(BlobError::InvalidShape {
                expected: count,
                actual: values.len(),
            });
        }
        Ok(Self {
            shape,
            data: SyncedMemory::from_vec(values),
            diff: SyncedMemory::new(count),
        })
    }

    /// Changes the shape of the blob.
    ///
    /// Both arrays are reallocated, and their contents discarded, when the element count
    /// changes. Reshaping to the current shape is a no-op.
    pub fn reshape(&mut self, num: usize, channels: usize, height: usize, width: usize) {
        let shape = [num, channels, height, width];
        if shape == self.shape {
            return;
        }
        let count: usize = shape.iter().product();
        if count != self.count() {
            log::debug!("reallocating blob {:?} -> {:?}", self.shape, shape);
            self.data = SyncedMemory::new(count);
            self.diff = SyncedMemory::new(count);
        }
        self.shape = shape;
    }

    /// Changes the shape of the blob to the shape of `other`.
    pub fn reshape_like(&mut self, other: &Blob<T>) {
        let [n, c, h, w] = other.shape;
        self.reshape(n, c, h, w);
    }

    /// Returns the shape `(num, channels, height, width)`.
    #[inline]
    pub fn shape(&self) -> [usize; 4] {
        self.shape
    }

    /// Returns the leading (batch) dimension.
    #[inline]
    pub fn num(&self) -> usize {
        self.shape[0]
    }

    /// Returns the channel dimension.
    #[inline]
    pub fn channels(&self) -> usize {
        self.shape[1]
    }

    /// Returns the height dimension.
    #[inline]
    pub fn height(&self) -> usize {
        self.shape[2]
    }

    /// Returns the width dimension.
    #[inline]
    pub fn width(&self) -> usize {
        self.shape[3]
    }

    /// Returns the number of elements.
    #[inline]
    pub fn count(&self) -> usize {
        self.data.len()
    }

    /// Returns the flat offset of an element.
    ///
    /// # Errors
    ///
    /// Returns an error if any index exceeds its dimension.
    pub fn offset(&self, n: usize, c: usize, h: usize, w: usize) -> Result<usize, BlobError> {
        let index = [n, c, h, w];
        if index.iter().zip(self.shape.iter()).any(|(i, s)| i >= s) {
            return Err(BlobError::IndexOutOfBounds {
                index,
                shape: self.shape,
            });
        }
        let [_, channels, height, width] = self.shape;
        Ok(((n * channels + c) * height + h) * width + w)
    }

    /// Reads a single value from the host copy.
    pub fn data_at(&mut self, n: usize, c: usize, h: usize, w: usize) -> Result<T, BlobError> {
        let offset = self.offset(n, c, h, w)?;
        Ok(self.data.cpu_data()[offset])
    }

    /// Reads a single gradient from the host copy.
    pub fn diff_at(&mut self, n: usize, c: usize, h: usize, w: usize) -> Result<T, BlobError> {
        let offset = self.offset(n, c, h, w)?;
        Ok(self.diff.cpu_data()[offset])
    }

    /// Host values.
    pub fn cpu_data(&mut self) -> &[T] {
        self.data.cpu_data()
    }

    /// Host values for writing.
    pub fn mutable_cpu_data(&mut self) -> &mut [T] {
        self.data.mutable_cpu_data()
    }

    /// Host gradients.
    pub fn cpu_diff(&mut self) -> &[T] {
        self.diff.cpu_data()
    }

    /// Host gradients for writing.
    pub fn mutable_cpu_diff(&mut self) -> &mut [T] {
        self.diff.mutable_cpu_data()
    }

    /// Device values.
    pub fn device_data(&mut self) -> &[T] {
        self.data.device_data()
    }

    /// Device values for writing.
    pub fn mutable_device_data(&mut self) -> &mut [T] {
        self.data.mutable_device_data()
    }

    /// Device gradients.
    pub fn device_diff(&mut self) -> &[T] {
        self.diff.device_data()
    }

    /// Device gradients for writing.
    pub fn mutable_device_diff(&mut self) -> &mut [T] {
        self.diff.mutable_device_data()
    }

    /// Returns the values resident on `device`.
    pub fn data(&mut self, device: Device) -> &[T] {
        self.data.data(device)
    }

    /// Returns the values resident on `device` for writing.
    pub fn mutable_data(&mut self, device: Device) -> &mut [T] {
        self.data.mutable_data(device)
    }

    /// Returns the gradients resident on `device`.
    pub fn diff(&mut self, device: Device) -> &[T] {
        self.diff.data(device)
    }

    /// Returns the gradients resident on `device` for writing.
    pub fn mutable_diff(&mut self, device: Device) -> &mut [T] {
        self.diff.mutable_data(device)
    }

    /// Returns the values on `device` together with the gradients on `device` for writing.
    pub fn data_and_mutable_diff(&mut self, device: Device) -> (&[T], &mut [T]) {
        let Self { data, diff, .. } = self;
        (data.data(device), diff.mutable_data(device))
    }

    /// Copies the values, or the gradients if `copy_diff` is set, from `source`.
    ///
    /// # Errors
    ///
    /// Returns an error if the shapes differ and `reshape` is not set.
    pub fn copy_from(
        &mut self,
        source: &mut Blob<T>,
        copy_diff: bool,
        reshape: bool,
    ) -> Result<(), BlobError> {
        if source.shape != self.shape {
            if !reshape {
                return Err(BlobError::ShapeMismatch(self.shape, source.shape));
            }
            self.reshape_like(source);
        }
        if copy_diff {
            self.diff.mutable_cpu_data().copy_from_slice(source.diff.cpu_data());
        } else {
            self.data.mutable_cpu_data().copy_from_slice(source.data.cpu_data());
        }
        Ok(())
    }
}
