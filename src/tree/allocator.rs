/// Source of the path buffers every entity owns.
///
/// Entity creation goes through this seam so an allocation failure surfaces
/// as [`TreeError::MemoryError`](super::TreeError::MemoryError) instead of
/// aborting the process.
pub trait PathAllocator {
    /// Returns an empty string able to hold `capacity` bytes, or `None` if
    /// the buffer could not be reserved.
    fn allocate(&mut self, capacity: usize) -> Option<String>;
}

/// Reserves path buffers on the global heap without aborting on failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeapAllocator;

impl PathAllocator for HeapAllocator {
    fn allocate(&mut self, capacity: usize) -> Option<String> {
        let mut buffer = String::new();
        buffer.try_reserve_exact(capacity).ok()?;
        Some(buffer)
    }
}
