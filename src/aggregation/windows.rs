//! Windowing strategies that supply slices to primitives.

/// Fixed-lag trailing window (e.g., the 3-month revenue average).
#[derive(Debug, Clone, Copy)]
pub struct FixedWindow {
    size: usize,
}

impl FixedWindow {
    /// Creates a fixed window that always includes `size` most recent values
    /// (or fewer when the prefix is shorter than `size`).
    pub fn new(size: usize) -> Self {
        FixedWindow { size: size.max(1) }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Applies the given primitive to every prefix window ending at each index.
    pub fn apply<F>(&self, data: &[f64], mut primitive: F) -> Vec<f64>
    where
        F: FnMut(&[f64]) -> f64,
    {
        if data.is_empty() {
            return Vec::new();
        }

        let mut result = Vec::with_capacity(data.len());
        for index in 0..data.len() {
            let start = (index + 1).saturating_sub(self.size);
            result.push(primitive(&data[start..=index]));
        }

        result
    }
}
