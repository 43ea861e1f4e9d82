//! LED color engine: rainbow table and sensor gradients.

use std::sync::{Arc, Mutex, MutexGuard};

/// Entries in the rainbow table.
pub const RAINBOW_TABLE_LEN: usize = 768;
const PHASE_LEN: usize = 128;

/// Temperature/load gradient stops, linearly interpolated.
pub const TEMP_GRADIENT: [(f32, [u8; 3]); 5] = [
    (30.0, [0, 255, 255]),
    (50.0, [0, 255, 0]),
    (70.0, [255, 255, 0]),
    (90.0, [255, 110, 0]),
    (100.0, [255, 0, 0]),
];

/// Generate the 768-entry rainbow: six 128-step phases around the hue circle.
pub fn generate_rainbow_table() -> Vec<[u8; 3]> {
    (0..RAINBOW_TABLE_LEN)
        .map(|i| {
            let phase = i / PHASE_LEN;
            let t = (255 * (i % PHASE_LEN) / (PHASE_LEN - 1)) as u8;
            match phase {
                0 => [255, t, 0],
                1 => [255 - t, 255, 0],
                2 => [0, 255, t],
                3 => [0, 255 - t, 255],
                4 => [t, 0, 255],
                _ => [255, 0, 255 - t],
            }
        })
        .collect()
}

fn lerp(a: [u8; 3], b: [u8; 3], t: f32) -> [u8; 3] {
    let t = t.clamp(0.0, 1.0);
    let mix = |x: u8, y: u8| (x as f32 + (y as f32 - x as f32) * t) as i32 as u8;
    [mix(a[0], b[0]), mix(a[1], b[1]), mix(a[2], b[2])]
}

/// Map a sensor value onto a gradient, clamping outside the stop range.
pub fn color_for_value(value: f32, gradient: &[(f32, [u8; 3])]) -> [u8; 3] {
    let (Some(first), Some(last)) = (gradient.first(), gradient.last()) else {
        return [0, 0, 0];
    };
    if value <= first.0 {
        return first.1;
    }
    if value >= last.0 {
        return last.1;
    }
    gradient
        .windows(2)
        .find(|w| w[0].0 <= value && value <= w[1].0)
        .map(|w| lerp(w[0].1, w[1].1, (value - w[0].0) / (w[1].0 - w[0].0)))
        .unwrap_or(last.1)
}

/// Process-wide rainbow table cache with explicit invalidation.
///
/// Cloning shares the same underlying cache.
#[derive(Debug, Clone, Default)]
pub struct ColorCache {
    table: Arc<Mutex<Option<Arc<Vec<[u8; 3]>>>>>,
}

impl ColorCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Arc<Vec<[u8; 3]>>>> {
        // A poisoned cache only ever holds a fully built table or None.
        self.table.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Rainbow table, generated on first use.
    pub fn rainbow_table(&self) -> Arc<Vec<[u8; 3]>> {
        let mut guard = self.lock();
        guard
            .get_or_insert_with(|| Arc::new(generate_rainbow_table()))
            .clone()
    }

    /// Rainbow color at `index`, wrapping around the table.
    pub fn rainbow(&self, index: usize) -> [u8; 3] {
        let table = self.rainbow_table();
        table[index % table.len()]
    }

    pub fn is_cached(&self) -> bool {
        self.lock().is_some()
    }

    /// Drop the cached table; the next lookup regenerates it.
    pub fn invalidate(&self) {
        *self.lock() = None;
    }
}
