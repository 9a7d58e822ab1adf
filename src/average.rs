//! Fixed-window running average used to smooth raw GPU timestamps.

/// Numeric sample type the tracker can average.
///
/// Integers saturate instead of wrapping so a huge timestamp can never turn
/// the running sum into garbage.
pub trait Sample: Copy + PartialOrd + Default {
    /// `sum + (incoming - outgoing)`; callers guarantee `incoming >= outgoing`.
    fn accumulate(sum: Self, incoming: Self, outgoing: Self) -> Self;
    fn divide(sum: Self, count: usize) -> Self;
}

macro_rules! impl_sample_int {
    ($($t:ty),*) => {$(
        impl Sample for $t {
            #[inline]
            fn accumulate(sum: Self, incoming: Self, outgoing: Self) -> Self {
                sum.saturating_add(incoming - outgoing)
            }
            #[inline]
            fn divide(sum: Self, count: usize) -> Self {
                sum / count as $t
            }
        }
    )*};
}

macro_rules! impl_sample_float {
    ($($t:ty),*) => {$(
        impl Sample for $t {
            #[inline]
            fn accumulate(sum: Self, incoming: Self, outgoing: Self) -> Self {
                sum + (incoming - outgoing)
            }
            #[inline]
            fn divide(sum: Self, count: usize) -> Self {
                sum / count as $t
            }
        }
    )*};
}

impl_sample_int!(u32, u64);
impl_sample_float!(f32, f64);

/// Circular buffer of `window` samples with an O(1) running sum.
///
/// A sample smaller than the one it would evict means the counter restarted
/// or wrapped; the whole tracker is cleared before the sample is taken. An
/// equal sample is not a reset.
#[derive(Debug, Clone)]
pub struct AverageValue<T: Sample> {
    slots: Vec<T>,
    cursor: usize,
    running_sum: T,
    average: T,
}

impl<T: Sample> AverageValue<T> {
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            slots: vec![T::default(); window],
            cursor: 0,
            running_sum: T::default(),
            average: T::default(),
        }
    }

    pub fn window(&self) -> usize {
        self.slots.len()
    }

    pub fn add_value(&mut self, value: T) {
        if value < self.slots[self.cursor] {
            self.reset();
        }
        let outgoing = self.slots[self.cursor];
        self.running_sum = T::accumulate(self.running_sum, value, outgoing);
        self.slots[self.cursor] = value;
        self.cursor = (self.cursor + 1) % self.slots.len();
        // a zero sum keeps the previous average so a transient reset does not read as 0
        if self.running_sum > T::default() {
            self.average = T::divide(self.running_sum, self.slots.len());
        }
    }

    pub fn current_average(&self) -> T {
        self.average
    }

    pub fn reset(&mut self) {
        self.slots.iter_mut().for_each(|s| *s = T::default());
        self.cursor = 0;
        self.running_sum = T::default();
        self.average = T::default();
    }
}
