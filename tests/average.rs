use gpuzones::AverageValue;
use rand::{Rng, SeedableRng, rngs::StdRng};

#[test]
fn average_divides_by_the_full_window() {
    let mut avg = AverageValue::<u64>::new(4);
    avg.add_value(10);
    assert_eq!(avg.current_average(), 2);
    for v in [20, 30, 40] {
        avg.add_value(v);
    }
    assert_eq!(avg.current_average(), 25);

    // 10 is evicted
    avg.add_value(50);
    assert_eq!(avg.current_average(), 35);
}

#[test]
fn smaller_value_resets_the_window() {
    let mut avg = AverageValue::<u64>::new(3);
    for v in [100, 200, 300] {
        avg.add_value(v);
    }
    assert_eq!(avg.current_average(), 200);

    avg.add_value(50);
    assert_eq!(avg.current_average(), 16);
}

#[test]
fn equal_value_is_not_a_reset() {
    let mut avg = AverageValue::<u64>::new(2);
    avg.add_value(5);
    assert_eq!(avg.current_average(), 2);
    avg.add_value(5);
    assert_eq!(avg.current_average(), 5);
    avg.add_value(5);
    assert_eq!(avg.current_average(), 5);
}

#[test]
fn zero_window_is_clamped_to_one() {
    let mut avg = AverageValue::<u32>::new(0);
    assert_eq!(avg.window(), 1);
    avg.add_value(7);
    assert_eq!(avg.current_average(), 7);
}

#[test]
fn integer_sum_saturates() {
    let mut avg = AverageValue::<u64>::new(2);
    avg.add_value(u64::MAX);
    avg.add_value(u64::MAX);
    assert_eq!(avg.current_average(), u64::MAX / 2);
}

#[test]
fn float_samples_average() {
    let mut avg = AverageValue::<f64>::new(3);
    avg.add_value(1.5);
    avg.add_value(2.5);
    assert!((avg.current_average() - 4.0 / 3.0).abs() < 1e-12);
}

#[test]
fn explicit_reset_clears_everything() {
    let mut avg = AverageValue::<u64>::new(2);
    avg.add_value(8);
    avg.add_value(8);
    avg.reset();
    assert_eq!(avg.current_average(), 0);
    avg.add_value(4);
    assert_eq!(avg.current_average(), 2);
}

#[test]
fn nondecreasing_stream_tracks_the_last_window() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    for window in [1usize, 3, 8, 60] {
        let mut avg = AverageValue::<u64>::new(window);
        let mut seen = Vec::new();
        let mut value = 0u64;
        for _ in 0..500 {
            value += rng.random_range(0..1_000);
            avg.add_value(value);
            seen.push(value);

            let tail = &seen[seen.len().saturating_sub(window)..];
            let sum: u64 = tail.iter().sum();
            if sum > 0 {
                assert_eq!(avg.current_average(), sum / window as u64, "window {window}");
            }
        }
    }
}
