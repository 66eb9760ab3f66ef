use super::shift::{Shift, ShiftRecord};

/// Re-anchor every plane to the first plane's coordinate frame.
///
/// For each plane the mean recorded shift (unset entries excluded) is
/// compared with plane 0's mean; the difference, truncated toward zero, is
/// subtracted from all of that plane's shifts. Returns the per-plane
/// corrections that were applied.
pub fn align_planes(record: &mut ShiftRecord) -> Vec<Shift> {
    let means = mean_shifts(record);
    let anchor = match means.first().copied().flatten() {
        Some(m) => m,
        None => return vec![Shift::ZERO; means.len()],
    };

    let corrections: Vec<Shift> = means
        .iter()
        .map(|mean| match mean {
            Some((dy, dx)) => Shift::new((dy - anchor.0) as i64, (dx - anchor.1) as i64),
            None => Shift::ZERO,
        })
        .collect();

    for (plane, &delta) in corrections.iter().enumerate() {
        if delta != Shift::ZERO {
            record.offset_plane(plane, delta);
        }
    }
    corrections
}

/// Per-plane mean (dy, dx) over assigned entries; `None` for planes with none.
pub fn mean_shifts(record: &ShiftRecord) -> Vec<Option<(f64, f64)>> {
    (0..record.num_planes())
        .map(|plane| {
            let (count, sum_y, sum_x) = record
                .shifts()
                .iter()
                .flat_map(|table| table.column(plane).into_iter().flatten().copied())
                .fold((0usize, 0i64, 0i64), |(n, sy, sx), s| {
                    (n + 1, sy + s.dy, sx + s.dx)
                });
            (count > 0).then(|| (sum_y as f64 / count as f64, sum_x as f64 / count as f64))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_plane_offset_removed() {
        let mut record = ShiftRecord::new(&[3], 2);
        for f in 0..3 {
            record.set(0, f, 0, Shift::new(f as i64, 0), 0.9).unwrap();
            record.set(0, f, 1, Shift::new(f as i64 + 5, -3), 0.9).unwrap();
        }
        let corrections = align_planes(&mut record);
        assert_eq!(corrections, vec![Shift::ZERO, Shift::new(5, -3)]);
        for f in 0..3 {
            assert_eq!(record.get(0, f, 1), record.get(0, f, 0));
        }
    }

    #[test]
    fn test_fractional_difference_truncates_toward_zero() {
        let mut record = ShiftRecord::new(&[2], 2);
        record.set(0, 0, 0, Shift::ZERO, 1.0).unwrap();
        record.set(0, 1, 0, Shift::ZERO, 1.0).unwrap();
        record.set(0, 0, 1, Shift::new(-1, 1), 1.0).unwrap();
        record.set(0, 1, 1, Shift::new(-2, 2), 1.0).unwrap();
        // Means differ by (-1.5, 1.5).
        let corrections = align_planes(&mut record);
        assert_eq!(corrections[1], Shift::new(-1, 1));
        assert_eq!(record.get(0, 1, 1), Some(Shift::new(-1, 1)));
    }

    #[test]
    fn test_unset_entries_are_ignored() {
        let mut record = ShiftRecord::new(&[2], 2);
        record.set(0, 0, 0, Shift::new(2, 2), 1.0).unwrap();
        record.set(0, 0, 1, Shift::new(4, 4), 1.0).unwrap();
        let corrections = align_planes(&mut record);
        assert_eq!(corrections[1], Shift::new(2, 2));
        assert_eq!(record.get(0, 1, 1), None);
    }
}
