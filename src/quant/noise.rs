//! Background noise estimates from the median absolute differences of
//! neighbouring pixels.
//!
//! Each row contributes its median difference; the final estimate is the
//! median of the row values times a constant that turns the difference
//! statistic into a standard deviation for Gaussian noise.

use super::NullCheck;

const NOISE2_FACTOR: f64 = 1.0483579;
const NOISE3_FACTOR: f64 = 0.6052697;
const NOISE5_FACTOR: f64 = 0.1772048;

/// Result of the 5th order scan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseEstimate {
    /// Pixels that took part in the scan.
    pub ngood: usize,
    pub min: f64,
    pub max: f64,
    pub noise2: f64,
    pub noise3: f64,
    pub noise5: f64,
}

/// Result of the 3rd order scan when only the range is needed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Range {
    pub ngood: usize,
    pub min: f64,
    pub max: f64,
}

/// Walks one row, skipping nulls, keeping the running min and max.
struct RowCursor<'a> {
    row: &'a [f64],
    pos: usize,
    null_check: NullCheck,
}

impl<'a> RowCursor<'a> {
    fn new(row: &'a [f64], null_check: NullCheck) -> Self {
        Self {
            row,
            pos: 0,
            null_check,
        }
    }

    /// The next valid sample, or `None` at the end of the row.
    #[inline]
    fn next_valid(&mut self, min: &mut f64, max: &mut f64) -> Option<f64> {
        while self.pos < self.row.len() && self.null_check.is_null(self.row[self.pos]) {
            self.pos += 1;
        }
        let value = *self.row.get(self.pos)?;
        self.pos += 1;
        if value < *min {
            *min = value;
        }
        if value > *max {
            *max = value;
        }
        Some(value)
    }
}

/// Image too narrow for a difference window: only the range is scanned.
fn scan_range(data: &[f64], null_check: NullCheck) -> Range {
    let mut range = Range {
        ngood: 0,
        min: f64::MAX,
        max: -f64::MAX,
    };
    for &value in data.iter().filter(|&&v| !null_check.is_null(v)) {
        if value < range.min {
            range.min = value;
        }
        if value > range.max {
            range.max = value;
        }
        range.ngood += 1;
    }
    range
}

/// Lower median of `values` (the element at index `(n-1)/2` once sorted).
fn quick_select(values: &mut [f64]) -> f64 {
    let k = (values.len() - 1) / 2;
    let (_, median, _) = values.select_nth_unstable_by(k, f64::total_cmp);
    *median
}

/// Median of the per-row values; the mean of both middle elements when
/// their count is even.
fn median_of_rows(values: &mut [f64]) -> f64 {
    match values.len() {
        0 => 0.0,
        1 => values[0],
        n => {
            values.sort_unstable_by(f64::total_cmp);
            (values[(n - 1) / 2] + values[n / 2]) / 2.0
        }
    }
}

/// Folds images narrower than `min_width` pixels into a single row.
fn fold_narrow(nx: usize, ny: usize, min_width: usize) -> (usize, usize) {
    if nx < min_width {
        (nx * ny, 1)
    } else {
        (nx, ny)
    }
}

/// 2nd, 3rd and 5th order noise estimates together with the data range.
///
/// Rows with fewer than nine valid samples are skipped and their pixels are
/// not counted in `ngood`.
pub fn noise5(data: &[f64], nx: usize, ny: usize, null_check: NullCheck) -> NoiseEstimate {
    // the 9 pixel window needs rows at least that wide
    let (nx, ny) = fold_narrow(nx, ny, 9);

    if nx < 9 {
        let range = scan_range(&data[..nx], null_check);
        return NoiseEstimate {
            ngood: range.ngood,
            min: range.min,
            max: range.max,
            noise2: 0.0,
            noise3: 0.0,
            noise5: 0.0,
        };
    }

    let mut min = f64::MAX;
    let mut max = -f64::MAX;
    let mut ngood = 0;

    let mut differences2 = Vec::with_capacity(nx);
    let mut differences3 = Vec::with_capacity(nx);
    let mut differences5 = Vec::with_capacity(nx);
    let mut diffs2 = Vec::with_capacity(ny);
    let mut diffs3 = Vec::with_capacity(ny);
    let mut diffs5 = Vec::with_capacity(ny);

    'rows: for row in data[..nx * ny].chunks_exact(nx) {
        let mut cursor = RowCursor::new(row, null_check);

        // Prime the window with the first eight valid samples.
        let mut window = [0.0_f64; 9];
        for slot in window.iter_mut().take(8) {
            match cursor.next_valid(&mut min, &mut max) {
                Some(value) => *slot = value,
                None => continue 'rows,
            }
        }

        differences2.clear();
        differences3.clear();
        differences5.clear();

        while let Some(v9) = cursor.next_valid(&mut min, &mut max) {
            window[8] = v9;
            let [v1, _, v3, v4, v5, v6, v7, _, v9] = window;

            if !(v5 == v6 && v6 == v7) {
                differences2.push((v5 - v7).abs());
            }

            if !(v3 == v4 && v4 == v5 && v5 == v6 && v6 == v7) {
                differences3.push((2.0 * v5 - v3 - v7).abs());
                differences5.push((6.0 * v5 - 4.0 * v3 - 4.0 * v7 + v1 + v9).abs());
            } else {
                // constant background
                ngood += 1;
            }

            window.copy_within(1.., 0);
        }

        // There are 8 more pixels than differences.
        let nvals = differences3.len();
        ngood += nvals + 8;

        match nvals {
            0 => continue,
            1 => {
                if differences2.len() == 1 {
                    diffs2.push(differences2[0]);
                }
                diffs3.push(differences3[0]);
                diffs5.push(differences5[0]);
            }
            _ => {
                if differences2.len() > 1 {
                    diffs2.push(quick_select(&mut differences2));
                }
                diffs3.push(quick_select(&mut differences3));
                diffs5.push(quick_select(&mut differences5));
            }
        }
    }

    NoiseEstimate {
        ngood,
        min,
        max,
        noise2: NOISE2_FACTOR * median_of_rows(&mut diffs2),
        noise3: NOISE3_FACTOR * median_of_rows(&mut diffs3),
        noise5: NOISE5_FACTOR * median_of_rows(&mut diffs5),
    }
}

/// Data range and good pixel count using the 3rd order window.
///
/// Rows with fewer than five valid samples are skipped and their pixels are
/// not counted in `ngood`.
pub fn range3(data: &[f64], nx: usize, ny: usize, null_check: NullCheck) -> Range {
    let (nx, ny) = fold_narrow(nx, ny, 5);

    if nx < 5 {
        return scan_range(&data[..nx], null_check);
    }

    let mut range = Range {
        ngood: 0,
        min: f64::MAX,
        max: -f64::MAX,
    };

    'rows: for row in data[..nx * ny].chunks_exact(nx) {
        let mut cursor = RowCursor::new(row, null_check);

        let mut window = [0.0_f64; 5];
        for slot in window.iter_mut().take(4) {
            match cursor.next_valid(&mut range.min, &mut range.max) {
                Some(value) => *slot = value,
                None => continue 'rows,
            }
        }

        let mut nvals = 0;
        while let Some(v5) = cursor.next_valid(&mut range.min, &mut range.max) {
            window[4] = v5;
            let [v1, v2, v3, v4, v5] = window;
            if !(v1 == v2 && v2 == v3 && v3 == v4 && v4 == v5) {
                nvals += 1;
            } else {
                range.ngood += 1;
            }
            window.copy_within(1.., 0);
        }

        range.ngood += nvals + 4;
    }

    range
}
