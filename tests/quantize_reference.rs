//! Quantizer output checked against integers produced by CFITSIO for the
//! same input, so tiles written here dequantize identically elsewhere.

use fitscomp::quant::{NULL_VALUE, ZERO_VALUE};
use fitscomp::{Dither, NullCheck, Quantizer};

const NULL: f64 = -9.1191291391491004e-36;

/// `sin(i / 100) * 1000` for the first thousand indices.
fn matrix() -> Vec<f64> {
    (0..1000).map(|i| (i as f64 / 100.0).sin() * 1000.0).collect()
}

fn quantizer(null_check: NullCheck, dither: Dither) -> Quantizer {
    Quantizer::new(null_check, dither)
}

#[test]
fn test_fixed_step_with_dither_2() {
    let mut q = quantizer(NullCheck::Off, Dither::subtractive_2(3942));
    let result = q.quantize(&matrix(), 12, 2, -4.0).unwrap();

    assert_eq!(
        result.int_data,
        vec![
            -2147483646, -2147483634, -2147483632, -2147483629, -2147483627, -2147483625,
            -2147483622, -2147483619, -2147483617, -2147483615, -2147483612, -2147483609,
            -2147483607, -2147483604, -2147483602, -2147483599, -2147483597, -2147483595,
            -2147483593, -2147483590, -2147483587, -2147483585, -2147483582, -2147483580,
        ]
    );
    // zero sample keeps its own marker
    assert_eq!(result.int_data[0], ZERO_VALUE);
    assert_eq!(result.state.scale, 4.0);
    assert_eq!(result.state.zero, 8589934548.0);
    assert_eq!(result.state.int_min, -2147483637);
    assert_eq!(result.state.int_max, -2147483580);
}

#[test]
fn test_default_q_level_zero_seed() {
    // negative zero counts as "use the default of 4"
    let mut q = quantizer(NullCheck::Off, Dither::subtractive_2(0));
    let result = q.quantize(&matrix(), 9, 2, -0.0).unwrap();

    assert_eq!(
        result.int_data,
        vec![
            -2147483637, -2130848351, -2114214728, -2097584433, -2080959127, -2064340473,
            -2047730134, -2031129770, -2014541041, -1997965607, -1981405124, -1964861249,
            -1948335636, -1931829938, -1915345804, -1898884885, -1882448825, -1866039268,
        ]
    );
    assert_eq!(result.state.scale, 6.01121812296506193330e-07);
    assert_eq!(result.state.zero, 1.29089925575053234752e+03);
    assert_eq!(result.state.int_min, -2147483637);
    assert_eq!(result.state.int_max, -1866039268);
}

#[test]
fn test_too_few_samples_for_noise() {
    let mut q = quantizer(NullCheck::Off, Dither::none());
    assert!(q.quantize(&matrix(), 3, 2, 4.0).is_none());

    let mut data = matrix();
    data[5] = NULL;
    let mut q = quantizer(NullCheck::Value(NULL), Dither::none());
    assert!(q.quantize(&data, 3, 2, 4.0).is_none());
}

#[test]
fn test_single_pixel_declined() {
    let mut q = quantizer(NullCheck::Value(NULL), Dither::none());
    assert!(q.quantize(&matrix(), 1, 1, 4.0).is_none());
}

#[test]
fn test_nulls_without_dither() {
    let mut data = matrix();
    data[11] = NULL;
    data[12] = NULL;
    let mut q = quantizer(NullCheck::Value(NULL), Dither::none());
    let result = q.quantize(&data, 12, 2, 4.0).unwrap();

    assert_eq!(
        result.int_data,
        vec![
            -2147483637, -2135162120, -2122841835, -2110524015, -2098209890, -2085900693,
            -2073597653, -2061302003, -2049014970, -2036737785, -2024471673, NULL_VALUE, NULL_VALUE,
            -1987752046, -1975542486, -1963350120, -1951176167, -1939021845, -1926888368,
            -1914776951, -1902688805, -1890625137, -1878587156, -1866576064,
        ]
    );
    assert_eq!(result.state.scale, 8.11574856349585578526e-07);
    assert_eq!(result.state.zero, 1.74284372421136049525e+03);
    assert_eq!(result.state.int_min, -2147483637);
    assert_eq!(result.state.int_max, -1866576064);
}

#[test]
fn test_all_null() {
    let data = vec![NULL; 1000];
    let mut q = quantizer(NullCheck::Value(NULL), Dither::none());
    let result = q.quantize(&data, 12, 2, 4.0).unwrap();

    assert!(result.int_data.iter().all(|&v| v == NULL_VALUE));
    assert_eq!(result.int_data.len(), 24);
    assert_eq!(result.state.scale, 0.25);
    assert_eq!(result.state.zero, 536870909.25);
    assert_eq!(result.state.int_min, -2147483637);
    assert_eq!(result.state.int_max, -2147483633);
}

#[test]
fn test_null_runs_with_alternating_dither() {
    let prefix = [
        -2139144306, -2130805810, -2122468981, -2114134654, -2105803661, -2097476837, -2089155012,
    ];
    let tail = [
        -2047650006, -2039375639, -2031112082, -2022860162, -2014620704, -2006394533, -1998182470,
        -1989985337, -1981803954, -1973639139, -1965491708, -1957362476,
    ];

    for index in (1..=8).rev() {
        let mut data = matrix();
        data[index..12].fill(NULL);
        let dither = if index % 2 == 0 {
            Dither::subtractive_2(3942)
        } else {
            Dither::subtractive_1(3942)
        };
        let mut q = quantizer(NullCheck::Value(NULL), dither);
        let result = q.quantize(&data, 12, 2, 4.0).unwrap();

        let mut expected = Vec::with_capacity(24);
        // the first sample is exactly zero
        expected.push(if index % 2 == 0 { ZERO_VALUE } else { -2147483637 });
        expected.extend_from_slice(&prefix[..index - 1]);
        expected.resize(12, NULL_VALUE);
        expected.extend_from_slice(&tail);

        assert_eq!(result.int_data, expected, "nulls from index {}", index);
        assert_eq!(result.state.scale, 1.19911703788955035348e-06);
        assert_eq!(result.state.zero, 2.57508421771571829595e+03);
        assert_eq!(result.state.int_min, -2147483637);
        assert_eq!(result.state.int_max, -1957362476);
    }
}

#[test]
fn test_unquantize_restores_nulls() {
    let mut data = matrix();
    data[11] = NULL;
    let mut q = quantizer(NullCheck::Value(NULL), Dither::subtractive_1(3942));
    let result = q.quantize(&data, 12, 2, 4.0).unwrap();
    let back = q.unquantize(&result.int_data, result.state.scale, result.state.zero);

    assert_eq!(back[11], NULL);
    for (i, (&orig, &got)) in data[..24].iter().zip(&back).enumerate() {
        if i != 11 {
            assert!((orig - got).abs() <= result.state.scale, "sample {}: {} vs {}", i, orig, got);
        }
    }
}

#[test]
fn test_narrow_tiles_match_single_row() {
    let data = matrix();
    let mut narrow = quantizer(NullCheck::Off, Dither::subtractive_1(3942));
    let mut row = narrow.clone();
    let by_rows = narrow.quantize(&data, 8, 10, 4.0).unwrap();
    let folded = row.quantize(&data, 80, 1, 4.0).unwrap();

    assert_eq!(by_rows, folded);
    assert!(by_rows.state.noise3 > 0.0);
}

#[test]
fn test_narrow_tile_with_null_first_row() {
    let mut data = matrix();
    data[..6].fill(f64::NAN);
    let mut narrow = quantizer(NullCheck::NaN, Dither::none());
    let mut row = narrow.clone();
    let by_rows = narrow.quantize(&data, 6, 4, 4.0).unwrap();
    let folded = row.quantize(&data, 24, 1, 4.0).unwrap();

    // the valid rows set the scaling, not the all-null fallback
    assert_ne!(by_rows.state.scale, 0.25);
    assert_eq!(by_rows.state, folded.state);
    assert_eq!(by_rows.int_data, folded.int_data);
    assert!(by_rows.int_data[..6].iter().all(|&v| v == NULL_VALUE));
    assert!(by_rows.int_data[6..].iter().all(|&v| v > ZERO_VALUE));
}
