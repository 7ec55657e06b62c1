// src/utils/mod.rs
use ndarray::ArrayView1;

/// Combinations C(n, k) = n! / (k! * (n-k)!), as a float.
pub fn n_choose_k(n: usize, k: usize) -> f64 {
    if k > n {
        return 0.0;
    }
    if k == 0 || k == n {
        return 1.0;
    }
    // C(n, k) = C(n, n-k); keep k small
    let eff_k = if k > n / 2 { n - k } else { k };

    let mut res = 1.0;
    for i in 0..eff_k {
        res *= (n - i) as f64;
        res /= (i + 1) as f64;
    }
    res
}

/// Index of the largest value; the lowest index wins ties.
pub fn argmax(values: ArrayView1<'_, f64>) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

const LOGIT_EPS: f64 = 1e-7;

/// log-odds, with `p` clamped away from 0 and 1 so the result stays finite.
pub fn logit(p: f64) -> f64 {
    let p = p.clamp(LOGIT_EPS, 1.0 - LOGIT_EPS);
    (p / (1.0 - p)).ln()
}
