//! Reverse discounted sums and advantage normalization

/// Floor for the standard deviation used when normalizing advantages
pub const STD_EPSILON: f64 = 1e-8;

/// Replace `xs` with its reverse discounted cumulative sum
///
/// x<sub>t</sub> ← x<sub>t</sub> + decay · x<sub>t+1</sub>, scanning back to front, where `tail` plays the
/// role of the element just past the end.
pub fn discount_cumsum(xs: &mut [f64], decay: f64, tail: f64) {
    let mut running = tail;
    for x in xs.iter_mut().rev() {
        running = *x + decay * running;
        *x = running;
    }
}

/// Write the one-step TD residuals δ<sub>t</sub> = r<sub>t</sub> + γ·V<sub>t+1</sub> − V<sub>t</sub> of a path into `out`
///
/// `bootstrap` is the value following the last step of the path.
///
/// **Panics** if the three slices differ in length
pub fn td_residuals(rewards: &[f64], values: &[f64], bootstrap: f64, gamma: f64, out: &mut [f64]) {
    assert_eq!(rewards.len(), values.len(), "one value per reward");
    assert_eq!(rewards.len(), out.len(), "one residual per reward");

    let next_values = values.iter().skip(1).chain(std::iter::once(&bootstrap));
    for (((delta, r), v), next_v) in out.iter_mut().zip(rewards).zip(values).zip(next_values) {
        *delta = r + gamma * next_v - v;
    }
}

/// Normalize `xs` in place to zero mean and unit sample standard deviation
///
/// The variance uses Bessel's correction (`n - 1` degrees of freedom); a single element has zero
/// spread.
///
/// **Returns** the `(mean, std)` used, with `std` floored at [`STD_EPSILON`]
pub fn normalize(xs: &mut [f64]) -> (f64, f64) {
    if xs.is_empty() {
        return (0.0, STD_EPSILON);
    }
    let n = xs.len() as f64;
    let mean = xs.iter().sum::<f64>() / n;
    let dof = (n - 1.0).max(1.0);
    let var = xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / dof;
    let std = var.sqrt().max(STD_EPSILON);
    for x in xs.iter_mut() {
        *x = (*x - mean) / std;
    }
    (mean, std)
}
