//! Classification losses. Both take an `(N, C)` score matrix and `N` labels
//! in `[0, C)` and return the mean loss with its gradient w.r.t. the scores.

use crate::error::{Error, Result};
use ndarray::{Array1, Array2, Axis};

fn check_labels(op: &'static str, x: &Array2<f64>, y: &Array1<usize>) -> Result<()> {
    let (n, classes) = x.dim();
    if n == 0 {
        return Err(Error::shape(op, "score matrix has no rows"));
    }
    if y.len() != n {
        return Err(Error::shape(
            op,
            format!("{} labels for {} score rows", y.len(), n),
        ));
    }
    if let Some(&label) = y.iter().find(|&&label| label >= classes) {
        return Err(Error::LabelOutOfRange { op, label, classes });
    }
    Ok(())
}

/// Multiclass SVM (hinge) loss with margin 1.
///
/// For each example, every wrong class contributes
/// `max(0, score - correct_score + 1)`; the loss is the mean over examples of
/// these sums. In the gradient each positive margin adds `1 / N` to its class
/// and `-1 / N` to the correct class.
pub fn svm_loss(x: &Array2<f64>, y: &Array1<usize>) -> Result<(f64, Array2<f64>)> {
    check_labels("svm_loss", x, y)?;
    let n = x.nrows() as f64;

    let mut margins = Array2::<f64>::zeros(x.raw_dim());
    for ((mut margin_row, score_row), &label) in margins
        .outer_iter_mut()
        .zip(x.outer_iter())
        .zip(y.iter())
    {
        let correct = score_row[label];
        margin_row.assign(&score_row.mapv(|s| (s - correct + 1.0).max(0.0)));
        margin_row[label] = 0.0;
    }
    let loss = margins.sum() / n;

    let mut dx = margins.mapv(|m| if m > 0.0 { 1.0 } else { 0.0 });
    for (mut row, &label) in dx.outer_iter_mut().zip(y.iter()) {
        let positive = row.sum();
        row[label] -= positive;
    }
    dx /= n;
    Ok((loss, dx))
}

/// Softmax cross-entropy loss.
///
/// Scores are shifted by their row maximum before exponentiating. The loss is
/// the mean negative log-probability of the correct class; the gradient is
/// `(softmax - one_hot(y)) / N`.
pub fn softmax_loss(x: &Array2<f64>, y: &Array1<usize>) -> Result<(f64, Array2<f64>)> {
    check_labels("softmax_loss", x, y)?;
    let n = x.nrows() as f64;

    let row_max = x.fold_axis(Axis(1), f64::NEG_INFINITY, |m, &v| m.max(v));
    let shifted = x - &row_max.insert_axis(Axis(1));
    let log_sum = shifted.mapv(f64::exp).sum_axis(Axis(1)).mapv(f64::ln);
    let log_probs = shifted - &log_sum.insert_axis(Axis(1));

    let loss = -y
        .iter()
        .enumerate()
        .map(|(i, &label)| log_probs[[i, label]])
        .sum::<f64>()
        / n;

    let mut dx = log_probs.mapv(f64::exp);
    for (mut row, &label) in dx.outer_iter_mut().zip(y.iter()) {
        row[label] -= 1.0;
    }
    dx /= n;
    Ok((loss, dx))
}
