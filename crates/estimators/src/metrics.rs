//! Classification metrics

use std::collections::BTreeMap;

/// Accuracy plus support-weighted precision, recall and F1
///
/// Labels are class indices. A class with no predicted (or no true) samples
/// contributes zero precision (or recall) instead of dividing by zero.
pub fn classification_metrics(y_true: &[usize], y_pred: &[usize]) -> BTreeMap<String, f64> {
    let mut metrics = BTreeMap::new();
    let n = y_true.len().min(y_pred.len());
    if n == 0 {
        for name in ["accuracy", "precision", "recall", "f1"] {
            metrics.insert(name.to_string(), 0.0);
        }
        return metrics;
    }

    let n_classes = y_true.iter().chain(y_pred.iter()).copied().max().unwrap_or(0) + 1;
    let mut true_positive = vec![0usize; n_classes];
    let mut predicted = vec![0usize; n_classes];
    let mut support = vec![0usize; n_classes];

    for (&t, &p) in y_true.iter().zip(y_pred.iter()) {
        support[t] += 1;
        predicted[p] += 1;
        if t == p {
            true_positive[t] += 1;
        }
    }

    let correct: usize = true_positive.iter().sum();
    let (mut precision, mut recall, mut f1) = (0.0, 0.0, 0.0);
    for class in 0..n_classes {
        if support[class] == 0 {
            continue;
        }
        let weight = support[class] as f64 / n as f64;
        let p = ratio(true_positive[class], predicted[class]);
        let r = ratio(true_positive[class], support[class]);
        let f = if p + r > 0.0 { 2.0 * p * r / (p + r) } else { 0.0 };
        precision += weight * p;
        recall += weight * r;
        f1 += weight * f;
    }

    metrics.insert("accuracy".to_string(), correct as f64 / n as f64);
    metrics.insert("precision".to_string(), precision);
    metrics.insert("recall".to_string(), recall);
    metrics.insert("f1".to_string(), f1);
    metrics
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}
