use std::fmt;

use serde::{Deserialize, Serialize};

use super::Metric;

/// Host side `num_classes x num_classes` counts, rows are targets, columns predictions.
///
/// Predictions outside `[0, num_classes)` are misses of their target row and are
/// kept in `misses`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfusionMatrix {
    num_classes: usize,
    ignore_index: Option<i64>,
    counts: Vec<u64>,
    misses: Vec<u64>,
}

impl ConfusionMatrix {
    pub fn new(num_classes: usize, ignore_index: Option<usize>) -> Self {
        Self {
            num_classes,
            ignore_index: ignore_index.map(|index| index as i64),
            counts: vec![0; num_classes * num_classes],
            misses: vec![0; num_classes],
        }
    }

    fn class(&self, value: i64) -> Option<usize> {
        if value < 0 || value as usize >= self.num_classes {
            None
        } else {
            Some(value as usize)
        }
    }

    pub fn update(&mut self, preds: &[i64], targets: &[i64]) {
        for (&pred, &target) in preds.iter().zip(targets) {
            if Some(target) == self.ignore_index {
                continue;
            }
            let Some(row) = self.class(target) else {
                continue;
            };
            match self.class(pred) {
                Some(col) => self.counts[row * self.num_classes + col] += 1,
                None => self.misses[row] += 1,
            }
        }
    }

    pub fn reset(&mut self) {
        self.counts.iter_mut().for_each(|count| *count = 0);
        self.misses.iter_mut().for_each(|count| *count = 0);
    }

    pub fn get(&self, target: usize, pred: usize) -> u64 {
        self.counts[target * self.num_classes + pred]
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum::<u64>() + self.misses.iter().sum::<u64>()
    }

    fn diagonal(&self) -> u64 {
        (0..self.num_classes).map(|c| self.get(c, c)).sum()
    }

    fn target_count(&self, class: usize) -> u64 {
        (0..self.num_classes).map(|p| self.get(class, p)).sum::<u64>() + self.misses[class]
    }

    fn pred_count(&self, class: usize) -> u64 {
        (0..self.num_classes).map(|t| self.get(t, class)).sum()
    }

    pub fn accuracy(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            total => self.diagonal() as f64 / total as f64,
        }
    }

    /// Mean intersection over union of the classes present in targets or predictions.
    pub fn mean_iou(&self) -> f64 {
        let ious: Vec<f64> = (0..self.num_classes)
            .filter_map(|c| {
                let hits = self.get(c, c);
                let union = self.target_count(c) + self.pred_count(c) - hits;
                (union > 0).then(|| hits as f64 / union as f64)
            })
            .collect();

        mean(&ious)
    }

    /// Unweighted mean of per class F1 over the classes present in targets or predictions.
    pub fn macro_f1(&self) -> f64 {
        let scores: Vec<f64> = (0..self.num_classes)
            .filter_map(|c| {
                let hits = self.get(c, c);
                let denominator = self.target_count(c) + self.pred_count(c);
                (denominator > 0).then(|| 2.0 * hits as f64 / denominator as f64)
            })
            .collect();

        mean(&scores)
    }

    pub fn cohen_kappa(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        let total = total as f64;
        let observed = self.diagonal() as f64 / total;
        let expected = (0..self.num_classes)
            .map(|c| self.target_count(c) as f64 * self.pred_count(c) as f64)
            .sum::<f64>()
            / (total * total);

        if expected >= 1.0 {
            0.0
        } else {
            (observed - expected) / (1.0 - expected)
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Scalar segmentation metrics available from configuration.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MetricKind {
    OverallAccuracy,
    MeanIou,
    MacroF1,
    CohenKappa,
}

impl MetricKind {
    pub fn name(&self) -> &'static str {
        match self {
            MetricKind::OverallAccuracy => "oa",
            MetricKind::MeanIou => "miou",
            MetricKind::MacroF1 => "f1",
            MetricKind::CohenKappa => "kappa",
        }
    }

    pub fn build(self, num_classes: usize, ignore_index: Option<usize>) -> Box<dyn Metric> {
        Box::new(ConfusionMetric {
            kind: self,
            confusion: ConfusionMatrix::new(num_classes, ignore_index),
        })
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A [`MetricKind`] reduced from its own confusion matrix.
#[derive(Clone, Debug)]
pub struct ConfusionMetric {
    kind: MetricKind,
    confusion: ConfusionMatrix,
}

impl Metric for ConfusionMetric {
    fn name(&self) -> &str {
        self.kind.name()
    }

    fn update(&mut self, preds: &[i64], targets: &[i64]) {
        self.confusion.update(preds, targets);
    }

    fn compute(&self) -> f64 {
        match self.kind {
            MetricKind::OverallAccuracy => self.confusion.accuracy(),
            MetricKind::MeanIou => self.confusion.mean_iou(),
            MetricKind::MacroF1 => self.confusion.macro_f1(),
            MetricKind::CohenKappa => self.confusion.cohen_kappa(),
        }
    }

    fn reset(&mut self) {
        self.confusion.reset();
    }

    fn fresh(&self) -> Box<dyn Metric> {
        let mut metric = self.clone();
        metric.reset();
        Box::new(metric)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn counts_targets_by_row() {
        let mut cm = ConfusionMatrix::new(3, None);
        cm.update(&[0, 1, 1, 2], &[0, 1, 2, 2]);

        assert_eq!(cm.get(2, 1), 1);
        assert_eq!(cm.get(2, 2), 1);
        assert_eq!(cm.total(), 4);
        assert!(close(cm.accuracy(), 0.75));
    }

    #[test]
    fn ignored_and_out_of_range_targets_are_skipped() {
        let mut cm = ConfusionMatrix::new(2, Some(255));
        cm.update(&[0, 1, 0], &[255, 1, 7]);

        assert_eq!(cm.total(), 1);
        assert!(close(cm.accuracy(), 1.0));
    }

    #[test]
    fn out_of_range_predictions_are_misses() {
        let mut cm = ConfusionMatrix::new(3, None);
        cm.update(&[1, 4], &[1, 1]);

        assert_eq!(cm.total(), 2);
        assert!(close(cm.accuracy(), 0.5));
        // class 1: 1 hit out of 2 targets and 1 prediction
        assert!(close(cm.mean_iou(), 0.5));
        assert!(close(cm.macro_f1(), 2.0 / 3.0));

        cm.reset();
        assert_eq!(cm.total(), 0);
    }

    #[test]
    fn mean_iou_skips_absent_classes() {
        let mut cm = ConfusionMatrix::new(4, None);
        // class 0: 2 hits, 1 false negative -> 2/3; class 1: 1 hit, 1 false positive -> 1/2
        cm.update(&[0, 0, 1, 1], &[0, 0, 0, 1]);

        assert!(close(cm.mean_iou(), (2.0 / 3.0 + 0.5) / 2.0));
    }

    #[test]
    fn macro_f1_and_kappa() {
        let mut cm = ConfusionMatrix::new(2, None);
        cm.update(&[0, 0, 1, 1], &[0, 1, 1, 1]);

        // class 0: 2*1/(1+2), class 1: 2*2/(3+2)
        assert!(close(cm.macro_f1(), (2.0 / 3.0 + 0.8) / 2.0));

        // po = 0.75, pe = (1*2 + 3*2) / 16 = 0.5
        assert!(close(cm.cohen_kappa(), 0.5));
    }

    #[test]
    fn empty_matrix_computes_zero() {
        let cm = ConfusionMatrix::new(3, None);

        assert_eq!(cm.accuracy(), 0.0);
        assert_eq!(cm.mean_iou(), 0.0);
        assert_eq!(cm.macro_f1(), 0.0);
        assert_eq!(cm.cohen_kappa(), 0.0);
    }

    #[test]
    fn fresh_metric_starts_empty() {
        let mut metric = MetricKind::OverallAccuracy.build(2, None);
        metric.update(&[1, 1], &[1, 0]);

        let fresh = metric.fresh();
        assert!(close(metric.compute(), 0.5));
        assert_eq!(fresh.compute(), 0.0);
        assert_eq!(fresh.name(), "oa");
    }
}
