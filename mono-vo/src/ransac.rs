use log::*;
use rand::{seq::index, Rng};
use vo_core::sample_consensus::{Consensus, Estimator, Model};

/// Classic random sample consensus with an adaptive stopping criterion.
///
/// Minimal samples are drawn until the probability of having drawn at least one
/// all-inlier sample reaches `probability`, given the best inlier ratio seen so far,
/// or until `max_iterations` samples have been drawn. The model with the most
/// inliers wins.
#[derive(Debug, Clone)]
pub struct Ransac<R> {
    threshold: f64,
    probability: f64,
    max_iterations: usize,
    rng: R,
}

impl<R> Ransac<R>
where
    R: Rng,
{
    /// `threshold` is the largest residual an inlier may have.
    pub fn new(threshold: f64, probability: f64, max_iterations: usize, rng: R) -> Self {
        Self {
            threshold,
            probability,
            max_iterations,
            rng,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// The number of samples needed to draw an all-inlier sample of `sample_size`
    /// with the configured probability, capped at `max_iterations`.
    pub fn required_iterations(&self, inliers: usize, total: usize, sample_size: usize) -> usize {
        if total == 0 {
            return self.max_iterations;
        }
        let inlier_ratio = inliers as f64 / total as f64;
        let all_inliers = inlier_ratio.powi(sample_size as i32);
        if all_inliers >= 1.0 {
            return 1;
        }
        let denominator = (1.0 - all_inliers).ln();
        if denominator >= 0.0 || !denominator.is_finite() {
            return self.max_iterations;
        }
        let needed = ((1.0 - self.probability).ln() / denominator).ceil();
        if needed.is_finite() && needed >= 0.0 {
            (needed as usize).clamp(1, self.max_iterations.max(1))
        } else {
            self.max_iterations
        }
    }

    fn inliers<M, Data>(&self, model: &M, data: &[Data]) -> Vec<usize>
    where
        M: Model<Data>,
    {
        data.iter()
            .enumerate()
            .filter(|(_, datum)| model.residual(datum) <= self.threshold)
            .map(|(ix, _)| ix)
            .collect()
    }
}

impl<E, R, Data> Consensus<E, Data> for Ransac<R>
where
    E: Estimator<Data>,
    R: Rng,
    Data: Clone,
{
    type Inliers = Vec<usize>;

    fn model<I>(&mut self, estimator: &E, data: I) -> Option<E::Model>
    where
        I: Iterator<Item = Data> + Clone,
    {
        self.model_inliers(estimator, data).map(|(model, _)| model)
    }

    fn model_inliers<I>(&mut self, estimator: &E, data: I) -> Option<(E::Model, Self::Inliers)>
    where
        I: Iterator<Item = Data> + Clone,
    {
        let data: Vec<Data> = data.collect();
        if data.len() < E::MIN_SAMPLES {
            debug!(
                "sample consensus needs {} data points, got {}",
                E::MIN_SAMPLES,
                data.len()
            );
            return None;
        }
        let mut best: Option<(E::Model, Vec<usize>)> = None;
        let mut needed = self.max_iterations;
        let mut iterations = 0;
        while iterations < needed {
            iterations += 1;
            let sample = index::sample(&mut self.rng, data.len(), E::MIN_SAMPLES).into_vec();
            let models = estimator.estimate(sample.iter().map(|&ix| data[ix].clone()));
            for model in models {
                let inliers = self.inliers(&model, &data);
                let best_count = best.as_ref().map_or(0, |(_, best)| best.len());
                if inliers.len() > best_count {
                    needed = needed.min(self.required_iterations(
                        inliers.len(),
                        data.len(),
                        E::MIN_SAMPLES,
                    ));
                    best = Some((model, inliers));
                }
            }
        }
        let best = best.filter(|(_, inliers)| inliers.len() >= E::MIN_SAMPLES);
        debug!(
            "sample consensus drew {} samples and found {} inliers out of {}",
            iterations,
            best.as_ref().map_or(0, |(_, inliers)| inliers.len()),
            data.len()
        );
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_pcg::Pcg64;

    /// Fits a constant to scalar data from a single sample.
    struct Constant;

    struct Level(f64);

    impl Model<f64> for Level {
        fn residual(&self, data: &f64) -> f64 {
            (data - self.0).abs()
        }
    }

    impl Estimator<f64> for Constant {
        type Model = Level;
        type ModelIter = Option<Level>;
        const MIN_SAMPLES: usize = 1;

        fn estimate<I>(&self, mut data: I) -> Self::ModelIter
        where
            I: Iterator<Item = f64> + Clone,
        {
            data.next().map(Level)
        }
    }

    #[test]
    fn finds_the_dominant_level() {
        let mut rng = Pcg64::from_seed([7; 32]);
        let mut data: Vec<f64> = (0..80).map(|_| 5.0 + rng.gen_range(-0.01..0.01)).collect();
        data.extend((0..20).map(|_| rng.gen_range(-100.0..100.0)));
        let mut ransac = Ransac::new(0.05, 0.999, 1000, Pcg64::from_seed([8; 32]));
        let (level, inliers) = ransac.model_inliers(&Constant, data.iter().copied()).unwrap();
        assert!((level.0 - 5.0).abs() < 0.02);
        assert!(inliers.len() >= 80);
        assert!(inliers.iter().all(|&ix| (data[ix] - 5.0).abs() < 0.1));
    }

    #[test]
    fn too_little_data() {
        let mut ransac = Ransac::new(0.05, 0.999, 1000, Pcg64::from_seed([8; 32]));
        assert!(ransac.model(&Constant, core::iter::empty::<f64>()).is_none());
    }

    #[test]
    fn iterations_adapt_to_inlier_ratio() {
        let ransac = Ransac::new(0.05, 0.99, 1000, Pcg64::from_seed([8; 32]));
        assert_eq!(ransac.required_iterations(100, 100, 5), 1);
        // ln(0.01) / ln(1 - 0.5^5) is about 145.
        let half = ransac.required_iterations(50, 100, 5);
        assert!((140..=150).contains(&half), "{}", half);
        assert_eq!(ransac.required_iterations(0, 100, 5), 1000);
        assert_eq!(ransac.required_iterations(1, 1000, 5), 1000);
    }
}
