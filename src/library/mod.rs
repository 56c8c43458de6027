/// Built-in components, exposed to configurations as dotted packages:
///
/// | package                           | contents                              |
/// |-----------------------------------|---------------------------------------|
/// | `rusty_spoc.statistics.basic`     | covariance family, correlations       |
/// | `rusty_spoc.statistics.distance`  | pairwise distances, linear fit error  |
/// | `rusty_spoc.reducers.basic`       | trace, diagonal, moments, determinant |
/// | `rusty_spoc.reducers.norms`       | matrix norms                          |
/// | `rusty_spoc.rstatistics.basic`    | PCA variance ratios, marginal moments |
pub mod distance;
pub mod linalg;
pub mod norms;
pub mod reducers;
pub mod rstatistics;
pub mod statistics;

use crate::registry::Namespace;

pub fn packages() -> Vec<Namespace> {
    vec![
        statistics::namespace(),
        distance::namespace(),
        reducers::namespace(),
        norms::namespace(),
        rstatistics::namespace(),
    ]
}
