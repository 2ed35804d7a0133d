mod back_refs;
mod id_gen;
mod interval;
mod scaled_iso;

pub(crate) use back_refs::BackRefs;
pub(crate) use id_gen::IdGen;
pub use interval::{DiscreteInterval, Interval};
pub use scaled_iso::ScaledIso3;

/// Generate a vec of domain values which are linearly spaced between `start` and `end` and which
/// have a count of `count`. The first value will be `start` and the last value will be `end`. A
/// count of one produces only `start`.
///
/// # Arguments
///
/// * `start`: the starting value of the domain, inclusive
/// * `end`: the ending value of the domain, inclusive
/// * `count`: the total number of discrete, evenly spaced values in the domain
///
/// returns: Vec<f64, Global>
///
/// # Examples
///
/// ```
/// use rangesim::common::linear_space;
/// let domain = linear_space(0.0, 1.0, 3);
/// assert_eq!(domain, vec![0.0, 0.5, 1.0]);
/// ```
pub fn linear_space(start: f64, end: f64, count: usize) -> Vec<f64> {
    if count < 2 {
        return vec![start; count];
    }

    let mut result = Vec::with_capacity(count);
    let step = (end - start) / (count - 1) as f64;
    for i in 0..count {
        result.push(start + i as f64 * step);
    }
    result
}
