//! Euclidean distance between two points.

/// Squared Euclidean distance.
#[inline]
pub fn squared_euclidean(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len(), "points must share a dimension");
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Euclidean distance. Always non-negative for finite input.
#[inline]
pub fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    squared_euclidean(a, b).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_three_four_five() {
        assert_eq!(euclidean(&[0.0, 0.0], &[3.0, 4.0]), 5.0);
        assert_eq!(squared_euclidean(&[0.0, 0.0], &[3.0, 4.0]), 25.0);
    }

    #[test]
    fn test_self_distance_is_zero() {
        let p = [1.5, -2.0, 7.25];
        assert_eq!(euclidean(&p, &p), 0.0);
    }

    #[test]
    fn test_symmetric() {
        let a = [0.3, 1.2, -4.0, 8.0];
        let b = [2.0, -0.5, 1.0, 3.0];
        assert_eq!(euclidean(&a, &b), euclidean(&b, &a));
    }
}
