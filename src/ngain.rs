/// Normalized learning gain (N-Gain) between a pre-test and a post-test score.
///
/// `gain = (nPost - nPre) / (1 - nPre)` on scores normalized to [0, 1].
/// A student who was already perfect on the pre-test would divide by zero, so
/// that case is defined directly: gain 1.0 if still perfect, else 0.0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NGain {
    pub score: f64,
    pub grade: &'static str,
    pub category: &'static str,
}

pub fn n_gain(pre_score: f64, post_score: f64, max_score: f64) -> NGain {
    let n_pre = if max_score > 0.0 {
        pre_score / max_score
    } else {
        0.0
    };
    let n_post = if max_score > 0.0 {
        post_score / max_score
    } else {
        0.0
    };

    let gain = if n_pre >= 1.0 {
        if n_post >= 1.0 {
            1.0
        } else {
            0.0
        }
    } else {
        (n_post - n_pre) / (1.0 - n_pre)
    };

    // Band cut-offs are inclusive on the lower bound.
    let (grade, category) = if gain > 0.7 {
        ("A", "Peningkatan Tinggi")
    } else if gain >= 0.3 {
        ("B", "Peningkatan Sedang")
    } else if gain >= 0.0 {
        ("C", "Peningkatan Rendah")
    } else {
        ("D", "Terjadi Penurunan")
    };

    NGain {
        score: gain,
        grade,
        category,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_pre_and_post_is_full_gain() {
        let g = n_gain(10.0, 10.0, 10.0);
        assert_eq!(g.score, 1.0);
        assert_eq!(g.grade, "A");
        assert_eq!(g.category, "Peningkatan Tinggi");
    }

    #[test]
    fn perfect_pre_with_lower_post_is_zero_gain() {
        let g = n_gain(10.0, 8.0, 10.0);
        assert_eq!(g.score, 0.0);
        assert_eq!(g.grade, "C");
    }

    #[test]
    fn flat_mid_scores_are_low_improvement_not_decline() {
        let g = n_gain(5.0, 5.0, 10.0);
        assert_eq!(g.score, 0.0);
        assert_eq!(g.category, "Peningkatan Rendah");
        assert_ne!(g.category, "Terjadi Penurunan");
    }

    #[test]
    fn zero_to_full_is_grade_a() {
        let g = n_gain(0.0, 10.0, 10.0);
        assert_eq!(g.score, 1.0);
        assert_eq!(g.grade, "A");
    }

    #[test]
    fn band_bounds_are_inclusive_below() {
        assert_eq!(n_gain(0.0, 3.0, 10.0).grade, "B"); // exactly 0.3
        assert_eq!(n_gain(0.0, 7.0, 10.0).grade, "B"); // exactly 0.7 is not A
        assert_eq!(n_gain(0.0, 7.1, 10.0).grade, "A");
        assert_eq!(n_gain(0.0, 2.9, 10.0).grade, "C");
    }

    #[test]
    fn decline_is_grade_d() {
        let g = n_gain(8.0, 4.0, 10.0);
        assert!(g.score < 0.0);
        assert_eq!(g.grade, "D");
        assert_eq!(g.category, "Terjadi Penurunan");
    }

    #[test]
    fn zero_max_score_normalizes_to_zero() {
        let g = n_gain(3.0, 5.0, 0.0);
        assert_eq!(g.score, 0.0);
        assert_eq!(g.grade, "C");
    }
}
