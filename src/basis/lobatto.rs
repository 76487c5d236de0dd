use super::legendre::standard_legendre_array;
use super::ShapeFn;

/// Hierarchic H1-conforming (Lobatto) shape functions on `[-1, 1]`
///
/// * `l_0 = (1 - x) / 2` and `l_1 = (1 + x) / 2` are the vertex functions
/// * `l_k = (P_k - P_{k-2}) / sqrt(2(2k - 1))` for `k >= 2` are bubbles which vanish at both ends
#[derive(Clone, Debug)]
pub struct LobattoShapeFn {
    polys: Vec<Vec<f64>>,
    polys_d1: Vec<Vec<f64>>,
}

impl ShapeFn for LobattoShapeFn {
    fn with(max_order: usize, points: &[f64]) -> Self {
        let max_order = max_order.max(1);
        let mut polys = vec![Vec::with_capacity(points.len()); max_order + 1];
        let mut polys_d1 = vec![Vec::with_capacity(points.len()); max_order + 1];

        for x in points {
            let (p, dp) = standard_legendre_array(*x, max_order);

            polys[0].push((1.0 - x) / 2.0);
            polys_d1[0].push(-0.5);
            polys[1].push((1.0 + x) / 2.0);
            polys_d1[1].push(0.5);

            for k in 2..=max_order {
                let k_ = k as f64;
                let scale = (2.0 * (2.0 * k_ - 1.0)).sqrt();
                polys[k].push((p[k] - p[k - 2]) / scale);
                polys_d1[k].push((dp[k] - dp[k - 2]) / scale);
            }
        }

        Self { polys, polys_d1 }
    }

    fn poly(&self, n: usize, p: usize) -> f64 {
        self.polys[n][p]
    }

    fn poly_d1(&self, n: usize, p: usize) -> f64 {
        self.polys_d1[n][p]
    }

    fn max_order(&self) -> usize {
        self.polys.len() - 1
    }

    fn num_points(&self) -> usize {
        self.polys[0].len()
    }
}
