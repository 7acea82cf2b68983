use candle_core::{D, Tensor};

/// Squared floor added under the square root of every distance (1e-12 nm).
///
/// The floor disappears from `|r|² + 1e-24` in `f64` once `|r|²` exceeds ~1e-8 nm², so separations
/// above ~1e-4 nm give distances bit-identical to the Euclidean norm. Closer pairs are perturbed by
/// at most 1e-12 nm, and for coincident atoms the gradient of `d` stays finite (zero).
pub const DISTANCE_EPSILON_SQUARED: f64 = 1e-24;

/// Guard added to the distance before normalizing a displacement.
pub const DIRECTION_EPSILON: f64 = 1e-8;

/// Differentiable per-pair geometry.
#[derive(Debug, Clone)]
pub struct PairGeometry {
    /// `positions[j] - positions[i]`, shape `[P, 3]`.
    pub r_ij: Tensor,
    /// Shape `[P]`.
    pub d_ij: Tensor,
    /// `r_ij / (d_ij + ε)`, shape `[P, 3]`. Meaningless but finite for coincident atoms.
    pub direction: Tensor,
}

pub fn distances(r_ij: &Tensor) -> candle_core::Result<Tensor> {
    r_ij.sqr()?
        .sum(D::Minus1)?
        .affine(1.0, DISTANCE_EPSILON_SQUARED)?
        .sqrt()
}

pub fn directions(r_ij: &Tensor, d_ij: &Tensor) -> candle_core::Result<Tensor> {
    r_ij.broadcast_div(&d_ij.affine(1.0, DIRECTION_EPSILON)?.unsqueeze(D::Minus1)?)
}

/// Gathers both endpoints of every pair from `positions` (`[N, 3]`) without modifying it.
pub fn pair_geometry(
    positions: &Tensor,
    idx_i: &Tensor,
    idx_j: &Tensor,
) -> candle_core::Result<PairGeometry> {
    let r_ij = positions
        .index_select(idx_j, 0)?
        .sub(&positions.index_select(idx_i, 0)?)?;
    let d_ij = distances(&r_ij)?;
    let direction = directions(&r_ij, &d_ij)?;
    Ok(PairGeometry {
        r_ij,
        d_ij,
        direction,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{Device, Var};

    const TOLERANCE: f64 = 1e-12;

    fn index(values: &[u32]) -> Tensor {
        Tensor::from_vec(values.to_vec(), values.len(), &Device::Cpu).unwrap()
    }

    #[test]
    fn displacement_points_from_i_to_j() {
        let positions = Tensor::from_vec(
            vec![0.0, 0.0, 0.0, 0.3, 0.4, 0.0],
            (2, 3),
            &Device::Cpu,
        )
        .unwrap();
        let geometry = pair_geometry(&positions, &index(&[0, 1]), &index(&[1, 0])).unwrap();

        let r = geometry.r_ij.to_vec2::<f64>().unwrap();
        assert_eq!(r[0], vec![0.3, 0.4, 0.0]);
        assert_eq!(r[1], vec![-0.3, -0.4, 0.0]);

        let d = geometry.d_ij.to_vec1::<f64>().unwrap();
        assert!((d[0] - 0.5).abs() < TOLERANCE);
        assert_eq!(d[0], d[1]);

        let dir = geometry.direction.to_vec2::<f64>().unwrap();
        assert!((dir[0][0] - 0.6).abs() < 1e-7);
        assert!((dir[0][1] - 0.8).abs() < 1e-7);
    }

    #[test]
    fn distances_match_the_norm_above_the_floor_scale() {
        let separations: [f64; 5] = [2e-4, 1e-3, 0.37, 1e-6, 1e-9];
        let mut values = vec![0.0; 3];
        for &x in &separations {
            values.extend([x, 0.0, 0.0]);
        }
        let positions = Tensor::from_vec(values, (separations.len() + 1, 3), &Device::Cpu).unwrap();
        let senders: Vec<u32> = (1..=separations.len() as u32).collect();
        let geometry =
            pair_geometry(&positions, &index(&vec![0; separations.len()]), &index(&senders))
                .unwrap();

        let d = geometry.d_ij.to_vec1::<f64>().unwrap();
        for (&x, &d) in separations[..3].iter().zip(&d) {
            assert_eq!(d, (x * x).sqrt(), "{x}");
        }
        for (&x, &d) in separations[3..].iter().zip(&d[3..]) {
            assert!(d >= x && d - x <= 1e-12, "{x}: {d}");
        }
    }

    #[test]
    fn coincident_atoms_give_finite_values_and_gradients() {
        let positions = Var::from_tensor(
            &Tensor::from_vec(vec![0.1, 0.2, 0.3, 0.1, 0.2, 0.3], (2, 3), &Device::Cpu).unwrap(),
        )
        .unwrap();
        let geometry =
            pair_geometry(positions.as_tensor(), &index(&[0]), &index(&[1])).unwrap();

        let d = geometry.d_ij.to_vec1::<f64>().unwrap();
        assert!(d[0] > 0.0 && d[0] < TOLERANCE);
        let dir = geometry.direction.to_vec2::<f64>().unwrap();
        assert!(dir[0].iter().all(|v| v.is_finite()));

        let loss = geometry
            .d_ij
            .sum_all()
            .unwrap()
            .add(&geometry.direction.sum_all().unwrap())
            .unwrap();
        let grads = loss.backward().unwrap();
        let grad = grads.get(positions.as_tensor()).unwrap();
        let values = grad.to_vec2::<f64>().unwrap();
        assert!(values.iter().flatten().all(|v| v.is_finite()));
    }
}
