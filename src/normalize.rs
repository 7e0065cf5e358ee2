use crate::data::Observations;
use crate::error::{PinnError, Result};
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};

const AXES: [&str; 3] = ["x", "y", "t"];

/// 学習領域の下限・上限。入力座標を [-1, 1]^3 に線形写像するために使います。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DomainBounds {
    lower: [f64; 3],
    upper: [f64; 3],
}

impl DomainBounds {
    /// 範囲がゼロの軸があればエラーを返します。
    pub fn new(lower: [f64; 3], upper: [f64; 3]) -> Result<Self> {
        for axis in 0..3 {
            let (lo, hi) = (lower[axis], upper[axis]);
            if !(hi - lo).is_finite() || hi <= lo {
                return Err(PinnError::DegenerateDomain {
                    axis: AXES[axis],
                    lower: lo,
                    upper: hi,
                });
            }
        }
        Ok(Self { lower, upper })
    }

    /// 観測データの (x, y, t) 列の最小値・最大値から範囲を求めます。
    pub fn from_observations(observations: &Observations) -> Result<Self> {
        let columns = [observations.x(), observations.y(), observations.t()];
        let mut lower = [0.0; 3];
        let mut upper = [0.0; 3];
        for (axis, column) in columns.iter().enumerate() {
            lower[axis] = column.iter().copied().fold(f64::INFINITY, f64::min);
            upper[axis] = column.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        }
        Self::new(lower, upper)
    }

    pub fn lower(&self) -> [f64; 3] {
        self.lower
    }

    pub fn upper(&self) -> [f64; 3] {
        self.upper
    }

    /// 各軸の微分のスケール係数 `2 / (upper - lower)`。
    ///
    /// 正規化座標での微分にこの係数を掛けると物理座標での微分になります。
    pub fn scale(&self) -> [f64; 3] {
        std::array::from_fn(|axis| 2.0 / (self.upper[axis] - self.lower[axis]))
    }

    /// 1点の座標を正規化します。
    pub fn normalize(&self, point: [f64; 3]) -> [f64; 3] {
        std::array::from_fn(|axis| {
            2.0 * (point[axis] - self.lower[axis]) / (self.upper[axis] - self.lower[axis]) - 1.0
        })
    }

    /// [n, 3] の座標テンソルを正規化します。
    pub fn normalize_tensor<B: Backend>(&self, coords: Tensor<B, 2>) -> Tensor<B, 2> {
        let device = coords.device();
        let lower = row_tensor::<B>(self.lower, &device);
        let scale = row_tensor::<B>(self.scale(), &device);
        coords.sub(lower).mul(scale).sub_scalar(1.0)
    }
}

fn row_tensor<B: Backend>(values: [f64; 3], device: &B::Device) -> Tensor<B, 2> {
    let data = TensorData::new(values.to_vec(), [1, 3]).convert::<B::FloatElem>();
    Tensor::from_data(data, device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use burn::backend::NdArray;
    use std::f64::consts::PI;

    #[test]
    fn maps_domain_corners_to_unit_cube() {
        let bounds = DomainBounds::new([-1.0, 0.0, 0.0], [1.0, 2.0 * PI, 20.0]).unwrap();
        let low = bounds.normalize([-1.0, 0.0, 0.0]);
        let high = bounds.normalize([1.0, 2.0 * PI, 20.0]);
        for axis in 0..3 {
            assert_relative_eq!(low[axis], -1.0, epsilon = 1e-12);
            assert_relative_eq!(high[axis], 1.0, epsilon = 1e-12);
        }
        let mid = bounds.normalize([0.0, PI, 10.0]);
        for value in mid {
            assert_relative_eq!(value, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn bounds_come_from_observation_columns() {
        let obs = Observations::new(
            vec![-1.0, 0.5, 1.0],
            vec![0.0, 2.0 * PI, 1.0],
            vec![20.0, 0.0, 3.0],
            vec![0.0; 3],
            vec![0.0; 3],
        )
        .unwrap();
        let bounds = DomainBounds::from_observations(&obs).unwrap();
        assert_eq!(bounds.lower(), [-1.0, 0.0, 0.0]);
        assert_eq!(bounds.upper(), [1.0, 2.0 * PI, 20.0]);
    }

    #[test]
    fn degenerate_axis_is_rejected() {
        let err = DomainBounds::new([0.0, 0.0, 1.0], [1.0, 1.0, 1.0]).unwrap_err();
        assert!(matches!(err, PinnError::DegenerateDomain { axis: "t", .. }));
    }

    #[test]
    fn tensor_normalization_matches_pointwise() {
        let device = Default::default();
        let bounds = DomainBounds::new([-1.0, 0.0, 0.0], [1.0, 2.0 * PI, 20.0]).unwrap();
        let point = [0.25, 1.0, 7.5];
        let coords = Tensor::<NdArray<f64>, 2>::from_data(TensorData::new(point.to_vec(), [1, 3]), &device);
        let normalized = bounds.normalize_tensor(coords).to_data();
        let expected = bounds.normalize(point);
        for (got, want) in normalized.iter::<f64>().zip(expected) {
            assert_relative_eq!(got, want, epsilon = 1e-12);
        }
    }
}
