use crate::data::Observations;
use crate::model::NavierStokesNet;
use crate::normalize::DomainBounds;
use crate::residual::navier_stokes;
use burn::nn::loss::{MseLoss, Reduction};
use burn::tensor::backend::Backend;
use burn::tensor::{ElementConversion, Tensor, TensorData};

/// デバイス上に一度だけ載せた学習データ（座標と観測速度）。
#[derive(Debug, Clone)]
pub struct TrainingBatch<B: Backend> {
    pub coords: Tensor<B, 2>,
    pub u: Tensor<B, 2>,
    pub v: Tensor<B, 2>,
}

impl<B: Backend> TrainingBatch<B> {
    pub fn from_observations(observations: &Observations, device: &B::Device) -> Self {
        let n = observations.len();
        Self {
            coords: float_tensor(observations.coords(), [n, 3], device),
            u: float_tensor(observations.u().to_vec(), [n, 1], device),
            v: float_tensor(observations.v().to_vec(), [n, 1], device),
        }
    }

    pub fn len(&self) -> usize {
        self.coords.dims()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub(crate) fn float_tensor<B: Backend>(values: Vec<f64>, shape: [usize; 2], device: &B::Device) -> Tensor<B, 2> {
    Tensor::from_data(TensorData::new(values, shape).convert::<B::FloatElem>(), device)
}

/// 損失の内訳。いずれも [1] のテンソルです。
#[derive(Debug, Clone)]
pub struct LossTerms<B: Backend> {
    /// 観測速度との二乗誤差の総和
    pub data: Tensor<B, 1>,
    /// 残差 f_u, f_v の二乗和
    pub physics: Tensor<B, 1>,
    /// `data + residual_weight * physics`
    pub total: Tensor<B, 1>,
}

impl<B: Backend> LossTerms<B> {
    pub fn values(&self) -> LossValues {
        let read = |t: &Tensor<B, 1>| t.clone().into_scalar().elem::<f64>();
        LossValues {
            data: read(&self.data),
            physics: read(&self.physics),
            total: read(&self.total),
        }
    }
}

/// 損失の内訳をホスト側の値にしたもの。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LossValues {
    pub data: f64,
    pub physics: f64,
    pub total: f64,
}

/// データ適合項と物理残差項を合わせた損失を計算します。
///
/// 残差は観測点と同じ点で評価します。`residual_weight = 1.0` で両項は等しい重みになります。
pub fn loss_terms<B: Backend>(
    net: &NavierStokesNet<B>,
    bounds: &DomainBounds,
    batch: &TrainingBatch<B>,
    residual_weight: f64,
) -> LossTerms<B> {
    let fields = navier_stokes(net, bounds, batch.coords.clone());
    let mse = MseLoss::new();
    let data = mse.forward(fields.u, batch.u.clone(), Reduction::Sum)
        + mse.forward(fields.v, batch.v.clone(), Reduction::Sum);
    let physics = mse.forward(fields.f_u.clone(), Tensor::zeros_like(&fields.f_u), Reduction::Sum)
        + mse.forward(fields.f_v.clone(), Tensor::zeros_like(&fields.f_v), Reduction::Sum);
    let total = data.clone() + physics.clone().mul_scalar(residual_weight);
    LossTerms {
        data,
        physics,
        total,
    }
}
